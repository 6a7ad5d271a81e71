//! A scripted fsavd listening on a temporary unix socket.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use interprocess::local_socket::traits::tokio::Listener as _;
use interprocess::local_socket::{prelude::*, GenericFilePath, ListenerOptions};
use tokio::task::JoinHandle;
use tokio_util::codec::{Framed, LinesCodec};

pub const GREETING: &str = "DBVERSION\t2021-03-01_01";

pub struct FakeFsavd {
    _dir: tempfile::TempDir,
    pub path: PathBuf,
    received: Arc<Mutex<Vec<String>>>,
    disconnects: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

impl FakeFsavd {
    /// Greet every connection with `greeting`, then answer each received line
    /// with whatever `respond` returns (possibly nothing).
    pub fn start<F>(greeting: &str, respond: F) -> Self
    where
        F: FnMut(&str) -> Vec<String> + Send + 'static,
    {
        Self::start_paced(greeting, Duration::ZERO, respond)
    }

    /// Like [`FakeFsavd::start`], but waits `pause` before every reply line.
    pub fn start_paced<F>(greeting: &str, pause: Duration, mut respond: F) -> Self
    where
        F: FnMut(&str) -> Vec<String> + Send + 'static,
    {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fsav.sock");
        let name = path.clone().to_fs_name::<GenericFilePath>().unwrap();
        let listener = ListenerOptions::new().name(name).create_tokio().unwrap();

        let received = Arc::new(Mutex::new(Vec::new()));
        let disconnects = Arc::new(AtomicUsize::new(0));
        let greeting = greeting.to_string();

        let handle = {
            let received = Arc::clone(&received);
            let disconnects = Arc::clone(&disconnects);
            tokio::spawn(async move {
                while let Ok(stream) = listener.accept().await {
                    let mut framed = Framed::new(stream, LinesCodec::new());
                    if framed.send(greeting.as_str()).await.is_ok() {
                        'conn: while let Some(Ok(line)) = framed.next().await {
                            received.lock().unwrap().push(line.clone());
                            for reply in respond(&line) {
                                if !pause.is_zero() {
                                    tokio::time::sleep(pause).await;
                                }
                                if framed.send(reply).await.is_err() {
                                    break 'conn;
                                }
                            }
                        }
                    }
                    disconnects.fetch_add(1, Ordering::SeqCst);
                }
            })
        };

        Self {
            _dir: dir,
            path,
            received,
            disconnects,
            handle,
        }
    }

    /// A well-behaved fsavd: accepts protocol 9 and every option, and answers
    /// `SCAN` with the lines `scan` returns for the path, then `OK`.
    pub fn standard<F>(scan: F) -> Self
    where
        F: Fn(&str) -> Vec<String> + Send + 'static,
    {
        Self::start(GREETING, move |line| {
            let mut fields = line.split('\t');
            match fields.next() {
                Some("PROTOCOL") => vec!["OK\tprotocol version 9".to_string()],
                Some("CONFIGURE") => vec!["OK\toption set".to_string()],
                Some("SCAN") => {
                    let mut out = scan(fields.next().unwrap_or(""));
                    out.push("OK\tScan done".to_string());
                    out
                }
                _ => vec!["ERROR\tunknown command".to_string()],
            }
        })
    }

    pub fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }

    /// Wait until the server has seen `n` connections end.
    pub async fn wait_disconnects(&self, n: usize) -> bool {
        for _ in 0..100 {
            if self.disconnects.load(Ordering::SeqCst) >= n {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

impl Drop for FakeFsavd {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub fn infected_line(status: &str, path: &str, signature: &str) -> String {
    format!("{status}\t{path}\t{signature}\tx\t0\t0\t0\t0")
}

pub fn default_configure_lines() -> Vec<String> {
    [
        "CONFIGURE\tMIME\t1",
        "CONFIGURE\tRISKWARE\t1",
        "CONFIGURE\tSTOPONFIRST\t1",
        "CONFIGURE\tTIMEOUT\t60",
        "CONFIGURE\tARCHIVE\t1",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
