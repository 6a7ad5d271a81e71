//! Unix socket transport: dialing fsavd with bounded retry.

use std::future::Future;
use std::io;
use std::path::Path;
use std::time::Duration;

use fsav_core::ClientError;
use interprocess::local_socket::tokio::Stream;
use interprocess::local_socket::traits::tokio::Stream as _;
use interprocess::local_socket::{prelude::*, GenericFilePath};
use tracing::{debug, warn};

/// Where fsavd listens unless told otherwise.
pub const DEFAULT_SOCKET: &str = "/tmp/.fsav-0";

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

pub const DEFAULT_RETRY_SLEEP: Duration = Duration::from_secs(1);

/// Connection settings: timeout per attempt, extra attempts after a timeout, pause between them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dialer {
    pub connect_timeout: Duration,
    pub retries: u32,
    pub sleep: Duration,
}

impl Default for Dialer {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            retries: 0,
            sleep: DEFAULT_RETRY_SLEEP,
        }
    }
}

impl Dialer {
    /// Connect to the fsavd socket at `path`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::SocketNotFound` if `path` does not exist (checked before
    /// any connect attempt), or `ClientError::Connect` once attempts are exhausted or
    /// a non-timeout error occurs.
    pub async fn dial(&self, path: &Path) -> Result<Stream, ClientError> {
        if matches!(path.try_exists(), Ok(false)) {
            return Err(ClientError::SocketNotFound {
                path: path.display().to_string(),
            });
        }

        let stream = self
            .retry(|| connect(path))
            .await
            .map_err(ClientError::Connect)?;
        debug!(path = %path.display(), "connected");
        Ok(stream)
    }

    /// Run `attempt` up to `retries + 1` times, sleeping between attempts that time out.
    async fn retry<T, F, Fut>(&self, mut attempt: F) -> io::Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = io::Result<T>>,
    {
        let attempts = self.retries.saturating_add(1);
        let mut made = 0;
        loop {
            made += 1;
            let err = match tokio::time::timeout(self.connect_timeout, attempt()).await {
                Ok(Ok(conn)) => return Ok(conn),
                Ok(Err(e)) if is_timeout(&e) => e,
                Ok(Err(e)) => return Err(e),
                Err(_) => io::Error::new(io::ErrorKind::TimedOut, "connect timed out"),
            };

            if made >= attempts {
                return Err(err);
            }
            warn!(attempt = made, attempts, %err, "connect timed out, retrying");
            tokio::time::sleep(self.sleep).await;
        }
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    )
}

async fn connect(path: &Path) -> io::Result<Stream> {
    let name = path
        .to_path_buf()
        .to_fs_name::<GenericFilePath>()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    Stream::connect(name).await
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    use super::*;

    fn quick(retries: u32) -> Dialer {
        Dialer {
            connect_timeout: Duration::from_millis(20),
            retries,
            sleep: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn missing_socket_is_not_dialed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fsav.sock");
        let err = quick(3).dial(&path).await.unwrap_err();
        match err {
            ClientError::SocketNotFound { path: p } => assert_eq!(p, path.display().to_string()),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn refused_connect_does_not_retry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not-a-socket");
        std::fs::write(&path, b"").unwrap();

        let dialer = Dialer {
            sleep: Duration::from_secs(5),
            ..quick(3)
        };
        let started = Instant::now();
        let err = dialer.dial(&path).await.unwrap_err();
        assert!(matches!(err, ClientError::Connect(_)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn timeouts_use_every_attempt() {
        let calls = AtomicUsize::new(0);
        let result: io::Result<()> = quick(2)
            .retry(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                std::future::pending()
            })
            .await;
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::TimedOut);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn timeout_then_success() {
        let calls = AtomicUsize::new(0);
        let result = quick(2)
            .retry(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(io::Error::from(io::ErrorKind::TimedOut))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 1);
    }

    #[tokio::test]
    async fn other_errors_abort_immediately() {
        let calls = AtomicUsize::new(0);
        let result: io::Result<()> = quick(5)
            .retry(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(io::Error::from(io::ErrorKind::PermissionDenied)) }
            })
            .await;
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::PermissionDenied);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
