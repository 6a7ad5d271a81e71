//! fsavd client: dial, handshake, scan.

use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fsav_core::{ClientError, Config, ScanResult};
use interprocess::local_socket::tokio::Stream;
use tokio::io::{ReadHalf, WriteHalf};
use tracing::{debug, instrument, trace};

use crate::channel::LineChannel;
use crate::protocol::{self, Request};
use crate::session::{self, Handshake};
use crate::transport::{Dialer, DEFAULT_SOCKET};

/// Per-command timeout when none is given.
pub const DEFAULT_CMD_TIMEOUT: Duration = Duration::from_secs(60);

type SocketChannel = LineChannel<ReadHalf<Stream>, WriteHalf<Stream>>;

/// A ready fsavd session.
///
/// A `Client` only exists once the greeting, protocol negotiation and every
/// option have been accepted. `scan` takes `&self`, so one client can be shared
/// (e.g. in an `Arc`) between tasks; commands are pipelined in call order.
pub struct Client {
    path: PathBuf,
    dialer: Dialer,
    cmd_timeout: Duration,
    config: Config,
    channel: SocketChannel,
}

impl Client {
    /// Connect with default retry settings and scan options.
    ///
    /// An empty `path` selects [`DEFAULT_SOCKET`].
    pub async fn connect(
        path: impl AsRef<Path>,
        connect_timeout: Duration,
        cmd_timeout: Duration,
    ) -> Result<Self, ClientError> {
        Self::builder(path)
            .connect_timeout(connect_timeout)
            .cmd_timeout(cmd_timeout)
            .connect()
            .await
    }

    pub fn builder(path: impl AsRef<Path>) -> ClientBuilder {
        ClientBuilder::new(path)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        self.dialer.connect_timeout
    }

    #[must_use]
    pub const fn cmd_timeout(&self) -> Duration {
        self.cmd_timeout
    }

    #[must_use]
    pub const fn conn_retries(&self) -> u32 {
        self.dialer.retries
    }

    #[must_use]
    pub const fn conn_sleep(&self) -> Duration {
        self.dialer.sleep
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Options edited here reach fsavd on the next `set_options` or `reconnect`.
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    /// Ignored for a zero duration.
    pub fn set_cmd_timeout(&mut self, timeout: Duration) {
        if !timeout.is_zero() {
            self.cmd_timeout = timeout;
        }
    }

    /// Negative counts clamp to 0.
    pub fn set_conn_retries(&mut self, retries: i32) {
        self.dialer.retries = clamp_retries(retries);
    }

    /// Ignored for a zero duration.
    pub fn set_conn_sleep(&mut self, sleep: Duration) {
        if !sleep.is_zero() {
            self.dialer.sleep = sleep;
        }
    }

    /// Re-send every scan option on the open session.
    pub async fn set_options(&self) -> Result<(), ClientError> {
        session::send_options(&self.channel, &self.config, self.cmd_timeout).await
    }

    /// Scan a file. The path is as fsavd sees it.
    ///
    /// After an error the reply stream may be half consumed; prefer `reconnect`.
    /// A timed-out write disables the write side, so later commands fail with
    /// `NotConnected` until then.
    #[instrument(skip(self), fields(socket = %self.path.display()))]
    pub async fn scan(&self, path: &str) -> Result<ScanResult, ClientError> {
        let request = Request::Scan(path).to_string();
        let mut result = ScanResult::new(path);

        self.channel
            .exchange(Some(&request), self.cmd_timeout, |line| {
                if protocol::is_ok(&line) {
                    return ControlFlow::Break(());
                }
                if !result.absorb(&line) {
                    trace!(line = %line, "ignoring non-result line");
                }
                ControlFlow::Continue(())
            })
            .await?;

        debug!(
            infected = result.infected,
            status = result.status(),
            signature = result.signature(),
            "scan complete"
        );
        Ok(result)
    }

    /// Close the connection. Later calls are no-ops.
    pub async fn close(&self) -> Result<(), ClientError> {
        self.channel.close().await?;
        Ok(())
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.channel.is_closed()
    }

    /// Drop the current connection and run dial and handshake again with the
    /// stored settings.
    pub async fn reconnect(&mut self) -> Result<(), ClientError> {
        if let Err(e) = self.channel.close().await {
            debug!(%e, "close before reconnect");
        }
        self.channel = open(&self.path, &self.dialer, &self.config, self.cmd_timeout).await?;
        Ok(())
    }
}

#[instrument(skip(dialer, config), fields(path = %path.display()))]
async fn open(
    path: &Path,
    dialer: &Dialer,
    config: &Config,
    cmd_timeout: Duration,
) -> Result<SocketChannel, ClientError> {
    let stream = dialer.dial(path).await?;
    let channel = LineChannel::from_stream(stream);
    Handshake::new(&channel, config, cmd_timeout).run().await?;
    debug!("session ready");
    Ok(channel)
}

fn clamp_retries(retries: i32) -> u32 {
    u32::try_from(retries).unwrap_or(0)
}

fn resolve_path(path: &Path) -> PathBuf {
    if path.as_os_str().is_empty() {
        PathBuf::from(DEFAULT_SOCKET)
    } else {
        path.to_path_buf()
    }
}

/// Settings for [`Client`], applied before the first dial.
#[derive(Debug, Clone)]
pub struct ClientBuilder {
    path: PathBuf,
    dialer: Dialer,
    cmd_timeout: Duration,
    config: Config,
}

impl ClientBuilder {
    fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: resolve_path(path.as_ref()),
            dialer: Dialer::default(),
            cmd_timeout: DEFAULT_CMD_TIMEOUT,
            config: Config::default(),
        }
    }

    /// Ignored for a zero duration.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        if !timeout.is_zero() {
            self.dialer.connect_timeout = timeout;
        }
        self
    }

    /// Ignored for a zero duration.
    #[must_use]
    pub fn cmd_timeout(mut self, timeout: Duration) -> Self {
        if !timeout.is_zero() {
            self.cmd_timeout = timeout;
        }
        self
    }

    /// Negative counts clamp to 0.
    #[must_use]
    pub fn conn_retries(mut self, retries: i32) -> Self {
        self.dialer.retries = clamp_retries(retries);
        self
    }

    /// Ignored for a zero duration.
    #[must_use]
    pub fn conn_sleep(mut self, sleep: Duration) -> Self {
        if !sleep.is_zero() {
            self.dialer.sleep = sleep;
        }
        self
    }

    #[must_use]
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Dial, greet, negotiate and configure.
    ///
    /// # Errors
    ///
    /// Fails with `SocketNotFound` before any connect attempt if the socket path is
    /// missing. On a handshake or configuration failure the connection is closed
    /// before returning.
    pub async fn connect(self) -> Result<Client, ClientError> {
        let channel = open(&self.path, &self.dialer, &self.config, self.cmd_timeout).await?;
        Ok(Client {
            path: self.path,
            dialer: self.dialer,
            cmd_timeout: self.cmd_timeout,
            config: self.config,
            channel,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_retries_clamp_to_zero() {
        assert_eq!(clamp_retries(-2), 0);
        assert_eq!(clamp_retries(0), 0);
        assert_eq!(clamp_retries(3), 3);
    }

    #[test]
    fn empty_path_uses_default_socket() {
        assert_eq!(resolve_path(Path::new("")), PathBuf::from(DEFAULT_SOCKET));
        assert_eq!(
            resolve_path(Path::new("/run/fsav.sock")),
            PathBuf::from("/run/fsav.sock")
        );
    }

    #[test]
    fn builder_defaults_and_invalid_inputs() {
        let b = Client::builder("/run/fsav.sock")
            .cmd_timeout(Duration::ZERO)
            .conn_sleep(Duration::ZERO)
            .connect_timeout(Duration::from_secs(5))
            .conn_retries(-4);
        assert_eq!(b.cmd_timeout, DEFAULT_CMD_TIMEOUT);
        assert_eq!(b.dialer.sleep, crate::transport::DEFAULT_RETRY_SLEEP);
        assert_eq!(b.dialer.connect_timeout, Duration::from_secs(5));
        assert_eq!(b.dialer.retries, 0);
        assert_eq!(b.config, Config::default());
    }

    #[tokio::test]
    async fn missing_socket_fails_construction() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fsav.sock");
        let err = Client::connect(&path, Duration::from_secs(1), Duration::from_secs(1))
            .await
            .err()
            .expect("missing socket should fail");
        assert_eq!(
            err.to_string(),
            format!("the unix socket: {} does not exist", path.display())
        );
    }
}
