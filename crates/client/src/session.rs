//! Session setup: greeting, protocol negotiation, option configuration.

use std::io;
use std::ops::ControlFlow;
use std::time::Duration;

use fsav_core::{ClientError, Config};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, trace, warn};

use crate::channel::LineChannel;
use crate::protocol::{self, Request, PROTOCOL_VERSION};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Dialed,
    Greeted,
    Negotiated,
    Configured,
    Ready,
    Failed,
}

/// Drives a freshly dialed connection to `Ready`.
///
/// Any failed transition moves to `Failed` and closes the channel.
pub struct Handshake<'a, R, W> {
    channel: &'a LineChannel<R, W>,
    config: &'a Config,
    timeout: Duration,
    state: State,
}

impl<'a, R, W> Handshake<'a, R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub const fn new(channel: &'a LineChannel<R, W>, config: &'a Config, timeout: Duration) -> Self {
        Self {
            channel,
            config,
            timeout,
            state: State::Dialed,
        }
    }

    #[must_use]
    pub const fn state(&self) -> State {
        self.state
    }

    /// # Errors
    ///
    /// Returns the error of the first failed transition; the channel is closed by then.
    pub async fn run(&mut self) -> Result<(), ClientError> {
        while self.state != State::Ready {
            match self.step().await {
                Ok(next) => {
                    debug!(from = ?self.state, to = ?next, "handshake");
                    self.state = next;
                }
                Err(e) => {
                    warn!(at = ?self.state, %e, "handshake failed, closing connection");
                    self.state = State::Failed;
                    if let Err(close_err) = self.channel.close().await {
                        debug!(%close_err, "close after failed handshake");
                    }
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    async fn step(&self) -> Result<State, ClientError> {
        match self.state {
            State::Dialed => {
                let line = self
                    .channel
                    .exchange(None, self.timeout, ControlFlow::Break)
                    .await?;
                if !protocol::is_greeting(&line) {
                    return Err(ClientError::Greeting(line));
                }
                Ok(State::Greeted)
            }
            State::Greeted => {
                let request = Request::Protocol(PROTOCOL_VERSION).to_string();
                let line = self
                    .channel
                    .exchange(Some(&request), self.timeout, ControlFlow::Break)
                    .await?;
                if !protocol::is_ok(&line) {
                    return Err(ClientError::Negotiation(line));
                }
                Ok(State::Negotiated)
            }
            State::Negotiated => {
                send_options(self.channel, self.config, self.timeout).await?;
                Ok(State::Configured)
            }
            State::Configured | State::Ready => Ok(State::Ready),
            State::Failed => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "handshake already failed",
            )
            .into()),
        }
    }
}

/// Send every scan option in wire order, each requiring an `OK` reply.
///
/// # Errors
///
/// Stops at the first rejected option with `ClientError::Configure`.
pub async fn send_options<R, W>(
    channel: &LineChannel<R, W>,
    config: &Config,
    timeout: Duration,
) -> Result<(), ClientError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    for (name, value) in config.options() {
        let request = Request::Configure { name, value }.to_string();
        let reply = channel
            .exchange(Some(&request), timeout, ControlFlow::Break)
            .await?;
        if !protocol::is_ok(&reply) {
            return Err(ClientError::Configure {
                option: name,
                reply,
            });
        }
        trace!(option = name, %value, "option set");
    }
    Ok(())
}
