use std::io;

pub type Result<T> = eyre::Result<T>;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("the unix socket: {path} does not exist")]
    SocketNotFound { path: String },
    #[error("connect failed: {0}")]
    Connect(#[source] io::Error),
    #[error("greeting failed: {0}")]
    Greeting(String),
    #[error("protocol negotiation failed: {0}")]
    Negotiation(String),
    #[error("set option: {option} failed: {reply}")]
    Configure { option: &'static str, reply: String },
    #[error("fsavd IO: {0}")]
    Io(#[from] io::Error),
}

impl ClientError {
    /// True when the failure came from a deadline expiring on a line read or write.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Io(e) if e.kind() == io::ErrorKind::TimedOut)
    }
}
