//! Domain errors for the notification subsystem.
//!
//! Plumbing code (HTTP, WebSocket, files) returns `anyhow::Result` with
//! context. The variants here are the failures callers may want to match
//! on; everything else is carried as a message.

/// Errors surfaced by the notification subsystem.
#[derive(Debug)]
pub enum Error {
    /// Another live connection already holds the process-wide lease.
    ConnectionBusy,
    /// The push transport could not open the channel.
    Transport(String),
    /// The notification center has been shut down.
    Shutdown,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConnectionBusy => write!(f, "Another notification connection is already live"),
            Self::Transport(msg) => write!(f, "Transport error: {msg}"),
            Self::Shutdown => write!(f, "Notification center shut down"),
        }
    }
}

impl std::error::Error for Error {}

/// Convenience alias for results carrying [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_reason() {
        let err = Error::Transport("connection refused".to_string());
        assert_eq!(err.to_string(), "Transport error: connection refused");
    }

    #[test]
    fn test_error_converts_into_anyhow() {
        let err: anyhow::Error = Error::ConnectionBusy.into();
        assert!(err.downcast_ref::<Error>().is_some());
    }
}
