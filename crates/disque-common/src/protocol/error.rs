use thiserror::Error;

#[derive(Error, Debug)]
pub enum DisqueError {
    /// Malformed or unexpected bytes on a connection.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Error reply reported by the server, carrying its raw text.
    #[error("{0}")]
    Command(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    /// The command was still pending when its connection was closed.
    #[error("Command cancelled: connection closed")]
    Cancelled,

    #[error("Client is closed")]
    ClientClosed,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DisqueError {
    /// Whether the error was reported by the server for a single command.
    pub fn is_command_error(&self) -> bool {
        matches!(self, DisqueError::Command(_))
    }

    /// Whether the error means the connection itself is unusable.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            DisqueError::Connection(_)
                | DisqueError::Protocol(_)
                | DisqueError::Timeout(_)
                | DisqueError::Io(_)
        )
    }
}

impl From<std::net::AddrParseError> for DisqueError {
    fn from(err: std::net::AddrParseError) -> Self {
        DisqueError::InvalidConfig(err.to_string())
    }
}

impl From<std::str::Utf8Error> for DisqueError {
    fn from(err: std::str::Utf8Error) -> Self {
        DisqueError::Protocol(format!("invalid UTF-8: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, DisqueError>;
