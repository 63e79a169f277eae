//! Error taxonomy shared by the gateway, the backends and the HTTP layer.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Rejected before any backend call: missing table name, empty maps,
    /// unknown columns, empty bulk payloads.
    #[error("{0}")]
    InvalidArgument(String),

    /// Anything the relational backend reported, with its raw text.
    #[error("{0}")]
    Database(String),

    #[error("Unsupported database type: {0}")]
    UnsupportedBackend(String),
}

impl Error {
    pub fn invalid(message: impl Into<String>) -> Self {
        Error::InvalidArgument(message.into())
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Error::InvalidArgument(_))
    }

    /// Prefixes backend failures with the action that was attempted.
    pub fn context(self, action: &str) -> Self {
        match self {
            Error::Database(message) => Error::Database(format!("{}: {}", action, message)),
            other => other,
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Error::Database(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
