use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("User not found")]
    UserNotFound,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request rejected (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Unknown error: {0}")]
    Unknown(String),

    #[error("You are already a member of this group")]
    AlreadyMember,

    #[error("Group is full ({max} members)")]
    GroupFull { max: usize },

    #[error("Please enter a group name")]
    EmptyGroupName,

    #[error("Message is empty")]
    EmptyMessage,

    #[error("Message is longer than {max} characters")]
    MessageTooLong { max: usize },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Error::InvalidResponse(e.to_string())
        } else {
            Error::Network(e.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::Network(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::InvalidResponse(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
