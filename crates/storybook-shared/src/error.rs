use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SessionError {
    #[error("Missing session token")]
    Missing,

    #[error("Malformed session token")]
    InvalidFormat,

    #[error("Base64 decode error")]
    Base64Decode,

    #[error("Invalid session signature")]
    InvalidSignature,

    #[error("Session has expired")]
    Expired,

    #[error("Identity provider key is not configured")]
    NoProviderKey,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TypeError {
    #[error("Unknown role: {0}")]
    UnknownRole(String),

    #[error("Invalid story id: {0}")]
    InvalidStoryId(String),

    #[error("Invalid user id")]
    EmptyUserId,
}
