use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid object hash: {0}")]
    InvalidObjectHash(String),
    #[error("invalid bundle path: {0}")]
    InvalidPath(String),
}
