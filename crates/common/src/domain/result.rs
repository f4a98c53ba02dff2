use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Invalid device ID: {0}")]
    InvalidDeviceId(String),

    #[error("Invalid encryption key: {0}")]
    InvalidEncryptionKey(String),

    #[error("Repository error: {0}")]
    RepositoryError(#[from] anyhow::Error),
}
