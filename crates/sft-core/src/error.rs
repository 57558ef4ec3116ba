use thiserror::Error;

pub type SftResult<T> = Result<T, SftError>;

#[derive(Debug, Error)]
pub enum SftError {
    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
