use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("No draft is currently stored")]
    NoDraft,

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
