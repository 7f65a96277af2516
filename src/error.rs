use thiserror::Error;

#[derive(Error, Debug)]
pub enum CmafError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("contract violation: {0}")]
    Contract(String),

    #[error("parser error: {0}")]
    Parser(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("stream has not started")]
    NotStarted,
}

pub type Result<T> = std::result::Result<T, CmafError>;
