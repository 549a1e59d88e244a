use std::io;

#[derive(Debug, thiserror::Error)]
pub enum ParleyError {
    #[error("decode error: {0}")]
    Decode(String),

    #[error("resample error: {0}")]
    Resample(String),

    #[error("STT error: {0}")]
    Stt(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("output error: {0}")]
    Output(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("pipeline error: {0}")]
    Pipeline(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, ParleyError>;
