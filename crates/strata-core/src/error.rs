use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unsupported plan encoding: {0}")]
    UnsupportedEncoding(String),

    #[error("plan compression failed: {0}")]
    Compression(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
