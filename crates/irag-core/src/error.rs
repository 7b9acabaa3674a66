use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Channel search failed: {0}")]
    Search(String),

    #[error("Rerank failed: {0}")]
    Rerank(String),
}

pub type Result<T> = std::result::Result<T, Error>;
