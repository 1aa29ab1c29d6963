use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResqError {
    #[error("Store connection error: {0}")]
    Connection(#[from] redis::RedisError),

    #[error("Unable to fork child worker: {0}")]
    Fork(#[source] std::io::Error),

    #[error("That store alias does not exist: {0}")]
    AliasNotFound(String),

    #[error("Cluster requires at least one node")]
    EmptyCluster,

    #[error("Command {0} requires a key to be routed")]
    MissingKey(String),

    #[error("Invalid worker id: {0}")]
    InvalidWorkerId(String),

    #[error("Invalid backend address: {0}")]
    InvalidBackend(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, ResqError>;
