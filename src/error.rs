use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid FEN '{fen}': {reason}")]
    InvalidFen { fen: String, reason: String },

    #[error("illegal move '{0}'")]
    IllegalMove(String),

    #[error("thread count {0} is outside 1..={max}", max = crate::threads::MAX_THREADS)]
    InvalidThreadCount(usize),

    #[error("hash size of {0} bytes is too small")]
    InvalidHashSize(usize),

    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error("thread pool is not running")]
    PoolNotRunning,

    #[error("failed to spawn search thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
