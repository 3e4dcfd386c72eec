// Chess search core with YBWC split-point parallelism
pub mod board;
pub mod config;
pub mod error;
pub mod perft;
pub mod search;
pub mod threads;

pub use board::Position;
pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use search::{Limits, SearchInfo, SearchResult};
pub use threads::ThreadPool;
