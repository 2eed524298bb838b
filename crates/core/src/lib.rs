pub mod config;
pub mod error;

pub use config::{load_dotenv, Config, PoolConfig, RunnerConfig, DEFAULT_WORKER_ID_TOKEN};
pub use error::*;
