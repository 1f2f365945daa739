pub mod config;
pub mod constants;
pub mod curator;
#[cfg(feature = "db")]
pub mod db;
pub mod domain;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod rate_limiter;
pub mod sources;
pub mod storage;
pub mod types;
