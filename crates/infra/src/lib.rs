//! Infrastructure layer: cache transports, environment configuration and the
//! background retraining runner.
//!
//! Nothing here is required to forecast; the engine in `forgecast-ai` runs
//! with an in-memory store and explicit training calls.

pub mod bootstrap;
pub mod cache;
pub mod config;
pub mod retrain;

pub use bootstrap::{SharedEngine, build_engine, start_retraining};
pub use config::EngineSettings;
pub use retrain::{HistorySource, InMemoryHistorySource, RetrainHandle, RetrainRunner};
