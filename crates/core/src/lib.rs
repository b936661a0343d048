//! `forgecast-core`: foundation building blocks for the forecasting engine.
//!
//! This crate contains **pure** primitives (no IO, no runtime): the historical
//! series model and the caller-visible error taxonomy.

pub mod error;
pub mod observation;
pub mod value_object;

pub use error::{EngineError, EngineResult};
pub use observation::{Dataset, Observation};
pub use value_object::ValueObject;
