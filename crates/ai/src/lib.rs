//! `forgecast-ai`
//!
//! **Responsibility:** ensemble forecasting engine and its result cache.
//!
//! - Feature preparation per model family ([`features`]).
//! - Four structurally different regressors behind one contract ([`model`], [`registry`]).
//! - Training and evaluation ([`trainer`]).
//! - Weighted ensemble + confidence band ([`ensemble`]).
//! - Content-addressed caching keyed by a dataset signature ([`signature`], [`cache`]).
//!
//! The engine is storage-agnostic: the key/value transport is injected through
//! [`cache::CacheStore`], and the historical series is supplied by callers.

pub mod cache;
pub mod config;
pub mod engine;
pub mod ensemble;
pub mod features;
pub mod model;
pub mod registry;
pub mod request;
pub mod result;
pub mod signature;
pub mod trainer;

pub use cache::{CacheError, CacheStore, InMemoryCacheStore, ResultCache};
pub use config::{CacheTtls, EngineConfig};
pub use engine::{ForecastEngine, ModelStatus, PerformanceSummary};
pub use ensemble::EnsembleWeights;
pub use features::{
    DataSource, FeatureInput, FeatureMetadata, FeaturePipeline, PreparedFeatures, StandardPipeline,
    synthetic_dataset,
};
pub use model::{ForecastModel, Hyperparameters, InputShape, Loss, ModelConfig, ModelFamily};
pub use registry::ModelRegistry;
pub use request::ForecastOptions;
pub use result::{
    ForecastResult, ForecastSource, ModelArtifact, ModelForecast, ModelPerformance,
};
pub use signature::{DatasetSignature, SignatureService};
pub use trainer::{TrainedModelState, Trainer, TrainingOutcome, TrainingReport};
