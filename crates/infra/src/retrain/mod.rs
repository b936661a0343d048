//! Background retraining.
//!
//! The engine never loads history on its own; a [`HistorySource`] supplies
//! the series and a [`RetrainRunner`] feeds it to `train_all_models` on a
//! schedule or on demand.

mod runner;

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use forgecast_core::Dataset;

pub use runner::{RetrainHandle, RetrainRunner};

/// Where the runner reads the historical series from.
#[async_trait]
pub trait HistorySource: Send + Sync + 'static {
    async fn load(&self) -> anyhow::Result<Dataset>;
}

/// In-memory source for tests/dev. `replace` swaps the series between runs.
#[derive(Debug, Default)]
pub struct InMemoryHistorySource {
    dataset: Mutex<Dataset>,
}

impl InMemoryHistorySource {
    pub fn new(dataset: Dataset) -> Self {
        Self {
            dataset: Mutex::new(dataset),
        }
    }

    pub fn replace(&self, dataset: Dataset) {
        *self.dataset.lock().unwrap_or_else(PoisonError::into_inner) = dataset;
    }
}

#[async_trait]
impl HistorySource for InMemoryHistorySource {
    async fn load(&self) -> anyhow::Result<Dataset> {
        Ok(self
            .dataset
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}
