use std::sync::Arc;

use tracing::info;

use forgecast_ai::{CacheStore, ForecastEngine};

use crate::cache;
use crate::config::EngineSettings;
use crate::retrain::{HistorySource, RetrainHandle, RetrainRunner};

pub type SharedEngine = Arc<ForecastEngine<Arc<dyn CacheStore>>>;

/// Connects the configured cache store, builds the engine and adopts any
/// performance records a previous process left in the cache.
pub async fn build_engine(settings: &EngineSettings) -> anyhow::Result<SharedEngine> {
    let store = cache::connect(settings).await?;
    let engine = ForecastEngine::new(store, settings.engine.clone())?;
    let hydrated = engine.hydrate_from_cache().await;
    info!(
        models = engine.registry().len(),
        hydrated,
        horizon = settings.engine.horizon_length,
        "forecast engine ready"
    );
    Ok(Arc::new(engine))
}

/// Starts background retraining when an interval is configured.
pub fn start_retraining<H: HistorySource>(
    settings: &EngineSettings,
    engine: SharedEngine,
    source: Arc<H>,
) -> Option<RetrainHandle> {
    let interval = settings.retrain_interval?;
    Some(RetrainRunner::new(interval).spawn(engine, source))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::retrain::InMemoryHistorySource;
    use forgecast_core::Dataset;

    #[tokio::test]
    async fn default_settings_build_an_in_memory_engine() {
        let engine = build_engine(&EngineSettings::default()).await.unwrap();
        assert_eq!(engine.registry().len(), 4);
        assert_eq!(engine.performance_metrics().trained_count, 0);
    }

    #[tokio::test]
    async fn retraining_is_opt_in() {
        let settings = EngineSettings::default();
        let engine = build_engine(&settings).await.unwrap();
        let source = Arc::new(InMemoryHistorySource::new(Dataset::empty()));
        assert!(start_retraining(&settings, engine.clone(), source.clone()).is_none());

        let settings = EngineSettings {
            retrain_interval: Some(Duration::from_secs(3600)),
            ..settings
        };
        let handle = start_retraining(&settings, engine, source).unwrap();
        handle.shutdown().await;
    }
}
