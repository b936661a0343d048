use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{info, warn};

use forgecast_ai::{CacheStore, FeaturePipeline, ForecastEngine, TrainingReport};

use super::HistorySource;

/// Config for the retraining runner.
#[derive(Debug, Clone)]
pub struct RetrainRunner {
    pub interval: Duration,
    pub max_retries: u32,
    pub base_backoff: Duration,
    /// Train once as soon as the runner starts.
    pub run_on_start: bool,
}

impl Default for RetrainRunner {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60 * 60),
            max_retries: 5,
            base_backoff: Duration::from_millis(250),
            run_on_start: true,
        }
    }
}

/// Handle for a running retrainer (trigger + reports + shutdown).
///
/// Dropping the handle stops the runner after its current run.
#[derive(Debug)]
pub struct RetrainHandle {
    shutdown: Option<oneshot::Sender<()>>,
    trigger: mpsc::Sender<()>,
    reports: watch::Receiver<Option<TrainingReport>>,
    join: Option<JoinHandle<()>>,
}

impl RetrainHandle {
    /// Requests a run, e.g. after new observations were recorded.
    ///
    /// Triggers are coalesced: while one is already pending this is a no-op.
    pub fn trigger(&self) {
        let _ = self.trigger.try_send(());
    }

    /// Latest successful report; `changed()` wakes on every new one.
    pub fn reports(&self) -> watch::Receiver<Option<TrainingReport>> {
        self.reports.clone()
    }

    /// Stops the runner and waits for it to exit.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(join) = self.join.take() {
            let _ = join.await;
        }
    }
}

impl RetrainRunner {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            ..Self::default()
        }
    }

    /// Spawns the runner onto the current tokio runtime.
    ///
    /// - Schedule: trains every `interval`
    /// - Event-trigger: `handle.trigger()`
    /// - Failures (source errors, a concurrent run, every model failing):
    ///   logged and retried with bounded exponential backoff; never propagate
    pub fn spawn<S, P, H>(&self, engine: Arc<ForecastEngine<S, P>>, source: Arc<H>) -> RetrainHandle
    where
        S: CacheStore + 'static,
        P: FeaturePipeline + 'static,
        H: HistorySource,
    {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let (reports_tx, reports_rx) = watch::channel(None);

        let cfg = self.clone();
        let join = tokio::spawn(runner_loop(
            cfg,
            engine,
            source,
            shutdown_rx,
            trigger_rx,
            reports_tx,
        ));

        RetrainHandle {
            shutdown: Some(shutdown_tx),
            trigger: trigger_tx,
            reports: reports_rx,
            join: Some(join),
        }
    }
}

async fn runner_loop<S, P, H>(
    cfg: RetrainRunner,
    engine: Arc<ForecastEngine<S, P>>,
    source: Arc<H>,
    mut shutdown_rx: oneshot::Receiver<()>,
    mut trigger_rx: mpsc::Receiver<()>,
    reports: watch::Sender<Option<TrainingReport>>,
) where
    S: CacheStore + 'static,
    P: FeaturePipeline + 'static,
    H: HistorySource,
{
    info!(interval_secs = cfg.interval.as_secs(), "retrain runner started");

    let period = cfg.interval.max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut pending = cfg.run_on_start;

    'runner: loop {
        if !pending {
            // Shutdown has priority. A dropped handle also resolves the receiver.
            tokio::select! {
                biased;
                _ = &mut shutdown_rx => break 'runner,
                Some(()) = trigger_rx.recv() => {}
                _ = ticker.tick() => {}
            }
        }
        pending = false;

        // Coalesce triggers that arrived while we were idle.
        while trigger_rx.try_recv().is_ok() {}

        let mut failures: u32 = 0;
        loop {
            match run_once(&engine, source.as_ref()).await {
                Ok(report) => {
                    reports.send_replace(Some(report));
                    break;
                }
                Err(e) => {
                    failures += 1;
                    if failures > cfg.max_retries {
                        warn!(error = %e, failures, "retraining abandoned until the next schedule");
                        break;
                    }
                    let delay = backoff(cfg.base_backoff, failures);
                    warn!(
                        error = %e,
                        attempt = failures,
                        delay_ms = delay.as_millis() as u64,
                        "retraining failed, backing off"
                    );
                    tokio::select! {
                        biased;
                        _ = &mut shutdown_rx => break 'runner,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    info!("retrain runner stopped");
}

async fn run_once<S, P, H>(
    engine: &ForecastEngine<S, P>,
    source: &H,
) -> anyhow::Result<TrainingReport>
where
    S: CacheStore,
    P: FeaturePipeline,
    H: HistorySource,
{
    let dataset = source.load().await?;
    let report = engine.train_all_models(&dataset).await?;
    if report.outcomes.is_empty() {
        bail!("every model failed: {:?}", report.failures);
    }
    Ok(report)
}

fn backoff(base: Duration, attempt: u32) -> Duration {
    // base * 2^(attempt-1), capped.
    let pow = 1u32 << attempt.saturating_sub(1).min(10);
    let ms = base.as_millis().saturating_mul(pow as u128);
    Duration::from_millis(ms.min(10_000) as u64)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};

    use forgecast_ai::{
        EngineConfig, Hyperparameters, InMemoryCacheStore, ModelConfig, ModelFamily,
        ModelRegistry, StandardPipeline, synthetic_dataset,
    };
    use forgecast_core::Dataset;

    use super::*;
    use crate::retrain::InMemoryHistorySource;

    type Engine = ForecastEngine<InMemoryCacheStore, StandardPipeline>;

    fn history() -> Dataset {
        let end = Utc.with_ymd_and_hms(2024, 3, 31, 0, 0, 0).unwrap();
        synthetic_dataset(90, end, 11)
    }

    /// One cheap model so a run takes milliseconds.
    fn engine() -> Arc<Engine> {
        let mut config = EngineConfig::default();
        config.default_weights = BTreeMap::from([("autoregressive".to_string(), 1.0)]);

        let family = ModelFamily::Autoregressive;
        let model = ModelConfig::for_family(family, config.horizon_length, config.sequence_window)
            .with_hyperparameters(Hyperparameters {
                epochs: 3,
                ..Hyperparameters::for_family(family)
            });
        let mut registry = ModelRegistry::new();
        registry.register(model).unwrap();

        Arc::new(
            ForecastEngine::with_registry(
                InMemoryCacheStore::new(),
                StandardPipeline::default(),
                registry,
                config,
            )
            .unwrap(),
        )
    }

    fn fast(interval: Duration) -> RetrainRunner {
        RetrainRunner {
            interval,
            base_backoff: Duration::from_millis(5),
            ..RetrainRunner::default()
        }
    }

    /// Fails the first `failures` loads.
    struct FlakySource {
        remaining_failures: AtomicUsize,
        loads: AtomicUsize,
    }

    impl FlakySource {
        fn new(failures: usize) -> Self {
            Self {
                remaining_failures: AtomicUsize::new(failures),
                loads: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl HistorySource for FlakySource {
        async fn load(&self) -> anyhow::Result<Dataset> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            let left = self.remaining_failures.load(Ordering::SeqCst);
            if left > 0 {
                self.remaining_failures.store(left - 1, Ordering::SeqCst);
                anyhow::bail!("history store offline");
            }
            Ok(history())
        }
    }

    async fn next_report(
        rx: &mut watch::Receiver<Option<TrainingReport>>,
    ) -> TrainingReport {
        tokio::time::timeout(Duration::from_secs(30), rx.changed())
            .await
            .expect("runner produced no report in time")
            .unwrap();
        rx.borrow_and_update().clone().unwrap()
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let base = Duration::from_millis(250);
        assert_eq!(backoff(base, 1), Duration::from_millis(250));
        assert_eq!(backoff(base, 2), Duration::from_millis(500));
        assert_eq!(backoff(base, 4), Duration::from_millis(2000));
        assert_eq!(backoff(base, 30), Duration::from_secs(10));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn trains_on_start() {
        let engine = engine();
        let source = Arc::new(InMemoryHistorySource::new(history()));
        let handle = fast(Duration::from_secs(3600)).spawn(engine.clone(), source);

        let mut reports = handle.reports();
        let report = next_report(&mut reports).await;
        assert!(report.is_complete());
        assert!(report.outcome("autoregressive").is_some());
        assert!(engine.model_status()[0].has_parameters);

        handle.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn trigger_starts_a_run() {
        let engine = engine();
        let source = Arc::new(InMemoryHistorySource::new(history()));
        let runner = RetrainRunner {
            run_on_start: false,
            ..fast(Duration::from_secs(3600))
        };
        let handle = runner.spawn(engine.clone(), source);
        let mut reports = handle.reports();
        assert!(reports.borrow().is_none());

        handle.trigger();
        handle.trigger();
        let first = next_report(&mut reports).await;
        assert_eq!(first.outcomes.len(), 1);

        handle.trigger();
        let second = next_report(&mut reports).await;
        assert_ne!(first.outcomes[0].run_id, second.outcomes[0].run_id);

        handle.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn failing_source_is_retried() {
        let engine = engine();
        let source = Arc::new(FlakySource::new(2));
        let handle = fast(Duration::from_secs(3600)).spawn(engine, source.clone());

        let mut reports = handle.reports();
        let report = next_report(&mut reports).await;
        assert!(report.is_complete());
        assert_eq!(source.loads.load(Ordering::SeqCst), 3);

        handle.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn interval_schedules_runs() {
        let engine = engine();
        let source = Arc::new(InMemoryHistorySource::new(history()));
        let runner = RetrainRunner {
            run_on_start: false,
            ..fast(Duration::from_millis(20))
        };
        let handle = runner.spawn(engine, source);

        let mut reports = handle.reports();
        next_report(&mut reports).await;
        next_report(&mut reports).await;

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_stops_an_idle_runner() {
        let source = Arc::new(InMemoryHistorySource::new(Dataset::empty()));
        let runner = RetrainRunner {
            run_on_start: false,
            ..fast(Duration::from_secs(3600))
        };
        let handle = runner.spawn(engine(), source);

        tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
            .await
            .expect("runner did not stop");
    }
}
