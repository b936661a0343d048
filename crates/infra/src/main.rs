//! One-shot forecast from a JSON history.
//!
//! ```text
//! forgecast [--train] [history.json]
//! ```
//!
//! The history is a JSON array of `{timestamp, value, features?}` records,
//! read from the given file or stdin. With `--train` every model is fitted
//! first; otherwise the engine answers from cached performance records and
//! the moving-average fallback.

use std::io::Read;

use anyhow::Context;

use forgecast_ai::ForecastOptions;
use forgecast_core::Dataset;
use forgecast_infra::{EngineSettings, build_engine};
use forgecast_observability::LogFormat;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let format = match std::env::var("FORGECAST_LOG_FORMAT") {
        Ok(raw) => raw.parse::<LogFormat>()?,
        Err(_) => LogFormat::default(),
    };
    forgecast_observability::init_with(format);

    let mut train = false;
    let mut path = None;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--train" => train = true,
            _ if path.is_none() => path = Some(arg),
            _ => anyhow::bail!("unexpected argument {arg:?}"),
        }
    }

    let raw = match &path {
        Some(path) => std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("reading stdin")?;
            buf
        }
    };
    let dataset: Dataset = serde_json::from_str(&raw).context("parsing history")?;

    let settings = EngineSettings::from_env()?;
    let engine = build_engine(&settings).await?;

    if train {
        let report = engine.train_all_models(&dataset).await?;
        for (model, error) in &report.failures {
            tracing::warn!(%model, %error, "model not trained");
        }
    }

    let options = ForecastOptions::default()
        .with_confidence_level(settings.engine.default_confidence_level);
    let result = engine
        .generate_forecast(&dataset, settings.engine.horizon_length, &options)
        .await?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
