//! `captcha train`

use std::path::PathBuf;

use anyhow::{Context, Result};
use captcha_dataset::{Canonicalizer, LoadReport, load_sources};
use captcha_training::{PipelineConfig, train};
use clap::Args;
use tracing::{debug, info, warn};

/// Metrics file written next to the artifact.
const METRICS_FILE: &str = "metrics.json";

/// Arguments for `captcha train`.
#[derive(Debug, Args)]
pub struct TrainArgs {
    /// Labeled image directories (file stem up to the first `_` is the label)
    #[arg(long = "data", required = true, num_args = 1..)]
    pub data: Vec<PathBuf>,

    /// Artifact output directory
    #[arg(long)]
    pub out: PathBuf,

    /// Number of epochs
    #[arg(long)]
    pub epochs: Option<usize>,

    /// Batch size
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Pipeline config (JSON); flags override it
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Continue from a matching checkpoint in the output directory
    #[arg(long)]
    pub resume: bool,
}

impl TrainArgs {
    /// Pipeline config from the file (or defaults) with flag overrides.
    pub fn pipeline(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::load(path)
                .with_context(|| format!("reading config {}", path.display()))?,
            None => PipelineConfig::default(),
        };
        if let Some(epochs) = self.epochs {
            config.training.epochs = epochs;
        }
        if let Some(batch_size) = self.batch_size {
            config.training.batch_size = batch_size;
        }
        if self.resume {
            config.training.resume = true;
        }
        config.validate().context("invalid pipeline config")?;
        Ok(config)
    }
}

pub fn run(args: &TrainArgs) -> Result<()> {
    let config = args.pipeline()?;
    let canonicalizer = Canonicalizer::new(config.canonical)?;

    let report = load_sources(&args.data, &canonicalizer, config.max_length)
        .context("loading training data")?;
    log_skipped(&report);
    let samples = report
        .into_samples()
        .context("no usable training samples")?;

    info!(
        samples = samples.len(),
        epochs = config.training.epochs,
        batch_size = config.training.batch_size,
        out = %args.out.display(),
        "starting training"
    );

    let outcome = train(config, &samples, &args.out).context("training failed")?;

    let metrics_path = outcome.artifact_dir.join(METRICS_FILE);
    std::fs::write(&metrics_path, serde_json::to_vec_pretty(&outcome.metrics)?)
        .with_context(|| format!("writing {}", metrics_path.display()))?;

    println!("{}", outcome.metrics.summary());
    println!("artifact: {}", outcome.artifact_dir.display());
    Ok(())
}

/// Reports skipped files: a count at warn, each file at debug.
pub fn log_skipped(report: &LoadReport) {
    if report.skipped.is_empty() {
        return;
    }
    warn!(
        loaded = report.len(),
        skipped = report.skipped.len(),
        "some files were skipped"
    );
    for skipped in &report.skipped {
        debug!(path = %skipped.path.display(), reason = ?skipped.reason, "skipped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> TrainArgs {
        TrainArgs {
            data: vec![PathBuf::from("raw")],
            out: PathBuf::from("out"),
            epochs: None,
            batch_size: None,
            config: None,
            resume: false,
        }
    }

    #[test]
    fn defaults_without_overrides() {
        let config = args().pipeline().unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        let mut base = PipelineConfig::default();
        base.training.epochs = 7;
        base.training.batch_size = 8;
        base.save(&path).unwrap();

        let mut a = args();
        a.config = Some(path);
        a.batch_size = Some(16);
        a.resume = true;
        let config = a.pipeline().unwrap();
        assert_eq!(config.training.epochs, 7);
        assert_eq!(config.training.batch_size, 16);
        assert!(config.training.resume);
    }

    #[test]
    fn rejects_invalid_overrides() {
        let mut a = args();
        a.batch_size = Some(0);
        assert!(a.pipeline().is_err());
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let mut a = args();
        a.config = Some(PathBuf::from("/nonexistent/pipeline.json"));
        assert!(a.pipeline().is_err());
    }
}
