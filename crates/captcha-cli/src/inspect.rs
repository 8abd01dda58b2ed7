//! `captcha inspect`

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use captcha_dataset::{Canonicalizer, DatasetSummary, load_sources};
use captcha_training::PipelineConfig;
use tracing::warn;

use crate::train::log_skipped;

pub fn run(data: &[PathBuf], length: usize, config: Option<&Path>) -> Result<()> {
    let params = match config {
        Some(path) => {
            PipelineConfig::load(path)
                .with_context(|| format!("reading config {}", path.display()))?
                .canonical
        }
        None => PipelineConfig::default().canonical,
    };
    let canonicalizer = Canonicalizer::new(params)?;

    let report = load_sources(data, &canonicalizer, length).context("loading data")?;
    log_skipped(&report);

    let summary = DatasetSummary::from_samples(&report.samples, params.foreground_value());
    if summary.looks_inverted() {
        warn!(
            ratio = summary.mean_foreground_ratio,
            "most pixels are foreground; source polarity may be inverted"
        );
    }
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
