//! `captcha evaluate`

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use captcha_dataset::{Canonicalizer, load_sources};
use captcha_models::InferenceBackend;
use captcha_solver::CaptchaSolver;
use captcha_training::evaluate;

use crate::train::log_skipped;

pub fn run(model: &Path, data: &[PathBuf], json: bool) -> Result<()> {
    let solver: CaptchaSolver<InferenceBackend> = CaptchaSolver::open(model, Default::default());
    if !solver.status().is_loaded() {
        bail!("model {}: {}", model.display(), solver.status());
    }
    let metadata = solver
        .metadata()
        .ok_or_else(|| anyhow!("model {} has no metadata", model.display()))?;

    // Samples go through the artifact's own canonicalization.
    let canonicalizer = Canonicalizer::new(metadata.canonical)?;
    let report = load_sources(data, &canonicalizer, metadata.max_length)
        .context("loading evaluation data")?;
    log_skipped(&report);
    let samples = report.into_samples().context("no usable evaluation samples")?;

    let report = evaluate(|image| solver.predict(image), &samples)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report.summary());
        for mismatch in &report.mismatches {
            let source = mismatch
                .source
                .as_ref()
                .map_or_else(String::new, |p| format!("  ({})", p.display()));
            println!("  {} -> {}{source}", mismatch.expected, mismatch.predicted);
        }
    }
    Ok(())
}
