//! `captcha accept`

use std::path::Path;

use anyhow::{Context, Result};
use captcha_dataset::GoldStore;
use captcha_solver::CaptchaInput;
use tracing::info;

pub fn run(gold: &Path, label: &str, input: &str) -> Result<()> {
    let input = CaptchaInput::from_arg(input);
    let bytes = input.bytes()?;

    let store = GoldStore::open(gold)
        .with_context(|| format!("opening gold store {}", gold.display()))?;
    let path = store.record(&bytes, label)?;

    info!(path = %path.display(), label, "stored gold sample");
    println!("{}", path.display());
    Ok(())
}
