//! `captcha predict`

use std::path::Path;

use anyhow::{Result, bail};
use captcha_solver::{CaptchaInput, CaptchaSolver};
use tracing::warn;

pub fn run(model: &Path, inputs: &[String]) -> Result<()> {
    let solver: CaptchaSolver = CaptchaSolver::open(model, Default::default());
    if !solver.status().is_loaded() {
        bail!("model {}: {}", model.display(), solver.status());
    }
    let expected = solver.expected_length();

    let mut failures = 0usize;
    for arg in inputs {
        let input = CaptchaInput::from_arg(arg);
        match solver.solve(&input) {
            Ok(prediction) => {
                if expected.is_some_and(|n| !prediction.has_length(n)) {
                    warn!(input = %input.describe(), text = %prediction.text, "unexpected length");
                }
                println!("{}\t{}", input.describe(), prediction.text);
            }
            Err(e) => {
                failures += 1;
                warn!(input = %input.describe(), error = %e, "could not solve");
                println!("{}\t<error: {e}>", input.describe());
            }
        }
    }

    if failures > 0 {
        bail!("{failures} of {} inputs failed", inputs.len());
    }
    Ok(())
}
