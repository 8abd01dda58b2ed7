//! `captcha` - train, run and inspect CAPTCHA recognition models.
//!
//! # Commands
//!
//! - `captcha train --data <dir>... --out <dir>` - Train and publish an artifact
//! - `captcha predict --model <dir> <image|base64>...` - Decode challenges
//! - `captcha evaluate --model <dir> --data <dir>...` - Exact-match accuracy
//! - `captcha inspect --data <dir>...` - Dataset summary as JSON
//! - `captcha accept --gold <dir> --label <text> <image|base64>` - Store a
//!   confirmed answer for retraining
//!
//! Logging goes to stderr and honors `RUST_LOG` (default `info`).

mod accept;
mod evaluate;
mod inspect;
mod predict;
mod train;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// CAPTCHA sequence recognition
#[derive(Debug, Parser)]
#[command(name = "captcha")]
#[command(about = "Train and run CAPTCHA recognition models", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Train a model and publish it as an artifact directory
    Train(train::TrainArgs),

    /// Decode one or more challenge images
    Predict {
        /// Artifact directory
        #[arg(long)]
        model: PathBuf,

        /// Image files or base64 strings (data URLs accepted)
        #[arg(name = "INPUT", required = true)]
        inputs: Vec<String>,
    },

    /// Measure exact-match accuracy on labeled images
    Evaluate {
        /// Artifact directory
        #[arg(long)]
        model: PathBuf,

        /// Labeled image directories
        #[arg(long = "data", required = true, num_args = 1..)]
        data: Vec<PathBuf>,

        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Summarize labeled image directories
    Inspect {
        /// Labeled image directories
        #[arg(long = "data", required = true, num_args = 1..)]
        data: Vec<PathBuf>,

        /// Expected label length
        #[arg(long, default_value_t = 4)]
        length: usize,

        /// Pipeline config whose canonicalization is applied
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Store a confirmed answer as a gold training sample
    Accept {
        /// Gold sample directory
        #[arg(long)]
        gold: PathBuf,

        /// Confirmed text
        #[arg(long)]
        label: String,

        /// Image file or base64 string
        #[arg(name = "INPUT")]
        input: String,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Commands::Train(args) => train::run(&args),
        Commands::Predict { model, inputs } => predict::run(&model, &inputs),
        Commands::Evaluate { model, data, json } => evaluate::run(&model, &data, json),
        Commands::Inspect {
            data,
            length,
            config,
        } => inspect::run(&data, length, config.as_deref()),
        Commands::Accept { gold, label, input } => accept::run(&gold, &label, &input),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_train() {
        let cli = Cli::try_parse_from([
            "captcha", "train", "--data", "raw", "gold", "--out", "models/x", "--epochs", "5",
        ])
        .unwrap();
        let Commands::Train(args) = cli.command else {
            panic!("expected train");
        };
        assert_eq!(args.data, vec![PathBuf::from("raw"), PathBuf::from("gold")]);
        assert_eq!(args.out, PathBuf::from("models/x"));
        assert_eq!(args.epochs, Some(5));
        assert_eq!(args.batch_size, None);
    }

    #[test]
    fn parses_predict_inputs() {
        let cli = Cli::try_parse_from(["captcha", "predict", "--model", "m", "a.png", "QUJD"])
            .unwrap();
        let Commands::Predict { inputs, .. } = cli.command else {
            panic!("expected predict");
        };
        assert_eq!(inputs.len(), 2);
    }

    #[test]
    fn predict_requires_input() {
        assert!(Cli::try_parse_from(["captcha", "predict", "--model", "m"]).is_err());
    }

    #[test]
    fn inspect_defaults() {
        let cli = Cli::try_parse_from(["captcha", "inspect", "--data", "raw"]).unwrap();
        let Commands::Inspect { length, config, .. } = cli.command else {
            panic!("expected inspect");
        };
        assert_eq!(length, 4);
        assert!(config.is_none());
    }
}
