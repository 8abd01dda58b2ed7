//! Per-epoch and per-run training metrics.

use serde::{Deserialize, Serialize};

/// What one epoch produced.
///
/// # Example
///
/// ```
/// use captcha_training::EpochMetrics;
///
/// let metrics = EpochMetrics::new(0, 5.2)
///     .with_validation(4.8, 0.25, 30)
///     .with_learning_rate(1e-3);
/// assert_eq!(metrics.val_accuracy, Some(0.25));
/// assert!((metrics.monitored_loss() - 4.8).abs() < 1e-6);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// Zero-based epoch.
    pub epoch: usize,

    /// Mean CTC loss over training batches.
    pub train_loss: f32,

    /// Mean CTC loss on the held-out labels.
    pub val_loss: Option<f32>,

    /// Exact-match accuracy on the held-out labels after greedy decoding.
    pub val_accuracy: Option<f32>,

    /// Effective learning rate (schedule times plateau scale).
    pub learning_rate: f64,

    /// Samples trained on.
    pub train_samples: usize,

    /// Samples validated on.
    #[serde(default)]
    pub val_samples: usize,

    /// Wall time for the epoch, including validation.
    pub elapsed_secs: f32,
}

impl EpochMetrics {
    /// Metrics for an epoch with only a training loss so far.
    #[must_use]
    pub const fn new(epoch: usize, train_loss: f32) -> Self {
        Self {
            epoch,
            train_loss,
            val_loss: None,
            val_accuracy: None,
            learning_rate: 0.0,
            train_samples: 0,
            val_samples: 0,
            elapsed_secs: 0.0,
        }
    }

    /// Records the validation pass.
    #[must_use]
    pub const fn with_validation(mut self, loss: f32, accuracy: f32, samples: usize) -> Self {
        self.val_loss = Some(loss);
        self.val_accuracy = Some(accuracy);
        self.val_samples = samples;
        self
    }

    /// Sets the learning rate.
    #[must_use]
    pub const fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    /// Sets the training sample count.
    #[must_use]
    pub const fn with_train_samples(mut self, samples: usize) -> Self {
        self.train_samples = samples;
        self
    }

    /// Sets the wall time.
    #[must_use]
    pub const fn with_elapsed(mut self, secs: f32) -> Self {
        self.elapsed_secs = secs;
        self
    }

    /// Loss the schedulers watch: validation loss, else training loss.
    #[must_use]
    pub fn monitored_loss(&self) -> f32 {
        self.val_loss.unwrap_or(self.train_loss)
    }
}

/// The whole run.
///
/// # Example
///
/// ```
/// use captcha_training::{EpochMetrics, TrainingMetrics};
///
/// let mut run = TrainingMetrics::default();
/// run.add_epoch(EpochMetrics::new(0, 12.0).with_validation(11.0, 0.0, 10));
/// run.add_epoch(EpochMetrics::new(1, 8.0).with_validation(9.5, 0.4, 10));
///
/// assert_eq!(run.epochs_completed(), 2);
/// assert_eq!(run.best_epoch(), Some(1));
/// assert_eq!(run.best_val_accuracy(), Some(0.4));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    /// One entry per completed epoch.
    pub epoch_metrics: Vec<EpochMetrics>,

    /// Set when early stopping ended the run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,

    /// Epoch whose weights were published as final.
    pub restored_epoch: Option<usize>,
}

impl TrainingMetrics {
    /// Appends an epoch.
    pub fn add_epoch(&mut self, metrics: EpochMetrics) {
        self.epoch_metrics.push(metrics);
    }

    /// Number of completed epochs.
    #[must_use]
    pub fn epochs_completed(&self) -> usize {
        self.epoch_metrics.len()
    }

    /// Epoch with the lowest monitored loss; the earliest wins ties.
    #[must_use]
    pub fn best_epoch(&self) -> Option<usize> {
        self.epoch_metrics
            .iter()
            .min_by(|a, b| a.monitored_loss().total_cmp(&b.monitored_loss()))
            .map(|m| m.epoch)
    }

    /// Lowest monitored loss.
    #[must_use]
    pub fn best_loss(&self) -> Option<f32> {
        self.epoch_metrics
            .iter()
            .map(EpochMetrics::monitored_loss)
            .reduce(f32::min)
    }

    /// Highest validation accuracy over all epochs.
    #[must_use]
    pub fn best_val_accuracy(&self) -> Option<f32> {
        self.epoch_metrics
            .iter()
            .filter_map(|m| m.val_accuracy)
            .reduce(f32::max)
    }

    /// Training loss per epoch.
    #[must_use]
    pub fn train_losses(&self) -> Vec<f32> {
        self.epoch_metrics.iter().map(|m| m.train_loss).collect()
    }

    /// Sum of epoch wall times.
    #[must_use]
    pub fn elapsed_secs(&self) -> f32 {
        self.epoch_metrics.iter().map(|m| m.elapsed_secs).sum()
    }

    /// Whether early stopping ended the run.
    #[must_use]
    pub const fn early_stopped(&self) -> bool {
        self.stop_reason.is_some()
    }

    /// Records why the run ended early.
    pub fn set_early_stopped(&mut self, reason: impl Into<String>) {
        self.stop_reason = Some(reason.into());
    }

    /// Multi-line report for the terminal.
    #[must_use]
    #[allow(clippy::let_underscore_must_use)]
    pub fn summary(&self) -> String {
        use std::fmt::Write;

        let mut s = String::new();
        let _ = writeln!(
            s,
            "{} epochs in {:.1}s",
            self.epochs_completed(),
            self.elapsed_secs()
        );
        if let (Some(first), Some(last)) = (self.epoch_metrics.first(), self.epoch_metrics.last()) {
            let _ = writeln!(
                s,
                "train loss {:.4} -> {:.4}",
                first.train_loss, last.train_loss
            );
        }
        if let (Some(epoch), Some(loss)) = (self.best_epoch(), self.best_loss()) {
            let _ = writeln!(s, "best loss {loss:.4} at epoch {epoch}");
        }
        if let Some(acc) = self.best_val_accuracy() {
            let _ = writeln!(s, "best sequence accuracy {:.1}%", acc * 100.0);
        }
        if let Some(epoch) = self.restored_epoch {
            let _ = writeln!(s, "published weights from epoch {epoch}");
        }
        if let Some(reason) = &self.stop_reason {
            let _ = writeln!(s, "stopped early: {reason}");
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn monitored_loss_prefers_validation() {
        let trained = EpochMetrics::new(0, 3.0);
        assert_relative_eq!(trained.monitored_loss(), 3.0);
        assert_relative_eq!(trained.with_validation(2.0, 0.1, 5).monitored_loss(), 2.0);
    }

    #[test]
    fn best_epoch_tracks_lowest_loss() {
        let mut run = TrainingMetrics::default();
        run.add_epoch(EpochMetrics::new(0, 10.0).with_validation(9.0, 0.0, 4).with_elapsed(4.0));
        run.add_epoch(EpochMetrics::new(1, 6.0).with_validation(5.0, 0.5, 4).with_elapsed(4.0));
        run.add_epoch(EpochMetrics::new(2, 4.0).with_validation(5.5, 0.25, 4).with_elapsed(4.0));

        assert_eq!(run.best_epoch(), Some(1));
        assert_relative_eq!(run.best_loss().unwrap(), 5.0);
        assert_eq!(run.best_val_accuracy(), Some(0.5));
        assert_relative_eq!(run.elapsed_secs(), 12.0);
        assert_eq!(run.train_losses(), vec![10.0, 6.0, 4.0]);
    }

    #[test]
    fn ties_keep_the_earliest_epoch() {
        let mut run = TrainingMetrics::default();
        run.add_epoch(EpochMetrics::new(0, 2.0));
        run.add_epoch(EpochMetrics::new(1, 2.0));
        assert_eq!(run.best_epoch(), Some(0));
    }

    #[test]
    fn empty_run() {
        let run = TrainingMetrics::default();
        assert_eq!(run.best_epoch(), None);
        assert_eq!(run.best_val_accuracy(), None);
        assert!(!run.early_stopped());
        assert!(run.summary().starts_with("0 epochs"));
    }

    #[test]
    fn summary_mentions_stop_and_accuracy() {
        let mut run = TrainingMetrics::default();
        run.add_epoch(EpochMetrics::new(0, 8.0).with_validation(7.0, 0.75, 8));
        run.restored_epoch = Some(0);
        run.set_early_stopped("no improvement for 10 epochs");

        assert!(run.early_stopped());
        let summary = run.summary();
        assert!(summary.contains("best sequence accuracy 75.0%"));
        assert!(summary.contains("published weights from epoch 0"));
        assert!(summary.contains("stopped early: no improvement"));
    }

    #[test]
    fn serializes_to_json() {
        let mut run = TrainingMetrics::default();
        run.add_epoch(EpochMetrics::new(0, 0.5).with_validation(0.4, 0.9, 3));

        let json = serde_json::to_value(&run).unwrap();
        assert_eq!(json["epoch_metrics"][0]["val_samples"], 3);
        assert!(json.get("stop_reason").is_none());
        let parsed: TrainingMetrics = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, run);
    }
}
