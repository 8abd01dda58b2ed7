//! Connectionist temporal classification loss.
//!
//! The forward (alpha) recursion runs in log space over the extended label
//! `_ l1 _ l2 _ ... lL _` of length `S = 2 * Lmax + 1`. Each step is a handful
//! of batched tensor ops, so Burn's autodiff provides the backward pass.
//!
//! From state `s` a path may stay on `s`, advance to `s + 1`, or skip the
//! blank to `s + 2` when the label characters on either side differ. A
//! labeling ends in its last character or the trailing blank.

use burn::prelude::Backend;
use burn::tensor::{Int, Tensor, TensorData};

use crate::error::{Result, TrainingError};

/// Stand-in for `ln(0)`; finite so masked arithmetic never yields NaN.
pub const LOG_ZERO: f32 = -1e30;

/// Mean CTC loss over the batch.
///
/// - `log_probs`: `[batch, T, C]` log-probabilities (log-softmax output)
/// - `targets`: `[batch, Lmax]` class indices, padded with `blank`
/// - `target_lengths`: true length of each target
///
/// # Errors
///
/// See [`ctc_nll`].
pub fn ctc_loss<B: Backend>(
    log_probs: Tensor<B, 3>,
    targets: Tensor<B, 2, Int>,
    target_lengths: &[usize],
    blank: usize,
) -> Result<Tensor<B, 1>> {
    Ok(ctc_nll(log_probs, targets, target_lengths, blank)?.mean())
}

/// Per-sample negative log-likelihood `-ln p(target | input)`, shape `[batch]`.
///
/// # Errors
///
/// Returns [`TrainingError::Loss`] if shapes disagree, a target holds an
/// out-of-range or blank class inside its length, or a target needs more
/// time steps than `T` (its length plus one per adjacent repeat).
pub fn ctc_nll<B: Backend>(
    log_probs: Tensor<B, 3>,
    targets: Tensor<B, 2, Int>,
    target_lengths: &[usize],
    blank: usize,
) -> Result<Tensor<B, 1>> {
    let device = log_probs.device();
    let [batch, steps, classes] = log_probs.dims();
    let [target_batch, max_len] = targets.dims();

    if target_batch != batch || target_lengths.len() != batch {
        return Err(TrainingError::loss(format!(
            "batch of {batch} outputs, {target_batch} targets, {} lengths",
            target_lengths.len()
        )));
    }
    if max_len == 0 || steps == 0 {
        return Err(TrainingError::loss("empty time or target axis"));
    }
    if blank >= classes {
        return Err(TrainingError::loss(format!(
            "blank {blank} outside {classes} classes"
        )));
    }

    let flat: Vec<i64> = targets.into_data().iter::<i64>().collect();
    let labels = flat
        .chunks(max_len)
        .zip(target_lengths)
        .map(|(row, &len)| trim_target(row, len, blank, classes))
        .collect::<Result<Vec<_>>>()?;

    let lattice = Lattice::build(&labels, max_len, blank, steps)?;
    let states = lattice.states;

    let mut index = Vec::with_capacity(batch * steps * states);
    for row in lattice.extended.chunks(states) {
        for _ in 0..steps {
            index.extend_from_slice(row);
        }
    }
    let index = Tensor::<B, 3, Int>::from_data(TensorData::new(index, [batch, steps, states]), &device);
    let emit = log_probs.gather(2, index);

    let mask = |values: Vec<f32>| {
        Tensor::<B, 2>::from_data(TensorData::new(values, [batch, states]), &device)
    };
    let init = mask(lattice.init);
    let skip = mask(lattice.skip);
    let last = mask(lattice.last);
    let pad1 = Tensor::<B, 2>::full([batch, 1], LOG_ZERO, &device);
    let pad2 = Tensor::<B, 2>::full([batch, 2], LOG_ZERO, &device);

    let emission = |t: usize| {
        emit.clone()
            .slice([0..batch, t..t + 1, 0..states])
            .reshape([batch, states])
    };

    let mut alpha = emission(0) + init;
    for t in 1..steps {
        let advance = Tensor::cat(
            vec![pad1.clone(), alpha.clone().slice([0..batch, 0..states - 1])],
            1,
        );
        let jump = Tensor::cat(
            vec![pad2.clone(), alpha.clone().slice([0..batch, 0..states - 2])],
            1,
        ) + skip.clone();
        let merged = log_sum_exp(Tensor::stack::<3>(vec![alpha, advance, jump], 2), 2);
        alpha = merged.reshape([batch, states]) + emission(t);
    }

    let likelihood = log_sum_exp(alpha + last, 1).reshape([batch]);
    Ok(likelihood.neg())
}

/// `ln(sum(exp(x)))` along `dim`, keeping the reduced axis.
fn log_sum_exp<B: Backend, const D: usize>(x: Tensor<B, D>, dim: usize) -> Tensor<B, D> {
    let max = x.clone().max_dim(dim).detach();
    (x - max.clone()).exp().sum_dim(dim).log() + max
}

fn trim_target(row: &[i64], len: usize, blank: usize, classes: usize) -> Result<Vec<usize>> {
    if len > row.len() {
        return Err(TrainingError::loss(format!(
            "target length {len} exceeds padded width {}",
            row.len()
        )));
    }
    row[..len]
        .iter()
        .map(|&class| match usize::try_from(class) {
            Ok(c) if c < classes && c != blank => Ok(c),
            _ => Err(TrainingError::loss(format!(
                "target class {class} is blank or outside {classes} classes"
            ))),
        })
        .collect()
}

/// Host-side description of the extended-label lattice for one batch.
struct Lattice {
    states: usize,
    /// `[batch, S]` class of each state.
    extended: Vec<i64>,
    /// `[batch, S]` log mask of valid start states.
    init: Vec<f32>,
    /// `[batch, S]` log mask of states reachable by skipping a blank.
    skip: Vec<f32>,
    /// `[batch, S]` log mask of valid final states.
    last: Vec<f32>,
}

impl Lattice {
    #[allow(clippy::cast_possible_wrap)]
    fn build(labels: &[Vec<usize>], max_len: usize, blank: usize, steps: usize) -> Result<Self> {
        let states = 2 * max_len + 1;
        let cells = labels.len() * states;
        let mut lattice = Self {
            states,
            extended: Vec::with_capacity(cells),
            init: vec![LOG_ZERO; cells],
            skip: vec![LOG_ZERO; cells],
            last: vec![LOG_ZERO; cells],
        };

        for (b, label) in labels.iter().enumerate() {
            let repeats = label.windows(2).filter(|w| w[0] == w[1]).count();
            if label.len() + repeats > steps {
                return Err(TrainingError::loss(format!(
                    "target of length {} with {repeats} repeats needs {} steps, only {steps} available",
                    label.len(),
                    label.len() + repeats
                )));
            }

            let class_at = |s: usize| {
                if s % 2 == 1 && s / 2 < label.len() {
                    label[s / 2]
                } else {
                    blank
                }
            };
            let row = b * states;
            let end = 2 * label.len();

            for s in 0..states {
                lattice.extended.push(class_at(s) as i64);
                if s >= 3 && s % 2 == 1 && s < end && class_at(s) != class_at(s - 2) {
                    lattice.skip[row + s] = 0.0;
                }
            }

            lattice.init[row] = 0.0;
            lattice.last[row + end] = 0.0;
            if end > 0 {
                lattice.init[row + 1] = 0.0;
                lattice.last[row + end - 1] = 0.0;
            }
        }

        Ok(lattice)
    }
}
