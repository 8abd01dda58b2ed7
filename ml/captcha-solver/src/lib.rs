//! CAPTCHA inference service.
//!
//! - [`CaptchaSolver`] - Loads a model artifact once and answers challenges
//! - [`SolverStatus`] - `Unloaded`, `Loaded` or `Failed(reason)`
//! - [`CaptchaInput`] - Raw bytes, base64 / data URL text, or a file path
//!
//! A solver that is not loaded returns [`SolverError::NotAvailable`] instead
//! of a guess. Image problems surface as [`SolverError::ImageDecode`] or
//! [`SolverError::InvalidDimensions`]; [`SolverError::is_recoverable`] tells
//! the caller a fresh challenge may succeed.
//!
//! Decoded text may be shorter than the trained label length. Rejecting such
//! answers is the caller's policy.

#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod error;
mod input;
mod solver;

pub use error::{Result, SolverError};
pub use input::{CaptchaInput, decode_base64, strip_data_url};
pub use solver::{CaptchaSolver, SolverStatus};
