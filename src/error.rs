//! Custom error types for the fitting library.
//!
//! This module defines `FitError`, the single error type returned by every
//! public operation in the crate. Using the `thiserror` crate, it provides a
//! consistent way to report the handful of ways a fit can go wrong.
//!
//! ## Error Hierarchy
//!
//! - **`InvalidInput`**: malformed shapes, such as an odd-length IQ series or a
//!   power array whose length differs from the frequency axis.
//! - **`InsufficientData`**: fewer points than the minimum required for a
//!   stable fit (16 by default).
//! - **`FitConvergence`**: the nonlinear solver failed, or the bounds derived
//!   from the initial guesses are inconsistent (lower above upper).
//! - **`DegenerateInput`**: the data reached a near-singular condition, for
//!   example a coupling-coefficient denominator close to zero.
//! - **`Config`** / **`Configuration`**: loading or validating `FitSettings`.
//!
//! None of these are caught inside the crate. Callers in the instrument layer
//! decide whether a failure becomes a sentinel record.

use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type FitResult<T> = std::result::Result<T, FitError>;

/// Every way a fit, conversion or configuration load can fail.
#[derive(Error, Debug)]
pub enum FitError {
    /// Malformed shapes or values supplied by the caller.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Too few points for the requested fit.
    #[error("Not enough points to fit, need {needed}, got {got}")]
    InsufficientData {
        /// Minimum number of points the fit requires.
        needed: usize,
        /// Number of points actually supplied.
        got: usize,
    },

    /// The solver did not converge or its bounds were inconsistent.
    #[error("Fit did not converge: {0}")]
    FitConvergence(String),

    /// A near-singular numerical condition was hit.
    #[error("Degenerate input: {0}")]
    DegenerateInput(String),

    /// The configuration sources could not be parsed.
    #[error("Configuration error: {0}")]
    Config(Box<figment::Error>),

    /// The configuration parsed but holds inconsistent values.
    #[error("Configuration validation error: {0}")]
    Configuration(String),
}

impl From<figment::Error> for FitError {
    fn from(value: figment::Error) -> Self {
        FitError::Config(Box::new(value))
    }
}

/// Fails with `InvalidInput` unless both axes have the same length.
pub(crate) fn ensure_same_len(frequencies: usize, values: usize) -> FitResult<()> {
    if frequencies != values {
        return Err(FitError::InvalidInput(format!(
            "point count not right nfreqs {frequencies} npows {values}"
        )));
    }
    Ok(())
}

/// Fails with `InsufficientData` when fewer than `needed` points are present.
pub(crate) fn ensure_min_points(got: usize, needed: usize) -> FitResult<()> {
    if got < needed {
        return Err(FitError::InsufficientData { needed, got });
    }
    Ok(())
}
