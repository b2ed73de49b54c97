//! # Resonance Fit
//!
//! Lineshape fitting for microwave cavity spectra taken with a network
//! analyzer or an RFSoC tone comb. Given a spectrum and its frequency axis,
//! the fits recover the resonant frequency, quality factor, coupling and
//! noise floor, and report them as a flat record the instrument layer can
//! serialize.
//!
//! ## Crate Structure
//!
//! - **`data`**: IQ/power conversion and the numeric helpers (median, trimmed
//!   tails, phase unwrapping, interpolation) the guesses rely on.
//! - **`fit`**: lineshapes, initial guesses, the bounded Levenberg–Marquardt
//!   engine with penalty priors, and the network-analyzer, RFSoC and sidecar
//!   fits built on them.
//! - **`peaks`**: widescan peak clustering.
//! - **`tones`**: RFSoC tone extraction and per-path fits.
//! - **`na_log`**: dispatching a logged network-analyzer row to its fit.
//! - **`measurement`**: the `MeasurementType` and `CavityModel` selectors.
//! - **`error`**: the `FitError` enum returned by every fallible operation.
//! - **`config`**: `FitSettings`, loaded with Figment from TOML and the
//!   environment.
//! - **`logging`**: `tracing-subscriber` setup for callers without their own.
//!
//! Every fit is a pure function of its inputs. Nothing is retried and no
//! failure is replaced by a placeholder; the caller decides what a failed fit
//! becomes.
//!
//! ```
//! use resonance_fit::data::stats::linspace;
//! use resonance_fit::fit::lineshape::transmission_power_shape;
//! use resonance_fit::fit_transmission;
//!
//! let freqs = linspace(600e6, 700e6, 101);
//! let powers: Vec<f64> = freqs
//!     .iter()
//!     .map(|&f| transmission_power_shape(f, 1.0, 650e6, 50.0, 0.0))
//!     .collect();
//! let fit = fit_transmission(&powers, &freqs)?;
//! assert!((fit.params.f0 - 650e6).abs() < 650e3);
//! let record = fit.to_record();
//! assert!(record.contains_key("fit_Q"));
//! # Ok::<(), resonance_fit::FitError>(())
//! ```

pub mod config;
pub mod data;
pub mod error;
pub mod fit;
pub mod logging;
pub mod measurement;
pub mod na_log;
pub mod peaks;
pub mod tones;

pub use config::FitSettings;
pub use error::{FitError, FitResult};
pub use fit::{
    fit_reflection, fit_rfsoc, fit_transmission, sidecar_fit_reflection,
    sidecar_fit_transmission, FitOutcome, FitRecord,
};
pub use measurement::{CavityModel, MeasurementType};
pub use na_log::{fit_na_log, NaFit, NaLogEntry};
pub use peaks::find_peaks;
pub use tones::{analyze_tone_spectrum, ToneAnalysis};
