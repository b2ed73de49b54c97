//! Resonance fitting.
//!
//! Every fit follows the same path: guard the input, guess a starting point
//! from the data, run the bounded Levenberg–Marquardt engine in [`solver`]
//! with the model's priors, and return a [`FitOutcome`].
//!
//! - [`network_analyzer`]: transmission power and reflection IQ fits.
//! - [`rfsoc`]: cavity and cavity + JPA power fits on tone-comb data.
//! - [`sidecar`]: plain Lorentzian fits with coupling extraction.
pub mod deconvolution;
pub mod guess;
pub mod lineshape;
pub mod network_analyzer;
pub mod outcome;
pub mod priors;
pub mod rfsoc;
pub mod sidecar;
pub mod solver;

pub use network_analyzer::{
    fit_reflection, fit_reflection_with, fit_transmission, fit_transmission_with,
    ReflectionIqParams, TransmissionParams,
};
pub use outcome::{FitOutcome, FitParams, FitRecord};
pub use priors::{Limit, Prior, Stiffness};
pub use rfsoc::{fit_rfsoc, fit_rfsoc_with, CavityParams, JpaParams, RfsocFit};
pub use sidecar::{
    sidecar_fit_reflection, sidecar_fit_reflection_with, sidecar_fit_transmission,
    sidecar_fit_transmission_with, SidecarReflectionParams, SidecarTransmissionParams,
};
pub use solver::{Bounds, LeastSquares, Solution, Termination};
