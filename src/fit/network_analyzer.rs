//! Network-analyzer fits: transmission power and reflection IQ.
//!
//! Both fits derive their starting point, prior ranges and per-point
//! uncertainty from the data itself (see [`guess`](super::guess)):
//!
//! - the resonance is assumed to lie inside the swept band,
//! - the band spans between 1 and `q_span` linewidths,
//! - the outer 10% at each end of the band is resonance-free and sets the
//!   noise level and the uncertainty.

use super::guess::{guess_reflection, guess_transmission};
use super::lineshape::{reflection_iq_shape_unloaded, transmission_power_shape};
use super::outcome::{FitOutcome, FitParams};
use super::priors::{Limit, Prior};
use super::solver::{Bounds, LeastSquares};
use crate::config::FitSettings;
use crate::error::{ensure_min_points, ensure_same_len, FitError, FitResult};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::{debug, info, instrument};

/// Fitted transmission parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransmissionParams {
    /// Peak normalization.
    pub norm: f64,
    /// Resonant frequency.
    pub f0: f64,
    /// Loaded quality factor.
    pub q: f64,
    /// Noise floor as a fraction of `norm`.
    pub noise: f64,
}

impl FitParams for TransmissionParams {
    fn record_fields(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("fit_norm", self.norm),
            ("fit_f0", self.f0),
            ("fit_Q", self.q),
            ("fit_noise", self.noise),
        ]
    }
}

/// Fitted reflection IQ parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReflectionIqParams {
    /// Magnitude normalization.
    pub norm: f64,
    /// Overall phase.
    pub phase: f64,
    /// Resonant frequency.
    pub f0: f64,
    /// Loaded quality factor.
    pub q: f64,
    /// Coupling coefficient.
    pub beta: f64,
    /// Line delay in rad/Hz.
    pub delay_time: f64,
    /// Measured power at the dip over the off-resonance power.
    pub dip_depth: f64,
}

impl FitParams for ReflectionIqParams {
    fn record_fields(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("fit_norm", self.norm),
            ("fit_phase", self.phase),
            ("fit_f0", self.f0),
            ("fit_Q", self.q),
            ("fit_beta", self.beta),
            ("fit_delay_time", self.delay_time),
            ("dip_depth", self.dip_depth),
        ]
    }
}

fn band_edges(frequencies: &[f64]) -> FitResult<(f64, f64)> {
    match (frequencies.first(), frequencies.last()) {
        (Some(&first), Some(&last)) => Ok((first, last)),
        _ => Err(FitError::InvalidInput("empty frequency axis".into())),
    }
}

/// Fits a transmission power spectrum with default settings.
pub fn fit_transmission(
    powers: &[f64],
    frequencies: &[f64],
) -> FitResult<FitOutcome<TransmissionParams>> {
    fit_transmission_with(powers, frequencies, &FitSettings::default())
}

/// Fits `norm · (1/(1+4δ²) + noise)` to a transmission power spectrum.
///
/// Priors: `f0` hard-limited to the band, `Q` hard-limited to
/// `[f0/band, k·f0/band]`, noise hard-limited below at zero and softly above
/// at `noise_max`.
///
/// # Errors
///
/// - `InvalidInput` when the two slices differ in length.
/// - `InsufficientData` below `guards.min_points` points.
/// - `DegenerateInput` when the spectrum holds no positive power.
/// - `FitConvergence` when the solver fails.
#[instrument(skip_all, fields(n_points = frequencies.len()))]
pub fn fit_transmission_with(
    powers: &[f64],
    frequencies: &[f64],
    settings: &FitSettings,
) -> FitResult<FitOutcome<TransmissionParams>> {
    ensure_same_len(frequencies.len(), powers.len())?;
    ensure_min_points(frequencies.len(), settings.guards.min_points)?;
    let (first, last) = band_edges(frequencies)?;

    let guess = guess_transmission(frequencies, powers, settings)?;
    debug!(
        norm = guess.norm,
        f0 = guess.f0,
        q = guess.q,
        q_min = guess.q_min,
        q_max = guess.q_max,
        noise = guess.noise,
        uncertainty = guess.uncertainty,
        low_response = guess.low_response,
        "transmission guess"
    );

    let priors = vec![
        Prior::hard_range(1, first, last, guess.f0),
        Prior::hard_range(2, guess.q_min, guess.q_max, guess.q_min),
        Prior::between(
            3,
            Limit::hard(0.0, 1.0),
            Limit::soft(settings.transmission.noise_max, 1.0),
        ),
    ];
    let model = |p: &[f64]| -> Vec<f64> {
        frequencies
            .iter()
            .map(|&f| transmission_power_shape(f, p[0], p[1], p[2], p[3]))
            .collect()
    };
    let solution = LeastSquares::new(model, powers, vec![guess.uncertainty; powers.len()])
        .with_priors(priors)
        .solve(&[guess.norm, guess.f0, guess.q, guess.noise], &settings.solver)?;

    let p = solution.params.as_slice();
    let params = TransmissionParams {
        norm: p[0],
        f0: p[1],
        q: p[2],
        noise: p[3],
    };
    let reduced_chisq = solution.reduced_chisq();
    info!(
        norm = params.norm,
        f0 = params.f0,
        q = params.q,
        noise = params.noise,
        reduced_chisq,
        "transmission fit"
    );
    Ok(FitOutcome {
        fit_shape: model(p),
        params,
        reduced_chisq,
        iterations: solution.iterations,
    })
}

/// Fits a reflection IQ sweep with default settings.
pub fn fit_reflection(
    iq: &[f64],
    frequencies: &[f64],
) -> FitResult<FitOutcome<ReflectionIqParams>> {
    fit_reflection_with(iq, frequencies, &FitSettings::default())
}

/// Fits the complex reflection coefficient to an interleaved IQ sweep.
///
/// Uses [`reflection_iq_shape_unloaded`] with box bounds `norm ≥ 0`,
/// `phase ∈ [−π, π]`, `f0` in band, `Q ∈ [Q_min, q_span·Q_min]`,
/// `beta ∈ [0, beta_max]` and `|delay| ≤ delay_max`.
///
/// # Errors
///
/// - `InvalidInput` on an odd-length series or when it does not hold one
///   pair per frequency.
/// - `InsufficientData` below `guards.min_points` points.
/// - `DegenerateInput` when the off-resonance power is not positive.
/// - `FitConvergence` when the solver fails.
#[instrument(skip_all, fields(n_points = frequencies.len()))]
pub fn fit_reflection_with(
    iq: &[f64],
    frequencies: &[f64],
    settings: &FitSettings,
) -> FitResult<FitOutcome<ReflectionIqParams>> {
    if iq.len() % 2 != 0 {
        return Err(FitError::InvalidInput(format!(
            "IQ series must have even length, got {}",
            iq.len()
        )));
    }
    ensure_same_len(frequencies.len(), iq.len() / 2)?;
    ensure_min_points(frequencies.len(), settings.guards.min_points)?;
    let (first, last) = band_edges(frequencies)?;

    let guess = guess_reflection(frequencies, iq, settings)?;
    debug!(
        norm = guess.norm,
        phase = guess.phase,
        f0 = guess.f0,
        q = guess.q,
        q_min = guess.q_min,
        q_max = guess.q_max,
        uncertainty = guess.uncertainty,
        "reflection guess"
    );

    let cfg = &settings.reflection;
    let bounds = Bounds::new(
        vec![0.0, -PI, first, guess.q_min, 0.0, -cfg.delay_max],
        vec![f64::INFINITY, PI, last, guess.q_max, cfg.beta_max, cfg.delay_max],
    )?;
    let model = |p: &[f64]| -> Vec<f64> {
        frequencies
            .iter()
            .flat_map(|&f| {
                let z = reflection_iq_shape_unloaded(f, p[0], p[1], p[2], p[3], p[4], p[5]);
                [z.re, z.im]
            })
            .collect()
    };
    let p0 = [
        guess.norm,
        guess.phase,
        guess.f0,
        guess.q,
        guess.beta,
        guess.delay_time,
    ];
    let solution = LeastSquares::new(model, iq, vec![guess.uncertainty; iq.len()])
        .with_bounds(bounds)
        .solve(&p0, &settings.solver)?;

    let p = solution.params.as_slice();
    let params = ReflectionIqParams {
        norm: p[0],
        phase: p[1],
        f0: p[2],
        q: p[3],
        beta: p[4],
        delay_time: p[5],
        dip_depth: guess.dip_depth,
    };
    let reduced_chisq = solution.reduced_chisq();
    info!(
        norm = params.norm,
        phase = params.phase,
        f0 = params.f0,
        q = params.q,
        beta = params.beta,
        delay_time = params.delay_time,
        dip_depth = params.dip_depth,
        reduced_chisq,
        "reflection fit"
    );
    Ok(FitOutcome {
        fit_shape: model(p),
        params,
        reduced_chisq,
        iterations: solution.iterations,
    })
}
