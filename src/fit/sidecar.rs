//! Sidecar-cavity fits.
//!
//! These fit a plain Lorentzian peak or dip to the measured power with
//! counting-style uncertainty `σ = sqrt(P)` and no priors. The reflection
//! variant then removes the line from the measured phase to get the
//! coupling of the cavity.

use super::deconvolution::{coupling_beta, coupling_sign, deconvolve_line, phase_at};
use super::guess::guess_sidecar_params;
use super::lineshape::{lorentzian_dip, lorentzian_peak};
use super::outcome::{FitOutcome, FitParams};
use super::solver::LeastSquares;
use crate::config::FitSettings;
use crate::data::{repack_iq, stats, to_complex};
use crate::error::{ensure_min_points, ensure_same_len, FitResult};
use crate::measurement::MeasurementType;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

/// Fitted sidecar transmission parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SidecarTransmissionParams {
    /// Peak height above the background.
    pub norm: f64,
    /// Resonant frequency.
    pub f0: f64,
    /// Loaded quality factor.
    pub q: f64,
    /// Background level.
    pub background: f64,
}

impl FitParams for SidecarTransmissionParams {
    fn record_fields(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("fit_norm", self.norm),
            ("fit_f0", self.f0),
            ("fit_Q", self.q),
            ("fit_background", self.background),
        ]
    }
}

/// Fitted sidecar reflection parameters and the derived coupling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SidecarReflectionParams {
    /// Off-resonance power, the line normalization `C`.
    pub norm: f64,
    /// Deconvolved cavity phase at `f0`.
    pub phase: f64,
    /// Resonant frequency.
    pub f0: f64,
    /// Loaded quality factor.
    pub q: f64,
    /// Coupling coefficient.
    pub beta: f64,
    /// Not determined by this fit; always `-1`.
    pub delay_time: f64,
    /// Square root of the fitted power dip.
    pub dip_depth: f64,
}

impl FitParams for SidecarReflectionParams {
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

/// `sqrt(P)` per point, floored so a zero-power sample keeps a finite weight.
fn counting_uncertainty(powers: &[f64], settings: &FitSettings) -> Vec<f64> {
    let scale = powers.iter().fold(0.0_f64, |acc, p| acc.max(p.abs()));
    let floor = settings.guards.min_relative_uncertainty * scale.max(f64::MIN_POSITIVE);
    powers.iter().map(|p| p.max(0.0).sqrt().max(floor)).collect()
}

/// Fits a sidecar transmission peak with default settings.
pub fn sidecar_fit_transmission(
    powers: &[f64],
    frequencies: &[f64],
) -> FitResult<FitOutcome<SidecarTransmissionParams>> {
    sidecar_fit_transmission_with(powers, frequencies, &FitSettings::default())
}

/// Fits `background + norm · L(f)` to a sidecar transmission power spectrum.
#[instrument(skip_all, fields(n_points = frequencies.len()))]
pub fn sidecar_fit_transmission_with(
    powers: &[f64],
    frequencies: &[f64],
    settings: &FitSettings,
) -> FitResult<FitOutcome<SidecarTransmissionParams>> {
    ensure_same_len(frequencies.len(), powers.len())?;
    ensure_min_points(frequencies.len(), settings.guards.min_points)?;

    let guess = guess_sidecar_params(frequencies, powers, MeasurementType::Transmission)?;
    debug!(?guess, "sidecar transmission guess");

    let model = |p: &[f64]| -> Vec<f64> {
        frequencies
            .iter()
            .map(|&f| lorentzian_peak(f, p[0], p[1], p[2], p[3]))
            .collect()
    };
    let solution = LeastSquares::new(model, powers, counting_uncertainty(powers, settings))
        .solve(&guess.to_vec(), &settings.solver)?;

    let p = solution.params.as_slice();
    let params = SidecarTransmissionParams {
        norm: p[2],
        f0: p[0],
        q: p[1],
        background: p[3],
    };
    let reduced_chisq = solution.reduced_chisq();
    info!(
        norm = params.norm,
        f0 = params.f0,
        q = params.q,
        background = params.background,
        reduced_chisq,
        "sidecar transmission fit"
    );
    Ok(FitOutcome {
        fit_shape: model(p),
        params,
        reduced_chisq,
        iterations: solution.iterations,
    })
}

/// Fits a sidecar reflection sweep with default settings.
pub fn sidecar_fit_reflection(
    iq: &[f64],
    frequencies: &[f64],
) -> FitResult<FitOutcome<SidecarReflectionParams>> {
    sidecar_fit_reflection_with(iq, frequencies, &FitSettings::default())
}

/// Fits a Lorentzian dip to `|Γ|²` and derives the cavity coupling.
///
/// The fit shape is reported as an IQ series `[sqrt(P), 0, ...]`.
///
/// # Errors
///
/// - `InvalidInput`/`InsufficientData` for malformed or short input.
/// - `FitConvergence` when the dip fit fails.
/// - `DegenerateInput` when the fitted background is not positive or the
///   coupling denominator vanishes.
#[instrument(skip_all, fields(n_points = frequencies.len()))]
pub fn sidecar_fit_reflection_with(
    iq: &[f64],
    frequencies: &[f64],
    settings: &FitSettings,
) -> FitResult<FitOutcome<SidecarReflectionParams>> {
    let samples = to_complex(iq)?;
    ensure_same_len(frequencies.len(), samples.len())?;
    ensure_min_points(frequencies.len(), settings.guards.min_points)?;

    let mag_sq: Vec<f64> = samples.iter().map(Complex64::norm_sqr).collect();
    let mag: Vec<f64> = mag_sq.iter().map(|p| p.sqrt()).collect();
    let raw_phase: Vec<f64> = samples.iter().map(|z| z.arg()).collect();
    let phase = stats::unwrap_phase(&raw_phase);

    let guess = guess_sidecar_params(frequencies, &mag_sq, MeasurementType::Reflection)?;
    debug!(?guess, "sidecar reflection guess");

    let dip = |f: f64, p: &[f64]| lorentzian_dip(f, p[0], p[1], p[2], p[3]);
    let model = |p: &[f64]| -> Vec<f64> { frequencies.iter().map(|&f| dip(f, p)).collect() };
    let solution = LeastSquares::new(model, &mag_sq, counting_uncertainty(&mag_sq, settings))
        .solve(&guess.to_vec(), &settings.solver)?;
    let p = solution.params.as_slice();
    let (f0, q, depth, c_fit) = (p[0], p[1], p[2], p[3]);

    let deconvolved = deconvolve_line(frequencies, &mag, &phase, c_fit, &settings.deconvolution)?;
    let mag_f0 = (dip(f0, p) / c_fit).max(0.0).sqrt();
    let phase_f0 = phase_at(frequencies, &deconvolved.phase, f0);
    let sign = coupling_sign(f0, frequencies, &deconvolved.phase, &settings.deconvolution);
    let beta = coupling_beta(mag_f0, sign, &settings.deconvolution)
        .inspect_err(|e| warn!(f0, mag_f0, error = %e, "sidecar coupling undefined"))?;

    let shape_mag: Vec<f64> = model(p).into_iter().map(|v| v.max(0.0).sqrt()).collect();
    let fit_shape = repack_iq(&shape_mag, &vec![0.0; shape_mag.len()])?;

    let params = SidecarReflectionParams {
        norm: c_fit,
        phase: phase_f0,
        f0,
        q,
        beta,
        delay_time: -1.0,
        dip_depth: depth.max(0.0).sqrt(),
    };
    let reduced_chisq = solution.reduced_chisq();
    info!(
        norm = params.norm,
        phase = params.phase,
        f0 = params.f0,
        q = params.q,
        beta = params.beta,
        dip_depth = params.dip_depth,
        reduced_chisq,
        "sidecar reflection fit"
    );
    Ok(FitOutcome {
        params,
        reduced_chisq,
        fit_shape,
        iterations: solution.iterations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::from_complex;
    use crate::data::stats::linspace;
    use crate::error::FitError;
    use crate::fit::lineshape::reflection_iq_shape_unloaded;
    use approx::assert_relative_eq;

    const F0: f64 = 5.0e9;

    fn reflection_sweep(beta: f64) -> (Vec<f64>, Vec<f64>) {
        // 1 MHz linewidth, 50 kHz bins, ten linewidths each side
        let freqs = linspace(F0 - 10e6, F0 + 10e6, 401);
        let samples: Vec<_> = freqs
            .iter()
            .map(|&f| reflection_iq_shape_unloaded(f, 0.8, 0.4, F0, 5000.0, beta, 2e-8))
            .collect();
        (freqs, from_complex(&samples))
    }

    #[test]
    fn test_transmission_peak() {
        let freqs = linspace(F0 - 10e6, F0 + 10e6, 201);
        let powers: Vec<f64> = freqs
            .iter()
            .map(|&f| lorentzian_peak(f, F0 + 1e6, 4000.0, 2.0, 0.1))
            .collect();
        let outcome = sidecar_fit_transmission(&powers, &freqs).unwrap();
        let p = outcome.params;
        assert_relative_eq!(p.f0, F0 + 1e6, max_relative = 1e-7);
        assert_relative_eq!(p.q, 4000.0, max_relative = 1e-3);
        assert_relative_eq!(p.norm, 2.0, max_relative = 1e-3);
        assert_relative_eq!(p.background, 0.1, max_relative = 1e-3);
        assert!(outcome.reduced_chisq < 1e-6);
        assert!(outcome.to_record().contains_key("fit_background"));
    }

    #[test]
    fn test_reflection_overcoupled() {
        let (freqs, iq) = reflection_sweep(2.0);
        let outcome = sidecar_fit_reflection(&iq, &freqs).unwrap();
        let p = outcome.params;
        assert_relative_eq!(p.f0, F0, max_relative = 1e-7);
        assert_relative_eq!(p.q, 5000.0, max_relative = 1e-3);
        assert_relative_eq!(p.norm, 0.64, max_relative = 1e-3);
        assert_relative_eq!(p.beta, 2.0, max_relative = 1e-2);
        assert_eq!(p.delay_time, -1.0);
        // depth of |Γ|² is C · 4β/(1+β)²
        assert_relative_eq!(p.dip_depth, (0.64_f64 * 8.0 / 9.0).sqrt(), max_relative = 1e-3);
        assert_eq!(outcome.fit_shape.len(), iq.len());
        assert!(outcome.fit_shape.iter().skip(1).step_by(2).all(|v| *v == 0.0));
    }

    #[test]
    fn test_reflection_undercoupled() {
        let (freqs, iq) = reflection_sweep(0.5);
        let outcome = sidecar_fit_reflection(&iq, &freqs).unwrap();
        assert_relative_eq!(outcome.params.beta, 0.5, max_relative = 1e-2);
    }

    #[test]
    fn test_undefined_coupling_reports_once() {
        let (freqs, iq) = reflection_sweep(2.0);
        let mut settings = FitSettings::default();
        settings.deconvolution.coupling_epsilon = 10.0;
        let err = sidecar_fit_reflection_with(&iq, &freqs, &settings).unwrap_err();
        assert!(matches!(err, FitError::DegenerateInput(_)));
        let message = err.to_string();
        assert!(message.starts_with("Degenerate input: coupling undefined"));
        assert_eq!(message.matches("Degenerate input").count(), 1);
    }

    #[test]
    fn test_guards() {
        let freqs = linspace(1.0, 2.0, 10);
        assert!(matches!(
            sidecar_fit_transmission(&[1.0; 10], &freqs),
            Err(FitError::InsufficientData { .. })
        ));
        assert!(matches!(
            sidecar_fit_reflection(&[1.0; 21], &freqs),
            Err(FitError::InvalidInput(_))
        ));
        assert!(matches!(
            sidecar_fit_reflection(&[1.0; 22], &freqs),
            Err(FitError::InvalidInput(_))
        ));
    }
}
