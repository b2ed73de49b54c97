//! Removing the cable from a reflection measurement.
//!
//! The measured reflection is the cavity response times the line: a
//! magnitude normalization `sqrt(C)` and a phase that runs linearly with
//! frequency. The ends of the band are taken as resonance-free line, a
//! straight phase trend is fitted through them and subtracted, and the
//! magnitude is divided by `sqrt(C)`. What is left is the reflection off
//! the cavity alone, from which the coupling follows.

use crate::config::DeconvolutionSettings;
use crate::data::stats;
use crate::error::{FitError, FitResult};

/// Cavity reflection after the line is removed.
#[derive(Debug, Clone, PartialEq)]
pub struct LineDeconvolution {
    /// `|Γ_cavity|` per frequency.
    pub mag: Vec<f64>,
    /// Phase of `Γ_cavity` per frequency, line trend removed.
    pub phase: Vec<f64>,
}

/// Divides out the line normalization `c_fit` and the linear phase trend.
///
/// # Errors
///
/// - `InvalidInput` when the slices differ in length.
/// - `DegenerateInput` when `c_fit` is not positive or the band ends do not
///   determine a line.
pub fn deconvolve_line(
    frequencies: &[f64],
    mag: &[f64],
    phase: &[f64],
    c_fit: f64,
    settings: &DeconvolutionSettings,
) -> FitResult<LineDeconvolution> {
    if mag.len() != frequencies.len() || phase.len() != frequencies.len() {
        return Err(FitError::InvalidInput(format!(
            "deconvolution needs equal lengths, got {} frequencies, {} magnitudes, {} phases",
            frequencies.len(),
            mag.len(),
            phase.len()
        )));
    }
    if !(c_fit.is_finite() && c_fit > 0.0) {
        return Err(FitError::DegenerateInput(format!(
            "line normalization must be positive, got {c_fit}"
        )));
    }

    let (slope, intercept) = stats::linear_fit(
        &stats::ends(frequencies, settings.end_points),
        &stats::ends(phase, settings.end_points),
    )
    .ok_or_else(|| {
        FitError::DegenerateInput("band ends do not determine a line phase trend".into())
    })?;

    let scale = (1.0 / c_fit).sqrt();
    Ok(LineDeconvolution {
        mag: mag.iter().map(|m| m * scale).collect(),
        phase: frequencies
            .iter()
            .zip(phase)
            .map(|(f, p)| p - (slope * f + intercept))
            .collect(),
    })
}

/// `+1` when the phase falls across the resonance (over-coupled), `-1`
/// when it rises (under-coupled).
///
/// Compares the sum of `sign_window` phases from the sample nearest `f0`
/// onward with the sum of the `sign_window` phases before it. Windows are
/// cut short at the ends of the band.
#[must_use]
pub fn coupling_sign(
    f0: f64,
    frequencies: &[f64],
    phase: &[f64],
    settings: &DeconvolutionSettings,
) -> f64 {
    let n = phase.len().min(frequencies.len());
    let Some(idx) = stats::nearest_index(&frequencies[..n], f0) else {
        return -1.0;
    };
    let window = settings.sign_window;
    let after: f64 = phase[idx..(idx + window).min(n)].iter().sum();
    let before: f64 = phase[idx.saturating_sub(window)..idx].iter().sum();
    if after < before {
        1.0
    } else {
        -1.0
    }
}

/// Coupling `β = (1 + s·|Γ|) / (1 − s·|Γ|)` from the cavity reflection at resonance.
///
/// # Errors
///
/// `DegenerateInput` when the denominator is within `coupling_epsilon` of zero,
/// i.e. a fully reflecting cavity seen as over-coupled.
pub fn coupling_beta(mag_f0: f64, sign: f64, settings: &DeconvolutionSettings) -> FitResult<f64> {
    let denominator = 1.0 - sign * mag_f0;
    if !(denominator.abs() >= settings.coupling_epsilon) {
        return Err(FitError::DegenerateInput(format!(
            "coupling undefined: |1 - {sign} * {mag_f0}| below {}",
            settings.coupling_epsilon
        )));
    }
    Ok((1.0 + sign * mag_f0) / denominator)
}

/// Deconvolved phase at `f0`, linearly interpolated.
#[must_use]
pub fn phase_at(frequencies: &[f64], phase: &[f64], f0: f64) -> f64 {
    stats::interp_linear(frequencies, phase, f0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::stats::linspace;
    use approx::assert_relative_eq;

    #[test]
    fn test_line_trend_removed() {
        let freqs = linspace(1.0e9, 1.01e9, 50);
        // pure line: phase = 2e-7 * f + 0.4, magnitude sqrt(C)
        let phase: Vec<f64> = freqs.iter().map(|f| 2e-7 * f + 0.4).collect();
        let mag = vec![3.0; 50];
        let out = deconvolve_line(&freqs, &mag, &phase, 9.0, &DeconvolutionSettings::default())
            .unwrap();
        for (m, p) in out.mag.iter().zip(&out.phase) {
            assert_relative_eq!(*m, 1.0, epsilon = 1e-12);
            assert!(p.abs() < 1e-6);
        }
    }

    #[test]
    fn test_bad_normalization_is_degenerate() {
        let freqs = linspace(1.0, 2.0, 20);
        let result = deconvolve_line(
            &freqs,
            &[1.0; 20],
            &[0.0; 20],
            0.0,
            &DeconvolutionSettings::default(),
        );
        assert!(matches!(result, Err(FitError::DegenerateInput(_))));
        let result = deconvolve_line(
            &freqs,
            &[1.0; 19],
            &[0.0; 20],
            1.0,
            &DeconvolutionSettings::default(),
        );
        assert!(matches!(result, Err(FitError::InvalidInput(_))));
    }

    #[test]
    fn test_sign_follows_phase_direction() {
        let settings = DeconvolutionSettings::default();
        let freqs = linspace(0.0, 19.0, 20);
        let falling: Vec<f64> = freqs.iter().map(|f| -f).collect();
        let rising = freqs.clone();
        assert_eq!(coupling_sign(10.0, &freqs, &falling, &settings), 1.0);
        assert_eq!(coupling_sign(10.0, &freqs, &rising, &settings), -1.0);
    }

    #[test]
    fn test_sign_at_band_edges_does_not_panic() {
        let settings = DeconvolutionSettings::default();
        let freqs = linspace(0.0, 9.0, 10);
        let falling: Vec<f64> = freqs.iter().map(|f| -f).collect();
        // first sample: empty before-window sums to 0, after-window to -10
        assert_eq!(coupling_sign(0.0, &freqs, &falling, &settings), 1.0);
        // last sample: after-window holds only -9, before-window sums to -30
        assert_eq!(coupling_sign(9.0, &freqs, &falling, &settings), -1.0);
    }

    #[test]
    fn test_beta_inverts_reflection_magnitude() {
        let settings = DeconvolutionSettings::default();
        for beta in [0.25, 0.5, 2.0, 4.0_f64] {
            let mag = ((beta - 1.0) / (beta + 1.0)).abs();
            let sign = if beta > 1.0 { 1.0 } else { -1.0 };
            let recovered = coupling_beta(mag, sign, &settings).unwrap();
            assert_relative_eq!(recovered, beta, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_beta_denominator_guard() {
        let settings = DeconvolutionSettings::default();
        assert!(matches!(
            coupling_beta(1.0, 1.0, &settings),
            Err(FitError::DegenerateInput(_))
        ));
        // under-coupled with |Γ| = 1 is a finite zero coupling
        assert_relative_eq!(coupling_beta(1.0, -1.0, &settings).unwrap(), 0.0);
    }

    #[test]
    fn test_phase_at_interpolates() {
        let freqs = [0.0, 1.0, 2.0];
        let phase = [0.0, 1.0, 3.0];
        assert_relative_eq!(phase_at(&freqs, &phase, 1.5), 2.0);
    }
}
