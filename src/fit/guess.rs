//! Starting points and prior ranges for every fit.
//!
//! The sidecar heuristics (`guess_f0`, `guess_offset`, `guess_depth`,
//! `guess_q`) read the resonance straight off the data. The network-analyzer
//! and RFSoC guesses also derive the prior ranges and the per-point
//! uncertainty that their fits use.

use crate::config::{FitSettings, RfsocSettings};
use crate::data::stats::{self, Tail};
use crate::error::{ensure_same_len, FitError, FitResult};
use crate::measurement::MeasurementType;
use num_complex::Complex64;

/// Share of the sorted samples dropped before taking the baseline median.
const OFFSET_TRIM: f64 = 0.33;

fn extremum_index(values: &[f64], measurement: MeasurementType) -> FitResult<usize> {
    let idx = match measurement {
        MeasurementType::Reflection => stats::argmin(values),
        MeasurementType::Transmission => stats::argmax(values),
    };
    idx.ok_or_else(|| {
        FitError::InvalidInput("cannot guess parameters of an empty spectrum".into())
    })
}

fn band(frequencies: &[f64]) -> f64 {
    match (frequencies.first(), frequencies.last()) {
        (Some(first), Some(last)) => last - first,
        _ => 0.0,
    }
}

/// Resonant frequency: the global minimum for reflection, maximum for transmission.
pub fn guess_f0(
    frequencies: &[f64],
    powers: &[f64],
    measurement: MeasurementType,
) -> FitResult<f64> {
    let idx = extremum_index(powers, measurement)?;
    frequencies
        .get(idx)
        .copied()
        .ok_or_else(|| FitError::InvalidInput("frequency axis shorter than spectrum".into()))
}

/// Baseline: median after cutting a third of the samples on the resonance side.
#[must_use]
pub fn guess_offset(powers: &[f64], measurement: MeasurementType) -> f64 {
    let tail = match measurement {
        MeasurementType::Reflection => Tail::Low,
        MeasurementType::Transmission => Tail::High,
    };
    stats::median(&stats::trim_tail(powers, OFFSET_TRIM, tail))
}

/// Distance between the baseline and the extremum; never negative.
pub fn guess_depth(powers: &[f64], measurement: MeasurementType) -> FitResult<f64> {
    let idx = extremum_index(powers, measurement)?;
    Ok((guess_offset(powers, measurement) - powers[idx]).abs())
}

/// Q from the half-depth crossing nearest the resonance.
///
/// The crossing is searched left of the resonance first and on the right
/// side when the left side is empty or gives no width. If neither side
/// yields a positive bandwidth the band itself is taken as the linewidth.
pub fn guess_q(
    frequencies: &[f64],
    powers: &[f64],
    measurement: MeasurementType,
) -> FitResult<f64> {
    ensure_same_len(frequencies.len(), powers.len())?;
    let idx_fc = extremum_index(powers, measurement)?;
    let fc = frequencies
        .get(idx_fc)
        .copied()
        .ok_or_else(|| FitError::InvalidInput("frequency axis shorter than spectrum".into()))?;
    let depth = guess_depth(powers, measurement)?;
    let offset = guess_offset(powers, measurement);
    let half = match measurement {
        MeasurementType::Reflection => offset - depth / 2.0,
        MeasurementType::Transmission => offset + depth / 2.0,
    };

    let width_at = |idx: usize| 2.0 * (fc - frequencies[idx]).abs();
    let left = stats::nearest_index(&powers[..idx_fc], half).map(width_at);
    let right =
        stats::nearest_index(&powers[idx_fc + 1..], half).map(|i| width_at(idx_fc + 1 + i));
    let bandwidth = [left, right]
        .into_iter()
        .flatten()
        .find(|bw| *bw > 0.0 && bw.is_finite())
        .unwrap_or_else(|| band(frequencies));

    if !(bandwidth > 0.0) {
        return Err(FitError::DegenerateInput(format!(
            "cannot estimate a linewidth around {fc} Hz"
        )));
    }
    Ok(fc / bandwidth)
}

/// Starting point for the sidecar Lorentzian fits, in fit-parameter order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SidecarGuess {
    /// Resonant frequency.
    pub f0: f64,
    /// Loaded quality factor.
    pub q: f64,
    /// Lorentzian depth (always positive).
    pub depth: f64,
    /// Baseline level.
    pub offset: f64,
}

impl SidecarGuess {
    /// `[f0, Q, depth, offset]`.
    #[must_use]
    pub fn to_vec(&self) -> Vec<f64> {
        vec![self.f0, self.q, self.depth, self.offset]
    }
}

/// All four sidecar guesses at once.
pub fn guess_sidecar_params(
    frequencies: &[f64],
    powers: &[f64],
    measurement: MeasurementType,
) -> FitResult<SidecarGuess> {
    Ok(SidecarGuess {
        f0: guess_f0(frequencies, powers, measurement)?,
        q: guess_q(frequencies, powers, measurement)?,
        depth: guess_depth(powers, measurement)?,
        offset: guess_offset(powers, measurement),
    })
}

/// Floor for a per-point uncertainty, relative to the scale of the data.
fn floor_uncertainty(uncertainty: f64, scale: f64, settings: &FitSettings) -> f64 {
    let floor = settings.guards.min_relative_uncertainty * scale.abs().max(f64::MIN_POSITIVE);
    if uncertainty.is_finite() && uncertainty > floor {
        uncertainty
    } else {
        floor
    }
}

/// Starting point, prior ranges and uncertainty for the transmission power fit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransmissionGuess {
    /// Normalization that puts the model peak at the measured maximum.
    pub norm: f64,
    /// Resonant frequency.
    pub f0: f64,
    /// Starting Q, midway between the limits.
    pub q: f64,
    /// Noise floor as a fraction of the peak.
    pub noise: f64,
    /// Lower Q limit, `f0 / band`.
    pub q_min: f64,
    /// Upper Q limit.
    pub q_max: f64,
    /// Per-point uncertainty.
    pub uncertainty: f64,
    /// True when `min/max` fell below the low-response ratio.
    pub low_response: bool,
}

/// Guesses for a transmission power spectrum.
///
/// # Errors
///
/// - `InvalidInput` when the two slices differ in length.
/// - `DegenerateInput` when the spectrum holds no positive power.
pub fn guess_transmission(
    frequencies: &[f64],
    powers: &[f64],
    settings: &FitSettings,
) -> FitResult<TransmissionGuess> {
    ensure_same_len(frequencies.len(), powers.len())?;
    let cfg = &settings.transmission;
    let idx_max = extremum_index(powers, MeasurementType::Transmission)?;
    let p_max = powers[idx_max];
    if !(p_max > 0.0) {
        return Err(FitError::DegenerateInput(format!(
            "transmission spectrum has no positive power (max {p_max})"
        )));
    }
    let p_min = powers.iter().copied().fold(f64::INFINITY, f64::min);
    let f0 = frequencies[idx_max];
    let q_min = f0 / band(frequencies);
    let low_response = p_min / p_max < cfg.low_response_ratio;
    let q_max = if low_response {
        cfg.q_span_low_response * q_min
    } else {
        cfg.q_span * q_min
    };

    let outer = stats::outer_band_len(powers.len(), cfg.outer_fraction);
    let first = &powers[..outer];
    let last = &powers[powers.len() - outer..];
    let mut noise = 0.5 * (stats::mean(first) + stats::mean(last)) / p_max;
    let mut uncertainty = 0.5 * stats::std_dev(&stats::ends(powers, outer));
    if low_response {
        noise *= 0.1;
        uncertainty *= 10.0;
    }

    Ok(TransmissionGuess {
        norm: p_max / (1.0 + noise),
        f0,
        q: 0.5 * (q_min + q_max),
        noise,
        q_min,
        q_max,
        uncertainty: floor_uncertainty(uncertainty, p_max, settings),
        low_response,
    })
}

/// Starting point, bounds and uncertainty for the reflection IQ fit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReflectionGuess {
    /// Magnitude normalization, `sqrt(max power)`.
    pub norm: f64,
    /// Overall phase from the band ends.
    pub phase: f64,
    /// Resonant frequency.
    pub f0: f64,
    /// Starting Q, midway between the limits.
    pub q: f64,
    /// Starting coupling.
    pub beta: f64,
    /// Starting line delay.
    pub delay_time: f64,
    /// Lower Q bound, `f0 / band`.
    pub q_min: f64,
    /// Upper Q bound.
    pub q_max: f64,
    /// Per-component uncertainty on I and Q.
    pub uncertainty: f64,
    /// Power at the dip relative to the off-resonance power.
    pub dip_depth: f64,
}

/// Guesses for a reflection IQ sweep.
///
/// `iq` must be interleaved with one pair per frequency.
///
/// # Errors
///
/// - `InvalidInput` unless there is one IQ pair per frequency.
/// - `DegenerateInput` when the off-resonance power is not positive.
pub fn guess_reflection(
    frequencies: &[f64],
    iq: &[f64],
    settings: &FitSettings,
) -> FitResult<ReflectionGuess> {
    let cfg = &settings.reflection;
    let samples = crate::data::to_complex(iq)?;
    ensure_same_len(frequencies.len(), samples.len())?;
    let powers: Vec<f64> = samples.iter().map(Complex64::norm_sqr).collect();
    let idx_min = extremum_index(&powers, MeasurementType::Reflection)?;
    let p_max = powers.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let f0 = frequencies[idx_min];
    let q_min = f0 / band(frequencies);
    let q_max = cfg.q_span * q_min;

    let outer = stats::outer_band_len(powers.len(), cfg.outer_fraction);
    let power_mean =
        0.5 * (stats::mean(&powers[..outer]) + stats::mean(&powers[powers.len() - outer..]));
    if !(power_mean > 0.0) {
        return Err(FitError::DegenerateInput(format!(
            "reflection spectrum has no off-resonance power (mean {power_mean})"
        )));
    }
    let power_std = 0.5 * stats::std_dev(&stats::ends(&powers, outer));
    let uncertainty = power_std / (2.0 * power_mean.sqrt());

    // The line rotates the off-resonance response to -norm e^{i phase}.
    let ends = match (samples.first(), samples.last()) {
        (Some(first), Some(last)) => -first - last,
        _ => Complex64::new(0.0, 0.0),
    };

    Ok(ReflectionGuess {
        norm: p_max.sqrt(),
        phase: ends.arg(),
        f0,
        q: 0.5 * (q_min + q_max),
        beta: 1.0,
        delay_time: 0.0,
        q_min,
        q_max,
        uncertainty: floor_uncertainty(uncertainty, power_mean.sqrt(), settings),
        dip_depth: powers[idx_min] / power_mean,
    })
}

/// Starting point for the RFSoC cavity fits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CavityGuess {
    /// Normalization, the maximum power.
    pub norm: f64,
    /// Resonant frequency, taken at a fixed position in the band.
    pub f0: f64,
    /// Starting Q.
    pub q: f64,
}

/// Starting point for the RFSoC cavity + JPA fits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JpaGuess {
    /// Cavity part of the guess.
    pub cavity: CavityGuess,
    /// JPA centre, the middle of the band.
    pub f_jpa: f64,
    /// Starting JPA Q.
    pub q_jpa: f64,
}

/// RFSoC cavity guess. The tone comb places the resonance three quarters of
/// the way up the band by default.
pub fn guess_cavity(
    frequencies: &[f64],
    powers: &[f64],
    settings: &RfsocSettings,
) -> FitResult<CavityGuess> {
    if frequencies.is_empty() || powers.is_empty() {
        return Err(FitError::InvalidInput(
            "cannot guess parameters of an empty spectrum".into(),
        ));
    }
    let n = frequencies.len();
    let idx = ((settings.f0_guess_position * n as f64).floor() as usize).min(n - 1);
    Ok(CavityGuess {
        norm: powers.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        f0: frequencies[idx],
        q: settings.q_guess,
    })
}

/// RFSoC cavity + JPA guess.
pub fn guess_jpa(
    frequencies: &[f64],
    powers: &[f64],
    settings: &RfsocSettings,
) -> FitResult<JpaGuess> {
    let cavity = guess_cavity(frequencies, powers, settings)?;
    Ok(JpaGuess {
        cavity,
        f_jpa: band(frequencies) / 2.0 + frequencies[0],
        q_jpa: settings.q_jpa_guess,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::stats::linspace;
    use crate::fit::lineshape;
    use approx::assert_relative_eq;

    fn dip(freqs: &[f64], f0: f64, q: f64) -> Vec<f64> {
        freqs
            .iter()
            .map(|&f| lineshape::lorentzian_dip(f, f0, q, 0.8, 1.0))
            .collect()
    }

    #[test]
    fn test_f0_at_extremum() {
        let freqs = linspace(1.0, 10.0, 10);
        let powers = [5.0, 4.0, 3.0, 1.0, 2.0, 9.0, 3.0, 3.0, 3.0, 3.0];
        assert_eq!(guess_f0(&freqs, &powers, MeasurementType::Reflection).unwrap(), 4.0);
        assert_eq!(guess_f0(&freqs, &powers, MeasurementType::Transmission).unwrap(), 6.0);
    }

    #[test]
    fn test_offset_trims_resonance_side() {
        let powers = [1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 0.1, 0.2, 0.3];
        // floor(0.33 * 9) = 2 lowest dropped
        assert_eq!(guess_offset(&powers, MeasurementType::Reflection), 1.0);
        assert_relative_eq!(guess_depth(&powers, MeasurementType::Reflection).unwrap(), 0.9);
    }

    #[test]
    fn test_q_from_half_depth() {
        let freqs = linspace(900.0, 1100.0, 401);
        let powers = dip(&freqs, 1000.0, 100.0);
        let q = guess_q(&freqs, &powers, MeasurementType::Reflection).unwrap();
        assert!((q - 100.0).abs() / 100.0 < 0.1, "q guess {q}");
    }

    #[test]
    fn test_q_with_resonance_at_left_edge() {
        let freqs = linspace(1000.0, 1020.0, 201);
        let powers = dip(&freqs, 1000.0, 100.0);
        let q = guess_q(&freqs, &powers, MeasurementType::Reflection).unwrap();
        assert!(q.is_finite() && q > 0.0);
    }

    #[test]
    fn test_q_falls_back_to_band_on_flat_data() {
        let freqs = linspace(100.0, 200.0, 20);
        let powers = vec![2.0; 20];
        let q = guess_q(&freqs, &powers, MeasurementType::Transmission).unwrap();
        // resonance at the first sample, every other sample is the half-depth level
        assert!(q > 0.0 && q.is_finite());
    }

    #[test]
    fn test_transmission_guess_ranges() {
        let freqs = linspace(600e6, 700e6, 101);
        let powers: Vec<f64> = freqs
            .iter()
            .map(|&f| lineshape::transmission_power_shape(f, 1.0, 650e6, 20.0, 0.0))
            .collect();
        let guess = guess_transmission(&freqs, &powers, &FitSettings::default()).unwrap();
        assert_relative_eq!(guess.f0, 650e6);
        assert_relative_eq!(guess.q_min, 6.5);
        assert!(!guess.low_response);
        assert_relative_eq!(guess.q_max, 130.0);
        assert!(guess.q > guess.q_min && guess.q < guess.q_max);
        assert!(guess.noise > 0.0);
        assert_relative_eq!(guess.norm * (1.0 + guess.noise), 1.0);
        assert!(guess.uncertainty > 0.0);
    }

    #[test]
    fn test_transmission_low_response_widens_q() {
        let freqs = linspace(600e6, 700e6, 101);
        let powers: Vec<f64> = freqs
            .iter()
            .map(|&f| lineshape::transmission_power_shape(f, 1.0, 650e6, 500.0, 0.0))
            .collect();
        let guess = guess_transmission(&freqs, &powers, &FitSettings::default()).unwrap();
        assert!(guess.low_response);
        assert_relative_eq!(guess.q_max, 50.0 * guess.q_min);
    }

    #[test]
    fn test_transmission_rejects_dead_spectrum() {
        let freqs = linspace(1.0, 2.0, 20);
        let result = guess_transmission(&freqs, &[0.0; 20], &FitSettings::default());
        assert!(matches!(result, Err(FitError::DegenerateInput(_))));
    }

    #[test]
    fn test_short_frequency_axis_is_invalid_input() {
        let freqs = linspace(1.0e9, 1.1e9, 10);
        let powers = dip(&linspace(1.0e9, 1.1e9, 40), 1.08e9, 50.0);
        let settings = FitSettings::default();

        let q = guess_q(&freqs, &powers, MeasurementType::Reflection);
        assert!(matches!(q, Err(FitError::InvalidInput(_))));
        let transmission = guess_transmission(&freqs, &vec![1.0; 40], &settings);
        assert!(matches!(transmission, Err(FitError::InvalidInput(_))));
        let iq: Vec<f64> = powers.iter().flat_map(|p| [p.sqrt(), 0.0]).collect();
        let reflection = guess_reflection(&freqs, &iq, &settings);
        assert!(matches!(reflection, Err(FitError::InvalidInput(_))));
    }

    #[test]
    fn test_reflection_guess_phase_and_norm() {
        let freqs = linspace(1.0e9, 1.1e9, 20);
        // constant response of 2 e^{i 0.5}: the line phase is pi away from it
        let z = Complex64::from_polar(2.0, 0.5);
        let iq: Vec<f64> = (0..20).flat_map(|_| [z.re, z.im]).collect();
        let guess = guess_reflection(&freqs, &iq, &FitSettings::default()).unwrap();
        assert_relative_eq!(guess.norm, 2.0, epsilon = 1e-12);
        assert_relative_eq!(guess.phase, 0.5 - std::f64::consts::PI, epsilon = 1e-12);
        assert_relative_eq!(guess.dip_depth, 1.0, epsilon = 1e-12);
        assert!(guess.uncertainty > 0.0);
    }

    #[test]
    fn test_cavity_guess_position() {
        let freqs = linspace(0.0, 99.0, 100);
        let powers = vec![1.0; 100];
        let guess = guess_cavity(&freqs, &powers, &RfsocSettings::default()).unwrap();
        assert_eq!(guess.f0, 75.0);
        assert_eq!(guess.q, 20_000.0);
        let jpa = guess_jpa(&freqs, &powers, &RfsocSettings::default()).unwrap();
        assert_relative_eq!(jpa.f_jpa, 49.5);
        assert_eq!(jpa.q_jpa, 5000.0);
    }
}
