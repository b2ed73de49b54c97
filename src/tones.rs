//! RFSoC tone-comb extraction.
//!
//! The RFSoC drives the cavity with a comb of tones and records one power
//! spectrum. Each tone sits alone in a window of `window_len` bins; a window
//! holds a tone when its maximum stands `ratio` times above the mean of the
//! other bins. The ratio is bisected until exactly `n_tones` are found.
//! Tones alternate between the transmission and reflection paths, so the
//! even tones sample the transmission lineshape and the odd tones the
//! reflection lineshape.

use crate::config::{FitSettings, ToneSettings};
use crate::data::stats;
use crate::error::{FitError, FitResult};
use crate::fit::rfsoc::{fit_rfsoc_with, RfsocFit};
use crate::measurement::{CavityModel, MeasurementType};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

fn scan_windows(spectrum: &[f64], window_len: usize, ratio: f64) -> Vec<usize> {
    if window_len == 0 {
        return Vec::new();
    }
    spectrum
        .chunks_exact(window_len)
        .enumerate()
        .filter_map(|(w, window)| {
            let peak = stats::argmax(window)?;
            let max = window[peak];
            let others: Vec<f64> = window.iter().copied().filter(|v| *v != max).collect();
            if others.is_empty() {
                return None;
            }
            (max >= ratio * stats::mean(&others)).then_some(w * window_len + peak)
        })
        .collect()
}

/// Bin indices of the comb tones, in ascending order.
///
/// Returns `None` when no threshold in `[ratio_low, ratio_high]` yields
/// exactly `n_tones` within `max_loops` bisection rounds.
#[must_use]
pub fn find_tones(spectrum: &[f64], settings: &ToneSettings) -> Option<Vec<usize>> {
    let (mut low, mut high) = (settings.ratio_low, settings.ratio_high);
    for round in 0..settings.max_loops {
        let ratio = 0.5 * (low + high);
        let tones = scan_windows(spectrum, settings.window_len, ratio);
        debug!(round, ratio, found = tones.len(), "tone search");
        match tones.len().cmp(&settings.n_tones) {
            std::cmp::Ordering::Equal => return Some(tones),
            std::cmp::Ordering::Greater => low = ratio,
            std::cmp::Ordering::Less => high = ratio,
        }
    }
    None
}

/// The spectrum with every tone bin replaced by the mean of its neighbours.
///
/// Edge bins take their single neighbour. Out-of-range indices are ignored.
#[must_use]
pub fn interpolate_under_tones(spectrum: &[f64], tones: &[usize]) -> Vec<f64> {
    let mut floor = spectrum.to_vec();
    for &t in tones.iter().filter(|&&t| t < spectrum.len()) {
        let left = t.checked_sub(1).map(|i| spectrum[i]);
        let right = spectrum.get(t + 1).copied();
        floor[t] = match (left, right) {
            (Some(l), Some(r)) => 0.5 * (l + r),
            (Some(v), None) | (None, Some(v)) => v,
            (None, None) => spectrum[t],
        };
    }
    floor
}

/// Tones found in one spectrum and the cavity fits to them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToneAnalysis {
    /// Bin index of each tone.
    pub tone_indices: Vec<usize>,
    /// Frequency of each tone.
    pub tone_frequencies: Vec<f64>,
    /// Tone power above the interpolated floor.
    pub tone_powers: Vec<f64>,
    /// Tone power over the floor beneath it.
    pub snr: Vec<f64>,
    /// Fit to the even tones, scaled by the transmission amplitude.
    pub transmission: RfsocFit,
    /// Fit to the odd tones, scaled by the reflection amplitude.
    pub reflection: RfsocFit,
}

/// Finds the tones in `spectrum` and fits both paths with `model`.
///
/// Bin `i` of `N` sits at frequency `f_start + i · (f_stop − f_start) / (N − 1)`.
///
/// # Errors
///
/// - `InvalidInput` for an empty spectrum or `f_stop <= f_start`.
/// - `DegenerateInput` when the tone search does not settle on `n_tones`.
/// - Any error of the underlying RFSoC fits.
#[instrument(skip(spectrum, settings), fields(n_bins = spectrum.len()))]
pub fn analyze_tone_spectrum(
    spectrum: &[f64],
    f_start: f64,
    f_stop: f64,
    transmission_amp: f64,
    reflection_amp: f64,
    model: CavityModel,
    settings: &FitSettings,
) -> FitResult<ToneAnalysis> {
    if spectrum.is_empty() {
        return Err(FitError::InvalidInput("empty tone spectrum".into()));
    }
    if !(f_stop > f_start) {
        return Err(FitError::InvalidInput(format!(
            "stop frequency {f_stop} must exceed start frequency {f_start}"
        )));
    }

    let cfg = &settings.tones;
    let tone_indices = find_tones(spectrum, cfg).ok_or_else(|| {
        warn!(n_tones = cfg.n_tones, "tone search did not converge");
        FitError::DegenerateInput(format!(
            "no threshold in [{}, {}] isolates {} tones after {} rounds",
            cfg.ratio_low, cfg.ratio_high, cfg.n_tones, cfg.max_loops
        ))
    })?;

    let freqs = stats::linspace(f_start, f_stop, spectrum.len());
    let floor = interpolate_under_tones(spectrum, &tone_indices);
    let tone_powers: Vec<f64> = tone_indices.iter().map(|&t| spectrum[t] - floor[t]).collect();
    let tone_frequencies: Vec<f64> = tone_indices.iter().map(|&t| freqs[t]).collect();
    let snr: Vec<f64> = tone_indices
        .iter()
        .zip(&tone_powers)
        .map(|(&t, p)| p / floor[t])
        .collect();

    let (mut t_freqs, mut t_powers) = (Vec::new(), Vec::new());
    let (mut r_freqs, mut r_powers) = (Vec::new(), Vec::new());
    for (k, (&f, &p)) in tone_frequencies.iter().zip(&tone_powers).enumerate() {
        if k % 2 == 0 {
            t_freqs.push(f);
            t_powers.push(p * transmission_amp);
        } else {
            r_freqs.push(f);
            r_powers.push(p * reflection_amp);
        }
    }

    let transmission =
        fit_rfsoc_with(MeasurementType::Transmission, model, &t_powers, &t_freqs, settings)?;
    let reflection =
        fit_rfsoc_with(MeasurementType::Reflection, model, &r_powers, &r_freqs, settings)?;
    info!(
        n_tones = tone_indices.len(),
        transmission_f0 = transmission.f0(),
        reflection_f0 = reflection.f0(),
        "tone spectrum analysed"
    );

    Ok(ToneAnalysis {
        tone_indices,
        tone_frequencies,
        tone_powers,
        snr,
        transmission,
        reflection,
    })
}
