//! Tone-comb extraction and the per-path cavity fits.

use approx::assert_relative_eq;
use resonance_fit::data::stats::linspace;
use resonance_fit::fit::lineshape::{
    reflection_power_shape_cavity, transmission_power_shape_cavity,
};
use resonance_fit::tones::{find_tones, interpolate_under_tones};
use resonance_fit::{analyze_tone_spectrum, CavityModel, FitError, FitSettings};

const N_BINS: usize = 400;
const F_START: f64 = 5.0e9 - 2.0e6;
const F_STOP: f64 = 5.0e9 + 2.0e6;

struct Comb {
    spectrum: Vec<f64>,
    transmission_f0: f64,
    reflection_f0: f64,
}

/// Forty tones, one in the middle of each ten-bin window, over a rippled
/// floor. Even tones carry the transmission lineshape, odd tones the
/// reflection lineshape, each divided by its path amplitude.
fn comb(transmission_amp: f64, reflection_amp: f64) -> Comb {
    let freqs = linspace(F_START, F_STOP, N_BINS);
    let floor: Vec<f64> = (0..N_BINS)
        .map(|i| 1e-3 * (1.0 + 0.1 * (i as f64).sin()))
        .collect();
    let tone_bin = |k: usize| 10 * k + 5;
    // the RFSoC guess puts f0 at tone 15 of each path
    let transmission_f0 = freqs[tone_bin(30)];
    // midway between reflection tones 15 and 16
    let reflection_f0 = freqs[tone_bin(32)];

    let mut spectrum = floor.clone();
    for k in 0..40 {
        let t = tone_bin(k);
        let f = freqs[t];
        let under = 0.5 * (floor[t - 1] + floor[t + 1]);
        let tone = if k % 2 == 0 {
            transmission_power_shape_cavity(f, 10.0, transmission_f0, 5000.0) / transmission_amp
        } else {
            reflection_power_shape_cavity(f, 5.0, reflection_f0, 8000.0) / reflection_amp
        };
        spectrum[t] = under + tone;
    }
    Comb {
        spectrum,
        transmission_f0,
        reflection_f0,
    }
}

#[test]
fn test_all_tones_found() {
    let comb = comb(1.0, 1.0);
    let tones = find_tones(&comb.spectrum, &FitSettings::default().tones).unwrap();
    assert_eq!(tones, (0..40).map(|k| 10 * k + 5).collect::<Vec<_>>());

    let floor = interpolate_under_tones(&comb.spectrum, &tones);
    assert!(floor.iter().all(|v| *v < 1.2e-3));
}

#[test]
fn test_both_paths_fitted() -> anyhow::Result<()> {
    let comb = comb(2.0, 0.5);
    let analysis = analyze_tone_spectrum(
        &comb.spectrum,
        F_START,
        F_STOP,
        2.0,
        0.5,
        CavityModel::CavityOnly,
        &FitSettings::default(),
    )?;

    assert_eq!(analysis.tone_indices.len(), 40);
    assert_eq!(analysis.tone_frequencies.len(), 40);
    assert!(analysis.snr.iter().all(|s| *s > 10.0));

    assert_relative_eq!(analysis.transmission.f0(), comb.transmission_f0, max_relative = 1e-6);
    assert_relative_eq!(analysis.transmission.q(), 5000.0, max_relative = 1e-2);
    assert_relative_eq!(analysis.reflection.f0(), comb.reflection_f0, max_relative = 1e-6);
    assert_relative_eq!(analysis.reflection.q(), 8000.0, max_relative = 1e-2);

    let record = analysis.transmission.to_record();
    assert!(record.contains_key("fit_Q"));
    Ok(())
}

#[test]
fn test_wrong_tone_count_is_degenerate() {
    let comb = comb(1.0, 1.0);
    let mut settings = FitSettings::default();
    settings.tones.n_tones = 41;
    let result = analyze_tone_spectrum(
        &comb.spectrum,
        F_START,
        F_STOP,
        1.0,
        1.0,
        CavityModel::CavityOnly,
        &settings,
    );
    assert!(matches!(result, Err(FitError::DegenerateInput(_))));
}

#[test]
fn test_inverted_band_rejected() {
    let comb = comb(1.0, 1.0);
    let result = analyze_tone_spectrum(
        &comb.spectrum,
        F_STOP,
        F_START,
        1.0,
        1.0,
        CavityModel::CavityOnly,
        &FitSettings::default(),
    );
    assert!(matches!(result, Err(FitError::InvalidInput(_))));
}
