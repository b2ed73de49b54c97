//! RFSoC cavity and cavity + JPA power fits.
//!
//! The RFSoC tone comb samples a narrow band around the cavity, so the
//! priors here are fixed Q ranges from [`RfsocSettings`] rather than
//! band-derived ones. Residuals are unweighted.

use super::guess::{guess_cavity, guess_jpa, CavityGuess, JpaGuess};
use super::lineshape::{
    reflection_power_shape_cavity, reflection_power_shape_jpa, transmission_power_shape_cavity,
    transmission_power_shape_jpa,
};
use super::outcome::{FitOutcome, FitParams, FitRecord};
use super::priors::Prior;
use super::solver::LeastSquares;
use crate::config::{FitSettings, RfsocSettings};
use crate::error::{ensure_min_points, ensure_same_len, FitError, FitResult};
use crate::measurement::{CavityModel, MeasurementType};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

type PointShape = fn(f64, f64, f64, f64) -> f64;
type BandShape = fn(&[f64], f64, f64, f64, f64, f64) -> Vec<f64>;

/// Fitted cavity parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CavityParams {
    /// Normalization.
    pub norm: f64,
    /// Resonant frequency.
    pub f0: f64,
    /// Quality factor.
    pub q: f64,
}

impl FitParams for CavityParams {
    fn record_fields(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("fit_norm", self.norm),
            ("fit_f0", self.f0),
            ("fit_Q", self.q),
        ]
    }
}

/// Fitted cavity + JPA parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JpaParams {
    /// Normalization.
    pub norm: f64,
    /// Cavity resonant frequency.
    pub f0: f64,
    /// Cavity quality factor.
    pub q: f64,
    /// JPA centre frequency.
    pub f_jpa: f64,
    /// JPA quality factor.
    pub q_jpa: f64,
}

impl FitParams for JpaParams {
    fn record_fields(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("fit_norm", self.norm),
            ("fit_f0", self.f0),
            ("fit_Q", self.q),
            ("fit_f_jpa", self.f_jpa),
            ("fit_Q_jpa", self.q_jpa),
        ]
    }
}

/// Outcome of [`fit_rfsoc`], tagged by cavity model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "lowercase")]
pub enum RfsocFit {
    /// Single-cavity fit.
    Cavity(FitOutcome<CavityParams>),
    /// Cavity + JPA fit.
    Jpa(FitOutcome<JpaParams>),
}

impl RfsocFit {
    /// Fitted cavity frequency.
    #[must_use]
    pub fn f0(&self) -> f64 {
        match self {
            RfsocFit::Cavity(o) => o.params.f0,
            RfsocFit::Jpa(o) => o.params.f0,
        }
    }

    /// Fitted cavity Q.
    #[must_use]
    pub fn q(&self) -> f64 {
        match self {
            RfsocFit::Cavity(o) => o.params.q,
            RfsocFit::Jpa(o) => o.params.q,
        }
    }

    /// Reduced chi-square of the fit.
    #[must_use]
    pub fn reduced_chisq(&self) -> f64 {
        match self {
            RfsocFit::Cavity(o) => o.reduced_chisq,
            RfsocFit::Jpa(o) => o.reduced_chisq,
        }
    }

    /// Model evaluated at the input frequencies.
    #[must_use]
    pub fn fit_shape(&self) -> &[f64] {
        match self {
            RfsocFit::Cavity(o) => &o.fit_shape,
            RfsocFit::Jpa(o) => &o.fit_shape,
        }
    }

    /// Flat record of the fit.
    #[must_use]
    pub fn to_record(&self) -> FitRecord {
        match self {
            RfsocFit::Cavity(o) => o.to_record(),
            RfsocFit::Jpa(o) => o.to_record(),
        }
    }
}

fn check_inputs(
    powers: &[f64],
    frequencies: &[f64],
    settings: &FitSettings,
) -> FitResult<(f64, f64)> {
    ensure_same_len(frequencies.len(), powers.len())?;
    ensure_min_points(frequencies.len(), settings.guards.min_points)?;
    match (frequencies.first(), frequencies.last()) {
        (Some(&first), Some(&last)) => Ok((first, last)),
        _ => Err(FitError::InvalidInput("empty frequency axis".into())),
    }
}

fn cavity_priors(first: f64, last: f64, guess: &CavityGuess, cfg: &RfsocSettings) -> Vec<Prior> {
    vec![
        Prior::hard_range(1, first, last, guess.f0),
        Prior::hard_range(2, cfg.q_min, cfg.q_max, cfg.q_min),
    ]
}

fn fit_cavity(
    powers: &[f64],
    frequencies: &[f64],
    settings: &FitSettings,
    shape: PointShape,
) -> FitResult<FitOutcome<CavityParams>> {
    let (first, last) = check_inputs(powers, frequencies, settings)?;
    let guess = guess_cavity(frequencies, powers, &settings.rfsoc)?;
    debug!(norm = guess.norm, f0 = guess.f0, q = guess.q, "cavity guess");

    let model = |p: &[f64]| -> Vec<f64> {
        frequencies
            .iter()
            .map(|&f| shape(f, p[0], p[1], p[2]))
            .collect()
    };
    let solution = LeastSquares::new(model, powers, vec![1.0; powers.len()])
        .with_priors(cavity_priors(first, last, &guess, &settings.rfsoc))
        .solve(&[guess.norm, guess.f0, guess.q], &settings.solver)?;

    let p = solution.params.as_slice();
    let params = CavityParams {
        norm: p[0],
        f0: p[1],
        q: p[2],
    };
    let reduced_chisq = solution.reduced_chisq();
    info!(
        norm = params.norm,
        f0 = params.f0,
        q = params.q,
        reduced_chisq,
        "cavity fit"
    );
    Ok(FitOutcome {
        fit_shape: model(p),
        params,
        reduced_chisq,
        iterations: solution.iterations,
    })
}

fn fit_jpa(
    powers: &[f64],
    frequencies: &[f64],
    settings: &FitSettings,
    shape: BandShape,
) -> FitResult<FitOutcome<JpaParams>> {
    let (first, last) = check_inputs(powers, frequencies, settings)?;
    let cfg = &settings.rfsoc;
    let JpaGuess {
        cavity,
        f_jpa,
        q_jpa,
    } = guess_jpa(frequencies, powers, cfg)?;
    debug!(
        norm = cavity.norm,
        f0 = cavity.f0,
        q = cavity.q,
        f_jpa,
        q_jpa,
        "jpa guess"
    );

    let mut priors = cavity_priors(first, last, &cavity, cfg);
    priors.push(Prior::hard_range(3, first, last, f_jpa));
    priors.push(Prior::hard_range(4, cfg.q_jpa_min, cfg.q_jpa_max, cfg.q_jpa_min));

    let model = |p: &[f64]| shape(frequencies, p[0], p[1], p[2], p[3], p[4]);
    let solution = LeastSquares::new(model, powers, vec![1.0; powers.len()])
        .with_priors(priors)
        .solve(&[cavity.norm, cavity.f0, cavity.q, f_jpa, q_jpa], &settings.solver)?;

    let p = solution.params.as_slice();
    let params = JpaParams {
        norm: p[0],
        f0: p[1],
        q: p[2],
        f_jpa: p[3],
        q_jpa: p[4],
    };
    let reduced_chisq = solution.reduced_chisq();
    info!(
        norm = params.norm,
        f0 = params.f0,
        q = params.q,
        f_jpa = params.f_jpa,
        q_jpa = params.q_jpa,
        reduced_chisq,
        "jpa fit"
    );
    Ok(FitOutcome {
        fit_shape: model(p),
        params,
        reduced_chisq,
        iterations: solution.iterations,
    })
}

/// Transmission through a bare cavity, with default settings.
pub fn fit_transmission_cavity(
    powers: &[f64],
    frequencies: &[f64],
) -> FitResult<FitOutcome<CavityParams>> {
    fit_transmission_cavity_with(powers, frequencies, &FitSettings::default())
}

/// Transmission through a bare cavity.
#[instrument(skip_all, fields(n_points = frequencies.len()))]
pub fn fit_transmission_cavity_with(
    powers: &[f64],
    frequencies: &[f64],
    settings: &FitSettings,
) -> FitResult<FitOutcome<CavityParams>> {
    fit_cavity(powers, frequencies, settings, transmission_power_shape_cavity)
}

/// Reflection off a bare cavity, with default settings.
pub fn fit_reflection_cavity(
    powers: &[f64],
    frequencies: &[f64],
) -> FitResult<FitOutcome<CavityParams>> {
    fit_reflection_cavity_with(powers, frequencies, &FitSettings::default())
}

/// Reflection off a bare cavity.
#[instrument(skip_all, fields(n_points = frequencies.len()))]
pub fn fit_reflection_cavity_with(
    powers: &[f64],
    frequencies: &[f64],
    settings: &FitSettings,
) -> FitResult<FitOutcome<CavityParams>> {
    fit_cavity(powers, frequencies, settings, reflection_power_shape_cavity)
}

/// Transmission through a cavity seen through the JPA gain band, with default settings.
pub fn fit_transmission_jpa(
    powers: &[f64],
    frequencies: &[f64],
) -> FitResult<FitOutcome<JpaParams>> {
    fit_transmission_jpa_with(powers, frequencies, &FitSettings::default())
}

/// Transmission through a cavity seen through the JPA gain band.
#[instrument(skip_all, fields(n_points = frequencies.len()))]
pub fn fit_transmission_jpa_with(
    powers: &[f64],
    frequencies: &[f64],
    settings: &FitSettings,
) -> FitResult<FitOutcome<JpaParams>> {
    fit_jpa(powers, frequencies, settings, transmission_power_shape_jpa)
}

/// Reflection off a cavity seen through the JPA gain band, with default settings.
pub fn fit_reflection_jpa(
    powers: &[f64],
    frequencies: &[f64],
) -> FitResult<FitOutcome<JpaParams>> {
    fit_reflection_jpa_with(powers, frequencies, &FitSettings::default())
}

/// Reflection off a cavity seen through the JPA gain band.
#[instrument(skip_all, fields(n_points = frequencies.len()))]
pub fn fit_reflection_jpa_with(
    powers: &[f64],
    frequencies: &[f64],
    settings: &FitSettings,
) -> FitResult<FitOutcome<JpaParams>> {
    fit_jpa(powers, frequencies, settings, reflection_power_shape_jpa)
}

/// Dispatches to one of the four RFSoC fits with default settings.
pub fn fit_rfsoc(
    measurement: MeasurementType,
    model: CavityModel,
    powers: &[f64],
    frequencies: &[f64],
) -> FitResult<RfsocFit> {
    fit_rfsoc_with(measurement, model, powers, frequencies, &FitSettings::default())
}

/// Dispatches to one of the four RFSoC fits.
pub fn fit_rfsoc_with(
    measurement: MeasurementType,
    model: CavityModel,
    powers: &[f64],
    frequencies: &[f64],
    settings: &FitSettings,
) -> FitResult<RfsocFit> {
    use CavityModel::{CavityOnly, WithJpa};
    use MeasurementType::{Reflection, Transmission};

    Ok(match (measurement, model) {
        (Transmission, CavityOnly) => {
            RfsocFit::Cavity(fit_transmission_cavity_with(powers, frequencies, settings)?)
        }
        (Reflection, CavityOnly) => {
            RfsocFit::Cavity(fit_reflection_cavity_with(powers, frequencies, settings)?)
        }
        (Transmission, WithJpa) => {
            RfsocFit::Jpa(fit_transmission_jpa_with(powers, frequencies, settings)?)
        }
        (Reflection, WithJpa) => {
            RfsocFit::Jpa(fit_reflection_jpa_with(powers, frequencies, settings)?)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::stats::linspace;
    use approx::assert_relative_eq;

    fn band() -> Vec<f64> {
        // 20 kHz bins; index 75 sits at 5.0005 GHz
        linspace(4.999e9, 5.001e9, 101)
    }

    #[test]
    fn test_transmission_cavity_recovers_parameters() {
        let freqs = band();
        let f0 = freqs[75] + 40e3;
        let powers: Vec<f64> = freqs
            .iter()
            .map(|&f| transmission_power_shape_cavity(f, 3.0, f0, 15_000.0))
            .collect();
        let fit = fit_transmission_cavity(&powers, &freqs).unwrap();
        assert_relative_eq!(fit.params.f0, f0, max_relative = 1e-7);
        assert_relative_eq!(fit.params.q, 15_000.0, max_relative = 1e-3);
        assert_relative_eq!(fit.params.norm, 3.0, max_relative = 1e-3);
        assert!(fit.reduced_chisq < 1e-6);
    }

    #[test]
    fn test_reflection_cavity_recovers_parameters() {
        let freqs = band();
        let f0 = freqs[75] - 30e3;
        let powers: Vec<f64> = freqs
            .iter()
            .map(|&f| reflection_power_shape_cavity(f, 0.5, f0, 25_000.0))
            .collect();
        let fit = fit_reflection_cavity(&powers, &freqs).unwrap();
        assert_relative_eq!(fit.params.f0, f0, max_relative = 1e-7);
        assert_relative_eq!(fit.params.q, 25_000.0, max_relative = 1e-3);
    }

    #[test]
    fn test_transmission_jpa_recovers_q() {
        let freqs = band();
        let f_jpa = 0.5 * (freqs[0] + freqs[100]);
        let powers =
            transmission_power_shape_jpa(&freqs, 2.0, freqs[75], 18_000.0, f_jpa, 4000.0);
        let fit = fit_transmission_jpa(&powers, &freqs).unwrap();
        assert_relative_eq!(fit.params.q, 18_000.0, max_relative = 0.02);
        assert_relative_eq!(fit.params.q_jpa, 4000.0, max_relative = 0.02);
        assert_relative_eq!(fit.params.f0, freqs[75], max_relative = 1e-6);
        let record = fit.to_record();
        assert!(record.contains_key("fit_f_jpa"));
        assert!(record.contains_key("fit_Q_jpa"));
    }

    #[test]
    fn test_dispatch_selects_model() {
        let freqs = band();
        let powers: Vec<f64> = freqs
            .iter()
            .map(|&f| transmission_power_shape_cavity(f, 1.0, freqs[75], 20_000.0))
            .collect();
        let cavity = fit_rfsoc(
            MeasurementType::Transmission,
            CavityModel::CavityOnly,
            &powers,
            &freqs,
        )
        .unwrap();
        assert!(matches!(cavity, RfsocFit::Cavity(_)));
        assert_relative_eq!(cavity.f0(), freqs[75], max_relative = 1e-7);

        let jpa = fit_rfsoc(
            MeasurementType::Reflection,
            CavityModel::WithJpa,
            &powers,
            &freqs,
        );
        assert!(!matches!(jpa, Ok(RfsocFit::Cavity(_))));
    }

    #[test]
    fn test_guards() {
        let freqs = linspace(1.0, 2.0, 10);
        assert!(matches!(
            fit_transmission_cavity(&[1.0; 10], &freqs),
            Err(FitError::InsufficientData { .. })
        ));
        assert!(matches!(
            fit_reflection_jpa(&[1.0; 9], &freqs),
            Err(FitError::InvalidInput(_))
        ));
    }
}
