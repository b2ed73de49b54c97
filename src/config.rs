//! Fit configuration using Figment
//!
//! Every tunable constant the fits rely on (solver tolerances, prior spans,
//! minimum point counts, widescan and tone-search parameters) lives in
//! `FitSettings`. The `Default` implementation carries the values the
//! network-analyzer and RFSoC fits have always used, so most callers never
//! load anything.
//!
//! Configuration is loaded from:
//! 1. built-in defaults
//! 2. a TOML file (`config/fits.toml` by default)
//! 3. environment variables prefixed with `RESONANCE_FIT_`, nested keys
//!    separated by a double underscore
//!
//! # Example
//! ```no_run
//! use resonance_fit::config::FitSettings;
//!
//! // RESONANCE_FIT_SOLVER__MAX_ITERATIONS=500 overrides solver.max_iterations
//! let settings = FitSettings::load()?;
//! settings.validate()?;
//! println!("minimum points: {}", settings.guards.min_points);
//! # Ok::<(), resonance_fit::FitError>(())
//! ```

use crate::error::{FitError, FitResult};
use crate::logging::OutputFormat;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level fit configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FitSettings {
    /// Levenberg–Marquardt solver settings
    pub solver: SolverSettings,
    /// Input guards shared by every fit
    pub guards: GuardSettings,
    /// Network-analyzer transmission fit priors
    pub transmission: TransmissionSettings,
    /// Network-analyzer reflection IQ fit bounds
    pub reflection: ReflectionSettings,
    /// RFSoC cavity / JPA fit priors
    pub rfsoc: RfsocSettings,
    /// Line-delay deconvolution and coupling extraction
    pub deconvolution: DeconvolutionSettings,
    /// Widescan peak clustering
    pub widescan: WidescanSettings,
    /// RFSoC tone search
    pub tones: ToneSettings,
    /// Logging output
    pub logging: LoggingSettings,
}

/// Solver tolerances and damping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    /// Maximum number of accepted-or-rejected outer iterations
    pub max_iterations: usize,
    /// Relative parameter-step tolerance (df/f is tiny, so this is set very low)
    pub xtol: f64,
    /// Relative cost-reduction tolerance
    pub ftol: f64,
    /// Absolute gradient tolerance
    pub gtol: f64,
    /// Starting Marquardt damping
    pub initial_lambda: f64,
}

/// Guards applied before any fit runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardSettings {
    /// Fewest frequency points a fit accepts
    pub min_points: usize,
    /// Floor on the estimated per-point uncertainty, relative to the data scale
    pub min_relative_uncertainty: f64,
}

/// Priors for the network-analyzer transmission fit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransmissionSettings {
    /// Fraction of the band at each end used for noise and uncertainty estimates
    pub outer_fraction: f64,
    /// min/max power ratio below which the measurement counts as low-response
    pub low_response_ratio: f64,
    /// `Q_max / Q_min` for regular measurements
    pub q_span: f64,
    /// `Q_max / Q_min` for low-response measurements
    pub q_span_low_response: f64,
    /// Noise floor (fraction of norm) above which a soft penalty applies
    pub noise_max: f64,
}

/// Bounds for the network-analyzer reflection IQ fit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReflectionSettings {
    /// Fraction of the band at each end used for the uncertainty estimate
    pub outer_fraction: f64,
    /// `Q_max / Q_min`
    pub q_span: f64,
    /// Upper bound on the coupling coefficient
    pub beta_max: f64,
    /// Symmetric bound on the line delay (rad/Hz); 3e-5 is O(1) km of cable
    pub delay_max: f64,
}

/// Priors for the RFSoC cavity and JPA fits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RfsocSettings {
    /// Lower Q prior
    pub q_min: f64,
    /// Upper Q prior
    pub q_max: f64,
    /// Starting Q
    pub q_guess: f64,
    /// Lower JPA Q prior
    pub q_jpa_min: f64,
    /// Upper JPA Q prior
    pub q_jpa_max: f64,
    /// Starting JPA Q
    pub q_jpa_guess: f64,
    /// Position of the f0 guess as a fraction of the band (by index)
    pub f0_guess_position: f64,
}

/// Line-delay deconvolution settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeconvolutionSettings {
    /// Points at each end treated as resonance-free line
    pub end_points: usize,
    /// Points on each side of f0 compared to find the coupling regime
    pub sign_window: usize,
    /// Smallest acceptable `|1 - sign * |Gamma||` before coupling is degenerate
    pub coupling_epsilon: f64,
}

/// Widescan settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WidescanSettings {
    /// Fraction of bins treated as peak candidates (5% works well)
    pub data_fraction: f64,
}

/// RFSoC tone search settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToneSettings {
    /// Number of tones the spectrum is expected to hold
    pub n_tones: usize,
    /// Window width, in bins, searched for one tone
    pub window_len: usize,
    /// Starting lower bound for the tone/noise threshold
    pub ratio_low: f64,
    /// Starting upper bound for the tone/noise threshold
    pub ratio_high: f64,
    /// Bisection rounds before giving up
    pub max_loops: usize,
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Logging level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format
    pub format: OutputFormat,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            xtol: 1e-12,
            ftol: 1e-12,
            gtol: 1e-12,
            initial_lambda: 1e-3,
        }
    }
}

impl Default for GuardSettings {
    fn default() -> Self {
        Self {
            min_points: 16,
            min_relative_uncertainty: 1e-9,
        }
    }
}

impl Default for TransmissionSettings {
    fn default() -> Self {
        Self {
            outer_fraction: 0.1,
            low_response_ratio: 0.02,
            q_span: 20.0,
            q_span_low_response: 50.0,
            noise_max: 0.1,
        }
    }
}

impl Default for ReflectionSettings {
    fn default() -> Self {
        Self {
            outer_fraction: 0.1,
            q_span: 100.0,
            beta_max: 10.0,
            delay_max: 5e-5,
        }
    }
}

impl Default for RfsocSettings {
    fn default() -> Self {
        Self {
            q_min: 1000.0,
            q_max: 100_000.0,
            q_guess: 20_000.0,
            q_jpa_min: 100.0,
            q_jpa_max: 20_000.0,
            q_jpa_guess: 5000.0,
            f0_guess_position: 0.75,
        }
    }
}

impl Default for DeconvolutionSettings {
    fn default() -> Self {
        Self {
            end_points: 5,
            sign_window: 5,
            coupling_epsilon: 1e-9,
        }
    }
}

impl Default for WidescanSettings {
    fn default() -> Self {
        Self {
            data_fraction: 0.05,
        }
    }
}

impl Default for ToneSettings {
    fn default() -> Self {
        Self {
            n_tones: 40,
            window_len: 10,
            ratio_low: 0.0,
            ratio_high: 20.0,
            max_loops: 50,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: OutputFormat::Pretty,
        }
    }
}

/// Largest parameter count of any model; `min_points` must exceed it.
const MAX_MODEL_PARAMS: usize = 6;

fn positive_finite(name: &str, value: f64) -> FitResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(FitError::Configuration(format!(
            "{name} must be positive and finite, got {value}"
        )))
    }
}

fn fraction(name: &str, value: f64) -> FitResult<()> {
    if value.is_finite() && value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(FitError::Configuration(format!(
            "{name} must be in (0, 1], got {value}"
        )))
    }
}

impl FitSettings {
    /// Load settings from `config/fits.toml` and environment variables
    ///
    /// A missing file is not an error: the defaults and environment still apply.
    pub fn load() -> FitResult<Self> {
        Self::load_from("config/fits.toml")
    }

    /// Load settings from a specific file path
    pub fn load_from<P: AsRef<Path>>(path: P) -> FitResult<Self> {
        let settings: FitSettings = Figment::from(Serialized::defaults(FitSettings::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("RESONANCE_FIT_").split("__"))
            .extract()?;
        Ok(settings)
    }

    /// Validate settings after loading
    pub fn validate(&self) -> FitResult<()> {
        let solver = &self.solver;
        if solver.max_iterations == 0 {
            return Err(FitError::Configuration(
                "solver.max_iterations must be at least 1".into(),
            ));
        }
        positive_finite("solver.xtol", solver.xtol)?;
        positive_finite("solver.ftol", solver.ftol)?;
        positive_finite("solver.gtol", solver.gtol)?;
        positive_finite("solver.initial_lambda", solver.initial_lambda)?;

        if self.guards.min_points <= MAX_MODEL_PARAMS {
            return Err(FitError::Configuration(format!(
                "guards.min_points must exceed {MAX_MODEL_PARAMS}, got {}",
                self.guards.min_points
            )));
        }
        positive_finite(
            "guards.min_relative_uncertainty",
            self.guards.min_relative_uncertainty,
        )?;

        let t = &self.transmission;
        fraction("transmission.outer_fraction", t.outer_fraction)?;
        fraction("transmission.low_response_ratio", t.low_response_ratio)?;
        positive_finite("transmission.noise_max", t.noise_max)?;
        if !(t.q_span > 1.0 && t.q_span_low_response > 1.0) {
            return Err(FitError::Configuration(
                "transmission Q spans must be greater than 1".into(),
            ));
        }

        let r = &self.reflection;
        fraction("reflection.outer_fraction", r.outer_fraction)?;
        positive_finite("reflection.beta_max", r.beta_max)?;
        positive_finite("reflection.delay_max", r.delay_max)?;
        if r.q_span <= 1.0 {
            return Err(FitError::Configuration(
                "reflection.q_span must be greater than 1".into(),
            ));
        }

        let rf = &self.rfsoc;
        positive_finite("rfsoc.q_min", rf.q_min)?;
        positive_finite("rfsoc.q_jpa_min", rf.q_jpa_min)?;
        if !(rf.q_min <= rf.q_guess && rf.q_guess <= rf.q_max) {
            return Err(FitError::Configuration(format!(
                "rfsoc.q_guess {} must lie in [{}, {}]",
                rf.q_guess, rf.q_min, rf.q_max
            )));
        }
        if !(rf.q_jpa_min <= rf.q_jpa_guess && rf.q_jpa_guess <= rf.q_jpa_max) {
            return Err(FitError::Configuration(format!(
                "rfsoc.q_jpa_guess {} must lie in [{}, {}]",
                rf.q_jpa_guess, rf.q_jpa_min, rf.q_jpa_max
            )));
        }
        if !(0.0..1.0).contains(&rf.f0_guess_position) {
            return Err(FitError::Configuration(format!(
                "rfsoc.f0_guess_position must be in [0, 1), got {}",
                rf.f0_guess_position
            )));
        }

        let d = &self.deconvolution;
        if d.end_points < 1 || d.sign_window < 1 {
            return Err(FitError::Configuration(
                "deconvolution windows must hold at least one point".into(),
            ));
        }
        positive_finite("deconvolution.coupling_epsilon", d.coupling_epsilon)?;

        fraction("widescan.data_fraction", self.widescan.data_fraction)?;

        let tones = &self.tones;
        if tones.n_tones == 0 || tones.window_len < 2 || tones.max_loops == 0 {
            return Err(FitError::Configuration(
                "tones need n_tones >= 1, window_len >= 2 and max_loops >= 1".into(),
            ));
        }
        if !(tones.ratio_low >= 0.0 && tones.ratio_low < tones.ratio_high) {
            return Err(FitError::Configuration(format!(
                "tones ratio bounds [{}, {}] are inconsistent",
                tones.ratio_low, tones.ratio_high
            )));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(FitError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            )));
        }

        Ok(())
    }
}
