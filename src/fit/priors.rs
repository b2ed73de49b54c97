//! Penalty priors on fit parameters.
//!
//! A prior adds one residual entry per parameter it watches. The entry is
//! zero while the parameter sits inside its limits and grows linearly with
//! the violation outside them. Hard limits also clamp the value handed to
//! the model and weight the penalty by `10 × n_points`, so the data can
//! never pull a hard-limited parameter far out of range.

use crate::error::{FitError, FitResult};

/// How strongly a limit is enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stiffness {
    /// Clamp for the model and weight the penalty by `10 × n_points`.
    Hard,
    /// Penalize with unit weight, leave the model value untouched.
    Soft,
}

/// One side of a prior.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limit {
    /// Value the parameter should not cross.
    pub bound: f64,
    /// Violation size that costs one unit of residual.
    pub scale: f64,
    /// Enforcement strength.
    pub stiffness: Stiffness,
}

impl Limit {
    /// A hard limit.
    #[must_use]
    pub fn hard(bound: f64, scale: f64) -> Self {
        Self {
            bound,
            scale,
            stiffness: Stiffness::Hard,
        }
    }

    /// A soft limit.
    #[must_use]
    pub fn soft(bound: f64, scale: f64) -> Self {
        Self {
            bound,
            scale,
            stiffness: Stiffness::Soft,
        }
    }

    fn weight(&self, n_points: usize) -> f64 {
        match self.stiffness {
            Stiffness::Hard => 10.0 * n_points as f64,
            Stiffness::Soft => 1.0,
        }
    }
}

/// Lower and/or upper limit on the parameter at index `param`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prior {
    /// Index into the parameter vector.
    pub param: usize,
    /// Lower limit, if any.
    pub lower: Option<Limit>,
    /// Upper limit, if any.
    pub upper: Option<Limit>,
}

impl Prior {
    /// A prior with both limits.
    #[must_use]
    pub fn between(param: usize, lower: Limit, upper: Limit) -> Self {
        Self {
            param,
            lower: Some(lower),
            upper: Some(upper),
        }
    }

    /// Hard limits on both sides sharing one scale.
    #[must_use]
    pub fn hard_range(param: usize, lower: f64, upper: f64, scale: f64) -> Self {
        Self::between(param, Limit::hard(lower, scale), Limit::hard(upper, scale))
    }

    /// Penalty residual and the value the model should see.
    ///
    /// The lower limit is checked before the upper one, so with inconsistent
    /// limits (rejected by [`validate_priors`]) the lower side would win.
    #[must_use]
    pub fn apply(&self, value: f64, n_points: usize) -> (f64, f64) {
        if let Some(lower) = self.lower {
            if value < lower.bound {
                let residual = lower.weight(n_points) * (value - lower.bound) / lower.scale;
                return (residual, clamped(lower, value));
            }
        }
        if let Some(upper) = self.upper {
            if value > upper.bound {
                let residual = upper.weight(n_points) * (upper.bound - value) / upper.scale;
                return (residual, clamped(upper, value));
            }
        }
        (0.0, value)
    }
}

fn clamped(limit: Limit, value: f64) -> f64 {
    match limit.stiffness {
        Stiffness::Hard => limit.bound,
        Stiffness::Soft => value,
    }
}

/// Rejects priors that point past the parameter vector, carry a
/// non-positive scale, or have a lower bound above their upper bound.
pub fn validate_priors(priors: &[Prior], n_params: usize) -> FitResult<()> {
    for prior in priors {
        if prior.param >= n_params {
            return Err(FitError::FitConvergence(format!(
                "prior on parameter {} but the model has {n_params}",
                prior.param
            )));
        }
        for limit in prior.lower.iter().chain(prior.upper.iter()) {
            if !(limit.scale.is_finite() && limit.scale > 0.0) || limit.bound.is_nan() {
                return Err(FitError::FitConvergence(format!(
                    "prior on parameter {} has bound {} with scale {}",
                    prior.param, limit.bound, limit.scale
                )));
            }
        }
        if let (Some(lower), Some(upper)) = (prior.lower, prior.upper) {
            if lower.bound > upper.bound {
                return Err(FitError::FitConvergence(format!(
                    "prior on parameter {} is inconsistent: lower {} above upper {}",
                    prior.param, lower.bound, upper.bound
                )));
            }
        }
    }
    Ok(())
}

/// Evaluates every prior against `params`.
///
/// Returns the penalty residuals (one per prior) and a copy of `params` with
/// hard limits applied, ready for the model.
#[must_use]
pub fn apply_priors(priors: &[Prior], params: &[f64], n_points: usize) -> (Vec<f64>, Vec<f64>) {
    let mut model_params = params.to_vec();
    let penalties = priors
        .iter()
        .map(|prior| {
            let (residual, value) = prior.apply(params[prior.param], n_points);
            model_params[prior.param] = value;
            residual
        })
        .collect();
    (penalties, model_params)
}
