//! Levenberg–Marquardt least squares with penalty priors and box bounds.
//!
//! The residual vector is the weighted data misfit `(model − data) / σ`
//! followed by one penalty entry per [`Prior`]. The model always sees the
//! prior-clamped parameters, while the solver iterates on the raw ones, so a
//! hard-limited parameter can sit slightly outside its limit in the returned
//! solution without the model ever having been evaluated there.
//!
//! Box bounds are enforced by projection: the starting point and every trial
//! step are projected into the box, and a parameter pinned at a bound whose
//! gradient pushes outward is frozen for that iteration.

use super::priors::{apply_priors, validate_priors, Prior};
use crate::config::SolverSettings;
use crate::error::{FitError, FitResult};
use nalgebra::{DMatrix, DVector};
use tracing::{debug, trace};

const LAMBDA_FLOOR: f64 = 1e-15;
const LAMBDA_CEILING: f64 = 1e16;

/// Closed box constraint on every parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Bounds {
    lower: Vec<f64>,
    upper: Vec<f64>,
}

impl Bounds {
    /// Bounds from per-parameter lower and upper limits.
    ///
    /// # Errors
    ///
    /// `FitConvergence` when the two vectors differ in length, a limit is NaN,
    /// or a lower limit exceeds its upper limit.
    pub fn new(lower: Vec<f64>, upper: Vec<f64>) -> FitResult<Self> {
        if lower.len() != upper.len() {
            return Err(FitError::FitConvergence(format!(
                "bounds have {} lower and {} upper limits",
                lower.len(),
                upper.len()
            )));
        }
        for (i, (lo, hi)) in lower.iter().zip(&upper).enumerate() {
            if lo.is_nan() || hi.is_nan() || lo > hi {
                return Err(FitError::FitConvergence(format!(
                    "inconsistent bounds for parameter {i}: [{lo}, {hi}]"
                )));
            }
        }
        Ok(Self { lower, upper })
    }

    /// Number of bounded parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lower.len()
    }

    /// True when there are no parameters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lower.is_empty()
    }

    fn project(&self, x: &mut [f64]) {
        for ((v, lo), hi) in x.iter_mut().zip(&self.lower).zip(&self.upper) {
            *v = v.clamp(*lo, *hi);
        }
    }

    /// Parameters pinned at a bound with the descent direction `-g` pointing out.
    fn frozen(&self, x: &[f64], gradient: &DVector<f64>) -> Vec<bool> {
        x.iter()
            .enumerate()
            .map(|(j, &v)| {
                (v <= self.lower[j] && gradient[j] > 0.0)
                    || (v >= self.upper[j] && gradient[j] < 0.0)
            })
            .collect()
    }
}

/// Why the iteration stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The gradient fell below `gtol`.
    Gradient,
    /// The relative cost reduction fell below `ftol`.
    CostReduction,
    /// The parameter step fell below `xtol`.
    Step,
    /// No damping could reduce the cost further.
    Stalled,
}

/// Result of a successful minimisation.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    /// Raw parameters at the minimum.
    pub params: Vec<f64>,
    /// Half the sum of squared residuals, penalties included.
    pub cost: f64,
    /// Sum of squared data residuals, penalties excluded.
    pub data_chisq: f64,
    /// Number of data residuals.
    pub n_points: usize,
    /// Outer iterations used.
    pub iterations: usize,
    /// Stopping criterion that fired.
    pub termination: Termination,
}

impl Solution {
    /// `data_chisq / (n_points − n_params)`.
    #[must_use]
    pub fn reduced_chisq(&self) -> f64 {
        let dof = self.n_points.saturating_sub(self.params.len()).max(1);
        self.data_chisq / dof as f64
    }
}

/// A weighted least-squares problem over a parameter vector.
pub struct LeastSquares<'a, M>
where
    M: Fn(&[f64]) -> Vec<f64>,
{
    model: M,
    data: &'a [f64],
    sigma: Vec<f64>,
    priors: Vec<Prior>,
    bounds: Option<Bounds>,
}

struct Evaluation {
    residuals: DVector<f64>,
    cost: f64,
    data_chisq: f64,
}

impl<'a, M> LeastSquares<'a, M>
where
    M: Fn(&[f64]) -> Vec<f64>,
{
    /// A problem fitting `model` to `data` with per-point uncertainty `sigma`.
    #[must_use]
    pub fn new(model: M, data: &'a [f64], sigma: Vec<f64>) -> Self {
        Self {
            model,
            data,
            sigma,
            priors: Vec::new(),
            bounds: None,
        }
    }

    /// Adds penalty priors.
    #[must_use]
    pub fn with_priors(mut self, priors: Vec<Prior>) -> Self {
        self.priors = priors;
        self
    }

    /// Adds box bounds.
    #[must_use]
    pub fn with_bounds(mut self, bounds: Bounds) -> Self {
        self.bounds = Some(bounds);
        self
    }

    fn evaluate(&self, x: &[f64]) -> FitResult<Option<Evaluation>> {
        let n = self.data.len();
        let (penalties, model_params) = apply_priors(&self.priors, x, n);
        let predicted = (self.model)(&model_params);
        if predicted.len() != n {
            return Err(FitError::InvalidInput(format!(
                "model produced {} values for {n} data points",
                predicted.len()
            )));
        }
        let mut residuals = Vec::with_capacity(n + penalties.len());
        residuals.extend(
            predicted
                .iter()
                .zip(self.data)
                .zip(&self.sigma)
                .map(|((m, d), s)| (m - d) / s),
        );
        let data_chisq: f64 = residuals.iter().map(|r| r * r).sum();
        residuals.extend(penalties);
        if residuals.iter().any(|r| !r.is_finite()) {
            return Ok(None);
        }
        let cost = 0.5 * residuals.iter().map(|r| r * r).sum::<f64>();
        Ok(Some(Evaluation {
            residuals: DVector::from_vec(residuals),
            cost,
            data_chisq,
        }))
    }

    /// Forward-difference Jacobian, stepping inward at an upper bound.
    fn jacobian(&self, x: &[f64], base: &DVector<f64>) -> FitResult<DMatrix<f64>> {
        let step_scale = f64::EPSILON.sqrt();
        let mut jac = DMatrix::zeros(base.len(), x.len());
        let mut probe = x.to_vec();
        for j in 0..x.len() {
            let mut h = step_scale * x[j].abs();
            if h == 0.0 {
                h = step_scale;
            }
            if let Some(bounds) = &self.bounds {
                if x[j] + h > bounds.upper[j] {
                    h = -h;
                }
            }
            probe[j] = x[j] + h;
            let shifted = self.evaluate(&probe)?.ok_or_else(|| {
                FitError::FitConvergence(format!(
                    "non-finite residuals while differentiating parameter {j}"
                ))
            })?;
            let column = (&shifted.residuals - base) / h;
            jac.set_column(j, &column);
            probe[j] = x[j];
        }
        Ok(jac)
    }

    /// Minimises the cost starting from `p0`.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` when `sigma` or the model output does not match the data.
    /// - `FitConvergence` for inconsistent priors or bounds, non-finite
    ///   residuals at the start, or when `max_iterations` is exhausted.
    pub fn solve(&self, p0: &[f64], settings: &SolverSettings) -> FitResult<Solution> {
        let n_params = p0.len();
        if self.sigma.len() != self.data.len() {
            return Err(FitError::InvalidInput(format!(
                "{} uncertainties for {} data points",
                self.sigma.len(),
                self.data.len()
            )));
        }
        validate_priors(&self.priors, n_params)?;
        if let Some(bounds) = &self.bounds {
            if bounds.len() != n_params {
                return Err(FitError::FitConvergence(format!(
                    "{} bounds for {n_params} parameters",
                    bounds.len()
                )));
            }
        }

        let mut x = p0.to_vec();
        if let Some(bounds) = &self.bounds {
            bounds.project(&mut x);
        }
        let mut current = self.evaluate(&x)?.ok_or_else(|| {
            FitError::FitConvergence("residuals are not finite at the initial guess".into())
        })?;
        let mut lambda = settings.initial_lambda;

        for iteration in 1..=settings.max_iterations {
            let jac = self.jacobian(&x, &current.residuals)?;
            let mut gradient = jac.transpose() * &current.residuals;
            let normal = jac.transpose() * &jac;

            let frozen = match &self.bounds {
                Some(bounds) => bounds.frozen(&x, &gradient),
                None => vec![false; n_params],
            };
            for (j, &f) in frozen.iter().enumerate() {
                if f {
                    gradient[j] = 0.0;
                }
            }

            if gradient.amax() <= settings.gtol {
                return Ok(self.finish(x, current, iteration, Termination::Gradient));
            }

            loop {
                let step = match damped_step(&normal, &gradient, &frozen, lambda) {
                    Some(step) => step,
                    None => {
                        lambda *= 10.0;
                        if lambda > LAMBDA_CEILING {
                            return Ok(self.finish(x, current, iteration, Termination::Stalled));
                        }
                        continue;
                    }
                };

                let mut trial: Vec<f64> = x.iter().zip(step.iter()).map(|(a, b)| a + b).collect();
                if let Some(bounds) = &self.bounds {
                    bounds.project(&mut trial);
                }
                let small_step = x
                    .iter()
                    .zip(&trial)
                    .all(|(a, b)| (b - a).abs() <= settings.xtol * (settings.xtol + a.abs()));

                let candidate = self.evaluate(&trial)?.filter(|e| e.cost < current.cost);
                match candidate {
                    Some(next) => {
                        let reduction = current.cost - next.cost;
                        let small_reduction = reduction <= settings.ftol * current.cost;
                        x = trial;
                        current = next;
                        lambda = (lambda * 0.1).max(LAMBDA_FLOOR);
                        trace!(iteration, cost = current.cost, lambda, "accepted step");
                        if small_step {
                            return Ok(self.finish(x, current, iteration, Termination::Step));
                        }
                        if small_reduction {
                            return Ok(self.finish(
                                x,
                                current,
                                iteration,
                                Termination::CostReduction,
                            ));
                        }
                        break;
                    }
                    None => {
                        if small_step {
                            return Ok(self.finish(x, current, iteration, Termination::Step));
                        }
                        lambda *= 10.0;
                        if lambda > LAMBDA_CEILING {
                            return Ok(self.finish(x, current, iteration, Termination::Stalled));
                        }
                    }
                }
            }
        }

        Err(FitError::FitConvergence(format!(
            "maximum iterations ({}) reached, cost {}",
            settings.max_iterations, current.cost
        )))
    }

    fn finish(
        &self,
        params: Vec<f64>,
        evaluation: Evaluation,
        iterations: usize,
        termination: Termination,
    ) -> Solution {
        debug!(
            iterations,
            cost = evaluation.cost,
            ?termination,
            "least squares finished"
        );
        Solution {
            params,
            cost: evaluation.cost,
            data_chisq: evaluation.data_chisq,
            n_points: self.data.len(),
            iterations,
            termination,
        }
    }
}

/// Solves `(A + λ diag(A)) δ = −g` with frozen parameters held in place.
fn damped_step(
    normal: &DMatrix<f64>,
    gradient: &DVector<f64>,
    frozen: &[bool],
    lambda: f64,
) -> Option<DVector<f64>> {
    let n = gradient.len();
    let mut system = normal.clone();
    let mut rhs = -gradient;
    for j in 0..n {
        if frozen[j] {
            for k in 0..n {
                system[(j, k)] = 0.0;
                system[(k, j)] = 0.0;
            }
            system[(j, j)] = 1.0;
            rhs[j] = 0.0;
        } else {
            let d = normal[(j, j)];
            let scale = if d > 0.0 { d } else { 1.0 };
            system[(j, j)] += lambda * scale;
        }
    }
    let step = match system.clone().cholesky() {
        Some(chol) => chol.solve(&rhs),
        None => system.lu().solve(&rhs)?,
    };
    step.iter().all(|v| v.is_finite()).then_some(step)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::priors::{Limit, Prior};
    use approx::assert_relative_eq;

    fn exp_model(x: &[f64]) -> impl Fn(&[f64]) -> Vec<f64> + '_ {
        move |p: &[f64]| x.iter().map(|t| p[0] * (-p[1] * t).exp()).collect()
    }

    #[test]
    fn test_recovers_exponential_decay() {
        let t: Vec<f64> = (0..30).map(|i| i as f64 * 0.1).collect();
        let data: Vec<f64> = t.iter().map(|v| 2.5 * (-1.3 * v).exp()).collect();
        let problem = LeastSquares::new(exp_model(&t), &data, vec![1.0; t.len()]);
        let solution = problem.solve(&[1.0, 0.5], &SolverSettings::default()).unwrap();
        assert_relative_eq!(solution.params[0], 2.5, epsilon = 1e-6);
        assert_relative_eq!(solution.params[1], 1.3, epsilon = 1e-6);
        assert!(solution.reduced_chisq() < 1e-10);
        assert_eq!(solution.n_points, 30);
    }

    #[test]
    fn test_linear_model_with_scatter() {
        let x: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let data: Vec<f64> = x
            .iter()
            .enumerate()
            .map(|(i, v)| 3.0 * v + 1.0 + if i % 2 == 0 { 0.5 } else { -0.5 })
            .collect();
        let model = |p: &[f64]| x.iter().map(|v| p[0] * v + p[1]).collect::<Vec<_>>();
        let solution = LeastSquares::new(model, &data, vec![0.5; 20])
            .solve(&[0.0, 0.0], &SolverSettings::default())
            .unwrap();
        let (slope, intercept) = crate::data::stats::linear_fit(&x, &data).unwrap();
        assert_relative_eq!(solution.params[0], slope, epsilon = 1e-6);
        assert_relative_eq!(solution.params[1], intercept, epsilon = 1e-5);
        // each point misses by about one sigma
        assert_relative_eq!(solution.data_chisq, 20.0, epsilon = 0.5);
        assert_relative_eq!(solution.reduced_chisq(), solution.data_chisq / 18.0);
    }

    #[test]
    fn test_box_bounds_pin_parameter() {
        let x: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let data: Vec<f64> = x.iter().map(|v| 2.0 * v).collect();
        let model = |p: &[f64]| x.iter().map(|v| p[0] * v).collect::<Vec<_>>();
        let bounds = Bounds::new(vec![0.0], vec![1.5]).unwrap();
        let solution = LeastSquares::new(model, &data, vec![1.0; 10])
            .with_bounds(bounds)
            .solve(&[5.0], &SolverSettings::default())
            .unwrap();
        assert_relative_eq!(solution.params[0], 1.5);
    }

    #[test]
    fn test_hard_prior_limits_model_value() {
        let x: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let data: Vec<f64> = x.iter().map(|v| 2.0 * v).collect();
        let model = |p: &[f64]| x.iter().map(|v| p[0] * v).collect::<Vec<_>>();
        let prior = Prior::between(0, Limit::hard(0.0, 0.1), Limit::hard(1.0, 0.1));
        let solution = LeastSquares::new(model, &data, vec![1.0; 10])
            .with_priors(vec![prior])
            .solve(&[0.5], &SolverSettings::default())
            .unwrap();
        // the penalty outweighs the data, so the raw value stays at the limit
        assert_relative_eq!(solution.params[0], 1.0, epsilon = 1e-2);
    }

    #[test]
    fn test_inconsistent_bounds_rejected() {
        assert!(matches!(
            Bounds::new(vec![2.0], vec![1.0]),
            Err(FitError::FitConvergence(_))
        ));
    }

    #[test]
    fn test_non_finite_start_rejected() {
        let data = vec![1.0; 5];
        let model = |p: &[f64]| vec![1.0 / p[0]; 5];
        let result = LeastSquares::new(model, &data, vec![1.0; 5])
            .solve(&[0.0], &SolverSettings::default());
        assert!(matches!(result, Err(FitError::FitConvergence(_))));
    }

    #[test]
    fn test_iteration_limit_reported() {
        let t: Vec<f64> = (0..30).map(|i| i as f64 * 0.1).collect();
        let data: Vec<f64> = t.iter().map(|v| 2.5 * (-1.3 * v).exp()).collect();
        let settings = SolverSettings {
            max_iterations: 1,
            ..Default::default()
        };
        let result =
            LeastSquares::new(exp_model(&t), &data, vec![1.0; 30]).solve(&[0.1, 5.0], &settings);
        assert!(matches!(result, Err(FitError::FitConvergence(_))));
    }
}
