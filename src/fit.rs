//! Bounded nonlinear least squares.
//!
//! Levenberg-Marquardt with a forward-difference Jacobian. Every trial step
//! is projected back into the parameter box, so the returned parameters
//! always satisfy the bounds.

use log::trace;
use nalgebra::{DMatrix, DVector};

/// Box constraints for each parameter; `f64::INFINITY` for an open side.
#[derive(Debug, Clone)]
pub struct Bounds {
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

impl Bounds {
    pub fn new(lower: Vec<f64>, upper: Vec<f64>) -> Self {
        debug_assert_eq!(lower.len(), upper.len());
        Bounds { lower, upper }
    }

    pub fn len(&self) -> usize {
        self.lower.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lower.is_empty()
    }

    /// Feasible starting point: the midpoint of a closed interval, one unit
    /// inside a half-open one, 1 when unbounded.
    pub fn initial_guess(&self) -> Vec<f64> {
        self.lower
            .iter()
            .zip(&self.upper)
            .map(|(&lo, &hi)| match (lo.is_finite(), hi.is_finite()) {
                (true, true) => 0.5 * (lo + hi),
                (true, false) => lo + 1.0,
                (false, true) => hi - 1.0,
                (false, false) => 1.0,
            })
            .collect()
    }

    fn project(&self, p: &mut [f64]) {
        for ((v, &lo), &hi) in p.iter_mut().zip(&self.lower).zip(&self.upper) {
            *v = v.clamp(lo, hi);
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FitSettings {
    pub max_iterations: usize,
    /// Relative cost decrease under which the fit is considered converged.
    pub cost_tolerance: f64,
    /// Relative step size under which the fit is considered converged.
    pub step_tolerance: f64,
}

impl Default for FitSettings {
    fn default() -> Self {
        FitSettings { max_iterations: 10_000, cost_tolerance: 1e-12, step_tolerance: 1e-10 }
    }
}

#[derive(Debug, Clone)]
pub struct FitOutcome {
    pub params: Vec<f64>,
    /// Sum of squared residuals at `params`.
    pub cost: f64,
    pub iterations: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FitFailure {
    NonFinite,
    MaxIterations(usize),
}

impl std::fmt::Display for FitFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FitFailure::NonFinite => write!(f, "model produced non-finite residuals"),
            FitFailure::MaxIterations(n) => write!(f, "no convergence after {n} iterations"),
        }
    }
}

fn cost_of<F>(model: &F, x: &[f64], y: &[f64], p: &[f64]) -> f64
where
    F: Fn(f64, &[f64]) -> f64,
{
    x.iter().zip(y).map(|(&xi, &yi)| (model(xi, p) - yi).powi(2)).sum()
}

/// Fits `model(x, params)` to the points `(x, y)` within `bounds`.
pub fn curve_fit<F>(
    model: F,
    x: &[f64],
    y: &[f64],
    bounds: &Bounds,
    settings: FitSettings,
) -> Result<FitOutcome, FitFailure>
where
    F: Fn(f64, &[f64]) -> f64,
{
    let k = bounds.len();
    let m = x.len();
    let mut p = bounds.initial_guess();
    bounds.project(&mut p);
    let mut cost = cost_of(&model, x, y, &p);
    if !cost.is_finite() {
        return Err(FitFailure::NonFinite);
    }

    let mut lambda = 1e-3;
    for iteration in 0..settings.max_iterations {
        // Residuals and forward-difference Jacobian, stepping inward at an upper bound.
        let residuals = DVector::from_iterator(m, x.iter().zip(y).map(|(&xi, &yi)| model(xi, &p) - yi));
        let mut jac = DMatrix::<f64>::zeros(m, k);
        for j in 0..k {
            let mut h = 1e-7 * p[j].abs().max(1.0);
            if p[j] + h > bounds.upper[j] {
                h = -h;
            }
            let mut shifted = p.clone();
            shifted[j] += h;
            for (i, &xi) in x.iter().enumerate() {
                jac[(i, j)] = (model(xi, &shifted) - residuals[i] - y[i]) / h;
            }
        }
        if jac.iter().any(|v| !v.is_finite()) {
            return Err(FitFailure::NonFinite);
        }

        let jt = jac.transpose();
        let jtj = &jt * &jac;
        let gradient = &jt * &residuals;

        // Inner loop: raise damping until a step lowers the cost.
        loop {
            let mut damped = jtj.clone();
            for d in 0..k {
                let diag = jtj[(d, d)];
                damped[(d, d)] += lambda * if diag > 0.0 { diag } else { 1.0 };
            }
            let step = match damped.lu().solve(&(-&gradient)) {
                Some(step) => step,
                None => {
                    lambda *= 10.0;
                    if lambda > 1e16 {
                        trace!("curve_fit: singular system at iteration {iteration}, stopping");
                        return Ok(FitOutcome { params: p, cost, iterations: iteration });
                    }
                    continue;
                }
            };

            let mut trial: Vec<f64> = p.iter().zip(step.iter()).map(|(a, b)| a + b).collect();
            bounds.project(&mut trial);
            let trial_cost = cost_of(&model, x, y, &trial);

            if trial_cost.is_finite() && trial_cost < cost {
                let step_norm: f64 = trial.iter().zip(&p).map(|(a, b)| (a - b).powi(2)).sum::<f64>().sqrt();
                let p_norm: f64 = p.iter().map(|v| v * v).sum::<f64>().sqrt();
                let decrease = (cost - trial_cost) / cost.max(f64::MIN_POSITIVE);
                p = trial;
                cost = trial_cost;
                lambda = (lambda / 3.0).max(1e-12);
                if decrease < settings.cost_tolerance || step_norm < settings.step_tolerance * (p_norm + settings.step_tolerance) {
                    return Ok(FitOutcome { params: p, cost, iterations: iteration + 1 });
                }
                break;
            }

            lambda *= 2.0;
            // No downhill step inside the box: projected stationary point.
            if lambda > 1e16 {
                return Ok(FitOutcome { params: p, cost, iterations: iteration + 1 });
            }
        }

        if cost == 0.0 {
            return Ok(FitOutcome { params: p, cost, iterations: iteration + 1 });
        }
    }
    Err(FitFailure::MaxIterations(settings.max_iterations))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fits_exponential_decay() {
        let x: Vec<f64> = (0..30).map(|i| i as f64 * 0.2).collect();
        let y: Vec<f64> = x.iter().map(|&t| 3.0 * (-0.7 * t).exp()).collect();
        let bounds = Bounds::new(vec![0.0, 0.0], vec![10.0, 5.0]);
        let out = curve_fit(|t, p| p[0] * (-p[1] * t).exp(), &x, &y, &bounds, FitSettings::default()).unwrap();
        assert!((out.params[0] - 3.0).abs() < 1e-4, "{:?}", out.params);
        assert!((out.params[1] - 0.7).abs() < 1e-4, "{:?}", out.params);
    }

    #[test]
    fn respects_bounds() {
        let x: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|&t| 5.0 * t).collect();
        let bounds = Bounds::new(vec![0.0], vec![2.0]);
        let out = curve_fit(|t, p| p[0] * t, &x, &y, &bounds, FitSettings::default()).unwrap();
        assert!((out.params[0] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn initial_guess_follows_bound_kind() {
        let b = Bounds::new(vec![1.0, 0.0, f64::NEG_INFINITY, f64::NEG_INFINITY], vec![f64::INFINITY, 10.0, 4.0, f64::INFINITY]);
        assert_eq!(b.initial_guess(), vec![2.0, 5.0, 3.0, 1.0]);
    }
}
