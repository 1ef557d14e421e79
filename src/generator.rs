//! Drawing fiber populations from fitted statistics.

use crate::error::{PackingError, Result};
use crate::population::FiberType;
use crate::stats::StatModel;
use log::{debug, info};
use rand::seq::SliceRandom;
use rand::Rng;
use std::f64::consts::PI;

/// Fiber volume fraction used by area filling when none is given.
pub const DEFAULT_FVF: f64 = 0.55;

/// How many fibers to draw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FiberCount {
    Exact(usize),
    /// Derive the count from a target fiber volume fraction of the contour.
    Fvf(f64),
    /// Draw until `Σ area / fvf` reaches `area`.
    FillArea { area: f64, fvf: f64 },
}

/// Unplaced fibers, in a random order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeneratedPopulation {
    pub types: Vec<FiberType>,
    pub diameters: Vec<f64>,
}

impl GeneratedPopulation {
    pub fn len(&self) -> usize {
        self.diameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diameters.is_empty()
    }

    pub fn count_of(&self, fiber_type: FiberType) -> usize {
        self.types.iter().filter(|&&t| t == fiber_type).count()
    }
}

#[derive(Debug, Clone)]
pub struct AreaFill {
    pub population: GeneratedPopulation,
    /// Final `Σ area / fvf`.
    pub filled_area: f64,
}

fn check_proportion(p: f64) -> Result<()> {
    if (0.0..=1.0).contains(&p) {
        Ok(())
    } else {
        Err(PackingError::config(format!("percent_unmyelinated must be in [0, 1], got {p}")))
    }
}

/// Splits `n` into `(unmyelinated, myelinated)` with `floor(n * p)` unmyelinated.
pub fn split_counts(n: usize, percent_unmyelinated: f64) -> (usize, usize) {
    let u = ((n as f64) * percent_unmyelinated + 1e-9).floor() as usize;
    let u = u.min(n);
    (u, n - u)
}

/// Draws exactly `n` fibers, `floor(n * p)` of them unmyelinated, and
/// applies one joint permutation to types and diameters.
pub fn create_from_stat<R: Rng>(
    n: usize,
    percent_unmyelinated: f64,
    myelinated: &StatModel,
    unmyelinated: &StatModel,
    grid_resolution: usize,
    rng: &mut R,
) -> Result<GeneratedPopulation> {
    check_proportion(percent_unmyelinated)?;
    let (n_u, n_m) = split_counts(n, percent_unmyelinated);
    info!("Generating {} fibers ({} myelinated, {} unmyelinated)", n, n_m, n_u);

    let mut diameters = myelinated.sample(n_m, grid_resolution, rng)?;
    diameters.extend(unmyelinated.sample(n_u, grid_resolution, rng)?);
    let mut types = vec![FiberType::Myelinated; n_m];
    types.extend(std::iter::repeat(FiberType::Unmyelinated).take(n_u));

    let mut population = GeneratedPopulation { types, diameters };
    shuffle_jointly(&mut population, rng);
    Ok(population)
}

/// Fiber count for a target FVF.
///
/// `E_d` mixes the two histogram expectations by `p`, `E_A = pi (E_d / 2)^2`,
/// and `n = round(fvf * area / (k * E_A))` with `k = 2` when `double_area`.
pub fn fvf_fiber_count(
    fvf: f64,
    contour_area: f64,
    percent_unmyelinated: f64,
    myelinated_expected: f64,
    unmyelinated_expected: f64,
    double_area: bool,
) -> usize {
    let e_d = percent_unmyelinated * unmyelinated_expected + (1.0 - percent_unmyelinated) * myelinated_expected;
    let e_a = PI * (e_d / 2.0).powi(2);
    let k = if double_area { 2.0 } else { 1.0 };
    let n = (fvf * contour_area / (k * e_a)).round();
    if n.is_finite() && n > 0.0 {
        n as usize
    } else {
        0
    }
}

/// Draws fibers one at a time until their cumulative area divided by
/// `fvf` reaches `area`. `grid_resolution` sizes the fallback grid of
/// [`StatModel::rvs`].
pub fn fill_area_with_fibers<R: Rng>(
    area: f64,
    percent_unmyelinated: f64,
    fvf: f64,
    myelinated: &StatModel,
    unmyelinated: &StatModel,
    grid_resolution: usize,
    rng: &mut R,
) -> Result<AreaFill> {
    check_proportion(percent_unmyelinated)?;
    if !(fvf > 0.0 && fvf <= 1.0) {
        return Err(PackingError::config(format!("fvf must be in (0, 1], got {fvf}")));
    }
    if !(area > 0.0) || !area.is_finite() {
        return Err(PackingError::config(format!("area to fill must be positive, got {area}")));
    }

    let mut population = GeneratedPopulation::default();
    let mut filled_area = 0.0;
    while filled_area < area {
        let (fiber_type, model) = if rng.random_bool(percent_unmyelinated) {
            (FiberType::Unmyelinated, unmyelinated)
        } else {
            (FiberType::Myelinated, myelinated)
        };
        let d = model.rvs(grid_resolution, rng)?;
        filled_area += PI * (d / 2.0).powi(2) / fvf;
        population.types.push(fiber_type);
        population.diameters.push(d);
    }
    debug!("Area {:.1} filled with {} fibers", area, population.len());

    shuffle_jointly(&mut population, rng);
    Ok(AreaFill { population, filled_area })
}

fn shuffle_jointly<R: Rng>(population: &mut GeneratedPopulation, rng: &mut R) {
    let mut order: Vec<usize> = (0..population.len()).collect();
    order.shuffle(rng);
    population.types = order.iter().map(|&i| population.types[i]).collect();
    population.diameters = order.iter().map(|&i| population.diameters[i]).collect();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_is_floor_of_fraction() {
        assert_eq!(split_counts(100, 0.7), (70, 30));
        assert_eq!(split_counts(10, 0.33), (3, 7));
        assert_eq!(split_counts(7, 0.5), (3, 4));
        assert_eq!(split_counts(5, 0.0), (0, 5));
        assert_eq!(split_counts(5, 1.0), (5, 0));
    }

    #[test]
    fn fvf_count_keeps_factor_two_by_default() {
        // E_d = 2, E_A = pi
        let doubled = fvf_fiber_count(0.5, 1000.0 * PI, 0.5, 3.0, 1.0, true);
        let single = fvf_fiber_count(0.5, 1000.0 * PI, 0.5, 3.0, 1.0, false);
        assert_eq!(doubled, 250);
        assert_eq!(single, 500);
    }
}
