//! Force-directed packing of fibers around a gravity center.
//!
//! Fibers start on a square grid wide enough that none touch, then relax for
//! a fixed number of Euler steps: free fibers drift toward the center at
//! `v_att`, colliding fibers are pushed apart at `v_rep`. Collisions are found
//! through a [`CellGrid`] rebuilt every iteration; the per-fiber velocity pass
//! reads the previous positions only and runs in parallel. A repulsion-only
//! settle pass then separates the pairs still closer than `delta`.

use crate::grid::CellGrid;
use crate::postprocess::barycenter;
use fiber_common::{PackerParams, Vec2};
use log::{debug, info, warn};
use rand::seq::index;
use rand::Rng;
use rayon::prelude::*;

// Keeps the attraction finite for a fiber sitting on the gravity center.
const ATTRACTION_EPSILON: f64 = 1e-10;

/// Cap on repulsion-only steps after the relaxation.
const MAX_SETTLE_STEPS: usize = 10_000;

/// Square grid seed: `ceil(sqrt n)^2` slots spaced `max_d + delta` apart,
/// centered on the origin, with the surplus slots removed at random.
pub fn initial_grid<R: Rng>(diameters: &[f64], delta: f64, rng: &mut R) -> Vec<Vec2> {
    let n = diameters.len();
    if n == 0 {
        return Vec::new();
    }
    let max_d = diameters.iter().copied().fold(f64::MIN, f64::max);
    let n_side = (n as f64).sqrt().ceil() as usize;
    let n_init = n_side * n_side;
    let size_init = n_side as f64 * (max_d + delta);
    let half = size_init / 2.0 - size_init / (2.0 * n_side as f64);
    let step = if n_side > 1 { 2.0 * half / (n_side - 1) as f64 } else { 0.0 };
    let coord = |k: usize| -half + step * k as f64;

    let mut keep = vec![true; n_init];
    for i in index::sample(rng, n_init, n_init - n) {
        keep[i] = false;
    }
    (0..n_init)
        .filter(|&slot| keep[slot])
        .map(|slot| Vec2::new(coord(slot % n_side), coord(slot / n_side)))
        .collect()
}

/// Summed repulsion on fiber `i`, `None` when it collides with nothing.
fn repulsion(i: usize, positions: &[Vec2], diameters: &[f64], grid: &CellGrid, params: &PackerParams) -> Option<Vec2> {
    let pos = positions[i];
    let mut repulsion = Vec2::zero();
    let mut colliding = false;
    grid.for_each_candidate(pos, Some(i), |j| {
        let reach = (diameters[i] + diameters[j]) / 2.0 + params.delta;
        let away = pos - positions[j];
        if away.length_squared() < reach * reach {
            colliding = true;
            repulsion += away.normalize_or_zero() * params.v_rep;
        }
        true
    });
    colliding.then_some(repulsion)
}

/// Velocity of fiber `i` for one step.
fn velocity(i: usize, positions: &[Vec2], diameters: &[f64], grid: &CellGrid, params: &PackerParams) -> Vec2 {
    repulsion(i, positions, diameters, grid, params).unwrap_or_else(|| {
        let to_center = -positions[i];
        let dist = (to_center.length_squared() + ATTRACTION_EPSILON).sqrt();
        to_center * (params.v_att / dist)
    })
}

/// Pushes colliding fibers apart, without attraction, until no pair is
/// closer than `delta`. Returns the number of steps taken.
fn settle(positions: &mut [Vec2], diameters: &[f64], cell_size: f64, params: &PackerParams) -> usize {
    for step in 0..MAX_SETTLE_STEPS {
        let current: &[Vec2] = positions;
        let grid = CellGrid::build(current, cell_size);
        let pushes: Vec<Option<Vec2>> = (0..current.len())
            .into_par_iter()
            .map(|i| repulsion(i, current, diameters, &grid, params))
            .collect();
        if pushes.iter().all(Option::is_none) {
            return step;
        }
        for (p, push) in positions.iter_mut().zip(pushes) {
            if let Some(v) = push {
                *p += v;
            }
        }
    }
    warn!("Packing settle pass stopped after {} steps with collisions left.", MAX_SETTLE_STEPS);
    MAX_SETTLE_STEPS
}

/// Packs fibers of the given diameters. The result is centered on the
/// diameter-weighted barycenter, in input order.
pub fn pack<R: Rng>(diameters: &[f64], params: &PackerParams, rng: &mut R) -> Vec<Vec2> {
    let n = diameters.len();
    info!("Packing {} fibers over {} iterations", n, params.n_iter);
    let mut positions = initial_grid(diameters, params.delta, rng);
    if n < 2 {
        return positions.iter().map(|_| Vec2::zero()).collect();
    }
    let max_d = diameters.iter().copied().fold(f64::MIN, f64::max);
    let cell_size = max_d + params.delta;

    let mut velocities = vec![Vec2::zero(); n];
    for iteration in 0..params.n_iter {
        let grid = CellGrid::build(&positions, cell_size);
        velocities
            .par_iter_mut()
            .enumerate()
            .for_each(|(i, v)| *v = velocity(i, &positions, diameters, &grid, params));
        for (p, v) in positions.iter_mut().zip(&velocities) {
            *p += *v;
        }
        if iteration % 5000 == 0 {
            debug!("packing iteration {}/{}", iteration, params.n_iter);
        }
    }
    let steps = settle(&mut positions, diameters, cell_size, params);
    debug!("settled in {} steps", steps);

    let center = barycenter(diameters, &positions);
    positions.iter().map(|&p| p - center).collect()
}
