//! Random sequential placement, largest fibers first.

use crate::contour::Contour;
use crate::diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSink};
use fiber_common::{PlacerParams, Vec2};
use log::{debug, info};
use rand::Rng;

/// Positions and placed flags, in the order of the input fibers.
/// Positions of unplaced fibers are meaningless.
#[derive(Debug, Clone, Default)]
pub struct PlacementResult {
    pub positions: Vec<Vec2>,
    pub placed: Vec<bool>,
}

impl PlacementResult {
    pub fn n_placed(&self) -> usize {
        self.placed.iter().filter(|&&p| p).count()
    }
}

/// Places circles of the given radii inside `contour`.
///
/// Fibers are visited by decreasing radius. Each one draws up to
/// `params.n_iter` candidate centers at least `r + delta_trace` inside the
/// contour and keeps the first whose distance to every placed center is at
/// least `r + r_other + delta_in`. The first fiber is kept on its first draw.
pub fn place_all<R: Rng>(
    radii: &[f64],
    contour: &dyn Contour,
    params: &PlacerParams,
    rng: &mut R,
    sink: &mut dyn DiagnosticSink,
) -> PlacementResult {
    let n = radii.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| radii[b].total_cmp(&radii[a]));

    let mut result = PlacementResult { positions: vec![Vec2::zero(); n], placed: vec![false; n] };
    // (center, radius) of everything placed so far.
    let mut placed: Vec<(Vec2, f64)> = Vec::with_capacity(n);

    for &i in &order {
        let r = radii[i];
        for _ in 0..params.n_iter {
            let Some(&candidate) = contour.sample_interior_points(1, r + params.delta_trace, &mut *rng).first() else {
                // No room left at this clearance; retrying cannot help.
                break;
            };
            let free = placed
                .iter()
                .all(|&(c, rc)| candidate.distance(c) >= r + rc + params.delta_in);
            if free {
                placed.push((candidate, r));
                result.positions[i] = candidate;
                result.placed[i] = true;
                break;
            }
        }
    }

    let n_placed = result.n_placed();
    info!("Placed {} of {} fibers", n_placed, n);
    if n_placed < n {
        debug!("{} fibers exhausted {} placement attempts", n - n_placed, params.n_iter);
        sink.report(Diagnostic::new(
            DiagnosticKind::PlacementShortfall,
            n - n_placed,
            format!("{} fiber(s) could not be placed in {} attempts", n - n_placed, params.n_iter),
        ));
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contour::Circle;
    use crate::diagnostics::DiagnosticLog;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn placed_fibers_do_not_overlap() {
        let contour = Circle::new(Vec2::zero(), 40.0).unwrap();
        let radii: Vec<f64> = (0..60).map(|i| 0.5 + (i % 5) as f64 * 0.8).collect();
        let params = PlacerParams { delta_trace: 0.5, delta_in: 0.3, n_iter: 500 };
        let mut rng = StdRng::seed_from_u64(11);
        let mut log = DiagnosticLog::new();
        let res = place_all(&radii, &contour, &params, &mut rng, &mut log);

        for i in 0..radii.len() {
            if !res.placed[i] {
                continue;
            }
            assert!(res.positions[i].length() <= 40.0 - radii[i] - 0.5 + 1e-9);
            for j in (i + 1)..radii.len() {
                if res.placed[j] {
                    assert!(res.positions[i].distance(res.positions[j]) >= radii[i] + radii[j] + 0.3 - 1e-9);
                }
            }
        }
    }

    #[test]
    fn shortfall_is_reported() {
        let contour = Circle::new(Vec2::zero(), 5.0).unwrap();
        let radii = vec![4.0, 4.0, 1.0];
        let mut rng = StdRng::seed_from_u64(1);
        let mut log = DiagnosticLog::new();
        let res = place_all(&radii, &contour, &PlacerParams::with_delta(0.01), &mut rng, &mut log);
        assert!(res.placed[0] ^ res.placed[1]);
        assert!(log.has(DiagnosticKind::PlacementShortfall));
    }
}
