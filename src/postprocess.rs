//! Corrective passes and statistics over placed fibers.

use crate::diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSink};
use crate::population::FiberType;
use fiber_common::{PackingInfo, Vec2};
use log::debug;
use rayon::prelude::*;

/// Parallel columns of placed fibers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FiberColumns {
    pub diameters: Vec<f64>,
    pub positions: Vec<Vec2>,
    pub types: Vec<FiberType>,
}

impl FiberColumns {
    pub fn len(&self) -> usize {
        self.diameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diameters.is_empty()
    }

    /// Keeps the rows where `keep` is true.
    pub fn filtered(&self, keep: &[bool]) -> Self {
        let pick = |k: &&bool| **k;
        FiberColumns {
            diameters: self.diameters.iter().zip(keep).filter(|(_, k)| pick(k)).map(|(d, _)| *d).collect(),
            positions: self.positions.iter().zip(keep).filter(|(_, k)| pick(k)).map(|(p, _)| *p).collect(),
            types: self.types.iter().zip(keep).filter(|(_, k)| pick(k)).map(|(t, _)| *t).collect(),
        }
    }
}

/// `true` for each fiber that overlaps no other within `delta`; both
/// members of a colliding pair are flagged.
pub fn collision_mask(diameters: &[f64], positions: &[Vec2], delta: f64, sink: &mut dyn DiagnosticSink) -> Vec<bool> {
    let keep: Vec<bool> = (0..positions.len())
        .into_par_iter()
        .map(|i| {
            !(0..positions.len()).any(|j| {
                j != i && positions[i].distance(positions[j]) < (diameters[i] + diameters[j]) / 2.0 + delta
            })
        })
        .collect();
    let n_removed = keep.iter().filter(|k| !**k).count();
    if n_removed > 0 {
        sink.report(Diagnostic::new(
            DiagnosticKind::CollisionsRemoved,
            n_removed,
            format!("{n_removed} fiber collisions detected, fibers discarded"),
        ));
    }
    keep
}

/// Drops every fiber involved in a collision within `delta`.
pub fn remove_collision(columns: &FiberColumns, delta: f64, sink: &mut dyn DiagnosticSink) -> FiberColumns {
    let keep = collision_mask(&columns.diameters, &columns.positions, delta, sink);
    columns.filtered(&keep)
}

/// `true` for each fiber lying entirely within the origin-centered circle
/// of diameter `diameter`.
pub fn outlier_mask(diameters: &[f64], positions: &[Vec2], diameter: f64) -> Vec<bool> {
    positions
        .iter()
        .zip(diameters)
        .map(|(p, d)| p.length() + d / 2.0 <= diameter / 2.0)
        .collect()
}

pub fn remove_outlier_axons(columns: &FiberColumns, diameter: f64, sink: &mut dyn DiagnosticSink) -> FiberColumns {
    let keep = outlier_mask(&columns.diameters, &columns.positions, diameter);
    let n_removed = keep.iter().filter(|k| !**k).count();
    if n_removed > 0 {
        sink.report(Diagnostic::new(
            DiagnosticKind::OutliersRemoved,
            n_removed,
            format!("{n_removed} outlier fibers discarded"),
        ));
    }
    columns.filtered(&keep)
}

/// Scales positions about the origin. Factors below 1 are clamped to 1.
pub fn expand_pop(positions: &[Vec2], factor: f64, sink: &mut dyn DiagnosticSink) -> Vec<Vec2> {
    let factor = if factor < 1.0 {
        sink.report(Diagnostic::new(
            DiagnosticKind::ExpansionClamped,
            0,
            format!("expansion factor {factor} must be at least one, set to 1"),
        ));
        1.0
    } else {
        factor
    };
    positions.iter().map(|&p| p * factor).collect()
}

/// Diameter of the smallest circle centered on the barycenter that holds
/// every fiber with a margin of `delta`.
pub fn get_circular_contour(diameters: &[f64], positions: &[Vec2], delta: f64) -> f64 {
    let center = barycenter(diameters, positions);
    let reach = positions
        .iter()
        .zip(diameters)
        .map(|(&p, d)| p.distance(center) + d / 2.0)
        .fold(f64::NEG_INFINITY, f64::max);
    2.0 * (reach + delta)
}

/// Diameter-weighted mean position.
pub fn barycenter(diameters: &[f64], positions: &[Vec2]) -> Vec2 {
    let total: f64 = diameters.iter().sum();
    if total <= 0.0 {
        return Vec2::zero();
    }
    positions
        .iter()
        .zip(diameters)
        .fold(Vec2::zero(), |acc, (&p, &d)| acc + p * d)
        / total
}

/// Edge-to-edge gap statistics. `None` with fewer than two fibers.
pub fn get_ppop_info(positions: &[Vec2], radii: &[f64]) -> Option<PackingInfo> {
    let n = positions.len();
    if n < 2 {
        return None;
    }
    let row_min: Vec<f64> = (0..n)
        .into_par_iter()
        .map(|i| {
            (0..n)
                .filter(|&j| j != i)
                .map(|j| positions[i].distance(positions[j]) - radii[i] - radii[j])
                .fold(f64::INFINITY, f64::min)
        })
        .collect();

    let min_dist = row_min.iter().copied().fold(f64::INFINITY, f64::min);
    let max_min_dist = row_min.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let avg_min_dist = row_min.iter().sum::<f64>() / n as f64;
    let (mut lo, mut hi) = ((f64::INFINITY, f64::INFINITY), (f64::NEG_INFINITY, f64::NEG_INFINITY));
    for p in positions {
        lo = (lo.0.min(p.y), lo.1.min(p.z));
        hi = (hi.0.max(p.y), hi.1.max(p.z));
    }
    debug!("minimal distance: {min_dist}, average minimal distance: {avg_min_dist}, maximal minimal distance: {max_min_dist}");
    Some(PackingInfo { n, min_dist, avg_min_dist, max_min_dist, outer_box: (lo, hi) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticLog;

    fn columns() -> FiberColumns {
        FiberColumns {
            diameters: vec![2.0, 2.0, 2.0, 4.0],
            positions: vec![Vec2::new(0.0, 0.0), Vec2::new(1.5, 0.0), Vec2::new(10.0, 0.0), Vec2::new(0.0, 20.0)],
            types: vec![FiberType::Myelinated, FiberType::Unmyelinated, FiberType::Myelinated, FiberType::Unmyelinated],
        }
    }

    #[test]
    fn collision_flags_both_members_and_is_idempotent() {
        let mut log = DiagnosticLog::new();
        let once = remove_collision(&columns(), 0.0, &mut log);
        assert_eq!(once.len(), 2);
        assert_eq!(once.types, vec![FiberType::Myelinated, FiberType::Unmyelinated]);
        assert_eq!(log.count_of(DiagnosticKind::CollisionsRemoved), 2);

        log.clear();
        let twice = remove_collision(&once, 0.0, &mut log);
        assert_eq!(twice, once);
        assert!(log.is_empty());
    }

    #[test]
    fn outliers_outside_diameter_are_dropped() {
        let mut log = DiagnosticLog::new();
        let kept = remove_outlier_axons(&columns(), 30.0, &mut log);
        assert_eq!(kept.len(), 3);
        assert_eq!(log.count_of(DiagnosticKind::OutliersRemoved), 1);
    }

    #[test]
    fn shrinking_expansion_is_clamped() {
        let pos = vec![Vec2::new(1.0, 2.0), Vec2::new(-3.0, 0.5)];
        let mut log = DiagnosticLog::new();
        assert_eq!(expand_pop(&pos, 0.5, &mut log), pos);
        assert!(log.has(DiagnosticKind::ExpansionClamped));
        let doubled = expand_pop(&pos, 2.0, &mut log);
        assert_eq!(doubled[1], Vec2::new(-6.0, 1.0));
    }

    #[test]
    fn circular_contour_and_barycenter() {
        let d = [2.0, 2.0, 4.0];
        let pos = [Vec2::new(-5.0, 0.0), Vec2::new(5.0, 0.0), Vec2::new(0.0, 0.0)];
        assert!((get_circular_contour(&d, &pos, 1.0) - 14.0).abs() < 1e-12);
        let shifted: Vec<Vec2> = pos.iter().map(|&p| p + Vec2::new(30.0, -12.5)).collect();
        assert!((get_circular_contour(&d, &shifted, 1.0) - 14.0).abs() < 1e-9);
        let b = barycenter(&[1.0, 3.0], &[Vec2::new(0.0, 0.0), Vec2::new(4.0, 8.0)]);
        assert_eq!(b, Vec2::new(3.0, 6.0));
    }

    #[test]
    fn ppop_info_uses_edge_gaps() {
        let pos = vec![Vec2::new(0.0, 0.0), Vec2::new(3.0, 0.0), Vec2::new(10.0, 0.0)];
        let info = get_ppop_info(&pos, &[1.0, 1.0, 1.0]).unwrap();
        assert_eq!(info.n, 3);
        assert!((info.min_dist - 1.0).abs() < 1e-12);
        assert!((info.max_min_dist - 5.0).abs() < 1e-12);
        assert!((info.avg_min_dist - 7.0 / 3.0).abs() < 1e-12);
        assert_eq!(info.outer_box, ((0.0, 0.0), (10.0, 0.0)));
        assert!(get_ppop_info(&pos[..1], &[1.0]).is_none());
    }
}
