use serde::{Deserialize, Serialize};

/// Pairwise-distance summary of a placed population.
///
/// Distances are edge-to-edge: center distance minus both radii.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackingInfo {
    /// Number of fibers considered.
    pub n: usize,
    /// Smallest edge-to-edge distance over all pairs.
    pub min_dist: f64,
    /// Mean over fibers of each fiber's nearest edge-to-edge distance.
    pub avg_min_dist: f64,
    /// Largest per-fiber nearest edge-to-edge distance.
    pub max_min_dist: f64,
    /// Axis-aligned box of the centers: ((y_min, z_min), (y_max, z_max)).
    pub outer_box: ((f64, f64), (f64, f64)),
}

/// A record of one generation + placement run, written next to the population file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackingReport {
    pub n_fibers: usize,
    pub n_myelinated: usize,
    pub n_unmyelinated: usize,
    pub n_placed: usize,
    /// Placed fiber area over contour area.
    pub fiber_volume_fraction: f64,
    #[serde(skip_serializing_if = "Option::is_none")] // Don't write "packing": null
    pub packing: Option<PackingInfo>,
}
