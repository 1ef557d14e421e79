use serde::{Deserialize, Serialize};

/// Parameters of one guarded random-sequential placement run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlacerParams {
    /// Minimal clearance between a fiber and the contour trace (um).
    pub delta_trace: f64,
    /// Minimal clearance between two fibers (um).
    pub delta_in: f64,
    /// Guard: random candidates tried per fiber before giving up.
    pub n_iter: usize,
}

impl PlacerParams {
    /// Same clearance to the trace and between fibers.
    pub fn with_delta(delta: f64) -> Self {
        PlacerParams { delta_trace: delta, delta_in: delta, ..Default::default() }
    }
}

impl Default for PlacerParams {
    fn default() -> Self {
        PlacerParams { delta_trace: 0.01, delta_in: 0.01, n_iter: 500 }
    }
}

/// Parameters of one force-directed packing run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PackerParams {
    /// Fiber-to-fiber and fiber-to-contour clearance (um).
    pub delta: f64,
    /// Fixed number of relaxation iterations.
    pub n_iter: usize,
    /// Attraction speed towards the centroid (um per iteration).
    pub v_att: f64,
    /// Repulsion speed between colliding fibers (um per iteration).
    pub v_rep: f64,
    /// Spread the packed population out to fill a circular contour.
    pub fit_to_size: bool,
}

impl Default for PackerParams {
    fn default() -> Self {
        PackerParams {
            delta: 1.0,
            n_iter: 20_000,
            v_att: 0.01,
            v_rep: 0.1,
            fit_to_size: false,
        }
    }
}

/// Parameters of the statistical population generator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeneratorParams {
    /// Ratio of unmyelinated fibers, within [0, 1].
    pub percent_unmyelinated: f64,
    /// Number of grid points used for categorical diameter sampling.
    pub grid_resolution: usize,
    /// Keep the factor 2 in the FVF to fiber count conversion.
    pub fvf_double_area: bool,
    /// Force single-lobe fits for myelinated statistics.
    pub one_gamma: bool,
}

impl Default for GeneratorParams {
    fn default() -> Self {
        GeneratorParams {
            percent_unmyelinated: 0.7,
            grid_resolution: 500,
            fvf_double_area: true,
            one_gamma: false,
        }
    }
}
