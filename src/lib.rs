//! Synthetic nerve-fiber populations: diameter statistics, placement inside
//! a contour and post-placement checks.

pub mod contour;
pub mod diagnostics;
pub mod error;
pub mod fit;
pub mod generator;
pub mod grid;
pub mod io;
pub mod packer;
pub mod placer;
pub mod population;
pub mod postprocess;
pub mod stats;

pub use contour::{contour_from_config, create_contour, Circle, Contour, Ellipse, Polygon};
pub use diagnostics::{Diagnostic, DiagnosticKind, DiagnosticLog, DiagnosticSink};
pub use error::{PackingError, Result};
pub use generator::FiberCount;
pub use population::{
    Fiber, FiberType, GeometrySpec, MaskSource, Placement, Population, PopulationData, PopulationSource, ShapeParams,
    StatSource,
};
pub use stats::{Histogram, StatFitOptions, StatModel};
