pub mod config;
pub mod params;
pub mod report;
pub mod vecmath;

// Re-export key types for easier use by dependent crates
pub use config::{ContourConfig, ContourShape, OutputConfig, PackingConfig, PlacementConfig, PlacementMethod, PopulationConfig};
pub use params::{GeneratorParams, PackerParams, PlacerParams};
pub use report::{PackingInfo, PackingReport};
pub use vecmath::Vec2;
