use crate::params::{GeneratorParams, PackerParams, PlacerParams};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ContourShape {
    Circle,
    Ellipse,
    Polygon,
}

// Fascicle contour, loaded from config.toml
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ContourConfig {
    pub shape: ContourShape,
    #[serde(default)]
    pub center: (f64, f64),
    /// Radius of a circle, or first semi-axis of an ellipse (um).
    #[serde(default)]
    pub r1: f64,
    /// Second semi-axis of an ellipse (um). 0 or equal to r1 means circle.
    #[serde(default)]
    pub r2: f64,
    /// Ellipse rotation in radians.
    #[serde(default)]
    pub rot: f64,
    /// Polygon vertices as (y, z) pairs.
    #[serde(default)]
    pub vertices: Vec<(f64, f64)>,
}

// Population generation settings, loaded from config.toml
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct PopulationConfig {
    #[serde(default = "default_n_fibers")]
    pub n_fibers: usize,
    /// Target fiber volume fraction. When set, overrides `n_fibers`.
    #[serde(default)]
    pub fvf: Option<f64>,
    /// Area to fill (um^2). When set, fibers are drawn until the area is filled.
    #[serde(default)]
    pub fill_area: Option<f64>,
    #[serde(default = "default_percent_unmyelinated")]
    pub percent_unmyelinated: f64,
    /// Histogram CSV for myelinated diameters.
    pub myelinated_stat: PathBuf,
    /// Histogram CSV for unmyelinated diameters.
    pub unmyelinated_stat: PathBuf,
    #[serde(default = "default_grid_resolution")]
    pub grid_resolution: usize,
    #[serde(default = "default_true")]
    pub fvf_double_area: bool,
    #[serde(default)]
    pub one_gamma: bool,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_true")]
    pub with_node_shift: bool,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlacementMethod {
    Placer,
    Packer,
}

// Placement settings, loaded from config.toml
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct PlacementConfig {
    #[serde(default = "default_method")]
    pub method: PlacementMethod,
    /// Shared clearance; each method falls back to its own default when unset.
    #[serde(default)]
    pub delta: Option<f64>,
    #[serde(default)]
    pub delta_trace: Option<f64>,
    #[serde(default)]
    pub delta_in: Option<f64>,
    /// Guard count for the placer or iteration count for the packer.
    #[serde(default)]
    pub n_iter: Option<usize>,
    #[serde(default = "default_v_att")]
    pub v_att: f64,
    #[serde(default = "default_v_rep")]
    pub v_rep: f64,
    #[serde(default)]
    pub fit_to_size: bool,
}

// Output settings, loaded from config.toml
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct OutputConfig {
    pub base_filename: String,
    #[serde(default = "default_true")]
    pub save_population: bool,
    #[serde(default = "default_true")]
    pub save_report: bool,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        PlacementConfig {
            method: default_method(),
            delta: None,
            delta_trace: None,
            delta_in: None,
            n_iter: None,
            v_att: default_v_att(),
            v_rep: default_v_rep(),
            fit_to_size: false,
        }
    }
}

fn default_n_fibers() -> usize {
    100
}

fn default_percent_unmyelinated() -> f64 {
    0.7
}

fn default_grid_resolution() -> usize {
    500
}

fn default_true() -> bool {
    true
}

fn default_seed() -> u64 {
    0
}

fn default_method() -> PlacementMethod {
    PlacementMethod::Placer
}

fn default_v_att() -> f64 {
    0.01
}

fn default_v_rep() -> f64 {
    0.1
}

// Main run configuration, loaded from config.toml.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct PackingConfig {
    pub contour: ContourConfig,
    pub population: PopulationConfig,
    #[serde(default)]
    pub placement: PlacementConfig,
    pub output: OutputConfig,
}

impl PackingConfig {
    /// Loads the run configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        let config_str = std::fs::read_to_string(path_ref)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path_ref.display(), e))?;
        Self::from_toml_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Invalid config '{}': {}", path_ref.display(), e))
    }

    /// Parses and validates a configuration from TOML text.
    pub fn from_toml_str(config_str: &str) -> Result<Self> {
        let config: PackingConfig = toml::from_str(config_str)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        match self.contour.shape {
            ContourShape::Circle | ContourShape::Ellipse => {
                if self.contour.r1 <= 0.0 {
                    anyhow::bail!("contour.r1 must be positive.");
                }
                if self.contour.shape == ContourShape::Ellipse && self.contour.r2 < 0.0 {
                    anyhow::bail!("contour.r2 must not be negative.");
                }
            }
            ContourShape::Polygon => {
                if self.contour.vertices.len() < 3 {
                    anyhow::bail!("contour.vertices needs at least 3 points for a polygon.");
                }
            }
        }
        let pop = &self.population;
        if !(0.0..=1.0).contains(&pop.percent_unmyelinated) {
            anyhow::bail!("percent_unmyelinated must be within [0, 1].");
        }
        if let Some(fvf) = pop.fvf {
            if !(fvf > 0.0 && fvf <= 1.0) {
                anyhow::bail!("fvf must be within (0, 1].");
            }
        }
        if let Some(area) = pop.fill_area {
            if area <= 0.0 {
                anyhow::bail!("fill_area must be positive.");
            }
        }
        if pop.fvf.is_none() && pop.fill_area.is_none() && pop.n_fibers == 0 {
            anyhow::bail!("n_fibers must be greater than 0.");
        }
        if pop.grid_resolution < 2 {
            anyhow::bail!("grid_resolution must be at least 2.");
        }
        if self.placement.delta.is_some_and(|d| d < 0.0) {
            anyhow::bail!("placement.delta must not be negative.");
        }
        Ok(())
    }

    /// Parameters of the random-sequential placer.
    pub fn placer_params(&self) -> PlacerParams {
        let p = &self.placement;
        let mut params = match p.delta {
            Some(delta) => PlacerParams::with_delta(delta),
            None => PlacerParams::default(),
        };
        if let Some(delta_trace) = p.delta_trace {
            params.delta_trace = delta_trace;
        }
        if let Some(delta_in) = p.delta_in {
            params.delta_in = delta_in;
        }
        if let Some(n_iter) = p.n_iter {
            params.n_iter = n_iter;
        }
        params
    }

    /// Parameters of the force-directed packer.
    pub fn packer_params(&self) -> PackerParams {
        let p = &self.placement;
        PackerParams {
            delta: p.delta.unwrap_or(PackerParams::default().delta),
            n_iter: p.n_iter.unwrap_or(PackerParams::default().n_iter),
            v_att: p.v_att,
            v_rep: p.v_rep,
            fit_to_size: p.fit_to_size,
        }
    }

    /// Parameters of the statistical generator.
    pub fn generator_params(&self) -> GeneratorParams {
        GeneratorParams {
            percent_unmyelinated: self.population.percent_unmyelinated,
            grid_resolution: self.population.grid_resolution,
            fvf_double_area: self.population.fvf_double_area,
            one_gamma: self.population.one_gamma,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [contour]
        shape = "circle"
        center = [0.0, 0.0]
        r1 = 50.0

        [population]
        n_fibers = 3
        myelinated_stat = "m.csv"
        unmyelinated_stat = "u.csv"

        [output]
        base_filename = "run"
    "#;

    #[test]
    fn defaults_are_filled_in() {
        let config = PackingConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.population.grid_resolution, 500);
        assert!(config.population.fvf_double_area);
        assert_eq!(config.placement.method, PlacementMethod::Placer);
        assert_eq!(config.placer_params().n_iter, 500);
        assert_eq!(config.packer_params().n_iter, 20_000);
        assert!((config.placer_params().delta_in - 0.01).abs() < 1e-12);
    }

    #[test]
    fn unset_delta_uses_each_method_default() {
        let packer = format!("{}\n[placement]\nmethod = \"packer\"\n", MINIMAL);
        let config = PackingConfig::from_toml_str(&packer).unwrap();
        assert_eq!(config.placement.delta, None);
        assert!((config.packer_params().delta - 1.0).abs() < 1e-12);
        assert!((config.placer_params().delta_trace - 0.01).abs() < 1e-12);
        assert!((config.placer_params().delta_in - 0.01).abs() < 1e-12);
    }

    #[test]
    fn rejects_bad_percent() {
        let bad = MINIMAL.replace("n_fibers = 3", "n_fibers = 3\npercent_unmyelinated = 1.5");
        assert!(PackingConfig::from_toml_str(&bad).is_err());
    }

    #[test]
    fn rejects_degenerate_polygon() {
        let bad = MINIMAL.replace("shape = \"circle\"", "shape = \"polygon\"\nvertices = [[0.0, 0.0], [1.0, 0.0]]");
        assert!(PackingConfig::from_toml_str(&bad).is_err());
    }

    #[test]
    fn placement_overrides_apply() {
        let with_placement = format!(
            "{}\n[placement]\nmethod = \"packer\"\ndelta = 1.0\ndelta_in = 2.0\nn_iter = 150\n",
            MINIMAL
        );
        let config = PackingConfig::from_toml_str(&with_placement).unwrap();
        assert_eq!(config.placement.method, PlacementMethod::Packer);
        let placer = config.placer_params();
        assert_eq!(placer.n_iter, 150);
        assert!((placer.delta_trace - 1.0).abs() < 1e-12);
        assert!((placer.delta_in - 2.0).abs() < 1e-12);
        assert_eq!(config.packer_params().n_iter, 150);
    }
}
