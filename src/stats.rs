//! Fiber-diameter statistics: empirical histograms and the Gamma-mixture
//! models fitted to them.

use crate::error::{PackingError, Result};
use crate::fit::{curve_fit, Bounds, FitSettings};
use crate::population::FiberType;
use log::{debug, warn};
use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::Rng;
use rand_distr::Gamma;
use serde::{Deserialize, Serialize};
use statrs::function::gamma::ln_gamma;
use std::path::Path;

/// Location of the single-lobe model (minimal unmyelinated diameter, um).
pub const ONE_LOBE_LOCATION: f64 = 0.2;
/// Location of the first lobe of the two-lobe model (minimal A-delta diameter, um).
pub const FIRST_LOBE_LOCATION: f64 = 2.0;
/// Myelinated statistics reaching beyond this diameter get a second lobe.
pub const TWO_LOBE_THRESHOLD: f64 = 10.0;

/// Continuous draws tried before `rvs` falls back to the sampling grid.
const RVS_MAX_ATTEMPTS: usize = 10_000;

/// An empirical diameter histogram: bin-start diameters and their presence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    pub diameters: Vec<f64>,
    pub presence: Vec<f64>,
}

impl Histogram {
    pub fn new(diameters: Vec<f64>, presence: Vec<f64>) -> Result<Self> {
        if diameters.len() != presence.len() {
            return Err(PackingError::InvalidHistogram(format!(
                "{} bins but {} presence values",
                diameters.len(),
                presence.len()
            )));
        }
        if diameters.len() < 2 {
            return Err(PackingError::InvalidHistogram("at least two bins are needed".into()));
        }
        if diameters.iter().chain(&presence).any(|v| !v.is_finite()) {
            return Err(PackingError::InvalidHistogram("non-finite value".into()));
        }
        if presence.iter().all(|&p| p <= 0.0) {
            return Err(PackingError::InvalidHistogram("histogram carries no weight".into()));
        }
        Ok(Histogram { diameters, presence })
    }

    /// Reads a two-column CSV: bin-start diameter, presence. No header.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .comment(Some(b'#'))
            .trim(csv::Trim::All)
            .flexible(true)
            .from_path(path)?;
        let mut diameters = Vec::new();
        let mut presence = Vec::new();
        for record in reader.records() {
            let record = record?;
            let field = |i: usize| -> Result<f64> {
                record
                    .get(i)
                    .ok_or_else(|| PackingError::InvalidHistogram(format!("{}: missing column {}", path.display(), i)))?
                    .parse::<f64>()
                    .map_err(|e| PackingError::InvalidHistogram(format!("{}: {}", path.display(), e)))
            };
            diameters.push(field(0)?);
            presence.push(field(1)?);
        }
        Histogram::new(diameters, presence)
    }

    /// Spacing of the first two bins.
    pub fn bin_width(&self) -> f64 {
        self.diameters[1] - self.diameters[0]
    }

    /// Default support: smallest bin start to largest bin end.
    pub fn support(&self) -> (f64, f64) {
        let min = self.diameters.iter().copied().fold(f64::INFINITY, f64::min);
        let max = self.diameters.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        (min, max + self.bin_width())
    }

    /// Mean of diameter x presence over the bins, the un-fitted expectation
    /// used to turn a fiber volume fraction into a fiber count.
    pub fn expected(&self) -> f64 {
        let sum: f64 = self.diameters.iter().zip(&self.presence).map(|(d, p)| d * p).sum();
        sum / self.diameters.len() as f64
    }
}

/// One weighted, shifted Gamma density: `gain * Gamma_pdf(x - loc; shape, 1/rate)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GammaLobe {
    pub shape: f64,
    pub rate: f64,
    pub gain: f64,
    pub loc: f64,
}

impl GammaLobe {
    pub fn pdf(&self, x: f64) -> f64 {
        gamma_pdf(x - self.loc, self.shape, self.rate) * self.gain
    }
}

/// Gamma density with the given shape and rate, zero for `y < 0`.
fn gamma_pdf(y: f64, shape: f64, rate: f64) -> f64 {
    if rate <= 0.0 || y < 0.0 {
        return 0.0;
    }
    if y == 0.0 {
        return if shape == 1.0 { rate } else { 0.0 };
    }
    let ln_pdf = shape * rate.ln() + (shape - 1.0) * y.ln() - rate * y - ln_gamma(shape);
    ln_pdf.exp()
}

/// Options for fitting a [`StatModel`] to a histogram.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatFitOptions {
    /// Lower support bound; smallest bin start when `None`.
    pub d_min: Option<f64>,
    /// Upper support bound; largest bin end when `None`.
    pub d_max: Option<f64>,
    /// Force a single lobe for myelinated statistics.
    pub one_gamma: bool,
}

/// A fitted, immutable one- or two-lobe Gamma mixture over `[d_min, d_max]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatModel {
    pub name: String,
    pub lobes: Vec<GammaLobe>,
    pub d_min: f64,
    pub d_max: f64,
    /// Expected diameter of the source histogram, used for FVF-based counts.
    #[serde(default)]
    pub expected_diameter: f64,
}

fn one_lobe(x: f64, p: &[f64]) -> f64 {
    GammaLobe { shape: p[0], rate: p[1], gain: p[2], loc: ONE_LOBE_LOCATION }.pdf(x)
}

fn two_lobes(x: f64, p: &[f64]) -> f64 {
    GammaLobe { shape: p[0], rate: p[1], gain: p[2], loc: FIRST_LOBE_LOCATION }.pdf(x)
        + GammaLobe { shape: p[3], rate: p[4], gain: p[5], loc: p[6] }.pdf(x)
}

impl StatModel {
    /// Fits the model for `fiber_type` to `hist`.
    ///
    /// Myelinated statistics whose support goes past 10 um get two lobes
    /// unless `one_gamma` is set.
    pub fn fit(name: &str, hist: &Histogram, fiber_type: FiberType, options: StatFitOptions) -> Result<Self> {
        let (default_min, default_max) = hist.support();
        let d_min = options.d_min.unwrap_or(default_min);
        let d_max = options.d_max.unwrap_or(default_max);
        if !(d_max > d_min) {
            return Err(PackingError::InvalidHistogram(format!("empty support [{d_min}, {d_max}] for '{name}'")));
        }

        let two = fiber_type == FiberType::Myelinated && d_max > TWO_LOBE_THRESHOLD && !options.one_gamma;
        let settings = FitSettings::default();
        let inf = f64::INFINITY;
        let lobes = if two {
            let bounds = Bounds::new(vec![1.0, 2.0, 0.0, 1.0, 0.0, 0.0, 2.0], vec![inf, 15.0, inf, inf, 15.0, inf, 14.0]);
            let out = curve_fit(two_lobes, &hist.diameters, &hist.presence, &bounds, settings)
                .map_err(|e| PackingError::FitConvergence { stat: name.to_string(), reason: e.to_string() })?;
            debug!("Fitted two-lobe model '{}' in {} iterations (cost {:.3e}).", name, out.iterations, out.cost);
            let p = out.params;
            vec![
                GammaLobe { shape: p[0], rate: p[1], gain: p[2], loc: FIRST_LOBE_LOCATION },
                GammaLobe { shape: p[3], rate: p[4], gain: p[5], loc: p[6] },
            ]
        } else {
            let bounds = Bounds::new(vec![1.0, 0.0, 0.0], vec![inf, 10.0, inf]);
            let out = curve_fit(one_lobe, &hist.diameters, &hist.presence, &bounds, settings)
                .map_err(|e| PackingError::FitConvergence { stat: name.to_string(), reason: e.to_string() })?;
            debug!("Fitted one-lobe model '{}' in {} iterations (cost {:.3e}).", name, out.iterations, out.cost);
            let p = out.params;
            vec![GammaLobe { shape: p[0], rate: p[1], gain: p[2], loc: ONE_LOBE_LOCATION }]
        };

        let model = StatModel { name: name.to_string(), lobes, d_min, d_max, expected_diameter: hist.expected() };
        if model.total_gain() <= 0.0 {
            return Err(PackingError::FitConvergence {
                stat: name.to_string(),
                reason: "fitted density is identically zero".into(),
            });
        }
        Ok(model)
    }

    /// Loads a histogram CSV and fits it; the file stem names the model.
    pub fn from_csv<P: AsRef<Path>>(path: P, fiber_type: FiberType, options: StatFitOptions) -> Result<Self> {
        let path = path.as_ref();
        let hist = Histogram::from_csv(path)?;
        let name = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        Self::fit(&name, &hist, fiber_type, options)
    }

    pub fn is_two_lobe(&self) -> bool {
        self.lobes.len() == 2
    }

    fn total_gain(&self) -> f64 {
        self.lobes.iter().map(|l| l.gain).sum()
    }

    /// Fitted (unnormalized) density at `x`.
    pub fn pdf(&self, x: f64) -> f64 {
        self.lobes.iter().map(|l| l.pdf(x)).sum()
    }

    /// `resolution` evenly spaced diameters spanning `[d_min, d_max]`.
    pub fn grid(&self, resolution: usize) -> Vec<f64> {
        if resolution < 2 {
            return vec![self.d_min];
        }
        let step = (self.d_max - self.d_min) / (resolution - 1) as f64;
        (0..resolution).map(|i| self.d_min + step * i as f64).collect()
    }

    /// Draws `n` diameters from the density discretized on a
    /// `resolution`-point grid. Returned values are grid points.
    pub fn sample<R: Rng + ?Sized>(&self, n: usize, resolution: usize, rng: &mut R) -> Result<Vec<f64>> {
        self.sample_up_to(n, resolution, self.d_max, rng)
    }

    /// Grid sampling restricted to grid points not above `upper`.
    fn sample_up_to<R: Rng + ?Sized>(&self, n: usize, resolution: usize, upper: f64, rng: &mut R) -> Result<Vec<f64>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let grid = self.grid(resolution);
        let weights: Vec<f64> = grid
            .iter()
            .map(|&x| if x <= upper { self.pdf(x).max(0.0) } else { 0.0 })
            .collect();
        let dist = WeightedIndex::new(&weights).map_err(|e| {
            PackingError::InvalidHistogram(format!("'{}' has no mass on [{}, {}]: {}", self.name, self.d_min, upper, e))
        })?;
        Ok((0..n).map(|_| grid[dist.sample(rng)]).collect())
    }

    /// Upper cutoff applied by the rejection sampler, just below `d_max`.
    pub fn rvs_cutoff(&self) -> f64 {
        self.d_max - 0.01 * (self.d_max - self.d_min)
    }

    /// One continuous draw from the density truncated to `[d_min, d_max]`,
    /// redrawn while above [`rvs_cutoff`](Self::rvs_cutoff). When the draws
    /// keep missing the support, falls back to a `resolution`-point grid cut
    /// at the same value.
    pub fn rvs<R: Rng + ?Sized>(&self, resolution: usize, rng: &mut R) -> Result<f64> {
        let cutoff = self.rvs_cutoff();
        let gains: Vec<f64> = self.lobes.iter().map(|l| l.gain.max(0.0)).collect();
        let lobe_pick = WeightedIndex::new(&gains)
            .map_err(|e| PackingError::InvalidHistogram(format!("'{}' has no lobe weight: {}", self.name, e)))?;
        let gammas = self
            .lobes
            .iter()
            .map(|l| Gamma::new(l.shape, 1.0 / l.rate.max(f64::MIN_POSITIVE)))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| PackingError::InvalidHistogram(format!("'{}': {}", self.name, e)))?;

        for _ in 0..RVS_MAX_ATTEMPTS {
            let i = lobe_pick.sample(rng);
            let d = self.lobes[i].loc + gammas[i].sample(rng);
            if d >= self.d_min && d <= cutoff {
                return Ok(d);
            }
        }
        // Support far out in a tail: use the grid sampler, still honouring the cutoff.
        warn!("rvs on '{}' fell back to grid sampling after {} rejected draws.", self.name, RVS_MAX_ATTEMPTS);
        Ok(self.sample_up_to(1, resolution, cutoff, rng)?[0])
    }
}
