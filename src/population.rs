//! The population table: fiber records plus the contour they live in.

use crate::contour::{create_contour, Contour};
use crate::diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSink};
use crate::error::{PackingError, Result};
use crate::generator::{self, FiberCount};
use crate::io;
use crate::packer;
use crate::placer;
use crate::postprocess;
use crate::stats::StatModel;
use fiber_common::{GeneratorParams, PackerParams, PackingInfo, PackingReport, PlacerParams, Vec2};
use log::{debug, info};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FiberType {
    Unmyelinated,
    Myelinated,
}

impl FiberType {
    /// Numeric code used in population files: 1 myelinated, 0 unmyelinated.
    pub fn code(self) -> u8 {
        match self {
            FiberType::Unmyelinated => 0,
            FiberType::Myelinated => 1,
        }
    }

    pub fn from_code(code: f64) -> Option<Self> {
        if code == 1.0 {
            Some(FiberType::Myelinated)
        } else if code == 0.0 {
            Some(FiberType::Unmyelinated)
        } else {
            None
        }
    }
}

/// One fiber. A fiber is placed exactly when it has a position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fiber {
    pub fiber_type: FiberType,
    pub diameter: f64,
    pub position: Option<Vec2>,
    /// Node of Ranvier phase offset in [0, 1).
    pub node_shift: Option<f64>,
}

impl Fiber {
    pub fn new(fiber_type: FiberType, diameter: f64) -> Self {
        Fiber { fiber_type, diameter, position: None, node_shift: None }
    }

    pub fn is_placed(&self) -> bool {
        self.position.is_some()
    }

    pub fn is_myelinated(&self) -> bool {
        self.fiber_type == FiberType::Myelinated
    }

    pub fn radius(&self) -> f64 {
        self.diameter / 2.0
    }

    pub fn area(&self) -> f64 {
        PI * self.radius() * self.radius()
    }
}

/// Column-oriented population data, as exchanged with files and callers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PopulationData {
    pub types: Vec<FiberType>,
    pub diameters: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "nan_as_null")]
    pub y: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "nan_as_null")]
    pub z: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "nan_as_null")]
    pub node_shift: Option<Vec<f64>>,
}

// JSON has no NaN: unset values travel as `null`.
mod nan_as_null {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(values: &Option<Vec<f64>>, s: S) -> Result<S::Ok, S::Error> {
        values
            .as_ref()
            .map(|v| v.iter().map(|x| x.is_finite().then_some(*x)).collect::<Vec<_>>())
            .serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<f64>>, D::Error> {
        let values: Option<Vec<Option<f64>>> = Option::deserialize(d)?;
        Ok(values.map(|v| v.into_iter().map(|x| x.unwrap_or(f64::NAN)).collect()))
    }
}

impl PopulationData {
    /// Validates column shapes and builds fiber records. A NaN coordinate
    /// leaves that fiber unplaced.
    pub fn into_fibers(self) -> Result<Vec<Fiber>> {
        let n = self.types.len();
        if self.diameters.len() != n {
            return Err(PackingError::config(format!("{} types but {} diameters", n, self.diameters.len())));
        }
        if let Some(d) = self.diameters.iter().find(|d| !(**d > 0.0)) {
            return Err(PackingError::config(format!("fiber diameters must be positive, got {d}")));
        }
        let positions: Vec<Option<Vec2>> = match (self.y, self.z) {
            (Some(y), Some(z)) => {
                if y.len() != n || z.len() != n {
                    return Err(PackingError::config(format!(
                        "{} fibers but {} y and {} z coordinates",
                        n,
                        y.len(),
                        z.len()
                    )));
                }
                y.into_iter()
                    .zip(z)
                    .map(|(y, z)| if y.is_finite() && z.is_finite() { Some(Vec2::new(y, z)) } else { None })
                    .collect()
            }
            (None, None) => vec![None; n],
            _ => return Err(PackingError::config("y and z coordinates must be given together")),
        };
        let node_shift: Vec<Option<f64>> = match self.node_shift {
            Some(shift) if shift.len() == n => shift.into_iter().map(|s| s.is_finite().then_some(s)).collect(),
            Some(shift) => {
                return Err(PackingError::config(format!("{} fibers but {} node shifts", n, shift.len())));
            }
            None => vec![None; n],
        };
        Ok(self
            .types
            .into_iter()
            .zip(self.diameters)
            .zip(positions)
            .zip(node_shift)
            .map(|(((fiber_type, diameter), position), node_shift)| Fiber { fiber_type, diameter, position, node_shift })
            .collect())
    }

    pub fn from_fibers(fibers: &[Fiber]) -> Self {
        let any_placed = fibers.iter().any(Fiber::is_placed);
        let any_shift = fibers.iter().any(|f| f.node_shift.is_some());
        let coord = |pick: fn(Vec2) -> f64| -> Vec<f64> {
            fibers.iter().map(|f| f.position.map(pick).unwrap_or(f64::NAN)).collect()
        };
        PopulationData {
            types: fibers.iter().map(|f| f.fiber_type).collect(),
            diameters: fibers.iter().map(|f| f.diameter).collect(),
            y: any_placed.then(|| coord(|p| p.y)),
            z: any_placed.then(|| coord(|p| p.z)),
            node_shift: any_shift.then(|| fibers.iter().map(|f| f.node_shift.unwrap_or(f64::NAN)).collect()),
        }
    }
}

/// Circle/ellipse parameters for [`GeometrySpec::Params`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ShapeParams {
    pub center: Option<Vec2>,
    pub r1: f64,
    pub r2: f64,
    pub rot: f64,
}

pub enum GeometrySpec {
    Shape(Arc<dyn Contour>),
    Params(ShapeParams),
}

/// The fitted statistics a population is drawn from.
pub struct StatSource<'a> {
    pub count: FiberCount,
    pub myelinated: &'a StatModel,
    pub unmyelinated: &'a StatModel,
    pub params: GeneratorParams,
}

pub enum PopulationSource<'a> {
    Stat(StatSource<'a>),
    Data(PopulationData),
    File(PathBuf),
}

#[derive(Debug, Clone, Copy)]
pub enum Placement {
    Placer(PlacerParams),
    Packer(PackerParams),
}

/// Boolean selector over the fiber records.
pub enum MaskSource<'a> {
    Predicate(&'a dyn Fn(&Fiber) -> bool),
    Values(Vec<bool>),
}

/// An ordered table of fibers, optionally bound to a contour.
#[derive(Debug, Default, Clone)]
pub struct Population {
    fibers: Vec<Fiber>,
    geometry: Option<Arc<dyn Contour>>,
    masks: BTreeMap<String, Vec<bool>>,
}

impl Population {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_geometry(geometry: Arc<dyn Contour>) -> Self {
        Population { geometry: Some(geometry), ..Default::default() }
    }

    pub fn count(&self) -> usize {
        self.fibers.len()
    }

    pub fn has_population(&self) -> bool {
        !self.fibers.is_empty()
    }

    pub fn has_geometry(&self) -> bool {
        self.geometry.is_some()
    }

    pub fn has_placed_population(&self) -> bool {
        self.fibers.iter().any(Fiber::is_placed)
    }

    pub fn fibers(&self) -> &[Fiber] {
        &self.fibers
    }

    pub fn geometry(&self) -> Option<&Arc<dyn Contour>> {
        self.geometry.as_ref()
    }

    pub fn diameters(&self) -> Vec<f64> {
        self.fibers.iter().map(|f| f.diameter).collect()
    }

    pub fn types(&self) -> Vec<FiberType> {
        self.fibers.iter().map(|f| f.fiber_type).collect()
    }

    pub fn positions(&self) -> Vec<Option<Vec2>> {
        self.fibers.iter().map(|f| f.position).collect()
    }

    pub fn placed_mask(&self) -> Vec<bool> {
        self.fibers.iter().map(Fiber::is_placed).collect()
    }

    pub fn n_placed(&self) -> usize {
        self.fibers.iter().filter(|f| f.is_placed()).count()
    }

    // ---------------- //
    // Geometry methods //
    // ---------------- //

    /// Binds a contour to the population.
    ///
    /// With an existing placement, `discard_placement` either unplaces every
    /// fiber or only those whose center falls outside the new contour.
    pub fn set_geometry(&mut self, spec: GeometrySpec, discard_placement: bool, sink: &mut dyn DiagnosticSink) -> Result<()> {
        let geometry = match spec {
            GeometrySpec::Shape(shape) => shape,
            GeometrySpec::Params(ShapeParams { center: Some(center), r1, r2, rot }) if r1 > 0.0 => {
                create_contour(center, r1, r2, rot)?
            }
            GeometrySpec::Params(_) => {
                return Err(PackingError::config("either a contour or its center and a positive radius is needed"));
            }
        };
        self.geometry = Some(geometry);

        if self.has_placed_population() {
            if discard_placement {
                self.clear_placement();
            } else {
                self.check_placement(sink);
            }
        }
        Ok(())
    }

    pub fn clear_geometry(&mut self) {
        self.geometry = None;
    }

    /// Unplaces placed fibers whose center is outside the current contour.
    /// Returns the number of fibers unplaced.
    pub fn check_placement(&mut self, sink: &mut dyn DiagnosticSink) -> usize {
        let Some(geometry) = self.geometry.clone() else {
            return 0;
        };
        let mut n_discarded = 0;
        for fiber in &mut self.fibers {
            if let Some(p) = fiber.position {
                if !geometry.contains(p) {
                    fiber.position = None;
                    n_discarded += 1;
                }
            }
        }
        if n_discarded > 0 {
            sink.report(Diagnostic::new(
                DiagnosticKind::OutOfGeometry,
                n_discarded,
                format!("{n_discarded} fiber(s) are not in the geometry and were unplaced"),
            ));
        }
        n_discarded
    }

    // ---------------------- //
    // Population generators  //
    // ---------------------- //

    /// Fills the table from `source`. Does nothing when a population already
    /// exists and `overwrite` is false.
    pub fn create_population<R: Rng>(
        &mut self,
        source: PopulationSource<'_>,
        overwrite: bool,
        rng: &mut R,
        sink: &mut dyn DiagnosticSink,
    ) -> Result<()> {
        if self.has_population() && !overwrite {
            sink.report(Diagnostic::new(
                DiagnosticKind::NoOp,
                self.count(),
                "Population already exists, set overwrite to replace it",
            ));
            return Ok(());
        }
        let fibers = match source {
            PopulationSource::Stat(stat) => self.fibers_from_stat(stat, rng)?,
            PopulationSource::Data(data) => {
                info!("Generating fiber population from data");
                data.into_fibers()?
            }
            PopulationSource::File(path) => {
                let data = io::load_population(&path)?;
                if data.y.is_none() {
                    sink.report(Diagnostic::new(
                        DiagnosticKind::MissingPositions,
                        data.diameters.len(),
                        format!("Loaded population '{}' has no y,z coordinates", path.display()),
                    ));
                }
                data.into_fibers()?
            }
        };
        self.fibers = fibers;
        self.masks.clear();
        Ok(())
    }

    fn fibers_from_stat<R: Rng>(&self, stat: StatSource<'_>, rng: &mut R) -> Result<Vec<Fiber>> {
        let p = stat.params.percent_unmyelinated;
        let generated = match stat.count {
            FiberCount::Exact(n) => generator::create_from_stat(n, p, stat.myelinated, stat.unmyelinated, stat.params.grid_resolution, rng)?,
            FiberCount::Fvf(fvf) => {
                let geometry = self
                    .geometry
                    .as_ref()
                    .ok_or_else(|| PackingError::config("a geometry is needed to derive the fiber count from an FVF"))?;
                let n = generator::fvf_fiber_count(
                    fvf,
                    geometry.area(),
                    p,
                    stat.myelinated.expected_diameter,
                    stat.unmyelinated.expected_diameter,
                    stat.params.fvf_double_area,
                );
                info!("FVF {:.3} on {:.1} um^2 gives {} fibers", fvf, geometry.area(), n);
                generator::create_from_stat(n, p, stat.myelinated, stat.unmyelinated, stat.params.grid_resolution, rng)?
            }
            FiberCount::FillArea { area, fvf } => {
                let resolution = stat.params.grid_resolution;
                generator::fill_area_with_fibers(area, p, fvf, stat.myelinated, stat.unmyelinated, resolution, rng)?
                    .population
            }
        };
        Ok(generated
            .types
            .into_iter()
            .zip(generated.diameters)
            .map(|(t, d)| Fiber::new(t, d))
            .collect())
    }

    pub fn clear_population(&mut self) {
        self.fibers.clear();
        self.masks.clear();
    }

    /// Draws a uniform node shift in [0, 1) for every fiber.
    pub fn generate_node_shift<R: Rng>(&mut self, rng: &mut R) {
        for fiber in &mut self.fibers {
            fiber.node_shift = Some(rng.random::<f64>());
        }
    }

    // ----------------------- //
    // Place population method //
    // ----------------------- //

    /// Assigns positions inside the geometry.
    ///
    /// Skipped with a [`DiagnosticKind::NoOp`] record when there is no
    /// geometry or population, or when already placed and not `overwrite`.
    pub fn place_population<R: Rng>(
        &mut self,
        placement: Placement,
        overwrite: bool,
        rng: &mut R,
        sink: &mut dyn DiagnosticSink,
    ) -> Result<()> {
        let Some(geometry) = self.geometry.clone().filter(|_| self.has_population()) else {
            sink.report(Diagnostic::new(DiagnosticKind::NoOp, 0, "Need a population and a geometry to place fibers"));
            return Ok(());
        };
        if !overwrite && self.has_placed_population() {
            sink.report(Diagnostic::new(
                DiagnosticKind::NoOp,
                self.n_placed(),
                "Population already placed, set overwrite to place it again",
            ));
            return Ok(());
        }

        let diameters = self.diameters();
        let result = match placement {
            Placement::Placer(params) => {
                let radii: Vec<f64> = diameters.iter().map(|d| d / 2.0).collect();
                placer::place_all(&radii, geometry.as_ref(), &params, rng, sink)
            }
            Placement::Packer(params) => self.use_packer(&diameters, geometry.as_ref(), &params, rng, sink),
        };
        for ((fiber, pos), ok) in self.fibers.iter_mut().zip(result.positions).zip(result.placed) {
            fiber.position = ok.then_some(pos);
        }
        debug!("{} of {} fibers placed", self.n_placed(), self.count());
        Ok(())
    }

    fn use_packer<R: Rng>(
        &self,
        diameters: &[f64],
        geometry: &dyn Contour,
        params: &PackerParams,
        rng: &mut R,
        sink: &mut dyn DiagnosticSink,
    ) -> placer::PlacementResult {
        let Some(target_diameter) = geometry.circle_diameter() else {
            sink.report(Diagnostic::new(
                DiagnosticKind::PackerDegraded,
                diameters.len(),
                "Packing only supports circular contours, falling back to the placer",
            ));
            let placer_params = PlacerParams { n_iter: params.n_iter, ..PlacerParams::with_delta(params.delta) };
            let radii: Vec<f64> = diameters.iter().map(|d| d / 2.0).collect();
            return placer::place_all(&radii, geometry, &placer_params, rng, sink);
        };

        let mut positions = packer::pack(diameters, params, rng);
        if params.fit_to_size {
            let d_pop = postprocess::get_circular_contour(diameters, &positions, params.delta);
            let factor = 0.99 * target_diameter / d_pop;
            if factor >= 1.0 {
                positions = postprocess::expand_pop(&positions, factor, sink);
            } else {
                // Shrinking would reintroduce overlaps; the outer fibers end up unplaced instead.
                sink.report(Diagnostic::new(
                    DiagnosticKind::FitToSizeSkipped,
                    0,
                    format!("packed diameter {d_pop:.2} exceeds the contour diameter {target_diameter:.2}"),
                ));
            }
        }
        let center = geometry.center();
        let positions: Vec<Vec2> = positions.into_iter().map(|p| p + center).collect();

        let collision_free = postprocess::collision_mask(diameters, &positions, params.delta, sink);
        let placed = collision_free
            .iter()
            .zip(geometry.is_inside(&positions))
            .map(|(&ok_in, ok_trace)| ok_in && ok_trace)
            .collect();
        placer::PlacementResult { positions, placed }
    }

    /// Unplaces every fiber.
    pub fn clear_placement(&mut self) {
        for fiber in &mut self.fibers {
            fiber.position = None;
        }
    }

    /// Drops unplaced fibers from the table. Returns how many were dropped.
    pub fn discard_unplaced(&mut self) -> usize {
        let keep = self.placed_mask();
        let before = self.count();
        self.retain_by(&keep);
        before - self.count()
    }

    /// Unplaces placed fibers that collide within `delta`. Returns the count.
    pub fn remove_collisions(&mut self, delta: f64, sink: &mut dyn DiagnosticSink) -> usize {
        let (indices, diameters, positions) = self.placed_columns();
        let ok = postprocess::collision_mask(&diameters, &positions, delta, sink);
        let mut removed = 0;
        for (&i, keep) in indices.iter().zip(ok) {
            if !keep {
                self.fibers[i].position = None;
                removed += 1;
            }
        }
        removed
    }

    fn placed_columns(&self) -> (Vec<usize>, Vec<f64>, Vec<Vec2>) {
        let mut indices = Vec::new();
        let mut diameters = Vec::new();
        let mut positions = Vec::new();
        for (i, f) in self.fibers.iter().enumerate() {
            if let Some(p) = f.position {
                indices.push(i);
                diameters.push(f.diameter);
                positions.push(p);
            }
        }
        (indices, diameters, positions)
    }

    fn retain_by(&mut self, keep: &[bool]) {
        let mut it = keep.iter();
        self.fibers.retain(|_| *it.next().unwrap_or(&true));
        for mask in self.masks.values_mut() {
            let mut it = keep.iter();
            mask.retain(|_| *it.next().unwrap_or(&true));
        }
    }

    // ------------------- //
    // Moving the contents //
    // ------------------- //

    /// Translates the geometry and/or the placed fibers selected by `mask_labels`.
    pub fn translate(&mut self, offset: Vec2, with_geom: bool, with_pop: bool, mask_labels: &[&str], sink: &mut dyn DiagnosticSink) {
        if with_geom {
            if let Some(g) = &self.geometry {
                self.geometry = Some(g.translated(offset));
            }
        }
        if with_pop {
            let mask = self.get_mask(None, mask_labels, false);
            for (fiber, selected) in self.fibers.iter_mut().zip(mask) {
                if let (Some(p), true) = (fiber.position.as_mut(), selected) {
                    *p += offset;
                }
            }
        }
        self.check_placement(sink);
    }

    /// Rotates the geometry and/or the placed fibers around the contour center.
    pub fn rotate(&mut self, angle: f64, with_geom: bool, with_pop: bool, mask_labels: &[&str], sink: &mut dyn DiagnosticSink) {
        let Some(geometry) = self.geometry.clone() else {
            return;
        };
        let center = geometry.center();
        if with_geom {
            self.geometry = Some(geometry.rotated(angle));
        }
        if with_pop {
            let mask = self.get_mask(None, mask_labels, false);
            for (fiber, selected) in self.fibers.iter_mut().zip(mask) {
                if let (Some(p), true) = (fiber.position.as_mut(), selected) {
                    *p = p.rotated_about(center, angle);
                }
            }
        }
        self.check_placement(sink);
    }

    // ----------------------- //
    // Mask and sub-population //
    // ----------------------- //

    pub fn mask_labels(&self) -> Vec<&str> {
        self.masks.keys().map(String::as_str).collect()
    }

    /// Stores a named mask. Unlabeled masks get the first free `mask_<i>` label.
    /// Returns the label, or `None` when the label exists and `overwrite` is false.
    pub fn add_mask(&mut self, source: MaskSource<'_>, label: Option<&str>, overwrite: bool) -> Result<Option<String>> {
        if !self.has_population() {
            return Err(PackingError::config("masks can only be added to an existing population"));
        }
        let label = match label {
            Some(l) => l.to_string(),
            None => (0..).map(|i| format!("mask_{i}")).find(|l| !self.masks.contains_key(l)).unwrap_or_default(),
        };
        if self.masks.contains_key(&label) && !overwrite {
            return Ok(None);
        }
        let mask = match source {
            MaskSource::Predicate(pred) => self.fibers.iter().map(pred).collect(),
            MaskSource::Values(values) => {
                if values.len() != self.count() {
                    return Err(PackingError::config(format!(
                        "mask of length {} for a population of {}",
                        values.len(),
                        self.count()
                    )));
                }
                values
            }
        };
        self.masks.insert(label.clone(), mask);
        Ok(Some(label))
    }

    /// Removes the named masks, or all masks when `labels` is `None`.
    /// Returns the labels actually removed.
    pub fn clear_masks(&mut self, labels: Option<&[&str]>) -> Vec<String> {
        let removed: Vec<String> = match labels {
            None => std::mem::take(&mut self.masks).into_keys().collect(),
            Some(labels) => labels
                .iter()
                .filter_map(|l| self.masks.remove_entry(*l).map(|(k, _)| k))
                .collect(),
        };
        debug!("the following masks were removed: {:?}", removed);
        removed
    }

    /// Combines a predicate (if any), the named masks and, when
    /// `placed_only`, the placed flags with a logical AND.
    pub fn get_mask(&self, predicate: Option<&dyn Fn(&Fiber) -> bool>, mask_labels: &[&str], placed_only: bool) -> Vec<bool> {
        let labelled: Vec<&Vec<bool>> = mask_labels.iter().filter_map(|l| self.masks.get(*l)).collect();
        let check_placed = placed_only && self.has_placed_population();
        self.fibers
            .iter()
            .enumerate()
            .map(|(i, f)| {
                predicate.map_or(true, |p| p(f))
                    && labelled.iter().all(|m| m[i])
                    && (!check_placed || f.is_placed())
            })
            .collect()
    }

    /// Copies of the fibers selected by [`get_mask`](Self::get_mask).
    pub fn sub_population(&self, predicate: Option<&dyn Fn(&Fiber) -> bool>, mask_labels: &[&str], placed_only: bool) -> Vec<Fiber> {
        self.fibers
            .iter()
            .zip(self.get_mask(predicate, mask_labels, placed_only))
            .filter_map(|(f, keep)| keep.then(|| f.clone()))
            .collect()
    }

    // ----------- //
    // Diagnostics //
    // ----------- //

    /// Pairwise-distance summary of the placed fibers.
    pub fn get_ppop_info(&self) -> Option<PackingInfo> {
        let (_, diameters, positions) = self.placed_columns();
        let radii: Vec<f64> = diameters.iter().map(|d| d / 2.0).collect();
        postprocess::get_ppop_info(&positions, &radii)
    }

    pub fn to_report(&self) -> PackingReport {
        let n_myelinated = self.fibers.iter().filter(|f| f.is_myelinated()).count();
        let placed_area: f64 = self.fibers.iter().filter(|f| f.is_placed()).map(Fiber::area).sum();
        let fiber_volume_fraction = self.geometry.as_ref().map_or(0.0, |g| placed_area / g.area());
        PackingReport {
            n_fibers: self.count(),
            n_myelinated,
            n_unmyelinated: self.count() - n_myelinated,
            n_placed: self.n_placed(),
            fiber_volume_fraction,
            packing: self.get_ppop_info(),
        }
    }

    pub fn to_data(&self) -> PopulationData {
        PopulationData::from_fibers(&self.fibers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contour::Circle;
    use crate::diagnostics::DiagnosticLog;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn three_fibers() -> PopulationData {
        PopulationData {
            types: vec![FiberType::Myelinated, FiberType::Unmyelinated, FiberType::Myelinated],
            diameters: vec![10.0, 3.0, 4.0],
            ..Default::default()
        }
    }

    fn circle(r: f64) -> Arc<dyn Contour> {
        Arc::new(Circle::new(Vec2::zero(), r).unwrap())
    }

    #[test]
    fn set_geometry_requires_shape_or_params() {
        let mut pop = Population::new();
        let mut log = DiagnosticLog::new();
        let err = pop.set_geometry(GeometrySpec::Params(ShapeParams::default()), false, &mut log);
        assert!(matches!(err, Err(PackingError::Configuration(_))));
        let ok = pop.set_geometry(
            GeometrySpec::Params(ShapeParams { center: Some(Vec2::zero()), r1: 20.0, ..Default::default() }),
            false,
            &mut log,
        );
        assert!(ok.is_ok());
        assert!(pop.geometry().unwrap().is_circle());
    }

    #[test]
    fn mismatched_columns_are_rejected() {
        let mut data = three_fibers();
        data.diameters.pop();
        assert!(matches!(data.into_fibers(), Err(PackingError::Configuration(_))));

        let mut data = three_fibers();
        data.y = Some(vec![0.0; 3]);
        assert!(matches!(data.into_fibers(), Err(PackingError::Configuration(_))));
    }

    #[test]
    fn create_population_is_a_noop_without_overwrite() {
        let mut pop = Population::new();
        let mut rng = StdRng::seed_from_u64(0);
        let mut log = DiagnosticLog::new();
        pop.create_population(PopulationSource::Data(three_fibers()), false, &mut rng, &mut log).unwrap();
        assert_eq!(pop.count(), 3);

        let mut other = three_fibers();
        other.types.push(FiberType::Myelinated);
        other.diameters.push(1.0);
        pop.create_population(PopulationSource::Data(other.clone()), false, &mut rng, &mut log).unwrap();
        assert_eq!(pop.count(), 3);
        assert!(log.has(DiagnosticKind::NoOp));

        pop.create_population(PopulationSource::Data(other), true, &mut rng, &mut log).unwrap();
        assert_eq!(pop.count(), 4);
    }

    #[test]
    fn place_without_geometry_reports_noop() {
        let mut pop = Population::new();
        let mut rng = StdRng::seed_from_u64(0);
        let mut log = DiagnosticLog::new();
        pop.create_population(PopulationSource::Data(three_fibers()), false, &mut rng, &mut log).unwrap();
        pop.place_population(Placement::Placer(PlacerParams::default()), false, &mut rng, &mut log).unwrap();
        assert!(!pop.has_placed_population());
        assert!(log.has(DiagnosticKind::NoOp));
    }

    #[test]
    fn placed_population_is_not_replaced_without_overwrite() {
        let mut pop = Population::with_geometry(circle(50.0));
        let mut rng = StdRng::seed_from_u64(3);
        let mut log = DiagnosticLog::new();
        pop.create_population(PopulationSource::Data(three_fibers()), false, &mut rng, &mut log).unwrap();
        pop.place_population(Placement::Placer(PlacerParams::with_delta(1.0)), false, &mut rng, &mut log).unwrap();
        let first = pop.positions();
        assert_eq!(pop.n_placed(), 3);

        log.clear();
        pop.place_population(Placement::Placer(PlacerParams::with_delta(1.0)), false, &mut rng, &mut log).unwrap();
        assert_eq!(pop.positions(), first);
        assert!(log.has(DiagnosticKind::NoOp));
    }

    #[test]
    fn shrinking_geometry_unplaces_outside_fibers() {
        let mut pop = Population::with_geometry(circle(100.0));
        let mut rng = StdRng::seed_from_u64(0);
        let mut log = DiagnosticLog::new();
        let mut data = three_fibers();
        data.y = Some(vec![0.0, 50.0, -80.0]);
        data.z = Some(vec![0.0, 0.0, 0.0]);
        pop.create_population(PopulationSource::Data(data), false, &mut rng, &mut log).unwrap();
        assert_eq!(pop.n_placed(), 3);

        pop.set_geometry(GeometrySpec::Shape(circle(60.0)), false, &mut log).unwrap();
        assert_eq!(pop.placed_mask(), vec![true, true, false]);
        assert_eq!(log.count_of(DiagnosticKind::OutOfGeometry), 1);

        pop.set_geometry(GeometrySpec::Shape(circle(60.0)), true, &mut log).unwrap();
        assert!(!pop.has_placed_population());
    }

    #[test]
    fn masks_combine_and_clear() {
        let mut pop = Population::new();
        let mut rng = StdRng::seed_from_u64(0);
        let mut log = DiagnosticLog::new();
        pop.create_population(PopulationSource::Data(three_fibers()), false, &mut rng, &mut log).unwrap();

        let myel = |f: &Fiber| f.is_myelinated();
        let big = |f: &Fiber| f.diameter > 5.0;
        let l0 = pop.add_mask(MaskSource::Predicate(&myel), None, true).unwrap().unwrap();
        let l1 = pop.add_mask(MaskSource::Predicate(&big), Some("big"), true).unwrap().unwrap();
        assert_eq!(l0, "mask_0");
        assert_eq!(l1, "big");
        assert!(pop.add_mask(MaskSource::Values(vec![true; 3]), Some("big"), false).unwrap().is_none());

        assert_eq!(pop.get_mask(None, &["mask_0"], true), vec![true, false, true]);
        assert_eq!(pop.get_mask(None, &["mask_0", "big"], true), vec![true, false, false]);
        let small = |f: &Fiber| f.diameter < 5.0;
        assert_eq!(pop.sub_population(Some(&small), &["mask_0"], true).len(), 1);

        assert_eq!(pop.clear_masks(Some(&["big", "missing"])), vec!["big".to_string()]);
        assert_eq!(pop.mask_labels(), vec!["mask_0"]);
        pop.clear_masks(None);
        assert!(pop.mask_labels().is_empty());
    }

    #[test]
    fn translate_moves_selected_fibers_and_geometry() {
        let mut pop = Population::with_geometry(circle(100.0));
        let mut rng = StdRng::seed_from_u64(0);
        let mut log = DiagnosticLog::new();
        let mut data = three_fibers();
        data.y = Some(vec![0.0, 10.0, 20.0]);
        data.z = Some(vec![0.0, 0.0, 0.0]);
        pop.create_population(PopulationSource::Data(data), false, &mut rng, &mut log).unwrap();
        pop.translate(Vec2::new(5.0, 5.0), true, true, &[], &mut log);
        assert_eq!(pop.geometry().unwrap().center(), Vec2::new(5.0, 5.0));
        assert_eq!(pop.fibers()[1].position, Some(Vec2::new(15.0, 5.0)));
    }

    #[test]
    fn node_shift_in_unit_interval() {
        let mut pop = Population::new();
        let mut rng = StdRng::seed_from_u64(9);
        let mut log = DiagnosticLog::new();
        pop.create_population(PopulationSource::Data(three_fibers()), false, &mut rng, &mut log).unwrap();
        pop.generate_node_shift(&mut rng);
        assert!(pop.fibers().iter().all(|f| matches!(f.node_shift, Some(s) if (0.0..1.0).contains(&s))));
    }
}
