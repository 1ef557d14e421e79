//! Closed 2-D cross-section contours that fibers are placed into.
//!
//! The placement code only sees the [`Contour`] trait; circle, ellipse and
//! polygon are the three shapes a fascicle can take.

use crate::error::{PackingError, Result};
use fiber_common::{ContourConfig, ContourShape, Vec2};
use log::warn;
use rand::{Rng, RngCore};
use std::f64::consts::PI;
use std::fmt::Debug;
use std::sync::Arc;

/// Rejection budget per requested point when sampling an ellipse or polygon interior.
const MAX_TRIALS_PER_POINT: usize = 100_000;

/// Bisection steps when solving for the nearest point on an ellipse.
const ELLIPSE_ROOT_MAX_ITER: usize = 200;

/// Point containment and interior sampling for a closed 2-D boundary.
pub trait Contour: Debug + Send + Sync {
    /// Geometric center (y, z).
    fn center(&self) -> Vec2;

    /// Enclosed area (um^2).
    fn area(&self) -> f64;

    /// Whether `point` lies inside or on the boundary.
    fn contains(&self, point: Vec2) -> bool;

    /// Shortest distance from `point` to the boundary, inside or outside.
    fn distance_to_boundary(&self, point: Vec2) -> f64;

    /// Draws up to `n` uniform random points lying at least `clearance` from
    /// the boundary. Fewer points are returned when the shape leaves no such room.
    fn sample_interior_points(&self, n: usize, clearance: f64, rng: &mut dyn RngCore) -> Vec<Vec2>;

    /// Diameter when the contour is a circle; used by the packer fast path.
    fn circle_diameter(&self) -> Option<f64> {
        None
    }

    fn is_circle(&self) -> bool {
        self.circle_diameter().is_some()
    }

    /// Copy of the contour shifted by `offset`.
    fn translated(&self, offset: Vec2) -> Arc<dyn Contour>;

    /// Copy of the contour rotated by `angle` radians around its center.
    fn rotated(&self, angle: f64) -> Arc<dyn Contour>;

    /// Containment test for a batch of points.
    fn is_inside(&self, points: &[Vec2]) -> Vec<bool> {
        points.iter().map(|&p| self.contains(p)).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    pub center: Vec2,
    pub radius: f64,
}

impl Circle {
    pub fn new(center: Vec2, radius: f64) -> Result<Self> {
        if !(radius > 0.0) {
            return Err(PackingError::config(format!("circle radius must be positive, got {radius}")));
        }
        Ok(Circle { center, radius })
    }
}

impl Contour for Circle {
    fn center(&self) -> Vec2 {
        self.center
    }

    fn area(&self) -> f64 {
        PI * self.radius * self.radius
    }

    fn contains(&self, point: Vec2) -> bool {
        point.distance_squared(self.center) <= self.radius * self.radius
    }

    fn distance_to_boundary(&self, point: Vec2) -> f64 {
        (self.radius - point.distance(self.center)).abs()
    }

    fn sample_interior_points(&self, n: usize, clearance: f64, rng: &mut dyn RngCore) -> Vec<Vec2> {
        let r_max = self.radius - clearance;
        if r_max < 0.0 {
            return Vec::new();
        }
        (0..n)
            .map(|_| {
                let r = r_max * rng.random::<f64>().sqrt();
                let phi = 2.0 * PI * rng.random::<f64>();
                self.center + Vec2::new(r * phi.cos(), r * phi.sin())
            })
            .collect()
    }

    fn circle_diameter(&self) -> Option<f64> {
        Some(2.0 * self.radius)
    }

    fn translated(&self, offset: Vec2) -> Arc<dyn Contour> {
        Arc::new(Circle { center: self.center + offset, radius: self.radius })
    }

    fn rotated(&self, _angle: f64) -> Arc<dyn Contour> {
        Arc::new(*self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ellipse {
    pub center: Vec2,
    pub r1: f64,
    pub r2: f64,
    /// Rotation of the first semi-axis, radians.
    pub rot: f64,
}

impl Ellipse {
    pub fn new(center: Vec2, r1: f64, r2: f64, rot: f64) -> Result<Self> {
        if !(r1 > 0.0 && r2 > 0.0) {
            return Err(PackingError::config(format!(
                "ellipse semi-axes must be positive, got ({r1}, {r2})"
            )));
        }
        Ok(Ellipse { center, r1, r2, rot })
    }
}

impl Contour for Ellipse {
    fn center(&self) -> Vec2 {
        self.center
    }

    fn area(&self) -> f64 {
        PI * self.r1 * self.r2
    }

    fn contains(&self, point: Vec2) -> bool {
        let local = (point - self.center).rotated(-self.rot);
        let u = local.y / self.r1;
        let v = local.z / self.r2;
        u * u + v * v <= 1.0
    }

    fn distance_to_boundary(&self, point: Vec2) -> f64 {
        let local = (point - self.center).rotated(-self.rot);
        let (y, z) = (local.y.abs(), local.z.abs());
        if self.r1 >= self.r2 {
            ellipse_distance(self.r1, self.r2, y, z)
        } else {
            ellipse_distance(self.r2, self.r1, z, y)
        }
    }

    fn sample_interior_points(&self, n: usize, clearance: f64, rng: &mut dyn RngCore) -> Vec<Vec2> {
        if clearance >= self.r1.min(self.r2) {
            return Vec::new();
        }
        let mut points = Vec::with_capacity(n);
        let max_trials = n.saturating_mul(MAX_TRIALS_PER_POINT);
        let mut trials = 0;
        while points.len() < n && trials < max_trials {
            trials += 1;
            let theta = 2.0 * PI * rng.random::<f64>();
            let rf = rng.random::<f64>().sqrt();
            let local = Vec2::new(self.r1 * rf * theta.cos(), self.r2 * rf * theta.sin());
            let p = local.rotated(self.rot) + self.center;
            if self.distance_to_boundary(p) >= clearance {
                points.push(p);
            }
        }
        if points.len() < n {
            warn!("Ellipse sampling budget reached: only {} of {} points drawn.", points.len(), n);
        }
        points
    }

    fn translated(&self, offset: Vec2) -> Arc<dyn Contour> {
        Arc::new(Ellipse { center: self.center + offset, ..*self })
    }

    fn rotated(&self, angle: f64) -> Arc<dyn Contour> {
        Arc::new(Ellipse { rot: self.rot + angle, ..*self })
    }
}

/// Distance from `(y0, y1)` to the axis-aligned ellipse with semi-axes
/// `e0 >= e1`, for a query point in the first quadrant.
fn ellipse_distance(e0: f64, e1: f64, y0: f64, y1: f64) -> f64 {
    if y1 > 0.0 {
        if y0 > 0.0 {
            let z0 = y0 / e0;
            let z1 = y1 / e1;
            let g = z0 * z0 + z1 * z1 - 1.0;
            if g == 0.0 {
                return 0.0;
            }
            let r0 = (e0 / e1) * (e0 / e1);
            let s = ellipse_root(r0, z0, z1, g);
            let x0 = r0 * y0 / (s + r0);
            let x1 = y1 / (s + 1.0);
            (x0 - y0).hypot(x1 - y1)
        } else {
            (y1 - e1).abs()
        }
    } else {
        let numer = e0 * y0;
        let denom = e0 * e0 - e1 * e1;
        if numer < denom {
            let xde0 = numer / denom;
            let x0 = e0 * xde0;
            let x1 = e1 * (1.0 - xde0 * xde0).max(0.0).sqrt();
            (x0 - y0).hypot(x1)
        } else {
            (y0 - e0).abs()
        }
    }
}

// Bisection on the monotone function whose root gives the nearest point.
fn ellipse_root(r0: f64, z0: f64, z1: f64, g: f64) -> f64 {
    let n0 = r0 * z0;
    let mut s0 = z1 - 1.0;
    let mut s1 = if g < 0.0 { 0.0 } else { n0.hypot(z1) - 1.0 };
    let mut s = 0.0;
    for _ in 0..ELLIPSE_ROOT_MAX_ITER {
        s = (s0 + s1) / 2.0;
        if s == s0 || s == s1 {
            break;
        }
        let ratio0 = n0 / (s + r0);
        let ratio1 = z1 / (s + 1.0);
        let value = ratio0 * ratio0 + ratio1 * ratio1 - 1.0;
        if value > 0.0 {
            s0 = s;
        } else if value < 0.0 {
            s1 = s;
        } else {
            break;
        }
    }
    s
}

#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    vertices: Vec<Vec2>,
    center: Vec2,
}

impl Polygon {
    pub fn new(vertices: Vec<Vec2>) -> Result<Self> {
        if vertices.len() < 3 {
            return Err(PackingError::config(format!(
                "polygon needs at least 3 vertices, got {}",
                vertices.len()
            )));
        }
        let sum = vertices.iter().fold(Vec2::zero(), |acc, &v| acc + v);
        let center = sum / vertices.len() as f64;
        Ok(Polygon { vertices, center })
    }

    pub fn vertices(&self) -> &[Vec2] {
        &self.vertices
    }

    fn edges(&self) -> impl Iterator<Item = (Vec2, Vec2)> + '_ {
        let n = self.vertices.len();
        (0..n).map(move |i| (self.vertices[i], self.vertices[(i + 1) % n]))
    }

    fn bbox(&self) -> (Vec2, Vec2) {
        let mut lo = Vec2::new(f64::INFINITY, f64::INFINITY);
        let mut hi = Vec2::new(f64::NEG_INFINITY, f64::NEG_INFINITY);
        for v in &self.vertices {
            lo.y = lo.y.min(v.y);
            lo.z = lo.z.min(v.z);
            hi.y = hi.y.max(v.y);
            hi.z = hi.z.max(v.z);
        }
        (lo, hi)
    }
}

impl Contour for Polygon {
    fn center(&self) -> Vec2 {
        self.center
    }

    // Shoelace formula
    fn area(&self) -> f64 {
        let twice: f64 = self.edges().map(|(a, b)| a.y * b.z - b.y * a.z).sum();
        twice.abs() / 2.0
    }

    // Even-odd ray casting along +y.
    fn contains(&self, point: Vec2) -> bool {
        let mut inside = false;
        for (a, b) in self.edges() {
            if (a.z > point.z) != (b.z > point.z) {
                let y_cross = a.y + (point.z - a.z) / (b.z - a.z) * (b.y - a.y);
                if point.y < y_cross {
                    inside = !inside;
                }
            }
        }
        inside || self.distance_to_boundary(point) < 1e-12
    }

    fn distance_to_boundary(&self, point: Vec2) -> f64 {
        self.edges()
            .map(|(a, b)| {
                let ab = b - a;
                let len_sq = ab.length_squared();
                let t = if len_sq > 0.0 { ((point - a).dot(ab) / len_sq).clamp(0.0, 1.0) } else { 0.0 };
                point.distance(a + ab * t)
            })
            .fold(f64::INFINITY, f64::min)
    }

    fn sample_interior_points(&self, n: usize, clearance: f64, rng: &mut dyn RngCore) -> Vec<Vec2> {
        let (lo, hi) = self.bbox();
        let mut points = Vec::with_capacity(n);
        let max_trials = n.saturating_mul(MAX_TRIALS_PER_POINT);
        let mut trials = 0;
        while points.len() < n && trials < max_trials {
            trials += 1;
            let p = Vec2::new(rng.random_range(lo.y..=hi.y), rng.random_range(lo.z..=hi.z));
            if self.contains(p) && self.distance_to_boundary(p) >= clearance {
                points.push(p);
            }
        }
        if points.len() < n {
            warn!("Polygon sampling budget reached: only {} of {} points drawn.", points.len(), n);
        }
        points
    }

    fn translated(&self, offset: Vec2) -> Arc<dyn Contour> {
        Arc::new(Polygon {
            vertices: self.vertices.iter().map(|&v| v + offset).collect(),
            center: self.center + offset,
        })
    }

    fn rotated(&self, angle: f64) -> Arc<dyn Contour> {
        Arc::new(Polygon {
            vertices: self.vertices.iter().map(|&v| v.rotated_about(self.center, angle)).collect(),
            center: self.center,
        })
    }
}

/// Circle when `r2` is 0 or equal to `r1`, ellipse otherwise.
pub fn create_contour(center: Vec2, r1: f64, r2: f64, rot: f64) -> Result<Arc<dyn Contour>> {
    if r2 == 0.0 || r2 == r1 {
        Ok(Arc::new(Circle::new(center, r1)?))
    } else {
        Ok(Arc::new(Ellipse::new(center, r1, r2, rot)?))
    }
}

/// Builds the contour described by a `[contour]` config section.
pub fn contour_from_config(config: &ContourConfig) -> Result<Arc<dyn Contour>> {
    let center = Vec2::from(config.center);
    match config.shape {
        ContourShape::Circle => Ok(Arc::new(Circle::new(center, config.r1)?)),
        ContourShape::Ellipse => create_contour(center, config.r1, config.r2, config.rot),
        ContourShape::Polygon => {
            let vertices = config.vertices.iter().copied().map(Vec2::from).collect();
            Ok(Arc::new(Polygon::new(vertices)?))
        }
    }
}
