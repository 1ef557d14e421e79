use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub};

/// A point or displacement in the (y, z) cross-section plane.
///
/// Fields are named after the cross-section axes rather than `x`/`y`,
/// `x` being the fiber axis everywhere in this workspace.
#[derive(Debug, Copy, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub y: f64,
    pub z: f64,
}

impl Vec2 {
    /// Creates a new Vec2.
    pub fn new(y: f64, z: f64) -> Self {
        Vec2 { y, z }
    }

    /// Creates a zero vector.
    pub fn zero() -> Self {
        Vec2 { y: 0.0, z: 0.0 }
    }

    /// Squared length of the vector.
    pub fn length_squared(&self) -> f64 {
        self.y * self.y + self.z * self.z
    }

    /// Length of the vector.
    pub fn length(&self) -> f64 {
        self.length_squared().sqrt()
    }

    /// Unit vector with the same direction, or zero for a (near) zero vector.
    pub fn normalize_or_zero(&self) -> Self {
        let len_sq = self.length_squared();
        if len_sq > 1e-24 {
            let inv_len = 1.0 / len_sq.sqrt();
            Vec2 { y: self.y * inv_len, z: self.z * inv_len }
        } else {
            Vec2::zero()
        }
    }

    pub fn dot(&self, other: Vec2) -> f64 {
        self.y * other.y + self.z * other.z
    }

    /// Squared distance to another point.
    pub fn distance_squared(&self, other: Vec2) -> f64 {
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dy * dy + dz * dz
    }

    /// Distance to another point.
    pub fn distance(&self, other: Vec2) -> f64 {
        self.distance_squared(other).sqrt()
    }

    /// Rotates the vector counter-clockwise by `angle_rad` around the origin.
    pub fn rotated(&self, angle_rad: f64) -> Self {
        let (s, c) = angle_rad.sin_cos();
        Vec2 {
            y: c * self.y - s * self.z,
            z: s * self.y + c * self.z,
        }
    }

    /// Rotates the point counter-clockwise by `angle_rad` around `center`.
    pub fn rotated_about(&self, center: Vec2, angle_rad: f64) -> Self {
        (*self - center).rotated(angle_rad) + center
    }

    pub fn is_finite(&self) -> bool {
        self.y.is_finite() && self.z.is_finite()
    }
}

impl Add for Vec2 {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self { y: self.y + other.y, z: self.z + other.z }
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, other: Self) {
        self.y += other.y;
        self.z += other.z;
    }
}

impl Sub for Vec2 {
    type Output = Self;
    fn sub(self, other: Self) -> Self {
        Self { y: self.y - other.y, z: self.z - other.z }
    }
}

impl Neg for Vec2 {
    type Output = Self;
    fn neg(self) -> Self {
        Self { y: -self.y, z: -self.z }
    }
}

impl Mul<f64> for Vec2 {
    type Output = Self;
    fn mul(self, scalar: f64) -> Self {
        Self { y: self.y * scalar, z: self.z * scalar }
    }
}

impl Div<f64> for Vec2 {
    type Output = Self;
    fn div(self, scalar: f64) -> Self {
        Self { y: self.y / scalar, z: self.z / scalar }
    }
}

impl From<(f64, f64)> for Vec2 {
    fn from((y, z): (f64, f64)) -> Self {
        Vec2 { y, z }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_quarter_turn() {
        let v = Vec2::new(1.0, 0.0).rotated(std::f64::consts::FRAC_PI_2);
        assert!(v.y.abs() < 1e-12);
        assert!((v.z - 1.0).abs() < 1e-12);
    }

    #[test]
    fn rotation_about_center_keeps_distance() {
        let c = Vec2::new(3.0, -2.0);
        let p = Vec2::new(5.0, 1.0);
        let r = p.rotated_about(c, 0.7);
        assert!((r.distance(c) - p.distance(c)).abs() < 1e-12);
    }

    #[test]
    fn normalize_zero_vector_is_zero() {
        assert_eq!(Vec2::zero().normalize_or_zero(), Vec2::zero());
        let n = Vec2::new(3.0, 4.0).normalize_or_zero();
        assert!((n.length() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn scalar_product_scales_both_axes() {
        assert_eq!(Vec2::new(1.5, -2.0) * 2.0, Vec2::new(3.0, -4.0));
    }
}
