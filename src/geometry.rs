use geo::{EuclideanDistance, LineString, Polygon};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 0.0 };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn planar(x: f64, y: f64) -> Self {
        Self { x, y, z: 0.0 }
    }

    // Localization streams report NaN for fields they have not estimated yet
    pub fn sanitized(self) -> Self {
        let fix = |v: f64| if v.is_nan() { 0.0 } else { v };
        Self {
            x: fix(self.x),
            y: fix(self.y),
            z: fix(self.z),
        }
    }

    pub fn scaled(self, k: f64) -> Self {
        Self {
            x: self.x * k,
            y: self.y * k,
            z: self.z * k,
        }
    }

    pub fn add(self, other: Vec3) -> Self {
        Self {
            x: self.x + other.x,
            y: self.y + other.y,
            z: self.z + other.z,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

// Reference point sits on the centre line, back_edge_to_center ahead of the rear bumper
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VehicleFootprint {
    pub length: f64,
    pub width: f64,
    pub height: f64,
    pub back_edge_to_center: f64,
}

impl Default for VehicleFootprint {
    fn default() -> Self {
        Self {
            length: 4.933,
            width: 2.11,
            height: 1.48,
            back_edge_to_center: 1.043,
        }
    }
}

impl VehicleFootprint {
    pub fn centered(length: f64, width: f64, height: f64) -> Self {
        Self {
            length,
            width,
            height,
            back_edge_to_center: length / 2.0,
        }
    }

    // heading in radians, counter-clockwise from +x
    pub fn polygon(&self, position: Vec3, heading: f64) -> Footprint {
        let front = self.length - self.back_edge_to_center;
        let back = -self.back_edge_to_center;
        let half = self.width / 2.0;
        let (sin, cos) = heading.sin_cos();

        let corner = |along: f64, across: f64| Point2 {
            x: position.x + along * cos - across * sin,
            y: position.y + along * sin + across * cos,
        };

        Footprint {
            corners: [
                corner(front, half),
                corner(back, half),
                corner(back, -half),
                corner(front, -half),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Footprint {
    pub corners: [Point2; 4],
}

impl Footprint {
    fn to_polygon(&self) -> Polygon<f64> {
        let ring: Vec<(f64, f64)> = self.corners.iter().map(|p| (p.x, p.y)).collect();
        Polygon::new(LineString::from(ring), vec![])
    }

    fn is_finite(&self) -> bool {
        self.corners.iter().all(|p| p.x.is_finite() && p.y.is_finite())
    }

    // 0 when the footprints touch or overlap
    pub fn distance(&self, other: &Footprint) -> f64 {
        polygon_distance(self, other)
    }
}

// Unestimated or corrupt yaw is taken as 0
pub fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() { v } else { 0.0 }
}

// A footprint with non-finite corners was never really observed, so it is
// infinitely far away rather than touching.
pub fn polygon_distance(a: &Footprint, b: &Footprint) -> f64 {
    if !a.is_finite() || !b.is_finite() {
        return f64::INFINITY;
    }
    let d = a.to_polygon().euclidean_distance(&b.to_polygon());
    if d.is_finite() { d.max(0.0) } else { f64::INFINITY }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::f64::consts::FRAC_PI_2;

    fn unit() -> VehicleFootprint {
        VehicleFootprint::centered(5.0, 2.0, 1.5)
    }

    #[test]
    fn polygon_follows_heading() {
        let fp = unit().polygon(Vec3::ZERO, FRAC_PI_2);
        let max_y = fp.corners.iter().map(|p| p.y).fold(f64::MIN, f64::max);
        let max_x = fp.corners.iter().map(|p| p.x).fold(f64::MIN, f64::max);
        assert!((max_y - 2.5).abs() < 1e-9);
        assert!((max_x - 1.0).abs() < 1e-9);
    }

    #[test]
    fn back_edge_offset_shifts_the_body() {
        let fp = VehicleFootprint::default().polygon(Vec3::ZERO, 0.0);
        let min_x = fp.corners.iter().map(|p| p.x).fold(f64::MAX, f64::min);
        assert!((min_x + 1.043).abs() < 1e-9);
    }

    #[test]
    fn distance_between_separated_vehicles() {
        let a = unit().polygon(Vec3::ZERO, 0.0);
        let b = unit().polygon(Vec3::planar(15.0, 0.0), 0.0);
        assert!((a.distance(&b) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn overlapping_vehicles_are_at_zero() {
        let a = unit().polygon(Vec3::ZERO, 0.0);
        let b = unit().polygon(Vec3::planar(1.0, 0.5), 0.3);
        assert_eq!(a.distance(&b), 0.0);
    }

    #[test]
    fn nan_components_are_zeroed() {
        let v = Vec3::new(f64::NAN, 2.0, f64::NAN).sanitized();
        assert_eq!(v, Vec3::new(0.0, 2.0, 0.0));
    }

    #[test]
    fn nan_footprint_is_never_a_collision() {
        let a = unit().polygon(Vec3::ZERO, 0.0);
        let b = unit().polygon(Vec3::planar(100.0, 0.0), f64::NAN);
        assert_eq!(a.distance(&b), f64::INFINITY);
        assert_eq!(polygon_distance(&b, &a), f64::INFINITY);
    }

    #[test]
    fn unusable_headings_fall_back_to_zero() {
        assert_eq!(finite_or_zero(f64::NAN), 0.0);
        assert_eq!(finite_or_zero(f64::NEG_INFINITY), 0.0);
        assert_eq!(finite_or_zero(1.25), 1.25);
    }

    proptest! {
        #[test]
        fn distance_is_symmetric_and_non_negative(
            x in -50.0f64..50.0,
            y in -50.0f64..50.0,
            h1 in -3.1f64..3.1,
            h2 in -3.1f64..3.1,
        ) {
            let a = unit().polygon(Vec3::ZERO, h1);
            let b = unit().polygon(Vec3::planar(x, y), h2);
            let ab = a.distance(&b);
            let ba = b.distance(&a);
            prop_assert!(ab >= 0.0);
            prop_assert!((ab - ba).abs() < 1e-9);
        }
    }
}
