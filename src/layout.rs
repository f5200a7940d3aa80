//! Orbit layout
//!
//! Places systems on a ring around the origin and bodies on concentric orbits
//! around their parent. Everything is a pure function of the sibling index and
//! count except the speed jitter, which is drawn from the caller's RNG.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

/// Minimum radius of the ring systems are placed on
pub const MIN_SYSTEM_RING_RADIUS: f64 = 80.0;

/// Ring radius added per system
pub const SYSTEM_RING_SPACING: f64 = 25.0;

/// A point in world space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ORIGIN: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Offsets this point within the xz-plane
    pub fn offset_planar(&self, radius: f64, angle: f64) -> Self {
        Self {
            x: self.x + radius * angle.cos(),
            y: self.y,
            z: self.z + radius * angle.sin(),
        }
    }

    pub fn distance(&self, other: &Vec3) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2) + (self.z - other.z).powi(2))
            .sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Nesting level a body orbits at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrbitLevel {
    /// A task body orbiting its system's sun
    Planet,
    /// A subtask body orbiting its planet
    Satellite,
}

impl OrbitLevel {
    /// Radius of the innermost orbit at this level
    pub fn base_radius(&self) -> f64 {
        match self {
            OrbitLevel::Planet => 15.0,
            OrbitLevel::Satellite => 3.0,
        }
    }

    /// Radius added for each further sibling
    pub fn radius_increment(&self) -> f64 {
        match self {
            OrbitLevel::Planet => 8.0,
            OrbitLevel::Satellite => 1.5,
        }
    }

    /// Relative spread of the speed jitter, +/- around 1.0
    pub fn jitter_spread(&self) -> f64 {
        match self {
            OrbitLevel::Planet => 0.5,
            OrbitLevel::Satellite => 0.5,
        }
    }
}

/// Deterministic part of a body's orbit plus its drawn speed jitter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrbitSlot {
    pub radius: f64,
    pub initial_angle: f64,
    pub jitter: f64,
}

/// Position of system `index` out of `count`.
///
/// A lone system sits at the origin; otherwise systems share a ring of radius
/// `max(80, count * 25)` at evenly spaced angles, y = 0.
pub fn system_position(index: usize, count: usize) -> Vec3 {
    if count <= 1 {
        return Vec3::ORIGIN;
    }
    let radius = MIN_SYSTEM_RING_RADIUS.max(count as f64 * SYSTEM_RING_SPACING);
    Vec3::ORIGIN.offset_planar(radius, evenly_spaced_angle(index, count))
}

/// Orbit radius of sibling `index` at `level`
pub fn orbit_radius(level: OrbitLevel, index: usize) -> f64 {
    level.base_radius() + index as f64 * level.radius_increment()
}

/// Angle of slot `index` when `count` slots share a full turn
pub fn evenly_spaced_angle(index: usize, count: usize) -> f64 {
    if count == 0 {
        return 0.0;
    }
    TAU * index as f64 / count as f64
}

/// Draws a multiplicative speed jitter in `[1 - spread, 1 + spread)`
pub fn speed_jitter<R: Rng + ?Sized>(level: OrbitLevel, rng: &mut R) -> f64 {
    let spread = level.jitter_spread();
    1.0 - spread + rng.gen::<f64>() * 2.0 * spread
}

/// Lays out sibling `index` of `count` at `level`
pub fn orbit_slot<R: Rng + ?Sized>(
    level: OrbitLevel,
    index: usize,
    count: usize,
    rng: &mut R,
) -> OrbitSlot {
    OrbitSlot {
        radius: orbit_radius(level, index),
        initial_angle: evenly_spaced_angle(index, count),
        jitter: speed_jitter(level, rng),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_single_system_at_origin() {
        assert_eq!(system_position(0, 1), Vec3::ORIGIN);
    }

    #[test]
    fn test_systems_share_minimum_ring() {
        let first = system_position(0, 2);
        let second = system_position(1, 2);
        assert!(approx(first.x, 80.0) && approx(first.z, 0.0));
        assert!(approx(second.x, -80.0) && approx(second.z, 0.0));
        assert_eq!(first.y, 0.0);
    }

    #[test]
    fn test_ring_grows_with_system_count() {
        let position = system_position(0, 5);
        assert!(approx(position.distance(&Vec3::ORIGIN), 125.0));
    }

    #[test]
    fn test_orbit_radii() {
        assert_eq!(orbit_radius(OrbitLevel::Planet, 0), 15.0);
        assert_eq!(orbit_radius(OrbitLevel::Planet, 2), 31.0);
        assert_eq!(orbit_radius(OrbitLevel::Satellite, 0), 3.0);
        assert_eq!(orbit_radius(OrbitLevel::Satellite, 2), 6.0);
    }

    #[test]
    fn test_slot_angles_evenly_spaced() {
        let mut rng = StdRng::seed_from_u64(7);
        let slot = orbit_slot(OrbitLevel::Planet, 1, 4, &mut rng);
        assert!(approx(slot.initial_angle, TAU / 4.0));
    }

    #[test]
    fn test_jitter_stays_in_range_and_is_seedable() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..500 {
            let jitter = speed_jitter(OrbitLevel::Satellite, &mut rng);
            assert!((0.5..1.5).contains(&jitter));
        }

        let mut a = StdRng::seed_from_u64(3);
        let mut b = StdRng::seed_from_u64(3);
        assert_eq!(
            orbit_slot(OrbitLevel::Planet, 0, 1, &mut a),
            orbit_slot(OrbitLevel::Planet, 0, 1, &mut b)
        );
    }
}
