//! Asteroids: transient interrupts aimed at bodies
//!
//! After each successful rebuild every planet has a 30% chance and every
//! satellite a 20% chance of drawing an asteroid that suggests an action for
//! its task. An asteroid leaves the snapshot when the user accepts or rejects
//! it, when it reaches its expiry (a collision), or when its target disappears.
//! Existing asteroids are never mutated; removal is always by exclusion.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

use crate::hierarchy::{PlanetBody, SatelliteBody, System};
use crate::layout::Vec3;
use crate::models::{generate_id, Settings};
use crate::urgency::clamp_animation_speed;

/// Chance that a planet draws an asteroid on a rebuild
pub const PLANET_SPAWN_CHANCE: f64 = 0.3;

/// Chance that a satellite draws an asteroid on a rebuild
pub const SATELLITE_SPAWN_CHANCE: f64 = 0.2;

const BASE_SPEED: f64 = 0.5;
const SPEED_JITTER: f64 = 0.5;

const PLANET_ACTIONS: &[&str] = &[
    "Start now",
    "Break it down",
    "Set a 25-minute timer",
    "Reschedule",
];

const SATELLITE_ACTIONS: &[&str] = &["Finish this step", "Quick 5-minute push", "Mark as done"];

/// Kind of body an asteroid targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Planet,
    Satellite,
}

impl TargetKind {
    /// Lifetime range of asteroids aimed at this kind, in seconds
    pub fn lifetime_secs(&self) -> (i64, i64) {
        match self {
            TargetKind::Planet => (30, 90),
            TargetKind::Satellite => (20, 60),
        }
    }

    /// Distance range from the target at which asteroids appear
    pub fn spawn_distance(&self) -> (f64, f64) {
        match self {
            TargetKind::Planet => (40.0, 60.0),
            TargetKind::Satellite => (20.0, 30.0),
        }
    }

    pub fn actions(&self) -> &'static [&'static str] {
        match self {
            TargetKind::Planet => PLANET_ACTIONS,
            TargetKind::Satellite => SATELLITE_ACTIONS,
        }
    }
}

/// What an asteroid is aimed at
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsteroidTarget {
    pub kind: TargetKind,
    pub body_id: String,
    pub system_id: String,
    pub task_id: String,
    pub subtask_id: Option<String>,
}

/// A transient interrupt entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asteroid {
    pub id: String,
    pub target: AsteroidTarget,
    pub target_position: Vec3,
    pub spawn_position: Vec3,
    pub speed: f64,
    pub action: String,
    pub color: String,
    pub keywords: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Asteroid {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// How the user answered an asteroid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AsteroidAction {
    Accept,
    Reject,
}

/// An asteroid that reached its target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collision {
    pub asteroid_id: String,
    pub target: AsteroidTarget,
    pub at: DateTime<Utc>,
}

impl Collision {
    pub fn of(asteroid: &Asteroid, at: DateTime<Utc>) -> Self {
        Self {
            asteroid_id: asteroid.id.clone(),
            target: asteroid.target.clone(),
            at,
        }
    }
}

/// Keeps the asteroids whose target is still in `systems` and whose expiry has
/// not passed.
///
/// Each survivor is rebuilt against its target's new body: position, color,
/// keywords and system follow the target, the spawn point keeps its offset from
/// the target, and id, action, speed and timing are carried over.
pub fn retain_live(asteroids: &[Asteroid], systems: &[System], now: DateTime<Utc>) -> Vec<Asteroid> {
    let bodies = bodies(systems);
    asteroids
        .iter()
        .filter(|a| !a.is_expired(now))
        .filter_map(|a| {
            let body = bodies.get(a.target.body_id.as_str())?;
            let offset = Vec3::new(
                a.spawn_position.x - a.target_position.x,
                a.spawn_position.y - a.target_position.y,
                a.spawn_position.z - a.target_position.z,
            );
            Some(Asteroid {
                id: a.id.clone(),
                target: AsteroidTarget {
                    system_id: body.system_id.to_string(),
                    ..a.target.clone()
                },
                target_position: body.position,
                spawn_position: Vec3::new(
                    body.position.x + offset.x,
                    body.position.y + offset.y,
                    body.position.z + offset.z,
                ),
                speed: a.speed,
                action: a.action.clone(),
                color: body.color.to_string(),
                keywords: body.keywords.to_vec(),
                created_at: a.created_at,
                expires_at: a.expires_at,
            })
        })
        .collect()
}

/// Draws new asteroids for bodies in `systems`, skipping bodies already
/// targeted by one of `existing`
pub fn spawn_asteroids<R: Rng + ?Sized>(
    systems: &[System],
    existing: &[Asteroid],
    settings: &Settings,
    now: DateTime<Utc>,
    rng: &mut R,
) -> Vec<Asteroid> {
    let targeted: HashSet<&str> = existing.iter().map(|a| a.target.body_id.as_str()).collect();
    let mut spawned = Vec::new();

    for system in systems {
        for planet in &system.planets {
            if !targeted.contains(planet.id.as_str()) && rng.gen_bool(PLANET_SPAWN_CHANCE) {
                spawned.push(spawn_for_planet(system, planet, settings, now, rng));
            }
            for satellite in &planet.satellites {
                if !targeted.contains(satellite.id.as_str()) && rng.gen_bool(SATELLITE_SPAWN_CHANCE)
                {
                    spawned.push(spawn_for_satellite(system, planet, satellite, settings, now, rng));
                }
            }
        }
    }

    spawned
}

/// Splits off the expired asteroids, returning the survivors and one collision
/// per expired asteroid
pub fn collect_expired(
    asteroids: &[Asteroid],
    now: DateTime<Utc>,
) -> (Vec<Asteroid>, Vec<Collision>) {
    let (expired, live): (Vec<&Asteroid>, Vec<&Asteroid>) =
        asteroids.iter().partition(|a| a.is_expired(now));
    (
        live.into_iter().cloned().collect(),
        expired.into_iter().map(|a| Collision::of(a, now)).collect(),
    )
}

fn spawn_for_planet<R: Rng + ?Sized>(
    system: &System,
    planet: &PlanetBody,
    settings: &Settings,
    now: DateTime<Utc>,
    rng: &mut R,
) -> Asteroid {
    let target = AsteroidTarget {
        kind: TargetKind::Planet,
        body_id: planet.id.clone(),
        system_id: system.id.clone(),
        task_id: planet.task_id.clone(),
        subtask_id: None,
    };
    build(
        target,
        system.planet_position(planet),
        &planet.color,
        &planet.keywords,
        settings,
        now,
        rng,
    )
}

fn spawn_for_satellite<R: Rng + ?Sized>(
    system: &System,
    planet: &PlanetBody,
    satellite: &SatelliteBody,
    settings: &Settings,
    now: DateTime<Utc>,
    rng: &mut R,
) -> Asteroid {
    let target = AsteroidTarget {
        kind: TargetKind::Satellite,
        body_id: satellite.id.clone(),
        system_id: system.id.clone(),
        task_id: satellite.task_id.clone(),
        subtask_id: Some(satellite.subtask_id.clone()),
    };
    build(
        target,
        system.satellite_position(planet, satellite),
        &satellite.color,
        &satellite.keywords,
        settings,
        now,
        rng,
    )
}

fn build<R: Rng + ?Sized>(
    target: AsteroidTarget,
    target_position: Vec3,
    color: &str,
    keywords: &[String],
    settings: &Settings,
    now: DateTime<Utc>,
    rng: &mut R,
) -> Asteroid {
    let kind = target.kind;
    let (min_distance, max_distance) = kind.spawn_distance();
    let distance = rng.gen_range(min_distance..max_distance);
    let angle = rng.gen_range(0.0..TAU);
    let mut spawn_position = target_position.offset_planar(distance, angle);
    spawn_position.y += rng.gen_range(-10.0..10.0);

    let speed =
        (BASE_SPEED + rng.gen::<f64>() * SPEED_JITTER) * clamp_animation_speed(settings.animation_speed);
    let action = kind
        .actions()
        .choose(rng)
        .copied()
        .unwrap_or("Start now")
        .to_string();
    let (min_secs, max_secs) = kind.lifetime_secs();
    let lifetime = Duration::seconds(rng.gen_range(min_secs..=max_secs));

    Asteroid {
        id: generate_id("asteroid", now, rng),
        target,
        target_position,
        spawn_position,
        speed,
        action,
        color: color.to_string(),
        keywords: keywords.to_vec(),
        created_at: now,
        expires_at: now + lifetime,
    }
}

/// Where a body currently sits and how it looks
struct BodyRef<'a> {
    system_id: &'a str,
    position: Vec3,
    color: &'a str,
    keywords: &'a [String],
}

fn bodies(systems: &[System]) -> HashMap<&str, BodyRef<'_>> {
    let mut bodies = HashMap::new();
    for system in systems {
        for planet in &system.planets {
            bodies.insert(
                planet.id.as_str(),
                BodyRef {
                    system_id: &system.id,
                    position: system.planet_position(planet),
                    color: &planet.color,
                    keywords: &planet.keywords,
                },
            );
            for satellite in &planet.satellites {
                bodies.insert(
                    satellite.id.as_str(),
                    BodyRef {
                        system_id: &system.id,
                        position: system.satellite_position(planet, satellite),
                        color: &satellite.color,
                        keywords: &satellite.keywords,
                    },
                );
            }
        }
    }
    bodies
}
