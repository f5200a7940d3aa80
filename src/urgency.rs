//! Deadline-driven urgency buckets
//!
//! A deadline maps to one of a few discrete buckets, each carrying a display
//! color and an orbit-speed multiplier. Days left are counted as
//! `ceil((deadline - now) / 1 day)`, so anything due within the next 24 hours
//! (or already overdue) lands in the hottest bucket.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lower bound of the global animation speed setting
pub const MIN_ANIMATION_SPEED: f64 = 0.1;

/// Upper bound of the global animation speed setting
pub const MAX_ANIMATION_SPEED: f64 = 5.0;

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Discrete urgency bucket derived from days until deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    /// Due within a day, or overdue
    Critical,
    /// Due within three days
    Soon,
    /// Due within a week
    Upcoming,
    /// Due later than a week from now
    Relaxed,
    /// No deadline at all
    Unscheduled,
}

impl Urgency {
    /// Buckets a deadline relative to `now`
    pub fn from_deadline(deadline: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        match days_left(deadline, now) {
            None => Urgency::Unscheduled,
            Some(days) if days <= 1 => Urgency::Critical,
            Some(days) if days <= 3 => Urgency::Soon,
            Some(days) if days <= 7 => Urgency::Upcoming,
            Some(_) => Urgency::Relaxed,
        }
    }

    /// Gets the color name of this bucket
    pub fn color(&self) -> &'static str {
        match self {
            Urgency::Critical => "red",
            Urgency::Soon => "orange",
            Urgency::Upcoming => "yellow",
            Urgency::Relaxed => "green",
            Urgency::Unscheduled => "blue",
        }
    }

    /// Gets the hex color used when painting bodies of this bucket
    pub fn hex(&self) -> &'static str {
        match self {
            Urgency::Critical => "#ff4444",
            Urgency::Soon => "#ff8800",
            Urgency::Upcoming => "#ffcc00",
            Urgency::Relaxed => "#44cc44",
            Urgency::Unscheduled => "#4488ff",
        }
    }

    /// Gets the base orbit-speed multiplier of this bucket
    pub fn speed_multiplier(&self) -> f64 {
        match self {
            Urgency::Critical => 3.0,
            Urgency::Soon => 2.0,
            Urgency::Upcoming => 1.5,
            Urgency::Relaxed | Urgency::Unscheduled => 0.8,
        }
    }

    /// Heat rank, higher is hotter. Unscheduled and relaxed share the coolest rank.
    pub fn heat(&self) -> u8 {
        match self {
            Urgency::Critical => 3,
            Urgency::Soon => 2,
            Urgency::Upcoming => 1,
            Urgency::Relaxed | Urgency::Unscheduled => 0,
        }
    }
}

/// Whole days until `deadline`, rounded up. `None` when there is no deadline.
pub fn days_left(deadline: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Option<i64> {
    deadline.map(|deadline| {
        let millis = (deadline - now).num_milliseconds() as f64;
        (millis / MILLIS_PER_DAY).ceil() as i64
    })
}

/// Clamps the global animation speed into its allowed range.
///
/// Non-finite values fall back to 1.0.
pub fn clamp_animation_speed(speed: f64) -> f64 {
    if speed.is_finite() {
        speed.clamp(MIN_ANIMATION_SPEED, MAX_ANIMATION_SPEED)
    } else {
        1.0
    }
}

/// Final orbit speed: bucket multiplier x clamped animation speed x per-body jitter
pub fn orbit_speed(urgency: Urgency, animation_speed: f64, jitter: f64) -> f64 {
    urgency.speed_multiplier() * clamp_animation_speed(animation_speed) * jitter
}
