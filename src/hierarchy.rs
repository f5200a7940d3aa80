//! Hierarchy assembly
//!
//! Turns the flat task list into systems: one per category group, each with a
//! sun, one planet per task and one satellite per subtask. [`assemble`] is a
//! pure function of its inputs (plus the RNG it is handed) and returns a brand
//! new object graph on every call, so callers can swap snapshots atomically.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::categories::{Category, Theme};
use crate::grouping::{group_tasks, Group};
use crate::keywords::keywords_or_fallback;
use crate::layout::{orbit_slot, system_position, OrbitLevel, OrbitSlot, Vec3};
use crate::models::{Settings, Subtask, Task};
use crate::urgency::{orbit_speed, Urgency};

/// Errors that abort a rebuild
#[derive(Debug, thiserror::Error)]
pub enum AssemblyError {
    #[error("duplicate task id '{0}'")]
    DuplicateTaskId(String),

    #[error("duplicate subtask id '{subtask_id}' in task '{task_id}'")]
    DuplicateSubtaskId { task_id: String, subtask_id: String },

    #[error("non-finite layout value for body '{0}'")]
    InvalidLayout(String),

    #[error("invariant violated in system '{system_id}': {reason}")]
    Invariant { system_id: String, reason: String },
}

/// Orbit of a body around its parent
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Orbit {
    pub radius: f64,
    pub speed: f64,
    pub initial_angle: f64,
}

impl Orbit {
    fn from_slot(slot: OrbitSlot, urgency: Urgency, animation_speed: f64) -> Self {
        Self {
            radius: slot.radius,
            speed: orbit_speed(urgency, animation_speed, slot.jitter),
            initial_angle: slot.initial_angle,
        }
    }

    fn is_finite(&self) -> bool {
        self.radius.is_finite() && self.speed.is_finite() && self.initial_angle.is_finite()
    }

    /// Position of a body on this orbit at its initial phase
    pub fn initial_position(&self, center: Vec3) -> Vec3 {
        center.offset_planar(self.radius, self.initial_angle)
    }
}

/// The root body of a system, standing for the category as a whole
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sun {
    pub name: String,
    pub keywords: Vec<String>,
    pub theme: Theme,
    pub max_priority: u8,
    pub task_count: usize,
}

/// A body standing for one subtask
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SatelliteBody {
    pub id: String,
    pub name: String,
    pub task_id: String,
    pub subtask_id: String,
    pub keywords: Vec<String>,
    pub orbit: Orbit,
    pub urgency: Urgency,
    pub color: String,
    pub completed: bool,
}

/// A body standing for one task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanetBody {
    pub id: String,
    pub name: String,
    pub task_id: String,
    pub keywords: Vec<String>,
    pub orbit: Orbit,
    pub urgency: Urgency,
    pub color: String,
    pub completed: bool,
    pub satellites: Vec<SatelliteBody>,
}

/// One cluster of bodies for one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct System {
    pub id: String,
    pub category: Category,
    pub category_key: String,
    pub name: String,
    pub position: Vec3,
    pub sun: Sun,
    pub planets: Vec<PlanetBody>,
}

impl System {
    /// Initial world position of a planet of this system
    pub fn planet_position(&self, planet: &PlanetBody) -> Vec3 {
        planet.orbit.initial_position(self.position)
    }

    /// Initial world position of a satellite of `planet`
    pub fn satellite_position(&self, planet: &PlanetBody, satellite: &SatelliteBody) -> Vec3 {
        satellite
            .orbit
            .initial_position(self.planet_position(planet))
    }
}

pub fn system_id(category_key: &str) -> String {
    format!("system-{}", category_key)
}

pub fn planet_id(task_id: &str) -> String {
    format!("planet-{}", task_id)
}

pub fn satellite_id(task_id: &str, subtask_id: &str) -> String {
    format!("satellite-{}-{}", task_id, subtask_id)
}

/// Builds the full hierarchy for `tasks`.
///
/// Returns no systems when grouping is disabled or there are no tasks.
pub fn assemble<R: Rng + ?Sized>(
    tasks: &[Task],
    settings: &Settings,
    now: DateTime<Utc>,
    rng: &mut R,
) -> Result<Vec<System>, AssemblyError> {
    if !settings.grouping_enabled || tasks.is_empty() {
        return Ok(Vec::new());
    }

    check_unique_ids(tasks)?;

    let groups = group_tasks(tasks);
    let count = groups.len();
    let systems = groups
        .iter()
        .enumerate()
        .map(|(index, group)| build_system(group, index, count, settings, now, rng))
        .collect::<Result<Vec<_>, _>>()?;

    for (system, group) in systems.iter().zip(&groups) {
        verify_system(system, group.tasks.iter().copied())?;
    }

    Ok(systems)
}

fn check_unique_ids(tasks: &[Task]) -> Result<(), AssemblyError> {
    let mut task_ids = HashSet::new();
    for task in tasks {
        if !task_ids.insert(task.id.as_str()) {
            return Err(AssemblyError::DuplicateTaskId(task.id.clone()));
        }
        let mut subtask_ids = HashSet::new();
        for subtask in &task.subtasks {
            if !subtask_ids.insert(subtask.id.as_str()) {
                return Err(AssemblyError::DuplicateSubtaskId {
                    task_id: task.id.clone(),
                    subtask_id: subtask.id.clone(),
                });
            }
        }
    }
    Ok(())
}

fn build_system<R: Rng + ?Sized>(
    group: &Group<'_>,
    index: usize,
    count: usize,
    settings: &Settings,
    now: DateTime<Utc>,
    rng: &mut R,
) -> Result<System, AssemblyError> {
    let planet_count = group.tasks.len();
    let planets = group
        .tasks
        .iter()
        .enumerate()
        .map(|(i, task)| build_planet(task, i, planet_count, settings, now, rng))
        .collect::<Result<Vec<_>, _>>()?;

    let id = system_id(&group.key);
    let position = system_position(index, count);
    if !position.is_finite() {
        return Err(AssemblyError::InvalidLayout(id));
    }

    Ok(System {
        id,
        category: group.category,
        category_key: group.key.clone(),
        name: group.display_name.to_string(),
        position,
        sun: Sun {
            name: group.display_name.to_string(),
            keywords: keywords_or_fallback(&group.keywords, group.display_name),
            theme: group.theme.clone(),
            max_priority: group.max_priority,
            task_count: planet_count,
        },
        planets,
    })
}

fn build_planet<R: Rng + ?Sized>(
    task: &Task,
    index: usize,
    count: usize,
    settings: &Settings,
    now: DateTime<Utc>,
    rng: &mut R,
) -> Result<PlanetBody, AssemblyError> {
    let id = planet_id(&task.id);
    let urgency = Urgency::from_deadline(task.deadline, now);
    let orbit = Orbit::from_slot(
        orbit_slot(OrbitLevel::Planet, index, count, rng),
        urgency,
        settings.animation_speed,
    );
    if !orbit.is_finite() {
        return Err(AssemblyError::InvalidLayout(id));
    }

    let satellite_count = task.subtasks.len();
    let satellites = task
        .subtasks
        .iter()
        .enumerate()
        .map(|(i, subtask)| build_satellite(task, subtask, i, satellite_count, settings, now, rng))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(PlanetBody {
        id,
        name: task.text.clone(),
        task_id: task.id.clone(),
        keywords: keywords_or_fallback(&task.keywords, &task.text),
        orbit,
        urgency,
        color: urgency.hex().to_string(),
        completed: task.completed,
        satellites,
    })
}

fn build_satellite<R: Rng + ?Sized>(
    task: &Task,
    subtask: &Subtask,
    index: usize,
    count: usize,
    settings: &Settings,
    now: DateTime<Utc>,
    rng: &mut R,
) -> Result<SatelliteBody, AssemblyError> {
    let id = satellite_id(&task.id, &subtask.id);
    let urgency = Urgency::from_deadline(subtask.deadline, now);
    let orbit = Orbit::from_slot(
        orbit_slot(OrbitLevel::Satellite, index, count, rng),
        urgency,
        settings.animation_speed,
    );
    if !orbit.is_finite() {
        return Err(AssemblyError::InvalidLayout(id));
    }

    Ok(SatelliteBody {
        id,
        name: subtask.text.clone(),
        task_id: task.id.clone(),
        subtask_id: subtask.id.clone(),
        keywords: keywords_or_fallback(&subtask.keywords, &subtask.text),
        orbit,
        urgency,
        color: urgency.hex().to_string(),
        completed: subtask.completed,
    })
}

/// Checks the structural invariants of one assembled system against the
/// tasks it was built from
pub fn verify_system<'a>(
    system: &System,
    tasks: impl ExactSizeIterator<Item = &'a Task>,
) -> Result<(), AssemblyError> {
    let violation = |reason: String| AssemblyError::Invariant {
        system_id: system.id.clone(),
        reason,
    };

    if system.sun.keywords.is_empty() {
        return Err(violation("sun has no keywords".to_string()));
    }
    if system.planets.len() != tasks.len() {
        return Err(violation(format!(
            "{} planets for {} tasks",
            system.planets.len(),
            tasks.len()
        )));
    }
    for (planet, task) in system.planets.iter().zip(tasks) {
        if planet.keywords.is_empty() {
            return Err(violation(format!("planet '{}' has no keywords", planet.id)));
        }
        if planet.satellites.len() != task.subtasks.len() {
            return Err(violation(format!(
                "planet '{}' has {} satellites for {} subtasks",
                planet.id,
                planet.satellites.len(),
                task.subtasks.len()
            )));
        }
        if let Some(satellite) = planet.satellites.iter().find(|s| s.keywords.is_empty()) {
            return Err(violation(format!(
                "satellite '{}' has no keywords",
                satellite.id
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keywords::{is_stop_word, MAX_KEYWORDS, MAX_KEYWORD_CHARS};
    use crate::models::{SubtaskDraft, TaskDraft};
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 8, 0, 0).unwrap()
    }

    fn build(drafts: Vec<TaskDraft>) -> Vec<Task> {
        let mut rng = StdRng::seed_from_u64(11);
        drafts
            .into_iter()
            .map(|draft| draft.into_task(now(), &mut rng))
            .collect()
    }

    fn assemble_seeded(tasks: &[Task], settings: &Settings) -> Vec<System> {
        let mut rng = StdRng::seed_from_u64(5);
        assemble(tasks, settings, now(), &mut rng).unwrap()
    }

    #[test]
    fn test_empty_tasks_yield_no_systems() {
        assert!(assemble_seeded(&[], &Settings::default()).is_empty());
    }

    #[test]
    fn test_grouping_disabled_yields_no_systems() {
        let tasks = build(vec![TaskDraft::new("Write report")]);
        let settings = Settings {
            grouping_enabled: false,
            ..Settings::default()
        };
        assert!(assemble_seeded(&tasks, &settings).is_empty());
    }

    #[test]
    fn test_work_task_with_two_subtasks() {
        let tasks = build(vec![TaskDraft::new("Quarterly report")
            .with_category("work")
            .with_subtask(SubtaskDraft::new("Gather numbers"))
            .with_subtask(SubtaskDraft::new("Draft slides"))]);
        let systems = assemble_seeded(&tasks, &Settings::default());

        assert_eq!(systems.len(), 1);
        let system = &systems[0];
        assert_eq!(system.name, "업무");
        assert_eq!(system.id, "system-work");
        assert_eq!(system.position, Vec3::ORIGIN);
        assert_eq!(system.planets.len(), 1);
        assert_eq!(system.planets[0].satellites.len(), 2);
        assert_eq!(system.planets[0].task_id, tasks[0].id);
        assert_eq!(system.sun.task_count, 1);
    }

    #[test]
    fn test_far_deadline_without_subtasks() {
        let tasks = build(vec![
            TaskDraft::new("Renew passport").with_deadline(now() + Duration::days(40))
        ]);
        let systems = assemble_seeded(&tasks, &Settings::default());

        let planet = &systems[0].planets[0];
        assert!(planet.satellites.is_empty());
        assert_eq!(planet.urgency, Urgency::Relaxed);
        assert_eq!(planet.urgency.color(), "green");
    }

    #[test]
    fn test_red_bucket_speed_scales_with_animation_speed() {
        let tasks = build(vec![
            TaskDraft::new("Pay rent").with_deadline(now() + Duration::hours(12))
        ]);
        let settings = Settings {
            animation_speed: 2.0,
            ..Settings::default()
        };
        let mut rng = StdRng::seed_from_u64(5);
        let systems = assemble(&tasks, &settings, now(), &mut rng).unwrap();
        let planet = &systems[0].planets[0];

        let mut replay = StdRng::seed_from_u64(5);
        let slot = orbit_slot(OrbitLevel::Planet, 0, 1, &mut replay);

        assert_eq!(planet.urgency.color(), "red");
        assert!((planet.orbit.speed - 3.0 * 2.0 * slot.jitter).abs() < 1e-9);
    }

    #[test]
    fn test_cardinalities_and_keyword_bounds() {
        let tasks = build(vec![
            TaskDraft::new("todo").with_category("work"),
            TaskDraft::new("Gym")
                .with_category("health")
                .with_keywords(vec!["cardio".into(), "task".into()])
                .with_subtask(SubtaskDraft::new("stretch")),
            TaskDraft::new("Exam prep")
                .with_category("study")
                .with_subtask(SubtaskDraft::new("todo"))
                .with_subtask(SubtaskDraft::new("Chapter 3").with_keywords(vec!["ch3".into()]))
                .with_subtask(SubtaskDraft::new("Mock test")),
            TaskDraft::new("Standup").with_category("WORK"),
        ]);
        let systems = assemble_seeded(&tasks, &Settings::default());

        assert_eq!(systems.len(), 3);
        let planets: usize = systems.iter().map(|s| s.planets.len()).sum();
        assert_eq!(planets, tasks.len());

        for system in &systems {
            assert!(!system.sun.keywords.is_empty());
            for planet in &system.planets {
                let task = tasks.iter().find(|t| t.id == planet.task_id).unwrap();
                assert_eq!(planet.satellites.len(), task.subtasks.len());
                let lists = std::iter::once(&planet.keywords)
                    .chain(planet.satellites.iter().map(|s| &s.keywords));
                for keywords in lists {
                    assert!(!keywords.is_empty());
                    assert!(keywords.len() <= MAX_KEYWORDS);
                    for keyword in keywords {
                        let len = keyword.chars().count();
                        assert!((1..=MAX_KEYWORD_CHARS).contains(&len));
                        assert!(!is_stop_word(keyword));
                    }
                }
            }
        }
    }

    #[test]
    fn test_systems_placed_on_ring() {
        let tasks = build(vec![
            TaskDraft::new("A").with_category("work"),
            TaskDraft::new("B").with_category("hobby"),
        ]);
        let systems = assemble_seeded(&tasks, &Settings::default());
        assert!((systems[0].position.x - 80.0).abs() < 1e-9);
        assert!((systems[1].position.x + 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_duplicate_task_ids_fail_assembly() {
        let mut tasks = build(vec![TaskDraft::new("A"), TaskDraft::new("B")]);
        tasks[1].id = tasks[0].id.clone();
        let mut rng = StdRng::seed_from_u64(5);
        let result = assemble(&tasks, &Settings::default(), now(), &mut rng);
        assert!(matches!(result, Err(AssemblyError::DuplicateTaskId(_))));
    }

    #[test]
    fn test_orbit_finiteness_check() {
        let tasks = build(vec![TaskDraft::new("A")]);
        let mut system = assemble_seeded(&tasks, &Settings::default()).remove(0);
        system.planets[0].orbit.speed = f64::NAN;
        assert!(!system.planets[0].orbit.is_finite());
    }

    #[test]
    fn test_inputs_untouched_and_graph_fresh() {
        let tasks = build(vec![TaskDraft::new("A").with_subtask(SubtaskDraft::new("a1"))]);
        let before = tasks.clone();
        let first = assemble_seeded(&tasks, &Settings::default());
        let second = assemble_seeded(&tasks, &Settings::default());
        assert_eq!(tasks, before);
        assert_eq!(first, second);
    }

    #[test]
    fn test_verify_rejects_planet_count_mismatch() {
        let tasks = build(vec![TaskDraft::new("A"), TaskDraft::new("B")]);
        let mut system = assemble_seeded(&tasks, &Settings::default()).remove(0);
        system.planets.pop();
        let result = verify_system(&system, tasks.iter());
        assert!(matches!(result, Err(AssemblyError::Invariant { .. })));
    }
}
