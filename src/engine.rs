//! Engine state and the shared handle around it
//!
//! [`Engine`] holds everything the system knows: the task list, settings, the
//! published snapshot, the debounce scheduler and the RNG. It is driven one
//! call at a time. [`Core`] wraps it for sharing across the server, the
//! in-process client and the debounce timer task.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::asteroids::{
    collect_expired, retain_live, spawn_asteroids, Asteroid, AsteroidAction, AsteroidTarget,
    Collision,
};
use crate::hierarchy::{assemble, System};
use crate::models::{
    generate_id, Priority, Settings, SettingsPatch, Subtask, SubtaskDraft, SubtaskPatch, Task,
    TaskDraft, TaskPatch,
};
use crate::scheduler::{Scheduler, Ticket, DEFAULT_DEBOUNCE};
use crate::store::Store;

const MAX_HISTORY_SIZE: usize = 20;

/// Interval at which a running server sweeps expired asteroids
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Quiet period between the last mutation and the rebuild
    pub debounce: Duration,
    /// Seeds every random draw. `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            seed: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("task '{0}' not found")]
    TaskNotFound(String),

    #[error("subtask '{subtask_id}' not found in task '{task_id}'")]
    SubtaskNotFound { task_id: String, subtask_id: String },

    #[error("asteroid '{0}' not found")]
    AsteroidNotFound(String),

    #[error("system '{0}' not found")]
    SystemNotFound(String),
}

/// Represents a single state transition event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionLogEntry {
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub details: Option<String>,
}

impl TransitionLogEntry {
    pub fn new(action: String, details: Option<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            action,
            details,
        }
    }
}

/// The published hierarchy. Replaced wholesale, never edited in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u64,
    pub built_at: DateTime<Utc>,
    pub systems: Vec<System>,
    pub asteroids: Vec<Asteroid>,
}

impl Snapshot {
    pub fn empty(version: u64, built_at: DateTime<Utc>) -> Self {
        Self {
            version,
            built_at,
            systems: Vec::new(),
            asteroids: Vec::new(),
        }
    }

    pub fn system(&self, system_id: &str) -> Option<&System> {
        self.systems.iter().find(|s| s.id == system_id)
    }

    pub fn asteroid(&self, asteroid_id: &str) -> Option<&Asteroid> {
        self.asteroids.iter().find(|a| a.id == asteroid_id)
    }

    pub fn planet_count(&self) -> usize {
        self.systems.iter().map(|s| s.planets.len()).sum()
    }
}

/// A click the renderer reports on a body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BodyClick {
    Sun { system_id: String },
    Planet { task_id: String },
    Satellite { task_id: String, subtask_id: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClickOutcome {
    Focused { system_id: String },
    Task { task: Task },
    Subtask { task_id: String, subtask: Subtask },
}

/// Result of accepting or rejecting an asteroid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsteroidOutcome {
    pub asteroid_id: String,
    pub action: AsteroidAction,
    /// The action the asteroid suggested
    pub suggestion: String,
    pub target: AsteroidTarget,
}

pub struct Engine {
    tasks: Vec<Task>,
    settings: Settings,
    snapshot: Arc<Snapshot>,
    scheduler: Scheduler,
    rng: StdRng,
    store: Box<dyn Store>,
    history: VecDeque<TransitionLogEntry>,
}

impl Engine {
    /// Loads tasks and settings from `store` and builds the first snapshot.
    ///
    /// Load failures fall back to an empty task list and default settings.
    pub fn new(mut store: Box<dyn Store>, config: EngineConfig) -> Self {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut tasks = store.load_tasks(&mut rng).unwrap_or_else(|e| {
            tracing::warn!("Failed to load tasks, starting empty: {}", e);
            Vec::new()
        });
        if repair_duplicate_ids(&mut tasks, Utc::now(), &mut rng) {
            if let Err(e) = store.save_tasks(&tasks) {
                tracing::warn!("Failed to save repaired tasks: {}", e);
            }
        }
        let settings = store
            .load_settings()
            .map(Settings::normalized)
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to load settings, using defaults: {}", e);
                Settings::default()
            });

        let now = Utc::now();
        let mut engine = Self {
            tasks,
            settings,
            snapshot: Arc::new(Snapshot::empty(0, now)),
            scheduler: Scheduler::new(config.debounce),
            rng,
            store,
            history: VecDeque::with_capacity(MAX_HISTORY_SIZE),
        };
        engine.log_transition(
            "load".to_string(),
            Some(format!("{} tasks", engine.tasks.len())),
        );
        engine.rebuild_at(now);
        engine
    }

    /// Logs a state transition, maintaining the history buffer size.
    fn log_transition(&mut self, action: String, details: Option<String>) {
        if self.history.len() == MAX_HISTORY_SIZE {
            self.history.pop_front();
        }
        self.history
            .push_back(TransitionLogEntry::new(action, details));
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn task(&self, task_id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == task_id)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshot)
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn history(&self) -> Vec<TransitionLogEntry> {
        self.history.iter().cloned().collect()
    }

    fn task_mut(&mut self, task_id: &str) -> Result<&mut Task, EngineError> {
        self.tasks
            .iter_mut()
            .find(|t| t.id == task_id)
            .ok_or_else(|| EngineError::TaskNotFound(task_id.to_string()))
    }

    fn subtask_mut(&mut self, task_id: &str, subtask_id: &str) -> Result<&mut Subtask, EngineError> {
        self.task_mut(task_id)?
            .subtask_mut(subtask_id)
            .ok_or_else(|| EngineError::SubtaskNotFound {
                task_id: task_id.to_string(),
                subtask_id: subtask_id.to_string(),
            })
    }

    fn persist_tasks(&mut self) {
        if let Err(e) = self.store.save_tasks(&self.tasks) {
            tracing::warn!("Failed to save tasks: {}", e);
        }
    }

    fn persist_settings(&mut self) {
        if let Err(e) = self.store.save_settings(&self.settings) {
            tracing::warn!("Failed to save settings: {}", e);
        }
    }

    /// Writes the task list through and schedules a rebuild
    fn tasks_changed(&mut self, action: &str, details: String) {
        self.persist_tasks();
        let ticket = self.scheduler.request();
        tracing::debug!("{} ({}), rebuild pending as {:?}", action, details, ticket);
        self.log_transition(action.to_string(), Some(details));
    }

    pub fn add_task(&mut self, draft: TaskDraft) -> Task {
        let now = Utc::now();
        let mut task = draft.into_task(now, &mut self.rng);
        if self.task(&task.id).is_some() {
            let id = generate_id("task", now, &mut self.rng);
            tracing::warn!("Task id '{}' already taken, using '{}'", task.id, id);
            task.id = id;
        }
        dedupe_subtask_ids(&mut task, now, &mut self.rng);

        self.tasks.push(task.clone());
        self.tasks_changed("add_task", task.id.clone());
        task
    }

    pub fn update_task(&mut self, task_id: &str, patch: TaskPatch) -> Result<Task, EngineError> {
        let task = self.task_mut(task_id)?;
        patch.apply(task);
        let task = task.clone();
        self.tasks_changed("update_task", task_id.to_string());
        Ok(task)
    }

    pub fn delete_task(&mut self, task_id: &str) -> Result<Task, EngineError> {
        let index = self
            .tasks
            .iter()
            .position(|t| t.id == task_id)
            .ok_or_else(|| EngineError::TaskNotFound(task_id.to_string()))?;
        let task = self.tasks.remove(index);
        self.tasks_changed("delete_task", task_id.to_string());
        Ok(task)
    }

    pub fn toggle_task(&mut self, task_id: &str) -> Result<Task, EngineError> {
        let task = self.task_mut(task_id)?;
        task.completed = !task.completed;
        let task = task.clone();
        self.tasks_changed(
            "toggle_task",
            format!("{} -> completed={}", task_id, task.completed),
        );
        Ok(task)
    }

    pub fn add_subtask(&mut self, task_id: &str, draft: SubtaskDraft) -> Result<Subtask, EngineError> {
        let now = Utc::now();
        let mut subtask = draft.into_subtask(now, &mut self.rng);
        let taken = self.task_mut(task_id)?.subtask(&subtask.id).is_some();
        if taken {
            subtask.id = generate_id("sub", now, &mut self.rng);
        }
        self.task_mut(task_id)?.subtasks.push(subtask.clone());
        self.tasks_changed("add_subtask", format!("{}/{}", task_id, subtask.id));
        Ok(subtask)
    }

    pub fn update_subtask(
        &mut self,
        task_id: &str,
        subtask_id: &str,
        patch: SubtaskPatch,
    ) -> Result<Subtask, EngineError> {
        let subtask = self.subtask_mut(task_id, subtask_id)?;
        patch.apply(subtask);
        let subtask = subtask.clone();
        self.tasks_changed("update_subtask", format!("{}/{}", task_id, subtask_id));
        Ok(subtask)
    }

    pub fn toggle_subtask(&mut self, task_id: &str, subtask_id: &str) -> Result<Subtask, EngineError> {
        let subtask = self.subtask_mut(task_id, subtask_id)?;
        subtask.completed = !subtask.completed;
        let subtask = subtask.clone();
        self.tasks_changed(
            "toggle_subtask",
            format!("{}/{} -> completed={}", task_id, subtask_id, subtask.completed),
        );
        Ok(subtask)
    }

    pub fn delete_subtask(&mut self, task_id: &str, subtask_id: &str) -> Result<Subtask, EngineError> {
        let task = self.task_mut(task_id)?;
        let index = task
            .subtasks
            .iter()
            .position(|s| s.id == subtask_id)
            .ok_or_else(|| EngineError::SubtaskNotFound {
                task_id: task_id.to_string(),
                subtask_id: subtask_id.to_string(),
            })?;
        let subtask = task.subtasks.remove(index);
        self.tasks_changed("delete_subtask", format!("{}/{}", task_id, subtask_id));
        Ok(subtask)
    }

    /// Applies a settings patch. Out-of-range animation speeds are clamped.
    pub fn update_settings(&mut self, patch: SettingsPatch) -> Settings {
        let affects_hierarchy = patch.affects_hierarchy();
        if let Some(grouping_enabled) = patch.grouping_enabled {
            self.settings.grouping_enabled = grouping_enabled;
        }
        if let Some(animation_speed) = patch.animation_speed {
            self.settings.animation_speed = animation_speed;
        }
        if let Some(show_orbits) = patch.show_orbits {
            self.settings.show_orbits = show_orbits;
        }
        self.settings = self.settings.clone().normalized();
        self.persist_settings();

        let details = serde_json::to_string(&patch).unwrap_or_default();
        if affects_hierarchy {
            self.scheduler.request();
        }
        self.log_transition("update_settings".to_string(), Some(details));
        self.settings.clone()
    }

    /// Focuses a system of the current snapshot, or clears the focus.
    ///
    /// Unknown system ids are ignored. Returns the focus in effect afterwards.
    pub fn focus_system(&mut self, system_id: Option<&str>) -> Option<String> {
        match system_id {
            Some(id) if self.snapshot.system(id).is_none() => {
                tracing::debug!("Ignoring focus on unknown system '{}'", id);
            }
            _ => {
                self.settings.focused_system_id = system_id.map(str::to_string);
                self.persist_settings();
                self.log_transition(
                    "focus_system".to_string(),
                    system_id.map(str::to_string),
                );
            }
        }
        self.settings.focused_system_id.clone()
    }

    pub fn body_click(&mut self, click: BodyClick) -> Result<ClickOutcome, EngineError> {
        match click {
            BodyClick::Sun { system_id } => {
                if self.snapshot.system(&system_id).is_none() {
                    return Err(EngineError::SystemNotFound(system_id));
                }
                self.focus_system(Some(&system_id));
                Ok(ClickOutcome::Focused { system_id })
            }
            BodyClick::Planet { task_id } => {
                let task = self
                    .task(&task_id)
                    .cloned()
                    .ok_or(EngineError::TaskNotFound(task_id))?;
                Ok(ClickOutcome::Task { task })
            }
            BodyClick::Satellite {
                task_id,
                subtask_id,
            } => {
                let subtask = self
                    .task(&task_id)
                    .ok_or_else(|| EngineError::TaskNotFound(task_id.clone()))?
                    .subtask(&subtask_id)
                    .cloned()
                    .ok_or_else(|| EngineError::SubtaskNotFound {
                        task_id: task_id.clone(),
                        subtask_id,
                    })?;
                Ok(ClickOutcome::Subtask { task_id, subtask })
            }
        }
    }

    /// Removes an asteroid the user answered and republishes
    pub fn asteroid_action(
        &mut self,
        asteroid_id: &str,
        action: AsteroidAction,
    ) -> Result<AsteroidOutcome, EngineError> {
        let asteroid = self.remove_asteroid(asteroid_id, Utc::now())?;
        tracing::info!(
            "Asteroid {} {:?} ({} on {})",
            asteroid.id,
            action,
            asteroid.action,
            asteroid.target.body_id
        );
        self.log_transition(
            "asteroid_action".to_string(),
            Some(format!("{} {:?}", asteroid_id, action)),
        );
        Ok(AsteroidOutcome {
            asteroid_id: asteroid.id,
            action,
            suggestion: asteroid.action,
            target: asteroid.target,
        })
    }

    /// Removes an asteroid the renderer reports as having hit its target
    pub fn asteroid_collision(
        &mut self,
        asteroid_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Collision, EngineError> {
        let asteroid = self.remove_asteroid(asteroid_id, now)?;
        tracing::info!(
            "Asteroid {} collided with {}",
            asteroid.id,
            asteroid.target.body_id
        );
        self.log_transition("asteroid_collision".to_string(), Some(asteroid.id.clone()));
        Ok(Collision::of(&asteroid, now))
    }

    /// Removes every asteroid whose expiry has passed, reporting each as a
    /// collision
    pub fn sweep_expired(&mut self, now: DateTime<Utc>) -> Vec<Collision> {
        let (live, collisions) = collect_expired(&self.snapshot.asteroids, now);
        if collisions.is_empty() {
            return collisions;
        }
        tracing::info!("{} asteroids expired", collisions.len());
        let systems = self.snapshot.systems.clone();
        self.publish(systems, live, now);
        self.log_transition(
            "sweep_expired".to_string(),
            Some(format!("{} collisions", collisions.len())),
        );
        collisions
    }

    fn remove_asteroid(
        &mut self,
        asteroid_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Asteroid, EngineError> {
        let asteroid = self
            .snapshot
            .asteroid(asteroid_id)
            .cloned()
            .ok_or_else(|| EngineError::AsteroidNotFound(asteroid_id.to_string()))?;
        let systems = self.snapshot.systems.clone();
        let asteroids = self
            .snapshot
            .asteroids
            .iter()
            .filter(|a| a.id != asteroid_id)
            .cloned()
            .collect();
        self.publish(systems, asteroids, now);
        Ok(asteroid)
    }

    /// Runs the rebuild for `ticket` if it is still the current one
    pub fn fire(&mut self, ticket: Ticket, now: DateTime<Utc>) -> bool {
        match self.scheduler.fire(ticket) {
            Some(coalesced) => {
                tracing::debug!("Debounce elapsed after {} mutations", coalesced);
                self.rebuild_at(now);
                true
            }
            None => false,
        }
    }

    /// Runs a pending rebuild immediately
    pub fn flush(&mut self, now: DateTime<Utc>) -> bool {
        match self.scheduler.flush() {
            Some(_) => {
                self.rebuild_at(now);
                true
            }
            None => false,
        }
    }

    /// Assembles a new hierarchy and publishes it.
    ///
    /// A failed assembly publishes an empty snapshot.
    pub fn rebuild_at(&mut self, now: DateTime<Utc>) {
        tracing::info!("Rebuilding hierarchy for {} tasks", self.tasks.len());
        match assemble(&self.tasks, &self.settings, now, &mut self.rng) {
            Ok(systems) => {
                let asteroids = if systems.is_empty() {
                    Vec::new()
                } else {
                    let mut kept = retain_live(&self.snapshot.asteroids, &systems, now);
                    let spawned =
                        spawn_asteroids(&systems, &kept, &self.settings, now, &mut self.rng);
                    if !spawned.is_empty() {
                        tracing::debug!("Spawned {} asteroids", spawned.len());
                    }
                    kept.extend(spawned);
                    kept
                };
                let details = format!("{} systems, {} asteroids", systems.len(), asteroids.len());
                self.publish(systems, asteroids, now);
                self.log_transition("rebuild".to_string(), Some(details));
            }
            Err(e) => {
                tracing::error!("Rebuild failed, publishing empty hierarchy: {}", e);
                self.publish(Vec::new(), Vec::new(), now);
                self.log_transition("rebuild_failed".to_string(), Some(e.to_string()));
            }
        }
        self.clear_stale_focus();
    }

    fn publish(&mut self, systems: Vec<System>, asteroids: Vec<Asteroid>, now: DateTime<Utc>) {
        self.snapshot = Arc::new(Snapshot {
            version: self.snapshot.version + 1,
            built_at: now,
            systems,
            asteroids,
        });
    }

    fn clear_stale_focus(&mut self) {
        let stale = match &self.settings.focused_system_id {
            Some(id) => self.snapshot.system(id).is_none(),
            None => false,
        };
        if stale {
            tracing::info!("Focused system disappeared, clearing focus");
            self.settings.focused_system_id = None;
            self.persist_settings();
        }
    }
}

/// Gives repeated subtask ids fresh ones. Returns true if any id changed.
fn dedupe_subtask_ids(task: &mut Task, now: DateTime<Utc>, rng: &mut StdRng) -> bool {
    let mut seen = HashSet::new();
    let mut changed = false;
    for subtask in &mut task.subtasks {
        if !seen.insert(subtask.id.clone()) {
            subtask.id = generate_id("sub", now, rng);
            seen.insert(subtask.id.clone());
            changed = true;
        }
    }
    changed
}

/// Gives every task or subtask whose id repeats an earlier one a fresh id, so
/// a hand-edited store cannot fail every rebuild. Returns true if any id
/// changed.
fn repair_duplicate_ids(tasks: &mut [Task], now: DateTime<Utc>, rng: &mut StdRng) -> bool {
    let mut seen = HashSet::new();
    let mut changed = false;
    for task in tasks.iter_mut() {
        if !seen.insert(task.id.clone()) {
            let id = generate_id("task", now, rng);
            tracing::warn!("Stored task id '{}' is repeated, using '{}'", task.id, id);
            task.id = id;
            seen.insert(task.id.clone());
            changed = true;
        }
        if dedupe_subtask_ids(task, now, rng) {
            tracing::warn!("Stored task '{}' had repeated subtask ids", task.id);
            changed = true;
        }
    }
    changed
}

/// Sample tasks for `serve --example`
pub fn example_drafts(now: DateTime<Utc>) -> Vec<TaskDraft> {
    let days = chrono::Duration::days;
    vec![
        TaskDraft::new("Ship release notes")
            .with_category("work")
            .with_priority(Priority::High)
            .with_deadline(now + chrono::Duration::hours(12))
            .with_keywords(vec!["ship".into(), "notes".into()])
            .with_subtask(SubtaskDraft::new("Collect merged changes"))
            .with_subtask(SubtaskDraft::new("Draft summary").with_deadline(now + days(2))),
        TaskDraft::new("Quarterly planning")
            .with_category("work")
            .with_deadline(now + days(6))
            .with_keywords(vec!["plan".into(), "okr".into()]),
        TaskDraft::new("Read chapter 4")
            .with_category("study")
            .with_deadline(now + days(3))
            .with_keywords(vec!["read".into(), "rust".into()])
            .with_subtask(SubtaskDraft::new("Take notes")),
        TaskDraft::new("Morning run")
            .with_category("health")
            .with_priority(Priority::Low)
            .with_keywords(vec!["run".into()]),
        TaskDraft::new("Pay electricity bill")
            .with_category("finance")
            .with_deadline(now + days(14)),
    ]
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

struct ArmedTimer {
    ticket: Ticket,
    handle: JoinHandle<()>,
}

/// Cloneable handle to a shared [`Engine`].
///
/// Every mutation goes through here so that the debounce timer is armed and
/// subscribers hear about each newly published snapshot version.
#[derive(Clone)]
pub struct Core {
    inner: Arc<Mutex<Engine>>,
    update_tx: Arc<broadcast::Sender<u64>>,
    timer: Arc<Mutex<Option<ArmedTimer>>>,
    debounce: Duration,
}

impl Core {
    pub fn new(engine: Engine) -> Self {
        // Create a broadcast channel with capacity for 100 messages
        let (tx, _rx) = broadcast::channel(100);
        let debounce = engine.scheduler().debounce();

        Self {
            inner: Arc::new(Mutex::new(engine)),
            update_tx: Arc::new(tx),
            timer: Arc::new(Mutex::new(None)),
            debounce,
        }
    }

    // Runs `f` on the engine, then announces a new snapshot and arms the
    // debounce timer if `f` left a rebuild pending
    fn with_engine<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut Engine) -> R,
    {
        let (result, published, pending) = {
            let mut engine = lock(&self.inner);
            let before = engine.snapshot.version;
            let result = f(&mut engine);
            let version = engine.snapshot.version;
            (
                result,
                (version != before).then_some(version),
                engine.scheduler.pending_ticket(),
            )
        };

        if let Some(version) = published {
            let _ = self.update_tx.send(version);
        }
        if let Some(ticket) = pending {
            self.arm(ticket);
        }
        result
    }

    fn arm(&self, ticket: Ticket) {
        let mut timer = lock(&self.timer);
        if matches!(&*timer, Some(armed) if armed.ticket == ticket) {
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                if let Some(previous) = timer.take() {
                    previous.handle.abort();
                }
                let core = self.clone();
                let debounce = self.debounce;
                let handle = runtime.spawn(async move {
                    tokio::time::sleep(debounce).await;
                    core.fire(ticket);
                });
                *timer = Some(ArmedTimer { ticket, handle });
            }
            Err(_) => {
                // No runtime to wait on
                drop(timer);
                self.fire(ticket);
            }
        }
    }

    fn fire(&self, ticket: Ticket) {
        let fired = self.with_engine(|engine| engine.fire(ticket, Utc::now()));
        if fired {
            let mut timer = lock(&self.timer);
            if matches!(&*timer, Some(armed) if armed.ticket == ticket) {
                *timer = None;
            }
        }
    }

    /// Subscribe to snapshot versions as they are published
    pub fn subscribe(&self) -> broadcast::Receiver<u64> {
        self.update_tx.subscribe()
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        lock(&self.inner).snapshot()
    }

    pub fn tasks(&self) -> Vec<Task> {
        lock(&self.inner).tasks().to_vec()
    }

    pub fn task(&self, task_id: &str) -> Result<Task, EngineError> {
        lock(&self.inner)
            .task(task_id)
            .cloned()
            .ok_or_else(|| EngineError::TaskNotFound(task_id.to_string()))
    }

    pub fn settings(&self) -> Settings {
        lock(&self.inner).settings().clone()
    }

    pub fn history(&self) -> Vec<TransitionLogEntry> {
        lock(&self.inner).history()
    }

    pub fn is_rebuild_pending(&self) -> bool {
        lock(&self.inner).scheduler().is_pending()
    }

    pub fn add_task(&self, draft: TaskDraft) -> Task {
        self.with_engine(|engine| engine.add_task(draft))
    }

    pub fn update_task(&self, task_id: &str, patch: TaskPatch) -> Result<Task, EngineError> {
        self.with_engine(|engine| engine.update_task(task_id, patch))
    }

    pub fn delete_task(&self, task_id: &str) -> Result<Task, EngineError> {
        self.with_engine(|engine| engine.delete_task(task_id))
    }

    pub fn toggle_task(&self, task_id: &str) -> Result<Task, EngineError> {
        self.with_engine(|engine| engine.toggle_task(task_id))
    }

    pub fn add_subtask(&self, task_id: &str, draft: SubtaskDraft) -> Result<Subtask, EngineError> {
        self.with_engine(|engine| engine.add_subtask(task_id, draft))
    }

    pub fn update_subtask(
        &self,
        task_id: &str,
        subtask_id: &str,
        patch: SubtaskPatch,
    ) -> Result<Subtask, EngineError> {
        self.with_engine(|engine| engine.update_subtask(task_id, subtask_id, patch))
    }

    pub fn toggle_subtask(&self, task_id: &str, subtask_id: &str) -> Result<Subtask, EngineError> {
        self.with_engine(|engine| engine.toggle_subtask(task_id, subtask_id))
    }

    pub fn delete_subtask(&self, task_id: &str, subtask_id: &str) -> Result<Subtask, EngineError> {
        self.with_engine(|engine| engine.delete_subtask(task_id, subtask_id))
    }

    pub fn update_settings(&self, patch: SettingsPatch) -> Settings {
        self.with_engine(|engine| engine.update_settings(patch))
    }

    pub fn focus_system(&self, system_id: Option<&str>) -> Option<String> {
        self.with_engine(|engine| engine.focus_system(system_id))
    }

    pub fn body_click(&self, click: BodyClick) -> Result<ClickOutcome, EngineError> {
        self.with_engine(|engine| engine.body_click(click))
    }

    pub fn asteroid_action(
        &self,
        asteroid_id: &str,
        action: AsteroidAction,
    ) -> Result<AsteroidOutcome, EngineError> {
        self.with_engine(|engine| engine.asteroid_action(asteroid_id, action))
    }

    pub fn asteroid_collision(&self, asteroid_id: &str) -> Result<Collision, EngineError> {
        self.with_engine(|engine| engine.asteroid_collision(asteroid_id, Utc::now()))
    }

    pub fn sweep_expired(&self) -> Vec<Collision> {
        self.with_engine(|engine| engine.sweep_expired(Utc::now()))
    }

    /// Rebuilds now if a rebuild is pending, skipping the rest of the quiet
    /// period
    pub fn flush(&self) -> bool {
        let flushed = self.with_engine(|engine| engine.flush(Utc::now()));
        if let Some(armed) = lock(&self.timer).take() {
            armed.handle.abort();
        }
        flushed
    }

    /// Spawns a task that sweeps expired asteroids every `period`
    pub fn spawn_sweeper(&self, period: Duration) -> JoinHandle<()> {
        let core = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                core.sweep_expired();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::urgency::Urgency;
    use pretty_assertions::assert_eq;

    fn config(seed: u64) -> EngineConfig {
        EngineConfig {
            seed: Some(seed),
            ..EngineConfig::default()
        }
    }

    fn engine() -> Engine {
        Engine::new(Box::new(MemoryStore::new()), config(11))
    }

    fn work_task(text: &str, subtasks: usize) -> TaskDraft {
        let mut draft = TaskDraft::new(text).with_category("work");
        for i in 0..subtasks {
            draft = draft.with_subtask(SubtaskDraft::new(format!("step {i}")));
        }
        draft
    }

    #[test]
    fn test_fresh_engine_is_empty() {
        let engine = engine();
        let snapshot = engine.snapshot();
        assert!(snapshot.systems.is_empty());
        assert!(snapshot.asteroids.is_empty());
        assert!(!engine.scheduler().is_pending());
    }

    #[test]
    fn test_repeated_stored_ids_are_repaired_on_load() {
        let now = Utc::now();
        let mut rng = StdRng::seed_from_u64(3);
        let mut first = work_task("Write report", 2).into_task(now, &mut rng);
        first.id = "t1".to_string();
        for subtask in &mut first.subtasks {
            subtask.id = "s1".to_string();
        }
        let mut second = TaskDraft::new("Read book")
            .with_category("study")
            .into_task(now, &mut rng);
        second.id = "t1".to_string();
        let mut third = TaskDraft::new("Stretch")
            .with_category("health")
            .into_task(now, &mut rng);
        third.id = "t2".to_string();

        let engine = Engine::new(
            Box::new(MemoryStore::with_tasks(vec![first, second, third])),
            config(5),
        );

        let snapshot = engine.snapshot();
        assert_eq!(snapshot.systems.len(), 3);
        assert_eq!(snapshot.planet_count(), 3);

        let ids: HashSet<&str> = engine.tasks().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids.len(), 3);
        assert!(ids.contains("t1") && ids.contains("t2"));
        let subtasks = &engine.tasks()[0].subtasks;
        assert_eq!(subtasks[0].id, "s1");
        assert_ne!(subtasks[0].id, subtasks[1].id);
    }

    #[test]
    fn test_load_failure_falls_back_to_defaults() {
        let engine = Engine::new(Box::new(MemoryStore::failing()), config(1));
        assert!(engine.tasks().is_empty());
        assert_eq!(engine.settings(), &Settings::default());
    }

    #[test]
    fn test_mutation_schedules_but_does_not_rebuild() {
        let mut engine = engine();
        let version = engine.snapshot().version;
        engine.add_task(work_task("Write", 2));

        assert!(engine.scheduler().is_pending());
        assert_eq!(engine.snapshot().version, version);
        assert!(engine.flush(Utc::now()));

        let snapshot = engine.snapshot();
        assert_eq!(snapshot.version, version + 1);
        assert_eq!(snapshot.systems.len(), 1);
        assert_eq!(snapshot.systems[0].name, "업무");
        assert_eq!(snapshot.systems[0].planets[0].satellites.len(), 2);
    }

    #[test]
    fn test_stale_ticket_does_not_rebuild() {
        let mut engine = engine();
        engine.add_task(work_task("a", 0));
        let stale = engine.scheduler().pending_ticket().unwrap();
        engine.add_task(work_task("b", 0));

        let version = engine.snapshot().version;
        assert!(!engine.fire(stale, Utc::now()));
        assert_eq!(engine.snapshot().version, version);
    }

    #[test]
    fn test_write_through_before_rebuild() {
        let mut engine = engine();
        let task = engine.add_task(work_task("Persist me", 0));
        // No flush: the store must already hold the task
        let mut store = engine.store;
        let mut rng = StdRng::seed_from_u64(0);
        let stored = store.load_tasks(&mut rng).unwrap();
        assert_eq!(stored, vec![task]);
    }

    #[test]
    fn test_save_failure_keeps_engine_running() {
        let mut engine = Engine::new(Box::new(MemoryStore::failing()), config(2));
        let task = engine.add_task(work_task("Still here", 1));
        engine.flush(Utc::now());
        assert_eq!(engine.tasks(), &[task]);
        assert_eq!(engine.snapshot().planet_count(), 1);
    }

    #[test]
    fn test_duplicate_draft_id_is_replaced() {
        let mut engine = engine();
        let mut draft = work_task("first", 0);
        draft.id = Some("same".to_string());
        engine.add_task(draft.clone());
        let second = engine.add_task(draft);

        assert_ne!(second.id, "same");
        engine.flush(Utc::now());
        assert_eq!(engine.snapshot().planet_count(), 2);
    }

    #[test]
    fn test_unknown_ids_are_not_found() {
        let mut engine = engine();
        assert!(matches!(
            engine.update_task("missing", TaskPatch::default()),
            Err(EngineError::TaskNotFound(_))
        ));
        assert!(matches!(
            engine.delete_task("missing"),
            Err(EngineError::TaskNotFound(_))
        ));
        let task = engine.add_task(work_task("a", 0));
        engine.flush(Utc::now());
        assert!(matches!(
            engine.toggle_subtask(&task.id, "nope"),
            Err(EngineError::SubtaskNotFound { .. })
        ));
        assert!(!engine.scheduler().is_pending());
    }

    #[test]
    fn test_subtask_crud() {
        let mut engine = engine();
        let task = engine.add_task(work_task("parent", 0));
        let subtask = engine
            .add_subtask(&task.id, SubtaskDraft::new("child"))
            .unwrap();
        let toggled = engine.toggle_subtask(&task.id, &subtask.id).unwrap();
        assert!(toggled.completed);

        let renamed = engine
            .update_subtask(
                &task.id,
                &subtask.id,
                SubtaskPatch {
                    text: Some("renamed".to_string()),
                    ..SubtaskPatch::default()
                },
            )
            .unwrap();
        assert_eq!(renamed.text, "renamed");

        engine.flush(Utc::now());
        assert_eq!(engine.snapshot().systems[0].planets[0].satellites.len(), 1);

        engine.delete_subtask(&task.id, &subtask.id).unwrap();
        engine.flush(Utc::now());
        assert!(engine.snapshot().systems[0].planets[0].satellites.is_empty());
    }

    #[test]
    fn test_grouping_off_clears_systems_and_asteroids() {
        let mut engine = engine();
        for i in 0..10 {
            engine.add_task(work_task(&format!("t{i}"), 2));
        }
        engine.flush(Utc::now());
        assert!(!engine.snapshot().systems.is_empty());

        engine.update_settings(SettingsPatch {
            grouping_enabled: Some(false),
            ..SettingsPatch::default()
        });
        engine.flush(Utc::now());

        let snapshot = engine.snapshot();
        assert!(snapshot.systems.is_empty());
        assert!(snapshot.asteroids.is_empty());
        assert_eq!(engine.tasks().len(), 10);
    }

    #[test]
    fn test_animation_speed_is_clamped() {
        let mut engine = engine();
        let settings = engine.update_settings(SettingsPatch {
            animation_speed: Some(40.0),
            ..SettingsPatch::default()
        });
        assert_eq!(settings.animation_speed, 5.0);
        let settings = engine.update_settings(SettingsPatch {
            animation_speed: Some(0.0),
            ..SettingsPatch::default()
        });
        assert_eq!(settings.animation_speed, 0.1);
    }

    #[test]
    fn test_show_orbits_does_not_schedule_rebuild() {
        let mut engine = engine();
        engine.update_settings(SettingsPatch {
            show_orbits: Some(false),
            ..SettingsPatch::default()
        });
        assert!(!engine.scheduler().is_pending());
        assert!(!engine.settings().show_orbits);
    }

    #[test]
    fn test_focus_cleared_when_system_disappears() {
        let mut engine = engine();
        let task = engine.add_task(work_task("only", 0));
        engine.flush(Utc::now());

        assert_eq!(engine.focus_system(Some("system-unknown")), None);
        assert_eq!(
            engine.focus_system(Some("system-work")),
            Some("system-work".to_string())
        );

        engine.delete_task(&task.id).unwrap();
        engine.flush(Utc::now());
        assert_eq!(engine.settings().focused_system_id, None);
    }

    #[test]
    fn test_body_clicks() {
        let mut engine = engine();
        let task = engine.add_task(work_task("clicked", 1));
        engine.flush(Utc::now());

        let outcome = engine
            .body_click(BodyClick::Sun {
                system_id: "system-work".to_string(),
            })
            .unwrap();
        assert_eq!(
            outcome,
            ClickOutcome::Focused {
                system_id: "system-work".to_string()
            }
        );
        assert_eq!(
            engine.settings().focused_system_id.as_deref(),
            Some("system-work")
        );

        let outcome = engine
            .body_click(BodyClick::Planet {
                task_id: task.id.clone(),
            })
            .unwrap();
        assert_eq!(outcome, ClickOutcome::Task { task: task.clone() });

        let subtask_id = task.subtasks[0].id.clone();
        let outcome = engine
            .body_click(BodyClick::Satellite {
                task_id: task.id.clone(),
                subtask_id,
            })
            .unwrap();
        assert!(matches!(outcome, ClickOutcome::Subtask { .. }));

        assert!(engine
            .body_click(BodyClick::Sun {
                system_id: "system-nope".to_string()
            })
            .is_err());
    }

    fn engine_with_asteroids() -> Engine {
        let mut engine = engine();
        for i in 0..20 {
            engine.add_task(work_task(&format!("t{i}"), 2));
        }
        engine.flush(Utc::now());
        assert!(!engine.snapshot().asteroids.is_empty());
        engine
    }

    #[test]
    fn test_asteroid_action_removes_and_republishes() {
        let mut engine = engine_with_asteroids();
        let snapshot = engine.snapshot();
        let asteroid = snapshot.asteroids[0].clone();

        let outcome = engine
            .asteroid_action(&asteroid.id, AsteroidAction::Accept)
            .unwrap();
        assert_eq!(outcome.suggestion, asteroid.action);
        assert_eq!(outcome.target, asteroid.target);

        let after = engine.snapshot();
        assert_eq!(after.version, snapshot.version + 1);
        assert!(after.asteroid(&asteroid.id).is_none());
        assert_eq!(after.asteroids.len(), snapshot.asteroids.len() - 1);
        assert_eq!(after.systems, snapshot.systems);

        assert!(matches!(
            engine.asteroid_action(&asteroid.id, AsteroidAction::Reject),
            Err(EngineError::AsteroidNotFound(_))
        ));
    }

    #[test]
    fn test_asteroids_retained_across_rebuilds() {
        let mut engine = engine_with_asteroids();
        let before = engine.snapshot();

        engine.add_task(TaskDraft::new("new one").with_category("study"));
        engine.flush(before.built_at);

        let after = engine.snapshot();
        for asteroid in &before.asteroids {
            assert_eq!(after.asteroid(&asteroid.id), Some(asteroid));
        }
    }

    #[test]
    fn test_asteroids_of_deleted_task_are_dropped() {
        let mut engine = engine_with_asteroids();
        let before = engine.snapshot();
        let task_id = before.asteroids[0].target.task_id.clone();

        engine.delete_task(&task_id).unwrap();
        engine.flush(before.built_at);

        let after = engine.snapshot();
        assert!(after.asteroids.iter().all(|a| a.target.task_id != task_id));
    }

    #[test]
    fn test_sweep_and_collision() {
        let mut engine = engine_with_asteroids();
        let snapshot = engine.snapshot();
        let first = snapshot.asteroids[0].clone();

        let collision = engine
            .asteroid_collision(&first.id, snapshot.built_at)
            .unwrap();
        assert_eq!(collision.asteroid_id, first.id);

        assert!(engine.sweep_expired(snapshot.built_at).is_empty());
        let later = snapshot.built_at + chrono::Duration::seconds(91);
        let collisions = engine.sweep_expired(later);
        assert_eq!(collisions.len(), snapshot.asteroids.len() - 1);
        assert!(engine.snapshot().asteroids.is_empty());
        assert!(!engine.snapshot().systems.is_empty());
    }

    #[test]
    fn test_rebuild_failure_publishes_empty_snapshot() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut a = TaskDraft::new("a").into_task(Utc::now(), &mut rng);
        a.id = "dup".to_string();
        let b = a.clone();
        let engine = Engine::new(Box::new(MemoryStore::with_tasks(vec![a, b])), config(3));

        assert_eq!(engine.tasks().len(), 2);
        let snapshot = engine.snapshot();
        assert!(snapshot.systems.is_empty());
        assert!(snapshot.asteroids.is_empty());
        assert!(!engine.scheduler().is_pending());
    }

    #[test]
    fn test_urgent_deadline_is_critical() {
        let mut engine = engine();
        let now = Utc::now();
        engine.add_task(work_task("due", 0).with_deadline(now + chrono::Duration::hours(12)));
        engine.flush(now);
        let planet = &engine.snapshot().systems[0].planets[0];
        assert_eq!(planet.urgency, Urgency::Critical);
        assert_eq!(planet.urgency.color(), "red");
    }

    #[test]
    fn test_history_is_bounded() {
        let mut engine = engine();
        for i in 0..MAX_HISTORY_SIZE + 5 {
            engine.add_task(work_task(&format!("t{i}"), 0));
        }
        let history = engine.history();
        assert_eq!(history.len(), MAX_HISTORY_SIZE);
        assert_eq!(history.last().map(|e| e.action.as_str()), Some("add_task"));
    }

    #[test]
    fn test_core_without_runtime_rebuilds_immediately() {
        let core = Core::new(engine());
        core.add_task(work_task("now", 1));
        assert!(!core.is_rebuild_pending());
        assert_eq!(core.snapshot().planet_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_core_debounces_bursts() {
        let core = Core::new(engine());
        let mut updates = core.subscribe();
        let start = core.snapshot().version;

        core.add_task(work_task("a", 0));
        tokio::time::sleep(Duration::from_millis(500)).await;
        core.add_task(work_task("b", 0));
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(core.snapshot().version, start);
        assert!(core.is_rebuild_pending());

        tokio::time::sleep(Duration::from_millis(600)).await;
        let snapshot = core.snapshot();
        assert_eq!(snapshot.version, start + 1);
        assert_eq!(snapshot.planet_count(), 2);
        assert!(!core.is_rebuild_pending());
        assert_eq!(updates.recv().await.unwrap(), start + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_core_flush_skips_quiet_period() {
        let core = Core::new(engine());
        core.add_task(work_task("a", 0));
        assert!(core.flush());
        assert_eq!(core.snapshot().planet_count(), 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!core.flush());
    }
}
