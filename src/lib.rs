//! Orbitask library crate
//!
//! Tasks are drawn as a small solar model: each category becomes a system
//! with a sun, each task a planet and each subtask a satellite. Asteroids
//! carry short-lived suggestions toward bodies. The [`engine`] owns the task
//! list and republishes an immutable [`Snapshot`] after a debounced rebuild.

pub mod api;
pub mod asteroids;
pub mod categories;
pub mod cli;
pub mod engine;
pub mod grouping;
pub mod hierarchy;
pub mod keywords;
pub mod layout;
pub mod models;
pub mod scheduler;
pub mod store;
pub mod urgency;

pub use engine::{Core, Engine, EngineConfig, EngineError, Snapshot};
pub use models::{Priority, Settings, SettingsPatch, Subtask, SubtaskDraft, Task, TaskDraft};
