//! Client trait definition
//!
//! This module defines the `Client` trait that abstracts over different client implementations.

use serde_json::Value;

use super::ClientError;
use crate::asteroids::{AsteroidAction, Collision};
use crate::engine::{AsteroidOutcome, BodyClick, ClickOutcome, Snapshot, TransitionLogEntry};
use crate::models::{Settings, SettingsPatch, Subtask, Task};

/// Trait defining the API client interface for the orbitask service.
///
/// Drafts and patches are passed as raw JSON and coerced on the engine side.
#[async_trait::async_trait]
pub trait Client {
    /// Get the published snapshot
    async fn snapshot(&self) -> Result<Snapshot, ClientError>;

    /// Get the recent transition log
    async fn history(&self) -> Result<Vec<TransitionLogEntry>, ClientError>;

    /// Run a pending rebuild now. Returns false if none was pending.
    async fn rebuild(&self) -> Result<bool, ClientError>;

    async fn list_tasks(&self) -> Result<Vec<Task>, ClientError>;

    async fn get_task(&self, task_id: &str) -> Result<Task, ClientError>;

    async fn add_task(&self, draft: Value) -> Result<Task, ClientError>;

    async fn update_task(&self, task_id: &str, patch: Value) -> Result<Task, ClientError>;

    async fn delete_task(&self, task_id: &str) -> Result<Task, ClientError>;

    async fn toggle_task(&self, task_id: &str) -> Result<Task, ClientError>;

    async fn add_subtask(&self, task_id: &str, draft: Value) -> Result<Subtask, ClientError>;

    async fn update_subtask(
        &self,
        task_id: &str,
        subtask_id: &str,
        patch: Value,
    ) -> Result<Subtask, ClientError>;

    async fn delete_subtask(&self, task_id: &str, subtask_id: &str)
        -> Result<Subtask, ClientError>;

    async fn toggle_subtask(&self, task_id: &str, subtask_id: &str)
        -> Result<Subtask, ClientError>;

    async fn settings(&self) -> Result<Settings, ClientError>;

    async fn update_settings(&self, patch: SettingsPatch) -> Result<Settings, ClientError>;

    /// Focus a system, or clear the focus with `None`
    async fn focus_system(&self, system_id: Option<String>) -> Result<Option<String>, ClientError>;

    async fn body_click(&self, click: BodyClick) -> Result<ClickOutcome, ClientError>;

    async fn asteroid_action(
        &self,
        asteroid_id: &str,
        action: AsteroidAction,
    ) -> Result<AsteroidOutcome, ClientError>;

    async fn asteroid_collision(&self, asteroid_id: &str) -> Result<Collision, ClientError>;
}
