//! Core client implementation
//!
//! This module provides a client implementation that wraps Core directly,
//! providing the same interface as HttpClientImpl but without HTTP overhead.

use serde_json::Value;

use super::{Client, ClientError};
use crate::asteroids::{AsteroidAction, Collision};
use crate::engine::{
    AsteroidOutcome, BodyClick, ClickOutcome, Core, EngineError, Snapshot, TransitionLogEntry,
};
use crate::models::{
    Settings, SettingsPatch, Subtask, SubtaskDraft, SubtaskPatch, Task, TaskDraft, TaskPatch,
};

/// A client implementation that wraps Core directly
#[derive(Clone)]
pub struct CoreClient {
    core: Core,
}

impl CoreClient {
    /// Create a new CoreClient with the given Core instance
    pub fn new(core: Core) -> Self {
        Self { core }
    }
}

/// Convert EngineError to ClientError for interface compatibility
impl From<EngineError> for ClientError {
    fn from(error: EngineError) -> Self {
        ClientError::NotFound(error.to_string())
    }
}

#[async_trait::async_trait]
impl Client for CoreClient {
    async fn snapshot(&self) -> Result<Snapshot, ClientError> {
        Ok(self.core.snapshot().as_ref().clone())
    }

    async fn history(&self) -> Result<Vec<TransitionLogEntry>, ClientError> {
        Ok(self.core.history())
    }

    async fn rebuild(&self) -> Result<bool, ClientError> {
        Ok(self.core.flush())
    }

    async fn list_tasks(&self) -> Result<Vec<Task>, ClientError> {
        Ok(self.core.tasks())
    }

    async fn get_task(&self, task_id: &str) -> Result<Task, ClientError> {
        Ok(self.core.task(task_id)?)
    }

    async fn add_task(&self, draft: Value) -> Result<Task, ClientError> {
        Ok(self.core.add_task(TaskDraft::from_value(&draft)))
    }

    async fn update_task(&self, task_id: &str, patch: Value) -> Result<Task, ClientError> {
        Ok(self
            .core
            .update_task(task_id, TaskPatch::from_value(&patch))?)
    }

    async fn delete_task(&self, task_id: &str) -> Result<Task, ClientError> {
        Ok(self.core.delete_task(task_id)?)
    }

    async fn toggle_task(&self, task_id: &str) -> Result<Task, ClientError> {
        Ok(self.core.toggle_task(task_id)?)
    }

    async fn add_subtask(&self, task_id: &str, draft: Value) -> Result<Subtask, ClientError> {
        Ok(self
            .core
            .add_subtask(task_id, SubtaskDraft::from_value(&draft))?)
    }

    async fn update_subtask(
        &self,
        task_id: &str,
        subtask_id: &str,
        patch: Value,
    ) -> Result<Subtask, ClientError> {
        Ok(self
            .core
            .update_subtask(task_id, subtask_id, SubtaskPatch::from_value(&patch))?)
    }

    async fn delete_subtask(
        &self,
        task_id: &str,
        subtask_id: &str,
    ) -> Result<Subtask, ClientError> {
        Ok(self.core.delete_subtask(task_id, subtask_id)?)
    }

    async fn toggle_subtask(
        &self,
        task_id: &str,
        subtask_id: &str,
    ) -> Result<Subtask, ClientError> {
        Ok(self.core.toggle_subtask(task_id, subtask_id)?)
    }

    async fn settings(&self) -> Result<Settings, ClientError> {
        Ok(self.core.settings())
    }

    async fn update_settings(&self, patch: SettingsPatch) -> Result<Settings, ClientError> {
        Ok(self.core.update_settings(patch))
    }

    async fn focus_system(&self, system_id: Option<String>) -> Result<Option<String>, ClientError> {
        Ok(self.core.focus_system(system_id.as_deref()))
    }

    async fn body_click(&self, click: BodyClick) -> Result<ClickOutcome, ClientError> {
        Ok(self.core.body_click(click)?)
    }

    async fn asteroid_action(
        &self,
        asteroid_id: &str,
        action: AsteroidAction,
    ) -> Result<AsteroidOutcome, ClientError> {
        Ok(self.core.asteroid_action(asteroid_id, action)?)
    }

    async fn asteroid_collision(&self, asteroid_id: &str) -> Result<Collision, ClientError> {
        Ok(self.core.asteroid_collision(asteroid_id)?)
    }
}
