//! HTTP client implementation
//!
//! This module provides HTTP client functionality to interact with the orbitask API server.

use std::sync::Arc;

use reqwest::{Client as ReqwestClient, Error as ReqwestError, Method};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::Client;
use crate::asteroids::{AsteroidAction, Collision};
use crate::engine::{AsteroidOutcome, BodyClick, ClickOutcome, Snapshot, TransitionLogEntry};
use crate::models::{Settings, SettingsPatch, Subtask, Task};

/// API client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
        }
    }
}

/// Generic API response structure
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

/// Client errors
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] ReqwestError),

    #[error("API error: {0}")]
    Api(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Missing data in response")]
    MissingData,
}

/// HTTP client for the orbitask service
#[derive(Debug, Clone)]
pub struct HttpClientImpl {
    http_client: Arc<ReqwestClient>,
    config: ClientConfig,
}

impl Default for HttpClientImpl {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClientImpl {
    /// Create a new client with default configuration
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    /// Create a new client with custom configuration
    pub fn with_config(config: ClientConfig) -> Self {
        Self {
            http_client: Arc::new(ReqwestClient::new()),
            config,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn request<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, ClientError> {
        let mut request = self.http_client.request(method, self.url(path));
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;
        let status = response.status();
        let api_response: ApiResponse<T> = response.json().await?;

        if api_response.success {
            return api_response.data.ok_or(ClientError::MissingData);
        }
        let message = api_response
            .error
            .unwrap_or_else(|| "Unknown API error".to_string());
        if status == reqwest::StatusCode::NOT_FOUND {
            Err(ClientError::NotFound(message))
        } else {
            Err(ClientError::Api(message))
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.request::<T, Value>(Method::GET, path, None).await
    }

    async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        self.request(Method::POST, path, Some(body)).await
    }
}

#[async_trait::async_trait]
impl Client for HttpClientImpl {
    async fn snapshot(&self) -> Result<Snapshot, ClientError> {
        self.get("/api/snapshot").await
    }

    async fn history(&self) -> Result<Vec<TransitionLogEntry>, ClientError> {
        self.get("/api/history").await
    }

    async fn rebuild(&self) -> Result<bool, ClientError> {
        self.post("/api/rebuild", &json!({})).await
    }

    async fn list_tasks(&self) -> Result<Vec<Task>, ClientError> {
        self.get("/api/tasks").await
    }

    async fn get_task(&self, task_id: &str) -> Result<Task, ClientError> {
        self.get(&format!("/api/tasks/{}", task_id)).await
    }

    async fn add_task(&self, draft: Value) -> Result<Task, ClientError> {
        self.post("/api/tasks", &draft).await
    }

    async fn update_task(&self, task_id: &str, patch: Value) -> Result<Task, ClientError> {
        self.request(
            Method::PATCH,
            &format!("/api/tasks/{}", task_id),
            Some(&patch),
        )
        .await
    }

    async fn delete_task(&self, task_id: &str) -> Result<Task, ClientError> {
        self.request::<_, Value>(Method::DELETE, &format!("/api/tasks/{}", task_id), None)
            .await
    }

    async fn toggle_task(&self, task_id: &str) -> Result<Task, ClientError> {
        self.post(&format!("/api/tasks/{}/toggle", task_id), &json!({}))
            .await
    }

    async fn add_subtask(&self, task_id: &str, draft: Value) -> Result<Subtask, ClientError> {
        self.post(&format!("/api/tasks/{}/subtasks", task_id), &draft)
            .await
    }

    async fn update_subtask(
        &self,
        task_id: &str,
        subtask_id: &str,
        patch: Value,
    ) -> Result<Subtask, ClientError> {
        self.request(
            Method::PATCH,
            &format!("/api/tasks/{}/subtasks/{}", task_id, subtask_id),
            Some(&patch),
        )
        .await
    }

    async fn delete_subtask(
        &self,
        task_id: &str,
        subtask_id: &str,
    ) -> Result<Subtask, ClientError> {
        self.request::<_, Value>(
            Method::DELETE,
            &format!("/api/tasks/{}/subtasks/{}", task_id, subtask_id),
            None,
        )
        .await
    }

    async fn toggle_subtask(
        &self,
        task_id: &str,
        subtask_id: &str,
    ) -> Result<Subtask, ClientError> {
        self.post(
            &format!("/api/tasks/{}/subtasks/{}/toggle", task_id, subtask_id),
            &json!({}),
        )
        .await
    }

    async fn settings(&self) -> Result<Settings, ClientError> {
        self.get("/api/settings").await
    }

    async fn update_settings(&self, patch: SettingsPatch) -> Result<Settings, ClientError> {
        self.request(Method::PATCH, "/api/settings", Some(&patch))
            .await
    }

    async fn focus_system(&self, system_id: Option<String>) -> Result<Option<String>, ClientError> {
        let response: ApiResponse<Option<String>> = self
            .http_client
            .post(self.url("/api/focus"))
            .json(&json!({ "system_id": system_id }))
            .send()
            .await?
            .json()
            .await?;
        // A cleared focus comes back as `data: null`
        if response.success {
            Ok(response.data.flatten())
        } else {
            Err(ClientError::Api(
                response
                    .error
                    .unwrap_or_else(|| "Unknown API error".to_string()),
            ))
        }
    }

    async fn body_click(&self, click: BodyClick) -> Result<ClickOutcome, ClientError> {
        self.post("/api/click", &click).await
    }

    async fn asteroid_action(
        &self,
        asteroid_id: &str,
        action: AsteroidAction,
    ) -> Result<AsteroidOutcome, ClientError> {
        let verb = match action {
            AsteroidAction::Accept => "accept",
            AsteroidAction::Reject => "reject",
        };
        self.post(&format!("/api/asteroids/{}/{}", asteroid_id, verb), &json!({}))
            .await
    }

    async fn asteroid_collision(&self, asteroid_id: &str) -> Result<Collision, ClientError> {
        self.post(&format!("/api/asteroids/{}/collision", asteroid_id), &json!({}))
            .await
    }
}
