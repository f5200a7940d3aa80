//! Core models for the orbitask library
//!
//! This module contains the task records the engine is fed with, the settings
//! value it is configured by, and the draft/patch types CRUD calls carry.
//! Drafts and patches can be decoded leniently from JSON: a malformed field is
//! replaced by a safe default instead of rejecting the whole record.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::categories::DEFAULT_CATEGORY;
use crate::urgency::clamp_animation_speed;

/// Text used when a task or subtask arrives without any
pub const PLACEHOLDER_TEXT: &str = "(untitled)";

/// Task priority
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    /// Numeric value used for group aggregation: low=1, medium=2, high=3
    pub fn value(&self) -> u8 {
        match self {
            Priority::Low => 1,
            Priority::Medium => 2,
            Priority::High => 3,
        }
    }

    /// Parses a priority from a name or a numeric value
    pub fn parse(raw: &Value) -> Option<Self> {
        match raw {
            Value::String(s) => match s.trim().to_lowercase().as_str() {
                "low" | "1" => Some(Priority::Low),
                "medium" | "2" => Some(Priority::Medium),
                "high" | "3" => Some(Priority::High),
                _ => None,
            },
            Value::Number(n) => match n.as_u64() {
                Some(1) => Some(Priority::Low),
                Some(2) => Some(Priority::Medium),
                Some(3) => Some(Priority::High),
                _ => None,
            },
            _ => None,
        }
    }
}

/// A step of a task. Owned by its parent task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subtask {
    pub id: String,
    pub text: String,
    pub completed: bool,
    pub start_date: Option<DateTime<Utc>>,
    pub deadline: Option<DateTime<Utc>>,
    pub keywords: Vec<String>,
}

/// A todo item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub text: String,
    pub category: String,
    pub priority: Priority,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub start_date: Option<DateTime<Utc>>,
    pub deadline: Option<DateTime<Utc>>,
    pub keywords: Vec<String>,
    pub subtasks: Vec<Subtask>,
}

impl Task {
    /// Finds a subtask by id
    pub fn subtask(&self, subtask_id: &str) -> Option<&Subtask> {
        self.subtasks.iter().find(|s| s.id == subtask_id)
    }

    /// Finds a subtask by id, mutably
    pub fn subtask_mut(&mut self, subtask_id: &str) -> Option<&mut Subtask> {
        self.subtasks.iter_mut().find(|s| s.id == subtask_id)
    }

    /// Returns true if this task and all its subtasks are completed
    pub fn is_fully_completed(&self) -> bool {
        self.completed && self.subtasks.iter().all(|s| s.completed)
    }

    /// Decodes a stored or submitted task record, coercing bad fields.
    ///
    /// Missing ids are generated with `rng`; see [`TaskDraft::from_value`].
    pub fn coerce<R: Rng + ?Sized>(value: &Value, now: DateTime<Utc>, rng: &mut R) -> Self {
        let draft = TaskDraft::from_value(value);
        let created_at = value
            .get("created_at")
            .or_else(|| value.get("createdAt"))
            .and_then(parse_date)
            .unwrap_or(now);
        let mut task = draft.into_task(now, rng);
        task.created_at = created_at;
        task
    }
}

/// Engine settings. Passed explicitly into the assembler and spawner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub grouping_enabled: bool,
    pub animation_speed: f64,
    pub show_orbits: bool,
    pub focused_system_id: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            grouping_enabled: true,
            animation_speed: 1.0,
            show_orbits: true,
            focused_system_id: None,
        }
    }
}

impl Settings {
    /// Returns a copy with the animation speed clamped into range
    pub fn normalized(mut self) -> Self {
        self.animation_speed = clamp_animation_speed(self.animation_speed);
        self
    }
}

/// Partial settings update. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grouping_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub animation_speed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_orbits: Option<bool>,
}

impl SettingsPatch {
    /// Returns true if applying this patch can change the hierarchy
    pub fn affects_hierarchy(&self) -> bool {
        self.grouping_enabled.is_some() || self.animation_speed.is_some()
    }
}

/// Input for creating a subtask
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubtaskDraft {
    pub id: Option<String>,
    pub text: Option<String>,
    pub completed: bool,
    pub start_date: Option<DateTime<Utc>>,
    pub deadline: Option<DateTime<Utc>>,
    pub keywords: Vec<String>,
}

impl SubtaskDraft {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = keywords;
        self
    }

    /// Decodes a draft field by field; ill-typed fields fall back to defaults
    pub fn from_value(value: &Value) -> Self {
        Self {
            id: id_field(value),
            text: text_field(value),
            completed: value
                .get("completed")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            start_date: date_field(value, &["start_date", "startDate"]).flatten(),
            deadline: date_field(value, &["deadline"]).flatten(),
            keywords: keywords_field(value).unwrap_or_default(),
        }
    }

    pub fn into_subtask<R: Rng + ?Sized>(self, now: DateTime<Utc>, rng: &mut R) -> Subtask {
        Subtask {
            id: self.id.unwrap_or_else(|| generate_id("sub", now, rng)),
            text: non_blank_text(self.text),
            completed: self.completed,
            start_date: self.start_date,
            deadline: self.deadline,
            keywords: self.keywords,
        }
    }
}

/// Input for creating a task
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskDraft {
    pub id: Option<String>,
    pub text: Option<String>,
    pub category: Option<String>,
    pub priority: Option<Priority>,
    pub completed: bool,
    pub start_date: Option<DateTime<Utc>>,
    pub deadline: Option<DateTime<Utc>>,
    pub keywords: Vec<String>,
    pub subtasks: Vec<SubtaskDraft>,
}

impl TaskDraft {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = keywords;
        self
    }

    pub fn with_subtask(mut self, subtask: SubtaskDraft) -> Self {
        self.subtasks.push(subtask);
        self
    }

    /// Decodes a draft field by field; ill-typed fields fall back to defaults.
    ///
    /// Non-object input yields an empty draft.
    pub fn from_value(value: &Value) -> Self {
        let subtasks = value
            .get("subtasks")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter(|item| item.is_object())
                    .map(SubtaskDraft::from_value)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            id: id_field(value),
            text: text_field(value),
            category: value
                .get("category")
                .and_then(Value::as_str)
                .map(str::to_string),
            priority: value.get("priority").and_then(Priority::parse),
            completed: value
                .get("completed")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            start_date: date_field(value, &["start_date", "startDate"]).flatten(),
            deadline: date_field(value, &["deadline"]).flatten(),
            keywords: keywords_field(value).unwrap_or_default(),
            subtasks,
        }
    }

    pub fn into_task<R: Rng + ?Sized>(self, now: DateTime<Utc>, rng: &mut R) -> Task {
        let id = self.id.unwrap_or_else(|| generate_id("task", now, rng));
        let subtasks = self
            .subtasks
            .into_iter()
            .map(|draft| draft.into_subtask(now, rng))
            .collect();
        Task {
            id,
            text: non_blank_text(self.text),
            category: self
                .category
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            priority: self.priority.unwrap_or_default(),
            completed: self.completed,
            created_at: now,
            start_date: self.start_date,
            deadline: self.deadline,
            keywords: self.keywords,
            subtasks,
        }
    }
}

/// Partial task update.
///
/// For the date fields, `Some(None)` clears the date and `None` leaves it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<Option<DateTime<Utc>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<Option<DateTime<Utc>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
}

impl TaskPatch {
    /// Decodes a patch; ill-typed fields are ignored rather than applied
    pub fn from_value(value: &Value) -> Self {
        Self {
            text: text_field(value),
            category: value
                .get("category")
                .and_then(Value::as_str)
                .map(str::to_string),
            priority: value.get("priority").and_then(Priority::parse),
            completed: value.get("completed").and_then(Value::as_bool),
            start_date: date_field(value, &["start_date", "startDate"]),
            deadline: date_field(value, &["deadline"]),
            keywords: keywords_field(value),
        }
    }

    pub fn apply(self, task: &mut Task) {
        if let Some(text) = self.text {
            task.text = non_blank_text(Some(text));
        }
        if let Some(category) = self.category {
            let category = category.trim();
            task.category = if category.is_empty() {
                DEFAULT_CATEGORY.to_string()
            } else {
                category.to_string()
            };
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(completed) = self.completed {
            task.completed = completed;
        }
        if let Some(start_date) = self.start_date {
            task.start_date = start_date;
        }
        if let Some(deadline) = self.deadline {
            task.deadline = deadline;
        }
        if let Some(keywords) = self.keywords {
            task.keywords = keywords;
        }
    }
}

/// Partial subtask update
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubtaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<Option<DateTime<Utc>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<Option<DateTime<Utc>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
}

impl SubtaskPatch {
    /// Decodes a patch; ill-typed fields are ignored rather than applied
    pub fn from_value(value: &Value) -> Self {
        Self {
            text: text_field(value),
            completed: value.get("completed").and_then(Value::as_bool),
            start_date: date_field(value, &["start_date", "startDate"]),
            deadline: date_field(value, &["deadline"]),
            keywords: keywords_field(value),
        }
    }

    pub fn apply(self, subtask: &mut Subtask) {
        if let Some(text) = self.text {
            subtask.text = non_blank_text(Some(text));
        }
        if let Some(completed) = self.completed {
            subtask.completed = completed;
        }
        if let Some(start_date) = self.start_date {
            subtask.start_date = start_date;
        }
        if let Some(deadline) = self.deadline {
            subtask.deadline = deadline;
        }
        if let Some(keywords) = self.keywords {
            subtask.keywords = keywords;
        }
    }
}

/// Generates an id such as `task-1767225600000-3fa2b71c`
pub fn generate_id<R: Rng + ?Sized>(prefix: &str, now: DateTime<Utc>, rng: &mut R) -> String {
    format!(
        "{}-{}-{:08x}",
        prefix,
        now.timestamp_millis(),
        rng.gen::<u32>()
    )
}

/// Parses a date from an RFC 3339 string, a `YYYY-MM-DD` string (midnight
/// UTC) or a millisecond timestamp
pub fn parse_date(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            DateTime::parse_from_rfc3339(s)
                .map(|d| d.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    NaiveDate::parse_from_str(s, "%Y-%m-%d")
                        .ok()
                        .and_then(|d| d.and_hms_opt(0, 0, 0))
                        .map(|d| Utc.from_utc_datetime(&d))
                })
        }
        Value::Number(n) => n
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        _ => None,
    }
}

fn non_blank_text(text: Option<String>) -> String {
    text.map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| PLACEHOLDER_TEXT.to_string())
}

fn id_field(value: &Value) -> Option<String> {
    match value.get("id") {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

fn text_field(value: &Value) -> Option<String> {
    value
        .get("text")
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Outer `None`: field absent or ill-typed. `Some(None)`: explicitly cleared.
fn date_field(value: &Value, names: &[&str]) -> Option<Option<DateTime<Utc>>> {
    let raw = names.iter().find_map(|name| value.get(*name))?;
    match raw {
        Value::Null => Some(None),
        Value::String(s) if s.trim().is_empty() => Some(None),
        other => parse_date(other).map(Some),
    }
}

/// Accepts an array of strings (non-strings skipped) or a comma-separated string
fn keywords_field(value: &Value) -> Option<Vec<String>> {
    match value.get("keywords")? {
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
        ),
        Value::String(s) => Some(
            s.split(',')
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect(),
        ),
        Value::Null => Some(Vec::new()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_priority_values() {
        assert_eq!(Priority::Low.value(), 1);
        assert_eq!(Priority::Medium.value(), 2);
        assert_eq!(Priority::High.value(), 3);
        assert_eq!(Priority::parse(&json!("HIGH")), Some(Priority::High));
        assert_eq!(Priority::parse(&json!(1)), Some(Priority::Low));
        assert_eq!(Priority::parse(&json!(true)), None);
    }

    #[test]
    fn test_draft_builds_task_with_defaults() {
        let mut rng = StdRng::seed_from_u64(1);
        let task = TaskDraft::new("Write report").into_task(now(), &mut rng);

        assert!(task.id.starts_with("task-"));
        assert_eq!(task.text, "Write report");
        assert_eq!(task.category, "general");
        assert_eq!(task.priority, Priority::Medium);
        assert!(task.keywords.is_empty());
        assert!(task.subtasks.is_empty());
        assert_eq!(task.created_at, now());
    }

    #[test]
    fn test_malformed_draft_is_coerced() {
        let mut rng = StdRng::seed_from_u64(1);
        let value = json!({
            "id": null,
            "text": 42,
            "category": ["work"],
            "priority": "urgent",
            "deadline": "not a date",
            "keywords": "ship, review ,",
            "subtasks": [{"text": "step"}, "garbage", {"keywords": 5}]
        });
        let task = TaskDraft::from_value(&value).into_task(now(), &mut rng);

        assert!(task.id.starts_with("task-"));
        assert_eq!(task.text, PLACEHOLDER_TEXT);
        assert_eq!(task.category, "general");
        assert_eq!(task.priority, Priority::Medium);
        assert_eq!(task.deadline, None);
        assert_eq!(task.keywords, vec!["ship".to_string(), "review".to_string()]);
        assert_eq!(task.subtasks.len(), 2);
        assert_eq!(task.subtasks[0].text, "step");
        assert_eq!(task.subtasks[1].text, PLACEHOLDER_TEXT);
        assert!(task.subtasks[1].keywords.is_empty());
        assert_ne!(task.subtasks[0].id, task.subtasks[1].id);
    }

    #[test]
    fn test_non_object_draft_is_empty() {
        assert_eq!(TaskDraft::from_value(&json!("nope")), TaskDraft::default());
    }

    #[test]
    fn test_date_formats() {
        assert_eq!(
            parse_date(&json!("2026-05-10")),
            Some(Utc.with_ymd_and_hms(2026, 5, 10, 0, 0, 0).unwrap())
        );
        assert_eq!(
            parse_date(&json!("2026-05-10T08:30:00+09:00")),
            Some(Utc.with_ymd_and_hms(2026, 5, 9, 23, 30, 0).unwrap())
        );
        assert_eq!(
            parse_date(&json!(now().timestamp_millis())),
            Some(now())
        );
        assert_eq!(parse_date(&json!({"date": 1})), None);
    }

    #[test]
    fn test_patch_applies_only_valid_fields() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut task = TaskDraft::new("Old")
            .with_category("work")
            .with_deadline(now())
            .into_task(now(), &mut rng);

        let patch = TaskPatch::from_value(&json!({
            "text": "New",
            "priority": 99,
            "completed": "yes",
            "deadline": null,
            "category": "  "
        }));
        patch.apply(&mut task);

        assert_eq!(task.text, "New");
        assert_eq!(task.priority, Priority::Medium);
        assert!(!task.completed);
        assert_eq!(task.deadline, None);
        assert_eq!(task.category, "general");
    }

    #[test]
    fn test_coerce_keeps_stored_created_at() {
        let mut rng = StdRng::seed_from_u64(3);
        let stored = json!({
            "id": "t1",
            "text": "Stored",
            "created_at": "2026-01-01T00:00:00Z"
        });
        let task = Task::coerce(&stored, now(), &mut rng);
        assert_eq!(task.id, "t1");
        assert_eq!(
            task.created_at,
            Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_settings_normalized() {
        let settings = Settings {
            animation_speed: 9.0,
            ..Settings::default()
        }
        .normalized();
        assert_eq!(settings.animation_speed, 5.0);
        assert!(settings.grouping_enabled);
    }
}
