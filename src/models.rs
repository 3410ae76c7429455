//! Wire models for the workflow service API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Envelope
// ============================================================================

/// Every endpoint wraps its payload as `{"response": ...}`
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    pub response: T,
}

// ============================================================================
// Workflow Tasks
// ============================================================================

/// Task - one record of the workflow task list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TaskRecord")]
pub struct Task {
    pub workflow_task_id: Option<i64>,
    pub task_id: i64,
    #[serde(rename = "taskStatus_id")]
    pub status: TaskStatus,
    pub priority: i64,
    pub creation_date: Option<DateTime<Utc>>,
    pub last_update_date: Option<DateTime<Utc>>,
}

/// Task as it appears on the wire. The status may arrive as
/// `taskStatus_id`, `status` or both; `taskStatus_id` wins.
#[derive(Deserialize)]
struct TaskRecord {
    #[serde(default)]
    workflow_task_id: Option<i64>,
    task_id: i64,
    #[serde(rename = "taskStatus_id", default)]
    task_status_id: Option<TaskStatus>,
    #[serde(default)]
    status: Option<TaskStatus>,
    #[serde(default)]
    priority: i64,
    #[serde(default, deserialize_with = "timestamp::deserialize")]
    creation_date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "timestamp::deserialize")]
    last_update_date: Option<DateTime<Utc>>,
}

impl TryFrom<TaskRecord> for Task {
    type Error = String;

    fn try_from(record: TaskRecord) -> Result<Self, Self::Error> {
        let status = record
            .task_status_id
            .or(record.status)
            .ok_or_else(|| format!("task {} has no `taskStatus_id`", record.task_id))?;
        Ok(Task {
            workflow_task_id: record.workflow_task_id,
            task_id: record.task_id,
            status,
            priority: record.priority,
            creation_date: record.creation_date,
            last_update_date: record.last_update_date,
        })
    }
}

/// Task status as reported by the service
///
/// Unknown values are kept verbatim rather than rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskStatus {
    Waiting,
    Running,
    Completed,
    Failed,
    Other(String),
}

impl TaskStatus {
    pub fn as_str(&self) -> &str {
        match self {
            TaskStatus::Waiting => "Waiting",
            TaskStatus::Running => "Running",
            TaskStatus::Completed => "Completed",
            TaskStatus::Failed => "Failed",
            TaskStatus::Other(s) => s,
        }
    }
}

impl From<String> for TaskStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "Waiting" => TaskStatus::Waiting,
            "Running" => TaskStatus::Running,
            "Completed" => TaskStatus::Completed,
            "Failed" => TaskStatus::Failed,
            _ => TaskStatus::Other(s),
        }
    }
}

impl From<&str> for TaskStatus {
    fn from(s: &str) -> Self {
        TaskStatus::from(s.to_string())
    }
}

impl From<TaskStatus> for String {
    fn from(status: TaskStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Task Definitions
// ============================================================================

/// TaskDefinition - entry of the task definition catalogue
///
/// Only `name` is required; everything else the service sends is kept in
/// `attributes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(flatten)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

/// Lenient timestamp parsing for task dates.
///
/// Accepts RFC 3339 as well as naive `YYYY-MM-DD HH:MM:SS[.fff]` (space or
/// `T` separated), the latter interpreted as UTC. `null` maps to `None`.
mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer};

    const NAIVE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        NAIVE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .map(|naive| naive.and_utc())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        match raw {
            None => Ok(None),
            Some(s) if s.trim().is_empty() => Ok(None),
            Some(s) => parse(s.trim())
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", s))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn decodes_task_with_wire_status_key() {
        let json = r#"{"task_id": 1, "taskStatus_id": "Waiting", "priority": 4000}"#;
        let task: Task = serde_json::from_str(json).unwrap();

        assert_eq!(task.task_id, 1);
        assert_eq!(task.status, TaskStatus::Waiting);
        assert_eq!(task.priority, 4000);
        assert_eq!(task.workflow_task_id, None);
        assert_eq!(task.creation_date, None);
    }

    #[test]
    fn accepts_status_alias_and_unknown_values() {
        let json = r#"{"task_id": 7, "status": "Paused"}"#;
        let task: Task = serde_json::from_str(json).unwrap();

        assert_eq!(task.status, TaskStatus::Other("Paused".to_string()));
        assert_eq!(task.status.to_string(), "Paused");
    }

    #[test]
    fn both_status_keys_prefer_wire_key() {
        let json = r#"{"response": [
            {"task_id": 1, "taskStatus_id": "Waiting", "status": "Running", "priority": 4000}
        ]}"#;
        let envelope: ApiResponse<Vec<Task>> = serde_json::from_str(json).unwrap();

        assert_eq!(envelope.response.len(), 1);
        assert_eq!(envelope.response[0].status, TaskStatus::Waiting);
        assert_eq!(envelope.response[0].priority, 4000);
    }

    #[test]
    fn missing_status_is_rejected() {
        let json = r#"{"task_id": 4, "priority": 1}"#;
        let err = serde_json::from_str::<Task>(json).unwrap_err();
        assert!(err.to_string().contains("taskStatus_id"));
    }

    #[test]
    fn serializes_status_under_wire_key() {
        let json = r#"{"task_id": 5, "status": "Completed"}"#;
        let task: Task = serde_json::from_str(json).unwrap();

        let value = serde_json::to_value(&task).unwrap();
        assert_eq!(value["taskStatus_id"], "Completed");
        let again: Task = serde_json::from_value(value).unwrap();
        assert_eq!(again, task);
    }

    #[test]
    fn parses_naive_and_rfc3339_dates() {
        let json = r#"{
            "workflow_task_id": 12,
            "task_id": 3,
            "taskStatus_id": "Running",
            "priority": 10,
            "creation_date": "2024-05-01 08:30:00",
            "last_update_date": "2024-05-01T09:00:00+02:00"
        }"#;
        let task: Task = serde_json::from_str(json).unwrap();

        assert_eq!(
            task.creation_date,
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap())
        );
        assert_eq!(
            task.last_update_date,
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 7, 0, 0).unwrap())
        );
    }

    #[test]
    fn rejects_garbage_dates() {
        let json = r#"{"task_id": 3, "taskStatus_id": "Waiting", "creation_date": "yesterday"}"#;
        assert!(serde_json::from_str::<Task>(json).is_err());
    }

    #[test]
    fn null_dates_are_none() {
        let json = r#"{"task_id": 3, "taskStatus_id": "Waiting", "last_update_date": null}"#;
        let task: Task = serde_json::from_str(json).unwrap();
        assert_eq!(task.last_update_date, None);
    }

    #[test]
    fn definition_keeps_extra_fields() {
        let json = r#"{"name": "compute_pv", "description": "PV", "timeout": 30}"#;
        let def: TaskDefinition = serde_json::from_str(json).unwrap();

        assert_eq!(def.name, "compute_pv");
        assert_eq!(def.description.as_deref(), Some("PV"));
        assert_eq!(def.attributes.get("timeout"), Some(&serde_json::json!(30)));
    }

    #[test]
    fn envelope_requires_response_key() {
        let err = serde_json::from_str::<ApiResponse<Vec<Task>>>(r#"{"data": []}"#);
        assert!(err.is_err());
    }
}
