use std::{
    fmt,
    str::FromStr,
    sync::atomic::{AtomicU64, Ordering},
};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Decoding keys off this prefix alone: a backend id that happens to start
/// with `local:` is read back as provisional. Backend ids are uuids, so this
/// does not occur with the current server.
const PROVISIONAL_PREFIX: &str = "local:";

static PROVISIONAL_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Client-generated placeholder identifier. Unique within the process: it
/// combines a wall-clock timestamp, a process-wide sequence number and a
/// random uuid.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProvisionalId(String);

impl ProvisionalId {
    pub fn generate() -> Self {
        let seq = PROVISIONAL_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        Self(format!(
            "{PROVISIONAL_PREFIX}{}-{seq}-{}",
            Utc::now().timestamp_millis(),
            Uuid::new_v4().simple()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Identity of a task record. A task starts out either provisional (created
/// by the submission path) or authoritative (discovered through polling) and
/// changes from the former to the latter exactly once.
///
/// On the wire both forms are plain strings; strings carrying the `local:`
/// prefix decode back into the provisional form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskId {
    Provisional(ProvisionalId),
    Authoritative(String),
}

impl TaskId {
    pub fn provisional() -> Self {
        Self::Provisional(ProvisionalId::generate())
    }

    pub fn authoritative(id: impl Into<String>) -> Self {
        Self::Authoritative(id.into())
    }

    pub fn is_provisional(&self) -> bool {
        matches!(self, Self::Provisional(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Provisional(id) => id.as_str(),
            Self::Authoritative(id) => id,
        }
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        if value.starts_with(PROVISIONAL_PREFIX) {
            Self::Provisional(ProvisionalId(value))
        } else {
            Self::Authoritative(value)
        }
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<TaskId> for String {
    fn from(value: TaskId) -> Self {
        match value {
            TaskId::Provisional(id) => id.0,
            TaskId::Authoritative(id) => id,
        }
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Downloading,
    Completed,
    Error,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    /// `completed` and `error` are absorbing. Re-entering the current state is
    /// always allowed so replayed events stay idempotent.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        match (self, next) {
            (current, next) if current == next => true,
            (Self::Pending, Self::Downloading | Self::Completed | Self::Error) => true,
            (Self::Downloading, Self::Completed | Self::Error) => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Downloading => "downloading",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audio quality requested from the backend encoder. The wire form is the
/// encoder's numeric preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Quality {
    #[default]
    #[serde(rename = "0")]
    Best,
    #[serde(rename = "1")]
    High,
    #[serde(rename = "2")]
    Medium,
    #[serde(rename = "3")]
    Low,
}

#[derive(Debug, Clone, Error)]
#[error("unknown quality '{0}': expected best, high, medium, low or 0-3")]
pub struct ParseQualityError(pub String);

impl FromStr for Quality {
    type Err = ParseQualityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "0" | "best" => Ok(Self::Best),
            "1" | "high" => Ok(Self::High),
            "2" | "medium" => Ok(Self::Medium),
            "3" | "low" => Ok(Self::Low),
            other => Err(ParseQualityError(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provisional_ids_are_unique_and_tagged() {
        let a = TaskId::provisional();
        let b = TaskId::provisional();
        assert_ne!(a, b);
        assert!(a.is_provisional());
        assert!(a.as_str().starts_with(PROVISIONAL_PREFIX));
    }

    #[test]
    fn backend_ids_decode_as_authoritative() {
        let id: TaskId = serde_json::from_str("\"3f2c\"").expect("decode");
        assert_eq!(id, TaskId::authoritative("3f2c"));
        assert!(!id.is_provisional());
    }

    #[test]
    fn prefixed_strings_decode_as_provisional() {
        let id = TaskId::from("local:1700000000000-7-abc".to_string());
        assert!(id.is_provisional());
        assert_eq!(id.to_string(), "local:1700000000000-7-abc");
    }

    #[test]
    fn terminal_states_are_absorbing() {
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Completed));
        assert!(TaskStatus::Downloading.can_transition_to(TaskStatus::Error));
        assert!(TaskStatus::Completed.can_transition_to(TaskStatus::Completed));
        assert!(!TaskStatus::Completed.can_transition_to(TaskStatus::Error));
        assert!(!TaskStatus::Error.can_transition_to(TaskStatus::Downloading));
        assert!(!TaskStatus::Downloading.can_transition_to(TaskStatus::Pending));
    }

    #[test]
    fn quality_parses_names_and_presets() {
        assert_eq!("best".parse::<Quality>().expect("best"), Quality::Best);
        assert_eq!("2".parse::<Quality>().expect("2"), Quality::Medium);
        assert!("ultra".parse::<Quality>().is_err());
        assert_eq!(serde_json::to_string(&Quality::Low).expect("json"), "\"3\"");
    }
}
