use std::ops::Deref;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Quality, TaskId, TaskStatus};

/// One requested download as reported by the backend and mirrored locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    #[serde(rename = "url")]
    pub source_url: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub progress: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clean_title: Option<String>,
    #[serde(rename = "file_path", default, skip_serializing_if = "Option::is_none")]
    pub artifact_path: Option<String>,
    #[serde(rename = "error", default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl TaskRecord {
    pub fn pending(id: TaskId, source_url: impl Into<String>) -> Self {
        Self {
            id,
            source_url: source_url.into(),
            status: TaskStatus::Pending,
            progress: 0.0,
            title: None,
            artist: None,
            clean_title: None,
            artifact_path: None,
            error_detail: None,
        }
    }

    /// Best label for display: `artist - clean title` when both are known,
    /// else the raw title, else the source url.
    pub fn display_name(&self) -> String {
        match (&self.artist, &self.clean_title, &self.title) {
            (Some(artist), Some(clean_title), _) => format!("{artist} - {clean_title}"),
            (_, _, Some(title)) => title.clone(),
            _ => self.source_url.clone(),
        }
    }
}

/// A terminal task retained after it left the active view. There is no
/// mutable access to the inner record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HistoryEntry(TaskRecord);

impl HistoryEntry {
    pub fn record(&self) -> &TaskRecord {
        &self.0
    }
}

impl From<TaskRecord> for HistoryEntry {
    fn from(value: TaskRecord) -> Self {
        Self(value)
    }
}

impl Deref for HistoryEntry {
    type Target = TaskRecord;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedTrack {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistingTrack {
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub origin: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimilarMatch {
    pub proposed: ProposedTrack,
    #[serde(default)]
    pub matches: Vec<ExistingTrack>,
}

/// Result of a pre-flight duplicate check for one proposed batch.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DuplicateReport {
    #[serde(default)]
    pub url_already_downloaded: bool,
    #[serde(default)]
    pub similar_matches: Vec<SimilarMatch>,
}

impl DuplicateReport {
    pub fn has_duplicates(&self) -> bool {
        self.url_already_downloaded || !self.similar_matches.is_empty()
    }
}

/// Live lifecycle events pushed by the backend, one JSON object per frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Progress {
        download_id: TaskId,
        progress: f64,
    },
    Status {
        download_id: TaskId,
        status: TaskStatus,
    },
    Completed {
        download_id: TaskId,
        file_path: String,
    },
    Error {
        download_id: TaskId,
        #[serde(default)]
        error: String,
    },
    MetadataUpdate {
        download_id: TaskId,
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        artist: Option<String>,
        #[serde(default)]
        clean_title: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

impl ServerEvent {
    pub fn task_id(&self) -> Option<&TaskId> {
        match self {
            Self::Progress { download_id, .. }
            | Self::Status { download_id, .. }
            | Self::Completed { download_id, .. }
            | Self::Error { download_id, .. }
            | Self::MetadataUpdate { download_id, .. } => Some(download_id),
            Self::Unknown => None,
        }
    }
}

/// Body shared by the submit and duplicate-check requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub urls: Vec<String>,
    pub genre: String,
    #[serde(default)]
    pub quality: Quality,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub download_ids: Vec<TaskId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusResponse {
    #[serde(default)]
    pub queue: Vec<TaskRecord>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenresResponse {
    pub genres: Vec<String>,
}

/// A produced file on disk that can be fetched or clipped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub name: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_path: Option<String>,
    #[serde(default)]
    pub size: u64,
    /// Unix timestamp in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<f64>,
    #[serde(
        default,
        alias = "duration",
        skip_serializing_if = "Option::is_none"
    )]
    pub duration_seconds: Option<f64>,
}

impl Artifact {
    pub fn modified_at(&self) -> Option<DateTime<Utc>> {
        let modified = self.modified?;
        if !modified.is_finite() {
            return None;
        }
        DateTime::from_timestamp_millis((modified * 1000.0) as i64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactsResponse {
    #[serde(default)]
    pub files: Vec<Artifact>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CutClipRequest {
    pub file_path: String,
    pub start_time: f64,
    pub end_time: f64,
    pub output_name: String,
}
