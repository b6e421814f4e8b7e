//! Clip requests against produced artifacts. Ranges are validated locally so
//! an invalid range never reaches the backend.

use std::path::Path;

use chrono::{DateTime, Utc};
use shared::protocol::{Artifact, CutClipRequest};
use tracing::info;

use crate::{
    error::{Result, ValidationError},
    DownloadClient,
};

/// A validated `[start, end)` range in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipRange {
    start: f64,
    end: f64,
}

impl ClipRange {
    /// `duration` bounds the end only when it is known and positive. The
    /// backend's `/audio-files` listing never reports a duration, so
    /// `BeyondDuration` only fires when the caller supplies one (for example
    /// the CLI's `cut --duration`).
    pub fn new(start: f64, end: f64, duration: Option<f64>) -> std::result::Result<Self, ValidationError> {
        if !start.is_finite() || !end.is_finite() {
            return Err(ValidationError::NonFiniteTime);
        }
        if start < 0.0 {
            return Err(ValidationError::NegativeStart { start });
        }
        if start >= end {
            return Err(ValidationError::CrossedRange { start, end });
        }
        if let Some(duration) = duration.filter(|d| d.is_finite() && *d > 0.0) {
            if end > duration {
                return Err(ValidationError::BeyondDuration { end, duration });
            }
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn end(&self) -> f64 {
        self.end
    }

    pub fn length(&self) -> f64 {
        self.end - self.start
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipOutput {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// `{name}_cut_{unix_millis}.mp3`. Only the final path component of `name`
/// is used.
pub fn clip_output_name(artifact_name: &str, at: DateTime<Utc>) -> String {
    let name = Path::new(artifact_name.trim())
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("clip");
    format!("{name}_cut_{}.mp3", at.timestamp_millis())
}

impl DownloadClient {
    pub async fn cut_clip(&self, artifact: &Artifact, start: f64, end: f64) -> Result<ClipOutput> {
        let range = ClipRange::new(start, end, artifact.duration_seconds)?;
        let file_name = clip_output_name(&artifact.name, Utc::now());
        let request = CutClipRequest {
            file_path: artifact.path.clone(),
            start_time: range.start(),
            end_time: range.end(),
            output_name: file_name.clone(),
        };

        let bytes = self.backend.cut_clip(&request).await?;
        info!(
            artifact = %artifact.path,
            start = range.start(),
            end = range.end(),
            size = bytes.len(),
            "clip: received"
        );
        Ok(ClipOutput { file_name, bytes })
    }
}
