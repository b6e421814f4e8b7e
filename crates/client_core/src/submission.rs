//! Optimistic batch submission: placeholders appear before the backend
//! answers and are either reassigned to authoritative ids or rolled back.

use std::sync::Arc;

use shared::{
    domain::{Quality, TaskId},
    protocol::DownloadRequest,
};
use tracing::{info, warn};

use crate::{
    error::{Result, ValidationError},
    registry::TaskPatch,
    ClientEvent, DownloadClient,
};

/// A validated set of sources sharing one classification and quality.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionBatch {
    sources: Vec<String>,
    classification: String,
    quality: Quality,
}

impl SubmissionBatch {
    /// Blank and whitespace-only sources are dropped; an empty remainder or a
    /// blank classification is rejected.
    pub fn new<I, S>(
        sources: I,
        classification: impl Into<String>,
        quality: Quality,
    ) -> std::result::Result<Self, ValidationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let sources: Vec<String> = sources
            .into_iter()
            .map(|source| source.as_ref().trim().to_string())
            .filter(|source| !source.is_empty())
            .collect();
        if sources.is_empty() {
            return Err(ValidationError::NoSources);
        }

        let classification = classification.into().trim().to_string();
        if classification.is_empty() {
            return Err(ValidationError::MissingClassification);
        }

        Ok(Self {
            sources,
            classification,
            quality,
        })
    }

    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    pub fn classification(&self) -> &str {
        &self.classification
    }

    pub fn quality(&self) -> Quality {
        self.quality
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn to_request(&self) -> DownloadRequest {
        DownloadRequest {
            urls: self.sources.clone(),
            genre: self.classification.clone(),
            quality: self.quality,
        }
    }
}

impl DownloadClient {
    /// Submits without a duplicate check. Returns the authoritative ids in
    /// source order. A delayed status refresh is scheduled whatever the
    /// outcome.
    pub async fn submit(self: &Arc<Self>, batch: SubmissionBatch) -> Result<Vec<TaskId>> {
        let provisional: Vec<TaskId> = batch.sources().iter().map(|_| TaskId::provisional()).collect();

        self.mutate(|registry| {
            for (id, source) in provisional.iter().zip(batch.sources()) {
                registry.upsert(TaskPatch::new(id.clone()).with_source_url(source.clone()));
            }
        })
        .await;

        let outcome = self.backend.submit(&batch.to_request()).await;

        let result = match outcome {
            Ok(ids) => {
                if ids.len() < provisional.len() {
                    warn!(
                        expected = provisional.len(),
                        received = ids.len(),
                        "submit: backend acknowledged fewer tasks than submitted"
                    );
                }
                self.mutate(|registry| {
                    for (index, old) in provisional.iter().enumerate() {
                        match ids.get(index) {
                            Some(new) => {
                                registry.reassign_id(old, new.clone());
                            }
                            None => {
                                registry.remove(old);
                            }
                        }
                    }
                })
                .await;
                info!(count = ids.len(), genre = batch.classification(), "submit: accepted");
                Ok(ids.into_iter().take(provisional.len()).collect())
            }
            Err(err) => {
                warn!(error = %err, count = provisional.len(), "submit: rejected, rolling back");
                self.mutate(|registry| {
                    for id in &provisional {
                        registry.remove(id);
                    }
                })
                .await;
                let _ = self
                    .events
                    .send(ClientEvent::Error(format!("submission failed: {err}")));
                Err(err)
            }
        };
        self.schedule_refresh(self.settings.refresh_delay);
        result
    }
}
