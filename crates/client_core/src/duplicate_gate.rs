//! Pre-submission duplicate check. The gate only decides; asking the user is
//! delegated to a [`DuplicateConfirmer`].

use std::sync::Arc;

use async_trait::async_trait;
use shared::{domain::TaskId, protocol::DuplicateReport};
use tracing::{info, warn};

use crate::{
    config::DuplicateCheckPolicy,
    error::{ClientError, Result},
    submission::SubmissionBatch,
    DownloadClient,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Proceed,
    Confirm(DuplicateReport),
}

pub fn decide(report: DuplicateReport) -> GateDecision {
    if report.has_duplicates() {
        GateDecision::Confirm(report)
    } else {
        GateDecision::Proceed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Proceed,
    Cancel,
}

/// Asked once per batch when the report is non-empty.
#[async_trait]
pub trait DuplicateConfirmer: Send + Sync {
    async fn confirm(&self, batch: &SubmissionBatch, report: &DuplicateReport) -> Confirmation;
}

/// Confirmer that never blocks a submission.
pub struct AlwaysProceed;

#[async_trait]
impl DuplicateConfirmer for AlwaysProceed {
    async fn confirm(&self, _batch: &SubmissionBatch, _report: &DuplicateReport) -> Confirmation {
        Confirmation::Proceed
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    Submitted(Vec<TaskId>),
    Cancelled,
}

impl DownloadClient {
    /// Runs the duplicate check under the configured policy. With
    /// `FailOpen` a failed check is logged and treated as a clean report.
    pub async fn check_duplicates(&self, batch: &SubmissionBatch) -> Result<GateDecision> {
        match self.backend.check_duplicates(&batch.to_request()).await {
            Ok(report) => Ok(decide(report)),
            Err(err) => match self.settings.duplicate_check {
                DuplicateCheckPolicy::FailOpen => {
                    warn!(error = %err, "duplicate check: failed, proceeding without it");
                    Ok(GateDecision::Proceed)
                }
                DuplicateCheckPolicy::FailClosed => {
                    warn!(error = %err, "duplicate check: failed, blocking submission");
                    Err(ClientError::DuplicateCheck(Box::new(err)))
                }
            },
        }
    }

    /// Duplicate check, optional confirmation, then [`DownloadClient::submit`].
    /// A cancelled batch never reaches the backend.
    pub async fn submit_checked(
        self: &Arc<Self>,
        batch: SubmissionBatch,
        confirmer: &dyn DuplicateConfirmer,
    ) -> Result<SubmissionOutcome> {
        if let GateDecision::Confirm(report) = self.check_duplicates(&batch).await? {
            if confirmer.confirm(&batch, &report).await == Confirmation::Cancel {
                info!(count = batch.len(), "duplicate check: submission cancelled");
                return Ok(SubmissionOutcome::Cancelled);
            }
        }

        let ids = self.submit(batch).await?;
        Ok(SubmissionOutcome::Submitted(ids))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::protocol::{ExistingTrack, ProposedTrack, SimilarMatch};

    #[test]
    fn clean_report_proceeds() {
        assert_eq!(decide(DuplicateReport::default()), GateDecision::Proceed);
    }

    #[test]
    fn similar_match_requires_confirmation() {
        let report = DuplicateReport {
            url_already_downloaded: false,
            similar_matches: vec![SimilarMatch {
                proposed: ProposedTrack {
                    url: "https://x/a".into(),
                    artist: Some("Band".into()),
                    title: Some("Tune".into()),
                },
                matches: vec![ExistingTrack {
                    artist: "Band".into(),
                    title: "Tune".into(),
                    origin: "rock".into(),
                }],
            }],
        };
        assert_eq!(decide(report.clone()), GateDecision::Confirm(report));
    }

    #[test]
    fn already_downloaded_url_requires_confirmation() {
        let report = DuplicateReport {
            url_already_downloaded: true,
            similar_matches: Vec::new(),
        };
        assert!(matches!(decide(report), GateDecision::Confirm(_)));
    }
}
