use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::case::events::{CaseManifest, RunRecord, RunStatus};
use crate::config::ArtifactKind;
use crate::models::{AcquisitionAttempt, Artifact, AttemptOutcome, MatchQuality, VerificationStatus};

/// Result of one target in the most recent run
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetOutcome {
    Acquired,
    /// Acquired, but the artifact holds no records
    AcquiredEmpty,
    /// Every configured method failed
    Failed,
    Skipped,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct TargetStatus {
    pub kind: ArtifactKind,
    pub outcome: TargetOutcome,
    pub attempts: usize,
    pub artifact: Option<PathBuf>,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct SummaryNote {
    pub kind: Option<ArtifactKind>,
    pub message: String,
    pub hint: Option<String>,
}

/// Everything acquired for a case plus the attempt history, with
/// warnings (usable but noteworthy) kept apart from errors.
#[derive(Serialize, Debug, Clone)]
pub struct CaseSummary {
    pub case_id: String,
    pub created_at: DateTime<Utc>,
    pub runs: Vec<RunRecord>,
    pub artifacts: Vec<Artifact>,
    pub attempts: Vec<AcquisitionAttempt>,
    /// Per-kind outcome of the most recent run
    pub targets: Vec<TargetStatus>,
    pub warnings: Vec<SummaryNote>,
    pub errors: Vec<SummaryNote>,
}

impl CaseSummary {
    pub fn from_manifest(manifest: &CaseManifest) -> Self {
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        for artifact in &manifest.artifacts {
            let file = artifact
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            match artifact.status {
                VerificationStatus::VerifiedEmpty => warnings.push(SummaryNote {
                    kind: Some(artifact.kind),
                    message: format!("{} is structurally valid but holds no records", file),
                    hint: None,
                }),
                VerificationStatus::Failed => errors.push(SummaryNote {
                    kind: Some(artifact.kind),
                    message: format!(
                        "{} failed verification: {}",
                        file,
                        artifact.failure.as_deref().unwrap_or("unknown reason")
                    ),
                    hint: None,
                }),
                VerificationStatus::Verified => {}
            }
            if artifact.is_usable() && artifact.provenance.match_quality == MatchQuality::Heuristic {
                warnings.push(SummaryNote {
                    kind: Some(artifact.kind),
                    message: format!(
                        "{} was selected heuristically from {}: {}",
                        file,
                        artifact.provenance.source,
                        artifact.provenance.note.as_deref().unwrap_or("no expected path matched")
                    ),
                    hint: Some("confirm the database belongs to the expected app before relying on it".to_string()),
                });
            }
        }

        for run in &manifest.runs {
            match run.status {
                Some(RunStatus::Aborted) => errors.push(SummaryNote {
                    kind: None,
                    message: format!(
                        "run {} aborted: {}",
                        run.run_id,
                        run.detail.as_deref().unwrap_or("no detail")
                    ),
                    hint: None,
                }),
                Some(RunStatus::Cancelled) => warnings.push(SummaryNote {
                    kind: None,
                    message: format!("run {} was cancelled; remaining targets were skipped", run.run_id),
                    hint: None,
                }),
                None => warnings.push(SummaryNote {
                    kind: None,
                    message: format!("run {} has not finished", run.run_id),
                    hint: None,
                }),
                Some(RunStatus::Completed) => {}
            }
        }

        let targets = match manifest.latest_run() {
            Some(run) => target_statuses(manifest, run.run_id),
            None => Vec::new(),
        };
        for target in &targets {
            if target.outcome == TargetOutcome::Failed {
                let last_failure = manifest
                    .attempts_for_run(manifest.latest_run().map(|r| r.run_id).unwrap_or_default())
                    .filter(|a| a.kind == target.kind && a.outcome == AttemptOutcome::Failed)
                    .last();
                errors.push(SummaryNote {
                    kind: Some(target.kind),
                    message: format!("all {} acquisition methods failed", target.attempts),
                    hint: last_failure.and_then(|a| a.remediation.clone()),
                });
            }
        }

        CaseSummary {
            case_id: manifest.info.case_id.clone(),
            created_at: manifest.info.created_at,
            runs: manifest.runs.clone(),
            artifacts: manifest.artifacts.clone(),
            attempts: manifest.attempts.clone(),
            targets,
            warnings,
            errors,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize case summary to JSON")
    }
}

fn target_statuses(manifest: &CaseManifest, run_id: Uuid) -> Vec<TargetStatus> {
    let mut statuses = Vec::new();
    for kind in ArtifactKind::ALL {
        let attempts: Vec<&AcquisitionAttempt> = manifest
            .attempts_for_run(run_id)
            .filter(|a| a.kind == kind)
            .collect();
        if attempts.is_empty() {
            continue;
        }

        let success = attempts.iter().find(|a| a.outcome == AttemptOutcome::Success);
        let outcome = match success {
            Some(attempt) => {
                let empty = manifest.artifacts.iter().any(|a| {
                    a.run_id == run_id
                        && Some(&a.path) == attempt.output_path.as_ref()
                        && a.status == VerificationStatus::VerifiedEmpty
                });
                if empty {
                    TargetOutcome::AcquiredEmpty
                } else {
                    TargetOutcome::Acquired
                }
            }
            None if attempts.iter().all(|a| a.outcome == AttemptOutcome::Skipped) => TargetOutcome::Skipped,
            None => TargetOutcome::Failed,
        };

        statuses.push(TargetStatus {
            kind,
            outcome,
            attempts: attempts.len(),
            artifact: success.and_then(|a| a.output_path.clone()),
        });
    }
    statuses
}
