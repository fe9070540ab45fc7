use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::warn;
use serde::Serialize;
use uuid::Uuid;
use walkdir::WalkDir;

use crate::case::events::CaseManifest;
use crate::config::ArtifactKind;
use crate::constants::{ARTIFACTS_DIR, BACKUPS_DIR};
use crate::models::{StructuralFindings, VerificationStatus};
use crate::utils::hash::calculate_sha256;

/// Whether a stored file still matches the digest recorded at acquisition
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityState {
    Intact,
    Modified,
    Missing,
    /// Verification failed before a digest was recorded
    NotHashed,
}

#[derive(Serialize, Debug, Clone)]
pub struct ArtifactCheck {
    pub artifact_id: Uuid,
    pub kind: ArtifactKind,
    pub path: PathBuf,
    pub status: VerificationStatus,
    pub failure: Option<String>,
    pub findings: StructuralFindings,
    pub recorded_sha256: Option<String>,
    pub current_sha256: Option<String>,
    pub integrity: IntegrityState,
}

#[derive(Serialize, Debug, Clone)]
pub struct BackupCheck {
    pub package: String,
    pub path: PathBuf,
    pub recorded_sha256: String,
    pub current_sha256: Option<String>,
    pub integrity: IntegrityState,
}

/// Per-artifact structural findings plus a re-hash of everything the case
/// log knows about
#[derive(Serialize, Debug, Clone)]
pub struct VerificationReport {
    pub case_id: String,
    pub generated_at: DateTime<Utc>,
    pub artifacts: Vec<ArtifactCheck>,
    pub backups: Vec<BackupCheck>,
    /// Files under the artifact and backup directories that no log entry references
    pub untracked_files: Vec<PathBuf>,
}

impl VerificationReport {
    pub fn from_manifest(manifest: &CaseManifest) -> Self {
        let artifacts = manifest
            .artifacts
            .iter()
            .map(|artifact| {
                let (integrity, current) = check_integrity(&artifact.path, artifact.sha256.as_deref());
                ArtifactCheck {
                    artifact_id: artifact.id,
                    kind: artifact.kind,
                    path: artifact.path.clone(),
                    status: artifact.status,
                    failure: artifact.failure.clone(),
                    findings: artifact.findings.clone(),
                    recorded_sha256: artifact.sha256.clone(),
                    current_sha256: current,
                    integrity,
                }
            })
            .collect();

        let backups = manifest
            .backups
            .iter()
            .map(|backup| {
                let (integrity, current) = check_integrity(&backup.path, Some(&backup.sha256));
                BackupCheck {
                    package: backup.package.clone(),
                    path: backup.path.clone(),
                    recorded_sha256: backup.sha256.clone(),
                    current_sha256: current,
                    integrity,
                }
            })
            .collect();

        VerificationReport {
            case_id: manifest.info.case_id.clone(),
            generated_at: Utc::now(),
            artifacts,
            backups,
            untracked_files: untracked_files(manifest),
        }
    }

    /// Number of artifacts and backups that are modified or gone
    pub fn tampered_count(&self) -> usize {
        let bad = |state: IntegrityState| matches!(state, IntegrityState::Modified | IntegrityState::Missing);
        self.artifacts.iter().filter(|a| bad(a.integrity)).count()
            + self.backups.iter().filter(|b| bad(b.integrity)).count()
    }

    pub fn is_intact(&self) -> bool {
        self.tampered_count() == 0 && self.untracked_files.is_empty()
    }
}

fn check_integrity(path: &Path, recorded: Option<&str>) -> (IntegrityState, Option<String>) {
    if !path.is_file() {
        return (IntegrityState::Missing, None);
    }
    let current = match calculate_sha256(path) {
        Ok(digest) => digest,
        Err(e) => {
            warn!("Failed to re-hash {}: {}", path.display(), e);
            return (IntegrityState::Missing, None);
        }
    };
    let state = match recorded {
        None => IntegrityState::NotHashed,
        Some(expected) if expected.eq_ignore_ascii_case(&current) => IntegrityState::Intact,
        Some(_) => IntegrityState::Modified,
    };
    (state, Some(current))
}

fn untracked_files(manifest: &CaseManifest) -> Vec<PathBuf> {
    let known: HashSet<&Path> = manifest
        .artifacts
        .iter()
        .map(|a| a.path.as_path())
        .chain(manifest.attempts.iter().filter_map(|a| a.output_path.as_deref()))
        .chain(manifest.backups.iter().map(|b| b.path.as_path()))
        .collect();

    let mut untracked = Vec::new();
    for dir in [ARTIFACTS_DIR, BACKUPS_DIR] {
        for entry in WalkDir::new(manifest.root.join(dir)).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Cannot inspect case directory: {}", e);
                    continue;
                }
            };
            if entry.file_type().is_file() && !known.contains(entry.path()) {
                untracked.push(entry.path().to_path_buf());
            }
        }
    }
    untracked
}
