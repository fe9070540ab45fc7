use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::ArtifactKind;
use crate::error::CaseError;
use crate::models::{AcquisitionAttempt, Artifact};

/// How an acquisition run ended
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Every target was processed
    Completed,
    /// Stopped between targets on request; remaining targets were skipped
    Cancelled,
    /// A condition that invalidates the whole run (no tool, no device)
    Aborted,
}

/// One line of the case event log. Paths are stored relative to the case
/// directory.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CaseEvent {
    RunStarted {
        run_id: Uuid,
        started_at: DateTime<Utc>,
        examiner_host: String,
        engine_version: String,
    },
    DeviceAttached {
        run_id: Uuid,
        device: String,
        elevated: bool,
    },
    BackupStored(StoredBackup),
    Artifact(Artifact),
    Attempt(AcquisitionAttempt),
    RunFinished {
        run_id: Uuid,
        finished_at: DateTime<Utc>,
        status: RunStatus,
        detail: Option<String>,
    },
}

/// Raw backup container kept with the case
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StoredBackup {
    pub run_id: Uuid,
    pub package: String,
    pub path: PathBuf,
    pub size: u64,
    pub sha256: String,
}

/// Contents of `case.json`, written once when the case is created
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CaseInfo {
    pub case_id: String,
    pub created_at: DateTime<Utc>,
    pub engine_version: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub examiner_host: String,
    pub device: Option<String>,
    pub elevated: bool,
    pub finished_at: Option<DateTime<Utc>>,
    /// `None` while the run is active or when it never finished cleanly
    pub status: Option<RunStatus>,
    pub detail: Option<String>,
}

/// Case state rebuilt from the event log, with absolute paths
#[derive(Serialize, Debug, Clone)]
pub struct CaseManifest {
    pub info: CaseInfo,
    pub root: PathBuf,
    pub runs: Vec<RunRecord>,
    pub attempts: Vec<AcquisitionAttempt>,
    pub artifacts: Vec<Artifact>,
    pub backups: Vec<StoredBackup>,
}

impl CaseManifest {
    pub fn new(info: CaseInfo, root: PathBuf) -> Self {
        CaseManifest {
            info,
            root,
            runs: Vec::new(),
            attempts: Vec::new(),
            artifacts: Vec::new(),
            backups: Vec::new(),
        }
    }

    /// Replay a log file; a missing log is an empty case
    pub fn load(info: CaseInfo, root: &Path, log_path: &Path) -> Result<Self, CaseError> {
        let mut manifest = CaseManifest::new(info, root.to_path_buf());
        let content = match fs::read_to_string(log_path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(manifest),
            Err(e) => return Err(e.into()),
        };

        let lines: Vec<&str> = content.lines().collect();
        for (index, line) in lines.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<CaseEvent>(line) {
                Ok(event) => manifest.apply(event),
                // A run interrupted mid-write leaves an unterminated last line
                Err(e) if index + 1 == lines.len() && !content.ends_with('\n') => {
                    warn!("Ignoring incomplete last line of {}: {}", log_path.display(), e);
                }
                Err(e) => {
                    return Err(CaseError::CorruptLog {
                        line: index + 1,
                        details: e.to_string(),
                    })
                }
            }
        }
        Ok(manifest)
    }

    pub fn apply(&mut self, event: CaseEvent) {
        match event {
            CaseEvent::RunStarted { run_id, started_at, examiner_host, .. } => self.runs.push(RunRecord {
                run_id,
                started_at,
                examiner_host,
                device: None,
                elevated: false,
                finished_at: None,
                status: None,
                detail: None,
            }),
            CaseEvent::DeviceAttached { run_id, device, elevated } => {
                if let Some(run) = self.run_mut(run_id) {
                    run.device = Some(device);
                    run.elevated = elevated;
                }
            }
            CaseEvent::BackupStored(mut backup) => {
                backup.path = self.root.join(&backup.path);
                self.backups.push(backup);
            }
            CaseEvent::Artifact(mut artifact) => {
                artifact.path = self.root.join(&artifact.path);
                self.artifacts.push(artifact);
            }
            CaseEvent::Attempt(mut attempt) => {
                attempt.output_path = attempt.output_path.map(|p| self.root.join(p));
                self.attempts.push(attempt);
            }
            CaseEvent::RunFinished { run_id, finished_at, status, detail } => {
                if let Some(run) = self.run_mut(run_id) {
                    run.finished_at = Some(finished_at);
                    run.status = Some(status);
                    run.detail = detail;
                }
            }
        }
    }

    fn run_mut(&mut self, run_id: Uuid) -> Option<&mut RunRecord> {
        self.runs.iter_mut().find(|r| r.run_id == run_id)
    }

    pub fn latest_run(&self) -> Option<&RunRecord> {
        self.runs.last()
    }

    /// Most recently committed usable artifact of a kind
    pub fn latest_usable_artifact(&self, kind: ArtifactKind) -> Option<&Artifact> {
        self.artifacts.iter().rev().find(|a| a.kind == kind && a.is_usable())
    }

    pub fn attempts_for_run(&self, run_id: Uuid) -> impl Iterator<Item = &AcquisitionAttempt> {
        self.attempts.iter().filter(move |a| a.run_id == run_id)
    }
}

/// `path` relative to `root` when it lies inside it
pub(crate) fn relative_to(root: &Path, path: &Path) -> PathBuf {
    path.strip_prefix(root).map(Path::to_path_buf).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MethodKind;
    use std::io::Write;
    use tempfile::TempDir;

    fn info() -> CaseInfo {
        CaseInfo {
            case_id: "CASE-1".to_string(),
            created_at: Utc::now(),
            engine_version: "0.1.0".to_string(),
        }
    }

    #[test]
    fn test_replay_resolves_relative_paths() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("case_log.jsonl");
        let run_id = Uuid::new_v4();

        let events = vec![
            CaseEvent::RunStarted {
                run_id,
                started_at: Utc::now(),
                examiner_host: "lab-01".into(),
                engine_version: "0.1.0".into(),
            },
            CaseEvent::Attempt(AcquisitionAttempt::success(
                run_id,
                ArtifactKind::Sms,
                MethodKind::ContentQuery,
                PathBuf::from("artifacts/SMS/x_sms.rows.jsonl"),
                "ok",
                Utc::now(),
                std::time::Duration::from_millis(5),
            )),
            CaseEvent::RunFinished {
                run_id,
                finished_at: Utc::now(),
                status: RunStatus::Completed,
                detail: None,
            },
        ];
        let mut file = fs::File::create(&log).unwrap();
        for event in &events {
            writeln!(file, "{}", serde_json::to_string(event).unwrap()).unwrap();
        }

        let manifest = CaseManifest::load(info(), dir.path(), &log).unwrap();
        assert_eq!(manifest.runs.len(), 1);
        assert_eq!(manifest.runs[0].status, Some(RunStatus::Completed));
        assert_eq!(
            manifest.attempts[0].output_path,
            Some(dir.path().join("artifacts/SMS/x_sms.rows.jsonl"))
        );
    }

    #[test]
    fn test_corrupt_line_is_reported() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("case_log.jsonl");
        fs::write(&log, "{\"event\":\"bogus\"}\n{}\n").unwrap();

        match CaseManifest::load(info(), dir.path(), &log) {
            Err(CaseError::CorruptLog { line, .. }) => assert_eq!(line, 1),
            other => panic!("expected corrupt log, got {:?}", other.map(|m| m.runs.len())),
        }
    }

    #[test]
    fn test_incomplete_last_line_is_ignored() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("case_log.jsonl");
        let started = CaseEvent::RunStarted {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            examiner_host: "lab".into(),
            engine_version: "0.1.0".into(),
        };
        fs::write(&log, format!("{}\n{{\"event\":\"run_fin", serde_json::to_string(&started).unwrap())).unwrap();

        let manifest = CaseManifest::load(info(), dir.path(), &log).unwrap();
        assert_eq!(manifest.runs.len(), 1);
        assert_eq!(manifest.runs[0].status, None);
    }

    #[test]
    fn test_missing_log_is_empty_case() {
        let dir = TempDir::new().unwrap();
        let manifest = CaseManifest::load(info(), dir.path(), &dir.path().join("absent.jsonl")).unwrap();
        assert!(manifest.runs.is_empty());
        assert!(manifest.latest_usable_artifact(ArtifactKind::Sms).is_none());
    }
}
