use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use uuid::Uuid;

use crate::case::events::{relative_to, CaseEvent, CaseInfo, CaseManifest, RunStatus, StoredBackup};
use crate::config::{ArtifactFormat, ArtifactKind};
use crate::constants::{
    ARTIFACTS_DIR, BACKUPS_DIR, CASE_LOG_FILE, CASE_MANIFEST_FILE, RUN_LOCK_FILE, TIMELINE_FILE,
};
use crate::error::CaseError;
use crate::models::{AcquisitionAttempt, Artifact, Provenance};
use crate::security::{sanitize_filename, validate_case_id};
use crate::utils::hash::sha256_reader;
use crate::verifier::verify_artifact;

/// Root directory holding one directory per case
#[derive(Debug, Clone)]
pub struct CaseStore {
    evidence_root: PathBuf,
}

impl CaseStore {
    pub fn new(evidence_root: impl Into<PathBuf>) -> Self {
        CaseStore { evidence_root: evidence_root.into() }
    }

    pub fn evidence_root(&self) -> &Path {
        &self.evidence_root
    }

    pub fn case_dir(&self, case_id: &str) -> Result<PathBuf, CaseError> {
        Ok(self.evidence_root.join(validate_case_id(case_id)?))
    }

    /// Open a case, creating its directory and `case.json` on first use
    pub fn open_or_create(&self, case_id: &str) -> Result<Case, CaseError> {
        let dir = self.case_dir(case_id)?;
        fs::create_dir_all(dir.join(ARTIFACTS_DIR))?;
        fs::create_dir_all(dir.join(BACKUPS_DIR))?;

        let info_path = dir.join(CASE_MANIFEST_FILE);
        let info = CaseInfo {
            case_id: case_id.to_string(),
            created_at: Utc::now(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
        };
        match OpenOptions::new().write(true).create_new(true).open(&info_path) {
            Ok(mut file) => {
                file.write_all(serde_json::to_string_pretty(&info)?.as_bytes())?;
                file.sync_all()?;
                info!("Created case {} at {}", case_id, dir.display());
                Ok(Case { info, dir })
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => self.open(case_id),
            Err(e) => Err(e.into()),
        }
    }

    /// Open an existing case
    pub fn open(&self, case_id: &str) -> Result<Case, CaseError> {
        let dir = self.case_dir(case_id)?;
        let info_path = dir.join(CASE_MANIFEST_FILE);
        let content = match fs::read_to_string(&info_path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(CaseError::NotFound(case_id.to_string())),
            Err(e) => return Err(e.into()),
        };
        let info: CaseInfo = serde_json::from_str(&content)?;
        Ok(Case { info, dir })
    }

    /// Ids of every case under the evidence root, sorted
    pub fn list_cases(&self) -> Result<Vec<String>, CaseError> {
        let entries = match fs::read_dir(&self.evidence_root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut cases = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.path().join(CASE_MANIFEST_FILE).is_file() {
                cases.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        cases.sort();
        Ok(cases)
    }
}

/// An existing case directory
#[derive(Debug, Clone)]
pub struct Case {
    info: CaseInfo,
    dir: PathBuf,
}

impl Case {
    pub fn id(&self) -> &str {
        &self.info.case_id
    }

    pub fn info(&self) -> &CaseInfo {
        &self.info
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn log_path(&self) -> PathBuf {
        self.dir.join(CASE_LOG_FILE)
    }

    pub fn default_timeline_path(&self) -> PathBuf {
        self.dir.join(TIMELINE_FILE)
    }

    pub fn is_run_active(&self) -> bool {
        self.dir.join(RUN_LOCK_FILE).exists()
    }

    /// Current state of the case, replayed from its event log
    pub fn manifest(&self) -> Result<CaseManifest, CaseError> {
        CaseManifest::load(self.info.clone(), &self.dir, &self.log_path())
    }

    /// Start a run. Fails with [`CaseError::RunInProgress`] while another
    /// run holds the case.
    pub fn begin_run(&self) -> Result<CaseRun, CaseError> {
        let run_id = Uuid::new_v4();
        let lock = RunLock::acquire(&self.dir, self.id(), run_id)?;
        let log = OpenOptions::new().create(true).append(true).open(self.log_path())?;
        let started_at = Utc::now();

        let run = CaseRun {
            case_id: self.id().to_string(),
            dir: self.dir.clone(),
            run_id,
            started_at,
            stamp: started_at.format("%Y%m%dT%H%M%SZ").to_string(),
            log,
            _lock: lock,
        };

        let examiner_host = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown".to_string());
        run.append(&CaseEvent::RunStarted {
            run_id,
            started_at,
            examiner_host,
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
        })?;
        info!("Run {} started for case {}", run_id, self.id());
        Ok(run)
    }
}

/// Exclusive, append-only write access to a case for one run.
///
/// Every file written through a run is new; existing files are never
/// opened for writing.
pub struct CaseRun {
    case_id: String,
    dir: PathBuf,
    run_id: Uuid,
    started_at: DateTime<Utc>,
    stamp: String,
    log: File,
    _lock: RunLock,
}

impl CaseRun {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn case_id(&self) -> &str {
        &self.case_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    fn append(&self, event: &CaseEvent) -> Result<(), CaseError> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');
        (&self.log).write_all(&line)?;
        self.log.sync_data()?;
        Ok(())
    }

    pub fn record_device(&self, device: &str, elevated: bool) -> Result<(), CaseError> {
        self.append(&CaseEvent::DeviceAttached {
            run_id: self.run_id,
            device: device.to_string(),
            elevated,
        })
    }

    pub fn record_attempt(&self, attempt: &AcquisitionAttempt) -> Result<(), CaseError> {
        let mut logged = attempt.clone();
        logged.output_path = logged.output_path.map(|p| relative_to(&self.dir, &p));
        self.append(&CaseEvent::Attempt(logged))
    }

    /// Write raw acquired bytes as a new file under `artifacts/<Kind>/`
    pub fn store_artifact(&self, kind: ArtifactKind, name: &str, data: &[u8]) -> Result<PathBuf, CaseError> {
        let dir = self.dir.join(ARTIFACTS_DIR).join(kind.name());
        fs::create_dir_all(&dir)?;
        let file_name = format!("{}_{}", self.stamp, sanitize_filename(name));
        let path = write_new_file(&dir, &file_name, data)?;
        debug!("Stored {} bytes of {} at {}", data.len(), kind, path.display());
        Ok(path)
    }

    /// Keep a raw backup container with the case
    pub fn store_backup(&self, package: &str, data: &[u8]) -> Result<StoredBackup, CaseError> {
        let dir = self.dir.join(BACKUPS_DIR);
        fs::create_dir_all(&dir)?;
        let file_name = format!("{}_{}.ab", self.stamp, sanitize_filename(package));
        let path = write_new_file(&dir, &file_name, data)?;

        let backup = StoredBackup {
            run_id: self.run_id,
            package: package.to_string(),
            path: relative_to(&self.dir, &path),
            size: data.len() as u64,
            sha256: sha256_reader(data)?,
        };
        self.append(&CaseEvent::BackupStored(backup.clone()))?;
        Ok(StoredBackup { path, ..backup })
    }

    /// Verify a stored file and record the resulting artifact, whatever its
    /// verification status
    pub fn commit_artifact(
        &self,
        kind: ArtifactKind,
        format: ArtifactFormat,
        path: &Path,
        provenance: Provenance,
    ) -> Result<Artifact, CaseError> {
        let verification = verify_artifact(path, kind, format);
        let artifact = Artifact {
            id: Uuid::new_v4(),
            run_id: self.run_id,
            kind,
            format,
            path: path.to_path_buf(),
            size: verification.size,
            sha256: verification.sha256,
            status: verification.status,
            failure: verification.failure,
            findings: verification.findings,
            provenance,
            acquired_at: Utc::now(),
        };

        let mut logged = artifact.clone();
        logged.path = relative_to(&self.dir, path);
        self.append(&CaseEvent::Artifact(logged))?;
        Ok(artifact)
    }

    /// Record how the run ended and release the case
    pub fn finish(self, status: RunStatus, detail: Option<String>) -> Result<(), CaseError> {
        self.append(&CaseEvent::RunFinished {
            run_id: self.run_id,
            finished_at: Utc::now(),
            status,
            detail,
        })?;
        info!("Run {} for case {} finished: {:?}", self.run_id, self.case_id, status);
        Ok(())
    }
}

/// Create `file_name` in `dir`, adding a numeric suffix while the name is taken
fn write_new_file(dir: &Path, file_name: &str, data: &[u8]) -> Result<PathBuf, CaseError> {
    let base = Path::new(file_name);
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "file".to_string());
    let extension = base
        .extension()
        .map(|s| format!(".{}", s.to_string_lossy()))
        .unwrap_or_default();

    let mut counter = 0;
    loop {
        let candidate = if counter == 0 {
            file_name.to_string()
        } else {
            format!("{}_{}{}", stem, counter, extension)
        };
        let path = dir.join(candidate);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                file.write_all(data)?;
                file.sync_all()?;
                return Ok(path);
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => counter += 1,
            Err(e) => return Err(e.into()),
        }
    }
}

/// Marker file held for the lifetime of a run
struct RunLock {
    path: PathBuf,
}

impl RunLock {
    fn acquire(case_dir: &Path, case_id: &str, run_id: Uuid) -> Result<Self, CaseError> {
        let path = case_dir.join(RUN_LOCK_FILE);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                writeln!(file, "{}", run_id)?;
                Ok(RunLock { path })
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(CaseError::RunInProgress(case_id.to_string())),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to release run lock {}: {}", self.path.display(), e);
        }
    }
}
