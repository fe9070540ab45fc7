//! Acquisition engine.
//!
//! The engine is the surface used by presentation layers (the CLI, a GUI).
//! [`Engine::start_acquisition`] runs the whole acquisition on a background
//! task and returns immediately with a progress stream and a cancellation
//! handle. The remaining operations read the case store and never touch
//! the device.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{info, warn};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::case::{CaseRun, CaseStore, CaseSummary, RunStatus, VerificationReport};
use crate::collectors::{preflight, DeviceSession, StrategySelector, TargetReport};
use crate::config::{ArtifactKind, EngineConfig};
use crate::constants::{PREFLIGHT_PERCENT, TARGETS_DONE_PERCENT};
use crate::error::{AcquisitionError, CaseError};
use crate::models::AttemptOutcome;
use crate::timeline::Timeline;
use crate::transport::DeviceTransport;

/// Progress notification; `percent` never decreases within a run
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub percent: u8,
    pub message: String,
    pub kind: Option<ArtifactKind>,
}

struct ProgressReporter {
    tx: mpsc::UnboundedSender<ProgressEvent>,
    last: u8,
}

impl ProgressReporter {
    fn new(tx: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        ProgressReporter { tx, last: 0 }
    }

    fn report(&mut self, percent: u8, kind: Option<ArtifactKind>, message: impl Into<String>) {
        let percent = percent.clamp(self.last, 100);
        self.last = percent;
        // A dropped receiver only means nobody is watching
        let _ = self.tx.send(ProgressEvent { percent, message: message.into(), kind });
    }
}

fn target_percent(done: usize, total: usize) -> u8 {
    let span = (TARGETS_DONE_PERCENT - PREFLIGHT_PERCENT) as usize;
    PREFLIGHT_PERCENT + (span * done / total.max(1)) as u8
}

/// Outcome of a finished run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub case_id: String,
    pub device: String,
    pub elevated: bool,
    pub status: RunStatus,
    pub targets: Vec<TargetReport>,
    /// Kinds whose direct copy was refused for lack of privileges
    pub permission_denied: Vec<ArtifactKind>,
}

impl RunReport {
    pub fn acquired(&self) -> usize {
        self.targets.iter().filter(|t| t.succeeded()).count()
    }
}

/// Handle to a run executing in the background
pub struct AcquisitionRun {
    run_id: Uuid,
    events: mpsc::UnboundedReceiver<ProgressEvent>,
    cancel: CancellationToken,
    handle: JoinHandle<Result<RunReport, AcquisitionError>>,
}

impl AcquisitionRun {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Next progress event; `None` once the run has ended
    pub async fn next_event(&mut self) -> Option<ProgressEvent> {
        self.events.recv().await
    }

    /// Ask the run to stop before the next target
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the run to end. Unread progress events are discarded.
    pub async fn wait(self) -> Result<RunReport, AcquisitionError> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) => Err(AcquisitionError::Aborted(e.to_string())),
        }
    }
}

/// Entry point for acquisitions and case queries
#[derive(Clone)]
pub struct Engine {
    transport: Arc<dyn DeviceTransport>,
    config: Arc<EngineConfig>,
    store: CaseStore,
}

impl Engine {
    pub fn new(transport: Arc<dyn DeviceTransport>, config: EngineConfig) -> Self {
        let store = CaseStore::new(config.evidence_root.clone());
        Engine { transport, config: Arc::new(config), store }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &CaseStore {
        &self.store
    }

    /// Start a run for `case_id` on a background task.
    ///
    /// The case is created on first use. Fails immediately when another run
    /// is active for the case. Must be called within a tokio runtime.
    pub fn start_acquisition(&self, case_id: &str) -> Result<AcquisitionRun, AcquisitionError> {
        let case = self.store.open_or_create(case_id)?;
        let run = case.begin_run()?;
        let run_id = run.run_id();

        let (tx, events) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let transport = Arc::clone(&self.transport);
        let config = Arc::clone(&self.config);
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            execute_run(transport, config, run, ProgressReporter::new(tx), token).await
        });

        Ok(AcquisitionRun { run_id, events, cancel, handle })
    }

    pub fn list_cases(&self) -> Result<Vec<String>, CaseError> {
        self.store.list_cases()
    }

    pub fn case_summary(&self, case_id: &str) -> Result<CaseSummary, CaseError> {
        let case = self.store.open(case_id)?;
        Ok(CaseSummary::from_manifest(&case.manifest()?))
    }

    pub fn verification_report(&self, case_id: &str) -> Result<VerificationReport, CaseError> {
        let case = self.store.open(case_id)?;
        Ok(VerificationReport::from_manifest(&case.manifest()?))
    }

    pub fn build_timeline(&self, case_id: &str) -> Result<Timeline, CaseError> {
        let case = self.store.open(case_id)?;
        Ok(Timeline::build(&case.manifest()?))
    }

    /// Rebuild the timeline and write it as CSV; without `path` the file
    /// goes into the case directory
    pub fn export_timeline(&self, case_id: &str, path: Option<&Path>) -> Result<PathBuf> {
        let case = self
            .store
            .open(case_id)
            .context(format!("Failed to open case {}", case_id))?;
        let timeline = Timeline::build(&case.manifest()?);
        let target = path.map(Path::to_path_buf).unwrap_or_else(|| case.default_timeline_path());
        timeline.export_csv(&target)?;
        Ok(target)
    }
}

async fn execute_run(
    transport: Arc<dyn DeviceTransport>,
    config: Arc<EngineConfig>,
    run: CaseRun,
    mut progress: ProgressReporter,
    cancel: CancellationToken,
) -> Result<RunReport, AcquisitionError> {
    progress.report(0, None, format!("Starting acquisition for case {}", run.case_id()));

    let session = match preflight(transport.as_ref(), &config).await {
        Ok(session) => session,
        Err(e) => {
            progress.report(100, None, format!("Acquisition aborted: {}", e));
            abort(run, &e.to_string());
            return Err(e);
        }
    };
    if let Err(e) = run.record_device(&session.device, session.elevated) {
        abort(run, &e.to_string());
        return Err(e.into());
    }
    progress.report(
        PREFLIGHT_PERCENT,
        None,
        format!(
            "Device {} ready{}",
            session.device,
            if session.elevated { " with root access" } else { "" }
        ),
    );

    let (targets, permission_denied) =
        match acquire_targets(transport.as_ref(), &config, &run, &session, &mut progress, &cancel).await {
            Ok(outcome) => outcome,
            Err(e) => {
                progress.report(100, None, format!("Acquisition aborted: {}", e));
                abort(run, &e.to_string());
                return Err(e.into());
            }
        };

    let skipped = targets
        .iter()
        .any(|t| t.attempts.iter().any(|a| a.outcome == AttemptOutcome::Skipped));
    let status = if skipped { RunStatus::Cancelled } else { RunStatus::Completed };
    let report = RunReport {
        run_id: run.run_id(),
        case_id: run.case_id().to_string(),
        device: session.device,
        elevated: session.elevated,
        status,
        targets,
        permission_denied,
    };
    let detail = format!("{} of {} targets acquired", report.acquired(), report.targets.len());
    run.finish(status, Some(detail.clone()))?;
    progress.report(100, None, format!("Acquisition {:?}: {}", status, detail));
    Ok(report)
}

async fn acquire_targets(
    transport: &dyn DeviceTransport,
    config: &EngineConfig,
    run: &CaseRun,
    session: &DeviceSession,
    progress: &mut ProgressReporter,
    cancel: &CancellationToken,
) -> Result<(Vec<TargetReport>, Vec<ArtifactKind>), CaseError> {
    let mut selector = StrategySelector::new(transport, config, run, session.elevated);
    let total = config.targets.len();
    let mut reports = Vec::with_capacity(total);

    for (index, target) in config.targets.iter().enumerate() {
        if cancel.is_cancelled() {
            reports.push(selector.skip_target(target, "run cancelled before this target")?);
            progress.report(target_percent(index + 1, total), Some(target.kind), format!("Skipped {}", target.kind));
            continue;
        }

        progress.report(target_percent(index, total), Some(target.kind), format!("Acquiring {}", target.kind));
        let report = selector.acquire_target(target).await?;
        let message = match &report.artifact {
            Some(artifact) => format!(
                "{} acquired via {} ({:?})",
                target.kind, artifact.provenance.method, artifact.status
            ),
            None => format!("{} not acquired after {} attempt(s)", target.kind, report.attempts.len()),
        };
        progress.report(target_percent(index + 1, total), Some(target.kind), message);
        reports.push(report);
    }

    if cancel.is_cancelled() {
        info!("Run {} cancelled", run.run_id());
    }
    let permissions = selector.permissions();
    permissions.report_failures(session.elevated).await;
    let denied = permissions.denied_kinds().await;
    if !session.elevated && permissions.should_suggest_elevation().await {
        let names: Vec<&str> = denied.iter().map(|k| k.name()).collect();
        progress.report(
            TARGETS_DONE_PERCENT,
            None,
            format!("Root access would allow direct copies of: {}", names.join(", ")),
        );
    }
    Ok((reports, denied))
}

/// Record an aborted run; the case lock is released either way
fn abort(run: CaseRun, detail: &str) {
    if let Err(e) = run.finish(RunStatus::Aborted, Some(detail.to_string())) {
        warn!("Could not record aborted run: {}", e);
    }
}
