use std::collections::HashMap;
use std::time::Instant;

use chrono::Utc;
use log::{debug, info, warn};

use crate::case::CaseRun;
use crate::collectors::permission_tracker::PermissionTracker;
use crate::collectors::strategy::{Acquired, BackupSlot, MethodFailure};
use crate::config::{AcquisitionMethod, AcquisitionTarget, ArtifactKind, EngineConfig, MethodKind};
use crate::error::{AcquisitionError, CaseError, FailureReason, TransportError};
use crate::models::{AcquisitionAttempt, Artifact, AttemptOutcome};
use crate::transport::DeviceTransport;

/// Device chosen for a run and whether elevated access was obtained
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSession {
    pub device: String,
    pub elevated: bool,
}

/// Check tool and device before any target is processed.
///
/// A missing tool is fatal immediately, and so is a list of several
/// devices: the transport must be pinned to one serial. An empty device list
/// is retried once after the configured delay. Elevated access is only
/// requested when some target can make use of it.
pub async fn preflight(
    transport: &dyn DeviceTransport,
    config: &EngineConfig,
) -> Result<DeviceSession, AcquisitionError> {
    if !transport.is_tool_available().await {
        return Err(AcquisitionError::ToolUnavailable(
            "the device bridge did not answer a version check".to_string(),
        ));
    }

    let device = match first_device(transport).await? {
        Ok(device) => device,
        Err(first) => {
            warn!("No device found ({}); retrying once", first);
            tokio::time::sleep(config.device_retry_delay()).await;
            first_device(transport).await?.map_err(AcquisitionError::NoDevice)?
        }
    };
    info!("Using device {}", device);

    let wants_elevation = config
        .targets
        .iter()
        .any(|t| t.methods.iter().any(|m| m.kind() == MethodKind::DirectCopy));
    let elevated = wants_elevation && transport.attempt_elevated_access().await;
    if wants_elevation && !elevated {
        info!("No elevated access; direct copies will be skipped in favor of fallbacks");
    }

    Ok(DeviceSession { device, elevated })
}

/// Outer error is fatal, inner error is worth one retry
async fn first_device(transport: &dyn DeviceTransport) -> Result<Result<String, String>, AcquisitionError> {
    match transport.list_connected_devices().await {
        Ok(devices) if devices.len() > 1 => Err(AcquisitionError::SeveralDevices(devices)),
        Ok(devices) => Ok(devices
            .into_iter()
            .next()
            .ok_or_else(|| "no authorized device listed".to_string())),
        Err(TransportError::ToolUnavailable(message)) => Err(AcquisitionError::ToolUnavailable(message)),
        Err(e) => Ok(Err(e.to_string())),
    }
}

/// Every attempt made for one target and the artifact that ended the chain
#[derive(Debug, Clone)]
pub struct TargetReport {
    pub kind: ArtifactKind,
    pub attempts: Vec<AcquisitionAttempt>,
    pub artifact: Option<Artifact>,
}

impl TargetReport {
    pub fn succeeded(&self) -> bool {
        self.artifact.is_some()
    }
}

/// Walks each target's fallback chain for one run.
///
/// Methods are tried in priority order until one yields an artifact that
/// passes verification. Every method tried is logged as an attempt, and
/// only case store failures escape as errors.
pub struct StrategySelector<'a> {
    transport: &'a dyn DeviceTransport,
    config: &'a EngineConfig,
    run: &'a CaseRun,
    elevated: bool,
    pub(super) backups: HashMap<String, BackupSlot>,
    permissions: PermissionTracker,
}

impl<'a> StrategySelector<'a> {
    pub fn new(
        transport: &'a dyn DeviceTransport,
        config: &'a EngineConfig,
        run: &'a CaseRun,
        elevated: bool,
    ) -> Self {
        StrategySelector {
            transport,
            config,
            run,
            elevated,
            backups: HashMap::new(),
            permissions: PermissionTracker::new(),
        }
    }

    pub(crate) fn transport(&self) -> &'a dyn DeviceTransport {
        self.transport
    }

    pub(crate) fn config(&self) -> &'a EngineConfig {
        self.config
    }

    pub(crate) fn run(&self) -> &'a CaseRun {
        self.run
    }

    pub fn elevated(&self) -> bool {
        self.elevated
    }

    pub fn permissions(&self) -> &PermissionTracker {
        &self.permissions
    }

    /// Run the fallback chain of one target
    pub async fn acquire_target(&mut self, target: &AcquisitionTarget) -> Result<TargetReport, CaseError> {
        let mut report = TargetReport { kind: target.kind, attempts: Vec::new(), artifact: None };

        for method in target.method_order(self.elevated) {
            let started_at = Utc::now();
            let clock = Instant::now();
            debug!("{}: trying {}", target.kind, method.kind());

            let attempt = match self.execute(target, method).await {
                Err(failure) => {
                    if failure.reason == FailureReason::PermissionDenied {
                        self.permissions.record_permission_failure(target.kind).await;
                    }
                    info!("{}: {} failed ({}): {}", target.kind, method.kind(), failure.reason, failure.detail);
                    AcquisitionAttempt::failed(
                        self.run.run_id(),
                        target.kind,
                        method.kind(),
                        failure.reason,
                        failure.detail,
                        None,
                        started_at,
                        clock.elapsed(),
                    )
                }
                Ok(acquired) => {
                    let (attempt, artifact) = self.commit(target, method, acquired, started_at, clock)?;
                    if artifact.is_usable() {
                        report.artifact = Some(artifact);
                    }
                    attempt
                }
            };

            self.run.record_attempt(&attempt)?;
            let done = attempt.outcome == AttemptOutcome::Success;
            report.attempts.push(attempt);
            if done {
                break;
            }
        }

        if !report.succeeded() {
            warn!("{}: every acquisition method failed", target.kind);
        }
        Ok(report)
    }

    /// Log every method of a target as skipped, e.g. after cancellation
    pub fn skip_target(&self, target: &AcquisitionTarget, detail: &str) -> Result<TargetReport, CaseError> {
        let mut report = TargetReport { kind: target.kind, attempts: Vec::new(), artifact: None };
        for method in target.method_order(self.elevated) {
            let attempt = AcquisitionAttempt::skipped(self.run.run_id(), target.kind, method.kind(), detail);
            self.run.record_attempt(&attempt)?;
            report.attempts.push(attempt);
        }
        Ok(report)
    }

    async fn execute(
        &mut self,
        target: &AcquisitionTarget,
        method: &AcquisitionMethod,
    ) -> Result<Acquired, MethodFailure> {
        match method {
            AcquisitionMethod::DirectCopy => self.direct_copy(target).await,
            AcquisitionMethod::Backup { package, entries, fallback_suffixes } => {
                self.backup(target, package, entries, fallback_suffixes).await
            }
            AcquisitionMethod::ContentQuery { uri } => self.content_query(uri).await,
            AcquisitionMethod::SystemDump { service } => self.system_dump(service).await,
        }
    }

    /// Store acquired bytes, verify them and turn the outcome into an attempt
    fn commit(
        &self,
        target: &AcquisitionTarget,
        method: &AcquisitionMethod,
        acquired: Acquired,
        started_at: chrono::DateTime<Utc>,
        clock: Instant,
    ) -> Result<(AcquisitionAttempt, Artifact), CaseError> {
        let path = self.run.store_artifact(target.kind, &acquired.name, &acquired.data)?;
        let artifact = self.run.commit_artifact(target.kind, method.format(), &path, acquired.provenance)?;

        let attempt = if artifact.is_usable() {
            info!(
                "{}: acquired via {} ({:?}, {} records)",
                target.kind,
                method.kind(),
                artifact.status,
                artifact.findings.record_count
            );
            AcquisitionAttempt::success(
                self.run.run_id(),
                target.kind,
                method.kind(),
                path,
                format!("{:?} with {} records", artifact.status, artifact.findings.record_count),
                started_at,
                clock.elapsed(),
            )
        } else {
            let reason = if artifact.size == 0 {
                FailureReason::EmptyResult
            } else {
                FailureReason::ParseError
            };
            let detail = format!(
                "verification failed: {}",
                artifact.failure.as_deref().unwrap_or("unknown reason")
            );
            warn!("{}: {} output rejected, {}", target.kind, method.kind(), detail);
            AcquisitionAttempt::failed(
                self.run.run_id(),
                target.kind,
                method.kind(),
                reason,
                detail,
                Some(path),
                started_at,
                clock.elapsed(),
            )
        };
        Ok((attempt, artifact))
    }
}
