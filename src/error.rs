//! Error taxonomy shared by the acquisition engine.
//!
//! Method-level problems are expressed as [`FailureReason`] and never leave
//! the strategy selector; only [`AcquisitionError`] terminates a run. Every
//! error carries a short remediation hint for the presentation layer.

use std::io;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fixed taxonomy used in the attempt log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureReason {
    ToolUnavailable,
    DeviceUnreachable,
    PermissionDenied,
    Timeout,
    EmptyResult,
    ParseError,
}

impl FailureReason {
    pub fn remediation_hint(&self) -> &'static str {
        match self {
            FailureReason::ToolUnavailable => "install Android platform-tools and make sure adb is on PATH",
            FailureReason::DeviceUnreachable => "reconnect the device with a data cable and authorize USB debugging",
            FailureReason::PermissionDenied => "root access is required for direct copy; fall back to backup or content queries",
            FailureReason::Timeout => "unlock the device and approve the backup prompt before the wait bound expires",
            FailureReason::EmptyResult => "the data source is absent or empty on this device",
            FailureReason::ParseError => "the acquired data is corrupt or in an unexpected format",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::ToolUnavailable => write!(f, "tool unavailable"),
            FailureReason::DeviceUnreachable => write!(f, "device unreachable"),
            FailureReason::PermissionDenied => write!(f, "permission denied"),
            FailureReason::Timeout => write!(f, "timeout"),
            FailureReason::EmptyResult => write!(f, "empty result"),
            FailureReason::ParseError => write!(f, "parse error"),
        }
    }
}

/// Errors reported by the device transport collaborator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("acquisition tool unavailable: {0}")]
    ToolUnavailable(String),

    #[error("device unreachable: {0}")]
    DeviceUnreachable(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("empty result: {0}")]
    EmptyResult(String),

    #[error("unexpected tool output: {0}")]
    Protocol(String),
}

impl TransportError {
    /// Map onto the attempt log taxonomy
    pub fn reason(&self) -> FailureReason {
        match self {
            TransportError::ToolUnavailable(_) => FailureReason::ToolUnavailable,
            TransportError::DeviceUnreachable(_) => FailureReason::DeviceUnreachable,
            TransportError::PermissionDenied(_) => FailureReason::PermissionDenied,
            TransportError::Timeout(_) => FailureReason::Timeout,
            TransportError::EmptyResult(_) => FailureReason::EmptyResult,
            TransportError::Protocol(_) => FailureReason::ParseError,
        }
    }
}

/// Errors produced while decoding a backup container
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("invalid backup magic")]
    InvalidMagic,

    #[error("backup header truncated")]
    TruncatedHeader,

    #[error("unsupported backup version {0}")]
    UnsupportedVersion(u32),

    #[error("unsupported compression flag {0}")]
    UnsupportedCompression(u32),

    #[error("encrypted backups are not supported (encryption: {0})")]
    Encrypted(String),

    #[error("backup stream truncated inside entry {path}")]
    Truncated { path: String },

    #[error("entry {path} declares {size} bytes, above the decoder limit")]
    EntryTooLarge { path: String, size: u64 },

    #[error("corrupt archive data: {0}")]
    Corrupt(String),
}

impl DecodeError {
    pub fn remediation_hint(&self) -> &'static str {
        match self {
            DecodeError::InvalidMagic | DecodeError::TruncatedHeader => {
                "the file is not a device backup container"
            }
            DecodeError::UnsupportedVersion(_) | DecodeError::UnsupportedCompression(_) => {
                "the backup was produced by an unsupported Android release"
            }
            DecodeError::Encrypted(_) => "repeat the backup without setting a backup password",
            DecodeError::Truncated { .. } | DecodeError::EntryTooLarge { .. } | DecodeError::Corrupt(_) => {
                "the backup was interrupted; repeat it and keep the device unlocked"
            }
        }
    }
}

impl From<DecodeError> for FailureReason {
    fn from(_: DecodeError) -> Self {
        FailureReason::ParseError
    }
}

/// Errors raised by the case store
#[derive(Debug, Error)]
pub enum CaseError {
    #[error("invalid case id '{0}'")]
    InvalidCaseId(String),

    #[error("case '{0}' does not exist")]
    NotFound(String),

    #[error("an acquisition run is already active for case '{0}'")]
    RunInProgress(String),

    #[error("case log is corrupt at line {line}: {details}")]
    CorruptLog { line: usize, details: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CaseError {
    pub fn remediation_hint(&self) -> &'static str {
        match self {
            CaseError::InvalidCaseId(_) => "use letters, digits, '-', '_' or '.' for case ids",
            CaseError::NotFound(_) => "run an acquisition for the case first",
            CaseError::RunInProgress(_) => "wait for the active run to finish or cancel it",
            CaseError::CorruptLog { .. } => "the case log was modified outside the engine; treat the case as tampered",
            CaseError::Io(_) | CaseError::Serialization(_) => "check free space and permissions of the evidence directory",
        }
    }
}

/// Conditions that invalidate a whole acquisition run
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("acquisition tool unavailable: {0}")]
    ToolUnavailable(String),

    #[error("no device detected: {0}")]
    NoDevice(String),

    #[error("{} devices attached ({}); choose one by serial", .0.len(), .0.join(", "))]
    SeveralDevices(Vec<String>),

    #[error("case store failure: {0}")]
    Case(#[from] CaseError),

    #[error("acquisition task aborted: {0}")]
    Aborted(String),
}

impl AcquisitionError {
    pub fn remediation_hint(&self) -> &'static str {
        match self {
            AcquisitionError::ToolUnavailable(_) => FailureReason::ToolUnavailable.remediation_hint(),
            AcquisitionError::NoDevice(_) => FailureReason::DeviceUnreachable.remediation_hint(),
            AcquisitionError::SeveralDevices(_) => "pass --serial to pick the device to acquire from",
            AcquisitionError::Case(e) => e.remediation_hint(),
            AcquisitionError::Aborted(_) => "inspect the log output of the engine",
        }
    }
}
