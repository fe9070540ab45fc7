//! Core records written to and read from a case.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{ArtifactFormat, ArtifactKind, MethodKind};
use crate::error::FailureReason;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    Failed,
    Skipped,
}

/// One method tried for one target. Never modified after creation.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AcquisitionAttempt {
    pub run_id: Uuid,
    pub kind: ArtifactKind,
    pub method: MethodKind,
    pub outcome: AttemptOutcome,
    /// Raw output stored in the case, when the method produced any
    pub output_path: Option<PathBuf>,
    pub failure: Option<FailureReason>,
    pub detail: String,
    pub remediation: Option<String>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl AcquisitionAttempt {
    pub fn success(
        run_id: Uuid,
        kind: ArtifactKind,
        method: MethodKind,
        output_path: PathBuf,
        detail: impl Into<String>,
        started_at: DateTime<Utc>,
        elapsed: Duration,
    ) -> Self {
        AcquisitionAttempt {
            run_id,
            kind,
            method,
            outcome: AttemptOutcome::Success,
            output_path: Some(output_path),
            failure: None,
            detail: detail.into(),
            remediation: None,
            started_at,
            duration_ms: elapsed.as_millis() as u64,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn failed(
        run_id: Uuid,
        kind: ArtifactKind,
        method: MethodKind,
        reason: FailureReason,
        detail: impl Into<String>,
        output_path: Option<PathBuf>,
        started_at: DateTime<Utc>,
        elapsed: Duration,
    ) -> Self {
        AcquisitionAttempt {
            run_id,
            kind,
            method,
            outcome: AttemptOutcome::Failed,
            output_path,
            failure: Some(reason),
            detail: detail.into(),
            remediation: Some(reason.remediation_hint().to_string()),
            started_at,
            duration_ms: elapsed.as_millis() as u64,
        }
    }

    pub fn skipped(run_id: Uuid, kind: ArtifactKind, method: MethodKind, detail: impl Into<String>) -> Self {
        AcquisitionAttempt {
            run_id,
            kind,
            method,
            outcome: AttemptOutcome::Skipped,
            output_path: None,
            failure: None,
            detail: detail.into(),
            remediation: None,
            started_at: Utc::now(),
            duration_ms: 0,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationStatus {
    /// Structure valid and data present
    Verified,
    /// Structure valid but no records; usable with a warning
    VerifiedEmpty,
    Failed,
}

impl VerificationStatus {
    pub fn is_usable(&self) -> bool {
        matches!(self, VerificationStatus::Verified | VerificationStatus::VerifiedEmpty)
    }
}

/// What the structural check saw inside an artifact
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct StructuralFindings {
    /// Tables present in a relational artifact
    pub tables_found: Vec<String>,
    /// Required tables that were missing
    pub tables_missing: Vec<String>,
    /// Row counts of the required tables that exist
    pub row_counts: BTreeMap<String, u64>,
    /// Records in a text artifact (rows or marker lines)
    pub record_count: u64,
    pub markers_found: Vec<String>,
    pub warnings: Vec<String>,
}

/// How closely the acquired data matched what was asked for
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchQuality {
    Exact,
    /// Picked by file suffix from a backup because no expected path existed
    Heuristic,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    pub method: MethodKind,
    /// Device path, backup entry, content uri or service name
    pub source: String,
    pub match_quality: MatchQuality,
    pub note: Option<String>,
}

/// An acquired file and the result of verifying it
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Artifact {
    pub id: Uuid,
    pub run_id: Uuid,
    pub kind: ArtifactKind,
    pub format: ArtifactFormat,
    pub path: PathBuf,
    pub size: u64,
    /// SHA-256 of the full content; absent when verification stopped early
    pub sha256: Option<String>,
    pub status: VerificationStatus,
    pub failure: Option<String>,
    pub findings: StructuralFindings,
    pub provenance: Provenance,
    pub acquired_at: DateTime<Utc>,
}

impl Artifact {
    pub fn is_usable(&self) -> bool {
        self.status.is_usable()
    }
}

/// Direction or state of a text message, from the provider's `type` column
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageDirection {
    Incoming,
    Outgoing,
    Draft,
    Outbox,
    Failed,
    Queued,
    Unknown(i64),
}

impl MessageDirection {
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => MessageDirection::Incoming,
            2 => MessageDirection::Outgoing,
            3 => MessageDirection::Draft,
            4 => MessageDirection::Outbox,
            5 => MessageDirection::Failed,
            6 => MessageDirection::Queued,
            other => MessageDirection::Unknown(other),
        }
    }
}

impl fmt::Display for MessageDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageDirection::Unknown(code) => write!(f, "Type {}", code),
            other => write!(f, "{:?}", other),
        }
    }
}

/// Call log `type` column
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallType {
    Incoming,
    Outgoing,
    Missed,
    Voicemail,
    Rejected,
    Blocked,
    AnsweredExternally,
    Unknown(i64),
}

impl CallType {
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => CallType::Incoming,
            2 => CallType::Outgoing,
            3 => CallType::Missed,
            4 => CallType::Voicemail,
            5 => CallType::Rejected,
            6 => CallType::Blocked,
            7 => CallType::AnsweredExternally,
            other => CallType::Unknown(other),
        }
    }
}

impl fmt::Display for CallType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallType::AnsweredExternally => write!(f, "Answered externally"),
            CallType::Unknown(code) => write!(f, "Type {}", code),
            other => write!(f, "{:?}", other),
        }
    }
}

/// Kind-specific content of a timeline record
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum RecordDetail {
    Message {
        address: String,
        body: String,
        direction: MessageDirection,
    },
    Call {
        number: String,
        duration_secs: i64,
        call_type: CallType,
    },
    WebVisit {
        url: String,
        title: String,
        visit_count: Option<i64>,
    },
    Contact {
        name: String,
        number: Option<String>,
    },
    CalendarEvent {
        title: String,
        location: Option<String>,
        ends_at: Option<DateTime<Utc>>,
    },
    DictionaryWord {
        word: String,
        frequency: Option<i64>,
        locale: Option<String>,
    },
    AppUsage {
        package: String,
        event: String,
    },
    InstalledApp {
        package: String,
        version: Option<String>,
        installer: Option<String>,
        last_updated: Option<DateTime<Utc>>,
    },
    StoredFile {
        path: String,
        size: Option<i64>,
        mime_type: Option<String>,
    },
}

impl RecordDetail {
    /// One-line human readable description
    pub fn summary(&self) -> String {
        match self {
            RecordDetail::Message { address, body, direction } => {
                let preposition = match direction {
                    MessageDirection::Incoming => "from",
                    _ => "to",
                };
                format!("{} message {} {}: {}", direction, preposition, address, body)
            }
            RecordDetail::Call { number, duration_secs, call_type } => {
                format!("{} call {} ({}s)", call_type, number, duration_secs)
            }
            RecordDetail::WebVisit { url, title, .. } if title.is_empty() => format!("Visited {}", url),
            RecordDetail::WebVisit { url, title, .. } => format!("Visited {} ({})", title, url),
            RecordDetail::Contact { name, number: Some(number) } => format!("Contact {} {}", name, number),
            RecordDetail::Contact { name, number: None } => format!("Contact {}", name),
            RecordDetail::CalendarEvent { title, location: Some(location), .. } => {
                format!("Event {} at {}", title, location)
            }
            RecordDetail::CalendarEvent { title, location: None, .. } => format!("Event {}", title),
            RecordDetail::DictionaryWord { word, .. } => format!("Dictionary word '{}'", word),
            RecordDetail::AppUsage { package, event } => format!("{}: {}", package, event),
            RecordDetail::InstalledApp { package, version: Some(version), .. } => {
                format!("Installed {} {}", package, version)
            }
            RecordDetail::InstalledApp { package, version: None, .. } => format!("Installed {}", package),
            RecordDetail::StoredFile { path, size: Some(size), .. } => format!("File {} ({} bytes)", path, size),
            RecordDetail::StoredFile { path, size: None, .. } => format!("File {}", path),
        }
    }

    /// Free-text fields, for literal search
    pub fn text_fields(&self) -> Vec<&str> {
        match self {
            RecordDetail::Message { address, body, .. } => vec![address.as_str(), body.as_str()],
            RecordDetail::Call { number, .. } => vec![number.as_str()],
            RecordDetail::WebVisit { url, title, .. } => vec![url.as_str(), title.as_str()],
            RecordDetail::Contact { name, number } => {
                let mut fields = vec![name.as_str()];
                fields.extend(number.as_deref());
                fields
            }
            RecordDetail::CalendarEvent { title, location, .. } => {
                let mut fields = vec![title.as_str()];
                fields.extend(location.as_deref());
                fields
            }
            RecordDetail::DictionaryWord { word, locale, .. } => {
                let mut fields = vec![word.as_str()];
                fields.extend(locale.as_deref());
                fields
            }
            RecordDetail::AppUsage { package, event } => vec![package.as_str(), event.as_str()],
            RecordDetail::InstalledApp { package, version, installer, .. } => {
                let mut fields = vec![package.as_str()];
                fields.extend(version.as_deref());
                fields.extend(installer.as_deref());
                fields
            }
            RecordDetail::StoredFile { path, mime_type, .. } => {
                let mut fields = vec![path.as_str()];
                fields.extend(mime_type.as_deref());
                fields
            }
        }
    }
}

/// Where a timeline record came from
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SourceRef {
    pub artifact_id: Uuid,
    pub path: PathBuf,
    /// Row or block index inside the artifact
    pub index: usize,
}

/// One normalized event. Records without a reliable time keep `timestamp`
/// empty and sort after all timed records.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TimelineRecord {
    pub timestamp: Option<DateTime<Utc>>,
    pub kind: ArtifactKind,
    pub detail: RecordDetail,
    pub source: SourceRef,
}

impl TimelineRecord {
    pub fn summary(&self) -> String {
        self.detail.summary()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_attempt_carries_hint() {
        let attempt = AcquisitionAttempt::failed(
            Uuid::new_v4(),
            ArtifactKind::Sms,
            MethodKind::Backup,
            FailureReason::Timeout,
            "backup not confirmed",
            None,
            Utc::now(),
            Duration::from_millis(1500),
        );
        assert_eq!(attempt.outcome, AttemptOutcome::Failed);
        assert_eq!(attempt.duration_ms, 1500);
        assert_eq!(
            attempt.remediation.as_deref(),
            Some(FailureReason::Timeout.remediation_hint())
        );
    }

    #[test]
    fn test_attempt_json_round_trip() {
        let attempt = AcquisitionAttempt::skipped(Uuid::new_v4(), ArtifactKind::Calendar, MethodKind::DirectCopy, "cancelled");
        let json = serde_json::to_string(&attempt).unwrap();
        let back: AcquisitionAttempt = serde_json::from_str(&json).unwrap();
        assert_eq!(back, attempt);
    }

    #[test]
    fn test_type_codes() {
        assert_eq!(MessageDirection::from_code(2), MessageDirection::Outgoing);
        assert_eq!(MessageDirection::from_code(9), MessageDirection::Unknown(9));
        assert_eq!(CallType::from_code(3), CallType::Missed);
        assert_eq!(CallType::from_code(7).to_string(), "Answered externally");
    }

    #[test]
    fn test_record_summaries() {
        let message = RecordDetail::Message {
            address: "+15550100".into(),
            body: "on my way".into(),
            direction: MessageDirection::Incoming,
        };
        assert_eq!(message.summary(), "Incoming message from +15550100: on my way");

        let visit = RecordDetail::WebVisit { url: "https://example.org/".into(), title: String::new(), visit_count: None };
        assert_eq!(visit.summary(), "Visited https://example.org/");

        let call = RecordDetail::Call { number: "911".into(), duration_secs: 42, call_type: CallType::Outgoing };
        assert_eq!(call.summary(), "Outgoing call 911 (42s)");
    }

    #[test]
    fn test_usable_statuses() {
        assert!(VerificationStatus::Verified.is_usable());
        assert!(VerificationStatus::VerifiedEmpty.is_usable());
        assert!(!VerificationStatus::Failed.is_usable());
    }
}
