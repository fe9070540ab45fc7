//! Case and evidence store.
//!
//! Each case is one directory under the evidence root:
//!
//! ```text
//! <evidence_root>/<case_id>/
//!   case.json               written once when the case is created
//!   case_log.jsonl          append-only event log
//!   artifacts/<Kind>/<run-stamp>_<name>
//!   backups/<run-stamp>_<package>.ab
//!   timeline.csv            latest exported timeline
//!   .acquisition.lock       present while a run is active
//! ```
//!
//! Nothing under `artifacts/` or `backups/` is ever rewritten. The case
//! state (runs, attempts, artifacts) is rebuilt by replaying the log.

mod events;
mod report;
mod store;
mod summary;

pub use events::{CaseEvent, CaseInfo, CaseManifest, RunRecord, RunStatus, StoredBackup};
pub use report::{ArtifactCheck, BackupCheck, IntegrityState, VerificationReport};
pub use store::{Case, CaseRun, CaseStore};
pub use summary::{CaseSummary, SummaryNote, TargetOutcome, TargetStatus};
