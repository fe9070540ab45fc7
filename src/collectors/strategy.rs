//! Individual acquisition methods.
//!
//! Each method either hands back raw bytes to be stored in the case or a
//! [`MethodFailure`]. Nothing here writes evidence except the backup path,
//! which keeps the raw container next to the artifacts.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};

use crate::backup::{decode_backup, DecodedBackup};
use crate::collectors::backup_match::select_entry;
use crate::collectors::selector::StrategySelector;
use crate::config::{AcquisitionTarget, MethodKind};
use crate::constants::BACKUP_TIMEOUT_GRACE_SECS;
use crate::error::{FailureReason, TransportError};
use crate::models::{MatchQuality, Provenance};
use crate::security::sanitize_filename;
use crate::utils::content_rows::write_row_lines;

/// Raw output of a successful method, not yet stored
#[derive(Debug, Clone)]
pub(crate) struct Acquired {
    pub name: String,
    pub data: Vec<u8>,
    pub provenance: Provenance,
}

/// Why a method produced nothing usable
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MethodFailure {
    pub reason: FailureReason,
    pub detail: String,
}

impl MethodFailure {
    pub fn new(reason: FailureReason, detail: impl Into<String>) -> Self {
        MethodFailure { reason, detail: detail.into() }
    }
}

impl From<TransportError> for MethodFailure {
    fn from(e: TransportError) -> Self {
        MethodFailure::new(e.reason(), e.to_string())
    }
}

/// Per-package result of the single backup attempted in a run
#[derive(Debug, Clone)]
pub(crate) enum BackupSlot {
    Ready(Arc<DecodedBackup>),
    Unavailable(MethodFailure),
}

impl BackupSlot {
    fn into_result(self) -> Result<Arc<DecodedBackup>, MethodFailure> {
        match self {
            BackupSlot::Ready(decoded) => Ok(decoded),
            BackupSlot::Unavailable(failure) => Err(failure),
        }
    }
}

fn exact(method: MethodKind, source: &str) -> Provenance {
    Provenance {
        method,
        source: source.to_string(),
        match_quality: MatchQuality::Exact,
        note: None,
    }
}

/// Last path component of a device or archive path
fn file_name_of(path: &str) -> &str {
    match path.trim_end_matches('/').rsplit('/').next() {
        Some(name) if !name.is_empty() => name,
        _ => "artifact",
    }
}

/// File name for stored query output, e.g. `call_log_calls.rows.jsonl`
fn query_file_name(uri: &str) -> String {
    let name = uri.trim_start_matches("content://").trim_matches('/').replace('/', "_");
    format!("{}.rows.jsonl", sanitize_filename(&name))
}

/// Most significant reason among the failures of several source locations
fn dominant_reason(failures: &[MethodFailure]) -> FailureReason {
    failures
        .iter()
        .map(|f| f.reason)
        .find(|r| *r != FailureReason::EmptyResult)
        .unwrap_or(FailureReason::EmptyResult)
}

impl StrategySelector<'_> {
    pub(crate) async fn direct_copy(&self, target: &AcquisitionTarget) -> Result<Acquired, MethodFailure> {
        if !self.elevated() {
            return Err(MethodFailure::new(
                FailureReason::PermissionDenied,
                "no elevated access on the device; direct copy not attempted",
            ));
        }

        let mut failures = Vec::new();
        for source in &target.sources {
            match self.transport().copy_file(source).await {
                Ok(data) if !data.is_empty() => {
                    info!("Copied {} ({} bytes)", source, data.len());
                    return Ok(Acquired {
                        name: file_name_of(source).to_string(),
                        data,
                        provenance: exact(MethodKind::DirectCopy, source),
                    });
                }
                Ok(_) => failures.push(MethodFailure::new(
                    FailureReason::EmptyResult,
                    format!("{}: file is empty", source),
                )),
                Err(e) => {
                    debug!("Direct copy of {} failed: {}", source, e);
                    failures.push(MethodFailure::new(e.reason(), format!("{}: {}", source, e)));
                }
            }
        }

        if failures.is_empty() {
            return Err(MethodFailure::new(FailureReason::EmptyResult, "no source locations configured"));
        }
        Err(MethodFailure::new(
            dominant_reason(&failures),
            failures.iter().map(|f| f.detail.as_str()).collect::<Vec<_>>().join("; "),
        ))
    }

    pub(crate) async fn backup(
        &mut self,
        target: &AcquisitionTarget,
        package: &str,
        entries: &[String],
        fallback_suffixes: &[String],
    ) -> Result<Acquired, MethodFailure> {
        let decoded = self.backup_for(package).await?;

        let selection = match select_entry(&decoded.entries, entries, fallback_suffixes, target.kind) {
            Some(selection) => selection,
            None => {
                return Err(match &decoded.error {
                    Some(e) => MethodFailure::new(
                        FailureReason::ParseError,
                        format!(
                            "backup of {} only partly decoded ({}); none of {} recovered entries match",
                            package,
                            e,
                            decoded.entries.len()
                        ),
                    ),
                    None => MethodFailure::new(
                        FailureReason::EmptyResult,
                        format!(
                            "backup of {} holds no entry for {} among {} entries",
                            package,
                            target.kind,
                            decoded.entries.len()
                        ),
                    ),
                })
            }
        };

        let entry = &decoded.entries[selection.index];
        let mut notes: Vec<String> = selection.note.into_iter().collect();
        if let Some(e) = &decoded.error {
            notes.push(format!("backup only partly decoded: {}", e));
        }
        if selection.quality == MatchQuality::Heuristic {
            warn!("{}: using heuristic backup match {}", target.kind, entry.path);
        }

        Ok(Acquired {
            name: file_name_of(&entry.path).to_string(),
            data: entry.data.clone(),
            provenance: Provenance {
                method: MethodKind::Backup,
                source: format!("{}:{}", package, entry.path),
                match_quality: selection.quality,
                note: if notes.is_empty() { None } else { Some(notes.join("; ")) },
            },
        })
    }

    /// Decoded backup of `package`, created at most once per run
    async fn backup_for(&mut self, package: &str) -> Result<Arc<DecodedBackup>, MethodFailure> {
        if let Some(slot) = self.backups.get(package) {
            debug!("Reusing backup of {} from this run", package);
            return slot.clone().into_result();
        }
        let slot = self.create_backup(package).await;
        self.backups.insert(package.to_string(), slot.clone());
        slot.into_result()
    }

    async fn create_backup(&self, package: &str) -> BackupSlot {
        let bound = self.config().backup_timeout();
        let limit = bound + Duration::from_secs(BACKUP_TIMEOUT_GRACE_SECS);
        info!(
            "Requesting backup of {}; confirm it on the device within {}s",
            package,
            bound.as_secs()
        );

        let data = match tokio::time::timeout(limit, self.transport().create_backup(package, bound)).await {
            Err(_) => {
                return BackupSlot::Unavailable(MethodFailure::new(
                    FailureReason::Timeout,
                    format!("no backup of {} within {}s", package, bound.as_secs()),
                ))
            }
            Ok(Err(e)) => return BackupSlot::Unavailable(e.into()),
            Ok(Ok(data)) => data,
        };
        if data.is_empty() {
            return BackupSlot::Unavailable(MethodFailure::new(
                FailureReason::EmptyResult,
                format!("backup of {} is empty", package),
            ));
        }

        match self.run().store_backup(package, &data) {
            Ok(stored) => info!("Kept backup container {} ({} bytes)", stored.path.display(), stored.size),
            Err(e) => warn!("Could not keep backup container of {}: {}", package, e),
        }

        match decode_backup(&data) {
            Ok(decoded) => {
                if let Some(e) = &decoded.error {
                    warn!(
                        "Backup of {} decoded partially: {} ({} entries recovered)",
                        package,
                        e,
                        decoded.entries.len()
                    );
                }
                BackupSlot::Ready(Arc::new(decoded))
            }
            Err(e) => BackupSlot::Unavailable(MethodFailure::new(
                FailureReason::ParseError,
                format!("backup of {} cannot be decoded: {} ({})", package, e, e.remediation_hint()),
            )),
        }
    }

    pub(crate) async fn content_query(&self, uri: &str) -> Result<Acquired, MethodFailure> {
        let rows = self.transport().query_content_provider(uri).await?;
        debug!("{} returned {} rows", uri, rows.len());
        let text = write_row_lines(&rows).map_err(|e| {
            MethodFailure::new(FailureReason::ParseError, format!("rows of {} cannot be stored: {}", uri, e))
        })?;
        Ok(Acquired {
            name: query_file_name(uri),
            data: text.into_bytes(),
            provenance: exact(MethodKind::ContentQuery, uri),
        })
    }

    pub(crate) async fn system_dump(&self, service: &str) -> Result<Acquired, MethodFailure> {
        let text = self.transport().dump_system_service(service).await?;
        if text.trim().is_empty() {
            return Err(MethodFailure::new(
                FailureReason::EmptyResult,
                format!("dump of {} produced no output", service),
            ));
        }
        Ok(Acquired {
            name: format!("dumpsys_{}.txt", sanitize_filename(service)),
            data: text.into_bytes(),
            provenance: exact(MethodKind::SystemDump, service),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_of() {
        assert_eq!(file_name_of("/data/data/com.android.providers.telephony/databases/mmssms.db"), "mmssms.db");
        assert_eq!(file_name_of("apps/com.android.chrome/f/app_chrome/Default/History"), "History");
        assert_eq!(file_name_of("/"), "artifact");
    }

    #[test]
    fn test_query_file_name() {
        assert_eq!(query_file_name("content://sms"), "sms.rows.jsonl");
        assert_eq!(query_file_name("content://call_log/calls"), "call_log_calls.rows.jsonl");
    }

    #[test]
    fn test_dominant_reason_prefers_non_empty_failures() {
        let failures = vec![
            MethodFailure::new(FailureReason::EmptyResult, "a"),
            MethodFailure::new(FailureReason::PermissionDenied, "b"),
        ];
        assert_eq!(dominant_reason(&failures), FailureReason::PermissionDenied);
        assert_eq!(
            dominant_reason(&[MethodFailure::new(FailureReason::EmptyResult, "a")]),
            FailureReason::EmptyResult
        );
    }
}
