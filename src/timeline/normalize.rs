//! Per-kind mapping of native records to timeline records.

use std::fs;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, warn};

use crate::config::{ArtifactFormat, ArtifactKind};
use crate::models::{Artifact, CallType, MessageDirection, RecordDetail, SourceRef, TimelineRecord};
use crate::timeline::dumps::{parse_package_dump, parse_usage_stats};
use crate::timeline::fields::{
    from_unix_millis, from_unix_secs, from_webkit_micros, read_database_rows, FieldMap,
};
use crate::utils::content_rows::read_row_lines;

type Mapped = (Option<DateTime<Utc>>, RecordDetail);

/// Parse one verified artifact into unsorted timeline records
pub fn normalize_artifact(artifact: &Artifact) -> Result<Vec<TimelineRecord>> {
    let mapped: Vec<(usize, Mapped)> = match artifact.format {
        ArtifactFormat::Database => {
            let (table, rows) = read_database_rows(&artifact.path, artifact.kind)?;
            debug!("{}: {} rows in table {}", artifact.kind, rows.len(), table);
            map_rows(artifact.kind, rows)
        }
        ArtifactFormat::ContentRows => {
            let text = read_text(artifact)?;
            let rows = read_row_lines(&text)
                .map_err(|e| anyhow!("{}: {}", artifact.path.display(), e))?
                .into_iter()
                .map(FieldMap::from_content_row)
                .collect();
            map_rows(artifact.kind, rows)
        }
        ArtifactFormat::TextDump => {
            let text = read_text(artifact)?;
            let records = match artifact.kind {
                ArtifactKind::AppUsage => parse_usage_stats(&text),
                ArtifactKind::InstalledApps => parse_package_dump(&text),
                other => {
                    warn!("No dump parser for {}; {} left out of the timeline", other, artifact.path.display());
                    Vec::new()
                }
            };
            records.into_iter().map(|(index, ts, detail)| (index, (ts, detail))).collect()
        }
    };

    Ok(mapped
        .into_iter()
        .map(|(index, (timestamp, detail))| TimelineRecord {
            timestamp,
            kind: artifact.kind,
            detail,
            source: SourceRef { artifact_id: artifact.id, path: artifact.path.clone(), index },
        })
        .collect())
}

fn read_text(artifact: &Artifact) -> Result<String> {
    let bytes = fs::read(&artifact.path).context(format!("Failed to read {}", artifact.path.display()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn map_rows(kind: ArtifactKind, rows: Vec<FieldMap>) -> Vec<(usize, Mapped)> {
    let total = rows.len();
    let mapped: Vec<(usize, Mapped)> = rows
        .iter()
        .enumerate()
        .filter_map(|(index, row)| map_row(kind, row).map(|m| (index, m)))
        .collect();
    if mapped.len() < total {
        debug!("{}: {} of {} rows had no usable fields", kind, total - mapped.len(), total);
    }
    mapped
}

/// Column names follow the Android providers; the same names appear in
/// content query output for the same data.
fn map_row(kind: ArtifactKind, row: &FieldMap) -> Option<Mapped> {
    match kind {
        ArtifactKind::Sms => {
            let body = row.owned_text(&["body"]).unwrap_or_default();
            let address = row.owned_text(&["address"]).unwrap_or_else(|| "unknown".to_string());
            let direction = MessageDirection::from_code(row.integer(&["type"]).unwrap_or(0));
            let timestamp = row.integer(&["date"]).and_then(from_unix_millis);
            Some((timestamp, RecordDetail::Message { address, body, direction }))
        }
        ArtifactKind::CallLog => {
            let number = row.owned_text(&["number"]).unwrap_or_else(|| "unknown".to_string());
            let timestamp = row.integer(&["date"]).and_then(from_unix_millis);
            Some((
                timestamp,
                RecordDetail::Call {
                    number,
                    duration_secs: row.integer(&["duration"]).unwrap_or(0),
                    call_type: CallType::from_code(row.integer(&["type"]).unwrap_or(0)),
                },
            ))
        }
        ArtifactKind::BrowserHistory => {
            let url = row.owned_text(&["url"])?;
            let timestamp = row.integer(&["last_visit_time"]).and_then(from_webkit_micros);
            Some((
                timestamp,
                RecordDetail::WebVisit {
                    url,
                    title: row.owned_text(&["title"]).unwrap_or_default(),
                    visit_count: row.integer(&["visit_count"]),
                },
            ))
        }
        ArtifactKind::Contacts => {
            let name = row.owned_text(&["display_name", "display_name_alt", "name"])?;
            let timestamp = row
                .integer(&["contact_last_updated_timestamp", "last_time_contacted"])
                .and_then(from_unix_millis);
            Some((timestamp, RecordDetail::Contact { name, number: row.owned_text(&["data1", "number"]) }))
        }
        ArtifactKind::Calendar => {
            let title = row.owned_text(&["title"]).unwrap_or_else(|| "(untitled)".to_string());
            let timestamp = row.integer(&["dtstart"]).and_then(from_unix_millis);
            Some((
                timestamp,
                RecordDetail::CalendarEvent {
                    title,
                    location: row.owned_text(&["eventLocation"]),
                    ends_at: row.integer(&["dtend"]).and_then(from_unix_millis),
                },
            ))
        }
        ArtifactKind::UserDictionary => {
            let word = row.owned_text(&["word"])?;
            Some((
                None,
                RecordDetail::DictionaryWord {
                    word,
                    frequency: row.integer(&["frequency"]),
                    locale: row.owned_text(&["locale"]),
                },
            ))
        }
        ArtifactKind::SharedStorage => {
            let path = row.owned_text(&["_data", "relative_path", "_display_name"])?;
            let timestamp = row.integer(&["date_modified", "date_added"]).and_then(from_unix_secs);
            Some((
                timestamp,
                RecordDetail::StoredFile {
                    path,
                    size: row.integer(&["_size"]),
                    mime_type: row.owned_text(&["mime_type"]),
                },
            ))
        }
        ArtifactKind::AppUsage => {
            let package = row.owned_text(&["package", "package_name"])?;
            let timestamp = row.integer(&["time", "last_time_used"]).and_then(from_unix_millis);
            let event = row.owned_text(&["type", "event"]).unwrap_or_else(|| "event".to_string());
            Some((timestamp, RecordDetail::AppUsage { package, event }))
        }
        ArtifactKind::InstalledApps => {
            let package = row.owned_text(&["package", "package_name"])?;
            let timestamp = row.integer(&["first_install_time"]).and_then(from_unix_millis);
            Some((
                timestamp,
                RecordDetail::InstalledApp {
                    package,
                    version: row.owned_text(&["version_name"]),
                    installer: row.owned_text(&["installer"]),
                    last_updated: row.integer(&["last_update_time"]).and_then(from_unix_millis),
                },
            ))
        }
    }
}
