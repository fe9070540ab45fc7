//! Normalizer and timeline builder.
//!
//! For every artifact kind the most recently acquired usable artifact is
//! parsed into [`TimelineRecord`]s. The records of all kinds are merged
//! into one list ordered by timestamp, with untimed records last. The
//! timeline is always rebuilt from the case as a whole and can be exported
//! as CSV with the columns `Timestamp`, `ArtifactKind`, `Summary`.

use std::cmp::Ordering;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;
use uuid::Uuid;

use crate::case::CaseManifest;
use crate::config::ArtifactKind;
use crate::models::TimelineRecord;
use crate::utils::hash::matches_sha256;

/// Row mapping helpers shared by the kind parsers
pub mod fields;

/// Line-based parsers for system service dumps
pub mod dumps;

mod normalize;

pub use normalize::normalize_artifact;

/// Format of the `Timestamp` column
pub const EXPORT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// An artifact that contributed to the timeline
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct TimelineSource {
    pub kind: ArtifactKind,
    pub artifact_id: Uuid,
    pub path: PathBuf,
    pub records: usize,
}

#[derive(Serialize, Debug, Clone)]
pub struct Timeline {
    pub case_id: String,
    pub generated_at: DateTime<Utc>,
    pub sources: Vec<TimelineSource>,
    pub records: Vec<TimelineRecord>,
    /// Artifacts that could not be used and why
    pub warnings: Vec<String>,
}

/// Timestamp ascending, untimed last, then kind name. The sort is stable
/// so equal records keep their source order.
fn compare_records(a: &TimelineRecord, b: &TimelineRecord) -> Ordering {
    match (a.timestamp, b.timestamp) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.kind.name().cmp(b.kind.name()))
}

pub fn sort_records(records: &mut [TimelineRecord]) {
    records.sort_by(compare_records);
}

impl Timeline {
    /// Normalize the latest usable artifact of each kind in the case
    pub fn build(manifest: &CaseManifest) -> Self {
        let mut records = Vec::new();
        let mut sources = Vec::new();
        let mut warnings = Vec::new();

        for kind in ArtifactKind::ALL {
            let artifact = match manifest.latest_usable_artifact(kind) {
                Some(artifact) => artifact,
                None => continue,
            };

            if let Some(expected) = &artifact.sha256 {
                match matches_sha256(&artifact.path, expected) {
                    Ok(true) => {}
                    Ok(false) => {
                        warnings.push(format!(
                            "{}: {} changed since acquisition; left out",
                            kind,
                            artifact.path.display()
                        ));
                        continue;
                    }
                    Err(e) => {
                        warnings.push(format!("{}: cannot read {}: {}", kind, artifact.path.display(), e));
                        continue;
                    }
                }
            }

            match normalize_artifact(artifact) {
                Ok(parsed) => {
                    sources.push(TimelineSource {
                        kind,
                        artifact_id: artifact.id,
                        path: artifact.path.clone(),
                        records: parsed.len(),
                    });
                    records.extend(parsed);
                }
                Err(e) => warnings.push(format!("{}: {:#}", kind, e)),
            }
        }

        for warning in &warnings {
            warn!("Timeline: {}", warning);
        }
        sort_records(&mut records);
        info!(
            "Timeline for case {}: {} records from {} artifacts",
            manifest.info.case_id,
            records.len(),
            sources.len()
        );

        Timeline {
            case_id: manifest.info.case_id.clone(),
            generated_at: Utc::now(),
            sources,
            records,
            warnings,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records whose summary or text fields contain `needle`, ignoring case
    pub fn search(&self, needle: &str) -> Vec<&TimelineRecord> {
        let needle = needle.to_lowercase();
        self.records
            .iter()
            .filter(|record| {
                record.summary().to_lowercase().contains(&needle)
                    || record
                        .detail
                        .text_fields()
                        .iter()
                        .any(|field| field.to_lowercase().contains(&needle))
            })
            .collect()
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv = csv::Writer::from_writer(writer);
        csv.write_record(["Timestamp", "ArtifactKind", "Summary"])?;
        for record in &self.records {
            let timestamp = record
                .timestamp
                .map(|t| t.format(EXPORT_TIME_FORMAT).to_string())
                .unwrap_or_default();
            csv.write_record([timestamp.as_str(), record.kind.name(), record.summary().as_str()])?;
        }
        csv.flush().context("Failed to flush timeline CSV")?;
        Ok(())
    }

    /// Write the CSV export, replacing any previous file at `path`
    pub fn export_csv(&self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).context(format!("Failed to create {}", dir.display()))?;

        let mut staged = tempfile::NamedTempFile::new_in(&dir)
            .context(format!("Failed to stage timeline export in {}", dir.display()))?;
        self.write_csv(staged.as_file_mut())?;
        staged
            .persist(path)
            .context(format!("Failed to write timeline export to {}", path.display()))?;

        info!("Exported {} timeline records to {}", self.records.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RecordDetail, SourceRef};
    use chrono::TimeZone;

    fn record(kind: ArtifactKind, secs: Option<i64>, label: &str) -> TimelineRecord {
        TimelineRecord {
            timestamp: secs.map(|s| Utc.timestamp_opt(s, 0).unwrap()),
            kind,
            detail: RecordDetail::AppUsage { package: label.into(), event: "event".into() },
            source: SourceRef { artifact_id: Uuid::nil(), path: PathBuf::from("x"), index: 0 },
        }
    }

    fn timeline(records: Vec<TimelineRecord>) -> Timeline {
        Timeline {
            case_id: "CASE".into(),
            generated_at: Utc::now(),
            sources: Vec::new(),
            records,
            warnings: Vec::new(),
        }
    }

    #[test]
    fn test_sort_puts_untimed_last_and_breaks_ties_by_kind() {
        let mut records = vec![
            record(ArtifactKind::Sms, None, "a"),
            record(ArtifactKind::Sms, Some(200), "b"),
            record(ArtifactKind::Contacts, None, "c"),
            record(ArtifactKind::Sms, Some(100), "d"),
            record(ArtifactKind::CallLog, Some(200), "e"),
            record(ArtifactKind::Contacts, None, "f"),
        ];
        sort_records(&mut records);

        let order: Vec<String> = records
            .iter()
            .map(|r| match &r.detail {
                RecordDetail::AppUsage { package, .. } => package.clone(),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(order, vec!["d", "e", "b", "c", "f", "a"]);
    }

    #[test]
    fn test_search_is_case_insensitive() {
        let timeline = timeline(vec![
            record(ArtifactKind::AppUsage, Some(1), "com.WhatsApp"),
            record(ArtifactKind::AppUsage, Some(2), "com.android.settings"),
        ]);
        assert_eq!(timeline.search("whatsapp").len(), 1);
        assert_eq!(timeline.search("COM.").len(), 2);
        assert!(timeline.search("telegram").is_empty());
    }

    #[test]
    fn test_csv_columns_and_replacement() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("timeline.csv");
        fs::write(&path, "stale").unwrap();

        let timeline = timeline(vec![
            record(ArtifactKind::AppUsage, Some(1_700_000_000), "com.whatsapp"),
            record(ArtifactKind::AppUsage, None, "com.untimed, with comma"),
        ]);
        timeline.export_csv(&path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Timestamp,ArtifactKind,Summary");
        assert_eq!(lines[1], "2023-11-14 22:13:20,AppUsage,com.whatsapp: event");
        assert_eq!(lines[2], ",AppUsage,\"com.untimed, with comma: event\"");
    }
}
