//! Parsers for system service dumps.
//!
//! Dumps are free text meant for humans, so parsing is line based and
//! forgiving: anything that does not look like a record is skipped.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;

use crate::models::RecordDetail;
use crate::timeline::fields::parse_dump_time;

lazy_static! {
    static ref USAGE_PACKAGE: Regex = Regex::new(r"(?:^|\s)package=([A-Za-z0-9_.]+)").unwrap();
    static ref USAGE_TIME: Regex = Regex::new(r#"(?:^|\s)time="([^"]+)""#).unwrap();
    static ref USAGE_TYPE: Regex = Regex::new(r"(?:^|\s)type=([A-Za-z_]+)").unwrap();
    static ref LAST_TIME_USED: Regex = Regex::new(r#"lastTimeUsed="([^"]+)""#).unwrap();
    static ref TOTAL_TIME_USED: Regex = Regex::new(r#"totalTimeUsed="([^"]+)""#).unwrap();
    static ref PACKAGE_HEADER: Regex = Regex::new(r"^\s*Package \[([^\]]+)\]").unwrap();
    static ref VERSION_NAME: Regex = Regex::new(r"^\s*versionName=(\S+)").unwrap();
    static ref FIRST_INSTALL: Regex = Regex::new(r"^\s*firstInstallTime=(.+)$").unwrap();
    static ref LAST_UPDATE: Regex = Regex::new(r"^\s*lastUpdateTime=(.+)$").unwrap();
    static ref INSTALLER: Regex = Regex::new(r"^\s*installerPackageName=(\S+)").unwrap();
}

/// A parsed dump entry and the line it starts on
pub type DumpRecord = (usize, Option<DateTime<Utc>>, RecordDetail);

fn capture<'t>(re: &Regex, line: &'t str) -> Option<&'t str> {
    re.captures(line).and_then(|c| c.get(1)).map(|m| m.as_str().trim())
}

/// Usage events and per-package statistics from a usage stats dump
pub fn parse_usage_stats(text: &str) -> Vec<DumpRecord> {
    let mut records = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let package = match capture(&USAGE_PACKAGE, line) {
            Some(package) => package,
            None => continue,
        };

        let (timestamp, event) = if let Some(time) = capture(&USAGE_TIME, line) {
            let event = capture(&USAGE_TYPE, line).unwrap_or("event").to_string();
            (parse_dump_time(time), event)
        } else if let Some(last_used) = capture(&LAST_TIME_USED, line) {
            let event = match capture(&TOTAL_TIME_USED, line) {
                Some(total) => format!("last used, {} in foreground", total),
                None => "last used".to_string(),
            };
            (parse_dump_time(last_used), event)
        } else {
            continue;
        };

        records.push((index, timestamp, RecordDetail::AppUsage { package: package.to_string(), event }));
    }
    records
}

#[derive(Default)]
struct PackageBlock {
    line: usize,
    package: String,
    version: Option<String>,
    installer: Option<String>,
    first_install: Option<DateTime<Utc>>,
    last_update: Option<DateTime<Utc>>,
}

impl PackageBlock {
    fn into_record(self) -> DumpRecord {
        (
            self.line,
            self.first_install,
            RecordDetail::InstalledApp {
                package: self.package,
                version: self.version,
                installer: self.installer.filter(|i| i != "null"),
                last_updated: self.last_update,
            },
        )
    }
}

/// One record per package block of a package manager dump, timed by the
/// first install time. Later blocks for an already seen package are ignored.
pub fn parse_package_dump(text: &str) -> Vec<DumpRecord> {
    let mut records = Vec::new();
    let mut seen = HashSet::new();
    let mut current: Option<PackageBlock> = None;

    for (index, line) in text.lines().enumerate() {
        if let Some(package) = capture(&PACKAGE_HEADER, line) {
            if let Some(block) = current.take() {
                records.push(block.into_record());
            }
            if seen.insert(package.to_string()) {
                current = Some(PackageBlock { line: index, package: package.to_string(), ..Default::default() });
            }
            continue;
        }

        let block = match current.as_mut() {
            Some(block) => block,
            None => continue,
        };
        if !line.is_empty() && !line.starts_with(char::is_whitespace) {
            // Unindented line: the package section is over
            if let Some(block) = current.take() {
                records.push(block.into_record());
            }
            continue;
        }

        if let Some(version) = capture(&VERSION_NAME, line) {
            block.version = Some(version.to_string());
        } else if let Some(time) = capture(&FIRST_INSTALL, line) {
            block.first_install = parse_dump_time(time);
        } else if let Some(time) = capture(&LAST_UPDATE, line) {
            block.last_update = parse_dump_time(time);
        } else if let Some(installer) = capture(&INSTALLER, line) {
            block.installer = Some(installer.to_string());
        }
    }

    if let Some(block) = current {
        records.push(block.into_record());
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;

    const USAGE: &str = "\
Last 24 hour events (timeRange=\"2023-10-05 00:00:00 - 2023-10-06 00:00:00\")
  In-memory daily stats
    packages
      package=com.whatsapp totalTimeUsed=\"01:02:03\" lastTimeUsed=\"2023-10-05 14:00:00\"
    events
      time=\"2023-10-05 14:22:01\" type=ACTIVITY_RESUMED package=com.whatsapp class=com.whatsapp.Main
      time=\"not a time\" type=SCREEN_INTERACTIVE package=android
";

    const PACKAGES: &str = "\
Packages:
  Package [com.whatsapp] (1a2b3c):
    userId=10123
    versionName=2.23.1
    firstInstallTime=2023-01-01 10:00:00
    lastUpdateTime=2023-06-01 09:00:00
    installerPackageName=com.android.vending
  Package [com.android.settings] (4d5e6f):
    versionName=14
    installerPackageName=null

Hidden system packages:
  Package [com.whatsapp] (777):
    versionName=1.0
";

    #[test]
    fn test_usage_stats() {
        let records = parse_usage_stats(USAGE);
        assert_eq!(records.len(), 3);

        let (_, timestamp, detail) = &records[0];
        assert_eq!(timestamp.unwrap().to_rfc3339(), "2023-10-05T14:00:00+00:00");
        assert_eq!(
            detail,
            &RecordDetail::AppUsage {
                package: "com.whatsapp".into(),
                event: "last used, 01:02:03 in foreground".into()
            }
        );

        let (line, timestamp, detail) = &records[1];
        assert_eq!(*line, 5);
        assert!(timestamp.is_some());
        assert_eq!(detail.summary(), "com.whatsapp: ACTIVITY_RESUMED");

        // Unparsable times keep the record without a timestamp
        assert_eq!(records[2].1, None);
    }

    #[test]
    fn test_package_dump() {
        let records = parse_package_dump(PACKAGES);
        assert_eq!(records.len(), 2);

        let (_, installed, detail) = &records[0];
        assert_eq!(installed.unwrap().to_rfc3339(), "2023-01-01T10:00:00+00:00");
        match detail {
            RecordDetail::InstalledApp { package, version, installer, last_updated } => {
                assert_eq!(package, "com.whatsapp");
                assert_eq!(version.as_deref(), Some("2.23.1"));
                assert_eq!(installer.as_deref(), Some("com.android.vending"));
                assert!(last_updated.is_some());
            }
            other => panic!("unexpected detail {:?}", other),
        }

        let (_, installed, detail) = &records[1];
        assert_eq!(*installed, None);
        assert_eq!(detail.summary(), "Installed com.android.settings 14");
    }
}
