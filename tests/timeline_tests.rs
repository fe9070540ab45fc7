//! Timeline construction and export over a case acquired from a scripted
//! device.

mod common;

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use tempfile::TempDir;
use uuid::Uuid;

use android_collector::config::ArtifactKind;
use android_collector::engine::Engine;
use android_collector::models::{MessageDirection, RecordDetail, SourceRef, TimelineRecord};
use android_collector::timeline::sort_records;
use android_collector::transport::DeviceTransport;
use common::{config_for, row, sms_db, sqlite_bytes, ScriptedTransport};

const USAGE_DUMP: &str = "\
Last 24 hour events (timeRange=\"2023-10-05 00:00:00 - 2023-10-06 00:00:00\")
  In-memory daily stats
    packages
      package=com.whatsapp totalTimeUsed=\"00:12:00\" lastTimeUsed=\"2023-10-05 15:00:00\"
";

const PACKAGE_DUMP: &str = "\
Packages:
  Package [com.whatsapp] (1a2b3c):
    versionName=2.23.1
    firstInstallTime=2023-01-01 10:00:00
    installerPackageName=com.android.vending
";

fn webkit_micros(unix_secs: i64) -> i64 {
    (unix_secs + 11_644_473_600) * 1_000_000
}

/// Acquire six kinds from a rooted device into `case_id`
async fn acquired_case(root: &TempDir, case_id: &str) -> Engine {
    let mut transport = ScriptedTransport { elevated: true, ..Default::default() };
    transport.files.insert(
        "/data/data/com.android.providers.telephony/databases/mmssms.db".into(),
        Ok(sms_db(&[
            ("+15550100", 1_696_514_400_000, "see you at the station", 1),
            ("+15550100", 1_696_514_460_000, "ok", 2),
        ])),
    );
    transport.files.insert(
        "/data/data/com.android.chrome/app_chrome/Default/History".into(),
        Ok(sqlite_bytes(&format!(
            "CREATE TABLE urls (id INTEGER PRIMARY KEY, url TEXT, title TEXT, visit_count INTEGER, last_visit_time INTEGER);
             INSERT INTO urls (url, title, visit_count, last_visit_time)
             VALUES ('https://maps.example.com/station', 'Station map', 3, {});",
            webkit_micros(1_696_507_200)
        ))),
    );
    transport.queries.insert(
        "content://call_log/calls".into(),
        Ok(vec![row(&[("number", "+15550111"), ("date", "1696510800000"), ("duration", "65"), ("type", "3")])]),
    );
    transport.queries.insert(
        "content://user_dictionary/words".into(),
        Ok(vec![row(&[("word", "Zanzibar"), ("frequency", "250"), ("locale", "en_US")])]),
    );
    transport.dumps.insert("usagestats".into(), Ok(USAGE_DUMP.to_string()));
    transport.dumps.insert("package".into(), Ok(PACKAGE_DUMP.to_string()));

    let config = config_for(
        root.path(),
        &[
            ArtifactKind::Sms,
            ArtifactKind::CallLog,
            ArtifactKind::BrowserHistory,
            ArtifactKind::UserDictionary,
            ArtifactKind::AppUsage,
            ArtifactKind::InstalledApps,
        ],
    );
    let transport: Arc<dyn DeviceTransport> = Arc::new(transport);
    let engine = Engine::new(transport, config);
    let report = engine.start_acquisition(case_id).unwrap().wait().await.unwrap();
    assert_eq!(report.acquired(), 6);
    engine
}

#[tokio::test]
async fn test_timeline_merges_all_sources_chronologically() {
    let root = TempDir::new().unwrap();
    let engine = acquired_case(&root, "CASE-T1").await;

    let timeline = engine.build_timeline("CASE-T1").unwrap();
    assert!(timeline.warnings.is_empty(), "{:?}", timeline.warnings);
    assert_eq!(timeline.sources.len(), 6);

    let kinds: Vec<ArtifactKind> = timeline.records.iter().map(|r| r.kind).collect();
    assert_eq!(
        kinds,
        vec![
            ArtifactKind::InstalledApps,
            ArtifactKind::BrowserHistory,
            ArtifactKind::CallLog,
            ArtifactKind::Sms,
            ArtifactKind::Sms,
            ArtifactKind::AppUsage,
            ArtifactKind::UserDictionary,
        ]
    );
    assert_eq!(
        timeline.records[1].timestamp,
        Some(Utc.with_ymd_and_hms(2023, 10, 5, 12, 0, 0).unwrap())
    );
    // Dictionary words carry no time and sort last
    assert_eq!(timeline.records[6].timestamp, None);
    assert_eq!(timeline.records[2].summary(), "Missed call +15550111 (65s)");

    let hits = timeline.search("WHATSAPP");
    assert_eq!(hits.len(), 2);
    assert_eq!(timeline.search("station").len(), 2);
}

#[tokio::test]
async fn test_export_is_reproducible() {
    let root = TempDir::new().unwrap();
    let engine = acquired_case(&root, "CASE-T2").await;
    let out = TempDir::new().unwrap();

    let first = engine.export_timeline("CASE-T2", Some(&out.path().join("a.csv"))).unwrap();
    let second = engine.export_timeline("CASE-T2", Some(&out.path().join("b.csv"))).unwrap();
    let a = fs::read_to_string(first).unwrap();
    assert_eq!(a, fs::read_to_string(second).unwrap());

    let lines: Vec<&str> = a.lines().collect();
    assert_eq!(lines[0], "Timestamp,ArtifactKind,Summary");
    assert_eq!(lines.len(), 8);
    assert!(lines[1].starts_with("2023-01-01 10:00:00,"));
    assert!(lines[7].starts_with(","));

    // Without a path the export lands in the case directory and does not
    // disturb the evidence check
    let default = engine.export_timeline("CASE-T2", None).unwrap();
    assert!(default.starts_with(engine.store().case_dir("CASE-T2").unwrap()));
    assert!(engine.verification_report("CASE-T2").unwrap().is_intact());
}

#[tokio::test]
async fn test_modified_artifact_is_left_out() {
    let root = TempDir::new().unwrap();
    let engine = acquired_case(&root, "CASE-T3").await;

    let summary = engine.case_summary("CASE-T3").unwrap();
    let sms: PathBuf = summary
        .artifacts
        .iter()
        .find(|a| a.kind == ArtifactKind::Sms)
        .map(|a| a.path.clone())
        .unwrap();
    let mut bytes = fs::read(&sms).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;
    fs::write(&sms, bytes).unwrap();

    let timeline = engine.build_timeline("CASE-T3").unwrap();
    assert!(timeline.records.iter().all(|r| r.kind != ArtifactKind::Sms));
    assert_eq!(timeline.len(), 5);
    assert!(timeline.warnings.iter().any(|w| w.contains("changed since acquisition")));
    assert_eq!(engine.verification_report("CASE-T3").unwrap().tampered_count(), 1);
}

#[tokio::test]
async fn test_queried_message_bodies_survive_storage() {
    let root = TempDir::new().unwrap();
    let mut transport = ScriptedTransport::default();
    transport.queries.insert(
        "content://sms".into(),
        Ok(vec![
            row(&[("address", "+15550100"), ("body", "see you at 5, type=2 ok"), ("date", "1696514400000"), ("type", "1")]),
            row(&[
                ("address", "+15550100"),
                ("body", "line one\nRow: 7 address=+19999999, body=forged"),
                ("date", "1696514460000"),
                ("type", "2"),
            ]),
        ]),
    );
    let transport: Arc<dyn DeviceTransport> = Arc::new(transport);
    let engine = Engine::new(transport, config_for(root.path(), &[ArtifactKind::Sms]));
    let report = engine.start_acquisition("CASE-T4").unwrap().wait().await.unwrap();
    assert_eq!(report.targets[0].artifact.as_ref().unwrap().findings.record_count, 2);

    let timeline = engine.build_timeline("CASE-T4").unwrap();
    assert_eq!(timeline.len(), 2);
    match &timeline.records[0].detail {
        RecordDetail::Message { body, direction, .. } => {
            assert_eq!(body, "see you at 5, type=2 ok");
            assert_eq!(*direction, MessageDirection::Incoming);
        }
        other => panic!("unexpected record {:?}", other),
    }
    match &timeline.records[1].detail {
        RecordDetail::Message { address, body, .. } => {
            assert_eq!(address, "+15550100");
            assert_eq!(body, "line one\nRow: 7 address=+19999999, body=forged");
        }
        other => panic!("unexpected record {:?}", other),
    }
    assert_eq!(timeline.search("+19999999").len(), 1);
}

fn record(index: usize, timestamp: Option<i64>, kind: ArtifactKind) -> TimelineRecord {
    TimelineRecord {
        timestamp: timestamp.and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
        kind,
        detail: RecordDetail::DictionaryWord { word: index.to_string(), frequency: None, locale: None },
        source: SourceRef { artifact_id: Uuid::nil(), path: PathBuf::from("fixture"), index },
    }
}

proptest! {
    #[test]
    fn prop_sorted_timeline_is_ordered_and_stable(
        items in prop::collection::vec(
            (prop::option::of(1_600_000_000i64..1_600_000_100), 0usize..ArtifactKind::ALL.len()),
            0..60,
        )
    ) {
        let mut records: Vec<TimelineRecord> = items
            .iter()
            .enumerate()
            .map(|(index, (ts, kind))| record(index, *ts, ArtifactKind::ALL[*kind]))
            .collect();
        sort_records(&mut records);

        for pair in records.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            match (a.timestamp, b.timestamp) {
                (Some(x), Some(y)) => prop_assert!(x <= y),
                (None, Some(_)) => prop_assert!(false, "untimed record before a timed one"),
                _ => {}
            }
            if a.timestamp == b.timestamp {
                prop_assert!(a.kind.name() <= b.kind.name());
                if a.kind == b.kind {
                    prop_assert!(a.source.index < b.source.index);
                }
            }
        }
    }
}
