//! Shared helpers for the integration tests: a scripted device transport
//! and fixture builders.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use android_collector::backup::{encode_backup, BackupEntry, EncodeOptions};
use android_collector::config::{AcquisitionMethod, AcquisitionTarget, ArtifactKind, EngineConfig};
use android_collector::error::TransportError;
use android_collector::transport::DeviceTransport;
use android_collector::utils::content_rows::ContentRow;

/// Device transport answering from fixed tables. Anything not scripted is
/// reported as an empty result.
pub struct ScriptedTransport {
    pub tool_available: bool,
    pub devices: Vec<String>,
    pub elevated: bool,
    pub files: HashMap<String, Result<Vec<u8>, TransportError>>,
    pub backups: HashMap<String, Result<Vec<u8>, TransportError>>,
    pub queries: HashMap<String, Result<Vec<ContentRow>, TransportError>>,
    pub dumps: HashMap<String, Result<String, TransportError>>,
    pub(crate) calls: Mutex<Vec<String>>,
    pub(crate) cancel_on: Mutex<Option<(String, CancellationToken)>>,
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        ScriptedTransport {
            tool_available: true,
            devices: vec!["emulator-5554".to_string()],
            elevated: false,
            files: HashMap::new(),
            backups: HashMap::new(),
            queries: HashMap::new(),
            dumps: HashMap::new(),
            calls: Mutex::new(Vec::new()),
            cancel_on: Mutex::new(None),
        }
    }
}

impl ScriptedTransport {
    /// Every command issued so far, e.g. `backup com.android.providers.contacts`
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    /// Cancel `token` as soon as a command starting with `call` is issued
    pub fn cancel_on(&self, call: &str, token: CancellationToken) {
        *self.cancel_on.lock().unwrap() = Some((call.to_string(), token));
    }

    fn record(&self, call: String) {
        if let Some((trigger, token)) = self.cancel_on.lock().unwrap().as_ref() {
            if call.starts_with(trigger.as_str()) {
                token.cancel();
            }
        }
        self.calls.lock().unwrap().push(call);
    }
}

fn missing(what: &str) -> TransportError {
    TransportError::EmptyResult(format!("{} not present", what))
}

#[async_trait]
impl DeviceTransport for ScriptedTransport {
    async fn is_tool_available(&self) -> bool {
        self.tool_available
    }

    async fn list_connected_devices(&self) -> Result<Vec<String>, TransportError> {
        self.record("devices".to_string());
        Ok(self.devices.clone())
    }

    async fn attempt_elevated_access(&self) -> bool {
        self.record("root".to_string());
        self.elevated
    }

    async fn copy_file(&self, device_path: &str) -> Result<Vec<u8>, TransportError> {
        self.record(format!("copy {}", device_path));
        self.files.get(device_path).cloned().unwrap_or_else(|| Err(missing(device_path)))
    }

    async fn create_backup(&self, package: &str, _timeout: Duration) -> Result<Vec<u8>, TransportError> {
        self.record(format!("backup {}", package));
        self.backups.get(package).cloned().unwrap_or_else(|| Err(missing(package)))
    }

    async fn query_content_provider(&self, uri: &str) -> Result<Vec<ContentRow>, TransportError> {
        self.record(format!("query {}", uri));
        self.queries.get(uri).cloned().unwrap_or_else(|| Err(missing(uri)))
    }

    async fn dump_system_service(&self, service: &str) -> Result<String, TransportError> {
        self.record(format!("dumpsys {}", service));
        self.dumps.get(service).cloned().unwrap_or_else(|| Err(missing(service)))
    }
}

/// Configuration rooted in `evidence_root` with only the given kinds of the
/// default targets, in the given order
pub fn config_for(evidence_root: &Path, kinds: &[ArtifactKind]) -> EngineConfig {
    let defaults = EngineConfig::default();
    EngineConfig {
        evidence_root: evidence_root.to_path_buf(),
        device_retry_delay_ms: 0,
        targets: kinds
            .iter()
            .filter_map(|kind| defaults.target(*kind).cloned())
            .collect(),
        ..defaults
    }
}

pub fn target(kind: ArtifactKind, sources: &[&str], methods: Vec<AcquisitionMethod>) -> AcquisitionTarget {
    AcquisitionTarget {
        kind,
        sources: sources.iter().map(|s| s.to_string()).collect(),
        methods,
    }
}

pub fn row(fields: &[(&str, &str)]) -> ContentRow {
    fields.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

/// Bytes of a SQLite database built from a SQL batch
pub fn sqlite_bytes(sql: &str) -> Vec<u8> {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("fixture.db");
    let conn = rusqlite::Connection::open(&path).unwrap();
    conn.execute_batch(sql).unwrap();
    drop(conn);
    std::fs::read(&path).unwrap()
}

pub fn sms_db(messages: &[(&str, i64, &str, i64)]) -> Vec<u8> {
    let mut sql = String::from(
        "CREATE TABLE sms (_id INTEGER PRIMARY KEY, address TEXT, date INTEGER, body TEXT, type INTEGER);",
    );
    for (address, date, body, kind) in messages {
        sql.push_str(&format!(
            "INSERT INTO sms (address, date, body, type) VALUES ('{}', {}, '{}', {});",
            address, date, body, kind
        ));
    }
    sqlite_bytes(&sql)
}

pub fn container(entries: &[(&str, Vec<u8>)], compressed: bool) -> Vec<u8> {
    let entries: Vec<BackupEntry> = entries
        .iter()
        .map(|(path, data)| BackupEntry { path: path.to_string(), data: data.clone() })
        .collect();
    encode_backup(&entries, EncodeOptions { compressed, ..EncodeOptions::default() }).unwrap()
}
