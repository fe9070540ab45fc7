//! Test utilities for android-collector
//!
//! Fixture builders shared by the unit tests: small SQLite databases in the
//! layout of the Android providers, and backup containers wrapping them.

#![cfg(test)]

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::backup::{encode_backup, BackupEntry, EncodeOptions};

/// Schema of the provider table used for message fixtures
pub const SMS_SCHEMA: &str =
    "CREATE TABLE sms (_id INTEGER PRIMARY KEY, address TEXT, date INTEGER, body TEXT, type INTEGER);";

/// Create a SQLite database at `dir/name` from a SQL batch
pub fn create_sqlite_db(dir: &Path, name: &str, sql: &str) -> PathBuf {
    let path = dir.join(name);
    let conn = rusqlite::Connection::open(&path).unwrap();
    conn.execute_batch(sql).unwrap();
    drop(conn);
    path
}

/// Bytes of a message database holding `rows` incoming messages, one
/// second apart
pub fn sms_database_bytes(rows: usize) -> Vec<u8> {
    let dir = TempDir::new().unwrap();
    let mut sql = SMS_SCHEMA.to_string();
    for i in 0..rows {
        sql.push_str(&format!(
            "INSERT INTO sms (address, date, body, type) VALUES ('+15550100', {}, 'message {}', 1);",
            1_600_000_000_000i64 + i as i64 * 1000,
            i
        ));
    }
    let path = create_sqlite_db(dir.path(), "mmssms.db", &sql);
    fs::read(path).unwrap()
}

/// Compressed container with the given entries
pub fn backup_container(entries: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let entries: Vec<BackupEntry> = entries
        .iter()
        .map(|(path, data)| BackupEntry { path: path.to_string(), data: data.clone() })
        .collect();
    encode_backup(&entries, EncodeOptions::default()).unwrap()
}

#[test]
fn test_sms_fixture_is_sqlite() {
    let bytes = sms_database_bytes(2);
    assert!(bytes.starts_with(crate::constants::SQLITE_HEADER));
}
