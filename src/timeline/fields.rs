//! Uniform access to rows from databases and content queries.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use rusqlite::types::ValueRef;

use crate::config::ArtifactKind;
use crate::constants::{DUMPSYS_TIME_FORMAT, WEBKIT_EPOCH_OFFSET_SECS};
use crate::utils::content_rows::ContentRow;
use crate::verifier::open_evidence_db;
use crate::verifier::sqlite::quote_identifier;

/// Column values of one row rendered as text. NULLs are left out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMap(BTreeMap<String, String>);

impl FieldMap {
    /// Content query output prints SQL NULL as the literal `NULL`
    pub fn from_content_row(row: ContentRow) -> Self {
        FieldMap(row.into_iter().filter(|(_, v)| v != "NULL").collect())
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<String>) {
        self.0.insert(column.into(), value.into());
    }

    /// First non-blank value among `columns`
    pub fn text(&self, columns: &[&str]) -> Option<&str> {
        columns
            .iter()
            .filter_map(|c| self.0.get(*c))
            .map(|v| v.as_str())
            .find(|v| !v.trim().is_empty())
    }

    pub fn owned_text(&self, columns: &[&str]) -> Option<String> {
        self.text(columns).map(str::to_string)
    }

    pub fn integer(&self, columns: &[&str]) -> Option<i64> {
        let raw = self.text(columns)?.trim();
        raw.parse::<i64>()
            .ok()
            .or_else(|| raw.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64))
    }
}

/// Rows of the first table from the kind's required tables present in the
/// database, with the table's name
pub fn read_database_rows(path: &Path, kind: ArtifactKind) -> Result<(String, Vec<FieldMap>)> {
    let conn = open_evidence_db(path).context(format!("Failed to open {}", path.display()))?;

    let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type = 'table'")?;
    let tables: Vec<String> = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<_>>()?;

    let table = match kind
        .required_tables()
        .iter()
        .find_map(|wanted| tables.iter().find(|t| t.eq_ignore_ascii_case(wanted)))
    {
        Some(table) => table.clone(),
        None => bail!("{} holds none of the tables expected for {}", path.display(), kind),
    };

    let sql = format!("SELECT * FROM {}", quote_identifier(&table));
    let mut stmt = conn.prepare(&sql).context(format!("Failed to query table {}", table))?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut fields = FieldMap::default();
        for (index, column) in columns.iter().enumerate() {
            let value = match row.get_ref(index)? {
                ValueRef::Null | ValueRef::Blob(_) => continue,
                ValueRef::Integer(i) => i.to_string(),
                ValueRef::Real(f) => f.to_string(),
                ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
            };
            fields.insert(column.as_str(), value);
        }
        out.push(fields);
    }
    Ok((table, out))
}

pub fn from_unix_millis(value: i64) -> Option<DateTime<Utc>> {
    if value <= 0 {
        return None;
    }
    Utc.timestamp_millis_opt(value).single()
}

pub fn from_unix_secs(value: i64) -> Option<DateTime<Utc>> {
    if value <= 0 {
        return None;
    }
    Utc.timestamp_opt(value, 0).single()
}

/// Browser visit times count microseconds from 1601-01-01
pub fn from_webkit_micros(value: i64) -> Option<DateTime<Utc>> {
    if value <= 0 {
        return None;
    }
    let secs = value.div_euclid(1_000_000) - WEBKIT_EPOCH_OFFSET_SECS;
    let nanos = (value.rem_euclid(1_000_000) * 1_000) as u32;
    Utc.timestamp_opt(secs, nanos).single()
}

/// Wall-clock time printed by system dumps, taken as UTC
pub fn parse_dump_time(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value.trim(), DUMPSYS_TIME_FORMAT)
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}
