use std::fs::File;
use std::io::Read;
use std::path::Path;

use log::debug;
use rusqlite::{Connection, OpenFlags};

use crate::config::ArtifactKind;
use crate::constants::SQLITE_HEADER;
use crate::models::StructuralFindings;

/// Open an acquired database without writing anything next to it.
///
/// The `immutable` URI parameter keeps SQLite from creating journal or
/// shared-memory files in the case directory.
pub fn open_evidence_db(path: &Path) -> rusqlite::Result<Connection> {
    let uri = format!("file:{}?immutable=1", uri_escape(path));
    Connection::open_with_flags(
        uri,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
}

fn uri_escape(path: &Path) -> String {
    let raw = path.to_string_lossy().replace('\\', "/");
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '%' => escaped.push_str("%25"),
            '?' => escaped.push_str("%3f"),
            '#' => escaped.push_str("%23"),
            _ => escaped.push(c),
        }
    }
    // Windows drive paths need an empty authority
    if escaped.as_bytes().get(1) == Some(&b':') {
        escaped.insert_str(0, "///");
    }
    escaped
}

/// Quote an identifier for interpolation into SQL
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Structural check of a relational artifact.
///
/// Returns the findings, or the reason the file cannot be trusted. Zero rows
/// in every required table is reported as a warning, not an error.
pub fn check_database(path: &Path, kind: ArtifactKind) -> Result<StructuralFindings, String> {
    let required = kind.required_tables();
    if required.is_empty() {
        return Err(format!("{} has no relational schema", kind));
    }

    let mut header = [0u8; 16];
    let mut file = File::open(path).map_err(|e| format!("cannot open file: {}", e))?;
    if file.read_exact(&mut header).is_err() || &header[..] != SQLITE_HEADER {
        return Err("not a SQLite database".to_string());
    }

    let conn = open_evidence_db(path).map_err(|e| format!("database cannot be opened: {}", e))?;

    let integrity: String = conn
        .query_row("PRAGMA quick_check", [], |row| row.get(0))
        .map_err(|e| format!("database is corrupt: {}", e))?;
    if integrity != "ok" {
        return Err(format!("database integrity check failed: {}", integrity));
    }

    let tables = list_tables(&conn).map_err(|e| format!("cannot read schema: {}", e))?;
    let mut findings = StructuralFindings {
        tables_found: tables.clone(),
        ..StructuralFindings::default()
    };

    for wanted in required {
        match tables.iter().find(|t| t.eq_ignore_ascii_case(wanted)) {
            Some(actual) => {
                let sql = format!("SELECT COUNT(*) FROM {}", quote_identifier(actual));
                let count: i64 = conn
                    .query_row(&sql, [], |row| row.get(0))
                    .map_err(|e| format!("cannot count rows of {}: {}", actual, e))?;
                findings.row_counts.insert(actual.clone(), count.max(0) as u64);
            }
            None => findings.tables_missing.push(wanted.to_string()),
        }
    }

    if findings.row_counts.is_empty() {
        return Err(format!("none of the expected tables ({}) present", required.join(", ")));
    }

    findings.record_count = findings.row_counts.values().sum();
    if findings.record_count == 0 {
        findings.warnings.push("expected tables contain no rows".to_string());
    }
    for missing in &findings.tables_missing {
        findings.warnings.push(format!("table {} missing", missing));
    }

    debug!("{}: tables {:?}, rows {:?}", path.display(), findings.tables_found, findings.row_counts);
    Ok(findings)
}

fn list_tables(conn: &Connection) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")?;
    let names = stmt.query_map([], |row| row.get::<_, String>(0))?;
    names.collect()
}
