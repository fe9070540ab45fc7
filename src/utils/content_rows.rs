//! Content provider query results.
//!
//! The device query tool prints rows as
//!
//! ```text
//! Row: 0 _id=1, address=+15551234, body=hello
//! Row: 1 _id=2, address=+15559876, body=multi
//! line body
//! ```
//!
//! which is ambiguous once a value contains `, key=` or a line starting with
//! `Row: `. [`parse_content_rows`] reads that output as well as it can; rows
//! kept in a case use the row-line form instead: one JSON object per line,
//! or the single line `No result found.` for an empty result.

use std::collections::BTreeMap;

use lazy_static::lazy_static;
use regex::Regex;

/// One row of a content query, column name to printed value
pub type ContentRow = BTreeMap<String, String>;

pub const ROW_PREFIX: &str = "Row: ";
pub const NO_RESULT: &str = "No result found.";

lazy_static! {
    static ref FIELD_START: Regex = Regex::new(r"(?:^|, )([A-Za-z_][A-Za-z0-9_]*)=").unwrap();
}

/// Render rows as row lines for storage
pub fn write_row_lines(rows: &[ContentRow]) -> Result<String, serde_json::Error> {
    if rows.is_empty() {
        return Ok(format!("{}\n", NO_RESULT));
    }
    let mut out = String::new();
    for row in rows {
        out.push_str(&serde_json::to_string(row)?);
        out.push('\n');
    }
    Ok(out)
}

/// Read stored row lines back. Blank lines are skipped; any other line that
/// is not a JSON object of string values is an error naming the line.
pub fn read_row_lines(text: &str) -> Result<Vec<ContentRow>, String> {
    if text.trim() == NO_RESULT {
        return Ok(Vec::new());
    }
    let mut rows = Vec::new();
    for (number, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let row: ContentRow =
            serde_json::from_str(line).map_err(|e| format!("line {} is not a stored row: {}", number + 1, e))?;
        rows.push(row);
    }
    Ok(rows)
}

/// Parse query tool output back into rows. Unrecognized leading lines are ignored.
pub fn parse_content_rows(text: &str) -> Vec<ContentRow> {
    let mut raw_rows: Vec<String> = Vec::new();
    for line in text.lines() {
        if let Some(rest) = line.strip_prefix(ROW_PREFIX) {
            let fields = match rest.split_once(' ') {
                Some((index, fields)) if index.chars().all(|c| c.is_ascii_digit()) => fields,
                _ => "",
            };
            raw_rows.push(fields.to_string());
        } else if let Some(current) = raw_rows.last_mut() {
            current.push('\n');
            current.push_str(line);
        }
    }
    raw_rows.iter().map(|raw| parse_fields(raw)).collect()
}

fn parse_fields(raw: &str) -> ContentRow {
    let mut row = ContentRow::new();
    let starts: Vec<(usize, usize, String)> = FIELD_START
        .captures_iter(raw)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let key = caps.get(1)?;
            Some((whole.start(), whole.end(), key.as_str().to_string()))
        })
        .collect();

    for (i, (_, value_start, key)) in starts.iter().enumerate() {
        let value_end = starts.get(i + 1).map(|(next_start, _, _)| *next_start).unwrap_or(raw.len());
        row.insert(key.clone(), raw[*value_start..value_end].to_string());
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> ContentRow {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_parse_device_output() {
        let text = "Row: 0 _id=1, address=+15551234, body=hi there, date=1700000000000\n\
                    Row: 1 _id=2, address=NULL, body=second, date=1700000001000\n";
        let rows = parse_content_rows(text);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["body"], "hi there");
        assert_eq!(rows[0]["date"], "1700000000000");
        assert_eq!(rows[1]["address"], "NULL");
    }

    #[test]
    fn test_multiline_values_are_continued() {
        let text = "Row: 0 _id=7, body=first line\nsecond line, date=5\nRow: 1 _id=8, body=x, date=6\n";
        let rows = parse_content_rows(text);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["body"], "first line\nsecond line");
        assert_eq!(rows[0]["date"], "5");
    }

    #[test]
    fn test_row_lines_keep_awkward_values() {
        let rows = vec![
            row(&[("body", "see you at 5, type=2 ok"), ("type", "1")]),
            row(&[("body", "line one\nRow: 7 address=+19999999, body=forged"), ("type", "2")]),
            row(&[("body", ""), ("address", "No result found.")]),
        ];
        let text = write_row_lines(&rows).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert_eq!(read_row_lines(&text).unwrap(), rows);
    }

    #[test]
    fn test_empty_result() {
        let text = write_row_lines(&[]).unwrap();
        assert_eq!(text.trim(), NO_RESULT);
        assert!(read_row_lines(&text).unwrap().is_empty());
        assert!(parse_content_rows(&text).is_empty());
    }

    #[test]
    fn test_unreadable_row_line() {
        let err = read_row_lines("{\"word\":\"hello\"}\nRow: 1 word=there\n").unwrap_err();
        assert!(err.starts_with("line 2 "), "{}", err);
        assert!(read_row_lines("{\"frequency\":250}\n").is_err());
    }
}
