use std::fs;
use std::path::Path;

use crate::config::ArtifactKind;
use crate::constants::BINARY_SNIFF_LEN;
use crate::models::StructuralFindings;
use crate::utils::content_rows::{read_row_lines, NO_RESULT};

fn read_text(path: &Path) -> Result<String, String> {
    let bytes = fs::read(path).map_err(|e| format!("cannot read file: {}", e))?;
    let window = &bytes[..bytes.len().min(BINARY_SNIFF_LEN)];
    if window.contains(&0) {
        return Err("binary content where text was expected".to_string());
    }
    String::from_utf8(bytes).map_err(|_| "content is not valid UTF-8 text".to_string())
}

/// Structural check of stored content query output
pub fn check_content_rows(path: &Path) -> Result<StructuralFindings, String> {
    let text = read_text(path)?;
    let mut findings = StructuralFindings::default();

    if text.trim() == NO_RESULT {
        findings.warnings.push("content query returned no rows".to_string());
        return Ok(findings);
    }

    let rows = read_row_lines(&text)?;
    if rows.is_empty() {
        return Err("no content query rows found".to_string());
    }
    findings.record_count = rows.len() as u64;
    Ok(findings)
}

/// Structural check of a system service dump: text with at least one
/// marker line for the kind
pub fn check_text_dump(path: &Path, kind: ArtifactKind) -> Result<StructuralFindings, String> {
    let markers = kind.dump_markers();
    if markers.is_empty() {
        return Err(format!("{} is not acquired from a system dump", kind));
    }

    let text = read_text(path)?;
    let mut findings = StructuralFindings::default();
    for line in text.lines() {
        let mut matched = false;
        for marker in markers {
            if line.contains(marker) {
                matched = true;
                if !findings.markers_found.iter().any(|m| m == marker) {
                    findings.markers_found.push(marker.to_string());
                }
            }
        }
        if matched {
            findings.record_count += 1;
        }
    }

    if findings.markers_found.is_empty() {
        return Err(format!("no recognizable {} dump lines", kind));
    }
    Ok(findings)
}
