//! Path validation for case directories, stored artifact names and
//! extracted backup entries.
//!
//! Case ids and entry names come from the examiner and from device data
//! respectively; neither may be allowed to place files outside the case or
//! extraction directory.

use std::path::{Component, Path, PathBuf};

use anyhow::{anyhow, Result};

use crate::error::CaseError;

const MAX_CASE_ID_LEN: usize = 128;
const MAX_FILENAME_LEN: usize = 180;

/// Accept a case id that can be used as a single directory name.
///
/// Allowed: ASCII letters, digits, `-`, `_` and `.`, not starting with a dot.
pub fn validate_case_id(case_id: &str) -> Result<&str, CaseError> {
    let valid = !case_id.is_empty()
        && case_id.len() <= MAX_CASE_ID_LEN
        && !case_id.starts_with('.')
        && case_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

    if valid {
        Ok(case_id)
    } else {
        Err(CaseError::InvalidCaseId(case_id.to_string()))
    }
}

/// Sanitizes a filename to remove potentially dangerous characters.
///
/// Path separators and characters that are reserved on common filesystems
/// are replaced with `_`; the result is never empty and never only dots.
pub fn sanitize_filename(filename: &str) -> String {
    let mut sanitized = String::with_capacity(filename.len());

    for ch in filename.chars() {
        match ch {
            '/' | '\\' => sanitized.push('_'),
            '\0' => continue,
            '<' | '>' | ':' | '"' | '|' | '?' | '*' => sanitized.push('_'),
            c if c.is_control() => sanitized.push('_'),
            c => sanitized.push(c),
        }
    }

    let mut sanitized = sanitized.trim_matches(|c| c == '.' || c == ' ').to_string();
    if sanitized.is_empty() {
        sanitized = "unnamed".to_string();
    }
    if sanitized.len() > MAX_FILENAME_LEN {
        let mut cut = MAX_FILENAME_LEN;
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized.truncate(cut);
    }
    sanitized
}

/// Relative path under which a backup entry may be extracted.
///
/// Returns `None` for entries that are absolute, climb out with `..`, or
/// have no normal components at all.
pub fn safe_entry_path(entry_path: &str) -> Option<PathBuf> {
    if entry_path.contains('\0') {
        return None;
    }

    let mut relative = PathBuf::new();
    for component in Path::new(&entry_path.replace('\\', "/")).components() {
        match component {
            Component::Normal(name) => relative.push(sanitize_filename(&name.to_string_lossy())),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    if relative.as_os_str().is_empty() {
        None
    } else {
        Some(relative)
    }
}

/// Validates that a path is safe for writing reports or extracted data.
pub fn validate_output_path(path: &Path) -> Result<()> {
    let path_str = path.to_string_lossy().to_lowercase();

    let dangerous_paths = [
        "/etc",
        "/sys",
        "/proc",
        "/dev",
        "/boot",
        "c:\\windows",
        "c:\\program files",
        "c:\\programdata",
        "/system",
        "/library",
        "/usr",
    ];

    for dangerous in dangerous_paths {
        if path_str.starts_with(dangerous) {
            return Err(anyhow!(
                "Cannot write to system directory: {}",
                path.display()
            ));
        }
    }

    if let Some(parent) = path.parent() {
        if parent.exists() && parent.metadata()?.permissions().readonly() {
            return Err(anyhow!("Output directory is read-only: {}", parent.display()));
        }
    }

    Ok(())
}
