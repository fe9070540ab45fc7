//! Artifact verification.
//!
//! Every acquired file goes through the same checks, in order, stopping at
//! the first failure:
//!
//! 1. the path is a regular file
//! 2. the file is not empty
//! 3. a structural check for its format (SQLite schema, query rows, dump markers)
//! 4. a SHA-256 digest over the full content
//!
//! A failed check yields [`VerificationStatus::Failed`] with the reason and
//! no digest. A valid file without records is `VerifiedEmpty`.

use std::fs;
use std::path::Path;

use log::{debug, warn};
use serde::Serialize;

use crate::config::{ArtifactFormat, ArtifactKind};
use crate::models::{StructuralFindings, VerificationStatus};
use crate::utils::hash::calculate_sha256;

pub mod sqlite;
mod text;

pub use sqlite::open_evidence_db;

/// Result of verifying one file
#[derive(Debug, Clone, Serialize)]
pub struct Verification {
    pub status: VerificationStatus,
    pub size: u64,
    pub sha256: Option<String>,
    pub findings: StructuralFindings,
    pub failure: Option<String>,
}

impl Verification {
    fn failed(size: u64, reason: impl Into<String>) -> Self {
        Verification {
            status: VerificationStatus::Failed,
            size,
            sha256: None,
            findings: StructuralFindings::default(),
            failure: Some(reason.into()),
        }
    }

    pub fn is_usable(&self) -> bool {
        self.status.is_usable()
    }
}

/// Verify a file expected to hold `kind` data in `format`
pub fn verify_artifact(path: &Path, kind: ArtifactKind, format: ArtifactFormat) -> Verification {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(_) => return Verification::failed(0, "file not found"),
    };
    if !metadata.file_type().is_file() {
        return Verification::failed(0, "not a regular file");
    }

    let size = metadata.len();
    if size == 0 {
        return Verification::failed(0, "empty file");
    }

    let structure = match format {
        ArtifactFormat::Database => sqlite::check_database(path, kind),
        ArtifactFormat::ContentRows => text::check_content_rows(path),
        ArtifactFormat::TextDump => text::check_text_dump(path, kind),
    };
    let findings = match structure {
        Ok(findings) => findings,
        Err(reason) => {
            warn!("{} failed structural check: {}", path.display(), reason);
            return Verification::failed(size, reason);
        }
    };

    let sha256 = match calculate_sha256(path) {
        Ok(digest) => digest,
        Err(e) => return Verification::failed(size, format!("hashing failed: {}", e)),
    };

    let status = if findings.record_count == 0 {
        VerificationStatus::VerifiedEmpty
    } else {
        VerificationStatus::Verified
    };
    debug!("{} verified as {:?} ({} bytes, sha256 {})", path.display(), status, size, sha256);

    Verification {
        status,
        size,
        sha256: Some(sha256),
        findings,
        failure: None,
    }
}
