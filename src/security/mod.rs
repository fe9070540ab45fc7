//! Security utilities and validation functions.
//!
//! - Case id validation so a case maps to exactly one directory
//! - Filename sanitization for stored artifacts
//! - Traversal-safe extraction paths for backup entries

pub mod path_validator;

pub use path_validator::{safe_entry_path, sanitize_filename, validate_case_id, validate_output_path};
