//! Utility functions for acquired evidence.
//!
//! ## Components
//!
//! - **Hashing**: SHA-256 calculation for tamper evidence
//! - **Content rows**: text form of content provider query results
//!
//! ### Generating File Hashes
//!
//! ```no_run
//! use android_collector::utils::hash::calculate_sha256;
//! use std::path::Path;
//!
//! # fn example() -> anyhow::Result<()> {
//! let digest = calculate_sha256(Path::new("cases/case-1/artifacts/SMS/mmssms.db"))?;
//! println!("SHA-256: {}", digest);
//! # Ok(())
//! # }
//! ```

/// Cryptographic hash calculation utilities
pub mod hash;

/// Content provider query output parsing and rendering
pub mod content_rows;
