//! Global constants for the android-collector application.
//!
//! This module centralizes all hardcoded values to improve maintainability
//! and make configuration changes easier.

// Backup container layout
/// Marker at the start of every device backup container
pub const BACKUP_MARKER: &[u8] = b"ANDROID BACKUP\n";

/// Width of the fixed magic field (marker, zero padded)
pub const BACKUP_MAGIC_LEN: usize = 24;

/// Offset of the little-endian version field
pub const BACKUP_VERSION_OFFSET: usize = 24;

/// Offset of the little-endian compression flag
pub const BACKUP_COMPRESSION_OFFSET: usize = 28;

/// Total size of the fixed binary header
pub const BACKUP_HEADER_LEN: usize = 32;

/// Zero bytes closing the tar archive inside a container (two blocks)
pub const TAR_END_OF_ARCHIVE_LEN: u64 = 1024;

/// Lowest container version the decoder understands
pub const BACKUP_MIN_VERSION: u32 = 1;

/// Highest container version the decoder understands
pub const BACKUP_MAX_VERSION: u32 = 5;

/// Upper bound on a single decoded entry (2GB)
pub const MAX_BACKUP_ENTRY_SIZE: u64 = 2 * 1024 * 1024 * 1024;

/// Backups of this size or less contain no data (user declined on device)
pub const MIN_BACKUP_SIZE: usize = 24;

// Verification
/// Header every SQLite 3 database file starts with
pub const SQLITE_HEADER: &[u8] = b"SQLite format 3\0";

/// Bytes inspected when deciding whether a dump is binary
pub const BINARY_SNIFF_LEN: usize = 8 * 1024;

/// Buffer size for hashing (1MB)
pub const HASH_BUFFER_SIZE: usize = 1024 * 1024;

// Timestamps
/// Seconds between 1601-01-01 (browser epoch) and 1970-01-01
pub const WEBKIT_EPOCH_OFFSET_SECS: i64 = 11_644_473_600;

/// Format used by `dumpsys` for wall-clock times
pub const DUMPSYS_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// Timeout and retry constants
/// Default wait for the on-device backup confirmation (2 minutes)
pub const DEFAULT_BACKUP_TIMEOUT_SECS: u64 = 120;

/// Default timeout for ordinary device commands
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 30;

/// Delay before the single automatic device reconnection attempt
pub const DEFAULT_DEVICE_RETRY_DELAY_MS: u64 = 2000;

/// Extra time granted to the transport beyond the backup bound before the
/// selector gives up on it
pub const BACKUP_TIMEOUT_GRACE_SECS: u64 = 5;

// Case layout
/// Case metadata file, written once
pub const CASE_MANIFEST_FILE: &str = "case.json";

/// Append-only event log
pub const CASE_LOG_FILE: &str = "case_log.jsonl";

/// Directory holding acquired artifacts, one subdirectory per kind
pub const ARTIFACTS_DIR: &str = "artifacts";

/// Directory holding raw backup containers
pub const BACKUPS_DIR: &str = "backups";

/// Default timeline export file
pub const TIMELINE_FILE: &str = "timeline.csv";

/// Marker file present while an acquisition run is active
pub const RUN_LOCK_FILE: &str = ".acquisition.lock";

/// Default evidence root when none is configured
pub const DEFAULT_EVIDENCE_ROOT: &str = "cases";

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "android_collector.yaml";

// Progress
/// Percent reported once the device preflight is done
pub const PREFLIGHT_PERCENT: u8 = 15;

/// Percent reported when all targets are processed
pub const TARGETS_DONE_PERCENT: u8 = 95;
