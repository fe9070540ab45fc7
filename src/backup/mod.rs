//! Backup container decoding.
//!
//! A container is a fixed header followed by a tar archive that is
//! optionally zlib-compressed:
//!
//! ```text
//! 0..24   "ANDROID BACKUP\n" padded with zero bytes
//! 24..28  format version, little-endian u32 (1 through 5)
//! 28..32  compression flag, little-endian u32 (0 stored, 1 zlib)
//! 32..    tar archive, closed by two zero blocks
//! ```
//!
//! Containers written directly by the device use a newline-separated text
//! header (`version\ncompression\nencryption\n`) instead; both are accepted.
//! Encrypted containers are rejected. A container that stops before the
//! closing zero blocks, or before the end of its compressed stream, is
//! reported as truncated.
//!
//! ```no_run
//! use android_collector::backup::BackupDecoder;
//! use std::fs::File;
//!
//! # fn example() -> anyhow::Result<()> {
//! let mut decoder = BackupDecoder::new(File::open("telephony.ab")?)?;
//! for entry in decoder.entries() {
//!     let entry = entry?;
//!     println!("{} ({} bytes)", entry.path, entry.data.len());
//! }
//! # Ok(())
//! # }
//! ```

mod decoder;
mod header;
mod writer;

pub use decoder::{decode_backup, BackupDecoder, BackupEntries, BackupEntry, DecodedBackup};
pub use header::{read_header, BackupHeader, HeaderLayout};
pub use writer::{encode_backup, EncodeOptions};
