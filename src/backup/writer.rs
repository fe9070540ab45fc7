use std::io::{self, Write};

use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::backup::decoder::BackupEntry;
use crate::backup::header::{binary_header, text_header, HeaderLayout};
use crate::constants::BACKUP_MAX_VERSION;

#[derive(Debug, Clone, Copy)]
pub struct EncodeOptions {
    pub version: u32,
    pub compressed: bool,
    pub layout: HeaderLayout,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        EncodeOptions {
            version: BACKUP_MAX_VERSION,
            compressed: true,
            layout: HeaderLayout::Binary,
        }
    }
}

/// Build a backup container holding `entries` as regular files.
///
/// Entry metadata is fixed (mode 0600, mtime 0) so equal input always
/// produces equal bytes.
pub fn encode_backup(entries: &[BackupEntry], options: EncodeOptions) -> io::Result<Vec<u8>> {
    let mut out = match options.layout {
        HeaderLayout::Binary => binary_header(options.version, options.compressed),
        HeaderLayout::Text => text_header(options.version, options.compressed),
    };

    if options.compressed {
        let encoder = ZlibEncoder::new(out, Compression::default());
        let encoder = append_entries(encoder, entries)?;
        out = encoder.finish()?;
    } else {
        out = append_entries(out, entries)?;
    }
    Ok(out)
}

fn append_entries<W: Write>(writer: W, entries: &[BackupEntry]) -> io::Result<W> {
    let mut builder = tar::Builder::new(writer);
    for entry in entries {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(entry.data.len() as u64);
        header.set_mode(0o600);
        header.set_mtime(0);
        builder.append_data(&mut header, &entry.path, entry.data.as_slice())?;
    }
    builder.into_inner()
}
