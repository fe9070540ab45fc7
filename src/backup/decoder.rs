use std::cell::RefCell;
use std::io::{self, Read};
use std::rc::Rc;

use flate2::{Decompress, FlushDecompress, Status};
use log::{debug, warn};

use crate::backup::header::{read_header, BackupHeader};
use crate::constants::{MAX_BACKUP_ENTRY_SIZE, TAR_END_OF_ARCHIVE_LEN};
use crate::error::DecodeError;

/// Label used in errors for a stream that stops where the archive trailer belongs
const ARCHIVE_TRAILER: &str = "<archive trailer>";

const INFLATE_BUFFER_LEN: usize = 32 * 1024;

/// A regular file extracted from a backup container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupEntry {
    /// Archive-internal path, e.g. `apps/com.android.providers.telephony/db/mmssms.db`
    pub path: String,
    pub data: Vec<u8>,
}

/// Zlib reader that reports a stream cut short as `UnexpectedEof` instead of
/// a quiet end of input.
struct Inflater<R: Read> {
    inner: R,
    state: Decompress,
    buf: Vec<u8>,
    pos: usize,
    len: usize,
    finished: bool,
}

impl<R: Read> Inflater<R> {
    fn new(inner: R) -> Self {
        Inflater {
            inner,
            state: Decompress::new(true),
            buf: vec![0u8; INFLATE_BUFFER_LEN],
            pos: 0,
            len: 0,
            finished: false,
        }
    }
}

impl<R: Read> Read for Inflater<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() || self.finished {
            return Ok(0);
        }
        loop {
            if self.pos == self.len {
                self.len = self.inner.read(&mut self.buf)?;
                self.pos = 0;
            }
            let input = &self.buf[self.pos..self.len];
            let at_eof = input.is_empty();

            let (in_before, out_before) = (self.state.total_in(), self.state.total_out());
            let status = self
                .state
                .decompress(input, out, FlushDecompress::None)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            let consumed = (self.state.total_in() - in_before) as usize;
            let produced = (self.state.total_out() - out_before) as usize;
            self.pos += consumed;

            if status == Status::StreamEnd {
                self.finished = true;
                return Ok(produced);
            }
            if produced > 0 {
                return Ok(produced);
            }
            if at_eof {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "compressed stream ends before its end marker",
                ));
            }
            if consumed == 0 {
                return Err(io::Error::new(io::ErrorKind::InvalidData, "compressed stream makes no progress"));
            }
        }
    }
}

/// Archive payload after the header, optionally inflated
enum Payload<R: Read> {
    Stored(R),
    Deflated(Inflater<R>),
}

impl<R: Read> Read for Payload<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Payload::Stored(inner) => inner.read(buf),
            Payload::Deflated(inner) => inner.read(buf),
        }
    }
}

/// Payload plus the run of zero bytes read since the last mark
struct TrackedPayload<R: Read> {
    payload: Payload<R>,
    zeros: u64,
    broken: bool,
}

/// Payload handle shared by the tar reader and the end-of-archive check
struct SharedPayload<R: Read>(Rc<RefCell<TrackedPayload<R>>>);

impl<R: Read> SharedPayload<R> {
    fn new(payload: Payload<R>) -> Self {
        SharedPayload(Rc::new(RefCell::new(TrackedPayload { payload, zeros: 0, broken: false })))
    }

    fn handle(&self) -> Self {
        SharedPayload(Rc::clone(&self.0))
    }

    /// Start counting zero bytes from the current position
    fn mark(&self) {
        let mut tracked = self.0.borrow_mut();
        tracked.zeros = 0;
        tracked.broken = false;
    }

    /// Unbroken zero bytes read since the last mark
    fn zeros_since_mark(&self) -> u64 {
        self.0.borrow().zeros
    }
}

impl<R: Read> Read for SharedPayload<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut tracked = self.0.borrow_mut();
        let n = tracked.payload.read(buf)?;
        if !tracked.broken {
            match buf[..n].iter().position(|b| *b != 0) {
                Some(first) => {
                    tracked.zeros += first as u64;
                    tracked.broken = true;
                }
                None => tracked.zeros += n as u64,
            }
        }
        Ok(n)
    }
}

/// Streaming decoder over a backup container.
///
/// The header is validated eagerly by [`BackupDecoder::new`]; archive entries
/// are produced one at a time by [`BackupDecoder::entries`], so large backups
/// never have to be held in memory as a whole.
pub struct BackupDecoder<R: Read> {
    header: BackupHeader,
    payload: SharedPayload<R>,
    archive: tar::Archive<SharedPayload<R>>,
}

impl<R: Read> BackupDecoder<R> {
    pub fn new(mut reader: R) -> Result<Self, DecodeError> {
        let header = read_header(&mut reader)?;
        debug!(
            "Backup container version {} ({:?} header, compressed: {})",
            header.version, header.layout, header.compressed
        );

        let payload = if header.compressed {
            Payload::Deflated(Inflater::new(reader))
        } else {
            Payload::Stored(reader)
        };
        let payload = SharedPayload::new(payload);

        Ok(BackupDecoder {
            header,
            archive: tar::Archive::new(payload.handle()),
            payload,
        })
    }

    pub fn header(&self) -> &BackupHeader {
        &self.header
    }

    /// Regular-file entries in archive order.
    ///
    /// Directories, links and other special entries are skipped. The
    /// sequence ends after the first error. A stream that stops without the
    /// two zero blocks closing the archive, or inside the compressed stream,
    /// ends with [`DecodeError::Truncated`].
    pub fn entries(&mut self) -> BackupEntries<'_, R> {
        let payload = self.payload.handle();
        match self.archive.entries() {
            Ok(inner) => BackupEntries { inner: Some(inner), payload, pending_error: None },
            Err(e) => BackupEntries {
                inner: None,
                payload,
                pending_error: Some(DecodeError::Corrupt(e.to_string())),
            },
        }
    }
}

pub struct BackupEntries<'a, R: 'a + Read> {
    inner: Option<tar::Entries<'a, SharedPayload<R>>>,
    payload: SharedPayload<R>,
    pending_error: Option<DecodeError>,
}

impl<'a, R: 'a + Read> BackupEntries<'a, R> {
    fn fail(&mut self, error: DecodeError) -> Option<Result<BackupEntry, DecodeError>> {
        warn!("Backup decoding stopped: {}", error);
        self.inner = None;
        Some(Err(error))
    }

    /// Called once the tar reader reports the end: the archive trailer must
    /// have been read in full and the rest of the payload must end cleanly.
    fn finish(&mut self) -> Option<Result<BackupEntry, DecodeError>> {
        self.inner = None;
        if let Err(e) = io::copy(&mut self.payload, &mut io::sink()) {
            return self.fail(classify_io_error(e, Some(ARCHIVE_TRAILER.to_string())));
        }
        let zeros = self.payload.zeros_since_mark();
        if zeros < TAR_END_OF_ARCHIVE_LEN {
            debug!("Archive ends after {} zero bytes", zeros);
            return self.fail(DecodeError::Truncated { path: ARCHIVE_TRAILER.to_string() });
        }
        None
    }
}

impl<'a, R: 'a + Read> Iterator for BackupEntries<'a, R> {
    type Item = Result<BackupEntry, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(error) = self.pending_error.take() {
            return Some(Err(error));
        }

        loop {
            let next = match self.inner.as_mut()?.next() {
                Some(next) => next,
                None => return self.finish(),
            };
            let mut entry = match next {
                Ok(entry) => entry,
                Err(e) => return self.fail(classify_io_error(e, None)),
            };
            self.payload.mark();

            let path = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
            if !entry.header().entry_type().is_file() {
                debug!("Skipping non-file backup entry {}", path);
                continue;
            }

            let declared = match entry.header().size() {
                Ok(size) => size,
                Err(e) => return self.fail(DecodeError::Corrupt(format!("{}: {}", path, e))),
            };
            if declared > MAX_BACKUP_ENTRY_SIZE {
                return self.fail(DecodeError::EntryTooLarge { path, size: declared });
            }

            let mut data = Vec::with_capacity(declared.min(1024 * 1024) as usize);
            if let Err(e) = entry.read_to_end(&mut data) {
                return self.fail(classify_io_error(e, Some(path)));
            }
            if data.len() as u64 != declared {
                return self.fail(DecodeError::Truncated { path });
            }
            self.payload.mark();

            return Some(Ok(BackupEntry { path, data }));
        }
    }
}

fn classify_io_error(error: io::Error, path: Option<String>) -> DecodeError {
    match (error.kind(), path) {
        (io::ErrorKind::UnexpectedEof, Some(path)) => DecodeError::Truncated { path },
        (io::ErrorKind::UnexpectedEof, None) => DecodeError::Truncated { path: "<header>".to_string() },
        (_, _) => DecodeError::Corrupt(error.to_string()),
    }
}

/// Result of decoding a whole container in memory
#[derive(Debug)]
pub struct DecodedBackup {
    pub header: BackupHeader,
    pub entries: Vec<BackupEntry>,
    /// Error that ended decoding early; `entries` holds everything before it
    pub error: Option<DecodeError>,
}

/// Decode every entry of an in-memory container, keeping what was decoded
/// before a mid-stream failure.
pub fn decode_backup(data: &[u8]) -> Result<DecodedBackup, DecodeError> {
    let mut decoder = BackupDecoder::new(data)?;
    let header = decoder.header().clone();
    let mut entries = Vec::new();
    let mut error = None;

    for item in decoder.entries() {
        match item {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                error = Some(e);
                break;
            }
        }
    }

    Ok(DecodedBackup { header, entries, error })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::header::{binary_header, text_header};
    use crate::backup::writer::{encode_backup, EncodeOptions};
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn entry(path: &str, data: &[u8]) -> BackupEntry {
        BackupEntry { path: path.to_string(), data: data.to_vec() }
    }

    fn tar_with_special_entries() -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());

        let mut dir = tar::Header::new_gnu();
        dir.set_entry_type(tar::EntryType::Directory);
        dir.set_size(0);
        dir.set_mode(0o755);
        builder.append_data(&mut dir, "apps/com.example/db/", io::empty()).unwrap();

        let mut link = tar::Header::new_gnu();
        link.set_entry_type(tar::EntryType::Symlink);
        link.set_size(0);
        link.set_mode(0o777);
        builder.append_link(&mut link, "apps/com.example/db/link", "main.db").unwrap();

        let mut file = tar::Header::new_gnu();
        file.set_size(4);
        file.set_mode(0o600);
        builder.append_data(&mut file, "apps/com.example/db/main.db", &b"data"[..]).unwrap();

        builder.into_inner().unwrap()
    }

    #[test]
    fn test_decodes_compressed_container() {
        let data = encode_backup(
            &[entry("apps/com.android.providers.telephony/db/mmssms.db", b"SQLite format 3\0rest")],
            EncodeOptions::default(),
        )
        .unwrap();

        let mut decoder = BackupDecoder::new(data.as_slice()).unwrap();
        assert!(decoder.header().compressed);
        let entries: Vec<BackupEntry> = decoder.entries().collect::<Result<_, _>>().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, "apps/com.android.providers.telephony/db/mmssms.db");
        assert_eq!(entries[0].data, b"SQLite format 3\0rest");
    }

    #[test]
    fn test_decodes_stored_text_header_container() {
        let mut data = text_header(1, false);
        data.extend(tar_with_special_entries());

        let decoded = decode_backup(&data).unwrap();
        assert!(decoded.error.is_none());
        assert_eq!(decoded.entries.len(), 1);
        assert_eq!(decoded.entries[0].path, "apps/com.example/db/main.db");
    }

    #[test]
    fn test_skips_directories_and_links() {
        let mut data = binary_header(5, true);
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&tar_with_special_entries()).unwrap();
        data.extend(encoder.finish().unwrap());

        let decoded = decode_backup(&data).unwrap();
        let paths: Vec<&str> = decoded.entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["apps/com.example/db/main.db"]);
    }

    #[test]
    fn test_truncated_entry_keeps_earlier_entries() {
        let data = encode_backup(
            &[entry("apps/a/f/first.txt", b"complete"), entry("apps/a/db/second.db", &[7u8; 4096])],
            EncodeOptions { compressed: false, ..EncodeOptions::default() },
        )
        .unwrap();

        // header (32) + first header block + first data block + second header block + part of its data
        let cut = 32 + 512 + 512 + 512 + 100;
        let decoded = decode_backup(&data[..cut]).unwrap();
        assert_eq!(decoded.entries.len(), 1);
        assert_eq!(decoded.entries[0].path, "apps/a/f/first.txt");
        assert_eq!(
            decoded.error,
            Some(DecodeError::Truncated { path: "apps/a/db/second.db".to_string() })
        );
    }

    #[test]
    fn test_iteration_stops_after_error() {
        let data = encode_backup(
            &[entry("apps/a/db/one.db", &[1u8; 2048])],
            EncodeOptions { compressed: false, ..EncodeOptions::default() },
        )
        .unwrap();
        let mut decoder = BackupDecoder::new(&data[..32 + 512 + 10]).unwrap();
        let mut entries = decoder.entries();
        assert!(matches!(entries.next(), Some(Err(DecodeError::Truncated { .. }))));
        assert!(entries.next().is_none());
        assert!(entries.next().is_none());
    }

    #[test]
    fn test_corrupt_deflate_stream() {
        let mut data = binary_header(5, true);
        data.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef, 0x00, 0x11, 0x22, 0x33]);
        let decoded = decode_backup(&data).unwrap();
        assert!(decoded.entries.is_empty());
        assert!(decoded.error.is_some());
    }

    #[test]
    fn test_header_errors_surface_before_iteration() {
        assert!(matches!(
            BackupDecoder::new(&b"NOT A BACKUP AT ALL, CLEARLY NOT"[..]),
            Err(DecodeError::InvalidMagic)
        ));
        assert!(matches!(
            BackupDecoder::new(&b"ANDROID BACKUP\n"[..]),
            Err(DecodeError::TruncatedHeader)
        ));
    }

    #[test]
    fn test_cut_between_entries_is_truncation() {
        let data = encode_backup(
            &[entry("apps/a/f/one.txt", &[1u8; 512]), entry("apps/a/f/two.txt", &[2u8; 512])],
            EncodeOptions { compressed: false, ..EncodeOptions::default() },
        )
        .unwrap();

        let decoded = decode_backup(&data[..32 + 512 + 512]).unwrap();
        assert_eq!(decoded.entries.len(), 1);
        assert_eq!(decoded.error, Some(DecodeError::Truncated { path: ARCHIVE_TRAILER.to_string() }));

        // One of the two closing zero blocks is not enough
        let decoded = decode_backup(&data[..data.len() - 512]).unwrap();
        assert_eq!(decoded.entries.len(), 2);
        assert_eq!(decoded.error, Some(DecodeError::Truncated { path: ARCHIVE_TRAILER.to_string() }));

        let decoded = decode_backup(&data).unwrap();
        assert_eq!(decoded.entries.len(), 2);
        assert!(decoded.error.is_none());
    }

    #[test]
    fn test_zero_filled_entry_does_not_count_as_trailer() {
        let data = encode_backup(
            &[entry("apps/a/f/zeros.bin", &[0u8; 2048])],
            EncodeOptions { compressed: false, ..EncodeOptions::default() },
        )
        .unwrap();
        let decoded = decode_backup(&data[..32 + 512 + 2048]).unwrap();
        assert_eq!(decoded.entries.len(), 1);
        assert!(decoded.error.is_some());
    }

    #[test]
    fn test_cut_inside_compressed_trailer_is_truncation() {
        let data = encode_backup(&[entry("apps/a/f/one.txt", b"payload")], EncodeOptions::default()).unwrap();
        for cut in data.len() - 8..data.len() {
            let decoded = decode_backup(&data[..cut]).unwrap();
            assert!(
                matches!(decoded.error, Some(DecodeError::Truncated { .. })),
                "cut at {} of {}: {:?}",
                cut,
                data.len(),
                decoded.error
            );
        }
        assert!(decode_backup(&data).unwrap().error.is_none());
    }

    #[test]
    fn test_empty_archive_has_no_entries() {
        let data = encode_backup(&[], EncodeOptions::default()).unwrap();
        let decoded = decode_backup(&data).unwrap();
        assert!(decoded.entries.is_empty());
        assert!(decoded.error.is_none());
    }
}
