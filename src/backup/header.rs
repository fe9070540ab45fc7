use std::io::{self, Read};

use serde::Serialize;

use crate::constants::{
    BACKUP_COMPRESSION_OFFSET, BACKUP_HEADER_LEN, BACKUP_MAGIC_LEN, BACKUP_MARKER, BACKUP_MAX_VERSION,
    BACKUP_MIN_VERSION, BACKUP_VERSION_OFFSET,
};
use crate::error::DecodeError;

/// How the container header was laid out on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HeaderLayout {
    /// 24-byte magic field, then little-endian version and compression flag
    Binary,
    /// Marker followed by newline-terminated version, compression and
    /// encryption fields, as written by the device itself
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupHeader {
    pub version: u32,
    pub compressed: bool,
    pub layout: HeaderLayout,
}

const MAX_TEXT_FIELD_LEN: usize = 32;

/// Read and validate a container header, leaving `reader` at the payload
pub fn read_header<R: Read>(reader: &mut R) -> Result<BackupHeader, DecodeError> {
    let mut marker = [0u8; 15];
    read_exact(reader, &mut marker)?;
    if marker[..] != BACKUP_MARKER[..] {
        return Err(DecodeError::InvalidMagic);
    }

    let mut next = [0u8; 1];
    read_exact(reader, &mut next)?;

    if next[0].is_ascii_digit() {
        read_text_header(reader, next[0])
    } else {
        read_binary_header(reader, next[0])
    }
}

fn read_binary_header<R: Read>(reader: &mut R, first_pad: u8) -> Result<BackupHeader, DecodeError> {
    // Marker and the byte after it are already consumed
    let consumed = BACKUP_MARKER.len() + 1;
    let mut header = [0u8; BACKUP_HEADER_LEN];
    header[consumed - 1] = first_pad;
    read_exact(reader, &mut header[consumed..])?;
    if header[BACKUP_MARKER.len()..BACKUP_MAGIC_LEN].iter().any(|b| *b != 0) {
        return Err(DecodeError::InvalidMagic);
    }

    let version = le_u32(&header, BACKUP_VERSION_OFFSET);
    let compression = le_u32(&header, BACKUP_COMPRESSION_OFFSET);
    build_header(version, compression, HeaderLayout::Binary)
}

fn le_u32(header: &[u8; BACKUP_HEADER_LEN], offset: usize) -> u32 {
    let mut field = [0u8; 4];
    field.copy_from_slice(&header[offset..offset + 4]);
    u32::from_le_bytes(field)
}

fn read_text_header<R: Read>(reader: &mut R, first_digit: u8) -> Result<BackupHeader, DecodeError> {
    let mut version_field = vec![first_digit];
    version_field.extend(read_line(reader)?);
    let version = parse_number(&version_field, "version")?;

    let compression = parse_number(&read_line(reader)?, "compression")?;

    let encryption = String::from_utf8_lossy(&read_line(reader)?).into_owned();
    if encryption != "none" {
        return Err(DecodeError::Encrypted(encryption));
    }

    build_header(version, compression, HeaderLayout::Text)
}

fn build_header(version: u32, compression: u32, layout: HeaderLayout) -> Result<BackupHeader, DecodeError> {
    if !(BACKUP_MIN_VERSION..=BACKUP_MAX_VERSION).contains(&version) {
        return Err(DecodeError::UnsupportedVersion(version));
    }
    let compressed = match compression {
        0 => false,
        1 => true,
        other => return Err(DecodeError::UnsupportedCompression(other)),
    };
    Ok(BackupHeader { version, compressed, layout })
}

fn read_line<R: Read>(reader: &mut R) -> Result<Vec<u8>, DecodeError> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        read_exact(reader, &mut byte)?;
        if byte[0] == b'\n' {
            return Ok(line);
        }
        if line.len() >= MAX_TEXT_FIELD_LEN {
            return Err(DecodeError::Corrupt("header field too long".to_string()));
        }
        line.push(byte[0]);
    }
}

fn parse_number(field: &[u8], name: &str) -> Result<u32, DecodeError> {
    std::str::from_utf8(field)
        .ok()
        .and_then(|s| s.trim().parse::<u32>().ok())
        .ok_or_else(|| DecodeError::Corrupt(format!("invalid {} field in header", name)))
}

fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<(), DecodeError> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => DecodeError::TruncatedHeader,
        _ => DecodeError::Corrupt(e.to_string()),
    })
}

/// The fixed binary header for the given version and compression flag
pub fn binary_header(version: u32, compressed: bool) -> Vec<u8> {
    let mut header = vec![0u8; BACKUP_HEADER_LEN];
    header[..BACKUP_MARKER.len()].copy_from_slice(BACKUP_MARKER);
    header[BACKUP_VERSION_OFFSET..BACKUP_VERSION_OFFSET + 4].copy_from_slice(&version.to_le_bytes());
    header[BACKUP_COMPRESSION_OFFSET..BACKUP_COMPRESSION_OFFSET + 4]
        .copy_from_slice(&u32::from(compressed).to_le_bytes());
    header
}

/// The device-style text header for the given version and compression flag
pub fn text_header(version: u32, compressed: bool) -> Vec<u8> {
    let mut header = BACKUP_MARKER.to_vec();
    header.extend_from_slice(format!("{}\n{}\nnone\n", version, u8::from(compressed)).as_bytes());
    header
}
