//! ProDOS file metadata persisted in host extended attributes.
//!
//! ProDOS fields with no Unix equivalent live one-per-xattr under the
//! `user.prodos.` namespace. Modification time is deliberately not among
//! them: it maps onto the host mtime in both directions. Every field has a
//! defined default, so reads never fail; writes translate host errors into
//! ProDOS error bytes (filesystems without xattr support surface `$27`).

use bitflags::bitflags;
use chrono::{DateTime, NaiveDateTime, Utc};
use log::warn;
use std::fs;
use std::io;
use std::path::Path;
use std::time::SystemTime;

use crate::prodos::ErrorCode;

pub const XATTR_ACCESS: &str = "user.prodos.access";
pub const XATTR_FILE_TYPE: &str = "user.prodos.file_type";
pub const XATTR_AUX_TYPE: &str = "user.prodos.aux_type";
pub const XATTR_STORAGE_TYPE: &str = "user.prodos.storage_type";
pub const XATTR_CREATED: &str = "user.prodos.created";

const CREATED_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";
const CREATED_LEN: usize = 20;

pub const DEFAULT_ACCESS: u8 = 0xC3;
pub const FILE_TYPE_BIN: u8 = 0x06;
pub const FILE_TYPE_DIR: u8 = 0x0F;
pub const STORAGE_SEEDLING: u8 = 0x01;
pub const STORAGE_DIRECTORY: u8 = 0x0D;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Access: u8 {
        const DESTROY   = 0b1000_0000;
        const RENAME    = 0b0100_0000;
        const BACKUP    = 0b0010_0000;
        const RESERVED4 = 0b0001_0000;
        const RESERVED3 = 0b0000_1000;
        const INVISIBLE = 0b0000_0100;
        const WRITE     = 0b0000_0010;
        const READ      = 0b0000_0001;
    }
}

// One character per access bit, bit 7 first; reserved bits render as '.'.
const ACCESS_LETTERS: [char; 8] = ['d', 'n', 'b', '.', '.', 'i', 'w', 'r'];

pub fn format_access(access: u8) -> String {
    ACCESS_LETTERS
        .iter()
        .enumerate()
        .map(|(i, &letter)| {
            if access & (0x80 >> i) != 0 {
                letter
            } else {
                '-'
            }
        })
        .collect()
}

/// Strict inverse of `format_access`: each position is either its letter
/// (bit set) or `-` (bit clear). Anything else is malformed.
pub fn parse_access(s: &str) -> Option<u8> {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() != 8 {
        return None;
    }

    let mut access = 0u8;
    for (i, &letter) in ACCESS_LETTERS.iter().enumerate() {
        if chars[i] == letter {
            access |= 0x80 >> i;
        } else if chars[i] != '-' {
            return None;
        }
    }
    Some(access)
}

fn format_byte_hex(value: u8) -> String {
    format!("{:02x}", value)
}

fn parse_byte_hex(s: &str) -> Option<u8> {
    if s.len() != 2 {
        return None;
    }
    u8::from_str_radix(s, 16).ok()
}

// Aux type serializes low byte first, matching its order in memory.
fn format_aux_hex(value: u16) -> String {
    format!("{:02x}{:02x}", value & 0xFF, value >> 8)
}

fn parse_aux_hex(s: &str) -> Option<u16> {
    if s.len() != 4 {
        return None;
    }
    let lo = u16::from_str_radix(&s[0..2], 16).ok()?;
    let hi = u16::from_str_radix(&s[2..4], 16).ok()?;
    Some((hi << 8) | lo)
}

pub fn format_created(t: &DateTime<Utc>) -> String {
    t.format(CREATED_FORMAT).to_string()
}

pub fn parse_created(s: &str) -> Option<DateTime<Utc>> {
    if s.len() != CREATED_LEN {
        return None;
    }
    NaiveDateTime::parse_from_str(s, CREATED_FORMAT)
        .ok()
        .map(|t| t.and_utc())
}

/// Translate a host I/O failure into the ProDOS error stratum.
pub fn io_error_code(err: &io::Error) -> u8 {
    match err.raw_os_error() {
        Some(code) if code == libc::EACCES || code == libc::EPERM => ErrorCode::ACCESS_DENIED,
        Some(code) if code == libc::ENOSPC => ErrorCode::VOLUME_FULL,
        // ENOTSUP / EOPNOTSUPP / ENODATA and everything else.
        _ => ErrorCode::IO_ERROR,
    }
}

/// The ProDOS view of one host file, with per-field defaults applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileInfo {
    pub access: u8,
    pub file_type: u8,
    pub aux_type: u16,
    pub storage_type: u8,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

fn get_xattr_string(path: &Path, name: &str) -> Option<String> {
    match xattr::get(path, name) {
        Ok(Some(bytes)) => match String::from_utf8(bytes) {
            Ok(s) => Some(s),
            Err(_) => {
                warn!("non-UTF-8 {} on {}", name, path.display());
                None
            }
        },
        Ok(None) => None,
        Err(_) => None,
    }
}

fn mtime(path: &Path) -> DateTime<Utc> {
    fs::metadata(path)
        .and_then(|md| md.modified())
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now())
}

/// Read the metadata of `path`. Missing or malformed attributes fall back
/// to their defaults; this never fails.
pub fn read_info(path: &Path, is_dir: bool) -> FileInfo {
    let access = get_xattr_string(path, XATTR_ACCESS)
        .and_then(|s| parse_access(&s))
        .unwrap_or(DEFAULT_ACCESS);

    let file_type = get_xattr_string(path, XATTR_FILE_TYPE)
        .and_then(|s| parse_byte_hex(&s))
        .unwrap_or(if is_dir { FILE_TYPE_DIR } else { FILE_TYPE_BIN });

    let aux_type = get_xattr_string(path, XATTR_AUX_TYPE)
        .and_then(|s| parse_aux_hex(&s))
        .unwrap_or(0);

    let storage_type = get_xattr_string(path, XATTR_STORAGE_TYPE)
        .and_then(|s| parse_byte_hex(&s))
        .unwrap_or(if is_dir {
            STORAGE_DIRECTORY
        } else {
            STORAGE_SEEDLING
        });

    let modified = mtime(path);
    let created = get_xattr_string(path, XATTR_CREATED)
        .and_then(|s| parse_created(&s))
        .unwrap_or(modified);

    FileInfo {
        access,
        file_type,
        aux_type,
        storage_type,
        created,
        modified,
    }
}

fn set_xattr(path: &Path, name: &str, value: &str) -> Result<(), u8> {
    xattr::set(path, name, value.as_bytes()).map_err(|err| io_error_code(&err))
}

pub fn set_access(path: &Path, access: u8) -> Result<(), u8> {
    set_xattr(path, XATTR_ACCESS, &format_access(access))
}

pub fn set_file_type(path: &Path, file_type: u8) -> Result<(), u8> {
    set_xattr(path, XATTR_FILE_TYPE, &format_byte_hex(file_type))
}

pub fn set_aux_type(path: &Path, aux_type: u16) -> Result<(), u8> {
    set_xattr(path, XATTR_AUX_TYPE, &format_aux_hex(aux_type))
}

pub fn set_storage_type(path: &Path, storage_type: u8) -> Result<(), u8> {
    set_xattr(path, XATTR_STORAGE_TYPE, &format_byte_hex(storage_type))
}

pub fn set_created(path: &Path, created: &DateTime<Utc>) -> Result<(), u8> {
    set_xattr(path, XATTR_CREATED, &format_created(created))
}

/// Push a modification time onto the host file's mtime.
pub fn set_modified(path: &Path, modified: &DateTime<Utc>) -> Result<(), u8> {
    let file = fs::File::open(path).map_err(|err| io_error_code(&err))?;
    file.set_modified(SystemTime::from(*modified))
        .map_err(|err| io_error_code(&err))
}
