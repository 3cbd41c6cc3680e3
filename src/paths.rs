//! ProDOS pathname handling.
//!
//! Pathnames arrive from emulated memory as counted strings: a length byte
//! followed by that many characters. Normalization strips the high bit and
//! upper-cases; validation applies ProDOS component rules; resolution
//! applies the current prefix to partial paths. The result maps onto the
//! host filesystem under the volumes root.

use std::path::{Path, PathBuf};

use crate::mmu::Mmu;
use crate::prodos::ErrorCode;

/// Counted string as read from memory (also the stored-prefix bound).
pub const MAX_PATH_INPUT: usize = 64;
/// A resolved full pathname.
pub const MAX_PATH_RESOLVED: usize = 128;
/// One pathname component.
pub const MAX_COMPONENT: usize = 15;

pub type PathResult<T> = Result<T, u8>;

/// Read a counted string at `addr`, normalized: high bit stripped,
/// lower-case letters folded to upper case.
pub fn read_counted_string(mmu: &mut Mmu, addr: u16) -> PathResult<String> {
    let len = mmu.read_byte(addr) as usize;
    if len > MAX_PATH_INPUT {
        return Err(ErrorCode::INVALID_PATH);
    }

    let mut s = String::with_capacity(len);
    for i in 0..len {
        let ch = mmu.read_byte(addr.wrapping_add(1 + i as u16)) & 0x7F;
        s.push(ch.to_ascii_uppercase() as char);
    }
    Ok(s)
}

/// Write `s` to `addr` as a counted string.
pub fn write_counted_string(mmu: &mut Mmu, addr: u16, s: &str) {
    mmu.write_byte(addr, s.len() as u8);
    for (i, ch) in s.bytes().enumerate() {
        mmu.write_byte(addr.wrapping_add(1 + i as u16), ch);
    }
}

/// A component is 1-15 characters, starts with a letter, and continues
/// with letters, digits or periods. Input is assumed upper-cased.
pub fn is_valid_component(s: &str) -> bool {
    if s.is_empty() || s.len() > MAX_COMPONENT {
        return false;
    }
    let mut bytes = s.bytes();
    let first = bytes.next().unwrap_or(0);
    if !first.is_ascii_uppercase() {
        return false;
    }
    bytes.all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'.')
}

/// A full path starts with `/` and consists solely of valid components.
pub fn is_valid_full_path(s: &str) -> bool {
    match s.strip_prefix('/') {
        Some(rest) => !rest.is_empty() && rest.split('/').all(is_valid_component),
        None => false,
    }
}

/// Apply `prefix` to a normalized pathname and validate the result.
/// A partial path with no prefix set has nowhere to resolve to.
pub fn resolve(prefix: &str, path: &str) -> PathResult<String> {
    let full = if path.starts_with('/') {
        path.to_string()
    } else {
        if prefix.is_empty() {
            return Err(ErrorCode::INVALID_PATH);
        }
        format!("{}/{}", prefix, path)
    };

    if full.len() > MAX_PATH_RESOLVED || !is_valid_full_path(&full) {
        return Err(ErrorCode::INVALID_PATH);
    }
    Ok(full)
}

/// Map a validated full ProDOS path onto the host filesystem. `.` and `..`
/// segments cannot survive component validation, but the mapping refuses
/// them anyway rather than trust its callers.
pub fn to_host(volumes_root: &Path, full: &str) -> PathResult<PathBuf> {
    let mut host = volumes_root.to_path_buf();
    for component in full.trim_start_matches('/').split('/') {
        if component.is_empty() || component == "." || component == ".." {
            return Err(ErrorCode::INVALID_PATH);
        }
        host.push(component);
    }
    Ok(host)
}

/// Split a full path into (parent, name). The volume itself has parent "".
pub fn split_parent(full: &str) -> (&str, &str) {
    match full.rfind('/') {
        Some(idx) => (&full[..idx], &full[idx + 1..]),
        None => ("", full),
    }
}
