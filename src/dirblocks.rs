//! Synthesized ProDOS directory blocks.
//!
//! Opening a directory hands the guest a byte stream shaped like on-disk
//! ProDOS directory blocks: 512-byte blocks holding a 4-byte prev/next
//! header and thirteen 39-byte entries. The first (key) block spends its
//! first slot on the directory's own header entry. The stream is built
//! once at OPEN time from the host directory listing and never refreshed.

use chrono::{DateTime, Utc};

use crate::datetime;

pub const BLOCK_SIZE: usize = 512;
pub const ENTRY_LENGTH: usize = 39;
pub const ENTRIES_PER_BLOCK: usize = 13;

pub const STORAGE_SUBDIR_HEADER: u8 = 0x0E;
pub const STORAGE_VOLUME_HEADER: u8 = 0x0F;

/// One file entry, already reduced to its ProDOS fields.
pub struct DirEntry {
    pub name: String,
    pub storage_type: u8,
    pub file_type: u8,
    pub access: u8,
    pub aux_type: u16,
    pub eof: u32,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

/// The directory's own header entry in the key block.
pub struct DirHeader {
    pub name: String,
    pub is_volume: bool,
    pub access: u8,
    pub created: DateTime<Utc>,
}

pub fn blocks_used(eof: u64) -> u16 {
    eof.div_ceil(BLOCK_SIZE as u64).min(u16::MAX as u64) as u16
}

/// Blocks needed for a directory of `entries` files: the key block holds
/// the header plus twelve entries, each further block thirteen.
pub fn block_count(entries: usize) -> usize {
    if entries <= ENTRIES_PER_BLOCK - 1 {
        1
    } else {
        1 + (entries - (ENTRIES_PER_BLOCK - 1)).div_ceil(ENTRIES_PER_BLOCK)
    }
}

fn put_u16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset] = (value & 0xFF) as u8;
    buf[offset + 1] = (value >> 8) as u8;
}

fn put_u24(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset] = (value & 0xFF) as u8;
    buf[offset + 1] = ((value >> 8) & 0xFF) as u8;
    buf[offset + 2] = ((value >> 16) & 0xFF) as u8;
}

fn put_name(buf: &mut [u8], storage: u8, name: &str) {
    let name = name.as_bytes();
    let len = name.len().min(15);
    buf[0] = (storage << 4) | len as u8;
    buf[1..1 + len].copy_from_slice(&name[..len]);
}

fn put_timestamp(buf: &mut [u8], offset: usize, t: &DateTime<Utc>) {
    put_u16(buf, offset, datetime::date_word(t));
    put_u16(buf, offset + 2, datetime::time_word(t));
}

fn write_header_entry(buf: &mut [u8], header: &DirHeader, file_count: u16) {
    let storage = if header.is_volume {
        STORAGE_VOLUME_HEADER
    } else {
        STORAGE_SUBDIR_HEADER
    };
    put_name(buf, storage, &header.name);
    // 16..24 reserved
    put_timestamp(buf, 24, &header.created);
    // 28 version, 29 min_version
    buf[30] = header.access;
    buf[31] = ENTRY_LENGTH as u8;
    buf[32] = ENTRIES_PER_BLOCK as u8;
    put_u16(buf, 33, file_count);
    // 35..39: parent/bitmap pointers, meaningless off-disk
}

fn write_file_entry(buf: &mut [u8], entry: &DirEntry) {
    put_name(buf, entry.storage_type, &entry.name);
    buf[16] = entry.file_type;
    // 17..19 key pointer
    put_u16(buf, 19, blocks_used(entry.eof as u64));
    put_u24(buf, 21, entry.eof & 0x00FF_FFFF);
    put_timestamp(buf, 24, &entry.created);
    // 28 version, 29 min_version
    buf[30] = entry.access;
    put_u16(buf, 31, entry.aux_type);
    put_timestamp(buf, 33, &entry.modified);
    // 37..39 header pointer
}

/// Assemble the block stream. Entries are sorted by name, ProDOS style;
/// the key block holds the header entry plus twelve file entries, each
/// further block thirteen.
pub fn build(header: &DirHeader, mut entries: Vec<DirEntry>) -> Vec<u8> {
    entries.sort_by(|a, b| a.name.cmp(&b.name));

    let blocks = block_count(entries.len());
    let mut data = vec![0u8; blocks * BLOCK_SIZE];
    let mut remaining = entries.iter();

    for index in 0..blocks {
        let block = &mut data[index * BLOCK_SIZE..(index + 1) * BLOCK_SIZE];

        // Blocks chain by 1-based sequence number; 0 terminates both ways.
        put_u16(block, 0, index as u16);
        let next = if index + 1 < blocks {
            index as u16 + 2
        } else {
            0
        };
        put_u16(block, 2, next);

        let mut slot = 0;
        if index == 0 {
            write_header_entry(
                &mut block[4..4 + ENTRY_LENGTH],
                header,
                entries.len() as u16,
            );
            slot = 1;
        }

        while slot < ENTRIES_PER_BLOCK {
            let Some(entry) = remaining.next() else {
                break;
            };
            let offset = 4 + slot * ENTRY_LENGTH;
            write_file_entry(&mut block[offset..offset + ENTRY_LENGTH], entry);
            slot += 1;
        }
    }

    data
}
