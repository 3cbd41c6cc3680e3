//! ProDOS 8 Machine Language Interface.
//!
//! `MliContext::dispatch` is the single entry point behind the CPU's
//! `JSR $BF00` trap. Every call reads its parameter block out of emulated
//! memory, validates the leading parameter count, performs the operation
//! against the host filesystem under the volumes root, and returns one
//! ProDOS error byte. Nothing else escapes: host failures are translated,
//! never propagated.

use chrono::{Local, Utc};
use log::{debug, warn};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::dirblocks::{self, DirEntry, DirHeader};
use crate::metadata::{self, Access};
use crate::mmu::Mmu;
use crate::paths;
use crate::prodos::{param_count, Call, ErrorCode};

pub const MAX_OPEN_FILES: usize = 8;
pub const MAX_INTERRUPTS: usize = 4;
pub const MAX_VOLUMES: usize = 14;

/// ProDOS global-page slots written by GET_TIME.
pub const DATE_ADDR: u16 = 0xBF90;
pub const TIME_ADDR: u16 = 0xBF92;

type MliResult<T = ()> = Result<T, u8>;

enum Backing {
    HostFile(File),
    // Directories read from an immutable snapshot of synthesized blocks.
    Directory(Vec<u8>),
}

struct OpenFile {
    backing: Backing,
    mark: u32,
    io_buffer: u16,
    newline_mask: u8,
    newline_char: u8,
}

impl OpenFile {
    fn eof(&self) -> MliResult<u32> {
        match &self.backing {
            Backing::HostFile(file) => {
                let len = file
                    .metadata()
                    .map_err(|err| metadata::io_error_code(&err))?
                    .len();
                Ok(len.min(0x00FF_FFFF) as u32)
            }
            Backing::Directory(blocks) => Ok(blocks.len() as u32),
        }
    }
}

pub struct MliContext {
    volumes_root: PathBuf,
    prefix: String,
    files: [Option<OpenFile>; MAX_OPEN_FILES],
    interrupts: [Option<u16>; MAX_INTERRUPTS],
}

impl MliContext {
    pub fn new<P: Into<PathBuf>>(volumes_root: P) -> Self {
        Self {
            volumes_root: volumes_root.into(),
            prefix: String::new(),
            files: Default::default(),
            interrupts: [None; MAX_INTERRUPTS],
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn open_file_count(&self) -> usize {
        self.files.iter().filter(|f| f.is_some()).count()
    }

    /// Dispatch one MLI call. The parameter count is checked before the
    /// call can touch any other state.
    pub fn dispatch(&mut self, mmu: &mut Mmu, call: u8, pblock: u16) -> u8 {
        let Some(expected) = param_count(call) else {
            return ErrorCode::BAD_CALL_NUMBER;
        };
        if mmu.read_byte(pblock) != expected {
            return ErrorCode::BAD_PARAM_COUNT;
        }

        let result = match call {
            Call::ALLOC_INTERRUPT => self.call_alloc_interrupt(mmu, pblock),
            Call::DEALLOC_INTERRUPT => self.call_dealloc_interrupt(mmu, pblock),
            Call::READ_BLOCK | Call::WRITE_BLOCK => Err(ErrorCode::IO_ERROR),
            Call::GET_TIME => self.call_get_time(mmu),
            Call::CREATE => self.call_create(mmu, pblock),
            Call::DESTROY => self.call_destroy(mmu, pblock),
            Call::RENAME => self.call_rename(mmu, pblock),
            Call::SET_FILE_INFO => self.call_set_file_info(mmu, pblock),
            Call::GET_FILE_INFO => self.call_get_file_info(mmu, pblock),
            Call::ON_LINE => self.call_on_line(mmu, pblock),
            Call::SET_PREFIX => self.call_set_prefix(mmu, pblock),
            Call::GET_PREFIX => self.call_get_prefix(mmu, pblock),
            Call::OPEN => self.call_open(mmu, pblock),
            Call::NEWLINE => self.call_newline(mmu, pblock),
            Call::READ => self.call_read(mmu, pblock),
            Call::WRITE => self.call_write(mmu, pblock),
            Call::CLOSE => self.call_close(mmu, pblock),
            Call::FLUSH => self.call_flush(mmu, pblock),
            Call::SET_MARK => self.call_set_mark(mmu, pblock),
            Call::GET_MARK => self.call_get_mark(mmu, pblock),
            Call::SET_EOF => self.call_set_eof(mmu, pblock),
            Call::GET_EOF => self.call_get_eof(mmu, pblock),
            Call::SET_BUF => self.call_set_buf(mmu, pblock),
            Call::GET_BUF => self.call_get_buf(mmu, pblock),
            _ => Err(ErrorCode::BAD_CALL_NUMBER),
        };

        match result {
            Ok(()) => ErrorCode::NO_ERROR,
            Err(code) => code,
        }
    }

    // **Common helpers**

    /// Read the pathname pointer at `addr`, normalize, apply the prefix
    /// and map the result onto the host.
    fn read_pathname(&self, mmu: &mut Mmu, addr: u16) -> MliResult<(String, PathBuf)> {
        let ptr = mmu.read_word(addr);
        let raw = paths::read_counted_string(mmu, ptr)?;
        let full = paths::resolve(&self.prefix, &raw)?;
        let host = paths::to_host(&self.volumes_root, &full)?;
        Ok((full, host))
    }

    /// Error for a pathname whose target is absent: `$44` when the parent
    /// chain itself is broken, `$46` when only the last component is.
    fn missing_code(&self, host: &Path) -> u8 {
        match host.parent() {
            Some(parent) if parent.exists() => ErrorCode::FILE_NOT_FOUND,
            _ => ErrorCode::PATH_NOT_FOUND,
        }
    }

    fn stat(&self, host: &Path) -> MliResult<fs::Metadata> {
        fs::symlink_metadata(host).map_err(|err| {
            if err.kind() == io::ErrorKind::NotFound {
                self.missing_code(host)
            } else {
                metadata::io_error_code(&err)
            }
        })
    }

    fn entry_mut(&mut self, ref_num: u8) -> MliResult<&mut OpenFile> {
        if !(1..=MAX_OPEN_FILES as u8).contains(&ref_num) {
            return Err(ErrorCode::BAD_REF_NUM);
        }
        self.files[ref_num as usize - 1]
            .as_mut()
            .ok_or(ErrorCode::BAD_REF_NUM)
    }

    /// True for an immediate child of the volumes root, i.e. a volume
    /// directory. Decided structurally at query time.
    fn is_volume_dir(&self, host: &Path) -> bool {
        host.parent() == Some(self.volumes_root.as_path())
    }

    /// Host directory listing reduced to what ProDOS can see: entries
    /// whose upper-cased names satisfy component rules, with their host
    /// paths and metadata. Every caller that enumerates a directory goes
    /// through here so listings, block counts and volume lists agree.
    fn prodos_entries(&self, host: &Path) -> MliResult<Vec<(String, PathBuf, fs::Metadata)>> {
        let listing = fs::read_dir(host).map_err(|err| {
            warn!("unreadable directory {}: {err}", host.display());
            metadata::io_error_code(&err)
        })?;

        let mut entries = Vec::new();
        for entry in listing.flatten() {
            let Ok(md) = entry.metadata() else { continue };
            let Some(name) = entry.file_name().to_str().map(str::to_ascii_uppercase) else {
                continue;
            };
            if paths::is_valid_component(&name) {
                entries.push((name, entry.path(), md));
            } else {
                debug!("hiding non-ProDOS name {:?}", entry.file_name());
            }
        }
        Ok(entries)
    }

    /// Name-sorted list of online volumes: first-level directories under
    /// the volumes root whose names obey ProDOS component rules.
    fn online_volumes(&self) -> MliResult<Vec<String>> {
        let mut volumes: Vec<String> = self
            .prodos_entries(&self.volumes_root)?
            .into_iter()
            .filter(|(_, _, md)| md.is_dir())
            .map(|(name, _, _)| name)
            .collect();
        volumes.sort();
        Ok(volumes)
    }

    // **Prefix group**

    fn call_set_prefix(&mut self, mmu: &mut Mmu, pblock: u16) -> MliResult {
        let ptr = mmu.read_word(pblock.wrapping_add(1));
        let raw = paths::read_counted_string(mmu, ptr)?;

        // A zero-length pathname clears the prefix.
        if raw.is_empty() {
            self.prefix.clear();
            return Ok(());
        }

        let full = paths::resolve(&self.prefix, &raw)?;
        if full.len() > paths::MAX_PATH_INPUT {
            return Err(ErrorCode::INVALID_PATH);
        }
        self.prefix = full;
        Ok(())
    }

    fn call_get_prefix(&mut self, mmu: &mut Mmu, pblock: u16) -> MliResult {
        let buf = mmu.read_word(pblock.wrapping_add(1));
        paths::write_counted_string(mmu, buf, &self.prefix);
        Ok(())
    }

    // **Housekeeping group**

    fn call_create(&mut self, mmu: &mut Mmu, pblock: u16) -> MliResult {
        let (_, host) = self.read_pathname(mmu, pblock.wrapping_add(1))?;
        let access = mmu.read_byte(pblock.wrapping_add(3));
        let file_type = mmu.read_byte(pblock.wrapping_add(4));
        let aux_type = mmu.read_word(pblock.wrapping_add(5));
        let storage_type = mmu.read_byte(pblock.wrapping_add(7));
        let create_date = mmu.read_word(pblock.wrapping_add(8));
        let create_time = mmu.read_word(pblock.wrapping_add(10));

        match storage_type {
            metadata::STORAGE_SEEDLING => {
                OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .open(&host)
                    .map_err(create_error)?;
            }
            metadata::STORAGE_DIRECTORY => {
                fs::create_dir(&host).map_err(create_error)?;
            }
            _ => return Err(ErrorCode::UNSUPPORTED_STORAGE),
        }

        let created =
            crate::datetime::decode(create_date, create_time).unwrap_or_else(Utc::now);
        metadata::set_access(&host, access)?;
        metadata::set_file_type(&host, file_type)?;
        metadata::set_aux_type(&host, aux_type)?;
        metadata::set_storage_type(&host, storage_type)?;
        metadata::set_created(&host, &created)?;
        Ok(())
    }

    fn call_destroy(&mut self, mmu: &mut Mmu, pblock: u16) -> MliResult {
        let (_, host) = self.read_pathname(mmu, pblock.wrapping_add(1))?;
        let md = self.stat(&host)?;

        let result = if md.is_dir() {
            fs::remove_dir(&host)
        } else {
            fs::remove_file(&host)
        };

        result.map_err(|err| match err.raw_os_error() {
            // A populated directory refuses destruction.
            Some(code) if code == libc::ENOTEMPTY => ErrorCode::ACCESS_DENIED,
            _ => metadata::io_error_code(&err),
        })
    }

    fn call_rename(&mut self, mmu: &mut Mmu, pblock: u16) -> MliResult {
        let (old_full, old_host) = self.read_pathname(mmu, pblock.wrapping_add(1))?;
        let (new_full, new_host) = self.read_pathname(mmu, pblock.wrapping_add(3))?;

        // ProDOS RENAME cannot move between directories.
        let (old_parent, _) = paths::split_parent(&old_full);
        let (new_parent, _) = paths::split_parent(&new_full);
        if old_parent != new_parent {
            return Err(ErrorCode::INVALID_PATH);
        }

        self.stat(&old_host)?;
        if old_full != new_full && fs::symlink_metadata(&new_host).is_ok() {
            return Err(ErrorCode::DUPLICATE_PATH);
        }

        fs::rename(&old_host, &new_host).map_err(|err| metadata::io_error_code(&err))
    }

    fn call_set_file_info(&mut self, mmu: &mut Mmu, pblock: u16) -> MliResult {
        let (_, host) = self.read_pathname(mmu, pblock.wrapping_add(1))?;
        let access = mmu.read_byte(pblock.wrapping_add(3));
        let file_type = mmu.read_byte(pblock.wrapping_add(4));
        let aux_type = mmu.read_word(pblock.wrapping_add(5));
        // +7..+10 reserved
        let mod_date = mmu.read_word(pblock.wrapping_add(10));
        let mod_time = mmu.read_word(pblock.wrapping_add(12));

        self.stat(&host)?;
        metadata::set_access(&host, access)?;
        metadata::set_file_type(&host, file_type)?;
        metadata::set_aux_type(&host, aux_type)?;

        let modified = crate::datetime::decode(mod_date, mod_time).unwrap_or_else(Utc::now);
        metadata::set_modified(&host, &modified)
    }

    fn call_get_file_info(&mut self, mmu: &mut Mmu, pblock: u16) -> MliResult {
        let (_, host) = self.read_pathname(mmu, pblock.wrapping_add(1))?;
        let md = self.stat(&host)?;
        let info = metadata::read_info(&host, md.is_dir());

        let storage_type = if self.is_volume_dir(&host) && md.is_dir() {
            dirblocks::STORAGE_VOLUME_HEADER
        } else {
            info.storage_type
        };

        let blocks_used = if md.is_dir() {
            // Count the same filtered listing an OPEN snapshot would hold.
            let entries = self.prodos_entries(&host).map(|v| v.len()).unwrap_or(0);
            (dirblocks::block_count(entries) as u64).min(0xFFFF) as u16
        } else {
            dirblocks::blocks_used(md.len())
        };

        mmu.write_byte(pblock.wrapping_add(3), info.access);
        mmu.write_byte(pblock.wrapping_add(4), info.file_type);
        mmu.write_word(pblock.wrapping_add(5), info.aux_type);
        mmu.write_byte(pblock.wrapping_add(7), storage_type);
        mmu.write_word(pblock.wrapping_add(8), blocks_used);
        mmu.write_word(pblock.wrapping_add(10), crate::datetime::date_word(&info.modified));
        mmu.write_word(pblock.wrapping_add(12), crate::datetime::time_word(&info.modified));
        mmu.write_word(pblock.wrapping_add(14), crate::datetime::date_word(&info.created));
        mmu.write_word(pblock.wrapping_add(16), crate::datetime::time_word(&info.created));
        Ok(())
    }

    fn call_on_line(&mut self, mmu: &mut Mmu, pblock: u16) -> MliResult {
        let unit_num = mmu.read_byte(pblock.wrapping_add(1));
        let buf = mmu.read_word(pblock.wrapping_add(2));
        let volumes = self.online_volumes()?;

        if unit_num == 0 {
            let mut offset = buf;
            for (index, name) in volumes.iter().take(MAX_VOLUMES).enumerate() {
                write_volume_record(mmu, offset, index, name);
                offset = offset.wrapping_add(16);
            }
            // Terminator record.
            for i in 0..16 {
                mmu.write_byte(offset.wrapping_add(i), 0x00);
            }
            return Ok(());
        }

        let drive = (unit_num >> 7) as usize;
        let slot = ((unit_num >> 4) & 0x07) as usize;
        if slot == 0 {
            return Err(ErrorCode::NO_DEVICE);
        }
        let index = (slot - 1) * 2 + drive;
        let Some(name) = volumes.get(index) else {
            return Err(ErrorCode::NO_DEVICE);
        };
        write_volume_record(mmu, buf, index, name);
        Ok(())
    }

    // **Filing group**

    fn call_open(&mut self, mmu: &mut Mmu, pblock: u16) -> MliResult {
        let (full, host) = self.read_pathname(mmu, pblock.wrapping_add(1))?;
        let io_buffer = mmu.read_word(pblock.wrapping_add(3));

        let slot = self
            .files
            .iter()
            .position(|f| f.is_none())
            .ok_or(ErrorCode::FCB_FULL)?;

        let md = self.stat(&host)?;
        let info = metadata::read_info(&host, md.is_dir());
        if !Access::from_bits_retain(info.access).contains(Access::READ) {
            return Err(ErrorCode::ACCESS_DENIED);
        }

        let backing = if md.is_dir() {
            Backing::Directory(self.synthesize_directory(&full, &host, info.access)?)
        } else {
            Backing::HostFile(open_host_file(&host).map_err(|err| {
                if err.kind() == io::ErrorKind::NotFound {
                    self.missing_code(&host)
                } else {
                    metadata::io_error_code(&err)
                }
            })?)
        };

        self.files[slot] = Some(OpenFile {
            backing,
            mark: 0,
            io_buffer,
            newline_mask: 0,
            newline_char: 0,
        });

        mmu.write_byte(pblock.wrapping_add(5), slot as u8 + 1);
        Ok(())
    }

    fn synthesize_directory(&self, full: &str, host: &Path, access: u8) -> MliResult<Vec<u8>> {
        let (_, dir_name) = paths::split_parent(full);
        let dir_info = metadata::read_info(host, true);

        let mut entries = Vec::new();
        for (name, path, md) in self.prodos_entries(host)? {
            let info = metadata::read_info(&path, md.is_dir());
            let eof = if md.is_dir() {
                dirblocks::BLOCK_SIZE as u32
            } else {
                md.len().min(0x00FF_FFFF) as u32
            };
            entries.push(DirEntry {
                name,
                storage_type: info.storage_type,
                file_type: info.file_type,
                access: info.access,
                aux_type: info.aux_type,
                eof,
                created: info.created,
                modified: info.modified,
            });
        }

        let header = DirHeader {
            name: dir_name.to_string(),
            is_volume: self.is_volume_dir(host),
            access,
            created: dir_info.created,
        };
        Ok(dirblocks::build(&header, entries))
    }

    fn call_newline(&mut self, mmu: &mut Mmu, pblock: u16) -> MliResult {
        let ref_num = mmu.read_byte(pblock.wrapping_add(1));
        let mask = mmu.read_byte(pblock.wrapping_add(2));
        let newline_char = mmu.read_byte(pblock.wrapping_add(3));

        let entry = self.entry_mut(ref_num)?;
        entry.newline_mask = mask;
        entry.newline_char = newline_char;
        Ok(())
    }

    fn call_read(&mut self, mmu: &mut Mmu, pblock: u16) -> MliResult {
        let ref_num = mmu.read_byte(pblock.wrapping_add(1));
        let buf = mmu.read_word(pblock.wrapping_add(2));
        let request = mmu.read_word(pblock.wrapping_add(4)) as u32;

        let entry = self.entry_mut(ref_num)?;
        let mark = entry.mark;
        let mask = entry.newline_mask;
        let newline_char = entry.newline_char;

        let mut transferred: u32 = 0;
        let mut failure: Option<u8> = None;

        match &mut entry.backing {
            // Directory reads copy straight out of the block snapshot;
            // newline mode does not apply.
            Backing::Directory(blocks) => {
                while transferred < request {
                    let Some(&byte) = blocks.get((mark + transferred) as usize) else {
                        break;
                    };
                    mmu.write_byte(buf.wrapping_add(transferred as u16), byte);
                    transferred += 1;
                }
            }
            Backing::HostFile(file) => {
                if let Err(err) = file.seek(SeekFrom::Start(mark as u64)) {
                    failure = Some(metadata::io_error_code(&err));
                } else {
                    let mut byte = [0u8; 1];
                    while transferred < request {
                        match file.read(&mut byte) {
                            Ok(0) => break,
                            Ok(_) => {
                                mmu.write_byte(buf.wrapping_add(transferred as u16), byte[0]);
                                transferred += 1;
                                if mask != 0 && (byte[0] & mask) == (newline_char & mask) {
                                    break;
                                }
                            }
                            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                            Err(err) => {
                                failure = Some(metadata::io_error_code(&err));
                                break;
                            }
                        }
                    }
                }
            }
        }

        entry.mark = mark + transferred;
        mmu.write_word(pblock.wrapping_add(6), transferred.min(0xFFFF) as u16);

        if let Some(code) = failure {
            return Err(code);
        }
        // EOF only when nothing at all came back; a short read succeeds
        // and the next call reports EOF.
        if transferred == 0 && request > 0 {
            return Err(ErrorCode::END_OF_FILE);
        }
        Ok(())
    }

    fn call_write(&mut self, mmu: &mut Mmu, pblock: u16) -> MliResult {
        let ref_num = mmu.read_byte(pblock.wrapping_add(1));
        let buf = mmu.read_word(pblock.wrapping_add(2));
        let request = mmu.read_word(pblock.wrapping_add(4)) as u32;

        let entry = self.entry_mut(ref_num)?;
        let mark = entry.mark;

        let mut transferred: u32 = 0;
        let mut failure: Option<u8> = None;

        match &mut entry.backing {
            Backing::Directory(_) => return Err(ErrorCode::ACCESS_DENIED),
            Backing::HostFile(file) => {
                if let Err(err) = file.seek(SeekFrom::Start(mark as u64)) {
                    failure = Some(metadata::io_error_code(&err));
                } else {
                    while transferred < request {
                        let byte = mmu.read_byte(buf.wrapping_add(transferred as u16));
                        match file.write_all(&[byte]) {
                            Ok(()) => transferred += 1,
                            Err(err) => {
                                failure = Some(metadata::io_error_code(&err));
                                break;
                            }
                        }
                    }
                }
            }
        }

        entry.mark = mark + transferred;
        mmu.write_word(pblock.wrapping_add(6), transferred.min(0xFFFF) as u16);

        match failure {
            Some(code) => Err(code),
            None => Ok(()),
        }
    }

    fn call_close(&mut self, mmu: &mut Mmu, pblock: u16) -> MliResult {
        let ref_num = mmu.read_byte(pblock.wrapping_add(1));
        if ref_num == 0 {
            for slot in &mut self.files {
                *slot = None;
            }
            return Ok(());
        }
        self.entry_mut(ref_num)?;
        self.files[ref_num as usize - 1] = None;
        Ok(())
    }

    fn call_flush(&mut self, mmu: &mut Mmu, pblock: u16) -> MliResult {
        let ref_num = mmu.read_byte(pblock.wrapping_add(1));
        if ref_num == 0 {
            for slot in self.files.iter_mut().flatten() {
                flush_entry(slot)?;
            }
            return Ok(());
        }
        let entry = self.entry_mut(ref_num)?;
        flush_entry(entry)
    }

    fn call_set_mark(&mut self, mmu: &mut Mmu, pblock: u16) -> MliResult {
        let ref_num = mmu.read_byte(pblock.wrapping_add(1));
        let position = mmu.read_word24(pblock.wrapping_add(2));

        let entry = self.entry_mut(ref_num)?;
        if position > entry.eof()? {
            return Err(ErrorCode::OUT_OF_RANGE);
        }
        entry.mark = position;
        Ok(())
    }

    fn call_get_mark(&mut self, mmu: &mut Mmu, pblock: u16) -> MliResult {
        let ref_num = mmu.read_byte(pblock.wrapping_add(1));
        let mark = self.entry_mut(ref_num)?.mark;
        mmu.write_word24(pblock.wrapping_add(2), mark);
        Ok(())
    }

    fn call_set_eof(&mut self, mmu: &mut Mmu, pblock: u16) -> MliResult {
        let ref_num = mmu.read_byte(pblock.wrapping_add(1));
        let eof = mmu.read_word24(pblock.wrapping_add(2));

        let entry = self.entry_mut(ref_num)?;
        match &entry.backing {
            Backing::Directory(_) => Err(ErrorCode::ACCESS_DENIED),
            Backing::HostFile(file) => {
                file.set_len(eof as u64)
                    .map_err(|err| metadata::io_error_code(&err))?;
                if entry.mark > eof {
                    entry.mark = eof;
                }
                Ok(())
            }
        }
    }

    fn call_get_eof(&mut self, mmu: &mut Mmu, pblock: u16) -> MliResult {
        let ref_num = mmu.read_byte(pblock.wrapping_add(1));
        let eof = self.entry_mut(ref_num)?.eof()?;
        mmu.write_word24(pblock.wrapping_add(2), eof);
        Ok(())
    }

    // **Buffer / system group**

    fn call_set_buf(&mut self, mmu: &mut Mmu, pblock: u16) -> MliResult {
        let ref_num = mmu.read_byte(pblock.wrapping_add(1));
        let io_buffer = mmu.read_word(pblock.wrapping_add(2));
        self.entry_mut(ref_num)?.io_buffer = io_buffer;
        Ok(())
    }

    fn call_get_buf(&mut self, mmu: &mut Mmu, pblock: u16) -> MliResult {
        let ref_num = mmu.read_byte(pblock.wrapping_add(1));
        let io_buffer = self.entry_mut(ref_num)?.io_buffer;
        mmu.write_word(pblock.wrapping_add(2), io_buffer);
        Ok(())
    }

    fn call_get_time(&mut self, mmu: &mut Mmu) -> MliResult {
        let now = Local::now();
        mmu.write_word(DATE_ADDR, crate::datetime::date_word(&now));
        mmu.write_word(TIME_ADDR, crate::datetime::time_word(&now));
        Ok(())
    }

    fn call_alloc_interrupt(&mut self, mmu: &mut Mmu, pblock: u16) -> MliResult {
        let handler = mmu.read_word(pblock.wrapping_add(2));
        let slot = self
            .interrupts
            .iter()
            .position(|s| s.is_none())
            .ok_or(ErrorCode::INT_TABLE_FULL)?;
        self.interrupts[slot] = Some(handler);
        mmu.write_byte(pblock.wrapping_add(1), slot as u8 + 1);
        Ok(())
    }

    fn call_dealloc_interrupt(&mut self, mmu: &mut Mmu, pblock: u16) -> MliResult {
        let int_num = mmu.read_byte(pblock.wrapping_add(1));
        if !(1..=MAX_INTERRUPTS as u8).contains(&int_num) {
            return Err(ErrorCode::INVALID_PARAMETER);
        }
        self.interrupts[int_num as usize - 1] = None;
        Ok(())
    }
}

/// Read/write open, falling back to read-only where the host denies
/// write access.
fn open_host_file(host: &Path) -> io::Result<File> {
    match OpenOptions::new().read(true).write(true).open(host) {
        Ok(file) => Ok(file),
        Err(err) if err.kind() == io::ErrorKind::PermissionDenied => {
            OpenOptions::new().read(true).open(host)
        }
        Err(err) => Err(err),
    }
}

fn flush_entry(entry: &mut OpenFile) -> MliResult {
    match &mut entry.backing {
        Backing::Directory(_) => Ok(()),
        Backing::HostFile(file) => {
            file.flush()
                .and_then(|_| file.sync_all())
                .map_err(|err| metadata::io_error_code(&err))
        }
    }
}

fn create_error(err: io::Error) -> u8 {
    match err.kind() {
        io::ErrorKind::AlreadyExists => ErrorCode::DUPLICATE_PATH,
        io::ErrorKind::NotFound => ErrorCode::PATH_NOT_FOUND,
        io::ErrorKind::PermissionDenied => ErrorCode::ACCESS_DENIED,
        _ => metadata::io_error_code(&err),
    }
}

/// ON_LINE record: byte 0 packs drive (bit 7), slot (bits 4-6) and name
/// length (bits 0-3); bytes 1-15 hold the name without its leading slash.
fn write_volume_record(mmu: &mut Mmu, addr: u16, index: usize, name: &str) {
    let drive = (index & 1) as u8;
    let slot = (index / 2 + 1) as u8;
    mmu.write_byte(addr, (drive << 7) | (slot << 4) | name.len() as u8);
    for i in 0..15 {
        let byte = name.as_bytes().get(i).copied().unwrap_or(0x00);
        mmu.write_byte(addr.wrapping_add(1 + i as u16), byte);
    }
}

/// The first-parameter pathname of `pblock` as a literal, for the MLI
/// debug log. Best effort only.
pub fn pathname_literal(mmu: &mut Mmu, pblock: u16) -> Option<String> {
    let ptr = mmu.read_word(pblock.wrapping_add(1));
    paths::read_counted_string(mmu, ptr).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> (MliContext, Mmu, tempfile::TempDir) {
        let root = tempfile::tempdir().unwrap();
        (MliContext::new(root.path()), Mmu::new(), root)
    }

    #[test]
    fn unknown_call_number() {
        let (mut mli, mut mmu, _root) = context();
        assert_eq!(mli.dispatch(&mut mmu, 0x7F, 0x0300), ErrorCode::BAD_CALL_NUMBER);
        assert_eq!(mli.dispatch(&mut mmu, 0xFF, 0x0300), ErrorCode::BAD_CALL_NUMBER);
    }

    #[test]
    fn wrong_parameter_count() {
        let (mut mli, mut mmu, _root) = context();
        mmu.write_byte(0x0300, 9); // OPEN expects 3
        assert_eq!(
            mli.dispatch(&mut mmu, Call::OPEN, 0x0300),
            ErrorCode::BAD_PARAM_COUNT
        );
    }

    #[test]
    fn read_and_write_block_are_defined_failures() {
        let (mut mli, mut mmu, _root) = context();
        mmu.write_byte(0x0300, 3);
        assert_eq!(mli.dispatch(&mut mmu, Call::READ_BLOCK, 0x0300), ErrorCode::IO_ERROR);
        assert_eq!(mli.dispatch(&mut mmu, Call::WRITE_BLOCK, 0x0300), ErrorCode::IO_ERROR);
        mmu.write_byte(0x0300, 2);
        assert_eq!(
            mli.dispatch(&mut mmu, Call::READ_BLOCK, 0x0300),
            ErrorCode::BAD_PARAM_COUNT
        );
    }

    #[test]
    fn interrupt_slots_allocate_lowest_first() {
        let (mut mli, mut mmu, _root) = context();
        mmu.write_byte(0x0300, 2);
        mmu.write_word(0x0302, 0x2000);

        for expected in 1..=4u8 {
            assert_eq!(mli.dispatch(&mut mmu, Call::ALLOC_INTERRUPT, 0x0300), 0);
            assert_eq!(mmu.read_byte(0x0301), expected);
        }
        assert_eq!(
            mli.dispatch(&mut mmu, Call::ALLOC_INTERRUPT, 0x0300),
            ErrorCode::INT_TABLE_FULL
        );

        // Free slot 2 and watch it come back first.
        mmu.write_byte(0x0310, 1);
        mmu.write_byte(0x0311, 2);
        assert_eq!(mli.dispatch(&mut mmu, Call::DEALLOC_INTERRUPT, 0x0310), 0);
        assert_eq!(mli.dispatch(&mut mmu, Call::ALLOC_INTERRUPT, 0x0300), 0);
        assert_eq!(mmu.read_byte(0x0301), 2);
    }

    #[test]
    fn dealloc_interrupt_validates_slot_number() {
        let (mut mli, mut mmu, _root) = context();
        mmu.write_byte(0x0300, 1);
        for bad in [0u8, 5, 0xFF] {
            mmu.write_byte(0x0301, bad);
            assert_eq!(
                mli.dispatch(&mut mmu, Call::DEALLOC_INTERRUPT, 0x0300),
                ErrorCode::INVALID_PARAMETER
            );
        }
    }

    #[test]
    fn get_time_fills_the_global_page() {
        let (mut mli, mut mmu, _root) = context();
        mmu.write_byte(0x0300, 0);
        assert_eq!(mli.dispatch(&mut mmu, Call::GET_TIME, 0x0300), 0);
        let date = mmu.read_word(DATE_ADDR);
        assert_ne!(date, 0);
        let month = (date >> 5) & 0x0F;
        assert!((1..=12).contains(&month));
    }

    #[test]
    fn bad_ref_num_everywhere() {
        let (mut mli, mut mmu, _root) = context();
        for call in [
            Call::NEWLINE,
            Call::READ,
            Call::WRITE,
            Call::CLOSE,
            Call::FLUSH,
            Call::SET_MARK,
            Call::GET_MARK,
            Call::SET_EOF,
            Call::GET_EOF,
            Call::SET_BUF,
            Call::GET_BUF,
        ] {
            let count = param_count(call).unwrap();
            mmu.write_byte(0x0300, count);
            mmu.write_byte(0x0301, 3); // never opened
            assert_eq!(
                mli.dispatch(&mut mmu, call, 0x0300),
                ErrorCode::BAD_REF_NUM,
                "call {call:02X}"
            );
        }
    }
}
