//! ProDOS system-file loading.
//!
//! A system file is a raw binary entered at a fixed load address. The
//! loader validates the image, copies it into emulated RAM, initializes
//! the warm-start vector and power-up marker on page 3, and points the
//! reset vector at the entry so `Cpu::reset` lands on the program.

use anyhow::{bail, Context, Result};
use log::{debug, log_enabled, Level};
use std::fs;
use std::path::Path;

use crate::mmu::Mmu;
use crate::util::hexdump;

/// Conventional entry point for ProDOS system programs.
pub const SYSTEM_LOAD_ADDR: u16 = 0x2000;

// Programs must fit below the I/O space.
const LOAD_CEILING: u32 = 0xC000;

const WARM_START_VECTOR: u16 = 0x03F2;
const POWER_UP_MARKER: u16 = 0x03F4;
const POWER_UP_BYTE: u8 = 0xA5;

const JMP_ABSOLUTE: u8 = 0x4C;

#[derive(Debug)]
pub struct SystemProgram {
    data: Vec<u8>,
    load_addr: u16,
}

impl SystemProgram {
    pub fn from_file<P: AsRef<Path>>(path: P, load_addr: u16) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read(path)
            .with_context(|| format!("reading system file {}", path.display()))?;
        Self::from_bytes(data, load_addr)
            .with_context(|| format!("loading system file {}", path.display()))
    }

    pub fn from_bytes(data: Vec<u8>, load_addr: u16) -> Result<Self> {
        if data.is_empty() {
            bail!("system file is empty");
        }

        if data[0] != JMP_ABSOLUTE {
            bail!(
                "not a runnable system file: first opcode is ${:02X}, expected $4C (JMP)",
                data[0]
            );
        }

        if u32::from(load_addr) >= LOAD_CEILING {
            bail!("load address ${:04X} is in I/O space", load_addr);
        }

        if u32::from(load_addr) + data.len() as u32 > LOAD_CEILING {
            bail!(
                "system file does not fit: {} bytes at ${:04X} runs past $BFFF",
                data.len(),
                load_addr
            );
        }

        Ok(Self { data, load_addr })
    }

    pub fn entry(&self) -> u16 {
        self.load_addr
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Copy the program into RAM and set up the page-3 vectors: warm
    /// start at $03F2/$03F3 pointing at the entry, the $A5 power-up
    /// marker at $03F4, and the reset vector at the entry. The reset
    /// vector lives under the Language Card, so write-enable it first
    /// and leave it readable for `Cpu::reset`.
    pub fn install(&self, mmu: &mut Mmu) {
        mmu.load(self.load_addr, &self.data);

        mmu.write_word(WARM_START_VECTOR, self.load_addr);
        mmu.write_byte(POWER_UP_MARKER, POWER_UP_BYTE);

        mmu.read_byte(0xC08B);
        mmu.read_byte(0xC08B);
        mmu.write_word(0xFFFC, self.load_addr);

        debug!(
            "system program installed: {} bytes at ${:04X}",
            self.data.len(),
            self.load_addr
        );
        if log_enabled!(Level::Debug) {
            hexdump(&self.data, Some(self.load_addr), Some(self.data.len().min(0x40)));
        }
    }
}
