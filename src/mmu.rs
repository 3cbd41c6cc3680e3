use crate::memory::Bank;
use crate::rom::RomImage;

pub const ROM_SIZE: usize = 12 * 1024;

const BANK_COUNT: usize = 16;
const SS_BASE: u16 = 0xC080;
const SS_END: u16 = 0xC08F;
const LC_BASE: u16 = 0xD000;

/// Language Card soft-switch state.
///
/// `prewrite` is the one-step write-enable latch: it remembers that the
/// previous access was a read of a write-enabling switch. Any non-qualifying
/// access clears it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LcState {
    pub lc_read: bool,
    pub lc_write: bool,
    pub bank1: bool,
    pub prewrite: bool,
}

impl LcState {
    fn reset() -> Self {
        Self {
            lc_read: false,
            lc_write: false,
            bank1: true,
            prewrite: false,
        }
    }
}

/// The banked 64 KiB address space.
///
/// Sixteen 4 KiB banks compose the address space; bank `addr >> 12`, offset
/// `addr & 0x0FFF`. Banks 0-12 are plain RAM. Banks 13-15 sit under the
/// Language Card: reads and writes route independently between LC RAM and
/// the 12 KiB ROM overlay according to `LcState`. The $D000 region has two
/// swappable LC banks; $E000-$FFFF is a single shared LC region.
pub struct Mmu {
    banks: [Bank; BANK_COUNT],
    lc_bank2: Bank,
    rom: Vec<u8>,
    lc: LcState,
}

impl Mmu {
    pub fn new() -> Self {
        Self {
            banks: Default::default(),
            lc_bank2: Bank::new(),
            rom: vec![0x00; ROM_SIZE],
            lc: LcState::reset(),
        }
    }

    /// Zero all RAM banks and return the Language Card to its power-on
    /// state. The ROM image survives.
    pub fn reset(&mut self) {
        for bank in &mut self.banks {
            bank.fill(0x00);
        }
        self.lc_bank2.fill(0x00);
        self.lc = LcState::reset();
    }

    pub fn load_rom(&mut self, rom: RomImage) {
        self.rom = rom.into_data();
    }

    pub fn lc_state(&self) -> LcState {
        self.lc
    }

    fn lc_d000(&self) -> &Bank {
        if self.lc.bank1 {
            &self.banks[13]
        } else {
            &self.lc_bank2
        }
    }

    fn lc_d000_mut(&mut self) -> &mut Bank {
        if self.lc.bank1 {
            &mut self.banks[13]
        } else {
            &mut self.lc_bank2
        }
    }

    pub fn read_byte(&mut self, addr: u16) -> u8 {
        if (SS_BASE..=SS_END).contains(&addr) {
            self.softswitch_read((addr - SS_BASE) as u8);
        }

        match addr {
            // Main RAM, including the $C000 I/O page.
            0x0000..=0xCFFF => self.banks[(addr >> 12) as usize].read_byte(addr & 0x0FFF),

            0xD000..=0xDFFF => {
                if self.lc.lc_read {
                    self.lc_d000().read_byte(addr & 0x0FFF)
                } else {
                    self.rom[(addr - LC_BASE) as usize]
                }
            }

            0xE000..=0xFFFF => {
                if self.lc.lc_read {
                    self.banks[(addr >> 12) as usize].read_byte(addr & 0x0FFF)
                } else {
                    self.rom[(addr - LC_BASE) as usize]
                }
            }
        }
    }

    pub fn write_byte(&mut self, addr: u16, value: u8) {
        if (SS_BASE..=SS_END).contains(&addr) {
            self.softswitch_write((addr - SS_BASE) as u8);
        }

        match addr {
            0x0000..=0xCFFF => self.banks[(addr >> 12) as usize].write_byte(addr & 0x0FFF, value),

            0xD000..=0xDFFF => {
                if self.lc.lc_write {
                    self.lc_d000_mut().write_byte(addr & 0x0FFF, value);
                }
            }

            0xE000..=0xFFFF => {
                if self.lc.lc_write {
                    self.banks[(addr >> 12) as usize].write_byte(addr & 0x0FFF, value);
                }
            }
        }
    }

    pub fn read_word(&mut self, addr: u16) -> u16 {
        let lo = self.read_byte(addr) as u16;
        let hi = self.read_byte(addr.wrapping_add(1)) as u16;
        (hi << 8) | lo
    }

    pub fn write_word(&mut self, addr: u16, value: u16) {
        self.write_byte(addr, (value & 0xFF) as u8);
        self.write_byte(addr.wrapping_add(1), (value >> 8) as u8);
    }

    /// 24-bit little-endian read, used for MARK/EOF parameter fields.
    pub fn read_word24(&mut self, addr: u16) -> u32 {
        let b0 = self.read_byte(addr) as u32;
        let b1 = self.read_byte(addr.wrapping_add(1)) as u32;
        let b2 = self.read_byte(addr.wrapping_add(2)) as u32;
        (b2 << 16) | (b1 << 8) | b0
    }

    pub fn write_word24(&mut self, addr: u16, value: u32) {
        self.write_byte(addr, (value & 0xFF) as u8);
        self.write_byte(addr.wrapping_add(1), ((value >> 8) & 0xFF) as u8);
        self.write_byte(addr.wrapping_add(2), ((value >> 16) & 0xFF) as u8);
    }

    pub fn load(&mut self, start: u16, bytes: &[u8]) {
        for (i, &byte) in bytes.iter().enumerate() {
            self.write_byte(start.wrapping_add(i as u16), byte);
        }
    }

    // **Language Card soft switches ($C080 + k)**
    //
    // k bit 3 selects the $D000 LC bank (set = bank 1). k bits 1-0:
    //   00  read LC RAM, write protect
    //   01  read ROM,    write-enable attempt
    //   10  read ROM,    write protect
    //   11  read LC RAM, write-enable attempt
    fn softswitch_read(&mut self, k: u8) {
        self.lc.bank1 = k & 0x08 != 0;

        let cmd = k & 0x03;
        self.lc.lc_read = cmd == 0b00 || cmd == 0b11;

        if cmd & 0b01 != 0 {
            // Write enable takes two consecutive qualifying reads.
            if self.lc.prewrite {
                self.lc.lc_write = true;
                self.lc.prewrite = false;
            } else {
                self.lc.prewrite = true;
            }
        } else {
            self.lc.prewrite = false;
            self.lc.lc_write = false;
        }
    }

    // A write access selects bank and read policy like a read, but can
    // never arm or complete write enable: it drops the latch and write
    // permission instead.
    fn softswitch_write(&mut self, k: u8) {
        self.lc.bank1 = k & 0x08 != 0;

        let cmd = k & 0x03;
        self.lc.lc_read = cmd == 0b00 || cmd == 0b11;

        self.lc.prewrite = false;
        self.lc.lc_write = false;
    }
}

impl Default for Mmu {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rom_with(offset: usize, bytes: &[u8]) -> RomImage {
        let mut data = vec![0x00; ROM_SIZE];
        data[offset..offset + bytes.len()].copy_from_slice(bytes);
        RomImage::from_bytes(&data).unwrap()
    }

    // Double read of a write-enabling switch; leaves LC read per cmd.
    fn enable_lc_write(mmu: &mut Mmu) {
        mmu.read_byte(0xC08B);
        mmu.read_byte(0xC08B);
    }

    #[test]
    fn main_ram_round_trips() {
        let mut mmu = Mmu::new();
        for addr in [0x0000u16, 0x00FF, 0x0800, 0x7FFF, 0xBFFF, 0xC000, 0xC07F, 0xCFFF] {
            mmu.write_byte(addr, 0x42);
            assert_eq!(mmu.read_byte(addr), 0x42, "addr {addr:04X}");
        }
    }

    #[test]
    fn word_write_wraps_at_top_of_memory() {
        let mut mmu = Mmu::new();
        mmu.write_word(0xFFFF, 0xBEEF);
        // Low byte at $FFFF (discarded, LC write off); high byte wraps to $0000.
        assert_eq!(mmu.read_byte(0x0000), 0xBE);
        enable_lc_write(&mut mmu);
        mmu.write_word(0xFFFF, 0xBEEF);
        mmu.read_byte(0xC08B); // back to LC read
        mmu.read_byte(0xC08B);
        assert_eq!(mmu.read_byte(0xFFFF), 0xEF);
    }

    #[test]
    fn word_write_crosses_bank_boundary() {
        let mut mmu = Mmu::new();
        mmu.write_word(0x0FFF, 0x1234);
        assert_eq!(mmu.read_byte(0x0FFF), 0x34);
        assert_eq!(mmu.read_byte(0x1000), 0x12);
    }

    #[test]
    fn word24_round_trips() {
        let mut mmu = Mmu::new();
        mmu.write_word24(0x2000, 0x0ABCDE);
        assert_eq!(mmu.read_word24(0x2000), 0x0ABCDE);
        assert_eq!(mmu.read_byte(0x2000), 0xDE);
        assert_eq!(mmu.read_byte(0x2002), 0x0A);
    }

    #[test]
    fn rom_visible_when_lc_read_disabled() {
        let mut mmu = Mmu::new();
        mmu.load_rom(rom_with(0x2FFC, &[0x62, 0xFA]));
        assert_eq!(mmu.read_word(0xFFFC), 0xFA62);
        assert_eq!(mmu.read_byte(0xD000), 0x00);
    }

    #[test]
    fn lc_ram_overlays_rom_after_enable() {
        let mut mmu = Mmu::new();
        mmu.load_rom(rom_with(0x0000, &[0x77]));

        enable_lc_write(&mut mmu);
        mmu.write_byte(0xD000, 0xAA);
        assert_eq!(mmu.read_byte(0xD000), 0xAA);

        // ROMIN: read ROM again, LC RAM keeps its contents.
        mmu.read_byte(0xC081);
        assert_eq!(mmu.read_byte(0xD000), 0x77);
        mmu.read_byte(0xC08B);
        mmu.read_byte(0xC08B);
        assert_eq!(mmu.read_byte(0xD000), 0xAA);
    }

    #[test]
    fn write_needs_two_qualifying_reads() {
        let mut mmu = Mmu::new();
        mmu.read_byte(0xC08B);
        assert!(mmu.lc_state().prewrite);
        assert!(!mmu.lc_state().lc_write);
        mmu.read_byte(0xC08B);
        assert!(!mmu.lc_state().prewrite);
        assert!(mmu.lc_state().lc_write);
    }

    #[test]
    fn non_enabling_read_clears_latch_and_write() {
        let mut mmu = Mmu::new();
        enable_lc_write(&mut mmu);
        assert!(mmu.lc_state().lc_write);
        mmu.read_byte(0xC088); // cmd 00: read LC, write protect
        assert!(!mmu.lc_state().lc_write);
        assert!(!mmu.lc_state().prewrite);
        assert!(mmu.lc_state().lc_read);
    }

    #[test]
    fn softswitch_write_access_drops_write_enable() {
        let mut mmu = Mmu::new();
        mmu.read_byte(0xC08B);
        mmu.write_byte(0xC08B, 0x00);
        assert!(!mmu.lc_state().prewrite);
        mmu.read_byte(0xC08B);
        // The earlier arm was cancelled, so this is the first read again.
        assert!(!mmu.lc_state().lc_write);
    }

    #[test]
    fn d000_banks_are_independent() {
        let mut mmu = Mmu::new();
        // Bank 1: C088-C08F. Bank 2: C080-C087.
        mmu.read_byte(0xC08B);
        mmu.read_byte(0xC08B);
        mmu.write_byte(0xD123, 0x11);

        mmu.read_byte(0xC083);
        mmu.read_byte(0xC083);
        mmu.write_byte(0xD123, 0x22);
        assert_eq!(mmu.read_byte(0xD123), 0x22);

        mmu.read_byte(0xC08B);
        mmu.read_byte(0xC08B);
        assert_eq!(mmu.read_byte(0xD123), 0x11);

        // $E000 region is shared between the two selections.
        mmu.write_byte(0xE010, 0x33);
        mmu.read_byte(0xC083);
        mmu.read_byte(0xC083);
        assert_eq!(mmu.read_byte(0xE010), 0x33);
    }

    #[test]
    fn lc_write_protect_discards_stores() {
        let mut mmu = Mmu::new();
        enable_lc_write(&mut mmu);
        mmu.write_byte(0xE000, 0x55);
        mmu.read_byte(0xC088); // write protect, read LC
        mmu.write_byte(0xE000, 0x99);
        assert_eq!(mmu.read_byte(0xE000), 0x55);
    }

    #[test]
    fn reset_restores_power_on_state() {
        let mut mmu = Mmu::new();
        enable_lc_write(&mut mmu);
        mmu.write_byte(0x1234, 0x77);
        mmu.reset();
        assert_eq!(mmu.read_byte(0x1234), 0x00);
        assert_eq!(mmu.lc_state(), LcState::reset());
    }
}
