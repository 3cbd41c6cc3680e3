//! End-to-end scenarios: CPU, memory, loader and MLI wired together.

use std::io::Write;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use prodos8::cpu::{Cpu, Flags};
use prodos8::loader::{SystemProgram, SYSTEM_LOAD_ADDR};
use prodos8::mli::MliContext;
use prodos8::mmu::{Mmu, ROM_SIZE};
use prodos8::rom::RomImage;

#[derive(Clone)]
struct Sink(Arc<Mutex<Vec<u8>>>);

impl Sink {
    fn new() -> Self {
        Self(Arc::new(Mutex::new(Vec::new())))
    }

    fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for Sink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// The reset vector sits under the Language Card; write-enable it, plant
/// the vector, and leave LC reads on so `reset` can see it.
fn set_reset_vector(mmu: &mut Mmu, entry: u16) {
    mmu.read_byte(0xC08B);
    mmu.read_byte(0xC08B);
    mmu.write_word(0xFFFC, entry);
}

#[test]
fn cout_vector_jmp_emits_through_the_log() {
    let mut cpu = Cpu::new();
    cpu.mmu.load(0x0400, &[0xA9, 0xC1, 0x6C, 0x36, 0x00, 0xEA]);
    cpu.mmu.write_word(0x0036, 0x0405);
    set_reset_vector(&mut cpu.mmu, 0x0400);

    let cout = Sink::new();
    cpu.set_cout_log(Box::new(cout.clone()));

    cpu.reset();
    assert_eq!(cpu.pc, 0x0400);
    cpu.step();
    cpu.step();
    cpu.step();

    assert_eq!(cout.text(), "A"); // $C1 & $7F
    assert_eq!(cpu.pc, 0x0406);
}

#[test]
fn mli_trap_dispatches_and_sets_cpu_state() {
    let root = TempDir::new().unwrap();

    let mut cpu = Cpu::new();
    // JSR $BF00 / db $40 / dw $0300 / NOP
    cpu.mmu.load(0x0200, &[0x20, 0x00, 0xBF, 0x40, 0x00, 0x03, 0xEA]);
    // ALLOC_INTERRUPT parameter block: count 2, int_num out, handler $2000.
    cpu.mmu.load(0x0300, &[0x02, 0x00, 0x00, 0x20]);
    set_reset_vector(&mut cpu.mmu, 0x0200);

    cpu.attach_mli(MliContext::new(root.path()));
    let log = Sink::new();
    cpu.set_mli_log(Box::new(log.clone()));

    cpu.reset();
    cpu.p.insert(Flags::DECIMAL); // the trap must clear this
    cpu.step();
    cpu.step();

    assert_eq!(cpu.mmu.read_byte(0x0301), 1); // first interrupt slot
    assert_eq!(cpu.regs.a, 0x00);
    assert!(!cpu.p.contains(Flags::CARRY));
    assert!(cpu.p.contains(Flags::ZERO));
    assert!(!cpu.p.contains(Flags::DECIMAL));
    assert_eq!(cpu.pc, 0x0207);

    let text = log.text();
    assert!(text.contains("ALLOC_INTERRUPT"), "{text}");
    assert!(text.contains("result=$00"), "{text}");
}

#[test]
fn mli_trap_failure_sets_carry() {
    let root = TempDir::new().unwrap();

    let mut cpu = Cpu::new();
    // Unknown call $7F.
    cpu.mmu.load(0x0200, &[0x20, 0x00, 0xBF, 0x7F, 0x00, 0x03]);
    set_reset_vector(&mut cpu.mmu, 0x0200);
    cpu.attach_mli(MliContext::new(root.path()));

    cpu.reset();
    cpu.step();

    assert_eq!(cpu.regs.a, 0x01); // bad call number
    assert!(cpu.p.contains(Flags::CARRY));
    assert!(!cpu.p.contains(Flags::ZERO));
    assert_eq!(cpu.pc, 0x0206);
}

#[test]
fn rom_and_language_card_overlay() {
    let mut rom = vec![0x00; ROM_SIZE];
    rom[0] = 0x77; // $D000
    rom[0x2FFC] = 0x62;
    rom[0x2FFD] = 0xFA;

    let mut mmu = Mmu::new();
    mmu.load_rom(RomImage::from_bytes(&rom).unwrap());

    // LC read disabled: the reset vector comes from ROM.
    assert_eq!(mmu.read_word(0xFFFC), 0xFA62);

    // Enable LC read/write, store, and read back.
    mmu.read_byte(0xC08B);
    mmu.read_byte(0xC08B);
    mmu.write_byte(0xD000, 0xAA);
    assert_eq!(mmu.read_byte(0xD000), 0xAA);

    // Back to ROM: the original byte reappears.
    mmu.read_byte(0xC082);
    assert_eq!(mmu.read_byte(0xD000), 0x77);
}

#[test]
fn loaded_system_program_runs_to_stp() {
    // JMP $2003 / STP
    let program =
        SystemProgram::from_bytes(vec![0x4C, 0x03, 0x20, 0xDB], SYSTEM_LOAD_ADDR).unwrap();

    let mut cpu = Cpu::new();
    program.install(&mut cpu.mmu);
    cpu.reset();
    assert_eq!(cpu.pc, 0x2000);

    let executed = cpu.run(1000);
    assert_eq!(executed, 2);
    assert!(cpu.stopped);
    assert_eq!(cpu.pc, 0x2004);

    // Page-3 state left by the loader.
    assert_eq!(cpu.mmu.read_word(0x03F2), 0x2000);
    assert_eq!(cpu.mmu.read_byte(0x03F4), 0xA5);
}

#[test]
fn guest_program_drives_the_mli_end_to_end() {
    let root = TempDir::new().unwrap();
    std::fs::create_dir(root.path().join("V1")).unwrap();
    std::fs::write(root.path().join("V1/GREETING"), b"HI\r").unwrap();

    // JSR $BF00 OPEN($0310); JSR $BF00 READ($0320); STP
    let mut cpu = Cpu::new();
    cpu.mmu.load(
        0x0200,
        &[
            0x20, 0x00, 0xBF, 0xC8, 0x10, 0x03, // OPEN
            0x20, 0x00, 0xBF, 0xCA, 0x20, 0x03, // READ
            0xDB, // STP
        ],
    );
    // OPEN: count 3, pathname $0340, io buffer $4000, ref out.
    cpu.mmu.load(0x0310, &[0x03, 0x40, 0x03, 0x00, 0x40, 0x00]);
    // READ: count 4, ref 1, buffer $2000, request 16, trans out.
    cpu.mmu.load(0x0320, &[0x04, 0x01, 0x00, 0x20, 0x10, 0x00, 0x00, 0x00]);
    cpu.mmu.load(0x0340, &[12]);
    cpu.mmu.load(0x0341, b"/V1/GREETING");
    set_reset_vector(&mut cpu.mmu, 0x0200);
    cpu.attach_mli(MliContext::new(root.path()));

    cpu.reset();
    let executed = cpu.run(100);
    assert_eq!(executed, 3);
    assert!(cpu.stopped);

    assert_eq!(cpu.mmu.read_byte(0x0315), 1); // ref_num
    assert_eq!(cpu.mmu.read_word(0x0326), 3); // trans count
    assert_eq!(cpu.mmu.read_byte(0x2000), b'H');
    assert_eq!(cpu.mmu.read_byte(0x2001), b'I');
    assert_eq!(cpu.mmu.read_byte(0x2002), 0x0D);
    assert_eq!(cpu.regs.a, 0x00);
}
