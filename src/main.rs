use anyhow::{bail, Context, Result};
use clap::Parser;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use prodos8::cpu::{format_flags, Cpu};
use prodos8::loader::{SystemProgram, SYSTEM_LOAD_ADDR};
use prodos8::mli::MliContext;
use prodos8::rom::RomImage;

#[derive(Parser)]
#[command(version, about = "ProDOS 8 system-file emulator")]
struct Args {
    /// ProDOS system file to run (raw binary, entered at $2000)
    system_file: PathBuf,

    /// Host directory whose first-level subdirectories are the online volumes
    #[arg(long, default_value = "volumes")]
    volumes_root: PathBuf,

    /// Optional 12 KiB ROM image for $D000-$FFFF
    #[arg(long)]
    rom: Option<PathBuf>,

    /// Stop after this many instructions
    #[arg(long, default_value_t = 500_000_000)]
    max_instructions: u64,

    /// Write one line per MLI call here ("-" for stderr)
    #[arg(long)]
    mli_log: Option<PathBuf>,

    /// Mirror COUT output here ("-" for stdout)
    #[arg(long)]
    cout_log: Option<PathBuf>,

    /// Print a register trace for every instruction
    #[arg(long)]
    trace: bool,
}

fn open_sink(path: &Path, dash: fn() -> Box<dyn Write>) -> Result<Box<dyn Write>> {
    if path.as_os_str() == "-" {
        return Ok(dash());
    }
    let file =
        File::create(path).with_context(|| format!("creating log file {}", path.display()))?;
    Ok(Box::new(file))
}

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();

    if !args.volumes_root.is_dir() {
        bail!(
            "volumes root {} is not a directory",
            args.volumes_root.display()
        );
    }

    let mut cpu = Cpu::new();

    if let Some(rom_path) = &args.rom {
        cpu.mmu.load_rom(RomImage::from_file(rom_path)?);
    }

    let program = SystemProgram::from_file(&args.system_file, SYSTEM_LOAD_ADDR)?;
    program.install(&mut cpu.mmu);
    println!(
        "Loaded {} ({} bytes at ${:04X})",
        args.system_file.display(),
        program.len(),
        program.entry()
    );

    cpu.attach_mli(MliContext::new(&args.volumes_root));

    if let Some(path) = &args.mli_log {
        cpu.set_mli_log(open_sink(path, || Box::new(io::stderr()))?);
    }
    if let Some(path) = &args.cout_log {
        cpu.set_cout_log(open_sink(path, || Box::new(io::stdout()))?);
    }

    cpu.reset();

    let executed = if args.trace {
        run_traced(&mut cpu, args.max_instructions)
    } else {
        cpu.run(args.max_instructions)
    };

    let reason = if cpu.stopped {
        "STP executed"
    } else if cpu.waiting {
        "WAI executed"
    } else {
        "instruction limit reached"
    };

    println!("Execution finished: {} ({} instructions)", reason, executed);
    println!(
        "PC={:#06X} A={:#04X} X={:#04X} Y={:#04X} SP={:#04X} P={}",
        cpu.pc,
        cpu.regs.a,
        cpu.regs.x,
        cpu.regs.y,
        cpu.regs.sp,
        format_flags(cpu.p.bits()),
    );

    Ok(())
}

fn run_traced(cpu: &mut Cpu, max_instructions: u64) -> u64 {
    let mut executed = 0;
    while executed < max_instructions {
        if cpu.stopped || cpu.waiting {
            break;
        }
        let pc = cpu.pc;
        let opcode = {
            // Peek without disturbing soft-switch state: the program
            // counter never points into $C080-$C08F in practice.
            cpu.mmu.read_byte(pc)
        };
        let cycles = cpu.step();
        println!(
            "{:04X}: {:02X}  A:{:02X} X:{:02X} Y:{:02X} SP:{:02X} P:{} ({} cyc)",
            pc,
            opcode,
            cpu.regs.a,
            cpu.regs.x,
            cpu.regs.y,
            cpu.regs.sp,
            format_flags(cpu.p.bits()),
            cycles,
        );
        executed += 1;
    }
    executed
}
