use color_eyre::eyre::Result;

use bbbd::memory::Memory;
use bbbd::processor::Processor;
use log::LevelFilter;
use simple_logger::SimpleLogger;

/// Copies the 16 bits starting at A into B, one bit per pass through the loop
const PROGRAM: &str = "
cli clj mfn mty
; loop:
mfb ldr mtb mfa
mtx sec
ad4 ad4 ad4 ad4
mtx
ld6 ld9 ld0 ld0
mta mfj
bzz mfx mta
ld8 ld1 ld0 ld0
mtp
; end:
";

fn main() -> Result<()> {
    color_eyre::install()?; // rust error handling
    SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .init()
        .unwrap(); // logging

    let memory: Memory = PROGRAM.parse()?;
    let mut cpu = Processor::new(memory);
    cpu.registers.x = 60000;
    cpu.registers.y = 10000;
    cpu.registers.c = true;

    cpu.execute(0x100)?;

    let regs = &cpu.registers;
    log::info!("Z={} X={} Y={} C={}", regs.z, regs.x, regs.y, regs.c as u8);
    cpu.memory.dump();

    Ok(())
}
