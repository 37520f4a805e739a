use color_eyre::eyre::Result;

use bbbd::memory::{Memory, Word};
use bbbd::processor::Processor;
use bbbd::rom;
use log::LevelFilter;
use simple_logger::SimpleLogger;

/// Bit address of the interrupt handler
const HANDLER: Word = 0x60;

fn main() -> Result<()> {
    color_eyre::install()?; // rust error handling
    SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .init()
        .unwrap(); // logging

    use bbbd::processor::Opcode::*;
    let mut bits = rom![MFN, LD1, MTX, NOP];
    bits.resize(HANDLER as usize, false);
    bits.extend(rom![MFN, LDF, MTB, NOP]);

    let mut memory = Memory::default();
    memory.bake(&bits)?;

    let mut cpu = Processor::new(memory);
    cpu.registers.v = HANDLER;
    cpu.registers.irq = true;

    for step in 0..8 {
        let ticks = cpu.execute_instruction()?;

        let regs = &cpu.registers;
        log::info!(
            "step {} ({} ticks): P=0x{:04x} V=0x{:04x} Z=0x{:04x} X=0x{:04x} B=0x{:04x}",
            step,
            ticks,
            regs.p,
            regs.v,
            regs.z,
            regs.x,
            regs.b
        );

        // the host acknowledges the request once the handler runs and raises
        // it again to return
        match step {
            0 | 4 => cpu.registers.irq = false,
            3 => cpu.registers.irq = true,
            _ => {}
        }
    }

    Ok(())
}
