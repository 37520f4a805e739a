use std::{env, fs, process};

use bbbd::assembler::{self, lexer};
use bbbd::memory::Memory;
use bbbd::processor::Processor;
use color_eyre::eyre::Result;
use log::LevelFilter;
use simple_logger::SimpleLogger;

/// Ticks the processor runs once the program is baked
const TICK_BUDGET: usize = 0x100;

const EXIT_USAGE: i32 = 1;
const EXIT_OPEN: i32 = 2;
const EXIT_ASSEMBLE: i32 = 3;
const EXIT_RUNTIME: i32 = 4;

fn main() -> Result<()> {
    color_eyre::install()?;
    SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .env()
        .init()?;

    let path = match env::args().nth(1) {
        Some(path) => path,
        None => {
            log::error!("usage: bbbd <source.asm>");
            process::exit(EXIT_USAGE);
        }
    };

    let source = match fs::read_to_string(&path) {
        Ok(source) => source,
        Err(err) => {
            log::error!("failed to open `{}`: {}", path, err);
            process::exit(EXIT_OPEN);
        }
    };

    let tokens = lexer::tokenize(&source, &path);
    let faulty = lexer::check_token_errors(&tokens);
    if faulty > 0 {
        log::warn!("{} lexical error(s), assembling anyway", faulty);
    }

    let bits = match assembler::assemble(&tokens) {
        Ok(bits) => bits,
        Err(err) if err.is_io() => {
            log::error!("{}", err);
            process::exit(EXIT_RUNTIME);
        }
        Err(err) => {
            log::error!("{}", err);
            process::exit(EXIT_ASSEMBLE);
        }
    };

    let mut memory = Memory::default();
    if let Err(err) = memory.bake(&bits) {
        log::error!("{}", err);
        process::exit(EXIT_RUNTIME);
    }

    let mut cpu = Processor::new(memory);
    if let Err(err) = cpu.execute(TICK_BUDGET) {
        log::error!("{:?}", err);
        process::exit(EXIT_RUNTIME);
    }

    let regs = &cpu.registers;
    log::info!("Z={} X={} Y={} C={}", regs.z, regs.x, regs.y, regs.c as u8);

    Ok(())
}
