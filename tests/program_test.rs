//! Assembles source text and runs it on the processor.

use std::fs;

use bbbd::memory::Memory;
use bbbd::processor::{Processor, Stage};
use color_eyre::eyre::Result;

fn run(source: &str, setup: impl FnOnce(&mut Processor), instructions: usize) -> Result<Processor> {
    let memory: Memory = source.parse()?;
    let mut cpu = Processor::new(memory);
    setup(&mut cpu);

    for _ in 0..instructions {
        cpu.execute_instruction()?;
    }
    Ok(cpu)
}

#[test]
fn test_nibble_serial_add() -> Result<()> {
    let cpu = run(
        "mtx sec ad4 ad4 ad4 ad4",
        |cpu| {
            cpu.registers.z = 60000;
            cpu.registers.y = 10000;
            cpu.registers.c = true;
        },
        6,
    )?;

    assert_eq!(cpu.registers.x, 60000);
    assert_eq!(cpu.registers.z, ((60000u32 + 10000 + 1) % 0x10000) as u16);
    assert!(cpu.registers.c);
    assert_eq!(cpu.registers.i, 0);
    assert_eq!(cpu.stage, Stage::FetchAddrAdvance);

    Ok(())
}

#[test]
fn test_add_without_carry_out() -> Result<()> {
    let cpu = run(
        "MFN LD4 LD3 LD2 LD1 MTY ; y = 0x1234\nmfn ldf mtx cli clc ad4 ad4 ad4 ad4",
        |_| {},
        15,
    )?;

    assert_eq!(cpu.registers.y, 0x1234);
    assert_eq!(cpu.registers.x, 0x000f);
    assert_eq!(cpu.registers.z, 0x1243);
    assert!(!cpu.registers.c);

    Ok(())
}

#[test]
fn test_store_then_load() -> Result<()> {
    // a = 0x8000, z = 0b101, store three bits, clear z and load them back
    let source = "
        define base 0x8000
        mfn ld0 ld0 ld0 ld8 mta
        mfn ld5 clj
        str str str
        mfn clj
        ldr ldr ldr
    ";
    let mut cpu = run(source, |_| {}, 9)?;
    assert_eq!((cpu.registers.a, cpu.registers.z), (0x8000, 0b101));
    for _ in 0..3 {
        cpu.execute_instruction()?;
        cpu.registers.a += 1;
    }
    assert_eq!(cpu.registers.a, 0x8003);
    assert!(cpu.memory.read(0x8000));
    assert!(!cpu.memory.read(0x8001));
    assert!(cpu.memory.read(0x8002));

    cpu.registers.a = 0x8000;
    cpu.execute_instruction()?;
    cpu.execute_instruction()?;
    assert_eq!((cpu.registers.z, cpu.registers.j), (0, 0));
    for _ in 0..3 {
        cpu.execute_instruction()?;
        cpu.registers.a += 1;
    }
    assert_eq!(cpu.registers.z, 0b101);
    assert_eq!(cpu.registers.j, 3);

    Ok(())
}

#[test]
fn test_from_file() -> Result<()> {
    let path = std::env::temp_dir().join(format!("bbbd-program-{}.asm", std::process::id()));
    fs::write(&path, "define three 3\nmfn ld3 mtx ; x = 3\n")?;
    let memory = Memory::from_file(&path);
    fs::remove_file(&path)?;

    let mut cpu = Processor::new(memory?);
    for _ in 0..3 {
        cpu.execute_instruction()?;
    }
    assert_eq!(cpu.registers.x, 3);

    assert!(Memory::from_file(std::env::temp_dir().join("bbbd-missing.asm")).is_err());

    Ok(())
}

#[test]
fn test_rejected_sources() -> Result<()> {
    assert!("mfn undefined".parse::<Memory>().is_err());
    assert!("define x (1".parse::<Memory>().is_err());
    // assembles, but the unterminated quote is still reported
    assert!("define x 'abc".parse::<Memory>().is_err());

    let err = "mfn\nloop:\nloop:".parse::<Memory>().err();
    let message = err.map(|err| err.to_string()).unwrap_or_default();
    assert!(message.contains("<str>:3:1"), "{}", message);

    Ok(())
}
