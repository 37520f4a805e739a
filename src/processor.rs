use std::convert::TryFrom;
use std::{error, fmt};

use crate::memory::Memory;
use self::opcode::{bit, with_bit};
use color_eyre::eyre::{Result, WrapErr};
use log::*;
use num_enum::{IntoPrimitive, TryFromPrimitive};

pub mod opcode;
pub mod registers;

pub use opcode::{Dispatch, Opcode};
pub use registers::Registers;

/// Ticks charged when stage 1 fetches the whole opcode at once
const FAST_FETCH_TICKS: usize = 7;

/// Highest instruction address for which the six opcode bits and the
/// following address do not wrap around the top of the address space
const FAST_FETCH_LIMIT: u16 = 0xfff9;

/// Position of the processor within an instruction
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(TryFromPrimitive, IntoPrimitive)]
pub enum Stage {
    /// Power-on state, left after one tick
    Idle = 0,
    FetchAddrAdvance = 1,
    FetchBit2 = 2,
    FetchBit3 = 3,
    FetchBit4 = 4,
    FetchBit5 = 5,
    FetchBit6 = 6,
    FetchBitLast = 7,
    Decode = 8,
    /// `ldr`/`str` only
    MemWait = 9,
    /// `ldr`/`str` only
    MemAccess = 10,
}

impl Default for Stage {
    fn default() -> Self {
        Stage::Idle
    }
}

impl Stage {
    /// The stage after a slow-path opcode bit fetch
    fn after_fetch(self) -> Stage {
        match self {
            Stage::FetchBit2 => Stage::FetchBit3,
            Stage::FetchBit3 => Stage::FetchBit4,
            Stage::FetchBit4 => Stage::FetchBit5,
            Stage::FetchBit5 => Stage::FetchBit6,
            Stage::FetchBit6 => Stage::FetchBitLast,
            _ => Stage::Decode,
        }
    }
}

/// The processor reached a stage/opcode combination outside of the
/// instruction set. Only possible with a corrupted opcode latch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineFault {
    pub stage: Stage,
    pub inst: u8,
}

impl fmt::Display for EngineFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unreachable state: stage {} ({:?}) with inst 0x{:02X}",
            u8::from(self.stage),
            self.stage,
            self.inst
        )
    }
}

impl error::Error for EngineFault {}

/// Emulates the bit-serial CPU
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Processor {
    pub registers: Registers,
    /// Opcode latch
    pub inst: u8,
    pub stage: Stage,
    pub memory: Memory,
}

impl Processor {
    /// Initializes a new CPU working on `memory`
    pub fn new(memory: Memory) -> Self {
        Self {
            memory,
            ..Self::default()
        }
    }

    /// Runs the processor for exactly `ticks` ticks, stopping mid-instruction
    /// if need be. Splitting a budget over several calls ends in the same
    /// state as spending it in one.
    pub fn execute(&mut self, ticks: usize) -> Result<()> {
        let mut remaining = ticks;
        while remaining > 0 {
            remaining -= self.tick(remaining)?;
        }

        Ok(())
    }

    /// Runs until the current instruction retires. Returns the ticks spent.
    pub fn execute_instruction(&mut self) -> Result<usize> {
        let mut spent = 0;
        loop {
            let from = self.stage;
            spent += self.tick(usize::MAX)?;

            let retired = matches!(from, Stage::Decode | Stage::MemAccess);
            if retired && self.stage == Stage::FetchAddrAdvance {
                return Ok(spent);
            }
        }
    }

    /// Performs one stage transition with at most `budget` ticks available.
    /// Returns the ticks charged.
    fn tick(&mut self, budget: usize) -> Result<usize> {
        match self.stage {
            Stage::Idle => {
                self.stage = Stage::FetchAddrAdvance;
                Ok(1)
            }
            Stage::FetchAddrAdvance => {
                let start = self.registers.p;
                self.registers.p = start.wrapping_add(1);

                if start <= FAST_FETCH_LIMIT && budget >= FAST_FETCH_TICKS {
                    self.inst = self.memory.read6(start);
                    self.registers.p = start.wrapping_add(6);
                    self.stage = Stage::Decode;
                    trace!("Fetched 0x{:02X} at 0x{:04x}", self.inst, start);

                    Ok(FAST_FETCH_TICKS)
                } else {
                    self.stage = Stage::FetchBit2;
                    Ok(1)
                }
            }
            Stage::FetchBit2
            | Stage::FetchBit3
            | Stage::FetchBit4
            | Stage::FetchBit5
            | Stage::FetchBit6
            | Stage::FetchBitLast => {
                let index = u8::from(self.stage) - u8::from(Stage::FetchBit2);
                let address = self.registers.p.wrapping_sub(1);
                let mask = 1 << index;
                if self.memory.read(address) {
                    self.inst |= mask;
                } else {
                    self.inst &= !mask;
                }
                trace!("Fetched opcode bit {} at 0x{:04x}", index, address);

                if self.stage != Stage::FetchBitLast {
                    self.registers.p = self.registers.p.wrapping_add(1);
                }
                self.stage = self.stage.after_fetch();
                Ok(1)
            }
            Stage::Decode => {
                let opcode = self.decode()?;
                match opcode.execute(&mut self.registers) {
                    Dispatch::Retire => self.retire(opcode),
                    Dispatch::Defer => self.stage = Stage::MemWait,
                }
                Ok(1)
            }
            Stage::MemWait => {
                self.memory_opcode()?;
                self.stage = Stage::MemAccess;
                Ok(1)
            }
            Stage::MemAccess => {
                let transfer = self.memory_opcode()?;
                let regs = &mut self.registers;
                if transfer == Opcode::LDR {
                    regs.z = with_bit(regs.z, regs.j, self.memory.read(regs.a));
                } else {
                    self.memory.write(regs.a, bit(regs.z, regs.j));
                }
                regs.j = (regs.j + 1) & 0xf;

                self.retire(transfer);
                Ok(1)
            }
        }
    }

    fn decode(&self) -> Result<Opcode> {
        let fault = EngineFault {
            stage: self.stage,
            inst: self.inst,
        };
        Opcode::try_from(self.inst).wrap_err(fault)
    }

    /// The latched opcode, which must be a memory transfer in stages 9 and 10
    fn memory_opcode(&self) -> Result<Opcode> {
        match self.decode()? {
            opcode @ Opcode::LDR | opcode @ Opcode::STR => Ok(opcode),
            _ => Err(EngineFault {
                stage: self.stage,
                inst: self.inst,
            }
            .into()),
        }
    }

    fn retire(&mut self, opcode: Opcode) {
        let regs = &self.registers;
        debug!(
            "{} Z=0x{:04x} X=0x{:04x} Y=0x{:04x} A=0x{:04x} P=0x{:04x} I={} J={} C={}",
            opcode, regs.z, regs.x, regs.y, regs.a, regs.p, regs.i, regs.j, regs.c as u8
        );

        self.registers.check_irq();
        self.stage = Stage::FetchAddrAdvance;
    }
}
