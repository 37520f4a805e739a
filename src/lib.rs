//! Assembler and cycle accurate emulator for a 16-bit bit-serial CPU.
//!
//! Source text is split into tokens by [`assembler::lexer`], turned into a
//! bit sequence by [`assembler::assemble`] and baked into the ROM of a
//! [`memory::Memory`]. A [`processor::Processor`] then runs it tick by tick.

pub mod assembler;
pub mod memory;
pub mod processor;
