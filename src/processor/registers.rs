use crate::memory::Word;

/// The register file. Every register starts out cleared.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Registers {
    /// Accumulator and data latch
    pub z: Word,
    pub x: Word,
    pub y: Word,
    /// Also the memory address for `ldr`/`str` and the branch target
    pub a: Word,
    pub b: Word,
    pub d: Word,
    pub e: Word,
    /// Program counter
    pub p: Word,
    /// Interrupt vector
    pub v: Word,
    /// Temporary
    pub t: Word,
    /// Bit/nibble index, wraps modulo 16
    pub i: u8,
    /// Bit index for memory transfers, wraps modulo 16
    pub j: u8,
    /// Carry
    pub c: bool,
    /// Interrupt mask
    pub m: bool,
    /// Interrupt request line
    pub irq: bool,
}

impl Registers {
    /// Swaps P and V through T when an unmasked interrupt is pending.
    ///
    /// Running it again after the handler swaps back, so the same exchange
    /// doubles as the return from interrupt.
    pub fn check_irq(&mut self) {
        if !self.m && self.irq {
            self.t = self.p;
            self.p = self.v;
            self.v = self.t;

            log::debug!("IRQ: P=0x{:04x} V=0x{:04x}", self.p, self.v);
        }
    }
}
