use num_enum::{IntoPrimitive, TryFromPrimitive};

use super::registers::Registers;
use crate::memory::Word;

/// What the processor does once an opcode has been decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// The instruction is done; check for interrupts and fetch the next one
    Retire,
    /// The instruction waits for the memory sub-stages
    Defer,
}

macro_rules! instructions {
    ( $( $( #[doc = $doc:expr] )+ $name:ident = $repr:literal , )+ ) => {
        /// Defines the 64 opcodes of the instruction set
        #[repr(u8)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[derive(TryFromPrimitive, IntoPrimitive)]
        pub enum Opcode {
            $(
                $( #[doc = $doc] )+
                $name = $repr,
            )+
        }

        impl Opcode {
            pub const ALL: &'static [Self] = &[
                $( Self::$name , )+
            ];

            pub fn name(&self) -> &'static str {
                match self {
                    $( Self::$name => stringify!($name) , )+
                }
            }
        }

        impl ::std::fmt::Display for Opcode {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                match self {
                    $( Self::$name => f.write_str(stringify!($name)) , )+
                }
            }
        }
    }
}

instructions! {
    /// No operation (also `mtn`)
    NOP = 0,
    /// X = Z
    MTX = 1,
    /// Y = Z
    MTY = 2,
    /// A = Z
    MTA = 3,
    /// B = Z
    MTB = 4,
    /// D = Z
    MTD = 5,
    /// E = Z
    MTE = 6,
    /// P = Z (jump)
    MTP = 7,
    /// Z = 0
    MFN = 8,
    /// Z = X
    MFX = 9,
    /// Z = Y
    MFY = 10,
    /// Z = A
    MFA = 11,
    /// Z = B
    MFB = 12,
    /// Z = D
    MFD = 13,
    /// Z = E
    MFE = 14,
    /// Z = P
    MFP = 15,
    /// Z[I] = X[I], I += 1
    BSE = 16,
    /// Z[I] = !X[I], I += 1
    BNT = 17,
    /// Z[I] = X[I] | Y[I], I += 1
    BOR = 18,
    /// Z[I] = X[I] & Y[I], I += 1
    BAN = 19,
    /// Z[I] = X[I] ^ Y[I], I += 1
    BXO = 20,
    /// Z = !Z
    NOT = 21,
    /// Z = X rotated left, bit I cleared
    SHL = 22,
    /// Z = X rotated right, bit I-1 cleared
    SHR = 23,
    /// Z = X rotated right, bit I-1 kept from X
    ASR = 24,
    /// Z = X rotated right
    ROR = 25,
    /// Adds bit I of X and Y with carry into bit I of Z, I += 1
    AD1 = 26,
    /// Adds nibble I of X and Y with carry into nibble I of Z, I += 4
    AD4 = 27,
    /// Z[J] = memory[A], J += 1
    LDR = 28,
    /// memory[A] = Z[J], J += 1
    STR = 29,
    /// J = nibble I of Z
    MTJ = 30,
    /// Z = J
    MFJ = 31,
    /// Loads 0x0 into nibble I of Z, I += 4
    LD0 = 32,
    /// Loads 0x1 into nibble I of Z, I += 4
    LD1 = 33,
    /// Loads 0x2 into nibble I of Z, I += 4
    LD2 = 34,
    /// Loads 0x3 into nibble I of Z, I += 4
    LD3 = 35,
    /// Loads 0x4 into nibble I of Z, I += 4
    LD4 = 36,
    /// Loads 0x5 into nibble I of Z, I += 4
    LD5 = 37,
    /// Loads 0x6 into nibble I of Z, I += 4
    LD6 = 38,
    /// Loads 0x7 into nibble I of Z, I += 4
    LD7 = 39,
    /// Loads 0x8 into nibble I of Z, I += 4
    LD8 = 40,
    /// Loads 0x9 into nibble I of Z, I += 4
    LD9 = 41,
    /// Loads 0xa into nibble I of Z, I += 4
    LDA = 42,
    /// Loads 0xb into nibble I of Z, I += 4
    LDB = 43,
    /// Loads 0xc into nibble I of Z, I += 4
    LDC = 44,
    /// Loads 0xd into nibble I of Z, I += 4
    LDD = 45,
    /// Loads 0xe into nibble I of Z, I += 4
    LDE = 46,
    /// Loads 0xf into nibble I of Z, I += 4
    LDF = 47,
    /// C = 0
    CLC = 48,
    /// C = 1
    SEC = 49,
    /// M = 0
    CLM = 50,
    /// M = 1
    SEM = 51,
    /// I = 0
    CLI = 52,
    /// J = 0
    CLJ = 53,
    /// P = A if Z is zero
    BZZ = 54,
    /// P = A if C is clear
    BCC = 55,
    /// V = Z
    MTV = 56,
    /// Z = V
    MFV = 57,
    /// I = nibble I of Z
    MTI = 58,
    /// Z = I
    MFI = 59,
    /// C = Z[I]
    MTC = 60,
    /// Z = C
    MFC = 61,
    /// M = Z[I]
    MTM = 62,
    /// Z = M
    MFM = 63,
}

impl Opcode {
    /// Mnemonics that encode to an already named opcode
    pub const ALIASES: &'static [(&'static str, Opcode)] = &[("mtn", Opcode::NOP)];

    /// The 6 encoded bits, least significant first
    pub fn bits(self) -> [bool; 6] {
        let value = self as u8;
        let mut bits = [false; 6];
        for (i, bit) in bits.iter_mut().enumerate() {
            *bit = (value >> i) & 1 == 1;
        }
        bits
    }

    /// Applies the decode-stage effect of the opcode to `regs`
    pub fn execute(self, regs: &mut Registers) -> Dispatch {
        use Opcode::*;

        match self {
            NOP => {}
            MTX => regs.x = regs.z,
            MTY => regs.y = regs.z,
            MTA => regs.a = regs.z,
            MTB => regs.b = regs.z,
            MTD => regs.d = regs.z,
            MTE => regs.e = regs.z,
            MTP => regs.p = regs.z,
            MFN => regs.z = 0,
            MFX => regs.z = regs.x,
            MFY => regs.z = regs.y,
            MFA => regs.z = regs.a,
            MFB => regs.z = regs.b,
            MFD => regs.z = regs.d,
            MFE => regs.z = regs.e,
            MFP => regs.z = regs.p,
            BSE => bitwise(regs, |x, _| x),
            BNT => bitwise(regs, |x, _| !x),
            BOR => bitwise(regs, |x, y| x | y),
            BAN => bitwise(regs, |x, y| x & y),
            BXO => bitwise(regs, |x, y| x ^ y),
            NOT => regs.z = !regs.z,
            SHL => {
                regs.t = regs.x.rotate_left(1);
                regs.z = with_bit(regs.t, regs.i, false);
            }
            SHR => {
                regs.t = regs.x.rotate_right(1);
                regs.z = with_bit(regs.t, regs.i.wrapping_sub(1), false);
            }
            ASR => {
                let index = regs.i.wrapping_sub(1);
                regs.t = regs.x.rotate_right(1);
                regs.z = with_bit(regs.t, index, bit(regs.x, index));
            }
            ROR => regs.z = regs.x.rotate_right(1),
            AD1 => {
                regs.t = bit(regs.x, regs.i) as Word + bit(regs.y, regs.i) as Word + regs.c as Word;
                regs.c = regs.t & 0b10 != 0;
                regs.z = with_bit(regs.z, regs.i, regs.t & 1 == 1);
                regs.i = (regs.i + 1) & 0xf;
            }
            AD4 => {
                let i = regs.i as u32;
                let sum = (regs.x.rotate_right(i) & 0xf) + (regs.y.rotate_right(i) & 0xf) + regs.c as Word;
                regs.c = sum & 0x10 != 0;
                load_nibble(regs, sum & 0xf);
            }
            LDR | STR => return Dispatch::Defer,
            MTJ => regs.j = index_nibble(regs),
            MFJ => regs.z = regs.j as Word,
            LD0 | LD1 | LD2 | LD3 | LD4 | LD5 | LD6 | LD7 | LD8 | LD9 | LDA | LDB | LDC | LDD
            | LDE | LDF => load_nibble(regs, (self as u8 - LD0 as u8) as Word),
            CLC => regs.c = false,
            SEC => regs.c = true,
            CLM => regs.m = false,
            SEM => regs.m = true,
            CLI => regs.i = 0,
            CLJ => regs.j = 0,
            BZZ => {
                if regs.z == 0 {
                    regs.p = regs.a;
                }
            }
            BCC => {
                if !regs.c {
                    regs.p = regs.a;
                }
            }
            MTV => regs.v = regs.z,
            MFV => regs.z = regs.v,
            MTI => regs.i = index_nibble(regs),
            MFI => regs.z = regs.i as Word,
            MTC => regs.c = bit(regs.z, regs.i),
            MFC => regs.z = regs.c as Word,
            MTM => regs.m = bit(regs.z, regs.i),
            MFM => regs.z = regs.m as Word,
        }

        Dispatch::Retire
    }
}

/// Tests bit `index` (mod 16) of `word`
pub(crate) fn bit(word: Word, index: u8) -> bool {
    (word >> (index & 0xf)) & 1 == 1
}

/// Returns `word` with bit `index` (mod 16) set to `value`
pub(crate) fn with_bit(word: Word, index: u8, value: bool) -> Word {
    let mask = 1 << (index & 0xf);
    if value {
        word | mask
    } else {
        word & !mask
    }
}

/// Z[I] = op(X[I], Y[I]), then advances I
fn bitwise(regs: &mut Registers, op: impl Fn(bool, bool) -> bool) {
    let value = op(bit(regs.x, regs.i), bit(regs.y, regs.i));
    regs.z = with_bit(regs.z, regs.i, value);
    regs.i = (regs.i + 1) & 0xf;
}

/// Replaces the nibble of Z starting at bit I, then advances I by a nibble.
/// T keeps the rotated intermediate.
fn load_nibble(regs: &mut Registers, nibble: Word) {
    let i = regs.i as u32;
    regs.t = (regs.z.rotate_right(i) & 0xfff0) | nibble;
    regs.z = regs.t.rotate_left(i);
    regs.i = (regs.i + 4) & 0xf;
}

/// Low nibble of `(Z << (16 - I)) | (X >> I)`, evaluated 32 bits wide.
/// The upper half comes from Z and the lower from X.
fn index_nibble(regs: &Registers) -> u8 {
    let i = (regs.i & 0xf) as u32;
    ((((regs.z as u32) << (16 - i)) | ((regs.x as u32) >> i)) & 0xf) as u8
}

#[cfg(test)]
mod tests {
    use std::convert::TryFrom;

    use super::*;
    use color_eyre::eyre::Result;

    fn run(opcode: Opcode, regs: Registers) -> Registers {
        let mut regs = regs;
        assert_eq!(opcode.execute(&mut regs), Dispatch::Retire);
        regs
    }

    #[test]
    fn test_table_is_complete() -> Result<()> {
        assert_eq!(Opcode::ALL.len(), 64);
        for (value, opcode) in Opcode::ALL.iter().enumerate() {
            assert_eq!(*opcode as usize, value);
            assert_eq!(Opcode::try_from(value as u8)?, *opcode);
        }
        assert!(Opcode::try_from(64).is_err());

        Ok(())
    }

    #[test]
    fn test_bits() -> Result<()> {
        assert_eq!(Opcode::NOP.bits(), [false; 6]);
        assert_eq!(Opcode::AD4.bits(), [true, true, false, true, true, false]);
        assert_eq!(Opcode::MFM.bits(), [true; 6]);

        Ok(())
    }

    #[test]
    fn test_moves() -> Result<()> {
        let regs = Registers {
            z: 0x1234,
            ..Registers::default()
        };
        assert_eq!(run(Opcode::MTX, regs).x, 0x1234);
        assert_eq!(run(Opcode::MTP, regs).p, 0x1234);
        assert_eq!(run(Opcode::MTV, regs).v, 0x1234);
        assert_eq!(run(Opcode::MFN, regs).z, 0);

        let regs = Registers {
            e: 0xbeef,
            i: 7,
            j: 9,
            c: true,
            m: true,
            ..Registers::default()
        };
        assert_eq!(run(Opcode::MFE, regs).z, 0xbeef);
        assert_eq!(run(Opcode::MFI, regs).z, 7);
        assert_eq!(run(Opcode::MFJ, regs).z, 9);
        assert_eq!(run(Opcode::MFC, regs).z, 1);
        assert_eq!(run(Opcode::MFM, regs).z, 1);
        assert_eq!(run(Opcode::NOP, regs), regs);

        Ok(())
    }

    #[test]
    fn test_bitwise_advance_index() -> Result<()> {
        let regs = Registers {
            x: 0b0101,
            y: 0b0011,
            ..Registers::default()
        };

        let mut bor = regs;
        let mut bxo = regs;
        for _ in 0..4 {
            bor = run(Opcode::BOR, bor);
            bxo = run(Opcode::BXO, bxo);
        }
        assert_eq!(bor.z, 0b0111);
        assert_eq!(bxo.z, 0b0110);
        assert_eq!(bor.i, 4);

        let wrap = run(Opcode::BNT, Registers { i: 15, ..regs });
        assert_eq!(wrap.z, 0x8000);
        assert_eq!(wrap.i, 0);

        Ok(())
    }

    #[test]
    fn test_shifts() -> Result<()> {
        let regs = Registers {
            x: 0x8001,
            ..Registers::default()
        };

        let shl = run(Opcode::SHL, regs);
        assert_eq!(shl.t, 0x0003);
        assert_eq!(shl.z, 0x0002);

        let shr = run(Opcode::SHR, regs);
        assert_eq!(shr.t, 0xc000);
        assert_eq!(shr.z, 0x4000);

        let asr = run(Opcode::ASR, regs);
        assert_eq!(asr.z, 0xc000);

        assert_eq!(run(Opcode::ROR, regs).z, 0xc000);
        assert_eq!(run(Opcode::NOT, Registers { z: 0x00ff, ..regs }).z, 0xff00);

        Ok(())
    }

    #[test]
    fn test_add_one_bit() -> Result<()> {
        let regs = Registers {
            x: 1,
            y: 1,
            c: true,
            ..Registers::default()
        };

        let regs = run(Opcode::AD1, regs);
        assert_eq!(regs.z, 1);
        assert!(regs.c);
        assert_eq!(regs.i, 1);

        Ok(())
    }

    #[test]
    fn test_add_nibbles() -> Result<()> {
        let mut regs = Registers {
            x: 60000,
            y: 10000,
            c: true,
            ..Registers::default()
        };
        for _ in 0..4 {
            regs = run(Opcode::AD4, regs);
        }

        assert_eq!(regs.z, ((60000u32 + 10000 + 1) % 65536) as Word);
        assert!(regs.c);
        assert_eq!(regs.i, 0);

        Ok(())
    }

    #[test]
    fn test_load_nibbles() -> Result<()> {
        let mut regs = Registers::default();
        for &opcode in &[Opcode::LD4, Opcode::LD3, Opcode::LD2, Opcode::LD1] {
            regs = run(opcode, regs);
        }
        assert_eq!(regs.z, 0x1234);
        assert_eq!(regs.i, 0);

        let regs = run(Opcode::LDF, Registers { z: 0x1234, i: 8, ..regs });
        assert_eq!(regs.z, 0x1f34);
        assert_eq!(regs.i, 12);

        Ok(())
    }

    #[test]
    fn test_index_moves() -> Result<()> {
        let regs = Registers {
            z: 0xabcd,
            x: 0x0009,
            ..Registers::default()
        };
        assert_eq!(run(Opcode::MTI, regs).i, 9);
        assert_eq!(run(Opcode::MTJ, regs).j, 9);

        let regs = Registers {
            z: 0x0008,
            x: 0x0000,
            i: 13,
            ..Registers::default()
        };
        assert_eq!(run(Opcode::MTJ, regs).j, 0);
        assert_eq!(run(Opcode::MTJ, Registers { z: 0x0001, ..regs }).j, 8);

        Ok(())
    }

    #[test]
    fn test_flags() -> Result<()> {
        let regs = Registers {
            z: 0b100,
            i: 2,
            ..Registers::default()
        };
        assert!(run(Opcode::MTC, regs).c);
        assert!(run(Opcode::MTM, regs).m);
        assert!(run(Opcode::SEC, regs).c);
        assert!(!run(Opcode::CLC, Registers { c: true, ..regs }).c);
        assert!(run(Opcode::SEM, regs).m);
        assert!(!run(Opcode::CLM, Registers { m: true, ..regs }).m);
        assert_eq!(run(Opcode::CLI, regs).i, 0);
        assert_eq!(run(Opcode::CLJ, Registers { j: 3, ..regs }).j, 0);

        Ok(())
    }

    #[test]
    fn test_branches() -> Result<()> {
        let regs = Registers {
            a: 0x4000,
            p: 0x0042,
            ..Registers::default()
        };
        assert_eq!(run(Opcode::BZZ, regs).p, 0x4000);
        assert_eq!(run(Opcode::BZZ, Registers { z: 1, ..regs }).p, 0x0042);
        assert_eq!(run(Opcode::BCC, regs).p, 0x4000);
        assert_eq!(run(Opcode::BCC, Registers { c: true, ..regs }).p, 0x0042);

        Ok(())
    }

    #[test]
    fn test_memory_opcodes_defer() -> Result<()> {
        let mut regs = Registers::default();
        assert_eq!(Opcode::LDR.execute(&mut regs), Dispatch::Defer);
        assert_eq!(Opcode::STR.execute(&mut regs), Dispatch::Defer);
        assert_eq!(regs, Registers::default());

        Ok(())
    }
}
