//! Numeric escapes (`\NNN`, `\xNN`) in quoted literals can be wider than a
//! single character. Their value is cut into fixed-width code units the way
//! the host lays the integer out in memory.

/// Width of one produced character, in bits
pub const UNIT_BITS: u32 = 32;

/// Digits folded into one 64-bit chunk before it is split into code units
const CHUNK_DIGITS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    /// The byte order of the host
    pub fn native() -> Self {
        if cfg!(target_endian = "big") {
            ByteOrder::Big
        } else {
            ByteOrder::Little
        }
    }
}

/// Splits `value`, of which the low `bits` are significant, into code units
/// in the order they sit in memory for `order`.
///
/// ```
/// use bbbd::assembler::escape::{code_units, ByteOrder};
///
/// assert_eq!(code_units(0x1_0000_0041, 36, ByteOrder::Little), vec![0x41, 0x1]);
/// assert_eq!(code_units(0x41, 8, ByteOrder::Big), vec![0x0]);
/// ```
pub fn code_units(value: u64, bits: u32, order: ByteOrder) -> Vec<u32> {
    let count = ((bits + UNIT_BITS - 1) / UNIT_BITS).min(2) as usize;
    let (low, high) = (value as u32, (value >> 32) as u32);
    let lanes = match order {
        ByteOrder::Little => [low, high],
        ByteOrder::Big => [high, low],
    };

    lanes[..count].to_vec()
}

/// Decodes the digit run of a numeric escape into code units.
///
/// The run is consumed from its least significant end in chunks of up to 16
/// digits; the units of each chunk are emitted before those of the next, more
/// significant chunk.
pub fn numeric_escape(digits: &str, radix: u32, order: ByteOrder) -> Vec<u32> {
    let digit_bits = match radix {
        8 => 3,
        16 => 4,
        _ => unreachable!("numeric escapes are octal or hexadecimal"),
    };

    let digits: Vec<u64> = digits
        .chars()
        .filter_map(|c| c.to_digit(radix))
        .map(u64::from)
        .collect();

    let mut units = Vec::new();
    for chunk in digits.rchunks(CHUNK_DIGITS) {
        let value = chunk
            .iter()
            .fold(0u64, |acc, digit| (acc << digit_bits) | digit);
        units.extend(code_units(value, chunk.len() as u32 * digit_bits, order));
    }

    units
}
