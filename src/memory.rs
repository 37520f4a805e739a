use std::path::Path;
use std::str::FromStr;
use std::{error, fmt, fs};

use color_eyre::eyre::{eyre, Result, WrapErr};

use crate::assembler::{self, lexer};

pub type Word = u16; // 2 bytes

/// Size of the program ROM in bits (0x0000-0x7fff)
pub const ROM_SIZE: usize = 0x8000;
/// Size of the work RAM in bits (0x8000-0xbfff)
pub const RAM_SIZE: usize = 0x4000;
/// Size of the video RAM in bits (0xc000-0xc016)
pub const VRAM_SIZE: usize = 0x17;
/// Size of the audio RAM in bits (0xe000-0xe004)
pub const ARAM_SIZE: usize = 0x5;
/// Size of one controller input block in bits
pub const CONTROLLER_SIZE: usize = 0x5;

/// Folds the mirrored ranges onto their canonical addresses.
///
/// - `0xc020-0xdfff` mirrors `0xc000-0xc01f`
/// - `0xe008-0xefff` mirrors `0xe000-0xe007`
/// - `0xf010-0xf7ff` mirrors `0xf000-0xf00f`
pub fn map_address(address: Word) -> Word {
    match address {
        0xc020..=0xdfff => address & 0xc01f,
        0xe008..=0xefff => address & 0xe007,
        0xf010..=0xf7ff => address & 0xf00f,
        _ => address,
    }
}

/// Where a (mapped) address lands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Region {
    Rom(usize),
    Ram(usize),
    Vram(usize),
    Aram(usize),
    Controller0(usize),
    Controller1(usize),
    /// Pulled high on read, writes are dropped
    Reserved,
}

impl Region {
    fn locate(address: Word) -> Self {
        let address = map_address(address);
        let offset = |base: Word| (address - base) as usize;

        match address {
            0x0000..=0x7fff => Region::Rom(offset(0x0000)),
            0x8000..=0xbfff => Region::Ram(offset(0x8000)),
            0xc000..=0xc016 => Region::Vram(offset(0xc000)),
            0xc017..=0xdfff => Region::Reserved,
            0xe000..=0xe004 => Region::Aram(offset(0xe000)),
            0xe005..=0xefff => Region::Reserved,
            0xf000..=0xf004 => Region::Controller0(offset(0xf000)),
            0xf005..=0xf007 => Region::Reserved,
            0xf008..=0xf00c => Region::Controller1(offset(0xf008)),
            _ => Region::Reserved,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryError {
    /// The image handed to [`Memory::bake`] does not fit into the ROM
    RomOverflow { len: usize },
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryError::RomOverflow { len } => write!(
                f,
                "rom image of {} bits exceeds the rom size of {} bits",
                len, ROM_SIZE
            ),
        }
    }
}

impl error::Error for MemoryError {}

/// Emulates the bit addressable memory map of the CPU
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Memory {
    /// 0x0000-0x7fff
    pub rom: Vec<bool>,
    /// 0x8000-0xbfff
    pub ram: Vec<bool>,
    /// 0xc000-0xc016, 0xc017-0xc01f reserved, 0xc020-0xdfff mirror
    pub vram: Vec<bool>,
    /// 0xe000-0xe004, 0xe005-0xe007 reserved, 0xe008-0xefff mirror
    pub aram: Vec<bool>,
    /// 0xf000-0xf004, 0xf005-0xf007 reserved
    pub controller0: Vec<bool>,
    /// 0xf008-0xf00c, 0xf00d-0xf00f reserved, 0xf010-0xf7ff mirror
    pub controller1: Vec<bool>,
}

impl Default for Memory {
    /// Initializes the memory with every bit cleared
    fn default() -> Self {
        Memory {
            rom: vec![false; ROM_SIZE],
            ram: vec![false; RAM_SIZE],
            vram: vec![false; VRAM_SIZE],
            aram: vec![false; ARAM_SIZE],
            controller0: vec![false; CONTROLLER_SIZE],
            controller1: vec![false; CONTROLLER_SIZE],
        }
    }
}

impl fmt::Debug for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ones = |bits: &[bool]| bits.iter().filter(|bit| **bit).count();

        f.debug_struct("Memory")
            .field("rom", &ones(&self.rom))
            .field("ram", &ones(&self.ram))
            .field("vram", &ones(&self.vram))
            .field("aram", &ones(&self.aram))
            .field("controller0", &ones(&self.controller0))
            .field("controller1", &ones(&self.controller1))
            .finish()
    }
}

impl Memory {
    /// Reads a bit from the memory
    pub fn read(&self, address: Word) -> bool {
        match Region::locate(address) {
            Region::Rom(i) => self.rom[i],
            Region::Ram(i) => self.ram[i],
            Region::Vram(i) => self.vram[i],
            Region::Aram(i) => self.aram[i],
            Region::Controller0(i) => self.controller0[i],
            Region::Controller1(i) => self.controller1[i],
            Region::Reserved => true,
        }
    }

    /// Writes a bit to the memory. The ROM range is writable at runtime.
    pub fn write(&mut self, address: Word, value: bool) {
        let bit = match Region::locate(address) {
            Region::Rom(i) => &mut self.rom[i],
            Region::Ram(i) => &mut self.ram[i],
            Region::Vram(i) => &mut self.vram[i],
            Region::Aram(i) => &mut self.aram[i],
            Region::Controller0(i) => &mut self.controller0[i],
            Region::Controller1(i) => &mut self.controller1[i],
            Region::Reserved => return,
        };
        *bit = value;
    }

    /// Reads `count` consecutive bits starting at `address`, least significant bit first
    fn read_bits(&self, address: Word, count: u16) -> u16 {
        (0..count).fold(0, |acc, i| {
            acc | (self.read(address.wrapping_add(i)) as u16) << i
        })
    }

    /// Reads an opcode (6 bits, little endian)
    pub fn read6(&self, address: Word) -> u8 {
        self.read_bits(address, 6) as u8
    }

    /// Reads a word (16 bits, little endian)
    pub fn read16(&self, address: Word) -> Word {
        self.read_bits(address, 16)
    }

    /// Loads an assembled image into the ROM, starting at address 0
    pub fn bake(&mut self, bits: &[bool]) -> Result<(), MemoryError> {
        if bits.len() > ROM_SIZE {
            return Err(MemoryError::RomOverflow { len: bits.len() });
        }

        self.rom[..bits.len()].copy_from_slice(bits);
        log::debug!("Baked {} bits into rom", bits.len());

        Ok(())
    }

    /// Assembles the source file at `path` and bakes it into a fresh memory
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let source = fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read `{}`", path.display()))?;

        Self::from_source(&source, &path.display().to_string())
    }

    fn from_source(source: &str, filename: &str) -> Result<Self> {
        let tokens = lexer::tokenize(source, filename);
        let faulty = lexer::check_token_errors(&tokens);

        let bits = assembler::assemble(&tokens)?;
        if faulty > 0 {
            return Err(eyre!("{} lexical error(s) in `{}`", faulty, filename));
        }

        let mut memory = Memory::default();
        memory.bake(&bits)?;

        Ok(memory)
    }

    /// Logs every region that has at least one bit set
    pub fn dump(&self) {
        for (name, image) in self.images() {
            log::info!("{}: {}", name, image);
        }
    }

    /// Each region with a bit set, as `0`/`1` up to its last set bit
    fn images(&self) -> Vec<(&'static str, String)> {
        let regions: [(&'static str, &[bool]); 6] = [
            ("rom", &self.rom[..]),
            ("ram", &self.ram[..]),
            ("vram", &self.vram[..]),
            ("aram", &self.aram[..]),
            ("controller0", &self.controller0[..]),
            ("controller1", &self.controller1[..]),
        ];

        regions
            .iter()
            .filter_map(|(name, bits)| {
                let last = bits.iter().rposition(|bit| *bit)?;
                let image = bits[..=last]
                    .iter()
                    .map(|bit| if *bit { '1' } else { '0' })
                    .collect();
                Some((*name, image))
            })
            .collect()
    }
}

impl FromStr for Memory {
    type Err = color_eyre::eyre::Report;

    /// Assembles `source` and bakes it into a fresh memory
    fn from_str(source: &str) -> Result<Self, Self::Err> {
        Self::from_source(source, "<str>")
    }
}

/// Builds a rom image out of opcodes
#[macro_export]
macro_rules! rom {
    ( $( $opcode:expr ),* $(,)? ) => {{
        let mut bits: ::std::vec::Vec<bool> = ::std::vec::Vec::new();
        $(
            bits.extend_from_slice(&$crate::processor::Opcode::bits($opcode));
        )*
        bits
    }};
}
