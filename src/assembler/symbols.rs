use std::collections::HashMap;

use super::AssembleErrorKind;
use crate::processor::Opcode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Mnemonic,
    Directive,
    Operator,
    /// A label; it has a name but no value yet
    UnresolvedNumber,
    /// A `define`d constant
    KnownNumber,
}

impl SymbolKind {
    /// Mnemonics, directives and operators can never be redefined
    pub fn is_keyword(self) -> bool {
        matches!(
            self,
            SymbolKind::Mnemonic | SymbolKind::Directive | SymbolKind::Operator
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Associativity {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Symbol {
    pub kind: SymbolKind,
    /// Set for mnemonics
    pub opcode: Option<Opcode>,
    /// Precedence for operators, the value for known numbers
    pub value: i64,
    pub associativity: Associativity,
}

impl Symbol {
    fn new(kind: SymbolKind, value: i64) -> Self {
        Self {
            kind,
            opcode: None,
            value,
            associativity: Associativity::Left,
        }
    }

    fn mnemonic(opcode: Opcode) -> Self {
        Self {
            opcode: Some(opcode),
            ..Self::new(SymbolKind::Mnemonic, 0)
        }
    }

    fn operator(precedence: i64, associativity: Associativity) -> Self {
        Self {
            associativity,
            ..Self::new(SymbolKind::Operator, precedence)
        }
    }
}

pub const DIRECTIVES: &[&str] = &["binclude", "=", "define", "equ", "ldi"];

/// Operators with their precedence, 1 binds loosest
pub const OPERATORS: &[(&str, i64, Associativity)] = &[
    ("+", 11, Associativity::Left),
    ("-", 11, Associativity::Left),
    ("*", 12, Associativity::Left),
    ("/", 12, Associativity::Left),
    ("%", 12, Associativity::Left),
    ("|", 5, Associativity::Left),
    ("&", 7, Associativity::Left),
    ("^", 6, Associativity::Left),
    ("~", 15, Associativity::Right),
    ("<<", 10, Associativity::Left),
    (">>", 10, Associativity::Left),
    (">>>", 10, Associativity::Left),
    ("||", 2, Associativity::Left),
    ("&&", 4, Associativity::Left),
    ("^^", 3, Associativity::Left),
    ("!", 15, Associativity::Right),
    ("<", 9, Associativity::Left),
    (">", 9, Associativity::Left),
    ("<=", 9, Associativity::Left),
    (">=", 9, Associativity::Left),
    ("==", 8, Associativity::Left),
    ("!=", 8, Associativity::Left),
    (",", 1, Associativity::Left),
];

/// The fixed instruction, directive and operator table
#[derive(Debug, Clone)]
pub struct BaseTable {
    entries: HashMap<String, Symbol>,
}

impl Default for BaseTable {
    fn default() -> Self {
        Self::new()
    }
}

impl BaseTable {
    pub fn new() -> Self {
        let mut entries = HashMap::new();

        for opcode in Opcode::ALL {
            entries.insert(opcode.name().to_ascii_lowercase(), Symbol::mnemonic(*opcode));
        }
        for (alias, opcode) in Opcode::ALIASES {
            entries.insert((*alias).to_owned(), Symbol::mnemonic(*opcode));
        }
        for directive in DIRECTIVES {
            entries.insert(
                (*directive).to_owned(),
                Symbol::new(SymbolKind::Directive, 0),
            );
        }
        for (operator, precedence, associativity) in OPERATORS {
            entries.insert(
                (*operator).to_owned(),
                Symbol::operator(*precedence, *associativity),
            );
        }

        Self { entries }
    }

    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The base table plus the labels and constants of one assembly run
#[derive(Debug, Clone)]
pub struct SymbolTable<'a> {
    base: &'a BaseTable,
    user: HashMap<String, Symbol>,
}

impl<'a> SymbolTable<'a> {
    pub fn new(base: &'a BaseTable) -> Self {
        Self {
            base,
            user: HashMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.base.get(name).or_else(|| self.user.get(name))
    }

    /// Registers `name` as a label
    pub fn insert_label(&mut self, name: &str) -> Result<(), AssembleErrorKind> {
        match self.get(name).map(|symbol| symbol.kind) {
            Some(kind) if kind.is_keyword() => Err(AssembleErrorKind::KeywordRedefinition),
            Some(SymbolKind::UnresolvedNumber) => Err(AssembleErrorKind::DuplicateLabel),
            Some(_) => Err(AssembleErrorKind::AlreadyDefined),
            None => {
                self.user.insert(
                    name.to_owned(),
                    Symbol::new(SymbolKind::UnresolvedNumber, 0),
                );
                Ok(())
            }
        }
    }

    /// Fails if `name` is reserved, otherwise `name` may be (re)bound
    pub fn check_definable(&self, name: &str) -> Result<(), AssembleErrorKind> {
        match self.base.get(name) {
            Some(_) => Err(AssembleErrorKind::KeywordRedefinition),
            None => Ok(()),
        }
    }

    /// Binds `name` to `value`, replacing an earlier label or constant
    pub fn define(&mut self, name: &str, value: i64) -> Result<(), AssembleErrorKind> {
        self.check_definable(name)?;
        self.user
            .insert(name.to_owned(), Symbol::new(SymbolKind::KnownNumber, value));
        Ok(())
    }
}
