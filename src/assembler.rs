//! Turns a token stream into the bit sequence that is baked into ROM.
//!
//! ```text
//! define limit 0x10 * 4
//! loop:
//!     mfb ldr mtb
//!     binclude "tiles.bin" 64, 0
//! ```
//!
//! Mnemonics emit their 6-bit opcode, least significant bit first. Directives
//! are evaluated at assembly time and emit nothing.

pub mod escape;
pub mod expression;
pub mod lexer;
pub mod symbols;

use std::borrow::Cow;
use std::{error, fmt, fs};

use self::expression::{parse_expression, starts_expression, Cursor};
use self::lexer::{Token, TokenKind};
use self::symbols::{BaseTable, Symbol, SymbolKind, SymbolTable};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssembleErrorKind {
    UndeclaredIdentifier,
    DuplicateLabel,
    AlreadyDefined,
    KeywordRedefinition,
    UnresolvedValue,
    NotANumber,
    RightParenthesisMissing,
    UnmatchedParenthesis,
    ExpectedExpression,
    ExpectedIdentifier,
    DivisionByZero,
    Include { path: String },
}

impl fmt::Display for AssembleErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssembleErrorKind::UndeclaredIdentifier => {
                f.write_str("identifier must come with mnemonic or directive")
            }
            AssembleErrorKind::DuplicateLabel => f.write_str("multiple labels with same identifier"),
            AssembleErrorKind::AlreadyDefined => f.write_str("identifier is already defined"),
            AssembleErrorKind::KeywordRedefinition => f.write_str("keyword cannot be used"),
            AssembleErrorKind::UnresolvedValue => f.write_str("unresolved value"),
            AssembleErrorKind::NotANumber => f.write_str("not a number"),
            AssembleErrorKind::RightParenthesisMissing => f.write_str("Right parenthesis missing"),
            AssembleErrorKind::UnmatchedParenthesis => f.write_str("unmatched parenthesis"),
            AssembleErrorKind::ExpectedExpression => f.write_str("expression expected"),
            AssembleErrorKind::ExpectedIdentifier => f.write_str("identifier expected"),
            AssembleErrorKind::DivisionByZero => f.write_str("division by zero"),
            AssembleErrorKind::Include { path } => write!(f, "failed to include `{}`", path),
        }
    }
}

impl error::Error for AssembleErrorKind {}

/// Where in the source an error was found
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub filename: String,
    pub line: usize,
    pub column: usize,
}

impl From<&Token> for Location {
    fn from(token: &Token) -> Self {
        Self {
            filename: token.filename.clone(),
            line: token.line,
            column: token.column,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.filename, self.line, self.column)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembleError {
    kind: AssembleErrorKind,
    context: Option<Cow<'static, str>>,
    location: Option<Location>,
}

impl AssembleError {
    /// Creates an error pointing at `token`
    pub fn at<C, S>(kind: AssembleErrorKind, context: C, token: Option<&Token>) -> Self
    where
        C: Into<Option<S>>,
        S: Into<Cow<'static, str>>,
    {
        Self {
            kind,
            context: context.into().map(|inner| inner.into()),
            location: token.map(Location::from),
        }
    }

    pub fn kind(&self) -> &AssembleErrorKind {
        &self.kind
    }

    pub fn location(&self) -> Option<&Location> {
        self.location.as_ref()
    }

    /// Whether the source was fine but a file it refers to could not be read
    pub fn is_io(&self) -> bool {
        matches!(self.kind, AssembleErrorKind::Include { .. })
    }
}

impl From<AssembleErrorKind> for AssembleError {
    fn from(kind: AssembleErrorKind) -> Self {
        Self {
            kind,
            context: None,
            location: None,
        }
    }
}

impl fmt::Display for AssembleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("error")?;
        if let Some(location) = &self.location {
            write!(f, " [{}]", location)?;
        }
        write!(f, ": {}", self.kind)?;
        if let Some(context) = &self.context {
            write!(f, " - {}", context)?;
        }
        Ok(())
    }
}

impl error::Error for AssembleError {}

pub type Result<T, E = AssembleError> = std::result::Result<T, E>;

/// Whether `name`, taken from `token`, can name a label or constant. Numbers
/// and punctuation cannot.
fn is_identifier(token: &Token, name: &str) -> bool {
    token.kind == TokenKind::Word
        && !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
}

/// Lowercases the ASCII letters of a token
fn fold_case(token: &Token) -> Token {
    Token {
        text: token.text.to_ascii_lowercase(),
        ..token.clone()
    }
}

/// A single assembly run. Labels and constants live as long as the assembler.
#[derive(Debug, Clone)]
pub struct Assembler<'a> {
    symbols: SymbolTable<'a>,
    bits: Vec<bool>,
}

impl<'a> Assembler<'a> {
    pub fn new(base: &'a BaseTable) -> Self {
        Self {
            symbols: SymbolTable::new(base),
            bits: Vec::new(),
        }
    }

    pub fn symbols(&self) -> &SymbolTable<'a> {
        &self.symbols
    }

    pub fn bits(&self) -> &[bool] {
        &self.bits
    }

    pub fn into_bits(self) -> Vec<bool> {
        self.bits
    }

    /// Assembles `tokens`, appending to the bits produced so far.
    ///
    /// # Errors
    ///
    /// Stops at the first statement that fails; everything before it stays
    /// assembled.
    pub fn assemble(&mut self, tokens: &[Token]) -> Result<()> {
        let folded: Vec<Token> = tokens.iter().map(fold_case).collect();
        let mut cursor = Cursor::new(&folded);

        while cursor.peek().is_some() {
            cursor = self.statement(cursor, tokens)?;
        }

        log::debug!("{} bit(s) assembled", self.bits.len());
        Ok(())
    }

    /// Handles the statement at `cursor`. `unfolded` holds the tokens before
    /// case folding.
    fn statement<'t>(&mut self, cursor: Cursor<'t>, unfolded: &[Token]) -> Result<Cursor<'t>> {
        let token = match cursor.peek() {
            Some(token) => token,
            None => return Ok(cursor),
        };

        let symbol = if token.kind == TokenKind::Quoted {
            None
        } else {
            self.symbols.get(&token.text).copied()
        };

        match symbol {
            Some(Symbol {
                kind: SymbolKind::Mnemonic,
                opcode: Some(opcode),
                ..
            }) => {
                log::debug!("{}: {} -> {:06b}", token, opcode, u8::from(opcode));
                self.bits.extend_from_slice(&opcode.bits());
                Ok(cursor.advance())
            }
            Some(Symbol {
                kind: SymbolKind::Directive,
                ..
            }) => self.directive(token, cursor.advance(), unfolded),
            _ if token.is(")") => Err(AssembleError::at(
                AssembleErrorKind::UnmatchedParenthesis,
                "`)` without a matching `(`",
                Some(token),
            )),
            _ => self.label(token).map(|_| cursor.advance()),
        }
    }

    fn label(&mut self, token: &Token) -> Result<()> {
        let name = match token.text.strip_suffix(':') {
            Some(name) if token.kind == TokenKind::Word && !name.is_empty() => name,
            _ => {
                return Err(AssembleError::at(
                    AssembleErrorKind::UndeclaredIdentifier,
                    format!("`{}`", token.text),
                    Some(token),
                ))
            }
        };

        if !is_identifier(token, name) {
            return Err(AssembleError::at(
                AssembleErrorKind::ExpectedIdentifier,
                format!("`{}` cannot name a label", name),
                Some(token),
            ));
        }

        self.symbols
            .insert_label(name)
            .map_err(|kind| AssembleError::at(kind, format!("`{}`", name), Some(token)))?;
        log::debug!("{}: label `{}`", token, name);
        Ok(())
    }

    fn directive<'t>(
        &mut self,
        directive: &Token,
        cursor: Cursor<'t>,
        unfolded: &[Token],
    ) -> Result<Cursor<'t>> {
        match directive.text.as_str() {
            "define" => self.define(directive, cursor),
            "binclude" => self.binclude(directive, cursor, unfolded),
            _ => {
                log::warn!("{}: directive `{}` has no effect", directive, directive.text);
                Ok(cursor)
            }
        }
    }

    /// `define name <expr>`
    fn define<'t>(&mut self, directive: &Token, cursor: Cursor<'t>) -> Result<Cursor<'t>> {
        let name = match cursor.peek() {
            Some(name) if name.kind != TokenKind::Quoted => name,
            other => {
                return Err(AssembleError::at(
                    AssembleErrorKind::ExpectedIdentifier,
                    "`define` needs a name",
                    other.or(Some(directive)),
                ))
            }
        };

        self.symbols
            .check_definable(&name.text)
            .map_err(|kind| AssembleError::at(kind, format!("`{}`", name.text), Some(name)))?;
        if !is_identifier(name, &name.text) {
            return Err(AssembleError::at(
                AssembleErrorKind::ExpectedIdentifier,
                format!("`{}` cannot name a constant", name.text),
                Some(name),
            ));
        }

        let (value, rest) = parse_expression(cursor.advance(), &self.symbols)?;
        self.symbols
            .define(&name.text, value)
            .map_err(|kind| AssembleError::at(kind, format!("`{}`", name.text), Some(name)))?;

        log::debug!("{}: `{}` = {}", name, name.text, value);
        Ok(rest)
    }

    /// `binclude filename [size] [, offset]`
    ///
    /// The file is read but its contents are not placed in the output.
    fn binclude<'t>(
        &mut self,
        directive: &Token,
        cursor: Cursor<'t>,
        unfolded: &[Token],
    ) -> Result<Cursor<'t>> {
        let file = match cursor.peek() {
            Some(file) if file.kind != TokenKind::Symbol => file,
            other => {
                return Err(AssembleError::at(
                    AssembleErrorKind::ExpectedIdentifier,
                    "`binclude` needs a file name",
                    other.or(Some(directive)),
                ))
            }
        };
        let path = unfolded
            .get(cursor.position())
            .map_or_else(|| file.text.clone(), |token| token.text.clone());

        let mut rest = cursor.advance();
        let mut arguments = Vec::new();
        while arguments.len() < 2 {
            if !arguments.is_empty() && rest.peek().map_or(false, |token| token.is(",")) {
                rest = rest.advance();
            }
            if !starts_expression(rest, &self.symbols) {
                break;
            }
            let (value, next) = parse_expression(rest, &self.symbols)?;
            arguments.push(value);
            rest = next;
        }

        let contents = fs::read(&path).map_err(|err| {
            AssembleError::at(
                AssembleErrorKind::Include { path: path.clone() },
                err.to_string(),
                Some(file),
            )
        })?;

        log::warn!(
            "{}: read {} byte(s) from `{}` (size {:?}, offset {:?}) but binary includes are not emitted",
            file,
            contents.len(),
            path,
            arguments.get(0),
            arguments.get(1)
        );
        Ok(rest)
    }
}

/// Assembles `tokens` with a fresh symbol table
pub fn assemble(tokens: &[Token]) -> Result<Vec<bool>> {
    let base = BaseTable::new();
    let mut assembler = Assembler::new(&base);
    assembler.assemble(tokens)?;

    let bits = assembler.into_bits();
    log::info!("assembled {} instruction(s)", bits.len() / 6);
    Ok(bits)
}

#[cfg(test)]
mod tests {
    use super::lexer::tokenize;
    use super::*;
    use crate::processor::Opcode;
    use color_eyre::eyre::Result;

    fn run(source: &str) -> Result<Vec<bool>, AssembleError> {
        assemble(&tokenize(source, "test.asm"))
    }

    fn error_kind(source: &str) -> Option<AssembleErrorKind> {
        run(source).err().map(|err| err.kind().clone())
    }

    #[test]
    fn test_every_mnemonic() -> Result<()> {
        for opcode in Opcode::ALL {
            let bits = run(&opcode.name().to_ascii_lowercase())?;
            assert_eq!(bits, opcode.bits().to_vec(), "{}", opcode);

            let value = bits
                .iter()
                .enumerate()
                .fold(0u8, |acc, (i, bit)| acc | (*bit as u8) << i);
            assert_eq!(value, u8::from(*opcode));
        }
        assert_eq!(run("mtn")?, Opcode::NOP.bits().to_vec());

        Ok(())
    }

    #[test]
    fn test_sequence_and_case() -> Result<()> {
        let bits = run("MTX sec\n  Ad4 ; add\n")?;
        let expected: Vec<bool> = [Opcode::MTX, Opcode::SEC, Opcode::AD4]
            .iter()
            .flat_map(|opcode| opcode.bits().to_vec())
            .collect();
        assert_eq!(bits, expected);
        assert!(run("")?.is_empty());

        Ok(())
    }

    #[test]
    fn test_define() -> Result<()> {
        let base = BaseTable::new();
        let mut assembler = Assembler::new(&base);
        assembler.assemble(&tokenize("define x 5\ndefine y x+1\nDEFINE Z (y << 2) | 1 mfn", "t"))?;

        let value = |name: &str| assembler.symbols().get(name).map(|symbol| symbol.value);
        assert_eq!(value("x"), Some(5));
        assert_eq!(value("y"), Some(6));
        assert_eq!(value("z"), Some(25));
        assert_eq!(assembler.bits(), &Opcode::MFN.bits()[..]);

        Ok(())
    }

    #[test]
    fn test_define_errors() -> Result<()> {
        assert_eq!(error_kind("define nop 1"), Some(AssembleErrorKind::KeywordRedefinition));
        assert_eq!(error_kind("define + 1"), Some(AssembleErrorKind::KeywordRedefinition));
        assert_eq!(error_kind("define"), Some(AssembleErrorKind::ExpectedIdentifier));
        assert_eq!(error_kind("define 1 2"), Some(AssembleErrorKind::ExpectedIdentifier));
        assert_eq!(error_kind("define 0x10 2"), Some(AssembleErrorKind::ExpectedIdentifier));
        assert_eq!(error_kind("define ( 2"), Some(AssembleErrorKind::ExpectedIdentifier));
        assert_eq!(error_kind("define : 2"), Some(AssembleErrorKind::ExpectedIdentifier));

        // literals keep their value after a rejected definition
        let base = BaseTable::new();
        let mut assembler = Assembler::new(&base);
        assert!(assembler.assemble(&tokenize("define 1 2", "t")).is_err());
        assembler.assemble(&tokenize("define x 1+1", "t"))?;
        assert_eq!(assembler.symbols().get("x").map(|symbol| symbol.value), Some(2));
        assert_eq!(error_kind("define x"), Some(AssembleErrorKind::ExpectedExpression));
        assert_eq!(error_kind("define x 1/0"), Some(AssembleErrorKind::DivisionByZero));
        assert_eq!(error_kind("define x y"), Some(AssembleErrorKind::UnresolvedValue));

        Ok(())
    }

    #[test]
    fn test_labels() -> Result<()> {
        assert_eq!(run("loop: mfn")?, Opcode::MFN.bits().to_vec());
        assert_eq!(
            error_kind("loop: mfn\nLOOP:"),
            Some(AssembleErrorKind::DuplicateLabel)
        );
        assert_eq!(error_kind("nop:"), Some(AssembleErrorKind::KeywordRedefinition));
        assert_eq!(
            error_kind("define a 1\na:"),
            Some(AssembleErrorKind::AlreadyDefined)
        );
        assert_eq!(error_kind("loop"), Some(AssembleErrorKind::UndeclaredIdentifier));
        assert_eq!(error_kind("1: mfn"), Some(AssembleErrorKind::ExpectedIdentifier));
        assert_eq!(error_kind("mfn :"), Some(AssembleErrorKind::UndeclaredIdentifier));
        assert_eq!(error_kind("'a:'"), Some(AssembleErrorKind::UndeclaredIdentifier));

        Ok(())
    }

    #[test]
    fn test_error_location() -> Result<()> {
        let err = run("mfn\n  mtx bogus").err();
        let location = err.as_ref().and_then(|err| err.location()).cloned();
        assert_eq!(
            location,
            Some(Location {
                filename: "test.asm".to_owned(),
                line: 2,
                column: 7
            })
        );

        let message = err.map(|err| err.to_string()).unwrap_or_default();
        assert_eq!(
            message,
            "error [test.asm:2:7]: identifier must come with mnemonic or directive - `bogus`"
        );

        assert_eq!(error_kind("mfn )"), Some(AssembleErrorKind::UnmatchedParenthesis));

        let err = run("define s 'a\nb'\n  bogus").err();
        let location = err.as_ref().and_then(|err| err.location()).map(|l| (l.line, l.column));
        assert_eq!(location, Some((3, 3)));

        Ok(())
    }

    #[test]
    fn test_inert_directives() -> Result<()> {
        assert_eq!(run("ldi equ = mfn")?, Opcode::MFN.bits().to_vec());

        Ok(())
    }

    #[test]
    fn test_binclude() -> Result<()> {
        let path = std::env::temp_dir().join(format!("bbbd-binclude-{}.bin", std::process::id()));
        fs::write(&path, &[1u8, 2, 3])?;

        let source = format!("binclude \"{}\" 2, 1 mfn", path.display());
        let bits = run(&source);
        fs::remove_file(&path)?;
        assert_eq!(bits?, Opcode::MFN.bits().to_vec());

        let err = run("binclude 'Missing-File.bin' mfn").err();
        assert_eq!(
            err.as_ref().map(|err| err.kind().clone()),
            Some(AssembleErrorKind::Include {
                path: "Missing-File.bin".to_owned()
            })
        );
        assert!(err.map_or(false, |err| err.is_io()));

        assert_eq!(error_kind("binclude"), Some(AssembleErrorKind::ExpectedIdentifier));

        Ok(())
    }
}
