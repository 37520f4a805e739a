//! Splits assembly source into tokens.
//!
//! ```text
//! define base 0x8000 ; comment
//! loop: mfa ldr mtb
//! ```
//!
//! Every token remembers where it came from so later stages can point at it.

use std::fmt;

use super::escape::{self, ByteOrder};

/// Operators, longest first so that matching is greedy
const OPERATORS: &[&str] = &[
    ">>>", ">>", "<<", "<=", ">=", "==", "!=", "||", "&&", "^^", "<", ">", "|", "&", "^", "!", "=",
];

const PUNCTUATION: &[char] = &[':', ',', '(', ')', '+', '-', '*', '/', '%', '~'];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Mnemonics, directives, labels, identifiers and numbers
    Word,
    /// Operators and punctuation
    Symbol,
    /// Contents of a `'...'` or `"..."` literal with escapes decoded
    Quoted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    /// A quoted literal ran into the end of the input
    UnexpectedEndOfFile,
    IllegalOperand,
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenError::UnexpectedEndOfFile => f.write_str("UnexpectedEndOfFile"),
            TokenError::IllegalOperand => f.write_str("IllegalOperand"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub kind: TokenKind,
    pub filename: String,
    /// 1-based
    pub line: usize,
    /// 1-based
    pub column: usize,
    pub error: Option<TokenError>,
}

impl Token {
    pub fn is(&self, text: &str) -> bool {
        self.kind != TokenKind::Quoted && self.text == text
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.filename, self.line, self.column)
    }
}

struct Lexer<'a> {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    filename: &'a str,
    order: ByteOrder,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn new(source: &str, filename: &'a str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            filename,
            order: ByteOrder::native(),
            tokens: Vec::new(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        self.column += 1;
        Some(c)
    }

    /// Counts the line break starting with the already consumed `first`.
    /// Returns whether it was a `\r\n` pair.
    fn line_break(&mut self, first: char) -> bool {
        let pair = first == '\r' && self.peek() == Some('\n');
        if pair {
            self.bump();
        }
        self.line += 1;
        self.column = 1;
        pair
    }

    fn starts_with(&self, pattern: &str) -> bool {
        let mut rest = self.chars[self.pos..].iter();
        pattern.chars().all(|c| rest.next() == Some(&c))
    }

    fn token(&self, text: String, kind: TokenKind, line: usize, column: usize) -> Token {
        Token {
            text,
            kind,
            filename: self.filename.to_owned(),
            line,
            column,
            error: None,
        }
    }

    fn run(mut self) -> Vec<Token> {
        while let Some(c) = self.peek() {
            let (line, column) = (self.line, self.column);

            if c == ';' {
                while !matches!(self.peek(), None | Some('\n') | Some('\r')) {
                    self.bump();
                }
            } else if c == '\'' || c == '"' {
                let token = self.quoted(c, line, column);
                self.tokens.push(token);
            } else if let Some(op) = OPERATORS.iter().find(|op| self.starts_with(op)) {
                for _ in 0..op.len() {
                    self.bump();
                }
                let token = self.token((*op).to_owned(), TokenKind::Symbol, line, column);
                self.tokens.push(token);
            } else if PUNCTUATION.contains(&c) {
                self.bump();
                let token = self.token(c.to_string(), TokenKind::Symbol, line, column);
                self.tokens.push(token);
            } else if c == ' ' || c == '\t' {
                self.bump();
            } else if c == '\r' || c == '\n' {
                self.bump();
                self.line_break(c);
            } else {
                let token = self.word(line, column);
                self.tokens.push(token);
            }
        }

        self.tokens
    }

    /// A maximal run of anything that does not separate tokens. A trailing
    /// `:` stays part of the run so labels come out whole.
    fn word(&mut self, line: usize, column: usize) -> Token {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c == ':' {
                text.push(c);
                self.bump();
                break;
            }
            if is_separator(c) {
                break;
            }
            text.push(c);
            self.bump();
        }

        self.token(text, TokenKind::Word, line, column)
    }

    fn quoted(&mut self, quote: char, line: usize, column: usize) -> Token {
        self.bump();
        let mut text = String::new();
        let mut error = None;

        loop {
            let c = match self.bump() {
                Some(c) => c,
                None => {
                    error = Some(TokenError::UnexpectedEndOfFile);
                    break;
                }
            };

            if c == quote {
                break;
            }
            if c == '\r' || c == '\n' {
                text.push(c);
                if self.line_break(c) {
                    text.push('\n');
                }
                continue;
            }
            if c != '\\' {
                text.push(c);
                continue;
            }

            let escaped = match self.bump() {
                Some(escaped) => escaped,
                None => {
                    error = Some(TokenError::UnexpectedEndOfFile);
                    break;
                }
            };
            match escaped {
                'a' => text.push('\x07'),
                'b' => text.push('\x08'),
                'f' => text.push('\x0c'),
                'n' => text.push('\n'),
                'r' => text.push('\r'),
                't' => text.push('\t'),
                'v' => text.push('\x0b'),
                '0'..='7' => {
                    let mut digits = escaped.to_string();
                    digits.push_str(&self.digit_run(8));
                    self.push_units(&mut text, &digits, 8);
                }
                'x' | 'X' => {
                    let digits = self.digit_run(16);
                    self.push_units(&mut text, &digits, 16);
                }
                // \\ \' \" \? and anything unknown stand for themselves
                other => text.push(other),
            }
        }

        let mut token = self.token(text, TokenKind::Quoted, line, column);
        token.error = error;
        token
    }

    fn digit_run(&mut self, radix: u32) -> String {
        let mut digits = String::new();
        while let Some(c) = self.peek().filter(|c| c.is_digit(radix)) {
            digits.push(c);
            self.bump();
        }
        digits
    }

    fn push_units(&self, text: &mut String, digits: &str, radix: u32) {
        for unit in escape::numeric_escape(digits, radix, self.order) {
            text.push(std::char::from_u32(unit).unwrap_or(std::char::REPLACEMENT_CHARACTER));
        }
    }
}

fn is_separator(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n' | ';' | '\'' | '"')
        || PUNCTUATION.contains(&c)
        || "<>=!|&^".contains(c)
}

/// Splits `source` into tokens. Lexical errors are attached to the tokens
/// they occur in; see [`check_token_errors`].
pub fn tokenize(source: &str, filename: &str) -> Vec<Token> {
    let tokens = Lexer::new(source, filename).run();
    log::debug!("{} token(s) in `{}`", tokens.len(), filename);
    tokens
}

/// Reports every token carrying a lexical error and returns how many there were
pub fn check_token_errors(tokens: &[Token]) -> usize {
    let mut count = 0;
    for token in tokens {
        if let Some(error) = token.error {
            log::error!(
                "{} in {} at line {} column {}",
                error,
                token.filename,
                token.line,
                token.column
            );
            count += 1;
        }
    }
    count
}
