//! Constant expressions for directive operands, evaluated by precedence
//! climbing over the token stream.
//!
//! The cursor is a plain value: every parse function takes one and hands the
//! advanced cursor back next to its result.

use std::borrow::Cow;

use super::lexer::{Token, TokenKind};
use super::symbols::{Associativity, SymbolKind, SymbolTable};
use super::{AssembleError, AssembleErrorKind, Result};

/// Binding threshold of a whole expression. `,` sits below it and ends the
/// expression instead of being evaluated.
const EXPRESSION_PRECEDENCE: i64 = 2;

/// Binding threshold inside parentheses, where `,` is evaluated
const GROUP_PRECEDENCE: i64 = 1;

/// Binding power of a leading `+`/`-`
const SIGN_PRECEDENCE: i64 = 13;

/// Position in a token slice. `start` marks where the innermost expression began.
#[derive(Debug, Clone, Copy)]
pub struct Cursor<'t> {
    tokens: &'t [Token],
    pos: usize,
    start: usize,
}

impl<'t> Cursor<'t> {
    pub fn new(tokens: &'t [Token]) -> Self {
        Self::at(tokens, 0)
    }

    pub fn at(tokens: &'t [Token], pos: usize) -> Self {
        Self {
            tokens,
            pos,
            start: pos,
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn peek(&self) -> Option<&'t Token> {
        self.tokens.get(self.pos)
    }

    pub fn advance(self) -> Self {
        Self {
            pos: (self.pos + 1).min(self.tokens.len()),
            ..self
        }
    }

    fn previous(&self) -> Option<&'t Token> {
        self.pos.checked_sub(1).and_then(|pos| self.tokens.get(pos))
    }

    /// The token errors at this position should point at
    pub fn location(&self) -> Option<&'t Token> {
        self.peek().or_else(|| self.tokens.last())
    }

    fn error<C, S>(&self, kind: AssembleErrorKind, context: C) -> AssembleError
    where
        C: Into<Option<S>>,
        S: Into<Cow<'static, str>>,
    {
        AssembleError::at(kind, context, self.location())
    }

    /// Whether a `+ - ~ !` here is a prefix operator: at the start of an
    /// expression, after an operator, or after a closing parenthesis
    fn expects_operand(&self, symbols: &SymbolTable) -> bool {
        if self.pos == self.start {
            return true;
        }
        match self.previous() {
            Some(token) if token.is(")") => true,
            Some(token) if token.kind != TokenKind::Quoted => symbols
                .get(&token.text)
                .map_or(false, |symbol| symbol.kind == SymbolKind::Operator),
            _ => false,
        }
    }
}

/// Evaluates the expression at `cursor`
pub fn parse_expression<'t>(cursor: Cursor<'t>, symbols: &SymbolTable) -> Result<(i64, Cursor<'t>)> {
    parse_at(cursor, EXPRESSION_PRECEDENCE, symbols)
}

fn parse_at<'t>(
    cursor: Cursor<'t>,
    precedence: i64,
    symbols: &SymbolTable,
) -> Result<(i64, Cursor<'t>)> {
    let outer = cursor.start;
    let inner = Cursor {
        start: cursor.pos,
        ..cursor
    };

    let (lhs, rest) = parse_terminal(inner, symbols)?;
    let (value, rest) = parse(lhs, precedence, rest, symbols)?;

    Ok((value, Cursor { start: outer, ..rest }))
}

/// Whether the token at `cursor` can begin an expression
pub fn starts_expression(cursor: Cursor, symbols: &SymbolTable) -> bool {
    let token = match cursor.peek() {
        Some(token) => token,
        None => return false,
    };
    if token.kind == TokenKind::Quoted {
        return true;
    }
    if ["(", "+", "-", "~", "!"].iter().any(|text| token.is(text)) {
        return true;
    }

    match symbols.get(&token.text) {
        Some(symbol) => matches!(
            symbol.kind,
            SymbolKind::KnownNumber | SymbolKind::UnresolvedNumber
        ),
        None => token.text.starts_with(|c: char| c.is_ascii_digit()),
    }
}

/// The binary operator at `cursor`, if any
fn binary_operator<'t>(
    cursor: Cursor<'t>,
    symbols: &SymbolTable,
) -> Option<(&'t Token, i64, Associativity)> {
    let token = cursor.peek()?;
    if token.kind != TokenKind::Symbol || token.is("~") || token.is("!") {
        return None;
    }

    let symbol = symbols.get(&token.text)?;
    if symbol.kind != SymbolKind::Operator {
        return None;
    }
    Some((token, symbol.value, symbol.associativity))
}

/// Parenthesised expression, prefix operator or single value
pub fn parse_terminal<'t>(cursor: Cursor<'t>, symbols: &SymbolTable) -> Result<(i64, Cursor<'t>)> {
    let token = cursor
        .peek()
        .ok_or_else(|| cursor.error(AssembleErrorKind::ExpectedExpression, "input ends here"))?;

    if token.is("(") {
        let (value, rest) = parse_at(cursor.advance(), GROUP_PRECEDENCE, symbols)?;
        return match rest.peek() {
            Some(close) if close.is(")") => Ok((value, rest.advance())),
            _ => Err(AssembleError::at(
                AssembleErrorKind::RightParenthesisMissing,
                format!("`(` at {} is never closed", token),
                rest.location(),
            )),
        };
    }

    let prefix = ["+", "-", "~", "!"].iter().find(|text| token.is(text));
    if let Some(prefix) = prefix.filter(|_| cursor.expects_operand(symbols)) {
        let precedence = match *prefix {
            "+" | "-" => SIGN_PRECEDENCE,
            _ => symbols.get(prefix).map_or(SIGN_PRECEDENCE, |symbol| symbol.value),
        };
        let (operand, rest) = parse_terminal(cursor.advance(), symbols)?;
        let (operand, rest) = parse(operand, precedence, rest, symbols)?;

        let value = match *prefix {
            "-" => operand.wrapping_neg(),
            "~" => !operand,
            "!" => (operand == 0) as i64,
            _ => operand,
        };
        return Ok((value, rest));
    }

    let value = to_number(token, symbols)
        .map_err(|kind| AssembleError::at(kind, format!("`{}`", token.text), Some(token)))?;
    Ok((value, cursor.advance()))
}

/// Folds binary operators binding at least as tight as `precedence` into `lhs`
pub fn parse<'t>(
    lhs: i64,
    precedence: i64,
    cursor: Cursor<'t>,
    symbols: &SymbolTable,
) -> Result<(i64, Cursor<'t>)> {
    let (mut lhs, mut cursor) = (lhs, cursor);

    while let Some((op, op_precedence, _)) = binary_operator(cursor, symbols) {
        if op_precedence < precedence {
            break;
        }

        let (mut rhs, mut rest) = parse_terminal(cursor.advance(), symbols)?;
        while let Some((_, next_precedence, associativity)) = binary_operator(rest, symbols) {
            let tighter = next_precedence > op_precedence;
            let right = next_precedence == op_precedence && associativity == Associativity::Right;
            if !tighter && !right {
                break;
            }

            let threshold = if tighter { op_precedence + 1 } else { op_precedence };
            let (value, next) = parse(rhs, threshold, rest, symbols)?;
            rhs = value;
            rest = next;
        }

        lhs = apply(op, lhs, rhs)?;
        cursor = rest;
    }

    Ok((lhs, cursor))
}

fn apply(op: &Token, lhs: i64, rhs: i64) -> Result<i64> {
    let shift = if (0..64).contains(&rhs) {
        Some(rhs as u32)
    } else {
        None
    };
    let truth = |value: bool| value as i64;

    let value = match op.text.as_str() {
        "+" => lhs.wrapping_add(rhs),
        "-" => lhs.wrapping_sub(rhs),
        "*" => lhs.wrapping_mul(rhs),
        "/" | "%" if rhs == 0 => {
            return Err(AssembleError::at(
                AssembleErrorKind::DivisionByZero,
                format!("`{} {} {}`", lhs, op.text, rhs),
                Some(op),
            ))
        }
        "/" => lhs.wrapping_div(rhs),
        "%" => lhs.wrapping_rem(rhs),
        "|" => lhs | rhs,
        "&" => lhs & rhs,
        "^" => lhs ^ rhs,
        "<<" => shift.map_or(0, |n| ((lhs as u64) << n) as i64),
        ">>" => shift.map_or(0, |n| ((lhs as u64) >> n) as i64),
        ">>>" => lhs >> shift.unwrap_or(63),
        "||" => truth(lhs != 0 || rhs != 0),
        "&&" => truth(lhs != 0 && rhs != 0),
        "^^" => truth((lhs != 0) ^ (rhs != 0)),
        "<" => truth(lhs < rhs),
        ">" => truth(lhs > rhs),
        "<=" => truth(lhs <= rhs),
        ">=" => truth(lhs >= rhs),
        "==" => truth(lhs == rhs),
        "!=" => truth(lhs != rhs),
        // `,`
        _ => rhs,
    };

    log::trace!("{} {} {} = {}", lhs, op.text, rhs, value);
    Ok(value)
}

/// The value of a single token
pub fn to_number(token: &Token, symbols: &SymbolTable) -> std::result::Result<i64, AssembleErrorKind> {
    if token.kind == TokenKind::Quoted {
        // only the first character counts
        return Ok(token.text.chars().next().map_or(0, |c| c as i64));
    }

    if let Some(symbol) = symbols.get(&token.text) {
        return match symbol.kind {
            SymbolKind::KnownNumber | SymbolKind::Operator => Ok(symbol.value),
            _ => Err(AssembleErrorKind::UnresolvedValue),
        };
    }

    if !token.text.starts_with(|c: char| c.is_ascii_digit()) {
        return Err(AssembleErrorKind::UnresolvedValue);
    }
    parse_number(&token.text).ok_or(AssembleErrorKind::NotANumber)
}

/// Parses a numeric literal.
///
/// Supports the prefixes `0b`, `0q`, `0o`, `0d` and `0x`; any other leading
/// `0` means octal, everything else is decimal.
pub fn parse_number(text: &str) -> Option<i64> {
    let (radix, offset) = match text.as_bytes() {
        [b'0', b'b', ..] => (2, 2),
        [b'0', b'q', ..] => (4, 2),
        [b'0', b'o', ..] => (8, 2),
        [b'0', b'd', ..] => (10, 2),
        [b'0', b'x', ..] => (16, 2),
        [b'0', _, ..] => (8, 1),
        _ => (10, 0),
    };

    let digits = &text[offset..];
    if !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }
    u64::from_str_radix(digits, radix).ok().map(|value| value as i64)
}
