//! Arithmetic evaluator for `calc` requests.
//!
//! Grammar, loosest binding first:
//!
//! ```text
//! expr   := term (('+' | '-') term)*
//! term   := unary (('*' | '/' | '%') unary)*
//! unary  := ('+' | '-') unary | power
//! power  := atom ('**' unary)?
//! atom   := number | '(' expr ')'
//! ```
//!
//! `**` is right-associative and binds tighter than a leading minus, so
//! `-2**2` is `-4`. `%` takes the sign of the divisor.

use thiserror::Error;

/// Longest accepted expression after normalization.
pub const MAX_EXPRESSION_LEN: usize = 256;

/// Parentheses nested deeper than this are rejected.
const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CalcError {
    #[error("expression is empty")]
    Empty,

    #[error("expression is too long")]
    TooLong,

    #[error("invalid character {0:?}")]
    InvalidCharacter(char),

    #[error("syntax error at position {0}")]
    Syntax(usize),

    #[error("division by zero")]
    DivisionByZero,

    #[error("result is not a finite number")]
    NotFinite,
}

/// Strip spaces and map `×`/`÷` to `*`/`/`, rejecting anything else unknown.
pub fn normalize(expr: &str) -> Result<String, CalcError> {
    let mut out = String::with_capacity(expr.len());
    for c in expr.chars() {
        match c {
            c if c.is_whitespace() => {}
            '×' => out.push('*'),
            '÷' => out.push('/'),
            '0'..='9' | '+' | '-' | '*' | '/' | '.' | '%' | '(' | ')' => out.push(c),
            other => return Err(CalcError::InvalidCharacter(other)),
        }
    }
    if out.is_empty() {
        return Err(CalcError::Empty);
    }
    if out.len() > MAX_EXPRESSION_LEN {
        return Err(CalcError::TooLong);
    }
    Ok(out)
}

/// Evaluate an arithmetic expression.
pub fn evaluate(expr: &str) -> Result<f64, CalcError> {
    let normalized = normalize(expr)?;
    let mut parser = Parser {
        src: normalized.as_bytes(),
        pos: 0,
        depth: 0,
    };
    let value = parser.expr()?;
    if parser.pos != parser.src.len() {
        return Err(CalcError::Syntax(parser.pos));
    }
    finite(value)
}

/// Integers print without a fraction, everything else rounds to 8 decimals.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        return format!("{}", value as i64);
    }
    let rounded = format!("{:.8}", value);
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    if trimmed == "-0" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

fn finite(value: f64) -> Result<f64, CalcError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(CalcError::NotFinite)
    }
}

struct Parser<'a> {
    src: &'a [u8],
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn starts_with(&self, token: &[u8]) -> bool {
        self.src[self.pos..].starts_with(token)
    }

    fn expr(&mut self) -> Result<f64, CalcError> {
        let mut value = self.term()?;
        while let Some(op @ (b'+' | b'-')) = self.peek() {
            self.pos += 1;
            let rhs = self.term()?;
            value = if op == b'+' { value + rhs } else { value - rhs };
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<f64, CalcError> {
        let mut value = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(b'*') if !self.starts_with(b"**") => b'*',
                Some(op @ (b'/' | b'%')) => op,
                _ => return Ok(value),
            };
            self.pos += 1;
            let rhs = self.unary()?;
            value = match op {
                b'*' => value * rhs,
                _ if rhs == 0.0 => return Err(CalcError::DivisionByZero),
                b'/' => value / rhs,
                _ => value - rhs * (value / rhs).floor(),
            };
        }
    }

    fn unary(&mut self) -> Result<f64, CalcError> {
        match self.peek() {
            Some(b'-') => {
                self.pos += 1;
                self.nested(|p| p.unary()).map(|v| -v)
            }
            Some(b'+') => {
                self.pos += 1;
                self.nested(|p| p.unary())
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<f64, CalcError> {
        let base = self.atom()?;
        if !self.starts_with(b"**") {
            return Ok(base);
        }
        self.pos += 2;
        let exponent = self.nested(|p| p.unary())?;
        if base == 0.0 && exponent < 0.0 {
            return Err(CalcError::DivisionByZero);
        }
        finite(base.powf(exponent))
    }

    fn atom(&mut self) -> Result<f64, CalcError> {
        match self.peek() {
            Some(b'(') => {
                self.pos += 1;
                let value = self.nested(|p| p.expr())?;
                if self.peek() != Some(b')') {
                    return Err(CalcError::Syntax(self.pos));
                }
                self.pos += 1;
                Ok(value)
            }
            Some(b'0'..=b'9' | b'.') => self.number(),
            _ => Err(CalcError::Syntax(self.pos)),
        }
    }

    fn number(&mut self) -> Result<f64, CalcError> {
        let start = self.pos;
        while let Some(b'0'..=b'9' | b'.') = self.peek() {
            self.pos += 1;
        }
        std::str::from_utf8(&self.src[start..self.pos])
            .ok()
            .and_then(|s| s.parse::<f64>().ok())
            .ok_or(CalcError::Syntax(start))
    }

    fn nested<F>(&mut self, f: F) -> Result<f64, CalcError>
    where
        F: FnOnce(&mut Self) -> Result<f64, CalcError>,
    {
        if self.depth >= MAX_DEPTH {
            return Err(CalcError::Syntax(self.pos));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }
}
