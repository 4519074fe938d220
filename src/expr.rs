/*
Copyright 2025 Connor Nolan

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

//! The expression evaluator: operator precedence, parentheses, and the
//! built-in byte-extraction functions.
//!
//! Tokenizing, recursive-descent parsing into an [`Expression`] AST, and
//! structural evaluation are kept as separate stages, rather than the
//! rightmost-operator string scan the original implementation used.

use std::collections::HashMap;
use std::path::Path;

use crate::ast::{BinOp, Expression, FuncName, UnaryOp};
use crate::errors::{self, AssemblyError};

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Num(i64),
    Char(i64),
    Ident(String),
    Op(&'static str),
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Tok>, String> {
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    let mut out = Vec::new();

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        match c {
            '(' => {
                out.push(Tok::LParen);
                i += 1;
            }
            ')' => {
                out.push(Tok::RParen);
                i += 1;
            }
            '|' => {
                out.push(Tok::Op("|"));
                i += 1;
            }
            '^' => {
                out.push(Tok::Op("^"));
                i += 1;
            }
            '&' => {
                out.push(Tok::Op("&"));
                i += 1;
            }
            '+' => {
                out.push(Tok::Op("+"));
                i += 1;
            }
            '-' => {
                out.push(Tok::Op("-"));
                i += 1;
            }
            '~' => {
                out.push(Tok::Op("~"));
                i += 1;
            }
            '<' if chars.get(i + 1) == Some(&'<') => {
                out.push(Tok::Op("<<"));
                i += 2;
            }
            '>' if chars.get(i + 1) == Some(&'>') => {
                out.push(Tok::Op(">>"));
                i += 2;
            }
            '$' => {
                let start = i + 1;
                let mut j = start;
                while j < chars.len() && chars[j].is_ascii_hexdigit() {
                    j += 1;
                }
                if j == start {
                    return Err("malformed hex number: no digits after '$'".to_string());
                }
                let text: String = chars[start..j].iter().collect();
                let value = i64::from_str_radix(&text, 16)
                    .map_err(|_| format!("malformed hex number '${text}'"))?;
                out.push(Tok::Num(value));
                i = j;
            }
            '%' => {
                let start = i + 1;
                let mut j = start;
                while j < chars.len() && (chars[j] == '0' || chars[j] == '1') {
                    j += 1;
                }
                if j == start {
                    return Err("malformed binary number: no digits after '%'".to_string());
                }
                let text: String = chars[start..j].iter().collect();
                let value = i64::from_str_radix(&text, 2)
                    .map_err(|_| format!("malformed binary number '%{text}'"))?;
                out.push(Tok::Num(value));
                i = j;
            }
            '\'' => {
                let (value, consumed) = parse_char_literal(&chars[i..])?;
                out.push(Tok::Char(value));
                i += consumed;
            }
            d if d.is_ascii_digit() => {
                let start = i;
                let mut j = i;
                while j < chars.len() && chars[j].is_ascii_digit() {
                    j += 1;
                }
                let text: String = chars[start..j].iter().collect();
                let value = text
                    .parse::<i64>()
                    .map_err(|_| format!("malformed decimal number '{text}'"))?;
                out.push(Tok::Num(value));
                i = j;
            }
            a if a.is_alphabetic() || a == '_' => {
                let start = i;
                let mut j = i;
                while j < chars.len() && (chars[j].is_alphanumeric() || chars[j] == '_') {
                    j += 1;
                }
                let text: String = chars[start..j].iter().collect();
                out.push(Tok::Ident(text));
                i = j;
            }
            other => return Err(format!("unexpected character '{other}' in expression")),
        }
    }

    Ok(out)
}

/// Parses a `'c'` literal starting at `chars[0] == '\''`. Returns the byte
/// value and the number of chars consumed.
fn parse_char_literal(chars: &[char]) -> Result<(i64, usize), String> {
    debug_assert_eq!(chars[0], '\'');
    let mut i = 1;
    if i >= chars.len() {
        return Err("unterminated character literal".to_string());
    }
    if chars[i] == '\'' {
        return Err("empty character literal".to_string());
    }
    let value: i64;
    if chars[i] == '\\' {
        i += 1;
        if i >= chars.len() {
            return Err("unterminated character literal".to_string());
        }
        value = match chars[i] {
            'n' => b'\n' as i64,
            't' => b'\t' as i64,
            'r' => b'\r' as i64,
            '0' => 0,
            '\\' => b'\\' as i64,
            '\'' => b'\'' as i64,
            other => return Err(format!("unknown escape sequence '\\{other}' in character literal")),
        };
        i += 1;
    } else {
        value = chars[i] as i64;
        i += 1;
    }
    if i >= chars.len() || chars[i] != '\'' {
        if i < chars.len() && chars[i] != '\'' {
            return Err("character literal must contain exactly one character".to_string());
        }
        return Err("unterminated character literal".to_string());
    }
    i += 1;
    Ok((value, i))
}

struct Parser {
    tokens: Vec<Tok>,
    pos: usize,
}

type PResult<T> = Result<T, String>;

impl Parser {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Tok> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn expect_op(&mut self, op: &str) -> bool {
        if matches!(self.peek(), Some(Tok::Op(o)) if *o == op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_expr(&mut self) -> PResult<Expression> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> PResult<Expression> {
        let mut lhs = self.parse_xor()?;
        while self.expect_op("|") {
            let rhs = self.parse_xor()?;
            lhs = Expression::Binary(BinOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_xor(&mut self) -> PResult<Expression> {
        let mut lhs = self.parse_and()?;
        while self.expect_op("^") {
            let rhs = self.parse_and()?;
            lhs = Expression::Binary(BinOp::Xor, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> PResult<Expression> {
        let mut lhs = self.parse_shift()?;
        while self.expect_op("&") {
            let rhs = self.parse_shift()?;
            lhs = Expression::Binary(BinOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_shift(&mut self) -> PResult<Expression> {
        let mut lhs = self.parse_addsub()?;
        loop {
            if self.expect_op("<<") {
                let rhs = self.parse_addsub()?;
                lhs = Expression::Binary(BinOp::Shl, Box::new(lhs), Box::new(rhs));
            } else if self.expect_op(">>") {
                let rhs = self.parse_addsub()?;
                lhs = Expression::Binary(BinOp::Shr, Box::new(lhs), Box::new(rhs));
            } else {
                break;
            }
        }
        Ok(lhs)
    }

    fn parse_addsub(&mut self) -> PResult<Expression> {
        let mut lhs = self.parse_unary()?;
        loop {
            if self.expect_op("+") {
                let rhs = self.parse_unary()?;
                lhs = Expression::Binary(BinOp::Add, Box::new(lhs), Box::new(rhs));
            } else if self.expect_op("-") {
                let rhs = self.parse_unary()?;
                lhs = Expression::Binary(BinOp::Sub, Box::new(lhs), Box::new(rhs));
            } else {
                break;
            }
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> PResult<Expression> {
        if self.expect_op("~") {
            let inner = self.parse_unary()?;
            return Ok(Expression::Unary(UnaryOp::Complement, Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> PResult<Expression> {
        match self.advance() {
            Some(Tok::Num(n)) => Ok(Expression::Number(n)),
            Some(Tok::Char(c)) => Ok(Expression::Number(c)),
            Some(Tok::LParen) => {
                let inner = self.parse_expr()?;
                if !matches!(self.advance(), Some(Tok::RParen)) {
                    return Err("unmatched parentheses in expression".to_string());
                }
                Ok(inner)
            }
            Some(Tok::Ident(name)) => {
                let upper = name.to_ascii_uppercase();
                if (upper == "LOW_BYTE" || upper == "HIGH_BYTE") && matches!(self.peek(), Some(Tok::LParen)) {
                    self.advance();
                    let inner = self.parse_expr()?;
                    if !matches!(self.advance(), Some(Tok::RParen)) {
                        return Err(format!("unmatched parentheses in {upper}(...)"));
                    }
                    let func = if upper == "LOW_BYTE" {
                        FuncName::LowByte
                    } else {
                        FuncName::HighByte
                    };
                    Ok(Expression::Func(func, Box::new(inner)))
                } else {
                    Ok(Expression::Symbol(name))
                }
            }
            Some(Tok::Op(op)) => Err(format!("unexpected operator '{op}' where a value was expected")),
            Some(Tok::RParen) => Err("unexpected ')' in expression".to_string()),
            None => Err("empty expression or missing operand".to_string()),
        }
    }
}

fn parse(input: &str) -> PResult<Expression> {
    let tokens = tokenize(input).map_err(|e| e)?;
    if tokens.is_empty() {
        return Err("empty expression".to_string());
    }
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_expr()?;
    if parser.pos != parser.tokens.len() {
        return Err("trailing characters after expression".to_string());
    }
    Ok(expr)
}

/// Structural evaluation of a parsed expression tree against a symbol table.
pub fn eval_ast(expr: &Expression, symbols: &HashMap<String, u16>) -> Result<i64, String> {
    match expr {
        Expression::Number(n) => Ok(*n),
        Expression::Symbol(name) => symbols
            .get(name)
            .map(|&v| v as i64)
            .ok_or_else(|| format!("unknown symbol '{name}'")),
        Expression::Unary(UnaryOp::Complement, inner) => {
            let v = eval_ast(inner, symbols)?;
            Ok((!v) & 0xFF)
        }
        Expression::Binary(op, l, r) => {
            let lv = eval_ast(l, symbols)?;
            let rv = eval_ast(r, symbols)?;
            Ok(match op {
                BinOp::Or => lv | rv,
                BinOp::Xor => lv ^ rv,
                BinOp::And => lv & rv,
                BinOp::Shl => (lv << rv) & 0xFF,
                BinOp::Shr => (lv >> rv) & 0xFF,
                BinOp::Add => lv + rv,
                BinOp::Sub => lv - rv,
            })
        }
        Expression::Func(func, inner) => {
            let v = eval_ast(inner, symbols)?;
            if !(0..=0xFFFF).contains(&v) {
                return Err(format!("argument {v} out of range 0..=0xFFFF for LOW_BYTE/HIGH_BYTE"));
            }
            Ok(match func {
                FuncName::LowByte => v & 0xFF,
                FuncName::HighByte => (v >> 8) & 0xFF,
            })
        }
    }
}

/// Parses and evaluates `input` against `symbols`, wrapping any failure as a
/// [`AssemblyError::Semantic`] at `(file, line)`.
pub fn eval(
    input: &str,
    symbols: &HashMap<String, u16>,
    file: &Path,
    line: usize,
) -> Result<i64, AssemblyError> {
    let trimmed = input.trim();
    let ast = parse(trimmed).map_err(|e| errors::semantic(file, line, e))?;
    eval_ast(&ast, symbols).map_err(|e| errors::semantic(file, line, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn syms() -> HashMap<String, u16> {
        let mut m = HashMap::new();
        m.insert("VAL".to_string(), 0x42);
        m
    }

    fn ev(s: &str) -> i64 {
        eval(s, &syms(), Path::new("t.asm"), 1).unwrap()
    }

    #[test]
    fn decimal_hex_and_binary_numbers() {
        assert_eq!(ev("10"), 10);
        assert_eq!(ev("$1A"), 0x1A);
        assert_eq!(ev("%1010"), 0b1010);
    }

    #[test]
    fn symbol_lookup() {
        assert_eq!(ev("VAL"), 0x42);
    }

    #[test]
    fn unknown_symbol_fails() {
        assert!(eval("NOPE", &syms(), Path::new("t.asm"), 1).is_err());
    }

    #[test]
    fn precedence_matches_grammar() {
        assert_eq!(ev("1 | 0 & 0"), 1 | (0 & 0));
        assert_eq!(ev("2 + 3 << 1"), ((2 + 3) << 1) & 0xFF);
    }

    #[test]
    fn parentheses_override_precedence() {
        assert_eq!(ev("(1 + 2) << 1"), 6);
    }

    #[test]
    fn low_byte_and_high_byte() {
        assert_eq!(ev("LOW_BYTE($1234)"), 0x34);
        assert_eq!(ev("HIGH_BYTE($1234)"), 0x12);
    }

    #[test]
    fn complement_masks_to_eight_bits() {
        assert_eq!(ev("~0"), 0xFF);
    }

    #[test]
    fn character_literal_yields_byte_value() {
        assert_eq!(ev("'A'"), b'A' as i64);
        assert_eq!(ev("'\\n'"), b'\n' as i64);
    }

    #[test]
    fn empty_character_literal_fails() {
        assert!(eval("''", &syms(), Path::new("t.asm"), 1).is_err());
    }

    #[test]
    fn unmatched_parentheses_fail() {
        assert!(eval("(1 + 2", &syms(), Path::new("t.asm"), 1).is_err());
    }
}
