// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Lexer for filter expressions and view queries

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, digit1, multispace0, satisfy},
    combinator::{map, opt, recognize, value},
    error::{Error, ErrorKind},
    sequence::{delimited, pair, tuple},
    IResult,
};

use super::{SqlError, SqlResult};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Keywords
    Select,
    From,
    Where,
    As,
    And,
    Or,
    Not,
    Is,
    Null,
    True,
    False,
    Date,
    Timestamp,

    // Names and literals
    Identifier(String),
    QuotedIdentifier(String),
    StringLiteral(String),
    Integer(i64),
    Float(f64),

    // Symbols
    Star,
    Comma,
    Dot,
    LeftParen,
    RightParen,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

fn keyword(word: &str) -> Option<Token> {
    let token = match word.to_ascii_uppercase().as_str() {
        "SELECT" => Token::Select,
        "FROM" => Token::From,
        "WHERE" => Token::Where,
        "AS" => Token::As,
        "AND" => Token::And,
        "OR" => Token::Or,
        "NOT" => Token::Not,
        "IS" => Token::Is,
        "NULL" => Token::Null,
        "TRUE" => Token::True,
        "FALSE" => Token::False,
        "DATE" => Token::Date,
        "TIMESTAMP" => Token::Timestamp,
        _ => return None,
    };
    Some(token)
}

fn symbol(input: &str) -> IResult<&str, Token> {
    alt((
        value(Token::LtEq, tag("<=")),
        value(Token::GtEq, tag(">=")),
        value(Token::NotEq, tag("<>")),
        value(Token::NotEq, tag("!=")),
        value(Token::Lt, char('<')),
        value(Token::Gt, char('>')),
        value(Token::Eq, char('=')),
        value(Token::Star, char('*')),
        value(Token::Comma, char(',')),
        value(Token::Dot, char('.')),
        value(Token::LeftParen, char('(')),
        value(Token::RightParen, char(')')),
    ))(input)
}

/// Integer or decimal literal with an optional leading minus
fn number(input: &str) -> IResult<&str, Token> {
    let (rest, text) = recognize(tuple((
        opt(char('-')),
        digit1,
        opt(pair(char('.'), digit1)),
    )))(input)?;
    let parsed = if text.contains('.') {
        text.parse::<f64>().ok().map(Token::Float)
    } else {
        text.parse::<i64>().ok().map(Token::Integer)
    };
    match parsed {
        Some(token) => Ok((rest, token)),
        None => Err(nom::Err::Error(Error::new(input, ErrorKind::Digit))),
    }
}

/// Single-quoted string. Accepts both `''` and `\'` as an embedded quote.
fn string_literal(input: &str) -> IResult<&str, Token> {
    let (mut rest, _) = char('\'')(input)?;
    let mut content = String::new();
    loop {
        let mut chars = rest.chars();
        match chars.next() {
            None => return Err(nom::Err::Error(Error::new(input, ErrorKind::Char))),
            Some('\'') => {
                if rest[1..].starts_with('\'') {
                    content.push('\'');
                    rest = &rest[2..];
                } else {
                    return Ok((&rest[1..], Token::StringLiteral(content)));
                }
            }
            Some('\\') => match chars.next() {
                Some(escaped) => {
                    content.push(escaped);
                    rest = &rest[1 + escaped.len_utf8()..];
                }
                None => return Err(nom::Err::Error(Error::new(input, ErrorKind::Char))),
            },
            Some(c) => {
                content.push(c);
                rest = &rest[c.len_utf8()..];
            }
        }
    }
}

/// Backtick-delimited name, e.g. `project.dataset.table` or `my column`
fn quoted_identifier(input: &str) -> IResult<&str, Token> {
    map(
        delimited(char('`'), take_while1(|c| c != '`'), char('`')),
        |s: &str| Token::QuotedIdentifier(s.to_string()),
    )(input)
}

fn word(input: &str) -> IResult<&str, Token> {
    map(
        recognize(pair(
            satisfy(|c| c.is_ascii_alphabetic() || c == '_'),
            take_while(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == '$'),
        )),
        |w: &str| keyword(w).unwrap_or_else(|| Token::Identifier(w.to_string())),
    )(input)
}

fn token(input: &str) -> IResult<&str, Token> {
    alt((string_literal, quoted_identifier, number, symbol, word))(input)
}

/// Split input into tokens, skipping whitespace
pub fn tokenize(input: &str) -> SqlResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut rest = input;
    loop {
        let (after_ws, _) = multispace0::<&str, Error<&str>>(rest)
            .map_err(|_| SqlError::LexerError(rest.to_string()))?;
        if after_ws.is_empty() {
            break;
        }
        match token(after_ws) {
            Ok((next, tok)) => {
                tokens.push(tok);
                rest = next;
            }
            Err(_) => {
                let snippet: String = after_ws.chars().take(16).collect();
                return Err(SqlError::LexerError(snippet));
            }
        }
    }
    Ok(tokens)
}
