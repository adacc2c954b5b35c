// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Token-level parser for filters and `SELECT ... FROM ... [WHERE ...]` queries

use chrono::{DateTime, NaiveDate, Utc};
use log::debug;
use nom::{
    branch::alt,
    combinator::{map, opt},
    error::{Error, ErrorKind},
    multi::{many0, separated_list1},
    sequence::{delimited, pair, preceded, tuple},
    IResult,
};

use super::lexer::{tokenize, Token};
use super::predicate::{CompareOp, Predicate};
use super::query::{Projection, QuerySource, SelectQuery};
use super::{SqlError, SqlResult};
use crate::types::{TableReference, Value};

type Tokens<'a> = &'a [Token];

fn fail<T>(input: Tokens) -> IResult<Tokens, T> {
    Err(nom::Err::Error(Error::new(input, ErrorKind::Tag)))
}

/// Match one exact token
fn expect(expected: Token) -> impl Fn(Tokens) -> IResult<Tokens, ()> {
    move |input: Tokens| match input.split_first() {
        Some((token, rest)) if *token == expected => Ok((rest, ())),
        _ => fail(input),
    }
}

fn column(input: Tokens) -> IResult<Tokens, String> {
    match input.split_first() {
        Some((Token::Identifier(name), rest)) | Some((Token::QuotedIdentifier(name), rest)) => {
            Ok((rest, name.clone()))
        }
        _ => fail(input),
    }
}

fn compare_op(input: Tokens) -> IResult<Tokens, CompareOp> {
    let op = match input.first() {
        Some(Token::Eq) => CompareOp::Eq,
        Some(Token::NotEq) => CompareOp::NotEq,
        Some(Token::Lt) => CompareOp::Lt,
        Some(Token::LtEq) => CompareOp::LtEq,
        Some(Token::Gt) => CompareOp::Gt,
        Some(Token::GtEq) => CompareOp::GtEq,
        _ => return fail(input),
    };
    Ok((&input[1..], op))
}

fn literal(input: Tokens) -> IResult<Tokens, Value> {
    match input {
        [Token::Integer(v), rest @ ..] => Ok((rest, Value::Int64(*v))),
        [Token::Float(v), rest @ ..] => Ok((rest, Value::Float64(*v))),
        [Token::StringLiteral(s), rest @ ..] => Ok((rest, Value::String(s.clone()))),
        [Token::True, rest @ ..] => Ok((rest, Value::Bool(true))),
        [Token::False, rest @ ..] => Ok((rest, Value::Bool(false))),
        [Token::Date, Token::StringLiteral(s), rest @ ..] => {
            match NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                Ok(date) => Ok((rest, Value::Date(date))),
                Err(_) => fail(input),
            }
        }
        [Token::Timestamp, Token::StringLiteral(s), rest @ ..] => {
            match DateTime::parse_from_rfc3339(s) {
                Ok(ts) => Ok((rest, Value::Timestamp(ts.with_timezone(&Utc)))),
                Err(_) => fail(input),
            }
        }
        _ => fail(input),
    }
}

fn comparison(input: Tokens) -> IResult<Tokens, Predicate> {
    alt((
        map(tuple((column, compare_op, literal)), |(column, op, value)| {
            Predicate::Compare { column, op, value }
        }),
        map(tuple((literal, compare_op, column)), |(value, op, column)| {
            Predicate::Compare {
                column,
                op: op.flip(),
                value,
            }
        }),
    ))(input)
}

fn null_check(input: Tokens) -> IResult<Tokens, Predicate> {
    map(
        tuple((
            column,
            expect(Token::Is),
            opt(expect(Token::Not)),
            expect(Token::Null),
        )),
        |(column, _, not, _)| Predicate::IsNull {
            column,
            negated: not.is_some(),
        },
    )(input)
}

fn primary(input: Tokens) -> IResult<Tokens, Predicate> {
    alt((
        delimited(
            expect(Token::LeftParen),
            or_expr,
            expect(Token::RightParen),
        ),
        null_check,
        comparison,
    ))(input)
}

fn not_expr(input: Tokens) -> IResult<Tokens, Predicate> {
    alt((
        map(preceded(expect(Token::Not), not_expr), |p| {
            Predicate::Not(Box::new(p))
        }),
        primary,
    ))(input)
}

fn and_expr(input: Tokens) -> IResult<Tokens, Predicate> {
    map(
        pair(not_expr, many0(preceded(expect(Token::And), not_expr))),
        |(first, rest)| rest.into_iter().fold(first, Predicate::and),
    )(input)
}

fn or_expr(input: Tokens) -> IResult<Tokens, Predicate> {
    map(
        pair(and_expr, many0(preceded(expect(Token::Or), and_expr))),
        |(first, rest)| rest.into_iter().fold(first, Predicate::or),
    )(input)
}

fn projection(input: Tokens) -> IResult<Tokens, Projection> {
    alt((
        map(expect(Token::Star), |_| Projection::All),
        map(separated_list1(expect(Token::Comma), column), Projection::Columns),
    ))(input)
}

/// `project.dataset.table`, quoted as a whole or dotted identifiers
fn table_reference(input: Tokens) -> IResult<Tokens, TableReference> {
    match input {
        [Token::QuotedIdentifier(text), rest @ ..] => match TableReference::parse(text) {
            Some(table) => Ok((rest, table)),
            None => fail(input),
        },
        _ => map(
            tuple((
                column,
                expect(Token::Dot),
                column,
                expect(Token::Dot),
                column,
            )),
            |(project, _, dataset, _, table)| TableReference::new(project, dataset, table),
        )(input),
    }
}

fn alias(input: Tokens) -> IResult<Tokens, ()> {
    map(pair(opt(expect(Token::As)), column), |_| ())(input)
}

fn source(input: Tokens) -> IResult<Tokens, QuerySource> {
    alt((
        map(
            pair(
                delimited(
                    expect(Token::LeftParen),
                    select_query,
                    expect(Token::RightParen),
                ),
                opt(alias),
            ),
            |(query, _)| QuerySource::Subquery(Box::new(query)),
        ),
        map(pair(table_reference, opt(alias)), |(table, _)| {
            QuerySource::Table(table)
        }),
    ))(input)
}

fn select_query(input: Tokens) -> IResult<Tokens, SelectQuery> {
    map(
        tuple((
            preceded(expect(Token::Select), projection),
            preceded(expect(Token::From), source),
            opt(preceded(expect(Token::Where), or_expr)),
        )),
        |(projection, source, filter)| SelectQuery {
            projection,
            source,
            filter,
        },
    )(input)
}

fn complete<T>(
    text: &str,
    parser: impl Fn(Tokens) -> IResult<Tokens, T>,
) -> SqlResult<T> {
    let tokens = tokenize(text)?;
    match parser(tokens.as_slice()) {
        Ok(([], parsed)) => Ok(parsed),
        Ok((rest, _)) => Err(SqlError::TrailingInput(format!("{:?}", rest))),
        Err(e) => {
            debug!("Failed to parse '{}': {:?}", text, e);
            Err(SqlError::ParseError(text.to_string()))
        }
    }
}

/// Parse a standalone filter expression
pub fn parse_predicate(text: &str) -> SqlResult<Predicate> {
    complete(text, or_expr)
}

/// Parse a `SELECT` query of the shape the connector can rewrite
pub fn parse_query(text: &str) -> SqlResult<SelectQuery> {
    complete(text, select_query)
}
