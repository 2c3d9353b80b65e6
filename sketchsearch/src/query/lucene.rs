//! Lucene `query_string` subset: tokenizer, parser and document evaluation.
//!
//! Supported syntax: bare terms (case-insensitive substring over all values),
//! `field:value` and `field:"quoted value"`, trailing `*` prefixes, quoted
//! phrases, `-term` / `NOT term`, `AND` / `&&` (also implicit), `OR` / `||`
//! and parenthesized groups. Precedence is OR < AND < NOT.

use super::matcher::{field_values, text_of};
use crate::{Error, Result};
use nom::{
    branch::alt,
    bytes::complete::{take_until, take_while1},
    character::complete::{char, multispace0, satisfy},
    combinator::{all_consuming, map, peek},
    multi::many0,
    sequence::{delimited, pair, preceded, terminated},
    IResult,
};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Term(String),
    Quoted(String),
    Field {
        field: String,
        value: String,
        quoted: bool,
    },
    And,
    Or,
    Not,
    Minus,
    LParen,
    RParen,
}

fn is_word_char(c: char) -> bool {
    !c.is_whitespace() && !matches!(c, '(' | ')' | '"')
}

fn is_field_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '.' | '@' | '-')
}

fn word(input: &str) -> IResult<&str, &str> {
    take_while1(is_word_char)(input)
}

/// Parse a quoted string
fn quoted_string(input: &str) -> IResult<&str, String> {
    delimited(
        char('"'),
        map(take_until("\""), |s: &str| s.to_string()),
        char('"'),
    )(input)
}

/// Parse field:value or field:"quoted value"
fn field_term(input: &str) -> IResult<&str, Token> {
    map(
        pair(
            terminated(take_while1(is_field_char), char(':')),
            alt((
                map(quoted_string, |v| (v, true)),
                map(word, |w: &str| (w.to_string(), false)),
            )),
        ),
        |(field, (value, quoted)): (&str, (String, bool))| Token::Field {
            field: field.to_string(),
            value,
            quoted,
        },
    )(input)
}

/// A `-` directly in front of a term negates it.
fn minus(input: &str) -> IResult<&str, Token> {
    map(
        terminated(char('-'), peek(satisfy(|c| !c.is_whitespace()))),
        |_| Token::Minus,
    )(input)
}

/// Bare words, with boolean operators recognized in upper case only.
fn keyword_or_term(input: &str) -> IResult<&str, Token> {
    map(word, |w: &str| match w {
        "AND" | "&&" => Token::And,
        "OR" | "||" => Token::Or,
        "NOT" => Token::Not,
        other => Token::Term(other.to_string()),
    })(input)
}

fn token(input: &str) -> IResult<&str, Token> {
    alt((
        map(char('('), |_| Token::LParen),
        map(char(')'), |_| Token::RParen),
        minus,
        field_term,
        map(quoted_string, Token::Quoted),
        keyword_or_term,
    ))(input)
}

/// Split a query string into tokens. Fails on input the grammar cannot
/// consume, such as an unterminated quote.
pub fn tokenize(input: &str) -> Result<Vec<Token>> {
    let parsed: IResult<&str, Vec<Token>> =
        all_consuming(terminated(many0(preceded(multispace0, token)), multispace0))(input);
    parsed
        .map(|(_, tokens)| tokens)
        .map_err(|_| Error::InvalidRequest(format!("cannot parse query string '{}'", input)))
}

/// Parsed query string.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryNode {
    Any,
    /// Lowercased needle matched as a substring of any value.
    Text(String),
    Field {
        field: String,
        pattern: String,
        /// Quoted values never expand a trailing `*`.
        exact: bool,
    },
    And(Vec<QueryNode>),
    Or(Vec<QueryNode>),
    Not(Box<QueryNode>),
}

pub fn parse(input: &str) -> Result<QueryNode> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Ok(QueryNode::Any);
    }

    let mut parser = Parser {
        query: input,
        tokens: &tokens,
        pos: 0,
    };
    let node = parser.or_expr()?;
    if parser.pos < tokens.len() {
        return Err(parser.error("unbalanced ')'"));
    }
    Ok(node)
}

struct Parser<'a> {
    query: &'a str,
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn error(&self, reason: &str) -> Error {
        Error::InvalidRequest(format!("invalid query string '{}': {}", self.query, reason))
    }

    fn or_expr(&mut self) -> Result<QueryNode> {
        let mut nodes = vec![self.and_expr()?];
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            nodes.push(self.and_expr()?);
        }
        Ok(collapse(nodes, QueryNode::Or))
    }

    fn and_expr(&mut self) -> Result<QueryNode> {
        let mut nodes = vec![self.unary()?];
        loop {
            match self.peek() {
                Some(Token::And) => {
                    self.pos += 1;
                    nodes.push(self.unary()?);
                }
                Some(Token::Or) | Some(Token::RParen) | None => break,
                Some(_) => nodes.push(self.unary()?),
            }
        }
        Ok(collapse(nodes, QueryNode::And))
    }

    fn unary(&mut self) -> Result<QueryNode> {
        match self.peek() {
            Some(Token::Not) | Some(Token::Minus) => {
                self.pos += 1;
                Ok(QueryNode::Not(Box::new(self.unary()?)))
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<QueryNode> {
        let token = self
            .peek()
            .ok_or_else(|| self.error("expected a term after an operator"))?;
        self.pos += 1;

        match token {
            Token::LParen => {
                let inner = self.or_expr()?;
                match self.peek() {
                    Some(Token::RParen) => {
                        self.pos += 1;
                        Ok(inner)
                    }
                    _ => Err(self.error("missing ')'")),
                }
            }
            Token::Term(t) => Ok(term_node(t)),
            Token::Quoted(phrase) => Ok(QueryNode::Text(phrase.to_lowercase())),
            Token::Field {
                field,
                value,
                quoted,
            } => Ok(QueryNode::Field {
                field: field.clone(),
                pattern: value.to_lowercase(),
                exact: *quoted,
            }),
            Token::RParen => Err(self.error("unbalanced ')'")),
            Token::And | Token::Or | Token::Not | Token::Minus => {
                Err(self.error("operator in term position"))
            }
        }
    }
}

fn collapse(mut nodes: Vec<QueryNode>, combine: fn(Vec<QueryNode>) -> QueryNode) -> QueryNode {
    if nodes.len() == 1 {
        nodes.remove(0)
    } else {
        combine(nodes)
    }
}

fn term_node(term: &str) -> QueryNode {
    if term == "*" {
        return QueryNode::Any;
    }
    let needle = term.strip_suffix('*').unwrap_or(term);
    QueryNode::Text(needle.to_lowercase())
}

impl QueryNode {
    pub fn matches(&self, doc: &Map<String, Value>) -> bool {
        match self {
            QueryNode::Any => true,
            QueryNode::Text(needle) => doc.values().any(|v| match v {
                Value::Array(items) => items
                    .iter()
                    .filter_map(text_of)
                    .any(|t| t.contains(needle.as_str())),
                other => text_of(other).is_some_and(|t| t.contains(needle.as_str())),
            }),
            QueryNode::Field {
                field,
                pattern,
                exact,
            } => field_values(doc, field).any(|v| {
                let Some(text) = text_of(v) else {
                    return false;
                };
                match pattern.strip_suffix('*') {
                    Some(prefix) if !exact => text.starts_with(prefix),
                    _ => text == *pattern,
                }
            }),
            QueryNode::And(nodes) => nodes.iter().all(|n| n.matches(doc)),
            QueryNode::Or(nodes) => nodes.iter().any(|n| n.matches(doc)),
            QueryNode::Not(node) => !node.matches(doc),
        }
    }
}
