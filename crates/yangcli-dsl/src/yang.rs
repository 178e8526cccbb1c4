//! Statement-tree parser for the YANG subset used by schema documents.
//!
//! Every YANG construct shares one generic shape:
//!
//! ```text
//! keyword [argument] ( ";" | "{" statement* "}" )
//! ```
//!
//! so the parser does not know about `rpc`, `leaf` or extensions at all; it
//! produces a tree of [`Statement`]s and leaves interpretation to
//! [`crate::extract`].
//!
//! Notes:
//! - Keywords may carry a `prefix:` (extension statements such as
//!   `ex:cli-usage`).
//! - Arguments are unquoted tokens or one or more quoted strings joined with
//!   `+`. Double quotes honour `\n`, `\t`, `\"` and `\\`; single quotes are
//!   literal.
//! - `//` line comments and `/* ... */` block comments are skipped anywhere
//!   whitespace is allowed.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_until, take_while, take_while1},
    character::complete::{char as pchar, multispace1, not_line_ending},
    combinator::{all_consuming, cut, map, opt, recognize, value},
    error::{Error as NomError, ErrorKind},
    multi::{many0, separated_list1},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::fmt;
use thiserror::Error;

// ============================================================================
// Statement tree
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Keyword {
    pub prefix: Option<String>,
    pub name: String,
}

impl Keyword {
    /// True for an unprefixed core keyword such as `rpc` or `leaf`.
    pub fn is_builtin(&self, name: &str) -> bool {
        self.prefix.is_none() && self.name == name
    }

    /// Prefix-agnostic match: `cli-usage`, `ex:cli-usage` and `foo:cli-usage`
    /// all have the local name `cli-usage`.
    pub fn has_local_name(&self, local: &str) -> bool {
        self.name == local
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.prefix {
            Some(prefix) => write!(f, "{prefix}:{}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Statement {
    pub keyword: Keyword,
    pub argument: Option<String>,
    pub substatements: Vec<Statement>,
    /// 1-based line of the keyword.
    pub line: usize,
}

impl Statement {
    pub fn arg(&self) -> Option<&str> {
        self.argument.as_deref()
    }

    pub fn children(&self) -> impl Iterator<Item = &Statement> {
        self.substatements.iter()
    }
}

// ============================================================================
// Parser
// ============================================================================

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum YangParseError {
    #[error("parse error on line {line}: {message}")]
    Line { line: usize, message: String },
}

pub fn parse_statements(text: &str) -> Result<Vec<Statement>, YangParseError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let parser = StatementParser::new(text);

    let result = all_consuming(|input| {
        let (input, _) = sep(input)?;
        many0(terminated(|i| parser.statement(i), sep))(input)
    })(text);

    match result {
        Ok((_, statements)) => Ok(statements),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(parser.error_at(e.input)),
        Err(nom::Err::Incomplete(_)) => Err(YangParseError::Line {
            line: parser.line_of(""),
            message: "unexpected end of input".to_string(),
        }),
    }
}

struct StatementParser<'a> {
    source: &'a str,
    /// Last `(offset, line)` looked up. Statements are reached front to
    /// back, so counting resumes from here instead of the start.
    cursor: Cell<(usize, usize)>,
}

impl<'a> StatementParser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            cursor: Cell::new((0, 1)),
        }
    }

    fn line_of(&self, rest: &str) -> usize {
        let offset = self.source.len().saturating_sub(rest.len());
        let (mut from, mut line) = self.cursor.get();
        if offset < from {
            from = 0;
            line = 1;
        }
        line += self.source.as_bytes()[from..offset]
            .iter()
            .filter(|&&b| b == b'\n')
            .count();
        self.cursor.set((offset, line));
        line
    }

    fn error_at(&self, rest: &str) -> YangParseError {
        let line = self.line_of(rest);
        let near = rest.lines().next().unwrap_or("").trim();
        let message = if near.is_empty() {
            "unexpected end of input (unclosed `{` or string?)".to_string()
        } else {
            let snippet: String = near.chars().take(40).collect();
            format!("unexpected input near `{snippet}`")
        };
        YangParseError::Line { line, message }
    }

    fn statement(&self, input: &'a str) -> IResult<&'a str, Statement> {
        let line = self.line_of(input);
        let (input, keyword) = keyword(input)?;
        let (input, _) = sep(input)?;
        let (input, argument) = opt(argument)(input)?;
        let (input, _) = sep(input)?;
        let (input, substatements) =
            alt((value(Vec::new(), pchar(';')), |i| self.block(i)))(input)?;
        Ok((
            input,
            Statement {
                keyword,
                argument,
                substatements,
                line,
            },
        ))
    }

    fn block(&self, input: &'a str) -> IResult<&'a str, Vec<Statement>> {
        let (input, _) = pchar('{')(input)?;
        cut(|input| {
            let (input, _) = sep(input)?;
            let (input, body) = many0(terminated(|i| self.statement(i), sep))(input)?;
            let (input, _) = pchar('}')(input)?;
            Ok((input, body))
        })(input)
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')
}

fn parse_ident(input: &str) -> IResult<&str, &str> {
    recognize(tuple((
        take_while1(is_ident_start),
        take_while(is_ident_continue),
    )))(input)
}

fn keyword(input: &str) -> IResult<&str, Keyword> {
    map(
        pair(parse_ident, opt(preceded(pchar(':'), parse_ident))),
        |(first, second)| match second {
            Some(name) => Keyword {
                prefix: Some(first.to_string()),
                name: name.to_string(),
            },
            None => Keyword {
                prefix: None,
                name: first.to_string(),
            },
        },
    )(input)
}

fn line_comment(input: &str) -> IResult<&str, &str> {
    preceded(tag("//"), not_line_ending)(input)
}

fn block_comment(input: &str) -> IResult<&str, &str> {
    delimited(tag("/*"), take_until("*/"), tag("*/"))(input)
}

/// Whitespace and comments (possibly none).
fn sep(input: &str) -> IResult<&str, ()> {
    value(
        (),
        many0(alt((multispace1, line_comment, block_comment))),
    )(input)
}

fn argument(input: &str) -> IResult<&str, String> {
    alt((concatenated_quoted, unquoted))(input)
}

fn unquoted(input: &str) -> IResult<&str, String> {
    map(
        take_while1(|c: char| {
            !c.is_whitespace() && !matches!(c, ';' | '{' | '}' | '"' | '\'')
        }),
        str::to_string,
    )(input)
}

fn concatenated_quoted(input: &str) -> IResult<&str, String> {
    map(
        separated_list1(tuple((sep, pchar('+'), sep)), quoted),
        |parts| parts.concat(),
    )(input)
}

fn quoted(input: &str) -> IResult<&str, String> {
    alt((double_quoted, single_quoted))(input)
}

fn single_quoted(input: &str) -> IResult<&str, String> {
    map(
        delimited(pchar('\''), take_while(|c| c != '\''), pchar('\'')),
        str::to_string,
    )(input)
}

fn double_quoted(input: &str) -> IResult<&str, String> {
    let (mut rest, _) = pchar('"')(input)?;
    let mut out = String::new();
    loop {
        let mut chars = rest.chars();
        match chars.next() {
            None => return Err(nom::Err::Error(NomError::new(rest, ErrorKind::Char))),
            Some('"') => return Ok((chars.as_str(), out)),
            Some('\\') => {
                match chars.next() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('"') => out.push('"'),
                    Some('\\') => out.push('\\'),
                    Some(other) => {
                        out.push('\\');
                        out.push(other);
                    }
                    None => return Err(nom::Err::Error(NomError::new(rest, ErrorKind::Char))),
                }
                rest = chars.as_str();
            }
            Some(c) => {
                out.push(c);
                rest = chars.as_str();
            }
        }
    }
}
