//! ISO 10303-21 statement splitting and tokenization.
//!
//! The exchange file is a sequence of `;`-terminated statements. Comments
//! (`/* ... */`) are dropped while splitting; string literals are kept
//! intact so a `;` inside a string does not end a statement. Each statement
//! is then tokenized with `nom`.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, digit1, one_of},
    combinator::{all_consuming, map, map_res, opt, recognize},
    multi::{many1, separated_list0},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

/// A parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    /// Entity reference: `#123`
    Ref(u64),
    /// String literal with `''` escapes resolved
    Str(String),
    /// Integer: `42`
    Int(i64),
    /// Real: `3.14`, `0.`, `1.5E-10`
    Real(f64),
    /// Enumeration: `.T.`, `.UNSPECIFIED.`
    Enum(String),
    /// Aggregate: `(1, 2, 3)`
    List(Vec<Param>),
    /// Typed value: `LENGTH_MEASURE(1.0)`
    Typed(String, Vec<Param>),
    /// Unset: `$`
    Unset,
    /// Derived: `*`
    Derived,
}

/// Right-hand side of an entity instance.
#[derive(Debug, Clone, PartialEq)]
pub enum InstanceBody {
    /// `TYPE(params)`
    Simple(String, Vec<Param>),
    /// `(TYPE_A(params) TYPE_B(params) ...)`
    Complex(Vec<(String, Vec<Param>)>),
}

/// One tokenized statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// Bare keyword: `ISO-10303-21`, `HEADER`, `DATA`, `ENDSEC`, ...
    Keyword(String),
    /// Header record: `FILE_NAME(...)`
    Record(String, Vec<Param>),
    /// Data section instance: `#id = ...`
    Instance(u64, InstanceBody),
}

/// A statement's text (comments removed, terminator dropped) and the
/// 1-based line it starts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawStatement {
    pub text: String,
    pub line: usize,
    pub offset: usize,
}

/// Splits exchange text into statements.
pub struct Statements<'a> {
    text: &'a str,
    position: usize,
    line: usize,
}

impl<'a> Statements<'a> {
    pub const fn new(text: &'a str) -> Self {
        Self {
            text,
            position: 0,
            line: 1,
        }
    }

    /// Bytes consumed so far.
    pub const fn position(&self) -> usize {
        self.position
    }
}

impl Iterator for Statements<'_> {
    /// `Err` carries an unterminated trailing statement.
    type Item = Result<RawStatement, RawStatement>;

    fn next(&mut self) -> Option<Self::Item> {
        let bytes = self.text.as_bytes();
        let mut out = String::new();
        let mut start_line = None;
        let mut start_offset = self.position;
        let mut in_string = false;
        let mut i = self.position;
        let mut copied_from = i;

        while i < bytes.len() {
            let b = bytes[i];
            if b == b'\n' {
                self.line += 1;
            }
            if in_string {
                if b == b'\'' {
                    if bytes.get(i + 1) == Some(&b'\'') {
                        i += 2;
                        continue;
                    }
                    in_string = false;
                }
                i += 1;
                continue;
            }
            match b {
                b'/' if bytes.get(i + 1) == Some(&b'*') => {
                    out.push_str(&self.text[copied_from..i]);
                    let end = self.text[i + 2..]
                        .find("*/")
                        .map_or(bytes.len(), |e| i + 2 + e + 2);
                    self.line += self.text[i..end].matches('\n').count();
                    out.push(' ');
                    i = end;
                    copied_from = i;
                    continue;
                }
                b';' => {
                    out.push_str(&self.text[copied_from..i]);
                    self.position = i + 1;
                    let text = out.trim().to_string();
                    if text.is_empty() {
                        // Stray terminator; keep scanning.
                        out.clear();
                        start_line = None;
                        start_offset = self.position;
                        i += 1;
                        copied_from = i;
                        continue;
                    }
                    return Some(Ok(RawStatement {
                        text,
                        line: start_line.unwrap_or(self.line),
                        offset: start_offset,
                    }));
                }
                b'\'' => in_string = true,
                _ => {}
            }
            if start_line.is_none() && !b.is_ascii_whitespace() {
                start_line = Some(self.line);
                start_offset = i;
            }
            i += 1;
        }

        out.push_str(&self.text[copied_from.min(bytes.len())..]);
        self.position = bytes.len();
        let text = out.trim().to_string();
        if text.is_empty() {
            None
        } else {
            Some(Err(RawStatement {
                text,
                line: start_line.unwrap_or(self.line),
                offset: start_offset,
            }))
        }
    }
}

/// Deepest parenthesis nesting accepted in one statement.
pub const MAX_NESTING: usize = 64;

/// Tokenize one statement.
///
/// # Errors
///
/// Returns a description of the first token that could not be read, or of
/// nesting deeper than [`MAX_NESTING`].
pub fn parse_statement(text: &str) -> Result<Statement, String> {
    if let Some(column) = excess_nesting(text, MAX_NESTING) {
        return Err(format!(
            "parameters nested deeper than {MAX_NESTING} levels at column {column}"
        ));
    }
    let result = all_consuming(delimited(
        ws,
        alt((
            map(instance, |(id, body)| Statement::Instance(id, body)),
            map(record, |(name, params)| Statement::Record(name, params)),
            map(section_keyword, |k| Statement::Keyword(k.to_ascii_uppercase())),
        )),
        ws,
    ))(text);
    match result {
        Ok((_, statement)) => Ok(statement),
        Err(e) => Err(describe(text, &e)),
    }
}

/// Entity id a statement starts with, if it is an instance.
pub fn leading_id(text: &str) -> Option<u64> {
    preceded(ws, entity_id)(text).ok().map(|(_, id)| id)
}

/// 1-based column of the first `(` outside a string that opens level
/// `limit + 1`. The parameter grammar recurses per level.
fn excess_nesting(text: &str, limit: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    for (column, c) in text.chars().enumerate() {
        match c {
            '\'' => in_string = !in_string,
            '(' if !in_string => {
                depth += 1;
                if depth > limit {
                    return Some(column + 1);
                }
            }
            ')' if !in_string => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    None
}

fn describe(text: &str, err: &nom::Err<nom::error::Error<&str>>) -> String {
    let rest = match err {
        nom::Err::Error(e) | nom::Err::Failure(e) => e.input,
        nom::Err::Incomplete(_) => "",
    };
    let consumed = text.len().saturating_sub(rest.len());
    let snippet: String = rest.chars().take(24).collect();
    format!("unexpected input at column {} near '{snippet}'", consumed + 1)
}

/// Skip whitespace
fn ws(input: &str) -> IResult<&str, ()> {
    map(take_while(char::is_whitespace), |_| ())(input)
}

fn keyword(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_')(input)
}

fn section_keyword(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == '-')(input)
}

fn entity_id(input: &str) -> IResult<&str, u64> {
    preceded(char('#'), map_res(digit1, str::parse::<u64>))(input)
}

fn instance(input: &str) -> IResult<&str, (u64, InstanceBody)> {
    pair(
        terminated(entity_id, tuple((ws, char('='), ws))),
        alt((
            map(record, |(name, params)| InstanceBody::Simple(name, params)),
            map(
                delimited(
                    char('('),
                    many1(delimited(ws, record, ws)),
                    char(')'),
                ),
                InstanceBody::Complex,
            ),
        )),
    )(input)
}

/// `NAME(params)`, name upper-cased.
fn record(input: &str) -> IResult<&str, (String, Vec<Param>)> {
    pair(
        map(keyword, str::to_ascii_uppercase),
        preceded(ws, arguments),
    )(input)
}

fn arguments(input: &str) -> IResult<&str, Vec<Param>> {
    delimited(
        char('('),
        separated_list0(char(','), param),
        preceded(ws, char(')')),
    )(input)
}

/// A parameter with optional surrounding whitespace.
pub(crate) fn param(input: &str) -> IResult<&str, Param> {
    delimited(
        ws,
        alt((
            real, // before integer: a real starts with digits too
            integer,
            map(entity_id, Param::Ref),
            string,
            enumeration,
            map(arguments, Param::List),
            map(record, |(name, params)| Param::Typed(name, params)),
            map(char('$'), |_| Param::Unset),
            map(char('*'), |_| Param::Derived),
        )),
        ws,
    )(input)
}

fn real(input: &str) -> IResult<&str, Param> {
    map_res(
        recognize(tuple((
            opt(one_of("+-")),
            digit1,
            char('.'),
            opt(digit1),
            opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
        ))),
        |s: &str| s.parse::<f64>().map(Param::Real),
    )(input)
}

fn integer(input: &str) -> IResult<&str, Param> {
    map_res(recognize(pair(opt(one_of("+-")), digit1)), |s: &str| {
        s.parse::<i64>().map(Param::Int)
    })(input)
}

fn enumeration(input: &str) -> IResult<&str, Param> {
    map(delimited(char('.'), keyword, char('.')), |s: &str| {
        Param::Enum(s.to_ascii_uppercase())
    })(input)
}

/// `'text'` with `''` standing for one quote.
fn string(input: &str) -> IResult<&str, Param> {
    fn content(input: &str) -> IResult<&str, &str> {
        let bytes = input.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'\'' {
                if bytes.get(i + 1) == Some(&b'\'') {
                    i += 2;
                    continue;
                }
                return Ok((&input[i..], &input[..i]));
            }
            i += 1;
        }
        Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Char,
        )))
    }

    map(delimited(tag("'"), content, tag("'")), |s: &str| {
        Param::Str(s.replace("''", "'"))
    })(input)
}
