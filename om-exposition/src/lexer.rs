use std::str::FromStr;

use nom::{
    bytes::complete::{tag, take_while1},
    combinator::{cut, eof, map, opt},
    multi::separated_list0,
    sequence::{preceded, terminated, tuple},
};
use tracing::trace;

mod types;
use types::*;

use crate::parser::MetricType;
use crate::{LexicalErrorKind, ParseError};

/// One classified logical line of an exposition document.
#[derive(Clone, Debug, PartialEq)]
pub enum Line<'a> {
    Metadata(Metadata<'a>),
    Sample(RawSample<'a>),
    Comment,
    Blank,
    Eof,
}

/// A `# TYPE`, `# HELP`, or `# UNIT` line.  The help text is raw: escape
/// sequences are validated here but rewritten during assembly.
#[derive(Clone, Debug, PartialEq)]
pub enum Metadata<'a> {
    Type {
        name: &'a str,
        family_type: MetricType,
    },
    Help {
        name: &'a str,
        text: &'a str,
    },
    Unit {
        name: &'a str,
        unit: Option<&'a str>,
    },
}

/// A sample line as lexed.  Label values still carry their escapes.
#[derive(Clone, Debug, PartialEq)]
pub struct RawSample<'a> {
    pub name: &'a str,
    pub labels: Vec<RawLabel<'a>>,
    pub value: f64,
    pub timestamp: Option<f64>,
    pub exemplar: Option<RawExemplar<'a>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RawLabel<'a> {
    pub name: &'a str,
    pub value: &'a str,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RawExemplar<'a> {
    pub labels: Vec<RawLabel<'a>>,
    pub value: f64,
    pub timestamp: Option<f64>,
}

impl<'a> RawLabel<'a> {
    /// ```abnf
    /// label = label-name EQ DQUOTE escaped-string DQUOTE
    /// ```
    fn nom(input: &'a str) -> TokenResult<'a, Self> {
        map(
            tuple((label_name, cut(preceded(tag("="), quoted_string)))),
            |(name, value)| Self { name, value },
        )(input)
    }
}

/// ```abnf
/// labels = OPEN-BRACE [ label *(COMMA label) ] CLOSE-BRACE
/// ```
fn label_block(input: &str) -> TokenResult<'_, Vec<RawLabel<'_>>> {
    preceded(
        tag("{"),
        cut(terminated(separated_list0(tag(","), RawLabel::nom), tag("}"))),
    )(input)
}

impl<'a> RawExemplar<'a> {
    /// ```abnf
    /// exemplar = SP HASH SP labels SP number [SP timestamp]
    /// ```
    fn nom(input: &'a str) -> TokenResult<'a, Self> {
        map(
            preceded(
                tag(" # "),
                cut(tuple((
                    label_block,
                    single_space,
                    number_token,
                    opt(preceded(single_space, timestamp_token)),
                ))),
            ),
            |(labels, _, value, timestamp)| Self {
                labels,
                value,
                timestamp,
            },
        )(input)
    }
}

impl<'a> RawSample<'a> {
    /// ```abnf
    /// sample = metricname [labels] SP number [SP timestamp] [exemplar]
    /// ```
    fn nom(input: &'a str) -> TokenResult<'a, Self> {
        let (input, name) = metric_name(input)?;
        let (input, labels) = opt(label_block)(input)?;
        let (input, _) = single_space(input)?;
        let (input, value) = number_token(input)?;
        let (input, timestamp) = opt(preceded(single_space, timestamp_token))(input)?;
        let (input, exemplar) = opt(RawExemplar::nom)(input)?;
        let (input, _) = eof(input)?;

        Ok((
            input,
            Self {
                name,
                labels: labels.unwrap_or_default(),
                value,
                timestamp,
                exemplar,
            },
        ))
    }
}

impl<'a> Metadata<'a> {
    /// ```abnf
    /// metric-descriptor = HASH SP type SP metricname SP metric-type LF
    /// ```
    fn nom_type_body(input: &'a str) -> TokenResult<'a, Self> {
        let (input, name) = metric_name(input)?;
        let (input, _) = single_space(input)?;
        let (input, word) = metric_name(input)?;
        let (input, _) = eof(input)?;

        match MetricType::from_str(word) {
            Ok(family_type) => Ok((input, Metadata::Type { name, family_type })),
            Err(_) => Err(nom::Err::Failure(TokenError {
                input: word,
                kind: TokenErrorKind::Other,
            })),
        }
    }

    /// ```abnf
    /// metric-descriptor =/ HASH SP help SP metricname [SP escaped-string] LF
    /// ```
    fn nom_help_body(input: &'a str) -> TokenResult<'a, Self> {
        map(
            terminated(
                tuple((metric_name, opt(preceded(single_space, escaped_text)))),
                eof,
            ),
            |(name, text)| Metadata::Help {
                name,
                text: text.unwrap_or(""),
            },
        )(input)
    }

    /// ```abnf
    /// metric-descriptor =/ HASH SP unit SP metricname [SP 1*metricname-char] LF
    /// ```
    fn nom_unit_body(input: &'a str) -> TokenResult<'a, Self> {
        map(
            terminated(
                tuple((
                    metric_name,
                    opt(preceded(
                        single_space,
                        take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == ':'),
                    )),
                )),
                eof,
            ),
            |(name, unit)| Metadata::Unit { name, unit },
        )(input)
    }
}

/// Classifies one logical line.  `lineno` is 1-indexed and lands in every
/// error this returns.
///
/// Reserved words after `# ` commit: a garbled `# TYPE` line is malformed,
/// not a comment.  Every other `#`-initial line is a comment.
#[tracing::instrument]
pub fn classify_line<'a>(line: &'a str, lineno: usize) -> Result<Line<'a>, ParseError> {
    if line.trim().is_empty() {
        return Ok(Line::Blank);
    }

    if let Some(rest) = line.strip_prefix("# ") {
        let (word, body) = match rest.split_once(' ') {
            Some((word, body)) => (word, Some(body)),
            None => (rest, None),
        };

        let parsed = match (word, body) {
            ("EOF", None) => return Ok(Line::Eof),
            ("EOF", Some(_)) => {
                return Err(ParseError::MalformedLine {
                    line: lineno,
                    reason: "the `# EOF` marker takes no arguments".into(),
                })
            }
            ("TYPE", Some(body)) => Metadata::nom_type_body(body),
            ("HELP", Some(body)) => Metadata::nom_help_body(body),
            ("UNIT", Some(body)) => Metadata::nom_unit_body(body),
            ("TYPE", None) | ("HELP", None) | ("UNIT", None) => {
                return Err(ParseError::MalformedLine {
                    line: lineno,
                    reason: format!("`# {}` names no metric", word),
                })
            }
            _ => {
                trace!(lineno, "comment");
                return Ok(Line::Comment);
            }
        };

        return match parsed {
            Ok((_, metadata)) => Ok(Line::Metadata(metadata)),
            Err(err) => Err(line_error(
                flatten(err),
                lineno,
                &format!("malformed `# {}` line", word),
            )),
        };
    }

    if line.starts_with('#') {
        trace!(lineno, "comment");
        return Ok(Line::Comment);
    }

    match RawSample::nom(line) {
        Ok((_, sample)) => Ok(Line::Sample(sample)),
        Err(err) => Err(line_error(flatten(err), lineno, "unrecognized line")),
    }
}

fn flatten(err: nom::Err<TokenError<'_>>) -> TokenError<'_> {
    match err {
        nom::Err::Error(inner) | nom::Err::Failure(inner) => inner,
        nom::Err::Incomplete(_) => TokenError {
            input: "",
            kind: TokenErrorKind::Other,
        },
    }
}

fn line_error(err: TokenError<'_>, lineno: usize, what: &str) -> ParseError {
    match err.kind {
        TokenErrorKind::InvalidEscape => ParseError::LexicalError {
            line: lineno,
            kind: LexicalErrorKind::InvalidEscape,
        },
        TokenErrorKind::UnterminatedString => ParseError::LexicalError {
            line: lineno,
            kind: LexicalErrorKind::UnterminatedString,
        },
        TokenErrorKind::InvalidNumber => ParseError::LexicalError {
            line: lineno,
            kind: LexicalErrorKind::InvalidNumber,
        },
        TokenErrorKind::Other => ParseError::MalformedLine {
            line: lineno,
            reason: if err.input.is_empty() {
                format!("{}: line ends early", what)
            } else {
                format!("{} near `{}`", what, err.input)
            },
        },
    }
}
