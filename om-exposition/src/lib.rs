//! `om-exposition` is a strict parser for the OpenMetrics text exposition
//! format.
//!
//! ```
//! let set = om_exposition::parse("# TYPE requests counter\nrequests_total 17\n# EOF\n")?;
//! let family = set.family("requests").unwrap();
//! assert_eq!(family.samples[0].value, 17.0);
//! # Ok::<(), om_exposition::ParseError>(())
//! ```

use std::fmt;

use tracing::debug;

/// Tokenizes and classifies the lines of an exposition document.
pub mod lexer;

/// Assembles classified lines into metric families and validates them.
pub mod parser;

/// Re-renders parsed families as exposition text.
mod render;


pub use parser::{
    Exemplar, MetricFamily, MetricSet, MetricType, ParseOptions, Parser, Sample, SampleKind,
};

/// Indicates that an exposition document broke one of the format's rules.
/// Every variant carries the 1-indexed number of the offending line.
#[derive(thiserror::Error, Clone, Debug, PartialEq)]
pub enum ParseError {
    #[error("line {line}: {kind}")]
    LexicalError { line: usize, kind: LexicalErrorKind },

    #[error("line {line}: {reason}")]
    MalformedLine { line: usize, reason: String },

    #[error("line {line}: `# TYPE` for family `{family}` repeated or after its samples")]
    DuplicateTypeDeclaration { line: usize, family: String },

    #[error("line {line}: `# {what}` for family `{family}` repeated or after its samples")]
    DuplicateMetadata {
        line: usize,
        family: String,
        what: &'static str,
    },

    #[error("line {line}: unit `{unit}` does not match the suffix of `{family}`")]
    UnitSuffixMismatch {
        line: usize,
        family: String,
        unit: String,
    },

    #[error("line {line}: family `{family}` is missing {missing}")]
    IncompleteFamily {
        line: usize,
        family: String,
        missing: String,
    },

    #[error("line {line}: `{label}` out of order in family `{family}` ({value} after {previous})")]
    NonMonotonicBuckets {
        line: usize,
        family: String,
        label: &'static str,
        previous: f64,
        value: f64,
    },

    #[error("line {line}: document ended without a `# EOF` marker")]
    MissingEofMarker { line: usize },

    #[error("line {line}: content after the `# EOF` marker")]
    TrailingDataAfterEof { line: usize },

    #[error("line {line}: duplicate sample `{name}` (name and label set seen before)")]
    DuplicateSample { line: usize, name: String },
}

/// Which lexical rule a token violated.
#[derive(thiserror::Error, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LexicalErrorKind {
    #[error("invalid escape sequence or bare control character")]
    InvalidEscape,

    #[error("unterminated string literal")]
    UnterminatedString,

    #[error("invalid numeric literal")]
    InvalidNumber,
}

/// A rule violation tolerated under permissive configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct Warning {
    pub line: usize,
    pub message: String,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Supplies logical lines, newline-free, in document order.
///
/// Buffer mode and incremental mode run the same state machine:
/// [`TextSource`] adapts a fully materialized document, while an
/// incremental reader either implements this trait or pushes lines
/// straight into [`parser::Parser::feed_line`].
pub trait LineSource {
    /// Returns the next logical line without its terminator, or `None` at
    /// end of input.
    fn next_line(&mut self) -> Option<&str>;
}

/// [`LineSource`] over a pre-loaded document.
pub struct TextSource<'a> {
    lines: std::str::Lines<'a>,
}

impl<'a> TextSource<'a> {
    pub fn new(data: &'a str) -> Self {
        Self {
            lines: data.lines(),
        }
    }
}

impl<'a> LineSource for TextSource<'a> {
    fn next_line(&mut self) -> Option<&str> {
        self.lines.next()
    }
}

/// Parses a complete exposition document under strict rules.
///
/// The result is atomic: either every line passed validation, or the first
/// violation is returned and nothing else is.
#[tracing::instrument(skip(data))]
pub fn parse(data: &str) -> Result<MetricSet, ParseError> {
    let (set, _) = parse_with(data, &ParseOptions::default())?;
    Ok(set)
}

/// Parses a complete exposition document.  Violations the given options
/// tolerate are collected as [`Warning`]s alongside the result.
#[tracing::instrument(skip(data))]
pub fn parse_with(
    data: &str,
    options: &ParseOptions,
) -> Result<(MetricSet, Vec<Warning>), ParseError> {
    debug!(bytes = data.len(), "parsing exposition document");
    parse_source(&mut TextSource::new(data), options)
}

/// Drives a full parse from an abstract line supplier.
pub fn parse_source<S: LineSource>(
    source: &mut S,
    options: &ParseOptions,
) -> Result<(MetricSet, Vec<Warning>), ParseError> {
    let mut parser = Parser::with_options(*options);
    while let Some(line) = source.next_line() {
        parser.feed_line(line)?;
    }
    parser.finish()
}
