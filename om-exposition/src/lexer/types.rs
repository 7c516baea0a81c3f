use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_while},
    character::complete::{one_of, satisfy},
    combinator::{not, opt, peek, value},
    sequence::preceded,
    IResult,
};

/// Which lexical rule a token violated.  Carried through nom so the
/// caller can tell a bad escape from a bad number without string matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum TokenErrorKind {
    InvalidEscape,
    UnterminatedString,
    InvalidNumber,
    /// Structural mismatch (wrong tag, missing separator, trailing junk).
    Other,
}

#[derive(Debug, PartialEq)]
pub(super) struct TokenError<'a> {
    pub(super) input: &'a str,
    pub(super) kind: TokenErrorKind,
}

impl<'a> nom::error::ParseError<&'a str> for TokenError<'a> {
    fn from_error_kind(input: &'a str, _kind: nom::error::ErrorKind) -> Self {
        TokenError {
            input,
            kind: TokenErrorKind::Other,
        }
    }

    fn append(_input: &'a str, _kind: nom::error::ErrorKind, other: Self) -> Self {
        other
    }
}

pub(super) type TokenResult<'a, T> = IResult<&'a str, T, TokenError<'a>>;

/// Unrecoverable lexical failure; `alt` will not try another branch.
fn fail<'a, T>(input: &'a str, kind: TokenErrorKind) -> TokenResult<'a, T> {
    Err(nom::Err::Failure(TokenError { input, kind }))
}

/// abnf's SP token
pub(super) fn single_space(input: &str) -> TokenResult<'_, &str> {
    tag(" ")(input)
}

/// ```abnf
/// metricname = metricname-initial-char 0*metricname-char
///
/// metricname-char = metricname-initial-char / DIGIT
/// metricname-initial-char = ALPHA / "_" / ":"
/// ```
#[tracing::instrument]
pub(super) fn metric_name(input: &str) -> TokenResult<'_, &str> {
    peek(satisfy(|c: char| {
        c.is_ascii_alphabetic() || c == '_' || c == ':'
    }))(input)?;

    take_while(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == ':')(input)
}

/// ```abnf
/// label-name = label-name-initial-char *label-name-char
///
/// label-name-char = label-name-initial-char / DIGIT
/// label-name-initial-char = ALPHA / "_"
/// ```
pub(super) fn label_name(input: &str) -> TokenResult<'_, &str> {
    peek(satisfy(|c: char| c.is_ascii_alphabetic() || c == '_'))(input)?;

    take_while(|c: char| c.is_ascii_alphanumeric() || c == '_')(input)
}

/// ```abnf
/// escaped-string = DQUOTE *escaped-char DQUOTE
///
/// escaped-char = normal-char
/// escaped-char =/ BS ("n" / DQUOTE / BS)
/// ```
///
/// Returns the raw inner slice with escapes intact.  Escapes other than
/// `\n`, `\"`, `\\` and unescaped control characters are `InvalidEscape`;
/// a line ending before the closing quote is `UnterminatedString`.
pub(super) fn quoted_string(input: &str) -> TokenResult<'_, &str> {
    let (body, _) = tag("\"")(input)?;

    let mut chars = body.char_indices();
    loop {
        match chars.next() {
            None => return fail(input, TokenErrorKind::UnterminatedString),
            Some((at, '"')) => return Ok((&body[at + 1..], &body[..at])),
            Some((_, '\\')) => match chars.next() {
                Some((_, 'n')) | Some((_, '"')) | Some((_, '\\')) => {}
                _ => return fail(input, TokenErrorKind::InvalidEscape),
            },
            Some((_, c)) if c.is_control() => return fail(input, TokenErrorKind::InvalidEscape),
            Some(_) => {}
        }
    }
}

/// Unquoted escaped text running to the end of the line (HELP values).
/// Escape sequences are validated as in [`quoted_string`]; anything else,
/// control characters included, passes through untouched.
pub(super) fn escaped_text(input: &str) -> TokenResult<'_, &str> {
    let mut chars = input.char_indices();
    loop {
        match chars.next() {
            None => return Ok(("", input)),
            Some((_, '\\')) => match chars.next() {
                Some((_, 'n')) | Some((_, '"')) | Some((_, '\\')) => {}
                _ => return fail(input, TokenErrorKind::InvalidEscape),
            },
            Some(_) => {}
        }
    }
}

/// A number fit for a timestamp: integer, decimal, or exponent notation,
/// but never NaN or an infinity.
pub(super) fn realnumber(input: &str) -> TokenResult<'_, f64> {
    not(alt((
        tag_no_case("NaN"),
        preceded(
            opt(one_of("+-")),
            alt((tag_no_case("Infinity"), tag_no_case("Inf"))),
        ),
    )))(input)?;

    nom::number::complete::double(input)
}

/// ```abnf
/// realnumber / "NaN" / [ "+" / "-" ] ("Inf" / "Infinity")
/// ```
///
/// Literal spellings are matched case-insensitively.
pub(super) fn floatlike(input: &str) -> TokenResult<'_, f64> {
    alt((
        value(f64::NAN, tag_no_case("NaN")),
        value(
            f64::NEG_INFINITY,
            preceded(tag("-"), alt((tag_no_case("Infinity"), tag_no_case("Inf")))),
        ),
        value(
            f64::INFINITY,
            preceded(
                opt(tag("+")),
                alt((tag_no_case("Infinity"), tag_no_case("Inf"))),
            ),
        ),
        nom::number::complete::double,
    ))(input)
}

/// [`floatlike`] that refuses to stop mid-token: the character after the
/// number must be a space or the end of the line, otherwise the whole
/// token is an invalid numeric literal.
pub(super) fn number_token(input: &str) -> TokenResult<'_, f64> {
    let (rest, parsed) = match floatlike(input) {
        Ok(done) => done,
        Err(_) => return fail(input, TokenErrorKind::InvalidNumber),
    };

    match rest.chars().next() {
        None | Some(' ') => Ok((rest, parsed)),
        Some(_) => fail(input, TokenErrorKind::InvalidNumber),
    }
}

/// [`realnumber`] with the same boundary rule as [`number_token`].  Failing
/// to start a number is recoverable (the spot may hold an exemplar
/// instead); stopping mid-token is not.
pub(super) fn timestamp_token(input: &str) -> TokenResult<'_, f64> {
    let (rest, parsed) = realnumber(input)?;

    match rest.chars().next() {
        None | Some(' ') => Ok((rest, parsed)),
        Some(_) => fail(input, TokenErrorKind::InvalidNumber),
    }
}
