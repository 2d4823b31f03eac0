use winnow::ascii::multispace0;
use winnow::combinator::{alt, opt};
use winnow::error::{ContextError, ErrMode, StrContext, StrContextValue};
use winnow::prelude::*;
use winnow::token::{literal, take_while};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

pub fn ident<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    // First character must be alphabetic or underscore (not digit).
    if !input.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
        return Err(ErrMode::Backtrack(ContextError::new()));
    }
    take_while(1.., |c: char| c.is_ascii_alphanumeric() || c == '_').parse_next(input)
}

// ---------------------------------------------------------------------------
// Strings
// ---------------------------------------------------------------------------

/// Parse a string literal delimited by single or double quotes.
pub fn quoted_string(input: &mut &str) -> ModalResult<String> {
    let quote = alt((literal("\""), literal("'"))).parse_next(input)?;
    let delim = quote.chars().next().unwrap_or('"');
    let content = take_while(0.., move |c: char| c != delim).parse_next(input)?;
    winnow::combinator::cut_err(literal(quote))
        .context(StrContext::Expected(StrContextValue::Description(
            "closing quote",
        )))
        .parse_next(input)?;
    Ok(content.to_string())
}

// ---------------------------------------------------------------------------
// Whitespace & comments
// ---------------------------------------------------------------------------

/// Skip whitespace and `# ...` line comments.
pub fn ws_skip(input: &mut &str) -> ModalResult<()> {
    loop {
        let _ = multispace0.parse_next(input)?;
        if opt(literal("#")).parse_next(input)?.is_some() {
            let _ = take_while(0.., |c: char| c != '\n').parse_next(input)?;
        } else {
            break;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Keyword matching with word boundary
// ---------------------------------------------------------------------------

/// Match an exact keyword string, ensuring it's not a prefix of a longer
/// identifier (i.e. the next character is not alphanumeric or `_`).
pub fn kw<'a>(keyword: &'static str) -> impl FnMut(&mut &'a str) -> ModalResult<()> {
    move |input: &mut &'a str| {
        let saved = *input;
        literal(keyword).parse_next(input)?;
        if input.starts_with(|c: char| c.is_ascii_alphanumeric() || c == '_') {
            *input = saved;
            return Err(ErrMode::Backtrack(ContextError::new()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Number literal
// ---------------------------------------------------------------------------

/// Parse a number literal: integer, float, or scientific (`1e3`, `2.5E-2`).
pub fn number_literal(input: &mut &str) -> ModalResult<f64> {
    let integer_part = take_while(1.., |c: char| c.is_ascii_digit()).parse_next(input)?;
    let mut text = integer_part.to_string();

    // Fractional part. A bare trailing dot (`3.`) is not a float here: the
    // dot belongs to attribute access, so require digits after it.
    let saved = *input;
    if opt(literal(".")).parse_next(input)?.is_some() {
        match opt(take_while(1.., |c: char| c.is_ascii_digit())).parse_next(input)? {
            Some(frac) => {
                text.push('.');
                text.push_str(frac);
            }
            None => *input = saved,
        }
    }

    // Exponent part.
    let saved = *input;
    if opt(alt((literal("e"), literal("E")))).parse_next(input)?.is_some() {
        let sign = opt(alt((literal("+"), literal("-")))).parse_next(input)?;
        match opt(take_while(1.., |c: char| c.is_ascii_digit())).parse_next(input)? {
            Some(digits) => {
                text.push('e');
                if let Some(s) = sign {
                    text.push_str(s);
                }
                text.push_str(digits);
            }
            // `3em` — the `e` starts an identifier, not an exponent.
            None => *input = saved,
        }
    }

    text.parse::<f64>()
        .map_err(|_| ErrMode::Cut(ContextError::new()))
}
