use winnow::combinator::{alt, cut_err, eof, opt, separated};
use winnow::error::{StrContext, StrContextValue};
use winnow::prelude::*;
use winnow::token::literal;

mod expr;

use crate::ast::*;
use crate::parse_utils::{ident, kw, number_literal, quoted_string, ws_skip};

pub(crate) use expr::parse_expr;

#[cfg(test)]
mod tests;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Parse failure with the byte offset where the input stopped making sense.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("formula syntax error at offset {offset}: {message}")]
pub struct FormulaParseError {
    pub offset: usize,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Public entry point
// ---------------------------------------------------------------------------

/// Parse a complete formula expression.
///
/// The whole input must be consumed; trailing garbage is a syntax error.
pub fn parse_formula(input: &str) -> Result<Expr, FormulaParseError> {
    formula.parse(input).map_err(|e| FormulaParseError {
        offset: e.offset(),
        message: e.inner().to_string(),
    })
}

fn formula(input: &mut &str) -> ModalResult<Expr> {
    ws_skip.parse_next(input)?;
    let e = parse_expr.parse_next(input)?;
    ws_skip.parse_next(input)?;
    eof.context(StrContext::Expected(StrContextValue::Description(
        "end of formula",
    )))
    .parse_next(input)?;
    Ok(e)
}

// ---------------------------------------------------------------------------
// Primary
// ---------------------------------------------------------------------------

pub(crate) fn primary(input: &mut &str) -> ModalResult<Expr> {
    alt((
        // Number literal
        number_literal.map(Expr::Number),
        // String literal (single or double quoted)
        quoted_string.map(Expr::StringLit),
        // Boolean literals; the original configs carry both spellings
        kw("true").map(|_| Expr::Bool(true)),
        kw("false").map(|_| Expr::Bool(false)),
        kw("True").map(|_| Expr::Bool(true)),
        kw("False").map(|_| Expr::Bool(false)),
        // Parenthesized expression
        paren_expr,
        // Ident-based: variable, entity reference, attribute path, or call
        ident_primary,
    ))
    .context(StrContext::Expected(StrContextValue::Description(
        "expression",
    )))
    .parse_next(input)
}

fn paren_expr(input: &mut &str) -> ModalResult<Expr> {
    literal("(").parse_next(input)?;
    ws_skip.parse_next(input)?;
    let inner = cut_err(parse_expr).parse_next(input)?;
    ws_skip.parse_next(input)?;
    cut_err(literal(")")).parse_next(input)?;
    Ok(inner)
}

/// Parse an ident-based primary.
///
/// Dots must be tight (`sensor.power`, not `sensor . power`) — dotted names
/// denote entity ids and attribute paths, never an operator.
fn ident_primary(input: &mut &str) -> ModalResult<Expr> {
    let first = ident.parse_next(input)?;
    let mut segments: Vec<String> = vec![first.to_string()];

    loop {
        let saved = *input;
        if opt(literal(".")).parse_next(input)?.is_some() {
            match opt(ident).parse_next(input)? {
                Some(seg) => segments.push(seg.to_string()),
                None => {
                    // Trailing dot belongs to something else; give it back.
                    *input = saved;
                    break;
                }
            }
        } else {
            break;
        }
    }

    // Call syntax applies to simple names only: `name(args...)`.
    if segments.len() == 1 {
        let saved = *input;
        ws_skip.parse_next(input)?;
        if opt(literal("(")).parse_next(input)?.is_some() {
            return func_call_args(segments.remove(0), input);
        }
        *input = saved;
        return Ok(Expr::Ident(segments.remove(0)));
    }

    // `domain.object` with a recognized domain is an entity reference;
    // further segments navigate into its attributes. Any other dotted name
    // is an attribute path rooted at a variable.
    if is_host_domain(&segments[0]) {
        let base = format!("{}.{}", segments[0], segments[1]);
        if segments.len() == 2 {
            return Ok(Expr::EntityRef(base));
        }
        return Ok(Expr::AttrPath {
            base,
            path: segments.split_off(2),
        });
    }

    let base = segments.remove(0);
    Ok(Expr::AttrPath {
        base,
        path: segments,
    })
}

fn func_call_args(name: String, input: &mut &str) -> ModalResult<Expr> {
    ws_skip.parse_next(input)?;

    if opt(literal(")")).parse_next(input)?.is_some() {
        return Ok(Expr::FuncCall { name, args: vec![] });
    }

    let args: Vec<Expr> = separated(
        1..,
        (ws_skip, parse_expr, ws_skip).map(|(_, e, _)| e),
        literal(","),
    )
    .parse_next(input)?;
    cut_err(literal(")"))
        .context(StrContext::Expected(StrContextValue::Description(
            "closing parenthesis",
        )))
        .parse_next(input)?;

    Ok(Expr::FuncCall { name, args })
}
