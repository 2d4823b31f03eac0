use winnow::combinator::{alt, cut_err, opt};
use winnow::prelude::*;
use winnow::token::literal;

use crate::ast::*;
use crate::parse_utils::{kw, ws_skip};

use super::primary;

// ---------------------------------------------------------------------------
// Public entry: full expression
// ---------------------------------------------------------------------------

/// `expr = or_expr ["if" or_expr "else" expr]`
///
/// The conditional is Python-shaped: value-if-true first, condition in the
/// middle, right-associative else branch.
pub(crate) fn parse_expr(input: &mut &str) -> ModalResult<Expr> {
    let then_expr = or_expr.parse_next(input)?;
    ws_skip.parse_next(input)?;
    if opt(kw("if")).parse_next(input)?.is_some() {
        ws_skip.parse_next(input)?;
        let cond = cut_err(or_expr).parse_next(input)?;
        ws_skip.parse_next(input)?;
        cut_err(kw("else")).parse_next(input)?;
        ws_skip.parse_next(input)?;
        let else_expr = cut_err(parse_expr).parse_next(input)?;
        return Ok(Expr::Ternary {
            then_expr: Box::new(then_expr),
            cond: Box::new(cond),
            else_expr: Box::new(else_expr),
        });
    }
    Ok(then_expr)
}

// ---------------------------------------------------------------------------
// Precedence levels (lowest to highest)
// ---------------------------------------------------------------------------

/// `or_expr = and_expr { "or" and_expr }`
fn or_expr(input: &mut &str) -> ModalResult<Expr> {
    let mut left = and_expr.parse_next(input)?;
    loop {
        ws_skip.parse_next(input)?;
        if opt(kw("or")).parse_next(input)?.is_some() {
            ws_skip.parse_next(input)?;
            let right = cut_err(and_expr).parse_next(input)?;
            left = Expr::BinOp {
                op: BinOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        } else {
            break;
        }
    }
    Ok(left)
}

/// `and_expr = not_expr { "and" not_expr }`
fn and_expr(input: &mut &str) -> ModalResult<Expr> {
    let mut left = not_expr.parse_next(input)?;
    loop {
        ws_skip.parse_next(input)?;
        if opt(kw("and")).parse_next(input)?.is_some() {
            ws_skip.parse_next(input)?;
            let right = cut_err(not_expr).parse_next(input)?;
            left = Expr::BinOp {
                op: BinOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        } else {
            break;
        }
    }
    Ok(left)
}

/// `not_expr = "not" not_expr | cmp_expr`
fn not_expr(input: &mut &str) -> ModalResult<Expr> {
    if opt(kw("not")).parse_next(input)?.is_some() {
        ws_skip.parse_next(input)?;
        let inner = cut_err(not_expr).parse_next(input)?;
        return Ok(Expr::Not(Box::new(inner)));
    }
    cmp_expr.parse_next(input)
}

/// `cmp_expr = add_expr [cmp_op add_expr]` — comparisons do not chain.
fn cmp_expr(input: &mut &str) -> ModalResult<Expr> {
    let left = add_expr.parse_next(input)?;
    ws_skip.parse_next(input)?;
    if let Some(op) = opt(cmp_op).parse_next(input)? {
        ws_skip.parse_next(input)?;
        let right = cut_err(add_expr).parse_next(input)?;
        return Ok(Expr::BinOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        });
    }
    Ok(left)
}

fn cmp_op(input: &mut &str) -> ModalResult<BinOp> {
    alt((
        literal("==").value(BinOp::Eq),
        literal("!=").value(BinOp::Ne),
        literal("<=").value(BinOp::Le),
        literal(">=").value(BinOp::Ge),
        literal("<").value(BinOp::Lt),
        literal(">").value(BinOp::Gt),
    ))
    .parse_next(input)
}

/// `add_expr = mul_expr { ("+" | "-") mul_expr }`
fn add_expr(input: &mut &str) -> ModalResult<Expr> {
    let mut left = mul_expr.parse_next(input)?;
    loop {
        ws_skip.parse_next(input)?;
        let op = opt(alt((
            literal("+").value(BinOp::Add),
            literal("-").value(BinOp::Sub),
        )))
        .parse_next(input)?;
        if let Some(op) = op {
            ws_skip.parse_next(input)?;
            let right = cut_err(mul_expr).parse_next(input)?;
            left = Expr::BinOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        } else {
            break;
        }
    }
    Ok(left)
}

/// `mul_expr = unary_expr { ("*" | "/" | "%") unary_expr }`
///
/// `*` must not swallow the first char of `**`.
fn mul_expr(input: &mut &str) -> ModalResult<Expr> {
    let mut left = unary_expr.parse_next(input)?;
    loop {
        ws_skip.parse_next(input)?;
        if input.starts_with("**") {
            break;
        }
        let op = opt(alt((
            literal("*").value(BinOp::Mul),
            literal("/").value(BinOp::Div),
            literal("%").value(BinOp::Mod),
        )))
        .parse_next(input)?;
        if let Some(op) = op {
            ws_skip.parse_next(input)?;
            let right = cut_err(unary_expr).parse_next(input)?;
            left = Expr::BinOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        } else {
            break;
        }
    }
    Ok(left)
}

/// `unary_expr = "-" unary_expr | power_expr`
///
/// Python binding: `-2 ** 2` is `-(2 ** 2)`, while `2 ** -3` is legal.
fn unary_expr(input: &mut &str) -> ModalResult<Expr> {
    if opt(literal("-")).parse_next(input)?.is_some() {
        ws_skip.parse_next(input)?;
        let inner = cut_err(unary_expr).parse_next(input)?;
        return Ok(Expr::Neg(Box::new(inner)));
    }
    power_expr.parse_next(input)
}

/// `power_expr = primary ["**" unary_expr]` — right-associative.
fn power_expr(input: &mut &str) -> ModalResult<Expr> {
    let base = primary.parse_next(input)?;
    let saved = *input;
    ws_skip.parse_next(input)?;
    if opt(literal("**")).parse_next(input)?.is_some() {
        ws_skip.parse_next(input)?;
        let exponent = cut_err(unary_expr).parse_next(input)?;
        return Ok(Expr::BinOp {
            op: BinOp::Pow,
            left: Box::new(base),
            right: Box::new(exponent),
        });
    }
    *input = saved;
    Ok(base)
}
