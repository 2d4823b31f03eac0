use std::collections::HashMap;

use orion_error::StructError;

use sf_lang::ast::{BinOp, Expr};
use sf_lang::plan::{CollectionFn, DynamicQuery, MetadataCall, QueryType};

use crate::context::HierarchicalContext;
use crate::error::{CoreReason, CoreResult};
use crate::resolve::{LazyResolver, ResolutionEnv, VariableResolver};
use crate::value::Value;

use super::functions::call_function;

// ---------------------------------------------------------------------------
// Evaluation environment
// ---------------------------------------------------------------------------

/// Metadata and collection results pre-evaluated before the AST walk,
/// keyed by call signature. The walker never touches the host for these.
#[derive(Debug, Default)]
pub struct PreparedCalls {
    pub metadata: HashMap<MetadataCall, Value>,
    pub collections: HashMap<DynamicQuery, Value>,
}

/// Everything one AST walk needs: the context, the strategy chain, the
/// cycle-scoped lazy resolver, and the pre-evaluated call results.
pub struct EvalEnv<'a, 'e> {
    pub ctx: &'a mut HierarchicalContext,
    pub resolver: &'a VariableResolver,
    pub renv: &'a ResolutionEnv<'e>,
    pub lazy: &'a mut LazyResolver,
    pub prepared: &'a PreparedCalls,
}

impl EvalEnv<'_, '_> {
    fn resolve_name(&mut self, name: &str) -> CoreResult<Value> {
        self.lazy
            .resolve_if_needed(name, &mut *self.ctx, self.resolver, self.renv)
    }
}

// ---------------------------------------------------------------------------
// Walker
// ---------------------------------------------------------------------------

/// Evaluate an expression tree against a fully prepared context.
///
/// Sentinels propagate: any operand that is `unavailable` / `unknown` /
/// `none` makes the whole expression that sentinel (boolean short-circuits
/// excepted), so a single unresolved dependency surfaces at the top for the
/// alternate-state handler.
pub fn eval_expr(expr: &Expr, ee: &mut EvalEnv) -> CoreResult<Value> {
    match expr {
        Expr::Number(n) => Ok(Value::Number(*n)),
        Expr::StringLit(s) => Ok(Value::Str(s.clone())),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Ident(name) => ee.resolve_name(name),
        Expr::EntityRef(id) => ee.resolve_name(id),
        Expr::AttrPath { base, path } => {
            let full = format!("{base}.{}", path.join("."));
            ee.resolve_name(&full)
        }
        Expr::Neg(inner) => {
            let v = eval_expr(inner, ee)?;
            if v.is_sentinel() {
                return Ok(v);
            }
            match v.as_f64() {
                Some(n) => Ok(Value::Number(-n)),
                None => type_error("-", &v),
            }
        }
        Expr::Not(inner) => {
            let v = eval_expr(inner, ee)?;
            if v.is_sentinel() {
                return Ok(v);
            }
            Ok(Value::Bool(!v.is_truthy()))
        }
        Expr::BinOp { op, left, right } => eval_binop(*op, left, right, ee),
        Expr::Ternary {
            then_expr,
            cond,
            else_expr,
        } => {
            let cond = eval_expr(cond, ee)?;
            if cond.is_sentinel() {
                return Ok(cond);
            }
            if cond.is_truthy() {
                eval_expr(then_expr, ee)
            } else {
                eval_expr(else_expr, ee)
            }
        }
        Expr::FuncCall { name, args } => eval_call(name, args, ee),
        _ => unreachable!("non_exhaustive enum; all known variants handled"),
    }
}

fn eval_binop(op: BinOp, left: &Expr, right: &Expr, ee: &mut EvalEnv) -> CoreResult<Value> {
    // Boolean operators get short-circuit-ish handling with sentinel
    // preservation on the undecidable side.
    if op == BinOp::And || op == BinOp::Or {
        return eval_logic(op, left, right, ee);
    }

    let lv = eval_expr(left, ee)?;
    if lv.is_sentinel() {
        return Ok(lv);
    }
    let rv = eval_expr(right, ee)?;
    if rv.is_sentinel() {
        return Ok(rv);
    }

    match op {
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod | BinOp::Pow => {
            eval_arith(op, &lv, &rv)
        }
        BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            eval_compare(op, &lv, &rv)
        }
        BinOp::And | BinOp::Or => unreachable!("handled above"),
        _ => unreachable!("non_exhaustive enum; all known variants handled"),
    }
}

fn eval_logic(op: BinOp, left: &Expr, right: &Expr, ee: &mut EvalEnv) -> CoreResult<Value> {
    let lv = eval_expr(left, ee)?;
    let rv = eval_expr(right, ee)?;
    let decide = |sentinel: Value, other: &Value, wins: bool| -> Value {
        // A decided side wins over a sentinel; otherwise the sentinel
        // stands.
        if !other.is_sentinel() && other.is_truthy() == wins {
            Value::Bool(wins)
        } else {
            sentinel
        }
    };
    match op {
        BinOp::And => {
            if lv.is_sentinel() {
                return Ok(decide(lv, &rv, false));
            }
            if rv.is_sentinel() {
                return Ok(decide(rv, &lv, false));
            }
            Ok(Value::Bool(lv.is_truthy() && rv.is_truthy()))
        }
        BinOp::Or => {
            if lv.is_sentinel() {
                return Ok(decide(lv, &rv, true));
            }
            if rv.is_sentinel() {
                return Ok(decide(rv, &lv, true));
            }
            Ok(Value::Bool(lv.is_truthy() || rv.is_truthy()))
        }
        _ => unreachable!(),
    }
}

fn eval_arith(op: BinOp, lv: &Value, rv: &Value) -> CoreResult<Value> {
    use Value::*;

    // Non-numeric arithmetic the surface language supports.
    match (op, lv, rv) {
        (BinOp::Add, Str(a), Str(b)) => return Ok(Str(format!("{a}{b}"))),
        (BinOp::Add, DateTime(dt), Duration(d)) | (BinOp::Add, Duration(d), DateTime(dt)) => {
            return Ok(DateTime(*dt + *d));
        }
        (BinOp::Add, Duration(a), Duration(b)) => return Ok(Duration(*a + *b)),
        (BinOp::Sub, DateTime(dt), Duration(d)) => return Ok(DateTime(*dt - *d)),
        (BinOp::Sub, DateTime(a), DateTime(b)) => return Ok(Duration(*a - *b)),
        (BinOp::Sub, Duration(a), Duration(b)) => return Ok(Duration(*a - *b)),
        (BinOp::Mul, Duration(d), Number(n)) | (BinOp::Mul, Number(n), Duration(d)) => {
            let millis = d.num_milliseconds() as f64 * n;
            return Ok(Duration(chrono::Duration::milliseconds(millis as i64)));
        }
        _ => {}
    }

    let (Some(l), Some(r)) = (lv.as_f64(), rv.as_f64()) else {
        return StructError::from(CoreReason::DataValidation(format!(
            "cannot apply {op:?} to {} and {}",
            lv.type_name(),
            rv.type_name()
        )))
        .err();
    };

    let out = match op {
        BinOp::Add => l + r,
        BinOp::Sub => l - r,
        BinOp::Mul => l * r,
        BinOp::Div => {
            if r == 0.0 {
                return Ok(Value::None);
            }
            l / r
        }
        BinOp::Mod => {
            if r == 0.0 {
                return Ok(Value::None);
            }
            l % r
        }
        BinOp::Pow => l.powf(r),
        _ => unreachable!(),
    };
    if out.is_finite() {
        Ok(Number(out))
    } else {
        Ok(Value::None)
    }
}

fn eval_compare(op: BinOp, lv: &Value, rv: &Value) -> CoreResult<Value> {
    use std::cmp::Ordering;

    let ord: Option<Ordering> = match (lv, rv) {
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
        (Value::Duration(a), Value::Duration(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => match (lv.as_f64(), rv.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => None,
        },
    };

    let Some(ord) = ord else {
        // Type-mismatched operands are equal to nothing.
        return match op {
            BinOp::Eq => Ok(Value::Bool(false)),
            BinOp::Ne => Ok(Value::Bool(true)),
            _ => StructError::from(CoreReason::DataValidation(format!(
                "cannot order {} against {}",
                lv.type_name(),
                rv.type_name()
            )))
            .err(),
        };
    };

    let result = match op {
        BinOp::Eq => ord == Ordering::Equal,
        BinOp::Ne => ord != Ordering::Equal,
        BinOp::Lt => ord == Ordering::Less,
        BinOp::Le => ord != Ordering::Greater,
        BinOp::Gt => ord == Ordering::Greater,
        BinOp::Ge => ord != Ordering::Less,
        _ => unreachable!(),
    };
    Ok(Value::Bool(result))
}

fn eval_call(name: &str, args: &[Expr], ee: &mut EvalEnv) -> CoreResult<Value> {
    // Metadata calls were pre-evaluated; look up by call signature.
    if name == "metadata" {
        let (Some(reference), Some(Expr::StringLit(key))) =
            (args.first().and_then(Expr::reference_text), args.get(1))
        else {
            return StructError::from(CoreReason::FormulaSyntax {
                position: 0,
                message: "malformed metadata() call".to_string(),
            })
            .err();
        };
        let call = MetadataCall {
            entity_ref: reference.to_string(),
            key: key.clone(),
        };
        return match ee.prepared.metadata.get(&call) {
            Some(value) => Ok(value.clone()),
            None => StructError::from(CoreReason::MissingDependency(format!(
                "metadata({reference}, {key:?}) was not pre-evaluated"
            )))
            .err(),
        };
    }

    // Collection queries likewise.
    if let Some(function) = CollectionFn::from_name(name)
        && let Some(Expr::StringLit(pattern)) = args.first()
        && let Some((query_type, payload)) = QueryType::split_pattern(pattern)
    {
        let query = DynamicQuery {
            function,
            query_type,
            pattern: payload.to_string(),
        };
        return match ee.prepared.collections.get(&query) {
            Some(value) => Ok(value.clone()),
            None => StructError::from(CoreReason::MissingDependency(format!(
                "collection {name}({pattern:?}) was not pre-evaluated"
            )))
            .err(),
        };
    }

    let mut values = Vec::with_capacity(args.len());
    for arg in args {
        let v = eval_expr(arg, ee)?;
        if v.is_sentinel() {
            return Ok(v);
        }
        values.push(v);
    }
    call_function(name, &values)
}

fn type_error(op: &str, v: &Value) -> CoreResult<Value> {
    StructError::from(CoreReason::DataValidation(format!(
        "cannot apply {op} to {}",
        v.type_name()
    )))
    .err()
}

// ---------------------------------------------------------------------------
// Numeric fast path
// ---------------------------------------------------------------------------

/// Reduced walker for pure-numeric formulas: numbers, names, arithmetic,
/// comparisons, boolean logic over numbers. Returns `None` when anything
/// outside that subset shows up, and the caller falls back to the full
/// walker. Results match the full walker bit-for-bit, including the
/// number/boolean distinction, so the numeric cache stays
/// correctness-neutral.
pub fn try_eval_numeric(
    expr: &Expr,
    resolve: &mut dyn FnMut(&str) -> Option<f64>,
) -> Option<Value> {
    numeric_inner(expr, resolve).map(|n| {
        if n.boolean {
            Value::Bool(n.value != 0.0)
        } else {
            Value::Number(n.value)
        }
    })
}

/// Numeric scalar with a flag tracking whether the full walker would have
/// produced a boolean here.
#[derive(Clone, Copy)]
struct NumVal {
    value: f64,
    boolean: bool,
}

impl NumVal {
    fn number(value: f64) -> Self {
        Self {
            value,
            boolean: false,
        }
    }

    fn boolean(b: bool) -> Self {
        Self {
            value: if b { 1.0 } else { 0.0 },
            boolean: true,
        }
    }
}

fn numeric_inner(expr: &Expr, resolve: &mut dyn FnMut(&str) -> Option<f64>) -> Option<NumVal> {
    match expr {
        Expr::Number(n) => Some(NumVal::number(*n)),
        Expr::Bool(b) => Some(NumVal::boolean(*b)),
        Expr::Ident(name) => resolve(name).map(NumVal::number),
        Expr::EntityRef(id) => resolve(id).map(NumVal::number),
        Expr::Neg(inner) => {
            let n = numeric_inner(inner, resolve)?;
            Some(NumVal::number(-n.value))
        }
        Expr::BinOp { op, left, right } => {
            let l = numeric_inner(left, resolve)?;
            let r = numeric_inner(right, resolve)?;
            let out = match op {
                BinOp::Add => NumVal::number(l.value + r.value),
                BinOp::Sub => NumVal::number(l.value - r.value),
                BinOp::Mul => NumVal::number(l.value * r.value),
                BinOp::Div => {
                    if r.value == 0.0 {
                        return None;
                    }
                    NumVal::number(l.value / r.value)
                }
                BinOp::Mod => {
                    if r.value == 0.0 {
                        return None;
                    }
                    NumVal::number(l.value % r.value)
                }
                BinOp::Pow => NumVal::number(l.value.powf(r.value)),
                BinOp::Eq => NumVal::boolean(l.value == r.value),
                BinOp::Ne => NumVal::boolean(l.value != r.value),
                BinOp::Lt => NumVal::boolean(l.value < r.value),
                BinOp::Le => NumVal::boolean(l.value <= r.value),
                BinOp::Gt => NumVal::boolean(l.value > r.value),
                BinOp::Ge => NumVal::boolean(l.value >= r.value),
                BinOp::And => NumVal::boolean(l.value != 0.0 && r.value != 0.0),
                BinOp::Or => NumVal::boolean(l.value != 0.0 || r.value != 0.0),
                _ => unreachable!("non_exhaustive enum; all known variants handled"),
            };
            out.value.is_finite().then_some(out)
        }
        Expr::Ternary {
            then_expr,
            cond,
            else_expr,
        } => {
            if numeric_inner(cond, resolve)?.value != 0.0 {
                numeric_inner(then_expr, resolve)
            } else {
                numeric_inner(else_expr, resolve)
            }
        }
        _ => None,
    }
}
