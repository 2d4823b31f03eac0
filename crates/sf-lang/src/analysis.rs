use indexmap::IndexSet;

use crate::ast::Expr;
use crate::plan::{CollectionFn, DynamicQuery, MetadataCall, QueryType};


// ---------------------------------------------------------------------------
// Built-in function tables
// ---------------------------------------------------------------------------

pub const MATH_FUNCTIONS: &[&str] = &[
    "abs", "min", "max", "round", "ceil", "floor", "sqrt", "pow", "sin", "cos", "tan", "log",
    "exp", "sum", "avg", "mean", "median", "std", "var", "count",
];

pub const STRING_FUNCTIONS: &[&str] = &[
    "contains",
    "startswith",
    "endswith",
    "length",
    "replace",
    "replace_all",
    "split",
    "join",
    "lower",
    "upper",
    "trim",
    "pad_left",
    "pad_right",
    "center",
    "isalpha",
    "isdigit",
    "isnumeric",
    "isalnum",
];

pub const DATETIME_FUNCTIONS: &[&str] = &[
    "now",
    "today",
    "yesterday",
    "tomorrow",
    "utc_now",
    "utc_today",
    "utc_yesterday",
    "date",
    "format_date",
    "format_friendly",
];

pub const DURATION_FUNCTIONS: &[&str] = &[
    "seconds",
    "minutes",
    "hours",
    "days",
    "weeks",
    "months",
    "seconds_between",
    "minutes_between",
    "hours_between",
    "days_between",
];

/// True when `name` is any built-in function (and therefore never a free
/// variable).
pub fn is_builtin_function(name: &str) -> bool {
    name == "metadata"
        || name == "select"
        || MATH_FUNCTIONS.contains(&name)
        || STRING_FUNCTIONS.contains(&name)
        || DATETIME_FUNCTIONS.contains(&name)
        || DURATION_FUNCTIONS.contains(&name)
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum AnalysisError {
    #[error("metadata() takes exactly two arguments, got {0}")]
    MetadataArity(usize),
    #[error("metadata() key must be a string literal")]
    NonLiteralMetadataKey,
    #[error("metadata() target must be an entity reference or variable")]
    InvalidMetadataTarget,
    #[error("invalid collection pattern {pattern:?}: {message}")]
    InvalidCollectionPattern { pattern: String, message: String },
}

/// Static facts about one formula, collected in a single AST traversal.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FormulaAnalysis {
    /// Free names in order of first appearance: bare identifiers, entity
    /// references, and attribute-path bases. Built-in function names are
    /// excluded.
    pub names: IndexSet<String>,
    pub metadata_calls: Vec<MetadataCall>,
    pub queries: Vec<DynamicQuery>,
    pub pure_numeric: bool,
}

impl FormulaAnalysis {
    pub fn has_metadata(&self) -> bool {
        !self.metadata_calls.is_empty()
    }

    pub fn has_collections(&self) -> bool {
        !self.queries.is_empty()
    }
}

/// Traverse `expr` and collect free names, metadata call sites, and
/// collection queries.
pub fn analyze(expr: &Expr) -> Result<FormulaAnalysis, AnalysisError> {
    let mut walk = Walk::default();
    walk.visit(expr)?;
    Ok(FormulaAnalysis {
        names: walk.names,
        metadata_calls: walk.metadata_calls,
        queries: walk.queries,
        pure_numeric: !walk.impure,
    })
}

#[derive(Default)]
struct Walk {
    names: IndexSet<String>,
    metadata_calls: Vec<MetadataCall>,
    queries: Vec<DynamicQuery>,
    /// Set when the formula touches strings, datetimes, durations,
    /// metadata, or collections.
    impure: bool,
}

impl Walk {
    fn visit(&mut self, expr: &Expr) -> Result<(), AnalysisError> {
        match expr {
            Expr::Number(_) | Expr::Bool(_) => {}
            Expr::StringLit(_) => self.impure = true,
            Expr::Ident(name) => {
                self.names.insert(name.clone());
            }
            Expr::EntityRef(id) => {
                self.names.insert(id.clone());
            }
            Expr::AttrPath { base, .. } => {
                self.names.insert(base.clone());
            }
            Expr::Neg(inner) | Expr::Not(inner) => self.visit(inner)?,
            Expr::BinOp { left, right, .. } => {
                self.visit(left)?;
                self.visit(right)?;
            }
            Expr::Ternary {
                then_expr,
                cond,
                else_expr,
            } => {
                self.visit(then_expr)?;
                self.visit(cond)?;
                self.visit(else_expr)?;
            }
            Expr::FuncCall { name, args } => self.visit_call(name, args)?,
        }
        Ok(())
    }

    fn visit_call(&mut self, name: &str, args: &[Expr]) -> Result<(), AnalysisError> {
        if name == "metadata" {
            return self.visit_metadata(args);
        }

        // A collection function whose first argument is a recognized
        // pattern literal becomes a dynamic query; the same name applied
        // to ordinary arguments stays a math function.
        if let Some(function) = CollectionFn::from_name(name)
            && let Some(Expr::StringLit(pattern)) = args.first()
            && let Some((query_type, payload)) = QueryType::split_pattern(pattern)
        {
            validate_pattern(query_type, payload, pattern)?;
            self.impure = true;
            self.queries.push(DynamicQuery {
                function,
                query_type,
                pattern: payload.to_string(),
            });
            return Ok(());
        }

        if STRING_FUNCTIONS.contains(&name)
            || DATETIME_FUNCTIONS.contains(&name)
            || DURATION_FUNCTIONS.contains(&name)
        {
            self.impure = true;
        }

        for arg in args {
            self.visit(arg)?;
        }
        Ok(())
    }

    fn visit_metadata(&mut self, args: &[Expr]) -> Result<(), AnalysisError> {
        self.impure = true;
        if args.len() != 2 {
            return Err(AnalysisError::MetadataArity(args.len()));
        }
        let entity_ref = args[0]
            .reference_text()
            .ok_or(AnalysisError::InvalidMetadataTarget)?
            .to_string();
        let key = match &args[1] {
            Expr::StringLit(key) => key.clone(),
            _ => return Err(AnalysisError::NonLiteralMetadataKey),
        };
        self.names.insert(entity_ref.clone());
        self.metadata_calls.push(MetadataCall { entity_ref, key });
        Ok(())
    }
}

/// Validate a pattern payload at analysis time. Only `regex:` patterns have
/// structure worth rejecting before they reach the collection resolver.
fn validate_pattern(
    query_type: QueryType,
    payload: &str,
    pattern: &str,
) -> Result<(), AnalysisError> {
    if query_type == QueryType::Regex
        && let Err(e) = regex_syntax::Parser::new().parse(payload)
    {
        return Err(AnalysisError::InvalidCollectionPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        });
    }
    Ok(())
}
