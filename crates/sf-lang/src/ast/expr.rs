// ---------------------------------------------------------------------------
// Operators
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum BinOp {
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Expr {
    /// Number literal (integer, float, or scientific).
    Number(f64),
    /// String literal (single- or double-quoted).
    StringLit(String),
    /// Boolean literal.
    Bool(bool),
    /// Bare identifier, e.g. `grid_power` or the `state` token.
    Ident(String),
    /// Entity reference with a recognized domain, e.g. `sensor.kitchen_power`.
    /// Stored as the full dotted id.
    EntityRef(String),
    /// Attribute path: `base.attr1.attr2…`.
    ///
    /// `base` is either a full entity id (`sensor.power`) or a bare variable
    /// name; `path` is non-empty.
    AttrPath { base: String, path: Vec<String> },
    /// Unary numeric negation.
    Neg(Box<Expr>),
    /// Boolean `not`.
    Not(Box<Expr>),
    /// Binary operation.
    BinOp {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Python-style conditional: `then_expr if cond else else_expr`.
    Ternary {
        then_expr: Box<Expr>,
        cond: Box<Expr>,
        else_expr: Box<Expr>,
    },
    /// Function call: `name(args...)`.
    FuncCall { name: String, args: Vec<Expr> },
}

impl Expr {
    /// The textual reference of an expression usable as an entity argument
    /// (entity reference, variable name, or attribute base), if any.
    pub fn reference_text(&self) -> Option<&str> {
        match self {
            Expr::Ident(name) => Some(name),
            Expr::EntityRef(id) => Some(id),
            Expr::AttrPath { base, .. } => Some(base),
            _ => None,
        }
    }
}
