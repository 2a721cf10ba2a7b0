//! The expression abstract syntax tree.

use std::sync::Arc;

use serde_json::Value;

/// A binary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Equal,
    NotEqual,
    LessThan,
    GreaterThan,
    LessEqual,
    GreaterEqual,
    And,
    Or,
}

/// A parsed expression node.
#[derive(Debug, Clone)]
pub enum Expr {
    /// A literal value (number, string, bool, null) known at parse time.
    Literal(Value),
    /// A variable reference (`input`, `shared`, `secrets`, `env`, or a
    /// locally bound name such as a lambda parameter).
    Variable(Arc<str>),
    /// `secrets.<name>` — resolved through [`crate::context::EvaluationContext::resolve_secret`]
    /// rather than plain property access, so unknown keys don't error.
    SecretAccess(Arc<str>),
    /// Unary minus.
    Negate(Box<Expr>),
    /// Logical not.
    Not(Box<Expr>),
    /// A binary operator application.
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    /// `object.property`.
    PropertyAccess { object: Box<Expr>, property: Arc<str> },
    /// `object[index]`.
    IndexAccess { object: Box<Expr>, index: Box<Expr> },
    /// A call to a named builtin function, or to a locally-bound lambda.
    Call { callee: Box<Expr>, args: Vec<Expr> },
    /// `cond ? then : else`.
    Conditional {
        condition: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
    /// `x => body`, a single-parameter arrow function. Evaluating this
    /// node directly is only valid as the callee of a [`Expr::Call`]
    /// (an IIFE) or as an argument passed to a higher-order builtin
    /// (`map`, `filter`, ...), which extract `param`/`body` directly.
    Lambda { param: Arc<str>, body: Box<Expr> },
    /// An array literal.
    Array(Vec<Expr>),
    /// An object literal.
    Object(Vec<(String, Expr)>),
    /// A sequence of statements evaluated for side effects, with the
    /// value of the final expression (or `null` if it ends in a bare
    /// `return`) as the block's result. Used for multi-statement script
    /// bodies passed to `evaluate`.
    Block(Vec<Stmt>),
}

/// A single statement inside a script body.
#[derive(Debug, Clone)]
pub enum Stmt {
    /// `return <expr>;` — stops evaluation of the enclosing block.
    Return(Option<Expr>),
    /// A bare expression evaluated for its side effects (`console.log(...)`).
    Expr(Expr),
    /// `let name = expr;` — binds a local for the rest of the block.
    Let(Arc<str>, Expr),
}
