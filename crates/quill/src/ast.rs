//! Syntax tree consumed by the opcode generator.
//!
//! The parser produces these nodes; the generator walks them once. Names
//! and string literals are already interned by the time a node exists, so
//! the tree carries [`StrId`]s rather than owned strings.

use crate::intern::StrId;

/// Binary operator tags, shared by arithmetic, bitwise, and comparison
/// expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitOr,
    BitXor,
    BitAnd,
    Greater,
    Less,
    GreaterEq,
    LessEq,
    Eq,
    NotEq,
}

impl BinOp {
    /// Source-level spelling, used in error messages.
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::BitOr => "|",
            Self::BitXor => "^",
            Self::BitAnd => "&",
            Self::Greater => ">",
            Self::Less => "<",
            Self::GreaterEq => ">=",
            Self::LessEq => "<=",
            Self::Eq => "==",
            Self::NotEq => "!=",
        }
    }

    /// Whether the operation yields the same result with swapped operands.
    #[must_use]
    pub fn is_commutative(self) -> bool {
        matches!(
            self,
            Self::Add | Self::Mul | Self::BitOr | Self::BitXor | Self::BitAnd | Self::Eq | Self::NotEq
        )
    }
}

/// A (possibly templated) type reference such as `Int` or `Array<Int>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeExpr {
    pub name: StrId,
    pub args: Vec<TypeExpr>,
}

impl TypeExpr {
    #[must_use]
    pub fn plain(name: StrId) -> Self {
        Self { name, args: Vec::new() }
    }
}

/// An expression node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Int(i64),
    Double(f64),
    Str(StrId),
    Bool(bool),
    Ident(StrId),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// `target = value`; produced only in statement position.
    Assign { target: StrId, value: Box<Expr> },
    PreInc(Box<Expr>),
    PostInc(Box<Expr>),
    PreDec(Box<Expr>),
    PostDec(Box<Expr>),
    /// A free function call, resolved through the module registry.
    Call { name: StrId, args: Vec<Expr> },
    /// A method call, resolved through the receiver's type.
    MethodCall {
        recv: Box<Expr>,
        method: StrId,
        args: Vec<Expr>,
    },
}

/// One `if` / `else if` arm: predicate plus body.
#[derive(Debug, Clone, PartialEq)]
pub struct IfArm {
    pub cond: Expr,
    pub body: Vec<Stmt>,
}

/// A statement node.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `echo expr;`
    Echo(Expr),
    /// `Type name;` or `Type name = expr;`
    VarDecl {
        ty: TypeExpr,
        name: StrId,
        init: Option<Expr>,
    },
    /// An expression evaluated for its effect.
    Expr(Expr),
    /// A brace-delimited lexical block.
    Block(Vec<Stmt>),
    If {
        arms: Vec<IfArm>,
        otherwise: Option<Vec<Stmt>>,
    },
    While { cond: Expr, body: Vec<Stmt> },
    Break,
    /// `import package;` or `import package.module;`
    Import { package: StrId, module: Option<StrId> },
}
