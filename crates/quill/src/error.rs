//! Compile-time and run-time error types.
//!
//! Both error families are plain enums with `Display` implementations; the
//! offending name is embedded in the message where one exists. The CLI is
//! responsible for the `Compile error:` / `Runtime error:` prefixes and the
//! exit code.

use std::fmt::{self, Display};

/// Result alias for compilation steps.
pub type CompileResult<T> = Result<T, CompileError>;

/// Result alias for opcode handlers and native calls.
pub type ExecResult<T> = Result<T, RuntimeError>;

/// A fatal error detected while generating opcodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// The source text could not be parsed.
    Parse {
        line: usize,
        column: usize,
        message: String,
    },
    /// An identifier does not resolve to any tracked variable or constant.
    UnknownVariable(String),
    /// A declared type name is not registered.
    UnknownType(String),
    /// A called function is not published by any loaded module.
    UnknownFunction(String),
    /// A called method is missing from the receiver's method table.
    UnknownMethod { ty: String, method: String },
    /// An import names a package or module that is not registered.
    UnknownModule(String),
    /// Both operands are constants of different types.
    TypeMismatch,
    /// A templated type was given the wrong number of arguments.
    TemplateArity(String),
    /// Constant folding hit an integer division or modulus by zero.
    DivisionByZero,
    /// `break` appeared outside of any loop.
    BreakOutsideLoop,
    /// The target of an assignment is a constant binding.
    AssignToConstant(String),
    /// The target of `++`/`--` is not a variable.
    InvalidMutationTarget,
}

impl Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse { line, column, message } => {
                write!(f, "parse error at line {line}, column {column}: {message}")
            }
            Self::UnknownVariable(name) => write!(f, "variable '{name}' does not exist"),
            Self::UnknownType(name) => write!(f, "type '{name}' does not exist"),
            Self::UnknownFunction(name) => write!(f, "function '{name}' does not exist"),
            Self::UnknownMethod { ty, method } => {
                write!(f, "method '{method}' not found on type '{ty}'")
            }
            Self::UnknownModule(name) => write!(f, "module '{name}' does not exist"),
            Self::TypeMismatch => write!(f, "type mismatch between constant operands"),
            Self::TemplateArity(message) => f.write_str(message),
            Self::DivisionByZero => write!(f, "division by zero in constant expression"),
            Self::BreakOutsideLoop => write!(f, "'break' used outside of a loop"),
            Self::AssignToConstant(name) => write!(f, "cannot assign to constant '{name}'"),
            Self::InvalidMutationTarget => {
                write!(f, "increment/decrement target must be a variable")
            }
        }
    }
}

impl std::error::Error for CompileError {}

/// A fatal error raised while executing opcodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// Integer division or modulus by zero.
    DivisionByZero,
    /// The operand types do not support the attempted operation.
    UnsupportedOperands {
        op: &'static str,
        lhs: &'static str,
        rhs: &'static str,
    },
    /// A method was invoked on a receiver whose runtime type does not match
    /// the type captured when the call was emitted.
    WrongReceiver {
        method: String,
        expected: String,
        found: &'static str,
    },
    /// A call opcode's callable slot no longer holds a callable.
    NullCallable,
    /// A native function received the wrong number of arguments.
    Arity {
        name: String,
        expected: usize,
        found: usize,
    },
    /// A native function received an argument of an unsupported type.
    BadArgument {
        name: String,
        expected: &'static str,
        found: &'static str,
    },
    /// A container index was out of range.
    IndexOutOfBounds { index: i64, len: usize },
    /// `pop` was called on an empty container.
    PopFromEmpty,
}

impl Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DivisionByZero => write!(f, "division by zero"),
            Self::UnsupportedOperands { op, lhs, rhs } => {
                write!(f, "unsupported operand types for '{op}': {lhs} and {rhs}")
            }
            Self::WrongReceiver {
                method,
                expected,
                found,
            } => write!(
                f,
                "method '{method}' expects a receiver of type '{expected}', found {found}"
            ),
            Self::NullCallable => write!(f, "call target is not callable"),
            Self::Arity {
                name,
                expected,
                found,
            } => write!(f, "'{name}' takes {expected} argument(s), {found} given"),
            Self::BadArgument {
                name,
                expected,
                found,
            } => write!(f, "'{name}' expects {expected}, found {found}"),
            Self::IndexOutOfBounds { index, len } => {
                write!(f, "index {index} out of bounds for length {len}")
            }
            Self::PopFromEmpty => write!(f, "pop from an empty Array"),
        }
    }
}

impl std::error::Error for RuntimeError {}

/// Either kind of fatal error, as returned by the one-shot run entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuillError {
    Compile(CompileError),
    Runtime(RuntimeError),
}

impl Display for QuillError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compile(err) => write!(f, "Compile error: {err}"),
            Self::Runtime(err) => write!(f, "Runtime error: {err}"),
        }
    }
}

impl std::error::Error for QuillError {}

impl From<CompileError> for QuillError {
    fn from(err: CompileError) -> Self {
        Self::Compile(err)
    }
}

impl From<RuntimeError> for QuillError {
    fn from(err: RuntimeError) -> Self {
        Self::Runtime(err)
    }
}
