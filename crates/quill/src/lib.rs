#![doc = include_str!("../../../README.md")]

mod ast;
mod codegen;
mod error;
mod intern;
mod io;
mod modules;
mod opcode;
mod parse;
mod pool;
mod scope;
mod tracer;
mod types;
mod value;
mod vm;

pub mod run;

pub use crate::{
    error::{CompileError, CompileResult, ExecResult, QuillError, RuntimeError},
    intern::{Interner, StrId},
    io::{CollectStringEcho, EchoWriter, StdEcho},
    opcode::{CodeUnit, Op, OpTag},
    pool::{ValueId, ValuePool},
    run::{Program, Runner},
    scope::{ScopeArena, ScopeId, Symbol},
    tracer::{CountingTracer, ExecTracer, NoopTracer, StderrTracer},
    types::{BuiltinTypes, NativeCtx, NativeFn, TypeCategory, TypeDescriptor, TypeId, TypeRegistry},
    value::{CallableData, TypeTag, ValueCell, ValueData, ValueKind, ValueStatus},
};
