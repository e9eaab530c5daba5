//! The `std.io` module.

use super::ModuleExports;
use crate::{
    error::ExecResult,
    pool::ValueId,
    types::{NativeCtx, NativeFn},
    value::ValueData,
};

pub(super) fn init(exports: &mut ModuleExports<'_>, _flags: u16) {
    let functions: [(&str, NativeFn); 2] = [("print", print), ("println", println)];
    for (name, func) in functions {
        exports.functions.insert(exports.interner.intern(name), func);
    }
}

/// `print(args...)` — writes each argument without separators or newline.
fn print(ctx: &mut NativeCtx<'_>, args: &[ValueId]) -> ExecResult<ValueData> {
    for &arg in args {
        let rendered = ctx.pool.display(ctx.interner, arg);
        ctx.echo.write_str(&rendered);
    }
    Ok(ValueData::None)
}

/// `println(args...)` — like `print`, with a trailing newline.
fn println(ctx: &mut NativeCtx<'_>, args: &[ValueId]) -> ExecResult<ValueData> {
    for &arg in args {
        let rendered = ctx.pool.display(ctx.interner, arg);
        ctx.echo.write_str(&rendered);
    }
    ctx.echo.write_str("\n");
    Ok(ValueData::None)
}
