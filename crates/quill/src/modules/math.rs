//! The `std.math` module.

use super::{ModuleExports, expect_arity, num_arg};
use crate::{
    error::ExecResult,
    pool::ValueId,
    types::{NativeCtx, NativeFn},
    value::{ValueCell, ValueData},
};

pub(super) fn init(exports: &mut ModuleExports<'_>, _flags: u16) {
    let functions: [(&str, NativeFn); 4] = [
        ("pow", pow),
        ("sqrt", sqrt),
        ("floor", floor),
        ("ceil", ceil),
    ];
    for (name, func) in functions {
        exports.functions.insert(exports.interner.intern(name), func);
    }
    let pi = exports
        .pool
        .alloc(ValueCell::constant(ValueData::Double(std::f64::consts::PI)));
    exports.consts.insert(exports.interner.intern("PI"), pi);
}

/// `pow(base, exp)` — always computed in double precision.
fn pow(ctx: &mut NativeCtx<'_>, args: &[ValueId]) -> ExecResult<ValueData> {
    expect_arity("pow", args, 2)?;
    let base = num_arg(ctx, "pow", args, 0)?.as_double();
    let exp = num_arg(ctx, "pow", args, 1)?.as_double();
    Ok(ValueData::Double(base.powf(exp)))
}

fn sqrt(ctx: &mut NativeCtx<'_>, args: &[ValueId]) -> ExecResult<ValueData> {
    expect_arity("sqrt", args, 1)?;
    let x = num_arg(ctx, "sqrt", args, 0)?.as_double();
    Ok(ValueData::Double(x.sqrt()))
}

fn floor(ctx: &mut NativeCtx<'_>, args: &[ValueId]) -> ExecResult<ValueData> {
    expect_arity("floor", args, 1)?;
    let x = num_arg(ctx, "floor", args, 0)?.as_double();
    Ok(ValueData::Double(x.floor()))
}

fn ceil(ctx: &mut NativeCtx<'_>, args: &[ValueId]) -> ExecResult<ValueData> {
    expect_arity("ceil", args, 1)?;
    let x = num_arg(ctx, "ceil", args, 0)?.as_double();
    Ok(ValueData::Double(x.ceil()))
}
