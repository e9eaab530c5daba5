//! The `std.core` module, loaded automatically at engine start.

use super::{ModuleExports, Num, expect_arity, num_arg};
use crate::{
    error::{ExecResult, RuntimeError},
    pool::ValueId,
    types::{NativeCtx, NativeFn},
    value::ValueData,
};

pub(super) fn init(exports: &mut ModuleExports<'_>, _flags: u16) {
    let functions: [(&str, NativeFn); 5] = [
        ("strlen", strlen),
        ("abs", abs),
        ("max", max),
        ("min", min),
        ("typeOf", type_of),
    ];
    for (name, func) in functions {
        exports.functions.insert(exports.interner.intern(name), func);
    }
}

/// `strlen(s)` — byte length of a string.
fn strlen(ctx: &mut NativeCtx<'_>, args: &[ValueId]) -> ExecResult<ValueData> {
    expect_arity("strlen", args, 1)?;
    let resolved = ctx.pool.resolve(args[0]);
    match ctx.pool.get(resolved).data() {
        ValueData::Str(s) => {
            let len = ctx.interner.get_str(*s).len();
            Ok(ValueData::Int(len.try_into().expect("string length exceeds i64")))
        }
        other => Err(RuntimeError::BadArgument {
            name: "strlen".to_owned(),
            expected: "String",
            found: other.tag().name(),
        }),
    }
}

/// `abs(x)` — absolute value, preserving the numeric type.
fn abs(ctx: &mut NativeCtx<'_>, args: &[ValueId]) -> ExecResult<ValueData> {
    expect_arity("abs", args, 1)?;
    Ok(match num_arg(ctx, "abs", args, 0)? {
        Num::Int(i) => ValueData::Int(i.wrapping_abs()),
        Num::Double(d) => ValueData::Double(d.abs()),
    })
}

/// `max(a, b)` — larger of two numbers; mixed operands promote to double.
fn max(ctx: &mut NativeCtx<'_>, args: &[ValueId]) -> ExecResult<ValueData> {
    expect_arity("max", args, 2)?;
    let a = num_arg(ctx, "max", args, 0)?;
    let b = num_arg(ctx, "max", args, 1)?;
    Ok(pick(a, b, true))
}

/// `min(a, b)` — smaller of two numbers; mixed operands promote to double.
fn min(ctx: &mut NativeCtx<'_>, args: &[ValueId]) -> ExecResult<ValueData> {
    expect_arity("min", args, 2)?;
    let a = num_arg(ctx, "min", args, 0)?;
    let b = num_arg(ctx, "min", args, 1)?;
    Ok(pick(a, b, false))
}

fn pick(a: Num, b: Num, want_larger: bool) -> ValueData {
    match (a, b) {
        (Num::Int(x), Num::Int(y)) => ValueData::Int(if (x > y) == want_larger { x } else { y }),
        _ => {
            let (x, y) = (a.as_double(), b.as_double());
            ValueData::Double(if (x > y) == want_larger { x } else { y })
        }
    }
}

/// `typeOf(v)` — the value's type name as a string.
fn type_of(ctx: &mut NativeCtx<'_>, args: &[ValueId]) -> ExecResult<ValueData> {
    expect_arity("typeOf", args, 1)?;
    let resolved = ctx.pool.resolve(args[0]);
    let name = ctx.pool.get(resolved).data().tag().name();
    Ok(ValueData::Str(ctx.interner.intern(name)))
}
