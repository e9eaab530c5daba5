//! The virtual machine: linear execution of an opcode stream.
//!
//! State is a program counter plus the shared value pool; there is no
//! separate operand stack. Each opcode reads its `op1`/`op2` slots,
//! computes, and writes its `result` slot. Dispatch is a dense match on
//! the opcode tag. The PC advances by one unless a jump handler supplies a
//! new address.

use crate::{
    error::{ExecResult, RuntimeError},
    intern::Interner,
    io::EchoWriter,
    opcode::{CodeUnit, Op, OpTag},
    pool::{ValueId, ValuePool},
    tracer::ExecTracer,
    types::{NativeCtx, TypeRegistry},
    value::{ValueCell, ValueData, ValueKind, ValueStatus},
};

/// Lightweight snapshot of a resolved operand, for arithmetic and
/// comparison handlers.
#[derive(Debug, Clone, Copy)]
enum Scalar {
    Int(i64),
    Double(f64),
    Bool(bool),
    Str(crate::intern::StrId),
    None,
    Other(&'static str),
}

impl Scalar {
    fn type_name(self) -> &'static str {
        match self {
            Self::Int(_) => "Int",
            Self::Double(_) => "Double",
            Self::Bool(_) => "Bool",
            Self::Str(_) => "String",
            Self::None => "none",
            Self::Other(name) => name,
        }
    }
}

/// Executes one opcode stream to completion.
pub struct Machine<'a, W: EchoWriter, T: ExecTracer> {
    pool: &'a mut ValuePool,
    interner: &'a mut Interner,
    types: &'a TypeRegistry,
    echo: &'a mut W,
    tracer: T,
}

impl<'a, W: EchoWriter, T: ExecTracer> Machine<'a, W, T> {
    pub fn new(
        pool: &'a mut ValuePool,
        interner: &'a mut Interner,
        types: &'a TypeRegistry,
        echo: &'a mut W,
        tracer: T,
    ) -> Self {
        Self {
            pool,
            interner,
            types,
            echo,
            tracer,
        }
    }

    /// Hands the tracer back after a run, for inspection.
    pub fn into_tracer(self) -> T {
        self.tracer
    }

    /// Runs the stream from index 0 until the PC leaves the stream.
    /// Returns the final PC.
    pub fn run(&mut self, code: &CodeUnit) -> ExecResult<usize> {
        let mut pc = 0usize;
        while pc < code.len() {
            let op = code.ops()[pc];
            self.tracer.on_instruction(pc, op.tag);
            match self.dispatch(op)? {
                Some(next) => {
                    self.tracer.on_jump(pc, next);
                    pc = next;
                }
                None => pc += 1,
            }
        }
        Ok(pc)
    }

    /// Executes one opcode; returns the new PC for jumps.
    fn dispatch(&mut self, op: Op) -> ExecResult<Option<usize>> {
        match op.tag {
            OpTag::Echo => {
                let operand = op.op1.expect("Echo without operand");
                let line = self.pool.display(self.interner, operand);
                self.echo.write_line(&line);
                Ok(None)
            }
            OpTag::Plus
            | OpTag::Minus
            | OpTag::Mult
            | OpTag::Div
            | OpTag::Mod
            | OpTag::BwOr
            | OpTag::BwXor
            | OpTag::BwAnd
            | OpTag::Greater
            | OpTag::Less
            | OpTag::GreaterEqual
            | OpTag::LessEqual
            | OpTag::Equal
            | OpTag::NotEqual => {
                let lhs = self.scalar(op.op1.expect("binary opcode without op1"));
                let rhs = self.scalar(op.op2.expect("binary opcode without op2"));
                let data = self.eval_binary(op.tag, lhs, rhs)?;
                self.store_result(op.result, data);
                Ok(None)
            }
            OpTag::PreInc | OpTag::PosInc | OpTag::PreDec | OpTag::PosDec => {
                self.incdec(op)?;
                Ok(None)
            }
            OpTag::Jmp => Ok(Some(op.jmp2.expect("Jmp without target"))),
            OpTag::Jmpz => {
                if self.is_falsy(op.op1.expect("Jmpz without operand")) {
                    // A pending false-branch may live in either slot: jmp1
                    // when patched directly, jmp2 when the end of the
                    // structure resolved it.
                    Ok(Some(op.jmp1.or(op.jmp2).expect("Jmpz without target")))
                } else {
                    Ok(None)
                }
            }
            OpTag::Break => Ok(Some(op.jmp1.expect("Break without target"))),
            OpTag::Assign => {
                let target = op.op1.expect("Assign without target");
                let source = op.op2.expect("Assign without source");
                let data = self.snapshot(source);
                self.pool.replace_data(target, data);
                self.pool.get_mut(target).set_modified();
                Ok(None)
            }
            OpTag::VarDecl => {
                let variable = op.op1.expect("VarDecl without variable");
                if let Some(init) = op.op2 {
                    let data = self.snapshot(init);
                    self.pool.replace_data(variable, data);
                    self.pool.get_mut(variable).set_status(ValueStatus::Set);
                }
                Ok(None)
            }
            OpTag::Fcall | OpTag::Mcall => {
                self.call(op)?;
                Ok(None)
            }
        }
    }

    /// Copies a resolved operand's payload, claiming child references.
    fn snapshot(&self, id: ValueId) -> ValueData {
        let resolved = self.pool.resolve(id);
        let source = self.pool.get(resolved).data();
        self.pool.clone_data(source)
    }

    fn scalar(&self, id: ValueId) -> Scalar {
        let resolved = self.pool.resolve(id);
        match self.pool.get(resolved).data() {
            ValueData::Int(i) => Scalar::Int(*i),
            ValueData::Double(d) => Scalar::Double(*d),
            ValueData::Bool(b) => Scalar::Bool(*b),
            ValueData::Str(s) => Scalar::Str(*s),
            ValueData::None => Scalar::None,
            other => Scalar::Other(other.tag().name()),
        }
    }

    /// Zero, false, 0.0, the empty string, an empty sequence, and an unset
    /// cell are all false.
    fn is_falsy(&self, id: ValueId) -> bool {
        let resolved = self.pool.resolve(id);
        match self.pool.get(resolved).data() {
            ValueData::None => true,
            ValueData::Int(i) => *i == 0,
            ValueData::Double(d) => *d == 0.0,
            ValueData::Bool(b) => !*b,
            ValueData::Str(s) => self.interner.get_str(*s).is_empty(),
            ValueData::Vector(children) => children.is_empty(),
            ValueData::Callable(_) | ValueData::User(_) => false,
            ValueData::Ref(_) => unreachable!("resolve() never returns a Ref cell"),
        }
    }

    /// Writes a handler's output into the result slot: temps receive the
    /// value by reference, named cells in place.
    fn store_result(&mut self, result: Option<ValueId>, data: ValueData) {
        let Some(result) = result else {
            // No result slot; give back any references the payload holds.
            let holder = self.pool.alloc(ValueCell::constant(data));
            self.pool.dec_ref(holder);
            return;
        };
        if self.pool.get(result).kind() == ValueKind::Temp {
            let inner = self.pool.alloc(ValueCell::constant(data));
            self.pool.set_temp_inner(result, inner);
        } else {
            self.pool.replace_data(result, data);
            self.pool.get_mut(result).set_modified();
        }
    }

    fn eval_binary(&mut self, tag: OpTag, lhs: Scalar, rhs: Scalar) -> ExecResult<ValueData> {
        match tag {
            OpTag::Plus | OpTag::Minus | OpTag::Mult | OpTag::Div | OpTag::Mod => match (lhs, rhs) {
                (Scalar::Int(a), Scalar::Int(b)) => int_arith(tag, a, b),
                (Scalar::Double(a), Scalar::Double(b)) => double_arith(tag, a, b),
                // Mixed integer/double operands promote to double.
                (Scalar::Int(a), Scalar::Double(b)) => double_arith(tag, a as f64, b),
                (Scalar::Double(a), Scalar::Int(b)) => double_arith(tag, a, b as f64),
                (Scalar::Str(a), Scalar::Str(b)) if tag == OpTag::Plus => {
                    let concat = format!("{}{}", self.interner.get_str(a), self.interner.get_str(b));
                    Ok(ValueData::Str(self.interner.intern(&concat)))
                }
                _ => Err(unsupported(tag, lhs, rhs)),
            },
            OpTag::BwOr | OpTag::BwXor | OpTag::BwAnd => match (lhs, rhs) {
                (Scalar::Int(a), Scalar::Int(b)) => Ok(ValueData::Int(match tag {
                    OpTag::BwOr => a | b,
                    OpTag::BwXor => a ^ b,
                    _ => a & b,
                })),
                _ => Err(unsupported(tag, lhs, rhs)),
            },
            OpTag::Greater
            | OpTag::Less
            | OpTag::GreaterEqual
            | OpTag::LessEqual
            | OpTag::Equal
            | OpTag::NotEqual => match (lhs, rhs) {
                (Scalar::Int(a), Scalar::Int(b)) => Ok(ValueData::Int(compare(tag, &a, &b))),
                (Scalar::Double(a), Scalar::Double(b)) => Ok(ValueData::Int(compare(tag, &a, &b))),
                // Mixed comparisons promote the integer to double.
                (Scalar::Int(a), Scalar::Double(b)) => Ok(ValueData::Int(compare(tag, &(a as f64), &b))),
                (Scalar::Double(a), Scalar::Int(b)) => Ok(ValueData::Int(compare(tag, &a, &(b as f64)))),
                // String comparison is lexicographic, byte by byte.
                (Scalar::Str(a), Scalar::Str(b)) => Ok(ValueData::Int(compare(
                    tag,
                    &self.interner.get_str(a),
                    &self.interner.get_str(b),
                ))),
                (Scalar::Bool(a), Scalar::Bool(b)) if matches!(tag, OpTag::Equal | OpTag::NotEqual) => {
                    Ok(ValueData::Int(compare(tag, &a, &b)))
                }
                _ => Err(unsupported(tag, lhs, rhs)),
            },
            _ => unreachable!("eval_binary called with non-binary tag {tag}"),
        }
    }

    fn incdec(&mut self, op: Op) -> ExecResult<()> {
        let target = op.op1.expect("inc/dec without target");
        let old = self.scalar(target);
        let (new_data, old_data) = match old {
            Scalar::Int(i) => {
                let delta = if matches!(op.tag, OpTag::PreInc | OpTag::PosInc) { 1 } else { -1 };
                (ValueData::Int(i.wrapping_add(delta)), ValueData::Int(i))
            }
            Scalar::Double(d) => {
                let delta = if matches!(op.tag, OpTag::PreInc | OpTag::PosInc) { 1.0 } else { -1.0 };
                (ValueData::Double(d + delta), ValueData::Double(d))
            }
            other => {
                return Err(RuntimeError::UnsupportedOperands {
                    op: tag_symbol(op.tag),
                    lhs: other.type_name(),
                    rhs: "-",
                });
            }
        };
        // The result slot receives the pre- or post-image.
        let image = if matches!(op.tag, OpTag::PreInc | OpTag::PreDec) {
            new_data.clone()
        } else {
            old_data
        };
        self.pool.replace_data(target, new_data);
        self.pool.get_mut(target).set_modified();
        self.store_result(op.result, image);
        Ok(())
    }

    fn call(&mut self, op: Op) -> ExecResult<()> {
        let callable_id = op.op1.expect("call without callable");
        let (func, recv, ty, name) = match self.pool.get(callable_id).data() {
            ValueData::Callable(callable) => (callable.func, callable.recv, callable.ty, callable.name),
            _ => return Err(RuntimeError::NullCallable),
        };
        let name_str = self.interner.get_str(name).to_owned();

        // Method calls verify the captured receiver still matches the type
        // the call was emitted against.
        if op.tag == OpTag::Mcall {
            let ty = ty.expect("Mcall callable without receiver type");
            let recv_id = recv.expect("Mcall callable without receiver");
            if !self.receiver_matches(recv_id, ty) {
                let resolved = self.pool.resolve(recv_id);
                return Err(RuntimeError::WrongReceiver {
                    method: name_str,
                    expected: self.interner.get_str(self.types.get(ty).name()).to_owned(),
                    found: self.pool.get(resolved).data().tag().name(),
                });
            }
        }

        // The ids stay owned by the argument vector for the whole call.
        let args: Vec<ValueId> = match op.op2 {
            Some(vec_id) => match self.pool.get(self.pool.resolve(vec_id)).data() {
                ValueData::Vector(children) => children.clone(),
                _ => Vec::new(),
            },
            None => Vec::new(),
        };

        self.tracer.on_call(&name_str);
        let data = {
            let mut ctx = NativeCtx {
                pool: &mut *self.pool,
                interner: &mut *self.interner,
                types: self.types,
                echo: &mut *self.echo,
                receiver: recv,
            };
            func(&mut ctx, &args)?
        };
        self.store_result(op.result, data);
        Ok(())
    }

    fn receiver_matches(&self, recv: ValueId, ty: crate::types::TypeId) -> bool {
        let resolved = self.pool.resolve(recv);
        let data = self.pool.get(resolved).data();
        let descriptor = self.types.get(ty);
        if !descriptor.template_args().is_empty() {
            return matches!(data, ValueData::Vector(_));
        }
        self.interner.get_str(descriptor.name()) == data.tag().name()
    }
}

fn int_arith(tag: OpTag, a: i64, b: i64) -> ExecResult<ValueData> {
    let value = match tag {
        OpTag::Plus => a.wrapping_add(b),
        OpTag::Minus => a.wrapping_sub(b),
        OpTag::Mult => a.wrapping_mul(b),
        // Integer division truncates toward zero; modulus takes the sign
        // of the dividend.
        OpTag::Div => {
            if b == 0 {
                return Err(RuntimeError::DivisionByZero);
            }
            a.wrapping_div(b)
        }
        OpTag::Mod => {
            if b == 0 {
                return Err(RuntimeError::DivisionByZero);
            }
            a.wrapping_rem(b)
        }
        _ => unreachable!("int_arith called with non-arithmetic tag {tag}"),
    };
    Ok(ValueData::Int(value))
}

fn double_arith(tag: OpTag, a: f64, b: f64) -> ExecResult<ValueData> {
    let value = match tag {
        OpTag::Plus => a + b,
        OpTag::Minus => a - b,
        OpTag::Mult => a * b,
        // IEEE 754: double division and modulus by zero produce inf/NaN.
        OpTag::Div => a / b,
        OpTag::Mod => a % b,
        _ => unreachable!("double_arith called with non-arithmetic tag {tag}"),
    };
    Ok(ValueData::Double(value))
}

/// Comparison result as an integer 0/1. NaN operands make every comparison
/// false except `!=`.
fn compare<V: PartialOrd + PartialEq + ?Sized>(tag: OpTag, a: &V, b: &V) -> i64 {
    let result = match tag {
        OpTag::Greater => a > b,
        OpTag::Less => a < b,
        OpTag::GreaterEqual => a >= b,
        OpTag::LessEqual => a <= b,
        OpTag::Equal => a == b,
        OpTag::NotEqual => a != b,
        _ => unreachable!("compare called with non-comparison tag {tag}"),
    };
    i64::from(result)
}

fn unsupported(tag: OpTag, lhs: Scalar, rhs: Scalar) -> RuntimeError {
    RuntimeError::UnsupportedOperands {
        op: tag_symbol(tag),
        lhs: lhs.type_name(),
        rhs: rhs.type_name(),
    }
}

fn tag_symbol(tag: OpTag) -> &'static str {
    match tag {
        OpTag::Plus => "+",
        OpTag::Minus => "-",
        OpTag::Mult => "*",
        OpTag::Div => "/",
        OpTag::Mod => "%",
        OpTag::BwOr => "|",
        OpTag::BwXor => "^",
        OpTag::BwAnd => "&",
        OpTag::Greater => ">",
        OpTag::Less => "<",
        OpTag::GreaterEqual => ">=",
        OpTag::LessEqual => "<=",
        OpTag::Equal => "==",
        OpTag::NotEqual => "!=",
        OpTag::PreInc | OpTag::PosInc => "++",
        OpTag::PreDec | OpTag::PosDec => "--",
        _ => "?",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{io::CollectStringEcho, tracer::NoopTracer};

    fn machine_parts() -> (ValuePool, Interner, TypeRegistry) {
        (ValuePool::new(), Interner::new(), TypeRegistry::new())
    }

    #[test]
    fn echo_writes_operand_and_newline() {
        let (mut pool, mut interner, types) = machine_parts();
        let value = pool.alloc(ValueCell::constant(ValueData::Int(3)));
        let mut code = CodeUnit::new();
        code.push(Op::new(OpTag::Echo).with_op1(value), &pool);
        pool.dec_ref(value);

        let mut echo = CollectStringEcho::new();
        let pc = Machine::new(&mut pool, &mut interner, &types, &mut echo, NoopTracer)
            .run(&code)
            .unwrap();
        assert_eq!(pc, 1);
        assert_eq!(echo.into_string(), "3\n");

        code.release(&mut pool);
        assert_eq!(pool.live_count(), 0);
    }

    #[test]
    fn integer_division_truncates_toward_zero() {
        assert!(matches!(int_arith(OpTag::Div, 7, 2), Ok(ValueData::Int(3))));
        assert!(matches!(int_arith(OpTag::Div, -7, 2), Ok(ValueData::Int(-3))));
        assert!(matches!(int_arith(OpTag::Mod, -7, 2), Ok(ValueData::Int(-1))));
        assert!(matches!(int_arith(OpTag::Mod, 7, -2), Ok(ValueData::Int(1))));
    }

    #[test]
    fn integer_division_by_zero_is_a_runtime_error() {
        assert!(matches!(int_arith(OpTag::Div, 1, 0), Err(RuntimeError::DivisionByZero)));
        assert!(matches!(int_arith(OpTag::Mod, 1, 0), Err(RuntimeError::DivisionByZero)));
    }

    #[test]
    fn double_division_by_zero_follows_ieee() {
        let ValueData::Double(value) = double_arith(OpTag::Div, 1.0, 0.0).unwrap() else {
            panic!("expected a double");
        };
        assert!(value.is_infinite());
    }

    #[test]
    fn mixed_comparison_promotes_integer() {
        assert_eq!(compare(OpTag::Less, &(1i64 as f64), &1.5f64), 1);
        assert_eq!(compare(OpTag::Equal, &(2i64 as f64), &2.0f64), 1);
    }

    #[test]
    fn string_comparison_is_bytewise() {
        assert_eq!(compare(OpTag::Less, "abc", "abd"), 1);
        assert_eq!(compare(OpTag::Greater, "b", "aaaa"), 1);
        assert_eq!(compare(OpTag::Equal, "x", "x"), 1);
    }
}
