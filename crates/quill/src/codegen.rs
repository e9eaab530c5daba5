//! The opcode generator: a single walk over the syntax tree.
//!
//! The generator appends opcodes to the tail of a [`CodeUnit`] while
//! maintaining three stacks:
//!
//! - `jmps` — one frame per open control structure, holding the indices of
//!   opcodes whose jump slots still await patching;
//! - `brks` — one frame per open loop, holding the indices of `Break`
//!   opcodes to be pointed at the loop exit;
//! - the SSA tracker — one frame per lexical block, mapping declared names
//!   to their canonical value cells so every opcode references the same
//!   cell rather than a fresh one.
//!
//! Jump addresses are absolute indices into the stream. Several patch
//! sites target `next_op() + 1`: the `+1` deliberately skips the
//! terminating `Jmp` that the preceding branch emits right after the patch
//! decision, so control always transfers to the first opcode that is
//! logically part of the target block, never to a synthesised jump.

use crate::{
    ast::{BinOp, Expr, IfArm, Stmt, TypeExpr},
    error::{CompileError, CompileResult},
    intern::{Interner, StrId},
    modules::ModuleRegistry,
    opcode::{CodeUnit, Op, OpTag},
    pool::{ValueId, ValuePool},
    scope::{ScopeArena, ScopeId, Symbol},
    types::{TypeId, TypeRegistry},
    value::{CallableData, ValueCell, ValueData, ValueStatus},
};

/// Per-block tracker mapping a declared name to the canonical cell the
/// emitted opcodes must reference.
///
/// Each frame owns one reference per tracked value; closing a block gives
/// those references back, so a cell with no outer owner is released with
/// its block.
#[derive(Debug, Default)]
struct SsaTracker {
    frames: Vec<Vec<(StrId, ValueId)>>,
}

impl SsaTracker {
    fn new_block(&mut self) {
        self.frames.push(Vec::new());
    }

    fn end_block(&mut self, pool: &mut ValuePool) {
        if let Some(frame) = self.frames.pop() {
            for (_, value) in frame {
                pool.dec_ref(value);
            }
        }
    }

    fn end_all(&mut self, pool: &mut ValuePool) {
        while !self.frames.is_empty() {
            self.end_block(pool);
        }
    }

    fn push_var(&mut self, name: StrId, value: ValueId, pool: &ValuePool) {
        pool.inc_ref(value);
        self.frames
            .last_mut()
            .expect("push_var outside of any block")
            .push((name, value));
    }

    /// Innermost tracked cell for `name`, if any.
    fn fetch_var(&self, name: StrId) -> Option<ValueId> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.iter().rev().find(|(n, _)| *n == name).map(|&(_, v)| v))
    }
}

/// Walks the syntax tree once and produces the opcode stream.
pub struct Compiler<'a> {
    interner: &'a mut Interner,
    pool: &'a mut ValuePool,
    types: &'a mut TypeRegistry,
    scopes: &'a mut ScopeArena,
    modules: &'a mut ModuleRegistry,
    code: CodeUnit,
    jmps: Vec<Vec<usize>>,
    brks: Vec<Vec<usize>>,
    ssa: SsaTracker,
    scope: ScopeId,
}

impl<'a> Compiler<'a> {
    pub fn new(
        interner: &'a mut Interner,
        pool: &'a mut ValuePool,
        types: &'a mut TypeRegistry,
        scopes: &'a mut ScopeArena,
        modules: &'a mut ModuleRegistry,
    ) -> Self {
        Self {
            interner,
            pool,
            types,
            scopes,
            modules,
            code: CodeUnit::new(),
            jmps: Vec::new(),
            brks: Vec::new(),
            ssa: SsaTracker::default(),
            scope: ScopeId::GLOBAL,
        }
    }

    /// Compiles a program into an opcode stream.
    ///
    /// On failure the partially built stream's operand references are
    /// released before the error is returned.
    pub fn compile(mut self, stmts: &[Stmt]) -> CompileResult<CodeUnit> {
        self.ssa.new_block();
        let result = stmts.iter().try_for_each(|stmt| self.visit_stmt(stmt));
        self.ssa.end_all(self.pool);
        match result {
            Ok(()) => Ok(self.code),
            Err(err) => {
                self.code.release(self.pool);
                Err(err)
            }
        }
    }

    fn emit(&mut self, op: Op) -> usize {
        self.code.push(op, self.pool)
    }

    fn visit_stmt(&mut self, stmt: &Stmt) -> CompileResult<()> {
        match stmt {
            Stmt::Echo(expr) => {
                let value = self.value_of(expr)?;
                self.emit(Op::new(OpTag::Echo).with_op1(value));
                self.pool.dec_ref(value);
                Ok(())
            }
            Stmt::VarDecl { ty, name, init } => self.visit_var_decl(ty, *name, init.as_ref()),
            Stmt::Expr(expr) => {
                let value = self.value_of(expr)?;
                self.pool.dec_ref(value);
                Ok(())
            }
            Stmt::Block(stmts) => self.visit_block(stmts),
            Stmt::If { arms, otherwise } => self.visit_if(arms, otherwise.as_deref()),
            Stmt::While { cond, body } => self.visit_while(cond, body),
            Stmt::Break => {
                if self.brks.is_empty() {
                    return Err(CompileError::BreakOutsideLoop);
                }
                let index = self.emit(Op::new(OpTag::Break));
                self.brks.last_mut().expect("break frame present").push(index);
                Ok(())
            }
            Stmt::Import { package, module } => self.modules.import(
                *package,
                *module,
                self.interner,
                self.pool,
                self.types,
                self.scopes,
            ),
        }
    }

    /// Compiles a lexical block in a fresh child scope and SSA frame.
    fn visit_block(&mut self, stmts: &[Stmt]) -> CompileResult<()> {
        let parent = self.scope;
        self.scope = self.scopes.new_child(parent);
        self.ssa.new_block();
        let result = stmts.iter().try_for_each(|stmt| self.visit_stmt(stmt));
        self.ssa.end_block(self.pool);
        self.scope = parent;
        result
    }

    fn visit_var_decl(&mut self, ty: &TypeExpr, name: StrId, init: Option<&Expr>) -> CompileResult<()> {
        let ty_id = self.resolve_type(ty)?;
        let variable = self.pool.alloc(ValueCell::named(ty_id));
        // Container declarations start out holding an empty sequence so
        // method calls have a payload to work on before any element exists.
        if !self.types.get(ty_id).template_args().is_empty() {
            self.pool.replace_data(variable, ValueData::Vector(Vec::new()));
        }

        match init {
            Some(expr) => {
                let value = match self.value_of(expr) {
                    Ok(value) => value,
                    Err(err) => {
                        self.pool.dec_ref(variable);
                        return Err(err);
                    }
                };
                // A constant initialiser is known now; copying it in makes
                // the variable's value visible to later folding decisions.
                if self.pool.get(value).is_const() {
                    let data = {
                        let source = self.pool.get(value).data();
                        self.pool.clone_data(source)
                    };
                    self.pool.replace_data(variable, data);
                }
                self.pool.get_mut(variable).set_status(ValueStatus::Set);
                self.ssa.push_var(name, variable, self.pool);
                self.emit(Op::new(OpTag::VarDecl).with_op1(variable).with_op2(value));
                self.pool.dec_ref(value);
            }
            None => {
                self.ssa.push_var(name, variable, self.pool);
                self.emit(Op::new(OpTag::VarDecl).with_op1(variable));
            }
        }

        // The binding takes over the creation reference; a shadowed binding
        // in the same scope gives its reference back.
        if let Some(Symbol::Value(old)) = self.scopes.bind_value(self.scope, name, variable) {
            self.pool.dec_ref(old);
        }
        Ok(())
    }

    /// Resolves a type reference, specialising templated forms on demand.
    fn resolve_type(&mut self, ty: &TypeExpr) -> CompileResult<TypeId> {
        let base = self
            .types
            .lookup(ty.name)
            .or_else(|| self.scopes.get_type(self.scope, ty.name))
            .ok_or_else(|| CompileError::UnknownType(self.interner.get_str(ty.name).to_owned()))?;
        if ty.args.is_empty() {
            return Ok(base);
        }
        let mut args = Vec::with_capacity(ty.args.len());
        for arg in &ty.args {
            args.push(self.resolve_type(arg)?);
        }
        self.types
            .specialise(base, &args, self.interner)
            .map_err(CompileError::TemplateArity)
    }

    /// Returns the value cell an expression denotes, with one reference
    /// owned by the caller.
    fn value_of(&mut self, expr: &Expr) -> CompileResult<ValueId> {
        match expr {
            Expr::Int(value) => Ok(self.pool.alloc(ValueCell::constant(ValueData::Int(*value)))),
            Expr::Double(value) => Ok(self.pool.alloc(ValueCell::constant(ValueData::Double(*value)))),
            Expr::Str(value) => Ok(self.pool.alloc(ValueCell::constant(ValueData::Str(*value)))),
            Expr::Bool(value) => Ok(self.pool.alloc(ValueCell::constant(ValueData::Bool(*value)))),
            Expr::Ident(name) => self.fetch_ident(*name),
            Expr::Binary { op, lhs, rhs } => self.compile_binary(*op, lhs, rhs, None),
            Expr::Assign { target, value } => self.compile_assign(*target, value),
            Expr::PreInc(inner) => self.compile_incdec(OpTag::PreInc, inner),
            Expr::PostInc(inner) => self.compile_incdec(OpTag::PosInc, inner),
            Expr::PreDec(inner) => self.compile_incdec(OpTag::PreDec, inner),
            Expr::PostDec(inner) => self.compile_incdec(OpTag::PosDec, inner),
            Expr::Call { name, args } => self.compile_fcall(*name, args),
            Expr::MethodCall { recv, method, args } => self.compile_mcall(recv, *method, args),
        }
    }

    /// Resolves a name to its canonical cell: the SSA tracker first, then
    /// scope symbols (module constants).
    fn fetch_ident(&mut self, name: StrId) -> CompileResult<ValueId> {
        if let Some(value) = self.ssa.fetch_var(name) {
            self.pool.inc_ref(value);
            return Ok(value);
        }
        if let Some(value) = self.scopes.get_value(self.scope, name) {
            self.pool.inc_ref(value);
            return Ok(value);
        }
        Err(CompileError::UnknownVariable(self.interner.get_str(name).to_owned()))
    }

    /// Two operands are compatible unless both are constants of different
    /// types; named operands are always compatible at compile time and are
    /// checked by the opcode handler at run time.
    fn check_compatible(&self, lhs: ValueId, rhs: ValueId) -> bool {
        let lhs_cell = self.pool.get(lhs);
        let rhs_cell = self.pool.get(rhs);
        !(lhs_cell.is_const() && rhs_cell.is_const() && lhs_cell.data().tag() != rhs_cell.data().tag())
    }

    fn compile_binary(
        &mut self,
        op: BinOp,
        lhs_expr: &Expr,
        rhs_expr: &Expr,
        assign_to: Option<ValueId>,
    ) -> CompileResult<ValueId> {
        let lhs = self.value_of(lhs_expr)?;
        let rhs = match self.value_of(rhs_expr) {
            Ok(rhs) => rhs,
            Err(err) => {
                self.pool.dec_ref(lhs);
                return Err(err);
            }
        };

        let release_operands = |pool: &mut ValuePool| {
            pool.dec_ref(lhs);
            pool.dec_ref(rhs);
        };

        if !self.check_compatible(lhs, rhs) {
            release_operands(self.pool);
            return Err(CompileError::TypeMismatch);
        }

        // Fold only constant, same-typed, unmodified operands, and never
        // for an assignment.
        if assign_to.is_none() && self.foldable(lhs, rhs) {
            let folded = {
                let lhs_data = self.pool.get(lhs).data().clone();
                let rhs_data = self.pool.get(rhs).data().clone();
                fold_constants(op, &lhs_data, &rhs_data, self.interner)
            };
            match folded {
                Ok(Some(data)) => {
                    release_operands(self.pool);
                    return Ok(self.pool.alloc(ValueCell::constant(data)));
                }
                Ok(None) => {}
                Err(err) => {
                    release_operands(self.pool);
                    return Err(err);
                }
            }
        }

        let result = match assign_to {
            Some(target) => {
                self.pool.get_mut(target).set_modified();
                self.pool.inc_ref(target);
                target
            }
            None => self.pool.alloc(ValueCell::temp()),
        };
        self.emit(Op::new(op_tag(op)).with_op1(lhs).with_op2(rhs).with_result(result));
        release_operands(self.pool);
        Ok(result)
    }

    fn foldable(&self, lhs: ValueId, rhs: ValueId) -> bool {
        let lhs_cell = self.pool.get(lhs);
        let rhs_cell = self.pool.get(rhs);
        lhs_cell.is_const()
            && rhs_cell.is_const()
            && lhs_cell.data().tag() == rhs_cell.data().tag()
            && !lhs_cell.is_modified()
            && !rhs_cell.is_modified()
    }

    fn compile_assign(&mut self, target: StrId, value: &Expr) -> CompileResult<ValueId> {
        let target_id = self.fetch_ident(target)?;
        if self.pool.get(target_id).is_const() {
            self.pool.dec_ref(target_id);
            return Err(CompileError::AssignToConstant(
                self.interner.get_str(target).to_owned(),
            ));
        }

        // A binary right-hand side reuses the assignment target as its
        // result slot instead of going through a separate Assign opcode.
        if let Expr::Binary { op, lhs, rhs } = value {
            let result = match self.compile_binary(*op, lhs, rhs, Some(target_id)) {
                Ok(result) => result,
                Err(err) => {
                    self.pool.dec_ref(target_id);
                    return Err(err);
                }
            };
            self.pool.dec_ref(target_id);
            return Ok(result);
        }

        let value_id = match self.value_of(value) {
            Ok(value_id) => value_id,
            Err(err) => {
                self.pool.dec_ref(target_id);
                return Err(err);
            }
        };
        self.pool.get_mut(target_id).set_modified();
        self.emit(Op::new(OpTag::Assign).with_op1(target_id).with_op2(value_id));
        self.pool.dec_ref(value_id);
        Ok(target_id)
    }

    fn compile_incdec(&mut self, tag: OpTag, inner: &Expr) -> CompileResult<ValueId> {
        let target = self.value_of(inner)?;
        if !self.pool.get(target).is_named() {
            self.pool.dec_ref(target);
            return Err(CompileError::InvalidMutationTarget);
        }
        self.pool.get_mut(target).set_modified();
        let result = self.pool.alloc(ValueCell::temp());
        self.emit(Op::new(tag).with_op1(target).with_result(result));
        self.pool.dec_ref(target);
        Ok(result)
    }

    fn compile_fcall(&mut self, name: StrId, args: &[Expr]) -> CompileResult<ValueId> {
        let Some(func) = self.modules.function(name) else {
            return Err(CompileError::UnknownFunction(self.interner.get_str(name).to_owned()));
        };
        let call = self.pool.alloc(ValueCell::constant(ValueData::Callable(Box::new(CallableData {
            name,
            func,
            recv: None,
            ty: None,
        }))));
        let arg_vec = match self.build_args(args) {
            Ok(arg_vec) => arg_vec,
            Err(err) => {
                self.pool.dec_ref(call);
                return Err(err);
            }
        };
        let result = self.pool.alloc(ValueCell::temp());
        let mut op = Op::new(OpTag::Fcall).with_op1(call).with_result(result);
        if let Some(arg_vec) = arg_vec {
            op = op.with_op2(arg_vec);
        }
        self.emit(op);
        self.pool.dec_ref(call);
        if let Some(arg_vec) = arg_vec {
            self.pool.dec_ref(arg_vec);
        }
        Ok(result)
    }

    fn compile_mcall(&mut self, recv_expr: &Expr, method: StrId, args: &[Expr]) -> CompileResult<ValueId> {
        let recv = self.value_of(recv_expr)?;
        let ty = match self.type_of_value(recv) {
            Ok(ty) => ty,
            Err(err) => {
                self.pool.dec_ref(recv);
                return Err(err);
            }
        };
        let Some(func) = self.types.get(ty).method(method) else {
            let err = CompileError::UnknownMethod {
                ty: self.interner.get_str(self.types.get(ty).name()).to_owned(),
                method: self.interner.get_str(method).to_owned(),
            };
            self.pool.dec_ref(recv);
            return Err(err);
        };
        // The callable captures the receiver: ownership of our receiver
        // reference transfers into the callable payload.
        let call = self.pool.alloc(ValueCell::constant(ValueData::Callable(Box::new(CallableData {
            name: method,
            func,
            recv: Some(recv),
            ty: Some(ty),
        }))));
        let arg_vec = match self.build_args(args) {
            Ok(arg_vec) => arg_vec,
            Err(err) => {
                self.pool.dec_ref(call);
                return Err(err);
            }
        };
        let result = self.pool.alloc(ValueCell::temp());
        let mut op = Op::new(OpTag::Mcall).with_op1(call).with_result(result);
        if let Some(arg_vec) = arg_vec {
            op = op.with_op2(arg_vec);
        }
        self.emit(op);
        self.pool.dec_ref(call);
        if let Some(arg_vec) = arg_vec {
            self.pool.dec_ref(arg_vec);
        }
        Ok(result)
    }

    /// Builds the argument vector value for a call; `None` for an empty
    /// argument list. Each argument's reference transfers into the vector.
    fn build_args(&mut self, args: &[Expr]) -> CompileResult<Option<ValueId>> {
        if args.is_empty() {
            return Ok(None);
        }
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            match self.value_of(arg) {
                Ok(value) => values.push(value),
                Err(err) => {
                    for value in values {
                        self.pool.dec_ref(value);
                    }
                    return Err(err);
                }
            }
        }
        Ok(Some(self.pool.alloc(ValueCell::constant(ValueData::Vector(values)))))
    }

    /// The type descriptor governing method lookup on a receiver.
    fn type_of_value(&mut self, value: ValueId) -> CompileResult<TypeId> {
        let resolved = self.pool.resolve(value);
        let cell = self.pool.get(resolved);
        if let Some(ty) = cell.decl_ty() {
            return Ok(ty);
        }
        let name = cell.data().tag().name();
        let name_id = self.interner.intern(name);
        self.types
            .lookup(name_id)
            .ok_or_else(|| CompileError::UnknownType(name.to_owned()))
    }

    fn visit_if(&mut self, arms: &[IfArm], otherwise: Option<&[Stmt]>) -> CompileResult<()> {
        self.jmps.push(Vec::new());

        for (index, arm) in arms.iter().enumerate() {
            if index > 0 {
                // Terminate the previous arm's body, then point its Jmpz
                // one past the Jmp we just emitted: the first opcode of
                // this arm's predicate.
                let jmp = self.emit(Op::new(OpTag::Jmp));
                let frame = self.jmps.last_mut().expect("if frame present");
                frame.push(jmp);
                let previous_jmpz = frame[frame.len() - 2];
                let target = self.code.next_op();
                self.code.patch_jmp1(previous_jmpz, target);
            }
            let cond = self.value_of(&arm.cond)?;
            let jmpz = self.emit(Op::new(OpTag::Jmpz).with_op1(cond));
            self.pool.dec_ref(cond);
            self.jmps.last_mut().expect("if frame present").push(jmpz);
            self.visit_block(&arm.body)?;
        }

        if let Some(body) = otherwise {
            let jmp = self.emit(Op::new(OpTag::Jmp));
            let frame = self.jmps.last_mut().expect("if frame present");
            frame.push(jmp);
            let previous_jmpz = frame[frame.len() - 2];
            let target = self.code.next_op();
            self.code.patch_jmp1(previous_jmpz, target);
            self.visit_block(body)?;
        }

        let frame = self.jmps.pop().expect("if frame present");
        let out = self.code.next_op();
        // With a single pending Jmpz (plain if), its false-branch goes
        // straight past the body.
        if frame.len() == 1 {
            self.code.patch_jmp1(frame[0], out);
        }
        for index in frame {
            self.code.patch_jmp2(index, out);
        }
        Ok(())
    }

    fn visit_while(&mut self, cond: &Expr, body: &[Stmt]) -> CompileResult<()> {
        // Loop-back target, stamped before the predicate is compiled.
        let start = self.code.next_op();
        let cond_value = self.value_of(cond)?;
        let jmpz = self.emit(Op::new(OpTag::Jmpz).with_op1(cond_value));
        self.pool.dec_ref(cond_value);
        self.jmps.push(vec![jmpz]);
        self.brks.push(Vec::new());

        self.visit_block(body)?;

        // One past the trailing Jmp emitted below.
        let scope_out = self.code.next_op() + 1;
        for index in self.brks.pop().expect("break frame present") {
            self.code.patch_jmp1(index, scope_out);
        }
        for index in self.jmps.pop().expect("while frame present") {
            self.code.patch_jmp1(index, scope_out);
        }
        let jmp = self.emit(Op::new(OpTag::Jmp));
        self.code.patch_jmp2(jmp, start);
        Ok(())
    }
}

fn op_tag(op: BinOp) -> OpTag {
    match op {
        BinOp::Add => OpTag::Plus,
        BinOp::Sub => OpTag::Minus,
        BinOp::Mul => OpTag::Mult,
        BinOp::Div => OpTag::Div,
        BinOp::Mod => OpTag::Mod,
        BinOp::BitOr => OpTag::BwOr,
        BinOp::BitXor => OpTag::BwXor,
        BinOp::BitAnd => OpTag::BwAnd,
        BinOp::Greater => OpTag::Greater,
        BinOp::Less => OpTag::Less,
        BinOp::GreaterEq => OpTag::GreaterEqual,
        BinOp::LessEq => OpTag::LessEqual,
        BinOp::Eq => OpTag::Equal,
        BinOp::NotEq => OpTag::NotEqual,
    }
}

/// Evaluates `lhs op rhs` over constant payloads of the same type.
///
/// Returns `Ok(None)` when the combination is not foldable (the opcode is
/// emitted and the handler decides at run time). Integer arithmetic wraps
/// two's-complement; doubles follow IEEE 754; strings fold `+` only;
/// comparisons yield an integer 0/1. Integer division or modulus by a zero
/// constant is a compile error.
pub(crate) fn fold_constants(
    op: BinOp,
    lhs: &ValueData,
    rhs: &ValueData,
    interner: &mut Interner,
) -> CompileResult<Option<ValueData>> {
    match (lhs, rhs) {
        (ValueData::Int(a), ValueData::Int(b)) => fold_ints(op, *a, *b).map(Some),
        (ValueData::Double(a), ValueData::Double(b)) => Ok(fold_doubles(op, *a, *b)),
        (ValueData::Str(a), ValueData::Str(b)) => {
            if op == BinOp::Add {
                let concat = format!("{}{}", interner.get_str(*a), interner.get_str(*b));
                Ok(Some(ValueData::Str(interner.intern(&concat))))
            } else {
                Ok(None)
            }
        }
        _ => Ok(None),
    }
}

fn fold_ints(op: BinOp, a: i64, b: i64) -> CompileResult<ValueData> {
    let value = match op {
        BinOp::Add => a.wrapping_add(b),
        BinOp::Sub => a.wrapping_sub(b),
        BinOp::Mul => a.wrapping_mul(b),
        BinOp::Div => {
            if b == 0 {
                return Err(CompileError::DivisionByZero);
            }
            a.wrapping_div(b)
        }
        BinOp::Mod => {
            if b == 0 {
                return Err(CompileError::DivisionByZero);
            }
            a.wrapping_rem(b)
        }
        BinOp::BitOr => a | b,
        BinOp::BitXor => a ^ b,
        BinOp::BitAnd => a & b,
        BinOp::Greater => i64::from(a > b),
        BinOp::Less => i64::from(a < b),
        BinOp::GreaterEq => i64::from(a >= b),
        BinOp::LessEq => i64::from(a <= b),
        BinOp::Eq => i64::from(a == b),
        BinOp::NotEq => i64::from(a != b),
    };
    Ok(ValueData::Int(value))
}

fn fold_doubles(op: BinOp, a: f64, b: f64) -> Option<ValueData> {
    let data = match op {
        BinOp::Add => ValueData::Double(a + b),
        BinOp::Sub => ValueData::Double(a - b),
        BinOp::Mul => ValueData::Double(a * b),
        BinOp::Div => ValueData::Double(a / b),
        BinOp::Mod => ValueData::Double(a % b),
        BinOp::Greater => ValueData::Int(i64::from(a > b)),
        BinOp::Less => ValueData::Int(i64::from(a < b)),
        BinOp::GreaterEq => ValueData::Int(i64::from(a >= b)),
        BinOp::LessEq => ValueData::Int(i64::from(a <= b)),
        BinOp::Eq => ValueData::Int(i64::from(a == b)),
        BinOp::NotEq => ValueData::Int(i64::from(a != b)),
        BinOp::BitOr | BinOp::BitXor | BinOp::BitAnd => return None,
    };
    Some(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fold_ints_pair(op: BinOp, a: i64, b: i64) -> Option<i64> {
        let mut interner = Interner::new();
        match fold_constants(op, &ValueData::Int(a), &ValueData::Int(b), &mut interner) {
            Ok(Some(ValueData::Int(value))) => Some(value),
            Ok(_) => None,
            Err(err) => panic!("unexpected fold error: {err}"),
        }
    }

    #[test]
    fn commutative_folds_are_order_independent() {
        let ops = [BinOp::Add, BinOp::Mul, BinOp::BitOr, BinOp::BitXor, BinOp::BitAnd, BinOp::Eq, BinOp::NotEq];
        let pairs = [(3, 4), (-7, 7), (0, 12), (i64::MAX, 2), (-1, -1)];
        for op in ops {
            assert!(op.is_commutative());
            for (a, b) in pairs {
                assert_eq!(fold_ints_pair(op, a, b), fold_ints_pair(op, b, a), "{op:?} {a} {b}");
            }
        }
    }

    #[test]
    fn string_concatenation_is_not_commutative() {
        let mut interner = Interner::new();
        let ab = ValueData::Str(interner.intern("ab"));
        let cd = ValueData::Str(interner.intern("cd"));
        let Ok(Some(ValueData::Str(forward))) = fold_constants(BinOp::Add, &ab, &cd, &mut interner) else {
            panic!("string '+' must fold");
        };
        let Ok(Some(ValueData::Str(backward))) = fold_constants(BinOp::Add, &cd, &ab, &mut interner) else {
            panic!("string '+' must fold");
        };
        assert_eq!(interner.get_str(forward), "abcd");
        assert_eq!(interner.get_str(backward), "cdab");
        assert_ne!(forward, backward);
    }

    #[test]
    fn only_string_plus_folds() {
        let mut interner = Interner::new();
        let a = ValueData::Str(interner.intern("a"));
        let b = ValueData::Str(interner.intern("b"));
        assert!(matches!(
            fold_constants(BinOp::Less, &a, &b, &mut interner),
            Ok(None)
        ));
    }

    #[test]
    fn integer_fold_by_zero_is_an_error() {
        let mut interner = Interner::new();
        for op in [BinOp::Div, BinOp::Mod] {
            assert!(matches!(
                fold_constants(op, &ValueData::Int(1), &ValueData::Int(0), &mut interner),
                Err(CompileError::DivisionByZero)
            ));
        }
    }

    #[test]
    fn double_fold_by_zero_follows_ieee() {
        let mut interner = Interner::new();
        let Ok(Some(ValueData::Double(value))) =
            fold_constants(BinOp::Div, &ValueData::Double(1.0), &ValueData::Double(0.0), &mut interner)
        else {
            panic!("double '/' must fold");
        };
        assert!(value.is_infinite());
    }

    #[test]
    fn comparisons_fold_to_integer_flags() {
        assert_eq!(fold_ints_pair(BinOp::Less, 1, 2), Some(1));
        assert_eq!(fold_ints_pair(BinOp::GreaterEq, 1, 2), Some(0));
    }

    #[test]
    fn integer_arithmetic_wraps() {
        assert_eq!(fold_ints_pair(BinOp::Add, i64::MAX, 1), Some(i64::MIN));
        assert_eq!(fold_ints_pair(BinOp::Mul, i64::MIN, -1), Some(i64::MIN));
    }
}
