//! Public interface for compiling and running quill code.

use crate::{
    codegen::Compiler,
    error::{CompileResult, ExecResult, QuillError},
    intern::Interner,
    io::EchoWriter,
    modules::{ModuleRegistry, std_package},
    opcode::{CodeUnit, Op},
    parse::parse,
    pool::ValuePool,
    scope::ScopeArena,
    tracer::{ExecTracer, NoopTracer},
    types::{TypeRegistry, register_builtin_types},
    vm::Machine,
};

/// A compiled program: the opcode stream plus the value cells it
/// references (owned by the runner's pool).
///
/// Release a program back to its runner with [`Runner::release`] when it
/// is no longer needed; dropping it without releasing merely keeps its
/// operand cells alive until the runner itself is dropped.
#[derive(Debug)]
pub struct Program {
    code: CodeUnit,
}

impl Program {
    /// The opcode stream, for inspection.
    #[must_use]
    pub fn ops(&self) -> &[Op] {
        self.code.ops()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.code.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }
}

/// Primary interface for running quill code.
///
/// A `Runner` owns the four long-lived stores — string interner, value
/// pool, type registry, scope tree — plus the module registry. They are
/// created together, mutated during compilation, and read (except for the
/// interner, which handlers may extend) during execution.
///
/// # Example
/// ```
/// use quill::{CollectStringEcho, Runner};
///
/// let mut runner = Runner::new();
/// let mut echo = CollectStringEcho::new();
/// runner.run("echo 1 + 2;", &mut echo).unwrap();
/// assert_eq!(echo.into_string(), "3\n");
/// ```
#[derive(Debug)]
pub struct Runner {
    interner: Interner,
    pool: ValuePool,
    types: TypeRegistry,
    scopes: ScopeArena,
    modules: ModuleRegistry,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    /// Creates a runner with the built-in types registered and `std.core`
    /// imported.
    #[must_use]
    pub fn new() -> Self {
        let mut interner = Interner::new();
        let mut pool = ValuePool::new();
        let mut types = TypeRegistry::new();
        let mut scopes = ScopeArena::new();
        let mut modules = ModuleRegistry::new();

        register_builtin_types(&mut types, &mut interner);
        let package = std_package(&mut interner);
        modules.add_package(package, &mut interner);

        let std_name = interner.intern("std");
        let core_name = interner.intern("core");
        modules
            .import(std_name, Some(core_name), &mut interner, &mut pool, &mut types, &mut scopes)
            .expect("std.core is registered");

        Self {
            interner,
            pool,
            types,
            scopes,
            modules,
        }
    }

    /// Parses and compiles a program without executing it.
    pub fn compile(&mut self, source: &str) -> CompileResult<Program> {
        let stmts = parse(source, &mut self.interner)?;
        let compiler = Compiler::new(
            &mut self.interner,
            &mut self.pool,
            &mut self.types,
            &mut self.scopes,
            &mut self.modules,
        );
        let code = compiler.compile(&stmts)?;
        Ok(Program { code })
    }

    /// Executes a compiled program. Returns the final program counter.
    pub fn execute<W: EchoWriter>(&mut self, program: &Program, echo: &mut W) -> ExecResult<usize> {
        self.execute_traced(program, echo, NoopTracer)
    }

    /// Executes a compiled program with a custom tracer. Returns the final
    /// program counter.
    pub fn execute_traced<W: EchoWriter, T: ExecTracer>(
        &mut self,
        program: &Program,
        echo: &mut W,
        tracer: T,
    ) -> ExecResult<usize> {
        let mut machine = Machine::new(&mut self.pool, &mut self.interner, &self.types, echo, tracer);
        machine.run(&program.code)
    }

    /// Executes a compiled program and hands the tracer back for
    /// inspection alongside the final program counter.
    pub fn execute_with_tracer<W: EchoWriter, T: ExecTracer>(
        &mut self,
        program: &Program,
        echo: &mut W,
        tracer: T,
    ) -> (ExecResult<usize>, T) {
        let mut machine = Machine::new(&mut self.pool, &mut self.interner, &self.types, echo, tracer);
        let result = machine.run(&program.code);
        (result, machine.into_tracer())
    }

    /// Gives a program's operand references back to the pool.
    pub fn release(&mut self, program: &mut Program) {
        program.code.release(&mut self.pool);
    }

    /// Compiles, executes, and releases in one step. Returns the final
    /// program counter.
    pub fn run<W: EchoWriter>(&mut self, source: &str, echo: &mut W) -> Result<usize, QuillError> {
        let mut program = self.compile(source)?;
        let result = self.execute(&program, echo);
        self.release(&mut program);
        Ok(result?)
    }

    /// The string interner, for inspection.
    #[must_use]
    pub fn interner(&self) -> &Interner {
        &self.interner
    }

    /// The value pool, for inspection.
    #[must_use]
    pub fn pool(&self) -> &ValuePool {
        &self.pool
    }

    /// The type registry, for inspection.
    #[must_use]
    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    /// The scope tree, for inspection.
    #[must_use]
    pub fn scopes(&self) -> &ScopeArena {
        &self.scopes
    }

    /// Releases every long-lived value binding (scopes and module
    /// constants). Used by refcount-hygiene tests; a runner is unusable
    /// for further compilation afterwards.
    pub fn teardown(&mut self) {
        self.scopes.release_all(&mut self.pool);
        self.modules.release_all(&mut self.pool);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::CollectStringEcho;

    #[test]
    fn run_compiles_executes_and_releases() {
        let mut runner = Runner::new();
        let mut echo = CollectStringEcho::new();
        runner.run("echo 2 * 21;", &mut echo).unwrap();
        assert_eq!(echo.into_string(), "42\n");
    }

    #[test]
    fn full_teardown_drains_the_pool() {
        let mut runner = Runner::new();
        let mut echo = CollectStringEcho::new();
        runner
            .run("Int x = 1; while (x < 5) { x = x + 1; } echo x;", &mut echo)
            .unwrap();
        runner.teardown();
        assert_eq!(runner.pool().live_count(), 0);
    }

    #[test]
    fn compile_error_surfaces_before_execution() {
        let mut runner = Runner::new();
        let err = runner.compile("echo missing;").unwrap_err();
        assert_eq!(
            err.to_string(),
            "variable 'missing' does not exist"
        );
    }
}
