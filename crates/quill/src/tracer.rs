//! VM execution tracing hooks.
//!
//! The VM is parameterized over an [`ExecTracer`]; with [`NoopTracer`] the
//! hooks compile away entirely through monomorphization, so production runs
//! pay nothing for the instrumentation points.

use crate::opcode::OpTag;

/// Hook points at key execution events.
pub trait ExecTracer {
    /// Called before each opcode is dispatched.
    fn on_instruction(&mut self, _pc: usize, _tag: OpTag) {}

    /// Called when a jump opcode rewrites the program counter.
    fn on_jump(&mut self, _from: usize, _to: usize) {}

    /// Called when a function or method call is about to run.
    fn on_call(&mut self, _name: &str) {}
}

/// Zero-cost no-op tracer, the production default.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTracer;

impl ExecTracer for NoopTracer {}

/// Human-readable execution log on stderr, for debugging.
#[derive(Debug, Default)]
pub struct StderrTracer;

impl ExecTracer for StderrTracer {
    fn on_instruction(&mut self, pc: usize, tag: OpTag) {
        eprintln!("[{pc:04}] {tag}");
    }

    fn on_jump(&mut self, from: usize, to: usize) {
        eprintln!("       jump {from} -> {to}");
    }

    fn on_call(&mut self, name: &str) {
        eprintln!("       call {name}");
    }
}

/// Counts executed opcodes per program-counter slot.
///
/// Useful in tests for asserting how often a loop body ran.
#[derive(Debug, Default)]
pub struct CountingTracer {
    counts: Vec<usize>,
}

impl CountingTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Times the opcode at `pc` was dispatched.
    #[must_use]
    pub fn count_at(&self, pc: usize) -> usize {
        self.counts.get(pc).copied().unwrap_or(0)
    }

    /// Total opcodes dispatched.
    #[must_use]
    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }
}

impl ExecTracer for CountingTracer {
    fn on_instruction(&mut self, pc: usize, _tag: OpTag) {
        if pc >= self.counts.len() {
            self.counts.resize(pc + 1, 0);
        }
        self.counts[pc] += 1;
    }
}
