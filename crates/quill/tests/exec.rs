//! End-to-end scenarios: source text in, opcode stream and stdout out.

use pretty_assertions::assert_eq;
use quill::{
    CollectStringEcho, CompileError, CountingTracer, OpTag, QuillError, Runner, RuntimeError, TypeTag, ValueKind,
};

/// Compiles and runs a source string, returning everything it echoed.
fn run(source: &str) -> String {
    let mut runner = Runner::new();
    let mut echo = CollectStringEcho::new();
    runner.run(source, &mut echo).expect("program failed");
    echo.into_string()
}

fn compile_err(source: &str) -> CompileError {
    let mut runner = Runner::new();
    match runner.compile(source) {
        Ok(_) => panic!("expected a compile error for {source:?}"),
        Err(err) => err,
    }
}

fn runtime_err(source: &str) -> RuntimeError {
    let mut runner = Runner::new();
    let mut echo = CollectStringEcho::new();
    match runner.run(source, &mut echo) {
        Err(QuillError::Runtime(err)) => err,
        other => panic!("expected a runtime error, got {other:?}"),
    }
}

#[test]
fn constant_folding_removes_the_opcode() {
    let mut runner = Runner::new();
    let program = runner.compile("echo 1 + 2;").unwrap();

    // The addition was folded away: one Echo whose operand is a constant
    // integer 3.
    assert_eq!(program.len(), 1);
    let op = program.ops()[0];
    assert_eq!(op.tag, OpTag::Echo);
    let operand = op.op1.unwrap();
    let cell = runner.pool().get(operand);
    assert_eq!(cell.kind(), ValueKind::Const);
    assert_eq!(cell.data().tag(), TypeTag::Integer);

    let mut echo = CollectStringEcho::new();
    runner.execute(&program, &mut echo).unwrap();
    assert_eq!(echo.into_string(), "3\n");
}

#[test]
fn named_arithmetic_emits_the_opcode() {
    let mut runner = Runner::new();
    let program = runner.compile("Int x = 5; echo x + 1;").unwrap();

    let tags: Vec<OpTag> = program.ops().iter().map(|op| op.tag).collect();
    assert_eq!(tags, vec![OpTag::VarDecl, OpTag::Plus, OpTag::Echo]);

    let mut echo = CollectStringEcho::new();
    runner.execute(&program, &mut echo).unwrap();
    assert_eq!(echo.into_string(), "6\n");
}

#[test]
fn if_else_jump_patching() {
    let mut runner = Runner::new();
    let program = runner.compile("if (0) { echo 1; } else { echo 2; }").unwrap();

    let tags: Vec<OpTag> = program.ops().iter().map(|op| op.tag).collect();
    assert_eq!(tags, vec![OpTag::Jmpz, OpTag::Echo, OpTag::Jmp, OpTag::Echo]);

    // The false branch of the Jmpz lands on the first opcode of the else
    // block, skipping the synthesised Jmp; both pending jumps exit to the
    // first opcode after the chain.
    assert_eq!(program.ops()[0].jmp1, Some(3));
    assert_eq!(program.ops()[0].jmp2, Some(4));
    assert_eq!(program.ops()[2].jmp2, Some(4));

    let mut echo = CollectStringEcho::new();
    let pc = runner.execute(&program, &mut echo).unwrap();
    assert_eq!(echo.into_string(), "2\n");
    assert_eq!(pc, 4);
}

#[test]
fn while_with_break() {
    let mut runner = Runner::new();
    let program = runner
        .compile("Int i = 0; while (i < 3) { if (i == 1) { break; } ++i; }")
        .unwrap();

    let tags: Vec<OpTag> = program.ops().iter().map(|op| op.tag).collect();
    assert_eq!(
        tags,
        vec![
            OpTag::VarDecl,
            OpTag::Less,
            OpTag::Jmpz,
            OpTag::Equal,
            OpTag::Jmpz,
            OpTag::Break,
            OpTag::PreInc,
            OpTag::Jmp,
        ]
    );
    // Both the loop predicate and the break exit one past the trailing Jmp;
    // the trailing Jmp loops back to the predicate.
    assert_eq!(program.ops()[2].jmp1, Some(8));
    assert_eq!(program.ops()[5].jmp1, Some(8));
    assert_eq!(program.ops()[7].jmp2, Some(1));

    let mut echo = CollectStringEcho::new();
    let pc = runner.execute(&program, &mut echo).unwrap();
    assert_eq!(pc, 8);

    // The named `i` ended at 1: the break fired on the second iteration.
    let variable = program.ops()[0].op1.unwrap();
    assert_eq!(runner.pool().display(runner.interner(), variable), "1");
}

#[test]
fn function_call_stores_result() {
    let mut runner = Runner::new();
    let program = runner.compile("echo strlen(\"abc\");").unwrap();

    let tags: Vec<OpTag> = program.ops().iter().map(|op| op.tag).collect();
    assert_eq!(tags, vec![OpTag::Fcall, OpTag::Echo]);

    let mut echo = CollectStringEcho::new();
    runner.execute(&program, &mut echo).unwrap();
    assert_eq!(echo.into_string(), "3\n");

    let result = program.ops()[0].result.unwrap();
    let resolved = runner.pool().resolve(result);
    assert_eq!(runner.pool().get(resolved).data().tag(), TypeTag::Integer);
    assert_eq!(runner.pool().display(runner.interner(), result), "3");
}

#[test]
fn template_specialisation_is_shared_between_declarations() {
    let mut runner = Runner::new();
    runner.compile("Array<Int> xs;").unwrap();
    let types_after_first = runner.types().len();
    runner.compile("Array<Int> ys;").unwrap();
    // The second declaration reused the existing Array<Int> descriptor.
    assert_eq!(runner.types().len(), types_after_first);
}

#[test]
fn exactly_one_branch_of_a_chain_executes() {
    let source = "Int x = 2;
        if (x == 1) { echo 1; } else if (x == 2) { echo 2; } else { echo 3; }";
    assert_eq!(run(source), "2\n");

    let mut runner = Runner::new();
    let program = runner.compile(source).unwrap();
    let mut echo = CollectStringEcho::new();
    let pc = runner.execute(&program, &mut echo).unwrap();
    // The PC exits at the opcode immediately after the chain.
    assert_eq!(pc, program.len());
}

#[test]
fn chain_without_matching_arm_echoes_nothing() {
    assert_eq!(
        run("Int x = 3; if (x == 1) { echo 1; } else if (x == 2) { echo 2; }"),
        ""
    );
}

#[test]
fn while_visits_body_n_times_and_predicate_n_plus_one() {
    let mut runner = Runner::new();
    let program = runner.compile("Int i = 0; while (i < 3) { ++i; }").unwrap();

    let tags: Vec<OpTag> = program.ops().iter().map(|op| op.tag).collect();
    assert_eq!(
        tags,
        vec![OpTag::VarDecl, OpTag::Less, OpTag::Jmpz, OpTag::PreInc, OpTag::Jmp]
    );

    let mut echo = CollectStringEcho::new();
    let (result, tracer) = runner.execute_with_tracer(&program, &mut echo, CountingTracer::new());
    result.unwrap();
    // Predicate ran N+1 times, the body N times.
    assert_eq!(tracer.count_at(1), 4);
    assert_eq!(tracer.count_at(3), 3);
}

#[test]
fn import_is_idempotent() {
    assert_eq!(
        run("import std.math; import std.math; echo PI > 3.0; echo pow(2.0, 10.0);"),
        "1\n1024.0\n"
    );
}

#[test]
fn whole_package_import_loads_all_modules() {
    assert_eq!(run("import std; println(\"hi\"); echo sqrt(9.0);"), "hi\n3.0\n");
}

#[test]
fn array_methods_work_end_to_end() {
    let source = "Array<Int> xs;
        xs.push(7);
        xs.push(9);
        echo xs.size();
        echo xs.at(1);
        xs.set(0, 5);
        echo xs.toString();
        echo xs.isEmpty();
        echo xs.pop();
        xs.clear();
        echo xs.size();";
    assert_eq!(run(source), "2\n9\n[5, 9]\nfalse\n9\n0\n");
}

#[test]
fn string_concatenation_folds_and_runs() {
    assert_eq!(run("echo \"foo\" + \"bar\";"), "foobar\n");
    assert_eq!(run("String s = \"ab\"; echo s + \"c\";"), "abc\n");
}

#[test]
fn mixed_numeric_operands_promote_to_double() {
    assert_eq!(run("Int a = 1; echo a + 0.5;"), "1.5\n");
    assert_eq!(run("Int a = 2; echo a == 2.0;"), "1\n");
}

#[test]
fn increment_and_decrement_images() {
    assert_eq!(run("Int i = 5; echo i++; echo i;"), "5\n6\n");
    assert_eq!(run("Int i = 5; echo --i;"), "4\n");
    assert_eq!(run("Double d = 1.5; echo ++d;"), "2.5\n");
}

#[test]
fn assignment_overwrites_and_reuses_the_target_slot() {
    assert_eq!(run("Int a = 1; a = 2; echo a;"), "2\n");
    // A binary right-hand side reuses the target as its result slot.
    let mut runner = Runner::new();
    let program = runner.compile("Int a = 1; a = a + 10;").unwrap();
    let tags: Vec<OpTag> = program.ops().iter().map(|op| op.tag).collect();
    assert_eq!(tags, vec![OpTag::VarDecl, OpTag::Plus]);
    let plus = program.ops()[1];
    assert_eq!(plus.op1, plus.result);
}

#[test]
fn booleans_echo_and_compare() {
    assert_eq!(run("Bool b = true; echo b;"), "true\n");
    assert_eq!(run("echo true == false;"), "0\n");
}

#[test]
fn bitwise_operators_fold_and_run() {
    assert_eq!(run("echo 6 & 3; echo 6 | 3; echo 6 ^ 3;"), "2\n7\n5\n");
    assert_eq!(run("Int x = 6; echo x & 3;"), "2\n");
}

#[test]
fn core_module_is_preloaded() {
    assert_eq!(run("echo abs(-4); echo max(2, 9); echo min(2.5, 1.5); echo typeOf(1.5);"), "4\n9\n1.5\nDouble\n");
}

#[test]
fn nested_blocks_shadow_and_restore() {
    let source = "Int x = 1;
        {
            Int x = 2;
            echo x;
        }";
    assert_eq!(run(source), "2\n");
}

#[test]
fn unknown_variable_is_a_compile_error() {
    assert_eq!(compile_err("echo missing;"), CompileError::UnknownVariable("missing".to_owned()));
}

#[test]
fn const_type_mismatch_is_a_compile_error() {
    assert_eq!(compile_err("echo 1 + \"a\";"), CompileError::TypeMismatch);
}

#[test]
fn constant_division_by_zero_is_a_compile_error() {
    assert_eq!(compile_err("echo 1 / 0;"), CompileError::DivisionByZero);
    assert_eq!(compile_err("echo 1 % 0;"), CompileError::DivisionByZero);
}

#[test]
fn runtime_division_by_zero_is_fatal() {
    assert_eq!(
        runtime_err("Int a = 1; Int b = 0; echo a / b;"),
        RuntimeError::DivisionByZero
    );
}

#[test]
fn unknown_function_is_a_compile_error() {
    assert_eq!(
        compile_err("echo nope(1);"),
        CompileError::UnknownFunction("nope".to_owned())
    );
}

#[test]
fn unknown_method_is_a_compile_error() {
    assert_eq!(
        compile_err("Array<Int> xs; xs.shuffle();"),
        CompileError::UnknownMethod {
            ty: "Array<Int>".to_owned(),
            method: "shuffle".to_owned(),
        }
    );
}

#[test]
fn unknown_type_is_a_compile_error() {
    assert_eq!(compile_err("Widget w;"), CompileError::UnknownType("Widget".to_owned()));
}

#[test]
fn template_arity_error_is_readable() {
    let CompileError::TemplateArity(message) = compile_err("Array<Int, Int> xs;") else {
        panic!("expected a template arity error");
    };
    assert!(message.contains("'Array' requires 1 argument(s) and 2 were given"), "{message}");
}

#[test]
fn break_outside_loop_is_a_compile_error() {
    assert_eq!(compile_err("break;"), CompileError::BreakOutsideLoop);
}

#[test]
fn unknown_import_is_a_compile_error() {
    assert_eq!(compile_err("import nothere;"), CompileError::UnknownModule("nothere".to_owned()));
    assert_eq!(
        compile_err("import std.nothere;"),
        CompileError::UnknownModule("std.nothere".to_owned())
    );
}

#[test]
fn double_modulus_follows_ieee() {
    assert_eq!(run("echo 7.5 % 2.0;"), "1.5\n");
}

#[test]
fn unsupported_runtime_operands_are_fatal() {
    let err = runtime_err("String s = \"a\"; Int n = 1; echo s + n;");
    assert_eq!(
        err,
        RuntimeError::UnsupportedOperands {
            op: "+",
            lhs: "String",
            rhs: "Int",
        }
    );
}

#[test]
fn pop_from_empty_array_is_fatal() {
    assert_eq!(runtime_err("Array<Int> xs; echo xs.pop();"), RuntimeError::PopFromEmpty);
}

#[test]
fn teardown_after_a_full_program_drains_the_pool() {
    let source = "import std.math;
        Array<Int> xs;
        xs.push(1);
        xs.push(2);
        Int total = 0;
        Int i = 0;
        while (i < 2) {
            total = total + xs.at(i);
            ++i;
        }
        echo total;
        echo pow(2.0, 3.0);";
    let mut runner = Runner::new();
    let mut echo = CollectStringEcho::new();
    runner.run(source, &mut echo).unwrap();
    assert_eq!(echo.into_string(), "3\n8.0\n");

    runner.teardown();
    assert_eq!(runner.pool().live_count(), 0);
}
