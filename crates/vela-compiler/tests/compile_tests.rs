//! End-to-end tests for the compile pipeline

use vela_bytecode::{Constant, Instruction};
use vela_compiler::{compile, CompileError, CompileOptions, CompileOutput};

fn ok(source: &str) -> CompileOutput {
    compile(source, "test.vela", &CompileOptions::default()).unwrap()
}

fn err(source: &str) -> CompileError {
    compile(source, "test.vela", &CompileOptions::default()).unwrap_err()
}

// ============================================================================
// Basics
// ============================================================================

#[test]
fn test_empty_chunk_compiles() {
    let out = ok("");
    assert!(out.proto.is_vararg);
    // close_func appends the implicit return
    assert!(matches!(
        out.proto.code.last(),
        Some(Instruction::Return { .. })
    ));
}

#[test]
fn test_simple_chunk_compiles() {
    let out = ok("local x = 1\nreturn x + 2");
    assert!(out.proto.code.len() >= 3);
    assert_eq!(out.proto.chunk_name, "test.vela");
}

#[test]
fn test_compilation_is_deterministic() {
    let source = r#"
local counter = 0
local function step(by)
    counter = counter + by
    return counter
end
for i = 1, 10 do
    step(i)
end
switch counter do
case 55:
    return "triangular"
default:
    return counter
end
"#;
    let a = ok(source);
    let b = ok(source);
    assert_eq!(a.proto, b.proto);
}

#[test]
fn test_constants_are_deduplicated() {
    let out = ok(r#"local a = "hi" local b = "hi" local c = "hi""#);
    let hits = out
        .proto
        .constants
        .iter()
        .filter(|c| **c == Constant::Str("hi".to_owned()))
        .count();
    assert_eq!(hits, 1);
}

#[test]
fn test_proto_round_trips_through_json() {
    let out = ok("local x = 1.5\nlocal s = \"hi\"\nreturn x, s");
    let json = serde_json::to_string(&out.proto).unwrap();
    let back: vela_compiler::Proto = serde_json::from_str(&json).unwrap();
    assert_eq!(out.proto, back);
}

#[test]
fn test_vararg_function() {
    let out = ok("local function f(...) return ... end");
    assert_eq!(out.proto.protos.len(), 1);
    assert!(out.proto.protos[0].is_vararg);
}

#[test]
fn test_method_call_uses_self_field() {
    let out = ok("local t = {}\nfunction t:m() return self end\nt:m()");
    assert!(out
        .proto
        .code
        .iter()
        .any(|i| matches!(i, Instruction::SelfField { .. })));
}

// ============================================================================
// Register management
// ============================================================================

#[test]
fn test_registers_are_reclaimed_between_statements() {
    let mut source = String::from("local x = 0\n");
    for _ in 0..60 {
        source.push_str("x = x + 1 * 2 + 3\n");
    }
    let out = ok(&source);
    assert!(
        out.proto.max_stack_size < 10,
        "stack grew to {}",
        out.proto.max_stack_size
    );
}

#[test]
fn test_too_many_registers_is_an_error() {
    let args: Vec<String> = (0..260).map(|i| i.to_string()).collect();
    let source = format!("local f = nil\nf({})", args.join(", "));
    assert!(matches!(err(&source), CompileError::TooComplex { .. }));
}

#[test]
fn test_deep_nesting_is_an_error() {
    let source = format!("return {}1{}", "(".repeat(300), ")".repeat(300));
    assert!(matches!(err(&source), CompileError::TooManyLevels { .. }));
}

// ============================================================================
// Scan errors
// ============================================================================

#[test]
fn test_unterminated_string_is_a_lexical_error() {
    assert!(matches!(
        err("local s = \"oops"),
        CompileError::Lexical { .. }
    ));
}

#[test]
fn test_malformed_chunk_is_a_syntax_error() {
    assert!(matches!(
        err("local = 1"),
        CompileError::Syntax { .. }
    ));
}

// ============================================================================
// Exports
// ============================================================================

#[test]
fn test_export_builds_a_module_table() {
    let out = ok("export local answer = 42\nexport local function helper() end");
    assert!(out
        .proto
        .constants
        .contains(&Constant::Str("answer".to_owned())));
    assert!(out
        .proto
        .constants
        .contains(&Constant::Str("helper".to_owned())));
    // the chunk now returns the module table
    assert!(out
        .proto
        .code
        .iter()
        .any(|i| matches!(i, Instruction::NewTable { .. })));
}

#[test]
fn test_export_inside_function_is_rejected() {
    let e = err("local function f()\n  export local y = 1\nend");
    assert!(e.to_string().contains("top level"));
}
