//! Tests for statement compilation and control flow

use vela_bytecode::Instruction;
use vela_compiler::{compile, CompileError, CompileOptions, CompileOutput};

fn ok(source: &str) -> CompileOutput {
    compile(source, "test.vela", &CompileOptions::default()).unwrap()
}

fn err(source: &str) -> CompileError {
    compile(source, "test.vela", &CompileOptions::default()).unwrap_err()
}

// ============================================================================
// Conditionals and loops
// ============================================================================

#[test]
fn test_if_elseif_else() {
    let out = ok(r#"
local x = 3
local r
if x < 2 then
    r = "small"
elseif x < 10 then
    r = "medium"
else
    r = "large"
end
return r
"#);
    assert!(out
        .proto
        .code
        .iter()
        .any(|i| matches!(i, Instruction::Cmp { .. })));
}

#[test]
fn test_while_loop_jumps_back() {
    let out = ok("local n = 0\nwhile n < 10 do n = n + 1 end");
    assert!(out
        .proto
        .code
        .iter()
        .any(|i| matches!(i, Instruction::Jump { offset } if *offset < 0)));
}

#[test]
fn test_repeat_until() {
    let out = ok("local n = 0\nrepeat n = n + 1 until n == 5");
    assert!(out
        .proto
        .code
        .iter()
        .any(|i| matches!(i, Instruction::Cmp { .. })));
}

#[test]
fn test_numeric_for() {
    let out = ok("local sum = 0\nfor i = 1, 10, 2 do sum = sum + i end");
    assert!(out
        .proto
        .code
        .iter()
        .any(|i| matches!(i, Instruction::ForPrep { .. })));
    assert!(out
        .proto
        .code
        .iter()
        .any(|i| matches!(i, Instruction::ForLoop { .. })));
}

#[test]
fn test_generic_for() {
    let out = ok("for k, v in pairs do local _ = k end");
    assert!(out
        .proto
        .code
        .iter()
        .any(|i| matches!(i, Instruction::TForCall { nresults: 2, .. })));
    assert!(out
        .proto
        .code
        .iter()
        .any(|i| matches!(i, Instruction::TForLoop { .. })));
}

// ============================================================================
// break and continue
// ============================================================================

#[test]
fn test_break_and_continue_compile() {
    ok(r#"
for i = 1, 10 do
    if i == 3 then continue end
    if i == 7 then break end
end
"#);
}

#[test]
fn test_multi_level_break() {
    ok(r#"
while true do
    while true do
        break 2
    end
end
"#);
}

#[test]
fn test_break_depth_beyond_nesting_is_an_error() {
    let e = err("while true do break 2 end");
    assert!(matches!(e, CompileError::Semantic { .. }));
    assert!(e.to_string().contains("1 enclosing loop"));
}

#[test]
fn test_break_outside_loop_is_an_error() {
    assert!(matches!(err("break"), CompileError::Semantic { .. }));
}

#[test]
fn test_continue_targets_the_loop_not_the_switch() {
    // continue inside a switch must reach the enclosing loop
    ok(r#"
for i = 1, 5 do
    switch i do
    case 2:
        continue
    default:
    end
end
"#);
}

// ============================================================================
// goto and labels
// ============================================================================

#[test]
fn test_forward_goto() {
    ok("goto done\nlocal unused = 0\n::done::");
}

#[test]
fn test_backward_goto() {
    ok("local n = 0\n::top::\nn = n + 1\nif n < 3 then goto top end");
}

#[test]
fn test_goto_into_local_scope_is_an_error() {
    let e = err("goto skip\nlocal x = 1\n::skip::\nreturn x");
    assert!(matches!(e, CompileError::Semantic { .. }));
    assert!(e.to_string().contains("into the scope of local"));
}

#[test]
fn test_goto_undefined_label_is_an_error() {
    assert!(matches!(err("goto nowhere"), CompileError::Semantic { .. }));
}

// ============================================================================
// switch
// ============================================================================

#[test]
fn test_switch_compiles_to_equality_tests() {
    let out = ok(r#"
local x = 2
local r
switch x do
case 1:
    r = "one"
case 2, 3:
    r = "few"
default:
    r = "many"
end
return r
"#);
    let cmps = out
        .proto
        .code
        .iter()
        .filter(|i| matches!(i, Instruction::Cmp { .. }))
        .count();
    // one test per case value
    assert_eq!(cmps, 3);
}

#[test]
fn test_switch_without_default() {
    ok("local x = 1\nswitch x do\ncase 1:\n    x = 2\nend");
}

#[test]
fn test_case_identical_to_default_is_pruned() {
    let out = ok(r#"
local x = 5
local r
switch x do
case 1:
    r = 0
default:
    r = 0
end
return r
"#);
    // the case became a fallthrough to default, leaving no test behind
    let cmps = out
        .proto
        .code
        .iter()
        .filter(|i| matches!(i, Instruction::Cmp { .. }))
        .count();
    assert_eq!(cmps, 0);
}

#[test]
fn test_duplicate_default_is_an_error() {
    let e = err("switch 1 do\ndefault:\ndefault:\nend");
    assert!(e.to_string().contains("default"));
}

// ============================================================================
// Assignment forms
// ============================================================================

#[test]
fn test_multiple_assignment() {
    ok("local a, b, c = 1, 2\na, b = b, a\nreturn a + b + (c or 0)")
        .warnings
        .iter()
        .for_each(|w| panic!("unexpected warning: {}", w.message));
}

#[test]
fn test_compound_assignment_on_locals_and_fields() {
    let out = ok(r#"
local n = 1
n += 2
n *= 3
local t = { count = 0 }
t.count += 1
t["count"] //= 2
"#);
    assert!(out
        .proto
        .code
        .iter()
        .any(|i| matches!(i, Instruction::Arith { .. })));
}

#[test]
fn test_assignment_to_const_is_an_error() {
    let e = err("local x <const> = 5\nx = 6");
    assert!(matches!(e, CompileError::Semantic { .. }));
    assert!(e.to_string().contains("const"));
}

#[test]
fn test_second_close_in_one_list_is_an_error() {
    let e = err("local a <close>, b <close> = nil, nil");
    assert!(matches!(e, CompileError::Semantic { .. }));
    assert!(e.to_string().contains("to-be-closed"));
}

#[test]
fn test_close_attribute_emits_tbc() {
    let out = ok("local h <close> = nil");
    assert!(out
        .proto
        .code
        .iter()
        .any(|i| matches!(i, Instruction::Tbc { .. })));
}
