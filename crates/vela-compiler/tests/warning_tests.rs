//! Tests for diagnostics, warning directives, and type hints

use vela_compiler::{compile, CompileError, CompileOptions, CompileOutput, WarningKind};

fn ok(source: &str) -> CompileOutput {
    compile(source, "test.vela", &CompileOptions::default()).unwrap()
}

fn err(source: &str) -> CompileError {
    compile(source, "test.vela", &CompileOptions::default()).unwrap_err()
}

fn count(out: &CompileOutput, kind: WarningKind) -> usize {
    out.warnings.iter().filter(|w| w.kind == kind).count()
}

// ============================================================================
// Shadowing
// ============================================================================

#[test]
fn test_local_shadow_warns() {
    let out = ok("local x = 1\ndo\n    local x = 2\nend");
    assert_eq!(count(&out, WarningKind::VarShadow), 1);
    let w = &out.warnings[0];
    assert!(w.message.contains("shadows local 'x'"));
    assert!(w.message.contains("line 1"));
}

#[test]
fn test_common_global_shadow_warns() {
    let out = ok("local ipairs = 1");
    assert_eq!(count(&out, WarningKind::GlobalShadow), 1);
}

#[test]
fn test_sibling_scopes_do_not_shadow() {
    let out = ok("do local x = 1 end\ndo local x = 2 end");
    assert_eq!(count(&out, WarningKind::VarShadow), 0);
}

// ============================================================================
// Warning directives
// ============================================================================

#[test]
fn test_directive_disables_from_its_position() {
    let out = ok(r#"
local a = 1
do local a = 2 end
-- @vela_warnings: disable-var-shadow
do local a = 3 end
"#);
    assert_eq!(count(&out, WarningKind::VarShadow), 1);
}

#[test]
fn test_disable_next_silences_one_line() {
    let out = ok(r#"
local a = 1
-- @vela_warnings: disable-next
do local a = 2 end
do local a = 3 end
"#);
    assert_eq!(count(&out, WarningKind::VarShadow), 1);
}

#[test]
fn test_error_directive_escalates() {
    let e = err(r#"
-- @vela_warnings: error-var-shadow
local a = 1
do local a = 2 end
"#);
    assert!(matches!(e, CompileError::EscalatedWarning { .. }));
}

#[test]
fn test_disable_all_silences_everything() {
    let out = ok(r#"
-- @vela_warnings: disable-all
local a = 1
do local a = 2 end
undeclared = 1
"#);
    assert!(out.warnings.is_empty());
}

#[test]
fn test_host_default_disables_a_category() {
    let options = CompileOptions::default()
        .with_warning(vela_compiler::WarningKind::VarShadow, vela_compiler::WarnState::Off);
    let out = compile("local a = 1\ndo local a = 2 end", "test.vela", &options).unwrap();
    assert!(out.warnings.is_empty());
}

#[test]
fn test_chunk_directive_overrides_host_default() {
    let options = CompileOptions::default()
        .with_warning(vela_compiler::WarningKind::VarShadow, vela_compiler::WarnState::Off);
    let out = compile(
        "-- @vela_warnings: enable-var-shadow\nlocal a = 1\ndo local a = 2 end",
        "test.vela",
        &options,
    )
    .unwrap();
    assert_eq!(count(&out, WarningKind::VarShadow), 1);
}

// ============================================================================
// Type hints
// ============================================================================

#[test]
fn test_hint_mismatch_warns() {
    let out = ok(r#"local x: int = "hi""#);
    assert_eq!(count(&out, WarningKind::TypeMismatch), 1);
}

#[test]
fn test_matching_hint_is_silent() {
    let out = ok("local x: int = 1\nlocal s: string = \"hi\"\nlocal n: number = 1.5");
    assert_eq!(count(&out, WarningKind::TypeMismatch), 0);
}

#[test]
fn test_nilable_hint_accepts_nil() {
    let out = ok("local x: ?int = nil");
    assert_eq!(count(&out, WarningKind::TypeMismatch), 0);
}

#[test]
fn test_union_hint() {
    let out = ok(r#"local x: int|string = "either""#);
    assert_eq!(count(&out, WarningKind::TypeMismatch), 0);
}

#[test]
fn test_observed_type_flows_through_a_local() {
    // `x` has no declared hint, but its initializer type is known
    let out = ok("local x = 5\nlocal y: string = x");
    assert_eq!(count(&out, WarningKind::TypeMismatch), 1);
}

#[test]
fn test_assignment_updates_the_observed_type() {
    let out = ok("local x = 5\nx = \"hi\"\nlocal y: string = x");
    assert_eq!(count(&out, WarningKind::TypeMismatch), 0);
}

#[test]
fn test_declared_hint_survives_an_untracked_assignment() {
    let out = ok("local f = nil\nlocal x: int = 1\nx = f()\nlocal y: string = x");
    assert_eq!(count(&out, WarningKind::TypeMismatch), 1);
}

#[test]
fn test_table_field_hint_flows_through_a_read() {
    let out = ok("local t = { n = 1, s = \"hi\" }\nlocal x: string = t.n");
    assert_eq!(count(&out, WarningKind::TypeMismatch), 1);
}

#[test]
fn test_matching_table_field_hint_is_silent() {
    let out = ok("local t = { n = 1 }\nlocal x: int = t.n\nlocal y: string = t.missing");
    assert_eq!(count(&out, WarningKind::TypeMismatch), 0);
}

#[test]
fn test_reassignment_clears_the_table_shape() {
    let out = ok("local t = { n = 1 }\nlocal u = nil\nt = u\nlocal x: string = t.n");
    assert_eq!(count(&out, WarningKind::TypeMismatch), 0);
}

#[test]
fn test_unknown_type_name_warns() {
    let out = ok("local x: intt = 1");
    assert_eq!(count(&out, WarningKind::UnknownType), 1);
}

#[test]
fn test_void_outside_return_position_is_an_error() {
    let e = err("local x: void = 1");
    assert!(e.to_string().contains("void"));
}

#[test]
fn test_void_return_hint_rejects_values() {
    let out = ok("local function f(): void\n    return 1\nend");
    assert_eq!(count(&out, WarningKind::TypeMismatch), 1);
}

#[test]
fn test_return_hint_mismatch_warns() {
    let out = ok("local function f(): int\n    return \"nope\"\nend");
    assert_eq!(count(&out, WarningKind::TypeMismatch), 1);
}

// ============================================================================
// Call-site diagnostics
// ============================================================================

#[test]
fn test_excessive_arguments_warns() {
    let out = ok("local function f(a, b) end\nf(1, 2, 3)");
    assert_eq!(count(&out, WarningKind::ExcessiveArguments), 1);
    assert!(out
        .warnings
        .iter()
        .any(|w| w.message.contains("3 arguments") && w.message.contains("taking 2")));
}

#[test]
fn test_vararg_callee_accepts_anything() {
    let out = ok("local function f(a, ...) end\nf(1, 2, 3, 4)");
    assert_eq!(count(&out, WarningKind::ExcessiveArguments), 0);
}

#[test]
fn test_discarded_return_warns() {
    let out = ok("local function f(): int return 1 end\nf()");
    assert_eq!(count(&out, WarningKind::DiscardedReturn), 1);
}

#[test]
fn test_used_return_is_silent() {
    let out = ok("local function f(): int return 1 end\nlocal r = f()");
    assert_eq!(count(&out, WarningKind::DiscardedReturn), 0);
}

// ============================================================================
// Flow diagnostics
// ============================================================================

#[test]
fn test_unreachable_code_warns_once() {
    let out = ok(r#"
while true do
    break
    undeclared = 1
    undeclared = 2
end
"#);
    assert_eq!(count(&out, WarningKind::UnreachableCode), 1);
}

#[test]
fn test_label_makes_code_reachable_again() {
    let out = ok(r#"
local n = 0
goto skip
::back::
n = n + 1
::skip::
if n < 1 then goto back end
"#);
    assert_eq!(count(&out, WarningKind::UnreachableCode), 0);
}

#[test]
fn test_undeclared_global_assignment_warns() {
    let out = ok("score = 10");
    assert_eq!(count(&out, WarningKind::ImplicitGlobal), 1);
}

#[test]
fn test_global_declaration_silences_the_warning() {
    let out = ok("global score\nscore = 10");
    assert_eq!(count(&out, WarningKind::ImplicitGlobal), 0);
}
