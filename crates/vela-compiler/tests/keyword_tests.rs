//! Tests for keyword compatibility across the whole pipeline

use vela_compiler::{compile, CompileOptions, CompileOutput, ToggledWord, WarningKind};

fn ok(source: &str) -> CompileOutput {
    compile(source, "test.vela", &CompileOptions::default()).unwrap()
}

// ============================================================================
// Heuristic degradation
// ============================================================================

#[test]
fn test_identifier_usage_degrades_the_word() {
    // `switch` is assigned to, so the chunk treats it as a name
    ok("local switch = 1\nreturn switch");
}

#[test]
fn test_degradation_applies_to_the_whole_chunk() {
    // the early statement-position use degrades too, becoming a call
    ok("local f = nil\nf(switch)\nswitch = 1");
}

#[test]
fn test_undegraded_word_stays_a_keyword() {
    let out = ok("switch 1 do\ndefault:\nend");
    assert!(out.warnings.is_empty());
}

// ============================================================================
// Directives
// ============================================================================

#[test]
fn test_use_statement_pins_the_keyword() {
    ok("vela_use switch\nswitch 1 do\ndefault:\nend");
}

#[test]
fn test_pinned_keyword_cannot_be_assigned() {
    // the directive overrides the assignment heuristic, so the word is
    // no longer a valid assignment target
    let e = compile(
        "vela_use switch\nswitch = 1",
        "test.vela",
        &CompileOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(e, vela_compiler::CompileError::Syntax { .. }));
}

#[test]
fn test_use_statement_can_disable_a_word() {
    ok("vela_use switch = false\nlocal switch = 2\nreturn switch");
}

#[test]
fn test_annotation_form() {
    ok("-- @vela_use switch\nswitch 1 do\ndefault:\nend");
}

#[test]
fn test_version_bundle() {
    // 0.2.0 brings switch and continue but not class
    ok("vela_use \"0.2.0\"\nlocal class = 1\nswitch class do\ndefault:\nend");
}

// ============================================================================
// Host overrides
// ============================================================================

#[test]
fn test_host_override_disables_a_word() {
    let options = CompileOptions::default().with_keyword(ToggledWord::Switch, false);
    let out = compile("local switch = 3\nreturn switch", "test.vela", &options).unwrap();
    assert!(out.warnings.is_empty());
}

#[test]
fn test_chunk_directive_beats_host_override() {
    let options = CompileOptions::default().with_keyword(ToggledWord::Switch, false);
    compile(
        "vela_use switch\nswitch 1 do\ndefault:\nend",
        "test.vela",
        &options,
    )
    .unwrap();
}

// ============================================================================
// Prefixed aliases
// ============================================================================

#[test]
fn test_vela_prefixed_spelling_always_works() {
    // the bare word is degraded by assignment; the alias is unaffected
    ok("local switch = 1\nvela_switch switch do\ndefault:\nend");
}

// ============================================================================
// Opt-in words
// ============================================================================

#[test]
fn test_let_requires_a_directive() {
    // without one, `let` is a plain name
    ok("local let = 1\nreturn let");
}

#[test]
fn test_let_with_directive_declares_locals() {
    // One warning at the enabling directive, one at the usage
    let out = ok("-- @vela_use let\nlet x = 1\nreturn x");
    assert_eq!(
        out.warnings
            .iter()
            .filter(|w| w.kind == WarningKind::Deprecated)
            .count(),
        2
    );
}

#[test]
fn test_host_enabled_let_warns_at_the_usage_site() {
    let out = compile(
        "let x = 1\nreturn x",
        "test.vela",
        &CompileOptions::default().with_keyword(ToggledWord::Let, true),
    )
    .unwrap();
    let deprecated: Vec<_> = out
        .warnings
        .iter()
        .filter(|w| w.kind == WarningKind::Deprecated)
        .collect();
    assert_eq!(deprecated.len(), 1);
    assert!(deprecated[0].message.contains("'let' is deprecated"));
}

#[test]
fn test_const_with_directive_rejects_reassignment() {
    let e = compile(
        "-- @vela_use const\nconst x = 1\nx = 2",
        "test.vela",
        &CompileOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(e, vela_compiler::CompileError::Semantic { .. }));
    assert!(e.to_string().contains("const"));
}
