//! Tests for classes, enums, destructuring, and named arguments

use vela_bytecode::{Constant, Instruction};
use vela_compiler::{compile, CompileError, CompileOptions, CompileOutput};

fn ok(source: &str) -> CompileOutput {
    compile(source, "test.vela", &CompileOptions::default()).unwrap()
}

fn err(source: &str) -> CompileError {
    compile(source, "test.vela", &CompileOptions::default()).unwrap_err()
}

fn str_constants(out: &CompileOutput) -> Vec<&str> {
    out.proto
        .constants
        .iter()
        .filter_map(|c| match c {
            Constant::Str(s) => Some(s.as_str()),
            _ => None,
        })
        .collect()
}

// ============================================================================
// Classes
// ============================================================================

#[test]
fn test_class_builds_a_table() {
    let out = ok(r#"
local class Point do
    x = 0
    y = 0
    function magnitude()
        return self.x * self.x + self.y * self.y
    end
end
"#);
    assert!(str_constants(&out).contains(&"magnitude"));
    assert!(out
        .proto
        .code
        .iter()
        .any(|i| matches!(i, Instruction::NewTable { .. })));
}

#[test]
fn test_static_methods_have_no_self() {
    let out = ok(r#"
local class Math do
    static function double(n)
        return n * 2
    end
end
"#);
    assert_eq!(out.proto.protos.len(), 1);
    assert_eq!(out.proto.protos[0].num_params, 1);
}

#[test]
fn test_private_members_are_mangled() {
    let out = ok(r#"
local class Counter do
    private count = 0
    function bump()
        self.count = self.count + 1
    end
end
"#);
    let names = str_constants(&out);
    assert!(names.iter().any(|s| s.starts_with("__priv")));
    assert!(!names.contains(&"count"));
}

#[test]
fn test_mangling_is_per_class() {
    let out = ok(r#"
local class A do
    private secret = 1
end
local class B do
    private secret = 2
end
"#);
    let names = str_constants(&out);
    let mangled: Vec<&&str> = names.iter().filter(|s| s.starts_with("__priv")).collect();
    assert_eq!(mangled.len(), 2);
    assert_ne!(mangled[0], mangled[1]);
}

#[test]
fn test_extends_wires_the_parent() {
    let out = ok(r#"
local class Animal do
    function speak() return "..." end
end
local class Dog extends Animal do
    function speak() return "woof" end
end
"#);
    // the synthesized helper links child to parent
    assert!(out
        .proto
        .protos
        .iter()
        .any(|p| p.constants.contains(&Constant::Str("__parent".to_owned()))));
}

#[test]
fn test_parent_resolves_inside_extending_class() {
    ok(r#"
local class Base do
    function greet() return "hi" end
end
local class Child extends Base do
    function greet()
        return parent.greet(self)
    end
end
"#);
}

#[test]
fn test_parent_without_extends_is_an_error() {
    let e = err(r#"
local class Lone do
    function m()
        return parent.m(self)
    end
end
"#);
    assert!(e.to_string().contains("parent"));
}

// ============================================================================
// Enums
// ============================================================================

#[test]
fn test_plain_enum_members_fold_to_constants() {
    let out = ok("enum do RED, GREEN, BLUE end\nreturn GREEN");
    // members never occupy registers; GREEN folds to its value
    assert!(out
        .proto
        .code
        .iter()
        .any(|i| matches!(i, Instruction::LoadInt { value: 2, .. })));
}

#[test]
fn test_enum_explicit_values_resume_counting() {
    let out = ok("enum do A = 10, B, C = 1, D end\nreturn B, D");
    assert!(out
        .proto
        .code
        .iter()
        .any(|i| matches!(i, Instruction::LoadInt { value: 11, .. })));
    assert!(out
        .proto
        .code
        .iter()
        .any(|i| matches!(i, Instruction::LoadInt { value: 2, .. })));
}

#[test]
fn test_named_enum_builds_a_table() {
    let out = ok("enum Color do RED, GREEN end\nreturn Color");
    let names = str_constants(&out);
    assert!(names.contains(&"RED"));
    assert!(names.contains(&"GREEN"));
}

#[test]
fn test_duplicate_enum_member_is_an_error() {
    let e = err("enum do A, A end");
    assert!(e.to_string().contains("duplicate"));
}

#[test]
fn test_non_constant_enum_value_is_an_error() {
    let e = err("local n = 1\nenum do A = n end");
    assert!(matches!(e, CompileError::Syntax { .. }));
}

// ============================================================================
// Destructuring
// ============================================================================

#[test]
fn test_keyed_destructuring_reads_fields() {
    let out = ok("local p = nil\nlocal {x, y} = p\nreturn x + y");
    let gets = out
        .proto
        .code
        .iter()
        .filter(|i| matches!(i, Instruction::GetField { .. }))
        .count();
    assert_eq!(gets, 2);
}

#[test]
fn test_keyed_destructuring_with_renames() {
    let out = ok("local p = nil\nlocal {px = x} = p");
    assert!(str_constants(&out).contains(&"x"));
}

#[test]
fn test_positional_destructuring_reads_indices() {
    let out = ok("local t = nil\nlocal [a, b, c] = t");
    let gets = out
        .proto
        .code
        .iter()
        .filter(|i| matches!(i, Instruction::GetIndexInt { .. }))
        .count();
    assert_eq!(gets, 3);
}

// ============================================================================
// Named arguments
// ============================================================================

#[test]
fn test_named_arguments_bind_by_parameter_name() {
    ok(r#"
local function make(width, height)
    return width * height
end
make(height = 3, width = 4)
"#);
}

#[test]
fn test_mixed_positional_then_named() {
    ok(r#"
local function make(width, height, depth)
    return width * height * depth
end
make(2, depth = 5, height = 3)
"#);
}

#[test]
fn test_unknown_named_argument_is_an_error() {
    let e = err(r#"
local function make(width, height)
    return width
end
make(depth = 9)
"#);
    assert!(e.to_string().contains("no parameter"));
}
