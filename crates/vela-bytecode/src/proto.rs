//! Compiled function prototypes.
//!
//! A [`Proto`] is the immutable, not-yet-instantiated form of one function:
//! its instructions, constant pool, nested child prototypes, upvalue
//! descriptors, and debug tables. The compiler produces one top-level
//! prototype per compilation unit, with one child per function literal.

use crate::opcode::Instruction;
use serde::{Deserialize, Serialize};

/// A constant-pool entry.
///
/// Booleans and nil have dedicated load instructions and never enter the
/// pool. Floats compare by bit pattern so the pool can deduplicate them
/// (and so `0.0` and `-0.0` stay distinct constants).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Constant {
    Int(i64),
    Float(f64),
    Str(String),
}

impl PartialEq for Constant {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Constant::Int(a), Constant::Int(b)) => a == b,
            (Constant::Float(a), Constant::Float(b)) => a.to_bits() == b.to_bits(),
            (Constant::Str(a), Constant::Str(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Constant {}

impl std::hash::Hash for Constant {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        match self {
            Constant::Int(i) => {
                state.write_u8(0);
                i.hash(state);
            }
            Constant::Float(f) => {
                state.write_u8(1);
                f.to_bits().hash(state);
            }
            Constant::Str(s) => {
                state.write_u8(2);
                s.hash(state);
            }
        }
    }
}

impl std::fmt::Display for Constant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Constant::Int(i) => write!(f, "{i}"),
            Constant::Float(n) => write!(f, "{n:?}"),
            Constant::Str(s) => write!(f, "{s:?}"),
        }
    }
}

/// Where a captured upvalue lives in the enclosing function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpvalDesc {
    /// Variable name, for debug output.
    pub name: String,
    /// True if the value is captured from the parent's register window,
    /// false if it is forwarded from the parent's own upvalue list.
    pub in_stack: bool,
    /// Register index or parent upvalue index, per `in_stack`.
    pub index: u8,
}

/// Source position of one emitted instruction (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePos {
    pub line: u32,
    pub column: u32,
}

/// Debug record for one local variable.
///
/// The record persists after the variable's scope ends; `end_pc` is the
/// first instruction where the variable is no longer live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalDebug {
    pub name: String,
    pub start_pc: u32,
    pub end_pc: u32,
}

/// A compiled function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proto {
    /// Chunk name the function was compiled from, for diagnostics.
    pub chunk_name: String,
    /// Line of the `function` token, 0 for the top-level function.
    pub line_defined: u32,
    /// Line of the closing `end`, 0 for the top-level function.
    pub last_line_defined: u32,
    /// Number of declared parameters (excluding varargs).
    pub num_params: u8,
    pub is_vararg: bool,
    /// High-water mark of registers used by the function body.
    pub max_stack_size: u8,
    pub code: Vec<Instruction>,
    pub constants: Vec<Constant>,
    /// Child prototypes, one per nested function literal.
    pub protos: Vec<Proto>,
    pub upvalues: Vec<UpvalDesc>,
    /// Parallel to `code`: source position of each instruction.
    pub positions: Vec<SourcePos>,
    pub locals: Vec<LocalDebug>,
}

impl Proto {
    pub fn new(chunk_name: impl Into<String>) -> Self {
        Proto {
            chunk_name: chunk_name.into(),
            line_defined: 0,
            last_line_defined: 0,
            num_params: 0,
            is_vararg: false,
            max_stack_size: 2,
            code: Vec::new(),
            constants: Vec::new(),
            protos: Vec::new(),
            upvalues: Vec::new(),
            positions: Vec::new(),
            locals: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_constants_compare_by_bits() {
        assert_eq!(Constant::Float(1.5), Constant::Float(1.5));
        assert_ne!(Constant::Float(0.0), Constant::Float(-0.0));
        assert_ne!(Constant::Int(1), Constant::Float(1.0));
    }

    #[test]
    fn nan_constants_dedupe() {
        let a = Constant::Float(f64::NAN);
        let b = Constant::Float(f64::NAN);
        assert_eq!(a, b);
    }
}
