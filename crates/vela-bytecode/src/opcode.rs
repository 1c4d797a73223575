//! Instruction set for the Vela VM.
//!
//! Vela uses a register machine: every function activation owns a window of
//! value slots ("registers") addressed by a single byte. Instructions are
//! plain enum values with named operands rather than packed words; the
//! compiler and interpreter share this representation directly.
//!
//! Two conventions are load-bearing for the compiler:
//!
//! - **Conditional skip**: `Cmp`, `Test` and `TestSet` evaluate a condition
//!   and, when it does *not* match the `expect` flag, skip the immediately
//!   following instruction. The compiler always places a `Jump` there, so a
//!   taken condition transfers control and a failed one falls through.
//! - **Jump-list threading**: an unresolved `Jump` temporarily stores the
//!   program counter of the *next* unresolved jump in the same pending list
//!   (or [`NO_JUMP`] as the terminator) in its `offset` field. Lists are
//!   patched in place once the target is known.

use serde::{Deserialize, Serialize};

/// Terminator for jump lists threaded through [`Instruction::Jump`] offsets.
pub const NO_JUMP: i32 = -1;

/// Arithmetic and bitwise binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    /// Float division; always produces a float.
    Div,
    /// Floor division.
    IDiv,
    Mod,
    /// Exponentiation; always produces a float.
    Pow,
    BAnd,
    BOr,
    BXor,
    Shl,
    Shr,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    /// Arithmetic negation.
    Neg,
    /// Logical not; any value is accepted, result is a boolean.
    Not,
    /// Length of a string or table.
    Len,
    /// Bitwise not.
    BNot,
}

/// Comparison operators for [`Instruction::Cmp`].
///
/// Greater-than forms are expressed by swapping operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CmpOp {
    Eq,
    Lt,
    Le,
}

/// One VM instruction.
///
/// Register operands are `u8` slot indices. `u32` operands index the
/// enclosing prototype's constant pool (`key`, `index`) or child prototype
/// list (`proto`). Jump offsets are relative to the instruction *after* the
/// jump.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Instruction {
    // ===== Loads and moves =====
    /// `R[dst] = R[src]`
    Move { dst: u8, src: u8 },
    /// `R[dst..=dst+extra] = nil`
    LoadNil { dst: u8, extra: u8 },
    /// `R[dst] = value`
    LoadBool { dst: u8, value: bool },
    /// `R[dst] = false`, then skip the next instruction.
    ///
    /// Used when materializing a comparison into a register.
    LoadFalseSkip { dst: u8 },
    /// `R[dst] = value` (small integer immediate).
    LoadInt { dst: u8, value: i32 },
    /// `R[dst] = K[index]`
    LoadConst { dst: u8, index: u32 },

    // ===== Upvalues and globals =====
    /// `R[dst] = U[upval]`
    GetUpval { dst: u8, upval: u8 },
    /// `U[upval] = R[src]`
    SetUpval { src: u8, upval: u8 },
    /// `R[dst] = U[upval][K[key]]` — global reads go through the
    /// environment upvalue.
    GetUpvalField { dst: u8, upval: u8, key: u32 },
    /// `U[upval][K[key]] = R[src]`
    SetUpvalField { upval: u8, key: u32, src: u8 },

    // ===== Table access =====
    /// `R[dst] = R[table][R[key]]`
    GetIndex { dst: u8, table: u8, key: u8 },
    /// `R[dst] = R[table][K[key]]` (string key)
    GetField { dst: u8, table: u8, key: u32 },
    /// `R[dst] = R[table][key]` (integer key)
    GetIndexInt { dst: u8, table: u8, key: i32 },
    /// `R[table][R[key]] = R[src]`
    SetIndex { table: u8, key: u8, src: u8 },
    /// `R[table][K[key]] = R[src]` (string key)
    SetField { table: u8, key: u32, src: u8 },
    /// `R[table][key] = R[src]` (integer key)
    SetIndexInt { table: u8, key: i32, src: u8 },
    /// `R[dst] = {}` with size hints for the array and hash parts.
    NewTable { dst: u8, narray: u8, nhash: u8 },
    /// `R[table][start+i] = R[table+1+i]` for `i in 0..count`; `count == 0`
    /// stores everything up to the top of the active window.
    SetList { table: u8, count: u8, start: u32 },
    /// Method prologue: `R[base+1] = R[obj]; R[base] = R[obj][K[key]]`.
    SelfField { base: u8, obj: u8, key: u32 },
    /// `setmetatable(R[table], R[meta])` — emitted by class lowering.
    SetMeta { table: u8, meta: u8 },

    // ===== Operators =====
    /// `R[dst] = R[lhs] op R[rhs]`
    Arith { op: ArithOp, dst: u8, lhs: u8, rhs: u8 },
    /// `R[dst] = op R[src]`
    Unary { op: UnaryOp, dst: u8, src: u8 },
    /// `R[first] = R[first] .. R[first+1] .. ... .. R[first+count-1]`
    Concat { first: u8, count: u8 },

    // ===== Control flow =====
    /// `pc += offset`
    Jump { offset: i32 },
    /// If `(R[lhs] op R[rhs]) != expect`, skip the next instruction.
    Cmp { op: CmpOp, lhs: u8, rhs: u8, expect: bool },
    /// If `truthy(R[reg]) != expect`, skip the next instruction.
    Test { reg: u8, expect: bool },
    /// If `truthy(R[src]) == expect`, `R[dst] = R[src]` and the next
    /// instruction (a jump) executes; otherwise skip it.
    TestSet { dst: u8, src: u8, expect: bool },

    // ===== Calls and returns =====
    /// Call `R[base]` with `nargs - 1` arguments in the following registers;
    /// `nargs == 0` means "all values up to the top". Results are stored
    /// from `R[base]`; `nresults == 0` keeps all results, otherwise
    /// `nresults - 1` values are kept.
    Call { base: u8, nargs: u8, nresults: u8 },
    /// Return `count - 1` values starting at `R[base]`; `count == 0`
    /// returns everything up to the top.
    Return { base: u8, count: u8 },
    /// `R[dst..] = ...` — `count - 1` values wanted, `count == 0` for all.
    Vararg { dst: u8, count: u8 },

    // ===== Closures and scopes =====
    /// `R[dst] = closure(P[proto])`
    Closure { dst: u8, proto: u32 },
    /// Close every upvalue capturing a register `>= from`.
    Close { from: u8 },
    /// Mark `R[reg]` as to-be-closed for this block.
    Tbc { reg: u8 },

    // ===== Loops =====
    /// Numeric for prologue over `R[base]` (init), `R[base+1]` (limit),
    /// `R[base+2]` (step); jumps past the body if the loop runs zero times.
    /// `R[base+3]` is the user-visible control variable.
    ForPrep { base: u8, offset: i32 },
    /// Numeric for epilogue; steps the control variable and jumps back while
    /// the limit has not been passed.
    ForLoop { base: u8, offset: i32 },
    /// Generic for prologue; jumps forward to the matching [`Self::TForCall`].
    TForPrep { base: u8, offset: i32 },
    /// `R[base+3..] = R[base](R[base+1], R[base+2])`, keeping `nresults`
    /// values.
    TForCall { base: u8, nresults: u8 },
    /// If `R[base+3] != nil`, `R[base+2] = R[base+3]` and jump back.
    TForLoop { base: u8, offset: i32 },
}

impl Instruction {
    /// Whether this instruction is a conditional that skips its successor.
    pub fn is_conditional(&self) -> bool {
        matches!(
            self,
            Instruction::Cmp { .. } | Instruction::Test { .. } | Instruction::TestSet { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conditionals_are_flagged() {
        assert!(Instruction::Test { reg: 0, expect: true }.is_conditional());
        assert!(Instruction::Cmp { op: CmpOp::Eq, lhs: 0, rhs: 1, expect: true }.is_conditional());
        assert!(!Instruction::Jump { offset: 3 }.is_conditional());
    }
}
