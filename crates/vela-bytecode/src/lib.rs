//! Bytecode definitions for the Vela virtual machine.
//!
//! This crate defines the register-machine instruction set and the compiled
//! function prototype format produced by the Vela compiler and consumed by
//! the interpreter. It contains no compilation logic of its own.

pub mod opcode;
pub mod proto;

pub use opcode::{ArithOp, CmpOp, Instruction, UnaryOp, NO_JUMP};
pub use proto::{Constant, LocalDebug, Proto, SourcePos, UpvalDesc};

/// Hard limit on registers addressable by one function.
///
/// Register operands are a single byte; the range above this ceiling is
/// reserved for the interpreter's internal use.
pub const MAX_REGISTERS: u8 = 200;
