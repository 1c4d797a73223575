//! Code generation for one function under compilation.
//!
//! [`FuncState`] owns the [`Proto`] being built plus everything the parser
//! needs to emit into it: the register high-water mark, active variables,
//! pending jump lists, and the constant interner. Expressions move through
//! [`ExpDesc`], a small descriptor that delays materialization so values
//! only hit registers when something demands them.
//!
//! Unresolved jumps are threaded through their own `offset` fields into
//! singly linked lists terminated by [`NO_JUMP`], and patched in place once
//! the target position is known.

use crate::error::{CompileError, CompileResult};
use crate::token::Span;
use crate::typehint::TypeHint;
use rustc_hash::FxHashMap;
use vela_bytecode::{
    ArithOp, CmpOp, Constant, Instruction, LocalDebug, Proto, SourcePos, UnaryOp, MAX_REGISTERS,
    NO_JUMP,
};

/// Declared call shape of a function value, used for named arguments and
/// the `excessive-arguments` / `discarded-return` warnings.
#[derive(Debug, Clone, PartialEq)]
pub struct FuncShape {
    pub params: Vec<String>,
    pub is_vararg: bool,
    pub ret: TypeHint,
}

/// Value of a compile-time-constant local.
#[derive(Debug, Clone, PartialEq)]
pub enum CtcValue {
    Nil,
    True,
    False,
    Int(i64),
    Float(f64),
    Str(String),
}

/// Kind of a declared variable.
#[derive(Debug, Clone, PartialEq)]
pub enum VarKind {
    Regular,
    /// `<const>`: single assignment at declaration.
    Const,
    /// `<close>`: to-be-closed, implies const.
    Close,
    /// `<const>` with a literal initializer; never occupies a register.
    Ctc(CtcValue),
}

/// An entry in the active-variable list.
#[derive(Debug, Clone)]
pub struct VarDesc {
    pub name: String,
    pub kind: VarKind,
    /// Register holding the variable, meaningless for `Ctc`.
    pub reg: u8,
    pub hint: TypeHint,
    /// Type last seen flowing into the variable, starting from the
    /// declared hint. Assignments overwrite it; reads report it.
    pub observed: TypeHint,
    pub line: u32,
    /// Known function shape when the variable holds a function literal.
    pub shape: Option<FuncShape>,
    /// Enumerator table for named-enum locals: member name to value.
    pub enum_members: Option<FxHashMap<String, i64>>,
    /// Known field hints when the variable holds a table constructed
    /// with named fields.
    pub field_hints: Option<FxHashMap<String, TypeHint>>,
    /// Index of this variable's record in `proto.locals`.
    debug_idx: usize,
}

impl VarDesc {
    pub fn in_register(&self) -> bool {
        !matches!(self.kind, VarKind::Ctc(_))
    }

    pub fn read_only(&self) -> bool {
        !matches!(self.kind, VarKind::Regular)
    }
}

/// What a block means for `break` and `continue` resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Plain,
    /// `while`, `repeat`, `for`: target of both `break` and `continue`.
    Loop,
    /// `switch`: target of `break` only.
    Switch,
}

/// Per-block compilation state.
#[derive(Debug, Clone)]
pub struct BlockCnt {
    pub first_var: usize,
    pub first_label: usize,
    pub first_goto: usize,
    pub kind: BlockKind,
    /// A local declared directly in this block has been captured.
    pub upval: bool,
    /// `upval` of this block or of any block nested in it.
    pub upval_inside: bool,
    pub inside_tbc: bool,
    pub break_list: i32,
    pub continue_list: i32,
}

/// A declared `::label::`.
#[derive(Debug, Clone)]
pub struct LabelDesc {
    pub name: String,
    pub pc: i32,
    pub line: u32,
    pub nactvar: usize,
}

/// A pending `goto` (forward reference).
#[derive(Debug, Clone)]
pub struct GotoDesc {
    pub name: String,
    /// pc of the emitted jump.
    pub pc: i32,
    pub span: Span,
    pub nactvar: usize,
    /// The jump leaves a block with captured locals; the resolving label
    /// must be preceded by a `Close`.
    pub close: bool,
}

/// Compilation state of one function.
pub struct FuncState {
    pub proto: Proto,
    constants: FxHashMap<Constant, u32>,
    pub free_reg: u8,
    pub vars: Vec<VarDesc>,
    /// Number of entries of `vars` already in scope.
    pub nactvar: usize,
    pub blocks: Vec<BlockCnt>,
    pub labels: Vec<LabelDesc>,
    pub gotos: Vec<GotoDesc>,
    /// pc of the last jump target, to keep jump-to-jump chains honest.
    last_target: i32,
    /// Source position attached to instructions as they are emitted.
    pub pos: SourcePos,
    /// Parallel to `proto.upvalues`: capture of a read-only variable.
    pub readonly_upvals: Vec<bool>,
    /// Return type hint of this function, when declared.
    pub ret_hint: TypeHint,
    /// Child index of the synthesized inheritance helper, once built.
    pub extends_helper: Option<u32>,
}

impl FuncState {
    pub fn new(proto: Proto) -> FuncState {
        FuncState {
            proto,
            constants: FxHashMap::default(),
            free_reg: 0,
            vars: Vec::new(),
            nactvar: 0,
            blocks: Vec::new(),
            labels: Vec::new(),
            gotos: Vec::new(),
            last_target: NO_JUMP,
            pos: SourcePos { line: 0, column: 0 },
            readonly_upvals: Vec::new(),
            ret_hint: TypeHint::default(),
            extends_helper: None,
        }
    }

    pub fn pc(&self) -> usize {
        self.proto.code.len()
    }

    // ===== Registers =====

    /// First register above the active variables up to `nvar`.
    pub fn reg_level(&self, nvar: usize) -> u8 {
        let mut level = 0u8;
        for var in &self.vars[..nvar] {
            if var.in_register() {
                level = var.reg + 1;
            }
        }
        level
    }

    pub fn active_reg_level(&self) -> u8 {
        self.reg_level(self.nactvar)
    }

    pub fn reserve_regs(&mut self, n: u8) -> CompileResult<()> {
        let needed = self.free_reg as u16 + n as u16;
        if needed > MAX_REGISTERS as u16 {
            return Err(CompileError::TooComplex {
                line: self.pos.line,
            });
        }
        self.free_reg += n;
        if self.free_reg > self.proto.max_stack_size {
            self.proto.max_stack_size = self.free_reg;
        }
        Ok(())
    }

    pub fn free_register(&mut self, reg: u8) {
        if reg >= self.active_reg_level() {
            self.free_reg -= 1;
            debug_assert_eq!(reg, self.free_reg);
        }
    }

    pub fn free_exp(&mut self, e: &ExpDesc) {
        if let ExpKind::NonReloc { reg } = e.kind {
            self.free_register(reg);
        }
    }

    /// Frees both expressions' registers, higher one first.
    pub fn free_exps(&mut self, e1: &ExpDesc, e2: &ExpDesc) {
        let r1 = match e1.kind {
            ExpKind::NonReloc { reg } => Some(reg),
            _ => None,
        };
        let r2 = match e2.kind {
            ExpKind::NonReloc { reg } => Some(reg),
            _ => None,
        };
        match (r1, r2) {
            (Some(a), Some(b)) if a > b => {
                self.free_register(a);
                self.free_register(b);
            }
            (Some(a), Some(b)) => {
                self.free_register(b);
                self.free_register(a);
            }
            (Some(a), None) => self.free_register(a),
            (None, Some(b)) => self.free_register(b),
            (None, None) => {}
        }
    }

    // ===== Variables =====

    /// Registers a variable; it stays out of scope until
    /// [`adjust_local_vars`](Self::adjust_local_vars) activates it.
    pub fn new_local(&mut self, name: String, kind: VarKind, hint: TypeHint, line: u32) -> usize {
        self.vars.push(VarDesc {
            name,
            kind,
            reg: 0,
            hint,
            observed: hint,
            line,
            shape: None,
            enum_members: None,
            field_hints: None,
            debug_idx: usize::MAX,
        });
        self.vars.len() - 1
    }

    /// Brings the last `n` registered variables into scope, assigning
    /// their registers and opening their debug records.
    pub fn adjust_local_vars(&mut self, n: usize) {
        let pc = self.pc() as u32;
        let first = self.nactvar;
        self.nactvar += n;
        let mut reg = self.reg_level(first);
        for idx in first..self.nactvar {
            let in_register = self.vars[idx].in_register();
            if in_register {
                self.vars[idx].reg = reg;
                reg += 1;
                self.vars[idx].debug_idx = self.proto.locals.len();
                self.proto.locals.push(LocalDebug {
                    name: self.vars[idx].name.clone(),
                    start_pc: pc,
                    end_pc: 0,
                });
            }
        }
    }

    /// Removes every variable above `level`, closing debug records.
    pub fn remove_vars(&mut self, level: usize) {
        let pc = self.pc() as u32;
        while self.nactvar > level {
            self.nactvar -= 1;
            let var = self.vars.pop();
            if let Some(var) = var {
                if var.in_register() && var.debug_idx != usize::MAX {
                    self.proto.locals[var.debug_idx].end_pc = pc;
                }
            }
        }
        self.vars.truncate(self.nactvar);
    }

    /// Finds an in-scope variable by name, innermost first.
    pub fn search_var(&self, name: &str) -> Option<usize> {
        self.vars[..self.nactvar]
            .iter()
            .rposition(|v| v.name == name)
    }

    // ===== Constants =====

    pub fn const_index(&mut self, c: Constant) -> u32 {
        if let Some(&idx) = self.constants.get(&c) {
            return idx;
        }
        let idx = self.proto.constants.len() as u32;
        self.proto.constants.push(c.clone());
        self.constants.insert(c, idx);
        idx
    }

    pub fn string_const(&mut self, s: &str) -> u32 {
        self.const_index(Constant::Str(s.to_owned()))
    }

    // ===== Emission =====

    pub fn emit(&mut self, i: Instruction) -> usize {
        self.proto.code.push(i);
        self.proto.positions.push(self.pos);
        self.proto.code.len() - 1
    }

    fn remove_last(&mut self) {
        self.proto.code.pop();
        self.proto.positions.pop();
    }

    /// Truncates the instruction buffer back to `pc`. Used when a parsed
    /// fragment turns out not to be needed (pruned switch cases).
    pub fn rewind_to(&mut self, pc: usize) {
        self.proto.code.truncate(pc);
        self.proto.positions.truncate(pc);
        if self.last_target > pc as i32 {
            self.last_target = NO_JUMP;
        }
    }

    /// Emits `LoadNil`, merging into a previous adjacent one.
    pub fn load_nil(&mut self, from: u8, n: u8) {
        if self.pc() as i32 > self.last_target {
            if let Some(Instruction::LoadNil { dst, extra }) = self.proto.code.last_mut() {
                let prev_from = *dst;
                let prev_to = *dst + *extra;
                if prev_from <= from && from <= prev_to + 1 {
                    let to = (from + n - 1).max(prev_to);
                    *extra = to - prev_from;
                    return;
                }
            }
        }
        self.emit(Instruction::LoadNil {
            dst: from,
            extra: n - 1,
        });
    }

    // ===== Jumps =====

    pub fn emit_jump(&mut self) -> i32 {
        self.emit(Instruction::Jump { offset: NO_JUMP }) as i32
    }

    /// Marks the current position as a jump target.
    pub fn get_label(&mut self) -> i32 {
        self.last_target = self.pc() as i32;
        self.last_target
    }

    fn jump_offset(&self, pc: usize) -> i32 {
        match self.proto.code[pc] {
            Instruction::Jump { offset } => offset,
            _ => unreachable!("jump list node is not a jump"),
        }
    }

    /// Next node in the jump list starting at `pc`.
    fn get_jump(&self, pc: usize) -> i32 {
        let offset = self.jump_offset(pc);
        if offset == NO_JUMP {
            NO_JUMP
        } else {
            pc as i32 + 1 + offset
        }
    }

    fn fix_jump(&mut self, pc: usize, dest: i32) {
        let offset = dest - (pc as i32 + 1);
        match &mut self.proto.code[pc] {
            Instruction::Jump { offset: o } => *o = offset,
            _ => unreachable!("patched instruction is not a jump"),
        }
    }

    /// Points the single jump at `jump_pc` to `dest`.
    pub fn fix_jump_to(&mut self, jump_pc: i32, dest: i32) {
        self.fix_jump(jump_pc as usize, dest);
    }

    /// Appends list `l2` onto `*l1`.
    pub fn concat_list(&mut self, l1: &mut i32, l2: i32) {
        if l2 == NO_JUMP {
            return;
        }
        if *l1 == NO_JUMP {
            *l1 = l2;
            return;
        }
        let mut list = *l1;
        loop {
            let next = self.get_jump(list as usize);
            if next == NO_JUMP {
                break;
            }
            list = next;
        }
        self.fix_jump(list as usize, l2);
    }

    /// The instruction controlling the jump at `pc` (the preceding
    /// conditional, if any).
    fn jump_control(&self, pc: usize) -> usize {
        if pc >= 1 && self.proto.code[pc - 1].is_conditional() {
            pc - 1
        } else {
            pc
        }
    }

    /// Rewrites the `TestSet` controlling the jump at `pc` for a known
    /// destination register, or degrades it to a plain `Test`. Returns
    /// false when the jump does not produce a value.
    fn patch_test_reg(&mut self, pc: usize, reg: Option<u8>) -> bool {
        let ctrl = self.jump_control(pc);
        match self.proto.code[ctrl] {
            Instruction::TestSet { src, expect, .. } => {
                match reg {
                    Some(r) if r != src => {
                        self.proto.code[ctrl] = Instruction::TestSet {
                            dst: r,
                            src,
                            expect,
                        };
                    }
                    _ => {
                        // Value not wanted, or already in place
                        self.proto.code[ctrl] = Instruction::Test { reg: src, expect };
                    }
                }
                true
            }
            _ => false,
        }
    }

    /// Whether any jump in the list needs to materialize a value.
    fn need_value(&self, mut list: i32) -> bool {
        while list != NO_JUMP {
            let ctrl = self.jump_control(list as usize);
            if !matches!(self.proto.code[ctrl], Instruction::TestSet { .. }) {
                return true;
            }
            list = self.get_jump(list as usize);
        }
        false
    }

    fn patch_list_aux(&mut self, mut list: i32, vtarget: i32, reg: Option<u8>, dtarget: i32) {
        while list != NO_JUMP {
            let next = self.get_jump(list as usize);
            if self.patch_test_reg(list as usize, reg) {
                self.fix_jump(list as usize, vtarget);
            } else {
                self.fix_jump(list as usize, dtarget);
            }
            list = next;
        }
    }

    pub fn patch_list(&mut self, list: i32, target: i32) {
        self.patch_list_aux(list, target, None, target);
    }

    pub fn patch_to_here(&mut self, list: i32) {
        let here = self.get_label();
        self.patch_list(list, here);
    }

    fn negate_condition(&mut self, jump_pc: usize) {
        let ctrl = self.jump_control(jump_pc);
        match &mut self.proto.code[ctrl] {
            Instruction::Cmp { expect, .. }
            | Instruction::Test { expect, .. }
            | Instruction::TestSet { expect, .. } => *expect = !*expect,
            _ => unreachable!("negated instruction is not conditional"),
        }
    }

    // ===== Expression discharge =====

    fn set_reloc_dst(&mut self, pc: usize, reg: u8) {
        match &mut self.proto.code[pc] {
            Instruction::GetUpval { dst, .. }
            | Instruction::GetUpvalField { dst, .. }
            | Instruction::GetIndex { dst, .. }
            | Instruction::GetField { dst, .. }
            | Instruction::GetIndexInt { dst, .. }
            | Instruction::NewTable { dst, .. }
            | Instruction::Closure { dst, .. }
            | Instruction::Unary { dst, .. }
            | Instruction::Arith { dst, .. }
            | Instruction::Vararg { dst, .. } => *dst = reg,
            other => unreachable!("not a relocatable instruction: {:?}", other),
        }
    }

    /// Turns variable references into value-producing expressions.
    pub fn discharge_vars(&mut self, e: &mut ExpDesc) {
        match e.kind {
            ExpKind::Local { reg, .. } => {
                e.kind = ExpKind::NonReloc { reg };
            }
            ExpKind::Upval { idx } => {
                let pc = self.emit(Instruction::GetUpval { dst: 0, upval: idx });
                e.kind = ExpKind::Reloc { pc };
            }
            ExpKind::IndexedUp { upval, key } => {
                let pc = self.emit(Instruction::GetUpvalField {
                    dst: 0,
                    upval,
                    key,
                });
                e.kind = ExpKind::Reloc { pc };
            }
            ExpKind::Indexed { table, key } => {
                self.free_register(key);
                self.free_register(table);
                let pc = self.emit(Instruction::GetIndex {
                    dst: 0,
                    table,
                    key,
                });
                e.kind = ExpKind::Reloc { pc };
            }
            ExpKind::IndexedStr { table, key } => {
                self.free_register(table);
                let pc = self.emit(Instruction::GetField {
                    dst: 0,
                    table,
                    key,
                });
                e.kind = ExpKind::Reloc { pc };
            }
            ExpKind::IndexedInt { table, key } => {
                self.free_register(table);
                let pc = self.emit(Instruction::GetIndexInt {
                    dst: 0,
                    table,
                    key,
                });
                e.kind = ExpKind::Reloc { pc };
            }
            ExpKind::Call { pc } => {
                self.set_one_result(e, pc);
            }
            ExpKind::Vararg { pc } => {
                if let Instruction::Vararg { count, .. } = &mut self.proto.code[pc] {
                    *count = 2;
                }
                e.kind = ExpKind::Reloc { pc };
            }
            _ => {}
        }
    }

    fn set_one_result(&mut self, e: &mut ExpDesc, pc: usize) {
        if let Instruction::Call { base, nresults, .. } = &mut self.proto.code[pc] {
            *nresults = 2;
            let base = *base;
            e.kind = ExpKind::NonReloc { reg: base };
        }
    }

    /// Fixes a multi-result expression to produce `n` results
    /// (`None` for "all up to the top").
    pub fn set_returns(&mut self, e: &ExpDesc, n: Option<u8>) -> CompileResult<()> {
        match e.kind {
            ExpKind::Call { pc } => {
                if let Instruction::Call { nresults, .. } = &mut self.proto.code[pc] {
                    *nresults = n.map_or(0, |n| n + 1);
                }
            }
            ExpKind::Vararg { pc } => {
                let reg = self.free_reg;
                if let Instruction::Vararg { dst, count } = &mut self.proto.code[pc] {
                    *count = n.map_or(0, |n| n + 1);
                    *dst = reg;
                }
                self.reserve_regs(1)?;
            }
            _ => unreachable!("expression has a fixed result count"),
        }
        Ok(())
    }

    fn discharge_to_reg(&mut self, e: &mut ExpDesc, reg: u8) {
        self.discharge_vars(e);
        match &e.kind {
            ExpKind::Nil => self.load_nil(reg, 1),
            ExpKind::False => {
                self.emit(Instruction::LoadBool {
                    dst: reg,
                    value: false,
                });
            }
            ExpKind::True => {
                self.emit(Instruction::LoadBool {
                    dst: reg,
                    value: true,
                });
            }
            ExpKind::Int(i) => {
                if let Ok(small) = i32::try_from(*i) {
                    self.emit(Instruction::LoadInt {
                        dst: reg,
                        value: small,
                    });
                } else {
                    let index = self.const_index(Constant::Int(*i));
                    self.emit(Instruction::LoadConst { dst: reg, index });
                }
            }
            ExpKind::Float(f) => {
                let index = self.const_index(Constant::Float(*f));
                self.emit(Instruction::LoadConst { dst: reg, index });
            }
            ExpKind::Str(s) => {
                let index = self.const_index(Constant::Str(s.clone()));
                self.emit(Instruction::LoadConst { dst: reg, index });
            }
            ExpKind::Const(index) => {
                let index = *index;
                self.emit(Instruction::LoadConst { dst: reg, index });
            }
            ExpKind::Reloc { pc } => {
                let pc = *pc;
                self.set_reloc_dst(pc, reg);
            }
            ExpKind::NonReloc { reg: src } => {
                let src = *src;
                if src != reg {
                    self.emit(Instruction::Move { dst: reg, src });
                }
            }
            ExpKind::Jump { .. } => return,
            _ => unreachable!("expression not dischargeable"),
        }
        e.kind = ExpKind::NonReloc { reg };
    }

    fn code_loadbool(&mut self, i: Instruction) -> i32 {
        self.get_label();
        self.emit(i) as i32
    }

    /// Puts the expression's value into `reg`, materializing any pending
    /// true/false jump lists.
    pub fn exp_to_reg(&mut self, e: &mut ExpDesc, reg: u8) {
        self.discharge_to_reg(e, reg);
        if let ExpKind::Jump { pc } = e.kind {
            let pc = pc as i32;
            let mut tl = e.true_list;
            self.concat_list(&mut tl, pc);
            e.true_list = tl;
        }
        if e.has_jumps() {
            let mut p_f = NO_JUMP;
            let mut p_t = NO_JUMP;
            if self.need_value(e.true_list) || self.need_value(e.false_list) {
                let fj = if matches!(e.kind, ExpKind::Jump { .. }) {
                    NO_JUMP
                } else {
                    self.emit_jump()
                };
                p_f = self.code_loadbool(Instruction::LoadFalseSkip { dst: reg });
                p_t = self.code_loadbool(Instruction::LoadBool {
                    dst: reg,
                    value: true,
                });
                if fj != NO_JUMP {
                    let here = self.get_label();
                    self.fix_jump(fj as usize, here);
                }
            }
            let final_pc = self.get_label();
            self.patch_list_aux(e.false_list, final_pc, Some(reg), p_f);
            self.patch_list_aux(e.true_list, final_pc, Some(reg), p_t);
        }
        e.true_list = NO_JUMP;
        e.false_list = NO_JUMP;
        e.kind = ExpKind::NonReloc { reg };
    }

    /// Puts the value into the next free register.
    pub fn exp_to_next_reg(&mut self, e: &mut ExpDesc) -> CompileResult<u8> {
        self.discharge_vars(e);
        self.free_exp(e);
        self.reserve_regs(1)?;
        let reg = self.free_reg - 1;
        self.exp_to_reg(e, reg);
        Ok(reg)
    }

    /// Puts the value into any register and returns it.
    pub fn exp_to_any_reg(&mut self, e: &mut ExpDesc) -> CompileResult<u8> {
        self.discharge_vars(e);
        if let ExpKind::NonReloc { reg } = e.kind {
            if !e.has_jumps() {
                return Ok(reg);
            }
            if reg >= self.active_reg_level() {
                self.exp_to_reg(e, reg);
                return Ok(reg);
            }
        }
        self.exp_to_next_reg(e)
    }

    /// Ensures the expression describes a concrete value (possibly still
    /// a constant), resolving pending jumps if any.
    pub fn exp_to_val(&mut self, e: &mut ExpDesc) -> CompileResult<()> {
        if e.has_jumps() {
            self.exp_to_any_reg(e)?;
        } else {
            self.discharge_vars(e);
        }
        Ok(())
    }

    // ===== Tests and boolean logic =====

    fn cond_jump(&mut self, i: Instruction) -> i32 {
        self.emit(i);
        self.emit_jump()
    }

    /// Emits a test that jumps when the expression's truth differs from
    /// `cond`.
    fn jump_on_cond(&mut self, e: &mut ExpDesc, cond: bool) -> CompileResult<i32> {
        if let ExpKind::Reloc { pc } = e.kind {
            if pc == self.pc() - 1 {
                if let Instruction::Unary {
                    op: UnaryOp::Not,
                    src,
                    ..
                } = self.proto.code[pc]
                {
                    // Test the operand of a trailing `not` directly
                    self.remove_last();
                    return Ok(self.cond_jump(Instruction::Test {
                        reg: src,
                        expect: !cond,
                    }));
                }
            }
        }
        let reg = self.exp_to_any_reg(e)?;
        self.free_exp(e);
        Ok(self.cond_jump(Instruction::TestSet {
            dst: reg,
            src: reg,
            expect: cond,
        }))
    }

    /// Prepares the expression as a condition that falls through when
    /// true; false exits collect on `false_list`.
    pub fn go_if_true(&mut self, e: &mut ExpDesc) -> CompileResult<()> {
        self.discharge_vars(e);
        let pc = match e.kind {
            ExpKind::Const(_)
            | ExpKind::Int(_)
            | ExpKind::Float(_)
            | ExpKind::Str(_)
            | ExpKind::True => NO_JUMP,
            ExpKind::Jump { pc } => {
                self.negate_condition(pc);
                pc as i32
            }
            _ => self.jump_on_cond(e, false)?,
        };
        let mut fl = e.false_list;
        self.concat_list(&mut fl, pc);
        e.false_list = fl;
        self.patch_to_here(e.true_list);
        e.true_list = NO_JUMP;
        Ok(())
    }

    /// Prepares the expression as a condition that falls through when
    /// false; true exits collect on `true_list`.
    pub fn go_if_false(&mut self, e: &mut ExpDesc) -> CompileResult<()> {
        self.discharge_vars(e);
        let pc = match e.kind {
            ExpKind::Nil | ExpKind::False => NO_JUMP,
            ExpKind::Jump { pc } => pc as i32,
            _ => self.jump_on_cond(e, true)?,
        };
        let mut tl = e.true_list;
        self.concat_list(&mut tl, pc);
        e.true_list = tl;
        self.patch_to_here(e.false_list);
        e.false_list = NO_JUMP;
        Ok(())
    }

    fn code_not(&mut self, e: &mut ExpDesc) -> CompileResult<()> {
        match e.kind {
            ExpKind::Nil | ExpKind::False => e.kind = ExpKind::True,
            ExpKind::Const(_)
            | ExpKind::Int(_)
            | ExpKind::Float(_)
            | ExpKind::Str(_)
            | ExpKind::True => e.kind = ExpKind::False,
            ExpKind::Jump { pc } => self.negate_condition(pc),
            ExpKind::Reloc { .. } | ExpKind::NonReloc { .. } => {
                self.discharge_vars(e);
                let src = self.exp_to_any_reg(e)?;
                self.free_exp(e);
                let pc = self.emit(Instruction::Unary {
                    op: UnaryOp::Not,
                    dst: 0,
                    src,
                });
                e.kind = ExpKind::Reloc { pc };
            }
            _ => unreachable!("cannot negate this expression"),
        }
        std::mem::swap(&mut e.true_list, &mut e.false_list);
        // Values from TestSets in the swapped lists are garbage now
        self.remove_values(e.false_list);
        self.remove_values(e.true_list);
        Ok(())
    }

    fn remove_values(&mut self, mut list: i32) {
        while list != NO_JUMP {
            self.patch_test_reg(list as usize, None);
            list = self.get_jump(list as usize);
        }
    }

    // ===== Indexing =====

    /// Rewrites `t` into an indexed access `t[k]`.
    pub fn index_exp(&mut self, t: &mut ExpDesc, mut k: ExpDesc) -> CompileResult<()> {
        if let (ExpKind::Upval { idx }, ExpKind::Str(s)) = (&t.kind, &k.kind) {
            let upval = *idx;
            let key = self.string_const(s);
            t.kind = ExpKind::IndexedUp { upval, key };
            t.hint = TypeHint::default();
            t.table_fields = None;
            return Ok(());
        }
        let table = self.exp_to_any_reg(t)?;
        match k.kind {
            ExpKind::Str(ref s) => {
                let key = self.string_const(s);
                t.kind = ExpKind::IndexedStr { table, key };
            }
            ExpKind::Int(i) if i32::try_from(i).is_ok() => {
                t.kind = ExpKind::IndexedInt {
                    table,
                    key: i as i32,
                };
            }
            _ => {
                let key = self.exp_to_any_reg(&mut k)?;
                t.kind = ExpKind::Indexed { table, key };
            }
        }
        t.hint = TypeHint::default();
        t.table_fields = None;
        Ok(())
    }

    /// Method-call prologue: `e:key` leaving function and receiver in two
    /// fresh consecutive registers.
    pub fn self_field(&mut self, e: &mut ExpDesc, key: &str) -> CompileResult<()> {
        let obj = self.exp_to_any_reg(e)?;
        self.free_exp(e);
        let base = self.free_reg;
        self.reserve_regs(2)?;
        let key = self.string_const(key);
        self.emit(Instruction::SelfField { base, obj, key });
        e.kind = ExpKind::NonReloc { reg: base };
        e.true_list = NO_JUMP;
        e.false_list = NO_JUMP;
        Ok(())
    }

    // ===== Assignment =====

    /// Stores `ex` into the variable described by `var`.
    pub fn store_var(&mut self, var: &ExpDesc, ex: &mut ExpDesc) -> CompileResult<()> {
        match var.kind {
            ExpKind::Local { reg, .. } => {
                self.free_exp(ex);
                self.exp_to_reg(ex, reg);
                return Ok(());
            }
            ExpKind::Upval { idx } => {
                let src = self.exp_to_any_reg(ex)?;
                self.emit(Instruction::SetUpval { src, upval: idx });
            }
            ExpKind::IndexedUp { upval, key } => {
                let src = self.exp_to_any_reg(ex)?;
                self.emit(Instruction::SetUpvalField { upval, key, src });
            }
            ExpKind::Indexed { table, key } => {
                let src = self.exp_to_any_reg(ex)?;
                self.emit(Instruction::SetIndex { table, key, src });
            }
            ExpKind::IndexedStr { table, key } => {
                let src = self.exp_to_any_reg(ex)?;
                self.emit(Instruction::SetField { table, key, src });
            }
            ExpKind::IndexedInt { table, key } => {
                let src = self.exp_to_any_reg(ex)?;
                self.emit(Instruction::SetIndexInt { table, key, src });
            }
            _ => unreachable!("cannot assign to this expression"),
        }
        self.free_exp(ex);
        Ok(())
    }

    // ===== Operators =====

    /// Called before parsing the right operand of a binary operator.
    pub fn infix(&mut self, op: BinOpr, e: &mut ExpDesc) -> CompileResult<()> {
        match op {
            BinOpr::And => self.go_if_true(e)?,
            BinOpr::Or => self.go_if_false(e)?,
            BinOpr::Concat => {
                self.exp_to_next_reg(e)?;
            }
            BinOpr::Arith(_) => {
                if !e.is_numeral() {
                    self.exp_to_any_reg(e)?;
                }
            }
            BinOpr::Eq { .. } | BinOpr::Lt | BinOpr::Le | BinOpr::Gt | BinOpr::Ge => {
                self.exp_to_val(e)?;
                if !matches!(
                    e.kind,
                    ExpKind::Int(_) | ExpKind::Float(_) | ExpKind::Str(_)
                ) {
                    self.exp_to_any_reg(e)?;
                }
            }
        }
        Ok(())
    }

    /// Completes a binary operation once both operands are parsed.
    pub fn posfix(&mut self, op: BinOpr, e1: &mut ExpDesc, mut e2: ExpDesc) -> CompileResult<()> {
        match op {
            BinOpr::And => {
                debug_assert_eq!(e1.true_list, NO_JUMP);
                self.discharge_vars(&mut e2);
                let mut fl = e2.false_list;
                self.concat_list(&mut fl, e1.false_list);
                e2.false_list = fl;
                *e1 = e2;
            }
            BinOpr::Or => {
                debug_assert_eq!(e1.false_list, NO_JUMP);
                self.discharge_vars(&mut e2);
                let mut tl = e2.true_list;
                self.concat_list(&mut tl, e1.true_list);
                e2.true_list = tl;
                *e1 = e2;
            }
            BinOpr::Concat => {
                self.exp_to_next_reg(&mut e2)?;
                self.code_concat(e1, &e2);
            }
            BinOpr::Arith(op) => {
                if let Some(folded) = const_fold(op, e1, &e2) {
                    e1.kind = folded;
                    e1.hint = e1.numeric_hint();
                } else {
                    self.code_arith(op, e1, e2)?;
                }
            }
            BinOpr::Eq { negate } => self.code_compare(CmpOp::Eq, !negate, false, e1, e2)?,
            BinOpr::Lt => self.code_compare(CmpOp::Lt, true, false, e1, e2)?,
            BinOpr::Le => self.code_compare(CmpOp::Le, true, false, e1, e2)?,
            BinOpr::Gt => self.code_compare(CmpOp::Lt, true, true, e1, e2)?,
            BinOpr::Ge => self.code_compare(CmpOp::Le, true, true, e1, e2)?,
        }
        Ok(())
    }

    fn code_concat(&mut self, e1: &mut ExpDesc, e2: &ExpDesc) {
        let r2 = match e2.kind {
            ExpKind::NonReloc { reg } => reg,
            _ => unreachable!("concat operand not in a register"),
        };
        let r1 = match e1.kind {
            ExpKind::NonReloc { reg } => reg,
            _ => unreachable!("concat operand not in a register"),
        };
        debug_assert_eq!(r2, r1 + 1);
        // Merge with a concat the right operand just emitted
        if let Some(Instruction::Concat { first, count }) = self.proto.code.last_mut() {
            if *first == r2 {
                *first = r1;
                *count += 1;
                self.free_reg = r1 + 1;
                e1.kind = ExpKind::NonReloc { reg: r1 };
                return;
            }
        }
        self.emit(Instruction::Concat { first: r1, count: 2 });
        self.free_reg = r1 + 1;
        e1.kind = ExpKind::NonReloc { reg: r1 };
    }

    fn code_arith(&mut self, op: ArithOp, e1: &mut ExpDesc, mut e2: ExpDesc) -> CompileResult<()> {
        let lhs = self.exp_to_any_reg(e1)?;
        let rhs = self.exp_to_any_reg(&mut e2)?;
        self.free_exps(e1, &e2);
        let pc = self.emit(Instruction::Arith {
            op,
            dst: 0,
            lhs,
            rhs,
        });
        e1.kind = ExpKind::Reloc { pc };
        e1.hint = TypeHint::default();
        Ok(())
    }

    fn code_compare(
        &mut self,
        op: CmpOp,
        expect: bool,
        swap: bool,
        e1: &mut ExpDesc,
        mut e2: ExpDesc,
    ) -> CompileResult<()> {
        let lhs = self.exp_to_any_reg(e1)?;
        let rhs = self.exp_to_any_reg(&mut e2)?;
        self.free_exps(e1, &e2);
        let (lhs, rhs) = if swap { (rhs, lhs) } else { (lhs, rhs) };
        let pc = self.cond_jump(Instruction::Cmp {
            op,
            lhs,
            rhs,
            expect,
        });
        e1.kind = ExpKind::Jump { pc: pc as usize };
        e1.hint = TypeHint::default();
        Ok(())
    }

    /// Applies a (non-`not`) unary operator, folding constants.
    pub fn prefix(&mut self, op: UnaryOp, e: &mut ExpDesc) -> CompileResult<()> {
        if op == UnaryOp::Not {
            self.discharge_vars(e);
            return self.code_not(e);
        }
        if let Some(folded) = unary_fold(op, e) {
            e.kind = folded;
            e.hint = e.numeric_hint();
            return Ok(());
        }
        let src = self.exp_to_any_reg(e)?;
        self.free_exp(e);
        let pc = self.emit(Instruction::Unary { op, dst: 0, src });
        e.kind = ExpKind::Reloc { pc };
        e.hint = TypeHint::default();
        Ok(())
    }

    // ===== Returns =====

    pub fn emit_return(&mut self, base: u8, nret: Option<u8>) {
        self.emit(Instruction::Return {
            base,
            count: nret.map_or(0, |n| n + 1),
        });
    }
}

/// Binary operators as seen by the precedence climber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOpr {
    Arith(ArithOp),
    Concat,
    Eq { negate: bool },
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

/// Kinds of expression descriptors.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpKind {
    Void,
    Nil,
    True,
    False,
    Int(i64),
    Float(f64),
    Str(String),
    /// Constant-pool slot (a materialized compile-time constant).
    Const(u32),
    /// Value fixed in a register.
    NonReloc { reg: u8 },
    /// An in-scope local variable.
    Local { reg: u8, vidx: usize },
    /// An upvalue of the current function.
    Upval { idx: u8 },
    IndexedUp { upval: u8, key: u32 },
    Indexed { table: u8, key: u8 },
    IndexedInt { table: u8, key: i32 },
    IndexedStr { table: u8, key: u32 },
    /// A test whose jump is at `pc`.
    Jump { pc: usize },
    /// Instruction at `pc` still needs its destination register.
    Reloc { pc: usize },
    /// A call whose result count is still open.
    Call { pc: usize },
    /// A vararg expression whose result count is still open.
    Vararg { pc: usize },
}

/// An expression descriptor with its pending jump lists and the deduced
/// type hint for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpDesc {
    pub kind: ExpKind,
    pub true_list: i32,
    pub false_list: i32,
    pub hint: TypeHint,
    /// Named-field hints of a table-constructor value, the structural
    /// half of the hint alongside the primitive `table` alternative.
    pub table_fields: Option<Box<FxHashMap<String, TypeHint>>>,
}

impl ExpDesc {
    pub fn new(kind: ExpKind) -> ExpDesc {
        ExpDesc {
            kind,
            true_list: NO_JUMP,
            false_list: NO_JUMP,
            hint: TypeHint::default(),
            table_fields: None,
        }
    }

    pub fn with_hint(kind: ExpKind, hint: TypeHint) -> ExpDesc {
        ExpDesc {
            kind,
            true_list: NO_JUMP,
            false_list: NO_JUMP,
            hint,
            table_fields: None,
        }
    }

    pub fn void() -> ExpDesc {
        ExpDesc::new(ExpKind::Void)
    }

    pub fn has_jumps(&self) -> bool {
        self.true_list != NO_JUMP || self.false_list != NO_JUMP
    }

    pub fn is_numeral(&self) -> bool {
        matches!(self.kind, ExpKind::Int(_) | ExpKind::Float(_)) && !self.has_jumps()
    }

    pub fn is_multiret(&self) -> bool {
        matches!(self.kind, ExpKind::Call { .. } | ExpKind::Vararg { .. })
    }

    fn numeric_hint(&self) -> TypeHint {
        use crate::typehint::PrimType;
        match self.kind {
            ExpKind::Int(_) => TypeHint::of(PrimType::Int),
            ExpKind::Float(_) => TypeHint::of(PrimType::Float),
            ExpKind::True | ExpKind::False => TypeHint::of(PrimType::Boolean),
            _ => TypeHint::default(),
        }
    }
}

// ===== Constant folding =====

fn numeral(e: &ExpDesc) -> Option<ExpKind> {
    if e.has_jumps() {
        return None;
    }
    match e.kind {
        ExpKind::Int(i) => Some(ExpKind::Int(i)),
        ExpKind::Float(f) => Some(ExpKind::Float(f)),
        _ => None,
    }
}

fn as_float(k: &ExpKind) -> f64 {
    match k {
        ExpKind::Int(i) => *i as f64,
        ExpKind::Float(f) => *f,
        _ => unreachable!(),
    }
}

fn as_int(k: &ExpKind) -> Option<i64> {
    match k {
        ExpKind::Int(i) => Some(*i),
        _ => None,
    }
}

/// Folds an arithmetic or bitwise operation over numeric constants,
/// matching the runtime's semantics. Returns `None` when the operation
/// must be deferred to run time (mixed rules, division by zero).
fn const_fold(op: ArithOp, e1: &ExpDesc, e2: &ExpDesc) -> Option<ExpKind> {
    let v1 = numeral(e1)?;
    let v2 = numeral(e2)?;
    match op {
        ArithOp::Add | ArithOp::Sub | ArithOp::Mul => {
            if let (Some(a), Some(b)) = (as_int(&v1), as_int(&v2)) {
                let r = match op {
                    ArithOp::Add => a.wrapping_add(b),
                    ArithOp::Sub => a.wrapping_sub(b),
                    _ => a.wrapping_mul(b),
                };
                Some(ExpKind::Int(r))
            } else {
                let (a, b) = (as_float(&v1), as_float(&v2));
                let r = match op {
                    ArithOp::Add => a + b,
                    ArithOp::Sub => a - b,
                    _ => a * b,
                };
                Some(ExpKind::Float(r))
            }
        }
        ArithOp::Div => Some(ExpKind::Float(as_float(&v1) / as_float(&v2))),
        ArithOp::Pow => Some(ExpKind::Float(as_float(&v1).powf(as_float(&v2)))),
        ArithOp::IDiv => {
            if let (Some(a), Some(b)) = (as_int(&v1), as_int(&v2)) {
                if b == 0 {
                    return None;
                }
                Some(ExpKind::Int(a.div_euclid(b)))
            } else {
                Some(ExpKind::Float((as_float(&v1) / as_float(&v2)).floor()))
            }
        }
        ArithOp::Mod => {
            if let (Some(a), Some(b)) = (as_int(&v1), as_int(&v2)) {
                if b == 0 {
                    return None;
                }
                Some(ExpKind::Int(a.rem_euclid(b)))
            } else {
                let (a, b) = (as_float(&v1), as_float(&v2));
                let mut r = a % b;
                if r != 0.0 && (r < 0.0) != (b < 0.0) {
                    r += b;
                }
                Some(ExpKind::Float(r))
            }
        }
        ArithOp::BAnd | ArithOp::BOr | ArithOp::BXor | ArithOp::Shl | ArithOp::Shr => {
            let a = as_int(&v1)?;
            let b = as_int(&v2)?;
            let r = match op {
                ArithOp::BAnd => a & b,
                ArithOp::BOr => a | b,
                ArithOp::BXor => a ^ b,
                ArithOp::Shl => shift_left(a, b),
                _ => shift_left(a, b.checked_neg()?),
            };
            Some(ExpKind::Int(r))
        }
    }
}

/// Left shift with the runtime's semantics: negative counts shift right,
/// counts past the width produce zero, right shifts are logical.
fn shift_left(a: i64, b: i64) -> i64 {
    if b >= 64 || b <= -64 {
        0
    } else if b >= 0 {
        ((a as u64) << b) as i64
    } else {
        ((a as u64) >> (-b)) as i64
    }
}

fn unary_fold(op: UnaryOp, e: &ExpDesc) -> Option<ExpKind> {
    let v = numeral(e)?;
    match op {
        UnaryOp::Neg => match v {
            ExpKind::Int(i) => Some(ExpKind::Int(i.wrapping_neg())),
            ExpKind::Float(f) => Some(ExpKind::Float(-f)),
            _ => None,
        },
        UnaryOp::BNot => as_int(&v).map(|i| ExpKind::Int(!i)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(i: i64) -> ExpDesc {
        ExpDesc::new(ExpKind::Int(i))
    }

    fn float(f: f64) -> ExpDesc {
        ExpDesc::new(ExpKind::Float(f))
    }

    #[test]
    fn integer_arithmetic_folds_with_wrapping() {
        assert_eq!(
            const_fold(ArithOp::Add, &int(2), &int(3)),
            Some(ExpKind::Int(5))
        );
        assert_eq!(
            const_fold(ArithOp::Mul, &int(i64::MAX), &int(2)),
            Some(ExpKind::Int(i64::MAX.wrapping_mul(2)))
        );
    }

    #[test]
    fn division_always_folds_to_float() {
        assert_eq!(
            const_fold(ArithOp::Div, &int(1), &int(2)),
            Some(ExpKind::Float(0.5))
        );
    }

    #[test]
    fn integer_division_by_zero_never_folds() {
        assert_eq!(const_fold(ArithOp::IDiv, &int(1), &int(0)), None);
        assert_eq!(const_fold(ArithOp::Mod, &int(1), &int(0)), None);
    }

    #[test]
    fn mixed_operands_promote_to_float() {
        assert_eq!(
            const_fold(ArithOp::Add, &int(1), &float(0.5)),
            Some(ExpKind::Float(1.5))
        );
    }

    #[test]
    fn floor_modulo_follows_divisor_sign() {
        assert_eq!(
            const_fold(ArithOp::Mod, &int(-5), &int(3)),
            Some(ExpKind::Int(1))
        );
        assert_eq!(
            const_fold(ArithOp::Mod, &float(-5.5), &float(3.0)),
            Some(ExpKind::Float(0.5))
        );
    }

    #[test]
    fn bitwise_requires_integers() {
        assert_eq!(const_fold(ArithOp::BAnd, &int(6), &float(3.0)), None);
        assert_eq!(
            const_fold(ArithOp::BAnd, &int(6), &int(3)),
            Some(ExpKind::Int(2))
        );
    }

    #[test]
    fn shifts_saturate_past_the_width() {
        assert_eq!(
            const_fold(ArithOp::Shl, &int(1), &int(64)),
            Some(ExpKind::Int(0))
        );
        assert_eq!(
            const_fold(ArithOp::Shr, &int(-1), &int(1)),
            Some(ExpKind::Int(((-1i64) as u64 >> 1) as i64))
        );
        assert_eq!(
            const_fold(ArithOp::Shl, &int(1), &int(-3)),
            Some(ExpKind::Int(0))
        );
    }

    #[test]
    fn unary_folding() {
        assert_eq!(unary_fold(UnaryOp::Neg, &int(5)), Some(ExpKind::Int(-5)));
        assert_eq!(unary_fold(UnaryOp::BNot, &int(0)), Some(ExpKind::Int(-1)));
        assert_eq!(unary_fold(UnaryOp::Len, &int(5)), None);
    }

    #[test]
    fn constant_pool_deduplicates() {
        let mut fs = FuncState::new(Proto::new("t"));
        let a = fs.const_index(Constant::Str("x".into()));
        let b = fs.const_index(Constant::Str("x".into()));
        let c = fs.const_index(Constant::Int(1));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(fs.proto.constants.len(), 2);
    }

    #[test]
    fn jump_lists_thread_and_patch() {
        let mut fs = FuncState::new(Proto::new("t"));
        let j1 = fs.emit_jump();
        let j2 = fs.emit_jump();
        let mut list = NO_JUMP;
        fs.concat_list(&mut list, j1);
        fs.concat_list(&mut list, j2);
        fs.emit(Instruction::LoadBool {
            dst: 0,
            value: true,
        });
        fs.patch_to_here(list);
        assert_eq!(fs.proto.code[0], Instruction::Jump { offset: 2 });
        assert_eq!(fs.proto.code[1], Instruction::Jump { offset: 1 });
    }

    #[test]
    fn register_reservation_respects_the_ceiling() {
        let mut fs = FuncState::new(Proto::new("t"));
        assert!(fs.reserve_regs(MAX_REGISTERS).is_ok());
        assert!(matches!(
            fs.reserve_regs(1),
            Err(CompileError::TooComplex { .. })
        ));
    }
}
