//! Single-pass recursive-descent parser emitting bytecode directly.
//!
//! The parser never builds a syntax tree. Statements and expressions are
//! compiled as they are recognized, with [`FuncState`] (one per nested
//! function, stack-shaped) holding the emission state and [`ExpDesc`]
//! carrying partially materialized expressions between productions.
//!
//! The token stream is fully materialized up front, which gives the parser
//! a cheap cursor save/restore facility. Three features depend on it:
//! named call arguments, `parent` references (re-parsing the saved parent
//! name of a class), and switch-case body pruning.

mod expr;
mod stmt;

use crate::codegen::{
    BlockCnt, BlockKind, CtcValue, ExpDesc, ExpKind, FuncShape, FuncState, GotoDesc, LabelDesc,
    VarKind,
};
use crate::diag::{Reporter, Warning, WarningKind};
use crate::error::{CompileError, CompileResult};
use crate::keywords::KeywordState;
use crate::token::{Span, ToggledWord, Token};
use crate::typehint::TypeHint;
use rustc_hash::{FxHashMap, FxHashSet};
use vela_bytecode::{Instruction, Proto, SourcePos, UpvalDesc, NO_JUMP};

/// Shared statement/expression nesting budget.
const MAX_LEVELS: u32 = 200;

/// Well-known global names checked by the `global-shadow` warning.
const COMMON_GLOBALS: &[&str] = &[
    "assert",
    "collectgarbage",
    "error",
    "getmetatable",
    "ipairs",
    "next",
    "pairs",
    "pcall",
    "print",
    "rawequal",
    "rawget",
    "rawlen",
    "rawset",
    "require",
    "select",
    "setmetatable",
    "tonumber",
    "tostring",
    "type",
    "xpcall",
    "coroutine",
    "io",
    "math",
    "os",
    "string",
    "table",
    "utf8",
];

/// Per-class compilation context, pushed while a `class` statement's
/// members are being compiled.
struct ClassCtx {
    /// private/protected member name to mangled name.
    mangled: FxHashMap<String, String>,
    /// Token range of the parent name in `extends`, for `parent`.
    parent_range: Option<(usize, usize)>,
}

/// Reference produced by scope resolution.
enum VarRef {
    Local { reg: u8, vidx: usize },
    Upval { idx: u8 },
    Ctc { value: CtcValue, hint: TypeHint },
}

pub struct Parser<'src> {
    tokens: Vec<(Token, Span)>,
    pos: usize,
    chunk_name: &'src str,
    reporter: Reporter<'src>,
    fs: Vec<FuncState>,
    class_stack: Vec<ClassCtx>,
    keyword_states: FxHashMap<ToggledWord, KeywordState>,
    declared_globals: FxHashSet<String>,
    exports: Vec<(String, Span)>,
    levels: u32,
    priv_counter: u32,
    /// Shape of the callee of the most recently compiled call, when known.
    last_call_shape: Option<FuncShape>,
}

impl<'src> Parser<'src> {
    pub fn new(
        tokens: Vec<(Token, Span)>,
        chunk_name: &'src str,
        reporter: Reporter<'src>,
        keyword_states: FxHashMap<ToggledWord, KeywordState>,
    ) -> Self {
        Parser {
            tokens,
            pos: 0,
            chunk_name,
            reporter,
            fs: Vec::new(),
            class_stack: Vec::new(),
            keyword_states,
            declared_globals: FxHashSet::default(),
            exports: Vec::new(),
            levels: 0,
            priv_counter: 0,
            last_call_shape: None,
        }
    }

    /// Compiles the whole chunk into its top-level prototype.
    pub fn parse(mut self) -> CompileResult<(Proto, Vec<Warning>)> {
        self.open_func(0);
        {
            let fs = self.fs_mut();
            fs.proto.is_vararg = true;
            // The environment upvalue of the top-level function
            fs.proto.upvalues.push(UpvalDesc {
                name: "_ENV".to_owned(),
                in_stack: false,
                index: 0,
            });
            fs.readonly_upvals.push(false);
        }
        self.statlist()?;
        if self.current() != &Token::Eof {
            return Err(self.error_expected("<eof>"));
        }
        if !self.exports.is_empty() {
            self.emit_export_table()?;
        }
        let last_line = self.current_span().line;
        let proto = self.close_func(last_line)?;
        Ok((proto, self.reporter.into_warnings()))
    }

    // ===== Token cursor =====

    pub(crate) fn current(&self) -> &Token {
        &self.tokens[self.pos].0
    }

    pub(crate) fn current_span(&self) -> Span {
        self.tokens[self.pos].1
    }

    pub(crate) fn peek(&self, n: usize) -> &Token {
        let idx = (self.pos + n).min(self.tokens.len() - 1);
        &self.tokens[idx].0
    }

    pub(crate) fn advance(&mut self) {
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
    }

    pub(crate) fn cursor(&self) -> usize {
        self.pos
    }

    pub(crate) fn restore(&mut self, cursor: usize) {
        self.pos = cursor;
    }

    pub(crate) fn token_at(&self, cursor: usize) -> &Token {
        &self.tokens[cursor.min(self.tokens.len() - 1)].0
    }

    pub(crate) fn accept(&mut self, token: &Token) -> bool {
        if self.current().normalized() == token {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect(&mut self, token: &Token, what: &str) -> CompileResult<Span> {
        if self.current().normalized() == token {
            let span = self.current_span();
            self.advance();
            Ok(span)
        } else {
            Err(self.error_expected(what))
        }
    }

    /// Like [`expect`] for block terminators, naming the construct and
    /// line the terminator closes when they differ.
    pub(crate) fn expect_match(
        &mut self,
        token: &Token,
        what: &str,
        who: &str,
        line: u32,
    ) -> CompileResult<Span> {
        if self.current().normalized() == token {
            let span = self.current_span();
            self.advance();
            Ok(span)
        } else {
            let span = self.current_span();
            let msg = if span.line == line {
                format!("'{}' expected", what)
            } else {
                format!("'{}' expected (to close '{}' at line {})", what, who, line)
            };
            Err(self
                .reporter
                .syntax_error(span, &msg, &format!("found '{}'", self.current())))
        }
    }

    pub(crate) fn expect_ident(&mut self, what: &str) -> CompileResult<(String, Span)> {
        match self.current() {
            Token::Identifier(name) => {
                let name = name.clone();
                let span = self.current_span();
                self.advance();
                Ok((name, span))
            }
            _ => Err(self.error_expected(what)),
        }
    }

    pub(crate) fn error_expected(&self, what: &str) -> CompileError {
        let span = self.current_span();
        self.reporter.syntax_error(
            span,
            &format!("'{}' expected", what),
            &format!("found '{}'", self.current()),
        )
    }

    pub(crate) fn syntax_error(&self, span: Span, msg: &str, here: &str) -> CompileError {
        self.reporter.syntax_error(span, msg, here)
    }

    pub(crate) fn semantic_error(&self, span: Span, msg: &str, here: &str) -> CompileError {
        self.reporter.semantic_error(span, msg, here)
    }

    pub(crate) fn warn(
        &mut self,
        kind: WarningKind,
        span: Span,
        msg: &str,
        here: &str,
    ) -> CompileResult<()> {
        self.reporter.warn(kind, span, msg, here)
    }

    pub(crate) fn enter_level(&mut self, span: Span) -> CompileResult<()> {
        self.levels += 1;
        if self.levels > MAX_LEVELS {
            return Err(CompileError::TooManyLevels { line: span.line });
        }
        Ok(())
    }

    pub(crate) fn leave_level(&mut self) {
        self.levels -= 1;
    }

    // ===== Function state =====

    pub(crate) fn fs(&self) -> &FuncState {
        self.fs.last().unwrap_or_else(|| unreachable!())
    }

    pub(crate) fn fs_mut(&mut self) -> &mut FuncState {
        self.fs.last_mut().unwrap_or_else(|| unreachable!())
    }

    /// Records the current token position as the source position of
    /// subsequently emitted instructions.
    pub(crate) fn mark_pos(&mut self) {
        let span = self.current_span();
        self.fs_mut().pos = SourcePos {
            line: span.line,
            column: span.column,
        };
    }

    pub(crate) fn open_func(&mut self, line_defined: u32) {
        let mut proto = Proto::new(self.chunk_name);
        proto.line_defined = line_defined;
        self.fs.push(FuncState::new(proto));
        self.enter_block(BlockKind::Plain);
    }

    /// Finalizes the current function: emits the fallback return, checks
    /// for unresolved gotos, and detaches the prototype.
    pub(crate) fn close_func(&mut self, last_line: u32) -> CompileResult<Proto> {
        self.leave_block()?;
        if let Some(g) = self.fs().gotos.first() {
            let (name, span) = (g.name.clone(), g.span);
            return Err(self.semantic_error(
                span,
                &format!("no visible label '{}' for goto", name),
                "jump has no target",
            ));
        }
        let mut fs = self.fs.pop().unwrap_or_else(|| unreachable!());
        let base = fs.reg_level(0);
        fs.emit_return(base, Some(0));
        fs.proto.last_line_defined = last_line;
        Ok(fs.proto)
    }

    // ===== Blocks =====

    pub(crate) fn enter_block(&mut self, kind: BlockKind) {
        let fs = self.fs_mut();
        let inside_tbc = fs.blocks.last().map_or(false, |b| b.inside_tbc);
        fs.blocks.push(BlockCnt {
            first_var: fs.nactvar,
            first_label: fs.labels.len(),
            first_goto: fs.gotos.len(),
            kind,
            upval: false,
            upval_inside: false,
            inside_tbc,
            break_list: NO_JUMP,
            continue_list: NO_JUMP,
        });
    }

    pub(crate) fn leave_block(&mut self) -> CompileResult<()> {
        let fs = self.fs_mut();
        let bl = fs.blocks.pop().unwrap_or_else(|| unreachable!());
        let stklevel = fs.reg_level(bl.first_var);
        fs.remove_vars(bl.first_var);
        fs.labels.truncate(bl.first_label);
        if bl.kind != BlockKind::Plain && bl.break_list != NO_JUMP {
            let target = fs.get_label();
            if bl.upval_inside {
                fs.emit(Instruction::Close { from: stklevel });
            }
            fs.patch_list(bl.break_list, target);
        } else if bl.upval {
            fs.emit(Instruction::Close { from: stklevel });
        }
        fs.free_reg = stklevel;
        for g in &mut fs.gotos[bl.first_goto..] {
            if g.nactvar > bl.first_var {
                g.nactvar = bl.first_var;
            }
            g.close |= bl.upval;
        }
        if let Some(parent) = fs.blocks.last_mut() {
            parent.upval_inside |= bl.upval_inside;
        }
        // Migrated gotos may now see labels of the enclosing block
        if !fs.blocks.is_empty() {
            self.solve_migrated_gotos(bl.first_goto);
        }
        Ok(())
    }

    /// Matches gotos migrated out of a closed block against labels already
    /// declared in the now-innermost block. Matches are necessarily
    /// backward jumps; a jump that left a capturing block is routed
    /// through a close trampoline.
    fn solve_migrated_gotos(&mut self, first_goto: usize) {
        let fs = self.fs_mut();
        let first_label = fs.blocks.last().map_or(0, |b| b.first_label);
        let mut i = first_goto;
        while i < fs.gotos.len() {
            let target = fs.labels[first_label..]
                .iter()
                .find(|l| l.name == fs.gotos[i].name)
                .map(|l| (l.pc, l.nactvar));
            let Some((pc, nactvar)) = target else {
                i += 1;
                continue;
            };
            let g = fs.gotos.remove(i);
            if g.close {
                let skip = fs.emit_jump();
                let tramp = fs.get_label();
                let from = fs.reg_level(nactvar);
                fs.emit(Instruction::Close { from });
                let back = fs.emit_jump();
                fs.fix_jump_to(back, pc);
                fs.patch_list(g.pc, tramp);
                let here = fs.get_label();
                fs.fix_jump_to(skip, here);
            } else {
                fs.patch_list(g.pc, pc);
            }
        }
    }

    // ===== Labels and gotos =====

    /// Declares `::name::`, resolving pending forward gotos of the
    /// current block. `trailing` marks a label at the very end of its
    /// block, which does not guard any local's scope.
    pub(crate) fn create_label(
        &mut self,
        name: String,
        span: Span,
        trailing: bool,
    ) -> CompileResult<()> {
        let (first_label, first_var) = {
            let bl = self.fs().blocks.last().unwrap_or_else(|| unreachable!());
            (bl.first_label, bl.first_var)
        };
        if self.fs().labels[first_label..]
            .iter()
            .any(|l| l.name == name)
        {
            return Err(self.syntax_error(
                span,
                &format!("label '{}' already defined", name),
                "duplicate label",
            ));
        }
        let nactvar = if trailing {
            first_var
        } else {
            self.fs().nactvar
        };

        // Scope check before emitting anything
        let first_goto = self.fs().blocks.last().map_or(0, |b| b.first_goto);
        let mut needs_close = false;
        for g in &self.fs().gotos[first_goto..] {
            if g.name != name {
                continue;
            }
            if g.nactvar < nactvar {
                let entered = self.fs().vars[g.nactvar].name.clone();
                let gspan = g.span;
                return Err(self.semantic_error(
                    gspan,
                    &format!("'goto {}' jumps into the scope of local '{}'", name, entered),
                    "jump crosses a declaration",
                ));
            }
            needs_close |= g.close;
        }

        let fs = self.fs_mut();
        let target = fs.get_label();
        if needs_close {
            let from = fs.reg_level(nactvar);
            fs.emit(Instruction::Close { from });
        }
        fs.labels.push(LabelDesc {
            name: name.clone(),
            pc: target,
            line: span.line,
            nactvar,
        });
        let mut i = first_goto;
        while i < fs.gotos.len() {
            if fs.gotos[i].name == name {
                let g = fs.gotos.remove(i);
                fs.patch_list(g.pc, target);
            } else {
                i += 1;
            }
        }
        Ok(())
    }

    pub(crate) fn pending_goto(&mut self, name: String, span: Span) {
        let fs = self.fs_mut();
        let pc = fs.emit_jump();
        let nactvar = fs.nactvar;
        fs.gotos.push(GotoDesc {
            name,
            pc,
            span,
            nactvar,
            close: false,
        });
    }

    // ===== Scope resolution =====

    /// Resolves a name to a local, upvalue, compile-time constant, or
    /// (falling back) an indexed access on the environment upvalue.
    pub(crate) fn single_var(&mut self, name: &str, _span: Span) -> CompileResult<ExpDesc> {
        let top = self.fs.len() - 1;
        if let Some(var) = self.resolve_var(top, name) {
            return Ok(match var {
                VarRef::Local { reg, vidx } => {
                    let var = &self.fs().vars[vidx];
                    let hint = if var.observed.is_empty() {
                        var.hint
                    } else {
                        var.observed
                    };
                    ExpDesc::with_hint(ExpKind::Local { reg, vidx }, hint)
                }
                VarRef::Upval { idx } => ExpDesc::new(ExpKind::Upval { idx }),
                VarRef::Ctc { value, hint } => ExpDesc::with_hint(ctc_kind(value), hint),
            });
        }
        let upval = self.resolve_env(top);
        let fs = self.fs_mut();
        let key = fs.string_const(name);
        Ok(ExpDesc::new(ExpKind::IndexedUp { upval, key }))
    }

    fn resolve_var(&mut self, level: usize, name: &str) -> Option<VarRef> {
        if let Some(vidx) = self.fs[level].search_var(name) {
            let var = &self.fs[level].vars[vidx];
            if let VarKind::Ctc(value) = &var.kind {
                return Some(VarRef::Ctc {
                    value: value.clone(),
                    hint: var.hint,
                });
            }
            return Some(VarRef::Local { reg: var.reg, vidx });
        }
        if let Some(idx) = self.find_upvalue(level, name) {
            return Some(VarRef::Upval { idx });
        }
        if level == 0 {
            return None;
        }
        match self.resolve_var(level - 1, name)? {
            VarRef::Local { reg, vidx } => {
                let readonly = self.fs[level - 1].vars[vidx].read_only();
                self.mark_upval(level - 1, vidx);
                let idx = self.add_upvalue(level, name, true, reg, readonly);
                Some(VarRef::Upval { idx })
            }
            VarRef::Upval { idx: pidx } => {
                let readonly = self.fs[level - 1].readonly_upvals[pidx as usize];
                let idx = self.add_upvalue(level, name, false, pidx, readonly);
                Some(VarRef::Upval { idx })
            }
            ctc @ VarRef::Ctc { .. } => Some(ctc),
        }
    }

    fn find_upvalue(&self, level: usize, name: &str) -> Option<u8> {
        self.fs[level]
            .proto
            .upvalues
            .iter()
            .position(|u| u.name == name)
            .map(|i| i as u8)
    }

    fn add_upvalue(&mut self, level: usize, name: &str, in_stack: bool, index: u8, readonly: bool) -> u8 {
        let fs = &mut self.fs[level];
        fs.proto.upvalues.push(UpvalDesc {
            name: name.to_owned(),
            in_stack,
            index,
        });
        fs.readonly_upvals.push(readonly);
        (fs.proto.upvalues.len() - 1) as u8
    }

    /// Marks the block owning `vidx` in function `level` as having a
    /// captured local.
    fn mark_upval(&mut self, level: usize, vidx: usize) {
        let fs = &mut self.fs[level];
        for bl in fs.blocks.iter_mut().rev() {
            if bl.first_var <= vidx {
                bl.upval = true;
                bl.upval_inside = true;
                return;
            }
        }
    }

    /// Index of the environment upvalue in function `level`, threading it
    /// down from the top-level function on first use.
    fn resolve_env(&mut self, level: usize) -> u8 {
        if let Some(idx) = self.find_upvalue(level, "_ENV") {
            return idx;
        }
        debug_assert!(level > 0);
        let parent = self.resolve_env(level - 1);
        self.add_upvalue(level, "_ENV", false, parent, false)
    }

    /// Whether assigning through `var` is rejected, returning the
    /// variable's name when it is a constant.
    pub(crate) fn check_writable(&self, var: &ExpDesc, span: Span) -> CompileResult<()> {
        let name = match var.kind {
            ExpKind::Local { vidx, .. } => {
                let v = &self.fs().vars[vidx];
                if v.read_only() {
                    Some(v.name.clone())
                } else {
                    None
                }
            }
            ExpKind::Upval { idx } => {
                if self.fs().readonly_upvals[idx as usize] {
                    Some(self.fs().proto.upvalues[idx as usize].name.clone())
                } else {
                    None
                }
            }
            _ => None,
        };
        match name {
            Some(name) => Err(self.semantic_error(
                span,
                &format!("attempt to assign to const variable '{}'", name),
                "declared as a constant",
            )),
            None => Ok(()),
        }
    }

    /// Declares a local, running the shadowing warnings first.
    pub(crate) fn declare_local(
        &mut self,
        name: String,
        kind: VarKind,
        hint: TypeHint,
        span: Span,
    ) -> CompileResult<usize> {
        if !name.starts_with('(') {
            let shadowed = self
                .fs()
                .vars
                .iter()
                .take(self.fs().nactvar)
                .rev()
                .find(|v| v.name == name)
                .map(|v| v.line);
            if let Some(line) = shadowed {
                self.warn(
                    WarningKind::VarShadow,
                    span,
                    &format!("declaration shadows local '{}' (line {})", name, line),
                    "shadowing declaration",
                )?;
            } else if COMMON_GLOBALS.contains(&name.as_str()) {
                self.warn(
                    WarningKind::GlobalShadow,
                    span,
                    &format!("declaration shadows the global '{}'", name),
                    "shadowing declaration",
                )?;
            }
        }
        Ok(self.fs_mut().new_local(name, kind, hint, span.line))
    }

    /// Looks up the declared shape of a named function variable, walking
    /// enclosing functions.
    pub(crate) fn shape_of_name(&self, name: &str) -> Option<FuncShape> {
        for fs in self.fs.iter().rev() {
            if let Some(vidx) = fs.search_var(name) {
                return fs.vars[vidx].shape.clone();
            }
        }
        None
    }

    /// Looks up the member table of a named enum local.
    pub(crate) fn enum_members_of(&self, name: &str) -> Option<&FxHashMap<String, i64>> {
        for fs in self.fs.iter().rev() {
            if let Some(vidx) = fs.search_var(name) {
                return fs.vars[vidx].enum_members.as_ref();
            }
        }
        None
    }

    /// The mangled form of a private/protected member name, if the
    /// innermost class being compiled declares one.
    pub(crate) fn mangle_member(&self, name: &str) -> Option<String> {
        self.class_stack
            .last()
            .and_then(|ctx| ctx.mangled.get(name))
            .cloned()
    }

    pub(crate) fn parent_token_range(&self) -> Option<(usize, usize)> {
        self.class_stack.last().and_then(|ctx| ctx.parent_range)
    }

    pub(crate) fn push_class(
        &mut self,
        mangled: FxHashMap<String, String>,
        parent_range: Option<(usize, usize)>,
    ) {
        self.class_stack.push(ClassCtx {
            mangled,
            parent_range,
        });
    }

    pub(crate) fn pop_class(&mut self) {
        self.class_stack.pop();
    }

    pub(crate) fn next_priv_tag(&mut self) -> u32 {
        self.priv_counter += 1;
        self.priv_counter
    }

    pub(crate) fn keyword_active(&self, word: ToggledWord) -> bool {
        self.keyword_states
            .get(&word)
            .map_or(false, |s| s.enabled())
    }

    pub(crate) fn declare_global(&mut self, name: String) {
        self.declared_globals.insert(name);
    }

    pub(crate) fn is_declared_global(&self, name: &str) -> bool {
        self.declared_globals.contains(name)
    }

    pub(crate) fn record_export(&mut self, name: String, span: Span) -> CompileResult<()> {
        if self.fs.len() > 1 {
            return Err(self.syntax_error(
                span,
                "'export' is only allowed at the top level of a chunk",
                "inside a nested function",
            ));
        }
        self.exports.push((name, span));
        Ok(())
    }

    /// Builds and returns the export table at the end of the chunk.
    fn emit_export_table(&mut self) -> CompileResult<()> {
        let exports = std::mem::take(&mut self.exports);
        let fs = self.fs_mut();
        fs.reserve_regs(1)?;
        let table = fs.free_reg - 1;
        let narray = 0;
        fs.emit(Instruction::NewTable {
            dst: table,
            narray,
            nhash: exports.len().min(u8::MAX as usize) as u8,
        });
        for (name, span) in exports {
            let mut e = self.single_var(&name, span)?;
            let fs = self.fs_mut();
            let src = fs.exp_to_any_reg(&mut e)?;
            let key = fs.string_const(&name);
            fs.emit(Instruction::SetField { table, key, src });
            fs.free_exp(&e);
        }
        let fs = self.fs_mut();
        fs.emit(Instruction::Return {
            base: table,
            count: 2,
        });
        fs.free_reg = table;
        Ok(())
    }

    // ===== break / continue =====

    /// Appends a jump to the break or continue list of the `depth`-th
    /// enclosing eligible block.
    pub(crate) fn loop_jump(
        &mut self,
        is_break: bool,
        depth: u32,
        span: Span,
    ) -> CompileResult<()> {
        let eligible = |kind: BlockKind| {
            if is_break {
                kind != BlockKind::Plain
            } else {
                kind == BlockKind::Loop
            }
        };
        let mut seen = 0u32;
        let mut target = None;
        for (i, bl) in self.fs().blocks.iter().enumerate().rev() {
            if eligible(bl.kind) {
                seen += 1;
                if seen == depth {
                    target = Some(i);
                    break;
                }
            }
        }
        let total = self
            .fs()
            .blocks
            .iter()
            .filter(|b| eligible(b.kind))
            .count();
        let Some(target) = target else {
            let what = if is_break { "break" } else { "continue" };
            let plural = if total == 1 { "loop" } else { "loops" };
            return Err(self.semantic_error(
                span,
                &format!(
                    "cannot {} {} levels with {} enclosing {} available",
                    what, depth, total, plural
                ),
                "no matching enclosing loop",
            ));
        };
        let fs = self.fs_mut();
        let j = fs.emit_jump();
        let mut list = if is_break {
            fs.blocks[target].break_list
        } else {
            fs.blocks[target].continue_list
        };
        fs.concat_list(&mut list, j);
        if is_break {
            fs.blocks[target].break_list = list;
        } else {
            fs.blocks[target].continue_list = list;
        }
        Ok(())
    }

    /// Detaches and returns the continue list of the innermost loop
    /// block, for patching at the loop's scope-end point.
    pub(crate) fn take_continue_list(&mut self) -> i32 {
        let fs = self.fs_mut();
        let bl = fs
            .blocks
            .iter_mut()
            .rev()
            .find(|b| b.kind == BlockKind::Loop)
            .unwrap_or_else(|| unreachable!());
        std::mem::replace(&mut bl.continue_list, NO_JUMP)
    }
}

pub(crate) fn ctc_kind(value: CtcValue) -> ExpKind {
    match value {
        CtcValue::Nil => ExpKind::Nil,
        CtcValue::True => ExpKind::True,
        CtcValue::False => ExpKind::False,
        CtcValue::Int(i) => ExpKind::Int(i),
        CtcValue::Float(f) => ExpKind::Float(f),
        CtcValue::Str(s) => ExpKind::Str(s),
    }
}
