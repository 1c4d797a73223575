//! Statement compilation.

use super::Parser;
use crate::codegen::{BlockKind, CtcValue, ExpDesc, ExpKind, VarKind};
use crate::diag::WarningKind;
use crate::error::CompileResult;
use crate::token::{AugOp, Span, ToggledWord, Token};
use crate::typehint::{PrimType, TypeHint};
use rustc_hash::FxHashMap;
use vela_bytecode::{CmpOp, Constant, Instruction, Proto, NO_JUMP};

use crate::codegen::BinOpr;

/// How a statement affects the flow of the statements after it.
enum StatFlow {
    Normal,
    /// Control never falls through (`return`, `break`, `goto`, ...).
    Terminates,
    /// A label; code after it is reachable again.
    Label,
}

fn binop_of_aug(op: AugOp) -> BinOpr {
    match op {
        AugOp::Add => BinOpr::Arith(vela_bytecode::ArithOp::Add),
        AugOp::Sub => BinOpr::Arith(vela_bytecode::ArithOp::Sub),
        AugOp::Mul => BinOpr::Arith(vela_bytecode::ArithOp::Mul),
        AugOp::Div => BinOpr::Arith(vela_bytecode::ArithOp::Div),
        AugOp::IDiv => BinOpr::Arith(vela_bytecode::ArithOp::IDiv),
        AugOp::Mod => BinOpr::Arith(vela_bytecode::ArithOp::Mod),
        AugOp::Pow => BinOpr::Arith(vela_bytecode::ArithOp::Pow),
        AugOp::Concat => BinOpr::Concat,
        AugOp::Shl => BinOpr::Arith(vela_bytecode::ArithOp::Shl),
        AugOp::Shr => BinOpr::Arith(vela_bytecode::ArithOp::Shr),
        AugOp::BAnd => BinOpr::Arith(vela_bytecode::ArithOp::BAnd),
        AugOp::BOr => BinOpr::Arith(vela_bytecode::ArithOp::BOr),
    }
}

fn ctc_value_of(e: &ExpDesc) -> Option<CtcValue> {
    if e.has_jumps() {
        return None;
    }
    match &e.kind {
        ExpKind::Nil => Some(CtcValue::Nil),
        ExpKind::True => Some(CtcValue::True),
        ExpKind::False => Some(CtcValue::False),
        ExpKind::Int(i) => Some(CtcValue::Int(*i)),
        ExpKind::Float(f) => Some(CtcValue::Float(*f)),
        ExpKind::Str(s) => Some(CtcValue::Str(s.clone())),
        _ => None,
    }
}

impl<'src> Parser<'src> {
    fn block_follow(&self, with_until: bool) -> bool {
        match self.current().normalized() {
            Token::Else | Token::Elseif | Token::End | Token::Eof => true,
            Token::Until => with_until,
            _ => false,
        }
    }

    fn at_clause_marker(&self) -> bool {
        matches!(self.current(), Token::Identifier(s) if s == "case" || s == "default")
    }

    pub(crate) fn statlist(&mut self) -> CompileResult<()> {
        self.statlist_impl(false)
    }

    /// Statement list of one switch clause, which additionally ends at
    /// the next `case` or `default` marker.
    fn statlist_clause(&mut self) -> CompileResult<()> {
        self.statlist_impl(true)
    }

    fn statlist_impl(&mut self, in_clause: bool) -> CompileResult<()> {
        let mut terminated = false;
        let mut warned = false;
        loop {
            if self.block_follow(true) || (in_clause && self.at_clause_marker()) {
                return Ok(());
            }
            if terminated && !warned && self.current() != &Token::ColonColon {
                let span = self.current_span();
                self.warn(
                    WarningKind::UnreachableCode,
                    span,
                    "unreachable code",
                    "the statement above always transfers control",
                )?;
                warned = true;
            }
            match self.statement()? {
                StatFlow::Normal => {}
                StatFlow::Terminates => terminated = true,
                StatFlow::Label => {
                    terminated = false;
                    warned = false;
                }
            }
        }
    }

    fn statement(&mut self) -> CompileResult<StatFlow> {
        let span = self.current_span();
        self.enter_level(span)?;
        self.mark_pos();
        let flow = match self.current().normalized().clone() {
            Token::Semicolon => {
                self.advance();
                StatFlow::Normal
            }
            Token::If => {
                self.if_stat(span.line)?;
                StatFlow::Normal
            }
            Token::While => {
                self.while_stat(span.line)?;
                StatFlow::Normal
            }
            Token::Do => {
                self.advance();
                self.enter_block(BlockKind::Plain);
                self.statlist()?;
                self.expect_match(&Token::End, "end", "do", span.line)?;
                self.leave_block()?;
                StatFlow::Normal
            }
            Token::For => {
                self.for_stat(span.line)?;
                StatFlow::Normal
            }
            Token::Repeat => {
                self.repeat_stat(span.line)?;
                StatFlow::Normal
            }
            Token::Function => {
                self.func_stat(span.line)?;
                StatFlow::Normal
            }
            Token::Local => {
                self.advance();
                if self.accept(&Token::Function) {
                    self.local_func()?;
                } else if self.current().normalized() == &Token::Class {
                    self.advance();
                    self.class_stat(span.line, true)?;
                } else {
                    self.local_stat(false)?;
                }
                StatFlow::Normal
            }
            Token::Let => {
                self.warn(
                    WarningKind::Deprecated,
                    span,
                    "'let' is deprecated, use 'local'",
                    "used here",
                )?;
                self.advance();
                self.local_stat(false)?;
                StatFlow::Normal
            }
            Token::Const => {
                self.warn(
                    WarningKind::Deprecated,
                    span,
                    "'const' is deprecated, use 'local' with '<const>'",
                    "used here",
                )?;
                self.advance();
                self.local_stat(true)?;
                StatFlow::Normal
            }
            Token::ColonColon => {
                self.label_stat()?;
                StatFlow::Label
            }
            Token::Return => {
                self.ret_stat(span)?;
                StatFlow::Terminates
            }
            Token::Break => {
                self.break_continue(true)?;
                StatFlow::Terminates
            }
            Token::Continue => {
                self.break_continue(false)?;
                StatFlow::Terminates
            }
            Token::Goto => {
                self.advance();
                let (name, gspan) = self.expect_ident("label name")?;
                self.pending_goto(name, gspan);
                StatFlow::Terminates
            }
            Token::Switch => {
                self.switch_stat(span.line)?;
                StatFlow::Normal
            }
            Token::Class => {
                self.advance();
                self.class_stat(span.line, false)?;
                StatFlow::Normal
            }
            Token::Enum => {
                self.enum_stat(span.line)?;
                StatFlow::Normal
            }
            Token::Export => {
                self.export_stat(span)?;
                StatFlow::Normal
            }
            Token::Global => {
                self.global_stat()?;
                StatFlow::Normal
            }
            Token::Use => {
                self.use_stat();
                StatFlow::Normal
            }
            _ => {
                self.expr_stat(span)?;
                StatFlow::Normal
            }
        };
        self.leave_level();
        let fs = self.fs_mut();
        let level = fs.active_reg_level();
        debug_assert!(fs.free_reg >= level);
        fs.free_reg = level;
        Ok(flow)
    }

    // ===== Conditionals and loops =====

    fn test_then_block(&mut self, escape: &mut i32) -> CompileResult<()> {
        self.advance(); // `if` or `elseif`
        let condexit = self.cond()?;
        self.expect(&Token::Then, "then")?;
        self.enter_block(BlockKind::Plain);
        self.statlist()?;
        self.leave_block()?;
        if matches!(
            self.current().normalized(),
            Token::Else | Token::Elseif
        ) {
            let fs = self.fs_mut();
            let j = fs.emit_jump();
            fs.concat_list(escape, j);
        }
        self.fs_mut().patch_to_here(condexit);
        Ok(())
    }

    fn if_stat(&mut self, line: u32) -> CompileResult<()> {
        let mut escape = NO_JUMP;
        self.test_then_block(&mut escape)?;
        while self.current().normalized() == &Token::Elseif {
            self.test_then_block(&mut escape)?;
        }
        if self.accept(&Token::Else) {
            self.enter_block(BlockKind::Plain);
            self.statlist()?;
            self.leave_block()?;
        }
        self.expect_match(&Token::End, "end", "if", line)?;
        self.fs_mut().patch_to_here(escape);
        Ok(())
    }

    fn while_stat(&mut self, line: u32) -> CompileResult<()> {
        self.advance();
        let top = self.fs_mut().get_label();
        self.enter_block(BlockKind::Loop);
        let condexit = self.cond()?;
        self.expect(&Token::Do, "do")?;
        self.enter_block(BlockKind::Plain);
        self.statlist()?;
        // `continue` lands at the body's scope end, before its `Close`
        let cont_target = self.fs_mut().get_label();
        self.leave_block()?;
        let cont = self.take_continue_list();
        self.fs_mut().patch_list(cont, cont_target);
        let fs = self.fs_mut();
        let back = fs.emit_jump();
        fs.fix_jump_to(back, top);
        self.expect_match(&Token::End, "end", "while", line)?;
        self.leave_block()?;
        self.fs_mut().patch_to_here(condexit);
        Ok(())
    }

    fn repeat_stat(&mut self, line: u32) -> CompileResult<()> {
        self.advance();
        let top = self.fs_mut().get_label();
        self.enter_block(BlockKind::Loop);
        self.enter_block(BlockKind::Plain);
        self.statlist()?;
        self.expect_match(&Token::Until, "until", "repeat", line)?;
        // `continue` re-tests the condition; body locals are still in scope
        let cont = self.take_continue_list();
        self.fs_mut().patch_to_here(cont);
        let mut condexit = self.cond()?;
        let (upval, stklevel) = {
            let fs = self.fs();
            let bl = fs.blocks.last().unwrap_or_else(|| unreachable!());
            (bl.upval, fs.reg_level(bl.first_var))
        };
        self.leave_block()?;
        if upval {
            // repeating must close the body's captured locals first
            let fs = self.fs_mut();
            let exit = fs.emit_jump();
            fs.patch_to_here(condexit);
            fs.emit(Instruction::Close { from: stklevel });
            condexit = fs.emit_jump();
            fs.patch_to_here(exit);
        }
        self.fs_mut().patch_list(condexit, top);
        self.leave_block()?;
        Ok(())
    }

    fn exp1(&mut self) -> CompileResult<()> {
        let mut e = self.expr()?;
        self.fs_mut().exp_to_next_reg(&mut e)?;
        Ok(())
    }

    fn for_stat(&mut self, line: u32) -> CompileResult<()> {
        self.advance();
        self.enter_block(BlockKind::Loop);
        let (name, nspan) = self.expect_ident("variable name")?;
        match self.current() {
            Token::Equal => self.fornum(name, nspan, line)?,
            Token::Comma | Token::In => self.forlist(name, nspan, line)?,
            _ => return Err(self.error_expected("'=' or 'in'")),
        }
        self.expect_match(&Token::End, "end", "for", line)?;
        self.leave_block()?;
        Ok(())
    }

    fn fornum(&mut self, name: String, nspan: Span, line: u32) -> CompileResult<()> {
        let base = self.fs().free_reg;
        {
            let fs = self.fs_mut();
            for _ in 0..3 {
                fs.new_local(
                    "(for state)".to_owned(),
                    VarKind::Regular,
                    TypeHint::default(),
                    line,
                );
            }
        }
        self.declare_local(name, VarKind::Regular, TypeHint::default(), nspan)?;
        self.expect(&Token::Equal, "=")?;
        self.exp1()?; // initial value
        self.expect(&Token::Comma, ",")?;
        self.exp1()?; // limit
        if self.accept(&Token::Comma) {
            self.exp1()?; // step
        } else {
            let mut step = ExpDesc::new(ExpKind::Int(1));
            self.fs_mut().exp_to_next_reg(&mut step)?;
        }
        self.for_body(base, 1, true)
    }

    fn forlist(&mut self, name: String, nspan: Span, line: u32) -> CompileResult<()> {
        let base = self.fs().free_reg;
        {
            let fs = self.fs_mut();
            for _ in 0..3 {
                fs.new_local(
                    "(for state)".to_owned(),
                    VarKind::Regular,
                    TypeHint::default(),
                    line,
                );
            }
        }
        let mut nvars = 1;
        self.declare_local(name, VarKind::Regular, TypeHint::default(), nspan)?;
        while self.accept(&Token::Comma) {
            let (vname, vspan) = self.expect_ident("variable name")?;
            self.declare_local(vname, VarKind::Regular, TypeHint::default(), vspan)?;
            nvars += 1;
        }
        self.expect(&Token::In, "in")?;
        let (n, mut e, _) = self.explist()?;
        self.adjust_assign(3, n, &mut e)?;
        self.for_body(base, nvars, false)
    }

    fn for_body(&mut self, base: u8, nvars: usize, is_num: bool) -> CompileResult<()> {
        self.fs_mut().adjust_local_vars(3);
        self.expect(&Token::Do, "do")?;
        let prep = if is_num {
            self.fs_mut().emit(Instruction::ForPrep {
                base,
                offset: NO_JUMP,
            })
        } else {
            self.fs_mut().emit(Instruction::TForPrep {
                base,
                offset: NO_JUMP,
            })
        };
        self.enter_block(BlockKind::Plain);
        {
            let fs = self.fs_mut();
            fs.adjust_local_vars(nvars);
            fs.reserve_regs(nvars as u8)?;
        }
        self.statlist()?;
        let cont_target = self.fs_mut().get_label();
        self.leave_block()?;
        let cont = self.take_continue_list();
        let fs = self.fs_mut();
        fs.patch_list(cont, cont_target);
        // the prep jump skips the body, landing on the loop instruction
        let loop_pos = fs.get_label();
        let fixup = loop_pos - (prep as i32 + 1);
        match &mut fs.proto.code[prep] {
            Instruction::ForPrep { offset, .. } | Instruction::TForPrep { offset, .. } => {
                *offset = fixup;
            }
            _ => unreachable!(),
        }
        if is_num {
            let l = fs.emit(Instruction::ForLoop {
                base,
                offset: NO_JUMP,
            });
            if let Instruction::ForLoop { offset, .. } = &mut fs.proto.code[l] {
                *offset = prep as i32 + 1 - (l as i32 + 1);
            }
        } else {
            fs.emit(Instruction::TForCall {
                base,
                nresults: nvars as u8,
            });
            let l = fs.emit(Instruction::TForLoop {
                base,
                offset: NO_JUMP,
            });
            if let Instruction::TForLoop { offset, .. } = &mut fs.proto.code[l] {
                *offset = prep as i32 + 1 - (l as i32 + 1);
            }
        }
        Ok(())
    }

    fn break_continue(&mut self, is_break: bool) -> CompileResult<()> {
        let span = self.current_span();
        self.advance();
        let depth = if let Token::IntLiteral(n) = self.current() {
            let n = *n;
            self.advance();
            if n < 1 {
                let what = if is_break { "break" } else { "continue" };
                return Err(self.semantic_error(
                    span,
                    &format!("'{}' level must be at least 1", what),
                    "level given here",
                ));
            }
            n as u32
        } else {
            1
        };
        self.loop_jump(is_break, depth, span)
    }

    // ===== Labels and return =====

    fn label_stat(&mut self) -> CompileResult<()> {
        self.advance(); // `::`
        let (name, span) = self.expect_ident("label name")?;
        self.expect(&Token::ColonColon, "::")?;
        // trailing labels do not guard any local's scope
        let mut i = self.cursor();
        while self.token_at(i) == &Token::ColonColon
            && matches!(self.token_at(i + 1), Token::Identifier(_))
            && self.token_at(i + 2) == &Token::ColonColon
        {
            i += 3;
        }
        let trailing = matches!(
            self.token_at(i).normalized(),
            Token::End | Token::Else | Token::Elseif | Token::Until | Token::Eof
        );
        self.create_label(name, span, trailing)
    }

    fn ret_stat(&mut self, span: Span) -> CompileResult<()> {
        self.advance();
        let first = self.fs().active_reg_level();
        let declared = self.fs().ret_hint;
        if self.block_follow(true)
            || self.current() == &Token::Semicolon
            || self.at_clause_marker()
        {
            self.fs_mut().emit_return(first, Some(0));
        } else {
            let (n, mut e, hints) = self.explist()?;
            if declared.contains(PrimType::Void) {
                self.warn(
                    WarningKind::TypeMismatch,
                    span,
                    "returning a value from a function hinted 'void'",
                    "value returned here",
                )?;
            } else if !declared.is_empty() {
                if let Some(got) = hints.first() {
                    if !got.is_empty() && !declared.compatible_with(got) {
                        let msg = format!(
                            "return value of type '{}' does not match the declared return type '{}'",
                            got, declared
                        );
                        self.warn(WarningKind::TypeMismatch, span, &msg, "returned here")?;
                    }
                }
            }
            if e.is_multiret() {
                self.fs_mut().set_returns(&e, None)?;
                self.fs_mut().emit_return(first, None);
            } else if n == 1 {
                let reg = self.fs_mut().exp_to_any_reg(&mut e)?;
                self.fs_mut().emit_return(reg, Some(1));
                self.fs_mut().free_exp(&e);
            } else {
                self.fs_mut().exp_to_next_reg(&mut e)?;
                self.fs_mut().emit_return(first, Some(n as u8));
            }
        }
        self.accept(&Token::Semicolon);
        Ok(())
    }

    // ===== Multiple assignment =====

    /// Balances `nvars` targets against `nexps` produced values, spilling
    /// extra values and nil-filling missing ones.
    pub(crate) fn adjust_assign(
        &mut self,
        nvars: usize,
        nexps: usize,
        e: &mut ExpDesc,
    ) -> CompileResult<()> {
        let fs = self.fs_mut();
        let needed = nvars as i64 - nexps as i64;
        if e.is_multiret() {
            let extra = (needed + 1).max(0) as u8;
            fs.set_returns(e, Some(extra))?;
        } else {
            if e.kind != ExpKind::Void {
                fs.exp_to_next_reg(e)?;
            }
            if needed > 0 {
                let from = fs.free_reg;
                fs.load_nil(from, needed as u8);
            }
        }
        if needed > 0 {
            fs.reserve_regs(needed as u8)?;
        } else {
            fs.free_reg = (fs.free_reg as i64 + needed) as u8;
        }
        Ok(())
    }

    fn check_assignable(
        &self,
        e: &ExpDesc,
        name: Option<&str>,
        span: Span,
    ) -> CompileResult<()> {
        match e.kind {
            ExpKind::Local { .. }
            | ExpKind::Upval { .. }
            | ExpKind::IndexedUp { .. }
            | ExpKind::Indexed { .. }
            | ExpKind::IndexedStr { .. }
            | ExpKind::IndexedInt { .. } => self.check_writable(e, span),
            _ => Err(match name {
                // A bare name that resolved to a compile-time constant
                Some(n) => self.semantic_error(
                    span,
                    &format!("attempt to assign to const variable '{}'", n),
                    "declared as a constant",
                ),
                None => self.syntax_error(
                    span,
                    "cannot assign to this expression",
                    "not an assignable target",
                ),
            }),
        }
    }

    fn warn_implicit_global(
        &mut self,
        v: &ExpDesc,
        name: &str,
        span: Span,
    ) -> CompileResult<()> {
        if !matches!(v.kind, ExpKind::IndexedUp { .. }) {
            return Ok(());
        }
        if !self.keyword_active(ToggledWord::Global) || self.is_declared_global(name) {
            return Ok(());
        }
        self.warn(
            WarningKind::ImplicitGlobal,
            span,
            &format!("assignment to undeclared global '{}'", name),
            "not declared with 'global'",
        )
    }

    fn bare_target_name(&self) -> Option<String> {
        match (self.current(), self.peek(1)) {
            (Token::Identifier(n), Token::Equal | Token::Comma | Token::Compound(_)) => {
                Some(n.clone())
            }
            _ => None,
        }
    }

    fn expr_stat(&mut self, span: Span) -> CompileResult<()> {
        let bare = self.bare_target_name();
        let e = self.suffixed_exp()?;
        match self.current() {
            Token::Equal | Token::Comma => self.assignment(e, bare, span),
            Token::Compound(op) => {
                let op = *op;
                self.compound_assign(e, op, span)
            }
            _ => {
                if !matches!(e.kind, ExpKind::Call { .. }) {
                    return Err(self.syntax_error(
                        span,
                        "syntax error: expression is not a statement",
                        "only calls and assignments can stand alone",
                    ));
                }
                if let Some(shape) = self.last_call_shape.take() {
                    if shape.ret.promises_value() {
                        self.warn(
                            WarningKind::DiscardedReturn,
                            span,
                            "call result is discarded",
                            "the callee is hinted to return a value",
                        )?;
                    }
                }
                Ok(())
            }
        }
    }

    fn assignment(
        &mut self,
        first: ExpDesc,
        first_name: Option<String>,
        span: Span,
    ) -> CompileResult<()> {
        let mut targets: Vec<(ExpDesc, Option<String>, Span)> = vec![(first, first_name, span)];
        while self.accept(&Token::Comma) {
            let tspan = self.current_span();
            let bare = self.bare_target_name();
            let t = self.suffixed_exp()?;
            targets.push((t, bare, tspan));
        }
        for (t, name, tspan) in &targets {
            self.check_assignable(t, name.as_deref(), *tspan)?;
        }
        self.expect(&Token::Equal, "=")?;
        let vspan = self.current_span();
        let (n, mut e, hints) = self.explist()?;

        for (i, (t, _, _)) in targets.iter().enumerate() {
            if let ExpKind::Local { vidx, .. } = t.kind {
                let declared = self.fs().vars[vidx].hint;
                let got = hints.get(i).copied().unwrap_or_default();
                if !declared.is_empty() && !got.is_empty() && !declared.compatible_with(&got) {
                    let name = self.fs().vars[vidx].name.clone();
                    let msg = format!(
                        "value of type '{}' assigned to '{}' hinted '{}'",
                        got, name, declared
                    );
                    self.warn(WarningKind::TypeMismatch, vspan, &msg, "assigned here")?;
                }
                let var = &mut self.fs_mut().vars[vidx];
                var.observed = got;
                var.shape = None;
                var.field_hints = None;
            }
        }

        if n == targets.len() {
            // the last value is stored straight into the last target
            let (last, _, _) = targets.last().unwrap_or_else(|| unreachable!());
            self.fs_mut().store_var(last, &mut e)?;
            for (t, _, _) in targets[..targets.len() - 1].iter().rev() {
                let fs = self.fs_mut();
                let reg = fs.free_reg - 1;
                let mut v = ExpDesc::new(ExpKind::NonReloc { reg });
                fs.store_var(t, &mut v)?;
            }
        } else {
            self.adjust_assign(targets.len(), n, &mut e)?;
            for (t, _, _) in targets.iter().rev() {
                let fs = self.fs_mut();
                let reg = fs.free_reg - 1;
                let mut v = ExpDesc::new(ExpKind::NonReloc { reg });
                fs.store_var(t, &mut v)?;
            }
        }
        let warn_targets: Vec<(ExpDesc, String, Span)> = targets
            .into_iter()
            .filter_map(|(t, name, tspan)| name.map(|n| (t, n, tspan)))
            .collect();
        for (t, name, tspan) in warn_targets {
            self.warn_implicit_global(&t, &name, tspan)?;
        }
        Ok(())
    }

    /// Desugars `target op= expr`, evaluating the target's table and key
    /// only once.
    fn compound_assign(&mut self, t: ExpDesc, op: AugOp, span: Span) -> CompileResult<()> {
        self.advance(); // the compound token
        self.check_assignable(&t, None, span)?;
        if let ExpKind::Local { vidx, .. } = t.kind {
            // the operator's result type is not tracked
            self.fs_mut().vars[vidx].observed = TypeHint::default();
        }
        // read the current value without disturbing the target's registers
        let mut cur = {
            let fs = self.fs_mut();
            match t.kind {
                ExpKind::Local { reg, vidx } => ExpDesc::new(ExpKind::Local { reg, vidx }),
                ExpKind::Upval { idx } => {
                    fs.reserve_regs(1)?;
                    let dst = fs.free_reg - 1;
                    fs.emit(Instruction::GetUpval { dst, upval: idx });
                    ExpDesc::new(ExpKind::NonReloc { reg: dst })
                }
                ExpKind::IndexedUp { upval, key } => {
                    fs.reserve_regs(1)?;
                    let dst = fs.free_reg - 1;
                    fs.emit(Instruction::GetUpvalField { dst, upval, key });
                    ExpDesc::new(ExpKind::NonReloc { reg: dst })
                }
                ExpKind::Indexed { table, key } => {
                    fs.reserve_regs(1)?;
                    let dst = fs.free_reg - 1;
                    fs.emit(Instruction::GetIndex { dst, table, key });
                    ExpDesc::new(ExpKind::NonReloc { reg: dst })
                }
                ExpKind::IndexedStr { table, key } => {
                    fs.reserve_regs(1)?;
                    let dst = fs.free_reg - 1;
                    fs.emit(Instruction::GetField { dst, table, key });
                    ExpDesc::new(ExpKind::NonReloc { reg: dst })
                }
                ExpKind::IndexedInt { table, key } => {
                    fs.reserve_regs(1)?;
                    let dst = fs.free_reg - 1;
                    fs.emit(Instruction::GetIndexInt { dst, table, key });
                    ExpDesc::new(ExpKind::NonReloc { reg: dst })
                }
                _ => unreachable!("target already validated"),
            }
        };
        let bop = binop_of_aug(op);
        self.fs_mut().infix(bop, &mut cur)?;
        let rhs = self.expr()?;
        self.fs_mut().posfix(bop, &mut cur, rhs)?;
        self.fs_mut().store_var(&t, &mut cur)?;
        Ok(())
    }

    // ===== Declarations =====

    fn local_func(&mut self) -> CompileResult<(String, Span)> {
        let (name, span) = self.expect_ident("function name")?;
        let vidx = self.declare_local(
            name.clone(),
            VarKind::Regular,
            TypeHint::of(PrimType::Function),
            span,
        )?;
        // in scope before the body, so the function can recurse
        self.fs_mut().adjust_local_vars(1);
        self.fs_mut().reserve_regs(1)?;
        let reg = self.fs().vars[vidx].reg;
        let (mut body, shape) = self.funcbody(false, span.line)?;
        self.fs_mut().exp_to_reg(&mut body, reg);
        self.fs_mut().vars[vidx].shape = Some(shape);
        Ok((name, span))
    }

    fn func_stat(&mut self, line: u32) -> CompileResult<()> {
        self.advance();
        let (name, span) = self.expect_ident("function name")?;
        let mut v = self.single_var(&name, span)?;
        let plain = !matches!(self.current(), Token::Dot | Token::Colon);
        let mut is_method = false;
        while self.current() == &Token::Dot {
            self.advance();
            let (field, _) = self.expect_ident("field name")?;
            let k = ExpDesc::new(ExpKind::Str(field));
            self.fs_mut().index_exp(&mut v, k)?;
        }
        if self.accept(&Token::Colon) {
            let (field, _) = self.expect_ident("method name")?;
            let k = ExpDesc::new(ExpKind::Str(field));
            self.fs_mut().index_exp(&mut v, k)?;
            is_method = true;
        }
        self.check_assignable(&v, plain.then_some(name.as_str()), span)?;
        let (mut body, shape) = self.funcbody(is_method, line)?;
        if plain {
            if let ExpKind::Local { vidx, .. } = v.kind {
                self.fs_mut().vars[vidx].shape = Some(shape);
            }
            self.warn_implicit_global(&v, &name, span)?;
        }
        self.fs_mut().store_var(&v, &mut body)?;
        Ok(())
    }

    /// `local` declarations. Returns the declared names for `export`.
    fn local_stat(&mut self, force_const: bool) -> CompileResult<Vec<(String, Span)>> {
        if matches!(self.current(), Token::LeftBrace | Token::LeftBracket) {
            return self.destructuring_local();
        }
        let mut names: Vec<(String, Span)> = Vec::new();
        let mut vidxs: Vec<usize> = Vec::new();
        let mut hints: Vec<TypeHint> = Vec::new();
        let mut to_close: Option<usize> = None;
        loop {
            let (name, span) = self.expect_ident("variable name")?;
            let mut kind = if force_const {
                VarKind::Const
            } else {
                VarKind::Regular
            };
            let mut hint = TypeHint::default();
            loop {
                if self.current() == &Token::Less {
                    let aspan = self.current_span();
                    self.advance();
                    let (attr, _) = self.expect_ident("attribute name")?;
                    self.expect(&Token::Greater, ">")?;
                    match attr.as_str() {
                        "const" => kind = VarKind::Const,
                        "close" => {
                            if to_close.is_some() {
                                return Err(self.semantic_error(
                                    aspan,
                                    "multiple to-be-closed variables in one list",
                                    "second '<close>' here",
                                ));
                            }
                            kind = VarKind::Close;
                            to_close = Some(names.len());
                        }
                        other => {
                            return Err(self.syntax_error(
                                aspan,
                                &format!("unknown attribute '{}'", other),
                                "expected 'const' or 'close'",
                            ));
                        }
                    }
                } else if self.current() == &Token::Colon {
                    self.advance();
                    hint = self.parse_type_hint(false)?;
                } else {
                    break;
                }
            }
            let vidx = self.declare_local(name.clone(), kind, hint, span)?;
            names.push((name, span));
            vidxs.push(vidx);
            hints.push(hint);
            if !self.accept(&Token::Comma) {
                break;
            }
        }
        let nvars = names.len();
        let (nexps, mut e, ehints) = if self.accept(&Token::Equal) {
            self.explist()?
        } else {
            (0, ExpDesc::new(ExpKind::Void), Vec::new())
        };

        for (i, declared) in hints.iter().enumerate() {
            let got = ehints.get(i).copied().unwrap_or_default();
            if !declared.is_empty() && !got.is_empty() && !declared.compatible_with(&got) {
                let msg = format!(
                    "value of type '{}' assigned to '{}' hinted '{}'",
                    got, names[i].0, declared
                );
                let span = names[i].1;
                self.warn(WarningKind::TypeMismatch, span, &msg, "declared here")?;
            }
            if !got.is_empty() {
                self.fs_mut().vars[vidxs[i]].observed = got;
            }
        }

        // The last expression's constructor shape follows the last name
        let field_shape = if nvars == nexps {
            e.table_fields.take()
        } else {
            None
        };

        let last = vidxs[nvars - 1];
        let ctc = if nvars == nexps && self.fs().vars[last].kind == VarKind::Const {
            ctc_value_of(&e)
        } else {
            None
        };
        if let Some(value) = ctc {
            // the constant never reaches a register
            let fs = self.fs_mut();
            fs.vars[last].kind = VarKind::Ctc(value);
            fs.adjust_local_vars(nvars - 1);
            fs.nactvar += 1;
        } else {
            self.adjust_assign(nvars, nexps, &mut e)?;
            self.fs_mut().adjust_local_vars(nvars);
        }
        if let Some(fields) = field_shape {
            self.fs_mut().vars[last].field_hints = Some(*fields);
        }
        if let Some(i) = to_close {
            let fs = self.fs_mut();
            let reg = fs.vars[vidxs[i]].reg;
            fs.emit(Instruction::Tbc { reg });
            if let Some(bl) = fs.blocks.last_mut() {
                bl.inside_tbc = true;
            }
        }
        Ok(names)
    }

    /// `local {a, b = field} = expr` and `local [x, y] = expr`.
    fn destructuring_local(&mut self) -> CompileResult<Vec<(String, Span)>> {
        let keyed = self.current() == &Token::LeftBrace;
        let open = self.current_span();
        self.advance();
        let mut fields: Vec<(String, Span, Option<String>)> = Vec::new();
        loop {
            let (name, span) = self.expect_ident("variable name")?;
            let source = if keyed && self.accept(&Token::Equal) {
                Some(self.expect_ident("field name")?.0)
            } else {
                None
            };
            fields.push((name, span, source));
            if !self.accept(&Token::Comma) {
                break;
            }
        }
        let closer = if keyed {
            Token::RightBrace
        } else {
            Token::RightBracket
        };
        let what = if keyed { "}" } else { "]" };
        self.expect_match(&closer, what, if keyed { "{" } else { "[" }, open.line)?;
        self.expect(&Token::Equal, "=")?;
        let mut e = self.expr()?;

        if fields.len() == 1 {
            let (name, span, source) = fields.pop().unwrap_or_else(|| unreachable!());
            let key = if keyed {
                ExpDesc::new(ExpKind::Str(source.unwrap_or_else(|| name.clone())))
            } else {
                ExpDesc::new(ExpKind::Int(1))
            };
            self.declare_local(name.clone(), VarKind::Regular, TypeHint::default(), span)?;
            self.fs_mut().index_exp(&mut e, key)?;
            self.fs_mut().exp_to_next_reg(&mut e)?;
            self.fs_mut().adjust_local_vars(1);
            return Ok(vec![(name, span)]);
        }

        // several targets read from one hidden local
        self.fs_mut().exp_to_next_reg(&mut e)?;
        let hidden = self.fs_mut().new_local(
            "(destructured value)".to_owned(),
            VarKind::Regular,
            TypeHint::default(),
            open.line,
        );
        self.fs_mut().adjust_local_vars(1);
        let table = self.fs().vars[hidden].reg;
        let mut names = Vec::new();
        for (name, span, _) in &fields {
            self.declare_local((*name).clone(), VarKind::Regular, TypeHint::default(), *span)?;
            names.push((name.clone(), *span));
        }
        let fs = self.fs_mut();
        for (i, (name, _, source)) in fields.iter().enumerate() {
            fs.reserve_regs(1)?;
            let dst = fs.free_reg - 1;
            if keyed {
                let key = fs.string_const(source.as_deref().unwrap_or(name));
                fs.emit(Instruction::GetField { dst, table, key });
            } else {
                fs.emit(Instruction::GetIndexInt {
                    dst,
                    table,
                    key: (i + 1) as i32,
                });
            }
        }
        fs.adjust_local_vars(fields.len());
        Ok(names)
    }

    // ===== switch =====

    /// Token index just past a `class` header starting at `i` (the
    /// `class` token), so the optional `do` is not counted twice.
    fn skip_class_header(&self, mut i: usize) -> usize {
        i += 1;
        while matches!(self.token_at(i), Token::Identifier(_) | Token::Dot) {
            i += 1;
        }
        if self.token_at(i) == &Token::Do {
            i += 1;
        }
        i
    }

    /// Token index just past one clause body, from `from`: the next
    /// depth-zero `case`/`default` marker or the closing `end`.
    fn clause_body_end(&self, from: usize) -> usize {
        let mut i = from;
        let mut depth = 0i32;
        while i < self.tokens.len() {
            match self.token_at(i).normalized() {
                Token::Class => {
                    depth += 1;
                    i = self.skip_class_header(i);
                    continue;
                }
                Token::Function
                | Token::If
                | Token::Do
                | Token::Repeat
                | Token::LeftParen
                | Token::LeftBrace
                | Token::LeftBracket => depth += 1,
                Token::End | Token::Eof if depth == 0 => return i,
                Token::End
                | Token::Until
                | Token::RightParen
                | Token::RightBrace
                | Token::RightBracket => depth -= 1,
                Token::Identifier(s) if depth == 0 && (s == "case" || s == "default") => {
                    return i;
                }
                _ => {}
            }
            i += 1;
        }
        i
    }

    /// Token range of the `default` clause's body, when one exists.
    fn scan_default_body(&self) -> Option<(usize, usize)> {
        let mut i = self.cursor();
        let mut depth = 0i32;
        while i < self.tokens.len() {
            match self.token_at(i).normalized() {
                Token::Class => {
                    depth += 1;
                    i = self.skip_class_header(i);
                    continue;
                }
                Token::Function
                | Token::If
                | Token::Do
                | Token::Repeat
                | Token::LeftParen
                | Token::LeftBrace
                | Token::LeftBracket => depth += 1,
                Token::End | Token::Eof if depth == 0 => return None,
                Token::End
                | Token::Until
                | Token::RightParen
                | Token::RightBrace
                | Token::RightBracket => depth -= 1,
                Token::Identifier(s) if depth == 0 && s == "default" => {
                    if self.token_at(i + 1) == &Token::Colon {
                        let start = i + 2;
                        return Some((start, self.clause_body_end(start)));
                    }
                }
                _ => {}
            }
            i += 1;
        }
        None
    }

    fn token_slices_equal(&self, a: (usize, usize), b: (usize, usize)) -> bool {
        if a.1 - a.0 != b.1 - b.0 {
            return false;
        }
        self.tokens[a.0..a.1]
            .iter()
            .zip(&self.tokens[b.0..b.1])
            .all(|((t1, _), (t2, _))| t1 == t2)
    }

    fn switch_stat(&mut self, line: u32) -> CompileResult<()> {
        self.advance();
        self.enter_block(BlockKind::Switch);
        let mut e = self.expr()?;
        self.fs_mut().exp_to_next_reg(&mut e)?;
        let vidx = self.fs_mut().new_local(
            "(switch control value)".to_owned(),
            VarKind::Regular,
            TypeHint::default(),
            line,
        );
        self.fs_mut().adjust_local_vars(1);
        let ctrl = self.fs().vars[vidx].reg;
        self.expect(&Token::Do, "do")?;

        let default_range = self.scan_default_body();
        let mut miss = NO_JUMP;
        let mut exit_list = NO_JUMP;
        let mut default_pc: Option<i32> = None;

        loop {
            match self.current().clone() {
                Token::Identifier(s) if s == "case" => {
                    self.advance();
                    let miss_prev = miss;
                    miss = NO_JUMP;
                    let mut body_list = NO_JUMP;
                    let watermark = self.fs().pc();
                    loop {
                        self.mark_pos();
                        let mut c = self.expr()?;
                        let fs = self.fs_mut();
                        let rhs = fs.exp_to_any_reg(&mut c)?;
                        let more = self.current() == &Token::Comma;
                        let fs = self.fs_mut();
                        fs.emit(Instruction::Cmp {
                            op: CmpOp::Eq,
                            lhs: ctrl,
                            rhs,
                            // on a match the jump right below is taken
                            expect: more,
                        });
                        let j = fs.emit_jump();
                        if more {
                            fs.concat_list(&mut body_list, j);
                        } else {
                            fs.concat_list(&mut miss, j);
                        }
                        fs.free_exp(&c);
                        if !self.accept(&Token::Comma) {
                            break;
                        }
                    }
                    self.expect(&Token::Colon, ":")?;
                    let body = (self.cursor(), self.clause_body_end(self.cursor()));
                    if default_range.map_or(false, |d| self.token_slices_equal(body, d)) {
                        // same outcome as the default clause: drop the
                        // whole test and let the value fall through
                        self.fs_mut().rewind_to(watermark);
                        miss = miss_prev;
                        self.restore(body.1);
                    } else {
                        let fs = self.fs_mut();
                        fs.patch_list(miss_prev, watermark as i32);
                        fs.patch_to_here(body_list);
                        self.enter_block(BlockKind::Plain);
                        self.statlist_clause()?;
                        self.leave_block()?;
                        let fs = self.fs_mut();
                        let j = fs.emit_jump();
                        fs.concat_list(&mut exit_list, j);
                    }
                }
                Token::Identifier(s) if s == "default" => {
                    self.advance();
                    self.expect(&Token::Colon, ":")?;
                    if default_pc.is_some() {
                        let span = self.current_span();
                        return Err(self.syntax_error(
                            span,
                            "'default' clause already defined",
                            "second 'default' here",
                        ));
                    }
                    // untested values must continue with the later cases
                    let fs = self.fs_mut();
                    let j = fs.emit_jump();
                    fs.concat_list(&mut miss, j);
                    default_pc = Some(fs.get_label());
                    self.enter_block(BlockKind::Plain);
                    self.statlist_clause()?;
                    self.leave_block()?;
                    let fs = self.fs_mut();
                    let j = fs.emit_jump();
                    fs.concat_list(&mut exit_list, j);
                }
                Token::End => break,
                _ => return Err(self.error_expected("'case', 'default', or 'end'")),
            }
        }
        self.expect_match(&Token::End, "end", "switch", line)?;
        let fs = self.fs_mut();
        match default_pc {
            Some(pc) => fs.patch_list(miss, pc),
            None => fs.patch_to_here(miss),
        }
        fs.patch_to_here(exit_list);
        self.leave_block()?;
        Ok(())
    }

    // ===== class =====

    /// Pre-scan of a class body mapping private and protected member
    /// names to their mangled spelling.
    fn scan_class_privates(&mut self) -> FxHashMap<String, String> {
        let tag = self.next_priv_tag();
        let mut map = FxHashMap::default();
        let mut i = self.cursor();
        let mut depth = 0i32;
        while i < self.tokens.len() {
            match self.token_at(i).normalized() {
                Token::Class => {
                    depth += 1;
                    i = self.skip_class_header(i);
                    continue;
                }
                Token::Function
                | Token::If
                | Token::Do
                | Token::Repeat
                | Token::LeftParen
                | Token::LeftBrace
                | Token::LeftBracket => depth += 1,
                Token::End | Token::Eof if depth == 0 => break,
                Token::End
                | Token::Until
                | Token::RightParen
                | Token::RightBrace
                | Token::RightBracket => depth -= 1,
                Token::Identifier(s)
                    if depth == 0
                        && (s == "private" || s == "protected")
                        // `private = expr` is a member named 'private'
                        && self.token_at(i + 1) != &Token::Equal =>
                {
                    let mut j = i + 1;
                    if matches!(self.token_at(j), Token::Identifier(w) if w == "static") {
                        j += 1;
                    }
                    if self.token_at(j).normalized() == &Token::Function {
                        j += 1;
                    }
                    if let Token::Identifier(name) = self.token_at(j) {
                        map.insert(name.clone(), format!("__priv{}_{}", tag, name));
                    }
                }
                _ => {}
            }
            i += 1;
        }
        map
    }

    /// Child prototype applying inheritance: `(child, parent)` sets
    /// `child.__parent` and a metatable whose `__index` is the parent.
    /// Built once per enclosing function.
    fn extends_helper(&mut self) -> u32 {
        if let Some(idx) = self.fs().extends_helper {
            return idx;
        }
        let pos = self.fs().pos;
        let mut proto = Proto::new(self.chunk_name);
        proto.num_params = 2;
        proto.max_stack_size = 3;
        proto.line_defined = pos.line;
        proto.last_line_defined = pos.line;
        proto.constants.push(Constant::Str("__parent".to_owned()));
        proto.constants.push(Constant::Str("__index".to_owned()));
        let code = [
            Instruction::SetField {
                table: 0,
                key: 0,
                src: 1,
            },
            Instruction::NewTable {
                dst: 2,
                narray: 0,
                nhash: 1,
            },
            Instruction::SetField {
                table: 2,
                key: 1,
                src: 1,
            },
            Instruction::SetMeta { table: 0, meta: 2 },
            Instruction::Return { base: 0, count: 1 },
        ];
        for i in code {
            proto.code.push(i);
            proto.positions.push(pos);
        }
        let fs = self.fs_mut();
        let idx = fs.proto.protos.len() as u32;
        fs.proto.protos.push(proto);
        fs.extends_helper = Some(idx);
        idx
    }

    /// Calls the inheritance helper with the class table and its parent,
    /// re-parsing the parent name saved during the `extends` clause.
    fn apply_extends(&mut self, treg: u8, range: (usize, usize)) -> CompileResult<()> {
        let proto = self.extends_helper();
        let base = {
            let fs = self.fs_mut();
            let base = fs.free_reg;
            fs.reserve_regs(2)?;
            fs.emit(Instruction::Closure { dst: base, proto });
            fs.emit(Instruction::Move {
                dst: base + 1,
                src: treg,
            });
            base
        };
        let saved = self.cursor();
        self.restore(range.0);
        let (pname, pspan) = self.expect_ident("parent class name")?;
        let mut parent = self.single_var(&pname, pspan)?;
        while self.cursor() < range.1 && self.current() == &Token::Dot {
            self.advance();
            let (field, _) = self.expect_ident("field name")?;
            let k = ExpDesc::new(ExpKind::Str(field));
            self.fs_mut().index_exp(&mut parent, k)?;
        }
        self.restore(saved);
        self.fs_mut().exp_to_next_reg(&mut parent)?;
        let fs = self.fs_mut();
        fs.emit(Instruction::Call {
            base,
            nargs: 3,
            nresults: 1,
        });
        fs.free_reg = base;
        Ok(())
    }

    fn class_member_function(&mut self, treg: u8, is_method: bool) -> CompileResult<()> {
        let (mname, mspan) = self.expect_ident("method name")?;
        let key_name = self.mangle_member(&mname).unwrap_or(mname);
        let (mut f, _) = self.funcbody(is_method, mspan.line)?;
        let fs = self.fs_mut();
        let src = fs.exp_to_any_reg(&mut f)?;
        let key = fs.string_const(&key_name);
        fs.emit(Instruction::SetField {
            table: treg,
            key,
            src,
        });
        fs.free_exp(&f);
        Ok(())
    }

    /// `class NAME [extends PARENT] [do] members end`, with the `class`
    /// token already consumed. Returns the name for `export`.
    fn class_stat(&mut self, line: u32, is_local: bool) -> CompileResult<(String, Span)> {
        let (name, nspan) = self.expect_ident("class name")?;
        let parent_range = if matches!(self.current(), Token::Identifier(s) if s == "extends") {
            self.advance();
            let start = self.cursor();
            self.expect_ident("parent class name")?;
            while self.current() == &Token::Dot {
                self.advance();
                self.expect_ident("field name")?;
            }
            Some((start, self.cursor()))
        } else {
            None
        };
        self.accept(&Token::Do);
        let mangled = self.scan_class_privates();
        self.push_class(mangled, parent_range);

        let treg = if is_local {
            self.declare_local(name.clone(), VarKind::Regular, TypeHint::of(PrimType::Table), nspan)?;
            self.fs_mut().adjust_local_vars(1);
            self.fs_mut().reserve_regs(1)?;
            self.fs().free_reg - 1
        } else {
            self.fs_mut().reserve_regs(1)?;
            self.fs().free_reg - 1
        };
        self.fs_mut().emit(Instruction::NewTable {
            dst: treg,
            narray: 0,
            nhash: 0,
        });

        loop {
            match self.current().normalized().clone() {
                Token::End => break,
                Token::Semicolon | Token::Comma => {
                    self.advance();
                }
                Token::Identifier(w)
                    if (w == "private" || w == "protected")
                        && self.peek(1) != &Token::Equal =>
                {
                    self.advance();
                }
                Token::Identifier(w)
                    if w == "static" && self.peek(1).normalized() == &Token::Function =>
                {
                    self.advance();
                    self.advance();
                    self.class_member_function(treg, false)?;
                }
                Token::Function => {
                    self.advance();
                    self.class_member_function(treg, true)?;
                }
                Token::Identifier(_) => {
                    let (fname, _) = self.expect_ident("member name")?;
                    let key_name = self.mangle_member(&fname).unwrap_or(fname);
                    self.expect(&Token::Equal, "=")?;
                    let mut v = self.expr()?;
                    let fs = self.fs_mut();
                    let src = fs.exp_to_any_reg(&mut v)?;
                    let key = fs.string_const(&key_name);
                    fs.emit(Instruction::SetField {
                        table: treg,
                        key,
                        src,
                    });
                    fs.free_exp(&v);
                }
                _ => return Err(self.error_expected("member declaration")),
            }
        }
        self.expect_match(&Token::End, "end", "class", line)?;

        if let Some(range) = parent_range {
            self.apply_extends(treg, range)?;
        }
        self.pop_class();

        if !is_local {
            let v = self.single_var(&name, nspan)?;
            self.check_assignable(&v, Some(&name), nspan)?;
            let mut e = ExpDesc::new(ExpKind::NonReloc { reg: treg });
            self.fs_mut().store_var(&v, &mut e)?;
            self.warn_implicit_global(&v, &name, nspan)?;
        }
        Ok((name, nspan))
    }

    // ===== enum =====

    fn enum_stat(&mut self, line: u32) -> CompileResult<()> {
        self.advance();
        let is_class = if self.current().normalized() == &Token::Class {
            self.advance();
            true
        } else if matches!(self.current(), Token::Identifier(s) if s == "class")
            && matches!(self.peek(1), Token::Identifier(_))
        {
            self.advance();
            true
        } else {
            false
        };
        let ename = if let Token::Identifier(n) = self.current() {
            let n = n.clone();
            let span = self.current_span();
            self.advance();
            Some((n, span))
        } else {
            None
        };
        if is_class && ename.is_none() {
            return Err(self.error_expected("enum name"));
        }
        self.expect(&Token::Do, "do")?;

        let mut next = 1i64;
        let mut members: Vec<(String, i64)> = Vec::new();
        let mut member_map: FxHashMap<String, i64> = FxHashMap::default();
        while let Token::Identifier(_) = self.current() {
            let (mname, mspan) = self.expect_ident("member name")?;
            if self.accept(&Token::Equal) {
                let vspan = self.current_span();
                let e = self.expr()?;
                match ctc_value_of(&e) {
                    Some(CtcValue::Int(i)) => next = i,
                    _ => {
                        return Err(self.syntax_error(
                            vspan,
                            "enum value must be a compile-time integer constant",
                            "not constant-foldable",
                        ));
                    }
                }
            }
            if member_map.insert(mname.clone(), next).is_some() {
                return Err(self.syntax_error(
                    mspan,
                    &format!("duplicate enum member '{}'", mname),
                    "already declared",
                ));
            }
            if !is_class {
                self.declare_local(
                    mname.clone(),
                    VarKind::Ctc(CtcValue::Int(next)),
                    TypeHint::of(PrimType::Int),
                    mspan,
                )?;
                self.fs_mut().adjust_local_vars(1);
            }
            members.push((mname, next));
            next = next.wrapping_add(1);
            if !self.accept(&Token::Comma) {
                break;
            }
        }
        self.expect_match(&Token::End, "end", "enum", line)?;

        if let Some((ename, espan)) = ename {
            // a runtime table mirroring the members
            let vidx =
                self.declare_local(ename, VarKind::Const, TypeHint::of(PrimType::Table), espan)?;
            let fs = self.fs_mut();
            let pc = fs.emit(Instruction::NewTable {
                dst: 0,
                narray: 0,
                nhash: members.len().min(u8::MAX as usize) as u8,
            });
            let mut t = ExpDesc::new(ExpKind::Reloc { pc });
            let table = fs.exp_to_next_reg(&mut t)?;
            for (mname, value) in &members {
                let mut v = ExpDesc::new(ExpKind::Int(*value));
                let src = fs.exp_to_any_reg(&mut v)?;
                let key = fs.string_const(mname);
                fs.emit(Instruction::SetField { table, key, src });
                fs.free_exp(&v);
            }
            fs.adjust_local_vars(1);
            fs.vars[vidx].enum_members = Some(member_map);
        }
        Ok(())
    }

    // ===== export / global / directives =====

    fn export_stat(&mut self, span: Span) -> CompileResult<()> {
        self.advance();
        match self.current().normalized().clone() {
            Token::Local => {
                self.advance();
                if self.accept(&Token::Function) {
                    let (name, nspan) = self.local_func()?;
                    self.record_export(name, nspan)?;
                } else if self.current().normalized() == &Token::Class {
                    self.advance();
                    let (name, nspan) = self.class_stat(span.line, true)?;
                    self.record_export(name, nspan)?;
                } else {
                    for (name, nspan) in self.local_stat(false)? {
                        self.record_export(name, nspan)?;
                    }
                }
            }
            Token::Function => {
                self.advance();
                let (name, nspan) = self.local_func()?;
                self.record_export(name, nspan)?;
            }
            Token::Class => {
                self.advance();
                let (name, nspan) = self.class_stat(span.line, true)?;
                self.record_export(name, nspan)?;
            }
            _ => return Err(self.error_expected("'local', 'function', or 'class'")),
        }
        Ok(())
    }

    fn global_stat(&mut self) -> CompileResult<()> {
        self.advance();
        let (name, _span) = self.expect_ident("global name")?;
        self.declare_global(name.clone());
        if self.accept(&Token::Equal) {
            let top = self.fs.len() - 1;
            let upval = self.resolve_env(top);
            let key = self.fs_mut().string_const(&name);
            let var = ExpDesc::new(ExpKind::IndexedUp { upval, key });
            let mut e = self.expr()?;
            self.fs_mut().store_var(&var, &mut e)?;
        }
        Ok(())
    }

    /// A `vela_use` statement. The resolver has already validated and
    /// applied it; only its token span is consumed here.
    fn use_stat(&mut self) {
        self.advance();
        loop {
            match self.current() {
                Token::Star | Token::StringLiteral(_) => self.advance(),
                _ => {
                    self.advance();
                    if self.accept(&Token::Equal) {
                        self.advance();
                    }
                }
            }
            if !self.accept(&Token::Comma) {
                break;
            }
        }
    }
}
