//! Expression parsing and the precedence climber.

use super::Parser;
use crate::codegen::{BinOpr, ExpDesc, ExpKind, FuncShape};
use crate::diag::WarningKind;
use crate::error::CompileResult;
use crate::token::Token;
use crate::typehint::{PrimType, TypeHint};
use rustc_hash::{FxHashMap, FxHashSet};
use vela_bytecode::{ArithOp, Instruction, UnaryOp};

const UNARY_PRIORITY: u8 = 12;

/// Left and right binding powers, Lua's table with `**` and `!=` mapped
/// onto their canonical operators.
fn binop_of(token: &Token) -> Option<(BinOpr, u8, u8)> {
    let entry = match token {
        Token::Or => (BinOpr::Or, 1, 1),
        Token::And => (BinOpr::And, 2, 2),
        Token::Less => (BinOpr::Lt, 3, 3),
        Token::Greater => (BinOpr::Gt, 3, 3),
        Token::LessEqual => (BinOpr::Le, 3, 3),
        Token::GreaterEqual => (BinOpr::Ge, 3, 3),
        Token::EqualEqual => (BinOpr::Eq { negate: false }, 3, 3),
        Token::TildeEqual | Token::BangEqual => (BinOpr::Eq { negate: true }, 3, 3),
        Token::Pipe => (BinOpr::Arith(ArithOp::BOr), 4, 4),
        Token::Tilde => (BinOpr::Arith(ArithOp::BXor), 5, 5),
        Token::Amp => (BinOpr::Arith(ArithOp::BAnd), 6, 6),
        Token::LessLess => (BinOpr::Arith(ArithOp::Shl), 7, 7),
        Token::GreaterGreater => (BinOpr::Arith(ArithOp::Shr), 7, 7),
        Token::DotDot => (BinOpr::Concat, 9, 8),
        Token::Plus => (BinOpr::Arith(ArithOp::Add), 10, 10),
        Token::Minus => (BinOpr::Arith(ArithOp::Sub), 10, 10),
        Token::Star => (BinOpr::Arith(ArithOp::Mul), 11, 11),
        Token::Slash => (BinOpr::Arith(ArithOp::Div), 11, 11),
        Token::SlashSlash => (BinOpr::Arith(ArithOp::IDiv), 11, 11),
        Token::Percent => (BinOpr::Arith(ArithOp::Mod), 11, 11),
        Token::Caret | Token::StarStar => (BinOpr::Arith(ArithOp::Pow), 14, 13),
        _ => return None,
    };
    Some(entry)
}

fn unop_of(token: &Token) -> Option<UnaryOp> {
    match token {
        Token::Not | Token::Bang => Some(UnaryOp::Not),
        Token::Minus => Some(UnaryOp::Neg),
        Token::Hash => Some(UnaryOp::Len),
        Token::Tilde => Some(UnaryOp::BNot),
        _ => None,
    }
}

impl<'src> Parser<'src> {
    pub(crate) fn expr(&mut self) -> CompileResult<ExpDesc> {
        self.sub_expr(0)
    }

    fn sub_expr(&mut self, limit: u8) -> CompileResult<ExpDesc> {
        let span = self.current_span();
        self.enter_level(span)?;
        let mut e = if let Some(uop) = unop_of(self.current()) {
            self.mark_pos();
            self.advance();
            let mut e = self.sub_expr(UNARY_PRIORITY)?;
            self.fs_mut().prefix(uop, &mut e)?;
            e
        } else {
            self.simple_exp()?
        };
        while let Some((op, left, right)) = binop_of(self.current().normalized()) {
            if left <= limit {
                break;
            }
            self.mark_pos();
            self.advance();
            self.fs_mut().infix(op, &mut e)?;
            let e2 = self.sub_expr(right)?;
            self.fs_mut().posfix(op, &mut e, e2)?;
        }
        self.leave_level();
        Ok(e)
    }

    /// Parses a condition, leaving false exits on the returned jump list.
    pub(crate) fn cond(&mut self) -> CompileResult<i32> {
        let mut e = self.expr()?;
        if e.kind == ExpKind::Nil {
            e.kind = ExpKind::False;
        }
        self.fs_mut().go_if_true(&mut e)?;
        Ok(e.false_list)
    }

    /// Parses `exp {',' exp}`; every value but the last is flushed to the
    /// next register. Returns the count, the open last expression, and
    /// the per-expression type hints.
    pub(crate) fn explist(&mut self) -> CompileResult<(usize, ExpDesc, Vec<TypeHint>)> {
        let mut e = self.expr()?;
        let mut hints = vec![e.hint];
        let mut n = 1;
        while self.accept(&Token::Comma) {
            self.fs_mut().exp_to_next_reg(&mut e)?;
            e = self.expr()?;
            hints.push(e.hint);
            n += 1;
        }
        Ok((n, e, hints))
    }

    fn simple_exp(&mut self) -> CompileResult<ExpDesc> {
        let span = self.current_span();
        let e = match self.current().normalized().clone() {
            Token::IntLiteral(i) => {
                self.advance();
                ExpDesc::with_hint(ExpKind::Int(i), TypeHint::of(PrimType::Int))
            }
            Token::FloatLiteral(f) => {
                self.advance();
                ExpDesc::with_hint(ExpKind::Float(f), TypeHint::of(PrimType::Float))
            }
            Token::StringLiteral(s) => {
                self.advance();
                ExpDesc::with_hint(ExpKind::Str(s), TypeHint::of(PrimType::String))
            }
            Token::Nil => {
                self.advance();
                ExpDesc::with_hint(ExpKind::Nil, TypeHint::of(PrimType::Nil))
            }
            Token::True => {
                self.advance();
                ExpDesc::with_hint(ExpKind::True, TypeHint::of(PrimType::Boolean))
            }
            Token::False => {
                self.advance();
                ExpDesc::with_hint(ExpKind::False, TypeHint::of(PrimType::Boolean))
            }
            Token::DotDotDot => {
                self.advance();
                if !self.fs().proto.is_vararg {
                    return Err(self.syntax_error(
                        span,
                        "cannot use '...' outside a vararg function",
                        "not a vararg function",
                    ));
                }
                let fs = self.fs_mut();
                let pc = fs.emit(Instruction::Vararg { dst: 0, count: 1 });
                ExpDesc::new(ExpKind::Vararg { pc })
            }
            Token::LeftBrace => self.table_constructor()?,
            Token::Function => {
                self.advance();
                self.funcbody(false, span.line)?.0
            }
            Token::Parent => self.parent_expr()?,
            _ => self.suffixed_exp()?,
        };
        Ok(e)
    }

    /// `parent` re-parses the parent-name tokens saved by the enclosing
    /// class declaration.
    fn parent_expr(&mut self) -> CompileResult<ExpDesc> {
        let span = self.current_span();
        self.advance();
        let Some((start, end)) = self.parent_token_range() else {
            return Err(self.syntax_error(
                span,
                "cannot use 'parent' outside a class that extends another",
                "no parent class here",
            ));
        };
        let saved = self.cursor();
        self.restore(start);
        let (name, nspan) = self.expect_ident("parent class name")?;
        let mut e = self.single_var(&name, nspan)?;
        while self.cursor() < end && self.current() == &Token::Dot {
            self.advance();
            let (field, _) = self.expect_ident("field name")?;
            let k = ExpDesc::new(ExpKind::Str(field));
            self.fs_mut().index_exp(&mut e, k)?;
        }
        self.restore(saved);
        Ok(e)
    }

    fn primary_exp(&mut self) -> CompileResult<(ExpDesc, Option<String>)> {
        match self.current().clone() {
            Token::LeftParen => {
                let span = self.current_span();
                self.advance();
                let mut e = self.expr()?;
                self.expect_match(&Token::RightParen, ")", "(", span.line)?;
                self.fs_mut().discharge_vars(&mut e);
                Ok((e, None))
            }
            Token::Identifier(name) => {
                let span = self.current_span();
                self.advance();
                let e = self.single_var(&name, span)?;
                Ok((e, Some(name)))
            }
            _ => Err(self.error_expected("expression")),
        }
    }

    pub(crate) fn suffixed_exp(&mut self) -> CompileResult<ExpDesc> {
        let (mut e, mut base_name) = self.primary_exp()?;
        loop {
            match self.current().clone() {
                Token::Dot => {
                    self.advance();
                    let (field, _) = self.expect_ident("field name")?;
                    if let Some(name) = &base_name {
                        let member = self
                            .enum_members_of(name)
                            .and_then(|m| m.get(&field).copied());
                        if let Some(value) = member {
                            e = ExpDesc::with_hint(
                                ExpKind::Int(value),
                                TypeHint::of(PrimType::Int),
                            );
                            base_name = None;
                            continue;
                        }
                    }
                    let field = self.mangle_member(&field).unwrap_or(field);
                    let fhint = if let ExpKind::Local { vidx, .. } = e.kind {
                        self.fs().vars[vidx]
                            .field_hints
                            .as_ref()
                            .and_then(|m| m.get(&field).copied())
                    } else {
                        None
                    };
                    let k = ExpDesc::new(ExpKind::Str(field));
                    self.fs_mut().index_exp(&mut e, k)?;
                    if let Some(h) = fhint {
                        e.hint = h;
                    }
                    base_name = None;
                }
                Token::LeftBracket => {
                    self.advance();
                    let mut k = self.expr()?;
                    self.fs_mut().exp_to_val(&mut k)?;
                    self.expect(&Token::RightBracket, "]")?;
                    self.fs_mut().index_exp(&mut e, k)?;
                    base_name = None;
                }
                Token::Colon => {
                    self.advance();
                    let (method, _) = self.expect_ident("method name")?;
                    let method = self.mangle_member(&method).unwrap_or(method);
                    self.mark_pos();
                    self.fs_mut().self_field(&mut e, &method)?;
                    self.funcargs(&mut e, None)?;
                    base_name = None;
                }
                Token::LeftParen | Token::StringLiteral(_) | Token::LeftBrace => {
                    let shape = base_name
                        .take()
                        .and_then(|name| self.shape_of_name(&name));
                    self.mark_pos();
                    self.fs_mut().exp_to_next_reg(&mut e)?;
                    self.funcargs(&mut e, shape.as_ref())?;
                }
                _ => break,
            }
        }
        Ok(e)
    }

    /// Compiles call arguments. `f` must already be fixed at the call's
    /// base register (with the receiver above it for method calls).
    fn funcargs(&mut self, f: &mut ExpDesc, shape: Option<&FuncShape>) -> CompileResult<()> {
        let call_span = self.current_span();
        let base = match f.kind {
            ExpKind::NonReloc { reg } => reg,
            _ => unreachable!("callee not fixed at the call base"),
        };
        let mut multiret = false;
        match self.current().clone() {
            Token::StringLiteral(s) => {
                self.advance();
                let mut e = ExpDesc::new(ExpKind::Str(s));
                self.fs_mut().exp_to_next_reg(&mut e)?;
            }
            Token::LeftBrace => {
                let mut e = self.table_constructor()?;
                self.fs_mut().exp_to_next_reg(&mut e)?;
            }
            Token::LeftParen => {
                self.advance();
                let mut named = false;
                let mut npos = 0usize;
                if self.current() != &Token::RightParen {
                    loop {
                        if shape.is_some()
                            && matches!(self.current(), Token::Identifier(_))
                            && self.peek(1) == &Token::Equal
                        {
                            named = true;
                            break;
                        }
                        let mut e = self.expr()?;
                        npos += 1;
                        if self.accept(&Token::Comma) {
                            self.fs_mut().exp_to_next_reg(&mut e)?;
                            continue;
                        }
                        if e.is_multiret() {
                            self.fs_mut().set_returns(&e, None)?;
                            multiret = true;
                        } else {
                            self.fs_mut().exp_to_next_reg(&mut e)?;
                        }
                        break;
                    }
                }
                if named {
                    let shape = shape.unwrap_or_else(|| unreachable!());
                    self.named_args(base, npos, shape)?;
                }
                self.expect_match(&Token::RightParen, ")", "(", call_span.line)?;
            }
            _ => return Err(self.error_expected("function arguments")),
        }

        let nargs = self.fs().free_reg - (base + 1);
        if let Some(shape) = shape {
            if !shape.is_vararg && !multiret && nargs as usize > shape.params.len() {
                let msg = format!(
                    "call passes {} arguments to a function taking {}",
                    nargs,
                    shape.params.len()
                );
                self.warn(
                    WarningKind::ExcessiveArguments,
                    call_span,
                    &msg,
                    "extra arguments here",
                )?;
            }
        }
        let fs = self.fs_mut();
        let pc = fs.emit(Instruction::Call {
            base,
            nargs: if multiret { 0 } else { nargs + 1 },
            nresults: 2,
        });
        fs.free_reg = base + 1;
        *f = ExpDesc::with_hint(
            ExpKind::Call { pc },
            shape.map_or_else(TypeHint::default, |s| s.ret),
        );
        self.last_call_shape = shape.cloned();
        Ok(())
    }

    /// Named arguments: remaining parameters are filled in declaration
    /// order, loading `nil` where no argument names them. Argument
    /// expressions are located in a scanning pass, then compiled via
    /// cursor restore once their target register is known.
    fn named_args(&mut self, _base: u8, npos: usize, shape: &FuncShape) -> CompileResult<()> {
        let mut entries: Vec<(String, usize, crate::token::Span)> = Vec::new();
        loop {
            let (name, nspan) = self.expect_ident("argument name")?;
            self.expect(&Token::Equal, "=")?;
            let start = self.cursor();
            self.skip_expression_tokens()?;
            entries.push((name, start, nspan));
            if !self.accept(&Token::Comma) {
                break;
            }
        }
        let end_cursor = self.cursor();

        let mut last_idx = npos;
        for (name, _, nspan) in &entries {
            match shape.params.iter().skip(npos).position(|p| p == name) {
                Some(off) => last_idx = last_idx.max(npos + off + 1),
                None => {
                    return Err(self.syntax_error(
                        *nspan,
                        &format!("function has no parameter '{}' left to bind", name),
                        "unknown named argument",
                    ));
                }
            }
        }
        for param_idx in npos..last_idx {
            let param = &shape.params[param_idx];
            let entry = entries.iter().find(|(n, _, _)| n == param);
            match entry {
                Some(&(_, start, _)) => {
                    self.restore(start);
                    let mut e = self.expr()?;
                    self.fs_mut().exp_to_next_reg(&mut e)?;
                }
                None => {
                    let fs = self.fs_mut();
                    fs.reserve_regs(1)?;
                    let reg = fs.free_reg - 1;
                    fs.load_nil(reg, 1);
                }
            }
        }
        self.restore(end_cursor);
        Ok(())
    }

    /// Skips the tokens of one expression, stopping before a `,` or `)`
    /// at nesting depth zero.
    pub(crate) fn skip_expression_tokens(&mut self) -> CompileResult<()> {
        let start = self.current_span();
        let mut depth = 0i32;
        loop {
            match self.current() {
                Token::Eof => {
                    return Err(self.syntax_error(
                        start,
                        "unexpected end of file in expression",
                        "expression starts here",
                    ));
                }
                Token::LeftParen
                | Token::LeftBrace
                | Token::LeftBracket
                | Token::Function
                | Token::If
                | Token::Do
                | Token::Repeat => depth += 1,
                Token::RightParen | Token::Comma if depth == 0 => return Ok(()),
                Token::RightParen
                | Token::RightBrace
                | Token::RightBracket
                | Token::End
                | Token::Until => depth -= 1,
                _ => {}
            }
            self.advance();
        }
    }

    pub(crate) fn table_constructor(&mut self) -> CompileResult<ExpDesc> {
        let open = self.expect(&Token::LeftBrace, "{")?;
        let fs = self.fs_mut();
        let pc = fs.emit(Instruction::NewTable {
            dst: 0,
            narray: 0,
            nhash: 0,
        });
        let mut t = ExpDesc::new(ExpKind::Reloc { pc });
        let table = self.fs_mut().exp_to_next_reg(&mut t)?;

        let mut seen: FxHashSet<String> = FxHashSet::default();
        let mut fields: FxHashMap<String, TypeHint> = FxHashMap::default();
        let mut narray = 0u32;
        let mut nhash = 0u32;
        let mut pending = 0u8;
        while self.current() != &Token::RightBrace {
            match self.current().clone() {
                Token::Identifier(name) if self.peek(1) == &Token::Equal => {
                    let nspan = self.current_span();
                    self.advance();
                    self.advance();
                    if !seen.insert(name.clone()) {
                        self.warn(
                            WarningKind::FieldShadow,
                            nspan,
                            &format!("duplicate field '{}' in table constructor", name),
                            "overwrites the earlier field",
                        )?;
                    }
                    let mut v = self.expr()?;
                    if !v.hint.is_empty() {
                        fields.insert(name.clone(), v.hint);
                    }
                    let fs = self.fs_mut();
                    let src = fs.exp_to_any_reg(&mut v)?;
                    let key = fs.string_const(&name);
                    fs.emit(Instruction::SetField { table, key, src });
                    fs.free_exp(&v);
                    nhash += 1;
                }
                Token::LeftBracket => {
                    self.advance();
                    let mut k = self.expr()?;
                    self.fs_mut().exp_to_val(&mut k)?;
                    self.expect(&Token::RightBracket, "]")?;
                    self.expect(&Token::Equal, "=")?;
                    let kspan = self.current_span();
                    if let ExpKind::Str(name) = &k.kind {
                        if !seen.insert(name.clone()) {
                            let name = name.clone();
                            self.warn(
                                WarningKind::FieldShadow,
                                kspan,
                                &format!("duplicate field '{}' in table constructor", name),
                                "overwrites the earlier field",
                            )?;
                        }
                    }
                    let mut v = self.expr()?;
                    let fs = self.fs_mut();
                    let src = fs.exp_to_any_reg(&mut v)?;
                    match k.kind.clone() {
                        ExpKind::Str(s) => {
                            if !v.hint.is_empty() {
                                fields.insert(s.clone(), v.hint);
                            }
                            let key = fs.string_const(&s);
                            fs.emit(Instruction::SetField { table, key, src });
                            fs.free_exp(&v);
                        }
                        ExpKind::Int(i) if i32::try_from(i).is_ok() => {
                            fs.emit(Instruction::SetIndexInt {
                                table,
                                key: i as i32,
                                src,
                            });
                            fs.free_exp(&v);
                        }
                        _ => {
                            let key = fs.exp_to_any_reg(&mut k)?;
                            fs.emit(Instruction::SetIndex { table, key, src });
                            fs.free_exps(&v, &k);
                        }
                    }
                    nhash += 1;
                }
                _ => {
                    let e = self.expr()?;
                    if self.current() == &Token::RightBrace && e.is_multiret() {
                        self.fs_mut().set_returns(&e, None)?;
                        let fs = self.fs_mut();
                        fs.emit(Instruction::SetList {
                            table,
                            count: 0,
                            start: narray + 1,
                        });
                        fs.free_reg = table + 1;
                        pending = 0;
                        break;
                    }
                    let mut e = e;
                    self.fs_mut().exp_to_next_reg(&mut e)?;
                    pending += 1;
                    narray += 1;
                    if pending == 50 {
                        let fs = self.fs_mut();
                        fs.emit(Instruction::SetList {
                            table,
                            count: pending,
                            start: narray - pending as u32 + 1,
                        });
                        fs.free_reg = table + 1;
                        pending = 0;
                    }
                }
            }
            if !self.accept(&Token::Comma) && !self.accept(&Token::Semicolon) {
                break;
            }
        }
        self.expect_match(&Token::RightBrace, "}", "{", open.line)?;
        let fs = self.fs_mut();
        if pending > 0 {
            fs.emit(Instruction::SetList {
                table,
                count: pending,
                start: narray - pending as u32 + 1,
            });
            fs.free_reg = table + 1;
        }
        if let Instruction::NewTable {
            narray: na,
            nhash: nh,
            ..
        } = &mut fs.proto.code[pc]
        {
            *na = narray.min(u8::MAX as u32) as u8;
            *nh = nhash.min(u8::MAX as u32) as u8;
        }
        let mut e = ExpDesc::with_hint(
            ExpKind::NonReloc { reg: table },
            TypeHint::of(PrimType::Table),
        );
        if !fields.is_empty() {
            e.table_fields = Some(Box::new(fields));
        }
        Ok(e)
    }

    /// Parses `'(' params ')' [':' hint] block 'end'`, closing the child
    /// prototype and leaving a closure expression in the enclosing
    /// function.
    pub(crate) fn funcbody(
        &mut self,
        is_method: bool,
        line: u32,
    ) -> CompileResult<(ExpDesc, FuncShape)> {
        use crate::codegen::VarKind;

        self.open_func(line);
        self.expect(&Token::LeftParen, "(")?;
        let mut params: Vec<String> = Vec::new();
        let mut is_vararg = false;
        if is_method {
            self.fs_mut().new_local(
                "self".to_owned(),
                VarKind::Regular,
                TypeHint::of(PrimType::Table),
                line,
            );
            params.push("self".to_owned());
        }
        if self.current() != &Token::RightParen {
            loop {
                match self.current().clone() {
                    Token::DotDotDot => {
                        self.advance();
                        is_vararg = true;
                        break;
                    }
                    Token::Identifier(name) => {
                        let span = self.current_span();
                        self.advance();
                        let hint = if self.accept(&Token::Colon) {
                            self.parse_type_hint(false)?
                        } else {
                            TypeHint::default()
                        };
                        self.declare_local(name.clone(), VarKind::Regular, hint, span)?;
                        params.push(name);
                    }
                    _ => return Err(self.error_expected("parameter name or '...'")),
                }
                if !self.accept(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect(&Token::RightParen, ")")?;
        let nparams = params.len();
        {
            let fs = self.fs_mut();
            fs.adjust_local_vars(nparams);
            fs.proto.num_params = nparams as u8;
            fs.proto.is_vararg = is_vararg;
            fs.reserve_regs(nparams as u8)?;
        }
        let ret = if self.accept(&Token::Colon) {
            self.parse_type_hint(true)?
        } else {
            TypeHint::default()
        };
        self.fs_mut().ret_hint = ret;

        self.statlist()?;
        let end = self.expect_match(&Token::End, "end", "function", line)?;
        let proto = self.close_func(end.line)?;

        let fs = self.fs_mut();
        let index = fs.proto.protos.len() as u32;
        fs.proto.protos.push(proto);
        let pc = fs.emit(Instruction::Closure { dst: 0, proto: index });
        let e = ExpDesc::with_hint(ExpKind::Reloc { pc }, TypeHint::of(PrimType::Function));
        let shape = FuncShape {
            params,
            is_vararg,
            ret,
        };
        Ok((e, shape))
    }

    /// Parses a type hint after `:`: `['?'] NAME {'|' NAME} ['?']`.
    pub(crate) fn parse_type_hint(&mut self, allow_void: bool) -> CompileResult<TypeHint> {
        let mut hint = TypeHint::default();
        let mut nilable = self.accept(&Token::Question);
        let mut names = 0;
        loop {
            let (name, span) = self.expect_ident("type name")?;
            names += 1;
            match PrimType::from_name(&name) {
                Some(PrimType::Void) if !allow_void || names > 1 || nilable => {
                    return Err(self.syntax_error(
                        span,
                        "'void' is only valid as a sole return hint",
                        "here",
                    ));
                }
                Some(t) => hint.emplace(t),
                None => {
                    self.warn(
                        WarningKind::UnknownType,
                        span,
                        &format!("unknown type '{}' in hint", name),
                        "ignored",
                    )?;
                }
            }
            if !self.accept(&Token::Pipe) {
                break;
            }
        }
        if self.accept(&Token::Question) {
            nilable = true;
        }
        if nilable {
            if hint.contains(PrimType::Void) {
                return Err(self.syntax_error(
                    self.current_span(),
                    "'void' is only valid as a sole return hint",
                    "here",
                ));
            }
            hint.emplace(PrimType::Nil);
        }
        Ok(hint)
    }
}
