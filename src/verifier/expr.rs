use super::{
    facts::{Facts, Key},
    prove::{arith, Operand, Subst},
    symbols::{fold_binary, resolve_type, Frozen},
    Checker, FuncKey, Mode, ANY_LEN,
};
use crate::{
    ast::{
        BinaryOperator, Clause, Const, Expr, ExprKind, Ident, TypeExpr, Typed, UnaryOperator,
        Untyped,
    },
    error::{CheckError, CheckErrorKind},
    interval::Interval,
    token::Span,
    types::{IntKind, Type},
    util::intern::well_known,
};

type Result<T, E = CheckError> = std::result::Result<T, E>;

/// A typed expression with what is known about its value.
#[derive(Debug)]
pub(super) struct Checked {
    pub expr: Expr<Typed>,
    /// For integers and booleans.
    pub range: Option<Interval>,
    /// For arrays and slices.
    pub len: Option<Interval>,
    /// Set when the expression is a call to a declared function, whose
    /// effects and postconditions the statement applies.
    pub call: Option<CallInfo>,
}

#[derive(Debug)]
pub(super) struct CallInfo {
    pub callee: FuncKey,
    pub subst: Subst,
    pub effectful: bool,
}

fn typed(kind: ExprKind<Typed>, span: Span, ty: Type) -> Expr<Typed> {
    Expr {
        kind,
        span,
        info: ty,
    }
}

impl Checked {
    fn value(expr: Expr<Typed>, range: Option<Interval>) -> Checked {
        Checked {
            expr,
            range,
            len: None,
            call: None,
        }
    }

    fn ty(&self) -> &Type {
        &self.expr.info
    }
}

/// Whether `result` occurs in the expression.
pub(super) fn mentions_result(expr: &Expr<Typed>) -> bool {
    expr.any(&mut |e| matches!(e.kind, ExprKind::Result))
}

impl Checker<'_> {
    /// Types `e` and discharges the obligations `mode` calls for. `root` is
    /// set for the outermost expression of a statement, the only place an
    /// effectful call may appear.
    pub(super) fn expr(
        &self,
        e: &Expr<Untyped>,
        facts: &Facts,
        mode: Mode,
        root: bool,
    ) -> Result<Checked> {
        match &e.kind {
            ExprKind::Int(value) => Ok(Checked::value(
                typed(ExprKind::Int(*value), e.span, Type::Ideal),
                Some(Interval::singleton(i128::from(*value))),
            )),
            ExprKind::Bool(value) => Ok(Checked::value(
                typed(ExprKind::Bool(*value), e.span, Type::Bool),
                Some(Interval::singleton(i128::from(*value))),
            )),
            ExprKind::Id(ident) => self.id(ident, e.span, facts),
            ExprKind::This => match self.scope.receiver {
                Some(receiver) => {
                    let ty = Type::Ptr(Box::new(Type::Struct(receiver)));
                    Ok(self.place(typed(ExprKind::This, e.span, ty), facts))
                }
                None => Err(self.error(
                    e.span,
                    CheckErrorKind::UnresolvedName {
                        name: "this".to_string(),
                    },
                )),
            },
            ExprKind::Result => {
                if !self.scope.allow_result {
                    return Err(self.error(
                        e.span,
                        CheckErrorKind::UnresolvedName {
                            name: "result".to_string(),
                        },
                    ));
                }
                let ty = self.scope.ret.clone();
                Ok(self.place(typed(ExprKind::Result, e.span, ty), facts))
            }
            ExprKind::Unary { op, expr } => self.unary(e, *op, expr, facts, mode),
            ExprKind::Binary { op, lhs, rhs } => match op {
                BinaryOperator::And | BinaryOperator::Or => {
                    self.logical(e, *op, lhs, rhs, facts, mode)
                }
                op if op.is_comparison() => self.comparison(e, *op, lhs, rhs, facts, mode),
                op => self.arithmetic(e, *op, lhs, rhs, facts, mode),
            },
            ExprKind::Call {
                receiver,
                callee,
                args,
            } => self.call(e, receiver.as_deref(), callee, args, facts, mode, root),
            ExprKind::Field { base, field } => {
                let base = self.expr(base, facts, mode, false)?;
                let Type::Struct(name) = base.ty().pointee() else {
                    return Err(self.mismatch(base.expr.span, "struct", base.ty()));
                };
                let Some(ty) = self.symbols.structs[name].field(field.name).cloned() else {
                    return Err(self.error(
                        field.span,
                        CheckErrorKind::UnresolvedName {
                            name: self.name(field.name),
                        },
                    ));
                };
                let kind = ExprKind::Field {
                    base: Box::new(base.expr),
                    field: *field,
                };
                Ok(self.place(typed(kind, e.span, ty), facts))
            }
            ExprKind::Index { base, index } => self.index(e, base, index, facts, mode),
            ExprKind::Slice { base, lo, hi } => {
                self.slice(e, base, lo.as_deref(), hi.as_deref(), facts, mode)
            }
            ExprKind::As { expr, ty } => self.conversion(e, expr, ty, facts, mode),
            ExprKind::Paren(inner) => {
                let inner = self.expr(inner, facts, mode, root)?;
                let ty = inner.ty().clone();
                Ok(Checked {
                    expr: typed(ExprKind::Paren(Box::new(inner.expr)), e.span, ty),
                    ..inner
                })
            }
        }
    }

    /// Types a `pre`, `post`, `inv` or `assert` clause.
    pub(super) fn clause(
        &self,
        clause: &Clause<Untyped>,
        facts: &Facts,
        mode: Mode,
    ) -> Result<Clause<Typed>> {
        let cond = self.expr(&clause.cond, facts, mode, false)?;
        self.expect_bool(&cond)?;
        Ok(Clause {
            kind: clause.kind,
            cond: cond.expr,
            reason: clause.reason,
            span: clause.span,
        })
    }

    pub(super) fn constant(&self, c: &Const<Untyped>) -> Result<Const<Typed>> {
        let value = self.expr(&c.value, &Facts::default(), Mode::TypeOnly, false)?;
        Ok(Const {
            name: c.name,
            ty: c.ty.clone(),
            value: value.expr,
        })
    }

    pub(super) fn resolve_type(&self, ty: &TypeExpr) -> Result<Type> {
        let mut globals = Frozen {
            tm: self.tm,
            symbols: self.symbols,
        };
        resolve_type(&mut globals, self.source, ty)
    }

    /// Fills in the range and length of a place from its declared type and
    /// the facts about its key.
    fn place(&self, expr: Expr<Typed>, facts: &Facts) -> Checked {
        let key = self.key_of(&expr, None);
        let known = |key: Option<&Key>, declared: Interval| {
            key.and_then(|key| facts.get(key))
                .and_then(|fact| fact.meet(declared))
                .unwrap_or(declared)
        };
        let range = expr.info.value_range().map(|declared| known(key.as_ref(), declared));
        let len = match expr.info.pointee() {
            Type::Array { len, .. } => Some(Interval::singleton(i128::from(*len))),
            Type::Slice(_) => Some(known(key.map(Key::len).as_ref(), ANY_LEN)),
            _ => None,
        };
        Checked {
            expr,
            range,
            len,
            call: None,
        }
    }

    fn id(&self, ident: &Ident, span: Span, facts: &Facts) -> Result<Checked> {
        let kind = ExprKind::Id(*ident);
        if let Some(local) = self.scope.local(ident.name) {
            return Ok(self.place(typed(kind, span, local.ty.clone()), facts));
        }
        if let Some(c) = self.symbols.consts.get(&ident.name) {
            return Ok(Checked::value(
                typed(kind, span, c.ty.clone()),
                Some(Interval::singleton(c.value)),
            ));
        }
        let name = self.name(ident.name);
        if self.symbols.global_location(ident.name).is_some() {
            return Err(self.error(
                span,
                CheckErrorKind::TypeMismatch {
                    expected: "value".to_string(),
                    found: name,
                },
            ));
        }
        Err(self.error(span, CheckErrorKind::UnresolvedName { name }))
    }

    fn unary(
        &self,
        e: &Expr<Untyped>,
        op: UnaryOperator,
        inner: &Expr<Untyped>,
        facts: &Facts,
        mode: Mode,
    ) -> Result<Checked> {
        let inner = self.expr(inner, facts, mode, false)?;
        match op {
            UnaryOperator::Not => {
                self.expect_bool(&inner)?;
                let kind = ExprKind::Unary {
                    op,
                    expr: Box::new(inner.expr),
                };
                let expr = typed(kind, e.span, Type::Bool);
                let range = self.truth(&expr, None, facts);
                Ok(Checked::value(expr, Some(range)))
            }
            UnaryOperator::Neg => {
                let kind = self.integer(&inner)?;
                let range = inner.range.unwrap_or(Interval::FULL).neg();
                let ty = kind.map_or(Type::Ideal, Type::int);
                let expr = typed(
                    ExprKind::Unary {
                        op,
                        expr: Box::new(inner.expr),
                    },
                    e.span,
                    ty,
                );
                if mode == Mode::Exec {
                    self.check_fits(&expr, range, &expr.info)?;
                }
                Ok(Checked::value(expr, Some(range)))
            }
        }
    }

    fn logical(
        &self,
        e: &Expr<Untyped>,
        op: BinaryOperator,
        lhs: &Expr<Untyped>,
        rhs: &Expr<Untyped>,
        facts: &Facts,
        mode: Mode,
    ) -> Result<Checked> {
        let lhs = self.expr(lhs, facts, mode, false)?;
        self.expect_bool(&lhs)?;
        // The right operand is only evaluated when the left one did not
        // decide the result.
        let mut guarded = facts.clone();
        if op == BinaryOperator::And {
            self.assume(&lhs.expr, None, &mut guarded);
        } else {
            self.assume_negation(&lhs.expr, None, &mut guarded);
        }
        let rhs = self.expr(rhs, &guarded, mode, false)?;
        self.expect_bool(&rhs)?;
        let kind = ExprKind::Binary {
            op,
            lhs: Box::new(lhs.expr),
            rhs: Box::new(rhs.expr),
        };
        let expr = typed(kind, e.span, Type::Bool);
        let range = self.truth(&expr, None, facts);
        Ok(Checked::value(expr, Some(range)))
    }

    fn comparison(
        &self,
        e: &Expr<Untyped>,
        op: BinaryOperator,
        lhs: &Expr<Untyped>,
        rhs: &Expr<Untyped>,
        facts: &Facts,
        mode: Mode,
    ) -> Result<Checked> {
        let lhs = self.expr(lhs, facts, mode, false)?;
        let rhs = self.expr(rhs, facts, mode, false)?;
        let comparable = (lhs.ty().is_integer() && rhs.ty().is_integer())
            || (matches!(op, BinaryOperator::Eq | BinaryOperator::Ne)
                && *lhs.ty() == Type::Bool
                && *rhs.ty() == Type::Bool);
        if !comparable {
            let expected = if *lhs.ty() == Type::Bool {
                "bool"
            } else {
                "integer"
            };
            return Err(self.error(
                rhs.expr.span,
                CheckErrorKind::TypeMismatch {
                    expected: expected.to_string(),
                    found: self.show(rhs.ty()),
                },
            ));
        }
        let kind = ExprKind::Binary {
            op,
            lhs: Box::new(lhs.expr),
            rhs: Box::new(rhs.expr),
        };
        let expr = typed(kind, e.span, Type::Bool);
        let range = self.truth(&expr, None, facts);
        Ok(Checked::value(expr, Some(range)))
    }

    fn arithmetic(
        &self,
        e: &Expr<Untyped>,
        op: BinaryOperator,
        lhs: &Expr<Untyped>,
        rhs: &Expr<Untyped>,
        facts: &Facts,
        mode: Mode,
    ) -> Result<Checked> {
        use BinaryOperator::*;

        let lhs = self.expr(lhs, facts, mode, false)?;
        let rhs = self.expr(rhs, facts, mode, false)?;
        let shift = matches!(op, Shl | Shr);
        let kind = match (self.integer(&lhs)?, self.integer(&rhs)?) {
            (Some(a), Some(b)) if a == b || shift => Some(a),
            (Some(a), Some(b)) => {
                return Err(self.error(
                    rhs.expr.span,
                    CheckErrorKind::TypeMismatch {
                        expected: a.name().to_string(),
                        found: b.name().to_string(),
                    },
                ))
            }
            (Some(k), None) | (None, Some(k)) => Some(k),
            (None, None) => None,
        };
        let (a, b) = (
            lhs.range.unwrap_or(Interval::FULL),
            rhs.range.unwrap_or(Interval::FULL),
        );

        // An integer constant takes the kind of the other operand and must fit
        // it. A shift amount is checked separately.
        if let Some(k) = kind {
            let operands = if shift { 1 } else { 2 };
            for operand in [&lhs, &rhs].into_iter().take(operands) {
                if *operand.ty() == Type::Ideal {
                    let value = operand.range.unwrap_or(Interval::FULL);
                    self.check_fits(&operand.expr, value, &Type::int(k))?;
                }
            }
        } else if matches!(op, WrappingAdd | WrappingSub) {
            return Err(self.error(
                e.span,
                CheckErrorKind::TypeMismatch {
                    expected: "integer with a width".to_string(),
                    found: self.show(&Type::Ideal),
                },
            ));
        }

        if let (true, Some(k), Mode::Exec) = (shift, kind, mode) {
            let allowed = Interval::new(0, i128::from(k.bits()) - 1);
            if !b.is_within(allowed) {
                return Err(self.error(
                    rhs.expr.span,
                    CheckErrorKind::PossibleOverflow {
                        expr: self.show(&rhs.expr),
                        bound: b,
                        ty: format!("{} shift amount", k.name()),
                        range: allowed,
                    },
                ));
            }
        }

        let ty = kind.map_or(Type::Ideal, Type::int);
        let expr = typed(
            ExprKind::Binary {
                op,
                lhs: Box::new(lhs.expr),
                rhs: Box::new(rhs.expr),
            },
            e.span,
            ty,
        );

        if matches!(op, Div | Rem) && mode != Mode::TypeOnly && b.contains(0) {
            return Err(self.error(
                e.span,
                CheckErrorKind::PossibleDivisionByZero {
                    expr: self.show(&expr),
                    bound: b,
                },
            ));
        }

        let mut range = match kind {
            None => match (a.as_singleton(), b.as_singleton()) {
                (Some(x), Some(y)) => match fold_binary(op, x, y) {
                    Some(value) => Interval::singleton(value),
                    None => {
                        return Err(self.error(
                            e.span,
                            CheckErrorKind::PossibleOverflow {
                                expr: self.show(&expr),
                                bound: Interval::FULL,
                                ty: self.show(&Type::Ideal),
                                range: Interval::FULL,
                            },
                        ))
                    }
                },
                _ => Interval::FULL,
            },
            Some(k) => match op {
                WrappingAdd | WrappingSub => {
                    let exact = if op == WrappingAdd { a.add(b) } else { a.sub(b) };
                    if exact.is_within(k.range()) {
                        exact
                    } else {
                        k.range()
                    }
                }
                _ => arith(op, a, b).unwrap_or(k.range()),
            },
        };
        if let Some(fact) = self.key_of(&expr, None).and_then(|key| facts.get(&key)) {
            range = fact.meet(range).unwrap_or(range);
        }
        if mode == Mode::Exec && kind.is_some() {
            self.check_fits(&expr, range, &expr.info)?;
        }
        Ok(Checked::value(expr, Some(range)))
    }

    fn index(
        &self,
        e: &Expr<Untyped>,
        base: &Expr<Untyped>,
        index: &Expr<Untyped>,
        facts: &Facts,
        mode: Mode,
    ) -> Result<Checked> {
        let base = self.expr(base, facts, mode, false)?;
        let Some(elem) = base.ty().pointee().elem().cloned() else {
            return Err(self.mismatch(base.expr.span, "array or slice", base.ty()));
        };
        let index = self.expr(index, facts, mode, false)?;
        self.integer(&index)?;

        let length = self.length(&base);
        let at = Operand {
            key: self.key_of(&index.expr, None),
            range: index.range.unwrap_or(Interval::FULL),
        };
        let kind = ExprKind::Index {
            base: Box::new(base.expr),
            index: Box::new(index.expr),
        };
        let expr = typed(kind, e.span, elem);
        if mode != Mode::TypeOnly {
            let in_bounds = self.prove_cmp(BinaryOperator::Le, &Operand::lit(0), &at, facts)
                && self.prove_cmp(BinaryOperator::Lt, &at, &length, facts);
            if !in_bounds {
                return Err(self.error(
                    e.span,
                    CheckErrorKind::PossibleOutOfBounds {
                        expr: self.show(&expr),
                        index: at.range,
                        length: length.range,
                    },
                ));
            }
        }
        Ok(self.place(expr, facts))
    }

    fn slice(
        &self,
        e: &Expr<Untyped>,
        base: &Expr<Untyped>,
        lo: Option<&Expr<Untyped>>,
        hi: Option<&Expr<Untyped>>,
        facts: &Facts,
        mode: Mode,
    ) -> Result<Checked> {
        let base = self.expr(base, facts, mode, false)?;
        let Some(elem) = base.ty().pointee().elem().cloned() else {
            return Err(self.mismatch(base.expr.span, "array or slice", base.ty()));
        };
        let length = self.length(&base);

        let bound = |bound: Option<&Expr<Untyped>>, default: &Operand| -> Result<_> {
            let Some(bound) = bound else {
                return Ok((None, default.clone()));
            };
            let checked = self.expr(bound, facts, mode, false)?;
            self.integer(&checked)?;
            let operand = Operand {
                key: self.key_of(&checked.expr, None),
                range: checked.range.unwrap_or(Interval::FULL),
            };
            Ok((Some(Box::new(checked.expr)), operand))
        };
        let (lo, start) = bound(lo, &Operand::lit(0))?;
        let (hi, end) = bound(hi, &length)?;

        let kind = ExprKind::Slice {
            base: Box::new(base.expr),
            lo,
            hi,
        };
        let expr = typed(kind, e.span, Type::Slice(Box::new(elem)));
        if mode != Mode::TypeOnly {
            use BinaryOperator::Le;
            let in_bounds = self.prove_cmp(Le, &Operand::lit(0), &start, facts)
                && self.prove_cmp(Le, &start, &end, facts)
                && self.prove_cmp(Le, &end, &length, facts);
            if !in_bounds {
                return Err(self.error(
                    e.span,
                    CheckErrorKind::PossibleOutOfBounds {
                        expr: self.show(&expr),
                        index: start.range.hull(end.range),
                        length: length.range,
                    },
                ));
            }
        }
        let len = end.range.sub(start.range).meet(ANY_LEN).unwrap_or(ANY_LEN);
        Ok(Checked {
            expr,
            range: None,
            len: Some(len),
            call: None,
        })
    }

    /// The length of a checked array or slice, as an operand.
    fn length(&self, base: &Checked) -> Operand {
        Operand {
            key: self.len_key(&base.expr),
            range: base.len.unwrap_or(ANY_LEN),
        }
    }

    fn conversion(
        &self,
        e: &Expr<Untyped>,
        inner: &Expr<Untyped>,
        ty: &TypeExpr,
        facts: &Facts,
        mode: Mode,
    ) -> Result<Checked> {
        let inner = self.expr(inner, facts, mode, false)?;
        self.integer(&inner)?;
        let target = self.resolve_type(ty)?;
        let Some(allowed) = target.int_kind().and(target.value_range()) else {
            return Err(self.mismatch(ty.span, "integer type", &target));
        };
        let value = inner.range.unwrap_or(Interval::FULL);
        let kind = ExprKind::As {
            expr: Box::new(inner.expr),
            ty: ty.clone(),
        };
        let expr = typed(kind, e.span, target);
        if mode == Mode::Exec {
            self.check_fits(&expr, value, &expr.info)?;
        }
        let range = value.meet(allowed).unwrap_or(allowed);
        Ok(Checked::value(expr, Some(range)))
    }

    #[allow(clippy::too_many_arguments)]
    fn call(
        &self,
        e: &Expr<Untyped>,
        receiver: Option<&Expr<Untyped>>,
        callee: &Ident,
        args: &[Expr<Untyped>],
        facts: &Facts,
        mode: Mode,
        root: bool,
    ) -> Result<Checked> {
        let receiver = receiver
            .map(|receiver| self.expr(receiver, facts, mode, false))
            .transpose()?;

        // The builtin `len()` of arrays and slices.
        if let Some(base) = &receiver {
            if callee.name == well_known::LEN
                && args.is_empty()
                && base.ty().pointee().elem().is_some()
            {
                let length = base.len.unwrap_or(ANY_LEN);
                let kind = ExprKind::Call {
                    receiver: receiver.map(|base| Box::new(base.expr)),
                    callee: *callee,
                    args: Vec::new(),
                };
                let expr = typed(kind, e.span, Type::int(IntKind::U64));
                return Ok(Checked::value(expr, Some(length)));
            }
        }

        let key = match &receiver {
            Some(base) => match base.ty().pointee() {
                Type::Struct(name) => FuncKey {
                    receiver: Some(*name),
                    name: callee.name,
                },
                other => return Err(self.mismatch(base.expr.span, "struct", other)),
            },
            None => FuncKey {
                receiver: None,
                name: callee.name,
            },
        };
        let callee_name = self.name(callee.name);
        let Some(symbol) = self.symbols.funcs.get(&key) else {
            return Err(self.error(
                callee.span,
                CheckErrorKind::UnresolvedName { name: callee_name },
            ));
        };
        if symbol.effectful && (!root || mode != Mode::Exec) {
            return Err(self.error(e.span, CheckErrorKind::NestedEffect { callee: callee_name }));
        }
        if args.len() != symbol.params.len() {
            return Err(self.error(
                e.span,
                CheckErrorKind::TypeMismatch {
                    expected: format!("{} arguments", symbol.params.len()),
                    found: args.len().to_string(),
                },
            ));
        }

        let mut subst = Subst::default();
        if let Some(base) = &receiver {
            subst.this = Some(Operand {
                key: self.key_of(&base.expr, None),
                range: Interval::FULL,
            });
        }
        let mut typed_args = Vec::with_capacity(args.len());
        for (arg, (param, param_ty)) in args.iter().zip(&symbol.params) {
            let arg = self.expr(arg, facts, mode, false)?;
            self.expect_assignable(&arg, param_ty)?;
            let range = arg.range.unwrap_or(Interval::FULL);
            if let (Some(allowed), false) = (param_ty.value_range(), mode == Mode::TypeOnly) {
                if !range.is_within(allowed) {
                    return Err(self.error(
                        arg.expr.span,
                        CheckErrorKind::UnprovenPrecondition {
                            callee: callee_name,
                            cond: format!("{}: {}", self.name(*param), self.show(param_ty)),
                        },
                    ));
                }
            }
            subst.bindings.insert(
                *param,
                Operand {
                    key: self.key_of(&arg.expr, None),
                    range: param_ty
                        .value_range()
                        .map_or(range, |allowed| range.meet(allowed).unwrap_or(allowed)),
                },
            );
            typed_args.push(arg.expr);
        }

        if mode != Mode::TypeOnly {
            for pre in &symbol.pre {
                if !self.prove(&pre.cond, Some(&subst), facts) {
                    return Err(self.error(
                        e.span,
                        CheckErrorKind::UnprovenPrecondition {
                            callee: callee_name,
                            cond: self.show(&pre.cond),
                        },
                    ));
                }
            }
        }

        let range = self.result_range(key, &subst, facts);
        let kind = ExprKind::Call {
            receiver: receiver.map(|base| Box::new(base.expr)),
            callee: *callee,
            args: typed_args,
        };
        Ok(Checked {
            expr: typed(kind, e.span, symbol.ret.clone()),
            range,
            len: None,
            call: Some(CallInfo {
                callee: key,
                subst,
                effectful: symbol.effectful,
            }),
        })
    }

    /// What the callee's postconditions say about its result.
    fn result_range(&self, callee: FuncKey, subst: &Subst, facts: &Facts) -> Option<Interval> {
        let symbol = &self.symbols.funcs[&callee];
        let declared = symbol.ret.value_range()?;
        let mut scratch = facts.clone();
        scratch.forget(&Key::Result);
        let subst = Subst {
            result: Some(Operand {
                key: Some(Key::Result),
                range: declared,
            }),
            ..subst.clone()
        };
        for post in symbol.post.iter().filter(|post| mentions_result(&post.cond)) {
            self.assume(&post.cond, Some(&subst), &mut scratch);
        }
        let range = scratch
            .get(&Key::Result)
            .and_then(|fact| fact.meet(declared))
            .unwrap_or(declared);
        Some(range)
    }

    /// Drops what an effectful call may have changed.
    pub(super) fn call_effects(&self, call: Option<&CallInfo>, facts: &mut Facts) {
        if call.is_some_and(|call| call.effectful) {
            facts.forget_fields();
        }
    }

    /// Assumes the callee's postconditions after the call, with `result`
    /// standing for `target`. Postconditions about the result are skipped
    /// when it is discarded.
    pub(super) fn assume_result(
        &self,
        call: Option<&CallInfo>,
        target: Option<Key>,
        facts: &mut Facts,
    ) {
        let Some(call) = call else {
            return;
        };
        let symbol = &self.symbols.funcs[&call.callee];
        let mut subst = call.subst.clone();
        // Arguments are evaluated before the call; a key overwritten by the
        // call or by the assignment no longer names the argument's value.
        for operand in subst.bindings.values_mut() {
            let stale = operand.key.as_ref().is_some_and(|key| {
                (call.effectful && key.mentions_any_field())
                    || target.as_ref().is_some_and(|target| key.mentions(target))
            });
            if stale {
                operand.key = None;
            }
        }
        subst.result = target.map(|key| {
            let range = facts
                .get(&key)
                .or(symbol.ret.value_range())
                .unwrap_or(Interval::FULL);
            Operand {
                key: Some(key),
                range,
            }
        });
        for post in &symbol.post {
            if subst.result.is_none() && mentions_result(&post.cond) {
                continue;
            }
            self.assume(&post.cond, Some(&subst), facts);
        }
    }

    /// `None` for an integer constant, the kind for a fixed-width integer.
    fn integer(&self, checked: &Checked) -> Result<Option<IntKind>> {
        match checked.ty() {
            Type::Ideal => Ok(None),
            Type::Int { kind, .. } => Ok(Some(*kind)),
            other => Err(self.mismatch(checked.expr.span, "integer", other)),
        }
    }

    pub(super) fn expect_bool(&self, checked: &Checked) -> Result<()> {
        match checked.ty() {
            Type::Bool => Ok(()),
            other => Err(self.mismatch(checked.expr.span, "bool", other)),
        }
    }

    /// Whether a value of the checked type may be stored in, passed as, or
    /// returned as `target`. Value ranges are checked separately.
    pub(super) fn expect_assignable(&self, value: &Checked, target: &Type) -> Result<()> {
        let found = value.ty();
        let ok = match (found, target) {
            (Type::Ideal, Type::Int { .. }) => true,
            (Type::Struct(_) | Type::Ptr(_), Type::Struct(_) | Type::Ptr(_))
                if matches!(target.pointee(), Type::Struct(_)) =>
            {
                found.pointee() == target.pointee()
            }
            _ => found.same_shape(target),
        };
        if ok {
            Ok(())
        } else {
            Err(self.mismatch(value.expr.span, &self.show(target), found))
        }
    }

    /// `PossibleOverflow` unless every value in `range` fits `ty`.
    pub(super) fn check_fits(&self, expr: &Expr<Typed>, range: Interval, ty: &Type) -> Result<()> {
        match ty.value_range() {
            Some(allowed) if !range.is_within(allowed) => Err(self.error(
                expr.span,
                CheckErrorKind::PossibleOverflow {
                    expr: self.show(expr),
                    bound: range,
                    ty: self.show(ty),
                    range: allowed,
                },
            )),
            _ => Ok(()),
        }
    }

    pub(super) fn mismatch(&self, span: Span, expected: &str, found: &Type) -> CheckError {
        self.error(
            span,
            CheckErrorKind::TypeMismatch {
                expected: expected.to_string(),
                found: self.show(found),
            },
        )
    }
}
