use super::{
    facts::{merge, Facts, Flow, Key},
    scope::{Local, Scope},
    Checker, FuncKey, Mode,
};
use crate::{
    ast::{
        AssignOperator, BinaryOperator, Block, Clause, Else, Expr, ExprKind, Func, If, Stmt,
        StmtKind, Typed, Untyped,
    },
    error::{CheckError, CheckErrorKind},
    interval::Interval,
    token::Span,
    types::Type,
    util::intern::{well_known, Id},
};

type Result<T, E = CheckError> = std::result::Result<T, E>;

/// The innermost enclosing loop.
#[derive(Debug)]
pub(super) struct LoopFrame {
    invariants: Vec<Clause<Typed>>,
    /// Facts joined over every `break` seen so far.
    breaks: Flow,
}

impl<'a> Checker<'a> {
    #[tracing::instrument(level = "debug", skip_all, fields(func = %self.tm.get(func.name.name)))]
    pub(super) fn func(mut self, func: &'a Func<Untyped>) -> Result<Func<Typed>> {
        let symbols = self.symbols;
        let symbol = &symbols.funcs[&FuncKey::of(func)];
        self.scope = Scope::for_func(func, symbol);
        self.posts = &func.post;

        let mut facts = Facts::default();
        for pre in &func.pre {
            let clause = self.clause(pre, &facts, Mode::Proof)?;
            self.assume(&clause.cond, None, &mut facts);
        }

        let (body, end) = self.block(&func.body, Some(facts))?;
        if let Some(facts) = end {
            // The closing brace.
            let hi = func.body.span.hi();
            let at = Span::new_of_bounds(hi.saturating_sub(1)..hi);
            if symbol.ret != Type::Void {
                return Err(self.error(
                    at,
                    CheckErrorKind::MissingReturn {
                        name: self.name(func.name.name),
                    },
                ));
            }
            self.prove_posts(at, &facts)?;
        }
        tracing::debug!("verified");

        Ok(Func {
            receiver: func.receiver,
            name: func.name,
            params: func.params.clone(),
            ret: func.ret.clone(),
            pre: symbol.pre.clone(),
            post: symbol.post.clone(),
            body,
        })
    }

    /// Checks the statements of `block` in order. Names declared in it go
    /// out of scope, and out of the facts, at its end.
    fn block(&mut self, block: &Block<Untyped>, mut flow: Flow) -> Result<(Block<Typed>, Flow)> {
        let mut declared: Vec<Id> = Vec::new();
        let mut stmts = Vec::with_capacity(block.stmts.len());
        for stmt in &block.stmts {
            let Some(facts) = flow else {
                return Err(self.error(stmt.span, CheckErrorKind::UnreachableCode));
            };
            let (typed, next) = self.stmt(stmt, facts)?;
            if let StmtKind::Var { name, .. } = &stmt.kind {
                declared.push(name.name);
            }
            stmts.push(typed);
            flow = next;
        }
        for name in declared {
            self.scope.remove(name);
            if let Some(facts) = &mut flow {
                facts.forget(&Key::Var(name));
            }
        }
        Ok((
            Block {
                stmts,
                span: block.span,
            },
            flow,
        ))
    }

    fn stmt(&mut self, stmt: &Stmt<Untyped>, mut facts: Facts) -> Result<(Stmt<Typed>, Flow)> {
        let (kind, flow) = match &stmt.kind {
            StmtKind::Var { name, ty, value } => {
                if let Some(first) = self.defined_at(name.name) {
                    return Err(self.error(
                        name.span,
                        CheckErrorKind::DuplicateName {
                            name: self.name(name.name),
                            first,
                        },
                    ));
                }
                let resolved = self.resolve_type(ty)?;
                if matches!(resolved, Type::Ptr(_)) {
                    return Err(self.mismatch(ty.span, "value type", &resolved));
                }

                let (typed_value, range, len, value_key, call) = match value {
                    Some(value) => {
                        let value = self.expr(value, &facts, Mode::Exec, true)?;
                        self.expect_assignable(&value, &resolved)?;
                        if let Some(range) = value.range {
                            self.check_fits(&value.expr, range, &resolved)?;
                        }
                        let key = self.key_of(&value.expr, None);
                        (Some(value.expr), value.range, value.len, key, value.call)
                    }
                    None => {
                        let zero = Interval::singleton(0);
                        if let Some(allowed) = resolved.value_range() {
                            if !allowed.contains(0) {
                                return Err(self.error(
                                    stmt.span,
                                    CheckErrorKind::PossibleOverflow {
                                        expr: format!("{} (zero)", self.name(name.name)),
                                        bound: zero,
                                        ty: self.show(&resolved),
                                        range: allowed,
                                    },
                                ));
                            }
                        }
                        let len = match &resolved {
                            Type::Array { len, .. } => Some(Interval::singleton(i128::from(*len))),
                            Type::Slice(_) => Some(zero),
                            _ => None,
                        };
                        (None, resolved.value_range().map(|_| zero), len, None, None)
                    }
                };

                self.call_effects(call.as_ref(), &mut facts);
                let target = Key::Var(name.name);
                facts.forget(&target);
                self.scope.declare(
                    name.name,
                    Local {
                        ty: resolved.clone(),
                        mutable: true,
                        span: name.span,
                    },
                );
                self.record(&target, &resolved, range, len, value_key, &mut facts);
                self.assume_result(call.as_ref(), Some(target), &mut facts);

                let kind = StmtKind::Var {
                    name: *name,
                    ty: ty.clone(),
                    value: typed_value,
                };
                (kind, Some(facts))
            }
            StmtKind::Assign { target, op, value } => {
                let (target, value) = self.assign(target, *op, value, &mut facts)?;
                let kind = StmtKind::Assign {
                    target,
                    op: *op,
                    value,
                };
                (kind, Some(facts))
            }
            StmtKind::If(node) => {
                let (node, flow) = self.if_stmt(node, facts)?;
                (StmtKind::If(node), flow)
            }
            StmtKind::While {
                cond,
                invariants,
                body,
            } => self.while_stmt(cond, invariants, body, facts)?,
            StmtKind::Assert(clause) => {
                let clause = self.clause(clause, &facts, Mode::Proof)?;
                if !self.prove(&clause.cond, None, &facts) {
                    return Err(self.error(
                        clause.span,
                        CheckErrorKind::UnprovenAssertion {
                            cond: self.show(&clause.cond),
                        },
                    ));
                }
                self.assume(&clause.cond, None, &mut facts);
                (StmtKind::Assert(clause), Some(facts))
            }
            StmtKind::Expr(expr) => {
                let checked = self.expr(expr, &facts, Mode::Exec, true)?;
                self.call_effects(checked.call.as_ref(), &mut facts);
                self.assume_result(checked.call.as_ref(), None, &mut facts);
                (StmtKind::Expr(checked.expr), Some(facts))
            }
            StmtKind::Return(value) => {
                let value = self.return_value(stmt.span, value.as_ref(), &mut facts)?;
                self.prove_posts(stmt.span, &facts)?;
                (StmtKind::Return(value), None)
            }
            StmtKind::Break => {
                let Some(frame) = self.loops.last_mut() else {
                    unreachable!("break outside of a loop is rejected by the parser");
                };
                frame.breaks = merge(frame.breaks.take(), Some(facts));
                (StmtKind::Break, None)
            }
            StmtKind::Continue => {
                let Some(frame) = self.loops.last() else {
                    unreachable!("continue outside of a loop is rejected by the parser");
                };
                for inv in &frame.invariants {
                    if !self.prove(&inv.cond, None, &facts) {
                        return Err(self.error(
                            stmt.span,
                            CheckErrorKind::UnprovenAssertion {
                                cond: self.show(&inv.cond),
                            },
                        ));
                    }
                }
                (StmtKind::Continue, None)
            }
        };
        Ok((
            Stmt {
                kind,
                span: stmt.span,
            },
            flow,
        ))
    }

    fn assign(
        &self,
        target: &Expr<Untyped>,
        op: AssignOperator,
        value: &Expr<Untyped>,
        facts: &mut Facts,
    ) -> Result<(Expr<Typed>, Expr<Typed>)> {
        self.check_mutable(target)?;
        let place = self.expr(target, facts, Mode::Exec, false)?;
        let value = self.expr(value, facts, Mode::Exec, true)?;
        self.expect_assignable(&value, &place.expr.info)?;
        let target_ty = place.expr.info.clone();

        let new_range = match op {
            AssignOperator::Set => {
                if let Some(range) = value.range {
                    self.check_fits(&value.expr, range, &target_ty)?;
                }
                value.range
            }
            AssignOperator::Add | AssignOperator::Sub => {
                let Some(kind) = target_ty.int_kind() else {
                    return Err(self.mismatch(place.expr.span, "integer", &target_ty));
                };
                let step = value.range.unwrap_or(Interval::FULL);
                self.check_fits(&value.expr, step, &Type::int(kind))?;
                let current = place.range.unwrap_or(Interval::FULL);
                let (symbol, next) = if op == AssignOperator::Add {
                    ("+", current.add(step))
                } else {
                    ("-", current.sub(step))
                };
                if let Some(allowed) = target_ty.value_range() {
                    if !next.is_within(allowed) {
                        return Err(self.error(
                            target.span,
                            CheckErrorKind::PossibleOverflow {
                                expr: format!(
                                    "{} {symbol} {}",
                                    self.show(&place.expr),
                                    self.show(&value.expr)
                                ),
                                bound: next,
                                ty: self.show(&target_ty),
                                range: allowed,
                            },
                        ));
                    }
                }
                Some(next)
            }
        };

        self.call_effects(value.call.as_ref(), facts);
        let target_key = self.key_of(&place.expr, None);
        forget_aliases(&place.expr, facts);
        // Nothing is tracked about array elements, which have no key.
        if let Some(key) = &target_key {
            let value_key = match op {
                AssignOperator::Set => self.key_of(&value.expr, None),
                AssignOperator::Add | AssignOperator::Sub => None,
            };
            let step = match op {
                AssignOperator::Set => value_key.as_ref().and_then(|value| step_of(key, value)),
                AssignOperator::Add => value.range.and_then(Interval::as_singleton),
                AssignOperator::Sub => value
                    .range
                    .and_then(Interval::as_singleton)
                    .and_then(i128::checked_neg),
            };
            match (key, step) {
                (Key::Var(_), Some(delta)) => facts.shift(key, delta),
                _ => facts.forget(key),
            }
            self.record(key, &target_ty, new_range, value.len, value_key, facts);
        }
        self.assume_result(value.call.as_ref(), target_key, facts);
        Ok((place.expr, value.expr))
    }

    /// Parameters and constants cannot be assigned, nor can anything reached
    /// through a parameter other than a pointer.
    fn check_mutable(&self, target: &Expr<Untyped>) -> Result<()> {
        let mut root = target.strip_parens();
        loop {
            match &root.kind {
                ExprKind::Field { base, .. } | ExprKind::Index { base, .. } => {
                    root = base.strip_parens();
                }
                _ => break,
            }
        }
        let ExprKind::Id(ident) = &root.kind else {
            return Ok(());
        };
        let reason = match self.scope.local(ident.name) {
            Some(local) if !local.mutable && !matches!(local.ty, Type::Ptr(_)) => {
                "parameters are immutable"
            }
            Some(_) => return Ok(()),
            None if self.symbols.consts.contains_key(&ident.name) => "constants are immutable",
            None => return Ok(()),
        };
        Err(self.error(
            target.span,
            CheckErrorKind::InvalidAssignment {
                target: self.name(ident.name),
                reason,
            },
        ))
    }

    /// Records what an assignment of `value` to `target` establishes.
    fn record(
        &self,
        target: &Key,
        ty: &Type,
        range: Option<Interval>,
        len: Option<Interval>,
        value: Option<Key>,
        facts: &mut Facts,
    ) {
        if let (Some(range), Some(allowed)) = (range, ty.value_range()) {
            facts.set(target.clone(), range.meet(allowed).unwrap_or(allowed));
        }
        let slice = matches!(ty.pointee(), Type::Slice(_));
        if let (true, Some(len)) = (slice, len) {
            facts.set(Key::len(target.clone()), len);
        }
        let Some(value) = value else {
            return;
        };
        if value.mentions(target) || value.as_lit().is_some() {
            return;
        }
        if slice {
            let lengths = Key::binary(
                BinaryOperator::Eq,
                Key::len(target.clone()),
                Key::len(value.clone()),
            );
            facts.set(lengths, Interval::TRUE);
        }
        facts.set(
            Key::binary(BinaryOperator::Eq, target.clone(), value),
            Interval::TRUE,
        );
    }

    fn if_stmt(&mut self, node: &If<Untyped>, facts: Facts) -> Result<(If<Typed>, Flow)> {
        let cond = self.expr(&node.cond, &facts, Mode::Exec, false)?;
        self.expect_bool(&cond)?;

        let mut then_facts = facts.clone();
        self.assume(&cond.expr, None, &mut then_facts);
        let mut else_facts = facts;
        self.assume_negation(&cond.expr, None, &mut else_facts);

        let (then, then_flow) = self.block(&node.then, Some(then_facts))?;
        let (otherwise, else_flow) = match &node.otherwise {
            None => (None, Some(else_facts)),
            Some(Else::If(inner)) => {
                let (inner, flow) = self.if_stmt(inner, else_facts)?;
                (Some(Else::If(Box::new(inner))), flow)
            }
            Some(Else::Block(block)) => {
                let (block, flow) = self.block(block, Some(else_facts))?;
                (Some(Else::Block(block)), flow)
            }
        };
        let node = If {
            cond: cond.expr,
            then,
            otherwise,
        };
        Ok((node, merge(then_flow, else_flow)))
    }

    fn while_stmt(
        &mut self,
        cond: &Expr<Untyped>,
        invariants: &[Clause<Untyped>],
        body: &Block<Untyped>,
        facts: Facts,
    ) -> Result<(StmtKind<Typed>, Flow)> {
        let mut typed_invariants = Vec::with_capacity(invariants.len());
        for inv in invariants {
            let inv = self.clause(inv, &facts, Mode::Proof)?;
            if !self.prove(&inv.cond, None, &facts) {
                return Err(self.error(
                    inv.span,
                    CheckErrorKind::UnprovenAssertion {
                        cond: self.show(&inv.cond),
                    },
                ));
            }
            typed_invariants.push(inv);
        }

        // Any iteration: whatever the body may change is only known through
        // the invariants.
        let mut head = facts;
        self.forget_mutated(body, &mut head);
        for inv in &typed_invariants {
            self.assume(&inv.cond, None, &mut head);
        }
        let cond = self.expr(cond, &head, Mode::Exec, false)?;
        self.expect_bool(&cond)?;

        let mut entry = head.clone();
        self.assume(&cond.expr, None, &mut entry);
        self.loops.push(LoopFrame {
            invariants: typed_invariants,
            breaks: None,
        });
        let checked = self.block(body, Some(entry));
        let Some(frame) = self.loops.pop() else {
            unreachable!("loop frame pushed above");
        };
        let (body, end) = checked?;

        if let Some(end) = &end {
            for inv in &frame.invariants {
                if !self.prove(&inv.cond, None, end) {
                    return Err(self.error(
                        inv.span,
                        CheckErrorKind::UnprovenAssertion {
                            cond: self.show(&inv.cond),
                        },
                    ));
                }
            }
        }

        let exit = if matches!(cond.expr.strip_parens().kind, ExprKind::Bool(true)) {
            None
        } else {
            let mut exit = head;
            self.assume_negation(&cond.expr, None, &mut exit);
            Some(exit)
        };
        let kind = StmtKind::While {
            cond: cond.expr,
            invariants: frame.invariants,
            body,
        };
        Ok((kind, merge(exit, frame.breaks)))
    }

    /// Drops every fact about a place the loop body may change.
    fn forget_mutated(&self, block: &Block<Untyped>, facts: &mut Facts) {
        for stmt in &block.stmts {
            match &stmt.kind {
                StmtKind::Var { name, value, .. } => {
                    facts.forget(&Key::Var(name.name));
                    if let Some(value) = value {
                        self.forget_effects(value, facts);
                    }
                }
                StmtKind::Assign { target, value, .. } => {
                    match &target.strip_parens().kind {
                        ExprKind::Id(ident) => facts.forget(&Key::Var(ident.name)),
                        ExprKind::Field { field, .. } => facts.forget_field(field.name),
                        _ => (),
                    }
                    if self.may_write_struct(target) {
                        facts.forget_fields();
                    }
                    self.forget_effects(value, facts);
                }
                StmtKind::If(node) => self.forget_mutated_if(node, facts),
                StmtKind::While { body, .. } => self.forget_mutated(body, facts),
                StmtKind::Expr(expr) | StmtKind::Return(Some(expr)) => {
                    self.forget_effects(expr, facts);
                }
                StmtKind::Assert(_)
                | StmtKind::Return(None)
                | StmtKind::Break
                | StmtKind::Continue => (),
            }
        }
    }

    /// Whether writing `target` may replace a whole struct that another
    /// pointer can reach. Locals are never reachable through a pointer.
    fn may_write_struct(&self, target: &Expr<Untyped>) -> bool {
        match &target.strip_parens().kind {
            ExprKind::Id(ident) => self
                .scope
                .local(ident.name)
                .is_some_and(|local| matches!(local.ty, Type::Ptr(_)) && holds_struct(&local.ty)),
            ExprKind::Field { field, .. } => self
                .symbols
                .structs
                .values()
                .any(|s| s.field(field.name).is_some_and(holds_struct)),
            ExprKind::Index { .. } => {
                let mut root = target.strip_parens();
                while let ExprKind::Field { base, .. } | ExprKind::Index { base, .. } = &root.kind {
                    root = base.strip_parens();
                }
                let ExprKind::Id(ident) = &root.kind else {
                    return true;
                };
                self.scope
                    .local(ident.name)
                    .is_none_or(|local| holds_struct(&local.ty))
            }
            _ => true,
        }
    }

    fn forget_mutated_if(&self, node: &If<Untyped>, facts: &mut Facts) {
        self.forget_mutated(&node.then, facts);
        match &node.otherwise {
            Some(Else::If(inner)) => self.forget_mutated_if(inner, facts),
            Some(Else::Block(block)) => self.forget_mutated(block, facts),
            None => (),
        }
    }

    fn forget_effects(&self, expr: &Expr<Untyped>, facts: &mut Facts) {
        let method_len = self
            .symbols
            .funcs
            .keys()
            .any(|key| key.receiver.is_some() && key.name == well_known::LEN);
        let effectful = expr.any(&mut |e| match &e.kind {
            ExprKind::Call {
                receiver: Some(_),
                callee,
                ..
            } => callee.name != well_known::LEN || method_len,
            ExprKind::Call {
                receiver: None,
                callee,
                ..
            } => self
                .symbols
                .funcs
                .get(&FuncKey {
                    receiver: None,
                    name: callee.name,
                })
                .is_some_and(|symbol| symbol.effectful),
            _ => false,
        });
        if effectful {
            facts.forget_fields();
        }
    }

    fn return_value(
        &self,
        span: Span,
        value: Option<&Expr<Untyped>>,
        facts: &mut Facts,
    ) -> Result<Option<Expr<Typed>>> {
        let ret = self.scope.ret.clone();
        let value = match (value, ret == Type::Void) {
            (None, true) => return Ok(None),
            (None, false) => {
                return Err(self.error(
                    span,
                    CheckErrorKind::TypeMismatch {
                        expected: self.show(&ret),
                        found: "no value".to_string(),
                    },
                ))
            }
            (Some(value), true) => {
                let value = self.expr(value, facts, Mode::TypeOnly, true)?;
                return Err(self.mismatch(value.expr.span, "no value", &value.expr.info));
            }
            (Some(value), false) => self.expr(value, facts, Mode::Exec, true)?,
        };
        self.expect_assignable(&value, &ret)?;
        if let Some(range) = value.range {
            self.check_fits(&value.expr, range, &ret)?;
        }
        self.call_effects(value.call.as_ref(), facts);
        let value_key = self.key_of(&value.expr, None);
        facts.forget(&Key::Result);
        self.record(&Key::Result, &ret, value.range, value.len, value_key, facts);
        self.assume_result(value.call.as_ref(), Some(Key::Result), facts);
        Ok(Some(value.expr))
    }

    /// Every postcondition must hold where the function returns.
    fn prove_posts(&mut self, at: Span, facts: &Facts) -> Result<()> {
        self.scope.allow_result = true;
        let proven = self.check_posts(at, facts);
        self.scope.allow_result = false;
        proven
    }

    fn check_posts(&self, at: Span, facts: &Facts) -> Result<()> {
        for post in self.posts {
            let post = self.clause(post, facts, Mode::Proof)?;
            if !self.prove(&post.cond, None, facts) {
                return Err(self.error(
                    at,
                    CheckErrorKind::UnprovenAssertion {
                        cond: self.show(&post.cond),
                    },
                ));
            }
        }
        Ok(())
    }
}

/// Drops the facts a write to `place` may invalidate through another
/// pointer to the same memory. Writing a whole struct or array changes every
/// field it contains; writing one field changes that field under any base.
fn forget_aliases(place: &Expr<Typed>, facts: &mut Facts) {
    match (place.info.pointee(), &place.strip_parens().kind) {
        (ty, _) if holds_struct(ty) => facts.forget_fields(),
        (_, ExprKind::Field { field, .. }) => facts.forget_field(field.name),
        _ => (),
    }
}

fn holds_struct(ty: &Type) -> bool {
    match ty {
        Type::Struct(_) => true,
        Type::Array { elem, .. } | Type::Slice(elem) | Type::Ptr(elem) => holds_struct(elem),
        _ => false,
    }
}

/// The constant step of `target = value`, when `value` is `target` plus or
/// minus a literal.
fn step_of(target: &Key, value: &Key) -> Option<i128> {
    match value {
        _ if value == target => Some(0),
        Key::Binary(BinaryOperator::Add, lhs, rhs) if **rhs == *target => lhs.as_lit(),
        Key::Binary(BinaryOperator::Sub, lhs, rhs) if **lhs == *target => {
            rhs.as_lit().and_then(i128::checked_neg)
        }
        _ => None,
    }
}
