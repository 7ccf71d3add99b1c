//! The discharger. Decides conditions from intervals and recorded facts, and
//! records what a condition implies once it is assumed.
//!
//! Comparisons are decided, in order, by the operands' intervals, by a fact
//! recorded for the comparison itself, by one step of transitivity through a
//! recorded relation, and by moving a `+ 1` from one side to the other.

use rustc_hash::FxHashMap;

use super::{
    facts::{merge, Facts, Key},
    symbols::fold_binary,
    Checker,
};
use crate::{
    ast::{BinaryOperator, Expr, ExprKind, Typed, UnaryOperator},
    interval::Interval,
    types::Type,
    util::intern::{well_known, Id},
};

/// An expression as the prover sees it.
#[derive(Clone, Debug, PartialEq)]
pub struct Operand {
    /// Absent when the expression cannot be named, e.g. an array element.
    pub key: Option<Key>,
    pub range: Interval,
}

impl Operand {
    pub fn lit(value: i128) -> Operand {
        Operand {
            key: Some(Key::Lit(value)),
            range: Interval::singleton(value),
        }
    }
}

/// Maps a callee's parameters, receiver and result onto operands of the
/// caller, so the callee's clauses can be decided where it is called.
#[derive(Clone, Debug, Default)]
pub struct Subst {
    pub bindings: FxHashMap<Id, Operand>,
    pub this: Option<Operand>,
    pub result: Option<Operand>,
}

/// Interval arithmetic for the operators that have it. `None` when the
/// result cannot be bounded, e.g. a divisor which may be zero.
pub(super) fn arith(op: BinaryOperator, a: Interval, b: Interval) -> Option<Interval> {
    use BinaryOperator::*;
    match op {
        Add => Some(a.add(b)),
        Sub => Some(a.sub(b)),
        Mul => Some(a.mul(b)),
        Div => a.div(b),
        Rem => a.rem(b),
        Shl | Shr if b.lo() < 0 => None,
        Shl => Some(a.shl(b)),
        Shr => Some(a.shr(b)),
        BitAnd => a.bitand(b),
        BitOr => a.bitor(b),
        BitXor => a.bitxor(b),
        _ => None,
    }
}

impl Checker<'_> {
    /// The key of a typed expression. With a substitution, the expression
    /// belongs to a callee and only its parameters, receiver, result and
    /// constants can be named.
    pub(super) fn key_of(&self, expr: &Expr<Typed>, subst: Option<&Subst>) -> Option<Key> {
        match &expr.kind {
            ExprKind::Int(value) => Some(Key::Lit(i128::from(*value))),
            ExprKind::Bool(value) => Some(Key::Lit(i128::from(*value))),
            ExprKind::Id(ident) => {
                match subst {
                    Some(subst) => {
                        if let Some(operand) = subst.bindings.get(&ident.name) {
                            return operand.key.clone();
                        }
                    }
                    None if self.scope.local(ident.name).is_some() => {
                        return Some(Key::Var(ident.name));
                    }
                    None => (),
                }
                self.symbols.consts.get(&ident.name).map(|c| Key::Lit(c.value))
            }
            ExprKind::This => match subst {
                Some(subst) => subst.this.as_ref()?.key.clone(),
                None => Some(Key::This),
            },
            ExprKind::Result => match subst {
                Some(subst) => subst.result.as_ref()?.key.clone(),
                None => Some(Key::Result),
            },
            ExprKind::Unary { op, expr } => {
                let inner = self.key_of(expr, subst)?;
                Some(match (op, inner) {
                    (UnaryOperator::Neg, Key::Lit(value)) => Key::Lit(value.checked_neg()?),
                    (UnaryOperator::Not, Key::Lit(value)) => Key::Lit(1 - value),
                    (UnaryOperator::Neg, inner) => Key::Neg(Box::new(inner)),
                    (UnaryOperator::Not, inner) => Key::Not(Box::new(inner)),
                })
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let lhs = self.key_of(lhs, subst)?;
                let rhs = self.key_of(rhs, subst)?;
                if let (Key::Lit(a), Key::Lit(b)) = (&lhs, &rhs) {
                    if let Some(value) = fold_binary(*op, *a, *b) {
                        return Some(Key::Lit(value));
                    }
                }
                Some(Key::binary(*op, lhs, rhs))
            }
            ExprKind::Call {
                receiver: Some(base),
                callee,
                args,
            } if callee.name == well_known::LEN && args.is_empty() => match base.info.pointee() {
                Type::Array { len, .. } => Some(Key::Lit(i128::from(*len))),
                Type::Slice(_) => Some(Key::len(self.key_of(base, subst)?)),
                _ => None,
            },
            ExprKind::Field { base, field } => {
                Some(Key::field(self.key_of(base, subst)?, field.name))
            }
            ExprKind::As { expr, .. } | ExprKind::Paren(expr) => self.key_of(expr, subst),
            ExprKind::Call { .. } | ExprKind::Index { .. } | ExprKind::Slice { .. } => None,
        }
    }

    /// The key of a length: exact for arrays, `len()` of the base for slices.
    pub(super) fn len_key(&self, base: &Expr<Typed>) -> Option<Key> {
        match base.info.pointee() {
            Type::Array { len, .. } => Some(Key::Lit(i128::from(*len))),
            _ => self.key_of(base, None).map(Key::len),
        }
    }

    pub(super) fn operand(
        &self,
        expr: &Expr<Typed>,
        subst: Option<&Subst>,
        facts: &Facts,
    ) -> Operand {
        Operand {
            key: self.key_of(expr, subst),
            range: self.eval(expr, subst, facts),
        }
    }

    fn key_operand(&self, key: &Key, facts: &Facts) -> Operand {
        Operand {
            key: Some(key.clone()),
            range: self.key_range(key, facts),
        }
    }

    /// The interval of a typed expression under `facts`, computed
    /// mathematically: clause arithmetic never overflows.
    pub(super) fn eval(
        &self,
        expr: &Expr<Typed>,
        subst: Option<&Subst>,
        facts: &Facts,
    ) -> Interval {
        let structural = self.eval_structure(expr, subst, facts);
        match self.key_of(expr, subst).and_then(|key| facts.get(&key)) {
            Some(fact) => fact.meet(structural).unwrap_or(structural),
            None => structural,
        }
    }

    fn eval_structure(&self, expr: &Expr<Typed>, subst: Option<&Subst>, facts: &Facts) -> Interval {
        use BinaryOperator::*;

        let declared = expr.info.value_range().unwrap_or(Interval::FULL);
        match &expr.kind {
            ExprKind::Int(value) => Interval::singleton(i128::from(*value)),
            ExprKind::Bool(value) => Interval::singleton(i128::from(*value)),
            ExprKind::Id(ident) => {
                if let Some(operand) = subst.and_then(|s| s.bindings.get(&ident.name)) {
                    return operand.range;
                }
                match self.symbols.consts.get(&ident.name) {
                    Some(c) if self.scope.local(ident.name).is_none() || subst.is_some() => {
                        Interval::singleton(c.value)
                    }
                    _ => declared,
                }
            }
            ExprKind::Result => subst
                .and_then(|s| s.result.as_ref())
                .map_or(declared, |operand| operand.range),
            ExprKind::Unary {
                op: UnaryOperator::Neg,
                expr,
            } => self.eval(expr, subst, facts).neg(),
            ExprKind::Unary {
                op: UnaryOperator::Not,
                ..
            } => self.truth(expr, subst, facts),
            ExprKind::Binary { op, .. } if op.is_comparison() || op.is_logical() => {
                self.truth(expr, subst, facts)
            }
            ExprKind::Binary {
                op: op @ (WrappingAdd | WrappingSub),
                lhs,
                rhs,
            } => {
                let (a, b) = (self.eval(lhs, subst, facts), self.eval(rhs, subst, facts));
                let exact = if *op == WrappingAdd { a.add(b) } else { a.sub(b) };
                if exact.is_within(declared) {
                    exact
                } else {
                    declared
                }
            }
            ExprKind::Binary { op, lhs, rhs } => arith(
                *op,
                self.eval(lhs, subst, facts),
                self.eval(rhs, subst, facts),
            )
            .unwrap_or(declared),
            ExprKind::As { expr: inner, .. } => {
                let value = self.eval(inner, subst, facts);
                value.meet(declared).unwrap_or(value)
            }
            ExprKind::Paren(inner) => self.eval(inner, subst, facts),
            ExprKind::This
            | ExprKind::Call { .. }
            | ExprKind::Field { .. }
            | ExprKind::Index { .. }
            | ExprKind::Slice { .. } => declared,
        }
    }

    /// `[1, 1]` if `cond` is proven, `[0, 0]` if refuted, both otherwise.
    pub(super) fn truth(
        &self,
        cond: &Expr<Typed>,
        subst: Option<&Subst>,
        facts: &Facts,
    ) -> Interval {
        if self.prove(cond, subst, facts) {
            Interval::TRUE
        } else if self.refute(cond, subst, facts) {
            Interval::FALSE
        } else {
            Interval::BOOL
        }
    }

    /// Whether `cond` holds whenever `facts` do.
    pub(super) fn prove(&self, cond: &Expr<Typed>, subst: Option<&Subst>, facts: &Facts) -> bool {
        use BinaryOperator::*;
        match &cond.strip_parens().kind {
            ExprKind::Bool(value) => *value,
            ExprKind::Unary {
                op: UnaryOperator::Not,
                expr,
            } => self.refute(expr, subst, facts),
            ExprKind::Binary { op: And, lhs, rhs } => {
                self.prove(lhs, subst, facts) && {
                    let mut facts = facts.clone();
                    self.assume(lhs, subst, &mut facts);
                    self.prove(rhs, subst, &facts)
                }
            }
            ExprKind::Binary { op: Or, lhs, rhs } => {
                self.prove(lhs, subst, facts) || {
                    let mut facts = facts.clone();
                    self.assume_negation(lhs, subst, &mut facts);
                    self.prove(rhs, subst, &facts)
                }
            }
            ExprKind::Binary { op, lhs, rhs } if op.is_comparison() => {
                let a = self.operand(lhs, subst, facts);
                let b = self.operand(rhs, subst, facts);
                self.prove_cmp(*op, &a, &b, facts)
            }
            _ => self.key_fact(cond, subst, facts) == Some(Interval::TRUE),
        }
    }

    /// Whether `cond` is false whenever `facts` hold.
    pub(super) fn refute(&self, cond: &Expr<Typed>, subst: Option<&Subst>, facts: &Facts) -> bool {
        use BinaryOperator::*;
        match &cond.strip_parens().kind {
            ExprKind::Bool(value) => !*value,
            ExprKind::Unary {
                op: UnaryOperator::Not,
                expr,
            } => self.prove(expr, subst, facts),
            ExprKind::Binary { op: And, lhs, rhs } => {
                self.refute(lhs, subst, facts) || {
                    let mut facts = facts.clone();
                    self.assume(lhs, subst, &mut facts);
                    self.refute(rhs, subst, &facts)
                }
            }
            ExprKind::Binary { op: Or, lhs, rhs } => {
                self.refute(lhs, subst, facts) && {
                    let mut facts = facts.clone();
                    self.assume_negation(lhs, subst, &mut facts);
                    self.refute(rhs, subst, &facts)
                }
            }
            ExprKind::Binary { op, lhs, rhs } if op.is_comparison() => {
                let a = self.operand(lhs, subst, facts);
                let b = self.operand(rhs, subst, facts);
                op.negated()
                    .is_some_and(|negated| self.prove_cmp(negated, &a, &b, facts))
            }
            _ => self.key_fact(cond, subst, facts) == Some(Interval::FALSE),
        }
    }

    fn key_fact(
        &self,
        cond: &Expr<Typed>,
        subst: Option<&Subst>,
        facts: &Facts,
    ) -> Option<Interval> {
        facts.get(&self.key_of(cond, subst)?)
    }

    /// Whether `a op b` holds whenever `facts` do.
    pub(super) fn prove_cmp(
        &self,
        op: BinaryOperator,
        a: &Operand,
        b: &Operand,
        facts: &Facts,
    ) -> bool {
        use BinaryOperator::*;
        match op {
            Gt => return self.prove_cmp(Lt, b, a, facts),
            Ge => return self.prove_cmp(Le, b, a, facts),
            _ => (),
        }
        if self.relate(op, a, b, facts) {
            return true;
        }
        match op {
            Lt | Le => self.transitive(op, a, b, facts) || self.shifted(op, a, b, facts),
            Eq => self.prove_cmp(Le, a, b, facts) && self.prove_cmp(Le, b, a, facts),
            Ne => self.prove_cmp(Lt, a, b, facts) || self.prove_cmp(Lt, b, a, facts),
            _ => false,
        }
    }

    /// Decides `a op b` from the intervals and the facts about the pair alone.
    fn relate(&self, op: BinaryOperator, a: &Operand, b: &Operand, facts: &Facts) -> bool {
        use BinaryOperator::*;
        let by_interval = match op {
            Lt => a.range.lt(b.range),
            Le => a.range.le(b.range),
            Eq => a.range.eq(b.range),
            Ne => a.range.ne(b.range),
            _ => Interval::BOOL,
        };
        if by_interval == Interval::TRUE {
            return true;
        }
        let (Some(ak), Some(bk)) = (&a.key, &b.key) else {
            return false;
        };
        let holds = |op, x: &Key, y: &Key| {
            facts.get(&Key::binary(op, x.clone(), y.clone())) == Some(Interval::TRUE)
        };
        match op {
            Lt => holds(Lt, ak, bk) || (holds(Le, ak, bk) && holds(Ne, ak, bk)),
            Le => ak == bk || holds(Le, ak, bk) || holds(Lt, ak, bk) || holds(Eq, ak, bk),
            Eq => ak == bk || holds(Eq, ak, bk),
            Ne => holds(Ne, ak, bk) || holds(Lt, ak, bk) || holds(Lt, bk, ak),
            _ => false,
        }
    }

    /// One step of transitivity: `a < b` from `a < y` and `y <= b`, or from
    /// `a <= x` and `x < b`, for any recorded relation.
    fn transitive(&self, op: BinaryOperator, a: &Operand, b: &Operand, facts: &Facts) -> bool {
        use BinaryOperator::*;
        for (key, value) in facts.iter() {
            if value != Interval::TRUE {
                continue;
            }
            let Some((relation, x, y)) = key.as_comparison() else {
                continue;
            };
            match relation {
                Lt | Le => {
                    let rest = if op == Lt && relation == Le { Lt } else { Le };
                    if a.key.as_ref() == Some(x)
                        && self.relate(rest, &self.key_operand(y, facts), b, facts)
                    {
                        return true;
                    }
                    if b.key.as_ref() == Some(y)
                        && self.relate(rest, a, &self.key_operand(x, facts), facts)
                    {
                        return true;
                    }
                }
                Eq => {
                    for (p, q) in [(x, y), (y, x)] {
                        if a.key.as_ref() == Some(p)
                            && self.relate(op, &self.key_operand(q, facts), b, facts)
                        {
                            return true;
                        }
                        if b.key.as_ref() == Some(p)
                            && self.relate(op, a, &self.key_operand(q, facts), facts)
                        {
                            return true;
                        }
                    }
                }
                _ => (),
            }
        }
        false
    }

    /// Moves a constant offset across the comparison: `x + 1 <= b` follows
    /// from `x < b`, and `a < y + 1` from `a <= y`.
    fn shifted(&self, op: BinaryOperator, a: &Operand, b: &Operand, facts: &Facts) -> bool {
        use BinaryOperator::*;
        if let Some((x, offset)) = offset_of(a.key.as_ref()) {
            let x = self.key_operand(x, facts);
            if offset <= 0 && self.prove_cmp(op, &x, b, facts) {
                return true;
            }
            if offset == 1 && op == Le && self.prove_cmp(Lt, &x, b, facts) {
                return true;
            }
        }
        if let Some((y, offset)) = offset_of(b.key.as_ref()) {
            let y = self.key_operand(y, facts);
            if offset >= 0 && self.prove_cmp(op, a, &y, facts) {
                return true;
            }
            if offset == 1 && op == Lt && self.prove_cmp(Le, a, &y, facts) {
                return true;
            }
        }
        false
    }

    /// Records what holds once `cond` is known to be true. A condition that is
    /// already implied changes nothing.
    pub(super) fn assume(&self, cond: &Expr<Typed>, subst: Option<&Subst>, facts: &mut Facts) {
        use BinaryOperator::*;
        match &cond.strip_parens().kind {
            ExprKind::Bool(_) => (),
            ExprKind::Unary {
                op: UnaryOperator::Not,
                expr,
            } => self.assume_negation(expr, subst, facts),
            ExprKind::Binary { op: And, lhs, rhs } => {
                self.assume(lhs, subst, facts);
                self.assume(rhs, subst, facts);
            }
            ExprKind::Binary { op: Or, lhs, rhs } => {
                if self.prove(cond, subst, facts) {
                    return;
                }
                let mut left = facts.clone();
                self.assume(lhs, subst, &mut left);
                let mut right = facts.clone();
                self.assume_negation(lhs, subst, &mut right);
                self.assume(rhs, subst, &mut right);
                *facts = merge(Some(left), Some(right)).unwrap_or_default();
                if let Some(key) = self.key_of(cond, subst) {
                    facts.set(key, Interval::TRUE);
                }
            }
            ExprKind::Binary { op, lhs, rhs } if op.is_comparison() => {
                self.assume_cmp(*op, lhs, rhs, subst, facts);
            }
            _ => {
                if let Some(key) = self.key_of(cond, subst) {
                    facts.set(key, Interval::TRUE);
                }
            }
        }
    }

    /// Records what holds once `cond` is known to be false.
    pub(super) fn assume_negation(
        &self,
        cond: &Expr<Typed>,
        subst: Option<&Subst>,
        facts: &mut Facts,
    ) {
        use BinaryOperator::*;
        match &cond.strip_parens().kind {
            ExprKind::Bool(_) => (),
            ExprKind::Unary {
                op: UnaryOperator::Not,
                expr,
            } => self.assume(expr, subst, facts),
            ExprKind::Binary { op: Or, lhs, rhs } => {
                self.assume_negation(lhs, subst, facts);
                self.assume_negation(rhs, subst, facts);
            }
            ExprKind::Binary { op: And, lhs, rhs } => {
                if self.refute(cond, subst, facts) {
                    return;
                }
                let mut left = facts.clone();
                self.assume_negation(lhs, subst, &mut left);
                let mut right = facts.clone();
                self.assume(lhs, subst, &mut right);
                self.assume_negation(rhs, subst, &mut right);
                *facts = merge(Some(left), Some(right)).unwrap_or_default();
                if let Some(key) = self.key_of(cond, subst) {
                    facts.set(key, Interval::FALSE);
                }
            }
            ExprKind::Binary { op, lhs, rhs } if op.is_comparison() => {
                if let Some(negated) = op.negated() {
                    self.assume_cmp(negated, lhs, rhs, subst, facts);
                }
            }
            _ => {
                if let Some(key) = self.key_of(cond, subst) {
                    facts.set(key, Interval::FALSE);
                }
            }
        }
    }

    fn assume_cmp(
        &self,
        op: BinaryOperator,
        lhs: &Expr<Typed>,
        rhs: &Expr<Typed>,
        subst: Option<&Subst>,
        facts: &mut Facts,
    ) {
        use BinaryOperator::*;
        let (op, lhs, rhs) = match op {
            Gt => (Lt, rhs, lhs),
            Ge => (Le, rhs, lhs),
            op => (op, lhs, rhs),
        };
        let a = self.operand(lhs, subst, facts);
        let b = self.operand(rhs, subst, facts);
        if self.prove_cmp(op, &a, &b, facts) {
            tracing::trace!(?op, lhs = ?a.key, rhs = ?b.key, "already implied");
            return;
        }

        if let (Some(ak), Some(bk)) = (&a.key, &b.key) {
            facts.set(Key::binary(op, ak.clone(), bk.clone()), Interval::TRUE);
            if op == Eq {
                facts.set(Key::binary(Le, ak.clone(), bk.clone()), Interval::TRUE);
                facts.set(Key::binary(Le, bk.clone(), ak.clone()), Interval::TRUE);
            }
        }

        let at_most = |hi: i128| Interval::new(i128::MIN, hi);
        let at_least = |lo: i128| Interval::new(lo, i128::MAX);
        let (for_a, for_b) = match op {
            Lt => (
                at_most(b.range.hi().saturating_sub(1)),
                at_least(a.range.lo().saturating_add(1)),
            ),
            Le => (at_most(b.range.hi()), at_least(a.range.lo())),
            Eq => (b.range, a.range),
            Ne => (excluding(a.range, b.range), excluding(b.range, a.range)),
            _ => return,
        };
        self.narrow(lhs, for_a, subst, facts);
        self.narrow(rhs, for_b, subst, facts);
    }

    /// Narrows `expr` to `target`, then whatever `expr` is a constant offset
    /// or conversion of.
    fn narrow(
        &self,
        expr: &Expr<Typed>,
        target: Interval,
        subst: Option<&Subst>,
        facts: &mut Facts,
    ) {
        use BinaryOperator::*;
        let current = self.eval(expr, subst, facts);
        if current.is_within(target) {
            return;
        }
        if let Some(key) = self.key_of(expr, subst) {
            facts.narrow(key, target, current);
        }
        let constant = |e: &Expr<Typed>, facts: &Facts| self.eval(e, subst, facts).as_singleton();
        match &expr.strip_parens().kind {
            ExprKind::Binary { op: Add, lhs, rhs } => {
                if let Some(c) = constant(rhs, facts) {
                    self.narrow(lhs, target.sub(Interval::singleton(c)), subst, facts);
                } else if let Some(c) = constant(lhs, facts) {
                    self.narrow(rhs, target.sub(Interval::singleton(c)), subst, facts);
                }
            }
            ExprKind::Binary { op: Sub, lhs, rhs } => {
                if let Some(c) = constant(rhs, facts) {
                    self.narrow(lhs, target.add(Interval::singleton(c)), subst, facts);
                } else if let Some(c) = constant(lhs, facts) {
                    self.narrow(rhs, Interval::singleton(c).sub(target), subst, facts);
                }
            }
            ExprKind::As { expr: inner, .. } => self.narrow(inner, target, subst, facts),
            _ => (),
        }
    }
}

/// Splits `x + c` and `x - c` into `x` and the signed offset.
fn offset_of(key: Option<&Key>) -> Option<(&Key, i128)> {
    match key? {
        Key::Binary(BinaryOperator::Add, lhs, rhs) => match **lhs {
            Key::Lit(c) => Some((&**rhs, c)),
            _ => None,
        },
        Key::Binary(BinaryOperator::Sub, lhs, rhs) => match **rhs {
            Key::Lit(c) => Some((&**lhs, c.checked_neg()?)),
            _ => None,
        },
        _ => None,
    }
}

/// What `x != other` leaves of `x`: only an endpoint equal to a constant
/// `other` can be removed.
fn excluding(x: Interval, other: Interval) -> Interval {
    match other.as_singleton() {
        Some(v) if x.lo() == v && x.hi() > v => Interval::new(v + 1, x.hi()),
        Some(v) if x.hi() == v && x.lo() < v => Interval::new(x.lo(), v - 1),
        _ => Interval::FULL,
    }
}
