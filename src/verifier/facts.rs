//! Fact sets: proven intervals keyed by normalised expressions.
//!
//! A comparison key maps to [`Interval::TRUE`] when the comparison is known
//! to hold; that is how relational facts such as `i < n` are recorded. Only
//! `<` and `<=` are ever stored, with the operands of `==`, `!=` and the
//! commutative arithmetic operators put in a canonical order.

use rustc_hash::FxHashMap;

use crate::{ast::BinaryOperator, interval::Interval, util::intern::Id};

/// A normalised, structurally hashed expression. Conversions are looked
/// through, since `x as T` always has the value of `x`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Key {
    Lit(i128),
    Var(Id),
    This,
    Result,
    Field(Box<Key>, Id),
    Len(Box<Key>),
    Neg(Box<Key>),
    Not(Box<Key>),
    Binary(BinaryOperator, Box<Key>, Box<Key>),
}

impl Key {
    pub fn binary(op: BinaryOperator, lhs: Key, rhs: Key) -> Key {
        use BinaryOperator::*;
        let (op, lhs, rhs) = match op {
            Gt => (Lt, rhs, lhs),
            Ge => (Le, rhs, lhs),
            op if op.is_commutative() && rhs < lhs => (op, rhs, lhs),
            op => (op, lhs, rhs),
        };
        Key::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    pub fn field(base: Key, field: Id) -> Key {
        Key::Field(Box::new(base), field)
    }

    pub fn len(base: Key) -> Key {
        Key::Len(Box::new(base))
    }

    /// Whether `part` occurs anywhere in this key.
    pub fn mentions(&self, part: &Key) -> bool {
        self == part || self.children().any(|child| child.mentions(part))
    }

    /// Whether any field access named `field` occurs in this key.
    pub fn mentions_field(&self, field: Id) -> bool {
        matches!(self, Key::Field(_, f) if *f == field)
            || self.children().any(|child| child.mentions_field(field))
    }

    pub fn mentions_any_field(&self) -> bool {
        matches!(self, Key::Field(..)) || self.children().any(Key::mentions_any_field)
    }

    /// The literal value, if this is one.
    pub fn as_lit(&self) -> Option<i128> {
        match self {
            Key::Lit(value) => Some(*value),
            _ => None,
        }
    }

    /// Splits a stored relational fact into its operator and operands.
    pub fn as_comparison(&self) -> Option<(BinaryOperator, &Key, &Key)> {
        match self {
            Key::Binary(op, lhs, rhs) if op.is_comparison() => Some((*op, lhs, rhs)),
            _ => None,
        }
    }

    fn children(&self) -> impl Iterator<Item = &Key> {
        let (first, second) = match self {
            Key::Lit(_) | Key::Var(_) | Key::This | Key::Result => (None, None),
            Key::Field(base, _) | Key::Len(base) | Key::Neg(base) | Key::Not(base) => {
                (Some(&**base), None)
            }
            Key::Binary(_, lhs, rhs) => (Some(&**lhs), Some(&**rhs)),
        };
        first.into_iter().chain(second)
    }
}

/// Facts at one program point. `None` marks a point no execution reaches.
pub type Flow = Option<Facts>;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Facts {
    map: FxHashMap<Key, Interval>,
}

impl Facts {
    pub fn get(&self, key: &Key) -> Option<Interval> {
        match key {
            Key::Lit(value) => Some(Interval::singleton(*value)),
            _ => self.map.get(key).copied(),
        }
    }

    /// Records `value` for `key`, replacing whatever was known.
    pub fn set(&mut self, key: Key, value: Interval) {
        if !matches!(key, Key::Lit(_)) {
            self.map.insert(key, value);
        }
    }

    /// Intersects the fact for `key` with `value`. `current` is what is known
    /// about the key without the fact set (e.g. its declared range). An empty
    /// intersection leaves the previous fact in place.
    pub fn narrow(&mut self, key: Key, value: Interval, current: Interval) {
        if matches!(key, Key::Lit(_)) {
            return;
        }
        let known = self.get(&key).and_then(|fact| fact.meet(current)).unwrap_or(current);
        match known.meet(value) {
            Some(narrowed) if narrowed != known => {
                tracing::trace!(?key, %known, %narrowed, "narrowed");
                self.map.insert(key, narrowed);
            }
            Some(_) => (),
            None => tracing::trace!(?key, %known, %value, "contradictory narrowing ignored"),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Key, Interval)> {
        self.map.iter().map(|(key, value)| (key, *value))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Drops every fact which mentions `part`.
    pub fn forget(&mut self, part: &Key) {
        self.map.retain(|key, _| !key.mentions(part));
    }

    /// Drops every fact about a field named `field`, through any base.
    pub fn forget_field(&mut self, field: Id) {
        self.map.retain(|key, _| !key.mentions_field(field));
    }

    pub fn forget_fields(&mut self) {
        self.map.retain(|key, _| !key.mentions_any_field());
    }

    /// Rewrites the facts mentioning `var` after `var = var + delta`.
    ///
    /// Comparisons with `var` alone on one side survive when the step moves
    /// `var` away from the other side, and are weakened by one when it moves
    /// one step towards it: `i < n` becomes `i <= n` after `i += 1`. Every
    /// other fact about `var`, including its own interval, is dropped.
    pub fn shift(&mut self, var: &Key, delta: i128) {
        use BinaryOperator::{Le, Lt};

        let mut kept = FxHashMap::with_capacity_and_hasher(self.map.len(), Default::default());
        for (key, value) in self.map.drain() {
            if !key.mentions(var) {
                kept.insert(key, value);
                continue;
            }
            if value != Interval::TRUE {
                continue;
            }
            let Key::Binary(op @ (Lt | Le), lhs, rhs) = key else {
                continue;
            };
            let var_left = *lhs == *var && !rhs.mentions(var);
            let var_right = *rhs == *var && !lhs.mentions(var);
            let shifted = if var_left {
                match (op, delta) {
                    (_, d) if d < 0 => Some(Lt),
                    (op, 0) => Some(op),
                    (Lt, 1) => Some(Le),
                    _ => None,
                }
            } else if var_right {
                match (op, delta) {
                    (_, d) if d > 0 => Some(Lt),
                    (op, 0) => Some(op),
                    (Lt, -1) => Some(Le),
                    _ => None,
                }
            } else {
                None
            };
            if let Some(op) = shifted {
                kept.insert(Key::Binary(op, lhs, rhs), Interval::TRUE);
            }
        }
        self.map = kept;
    }
}

/// Joins the facts of two control-flow paths: a key survives only if both
/// paths know it, with the union of the two intervals.
pub fn merge(a: Flow, b: Flow) -> Flow {
    let (a, b) = match (a, b) {
        (None, other) | (other, None) => return other,
        (Some(a), Some(b)) => (a, b),
    };
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let mut map = FxHashMap::with_capacity_and_hasher(small.len(), Default::default());
    for (key, left) in small.map {
        if let Some(right) = large.get(&key) {
            let joined = left.hull(right);
            debug_assert!(
                left.is_within(joined) && right.is_within(joined),
                "unsound merge of {key:?}"
            );
            map.insert(key, joined);
        }
    }
    tracing::trace!(kept = map.len(), dropped = large.len() - map.len(), "merged facts");
    Some(Facts { map })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::intern::TokenMap;
    use pretty_assertions::assert_eq;
    use BinaryOperator::*;

    fn vars() -> (Key, Key) {
        let tm = TokenMap::new();
        (Key::Var(tm.intern("i")), Key::Var(tm.intern("n")))
    }

    #[test]
    fn comparisons_are_normalised() {
        let (i, n) = vars();
        assert_eq!(
            Key::binary(Gt, n.clone(), i.clone()),
            Key::binary(Lt, i.clone(), n.clone())
        );
        assert_eq!(
            Key::binary(Ge, n.clone(), i.clone()),
            Key::binary(Le, i.clone(), n.clone())
        );
        assert_eq!(
            Key::binary(Eq, n.clone(), i.clone()),
            Key::binary(Eq, i.clone(), n.clone())
        );
        assert_ne!(
            Key::binary(Sub, n.clone(), i.clone()),
            Key::binary(Sub, i, n)
        );
    }

    #[test]
    fn forget_drops_mentions() {
        let (i, n) = vars();
        let mut facts = Facts::default();
        facts.set(i.clone(), Interval::new(0, 3));
        facts.set(n.clone(), Interval::new(0, 9));
        facts.set(Key::binary(Lt, i.clone(), n.clone()), Interval::TRUE);
        facts.forget(&i);
        assert_eq!(facts.get(&i), None);
        assert_eq!(facts.get(&Key::binary(Lt, i, n.clone())), None);
        assert_eq!(facts.get(&n), Some(Interval::new(0, 9)));
    }

    #[test]
    fn narrowing_keeps_previous_on_contradiction() {
        let (i, _) = vars();
        let mut facts = Facts::default();
        let declared = Interval::new(0, 255);
        facts.narrow(i.clone(), Interval::new(0, 9), declared);
        assert_eq!(facts.get(&i), Some(Interval::new(0, 9)));
        facts.narrow(i.clone(), Interval::new(20, 30), declared);
        assert_eq!(facts.get(&i), Some(Interval::new(0, 9)));
        facts.narrow(i.clone(), Interval::new(5, 300), declared);
        assert_eq!(facts.get(&i), Some(Interval::new(5, 9)));
    }

    #[test]
    fn shift_through_increment() {
        let (i, n) = vars();
        let mut facts = Facts::default();
        facts.set(Key::binary(Lt, i.clone(), n.clone()), Interval::TRUE);
        facts.set(Key::binary(Le, Key::Lit(0), i.clone()), Interval::TRUE);
        facts.set(Key::binary(Eq, i.clone(), n.clone()), Interval::FALSE);
        facts.set(i.clone(), Interval::new(0, 9));
        facts.shift(&i, 1);
        assert_eq!(facts.get(&Key::binary(Le, i.clone(), n.clone())), Some(Interval::TRUE));
        assert_eq!(facts.get(&Key::binary(Lt, i.clone(), n.clone())), None);
        assert_eq!(facts.get(&Key::binary(Lt, Key::Lit(0), i.clone())), Some(Interval::TRUE));
        assert_eq!(facts.get(&Key::binary(Eq, i.clone(), n)), None);
        assert_eq!(facts.get(&i), None);
    }

    #[test]
    fn shift_through_decrement() {
        let (i, n) = vars();
        let mut facts = Facts::default();
        facts.set(Key::binary(Lt, n.clone(), i.clone()), Interval::TRUE);
        facts.set(Key::binary(Le, i.clone(), n.clone()), Interval::TRUE);
        facts.shift(&i, -1);
        assert_eq!(facts.get(&Key::binary(Le, n.clone(), i.clone())), Some(Interval::TRUE));
        assert_eq!(facts.get(&Key::binary(Lt, i, n)), Some(Interval::TRUE));
    }

    #[test]
    fn merge_keeps_common_keys_with_union() {
        let (i, n) = vars();
        let mut a = Facts::default();
        a.set(i.clone(), Interval::new(0, 3));
        a.set(n.clone(), Interval::new(1, 1));
        let mut b = Facts::default();
        b.set(i.clone(), Interval::new(7, 9));
        let merged = merge(Some(a.clone()), Some(b)).unwrap();
        assert_eq!(merged.get(&i), Some(Interval::new(0, 9)));
        assert_eq!(merged.get(&n), None);

        assert_eq!(merge(Some(a.clone()), None), Some(a));
        assert_eq!(merge(None, None), None);
    }
}
