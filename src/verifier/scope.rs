use rustc_hash::FxHashMap;

use super::{
    facts::{Facts, Key},
    prove::arith,
    Checker, FuncSymbol, ANY_LEN,
};
use crate::{
    ast::{Func, Untyped},
    interval::Interval,
    source::Location,
    token::Span,
    types::{IntKind, Type},
    util::intern::Id,
};

#[derive(Clone, Debug)]
pub struct Local {
    pub ty: Type,
    /// Parameters are not.
    pub mutable: bool,
    pub span: Span,
}

/// The names visible in the body or clause being checked.
#[derive(Debug)]
pub struct Scope {
    locals: FxHashMap<Id, Local>,
    /// The struct whose method is being checked; the type of `this`.
    pub receiver: Option<Id>,
    pub ret: Type,
    /// Set while a postcondition is checked.
    pub allow_result: bool,
}

impl Default for Scope {
    fn default() -> Self {
        Scope {
            locals: FxHashMap::default(),
            receiver: None,
            ret: Type::Void,
            allow_result: false,
        }
    }
}

impl Scope {
    pub fn for_func(func: &Func<Untyped>, symbol: &FuncSymbol) -> Scope {
        let mut scope = Scope {
            receiver: func.receiver.map(|r| r.name),
            ret: symbol.ret.clone(),
            ..Scope::default()
        };
        for (param, (name, ty)) in func.params.iter().zip(&symbol.params) {
            scope.declare(
                *name,
                Local {
                    ty: ty.clone(),
                    mutable: false,
                    span: param.name.span,
                },
            );
        }
        scope
    }

    pub fn local(&self, name: Id) -> Option<&Local> {
        self.locals.get(&name)
    }

    pub fn declare(&mut self, name: Id, local: Local) {
        self.locals.insert(name, local);
    }

    pub fn remove(&mut self, name: Id) {
        self.locals.remove(&name);
    }
}

impl Checker<'_> {
    /// Where `name` is already defined, as a local or a global.
    pub(super) fn defined_at(&self, name: Id) -> Option<Location> {
        match self.scope.local(name) {
            Some(local) => Some(self.source.locate(local.span.lo)),
            None => self.symbols.global_location(name).cloned(),
        }
    }

    /// The declared type of a place key.
    pub(super) fn key_type(&self, key: &Key) -> Option<Type> {
        match key {
            Key::Var(name) => self.scope.local(*name).map(|local| local.ty.clone()),
            Key::This => self
                .scope
                .receiver
                .map(|receiver| Type::Ptr(Box::new(Type::Struct(receiver)))),
            Key::Result => Some(self.scope.ret.clone()),
            Key::Field(base, field) => match self.key_type(base)?.pointee() {
                Type::Struct(name) => self.symbols.structs.get(name)?.field(*field).cloned(),
                _ => None,
            },
            Key::Len(_) => Some(Type::int(IntKind::U64)),
            Key::Lit(_) | Key::Neg(_) | Key::Not(_) | Key::Binary(..) => None,
        }
    }

    /// Everything known about the value of `key`: the recorded fact, within
    /// what its type or structure allows.
    pub(super) fn key_range(&self, key: &Key, facts: &Facts) -> Interval {
        let structural = match key {
            Key::Lit(value) => return Interval::singleton(*value),
            // The result is only ever known through the facts set at a return
            // or a call.
            Key::Result => Interval::FULL,
            Key::Len(base) => match self.key_type(base).as_ref().map(Type::pointee) {
                Some(Type::Array { len, .. }) => return Interval::singleton(i128::from(*len)),
                _ => ANY_LEN,
            },
            Key::Var(_) | Key::This | Key::Field(..) => self
                .key_type(key)
                .and_then(|ty| ty.value_range())
                .unwrap_or(Interval::FULL),
            Key::Neg(inner) => self.key_range(inner, facts).neg(),
            Key::Not(inner) => self
                .key_range(inner, facts)
                .meet(Interval::BOOL)
                .map_or(Interval::BOOL, Interval::not),
            Key::Binary(op, _, _) if op.is_comparison() || op.is_logical() => Interval::BOOL,
            Key::Binary(op, lhs, rhs) => {
                arith(*op, self.key_range(lhs, facts), self.key_range(rhs, facts))
                    .unwrap_or(Interval::FULL)
            }
        };
        match facts.get(key) {
            Some(fact) => fact.meet(structural).unwrap_or(fact),
            None => structural,
        }
    }
}
