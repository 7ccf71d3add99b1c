use crate::{
    interval::Interval,
    util::intern::{well_known, Id},
};

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IntKind {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
}

impl IntKind {
    pub fn from_name(name: Id) -> Option<IntKind> {
        use IntKind::*;
        const NAMES: [(Id, IntKind); 8] = [
            (well_known::U8, U8),
            (well_known::U16, U16),
            (well_known::U32, U32),
            (well_known::U64, U64),
            (well_known::I8, I8),
            (well_known::I16, I16),
            (well_known::I32, I32),
            (well_known::I64, I64),
        ];
        NAMES
            .into_iter()
            .find_map(|(id, kind)| (id == name).then_some(kind))
    }

    pub fn bits(self) -> u32 {
        use IntKind::*;
        match self {
            U8 | I8 => 8,
            U16 | I16 => 16,
            U32 | I32 => 32,
            U64 | I64 => 64,
        }
    }

    pub fn is_signed(self) -> bool {
        use IntKind::*;
        matches!(self, I8 | I16 | I32 | I64)
    }

    /// Every value representable in this width.
    pub fn range(self) -> Interval {
        let bits = self.bits();
        if self.is_signed() {
            let half = 1i128 << (bits - 1);
            Interval::new(-half, half - 1)
        } else {
            Interval::new(0, (1i128 << bits) - 1)
        }
    }

    pub fn name(self) -> &'static str {
        use IntKind::*;
        match self {
            U8 => "u8",
            U16 => "u16",
            U32 => "u32",
            U64 => "u64",
            I8 => "i8",
            I16 => "i16",
            I32 => "i32",
            I64 => "i64",
        }
    }
}

/// A resolved type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    /// An untyped integer constant, exact until it meets a typed operand.
    Ideal,
    Bool,
    /// A fixed-width integer whose values are restricted to `range`, which is
    /// the full width unless the declaration refines it.
    Int { kind: IntKind, range: Interval },
    Array { len: u64, elem: Box<Type> },
    Slice(Box<Type>),
    Ptr(Box<Type>),
    Struct(Id),
    Void,
}

impl Type {
    pub fn int(kind: IntKind) -> Type {
        Type::Int {
            kind,
            range: kind.range(),
        }
    }

    /// The values an expression of this type may hold, if it is an integer or
    /// a boolean.
    pub fn value_range(&self) -> Option<Interval> {
        match self {
            Type::Int { range, .. } => Some(*range),
            Type::Bool => Some(Interval::BOOL),
            _ => None,
        }
    }

    pub fn int_kind(&self) -> Option<IntKind> {
        match self {
            Type::Int { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Type::Int { .. } | Type::Ideal)
    }

    /// The element type of an array or slice.
    pub fn elem(&self) -> Option<&Type> {
        match self {
            Type::Array { elem, .. } | Type::Slice(elem) => Some(elem),
            _ => None,
        }
    }

    /// Looks through one pointer, if any.
    pub fn pointee(&self) -> &Type {
        match self {
            Type::Ptr(inner) => inner,
            other => other,
        }
    }

    /// Drops integer refinements, recursively.
    pub fn unrefined(&self) -> Type {
        match self {
            Type::Int { kind, .. } => Type::int(*kind),
            Type::Array { len, elem } => Type::Array {
                len: *len,
                elem: Box::new(elem.unrefined()),
            },
            Type::Slice(elem) => Type::Slice(Box::new(elem.unrefined())),
            Type::Ptr(inner) => Type::Ptr(Box::new(inner.unrefined())),
            other => other.clone(),
        }
    }

    /// Whether values of the two types have the same representation, ignoring
    /// integer refinements (which the verifier checks as value constraints).
    pub fn same_shape(&self, other: &Type) -> bool {
        self.unrefined() == other.unrefined()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::{
        fmt::{Context, Show},
        intern::TokenMap,
    };

    #[test]
    fn ranges() {
        assert_eq!(IntKind::U8.range(), Interval::new(0, 255));
        assert_eq!(IntKind::I8.range(), Interval::new(-128, 127));
        assert_eq!(
            IntKind::U64.range(),
            Interval::new(0, i128::from(u64::MAX))
        );
        assert_eq!(
            IntKind::I64.range(),
            Interval::new(i128::from(i64::MIN), i128::from(i64::MAX))
        );
    }

    #[test]
    fn shapes_ignore_refinements() {
        let plain = Type::int(IntKind::U32);
        let refined = Type::Int {
            kind: IntKind::U32,
            range: Interval::new(0, 100),
        };
        assert!(plain.same_shape(&refined));
        assert!(!plain.same_shape(&Type::int(IntKind::U64)));
        let slice = Type::Slice(Box::new(refined));
        assert!(slice.same_shape(&Type::Slice(Box::new(plain))));
    }

    #[test]
    fn display() {
        let tm = TokenMap::new();
        let header = tm.intern("header");
        let ty = Type::Ptr(Box::new(Type::Struct(header)));
        let ctx = Context { tm: &tm };
        assert_eq!(ty.display(&ctx).to_string(), "ptr header");
        let ty = Type::Array {
            len: 4,
            elem: Box::new(Type::Int {
                kind: IntKind::U8,
                range: Interval::new(0, 9),
            }),
        };
        assert_eq!(ty.display(&ctx).to_string(), "[4]u8[0..9]");
    }
}
