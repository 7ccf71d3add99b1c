use crate::{interval::Interval, source::Location, token::TokenKind};

/// Any failure of the front end, for callers running the whole pipeline.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error(transparent)]
    Check(#[from] CheckError),
}

/// A malformed token or grammar violation. Lexing or parsing of the file stops
/// at the first one.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{location}: syntax error: {kind}")]
pub struct SyntaxError {
    pub location: Location,
    pub kind: SyntaxErrorKind,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SyntaxErrorKind {
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("invalid character {0:?}")]
    InvalidCharacter(char),
    #[error("malformed numeric literal")]
    MalformedNumber,
    #[error("expected {expected}, found {found}")]
    Unexpected {
        expected: &'static str,
        found: TokenKind,
    },
    #[error("unclosed {0}")]
    Unbalanced(TokenKind),
    #[error("missing {0}")]
    MissingClause(&'static str),
    #[error("{0} outside of a loop")]
    JumpOutsideLoop(TokenKind),
    #[error("invalid assignment target")]
    InvalidAssignmentTarget,
}

/// The first semantic or safety failure found by the verifier.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{location}: check error: {kind}")]
pub struct CheckError {
    pub location: Location,
    pub kind: CheckErrorKind,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CheckErrorKind {
    #[error("{name} is already defined at {first}")]
    DuplicateName { name: String, first: Location },
    #[error("{name} is not defined")]
    UnresolvedName { name: String },
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },
    #[error("{expr} may overflow: computed {bound}, but {ty} only holds {range}")]
    PossibleOverflow {
        expr: String,
        bound: Interval,
        ty: String,
        range: Interval,
    },
    #[error("{expr} may be out of bounds: index in {index}, length in {length}")]
    PossibleOutOfBounds {
        expr: String,
        index: Interval,
        length: Interval,
    },
    #[error("cannot prove {cond}")]
    UnprovenAssertion { cond: String },
    #[error("cannot prove precondition {cond} of {callee}")]
    UnprovenPrecondition { callee: String, cond: String },
    #[error("divisor of {expr} may be zero: {bound}")]
    PossibleDivisionByZero { expr: String, bound: Interval },
    #[error("cannot assign to {target}: {reason}")]
    InvalidAssignment { target: String, reason: &'static str },
    #[error(
        "call to {callee} may modify state and must be the outermost expression of a statement"
    )]
    NestedEffect { callee: String },
    #[error("statement is unreachable")]
    UnreachableCode,
    #[error("function {name} may reach its end without returning a value")]
    MissingReturn { name: String },
    #[error("constant {name} is defined in terms of itself")]
    CyclicConstant { name: String },
}
