use std::{fmt, ops::Range};

use crate::util::intern::Id;

#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// The interned lexeme, for identifiers and literals.
    pub id: Option<Id>,
    lo: usize,
    len: u32,
}

impl Token {
    pub fn new(kind: TokenKind, id: Option<Id>, span: Span) -> Token {
        Token {
            kind,
            id,
            len: span.len,
            lo: span.lo,
        }
    }

    pub fn span(&self) -> Span {
        Span {
            len: self.len,
            lo: self.lo,
        }
    }

    pub fn is_eof(&self) -> bool {
        self.kind == TokenKind::Eof
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id {
            Some(id) => write!(f, "Token({:?}, {id:?}, {})", self.kind, self.span()),
            None => write!(f, "Token({:?}, {})", self.kind, self.span()),
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Span {
    pub len: u32,
    pub lo: usize,
}

impl Span {
    pub fn new_of_bounds(Range { start: lo, end: hi }: Range<usize>) -> Span {
        debug_assert!(hi >= lo);
        Self::new_of_length(lo, u32::try_from(hi - lo).unwrap_or(u32::MAX))
    }

    pub const fn new_of_length(lo: usize, len: u32) -> Span {
        Span { len, lo }
    }

    pub fn hi(self) -> usize {
        self.lo + self.len as usize
    }

    /// Returns a span which covers both `self` and `other`.
    pub fn to(self, other: Span) -> Span {
        let lo = self.lo.min(other.lo);
        let hi = self.hi().max(other.hi());
        Span::new_of_bounds(lo..hi)
    }
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Span({self}, len: {})", self.len)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lo = self.lo;
        let hi = self.hi();
        write!(f, "{lo}..{hi}")
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Const,
    Struct,
    Func,
    Var,
    If,
    Else,
    While,
    Assert,
    Pre,
    Post,
    Inv,
    Via,
    Return,
    Break,
    Continue,
    And,
    Or,
    Not,
    As,
    Ptr,
    This,
    Result,
    True,
    False,

    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    /// `<<`
    Shl,
    /// `>>`
    Shr,
    Amp,
    Pipe,
    Caret,
    /// Wrapping addition, `~+`.
    TildePlus,
    /// Wrapping subtraction, `~-`.
    TildeMinus,
    EqEq,
    NotEq,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    Assign,
    PlusAssign,
    MinusAssign,
    Colon,
    /// Either written or inserted by the lexer at a line break.
    Semicolon,
    Comma,
    Dot,
    DotDot,
    Arrow,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,

    Ident,
    Number,
    Str,

    Eof,
}

impl TokenKind {
    /// Whether a line break right after this token ends a statement.
    pub fn ends_statement(self) -> bool {
        use TokenKind::*;
        matches!(
            self,
            Ident
                | Number
                | Str
                | True
                | False
                | This
                | Result
                | Return
                | Break
                | Continue
                | RParen
                | RBracket
                | RBrace
        )
    }

    pub fn describe(self) -> &'static str {
        use TokenKind::*;
        match self {
            Const => "`const`",
            Struct => "`struct`",
            Func => "`func`",
            Var => "`var`",
            If => "`if`",
            Else => "`else`",
            While => "`while`",
            Assert => "`assert`",
            Pre => "`pre`",
            Post => "`post`",
            Inv => "`inv`",
            Via => "`via`",
            Return => "`return`",
            Break => "`break`",
            Continue => "`continue`",
            And => "`and`",
            Or => "`or`",
            Not => "`not`",
            As => "`as`",
            Ptr => "`ptr`",
            This => "`this`",
            Result => "`result`",
            True => "`true`",
            False => "`false`",
            Plus => "`+`",
            Minus => "`-`",
            Star => "`*`",
            Slash => "`/`",
            Percent => "`%`",
            Shl => "`<<`",
            Shr => "`>>`",
            Amp => "`&`",
            Pipe => "`|`",
            Caret => "`^`",
            TildePlus => "`~+`",
            TildeMinus => "`~-`",
            EqEq => "`==`",
            NotEq => "`!=`",
            Less => "`<`",
            LessEq => "`<=`",
            Greater => "`>`",
            GreaterEq => "`>=`",
            Assign => "`=`",
            PlusAssign => "`+=`",
            MinusAssign => "`-=`",
            Colon => "`:`",
            Semicolon => "`;` or line break",
            Comma => "`,`",
            Dot => "`.`",
            DotDot => "`..`",
            Arrow => "`->`",
            LParen => "`(`",
            RParen => "`)`",
            LBracket => "`[`",
            RBracket => "`]`",
            LBrace => "`{`",
            RBrace => "`}`",
            Ident => "identifier",
            Number => "number",
            Str => "string",
            Eof => "end of file",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

pub static KEYWORDS: phf::Map<&'static str, TokenKind> = phf::phf_map! {
    "const" => TokenKind::Const,
    "struct" => TokenKind::Struct,
    "func" => TokenKind::Func,
    "var" => TokenKind::Var,
    "if" => TokenKind::If,
    "else" => TokenKind::Else,
    "while" => TokenKind::While,
    "assert" => TokenKind::Assert,
    "pre" => TokenKind::Pre,
    "post" => TokenKind::Post,
    "inv" => TokenKind::Inv,
    "via" => TokenKind::Via,
    "return" => TokenKind::Return,
    "break" => TokenKind::Break,
    "continue" => TokenKind::Continue,
    "and" => TokenKind::And,
    "or" => TokenKind::Or,
    "not" => TokenKind::Not,
    "as" => TokenKind::As,
    "ptr" => TokenKind::Ptr,
    "this" => TokenKind::This,
    "result" => TokenKind::Result,
    "true" => TokenKind::True,
    "false" => TokenKind::False,
};
