use crate::{
    error::{SyntaxError, SyntaxErrorKind},
    source::SourceFile,
    token::{Span, Token, TokenKind, KEYWORDS},
    util::intern::TokenMap,
};

pub const SUGGESTED_TOKENS_CAPACITY: usize = 8_192;

/// Lexes the provided source, interning identifiers and literals into `tm`.
pub fn tokenize(tm: &TokenMap, source: &SourceFile) -> Result<Vec<Token>, SyntaxError> {
    let mut tokens = Vec::with_capacity((source.text().len() / 4).min(SUGGESTED_TOKENS_CAPACITY));
    Lexer::new(tm, source, &mut tokens).lex()?;
    Ok(tokens)
}

/// The Ward lexer
struct Lexer<'src, 'tok> {
    tm: &'src TokenMap,
    source: &'src SourceFile,
    src: &'src [u8],
    cursor: usize,
    current_lo: usize,
    tokens: &'tok mut Vec<Token>,
}

type Result<T, E = SyntaxError> = std::result::Result<T, E>;

impl Lexer<'_, '_> {
    /// Scans the source until the input is exhausted.
    ///
    /// Tokens are written into the provided tokens buffer. The last token is
    /// always [`TokenKind::Eof`].
    fn lex(mut self) -> Result<()> {
        assert_eq!(self.tokens.len(), 0, "must pass clean tokens buffer");
        loop {
            let Some(byte) = self.mark_advance() else {
                self.end_line();
                self.produce(TokenKind::Eof, None);
                return Ok(());
            };
            self.scan(byte)?;
        }
    }

    /// Scans the token which starts with `byte`, which was already consumed.
    fn scan(&mut self, byte: u8) -> Result<()> {
        use TokenKind::*;
        let kind = match byte {
            b'\n' => {
                self.end_line();
                return Ok(());
            }
            b if b.is_ascii_whitespace() => {
                while self.peek().is_some_and(|b| b != b'\n' && b.is_ascii_whitespace()) {
                    self.advance();
                }
                return Ok(());
            }
            b'/' if self.peek() == Some(b'/') => {
                while self.peek().is_some_and(|b| b != b'\n') {
                    self.advance();
                }
                return Ok(());
            }
            b'"' => return self.string(),
            b if b.is_ascii_alphabetic() || b == b'_' => {
                self.identifier_or_keyword();
                return Ok(());
            }
            b if b.is_ascii_digit() => return self.number(),
            b'+' => self.advance_if(b'=', PlusAssign, Plus),
            b'-' => match self.peek() {
                Some(b'>') => self.advance_with(Arrow),
                Some(b'=') => self.advance_with(MinusAssign),
                _ => Minus,
            },
            b'~' => match self.peek() {
                Some(b'+') => self.advance_with(TildePlus),
                Some(b'-') => self.advance_with(TildeMinus),
                _ => return Err(self.error(SyntaxErrorKind::InvalidCharacter('~'))),
            },
            b'*' => Star,
            b'/' => Slash,
            b'%' => Percent,
            b'&' => Amp,
            b'|' => Pipe,
            b'^' => Caret,
            b'=' => self.advance_if(b'=', EqEq, Assign),
            b'!' => match self.peek() {
                Some(b'=') => self.advance_with(NotEq),
                _ => return Err(self.error(SyntaxErrorKind::InvalidCharacter('!'))),
            },
            b'<' => match self.peek() {
                Some(b'<') => self.advance_with(Shl),
                Some(b'=') => self.advance_with(LessEq),
                _ => Less,
            },
            b'>' => match self.peek() {
                Some(b'>') => self.advance_with(Shr),
                Some(b'=') => self.advance_with(GreaterEq),
                _ => Greater,
            },
            b'.' => self.advance_if(b'.', DotDot, Dot),
            b':' => Colon,
            b';' => Semicolon,
            b',' => Comma,
            b'(' => LParen,
            b')' => RParen,
            b'[' => LBracket,
            b']' => RBracket,
            b'{' => LBrace,
            b'}' => RBrace,
            other => {
                return Err(self.error(SyntaxErrorKind::InvalidCharacter(char::from(other))));
            }
        };
        self.produce(kind, None);
        Ok(())
    }

    /// Lexes a string literal. The interned lexeme excludes the quotes; escape
    /// sequences are kept verbatim.
    fn string(&mut self) -> Result<()> {
        loop {
            match self.advance() {
                None | Some(b'\n') => return Err(self.error(SyntaxErrorKind::UnterminatedString)),
                Some(b'"') => break,
                Some(b'\\') => {
                    if matches!(self.advance(), None | Some(b'\n')) {
                        return Err(self.error(SyntaxErrorKind::UnterminatedString));
                    }
                }
                Some(_) => (),
            }
        }
        let inner = &self.src[self.current_lo + 1..self.cursor - 1];
        let id = self.tm.intern(&String::from_utf8_lossy(inner));
        self.produce(TokenKind::Str, Some(id));
        Ok(())
    }

    fn identifier_or_keyword(&mut self) {
        while self
            .peek()
            .is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_')
        {
            self.advance();
        }
        // Identifiers are ASCII-only, so this is always valid UTF-8.
        let substr = String::from_utf8_lossy(self.substr());
        match KEYWORDS.get(&*substr).copied() {
            Some(keyword) => self.produce(keyword, None),
            None => {
                let id = self.tm.intern(&substr);
                self.produce(TokenKind::Ident, Some(id));
            }
        }
    }

    fn number(&mut self) -> Result<()> {
        let is_hex = self.src[self.current_lo] == b'0' && matches!(self.peek(), Some(b'x' | b'X'));
        if is_hex {
            self.advance();
        }
        let digit = |b: u8| {
            if is_hex {
                b.is_ascii_hexdigit()
            } else {
                b.is_ascii_digit()
            }
        };
        while self.peek().is_some_and(|b| b == b'_' || digit(b)) {
            self.advance();
        }
        // Letters glued to the digits (`12ab`, `0x1g`) are not a separate
        // identifier.
        if self
            .peek()
            .is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_')
        {
            while self
                .peek()
                .is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_')
            {
                self.advance();
            }
            return Err(self.error(SyntaxErrorKind::MalformedNumber));
        }
        let lexeme = String::from_utf8_lossy(self.substr()).into_owned();
        if extract::number(&lexeme).is_none() {
            return Err(self.error(SyntaxErrorKind::MalformedNumber));
        }
        let id = self.tm.intern(&lexeme);
        self.produce(TokenKind::Number, Some(id));
        Ok(())
    }

    /// Inserts a statement terminator if the line ended right after a token
    /// which may end a statement.
    fn end_line(&mut self) {
        let ends = self
            .tokens
            .last()
            .is_some_and(|t| t.kind.ends_statement());
        if ends {
            let span = Span::new_of_bounds(self.current_lo..self.cursor);
            self.tokens.push(Token::new(TokenKind::Semicolon, None, span));
        }
    }
}

impl Lexer<'_, '_> {
    /// Constructs a new lexer with the default state.
    fn new<'src, 'tok>(
        tm: &'src TokenMap,
        source: &'src SourceFile,
        tokens: &'tok mut Vec<Token>,
    ) -> Lexer<'src, 'tok> {
        Lexer {
            tm,
            source,
            src: source.text(),
            cursor: 0,
            current_lo: 0,
            tokens,
        }
    }

    /// Starts a new token "mark" and advances.
    fn mark_advance(&mut self) -> Option<u8> {
        self.current_lo = self.cursor;
        self.advance()
    }

    /// Returns the next byte and advances.
    fn advance(&mut self) -> Option<u8> {
        let byte = self.src.get(self.cursor).copied()?;
        self.cursor += 1;
        Some(byte)
    }

    /// Advances and returns the provided value.
    fn advance_with<T>(&mut self, value: T) -> T {
        self.advance();
        value
    }

    /// Advances and returns `then` if the next byte is `expected`; returns
    /// `otherwise` without advancing if not.
    fn advance_if<T>(&mut self, expected: u8, then: T, otherwise: T) -> T {
        if self.peek() == Some(expected) {
            self.advance_with(then)
        } else {
            otherwise
        }
    }

    /// Returns the next byte without advancing.
    fn peek(&self) -> Option<u8> {
        self.src.get(self.cursor).copied()
    }

    /// Returns the current span.
    fn span(&self) -> Span {
        Span::new_of_bounds(self.current_lo..self.cursor)
    }

    /// Returns the bytes of the current marked bounds.
    fn substr(&self) -> &[u8] {
        &self.src[self.current_lo..self.cursor]
    }

    /// Produces a token using the marked bounds.
    fn produce(&mut self, kind: TokenKind, id: Option<crate::util::intern::Id>) {
        self.tokens.push(Token::new(kind, id, self.span()));
    }

    fn error(&self, kind: SyntaxErrorKind) -> SyntaxError {
        SyntaxError {
            location: self.source.locate(self.current_lo),
            kind,
        }
    }
}

pub mod extract {
    /// Decodes a numeric lexeme which the lexer already accepted: decimal or
    /// `0x` hexadecimal, with optional `_` separators.
    pub fn number(lexeme: &str) -> Option<u64> {
        let (digits, radix) = match lexeme
            .strip_prefix("0x")
            .or_else(|| lexeme.strip_prefix("0X"))
        {
            Some(hex) => (hex, 16),
            None => (lexeme, 10),
        };
        let digits: String = digits.chars().filter(|&c| c != '_').collect();
        if digits.is_empty() {
            return None;
        }
        u64::from_str_radix(&digits, radix).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn lex(src: &str) -> Vec<(TokenKind, std::ops::Range<usize>)> {
        let tm = TokenMap::new();
        let source = SourceFile::new("test.ward", src.as_bytes());
        tokenize(&tm, &source)
            .expect("failed to lex")
            .into_iter()
            .map(|t| (t.kind, t.span().lo..t.span().hi()))
            .collect()
    }

    fn lex_error(src: &str) -> (u32, u32, SyntaxErrorKind) {
        let tm = TokenMap::new();
        let source = SourceFile::new("test.ward", src.as_bytes());
        let error = tokenize(&tm, &source).expect_err("lexing should fail");
        (error.location.line, error.location.column, error.kind)
    }

    #[test]
    fn tests_with_span() {
        use TokenKind::*;
        let cases = cases!(match .. {
            "+-*/%" => [
                (Plus, 0..1),
                (Minus, 1..2),
                (Star, 2..3),
                (Slash, 3..4),
                (Percent, 4..5),
                (Eof, 5..5),
            ],
            "~+ ~- << >> <= >= == != -> .. += -=" => [
                (TildePlus, 0..2),
                (TildeMinus, 3..5),
                (Shl, 6..8),
                (Shr, 9..11),
                (LessEq, 12..14),
                (GreaterEq, 15..17),
                (EqEq, 18..20),
                (NotEq, 21..23),
                (Arrow, 24..26),
                (DotDot, 27..29),
                (PlusAssign, 30..32),
                (MinusAssign, 33..35),
                (Eof, 35..35),
            ],
            "func decode this result" => [
                (Func, 0..4),
                (Ident, 5..11),
                (This, 12..16),
                (Result, 17..23),
                (Semicolon, 23..23),
                (Eof, 23..23),
            ],
            "1 0x1F 1_000 0" => [
                (Number, 0..1),
                (Number, 2..6),
                (Number, 7..12),
                (Number, 13..14),
                (Semicolon, 14..14),
                (Eof, 14..14),
            ],
            "x = y // comment\n  z\n" => [
                (Ident, 0..1),
                (Assign, 2..3),
                (Ident, 4..5),
                (Semicolon, 16..17),
                (Ident, 19..20),
                (Semicolon, 20..21),
                (Eof, 21..21),
            ],
            "a +\nb\n\n{\n}" => [
                (Ident, 0..1),
                (Plus, 2..3),
                (Ident, 4..5),
                (Semicolon, 5..6),
                (LBrace, 7..8),
                (RBrace, 9..10),
                (Semicolon, 10..10),
                (Eof, 10..10),
            ],
            r#"assert x via "a < b""# => [
                (Assert, 0..6),
                (Ident, 7..8),
                (Via, 9..12),
                (Str, 13..20),
                (Semicolon, 20..20),
                (Eof, 20..20),
            ],
        });

        for (input, tokens) in cases {
            let lexed = lex(input);
            assert_eq!(lexed, tokens.as_slice(), "input: {input:?}");
        }
    }

    #[test]
    fn interns_lexemes() {
        let tm = TokenMap::new();
        let source = SourceFile::new("test.ward", b"width width 0x10 \"s\"");
        let tokens = tokenize(&tm, &source).unwrap();
        assert_eq!(tokens[0].id, tokens[1].id);
        assert_eq!(&*tm.get(tokens[0].id.unwrap()), "width");
        assert_eq!(&*tm.get(tokens[2].id.unwrap()), "0x10");
        assert_eq!(&*tm.get(tokens[3].id.unwrap()), "s");
    }

    #[test]
    fn errors() {
        assert_eq!(
            lex_error("x = \"open\ny"),
            (1, 5, SyntaxErrorKind::UnterminatedString)
        );
        assert_eq!(
            lex_error("x\n  y = $"),
            (2, 7, SyntaxErrorKind::InvalidCharacter('$'))
        );
        assert_eq!(lex_error("12ab"), (1, 1, SyntaxErrorKind::MalformedNumber));
        assert_eq!(lex_error("0x"), (1, 1, SyntaxErrorKind::MalformedNumber));
        assert_eq!(
            lex_error("99999999999999999999"),
            (1, 1, SyntaxErrorKind::MalformedNumber)
        );
        assert_eq!(lex_error("a ! b"), (1, 3, SyntaxErrorKind::InvalidCharacter('!')));
    }

    #[test]
    fn extract_numbers() {
        assert_eq!(extract::number("1_000"), Some(1000));
        assert_eq!(extract::number("0xff"), Some(255));
        assert_eq!(extract::number("18446744073709551615"), Some(u64::MAX));
        assert_eq!(extract::number("18446744073709551616"), None);
    }

    macro_rules! cases {
        (match .. {
            $($str:expr => [$(($kind:expr, $range:expr)),* $(,)?]),* $(,)?
        }) => {{
            &[$((
                $str,
                vec![
                    $(($kind, $range)),*
                ],
            )),*]
        }};
    }
    use cases;
}
