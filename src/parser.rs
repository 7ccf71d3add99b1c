use crate::{
    ast::{
        AssignOperator, BinaryOperator, Binding, Block, Clause, ClauseKind, Const, Decl, Else,
        Expr, ExprKind, File, Func, Ident, If, Stmt, StmtKind, Struct, TypeExpr, TypeExprKind,
        UnaryOperator, Untyped,
    },
    error::{SyntaxError, SyntaxErrorKind},
    lexer::extract,
    source::SourceFile,
    token::{Span, Token, TokenKind},
    util::intern::TokenMap,
};

type Result<T, E = SyntaxError> = std::result::Result<T, E>;

/// Parses one lexed unit. Stops at the first syntax error.
#[tracing::instrument(
    level = "debug",
    skip_all,
    fields(file = %source.name(), tokens = tokens.len()),
)]
pub fn parse(tm: &TokenMap, source: &SourceFile, tokens: &[Token]) -> Result<File<Untyped>> {
    let mut p = Parser::new(tm, source, tokens);
    let decls = p.parse_file()?;
    tracing::debug!(decls = decls.len(), "parsed file");
    Ok(File {
        source: source.clone(),
        decls,
    })
}

/// Parses a single expression spanning the whole unit.
pub fn parse_expr(tm: &TokenMap, source: &SourceFile, tokens: &[Token]) -> Result<Expr<Untyped>> {
    let mut p = Parser::new(tm, source, tokens);
    let expr = p.parse_expr()?;
    p.take(TokenKind::Semicolon);
    p.consume(TokenKind::Eof)?;
    Ok(expr)
}

struct Parser<'a> {
    tm: &'a TokenMap,
    source: &'a SourceFile,
    tokens: &'a [Token],
    cursor: usize,
    /// The last consumed token.
    prev: Token,
    loop_depth: u32,
}

impl Parser<'_> {
    fn parse_file(&mut self) -> Result<Vec<Decl<Untyped>>> {
        let mut decls = Vec::with_capacity(16);
        loop {
            while self.take(TokenKind::Semicolon) {}
            if self.is(TokenKind::Eof) {
                break;
            }
            decls.push(self.parse_decl()?);
            self.end_item(TokenKind::Eof)?;
        }
        Ok(decls)
    }

    fn parse_decl(&mut self) -> Result<Decl<Untyped>> {
        match self.peek().kind {
            TokenKind::Const => self.parse_const().map(Decl::Const),
            TokenKind::Struct => self.parse_struct().map(Decl::Struct),
            TokenKind::Func => self.parse_func().map(Decl::Func),
            _ => Err(self.unexpected("declaration")),
        }
    }

    fn parse_const(&mut self) -> Result<Const<Untyped>> {
        self.consume(TokenKind::Const)?;
        let name = self.parse_ident()?;
        let ty = if self.take(TokenKind::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        self.consume(TokenKind::Assign)?;
        let value = self.parse_expr()?;
        Ok(Const { name, ty, value })
    }

    fn parse_struct(&mut self) -> Result<Struct> {
        self.consume(TokenKind::Struct)?;
        let name = self.parse_ident()?;
        let open = self.consume(TokenKind::LParen)?;
        let fields = self.parse_list(TokenKind::RParen, Parser::parse_binding)?;
        self.close(open, TokenKind::RParen)?;
        Ok(Struct { name, fields })
    }

    fn parse_func(&mut self) -> Result<Func<Untyped>> {
        self.consume(TokenKind::Func)?;
        let first = self.parse_ident()?;
        let (receiver, name) = if self.take(TokenKind::Dot) {
            (Some(first), self.parse_ident()?)
        } else {
            (None, first)
        };

        let open = self.consume(TokenKind::LParen)?;
        let params = self.parse_list(TokenKind::RParen, Parser::parse_binding)?;
        self.close(open, TokenKind::RParen)?;

        let ret = if self.take(TokenKind::Arrow) {
            Some(self.parse_type()?)
        } else {
            None
        };

        let mut pre = Vec::new();
        let mut post = Vec::new();
        while self.take(TokenKind::Comma) {
            match self.peek().kind {
                TokenKind::Pre => pre.push(self.parse_clause(ClauseKind::Pre)?),
                TokenKind::Post => post.push(self.parse_clause(ClauseKind::Post)?),
                TokenKind::LBrace => break,
                _ => {
                    let found = self.peek();
                    return Err(
                        self.error(found, SyntaxErrorKind::MissingClause("`pre` or `post` clause"))
                    );
                }
            }
        }

        let body = self.parse_block()?;
        Ok(Func {
            receiver,
            name,
            params,
            ret,
            pre,
            post,
            body,
        })
    }

    fn parse_binding(&mut self) -> Result<Binding> {
        let name = self.parse_ident()?;
        self.consume(TokenKind::Colon)?;
        let ty = self.parse_type()?;
        Ok(Binding { name, ty })
    }

    fn parse_clause(&mut self, kind: ClauseKind) -> Result<Clause<Untyped>> {
        let start = self.advance();
        let cond = self.parse_expr()?;
        let reason = if self.take(TokenKind::Via) {
            self.consume(TokenKind::Str)?.id
        } else {
            None
        };
        Ok(Clause {
            kind,
            cond,
            reason,
            span: start.span().to(self.prev.span()),
        })
    }

    fn parse_type(&mut self) -> Result<TypeExpr> {
        let start = self.peek();
        let kind = match start.kind {
            TokenKind::Ptr => {
                self.advance();
                TypeExprKind::Ptr(Box::new(self.parse_type()?))
            }
            TokenKind::LBracket => {
                self.advance();
                if self.take(TokenKind::RBracket) {
                    TypeExprKind::Slice(Box::new(self.parse_type()?))
                } else {
                    let len = self.parse_expr()?;
                    self.close(start, TokenKind::RBracket)?;
                    TypeExprKind::Array {
                        len: Box::new(len),
                        elem: Box::new(self.parse_type()?),
                    }
                }
            }
            TokenKind::Ident => {
                let base = self.parse_ident()?;
                if self.is(TokenKind::LBracket) {
                    let open = self.advance();
                    let lo = self.parse_optional_expr(TokenKind::DotDot)?;
                    self.consume(TokenKind::DotDot)?;
                    let hi = self.parse_optional_expr(TokenKind::RBracket)?;
                    self.close(open, TokenKind::RBracket)?;
                    TypeExprKind::Refined { base, lo, hi }
                } else {
                    TypeExprKind::Named(base)
                }
            }
            _ => return Err(self.unexpected("type")),
        };
        Ok(TypeExpr {
            kind,
            span: start.span().to(self.prev.span()),
        })
    }

    fn parse_block(&mut self) -> Result<Block<Untyped>> {
        let open = self.consume(TokenKind::LBrace)?;
        let mut stmts = Vec::new();
        loop {
            while self.take(TokenKind::Semicolon) {}
            if self.is(TokenKind::RBrace) || self.is(TokenKind::Eof) {
                break;
            }
            stmts.push(self.parse_stmt()?);
            self.end_item(TokenKind::RBrace)?;
        }
        let close = self.close(open, TokenKind::RBrace)?;
        Ok(Block {
            stmts,
            span: open.span().to(close.span()),
        })
    }

    fn parse_stmt(&mut self) -> Result<Stmt<Untyped>> {
        let start = self.peek();
        let kind = match start.kind {
            TokenKind::Var => {
                self.advance();
                let name = self.parse_ident()?;
                self.consume(TokenKind::Colon)?;
                let ty = self.parse_type()?;
                let value = if self.take(TokenKind::Assign) {
                    Some(self.parse_expr()?)
                } else {
                    None
                };
                StmtKind::Var { name, ty, value }
            }
            TokenKind::If => StmtKind::If(self.parse_if()?),
            TokenKind::While => {
                self.advance();
                let cond = self.parse_expr()?;
                let mut invariants = Vec::new();
                while self.take(TokenKind::Comma) {
                    if !self.is(TokenKind::Inv) {
                        let found = self.peek();
                        let kind = SyntaxErrorKind::MissingClause("`inv` clause");
                        return Err(self.error(found, kind));
                    }
                    invariants.push(self.parse_clause(ClauseKind::Inv)?);
                }
                self.loop_depth += 1;
                let body = self.parse_block()?;
                self.loop_depth -= 1;
                StmtKind::While {
                    cond,
                    invariants,
                    body,
                }
            }
            TokenKind::Assert => StmtKind::Assert(self.parse_clause(ClauseKind::Assert)?),
            TokenKind::Return => {
                self.advance();
                if self.is(TokenKind::Semicolon) || self.is(TokenKind::RBrace) {
                    StmtKind::Return(None)
                } else {
                    StmtKind::Return(Some(self.parse_expr()?))
                }
            }
            kind @ (TokenKind::Break | TokenKind::Continue) => {
                self.advance();
                if self.loop_depth == 0 {
                    return Err(self.error(start, SyntaxErrorKind::JumpOutsideLoop(kind)));
                }
                if kind == TokenKind::Break {
                    StmtKind::Break
                } else {
                    StmtKind::Continue
                }
            }
            _ => {
                let expr = self.parse_expr()?;
                let op = match self.peek().kind {
                    TokenKind::Assign => AssignOperator::Set,
                    TokenKind::PlusAssign => AssignOperator::Add,
                    TokenKind::MinusAssign => AssignOperator::Sub,
                    _ => {
                        return Ok(Stmt {
                            span: expr.span,
                            kind: StmtKind::Expr(expr),
                        })
                    }
                };
                let is_place = matches!(
                    expr.kind,
                    ExprKind::Id(_) | ExprKind::Field { .. } | ExprKind::Index { .. }
                );
                if !is_place {
                    return Err(self.error(start, SyntaxErrorKind::InvalidAssignmentTarget));
                }
                self.advance();
                let value = self.parse_expr()?;
                StmtKind::Assign {
                    target: expr,
                    op,
                    value,
                }
            }
        };
        Ok(Stmt {
            kind,
            span: start.span().to(self.prev.span()),
        })
    }

    fn parse_if(&mut self) -> Result<If<Untyped>> {
        self.consume(TokenKind::If)?;
        let cond = self.parse_expr()?;
        let then = self.parse_block()?;
        let otherwise = if self.take(TokenKind::Else) {
            if self.is(TokenKind::If) {
                Some(Else::If(Box::new(self.parse_if()?)))
            } else {
                Some(Else::Block(self.parse_block()?))
            }
        } else {
            None
        };
        Ok(If {
            cond,
            then,
            otherwise,
        })
    }

    fn parse_ident(&mut self) -> Result<Ident> {
        let token = self.consume(TokenKind::Ident)?;
        let Some(name) = token.id else {
            unreachable!("identifier tokens are always interned");
        };
        Ok(Ident {
            name,
            span: token.span(),
        })
    }

    fn parse_expr(&mut self) -> Result<Expr<Untyped>> {
        self.parse_expr_bp(0)
    }

    /// Parses an expression unless the current token is `absent_at`.
    fn parse_optional_expr(&mut self, absent_at: TokenKind) -> Result<Option<Box<Expr<Untyped>>>> {
        if self.is(absent_at) {
            Ok(None)
        } else {
            Ok(Some(Box::new(self.parse_expr()?)))
        }
    }

    fn parse_expr_bp(&mut self, min_bp: u8) -> Result<Expr<Untyped>> {
        let lhs_token = self.advance();
        let mut lhs = self.parse_nud(lhs_token)?;

        loop {
            let op_token = self.peek();

            if let Some((lbp, rbp)) = Self::infix_binding_power(op_token.kind) {
                if lbp < min_bp {
                    // Operator binds less tightly than the minimum required
                    break;
                }

                self.advance(); // Operator
                lhs = self.parse_led(op_token, lhs, rbp)?;
            } else {
                // Not an infix operator or binds too loosely
                break;
            }
        }

        Ok(lhs)
    }

    /// nud: Parses tokens that start an expression
    /// (prefix operators, literals, grouping)
    fn parse_nud(&mut self, token: Token) -> Result<Expr<Untyped>> {
        let (kind, span) = match token.kind {
            TokenKind::Ident => {
                let Some(name) = token.id else {
                    unreachable!("identifier tokens are always interned");
                };
                let ident = Ident {
                    name,
                    span: token.span(),
                };
                (ExprKind::Id(ident), token.span())
            }
            TokenKind::Number => {
                let value = token
                    .id
                    .and_then(|id| extract::number(&self.tm.get(id)))
                    .ok_or_else(|| self.error(token, SyntaxErrorKind::MalformedNumber))?;
                (ExprKind::Int(value), token.span())
            }
            TokenKind::True => (ExprKind::Bool(true), token.span()),
            TokenKind::False => (ExprKind::Bool(false), token.span()),
            TokenKind::This => (ExprKind::This, token.span()),
            TokenKind::Result => (ExprKind::Result, token.span()),

            // Grouping: ( expr )
            TokenKind::LParen => {
                let expr = self.parse_expr()?;
                let end = self.close(token, TokenKind::RParen)?;
                (ExprKind::Paren(Box::new(expr)), token.span().to(end.span()))
            }

            // Prefix operators: -, not
            kind @ (TokenKind::Minus | TokenKind::Not) => {
                let op = match kind {
                    TokenKind::Minus => UnaryOperator::Neg,
                    TokenKind::Not => UnaryOperator::Not,
                    _ => unreachable!(),
                };
                let ((), rbp) = Self::prefix_binding_power();
                let expr = self.parse_expr_bp(rbp)?;

                let span = token.span().to(expr.span);
                let unary = ExprKind::Unary {
                    op,
                    expr: Box::new(expr),
                };
                (unary, span)
            }

            _ => return Err(self.error(token, self.unexpected_kind("expression", token))),
        };

        Ok(Expr {
            kind,
            span,
            info: (),
        })
    }

    /// led: Parses tokens that follow a left-hand-side expression
    /// (infix/postfix operators)
    fn parse_led(&mut self, op_token: Token, lhs: Expr<Untyped>, rbp: u8) -> Result<Expr<Untyped>> {
        let (kind, span) = match op_token.kind {
            TokenKind::As => {
                let ty = self.parse_type()?;
                let span = lhs.span.to(ty.span);
                let conversion = ExprKind::As {
                    expr: Box::new(lhs),
                    ty,
                };
                (conversion, span)
            }

            // Field access or method call: expr . ID [( args )]
            TokenKind::Dot => {
                let name = self.parse_ident()?;
                if self.is(TokenKind::LParen) {
                    let open = self.advance();
                    let args = self.parse_list(TokenKind::RParen, Parser::parse_expr)?;
                    let end = self.close(open, TokenKind::RParen)?;
                    let call = ExprKind::Call {
                        receiver: Some(Box::new(lhs.clone())),
                        callee: name,
                        args,
                    };
                    (call, lhs.span.to(end.span()))
                } else {
                    let span = lhs.span.to(name.span);
                    let field = ExprKind::Field {
                        base: Box::new(lhs),
                        field: name,
                    };
                    (field, span)
                }
            }

            // Free function call: ID ( args )
            TokenKind::LParen => {
                let ExprKind::Id(callee) = lhs.kind else {
                    return Err(self.error(op_token, self.unexpected_kind("operator", op_token)));
                };
                let args = self.parse_list(TokenKind::RParen, Parser::parse_expr)?;
                let end = self.close(op_token, TokenKind::RParen)?;
                let call = ExprKind::Call {
                    receiver: None,
                    callee,
                    args,
                };
                (call, lhs.span.to(end.span()))
            }

            // Index or slice: expr [ i ] or expr [ [i] .. [j] ]
            TokenKind::LBracket => {
                let lo = self.parse_optional_expr(TokenKind::DotDot)?;
                let kind = match lo {
                    Some(index) if !self.is(TokenKind::DotDot) => ExprKind::Index {
                        base: Box::new(lhs.clone()),
                        index,
                    },
                    lo => {
                        self.consume(TokenKind::DotDot)?;
                        let hi = self.parse_optional_expr(TokenKind::RBracket)?;
                        ExprKind::Slice {
                            base: Box::new(lhs.clone()),
                            lo,
                            hi,
                        }
                    }
                };
                let end = self.close(op_token, TokenKind::RBracket)?;
                (kind, lhs.span.to(end.span()))
            }

            kind => {
                let Some(op) = Self::binary_operator(kind) else {
                    return Err(self.error(op_token, self.unexpected_kind("operator", op_token)));
                };
                // Parse right operand with correct precedence
                let rhs = self.parse_expr_bp(rbp)?;

                let span = lhs.span.to(rhs.span);
                let binary = ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                };
                (binary, span)
            }
        };

        Ok(Expr {
            kind,
            span,
            info: (),
        })
    }

    /// Parses `item (',' item)* [',']` until `end_delim` is found. Does
    /// **NOT** consume the end delimiter.
    fn parse_list<T>(
        &mut self,
        end_delim: TokenKind,
        mut parse_item: impl FnMut(&mut Self) -> Result<T>,
    ) -> Result<Vec<T>> {
        let mut items = Vec::new();
        while !self.is(end_delim) && !self.is(TokenKind::Eof) {
            items.push(parse_item(self)?);
            if !self.take(TokenKind::Comma) {
                break;
            }
        }
        Ok(items)
    }

    fn binary_operator(kind: TokenKind) -> Option<BinaryOperator> {
        use BinaryOperator as B;
        let op = match kind {
            TokenKind::Plus => B::Add,
            TokenKind::Minus => B::Sub,
            TokenKind::Star => B::Mul,
            TokenKind::Slash => B::Div,
            TokenKind::Percent => B::Rem,
            TokenKind::Shl => B::Shl,
            TokenKind::Shr => B::Shr,
            TokenKind::Amp => B::BitAnd,
            TokenKind::Pipe => B::BitOr,
            TokenKind::Caret => B::BitXor,
            TokenKind::TildePlus => B::WrappingAdd,
            TokenKind::TildeMinus => B::WrappingSub,
            TokenKind::EqEq => B::Eq,
            TokenKind::NotEq => B::Ne,
            TokenKind::Less => B::Lt,
            TokenKind::LessEq => B::Le,
            TokenKind::Greater => B::Gt,
            TokenKind::GreaterEq => B::Ge,
            TokenKind::And => B::And,
            TokenKind::Or => B::Or,
            _ => return None,
        };
        Some(op)
    }

    fn infix_binding_power(kind: TokenKind) -> Option<(u8, u8)> {
        use TokenKind::*;
        let bp = match kind {
            Or => (1, 2),
            And => (3, 4),
            EqEq | NotEq | Less | LessEq | Greater | GreaterEq => (5, 6),
            Pipe | Caret => (7, 8),
            Amp => (9, 10),
            Shl | Shr => (11, 12),
            Plus | Minus | TildePlus | TildeMinus => (13, 14),
            Star | Slash | Percent => (15, 16),
            As => (17, 18),
            // Level 20: call, field, index and slice (left-associative)
            Dot | LParen | LBracket => (21, 22),
            _ => return None,
        };
        Some(bp)
    }

    /// `-` and `not` bind tighter than `as` and looser than postfix.
    fn prefix_binding_power() -> ((), u8) {
        ((), 19)
    }
}

impl Parser<'_> {
    fn new<'a>(tm: &'a TokenMap, source: &'a SourceFile, tokens: &'a [Token]) -> Parser<'a> {
        let eof = Token::new(
            TokenKind::Eof,
            None,
            Span::new_of_length(source.text().len(), 0),
        );
        Parser {
            tm,
            source,
            tokens,
            cursor: 0,
            prev: eof,
            loop_depth: 0,
        }
    }

    /// Returns the current token.
    #[inline]
    fn peek(&self) -> Token {
        match self.tokens.get(self.cursor) {
            Some(token) => *token,
            None => Token::new(
                TokenKind::Eof,
                None,
                Span::new_of_length(self.source.text().len(), 0),
            ),
        }
    }

    /// Returns the current token and advances.
    fn advance(&mut self) -> Token {
        let c = self.peek();
        if !c.is_eof() {
            self.cursor += 1;
        }
        self.prev = c;
        c
    }

    /// Checks whether the current token matches the given one.
    fn is(&self, expect: TokenKind) -> bool {
        self.peek().kind == expect
    }

    /// Advances if the current token matches the provided one, returning true.
    /// If not, returns false and doesn't advance.
    fn take(&mut self, expect: TokenKind) -> bool {
        if self.is(expect) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Advances if the current token matches the provided one. If not, fails.
    fn consume(&mut self, expect: TokenKind) -> Result<Token> {
        if self.is(expect) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(expect.describe()))
        }
    }

    /// Consumes the delimiter closing `open`. Running out of input reports
    /// the opening delimiter as unbalanced.
    fn close(&mut self, open: Token, close: TokenKind) -> Result<Token> {
        if self.is(TokenKind::Eof) {
            return Err(self.error(open, SyntaxErrorKind::Unbalanced(open.kind)));
        }
        self.consume(close)
    }

    /// Requires the end of a statement or declaration: a `;` (written or
    /// inserted at a line break), or the enclosing `closer` left in place.
    fn end_item(&mut self, closer: TokenKind) -> Result<()> {
        if self.take(TokenKind::Semicolon) || self.is(closer) || self.is(TokenKind::Eof) {
            Ok(())
        } else {
            Err(self.unexpected(TokenKind::Semicolon.describe()))
        }
    }

    fn unexpected(&self, expected: &'static str) -> SyntaxError {
        let found = self.peek();
        self.error(found, self.unexpected_kind(expected, found))
    }

    fn unexpected_kind(&self, expected: &'static str, found: Token) -> SyntaxErrorKind {
        _ = self;
        SyntaxErrorKind::Unexpected {
            expected,
            found: found.kind,
        }
    }

    fn error(&self, at: Token, kind: SyntaxErrorKind) -> SyntaxError {
        SyntaxError {
            location: self.source.locate(at.span().lo),
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::util::test_utils::tree_tests;

    tree_tests!(
        use parser;

        fn test_simple_expression() {
            let expr = "(1 * 2 + 3) - (1 + 2 * 3)";
            let tree_ok = "
                binary Sub (0..25)
                  paren (0..11)
                    binary Add (1..10)
                      binary Mul (1..6)
                        int 1 (1..2)
                        int 2 (5..6)
                      int 3 (9..10)
                  paren (14..25)
                    binary Add (15..24)
                      int 1 (15..16)
                      binary Mul (19..24)
                        int 2 (19..20)
                        int 3 (23..24)
            ";
        }

        fn test_identifier_expr() {
            let expr = "width";
            let tree_ok = "ident width (0..5)";
        }

        fn test_hex_literal_expr() {
            let expr = "0xFF";
            let tree_ok = "int 255 (0..4)";
        }

        fn test_logical_precedence() {
            let expr = "a < b and not c or d";
            let tree_ok = "
                binary Or (0..20)
                  binary And (0..15)
                    binary Lt (0..5)
                      ident a (0..1)
                      ident b (4..5)
                    unary Not (10..15)
                      ident c (14..15)
                  ident d (19..20)
            ";
        }

        fn test_bitwise_precedence() {
            let expr = "a | b & c << 2";
            let tree_ok = "
                binary BitOr (0..14)
                  ident a (0..1)
                  binary BitAnd (4..14)
                    ident b (4..5)
                    binary Shl (8..14)
                      ident c (8..9)
                      int 2 (13..14)
            ";
        }

        fn test_conversion_binds_tighter_than_arithmetic() {
            let expr = "-x as u16 + 1";
            let tree_ok = "
                binary Add (0..13)
                  as u16 (0..9)
                    unary Neg (0..2)
                      ident x (1..2)
                  int 1 (12..13)
            ";
        }

        fn test_wrapping_operators() {
            let expr = "a ~+ b ~- 1";
            let tree_ok = "
                binary WrappingSub (0..11)
                  binary WrappingAdd (0..6)
                    ident a (0..1)
                    ident b (5..6)
                  int 1 (10..11)
            ";
        }

        fn test_postfix_chain() {
            let expr = "this.body[i..].len()";
            let tree_ok = "
                call len (0..20)
                  receiver
                    slice (0..14)
                      field body (0..9)
                        this (0..4)
                      ident i (10..11)
                      ..
            ";
        }

        fn test_free_and_method_calls() {
            let expr = "f(a, b.g(1))";
            let tree_ok = "
                call f (0..12)
                  arguments
                    ident a (2..3)
                    call g (5..11)
                      receiver
                        ident b (5..6)
                      arguments
                        int 1 (9..10)
            ";
        }

        fn test_index_expr() {
            let expr = "src[i + 1]";
            let tree_ok = "
                index (0..10)
                  ident src (0..3)
                  binary Add (4..9)
                    ident i (4..5)
                    int 1 (8..9)
            ";
        }

        fn test_unbalanced_paren() {
            let expr = "(a + b";
            let expected_errors = &["test.ward:1:1: syntax error: unclosed `(`"];
        }

        fn test_missing_operand() {
            let expr = "a +";
            let expected_errors =
                &["test.ward:1:4: syntax error: expected expression, found end of file"];
        }

        fn test_call_on_non_name() {
            let expr = "(f)(x)";
            let expected_errors = &["test.ward:1:4: syntax error: expected operator, found `(`"];
        }

        fn test_const_and_struct() {
            let program = "
                const MAX: u32 = 1000
                const MAGIC = 0x89

                struct header(
                    width: u32[..MAX],
                    magic: [4]u8,
                    body: []u8,
                    next: ptr header,
                )
            ";
            let tree_ok = "
                const MAX: u32
                  int 1000
                const MAGIC
                  int 137
                struct header
                  field width: u32[..MAX]
                  field magic: [4]u8
                  field body: []u8
                  field next: ptr header
            ";
        }

        fn test_function_with_clauses() {
            let program = r#"
                func header.decode(src: []u8, n: u32) -> u32,
                    pre n <= src.len() via "caller checks",
                    post result <= n,
                {
                    var i: u32 = 0
                    while i < n, inv i <= n {
                        if src[i] == 0 {
                            break
                        } else if src[i] == 1 {
                            continue
                        }
                        i += 1
                    }
                    return i
                }
            "#;
            let tree_ok = r#"
                func header.decode(src: []u8, n: u32) -> u32
                  pre via "caller checks"
                    binary Le
                      ident n
                      call len
                        receiver
                          ident src
                  post
                    binary Le
                      result
                      ident n
                  body
                    var i: u32
                      int 0
                    while
                      binary Lt
                        ident i
                        ident n
                      inv
                        binary Le
                          ident i
                          ident n
                      body
                        if
                          binary Eq
                            index
                              ident src
                              ident i
                            int 0
                          then
                            break
                          else if
                            binary Eq
                              index
                                ident src
                                ident i
                              int 1
                            then
                              continue
                        assign Add
                          ident i
                          int 1
                    return
                      ident i
            "#;
        }

        fn test_statement_forms() {
            let program = "
                func f(p: ptr header, a: [2]u8) -> u8[1..], pre a[0] > 0 {
                    assert p.width < 10
                    p.width = p.width + 1
                    g(p)
                    return a[1 - 1]
                }
            ";
            let tree_ok = "
                func f(p: ptr header, a: [2]u8) -> u8[1..]
                  pre
                    binary Gt
                      index
                        ident a
                        int 0
                      int 0
                  body
                    assert
                      binary Lt
                        field width
                          ident p
                        int 10
                    assign Set
                      field width
                        ident p
                      binary Add
                        field width
                          ident p
                        int 1
                    expr
                      call g
                        arguments
                          ident p
                    return
                      index
                        ident a
                        binary Sub
                          int 1
                          int 1
            ";
        }

        fn test_break_outside_loop() {
            let program = "
                func f() {
                    break
                }
            ";
            let expected_errors = &["test.ward:3:21: syntax error: `break` outside of a loop"];
        }

        fn test_invalid_assignment_target() {
            let program = "
                func f(x: u8) {
                    x + 1 = 2
                }
            ";
            let expected_errors = &["test.ward:3:21: syntax error: invalid assignment target"];
        }

        fn test_missing_invariant_clause() {
            let program = "
                func f(x: u8) {
                    while x < 3, x {
                    }
                }
            ";
            let expected_errors = &["test.ward:3:34: syntax error: missing `inv` clause"];
        }

        fn test_unclosed_block() {
            let program = "
                func f(x: u8) {
                    x = 1
            ";
            let expected_errors = &["test.ward:2:31: syntax error: unclosed `{`"];
        }

        fn test_statements_need_separators() {
            let program = "
                func f(x: u8) {
                    x = 1 x = 2
                }
            ";
            let expected_errors =
                &["test.ward:3:27: syntax error: expected `;` or line break, found identifier"];
        }
    );
}
