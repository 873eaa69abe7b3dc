use std::sync::atomic::{AtomicBool, Ordering};

use crate::ast::{
    Ast, Decl, Define, Expr, FunctionDecl, Literal, NodeId, NodeKind, Stmt, TypeSpec, VarDecl,
    VarRole,
};
use crate::diag::Diagnostics;
use crate::token::{Lexer, ParseError, Span, Token, TokenKind};

type ParseResult<T> = Result<T, ParseError>;

/// Recursive descent over the token stream of one script.
///
/// Errors inside a declaration or statement are reported to the sink and the
/// parser resynchronizes at the next safe token, so one bad construct never
/// hides the rest of the file. The resulting [`Ast`] is always usable; its
/// validity is tracked through the diagnostics only.
pub struct Parser<'a> {
    script: &'a str,
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    ast: Ast,
    diags: &'a mut Diagnostics,
    cancel: Option<&'a AtomicBool>,
}

impl<'a> Parser<'a> {
    pub fn new(script: &'a str, source: &'a str, diags: &'a mut Diagnostics) -> Self {
        let lexed = Lexer::new(script, source, &mut *diags).tokenize();
        let mut ast = Ast::new();
        for comment in &lexed.comments {
            ast.push_comment(comment.text(source), comment.span);
        }
        Self {
            script,
            source,
            tokens: lexed.tokens,
            pos: 0,
            ast,
            diags,
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, cancel: &'a AtomicBool) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn parse(self) -> Ast {
        self.parse_cancellable().unwrap_or_default()
    }

    /// [`Self::parse`], but checked against the cancellation flag at every
    /// top level declaration. `None` means the run was abandoned and the
    /// script counts as never parsed.
    pub fn parse_cancellable(mut self) -> Option<Ast> {
        while self.peek_kind() != TokenKind::Eof {
            if self.cancelled() {
                return None;
            }
            self.top_level();
        }
        Some(self.ast)
    }

    fn cancelled(&self) -> bool {
        self.cancel.is_some_and(|c| c.load(Ordering::Relaxed))
    }

    // cursor plumbing

    fn peek(&self) -> Token {
        self.tokens[self.pos]
    }

    fn peek_kind(&self) -> TokenKind {
        self.tokens[self.pos].kind
    }

    /// Lookahead; clamps to the trailing Eof token.
    fn peek_at(&self, n: usize) -> TokenKind {
        let idx = (self.pos + n).min(self.tokens.len() - 1);
        self.tokens[idx].kind
    }

    fn previous(&self) -> Token {
        self.tokens[self.pos.saturating_sub(1)]
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos];
        if tok.kind != TokenKind::Eof {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            return true;
        }
        false
    }

    fn expect(&mut self, kind: TokenKind) -> ParseResult<Token> {
        if self.check(kind) {
            return Ok(self.advance());
        }
        let tok = self.peek();
        Err(ParseError::with_span(
            format!("expected {}, found {}", kind.describe(), tok.kind.describe()),
            tok.span,
        ))
    }

    /// Slices the source; the returned str outlives `&self` borrows.
    fn text_of(&self, tok: Token) -> &'a str {
        tok.text(self.source)
    }

    fn error_at(&self, tok: Token, message: String) -> ParseError {
        ParseError::with_span(message, tok.span)
    }

    // recovery

    fn report(&mut self, err: &ParseError) {
        let span = err.span.unwrap_or(self.peek().span);
        self.diags.parse(self.script, err.message.clone(), false, span);
    }

    /// Skips ahead to the next token that can start a declaration or
    /// statement, or to just after a semicolon.
    fn synchronize(&mut self) {
        while self.peek_kind() != TokenKind::Eof {
            if self.previous().kind == TokenKind::Semicolon {
                return;
            }
            let k = self.peek_kind();
            if k.is_type_specifier() {
                return;
            }
            match k {
                TokenKind::Const
                | TokenKind::If
                | TokenKind::While
                | TokenKind::For
                | TokenKind::Do
                | TokenKind::Switch
                | TokenKind::Return
                | TokenKind::Break
                | TokenKind::Continue
                | TokenKind::Case
                | TokenKind::Default
                | TokenKind::LBrace
                | TokenKind::RBrace
                | TokenKind::Pound => return,
                _ => {
                    self.advance();
                }
            }
        }
    }

    // top level

    fn top_level(&mut self) {
        let checkpoint = self.pos;
        match self.top_level_item() {
            Ok(Some(id)) => self.ast.decls.push(id),
            Ok(None) => {}
            Err(err) => {
                self.report(&err);
                self.synchronize();
                if self.pos == checkpoint {
                    // Guaranteed progress even on a stuck token.
                    self.advance();
                }
                let span = Span::merge(self.tokens[checkpoint].span, self.previous().span);
                let placeholder = self.ast.push(NodeKind::Stmt(Stmt::Empty), span);
                self.ast.decls.push(placeholder);
            }
        }
    }

    fn top_level_item(&mut self) -> ParseResult<Option<NodeId>> {
        match self.peek_kind() {
            TokenKind::Pound => {
                self.directive()?;
                Ok(None)
            }
            TokenKind::Semicolon => {
                let tok = self.advance();
                self.diags
                    .parse(self.script, "spurious ';' ignored", true, tok.span);
                Ok(None)
            }
            TokenKind::Struct if self.peek_at(2) == TokenKind::LBrace => {
                Ok(Some(self.struct_decl()?))
            }
            TokenKind::Const => Ok(Some(self.typed_decl(VarRole::Global)?)),
            k if k.is_type_specifier() => Ok(Some(self.typed_decl(VarRole::Global)?)),
            _ => {
                let tok = self.peek();
                Err(self.error_at(
                    tok,
                    format!("expected a declaration, found {}", tok.kind.describe()),
                ))
            }
        }
    }

    fn directive(&mut self) -> ParseResult<()> {
        let pound = self.expect(TokenKind::Pound)?;
        let word = self.expect(TokenKind::Ident)?;
        match self.text_of(word) {
            "include" => {
                let name_tok = self.expect(TokenKind::StringConst)?;
                let name = self.text_of(name_tok).to_string();
                if name.is_empty() {
                    self.diags
                        .parse(self.script, "empty include name", false, name_tok.span);
                }
                self.ast
                    .record_include(name, Span::merge(pound.span, name_tok.span));
                Ok(())
            }
            "define" => {
                let name_tok = self.expect(TokenKind::Ident)?;
                let value_tok = self.peek();
                if matches!(value_tok.kind, TokenKind::Eof | TokenKind::Semicolon) {
                    return Err(self.error_at(
                        value_tok,
                        format!("expected a value after '#define {}'", self.text_of(name_tok)),
                    ));
                }
                self.advance();
                self.ast.defines.push(Define {
                    name: self.text_of(name_tok).to_string(),
                    value: self.text_of(value_tok).to_string(),
                    span: Span::merge(pound.span, value_tok.span),
                });
                Ok(())
            }
            other => Err(self.error_at(
                word,
                format!("unknown preprocessor directive '#{other}'"),
            )),
        }
    }

    // declarations

    fn type_spec(&mut self) -> ParseResult<TypeSpec> {
        let start = self.peek().span;
        let is_const = self.eat(TokenKind::Const);
        let tok = self.peek();
        if !tok.kind.is_type_specifier() {
            return Err(self.error_at(
                tok,
                format!("expected a type specifier, found {}", tok.kind.describe()),
            ));
        }
        self.advance();
        let mut struct_name = None;
        if tok.kind == TokenKind::Struct {
            let name_tok = self.expect(TokenKind::Ident)?;
            struct_name = Some(self.text_of(name_tok).to_string());
        }
        Ok(TypeSpec {
            is_const,
            kind: tok.kind,
            struct_name,
            span: Span::merge(start, self.previous().span),
        })
    }

    /// A declaration opened by a type: either a function (prototype or
    /// definition) or one or more variables.
    fn typed_decl(&mut self, role: VarRole) -> ParseResult<NodeId> {
        let ty = self.type_spec()?;
        let name_tok = self.expect(TokenKind::Ident)?;
        let name = self.text_of(name_tok).to_string();
        if self.check(TokenKind::LParen) {
            self.function_rest(ty, name, name_tok.span)
        } else {
            self.var_decl_rest(ty, name, name_tok.span, role)
        }
    }

    fn function_rest(&mut self, ty: TypeSpec, name: String, name_span: Span) -> ParseResult<NodeId> {
        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        if !self.eat(TokenKind::RParen) {
            loop {
                params.push(self.param()?);
                if self.eat(TokenKind::Comma) {
                    continue;
                }
                self.expect(TokenKind::RParen)?;
                break;
            }
        }
        let header_span = Span::merge(ty.span, self.previous().span);
        let decl = self.ast.push(
            NodeKind::Decl(Decl::Func(FunctionDecl {
                ty,
                name,
                name_span,
                params,
            })),
            header_span,
        );
        if self.check(TokenKind::LBrace) {
            let body = self.block()?;
            let span = Span::merge(header_span, self.ast.span(body));
            return Ok(self.ast.push(NodeKind::Decl(Decl::FuncDef { decl, body }), span));
        }
        // A prototype missing its ';' still yields the declaration.
        if let Err(err) = self.expect(TokenKind::Semicolon) {
            self.report(&err);
        } else {
            self.ast.set_span(decl, Span::merge(header_span, self.previous().span));
        }
        Ok(decl)
    }

    fn param(&mut self) -> ParseResult<NodeId> {
        let ty = self.type_spec()?;
        let name_tok = self.expect(TokenKind::Ident)?;
        let name = self.text_of(name_tok).to_string();
        let init = if self.eat(TokenKind::Assign) {
            Some(self.expression()?)
        } else {
            None
        };
        let span = Span::merge(ty.span, self.previous().span);
        Ok(self.ast.push(
            NodeKind::Decl(Decl::Var(VarDecl {
                ty,
                name,
                name_span: name_tok.span,
                init,
                role: VarRole::Param,
            })),
            span,
        ))
    }

    /// An initializer expression; on failure the declarator survives with an
    /// empty placeholder and the cursor moves to the end of the declarator.
    fn initializer(&mut self) -> NodeId {
        match self.expression() {
            Ok(id) => id,
            Err(err) => {
                self.report(&err);
                let anchor = Span::single(self.previous().span.end);
                let id = self.ast.push(NodeKind::Expr(Expr::Empty), anchor);
                while !matches!(
                    self.peek_kind(),
                    TokenKind::Semicolon | TokenKind::Comma | TokenKind::RBrace | TokenKind::Eof
                ) {
                    self.advance();
                }
                id
            }
        }
    }

    /// One or more declarators sharing a type. Each declarator node spans
    /// only its own name and initializer; a single declarator is widened to
    /// include the type, a list gets a wrapping node that covers it instead.
    fn declarator_group(
        &mut self,
        ty: &TypeSpec,
        role: VarRole,
        first: Option<(String, Span)>,
    ) -> ParseResult<Vec<NodeId>> {
        let mut decls = Vec::new();
        let (mut name, mut name_span) = match first {
            Some(first) => first,
            None => {
                let tok = self.expect(TokenKind::Ident)?;
                (self.text_of(tok).to_string(), tok.span)
            }
        };
        loop {
            let init = if self.eat(TokenKind::Assign) {
                Some(self.initializer())
            } else {
                None
            };
            let span = Span::merge(name_span, self.previous().span);
            decls.push(self.ast.push(
                NodeKind::Decl(Decl::Var(VarDecl {
                    ty: ty.clone(),
                    name,
                    name_span,
                    init,
                    role,
                })),
                span,
            ));
            if self.eat(TokenKind::Comma) {
                let tok = self.expect(TokenKind::Ident)?;
                name = self.text_of(tok).to_string();
                name_span = tok.span;
                continue;
            }
            break;
        }
        if decls.len() == 1 {
            let widened = Span::merge(ty.span, self.ast.span(decls[0]));
            self.ast.set_span(decls[0], widened);
        }
        Ok(decls)
    }

    fn var_decl_rest(
        &mut self,
        ty: TypeSpec,
        first_name: String,
        first_span: Span,
        role: VarRole,
    ) -> ParseResult<NodeId> {
        let decls = self.declarator_group(&ty, role, Some((first_name, first_span)))?;
        // A missing ';' is reported but the declaration survives.
        if let Err(err) = self.expect(TokenKind::Semicolon) {
            self.report(&err);
        }
        if decls.len() == 1 {
            return Ok(decls[0]);
        }
        let span = Span::merge(ty.span, self.previous().span);
        Ok(self.ast.push(NodeKind::Decl(Decl::List { decls }), span))
    }

    fn struct_decl(&mut self) -> ParseResult<NodeId> {
        let start = self.expect(TokenKind::Struct)?.span;
        let name_tok = self.expect(TokenKind::Ident)?;
        let name = self.text_of(name_tok).to_string();
        self.expect(TokenKind::LBrace)?;
        let mut fields = Vec::new();
        while !self.check(TokenKind::RBrace) {
            if self.check(TokenKind::Eof) {
                let tok = self.peek();
                return Err(self.error_at(tok, "expected '}' to close struct".to_string()));
            }
            let ty = self.type_spec()?;
            let group = self.declarator_group(&ty, VarRole::Field, None)?;
            fields.extend(group);
            self.expect(TokenKind::Semicolon)?;
        }
        self.expect(TokenKind::RBrace)?;
        if let Err(err) = self.expect(TokenKind::Semicolon) {
            self.report(&err);
        }
        let span = Span::merge(start, self.previous().span);
        Ok(self.ast.push(
            NodeKind::Decl(Decl::Struct {
                name,
                name_span: name_tok.span,
                fields,
            }),
            span,
        ))
    }

    // statements

    fn block(&mut self) -> ParseResult<NodeId> {
        let start = self.expect(TokenKind::LBrace)?.span;
        let mut stmts = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            let checkpoint = self.pos;
            match self.statement() {
                Ok(id) => stmts.push(id),
                Err(err) => {
                    self.report(&err);
                    self.synchronize();
                    if self.pos == checkpoint {
                        self.advance();
                    }
                    let span = Span::merge(self.tokens[checkpoint].span, self.previous().span);
                    stmts.push(self.ast.push(NodeKind::Stmt(Stmt::Empty), span));
                }
            }
        }
        if let Err(err) = self.expect(TokenKind::RBrace) {
            self.report(&err);
        }
        let span = Span::merge(start, self.previous().span);
        Ok(self.ast.push(NodeKind::Stmt(Stmt::Block { stmts }), span))
    }

    fn statement(&mut self) -> ParseResult<NodeId> {
        match self.peek_kind() {
            TokenKind::LBrace => self.block(),
            TokenKind::If => self.if_stmt(),
            TokenKind::While => self.while_stmt(),
            TokenKind::Do => self.do_stmt(),
            TokenKind::For => self.for_stmt(),
            TokenKind::Switch => self.switch_stmt(),
            TokenKind::Return | TokenKind::Break | TokenKind::Continue => self.jump_stmt(),
            TokenKind::Case | TokenKind::Default => self.label_stmt(),
            TokenKind::Semicolon => {
                let tok = self.advance();
                Ok(self.ast.push(NodeKind::Stmt(Stmt::Empty), tok.span))
            }
            TokenKind::Struct if self.peek_at(2) == TokenKind::LBrace => self.struct_decl(),
            TokenKind::Const => self.typed_decl(VarRole::Local),
            k if k.is_type_specifier() => self.typed_decl(VarRole::Local),
            _ => self.expr_stmt(),
        }
    }

    fn expr_stmt(&mut self) -> ParseResult<NodeId> {
        let expr = self.expression()?;
        self.expect(TokenKind::Semicolon)?;
        let span = Span::merge(self.ast.span(expr), self.previous().span);
        Ok(self.ast.push(NodeKind::Stmt(Stmt::Expr { expr }), span))
    }

    fn if_stmt(&mut self) -> ParseResult<NodeId> {
        let start = self.advance().span;
        self.expect(TokenKind::LParen)?;
        let cond = self.expression()?;
        self.expect(TokenKind::RParen)?;
        let then_branch = self.statement()?;
        let else_branch = if self.eat(TokenKind::Else) {
            Some(self.statement()?)
        } else {
            None
        };
        let end = self.ast.span(else_branch.unwrap_or(then_branch));
        Ok(self.ast.push(
            NodeKind::Stmt(Stmt::If {
                cond,
                then_branch,
                else_branch,
            }),
            Span::merge(start, end),
        ))
    }

    fn while_stmt(&mut self) -> ParseResult<NodeId> {
        let start = self.advance().span;
        self.expect(TokenKind::LParen)?;
        let cond = self.expression()?;
        self.expect(TokenKind::RParen)?;
        let body = self.statement()?;
        let span = Span::merge(start, self.ast.span(body));
        Ok(self.ast.push(NodeKind::Stmt(Stmt::While { cond, body }), span))
    }

    fn do_stmt(&mut self) -> ParseResult<NodeId> {
        let start = self.advance().span;
        let body = self.statement()?;
        self.expect(TokenKind::While)?;
        self.expect(TokenKind::LParen)?;
        let cond = self.expression()?;
        self.expect(TokenKind::RParen)?;
        self.expect(TokenKind::Semicolon)?;
        let span = Span::merge(start, self.previous().span);
        Ok(self.ast.push(NodeKind::Stmt(Stmt::Do { body, cond }), span))
    }

    fn for_stmt(&mut self) -> ParseResult<NodeId> {
        let start = self.advance().span;
        self.expect(TokenKind::LParen)?;
        let init = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect(TokenKind::Semicolon)?;
        let cond = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect(TokenKind::Semicolon)?;
        let update = if self.check(TokenKind::RParen) {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect(TokenKind::RParen)?;
        let body = self.statement()?;
        let span = Span::merge(start, self.ast.span(body));
        Ok(self.ast.push(
            NodeKind::Stmt(Stmt::For {
                init,
                cond,
                update,
                body,
            }),
            span,
        ))
    }

    fn switch_stmt(&mut self) -> ParseResult<NodeId> {
        let start = self.advance().span;
        self.expect(TokenKind::LParen)?;
        let target = self.expression()?;
        self.expect(TokenKind::RParen)?;
        let body = self.block()?;
        let span = Span::merge(start, self.ast.span(body));
        Ok(self.ast.push(NodeKind::Stmt(Stmt::Switch { target, body }), span))
    }

    fn label_stmt(&mut self) -> ParseResult<NodeId> {
        let tok = self.advance();
        let value = if tok.kind == TokenKind::Case {
            Some(self.expression()?)
        } else {
            None
        };
        self.expect(TokenKind::Colon)?;
        let span = Span::merge(tok.span, self.previous().span);
        Ok(self.ast.push(
            NodeKind::Stmt(Stmt::Label {
                kind: tok.kind,
                value,
            }),
            span,
        ))
    }

    fn jump_stmt(&mut self) -> ParseResult<NodeId> {
        let tok = self.advance();
        let expr = if tok.kind == TokenKind::Return && !self.check(TokenKind::Semicolon) {
            Some(self.expression()?)
        } else {
            None
        };
        self.expect(TokenKind::Semicolon)?;
        let span = Span::merge(tok.span, self.previous().span);
        Ok(self.ast.push(
            NodeKind::Stmt(Stmt::Jump {
                kind: tok.kind,
                expr,
            }),
            span,
        ))
    }

    // expressions, loosest binding first

    pub(crate) fn expression(&mut self) -> ParseResult<NodeId> {
        self.assignment()
    }

    /// - `lhs = rhs`, `lhs += rhs`, ... (right-associative)
    fn assignment(&mut self) -> ParseResult<NodeId> {
        let lhs = self.ternary()?;
        if self.peek_kind().is_assign_op() {
            let op = self.advance().kind;
            let rhs = self.assignment()?;
            let span = Span::merge(self.ast.span(lhs), self.ast.span(rhs));
            return Ok(self.ast.push(NodeKind::Expr(Expr::Assign { lhs, op, rhs }), span));
        }
        Ok(lhs)
    }

    /// - `cond ? then : else`
    fn ternary(&mut self) -> ParseResult<NodeId> {
        let cond = self.logical_or()?;
        if !self.eat(TokenKind::Question) {
            return Ok(cond);
        }
        let then_branch = self.expression()?;
        self.expect(TokenKind::Colon)?;
        let else_branch = self.expression()?;
        let span = Span::merge(self.ast.span(cond), self.ast.span(else_branch));
        Ok(self.ast.push(
            NodeKind::Expr(Expr::Ternary {
                cond,
                then_branch,
                else_branch,
            }),
            span,
        ))
    }

    /// - `expr || expr`
    fn logical_or(&mut self) -> ParseResult<NodeId> {
        let mut lhs = self.logical_and()?;
        while self.check(TokenKind::Or) {
            self.advance();
            let rhs = self.logical_and()?;
            lhs = self.push_logical(lhs, TokenKind::Or, rhs);
        }
        Ok(lhs)
    }

    /// - `expr && expr`
    fn logical_and(&mut self) -> ParseResult<NodeId> {
        let mut lhs = self.bit_or()?;
        while self.check(TokenKind::And) {
            self.advance();
            let rhs = self.bit_or()?;
            lhs = self.push_logical(lhs, TokenKind::And, rhs);
        }
        Ok(lhs)
    }

    fn push_logical(&mut self, lhs: NodeId, op: TokenKind, rhs: NodeId) -> NodeId {
        let span = Span::merge(self.ast.span(lhs), self.ast.span(rhs));
        self.ast.push(NodeKind::Expr(Expr::Logical { lhs, op, rhs }), span)
    }

    fn push_binary(&mut self, lhs: NodeId, op: TokenKind, rhs: NodeId) -> NodeId {
        let span = Span::merge(self.ast.span(lhs), self.ast.span(rhs));
        self.ast.push(NodeKind::Expr(Expr::Binary { lhs, op, rhs }), span)
    }

    /// - `expr | expr`
    fn bit_or(&mut self) -> ParseResult<NodeId> {
        let mut lhs = self.bit_xor()?;
        while self.check(TokenKind::BitOr) {
            self.advance();
            let rhs = self.bit_xor()?;
            lhs = self.push_binary(lhs, TokenKind::BitOr, rhs);
        }
        Ok(lhs)
    }

    /// - `expr ^ expr`
    fn bit_xor(&mut self) -> ParseResult<NodeId> {
        let mut lhs = self.bit_and()?;
        while self.check(TokenKind::BitXor) {
            self.advance();
            let rhs = self.bit_and()?;
            lhs = self.push_binary(lhs, TokenKind::BitXor, rhs);
        }
        Ok(lhs)
    }

    /// - `expr & expr`
    fn bit_and(&mut self) -> ParseResult<NodeId> {
        let mut lhs = self.equality()?;
        while self.check(TokenKind::BitAnd) {
            self.advance();
            let rhs = self.equality()?;
            lhs = self.push_binary(lhs, TokenKind::BitAnd, rhs);
        }
        Ok(lhs)
    }

    /// - `expr == expr`
    /// - `expr != expr`
    fn equality(&mut self) -> ParseResult<NodeId> {
        let mut lhs = self.relational()?;
        while matches!(self.peek_kind(), TokenKind::Eq | TokenKind::Ne) {
            let op = self.advance().kind;
            let rhs = self.relational()?;
            let span = Span::merge(self.ast.span(lhs), self.ast.span(rhs));
            lhs = self
                .ast
                .push(NodeKind::Expr(Expr::Comparison { lhs, op, rhs }), span);
        }
        Ok(lhs)
    }

    /// - `expr < expr` and friends
    fn relational(&mut self) -> ParseResult<NodeId> {
        let mut lhs = self.shift()?;
        while matches!(
            self.peek_kind(),
            TokenKind::Lt | TokenKind::Le | TokenKind::Gt | TokenKind::Ge
        ) {
            let op = self.advance().kind;
            let rhs = self.shift()?;
            let span = Span::merge(self.ast.span(lhs), self.ast.span(rhs));
            lhs = self
                .ast
                .push(NodeKind::Expr(Expr::Comparison { lhs, op, rhs }), span);
        }
        Ok(lhs)
    }

    /// - `expr << expr`, `expr >> expr`, `expr >>> expr`
    fn shift(&mut self) -> ParseResult<NodeId> {
        let mut lhs = self.additive()?;
        while matches!(
            self.peek_kind(),
            TokenKind::Shl | TokenKind::Shr | TokenKind::Ushr
        ) {
            let op = self.advance().kind;
            let rhs = self.additive()?;
            lhs = self.push_binary(lhs, op, rhs);
        }
        Ok(lhs)
    }

    /// - `expr + expr`
    /// - `expr - expr`
    fn additive(&mut self) -> ParseResult<NodeId> {
        let mut lhs = self.multiplicative()?;
        while matches!(self.peek_kind(), TokenKind::Add | TokenKind::Sub) {
            let op = self.advance().kind;
            let rhs = self.multiplicative()?;
            lhs = self.push_binary(lhs, op, rhs);
        }
        Ok(lhs)
    }

    /// - `expr * expr`, `expr / expr`, `expr % expr`
    fn multiplicative(&mut self) -> ParseResult<NodeId> {
        let mut lhs = self.unary()?;
        while matches!(
            self.peek_kind(),
            TokenKind::Mul | TokenKind::Div | TokenKind::Mod
        ) {
            let op = self.advance().kind;
            let rhs = self.unary()?;
            lhs = self.push_binary(lhs, op, rhs);
        }
        Ok(lhs)
    }

    /// - `-expr` `!expr` `~expr` `++expr` `--expr`
    fn unary(&mut self) -> ParseResult<NodeId> {
        let tok = self.peek();
        match tok.kind {
            TokenKind::Sub
            | TokenKind::Not
            | TokenKind::Tilde
            | TokenKind::PlusPlus
            | TokenKind::MinusMinus => {
                self.advance();
                let operand = self.unary()?;
                let span = Span::merge(tok.span, self.ast.span(operand));
                Ok(self.ast.push(
                    NodeKind::Expr(Expr::Unary {
                        op: tok.kind,
                        operand,
                    }),
                    span,
                ))
            }
            _ => self.postfix(),
        }
    }

    /// - `primary(args)` `primary.field` `primary++` `primary--`
    fn postfix(&mut self) -> ParseResult<NodeId> {
        let mut expr = self.primary()?;
        loop {
            match self.peek_kind() {
                TokenKind::LParen => {
                    expr = self.call_rest(expr)?;
                }
                TokenKind::Dot => {
                    self.advance();
                    let field_tok = self.expect(TokenKind::Ident)?;
                    let field = self.ast.push(
                        NodeKind::Expr(Expr::Variable {
                            name: self.text_of(field_tok).to_string(),
                        }),
                        field_tok.span,
                    );
                    let span = Span::merge(self.ast.span(expr), field_tok.span);
                    expr = self
                        .ast
                        .push(NodeKind::Expr(Expr::Dot { lhs: expr, field }), span);
                }
                TokenKind::PlusPlus | TokenKind::MinusMinus => {
                    let tok = self.advance();
                    let span = Span::merge(self.ast.span(expr), tok.span);
                    expr = self.ast.push(
                        NodeKind::Expr(Expr::Postfix {
                            operand: expr,
                            op: tok.kind,
                        }),
                        span,
                    );
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn call_rest(&mut self, callee: NodeId) -> ParseResult<NodeId> {
        let open = self.expect(TokenKind::LParen)?;
        let mut args = Vec::new();
        let mut commas = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                args.push(self.expression()?);
                if self.check(TokenKind::Comma) {
                    let comma = self.advance();
                    commas.push(comma.span.end);
                    continue;
                }
                break;
            }
        }
        let close = self.expect(TokenKind::RParen)?;
        let args_span = Span::merge(open.span, close.span);
        let span = Span::merge(self.ast.span(callee), close.span);
        Ok(self.ast.push(
            NodeKind::Expr(Expr::Call {
                callee,
                args,
                args_span,
                commas,
            }),
            span,
        ))
    }

    fn primary(&mut self) -> ParseResult<NodeId> {
        let tok = self.peek();
        match tok.kind {
            TokenKind::IntConst => {
                self.advance();
                let value = self.int_value(tok);
                Ok(self
                    .ast
                    .push(NodeKind::Expr(Expr::Literal(Literal::Int(value))), tok.span))
            }
            TokenKind::FloatConst => {
                self.advance();
                let value = self.float_value(tok);
                Ok(self
                    .ast
                    .push(NodeKind::Expr(Expr::Literal(Literal::Float(value))), tok.span))
            }
            TokenKind::StringConst => {
                self.advance();
                let text = self.text_of(tok).to_string();
                Ok(self
                    .ast
                    .push(NodeKind::Expr(Expr::Literal(Literal::Str(text))), tok.span))
            }
            TokenKind::ObjectInvalidConst => {
                self.advance();
                Ok(self.ast.push(
                    NodeKind::Expr(Expr::Literal(Literal::ObjectInvalid)),
                    tok.span,
                ))
            }
            TokenKind::ObjectSelfConst => {
                self.advance();
                Ok(self
                    .ast
                    .push(NodeKind::Expr(Expr::Literal(Literal::ObjectSelf)), tok.span))
            }
            TokenKind::Ident => {
                self.advance();
                Ok(self.ast.push(
                    NodeKind::Expr(Expr::Variable {
                        name: self.text_of(tok).to_string(),
                    }),
                    tok.span,
                ))
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.expression()?;
                let close = self.expect(TokenKind::RParen)?;
                let span = Span::merge(tok.span, close.span);
                Ok(self.ast.push(NodeKind::Expr(Expr::Group { inner }), span))
            }
            TokenKind::LBracket => self.vector_literal(),
            _ => Err(self.error_at(
                tok,
                format!("expected an expression, found {}", tok.kind.describe()),
            )),
        }
    }

    /// - `[x, y, z]` with float components
    fn vector_literal(&mut self) -> ParseResult<NodeId> {
        let open = self.expect(TokenKind::LBracket)?;
        let x = self.vector_component()?;
        self.expect(TokenKind::Comma)?;
        let y = self.vector_component()?;
        self.expect(TokenKind::Comma)?;
        let z = self.vector_component()?;
        let close = self.expect(TokenKind::RBracket)?;
        let span = Span::merge(open.span, close.span);
        Ok(self
            .ast
            .push(NodeKind::Expr(Expr::LiteralVector { x, y, z }), span))
    }

    fn vector_component(&mut self) -> ParseResult<f32> {
        let tok = self.peek();
        match tok.kind {
            TokenKind::FloatConst => {
                self.advance();
                Ok(self.float_value(tok))
            }
            TokenKind::IntConst => {
                self.advance();
                Ok(self.int_value(tok) as f32)
            }
            _ => Err(self.error_at(
                tok,
                format!("expected a number in vector literal, found {}", tok.kind.describe()),
            )),
        }
    }

    // literal decoding; bad literals degrade to zero with a diagnostic

    fn int_value(&mut self, tok: Token) -> i64 {
        let text = self.text_of(tok);
        let parsed = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X"))
        {
            i64::from_str_radix(hex, 16)
        } else if let Some(bin) = text.strip_prefix("0b").or_else(|| text.strip_prefix("0B")) {
            i64::from_str_radix(bin, 2)
        } else if let Some(oct) = text.strip_prefix("0o").or_else(|| text.strip_prefix("0O")) {
            i64::from_str_radix(oct, 8)
        } else {
            text.parse::<i64>()
        };
        match parsed {
            Ok(value) => value,
            Err(_) => {
                self.diags.parse(
                    self.script,
                    format!("invalid integer literal '{text}'"),
                    false,
                    tok.span,
                );
                0
            }
        }
    }

    fn float_value(&mut self, tok: Token) -> f32 {
        let text = self.text_of(tok);
        match text.strip_suffix('f').unwrap_or(text).parse::<f32>() {
            Ok(value) => value,
            Err(_) => {
                self.diags.parse(
                    self.script,
                    format!("invalid float literal '{text}'"),
                    false,
                    tok.span,
                );
                0.0
            }
        }
    }
}
