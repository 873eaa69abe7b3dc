//! Position queries: the symbol under the cursor, signature help and
//! inlay hints.
//!
//! The [`Locator`] walks the arena top down, pruning on span containment,
//! and answers through the resolution's bindings. Call expressions are
//! bookkept on the way: the innermost call whose parenthesis span holds
//! the cursor is visited first and wins signature help, and a cursor
//! inside a member access records the dot context member completion
//! needs.

use crate::ast::{Ast, Decl, Expr, NodeId, NodeKind, Stmt, VarDecl};
use crate::context::Context;
use crate::script::Script;
use crate::token::Span;

use super::symbols::{InlayHint, Provider, SignatureHelp, Symbol, SymbolKind, struct_fields};

pub(crate) struct Locator<'a> {
    script: &'a Script,
    ast: &'a Ast,
    ctx: &'a Context,
    /// Identifier the editor believes sits at the position. Declaration
    /// name hits are positional; variable hits also check the needle.
    needle: &'a str,
    line: u32,
    column: u32,
    pub(crate) found: Option<Symbol>,
    pub(crate) call: Option<NodeId>,
    pub(crate) active_param: usize,
    /// Left side of the member access the position sits in, if any.
    pub(crate) dot_lhs: Option<NodeId>,
}

impl<'a> Locator<'a> {
    pub(crate) fn new(
        script: &'a Script,
        ctx: &'a Context,
        needle: &'a str,
        line: u32,
        column: u32,
    ) -> Self {
        Self {
            script,
            ast: script.ast(),
            ctx,
            needle,
            line,
            column,
            found: None,
            call: None,
            active_param: 0,
            dot_lhs: None,
        }
    }

    pub(crate) fn run(mut self) -> Self {
        if self.script.resolution().is_none() {
            return self;
        }
        for &decl in &self.ast.decls {
            self.decl(decl);
            if self.found.is_some() {
                break;
            }
        }
        self
    }

    fn contains(&self, span: Span) -> bool {
        span.contains(self.line, self.column)
    }

    fn decl(&mut self, id: NodeId) {
        if self.found.is_some() || !self.contains(self.ast.span(id)) {
            return;
        }
        match self.ast.decl(id) {
            Some(Decl::Var(v)) => self.var_decl(id, v),
            Some(Decl::List { decls }) => {
                for &decl in decls {
                    self.decl(decl);
                }
            }
            Some(Decl::Func(_)) => self.func_header(id),
            Some(Decl::FuncDef { decl, body }) => {
                self.func_header(*decl);
                if self.found.is_none() {
                    self.stmt(*body);
                }
            }
            Some(Decl::Struct {
                name_span, fields, ..
            }) => {
                if self.contains(*name_span) {
                    self.found = self.script.symbol_for(self.ctx, id);
                    return;
                }
                for &field in fields {
                    self.decl(field);
                }
            }
            None => {}
        }
    }

    fn var_decl(&mut self, id: NodeId, v: &'a VarDecl) {
        if self.contains(v.name_span) {
            self.found = self.script.symbol_for(self.ctx, id);
            return;
        }
        if let Some(struct_name) = &v.ty.struct_name {
            if self.contains(v.ty.span) {
                self.found = self.type_symbol(struct_name);
                return;
            }
        }
        if let Some(init) = v.init {
            self.expr(init);
        }
    }

    fn func_header(&mut self, id: NodeId) {
        if self.found.is_some() || !self.contains(self.ast.span(id)) {
            return;
        }
        let Some(Decl::Func(f)) = self.ast.decl(id) else {
            return;
        };
        if self.contains(f.name_span) {
            self.found = self.script.symbol_for(self.ctx, id);
            return;
        }
        if let Some(struct_name) = &f.ty.struct_name {
            if self.contains(f.ty.span) {
                self.found = self.type_symbol(struct_name);
                return;
            }
        }
        for &param in &f.params {
            self.decl(param);
            if self.found.is_some() {
                return;
            }
        }
    }

    fn stmt(&mut self, id: NodeId) {
        if self.found.is_some() || !self.contains(self.ast.span(id)) {
            return;
        }
        match &self.ast.node(id).kind {
            NodeKind::Decl(_) => self.decl(id),
            NodeKind::Expr(_) => self.expr(id),
            NodeKind::Stmt(s) => match s {
                Stmt::Block { stmts } => {
                    for &stmt in stmts {
                        self.stmt(stmt);
                        if self.found.is_some() {
                            return;
                        }
                    }
                }
                Stmt::Expr { expr } => self.expr(*expr),
                Stmt::If {
                    cond,
                    then_branch,
                    else_branch,
                } => {
                    self.expr(*cond);
                    self.stmt(*then_branch);
                    if let Some(else_branch) = else_branch {
                        self.stmt(*else_branch);
                    }
                }
                Stmt::While { cond, body } => {
                    self.expr(*cond);
                    self.stmt(*body);
                }
                Stmt::Do { body, cond } => {
                    self.stmt(*body);
                    self.expr(*cond);
                }
                Stmt::For {
                    init,
                    cond,
                    update,
                    body,
                } => {
                    for part in [init, cond, update].into_iter().flatten() {
                        self.expr(*part);
                    }
                    self.stmt(*body);
                }
                Stmt::Switch { target, body } => {
                    self.expr(*target);
                    self.stmt(*body);
                }
                Stmt::Label { value, .. } => {
                    if let Some(value) = value {
                        self.expr(*value);
                    }
                }
                Stmt::Jump { expr, .. } => {
                    if let Some(expr) = expr {
                        self.expr(*expr);
                    }
                }
                Stmt::Empty => {}
            },
        }
    }

    fn expr(&mut self, id: NodeId) {
        if self.found.is_some() || !self.contains(self.ast.span(id)) {
            return;
        }
        match self.ast.expr(id) {
            Some(Expr::Assign { lhs, rhs, .. })
            | Some(Expr::Logical { lhs, rhs, .. })
            | Some(Expr::Comparison { lhs, rhs, .. })
            | Some(Expr::Binary { lhs, rhs, .. }) => {
                self.expr(*lhs);
                self.expr(*rhs);
            }
            Some(Expr::Ternary {
                cond,
                then_branch,
                else_branch,
            }) => {
                self.expr(*cond);
                self.expr(*then_branch);
                self.expr(*else_branch);
            }
            Some(Expr::Unary { operand, .. }) | Some(Expr::Postfix { operand, .. }) => {
                self.expr(*operand);
            }
            Some(Expr::Group { inner }) => self.expr(*inner),
            Some(Expr::Call {
                callee,
                args,
                args_span,
                commas,
            }) => {
                self.expr(*callee);
                for &arg in args {
                    self.expr(arg);
                }
                // Nested calls were just visited, so the innermost one
                // holding the cursor claims the signature slot first.
                if self.call.is_none() && self.contains(*args_span) {
                    self.call = Some(id);
                    self.active_param = commas
                        .iter()
                        .take_while(|comma| !comma.is_after(self.line, self.column))
                        .count();
                }
            }
            Some(Expr::Dot { lhs, field }) => {
                self.expr(*lhs);
                if self.found.is_none() {
                    self.field(*lhs, *field);
                }
            }
            Some(Expr::Variable { name }) => {
                if !self.needle.is_empty() && name == self.needle {
                    self.found = self.variable_symbol(id, name);
                }
            }
            _ => {}
        }
    }

    fn field(&mut self, lhs: NodeId, field: NodeId) {
        let Some(Expr::Variable { name }) = self.ast.expr(field) else {
            return;
        };
        if !self.contains(self.ast.span(field)) {
            return;
        }
        // Record the member context even when the written member resolves
        // to nothing; completion fires exactly there.
        self.dot_lhs = Some(lhs);
        if !self.needle.is_empty() && name == self.needle {
            self.found = self.field_symbol(lhs, field, name);
        }
    }

    fn variable_symbol(&self, id: NodeId, name: &str) -> Option<Symbol> {
        let res = self.script.resolution()?;
        if let Some(decl) = res.binding(id) {
            return self.script.symbol_for_ref(self.ctx, decl);
        }
        self.script.dependency_symbol(self.ctx, name, false)
    }

    fn field_symbol(&self, lhs: NodeId, field: NodeId, name: &str) -> Option<Symbol> {
        let res = self.script.resolution()?;
        if let Some(decl) = res.binding(field) {
            return self.script.symbol_for_ref(self.ctx, decl);
        }
        // Unbound member, e.g. mid edit; go through the left side's type.
        let struct_name = self.ctx.type_name(res.type_of(lhs));
        let (provider, node) = self.script.find_struct(self.ctx, &struct_name)?;
        struct_fields(&provider, self.ctx, node)
            .into_iter()
            .find(|symbol| symbol.name == name)
    }

    fn type_symbol(&self, name: &str) -> Option<Symbol> {
        let (provider, node) = self.script.find_struct(self.ctx, name)?;
        provider.script().symbol_for(self.ctx, node)
    }
}

impl Script {
    /// The symbol spelled `needle` at the position. The needle guards
    /// against stale editor state; a position hit with another name there
    /// is no hit.
    pub fn locate_symbol(
        &self,
        ctx: &Context,
        needle: &str,
        line: u32,
        column: u32,
    ) -> Option<Symbol> {
        Locator::new(self, ctx, needle, line, column).run().found
    }

    /// The call whose parentheses hold the position, and which argument
    /// the position is on. Nested calls answer with the innermost one.
    pub fn signature_help(&self, ctx: &Context, line: u32, column: u32) -> Option<SignatureHelp> {
        let res = self.resolution()?;
        let locator = Locator::new(self, ctx, "", line, column).run();
        let call = locator.call?;
        let Some(Expr::Call { callee, .. }) = self.ast().expr(call) else {
            return None;
        };
        let symbol = match res.binding(*callee) {
            Some(decl) => self.symbol_for_ref(ctx, decl),
            None => match self.ast().expr(*callee) {
                Some(Expr::Variable { name }) => self.dependency_symbol(ctx, name, false),
                _ => None,
            },
        }?;
        if symbol.kind != SymbolKind::Function {
            return None;
        }
        Some(SignatureHelp {
            symbol,
            call,
            active_param: locator.active_param,
        })
    }

    /// Parameter name hints for the call arguments inside `range`. Only
    /// calls entirely inside the range report; extra arguments beyond the
    /// declared parameters get no hint.
    pub fn inlay_hints(&self, ctx: &Context, range: Span) -> Vec<InlayHint> {
        let mut hints = Vec::new();
        if self.resolution().is_none() {
            return hints;
        }
        for &decl in &self.ast().decls {
            self.hint_decl(ctx, decl, &range, &mut hints);
        }
        hints
    }

    fn hint_decl(&self, ctx: &Context, id: NodeId, range: &Span, out: &mut Vec<InlayHint>) {
        match self.ast().decl(id) {
            Some(Decl::Var(v)) => {
                if let Some(init) = v.init {
                    self.hint_expr(ctx, init, range, out);
                }
            }
            Some(Decl::List { decls }) => {
                for &decl in decls {
                    self.hint_decl(ctx, decl, range, out);
                }
            }
            Some(Decl::FuncDef { body, .. }) => self.hint_stmt(ctx, *body, range, out),
            _ => {}
        }
    }

    fn hint_stmt(&self, ctx: &Context, id: NodeId, range: &Span, out: &mut Vec<InlayHint>) {
        match &self.ast().node(id).kind {
            NodeKind::Decl(_) => self.hint_decl(ctx, id, range, out),
            NodeKind::Expr(_) => self.hint_expr(ctx, id, range, out),
            NodeKind::Stmt(s) => match s {
                Stmt::Block { stmts } => {
                    for &stmt in stmts {
                        self.hint_stmt(ctx, stmt, range, out);
                    }
                }
                Stmt::Expr { expr } => self.hint_expr(ctx, *expr, range, out),
                Stmt::If {
                    cond,
                    then_branch,
                    else_branch,
                } => {
                    self.hint_expr(ctx, *cond, range, out);
                    self.hint_stmt(ctx, *then_branch, range, out);
                    if let Some(else_branch) = else_branch {
                        self.hint_stmt(ctx, *else_branch, range, out);
                    }
                }
                Stmt::While { cond, body } => {
                    self.hint_expr(ctx, *cond, range, out);
                    self.hint_stmt(ctx, *body, range, out);
                }
                Stmt::Do { body, cond } => {
                    self.hint_stmt(ctx, *body, range, out);
                    self.hint_expr(ctx, *cond, range, out);
                }
                Stmt::For {
                    init,
                    cond,
                    update,
                    body,
                } => {
                    for part in [init, cond, update].into_iter().flatten() {
                        self.hint_expr(ctx, *part, range, out);
                    }
                    self.hint_stmt(ctx, *body, range, out);
                }
                Stmt::Switch { target, body } => {
                    self.hint_expr(ctx, *target, range, out);
                    self.hint_stmt(ctx, *body, range, out);
                }
                Stmt::Label { value, .. } => {
                    if let Some(value) = value {
                        self.hint_expr(ctx, *value, range, out);
                    }
                }
                Stmt::Jump { expr, .. } => {
                    if let Some(expr) = expr {
                        self.hint_expr(ctx, *expr, range, out);
                    }
                }
                Stmt::Empty => {}
            },
        }
    }

    fn hint_expr(&self, ctx: &Context, id: NodeId, range: &Span, out: &mut Vec<InlayHint>) {
        let ast = self.ast();
        match ast.expr(id) {
            Some(Expr::Assign { lhs, rhs, .. })
            | Some(Expr::Logical { lhs, rhs, .. })
            | Some(Expr::Comparison { lhs, rhs, .. })
            | Some(Expr::Binary { lhs, rhs, .. }) => {
                self.hint_expr(ctx, *lhs, range, out);
                self.hint_expr(ctx, *rhs, range, out);
            }
            Some(Expr::Ternary {
                cond,
                then_branch,
                else_branch,
            }) => {
                self.hint_expr(ctx, *cond, range, out);
                self.hint_expr(ctx, *then_branch, range, out);
                self.hint_expr(ctx, *else_branch, range, out);
            }
            Some(Expr::Unary { operand, .. }) | Some(Expr::Postfix { operand, .. }) => {
                self.hint_expr(ctx, *operand, range, out);
            }
            Some(Expr::Group { inner }) => self.hint_expr(ctx, *inner, range, out),
            Some(Expr::Dot { lhs, .. }) => self.hint_expr(ctx, *lhs, range, out),
            Some(Expr::Call { callee, args, .. }) => {
                if range.contains_span(&ast.span(id)) {
                    if let Some(params) = self.callee_params(ctx, *callee) {
                        for (param, &arg) in params.iter().zip(args) {
                            out.push(InlayHint {
                                label: param.clone(),
                                position: ast.span(arg).start,
                            });
                        }
                    }
                }
                for &arg in args {
                    self.hint_expr(ctx, arg, range, out);
                }
            }
            _ => {}
        }
    }

    /// Parameter names of the function a call's callee is bound to.
    fn callee_params(&self, ctx: &Context, callee: NodeId) -> Option<Vec<String>> {
        let res = self.resolution()?;
        let decl = res.binding(callee)?;
        let provider = match &decl.script {
            None => Provider::Own(self),
            Some(owner) if owner == self.name() => Provider::Own(self),
            Some(owner) => Provider::Shared(ctx.script_by_name(owner)?),
        };
        let script = provider.script();
        let ast = script.ast();
        let header = ast.func_header(decl.node)?;
        Some(
            header
                .params
                .iter()
                .filter_map(|&param| match ast.decl(param) {
                    Some(Decl::Var(v)) => Some(v.name.clone()),
                    _ => None,
                })
                .collect(),
        )
    }
}
