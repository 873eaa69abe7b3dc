//! Prefix completion over scopes, exports and struct members.
//!
//! Matching is a case sensitive prefix test and the empty prefix matches
//! everything. Results dedup by name with the innermost declaration
//! winning, so a local shadows an export of the same name the way the
//! resolver would bind it.

use crate::ast::{Decl, NodeId, NodeKind, Stmt};
use crate::context::Context;
use crate::script::Script;

use super::locate::Locator;
use super::symbols::{CompletionSet, Provider, Symbol, struct_fields};

fn matches(name: &str, prefix: &str) -> bool {
    prefix.is_empty() || name.starts_with(prefix)
}

impl Script {
    /// Exports of this script and the command script starting with
    /// `prefix`, without any position context.
    pub fn complete(&self, ctx: &Context, prefix: &str) -> CompletionSet {
        let mut out = CompletionSet::new();
        if self.resolution().is_none() {
            return out;
        }
        self.export_completions(ctx, prefix, &mut out);
        self.command_completions(ctx, prefix, &mut out);
        out
    }

    /// Completion for the scopes visible at a position: enclosing blocks
    /// and parameters first, then own exports, include exports and the
    /// command script. Inside a member access the struct's fields answer
    /// instead.
    pub fn complete_at(
        &self,
        ctx: &Context,
        prefix: &str,
        line: u32,
        column: u32,
    ) -> CompletionSet {
        let mut out = CompletionSet::new();
        if self.resolution().is_none() {
            return out;
        }
        let locator = Locator::new(self, ctx, prefix, line, column).run();
        if let Some(lhs) = locator.dot_lhs {
            for symbol in self.member_symbols(ctx, lhs) {
                if matches(&symbol.name, prefix) {
                    out.add(symbol);
                }
            }
            return out;
        }
        let mut scoped = Vec::new();
        self.scope_symbols(ctx, prefix, line, column, &mut scoped);
        // Reversed so the innermost declaration wins deduplication.
        for symbol in scoped.into_iter().rev() {
            out.add(symbol);
        }
        self.export_completions(ctx, prefix, &mut out);
        for dep in self.dependencies(ctx) {
            if let Some(script) = ctx.cached(&dep) {
                script.export_completions(ctx, prefix, &mut out);
            }
        }
        self.command_completions(ctx, prefix, &mut out);
        out
    }

    /// Members of the struct variable `lhs_name` names at the position,
    /// e.g. for `point.` before any member is typed. Unfiltered; the
    /// caller has no prefix yet.
    pub fn complete_dot(
        &self,
        ctx: &Context,
        lhs_name: &str,
        line: u32,
        column: u32,
    ) -> Vec<Symbol> {
        if self.resolution().is_none() {
            return Vec::new();
        }
        let Some((provider, node)) = self.visible_var(ctx, lhs_name, line, column) else {
            tracing::debug!(
                target: "lore::query",
                script = %self.name(),
                variable = lhs_name,
                "no declaration behind member completion"
            );
            return Vec::new();
        };
        let struct_name = match provider.script().ast().decl(node) {
            Some(Decl::Var(v)) => match &v.ty.struct_name {
                Some(name) => name.clone(),
                None => return Vec::new(),
            },
            _ => return Vec::new(),
        };
        let Some((provider, node)) = self.find_struct(ctx, &struct_name) else {
            return Vec::new();
        };
        struct_fields(&provider, ctx, node)
    }

    pub(crate) fn export_completions(&self, ctx: &Context, prefix: &str, out: &mut CompletionSet) {
        let Some(res) = self.resolution() else { return };
        for (name, &node) in res.exports.iter().chain(res.type_exports.iter()) {
            if matches(name, prefix) {
                if let Some(symbol) = self.symbol_for(ctx, node) {
                    out.add(symbol);
                }
            }
        }
    }

    fn command_completions(&self, ctx: &Context, prefix: &str, out: &mut CompletionSet) {
        if self.name() == ctx.command_name() {
            return;
        }
        let Some(command) = ctx.command_script() else { return };
        command.export_completions(ctx, prefix, out);
    }

    fn member_symbols(&self, ctx: &Context, lhs: NodeId) -> Vec<Symbol> {
        let Some(res) = self.resolution() else {
            return Vec::new();
        };
        let struct_name = ctx.type_name(res.type_of(lhs));
        let Some((provider, node)) = self.find_struct(ctx, &struct_name) else {
            return Vec::new();
        };
        struct_fields(&provider, ctx, node)
    }

    /// The declaration of variable `name` visible at the position: the
    /// enclosing scopes, then own exports, the command script and the
    /// includes.
    fn visible_var(
        &self,
        ctx: &Context,
        name: &str,
        line: u32,
        column: u32,
    ) -> Option<(Provider<'_>, NodeId)> {
        if let Some(node) = self.scope_var(name, line, column) {
            return Some((Provider::Own(self), node));
        }
        if let Some(res) = self.resolution() {
            if let Some(&node) = res.exports.get(name) {
                return Some((Provider::Own(self), node));
            }
        }
        if self.name() != ctx.command_name() {
            if let Some(command) = ctx.command_script() {
                if let Some(node) = command
                    .resolution()
                    .and_then(|r| r.exports.get(name).copied())
                {
                    return Some((Provider::Shared(command), node));
                }
            }
        }
        for dep in self.dependencies(ctx) {
            let Some(script) = ctx.cached(&dep) else { continue };
            if let Some(node) = script
                .resolution()
                .and_then(|r| r.exports.get(name).copied())
            {
                return Some((Provider::Shared(script), node));
            }
        }
        None
    }

    /// Last declaration of `name` in the blocks enclosing the position,
    /// i.e. the one the resolver would bind. Parameters count; later
    /// declarations shadow earlier ones.
    fn scope_var(&self, name: &str, line: u32, column: u32) -> Option<NodeId> {
        let ast = self.ast();
        let mut best = None;
        for &decl in &ast.decls {
            let Some(Decl::FuncDef { body, .. }) = ast.decl(decl) else {
                continue;
            };
            if !ast.span(decl).contains(line, column) {
                continue;
            }
            if let Some(f) = ast.func_header(decl) {
                for &param in &f.params {
                    if let Some(Decl::Var(v)) = ast.decl(param) {
                        if v.name == name {
                            best = Some(param);
                        }
                    }
                }
            }
            self.scope_var_in(*body, name, line, column, &mut best);
        }
        best
    }

    fn scope_var_in(
        &self,
        id: NodeId,
        name: &str,
        line: u32,
        column: u32,
        best: &mut Option<NodeId>,
    ) {
        let ast = self.ast();
        match &ast.node(id).kind {
            NodeKind::Decl(Decl::Var(v)) => {
                if ast.span(id).end.is_before(line, column) && v.name == name {
                    *best = Some(id);
                }
            }
            NodeKind::Decl(Decl::List { decls }) => {
                for &decl in decls {
                    self.scope_var_in(decl, name, line, column, best);
                }
            }
            NodeKind::Stmt(s) => {
                if !ast.span(id).contains(line, column) {
                    return;
                }
                match s {
                    Stmt::Block { stmts } => {
                        for &stmt in stmts {
                            self.scope_var_in(stmt, name, line, column, best);
                        }
                    }
                    Stmt::If {
                        then_branch,
                        else_branch,
                        ..
                    } => {
                        self.scope_var_in(*then_branch, name, line, column, best);
                        if let Some(else_branch) = else_branch {
                            self.scope_var_in(*else_branch, name, line, column, best);
                        }
                    }
                    Stmt::While { body, .. }
                    | Stmt::Do { body, .. }
                    | Stmt::For { body, .. }
                    | Stmt::Switch { body, .. } => {
                        self.scope_var_in(*body, name, line, column, best);
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }

    /// Declarations in the blocks enclosing the position that match the
    /// prefix, outermost first: parameters, then block locals already
    /// declared before the position.
    fn scope_symbols(
        &self,
        ctx: &Context,
        prefix: &str,
        line: u32,
        column: u32,
        out: &mut Vec<Symbol>,
    ) {
        let ast = self.ast();
        for &decl in &ast.decls {
            let Some(Decl::FuncDef { body, .. }) = ast.decl(decl) else {
                continue;
            };
            if !ast.span(decl).contains(line, column) {
                continue;
            }
            if let Some(f) = ast.func_header(decl) {
                for &param in &f.params {
                    if let Some(Decl::Var(v)) = ast.decl(param) {
                        if matches(&v.name, prefix) {
                            if let Some(symbol) = self.symbol_for(ctx, param) {
                                out.push(symbol);
                            }
                        }
                    }
                }
            }
            self.scope_symbols_in(ctx, *body, prefix, line, column, out);
        }
    }

    fn scope_symbols_in(
        &self,
        ctx: &Context,
        id: NodeId,
        prefix: &str,
        line: u32,
        column: u32,
        out: &mut Vec<Symbol>,
    ) {
        let ast = self.ast();
        match &ast.node(id).kind {
            NodeKind::Decl(Decl::Var(v)) => {
                if ast.span(id).end.is_before(line, column) && matches(&v.name, prefix) {
                    if let Some(symbol) = self.symbol_for(ctx, id) {
                        out.push(symbol);
                    }
                }
            }
            NodeKind::Decl(Decl::List { decls }) => {
                for &decl in decls {
                    self.scope_symbols_in(ctx, decl, prefix, line, column, out);
                }
            }
            NodeKind::Stmt(s) => {
                if !ast.span(id).contains(line, column) {
                    return;
                }
                match s {
                    Stmt::Block { stmts } => {
                        for &stmt in stmts {
                            self.scope_symbols_in(ctx, stmt, prefix, line, column, out);
                        }
                    }
                    Stmt::If {
                        then_branch,
                        else_branch,
                        ..
                    } => {
                        self.scope_symbols_in(ctx, *then_branch, prefix, line, column, out);
                        if let Some(else_branch) = else_branch {
                            self.scope_symbols_in(ctx, *else_branch, prefix, line, column, out);
                        }
                    }
                    Stmt::While { body, .. }
                    | Stmt::Do { body, .. }
                    | Stmt::For { body, .. }
                    | Stmt::Switch { body, .. } => {
                        self.scope_symbols_in(ctx, *body, prefix, line, column, out);
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }
}
