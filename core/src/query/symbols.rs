//! Symbol descriptions shared by the editor queries.
//!
//! Queries answer in [`Symbol`]s: a declaration described with its kind,
//! type, source view and doc comment, plus a [`DeclRef`] pointing back
//! into the owning script's arena. Everything here is built on demand
//! from the resolution tables; nothing is precomputed or cached.

use std::sync::Arc;

use serde::Serialize;

use crate::ast::{Decl, NodeId, VarRole};
use crate::context::Context;
use crate::resolve::DeclRef;
use crate::script::Script;
use crate::token::Position;
use crate::util::FastHashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Variable,
    Function,
    Type,
    Param,
    Field,
}

/// One declaration, described for an editor.
#[derive(Debug, Clone, Serialize)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    /// Declared type; the return type for functions, the struct itself
    /// for type symbols.
    pub type_name: String,
    /// Source text of the declaration, header only for function
    /// definitions.
    pub view: String,
    /// Comment block ending on the declaration line or the line above.
    pub doc: String,
    /// Script the declaration lives in.
    pub provider: String,
    pub decl: DeclRef,
}

/// Completion results, deduplicated by name. The first symbol added under
/// a name wins, so callers add the innermost scope first.
#[derive(Debug, Default, Serialize)]
pub struct CompletionSet {
    symbols: Vec<Symbol>,
    #[serde(skip)]
    seen: FastHashSet<String>,
}

impl CompletionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, symbol: Symbol) {
        if self.seen.insert(symbol.name.clone()) {
            self.symbols.push(symbol);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.seen.contains(name)
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn into_vec(self) -> Vec<Symbol> {
        self.symbols
    }
}

/// The call under the cursor, for a signature popup.
#[derive(Debug, Clone, Serialize)]
pub struct SignatureHelp {
    /// The called function.
    pub symbol: Symbol,
    /// Call node in the asking script's arena.
    pub call: NodeId,
    /// Argument the cursor sits on, counted from zero.
    pub active_param: usize,
}

/// Parameter name label shown before a call argument.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InlayHint {
    pub label: String,
    pub position: Position,
}

/// A script reached while answering a query: the asking script borrowed,
/// anything else shared out of the cache.
pub(crate) enum Provider<'a> {
    Own(&'a Script),
    Shared(Arc<Script>),
}

impl Provider<'_> {
    pub(crate) fn script(&self) -> &Script {
        match self {
            Provider::Own(script) => script,
            Provider::Shared(script) => script,
        }
    }
}

/// Field declarations of a struct node, described as symbols.
pub(crate) fn struct_fields(provider: &Provider<'_>, ctx: &Context, node: NodeId) -> Vec<Symbol> {
    let script = provider.script();
    let Some(Decl::Struct { fields, .. }) = script.ast().decl(node) else {
        return Vec::new();
    };
    fields
        .iter()
        .filter_map(|&field| script.symbol_for(ctx, field))
        .collect()
}

impl Script {
    /// Editor description of declaration node `id` in this script's
    /// arena. `None` for nodes that are not declarations and for scripts
    /// that never resolved.
    pub(crate) fn symbol_for(&self, ctx: &Context, id: NodeId) -> Option<Symbol> {
        let ast = self.ast();
        let res = self.resolution()?;
        let decl = ast.decl(id)?;
        let (name, kind) = match decl {
            Decl::Var(v) => (
                v.name.clone(),
                match v.role {
                    VarRole::Param => SymbolKind::Param,
                    VarRole::Field => SymbolKind::Field,
                    _ => SymbolKind::Variable,
                },
            ),
            Decl::Func(f) => (f.name.clone(), SymbolKind::Function),
            Decl::FuncDef { .. } => (ast.func_header(id)?.name.clone(), SymbolKind::Function),
            Decl::Struct { name, .. } => (name.clone(), SymbolKind::Type),
            Decl::List { .. } => return None,
        };
        let view_span = match decl {
            Decl::FuncDef { decl: header, .. } => ast.span(*header),
            _ => ast.span(id),
        };
        let doc = ast
            .find_comment(ast.span(id).start.line)
            .map(|c| c.text.clone())
            .unwrap_or_default();
        Some(Symbol {
            name,
            kind,
            type_name: ctx.type_name(res.type_of(id)),
            view: self.view_of(view_span).to_string(),
            doc,
            provider: self.name().to_string(),
            decl: DeclRef {
                script: Some(self.name().to_string()),
                node: id,
            },
        })
    }

    /// Follows a binding to the script that owns it and describes the
    /// declaration there.
    pub(crate) fn symbol_for_ref(&self, ctx: &Context, decl: &DeclRef) -> Option<Symbol> {
        match &decl.script {
            None => self.symbol_for(ctx, decl.node),
            Some(owner) if owner == self.name() => self.symbol_for(ctx, decl.node),
            Some(owner) => ctx.script_by_name(owner)?.symbol_for(ctx, decl.node),
        }
    }

    /// Exported declaration by name; `is_type` switches to the struct
    /// table.
    pub fn locate_export(&self, ctx: &Context, name: &str, is_type: bool) -> Option<Symbol> {
        let res = self.resolution()?;
        let table = if is_type { &res.type_exports } else { &res.exports };
        self.symbol_for(ctx, *table.get(name)?)
    }

    /// Export lookup across everything this script sees beyond its own
    /// scope: the command script first, then the includes, transitively.
    pub(crate) fn dependency_symbol(
        &self,
        ctx: &Context,
        name: &str,
        is_type: bool,
    ) -> Option<Symbol> {
        if self.name() != ctx.command_name() {
            if let Some(command) = ctx.command_script() {
                if let Some(symbol) = command.locate_export(ctx, name, is_type) {
                    return Some(symbol);
                }
            }
        }
        for dep in self.dependencies(ctx) {
            let Some(script) = ctx.cached(&dep) else { continue };
            if let Some(symbol) = script.locate_export(ctx, name, is_type) {
                return Some(symbol);
            }
        }
        None
    }

    /// The struct declaration `name` refers to from this script: own
    /// types first, then the command script, then includes.
    pub(crate) fn find_struct<'a>(
        &'a self,
        ctx: &Context,
        name: &str,
    ) -> Option<(Provider<'a>, NodeId)> {
        if let Some(res) = self.resolution() {
            if let Some(&node) = res.type_exports.get(name) {
                return Some((Provider::Own(self), node));
            }
        }
        if self.name() != ctx.command_name() {
            if let Some(command) = ctx.command_script() {
                if let Some(node) = command
                    .resolution()
                    .and_then(|r| r.type_exports.get(name).copied())
                {
                    return Some((Provider::Shared(command), node));
                }
            }
        }
        for dep in self.dependencies(ctx) {
            let Some(script) = ctx.cached(&dep) else { continue };
            if let Some(node) = script
                .resolution()
                .and_then(|r| r.type_exports.get(name).copied())
            {
                return Some((Provider::Shared(script), node));
            }
        }
        None
    }
}
