//! Two-pass name and type resolution.
//!
//! Pass one hoists every top-level declaration into the script's export
//! tables, so a body may call a function defined further down the file.
//! Pass two walks the declarations in source order with a lexical scope
//! stack, binding identifier uses to their declarations and computing a
//! type for every expression node. Findings land in a [`Resolution`]
//! indexed by the arena's node ids; the AST itself is never mutated.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;

use crate::ast::{Ast, Decl, Expr, FunctionDecl, Literal, NodeId, NodeKind, Stmt, VarDecl, VarRole};
use crate::diag::Diagnostics;
use crate::token::{Span, TokenKind};
use crate::types::{TypeId, TypeTable, binary_result, comparison_ok, is_convertible, unary_result};
use crate::util::{FastHashMap, fast_hash_map_new};

/// Reference to a declaration, possibly in another script's arena.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DeclRef {
    /// `None` for the script being resolved, otherwise the owning script.
    pub script: Option<String>,
    pub node: NodeId,
}

/// Everything the resolver may see of an already resolved dependency.
#[derive(Debug, Clone, Copy)]
pub struct DepView<'a> {
    pub name: &'a str,
    pub ast: &'a Ast,
    pub resolution: &'a Resolution,
}

/// Output of one resolve run over one script.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Type per arena node, indexed by [`NodeId`]. Statements are `void`,
    /// nodes that failed to resolve keep [`TypeId::INVALID`].
    pub node_types: Vec<TypeId>,
    /// Identifier use sites and call targets, bound to their declarations.
    pub bindings: FastHashMap<NodeId, DeclRef>,
    /// Top level functions and variables, by name. A prototype paired with
    /// its definition appears once, as the definition.
    pub exports: FastHashMap<String, NodeId>,
    /// Top level struct declarations, by name.
    pub type_exports: FastHashMap<String, NodeId>,
}

impl Resolution {
    pub fn type_of(&self, id: NodeId) -> TypeId {
        self.node_types
            .get(id.index())
            .copied()
            .unwrap_or(TypeId::INVALID)
    }

    pub fn binding(&self, id: NodeId) -> Option<&DeclRef> {
        self.bindings.get(&id)
    }
}

/// Longest chain of `const` initializers the folder will follow before it
/// gives up; cuts off mutually recursive initializers.
const MAX_CONST_CHAIN: u32 = 32;

#[derive(Debug, Clone, Copy)]
struct ScopeEntry {
    node: NodeId,
    /// False between declaration and the end of the initializer.
    ready: bool,
}

#[derive(Debug)]
struct Hit {
    decl: DeclRef,
    ty: TypeId,
    ready: bool,
}

#[derive(Debug)]
struct CallInfo {
    ret: TypeId,
    /// Parameter type and whether the parameter carries a default value.
    params: Vec<(TypeId, bool)>,
}

/// Values the constant folder understands; covers case labels and default
/// parameter values.
#[derive(Debug, Clone, PartialEq)]
enum ConstValue {
    Int(i64),
    Float(f32),
    Str(String),
    ObjectInvalid,
    ObjectSelf,
}

pub struct Resolver<'a> {
    script: &'a str,
    ast: &'a Ast,
    diags: &'a mut Diagnostics,
    types: &'a mut TypeTable,
    deps: &'a [DepView<'a>],
    command: Option<DepView<'a>>,
    cancel: Option<&'a AtomicBool>,

    out: Resolution,
    /// Lexical scope stack; frame 0 is file scope and fills up as the
    /// top level is walked.
    scopes: Vec<FastHashMap<String, ScopeEntry>>,
    loop_depth: u32,
    switch_depth: u32,
    /// Name and return type of the function whose body is being walked.
    current_fn: Option<(&'a str, TypeId)>,
}

impl<'a> Resolver<'a> {
    pub fn new(
        script: &'a str,
        ast: &'a Ast,
        types: &'a mut TypeTable,
        diags: &'a mut Diagnostics,
    ) -> Self {
        Self {
            script,
            ast,
            diags,
            types,
            deps: &[],
            command: None,
            cancel: None,
            out: Resolution::default(),
            scopes: vec![fast_hash_map_new()],
            loop_depth: 0,
            switch_depth: 0,
            current_fn: None,
        }
    }

    /// Resolved include scripts, in include order. Lookup prefers the
    /// latest include.
    pub fn with_deps(mut self, deps: &'a [DepView<'a>]) -> Self {
        self.deps = deps;
        self
    }

    /// The command script, consulted after every other scope.
    pub fn with_command(mut self, command: DepView<'a>) -> Self {
        self.command = Some(command);
        self
    }

    pub fn with_cancel(mut self, cancel: &'a AtomicBool) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Runs both passes. Returns `None` when the cancellation flag was
    /// raised; the script then counts as never resolved.
    pub fn resolve(mut self) -> Option<Resolution> {
        let ast = self.ast;
        tracing::debug!(
            target: "lore::resolve",
            script = %self.script,
            decls = ast.decls.len(),
            "resolve start"
        );
        self.out.node_types = vec![TypeId::INVALID; ast.len()];
        for &id in &ast.decls {
            if self.cancelled() {
                return None;
            }
            self.hoist(id);
        }
        for &id in &ast.decls {
            if self.cancelled() {
                return None;
            }
            self.top_level(id);
        }
        Some(self.out)
    }

    fn cancelled(&self) -> bool {
        self.cancel.is_some_and(|c| c.load(Ordering::Relaxed))
    }

    fn semantic_error(&mut self, message: impl Into<String>, span: Span) {
        self.diags.semantic(self.script, message, false, span);
    }

    fn semantic_warning(&mut self, message: impl Into<String>, span: Span) {
        self.diags.semantic(self.script, message, true, span);
    }

    // ---------------- Pass one: hoisting ----------------

    fn hoist(&mut self, id: NodeId) {
        let ast = self.ast;
        match &ast.node(id).kind {
            NodeKind::Decl(Decl::Func(f)) => {
                self.type_function(id, f);
                self.export_value(&f.name, f.name_span, id);
            }
            NodeKind::Decl(Decl::FuncDef { decl, .. }) => {
                let header = *decl;
                if let Some(f) = ast.func_header(id) {
                    self.type_function(header, f);
                    self.out.node_types[id.index()] = self.out.type_of(header);
                    self.export_definition(f, id, header);
                }
            }
            NodeKind::Decl(Decl::Var(v)) => {
                let ty = self.types.of_spec(&v.ty);
                self.out.node_types[id.index()] = ty;
                self.export_value(&v.name, v.name_span, id);
            }
            NodeKind::Decl(Decl::List { decls }) => {
                for &child in decls {
                    if let Some(Decl::Var(v)) = ast.decl(child) {
                        let ty = self.types.of_spec(&v.ty);
                        self.out.node_types[child.index()] = ty;
                        self.export_value(&v.name, v.name_span, child);
                    }
                }
            }
            NodeKind::Decl(Decl::Struct {
                name,
                name_span,
                fields,
            }) => {
                let ty = self.types.register(name);
                self.out.node_types[id.index()] = ty;
                for &field in fields {
                    if let Some(Decl::Var(v)) = ast.decl(field) {
                        let fty = self.types.of_spec(&v.ty);
                        self.out.node_types[field.index()] = fty;
                    }
                }
                self.export_type(name, *name_span, id);
            }
            // Recovery placeholders.
            _ => {}
        }
    }

    /// Types a function header and its parameters.
    fn type_function(&mut self, header: NodeId, f: &'a FunctionDecl) {
        let ast = self.ast;
        let ret = self.types.of_spec(&f.ty);
        self.out.node_types[header.index()] = ret;
        for &param in &f.params {
            if let Some(Decl::Var(v)) = ast.decl(param) {
                let ty = self.types.of_spec(&v.ty);
                self.out.node_types[param.index()] = ty;
            }
        }
    }

    fn export_value(&mut self, name: &str, name_span: Span, id: NodeId) {
        if self.out.exports.contains_key(name) {
            self.semantic_error(
                format!("declaring '{name}' in the same scope twice"),
                name_span,
            );
            return;
        }
        self.out.exports.insert(name.to_string(), id);
    }

    /// Exports a function definition. A prototype already exported under
    /// the same name is paired with it, and the definition wins.
    fn export_definition(&mut self, f: &'a FunctionDecl, def: NodeId, header: NodeId) {
        let ast = self.ast;
        match self.out.exports.get(f.name.as_str()).copied() {
            Some(existing) if matches!(ast.decl(existing), Some(Decl::Func(_))) => {
                self.check_pairing(existing, header, f);
                self.out.exports.insert(f.name.clone(), def);
            }
            Some(_) => {
                self.semantic_error(
                    format!("declaring '{}' in the same scope twice", f.name),
                    f.name_span,
                );
            }
            None => {
                self.out.exports.insert(f.name.clone(), def);
            }
        }
    }

    fn export_type(&mut self, name: &str, name_span: Span, id: NodeId) {
        if self.out.type_exports.contains_key(name) {
            self.semantic_error(
                format!("declaring '{name}' in the same scope twice"),
                name_span,
            );
            return;
        }
        self.out.type_exports.insert(name.to_string(), id);
    }

    /// Compares a function definition header against the prototype it
    /// pairs with. Return type, parameter count, parameter types and
    /// default values must agree; a renamed parameter is only a warning.
    fn check_pairing(&mut self, proto: NodeId, header: NodeId, def: &'a FunctionDecl) {
        let ast = self.ast;
        let Some(Decl::Func(proto_fn)) = ast.decl(proto) else {
            return;
        };

        let proto_ret = self.out.type_of(proto);
        let def_ret = self.out.type_of(header);
        if proto_ret != def_ret {
            self.semantic_error(
                format!(
                    "definition of '{}': return type '{}' does not match '{}'",
                    def.name,
                    self.types.name_of(def_ret),
                    self.types.name_of(proto_ret)
                ),
                def.name_span,
            );
        }

        if proto_fn.params.len() != def.params.len() {
            self.semantic_error(
                format!(
                    "definition of '{}': expected {} parameters, got {}",
                    def.name,
                    proto_fn.params.len(),
                    def.params.len()
                ),
                def.name_span,
            );
            return;
        }

        for (i, (&pp, &dp)) in proto_fn.params.iter().zip(def.params.iter()).enumerate() {
            let (Some(Decl::Var(pv)), Some(Decl::Var(dv))) = (ast.decl(pp), ast.decl(dp)) else {
                continue;
            };
            let pt = self.out.type_of(pp);
            let dt = self.out.type_of(dp);
            if pt != dt {
                self.semantic_error(
                    format!(
                        "definition of '{}': parameter {} type '{}' does not match '{}'",
                        def.name,
                        i + 1,
                        self.types.name_of(dt),
                        self.types.name_of(pt)
                    ),
                    dv.name_span,
                );
            }
            if pv.name != dv.name {
                self.semantic_warning(
                    format!(
                        "definition of '{}': parameter {} renamed from '{}' to '{}'",
                        def.name,
                        i + 1,
                        pv.name,
                        dv.name
                    ),
                    dv.name_span,
                );
            }
            if !self.defaults_match(pv, dv) {
                self.semantic_error(
                    format!(
                        "definition of '{}': parameter '{}' default value does not match",
                        def.name, dv.name
                    ),
                    dv.name_span,
                );
            }
        }
    }

    /// Default values compare by constant folding; two defaults neither of
    /// which folds are taken as matching.
    fn defaults_match(&self, proto: &VarDecl, def: &VarDecl) -> bool {
        match (proto.init, def.init) {
            (None, None) => true,
            (Some(p), Some(d)) => {
                let pv = self.fold_const(None, p, 0);
                let dv = self.fold_const(None, d, 0);
                match (pv, dv) {
                    (Some(a), Some(b)) => a == b,
                    (None, None) => true,
                    _ => false,
                }
            }
            _ => false,
        }
    }

    // ---------------- Pass two: bodies ----------------

    fn top_level(&mut self, id: NodeId) {
        let ast = self.ast;
        match &ast.node(id).kind {
            NodeKind::Decl(Decl::Var(v)) => self.var_decl(id, v),
            NodeKind::Decl(Decl::List { decls }) => {
                for &child in decls {
                    if let Some(Decl::Var(v)) = ast.decl(child) {
                        self.var_decl(child, v);
                    }
                }
                self.out.node_types[id.index()] = TypeId::VOID;
            }
            NodeKind::Decl(Decl::Func(f)) => self.function_decl(f),
            NodeKind::Decl(Decl::FuncDef { decl, body }) => self.function_def(*decl, *body),
            NodeKind::Decl(Decl::Struct { fields, .. }) => self.struct_decl(fields),
            NodeKind::Stmt(_) => {
                // Recovery placeholder left by the parser.
                self.out.node_types[id.index()] = TypeId::VOID;
            }
            NodeKind::Expr(_) => {}
        }
    }

    /// A variable declaration, top level or in a body. Declaration is two
    /// phase: the name is visible but not ready while its own initializer
    /// is resolved.
    fn var_decl(&mut self, id: NodeId, v: &'a VarDecl) {
        let ty = self.types.of_spec(&v.ty);
        self.out.node_types[id.index()] = ty;

        if ty == TypeId::VOID {
            self.semantic_error("variable declaration with void type", v.ty.span);
        }
        if v.ty.is_const && v.init.is_none() && v.role != VarRole::Param {
            self.semantic_error(
                "constant variable declaration with no initializer",
                v.name_span,
            );
        }

        if !self.declare(&v.name, id) && v.role != VarRole::Global {
            // Top level duplicates were already reported while hoisting.
            self.semantic_error(
                format!("declaring '{}' in the same scope twice", v.name),
                v.name_span,
            );
        }
        if let Some(init) = v.init {
            let init_ty = self.visit_expr(init);
            self.define(&v.name);
            if ty.is_valid() && init_ty.is_valid() && !is_convertible(init_ty, ty) {
                self.semantic_error("mismatched types in variable initializer", v.name_span);
            }
        } else {
            self.define(&v.name);
        }
    }

    fn param_decl(&mut self, id: NodeId) {
        let ast = self.ast;
        if let Some(Decl::Var(v)) = ast.decl(id) {
            self.var_decl(id, v);
        }
    }

    /// A bare prototype. Parameters are walked in a throwaway scope so
    /// duplicate names and bad defaults still surface.
    fn function_decl(&mut self, f: &'a FunctionDecl) {
        self.begin_scope();
        for &param in &f.params {
            self.param_decl(param);
        }
        self.end_scope();
    }

    fn function_def(&mut self, header: NodeId, body: NodeId) {
        let ast = self.ast;
        let Some(Decl::Func(f)) = ast.decl(header) else {
            return;
        };
        let ret = self.out.type_of(header);

        self.current_fn = Some((f.name.as_str(), ret));
        self.begin_scope();
        for &param in &f.params {
            self.param_decl(param);
        }
        self.visit_stmt(body);
        self.end_scope();
        self.current_fn = None;

        if ret.is_valid() && ret != TypeId::VOID && !self.always_returns(body) {
            self.semantic_error(
                format!("function '{}': not all control paths return a value", f.name),
                f.name_span,
            );
        }
    }

    fn struct_decl(&mut self, fields: &'a [NodeId]) {
        let ast = self.ast;
        self.begin_scope();
        for &field in fields {
            let Some(Decl::Var(v)) = ast.decl(field) else {
                continue;
            };
            let ty = self.types.of_spec(&v.ty);
            self.out.node_types[field.index()] = ty;
            if v.ty.is_const {
                self.semantic_error("struct field cannot be 'const'", v.ty.span);
            }
            if ty == TypeId::VOID {
                self.semantic_error("struct field cannot be 'void'", v.ty.span);
            }
            if let Some(init) = v.init {
                self.visit_expr(init);
                self.semantic_error("struct field cannot have an initializer", ast.span(init));
            }
            if !self.declare(&v.name, field) {
                self.semantic_error(
                    format!("declaring '{}' in the same scope twice", v.name),
                    v.name_span,
                );
            }
            self.define(&v.name);
        }
        self.end_scope();
    }

    // ---------------- Scopes ----------------

    fn begin_scope(&mut self) {
        self.scopes.push(fast_hash_map_new());
    }

    fn end_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    /// Declares `name` in the innermost frame, not yet ready. False when
    /// the frame already holds the name; the first declaration wins.
    fn declare(&mut self, name: &str, node: NodeId) -> bool {
        let Some(frame) = self.scopes.last_mut() else {
            return false;
        };
        if frame.contains_key(name) {
            return false;
        }
        frame.insert(name.to_string(), ScopeEntry { node, ready: false });
        true
    }

    fn define(&mut self, name: &str) {
        if let Some(entry) = self.scopes.last_mut().and_then(|f| f.get_mut(name)) {
            entry.ready = true;
        }
    }

    /// Innermost frame outwards, then own exports, then includes with the
    /// latest first, then the command script.
    fn lookup(&self, name: &str) -> Option<Hit> {
        for frame in self.scopes.iter().rev() {
            if let Some(entry) = frame.get(name) {
                return Some(Hit {
                    decl: DeclRef {
                        script: None,
                        node: entry.node,
                    },
                    ty: self.out.type_of(entry.node),
                    ready: entry.ready,
                });
            }
        }
        if let Some(&node) = self.out.exports.get(name) {
            return Some(Hit {
                decl: DeclRef { script: None, node },
                ty: self.out.type_of(node),
                ready: true,
            });
        }
        for dep in self.deps.iter().rev() {
            if let Some(&node) = dep.resolution.exports.get(name) {
                return Some(Hit {
                    decl: DeclRef {
                        script: Some(dep.name.to_string()),
                        node,
                    },
                    ty: dep.resolution.type_of(node),
                    ready: true,
                });
            }
        }
        if let Some(cmd) = self.command {
            if let Some(&node) = cmd.resolution.exports.get(name) {
                return Some(Hit {
                    decl: DeclRef {
                        script: Some(cmd.name.to_string()),
                        node,
                    },
                    ty: cmd.resolution.type_of(node),
                    ready: true,
                });
            }
        }
        None
    }

    /// The arena a cross script binding points into.
    fn arena_of(&self, decl: &DeclRef) -> Option<&'a Ast> {
        match &decl.script {
            None => Some(self.ast),
            Some(script) => self
                .deps
                .iter()
                .find(|d| d.name == script)
                .map(|d| d.ast)
                .or_else(|| {
                    self.command
                        .filter(|c| c.name == script.as_str())
                        .map(|c| c.ast)
                }),
        }
    }

    // ---------------- Statements ----------------

    fn visit_stmt(&mut self, id: NodeId) {
        let ast = self.ast;
        match &ast.node(id).kind {
            NodeKind::Stmt(s) => match s {
                Stmt::Block { stmts } => {
                    self.begin_scope();
                    for &stmt in stmts {
                        self.visit_stmt(stmt);
                    }
                    self.end_scope();
                }
                Stmt::Expr { expr } => {
                    self.visit_expr(*expr);
                }
                Stmt::If {
                    cond,
                    then_branch,
                    else_branch,
                } => {
                    self.int_condition(*cond);
                    self.visit_stmt(*then_branch);
                    if let Some(else_branch) = else_branch {
                        self.visit_stmt(*else_branch);
                    }
                }
                Stmt::While { cond, body } => {
                    self.int_condition(*cond);
                    self.loop_depth += 1;
                    self.visit_stmt(*body);
                    self.loop_depth -= 1;
                }
                Stmt::Do { body, cond } => {
                    self.loop_depth += 1;
                    self.visit_stmt(*body);
                    self.loop_depth -= 1;
                    self.int_condition(*cond);
                }
                Stmt::For {
                    init,
                    cond,
                    update,
                    body,
                } => {
                    if let Some(init) = init {
                        self.visit_expr(*init);
                    }
                    if let Some(cond) = cond {
                        self.int_condition(*cond);
                    }
                    if let Some(update) = update {
                        self.visit_expr(*update);
                    }
                    self.loop_depth += 1;
                    self.visit_stmt(*body);
                    self.loop_depth -= 1;
                }
                Stmt::Switch { target, body } => {
                    self.int_condition(*target);
                    self.switch_depth += 1;
                    self.visit_stmt(*body);
                    self.switch_depth -= 1;
                }
                Stmt::Label { kind, value } => self.label(id, *kind, *value),
                Stmt::Jump { kind, expr } => self.jump(id, *kind, *expr),
                Stmt::Empty => {}
            },
            NodeKind::Decl(d) => match d {
                Decl::Var(v) => {
                    self.var_decl(id, v);
                    return;
                }
                Decl::List { decls } => {
                    for &child in decls {
                        if let Some(Decl::Var(v)) = ast.decl(child) {
                            self.var_decl(child, v);
                        }
                    }
                }
                Decl::Struct { name_span, .. } => {
                    self.semantic_error("struct declaration only allowed at file scope", *name_span);
                }
                Decl::Func(f) => {
                    self.semantic_error(
                        "function declaration only allowed at file scope",
                        f.name_span,
                    );
                }
                Decl::FuncDef { decl, .. } => {
                    let span = ast
                        .func_header(id)
                        .map(|f| f.name_span)
                        .unwrap_or_else(|| ast.span(*decl));
                    self.semantic_error("function declaration only allowed at file scope", span);
                }
            },
            NodeKind::Expr(_) => {
                self.visit_expr(id);
                return;
            }
        }
        self.out.node_types[id.index()] = TypeId::VOID;
    }

    fn int_condition(&mut self, cond: NodeId) {
        let ty = self.visit_expr(cond);
        if ty.is_valid() && ty != TypeId::INT {
            self.semantic_error("could not convert value to integer bool", self.ast.span(cond));
        }
    }

    fn label(&mut self, id: NodeId, kind: TokenKind, value: Option<NodeId>) {
        let ast = self.ast;
        if self.switch_depth == 0 {
            let message = match kind {
                TokenKind::Case => "case statement not within switch",
                _ => "default statement not within switch",
            };
            self.semantic_error(message, ast.span(id));
        }
        if let Some(value) = value {
            self.visit_expr(value);
            match self.fold_const(None, value, 0) {
                None => {
                    self.semantic_error(
                        "case expression must be constant expression",
                        ast.span(value),
                    );
                }
                Some(ConstValue::Int(_)) => {}
                Some(_) => {
                    self.semantic_error(
                        "case expression must be an integer constant",
                        ast.span(value),
                    );
                }
            }
        }
    }

    fn jump(&mut self, id: NodeId, kind: TokenKind, expr: Option<NodeId>) {
        let ast = self.ast;
        match kind {
            TokenKind::Return => {
                let value_ty = expr.map(|e| (e, self.visit_expr(e)));
                let Some((name, ret)) = self.current_fn else {
                    return;
                };
                match value_ty {
                    Some((value, ty)) => {
                        if ret == TypeId::VOID {
                            self.semantic_error(
                                format!("void function '{name}' should not return a value"),
                                ast.span(id),
                            );
                        } else if ret.is_valid() && ty.is_valid() && !is_convertible(ty, ret) {
                            self.semantic_error(
                                "mismatched types in return statement",
                                ast.span(value),
                            );
                        }
                    }
                    None => {
                        if ret.is_valid() && ret != TypeId::VOID {
                            self.semantic_error(
                                format!("non-void function '{name}' must return a value"),
                                ast.span(id),
                            );
                        }
                    }
                }
            }
            TokenKind::Break => {
                if self.loop_depth == 0 && self.switch_depth == 0 {
                    self.semantic_error("break statement not within loop or switch", ast.span(id));
                }
            }
            TokenKind::Continue => {
                if self.loop_depth == 0 {
                    self.semantic_error("continue statement not within a loop", ast.span(id));
                }
            }
            _ => {}
        }
    }

    /// Whether a statement returns on every control path. Conservative:
    /// loops and switches never count, an `if` needs both branches.
    fn always_returns(&self, id: NodeId) -> bool {
        match self.ast.stmt(id) {
            Some(Stmt::Block { stmts }) => stmts.iter().any(|&s| self.always_returns(s)),
            Some(Stmt::If {
                then_branch,
                else_branch: Some(else_branch),
                ..
            }) => self.always_returns(*then_branch) && self.always_returns(*else_branch),
            Some(Stmt::Jump {
                kind: TokenKind::Return,
                ..
            }) => true,
            _ => false,
        }
    }

    // ---------------- Expressions ----------------

    fn visit_expr(&mut self, id: NodeId) -> TypeId {
        let ast = self.ast;
        let Some(e) = ast.expr(id) else {
            return TypeId::INVALID;
        };
        let ty = match e {
            Expr::Literal(l) => match l {
                Literal::Int(_) => TypeId::INT,
                Literal::Float(_) => TypeId::FLOAT,
                Literal::Str(_) => TypeId::STRING,
                Literal::ObjectInvalid | Literal::ObjectSelf => TypeId::OBJECT,
            },
            Expr::LiteralVector { .. } => TypeId::VECTOR,
            Expr::Group { inner } => self.visit_expr(*inner),
            Expr::Variable { name } => self.variable(id, name),
            Expr::Unary { op, operand } => match op {
                TokenKind::PlusPlus | TokenKind::MinusMinus => self.crement(id, *op, *operand),
                _ => self.unary(id, *op, *operand),
            },
            Expr::Postfix { operand, op } => self.crement(id, *op, *operand),
            Expr::Binary { lhs, op, rhs } => self.binary(id, *lhs, *op, *rhs),
            Expr::Comparison { lhs, op, rhs } => self.comparison(id, *lhs, *op, *rhs),
            Expr::Logical { lhs, rhs, .. } => self.logical(*lhs, *rhs),
            Expr::Ternary {
                cond,
                then_branch,
                else_branch,
            } => self.ternary(id, *cond, *then_branch, *else_branch),
            Expr::Assign { lhs, op, rhs } => self.assign(id, *lhs, *op, *rhs),
            Expr::Dot { lhs, field } => self.dot(*lhs, *field),
            Expr::Call { callee, args, .. } => self.call(id, *callee, args),
            Expr::Empty => TypeId::INVALID,
        };
        self.out.node_types[id.index()] = ty;
        ty
    }

    fn variable(&mut self, id: NodeId, name: &'a str) -> TypeId {
        match self.lookup(name) {
            Some(hit) => {
                if !hit.ready {
                    self.semantic_error(
                        format!("using declared variable '{name}' in its own initializer"),
                        self.ast.span(id),
                    );
                }
                self.out.bindings.insert(id, hit.decl);
                hit.ty
            }
            None => {
                self.semantic_error(
                    format!("unable to resolve identifier '{name}'"),
                    self.ast.span(id),
                );
                TypeId::INVALID
            }
        }
    }

    fn unary(&mut self, id: NodeId, op: TokenKind, operand: NodeId) -> TypeId {
        let ty = self.visit_expr(operand);
        if !ty.is_valid() {
            return TypeId::INVALID;
        }
        match unary_result(op, ty) {
            Some(result) => result,
            None => {
                self.semantic_error(
                    format!(
                        "invalid operand of type '{}' to {}",
                        self.types.name_of(ty),
                        op.describe()
                    ),
                    self.ast.span(id),
                );
                TypeId::INVALID
            }
        }
    }

    /// Prefix and postfix `++`/`--`: an int lvalue, not constant.
    fn crement(&mut self, id: NodeId, op: TokenKind, operand: NodeId) -> TypeId {
        let ty = self.visit_expr(operand);
        let ast = self.ast;
        let span = ast.span(id);
        let Some(root) = self.lvalue_root(operand) else {
            if !matches!(ast.expr(operand), Some(Expr::Empty)) {
                self.semantic_error(format!("{} requires an int lvalue", op.describe()), span);
            }
            return TypeId::INVALID;
        };
        let mut ok = true;
        if let Some((name, is_const, is_func)) = self.root_decl_facts(root) {
            if is_const {
                self.semantic_error(format!("cannot modify constant '{name}'"), span);
                ok = false;
            } else if is_func {
                self.semantic_error(format!("{} requires an int lvalue", op.describe()), span);
                ok = false;
            }
        }
        if ty.is_valid() && ty != TypeId::INT {
            self.semantic_error(format!("{} requires an int lvalue", op.describe()), span);
            ok = false;
        }
        if ok && ty.is_valid() { TypeId::INT } else { TypeId::INVALID }
    }

    fn binary(&mut self, id: NodeId, lhs: NodeId, op: TokenKind, rhs: NodeId) -> TypeId {
        let lt = self.visit_expr(lhs);
        let rt = self.visit_expr(rhs);
        if !lt.is_valid() || !rt.is_valid() {
            return TypeId::INVALID;
        }
        match binary_result(op, lt, rt) {
            Some(result) => result,
            None => {
                self.semantic_error("mismatched types in binary-expression", self.ast.span(id));
                TypeId::INVALID
            }
        }
    }

    fn comparison(&mut self, id: NodeId, lhs: NodeId, op: TokenKind, rhs: NodeId) -> TypeId {
        let lt = self.visit_expr(lhs);
        let rt = self.visit_expr(rhs);
        if !lt.is_valid() || !rt.is_valid() {
            return TypeId::INVALID;
        }
        if comparison_ok(op, lt, rt) {
            TypeId::INT
        } else {
            self.semantic_error("mismatched types in binary-expression", self.ast.span(id));
            TypeId::INVALID
        }
    }

    fn logical(&mut self, lhs: NodeId, rhs: NodeId) -> TypeId {
        let lt = self.visit_expr(lhs);
        let rt = self.visit_expr(rhs);
        let mut ok = true;
        for (side, ty) in [(lhs, lt), (rhs, rt)] {
            if !ty.is_valid() {
                ok = false;
            } else if ty != TypeId::INT {
                self.semantic_error("could not convert value to integer bool", self.ast.span(side));
                ok = false;
            }
        }
        if ok { TypeId::INT } else { TypeId::INVALID }
    }

    fn ternary(
        &mut self,
        id: NodeId,
        cond: NodeId,
        then_branch: NodeId,
        else_branch: NodeId,
    ) -> TypeId {
        self.int_condition(cond);
        let tt = self.visit_expr(then_branch);
        let et = self.visit_expr(else_branch);
        if !tt.is_valid() || !et.is_valid() {
            return TypeId::INVALID;
        }
        if tt != et {
            self.semantic_error("conditional expression mismatched types", self.ast.span(id));
            return TypeId::INVALID;
        }
        tt
    }

    fn assign(&mut self, id: NodeId, lhs: NodeId, op: TokenKind, rhs: NodeId) -> TypeId {
        let lt = self.visit_expr(lhs);
        let rt = self.visit_expr(rhs);
        let ast = self.ast;
        let span = ast.span(id);

        match ast.expr(lhs) {
            Some(Expr::Variable { .. } | Expr::Dot { .. }) => {}
            Some(Expr::Empty) | None => return TypeId::INVALID,
            Some(_) => {
                self.semantic_error("invalid assignment target", span);
                return TypeId::INVALID;
            }
        }
        if let Some(root) = self.lvalue_root(lhs) {
            if let Some((name, is_const, is_func)) = self.root_decl_facts(root) {
                if is_const {
                    self.semantic_error(format!("cannot modify constant '{name}'"), span);
                } else if is_func {
                    self.semantic_error("invalid assignment target", span);
                }
            }
        }
        if !lt.is_valid() || !rt.is_valid() {
            return lt;
        }

        match op.compound_base() {
            None => {
                if !is_convertible(rt, lt) {
                    self.semantic_error(
                        format!(
                            "attempting to assign a value of type '{}' to a variable of type '{}'",
                            self.types.name_of(rt),
                            self.types.name_of(lt)
                        ),
                        span,
                    );
                }
            }
            Some(base) => match binary_result(base, lt, rt) {
                Some(result) if is_convertible(result, lt) => {}
                Some(result) => {
                    self.semantic_error(
                        format!(
                            "attempting to assign a value of type '{}' to a variable of type '{}'",
                            self.types.name_of(result),
                            self.types.name_of(lt)
                        ),
                        span,
                    );
                }
                None => {
                    self.semantic_error("mismatched types in binary-expression", span);
                }
            },
        }
        lt
    }

    /// The variable node at the root of a `Variable`/`Dot` chain.
    fn lvalue_root(&self, id: NodeId) -> Option<NodeId> {
        match self.ast.expr(id)? {
            Expr::Variable { .. } => Some(id),
            Expr::Dot { lhs, .. } => self.lvalue_root(*lhs),
            _ => None,
        }
    }

    /// Name, constness and function-ness of a bound chain root; `None`
    /// when the root never resolved.
    fn root_decl_facts(&self, root: NodeId) -> Option<(String, bool, bool)> {
        let decl = self.out.bindings.get(&root)?.clone();
        let arena = self.arena_of(&decl)?;
        match arena.decl(decl.node)? {
            Decl::Var(v) => Some((v.name.clone(), v.ty.is_const, false)),
            Decl::Func(f) => Some((f.name.clone(), false, true)),
            Decl::FuncDef { .. } => {
                let f = arena.func_header(decl.node)?;
                Some((f.name.clone(), false, true))
            }
            _ => None,
        }
    }

    fn dot(&mut self, lhs: NodeId, field: NodeId) -> TypeId {
        let lt = self.visit_expr(lhs);
        let ast = self.ast;
        if !lt.is_valid() {
            // The left side already failed; stay quiet about the member.
            return TypeId::INVALID;
        }
        if !self.types.is_struct(lt) {
            self.semantic_error(
                format!(
                    "dot operator on non-struct type, '{}'",
                    self.types.name_of(lt)
                ),
                ast.span(lhs),
            );
            return TypeId::INVALID;
        }
        let struct_name = self.types.name_of(lt).to_string();
        let Some(Expr::Variable { name: member }) = ast.expr(field) else {
            return TypeId::INVALID;
        };
        match self.struct_member(&struct_name, member) {
            MemberLookup::Found { script, node, ty } => {
                self.out.bindings.insert(field, DeclRef { script, node });
                self.out.node_types[field.index()] = ty;
                ty
            }
            MemberLookup::NoMember => {
                self.semantic_error(
                    format!("'{member}' is not a member of struct '{struct_name}'"),
                    ast.span(field),
                );
                TypeId::INVALID
            }
            MemberLookup::NoStruct => {
                self.semantic_error(
                    format!("unable to resolve struct '{struct_name}'"),
                    ast.span(lhs),
                );
                TypeId::INVALID
            }
        }
    }

    /// Finds a struct declaration by name and a member inside it, through
    /// own types, includes and the command script.
    fn struct_member(&self, struct_name: &str, member: &str) -> MemberLookup {
        if let Some(&node) = self.out.type_exports.get(struct_name) {
            return member_in(None, self.ast, &self.out, node, member);
        }
        for dep in self.deps.iter().rev() {
            if let Some(&node) = dep.resolution.type_exports.get(struct_name) {
                return member_in(Some(dep.name), dep.ast, dep.resolution, node, member);
            }
        }
        if let Some(cmd) = self.command {
            if let Some(&node) = cmd.resolution.type_exports.get(struct_name) {
                return member_in(Some(cmd.name), cmd.ast, cmd.resolution, node, member);
            }
        }
        MemberLookup::NoStruct
    }

    fn call(&mut self, id: NodeId, callee: NodeId, args: &'a [NodeId]) -> TypeId {
        let ast = self.ast;
        let Some(Expr::Variable { name }) = ast.expr(callee) else {
            // A callee that already failed to resolve reported itself.
            let ct = self.visit_expr(callee);
            if ct.is_valid() {
                self.semantic_error("call target must be identifier", ast.span(callee));
            }
            for &arg in args {
                self.visit_expr(arg);
            }
            return TypeId::INVALID;
        };

        let Some(hit) = self.lookup(name) else {
            self.semantic_error(
                format!("unable to resolve identifier '{name}'"),
                ast.span(callee),
            );
            for &arg in args {
                self.visit_expr(arg);
            }
            return TypeId::INVALID;
        };
        self.out.node_types[callee.index()] = hit.ty;
        let decl = hit.decl.clone();
        self.out.bindings.insert(callee, hit.decl);

        let Some(info) = self.callee_info(&decl) else {
            self.semantic_error("call target not a function", ast.span(callee));
            for &arg in args {
                self.visit_expr(arg);
            }
            return TypeId::INVALID;
        };

        for (i, &arg) in args.iter().enumerate() {
            let at = self.visit_expr(arg);
            if let Some(&(pt, _)) = info.params.get(i) {
                if at.is_valid() && pt.is_valid() && !is_convertible(at, pt) {
                    self.semantic_error(
                        format!(
                            "call '{}': arg {} expected '{}', got '{}'",
                            name,
                            i + 1,
                            self.types.name_of(pt),
                            self.types.name_of(at)
                        ),
                        ast.span(arg),
                    );
                }
            }
        }

        let min = info.params.iter().take_while(|(_, d)| !d).count();
        let max = info.params.len();
        if args.len() < min || args.len() > max {
            let expected = if args.len() < min { min } else { max };
            self.semantic_error(
                format!(
                    "call '{}': expected {} args, got {}",
                    name,
                    expected,
                    args.len()
                ),
                ast.span(id),
            );
        }
        info.ret
    }

    /// Return type and parameter layout of a bound call target, or `None`
    /// when the binding is not a function.
    fn callee_info(&self, decl: &DeclRef) -> Option<CallInfo> {
        let (arena, node_types): (&Ast, &[TypeId]) = match &decl.script {
            None => (self.ast, &self.out.node_types),
            Some(script) => {
                let dep = self
                    .deps
                    .iter()
                    .find(|d| d.name == script)
                    .copied()
                    .or_else(|| self.command.filter(|c| c.name == script.as_str()))?;
                (dep.ast, &dep.resolution.node_types)
            }
        };
        let type_of = |id: NodeId| {
            node_types
                .get(id.index())
                .copied()
                .unwrap_or(TypeId::INVALID)
        };
        let header = arena.func_header_id(decl.node)?;
        let f = arena.func_header(decl.node)?;
        let params = f
            .params
            .iter()
            .map(|&p| {
                let has_default = matches!(arena.decl(p), Some(Decl::Var(v)) if v.init.is_some());
                (type_of(p), has_default)
            })
            .collect();
        Some(CallInfo {
            ret: type_of(header),
            params,
        })
    }

    // ---------------- Constant folding ----------------

    /// Folds literals, unary `-` `~` `!` and references to `const`
    /// variables. `owner` is the dependency whose arena `id` lives in,
    /// `None` for the script being resolved.
    fn fold_const(
        &self,
        owner: Option<DepView<'a>>,
        id: NodeId,
        depth: u32,
    ) -> Option<ConstValue> {
        if depth > MAX_CONST_CHAIN {
            return None;
        }
        let arena = owner.map(|d| d.ast).unwrap_or(self.ast);
        match arena.expr(id)? {
            Expr::Literal(Literal::Int(v)) => Some(ConstValue::Int(*v)),
            Expr::Literal(Literal::Float(v)) => Some(ConstValue::Float(*v)),
            Expr::Literal(Literal::Str(v)) => Some(ConstValue::Str(v.clone())),
            Expr::Literal(Literal::ObjectInvalid) => Some(ConstValue::ObjectInvalid),
            Expr::Literal(Literal::ObjectSelf) => Some(ConstValue::ObjectSelf),
            Expr::Group { inner } => self.fold_const(owner, *inner, depth + 1),
            Expr::Unary { op, operand } => {
                match (op, self.fold_const(owner, *operand, depth + 1)?) {
                    (TokenKind::Sub, ConstValue::Int(v)) => Some(ConstValue::Int(-v)),
                    (TokenKind::Sub, ConstValue::Float(v)) => Some(ConstValue::Float(-v)),
                    (TokenKind::Tilde, ConstValue::Int(v)) => Some(ConstValue::Int(!v)),
                    (TokenKind::Not, ConstValue::Int(v)) => {
                        Some(ConstValue::Int(i64::from(v == 0)))
                    }
                    _ => None,
                }
            }
            Expr::Variable { name } => {
                let (next_owner, init) = self.const_init_of(owner, name)?;
                self.fold_const(next_owner, init, depth + 1)
            }
            _ => None,
        }
    }

    /// The initializer of the `const` variable `name` resolves to in
    /// `owner`'s scope, together with the arena that initializer lives in.
    fn const_init_of(
        &self,
        owner: Option<DepView<'a>>,
        name: &str,
    ) -> Option<(Option<DepView<'a>>, NodeId)> {
        if owner.is_none() {
            for frame in self.scopes.iter().rev() {
                if let Some(entry) = frame.get(name) {
                    return const_var_init(self.ast, entry.node).map(|init| (None, init));
                }
            }
            if let Some(&node) = self.out.exports.get(name) {
                return const_var_init(self.ast, node).map(|init| (None, init));
            }
            for dep in self.deps.iter().rev() {
                if let Some(&node) = dep.resolution.exports.get(name) {
                    return const_var_init(dep.ast, node).map(|init| (Some(*dep), init));
                }
            }
        } else if let Some(dep) = owner {
            if let Some(&node) = dep.resolution.exports.get(name) {
                return const_var_init(dep.ast, node).map(|init| (Some(dep), init));
            }
        }
        let cmd = self.command?;
        let &node = cmd.resolution.exports.get(name)?;
        const_var_init(cmd.ast, node).map(|init| (Some(cmd), init))
    }
}

enum MemberLookup {
    /// No struct declaration of that name is visible.
    NoStruct,
    /// The struct exists but has no such field.
    NoMember,
    Found {
        script: Option<String>,
        node: NodeId,
        ty: TypeId,
    },
}

fn member_in(
    script: Option<&str>,
    arena: &Ast,
    resolution: &Resolution,
    node: NodeId,
    member: &str,
) -> MemberLookup {
    let Some(Decl::Struct { fields, .. }) = arena.decl(node) else {
        return MemberLookup::NoStruct;
    };
    for &field in fields {
        if let Some(Decl::Var(v)) = arena.decl(field) {
            if v.name == member {
                return MemberLookup::Found {
                    script: script.map(str::to_string),
                    node: field,
                    ty: resolution.type_of(field),
                };
            }
        }
    }
    MemberLookup::NoMember
}

fn const_var_init(arena: &Ast, node: NodeId) -> Option<NodeId> {
    match arena.decl(node)? {
        Decl::Var(v) if v.ty.is_const => v.init,
        _ => None,
    }
}
