use crate::ast::{
    Ast, Decl, Expr, FunctionDecl, Literal, NodeId, NodeKind, Stmt, TypeSpec, VarDecl,
};
use crate::token::TokenKind;

/// Renders an [`Ast`] back to canonical source text. The output is meant for
/// debugging and golden tests, so layout is fixed: four-space indent and
/// braces on their own line.
pub struct AstPrinter<'a> {
    ast: &'a Ast,
    out: String,
    depth: usize,
}

impl<'a> AstPrinter<'a> {
    pub fn print(ast: &'a Ast) -> String {
        let mut p = Self {
            ast,
            out: String::new(),
            depth: 0,
        };
        for include in &ast.includes {
            p.out.push_str("#include \"");
            p.out.push_str(&include.name);
            p.out.push_str("\"\n");
        }
        for define in &ast.defines {
            p.out.push_str("#define ");
            p.out.push_str(&define.name);
            p.out.push(' ');
            p.out.push_str(&define.value);
            p.out.push('\n');
        }
        if !(ast.includes.is_empty() && ast.defines.is_empty()) && !ast.decls.is_empty() {
            p.out.push('\n');
        }
        for (i, decl) in ast.decls.iter().enumerate() {
            if i > 0 {
                p.out.push('\n');
            }
            p.node(*decl);
        }
        p.out
    }

    fn indent(&mut self) {
        for _ in 0..self.depth {
            self.out.push_str("    ");
        }
    }

    fn int(&mut self, value: i64) {
        let mut buf = itoa::Buffer::new();
        self.out.push_str(buf.format(value));
    }

    fn float(&mut self, value: f32) {
        let mut buf = ryu::Buffer::new();
        self.out.push_str(buf.format(value));
    }

    fn type_spec(&mut self, ty: &TypeSpec) {
        if ty.is_const {
            self.out.push_str("const ");
        }
        self.out.push_str(&ty.display_name());
    }

    /// Statement-position node; declarations occur here too (locals, struct
    /// fields, for initializers).
    fn node(&mut self, id: NodeId) {
        // Nodes are cloned out of the arena so the walk can append freely.
        let kind = self.ast.node(id).kind.clone();
        match kind {
            NodeKind::Decl(decl) => self.decl(&decl),
            NodeKind::Stmt(stmt) => self.stmt(&stmt),
            NodeKind::Expr(_) => {
                self.indent();
                self.expr(id);
                self.out.push_str(";\n");
            }
        }
    }

    fn decl(&mut self, decl: &Decl) {
        match decl {
            Decl::Var(vd) => {
                self.indent();
                self.type_spec(&vd.ty);
                self.out.push(' ');
                self.var_body(vd);
                self.out.push_str(";\n");
            }
            Decl::List { decls } => {
                self.indent();
                for (i, entry) in decls.iter().enumerate() {
                    let Some(Decl::Var(vd)) = self.ast.decl(*entry).cloned() else {
                        continue;
                    };
                    if i == 0 {
                        self.type_spec(&vd.ty);
                        self.out.push(' ');
                    } else {
                        self.out.push_str(", ");
                    }
                    self.var_body(&vd);
                }
                self.out.push_str(";\n");
            }
            Decl::Func(fd) => {
                self.indent();
                self.func_header(fd);
                self.out.push_str(";\n");
            }
            Decl::FuncDef { decl, body } => {
                if let Some(Decl::Func(fd)) = self.ast.decl(*decl).cloned() {
                    self.indent();
                    self.func_header(&fd);
                    self.out.push('\n');
                }
                self.node(*body);
            }
            Decl::Struct { name, fields, .. } => {
                self.indent();
                self.out.push_str("struct ");
                self.out.push_str(name);
                self.out.push_str("\n{\n");
                self.depth += 1;
                for field in fields {
                    if let Some(Decl::Var(vd)) = self.ast.decl(*field).cloned() {
                        self.indent();
                        self.type_spec(&vd.ty);
                        self.out.push(' ');
                        self.var_body(&vd);
                        self.out.push_str(";\n");
                    }
                }
                self.depth -= 1;
                self.indent();
                self.out.push_str("};\n");
            }
        }
    }

    fn var_body(&mut self, vd: &VarDecl) {
        self.out.push_str(&vd.name);
        if let Some(init) = vd.init {
            self.out.push_str(" = ");
            self.expr(init);
        }
    }

    fn func_header(&mut self, fd: &FunctionDecl) {
        self.type_spec(&fd.ty);
        self.out.push(' ');
        self.out.push_str(&fd.name);
        self.out.push('(');
        for (i, param) in fd.params.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            if let Some(Decl::Var(vd)) = self.ast.decl(*param).cloned() {
                self.type_spec(&vd.ty);
                self.out.push(' ');
                self.var_body(&vd);
            }
        }
        self.out.push(')');
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Block { stmts } => {
                self.indent();
                self.out.push_str("{\n");
                self.depth += 1;
                for s in stmts {
                    self.node(*s);
                }
                self.depth -= 1;
                self.indent();
                self.out.push_str("}\n");
            }
            Stmt::Expr { expr } => {
                self.indent();
                self.expr(*expr);
                self.out.push_str(";\n");
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.indent();
                self.out.push_str("if (");
                self.expr(*cond);
                self.out.push_str(")\n");
                self.nested(*then_branch);
                if let Some(else_branch) = else_branch {
                    self.indent();
                    self.out.push_str("else\n");
                    self.nested(*else_branch);
                }
            }
            Stmt::While { cond, body } => {
                self.indent();
                self.out.push_str("while (");
                self.expr(*cond);
                self.out.push_str(")\n");
                self.nested(*body);
            }
            Stmt::Do { body, cond } => {
                self.indent();
                self.out.push_str("do\n");
                self.nested(*body);
                self.indent();
                self.out.push_str("while (");
                self.expr(*cond);
                self.out.push_str(");\n");
            }
            Stmt::For {
                init,
                cond,
                update,
                body,
            } => {
                self.indent();
                self.out.push_str("for (");
                if let Some(init) = init {
                    self.expr(*init);
                }
                self.out.push_str("; ");
                if let Some(cond) = cond {
                    self.expr(*cond);
                }
                self.out.push_str("; ");
                if let Some(update) = update {
                    self.expr(*update);
                }
                self.out.push_str(")\n");
                self.nested(*body);
            }
            Stmt::Switch { target, body } => {
                self.indent();
                self.out.push_str("switch (");
                self.expr(*target);
                self.out.push_str(")\n");
                self.node(*body);
            }
            Stmt::Label { kind, value } => {
                self.indent();
                if *kind == TokenKind::Case {
                    self.out.push_str("case ");
                    if let Some(value) = value {
                        self.expr(*value);
                    }
                } else {
                    self.out.push_str("default");
                }
                self.out.push_str(":\n");
            }
            Stmt::Jump { kind, expr } => {
                self.indent();
                match kind {
                    TokenKind::Break => self.out.push_str("break"),
                    TokenKind::Continue => self.out.push_str("continue"),
                    _ => {
                        self.out.push_str("return");
                        if let Some(expr) = expr {
                            self.out.push(' ');
                            self.expr(*expr);
                        }
                    }
                }
                self.out.push_str(";\n");
            }
            Stmt::Empty => {
                self.indent();
                self.out.push_str(";\n");
            }
        }
    }

    /// Body of an `if`/`while`/`for`: blocks stay at the same depth, single
    /// statements get one extra level.
    fn nested(&mut self, id: NodeId) {
        if matches!(self.ast.stmt(id), Some(Stmt::Block { .. })) {
            self.node(id);
        } else {
            self.depth += 1;
            self.node(id);
            self.depth -= 1;
        }
    }

    fn expr(&mut self, id: NodeId) {
        let Some(expr) = self.ast.expr(id).cloned() else {
            return;
        };
        match expr {
            Expr::Assign { lhs, op, rhs } => {
                self.expr(lhs);
                self.out.push(' ');
                self.out.push_str(op_text(op));
                self.out.push(' ');
                self.expr(rhs);
            }
            Expr::Ternary {
                cond,
                then_branch,
                else_branch,
            } => {
                self.expr(cond);
                self.out.push_str(" ? ");
                self.expr(then_branch);
                self.out.push_str(" : ");
                self.expr(else_branch);
            }
            Expr::Logical { lhs, op, rhs }
            | Expr::Comparison { lhs, op, rhs }
            | Expr::Binary { lhs, op, rhs } => {
                self.expr(lhs);
                self.out.push(' ');
                self.out.push_str(op_text(op));
                self.out.push(' ');
                self.expr(rhs);
            }
            Expr::Unary { op, operand } => {
                self.out.push_str(op_text(op));
                self.expr(operand);
            }
            Expr::Postfix { operand, op } => {
                self.expr(operand);
                self.out.push_str(op_text(op));
            }
            Expr::Call { callee, args, .. } => {
                self.expr(callee);
                self.out.push('(');
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    self.expr(*arg);
                }
                self.out.push(')');
            }
            Expr::Dot { lhs, field } => {
                self.expr(lhs);
                self.out.push('.');
                self.expr(field);
            }
            Expr::Group { inner } => {
                self.out.push('(');
                self.expr(inner);
                self.out.push(')');
            }
            Expr::Literal(lit) => match lit {
                Literal::Int(v) => self.int(v),
                Literal::Float(v) => self.float(v),
                Literal::Str(s) => {
                    self.out.push('"');
                    self.out.push_str(&s);
                    self.out.push('"');
                }
                Literal::ObjectInvalid => self.out.push_str("OBJECT_INVALID"),
                Literal::ObjectSelf => self.out.push_str("OBJECT_SELF"),
            },
            Expr::LiteralVector { x, y, z } => {
                self.out.push('[');
                self.float(x);
                self.out.push_str(", ");
                self.float(y);
                self.out.push_str(", ");
                self.float(z);
                self.out.push(']');
            }
            Expr::Variable { name } => self.out.push_str(&name),
            Expr::Empty => {}
        }
    }
}

fn op_text(kind: TokenKind) -> &'static str {
    match kind {
        TokenKind::Assign => "=",
        TokenKind::AddAssign => "+=",
        TokenKind::SubAssign => "-=",
        TokenKind::MulAssign => "*=",
        TokenKind::DivAssign => "/=",
        TokenKind::ModAssign => "%=",
        TokenKind::ShlAssign => "<<=",
        TokenKind::ShrAssign => ">>=",
        TokenKind::UshrAssign => ">>>=",
        TokenKind::AndAssign => "&=",
        TokenKind::OrAssign => "|=",
        TokenKind::XorAssign => "^=",
        TokenKind::Eq => "==",
        TokenKind::Ne => "!=",
        TokenKind::Gt => ">",
        TokenKind::Ge => ">=",
        TokenKind::Lt => "<",
        TokenKind::Le => "<=",
        TokenKind::Add => "+",
        TokenKind::Sub => "-",
        TokenKind::Mul => "*",
        TokenKind::Div => "/",
        TokenKind::Mod => "%",
        TokenKind::Shl => "<<",
        TokenKind::Shr => ">>",
        TokenKind::Ushr => ">>>",
        TokenKind::And => "&&",
        TokenKind::Or => "||",
        TokenKind::Not => "!",
        TokenKind::BitAnd => "&",
        TokenKind::BitOr => "|",
        TokenKind::BitXor => "^",
        TokenKind::Tilde => "~",
        TokenKind::PlusPlus => "++",
        TokenKind::MinusMinus => "--",
        _ => "",
    }
}
