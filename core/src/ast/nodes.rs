use serde::Serialize;

use crate::token::{Position, Span, TokenKind};

/// Index of a node in its [`Ast`] arena. Ids are only meaningful together
/// with the arena that produced them; cross-script references therefore
/// travel as `(script name, NodeId)` pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Expr(Expr),
    Stmt(Stmt),
    Decl(Decl),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f32),
    Str(String),
    ObjectInvalid,
    ObjectSelf,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `lhs = rhs` and the compound forms; `op` is the assignment token.
    Assign { lhs: NodeId, op: TokenKind, rhs: NodeId },
    Ternary { cond: NodeId, then_branch: NodeId, else_branch: NodeId },
    /// `&&` and `||`.
    Logical { lhs: NodeId, op: TokenKind, rhs: NodeId },
    /// `==` `!=` `<` `<=` `>` `>=`.
    Comparison { lhs: NodeId, op: TokenKind, rhs: NodeId },
    /// Arithmetic, shifts and bitwise operators.
    Binary { lhs: NodeId, op: TokenKind, rhs: NodeId },
    /// Prefix `-` `!` `~` `++` `--`.
    Unary { op: TokenKind, operand: NodeId },
    /// Postfix `++` `--`.
    Postfix { operand: NodeId, op: TokenKind },
    Call {
        callee: NodeId,
        args: Vec<NodeId>,
        /// From the opening to the closing parenthesis, used to answer
        /// signature help requests.
        args_span: Span,
        /// End positions of the argument commas, in source order.
        commas: Vec<Position>,
    },
    /// `lhs.field`; `field` is a [`Expr::Variable`] node.
    Dot { lhs: NodeId, field: NodeId },
    Group { inner: NodeId },
    Literal(Literal),
    /// `[x, y, z]` with float components.
    LiteralVector { x: f32, y: f32, z: f32 },
    Variable { name: String },
    /// Placeholder left behind by error recovery.
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Block { stmts: Vec<NodeId> },
    Expr { expr: NodeId },
    If {
        cond: NodeId,
        then_branch: NodeId,
        else_branch: Option<NodeId>,
    },
    While { cond: NodeId, body: NodeId },
    Do { body: NodeId, cond: NodeId },
    For {
        init: Option<NodeId>,
        cond: Option<NodeId>,
        update: Option<NodeId>,
        body: NodeId,
    },
    /// `body` is always a block.
    Switch { target: NodeId, body: NodeId },
    /// `case value:` or `default:`; `kind` is the keyword token.
    Label { kind: TokenKind, value: Option<NodeId> },
    /// `return [expr];`, `break;` or `continue;`.
    Jump { kind: TokenKind, expr: Option<NodeId> },
    Empty,
}

/// A variable's role decides where the resolver registers it and how the
/// editor queries present it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarRole {
    Global,
    Local,
    Param,
    Field,
}

/// The `const int` / `struct Name` part of a declaration. In a declaration
/// list the one spec is shared by every declared name.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeSpec {
    pub is_const: bool,
    pub kind: TokenKind,
    pub struct_name: Option<String>,
    pub span: Span,
}

impl TypeSpec {
    /// Type name as written, e.g. `int` or `struct Vec2`.
    pub fn display_name(&self) -> String {
        match (&self.struct_name, self.kind) {
            (Some(name), TokenKind::Struct) => format!("struct {name}"),
            _ => type_keyword_text(self.kind).to_string(),
        }
    }
}

pub(crate) fn type_keyword_text(kind: TokenKind) -> &'static str {
    match kind {
        TokenKind::Action => "action",
        TokenKind::Effect => "effect",
        TokenKind::Event => "event",
        TokenKind::Float => "float",
        TokenKind::Int => "int",
        TokenKind::Location => "location",
        TokenKind::Object => "object",
        TokenKind::String => "string",
        TokenKind::Struct => "struct",
        TokenKind::Talent => "talent",
        TokenKind::Vector => "vector",
        TokenKind::Void => "void",
        _ => "?",
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub ty: TypeSpec,
    pub name: String,
    pub name_span: Span,
    pub init: Option<NodeId>,
    pub role: VarRole,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub ty: TypeSpec,
    pub name: String,
    pub name_span: Span,
    /// `Decl::Var` nodes with role `Param`.
    pub params: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decl {
    Var(VarDecl),
    /// `int a, b = 1, c;` declared as one statement. Each entry is a
    /// `Decl::Var` whose span covers only its own name and initializer.
    List { decls: Vec<NodeId> },
    /// Function prototype.
    Func(FunctionDecl),
    /// Function definition; `decl` is a `Decl::Func` node for the header.
    FuncDef { decl: NodeId, body: NodeId },
    Struct {
        name: String,
        name_span: Span,
        /// `Decl::Var` nodes with role `Field`.
        fields: Vec<NodeId>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Include {
    pub name: String,
    /// Span of the first directive naming this script.
    pub span: Span,
    /// How many directives name this script; duplicates collapse here.
    pub used: u32,
    /// Set once include processing has loaded the script.
    pub resolved: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Define {
    pub name: String,
    pub value: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub text: String,
    pub span: Span,
}

impl Comment {
    fn append(&mut self, text: &str, span: Span) {
        self.text.push('\n');
        self.text.push_str(text);
        self.span = Span::merge(self.span, span);
    }
}

/// Flat syntax tree of one script. Nodes are stored in one arena and refer
/// to each other by [`NodeId`]; children always precede their parent.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Ast {
    nodes: Vec<Node>,
    /// Top level declarations in source order.
    pub decls: Vec<NodeId>,
    pub includes: Vec<Include>,
    pub defines: Vec<Define>,
    pub comments: Vec<Comment>,
}

impl Ast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, kind: NodeKind, span: Span) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node { kind, span });
        id
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    pub fn span(&self, id: NodeId) -> Span {
        self.nodes[id.index()].span
    }

    pub fn set_span(&mut self, id: NodeId, span: Span) {
        self.nodes[id.index()].span = span;
    }

    pub fn expr(&self, id: NodeId) -> Option<&Expr> {
        match &self.node(id).kind {
            NodeKind::Expr(e) => Some(e),
            _ => None,
        }
    }

    pub fn stmt(&self, id: NodeId) -> Option<&Stmt> {
        match &self.node(id).kind {
            NodeKind::Stmt(s) => Some(s),
            _ => None,
        }
    }

    pub fn decl(&self, id: NodeId) -> Option<&Decl> {
        match &self.node(id).kind {
            NodeKind::Decl(d) => Some(d),
            _ => None,
        }
    }

    /// The `Decl::Func` header node of a function, resolving a definition
    /// to the prototype node it was parsed with.
    pub fn func_header_id(&self, id: NodeId) -> Option<NodeId> {
        match self.decl(id)? {
            Decl::Func(_) => Some(id),
            Decl::FuncDef { decl, .. } => match self.decl(*decl)? {
                Decl::Func(_) => Some(*decl),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn func_header(&self, id: NodeId) -> Option<&FunctionDecl> {
        match self.decl(self.func_header_id(id)?)? {
            Decl::Func(f) => Some(f),
            _ => None,
        }
    }

    /// Records an include directive, collapsing duplicates of one name into
    /// a single entry with a bumped usage count.
    pub fn record_include(&mut self, name: String, span: Span) {
        if let Some(existing) = self.includes.iter_mut().find(|i| i.name == name) {
            existing.used += 1;
            return;
        }
        self.includes.push(Include {
            name,
            span,
            used: 1,
            resolved: false,
        });
    }

    pub fn define_value(&self, name: &str) -> Option<&str> {
        self.defines
            .iter()
            .find(|d| d.name == name)
            .map(|d| d.value.as_str())
    }

    /// Adds a comment, merging it into the previous one when they sit on the
    /// same or adjacent lines so `//` blocks read as one doc comment.
    pub fn push_comment(&mut self, text: &str, span: Span) {
        if let Some(last) = self.comments.last_mut() {
            if span.start.line <= last.span.end.line + 1 {
                last.append(text, span);
                return;
            }
        }
        self.comments.push(Comment {
            text: text.to_string(),
            span,
        });
    }

    /// The comment ending on `line` or on the line above it. This is how a
    /// declaration finds its doc comment.
    pub fn find_comment(&self, line: u32) -> Option<&Comment> {
        self.comments
            .iter()
            .find(|c| c.span.end.line == line || c.span.end.line + 1 == line)
    }
}
