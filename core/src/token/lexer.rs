use std::fmt;

use crate::diag::Diagnostics;
use crate::token::{Position, Span};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    LParen,    // (
    RParen,    // )
    LBrace,    // {
    RBrace,    // }
    LBracket,  // [
    RBracket,  // ]
    Comma,     // ,
    Colon,     // :
    Semicolon, // ;
    Question,  // ?
    Pound,     // #
    Dot,       // .
    Assign,     // =
    AddAssign,  // +=
    SubAssign,  // -=
    MulAssign,  // *=
    DivAssign,  // /=
    ModAssign,  // %=
    ShlAssign,  // <<=
    ShrAssign,  // >>=
    UshrAssign, // >>>=
    AndAssign,  // &=
    OrAssign,   // |=
    XorAssign,  // ^=
    Eq,  // ==
    Ne,  // !=
    Gt,  // >
    Ge,  // >=
    Lt,  // <
    Le,  // <=
    Add, // +
    Sub, // -
    Mul, // *
    Div, // /
    Mod, // %
    Shl,  // <<
    Shr,  // >>
    Ushr, // >>> (unsigned shift)
    And, // &&
    Or,  // ||
    Not, // !
    BitAnd, // &
    BitOr,  // |
    BitXor, // ^
    Tilde,  // ~
    PlusPlus,   // ++
    MinusMinus, // --
    IntConst,           // 42, 0x2A, 0b101010, 0o52
    FloatConst,         // 1.5, 2., 2.f
    StringConst,        // "abc" (span covers the content between the quotes)
    ObjectInvalidConst, // OBJECT_INVALID
    ObjectSelfConst,    // OBJECT_SELF
    // Keywords
    Action,   // action
    Break,    // break
    Case,     // case
    Const,    // const
    Continue, // continue
    Default,  // default
    Do,       // do
    Effect,   // effect
    Else,     // else
    Event,    // event
    Float,    // float
    For,      // for
    If,       // if
    Int,      // int
    Location, // location
    Object,   // object
    Return,   // return
    String,   // string
    Struct,   // struct
    Switch,   // switch
    Talent,   // talent
    Vector,   // vector
    Void,     // void
    While,    // while
    Ident,   // identifier
    Comment, // // ... or /* ... */
    Invalid, // unrecognized input
    Eof,
}

impl TokenKind {
    /// Keywords that can open a declaration or a parameter type.
    pub fn is_type_specifier(self) -> bool {
        matches!(
            self,
            TokenKind::Action
                | TokenKind::Effect
                | TokenKind::Event
                | TokenKind::Float
                | TokenKind::Int
                | TokenKind::Location
                | TokenKind::Object
                | TokenKind::String
                | TokenKind::Struct
                | TokenKind::Talent
                | TokenKind::Vector
                | TokenKind::Void
        )
    }

    pub fn is_assign_op(self) -> bool {
        matches!(
            self,
            TokenKind::Assign
                | TokenKind::AddAssign
                | TokenKind::SubAssign
                | TokenKind::MulAssign
                | TokenKind::DivAssign
                | TokenKind::ModAssign
                | TokenKind::ShlAssign
                | TokenKind::ShrAssign
                | TokenKind::UshrAssign
                | TokenKind::AndAssign
                | TokenKind::OrAssign
                | TokenKind::XorAssign
        )
    }

    /// The underlying operator of a compound assignment, `None` for plain `=`.
    pub fn compound_base(self) -> Option<TokenKind> {
        let base = match self {
            TokenKind::AddAssign => TokenKind::Add,
            TokenKind::SubAssign => TokenKind::Sub,
            TokenKind::MulAssign => TokenKind::Mul,
            TokenKind::DivAssign => TokenKind::Div,
            TokenKind::ModAssign => TokenKind::Mod,
            TokenKind::ShlAssign => TokenKind::Shl,
            TokenKind::ShrAssign => TokenKind::Shr,
            TokenKind::UshrAssign => TokenKind::Ushr,
            TokenKind::AndAssign => TokenKind::BitAnd,
            TokenKind::OrAssign => TokenKind::BitOr,
            TokenKind::XorAssign => TokenKind::BitXor,
            _ => return None,
        };
        Some(base)
    }

    /// Human-readable name used in diagnostics.
    pub fn describe(self) -> &'static str {
        match self {
            TokenKind::LParen => "'('",
            TokenKind::RParen => "')'",
            TokenKind::LBrace => "'{'",
            TokenKind::RBrace => "'}'",
            TokenKind::LBracket => "'['",
            TokenKind::RBracket => "']'",
            TokenKind::Comma => "','",
            TokenKind::Colon => "':'",
            TokenKind::Semicolon => "';'",
            TokenKind::Question => "'?'",
            TokenKind::Pound => "'#'",
            TokenKind::Dot => "'.'",
            TokenKind::Assign => "'='",
            TokenKind::AddAssign => "'+='",
            TokenKind::SubAssign => "'-='",
            TokenKind::MulAssign => "'*='",
            TokenKind::DivAssign => "'/='",
            TokenKind::ModAssign => "'%='",
            TokenKind::ShlAssign => "'<<='",
            TokenKind::ShrAssign => "'>>='",
            TokenKind::UshrAssign => "'>>>='",
            TokenKind::AndAssign => "'&='",
            TokenKind::OrAssign => "'|='",
            TokenKind::XorAssign => "'^='",
            TokenKind::Eq => "'=='",
            TokenKind::Ne => "'!='",
            TokenKind::Gt => "'>'",
            TokenKind::Ge => "'>='",
            TokenKind::Lt => "'<'",
            TokenKind::Le => "'<='",
            TokenKind::Add => "'+'",
            TokenKind::Sub => "'-'",
            TokenKind::Mul => "'*'",
            TokenKind::Div => "'/'",
            TokenKind::Mod => "'%'",
            TokenKind::Shl => "'<<'",
            TokenKind::Shr => "'>>'",
            TokenKind::Ushr => "'>>>'",
            TokenKind::And => "'&&'",
            TokenKind::Or => "'||'",
            TokenKind::Not => "'!'",
            TokenKind::BitAnd => "'&'",
            TokenKind::BitOr => "'|'",
            TokenKind::BitXor => "'^'",
            TokenKind::Tilde => "'~'",
            TokenKind::PlusPlus => "'++'",
            TokenKind::MinusMinus => "'--'",
            TokenKind::IntConst => "integer literal",
            TokenKind::FloatConst => "float literal",
            TokenKind::StringConst => "string literal",
            TokenKind::ObjectInvalidConst => "'OBJECT_INVALID'",
            TokenKind::ObjectSelfConst => "'OBJECT_SELF'",
            TokenKind::Action => "'action'",
            TokenKind::Break => "'break'",
            TokenKind::Case => "'case'",
            TokenKind::Const => "'const'",
            TokenKind::Continue => "'continue'",
            TokenKind::Default => "'default'",
            TokenKind::Do => "'do'",
            TokenKind::Effect => "'effect'",
            TokenKind::Else => "'else'",
            TokenKind::Event => "'event'",
            TokenKind::Float => "'float'",
            TokenKind::For => "'for'",
            TokenKind::If => "'if'",
            TokenKind::Int => "'int'",
            TokenKind::Location => "'location'",
            TokenKind::Object => "'object'",
            TokenKind::Return => "'return'",
            TokenKind::String => "'string'",
            TokenKind::Struct => "'struct'",
            TokenKind::Switch => "'switch'",
            TokenKind::Talent => "'talent'",
            TokenKind::Vector => "'vector'",
            TokenKind::Void => "'void'",
            TokenKind::While => "'while'",
            TokenKind::Ident => "identifier",
            TokenKind::Comment => "comment",
            TokenKind::Invalid => "invalid token",
            TokenKind::Eof => "end of file",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

pub fn keyword_kind(text: &str) -> Option<TokenKind> {
    let kind = match text {
        "action" => TokenKind::Action,
        "break" => TokenKind::Break,
        "case" => TokenKind::Case,
        "const" => TokenKind::Const,
        "continue" => TokenKind::Continue,
        "default" => TokenKind::Default,
        "do" => TokenKind::Do,
        "effect" => TokenKind::Effect,
        "else" => TokenKind::Else,
        "event" => TokenKind::Event,
        "float" => TokenKind::Float,
        "for" => TokenKind::For,
        "if" => TokenKind::If,
        "int" => TokenKind::Int,
        "location" => TokenKind::Location,
        "object" => TokenKind::Object,
        "return" => TokenKind::Return,
        "string" => TokenKind::String,
        "struct" => TokenKind::Struct,
        "switch" => TokenKind::Switch,
        "talent" => TokenKind::Talent,
        "vector" => TokenKind::Vector,
        "void" => TokenKind::Void,
        "while" => TokenKind::While,
        _ => return None,
    };
    Some(kind)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// The raw source slice for this token. For string literals the span
    /// covers the content between the quotes, so this is the content itself.
    pub fn text<'s>(&self, source: &'s str) -> &'s str {
        &source[self.span.start.offset..self.span.end.offset]
    }
}

const ASCII_WHITESPACE: u8 = 1 << 0;
const ASCII_DIGIT: u8 = 1 << 1;
const ASCII_IDENT_START: u8 = 1 << 2;
const ASCII_IDENT_CONT: u8 = 1 << 3;
const ASCII_HEX_DIGIT: u8 = 1 << 4;

const fn build_ascii_class() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let c = i as u8;
        if matches!(c, b' ' | b'\t' | b'\n' | b'\r' | 0x0B | 0x0C) {
            table[i] |= ASCII_WHITESPACE;
        }
        if c >= b'0' && c <= b'9' {
            table[i] |= ASCII_DIGIT | ASCII_IDENT_CONT | ASCII_HEX_DIGIT;
        }
        if (c >= b'a' && c <= b'z') || (c >= b'A' && c <= b'Z') {
            table[i] |= ASCII_IDENT_START | ASCII_IDENT_CONT;
        }
        if (c >= b'a' && c <= b'f') || (c >= b'A' && c <= b'F') {
            table[i] |= ASCII_HEX_DIGIT;
        }
        if c == b'_' {
            table[i] |= ASCII_IDENT_START | ASCII_IDENT_CONT;
        }
        i += 1;
    }
    table
}

const ASCII_CLASS: [u8; 256] = build_ascii_class();

#[inline]
fn is_space_byte(b: u8) -> bool {
    ASCII_CLASS[b as usize] & ASCII_WHITESPACE != 0
}

#[inline]
fn is_digit_byte(b: u8) -> bool {
    ASCII_CLASS[b as usize] & ASCII_DIGIT != 0
}

#[inline]
fn is_hex_byte(b: u8) -> bool {
    ASCII_CLASS[b as usize] & ASCII_HEX_DIGIT != 0
}

#[inline]
fn is_ident_start_byte(b: u8) -> bool {
    ASCII_CLASS[b as usize] & ASCII_IDENT_START != 0
}

#[inline]
fn is_ident_cont_byte(b: u8) -> bool {
    ASCII_CLASS[b as usize] & ASCII_IDENT_CONT != 0
}

/// Token stream of one script. Comments are kept out of the main stream so
/// the grammar never has to skip them; they keep their spans for doc lookup.
pub struct LexOutput {
    pub tokens: Vec<Token>,
    pub comments: Vec<Token>,
}

/// Scans one script. Tokens come one at a time from [`Lexer::next`];
/// [`Lexer::tokenize`] drains the whole stream for parsers that buffer their
/// own lookahead. Malformed input never aborts the scan: it is reported to
/// the sink and degraded to `Invalid` tokens.
pub struct Lexer<'a> {
    script: &'a str,
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: u32,
    column: u32,
    comments: Vec<Token>,
    diags: &'a mut Diagnostics,
}

impl<'a> Lexer<'a> {
    pub fn new(script: &'a str, source: &'a str, diags: &'a mut Diagnostics) -> Self {
        Self {
            script,
            source,
            bytes: source.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
            comments: Vec::new(),
            diags,
        }
    }

    /// The next grammar token. Comments are stashed on the side as they are
    /// passed; past the end of input every call answers `Eof`.
    pub fn next(&mut self) -> Token {
        loop {
            self.skip_whitespace();
            if self.eof() {
                let end = self.position();
                return Token::new(TokenKind::Eof, Span::new(end, end));
            }
            let start = self.position();
            let b = self.peek();
            if b == b'/' && self.peek_at(1) == b'/' {
                self.scan_line_comment(start);
            } else if b == b'/' && self.peek_at(1) == b'*' {
                if let Some(unterminated) = self.scan_block_comment(start) {
                    return unterminated;
                }
            } else {
                return self.scan_token(start);
            }
        }
    }

    pub fn tokenize(mut self) -> LexOutput {
        let mut tokens = Vec::with_capacity(self.source.len() / 4);
        loop {
            let token = self.next();
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                break;
            }
        }
        LexOutput {
            tokens,
            comments: self.comments,
        }
    }

    fn position(&self) -> Position {
        Position::new(self.line, self.column, self.pos)
    }

    fn eof(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn peek(&self) -> u8 {
        self.bytes.get(self.pos).copied().unwrap_or(0)
    }

    fn peek_at(&self, n: usize) -> u8 {
        self.bytes.get(self.pos + n).copied().unwrap_or(0)
    }

    fn bump(&mut self) {
        let b = self.bytes[self.pos];
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
            self.column = 1;
        } else if b & 0xC0 != 0x80 {
            // UTF-8 continuation bytes do not advance the column.
            self.column += 1;
        }
    }

    fn bump_n(&mut self, n: usize) {
        for _ in 0..n {
            self.bump();
        }
    }

    fn skip_whitespace(&mut self) {
        while !self.eof() {
            let b = self.peek();
            if is_space_byte(b) {
                self.bump();
            } else if b == b'\\' && self.peek_at(1) == b'\n' {
                // Line continuation.
                self.bump();
                self.bump();
            } else if b == b'\\' && self.peek_at(1) == b'\r' && self.peek_at(2) == b'\n' {
                self.bump_n(3);
            } else {
                break;
            }
        }
    }

    fn scan_token(&mut self, start: Position) -> Token {
        let b = self.peek();
        if b == b'"' {
            self.scan_string(start)
        } else if is_digit_byte(b) {
            self.scan_number(start)
        } else if is_ident_start_byte(b) {
            self.scan_word(start)
        } else {
            self.scan_operator(start)
        }
    }

    fn token(&self, kind: TokenKind, start: Position) -> Token {
        Token::new(kind, Span::new(start, self.position()))
    }

    fn scan_word(&mut self, start: Position) -> Token {
        while is_ident_cont_byte(self.peek()) {
            self.bump();
        }
        let text = &self.source[start.offset..self.pos];
        let kind = match keyword_kind(text) {
            Some(kw) => kw,
            None => match text {
                "OBJECT_INVALID" => TokenKind::ObjectInvalidConst,
                "OBJECT_SELF" => TokenKind::ObjectSelfConst,
                _ => TokenKind::Ident,
            },
        };
        self.token(kind, start)
    }

    fn scan_number(&mut self, start: Position) -> Token {
        let mut kind = TokenKind::IntConst;
        if self.peek() == b'0' && matches!(self.peek_at(1), b'x' | b'X') {
            self.bump_n(2);
            while is_hex_byte(self.peek()) {
                self.bump();
            }
        } else if self.peek() == b'0' && matches!(self.peek_at(1), b'b' | b'B') {
            self.bump_n(2);
            while matches!(self.peek(), b'0' | b'1') {
                self.bump();
            }
        } else if self.peek() == b'0' && matches!(self.peek_at(1), b'o' | b'O') {
            self.bump_n(2);
            while matches!(self.peek(), b'0'..=b'7') {
                self.bump();
            }
        } else {
            while is_digit_byte(self.peek()) {
                self.bump();
            }
            if self.peek() == b'.' {
                // "2.", "2.5", "2.5f" and "2.f" are all floats.
                kind = TokenKind::FloatConst;
                self.bump();
                while is_digit_byte(self.peek()) {
                    self.bump();
                }
                if self.peek() == b'f' {
                    self.bump();
                }
            }
        }
        self.token(kind, start)
    }

    fn scan_string(&mut self, opening: Position) -> Token {
        self.bump(); // opening quote
        let content_start = self.position();
        loop {
            if self.eof() || self.peek() == b'\n' {
                let span = Span::new(opening, self.position());
                self.diags
                    .lexical(self.script, "unterminated string literal", false, span);
                return Token::new(TokenKind::Invalid, span);
            }
            let b = self.peek();
            if b == b'"' {
                let span = Span::new(content_start, self.position());
                self.bump(); // closing quote
                return Token::new(TokenKind::StringConst, span);
            }
            if b == b'\\' && !matches!(self.peek_at(1), 0 | b'\n') {
                // Escapes are kept verbatim; only skip so \" does not close.
                self.bump();
            }
            self.bump();
        }
    }

    fn scan_line_comment(&mut self, start: Position) {
        while !self.eof() && !matches!(self.peek(), b'\n' | b'\r') {
            self.bump();
        }
        self.comments
            .push(Token::new(TokenKind::Comment, Span::new(start, self.position())));
    }

    /// `Some` carries the `Invalid` token of an unterminated comment; the
    /// text scanned so far still lands in the comment stream.
    fn scan_block_comment(&mut self, start: Position) -> Option<Token> {
        self.bump_n(2); // "/*"
        loop {
            if self.eof() {
                let span = Span::new(start, self.position());
                self.diags
                    .lexical(self.script, "unterminated block comment", false, span);
                self.comments.push(Token::new(TokenKind::Comment, span));
                return Some(Token::new(TokenKind::Invalid, span));
            }
            if self.peek() == b'*' && self.peek_at(1) == b'/' {
                self.bump_n(2);
                self.comments
                    .push(Token::new(TokenKind::Comment, Span::new(start, self.position())));
                return None;
            }
            self.bump();
        }
    }

    /// Operators use maximal munch, so `>>>=` wins over `>>>`, `>>=`, `>>`
    /// and `>=`.
    fn scan_operator(&mut self, start: Position) -> Token {
        use TokenKind::*;
        let (kind, len) = match &self.bytes[self.pos..] {
            [b'>', b'>', b'>', b'=', ..] => (UshrAssign, 4),
            [b'>', b'>', b'>', ..] => (Ushr, 3),
            [b'>', b'>', b'=', ..] => (ShrAssign, 3),
            [b'>', b'>', ..] => (Shr, 2),
            [b'>', b'=', ..] => (Ge, 2),
            [b'>', ..] => (Gt, 1),
            [b'<', b'<', b'=', ..] => (ShlAssign, 3),
            [b'<', b'<', ..] => (Shl, 2),
            [b'<', b'=', ..] => (Le, 2),
            [b'<', ..] => (Lt, 1),
            [b'=', b'=', ..] => (Eq, 2),
            [b'=', ..] => (Assign, 1),
            [b'!', b'=', ..] => (Ne, 2),
            [b'!', ..] => (Not, 1),
            [b'+', b'+', ..] => (PlusPlus, 2),
            [b'+', b'=', ..] => (AddAssign, 2),
            [b'+', ..] => (Add, 1),
            [b'-', b'-', ..] => (MinusMinus, 2),
            [b'-', b'=', ..] => (SubAssign, 2),
            [b'-', ..] => (Sub, 1),
            [b'*', b'=', ..] => (MulAssign, 2),
            [b'*', ..] => (Mul, 1),
            [b'/', b'=', ..] => (DivAssign, 2),
            [b'/', ..] => (Div, 1),
            [b'%', b'=', ..] => (ModAssign, 2),
            [b'%', ..] => (Mod, 1),
            [b'&', b'&', ..] => (And, 2),
            [b'&', b'=', ..] => (AndAssign, 2),
            [b'&', ..] => (BitAnd, 1),
            [b'|', b'|', ..] => (Or, 2),
            [b'|', b'=', ..] => (OrAssign, 2),
            [b'|', ..] => (BitOr, 1),
            [b'^', b'=', ..] => (XorAssign, 2),
            [b'^', ..] => (BitXor, 1),
            [b'~', ..] => (Tilde, 1),
            [b'(', ..] => (LParen, 1),
            [b')', ..] => (RParen, 1),
            [b'{', ..] => (LBrace, 1),
            [b'}', ..] => (RBrace, 1),
            [b'[', ..] => (LBracket, 1),
            [b']', ..] => (RBracket, 1),
            [b',', ..] => (Comma, 1),
            [b':', ..] => (Colon, 1),
            [b';', ..] => (Semicolon, 1),
            [b'?', ..] => (Question, 1),
            [b'#', ..] => (Pound, 1),
            [b'.', ..] => (Dot, 1),
            _ => return self.unknown_char(start),
        };
        self.bump_n(len);
        self.token(kind, start)
    }

    fn unknown_char(&mut self, start: Position) -> Token {
        let c = self.source[self.pos..].chars().next().unwrap_or('\u{fffd}');
        self.bump_n(c.len_utf8());
        let span = Span::new(start, self.position());
        self.diags.lexical(
            self.script,
            format!("unrecognized character '{c}'"),
            true,
            span,
        );
        Token::new(TokenKind::Invalid, span)
    }
}
