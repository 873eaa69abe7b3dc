#[cfg(test)]
mod tests {
    use crate::diag::Diagnostics;
    use crate::token::{LexOutput, Lexer, TokenKind};

    fn lex(src: &str) -> (LexOutput, Diagnostics) {
        let mut diags = Diagnostics::new();
        let out = Lexer::new("test", src, &mut diags).tokenize();
        (out, diags)
    }

    fn kinds(src: &str) -> Vec<TokenKind> {
        lex(src).0.tokens.iter().map(|t| t.kind).collect()
    }

    #[test]
    fn empty_function() {
        use TokenKind::*;
        let src = "void main() { }";
        let (out, diags) = lex(src);
        let e = vec![Void, Ident, LParen, RParen, LBrace, RBrace, Eof];
        let t: Vec<TokenKind> = out.tokens.iter().map(|t| t.kind).collect();
        assert_eq!(t, e);
        assert_eq!(out.tokens[1].text(src), "main");
        assert!(diags.is_empty());
    }

    #[test]
    fn shift_operators() {
        use TokenKind::*;
        let t = kinds(">> >>> >>= >>>= >= >");
        let e = vec![Shr, Ushr, ShrAssign, UshrAssign, Ge, Gt, Eof];
        assert_eq!(t, e);
    }

    #[test]
    fn compound_assignment_tokens() {
        use TokenKind::*;
        let t = kinds("+= -= *= /= %= <<= >>= >>>= &= |= ^=");
        let e = vec![
            AddAssign, SubAssign, MulAssign, DivAssign, ModAssign, ShlAssign, ShrAssign,
            UshrAssign, AndAssign, OrAssign, XorAssign, Eof,
        ];
        assert_eq!(t, e);
    }

    #[test]
    fn bitwise_vs_logical() {
        use TokenKind::*;
        let t = kinds("& && | || ^ ~ !");
        let e = vec![BitAnd, And, BitOr, Or, BitXor, Tilde, Not, Eof];
        assert_eq!(t, e);
    }

    #[test]
    fn numbers() {
        use TokenKind::*;
        let src = "42 0x2A 0b101010 0o52 1.5 2. 2.f 1.5f";
        let (out, diags) = lex(src);
        let t: Vec<TokenKind> = out.tokens.iter().map(|t| t.kind).collect();
        let e = vec![
            IntConst, IntConst, IntConst, IntConst, FloatConst, FloatConst, FloatConst,
            FloatConst, Eof,
        ];
        assert_eq!(t, e);
        assert_eq!(out.tokens[1].text(src), "0x2A");
        assert_eq!(out.tokens[6].text(src), "2.f");
        assert!(diags.is_empty());
    }

    #[test]
    fn int_then_identifier() {
        use TokenKind::*;
        // No trailing-f ints; "2f" is a number followed by a name.
        let t = kinds("2f");
        assert_eq!(t, vec![IntConst, Ident, Eof]);
    }

    #[test]
    fn string_span_covers_content() {
        let src = r#""abc""#;
        let (out, _) = lex(src);
        let tok = &out.tokens[0];
        assert_eq!(tok.kind, TokenKind::StringConst);
        assert_eq!(tok.text(src), "abc");
        assert_eq!(tok.span.start.column, 2);
        assert_eq!(tok.span.end.column, 5);
    }

    #[test]
    fn empty_string() {
        let src = r#""""#;
        let (out, diags) = lex(src);
        assert_eq!(out.tokens[0].kind, TokenKind::StringConst);
        assert_eq!(out.tokens[0].text(src), "");
        assert!(diags.is_empty());
    }

    #[test]
    fn escaped_quote_does_not_close() {
        let src = r#""a\"b""#;
        let (out, diags) = lex(src);
        assert_eq!(out.tokens[0].kind, TokenKind::StringConst);
        assert_eq!(out.tokens[0].text(src), r#"a\"b"#);
        assert!(diags.is_empty());
    }

    #[test]
    fn unterminated_string() {
        let (out, diags) = lex(r#""abc"#);
        assert_eq!(out.tokens[0].kind, TokenKind::Invalid);
        assert_eq!(diags.errors(), 1);
    }

    #[test]
    fn string_stops_at_newline() {
        let (out, diags) = lex("\"abc\nint x;");
        assert_eq!(out.tokens[0].kind, TokenKind::Invalid);
        assert_eq!(diags.errors(), 1);
        // Lexing continues on the next line.
        assert_eq!(out.tokens[1].kind, TokenKind::Int);
    }

    #[test]
    fn unterminated_block_comment() {
        let (out, diags) = lex("/* abc");
        assert_eq!(out.comments.len(), 1);
        assert_eq!(diags.errors(), 1);
        assert_eq!(out.tokens[0].kind, TokenKind::Invalid);
        assert_eq!(out.tokens[1].kind, TokenKind::Eof);
    }

    #[test]
    fn unrecognized_character_is_warning() {
        let (out, diags) = lex("int @ x;");
        assert_eq!(diags.warnings(), 1);
        assert_eq!(diags.errors(), 0);
        let t: Vec<TokenKind> = out.tokens.iter().map(|t| t.kind).collect();
        use TokenKind::*;
        assert_eq!(t, vec![Int, Invalid, Ident, Semicolon, Eof]);
    }

    #[test]
    fn unrecognized_multibyte_character() {
        let src = "int \u{20ac} x;";
        let (out, diags) = lex(src);
        assert_eq!(diags.warnings(), 1);
        assert_eq!(out.tokens[1].kind, TokenKind::Invalid);
        // The whole character is consumed, not just its first byte.
        assert_eq!(out.tokens[1].text(src), "\u{20ac}");
        assert_eq!(out.tokens[2].text(src), "x");
    }

    #[test]
    fn comments_kept_out_of_stream() {
        let src = "int a; // note\n/* b */ int c;";
        let (out, diags) = lex(src);
        assert!(out.tokens.iter().all(|t| t.kind != TokenKind::Comment));
        assert_eq!(out.comments.len(), 2);
        assert_eq!(out.comments[0].text(src), "// note");
        assert_eq!(out.comments[1].text(src), "/* b */");
        assert!(diags.is_empty());
    }

    #[test]
    fn keyword_prefixes_are_identifiers() {
        use TokenKind::*;
        let t = kinds("interior for_each whilex");
        assert_eq!(t, vec![Ident, Ident, Ident, Eof]);
        let t = kinds("for while if else");
        assert_eq!(t, vec![For, While, If, Else, Eof]);
    }

    #[test]
    fn object_constants() {
        use TokenKind::*;
        let t = kinds("OBJECT_INVALID OBJECT_SELF OBJECT_SELFISH");
        assert_eq!(t, vec![ObjectInvalidConst, ObjectSelfConst, Ident, Eof]);
    }

    #[test]
    fn line_continuation_is_whitespace() {
        use TokenKind::*;
        let src = "int\\\nx;";
        let (out, diags) = lex(src);
        let t: Vec<TokenKind> = out.tokens.iter().map(|t| t.kind).collect();
        assert_eq!(t, vec![Int, Ident, Semicolon, Eof]);
        assert_eq!(out.tokens[1].span.start.line, 2);
        assert!(diags.is_empty());
    }

    #[test]
    fn pound_directive_tokens() {
        use TokenKind::*;
        let t = kinds(r#"#include "util""#);
        assert_eq!(t, vec![Pound, Ident, StringConst, Eof]);
    }

    #[test]
    fn token_positions() {
        let src = "a\nbb";
        let (out, _) = lex(src);
        let a = out.tokens[0].span;
        assert_eq!((a.start.line, a.start.column), (1, 1));
        assert_eq!((a.end.line, a.end.column), (1, 2));
        let bb = out.tokens[1].span;
        assert_eq!((bb.start.line, bb.start.column), (2, 1));
        assert_eq!((bb.end.line, bb.end.column), (2, 3));
        let eof = out.tokens[2].span;
        assert_eq!(eof.start, eof.end);
        assert_eq!(eof.start.offset, src.len());
    }

    #[test]
    fn dot_is_not_a_float_start() {
        use TokenKind::*;
        let t = kinds("v.x");
        assert_eq!(t, vec![Ident, Dot, Ident, Eof]);
    }

    #[test]
    fn tokens_pull_one_at_a_time() {
        use TokenKind::*;
        let mut diags = Diagnostics::new();
        let mut lexer = Lexer::new("test", "int x; // tail", &mut diags);
        assert_eq!(lexer.next().kind, Int);
        assert_eq!(lexer.next().kind, Ident);
        assert_eq!(lexer.next().kind, Semicolon);
        // The trailing comment is swallowed on the way to Eof, which then
        // repeats forever.
        assert_eq!(lexer.next().kind, Eof);
        assert_eq!(lexer.next().kind, Eof);
    }
}
