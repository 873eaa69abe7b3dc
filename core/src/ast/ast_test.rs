#[cfg(test)]
mod test {
    use crate::{
        ast::{Ast, AstPrinter, Decl, Expr, Parser, Stmt, VarRole},
        diag::Diagnostics,
        token::TokenKind,
    };

    fn parse_src(src: &str) -> (Ast, Diagnostics) {
        let mut diags = Diagnostics::new();
        let ast = Parser::new("test", src, &mut diags).parse();
        (ast, diags)
    }

    fn parse_clean(src: &str) -> Ast {
        let (ast, diags) = parse_src(src);
        assert_eq!(diags.errors(), 0, "unexpected errors: {:?}", diags.records());
        ast
    }

    fn body_stmts(ast: &Ast) -> Vec<crate::ast::NodeId> {
        for id in &ast.decls {
            if let Some(Decl::FuncDef { body, .. }) = ast.decl(*id) {
                if let Some(Stmt::Block { stmts }) = ast.stmt(*body) {
                    return stmts.clone();
                }
            }
        }
        panic!("no function body in {:?}", ast.decls);
    }

    fn first_expr(ast: &Ast) -> crate::ast::NodeId {
        let stmts = body_stmts(ast);
        match ast.stmt(stmts[0]) {
            Some(Stmt::Expr { expr }) => *expr,
            other => panic!("expected expression statement, got {other:?}"),
        }
    }

    #[test]
    fn function_definition() {
        let ast = parse_clean("void main() { }");
        assert_eq!(ast.decls.len(), 1);
        let Some(Decl::FuncDef { decl, body }) = ast.decl(ast.decls[0]) else {
            panic!("expected a function definition");
        };
        let Some(Decl::Func(f)) = ast.decl(*decl) else {
            panic!("expected a function header");
        };
        assert_eq!(f.name, "main");
        assert!(f.params.is_empty());
        let Some(Stmt::Block { stmts }) = ast.stmt(*body) else {
            panic!("expected a block body");
        };
        assert!(stmts.is_empty());
    }

    #[test]
    fn prototype_params() {
        let ast = parse_clean("void f(string s, int b);");
        let Some(Decl::Func(f)) = ast.decl(ast.decls[0]) else {
            panic!("expected a prototype");
        };
        assert_eq!(f.name, "f");
        assert_eq!(f.params.len(), 2);
        let types: Vec<_> = f
            .params
            .iter()
            .map(|p| match ast.decl(*p) {
                Some(Decl::Var(v)) => v.ty.display_name(),
                other => panic!("expected a parameter, got {other:?}"),
            })
            .collect();
        assert_eq!(types, vec!["string", "int"]);
        let Some(Decl::Var(p)) = ast.decl(f.params[0]) else {
            panic!("expected a parameter");
        };
        assert_eq!(p.name, "s");
        assert_eq!(p.role, VarRole::Param);
        assert!(p.init.is_none());
    }

    #[test]
    fn prototype_missing_semicolon() {
        let (ast, diags) = parse_src("void f(string s, int b)");
        // The declaration survives with exactly one complaint.
        assert_eq!(ast.decls.len(), 1);
        let Some(Decl::Func(f)) = ast.decl(ast.decls[0]) else {
            panic!("expected a prototype");
        };
        assert_eq!(f.params.len(), 2);
        assert_eq!(diags.errors(), 1);
        assert_eq!(diags.records()[0].message, "expected ';', found end of file");
    }

    #[test]
    fn keyword_like_globals() {
        let ast = parse_clean("int TRUE = 1;\nconst int MY_GLOBAL = 1;");
        assert_eq!(ast.decls.len(), 2);
        let Some(Decl::Var(v)) = ast.decl(ast.decls[1]) else {
            panic!("expected a variable");
        };
        assert!(v.ty.is_const);
        assert_eq!(v.name, "MY_GLOBAL");
    }

    #[test]
    fn missing_semicolon_at_eof() {
        let (ast, diags) = parse_src("int x = 1");
        assert_eq!(ast.decls.len(), 1);
        let Some(Decl::Var(v)) = ast.decl(ast.decls[0]) else {
            panic!("expected a variable");
        };
        assert!(v.init.is_some());
        assert_eq!(diags.errors(), 1);
        assert_eq!(diags.records()[0].message, "expected ';', found end of file");
    }

    #[test]
    fn declarator_list() {
        let ast = parse_clean("int a = 3, b, c = 1;");
        let Some(Decl::List { decls }) = ast.decl(ast.decls[0]) else {
            panic!("expected a declaration list");
        };
        assert_eq!(decls.len(), 3);
        let names: Vec<_> = decls
            .iter()
            .map(|d| match ast.decl(*d) {
                Some(Decl::Var(v)) => (v.name.clone(), v.init.is_some()),
                other => panic!("expected a variable, got {other:?}"),
            })
            .collect();
        assert_eq!(
            names,
            vec![
                ("a".to_string(), true),
                ("b".to_string(), false),
                ("c".to_string(), true)
            ]
        );
    }

    #[test]
    fn spurious_semicolon_is_warning() {
        let (ast, diags) = parse_src("int a;;");
        assert_eq!(ast.decls.len(), 1);
        assert_eq!(diags.errors(), 0);
        assert_eq!(diags.warnings(), 1);
    }

    #[test]
    fn include_and_define() {
        let ast = parse_clean("#include \"util\"\n#define COUNT 5\nvoid main() { }");
        assert_eq!(ast.includes.len(), 1);
        assert_eq!(ast.includes[0].name, "util");
        assert_eq!(ast.defines.len(), 1);
        assert_eq!(ast.defines[0].name, "COUNT");
        assert_eq!(ast.defines[0].value, "5");
        assert_eq!(ast.define_value("COUNT"), Some("5"));
        assert_eq!(ast.define_value("MISSING"), None);
    }

    #[test]
    fn unknown_directive_recovers() {
        let (ast, diags) = parse_src("#pragma x\nvoid main() { }");
        assert_eq!(diags.errors(), 1);
        assert!(diags.records()[0].message.contains("'#pragma'"));
        // A placeholder marks the skipped region, then parsing resumes.
        assert_eq!(ast.decls.len(), 2);
        assert!(matches!(ast.stmt(ast.decls[0]), Some(Stmt::Empty)));
        assert!(matches!(ast.decl(ast.decls[1]), Some(Decl::FuncDef { .. })));
    }

    #[test]
    fn duplicate_includes_collapse() {
        let ast = parse_clean("#include \"util\"\n#include \"util\"\n#include \"other\"\n");
        assert_eq!(ast.includes.len(), 2);
        assert_eq!(ast.includes[0].name, "util");
        assert_eq!(ast.includes[0].used, 2);
        assert_eq!(ast.includes[1].used, 1);
        assert!(!ast.includes[0].resolved);
    }

    #[test]
    fn struct_declaration() {
        let ast = parse_clean("struct Vec2 { float x; float y; };");
        let Some(Decl::Struct { name, fields, .. }) = ast.decl(ast.decls[0]) else {
            panic!("expected a struct");
        };
        assert_eq!(name, "Vec2");
        assert_eq!(fields.len(), 2);
        for field in fields {
            let Some(Decl::Var(v)) = ast.decl(*field) else {
                panic!("expected a field");
            };
            assert_eq!(v.role, VarRole::Field);
        }
    }

    #[test]
    fn struct_variable() {
        let ast = parse_clean("struct Vec2 { float x; };\nstruct Vec2 origin;");
        assert_eq!(ast.decls.len(), 2);
        let Some(Decl::Var(v)) = ast.decl(ast.decls[1]) else {
            panic!("expected a variable");
        };
        assert_eq!(v.ty.struct_name.as_deref(), Some("Vec2"));
        assert_eq!(v.ty.display_name(), "struct Vec2");
    }

    #[test]
    fn multiplication_binds_tighter() {
        let ast = parse_clean("void main() { x = 1 + 2 * 3; }");
        let assign = first_expr(&ast);
        let Some(Expr::Assign { rhs, .. }) = ast.expr(assign) else {
            panic!("expected an assignment");
        };
        let Some(Expr::Binary {
            op: TokenKind::Add,
            rhs: mul,
            ..
        }) = ast.expr(*rhs)
        else {
            panic!("expected addition at the top");
        };
        assert!(matches!(
            ast.expr(*mul),
            Some(Expr::Binary {
                op: TokenKind::Mul,
                ..
            })
        ));
    }

    #[test]
    fn assignment_is_right_associative() {
        let ast = parse_clean("void main() { a = b = 1; }");
        let outer = first_expr(&ast);
        let Some(Expr::Assign { rhs, .. }) = ast.expr(outer) else {
            panic!("expected an assignment");
        };
        assert!(matches!(ast.expr(*rhs), Some(Expr::Assign { .. })));
    }

    #[test]
    fn compound_assignment() {
        let ast = parse_clean("void main() { x += 2; }");
        let expr = first_expr(&ast);
        let Some(Expr::Assign { op, .. }) = ast.expr(expr) else {
            panic!("expected an assignment");
        };
        assert_eq!(*op, TokenKind::AddAssign);
        assert_eq!(op.compound_base(), Some(TokenKind::Add));
    }

    #[test]
    fn ternary_expression() {
        let ast = parse_clean("void main() { x = a > 0 ? 1 : 2; }");
        let assign = first_expr(&ast);
        let Some(Expr::Assign { rhs, .. }) = ast.expr(assign) else {
            panic!("expected an assignment");
        };
        let Some(Expr::Ternary { cond, .. }) = ast.expr(*rhs) else {
            panic!("expected a ternary");
        };
        assert!(matches!(ast.expr(*cond), Some(Expr::Comparison { .. })));
    }

    #[test]
    fn dot_access() {
        let ast = parse_clean("void main() { v.x = 1.5; }");
        let assign = first_expr(&ast);
        let Some(Expr::Assign { lhs, .. }) = ast.expr(assign) else {
            panic!("expected an assignment");
        };
        let Some(Expr::Dot { lhs: base, field }) = ast.expr(*lhs) else {
            panic!("expected member access");
        };
        assert!(matches!(ast.expr(*base), Some(Expr::Variable { name }) if name == "v"));
        assert!(matches!(ast.expr(*field), Some(Expr::Variable { name }) if name == "x"));
    }

    #[test]
    fn call_arguments_and_commas() {
        let src = "void main() { Attack(target, 2); }";
        let ast = parse_clean(src);
        let call = first_expr(&ast);
        let Some(Expr::Call {
            callee,
            args,
            args_span,
            commas,
        }) = ast.expr(call)
        else {
            panic!("expected a call");
        };
        assert!(matches!(ast.expr(*callee), Some(Expr::Variable { name }) if name == "Attack"));
        assert_eq!(args.len(), 2);
        assert_eq!(args_span.start.offset, src.find('(').unwrap());
        assert_eq!(args_span.end.offset, src.find(')').unwrap() + 1);
        assert_eq!(commas.len(), 1);
        assert_eq!(commas[0].offset, src.find(',').unwrap() + 1);
    }

    #[test]
    fn vector_literal_components() {
        let ast = parse_clean("void main() { v = [1.0, 2.5, 3]; }");
        let assign = first_expr(&ast);
        let Some(Expr::Assign { rhs, .. }) = ast.expr(assign) else {
            panic!("expected an assignment");
        };
        let Some(Expr::LiteralVector { x, y, z }) = ast.expr(*rhs) else {
            panic!("expected a vector literal");
        };
        assert_eq!((*x, *y, *z), (1.0, 2.5, 3.0));
    }

    #[test]
    fn if_else_chain() {
        let ast = parse_clean("void main() { if (a) { } else if (b) { } else { } }");
        let stmts = body_stmts(&ast);
        let Some(Stmt::If { else_branch, .. }) = ast.stmt(stmts[0]) else {
            panic!("expected an if");
        };
        let inner = else_branch.expect("expected an else branch");
        let Some(Stmt::If { else_branch, .. }) = ast.stmt(inner) else {
            panic!("expected a chained if");
        };
        assert!(else_branch.is_some());
    }

    #[test]
    fn for_with_empty_clauses() {
        let ast = parse_clean("void main() { for (;;) { break; } }");
        let stmts = body_stmts(&ast);
        let Some(Stmt::For {
            init, cond, update, ..
        }) = ast.stmt(stmts[0])
        else {
            panic!("expected a for");
        };
        assert!(init.is_none() && cond.is_none() && update.is_none());
    }

    #[test]
    fn do_while_loop() {
        let ast = parse_clean("void main() { do x = x + 1; while (x < 10); }");
        let stmts = body_stmts(&ast);
        let Some(Stmt::Do { body, cond }) = ast.stmt(stmts[0]) else {
            panic!("expected a do loop");
        };
        assert!(matches!(ast.stmt(*body), Some(Stmt::Expr { .. })));
        assert!(matches!(ast.expr(*cond), Some(Expr::Comparison { .. })));
    }

    #[test]
    fn switch_labels() {
        let ast = parse_clean("void main() { switch (n) { case 1: return; default: break; } }");
        let stmts = body_stmts(&ast);
        let Some(Stmt::Switch { body, .. }) = ast.stmt(stmts[0]) else {
            panic!("expected a switch");
        };
        let Some(Stmt::Block { stmts: labels }) = ast.stmt(*body) else {
            panic!("expected a switch block");
        };
        let kinds: Vec<_> = labels
            .iter()
            .map(|s| match ast.stmt(*s) {
                Some(Stmt::Label { kind, .. }) => *kind,
                Some(Stmt::Jump { kind, .. }) => *kind,
                other => panic!("unexpected statement {other:?}"),
            })
            .collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Case,
                TokenKind::Return,
                TokenKind::Default,
                TokenKind::Break
            ]
        );
    }

    #[test]
    fn broken_initializer_keeps_declaration() {
        let (ast, diags) = parse_src("void main() { int x = ; x = 1; }");
        assert_eq!(diags.errors(), 1);
        assert_eq!(diags.records()[0].message, "expected an expression, found ';'");
        let stmts = body_stmts(&ast);
        assert_eq!(stmts.len(), 2);
        let Some(Decl::Var(v)) = ast.decl(stmts[0]) else {
            panic!("the declaration should survive");
        };
        assert_eq!(v.name, "x");
        let init = v.init.expect("placeholder initializer");
        assert!(matches!(ast.expr(init), Some(Expr::Empty)));
        assert!(matches!(ast.stmt(stmts[1]), Some(Stmt::Expr { .. })));
    }

    #[test]
    fn block_recovery_keeps_following_statements() {
        let (ast, diags) = parse_src("void main() { ); x = 1; }");
        assert_eq!(diags.errors(), 1);
        assert_eq!(diags.records()[0].message, "expected an expression, found ')'");
        let stmts = body_stmts(&ast);
        assert_eq!(stmts.len(), 2);
        assert!(matches!(ast.stmt(stmts[0]), Some(Stmt::Empty)));
        assert!(matches!(ast.stmt(stmts[1]), Some(Stmt::Expr { .. })));
    }

    #[test]
    fn top_level_recovery() {
        let (ast, diags) = parse_src("+ +\nvoid main() { }");
        assert_eq!(diags.errors(), 1);
        assert_eq!(ast.decls.len(), 2);
        assert!(matches!(ast.stmt(ast.decls[0]), Some(Stmt::Empty)));
        assert!(matches!(ast.decl(ast.decls[1]), Some(Decl::FuncDef { .. })));
    }

    #[test]
    fn unclosed_block_at_eof() {
        let (ast, diags) = parse_src("void main() { x = 1;");
        assert_eq!(diags.errors(), 1);
        assert_eq!(diags.records()[0].message, "expected '}', found end of file");
        assert_eq!(ast.decls.len(), 1);
        let stmts = body_stmts(&ast);
        assert_eq!(stmts.len(), 1);
    }

    #[test]
    fn comments_merge_and_lookup() {
        let src = "// Attack helper\n// with two lines\nvoid attack() { }\n\nint other; // trailing\n";
        let ast = parse_clean(src);
        assert_eq!(ast.comments.len(), 2);
        assert_eq!(ast.comments[0].text, "// Attack helper\n// with two lines");
        // The merged comment ends on line 2, so it documents line 3.
        let doc = ast.find_comment(3).expect("comment above the function");
        assert_eq!(doc.text, "// Attack helper\n// with two lines");
        let trailing = ast.find_comment(5).expect("comment on the same line");
        assert_eq!(trailing.text, "// trailing");
    }

    #[test]
    fn printer_formats_function() {
        let ast = parse_clean("int add(int a,int b){return a+b;}");
        let printed = AstPrinter::print(&ast);
        assert_eq!(printed, "int add(int a, int b)\n{\n    return a + b;\n}\n");
    }

    #[test]
    fn printer_fixed_point() {
        let src = r#"#include "util"
#define COUNT 5

int total = 0;

int add(int a, int b);

void main()
{
    int x = add(1, 2);
    if (x > 0)
    {
        x = x - 1;
    }
    while (x < COUNT_MAX)
    {
        x++;
    }
}
"#;
        let ast = parse_clean(src);
        let printed = AstPrinter::print(&ast);
        let ast2 = parse_clean(&printed);
        assert_eq!(AstPrinter::print(&ast2), printed);
    }

    #[test]
    fn unary_chain() {
        let ast = parse_clean("void main() { x = -~y; }");
        let assign = first_expr(&ast);
        let Some(Expr::Assign { rhs, .. }) = ast.expr(assign) else {
            panic!("expected an assignment");
        };
        let Some(Expr::Unary {
            op: TokenKind::Sub,
            operand,
        }) = ast.expr(*rhs)
        else {
            panic!("expected negation");
        };
        assert!(matches!(
            ast.expr(*operand),
            Some(Expr::Unary {
                op: TokenKind::Tilde,
                ..
            })
        ));
    }

    #[test]
    fn postfix_increment() {
        let ast = parse_clean("void main() { i++; }");
        let expr = first_expr(&ast);
        assert!(matches!(
            ast.expr(expr),
            Some(Expr::Postfix {
                op: TokenKind::PlusPlus,
                ..
            })
        ));
    }

    #[test]
    fn single_declarator_span_covers_type() {
        let src = "int counter = 0;";
        let ast = parse_clean(src);
        let span = ast.span(ast.decls[0]);
        assert_eq!(span.start.offset, 0);
        assert_eq!(span.end.offset, src.find(';').unwrap());
    }

    #[test]
    fn spans_nest_or_stay_apart() {
        let src = r#"
            int LIMIT = 4;

            int clamp(int value) {
                if (value > LIMIT) {
                    return LIMIT;
                }
                return value;
            }

            void main() {
                int i;
                for (i = 0; i < 3; i = i + 1) {
                    clamp(i * 2);
                }
            }
        "#;
        let ast = parse_clean(src);
        let spans: Vec<_> = (0..ast.len())
            .map(|i| ast.span(crate::ast::NodeId(i as u32)))
            .collect();
        for (i, a) in spans.iter().enumerate() {
            for b in &spans[i + 1..] {
                let (first, second) = if a.start.offset <= b.start.offset {
                    (a, b)
                } else {
                    (b, a)
                };
                let split = first.start.offset < second.start.offset
                    && second.start.offset < first.end.offset
                    && first.end.offset < second.end.offset;
                assert!(!split, "partially overlapping node spans: {a:?} / {b:?}");
            }
        }
    }
}
