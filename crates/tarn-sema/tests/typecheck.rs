use tarn_frontend::ast::{Expr, ExprKind, Stmt};
use tarn_frontend::parse_source;
use tarn_sema::{Analyzer, Type};

fn assert_decorated_expr(e: &Expr) {
    assert!(e.ty.is_some(), "undecorated expression: {:?}", e.kind);
    match &e.kind {
        ExprKind::Binary { lhs, rhs, .. } => {
            assert_decorated_expr(lhs);
            assert_decorated_expr(rhs);
        }
        ExprKind::Call { args, .. } => args.iter().for_each(assert_decorated_expr),
        ExprKind::Member { base, .. } => assert_decorated_expr(base),
        ExprKind::Index { base, index } => {
            assert_decorated_expr(base);
            assert_decorated_expr(index);
        }
        ExprKind::ArrayLit(elems) => elems.iter().for_each(assert_decorated_expr),
        ExprKind::Literal(_) | ExprKind::Variable(_) => {}
    }
}

fn assert_decorated(stmts: &[Stmt]) {
    for stmt in stmts {
        match stmt {
            Stmt::Expr(e) => assert_decorated_expr(e),
            Stmt::VarDecl { init, .. } => {
                if let Some(init) = init {
                    assert_decorated_expr(init);
                }
            }
            Stmt::Return(value) => {
                if let Some(value) = value {
                    assert_decorated_expr(value);
                }
            }
            Stmt::Block(stmts) => assert_decorated(stmts),
            Stmt::If {
                cond,
                then_blk,
                else_blk,
            } => {
                assert_decorated_expr(cond);
                assert_decorated(then_blk);
                if let Some(else_blk) = else_blk {
                    assert_decorated(else_blk);
                }
            }
            Stmt::While { cond, body } => {
                assert_decorated_expr(cond);
                assert_decorated(body);
            }
            Stmt::Function(f) => {
                if let Some(body) = &f.body {
                    assert_decorated(body);
                }
            }
            Stmt::StructDecl { .. } => {}
        }
    }
}

fn expr_ty(stmt: &Stmt) -> &Type {
    match stmt {
        Stmt::Expr(e) => e.ty.as_ref().expect("decorated"),
        other => panic!("expected expression statement, got {other:?}"),
    }
}

#[test]
fn well_formed_program_is_fully_decorated() {
    let src = "
        extern def print_int(val: int)

        struct Point
            x: int
            y: int
        end

        def fib(n: int) -> int
            if n < 2
                return n
            end
            return fib(n-1) + fib(n-2)
        end

        def main()
            var p: Point
            p.x = 3
            p.y = 4
            var a = [10, 20, 30]
            print_int(fib(10) + p.x + a[1])
        end
    ";
    let mut stmts = parse_source(src).expect("parse ok");
    let mut a = Analyzer::new();
    a.analyze(&mut stmts);
    assert!(
        a.diagnostics().is_empty(),
        "unexpected diagnostics: {:?}",
        a.diagnostics()
    );
    assert_decorated(&stmts);
}

#[test]
fn literals_get_their_tag_types() {
    let mut stmts = parse_source("1 2.5 true \"s\"").expect("parse ok");
    Analyzer::new().analyze(&mut stmts);
    assert_eq!(expr_ty(&stmts[0]), &Type::Int);
    assert_eq!(expr_ty(&stmts[1]), &Type::Float);
    assert_eq!(expr_ty(&stmts[2]), &Type::Bool);
    assert_eq!(expr_ty(&stmts[3]), &Type::Str);
}

#[test]
fn int_arithmetic_yields_int_and_comparison_yields_bool() {
    let mut stmts = parse_source("1 + 2 * 3\n1 < 2\n1 == 2\n1 != 2").expect("parse ok");
    Analyzer::new().analyze(&mut stmts);
    assert_eq!(expr_ty(&stmts[0]), &Type::Int);
    assert_eq!(expr_ty(&stmts[1]), &Type::Bool);
    assert_eq!(expr_ty(&stmts[2]), &Type::Bool);
    assert_eq!(expr_ty(&stmts[3]), &Type::Bool);
}

#[test]
fn float_arithmetic_yields_float() {
    let mut stmts = parse_source("1.5 + 2.5\n1.5 * 2.0").expect("parse ok");
    Analyzer::new().analyze(&mut stmts);
    assert_eq!(expr_ty(&stmts[0]), &Type::Float);
    assert_eq!(expr_ty(&stmts[1]), &Type::Float);
}

#[test]
fn unrecognized_operand_mix_falls_back_to_left_type() {
    let mut stmts = parse_source("1 + 2.5").expect("parse ok");
    Analyzer::new().analyze(&mut stmts);
    assert_eq!(expr_ty(&stmts[0]), &Type::Int);
}

#[test]
fn assignment_takes_the_right_hand_type() {
    let mut stmts = parse_source("var x = 1\nx = 2").expect("parse ok");
    Analyzer::new().analyze(&mut stmts);
    assert_eq!(expr_ty(&stmts[1]), &Type::Int);
}

#[test]
fn var_type_comes_from_annotation_or_initializer() {
    let src = "
        var a: float
        var b = [1, 2]
        b[0]
        a + 0.5
    ";
    let mut stmts = parse_source(src).expect("parse ok");
    let mut analyzer = Analyzer::new();
    analyzer.analyze(&mut stmts);
    assert!(
        analyzer.diagnostics().is_empty(),
        "unexpected diagnostics: {:?}",
        analyzer.diagnostics()
    );
    assert_eq!(expr_ty(&stmts[2]), &Type::Int);
    assert_eq!(expr_ty(&stmts[3]), &Type::Float);
}

#[test]
fn empty_array_literal_falls_back_to_int_elements() {
    let mut stmts = parse_source("var a = []\na").expect("parse ok");
    Analyzer::new().analyze(&mut stmts);
    assert_eq!(expr_ty(&stmts[1]), &Type::Array(Box::new(Type::Int)));
}
