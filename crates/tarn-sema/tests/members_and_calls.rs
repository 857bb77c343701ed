use tarn_frontend::ast::Stmt;
use tarn_frontend::parse_source;
use tarn_sema::{Analyzer, Diagnostic, Type};

fn analyze(src: &str) -> (Vec<Stmt>, Vec<Diagnostic>) {
    let mut stmts = parse_source(src).expect("parse ok");
    let mut a = Analyzer::new();
    a.analyze(&mut stmts);
    let diags = a.into_diagnostics();
    (stmts, diags)
}

fn expr_ty(stmt: &Stmt) -> &Type {
    match stmt {
        Stmt::Expr(e) => e.ty.as_ref().expect("decorated"),
        other => panic!("expected expression statement, got {other:?}"),
    }
}

#[test]
fn member_access_takes_the_field_type() {
    let src = "
        struct Point
            x: int
            y: int
        end
        var p: Point
        p.x
    ";
    let (stmts, diags) = analyze(src);
    assert!(diags.is_empty(), "unexpected diagnostics: {diags:?}");
    assert_eq!(expr_ty(&stmts[2]), &Type::Int);
}

#[test]
fn unknown_member_is_reported_and_recovers_with_void() {
    let src = "
        struct Point
            x: int
        end
        var p: Point
        p.z
    ";
    let (stmts, diags) = analyze(src);
    assert_eq!(
        diags,
        vec![Diagnostic::UnknownMember {
            ty: "Point".to_string(),
            member: "z".to_string(),
        }]
    );
    assert_eq!(expr_ty(&stmts[2]), &Type::Void);
}

#[test]
fn member_access_requires_a_struct_base() {
    let (_, diags) = analyze("var n = 1\nn.x");
    assert_eq!(diags, vec![Diagnostic::MemberOnNonStruct("int".to_string())]);
}

#[test]
fn indexing_requires_an_array_base() {
    let (_, diags) = analyze("var n = 1\nn[0]");
    assert_eq!(diags, vec![Diagnostic::IndexNonArray("int".to_string())]);
}

#[test]
fn index_type_is_the_element_type() {
    let (stmts, diags) = analyze("var a = [[1], [2]]\na[0]\na[0][1]");
    assert!(diags.is_empty(), "unexpected diagnostics: {diags:?}");
    assert_eq!(expr_ty(&stmts[1]), &Type::Array(Box::new(Type::Int)));
    assert_eq!(expr_ty(&stmts[2]), &Type::Int);
}

#[test]
fn non_integer_index_is_reported() {
    let (_, diags) = analyze("var a = [1]\na[1.5]");
    assert_eq!(diags, vec![Diagnostic::NonIntegerIndex("float".to_string())]);
}

#[test]
fn call_takes_the_return_type() {
    let src = "
        def one() -> int
            return 1
        end
        one()
    ";
    let (stmts, diags) = analyze(src);
    assert!(diags.is_empty(), "unexpected diagnostics: {diags:?}");
    assert_eq!(expr_ty(&stmts[1]), &Type::Int);
}

#[test]
fn arity_mismatch_is_reported() {
    let src = "
        def one() -> int
            return 1
        end
        one(2)
    ";
    let (_, diags) = analyze(src);
    assert_eq!(
        diags,
        vec![Diagnostic::ArityMismatch {
            name: "one".to_string(),
            expected: 0,
            found: 1,
        }]
    );
}

#[test]
fn calling_a_non_function_is_reported() {
    let (_, diags) = analyze("var f = 1\nf()");
    assert_eq!(diags, vec![Diagnostic::NotAFunction("f".to_string())]);
}

#[test]
fn calling_an_unknown_name_is_reported() {
    let (_, diags) = analyze("nope()");
    assert_eq!(diags, vec![Diagnostic::UndefinedFunction("nope".to_string())]);
}

#[test]
fn assignment_to_a_non_lvalue_is_reported() {
    let (_, diags) = analyze("1 = 2");
    assert_eq!(diags, vec![Diagnostic::AssignToNonLValue]);
}
