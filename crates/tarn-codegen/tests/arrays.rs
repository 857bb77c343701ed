use pretty_assertions::assert_eq;
use tarn_ir::{Inst, IrType, Module};

fn compile(src: &str) -> Module {
    let mut stmts = tarn_frontend::parse_source(src).expect("parse ok");
    let mut analyzer = tarn_sema::Analyzer::new();
    analyzer.analyze(&mut stmts);
    assert!(
        analyzer.diagnostics().is_empty(),
        "diagnostics: {:?}",
        analyzer.diagnostics()
    );
    tarn_codegen::lower(&stmts)
}

#[test]
fn array_literal_mallocs_count_times_element_size() {
    let module = compile("var a = [10, 20, 30]");
    let sig = module.externs.get("malloc").expect("malloc declared lazily");
    assert_eq!(sig.params, vec![IrType::I64]);
    assert_eq!(sig.ret, IrType::Ptr(Box::new(IrType::I8)));

    let main = module.function("main").expect("entry");
    let insts = &main.entry().insts;
    let call_pos = insts
        .iter()
        .position(|i| matches!(i, Inst::Call { callee, .. } if callee == "malloc"))
        .expect("malloc call");
    // Three 8-byte elements.
    assert!(matches!(insts[call_pos - 1], Inst::ConstInt { value: 24, .. }));
}

#[test]
fn elements_are_stored_in_order() {
    let module = compile("var a = [10, 20, 30]");
    let main = module.function("main").expect("entry");
    let insts = &main.entry().insts;
    let elem_addrs = insts
        .iter()
        .filter(|i| matches!(i, Inst::ElemAddr { .. }))
        .count();
    let values: Vec<i64> = insts
        .iter()
        .filter_map(|i| match i {
            Inst::ConstInt { value, .. } => Some(*value),
            _ => None,
        })
        .collect();
    assert_eq!(elem_addrs, 3);
    // The malloc size, then element values interleaved with their indices;
    // the trailing zero is the entry function's synthesized return value.
    assert_eq!(values, vec![24, 10, 0, 20, 1, 30, 2, 0]);
}

#[test]
fn malloc_is_declared_once() {
    let module = compile("var a = [1]\nvar b = [2]");
    assert_eq!(
        module.externs.keys().filter(|k| k.as_str() == "malloc").count(),
        1
    );
}

#[test]
fn malloc_is_not_declared_without_array_literals() {
    let module = compile("var x = 1");
    assert!(module.externs.get("malloc").is_none());
}

#[test]
fn index_reads_load_through_the_element_address() {
    let src = "
        extern def print_int(val: int)
        var a = [10, 20, 30]
        print_int(a[1] + a[2])
    ";
    let module = compile(src);
    let main = module.function("main").expect("entry");
    let insts = &main.entry().insts;
    let elem_loads = insts
        .iter()
        .filter(|i| matches!(i, Inst::Load { ty: IrType::I64, .. }))
        .count();
    // One element load each for a[1] and a[2]; the array pointer loads are
    // typed i8* and not counted here.
    assert_eq!(elem_loads, 2);
    assert!(insts
        .iter()
        .any(|i| matches!(i, Inst::Call { callee, .. } if callee == "print_int")));
}

#[test]
fn struct_element_arrays_size_by_layout() {
    let src = "
        struct Pair
            a: int
            b: int
        end

        def f(p: Pair)
            var xs = [p, p]
        end
    ";
    let module = compile(src);
    let f = module.function("f").expect("defined");
    let insts = &f.entry().insts;
    let call_pos = insts
        .iter()
        .position(|i| matches!(i, Inst::Call { callee, .. } if callee == "malloc"))
        .expect("malloc call");
    // Two 16-byte structs.
    assert!(matches!(insts[call_pos - 1], Inst::ConstInt { value: 32, .. }));
}
