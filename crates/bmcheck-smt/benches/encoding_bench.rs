use criterion::{black_box, criterion_group, criterion_main, Criterion};

use bmcheck_ir::expr::{BinaryOp, Expr};
use bmcheck_ir::types::{Component, Type, TypeId, TypeTable};
use bmcheck_smt::expr_encoding::ExprEncoder;
use bmcheck_smt::struct_encoding::StructEncoder;

/// A chain of structs where each level holds the previous one twice.
fn nested_table(depth: usize) -> (TypeTable, TypeId) {
    let mut types = TypeTable::new();
    let mut last = types
        .insert(
            "leaf",
            vec![
                Component::new("a", Type::Unsigned(8)),
                Component::new("b", Type::Signed(16)),
                Component::new("ok", Type::Bool),
            ],
        )
        .unwrap();
    for level in 0..depth {
        last = types
            .insert(
                format!("level{level}"),
                vec![
                    Component::new("left", Type::Struct(last)),
                    Component::new("right", Type::Struct(last)),
                ],
            )
            .unwrap();
    }
    (types, last)
}

fn bench_encode_nested_struct_array(c: &mut Criterion) {
    let (types, top) = nested_table(4);
    let ty = Type::array_of_len(Type::array_of_len(Type::Struct(top), 8), 8);
    c.bench_function("encode_nested_struct_array", |b| {
        b.iter(|| {
            let enc = StructEncoder::new(&types);
            enc.encode(black_box(&ty)).unwrap()
        })
    });
}

fn bench_translate_member_chain(c: &mut Criterion) {
    let (types, top) = nested_table(4);
    let structs = StructEncoder::new(&types);
    let enc = ExprEncoder::new(&structs);
    let mut expr = Expr::symbol("s!1", Type::Struct(top));
    let mut current = top;
    while let Some(def) = types.get(current) {
        let Some(first) = def.components.first() else {
            break;
        };
        expr = Expr::member(expr, first.name.clone(), first.ty.clone());
        match first.ty {
            Type::Struct(inner) => current = inner,
            _ => break,
        }
    }
    let cond = Expr::binary(
        BinaryOp::Lt,
        expr,
        Expr::constant(3, Type::Unsigned(8)),
    );
    c.bench_function("translate_member_chain", |b| {
        b.iter(|| enc.translate(black_box(&cond)).unwrap())
    });
}

criterion_group!(
    benches,
    bench_encode_nested_struct_array,
    bench_translate_member_chain
);
criterion_main!(benches);
