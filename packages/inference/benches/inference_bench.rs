use criterion::{black_box, criterion_group, criterion_main, Criterion};
use miniscript_ast::{AstBuilder, Chunk, Statement};
use miniscript_inference::{Document, InferenceOptions, StructuralHasher};

/// A root block with `count` map objects, each carrying a few members and a
/// method reading them through `self`
fn build_program(count: usize) -> Chunk {
    let mut ast = AstBuilder::new("/bench.src");
    let mut body: Vec<Statement> = Vec::new();

    for index in 0..count {
        let name = format!("obj{}", index);

        let target = ast.identifier(name.as_str());
        let init = ast.map(vec![]);
        body.push(ast.assign(target, init));

        let target = ast.path(&format!("{}.label", name));
        let init = ast.string("item");
        body.push(ast.assign(target, init));

        let base = ast.identifier(name.as_str());
        let key = ast.number(index as f64);
        let target = ast.index(base, key);
        let one = ast.number(1.0);
        let two = ast.number(2.0);
        let init = ast.list(vec![one, two]);
        body.push(ast.assign(target, init));

        let local = ast.identifier("text");
        let read = ast.path("self.label");
        let upper = ast.member(read, "upper");
        let call = ast.call(upper, vec![]);
        let method_body = ast.assign(local, call);
        let method = ast.function(vec![], vec![method_body]);
        let target = ast.path(&format!("{}.render", name));
        body.push(ast.assign(target, method));
    }

    ast.chunk(body)
}

fn analyze_small_document(c: &mut Criterion) {
    let chunk = build_program(10);

    c.bench_function("analyze_small_document", |b| {
        b.iter(|| {
            let mut document =
                Document::with_intrinsics(black_box(&chunk), InferenceOptions::default()).unwrap();
            document.analyze().unwrap();
            document
        })
    });
}

fn analyze_large_document(c: &mut Criterion) {
    let chunk = build_program(200);

    c.bench_function("analyze_large_document", |b| {
        b.iter(|| {
            let mut document =
                Document::with_intrinsics(black_box(&chunk), InferenceOptions::default()).unwrap();
            document.analyze().unwrap();
            document
        })
    });
}

fn hash_access_chains(c: &mut Criterion) {
    let mut ast = AstBuilder::new("/bench.src");
    let chains: Vec<_> = (0..100)
        .map(|index| ast.path(&format!("locals.root{}.child.leaf{}", index % 7, index)))
        .collect();

    c.bench_function("hash_access_chains", |b| {
        b.iter(|| {
            // Fresh hasher each round; node memos are already warm after the
            // first iteration, so this measures the memoized path
            let hasher = StructuralHasher::default();
            for chain in &chains {
                black_box(hasher.hash(chain));
                black_box(hasher.id(chain));
            }
        })
    });
}

criterion_group!(
    benches,
    analyze_small_document,
    analyze_large_document,
    hash_access_chains
);
criterion_main!(benches);
