//! Single-walk arena construction vs repeated index lookups.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use auditor_engine::features::file_context::{FileContext, NodeKind};
use auditor_engine::Language;

fn synthetic_module(functions: usize) -> String {
    let mut source = String::from("import os\n\n");
    for i in 0..functions {
        source.push_str(&format!(
            "def handler_{i}(request):\n    q_{i} = request.args.get('q')\n    sql_{i} = f\"SELECT * FROM t_{i} WHERE v = '{{q_{i}}}'\"\n    cursor.execute(sql_{i})\n    return sql_{i}\n\n"
        ));
    }
    source
}

fn bench_build(c: &mut Criterion) {
    let source = synthetic_module(200);
    c.bench_function("file_context_build_200_functions", |b| {
        b.iter(|| {
            let ctx = FileContext::parse("bench.py", Language::Python, black_box(&source))
                .expect("parse");
            black_box(ctx.node_count())
        })
    });
}

fn bench_lookup(c: &mut Criterion) {
    let source = synthetic_module(200);
    let ctx = FileContext::parse("bench.py", Language::Python, &source).expect("parse");
    c.bench_function("node_index_lookup", |b| {
        b.iter(|| {
            let calls = ctx.find_nodes(&NodeKind::Call).len();
            let assignments = ctx.find_nodes(&NodeKind::Assignment).len();
            black_box(calls + assignments)
        })
    });
}

criterion_group!(benches, bench_build, bench_lookup);
criterion_main!(benches);
