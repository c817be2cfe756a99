use criterion::{black_box, criterion_group, criterion_main, Criterion};
use layerfilter::*;
use std::sync::Arc;

const FILTER: &str = r#"{"type":"AND","children":[
    {"type":"ATTRIBUTE","attribute":"ComponentType","operator":"Equals","value":"Form"},
    {"type":"HAS_NONE","solutions":["Legacy"]},
    {"type":"ORDER_FLEX","sequence":["Base",["Patch","Hotfix"],"Dev"]}
]}"#;

fn store() -> MemoryStore {
    let components = (0..500)
        .map(|i| {
            let mut c = Component::new(format!("form{}", i), if i % 3 == 0 { "View" } else { "Form" })
                .layer(Layer::new("Base", 0))
                .layer(Layer::new(if i % 2 == 0 { "Patch" } else { "Hotfix" }, 1));
            if i % 5 != 0 {
                c = c.layer(
                    Layer::new("Dev", 2)
                        .attribute(LayerAttribute::new("formxml", format!("<form id=\"{}\"/>", i), AttributeType::Xml).changed(true)),
                );
            }
            c
        })
        .collect();
    MemoryStore::new(components)
}

fn bench_plan_build_execute(c: &mut Criterion) {
    let filter = FilterNode::from_json(FILTER).unwrap();
    let planner = QueryPlanner::new(PlannerConfig::default().rank_by_selectivity(true));
    let excluded = ExcludedAttributes::default();
    let store = store();
    let sample = &store.components()[1];

    c.bench_function("decode", |b| {
        b.iter(|| {
            let _ = FilterNode::from_json(black_box(FILTER));
        })
    });
    c.bench_function("plan", |b| {
        b.iter(|| {
            let _ = planner.plan(black_box(Some(&filter)));
        })
    });
    c.bench_function("build_predicate", |b| {
        let builder = PredicateBuilder::new(&excluded);
        b.iter(|| {
            let _ = builder.build(black_box(Some(&filter)));
        })
    });
    c.bench_function("evaluate", |b| {
        let evaluator = Evaluator::new(&excluded);
        b.iter(|| {
            let _ = evaluator.evaluate(Some(&filter), black_box(sample));
        })
    });
    let compiled = CompiledFilter::new(Some(filter.clone()), Arc::new(PlannerConfig::default()));
    c.bench_function("execute_memory_store", |b| {
        b.iter(|| {
            let _ = compiled.execute(black_box(&store));
        })
    });
}

criterion_group!(benches, bench_plan_build_execute);
criterion_main!(benches);
