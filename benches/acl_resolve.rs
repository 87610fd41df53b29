use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, SamplingMode, Throughput};
use serde_json::{json, Value};

use tollgate::acl::{combine, merge, project_many, resolve, Action, Document, FieldProjection, PermissionDescriptor, Query};
use tollgate::identity::ClientIdentity;

const RES: &str = "collection:bench_records";

fn gen_docs(n: usize) -> Vec<Document> {
    (0..n)
        .map(|i| {
            let v = json!({
                "_id": format!("doc{}", i),
                "title": format!("title {}", i),
                "field1": if i % 3 == 0 { "Value one" } else { "Value two" },
                "score": i,
                "notes": "x".repeat(32),
                "_createdBy": "benchClient"
            });
            match v { Value::Object(m) => m, _ => Document::new() }
        })
        .collect()
}

fn bench_client(resources: usize) -> ClientIdentity {
    let mut c = ClientIdentity::new("benchClient");
    for i in 0..resources {
        let acl = json!({
            "read": { "filter": { "field1": "Value one" }, "fields": { "notes": 0 } },
            "updateOwn": true,
            "create": { "fields": { "title": 1, "field1": 1 } }
        });
        if let Ok(d) = PermissionDescriptor::from_json(acl) {
            c = c.with_resource(format!("collection:bench_records{}", i), d.clone());
            if i == 0 { c = c.with_resource(RES, d); }
        }
    }
    c
}

fn bench_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("acl_resolve");
    group.sampling_mode(SamplingMode::Flat);

    for &n in &[1usize, 100, 10_000] {
        let client = bench_client(n);
        group.bench_with_input(BenchmarkId::new("read_restricted", n), &n, |b, _| {
            b.iter(|| criterion::black_box(resolve(&client, RES, Action::Read, "_createdBy")));
        });
        group.bench_with_input(BenchmarkId::new("update_own", n), &n, |b, _| {
            b.iter(|| criterion::black_box(resolve(&client, RES, Action::Update, "_createdBy")));
        });
    }
    group.finish();
}

fn bench_shape(c: &mut Criterion) {
    let client = bench_client(1);
    let decision = resolve(&client, RES, Action::Read, "_createdBy");
    let requested = FieldProjection::include(["title", "notes", "score"]);
    let user: Query = match json!({ "score": { "$gt": 10 } }) { Value::Object(m) => m, _ => Query::new() };

    let mut group = c.benchmark_group("acl_shape");
    group.sampling_mode(SamplingMode::Flat);
    for &n in &[100usize, 10_000] {
        let docs = gen_docs(n);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("project_many", n), &n, |b, _| {
            b.iter(|| {
                let shape = merge(decision.projection.as_ref(), Some(&requested));
                criterion::black_box(project_many(&docs, shape.as_ref()))
            });
        });
    }
    group.bench_function("combine_filters", |b| {
        b.iter(|| criterion::black_box(combine(Some(&user), decision.filter.as_ref())));
    });
    group.finish();
}

criterion_group!(benches, bench_resolve, bench_shape);
criterion_main!(benches);
