//! Dispatch Fast-Path Benchmarks
//!
//! Measures the cost of traversing a call site in each cache state:
//!
//! 1. **Specialized**: guarded direct binding (the steady state)
//! 2. **Megamorphic**: permanently generic lookup-per-call
//! 3. **Global read**: constant-folded vs direct lookup
//!
//! The interesting number is the gap between specialized and megamorphic
//! traversal, which is the payoff of keeping caches valid.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use garnet_core::{SiteArity, Symbol, Value};
use garnet_dispatch::site::{CallSiteDescriptor, InvokeSite, LookupMode};
use garnet_dispatch::GlobalReadSite;
use garnet_runtime::method::{Method, MethodKind};
use garnet_runtime::{Block, Runtime};
use std::sync::Arc;

fn setup() -> (Arc<Runtime>, Value) {
    let runtime = Runtime::new();
    let class = runtime.define_class("Bench", None, &[]);
    let obj = runtime.heap().alloc(&class);
    let name = Symbol::intern("work");
    class.define_method(
        name,
        Method::new(
            name,
            class.id(),
            MethodKind::Generic(Arc::new(|_, _, _, _, _, _| {
                Ok(Value::fixnum(7).unwrap())
            })),
        ),
    );
    (runtime, obj)
}

fn bench_specialized(c: &mut Criterion) {
    let (runtime, obj) = setup();
    let ctx = runtime.context();
    let site = InvokeSite::new(Symbol::intern("work"), SiteArity::fixed(0, false));
    let block = Block::none();

    // Warm the cache.
    site.invoke(&ctx, obj, &[], &block).unwrap();

    c.bench_function("invoke_specialized", |b| {
        b.iter(|| site.invoke(&ctx, black_box(obj), &[], &block).unwrap())
    });
}

fn bench_megamorphic(c: &mut Criterion) {
    let (runtime, obj) = setup();
    let ctx = runtime.context();
    let descriptor =
        CallSiteDescriptor::new(Symbol::intern("work"), SiteArity::fixed(0, false));
    let site = InvokeSite::with_mode(descriptor, LookupMode::Normal, 0);
    let block = Block::none();

    // Budget zero: the first traversal degrades permanently.
    site.invoke(&ctx, obj, &[], &block).unwrap();

    c.bench_function("invoke_megamorphic", |b| {
        b.iter(|| site.invoke(&ctx, black_box(obj), &[], &block).unwrap())
    });
}

fn bench_global_read(c: &mut Criterion) {
    let runtime = Runtime::new();
    let ctx = runtime.context();
    let name = Symbol::intern("$bench");
    runtime
        .globals()
        .variable(name)
        .set(Value::fixnum(3).unwrap());

    let cached = GlobalReadSite::new(name, "bench.grt", 1);
    cached.read(&ctx);
    c.bench_function("global_read_cached", |b| b.iter(|| cached.read(&ctx)));

    let direct = GlobalReadSite::with_budget(name, "bench.grt", 2, 0);
    direct.read(&ctx);
    c.bench_function("global_read_direct", |b| b.iter(|| direct.read(&ctx)));
}

criterion_group!(
    benches,
    bench_specialized,
    bench_megamorphic,
    bench_global_read
);
criterion_main!(benches);
