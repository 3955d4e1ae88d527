//! Benchmarks for type lookup, data views and object persistence.
//!
//! - Registry: cached lookups, composite type creation, class enumeration
//! - Data views: path reads and writes through nested arrays
//! - Objects: creation, id lookup, XML and binary round trips
//!
//! ## Profiling with Puffin
//!
//! Run with the `profile-with-puffin` feature to collect scope timings:
//!
//! ```bash
//! cargo bench --features profile-with-puffin -- --profile-time 5
//! ```

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use rtti::core::ClassBuilder;
use rtti::prelude::*;
use std::hint::black_box;

#[cfg(feature = "profile-with-puffin")]
mod puffin_report {
    use puffin::{GlobalFrameView, Reader, Scope, ScopeCollection, Stream};
    use std::collections::BTreeMap;
    use std::sync::OnceLock;
    use std::time::Duration;

    static FRAMES: OnceLock<GlobalFrameView> = OnceLock::new();

    pub fn start() {
        puffin::set_scopes_on(true);
        FRAMES.get_or_init(GlobalFrameView::default);
    }

    pub fn frame() {
        puffin::GlobalProfiler::lock().new_frame();
    }

    fn accumulate(
        stream: &Stream,
        scope: &Scope,
        names: &ScopeCollection,
        totals: &mut BTreeMap<String, i64>,
    ) {
        if let Some(details) = names.fetch_by_id(&scope.id) {
            *totals.entry(details.name().to_string()).or_default() += scope.record.duration_ns;
        }
        if scope.child_begin_position >= scope.child_end_position {
            return;
        }
        let children = Reader::with_offset(stream, scope.child_begin_position)
            .and_then(|reader| reader.read_top_scopes());
        for child in children.into_iter().flatten() {
            accumulate(stream, &child, names, totals);
        }
    }

    /// Average time per frame of every recorded scope, slowest first.
    pub fn print() {
        let Some(frames) = FRAMES.get() else {
            return;
        };
        let view = frames.lock();
        let mut totals = BTreeMap::new();
        let mut count = 0i64;
        for frame in view.recent_frames() {
            let Ok(unpacked) = frame.unpacked() else {
                continue;
            };
            count += 1;
            for (_, info) in unpacked.thread_streams.iter() {
                let scopes = Reader::from_start(&info.stream).read_top_scopes();
                for scope in scopes.into_iter().flatten() {
                    accumulate(&info.stream, &scope, view.scope_collection(), &mut totals);
                }
            }
        }

        let mut rows: Vec<_> = totals.into_iter().collect();
        rows.sort_by(|a, b| b.1.cmp(&a.1));
        println!("\n--- scopes over {count} frames ---");
        for (name, ns) in rows {
            let avg = Duration::from_nanos((ns / count.max(1)) as u64);
            println!("  {name:40} {avg:>10.2?}");
        }
    }
}

#[cfg(feature = "profile-with-puffin")]
use puffin_report::{frame as end_profiling_frame, print as print_profiling_stats, start as setup_profiler};

#[cfg(not(feature = "profile-with-puffin"))]
fn setup_profiler() {}

#[cfg(not(feature = "profile-with-puffin"))]
fn end_profiling_frame() {}

#[cfg(not(feature = "profile-with-puffin"))]
fn print_profiling_stats() {}

// ============================================================================
// Fixtures
// ============================================================================

#[derive(Default, Clone, PartialEq)]
struct Keyframe {
    time: f32,
    value: f32,
}
impl_reflect!(Keyframe);

#[derive(Default)]
struct Track {
    name: String,
    looping: bool,
    keys: Array<Keyframe>,
}
impl_reflect!(Track);
impl Object for Track {}

fn context() -> Context {
    let ctx = Context::default();
    ctx.register(
        ClassBuilder::<Keyframe>::new()
            .constructible()
            .cloneable()
            .comparable()
            .property(field!(Keyframe, time))
            .property(field!(Keyframe, value))
            .build()
            .as_type(),
    )
    .unwrap();
    ctx.register_class(
        ObjectClassBuilder::<Track>::new()
            .constructible()
            .property(field!(Track, name))
            .property(field!(Track, looping))
            .property(field!(Track, keys))
            .build(),
    )
    .unwrap();
    ctx.seal();
    ctx
}

fn track(ctx: &Context, keys: usize) -> ObjectPtr {
    let object = ctx.create_object("Track").unwrap();
    {
        let mut track = object.write::<Track>().unwrap();
        track.name = "camera".into();
        for i in 0..keys {
            track.keys.push(Keyframe {
                time: i as f32 * 0.5,
                value: (i % 7) as f32,
            });
        }
    }
    object
}

// ============================================================================
// Benchmarks
// ============================================================================

fn registry_benchmarks(c: &mut Criterion) {
    setup_profiler();
    let ctx = context();
    let types = ctx.types().clone();

    let mut group = c.benchmark_group("registry");

    group.bench_function("find_simple", |b| {
        b.iter(|| black_box(types.find_type(black_box("float"))))
    });

    group.bench_function("find_cached_composite", |b| {
        types.find_type("array<array<Keyframe>>").unwrap();
        b.iter(|| black_box(types.find_type(black_box("array<array<Keyframe>>"))))
    });

    group.bench_function("create_composite", |b| {
        let mut n = 0usize;
        b.iter(|| {
            n += 1;
            let name = format!("[{}]Keyframe", n);
            black_box(types.find_type(&name))
        })
    });

    let root = ctx.objects().root_class().clone();
    group.bench_function("enum_derived_classes", |b| {
        b.iter(|| black_box(types.enum_derived_classes(&root)))
    });

    group.finish();
}

fn data_view_benchmarks(c: &mut Criterion) {
    setup_profiler();
    let ctx = context();
    let object = track(&ctx, 64);

    let mut group = c.benchmark_group("data_view");

    group.bench_function("read_nested", |b| {
        b.iter(|| black_box(object.read_value::<f32>(black_box("keys[32].value"))))
    });

    group.bench_function("write_nested", |b| {
        let mut v = 0.0f32;
        b.iter(|| {
            v += 1.0;
            object.write_value("keys[32].value", &v).unwrap();
            end_profiling_frame();
        })
    });

    group.bench_function("write_converted", |b| {
        let value = String::from("12.5");
        b.iter(|| object.write_value(black_box("keys[3].time"), &value))
    });

    group.finish();
    print_profiling_stats();
}

fn object_benchmarks(c: &mut Criterion) {
    setup_profiler();
    let ctx = context();

    let mut group = c.benchmark_group("objects");

    group.bench_function("create_and_drop", |b| {
        b.iter(|| black_box(ctx.create_object("Track").unwrap()))
    });

    let live: Vec<_> = (0..1024).map(|_| ctx.create_object("Track").unwrap()).collect();
    let ids: Vec<_> = live.iter().map(|o| o.id()).collect();
    group.bench_function("find_by_id", |b| {
        let mut i = 0usize;
        b.iter(|| {
            i = (i + 1) % ids.len();
            black_box(ctx.objects().find_object(ids[i]))
        })
    });

    group.finish();
}

fn persistence_benchmarks(c: &mut Criterion) {
    setup_profiler();
    let ctx = context();

    let mut group = c.benchmark_group("persistence");

    for keys in [8usize, 256] {
        let object = track(&ctx, keys);
        let xml = save_xml_string(&object);
        let bytes = save_binary(&object);

        group.throughput(Throughput::Bytes(xml.len() as u64));
        group.bench_with_input(BenchmarkId::new("xml_save", keys), &object, |b, object| {
            b.iter(|| black_box(save_xml_string(object)))
        });
        group.bench_with_input(BenchmarkId::new("xml_load", keys), &xml, |b, xml| {
            b.iter(|| black_box(load_xml_str(ctx.objects(), xml).unwrap()))
        });

        group.throughput(Throughput::Bytes(bytes.len() as u64));
        group.bench_with_input(BenchmarkId::new("binary_save", keys), &object, |b, object| {
            b.iter(|| black_box(save_binary(object)))
        });
        group.bench_with_input(BenchmarkId::new("binary_load", keys), &bytes, |b, bytes| {
            b.iter(|| {
                let loaded = load_binary(ctx.objects(), bytes).unwrap();
                end_profiling_frame();
                black_box(loaded)
            })
        });
    }

    group.finish();
    print_profiling_stats();
}

criterion_group!(
    benches,
    registry_benchmarks,
    data_view_benchmarks,
    object_benchmarks,
    persistence_benchmarks
);

criterion_main!(benches);
