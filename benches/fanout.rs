use std::thread;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;

use kyrobus::{Context, Hub, Trigger};

fn bench_emit_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("topic/emit");
    for subscribers in [1usize, 8, 64] {
        group.throughput(Throughput::Elements(subscribers as u64));
        group.bench_with_input(BenchmarkId::from_parameter(subscribers), &subscribers, |b, &n| {
            let hub = Hub::new();
            let readers: Vec<_> = (0..n)
                .map(|_| {
                    let sub = hub.subscribe_with_capacity("bench", 1024);
                    thread::spawn(move || for _ in sub.iter() {})
                })
                .collect();

            let ctx = Context::background();
            b.iter(|| hub.emit(&ctx, "bench", vec![json!(1)]).unwrap());

            hub.close().unwrap();
            for r in readers {
                r.join().unwrap();
            }
        });
    }
    group.finish();
}

fn bench_emit_no_such_topic(c: &mut Criterion) {
    let hub = Hub::new();
    let ctx = Context::background();
    c.bench_function("topic/emit_unknown", |b| {
        b.iter(|| hub.emit(&ctx, "missing", Vec::new()).unwrap_err());
    });
}

fn bench_trigger_push(c: &mut Criterion) {
    let trig = Trigger::new().unwrap();
    let _listeners: Vec<_> = (0..64).map(|_| trig.listen()).collect();
    c.bench_function("trigger/push_64_listeners", |b| b.iter(|| trig.push()));
}

criterion_group!(benches, bench_emit_fanout, bench_emit_no_such_topic, bench_trigger_push);
criterion_main!(benches);
