//! Flush path benchmarks.
//!
//! Run with: `cargo bench --bench flush_paths`
//! Compare baselines: `cargo bench --bench flush_paths -- --baseline main`
//!
//! Covers the per-record path (formatting, buffering) and the per-flush
//! path (encoding with and without gzip, full put/flush cycles).

use blob_sink::sink::{
    format_record, FlushExecutor, InMemoryBlobStore, LastFlushTimes, PartitionBuffer, Schema,
    SchemaType, SimulatedClock, SinkConfig, SinkRecord, SinkTask, Struct, Value,
};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use std::sync::Arc;

fn struct_record(offset: i64) -> SinkRecord {
    let schema = Schema::structure([
        ("id", Schema::primitive(SchemaType::Int)),
        ("name", Schema::primitive(SchemaType::String)),
        ("active", Schema::primitive(SchemaType::Boolean)),
        ("score", Schema::primitive(SchemaType::Float)),
    ]);
    let value = Struct::new()
        .put("id", offset)
        .put("name", format!("user-{}", offset))
        .put("active", offset % 2 == 0)
        .put("score", offset as f64 * 0.5);
    SinkRecord::new("users", 0, offset, value).with_schema(schema)
}

fn map_record(offset: i64) -> SinkRecord {
    let value = Value::Map(vec![
        ("event".to_string(), Value::from("click")),
        ("offset".to_string(), Value::Int(offset)),
        (
            "tags".to_string(),
            Value::Array(vec![Value::from("a"), Value::from("b"), Value::Null]),
        ),
    ]);
    SinkRecord::new("events", 1, offset, value).with_schema(Schema::map())
}

/// Benchmark format_record - runs once per record
fn bench_format(c: &mut Criterion) {
    let mut group = c.benchmark_group("format_record");
    group.throughput(Throughput::Elements(1));

    let structured = struct_record(42);
    group.bench_function("struct", |b| b.iter(|| format_record(black_box(&structured))));

    let mapped = map_record(42);
    group.bench_function("map", |b| b.iter(|| format_record(black_box(&mapped))));

    let schemaless = SinkRecord::new("raw", 0, 42, "plain text payload");
    group.bench_function("schemaless", |b| b.iter(|| format_record(black_box(&schemaless))));

    group.finish();
}

/// Benchmark FlushExecutor::encode - runs once per flush
fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");

    for records in [100usize, 500] {
        let mut buffer = PartitionBuffer::new("users", 0);
        for i in 0..records as i64 {
            buffer.append(i, &format_record(&struct_record(i)));
        }
        group.throughput(Throughput::Bytes(buffer.content().len() as u64));

        for gzip in [false, true] {
            let exec = FlushExecutor::new(
                Arc::new(InMemoryBlobStore::new()),
                "bench".to_string(),
                gzip,
                SimulatedClock::new(0),
            );
            let label = if gzip { "gzip" } else { "plain" };
            group.bench_function(format!("{}_{}", label, records), |b| {
                b.iter(|| exec.encode(black_box(&buffer)))
            });
        }
    }

    group.finish();
}

/// Benchmark a full flush through the in-memory store
fn bench_flush(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    let mut group = c.benchmark_group("flush");
    group.throughput(Throughput::Elements(500));

    let lines: Vec<String> = (0..500).map(|i| format_record(&map_record(i))).collect();
    let exec = FlushExecutor::new(
        Arc::new(InMemoryBlobStore::new()),
        "bench".to_string(),
        false,
        SimulatedClock::new(0),
    );

    group.bench_function("executor_500", |b| {
        b.iter(|| {
            let mut buffer = PartitionBuffer::new("events", 1);
            for (i, line) in lines.iter().enumerate() {
                buffer.append(i as i64, line);
            }
            let mut times = LastFlushTimes::default();
            rt.block_on(exec.flush(&mut buffer, &mut times)).unwrap()
        })
    });

    group.bench_function("task_put_500", |b| {
        b.iter(|| {
            let config = SinkConfig {
                flush_max_records: 100,
                ..SinkConfig::test()
            };
            let mut task = SinkTask::with_clock(
                &config,
                Arc::new(InMemoryBlobStore::new()),
                SimulatedClock::new(0),
            );
            let records: Vec<SinkRecord> = (0..500).map(map_record).collect();
            rt.block_on(task.put(records)).unwrap()
        })
    });

    group.finish();
}

criterion_group!(benches, bench_format, bench_encode, bench_flush);
criterion_main!(benches);
