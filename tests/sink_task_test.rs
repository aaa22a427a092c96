//! Sink Task Integration Tests
//!
//! Drive `SinkTask` end to end against `InMemoryBlobStore` with a
//! `SimulatedClock`, so every trigger decision is deterministic.
//!
//! ## Test Categories
//!
//! - **Triggers**: size, time, shutdown
//! - **Failures**: fatal auth, retriable, redelivery
//! - **Formatting**: what ends up in the objects

use blob_sink::sink::{
    FlushError, InMemoryBlobStore, Schema, SchemaType, SimulatedClock, SinkConfig, SinkError,
    SinkRecord, SinkTask, Struct, TopicPartition, UploadError, WriteStep,
};
use std::sync::Arc;

// 2024-03-15T12:00:00Z
const NOON_MS: u64 = 1_710_504_000_000;

struct Harness {
    task: SinkTask<SimulatedClock>,
    store: InMemoryBlobStore,
    clock: SimulatedClock,
}

impl Harness {
    fn new(config: SinkConfig) -> Self {
        let store = InMemoryBlobStore::new();
        let clock = SimulatedClock::new(NOON_MS);
        let task = SinkTask::with_clock(&config, Arc::new(store.clone()), clock.clone());
        Harness { task, store, clock }
    }

    fn with_limits(max_records: usize, interval_ms: u64) -> Self {
        Self::new(SinkConfig {
            flush_max_records: max_records,
            flush_interval_ms: interval_ms,
            ..SinkConfig::test()
        })
    }

    fn published_text(&self) -> Vec<(String, String)> {
        self.store
            .published()
            .into_iter()
            .map(|p| (p.key, String::from_utf8(p.data).unwrap()))
            .collect()
    }
}

fn rec(topic: &str, partition: i32, offset: i64) -> SinkRecord {
    SinkRecord::new(topic, partition, offset, format!("v{}", offset))
}

// =============================================================================
// Triggers
// =============================================================================

#[tokio::test]
async fn test_size_trigger_flushes_once() {
    let mut h = Harness::with_limits(2, 0);

    h.task
        .put(vec![rec("orders", 0, 100), rec("orders", 0, 101), rec("orders", 0, 102)])
        .await
        .unwrap();

    assert_eq!(
        h.published_text(),
        vec![(
            "kafka-export/date=20240315/orders-p0-o100.log".to_string(),
            "v100\nv101\n".to_string()
        )]
    );
    let buf = h.task.registry().get(&TopicPartition::new("orders", 0)).unwrap();
    assert_eq!(buf.record_count(), 1);
    assert_eq!(buf.start_offset(), 102);
    assert_eq!(h.task.stats().size_flushes, 1);
}

#[tokio::test]
async fn test_time_trigger_off_by_default() {
    let mut h = Harness::with_limits(100, 0);

    h.task.put(vec![rec("orders", 0, 1)]).await.unwrap();
    h.clock.advance_ms(24 * 60 * 60 * 1000);
    h.task.put(vec![rec("orders", 0, 2)]).await.unwrap();
    h.clock.advance_ms(24 * 60 * 60 * 1000);
    h.task.put(vec![rec("orders", 1, 1)]).await.unwrap();

    assert!(h.store.is_empty());
    assert_eq!(h.task.registry().buffered_records(), 3);
}

#[tokio::test]
async fn test_time_trigger_flushes_before_append() {
    let mut h = Harness::with_limits(100, 1);

    h.task.put(vec![rec("orders", 0, 1)]).await.unwrap();
    assert!(h.store.is_empty());

    h.clock.advance_ms(5);
    h.task.put(vec![rec("orders", 0, 2)]).await.unwrap();

    assert_eq!(
        h.published_text(),
        vec![(
            "kafka-export/date=20240315/orders-p0-o1.log".to_string(),
            "v1\n".to_string()
        )]
    );
    let buf = h.task.registry().get(&TopicPartition::new("orders", 0)).unwrap();
    assert_eq!(buf.content(), "v2\n");
    assert_eq!(buf.start_offset(), 2);
    assert_eq!(h.task.stats().time_flushes, 1);
}

#[tokio::test]
async fn test_time_trigger_waits_for_interval() {
    let mut h = Harness::with_limits(100, 1_000);

    h.task.put(vec![rec("orders", 0, 1)]).await.unwrap();
    h.clock.advance_ms(999);
    h.task.put(vec![rec("orders", 0, 2)]).await.unwrap();
    assert!(h.store.is_empty());

    h.clock.advance_ms(1);
    h.task.put(vec![rec("orders", 1, 7)]).await.unwrap();
    assert_eq!(
        h.store.keys(),
        vec!["kafka-export/date=20240315/orders-p0-o1.log"]
    );
}

#[tokio::test]
async fn test_idle_batch_flushes_aged_buffer() {
    let mut h = Harness::with_limits(100, 1_000);

    h.task.put(vec![rec("orders", 0, 1), rec("orders", 1, 1)]).await.unwrap();
    h.clock.advance_ms(60_000);
    h.task.put(Vec::new()).await.unwrap();

    assert_eq!(
        h.store.keys(),
        vec![
            "kafka-export/date=20240315/orders-p0-o1.log",
            "kafka-export/date=20240315/orders-p1-o1.log",
        ]
    );
    assert_eq!(h.task.stats().time_flushes, 2);
    assert_eq!(h.task.registry().buffered_records(), 0);
}

#[tokio::test]
async fn test_idle_batch_without_interval_does_nothing() {
    let mut h = Harness::with_limits(100, 0);

    h.task.put(vec![rec("orders", 0, 1)]).await.unwrap();
    h.clock.advance_ms(60_000);
    h.task.put(Vec::new()).await.unwrap();

    assert!(h.store.is_empty());
    assert_eq!(h.task.registry().buffered_records(), 1);
}

#[tokio::test]
async fn test_shutdown_drains_every_buffer() {
    let mut h = Harness::with_limits(100, 0);

    h.task
        .put(vec![
            rec("orders", 0, 10),
            rec("orders", 1, 20),
            rec("payments", 0, 30),
            rec("orders", 0, 11),
        ])
        .await
        .unwrap();
    h.task.stop().await.unwrap();

    assert_eq!(
        h.store.keys(),
        vec![
            "kafka-export/date=20240315/orders-p0-o10.log",
            "kafka-export/date=20240315/orders-p1-o20.log",
            "kafka-export/date=20240315/payments-p0-o30.log",
        ]
    );
    assert_eq!(h.store.stats().commits, 3);
    assert!(h.task.registry().is_empty());
    assert_eq!(h.task.stats().shutdown_flushes, 3);
    assert_eq!(h.task.stats().records_flushed, 4);
}

#[tokio::test]
async fn test_shutdown_with_nothing_buffered() {
    let mut h = Harness::with_limits(2, 0);

    h.task.put(vec![rec("orders", 0, 1), rec("orders", 0, 2)]).await.unwrap();
    h.task.stop().await.unwrap();

    assert_eq!(h.store.stats().commits, 1);
    assert_eq!(h.task.stats().shutdown_flushes, 0);
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn test_forbidden_preserves_buffer() {
    let mut h = Harness::with_limits(100, 0);
    h.task
        .put(vec![rec("orders", 0, 5), rec("orders", 0, 6)])
        .await
        .unwrap();
    h.store
        .inject_fault(WriteStep::Create, UploadError::new("forbidden").with_status(403));

    let err = h.task.stop().await.unwrap_err();

    match err {
        SinkError::Flush(FlushError::FatalAuth { ref key, .. }) => {
            assert_eq!(key, "kafka-export/date=20240315/orders-p0-o5.log");
        }
        other => panic!("expected fatal auth failure, got {:?}", other),
    }
    let buf = h.task.registry().get(&TopicPartition::new("orders", 0)).unwrap();
    assert_eq!(buf.record_count(), 2);
    assert_eq!(buf.content(), "v5\nv6\n");
    assert_eq!(buf.start_offset(), 5);
    assert!(h.task.is_halted());
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn test_auth_code_deep_in_chain_is_fatal() {
    let mut h = Harness::with_limits(1, 0);
    h.store.inject_fault(
        WriteStep::Append,
        UploadError::new("request failed").caused_by(
            UploadError::new("server said no").with_error_code("AuthenticationFailed"),
        ),
    );

    let err = h.task.put(vec![rec("orders", 0, 1)]).await.unwrap_err();

    assert!(!err.is_retriable());
    assert!(h.task.is_halted());
}

#[tokio::test]
async fn test_retry_after_transient_failure_writes_same_object() {
    let mut h = Harness::with_limits(100, 0);
    h.task
        .put(vec![rec("orders", 0, 40), rec("orders", 0, 41)])
        .await
        .unwrap();
    h.store
        .inject_fault(WriteStep::Commit, UploadError::new("throttled").with_status(503));

    let err = h.task.stop().await.unwrap_err();
    assert!(err.is_retriable());
    assert!(!h.task.is_halted());
    assert!(!h.task.registry().is_empty());

    h.task.stop().await.unwrap();

    assert_eq!(
        h.published_text(),
        vec![(
            "kafka-export/date=20240315/orders-p0-o40.log".to_string(),
            "v40\nv41\n".to_string()
        )]
    );
    assert_eq!(h.task.stats().retriable_failures, 1);
    assert!(h.task.registry().is_empty());
}

#[tokio::test]
async fn test_failed_size_flush_keeps_appended_record() {
    let mut h = Harness::with_limits(2, 0);
    h.store
        .inject_fault(WriteStep::Create, UploadError::new("connection reset"));

    let err = h
        .task
        .put(vec![rec("orders", 0, 1), rec("orders", 0, 2), rec("orders", 0, 3)])
        .await
        .unwrap_err();

    assert!(err.is_retriable());
    // the third record was never reached
    assert_eq!(h.task.stats().records_received, 2);
    assert_eq!(h.task.registry().buffered_records(), 2);

    h.task.put(vec![rec("orders", 0, 3)]).await.unwrap();
    assert_eq!(
        h.published_text(),
        vec![(
            "kafka-export/date=20240315/orders-p0-o1.log".to_string(),
            "v1\nv2\nv3\n".to_string()
        )]
    );
}

#[tokio::test]
async fn test_full_buffer_retried_without_new_records() {
    let mut h = Harness::with_limits(2, 0);
    h.store
        .inject_fault(WriteStep::Append, UploadError::new("connection reset"));

    let err = h
        .task
        .put(vec![rec("orders", 0, 1), rec("orders", 0, 2)])
        .await
        .unwrap_err();
    assert!(err.is_retriable());

    // nothing left to redeliver, only the pending flush
    h.task.put(Vec::new()).await.unwrap();
    assert!(h.store.is_empty());

    h.task.flush_full().await.unwrap();
    assert_eq!(
        h.published_text(),
        vec![(
            "kafka-export/date=20240315/orders-p0-o1.log".to_string(),
            "v1\nv2\n".to_string()
        )]
    );
}

// =============================================================================
// Formatting
// =============================================================================

#[tokio::test]
async fn test_struct_records_written_as_json() {
    let mut h = Harness::with_limits(100, 0);
    let schema = Schema::structure([
        ("name", Schema::primitive(SchemaType::String)),
        ("age", Schema::primitive(SchemaType::Int)),
    ]);
    let value = Struct::new().put("age", 30).put("name", "Alice");

    h.task
        .put(vec![SinkRecord::new("people", 0, 1, value).with_schema(schema)])
        .await
        .unwrap();
    h.task.stop().await.unwrap();

    assert_eq!(
        h.published_text()[0].1,
        "{\"name\":\"Alice\",\"age\":30}\n"
    );
}

#[tokio::test]
async fn test_gzip_key_and_null_values() {
    let mut h = Harness::new(SinkConfig {
        compress_gzip: true,
        ..SinkConfig::test()
    });

    h.task
        .put(vec![SinkRecord::new("audit", 2, 9, Option::<i64>::None)])
        .await
        .unwrap();
    h.task.stop().await.unwrap();

    assert_eq!(
        h.store.keys(),
        vec!["kafka-export/date=20240315/audit-p2-o9.log.gz"]
    );
}

#[tokio::test]
async fn test_json_lines_input_keeps_document_order() {
    let mut h = Harness::with_limits(100, 0);
    let record =
        SinkRecord::from_json_line(r#"{"topic":"t","partition":0,"offset":3,"value":{"z":1,"a":[true,"x"]}}"#)
            .unwrap();

    h.task.put(vec![record]).await.unwrap();
    h.task.stop().await.unwrap();

    assert_eq!(h.published_text()[0].1, "{\"z\":1,\"a\":[true,\"x\"]}\n");
}
