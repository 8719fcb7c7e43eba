//! Cross-module integration tests
//!
//! These tests drive the tracer the way a pair of services would: record,
//! encode, ship, extend, merge, persist.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Value, json};
use stagetrace::{
    TraceError, TraceWriter, Tracer, WriterConfig, current_tracer, record_value,
    with_shared_tracer, with_tracer,
};

fn as_json(tracer: &Tracer) -> Value {
    serde_json::from_slice(&tracer.serialize().unwrap()).unwrap()
}

/// Simulates a downstream process: only bytes cross the boundary.
fn downstream(bytes: &[u8], stage: &str) -> Vec<u8> {
    let tracer = Tracer::deserialize(bytes).unwrap();
    tracer.record_value(stage, "handled", true);
    tracer.serialize().unwrap()
}

/// E2E Test: upstream -> downstream -> merge back
///
/// 1. Upstream records interleaved stages
/// 2. Downstream decodes, appends a new stage and encodes
/// 3. Upstream merges the returned bytes
#[test]
fn test_e2e_round_trip_through_downstream() {
    let upstream = Tracer::new();
    upstream.record_value("stage1", "req", "s1r");
    upstream.record_value("stage2", "req", "s2r");
    upstream.record_value("stage1", "resp", "s1p");
    upstream.record_value("stage2", "resp", "s2p");

    let returned = downstream(&upstream.serialize().unwrap(), "stage3");
    upstream.merge_bytes(&returned).unwrap();

    let merged = as_json(&upstream);
    let names: Vec<&str> = merged
        .as_array()
        .unwrap()
        .iter()
        .map(|stage| stage.as_object().unwrap().keys().next().unwrap().as_str())
        .collect();
    assert_eq!(names, vec!["stage1", "stage2", "stage3"]);
    assert_eq!(merged[2], json!({"stage3": [{"handled": true}]}));
    assert_eq!(
        merged[0]["stage1"],
        json!([{"req": "s1r"}, {"resp": "s1p"}, {"req": "s1r"}, {"resp": "s1p"}])
    );
}

/// Fan-out: two downstream services each return a partial trace.
#[test]
fn test_fan_out_merge_keeps_receiver_order() {
    let gateway = Tracer::new();
    gateway.record_value("ingress", "id", 7);

    let billing = Tracer::new();
    billing.record_value("billing", "charged", 12.5);
    billing.record_value("ledger", "entry", "c-1");

    let shipping = Tracer::new();
    shipping.record_value("ledger", "entry", "s-1");
    shipping.record_value("shipping", "carrier", "ups");

    gateway.merge_bytes(&shipping.serialize().unwrap()).unwrap();
    gateway.merge_bytes(&billing.serialize().unwrap()).unwrap();

    assert_eq!(
        gateway.stage_names(),
        vec!["ingress", "ledger", "shipping", "billing"]
    );
    assert_eq!(
        as_json(&gateway)[1],
        json!({"ledger": [{"entry": "s-1"}, {"entry": "c-1"}]})
    );
}

#[test]
fn test_malformed_payloads_leave_receiver_untouched() {
    let tracer = Tracer::new();
    tracer.record_value("a", "k", 1);
    let before = tracer.serialize().unwrap();

    let payloads: [&[u8]; 4] = [br#"{"a": []}"#, br#"[{"a": ["#, b"\"a\"", b"[[1]]"];
    for payload in payloads {
        let err = tracer.merge_bytes(payload).unwrap_err();
        assert!(matches!(err, TraceError::Merge { .. }));
    }

    assert_eq!(tracer.serialize().unwrap(), before);
}

/// A peer that recorded nothing may send `null` instead of `[]`.
#[test]
fn test_merge_from_empty_peer_is_noop() {
    let tracer = Tracer::new();
    tracer.record_value("a", "k", 1);
    let before = tracer.serialize().unwrap();

    tracer.merge_bytes(b"null").unwrap();
    tracer.merge_bytes(&Tracer::new().serialize().unwrap()).unwrap();

    assert_eq!(tracer.serialize().unwrap(), before);
}

#[tokio::test]
async fn test_scoped_tracer_across_tasks() {
    #[derive(Serialize)]
    struct Chunk {
        index: usize,
        bytes: usize,
    }

    let (_, tracer) = with_tracer(async {
        record_value("plan", "chunks", 4);

        let handle = current_tracer().unwrap();
        let workers: Vec<_> = (0..4)
            .map(|index| {
                let tracer = Arc::clone(&handle);
                tokio::spawn(async move {
                    tracer
                        .record_serialized("upload", "chunk", &Chunk { index, bytes: 1024 })
                        .unwrap();
                })
            })
            .collect();
        for worker in workers {
            worker.await.unwrap();
        }
        drop(handle);

        record_value("commit", "ok", true);
    })
    .await;

    assert_eq!(tracer.stage_names(), vec!["plan", "upload", "commit"]);
    let mut indexes: Vec<u64> = tracer
        .records("upload")
        .unwrap()
        .iter()
        .map(|r| r["chunk"]["index"].as_u64().unwrap())
        .collect();
    indexes.sort();
    assert_eq!(indexes, vec![0, 1, 2, 3]);
}

#[tokio::test]
async fn test_shared_tracer_merges_downstream_inside_scope() {
    let tracer = Arc::new(Tracer::new());

    with_shared_tracer(Arc::clone(&tracer), async {
        record_value("call", "target", "inventory");
        let handle = current_tracer().unwrap();
        let returned = downstream(&handle.serialize().unwrap(), "inventory");
        handle.merge_bytes(&returned).unwrap();
    })
    .await;

    assert_eq!(tracer.stage_names(), vec!["call", "inventory"]);
}

#[test]
fn test_persisted_traces_merge_like_live_ones() {
    let dir = tempfile::tempdir().unwrap();
    let writer = TraceWriter::new(WriterConfig::session(dir.path().join("run.jsonl"))).unwrap();

    let first = Tracer::new();
    first.record_value("a", "k", 1);
    let second = Tracer::new();
    second.record_value("b", "k", 2);
    second.record_value("a", "k", 3);

    writer.write(&first).unwrap();
    writer.write(&second).unwrap();

    let combined = Tracer::new();
    for tracer in TraceWriter::read_traces(&writer.current_file_path()).unwrap() {
        combined.merge_tracer(&tracer);
    }

    assert_eq!(
        as_json(&combined),
        json!([
            {"a": [{"k": 1}, {"k": 3}]},
            {"b": [{"k": 2}]}
        ])
    );
}
