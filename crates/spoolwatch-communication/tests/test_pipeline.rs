use serde_json::json;
use spoolwatch_communication::TelemetryPipeline;
use spoolwatch_core::{CompletionOutcome, CompletionRecord, LifecycleStatus};
use std::sync::{Arc, Mutex};

const REPORT: &str = "device/01S00A000000000/report";

fn send(pipeline: &TelemetryPipeline, topic: &str, payload: serde_json::Value) {
    pipeline.process(topic, payload.to_string().as_bytes());
}

fn collect_completions(pipeline: &TelemetryPipeline) -> Arc<Mutex<Vec<CompletionRecord>>> {
    let records = Arc::new(Mutex::new(Vec::new()));
    let sink = records.clone();
    pipeline
        .completions()
        .register("test", move |record: &CompletionRecord| {
            sink.lock().unwrap().push(record.clone());
        });
    records
}

#[test]
fn test_nozzle_decode_and_swap_end_to_end() {
    let pipeline = TelemetryPipeline::default();
    let snapshot = pipeline
        .process(
            REPORT,
            json!({ "print": { "nozzle_temper": { "nozzle_1": 17694990, "nozzle_2": 74 } } })
                .to_string()
                .as_bytes(),
        )
        .expect("snapshot");

    assert_eq!(snapshot.serial, "01S00A000000000");
    assert_eq!(snapshot.temperatures.right_nozzle, 270.0);
    assert_eq!(snapshot.temperatures.left_nozzle, 74.0);
}

#[test]
fn test_tray_usage_end_to_end() {
    let pipeline = TelemetryPipeline::default();
    send(
        &pipeline,
        "device/01S00A000000000/ams",
        json!({
            "print": {
                "ams": {
                    "tray_now": "0",
                    "ams": [ { "id": "0", "tray": [
                        { "id": "0", "remain": 61, "total_len": 330000, "tray_type": "PLA", "tray_color": "FFFFFFFF" }
                    ] } ]
                }
            }
        }),
    );

    let snapshot = pipeline.latest_snapshot().expect("snapshot");
    let usage = snapshot.material_usage.expect("usage");
    assert_eq!(usage.len(), 1);
    assert_eq!(usage[0].remaining_length_mm, 61_000.0);
    assert_eq!(usage[0].used_length_mm, 269_000.0);
    assert!((usage[0].used_percentage - 81.5).abs() < 0.05);
}

#[test]
fn test_full_job_yields_single_completion() {
    let pipeline = TelemetryPipeline::default();
    let records = collect_completions(&pipeline);

    for state in ["IDLE", "RUNNING", "PAUSE", "RUNNING"] {
        send(&pipeline, REPORT, json!({ "print": { "gcode_state": state, "mc_percent": 50 } }));
    }
    send(
        &pipeline,
        REPORT,
        json!({
            "print": { "gcode_state": "FINISH", "mc_percent": 100, "subtask_name": "Benchy" },
            "actualFilament": [ { "slot": 1, "weight": 25 } ]
        }),
    );

    let records = records.lock().unwrap();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.outcome, CompletionOutcome::Completed);
    assert_eq!(record.actual_consumption.len(), 1);
    assert_eq!(record.actual_consumption[0].slot, 1);
    assert_eq!(record.actual_consumption[0].weight_grams, Some(25.0));
    assert_eq!(
        record.job.as_ref().and_then(|j| j.job_name.as_deref()),
        Some("Benchy")
    );
}

#[test]
fn test_repeated_terminal_status_fires_once() {
    let pipeline = TelemetryPipeline::default();
    let records = collect_completions(&pipeline);

    for state in ["RUNNING", "RUNNING", "FINISH", "FINISH", "FINISH"] {
        send(&pipeline, REPORT, json!({ "print": { "gcode_state": state } }));
    }

    assert_eq!(records.lock().unwrap().len(), 1);
}

#[test]
fn test_outcome_classification() {
    let cases = [
        ("FINISH", 100, CompletionOutcome::Completed),
        ("FAILED", 40, CompletionOutcome::Failed),
        ("IDLE", 40, CompletionOutcome::Cancelled),
    ];

    for (terminal, percent, expected) in cases {
        let pipeline = TelemetryPipeline::default();
        let records = collect_completions(&pipeline);
        send(&pipeline, REPORT, json!({ "print": { "gcode_state": "RUNNING" } }));
        send(
            &pipeline,
            REPORT,
            json!({ "print": { "gcode_state": terminal, "mc_percent": percent } }),
        );

        let records = records.lock().unwrap();
        assert_eq!(records.len(), 1, "{terminal}");
        assert_eq!(records[0].outcome, expected, "{terminal}");
    }
}

#[test]
fn test_bare_idle_after_full_progress_completes() {
    let pipeline = TelemetryPipeline::default();
    let records = collect_completions(&pipeline);

    send(
        &pipeline,
        REPORT,
        json!({ "print": { "gcode_state": "RUNNING", "mc_percent": 100, "layer_num": 250, "total_layer_num": 250 } }),
    );
    send(&pipeline, REPORT, json!({ "print": { "gcode_state": "IDLE" } }));

    let records = records.lock().unwrap();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.outcome, CompletionOutcome::Completed);
    assert_eq!(record.progress_percent, 100.0);
    assert_eq!(record.layers_completed, 250);
    assert_eq!(record.total_layers, 250);
}

#[test]
fn test_progress_push_between_status_reports_counts() {
    let pipeline = TelemetryPipeline::default();
    let records = collect_completions(&pipeline);

    send(&pipeline, REPORT, json!({ "print": { "gcode_state": "RUNNING", "mc_percent": 40 } }));
    send(
        &pipeline,
        "device/01S00A000000000/progress",
        json!({ "print": { "mc_percent": 100 } }),
    );
    send(&pipeline, REPORT, json!({ "print": { "gcode_state": "IDLE" } }));

    let records = records.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].outcome, CompletionOutcome::Completed);
}

#[test]
fn test_completion_attached_to_snapshot() {
    let pipeline = TelemetryPipeline::default();
    send(&pipeline, REPORT, json!({ "print": { "gcode_state": "RUNNING" } }));
    let snapshot = pipeline
        .process(
            REPORT,
            json!({ "print": { "gcode_state": "FAILED", "print_error": 50348044 } })
                .to_string()
                .as_bytes(),
        )
        .expect("snapshot");

    assert_eq!(snapshot.status, LifecycleStatus::Error);
    let completion = snapshot.completion.expect("completion");
    assert_eq!(completion.outcome, CompletionOutcome::Failed);
    assert_eq!(completion.error_code.as_deref(), Some("0300_400C"));
}

#[test]
fn test_malformed_payloads_never_produce_snapshots() {
    let pipeline = TelemetryPipeline::default();
    let topics = [
        "device/01S00A000000000/report",
        "device/01S00A000000000/status",
        "device/01S00A000000000/progress",
        "device/01S00A000000000/ams",
    ];

    let payloads: [&[u8]; 5] = [b"{", b"null", b"\"text\"", b"", b"\xff\xfe"];

    for topic in topics {
        for payload in payloads {
            assert!(pipeline.process(topic, payload).is_none());
        }
    }
    assert!(pipeline.latest_snapshot().is_none());

    // The stream keeps flowing afterwards
    send(&pipeline, REPORT, json!({ "print": { "bed_temper": 60 } }));
    assert_eq!(pipeline.latest_snapshot().unwrap().temperatures.bed, 60.0);
}

#[test]
fn test_panicking_handler_does_not_block_others() {
    let pipeline = TelemetryPipeline::default();
    let seen = Arc::new(Mutex::new(0));
    let counter = seen.clone();

    pipeline.snapshots().register("broken", |_| panic!("handler bug"));
    pipeline.snapshots().register("counter", move |_| {
        *counter.lock().unwrap() += 1;
    });

    send(&pipeline, REPORT, json!({ "print": { "bed_temper": 60 } }));
    send(&pipeline, REPORT, json!({ "print": { "bed_temper": 61 } }));
    assert_eq!(*seen.lock().unwrap(), 2);
}

#[tokio::test]
async fn test_broadcast_receivers_get_snapshots() {
    let pipeline = TelemetryPipeline::default();
    let mut rx = pipeline.snapshots().receiver();

    send(&pipeline, REPORT, json!({ "print": { "mc_percent": 12 } }));
    let snapshot = rx.recv().await.expect("snapshot");
    assert_eq!(snapshot.progress.percent, 12.0);
}
