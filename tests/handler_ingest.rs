use serde_json::{json, Value};
use trainboard::{Error, RawRecord, TimelineHandler};

fn records(value: Value) -> Vec<RawRecord> {
    serde_json::from_value(value).expect("records")
}

fn tensor_report(iteration: u64, obj: &str, base: f64) -> Value {
    let mut map = serde_json::Map::new();
    map.insert("iteration".into(), json!(iteration));
    for part in ["data", "grad"] {
        for i in 0..7 {
            map.insert(format!("{obj}/{part}/percentile/{i}"), json!(base + i as f64));
        }
        map.insert(format!("{obj}/{part}/min"), json!(base - 1.0));
        map.insert(format!("{obj}/{part}/max"), json!(base + 10.0));
        map.insert(format!("{obj}/{part}/mean"), json!(base + 3.0));
    }
    Value::Object(map)
}

#[test]
fn loss_scenario_across_two_cycles() {
    let log = records(json!([
        {"iteration": 0, "main/loss": 1.0},
        {"iteration": 1, "main/loss": 0.5},
    ]));
    let handler = TimelineHandler::new();

    handler.update(&log[..1]).expect("first cycle");
    let first = handler.event_snapshot("main/loss").unwrap().expect("series");
    assert_eq!(first.iteration, Some(vec![0]));
    assert_eq!(first.values, vec![1.0]);

    let report = handler.update(&log).expect("second cycle");
    assert!(!report.reset);
    assert_eq!(report.processed, 1);
    assert!(report.new_events.is_empty());

    let second = handler.event_snapshot("main/loss").unwrap().expect("series");
    assert_eq!(second.iteration, Some(vec![0, 1]));
    assert_eq!(second.values, vec![1.0, 0.5]);
    assert_ne!(first.state_hash, second.state_hash);
    assert_eq!(first.session_id, second.session_id);
}

#[test]
fn loss_scenario_in_one_cycle() {
    let handler = TimelineHandler::new();
    handler
        .update(&records(json!([
            {"iteration": 0, "main/loss": 1.0},
            {"iteration": 1, "main/loss": 0.5},
        ])))
        .expect("update");
    assert_eq!(handler.event_series_ids().unwrap(), vec!["main/loss"]);
    let loss = handler.event_snapshot("main/loss").unwrap().expect("series");
    assert_eq!(loss.iteration, Some(vec![0, 1]));
    assert_eq!(loss.values, vec![1.0, 0.5]);
}

#[test]
fn repeated_update_is_idempotent() {
    let log = records(json!([
        {"iteration": 0, "main/loss": 1.0, "lr": 0.1},
        {"iteration": 1, "main/loss": 0.5, "lr": 0.1},
    ]));
    let handler = TimelineHandler::new();
    handler.update(&log).expect("first");
    let session = handler.session_id().unwrap();
    let loss = handler.event_snapshot("main/loss").unwrap();
    let lr = handler.event_snapshot("lr").unwrap();

    let report = handler.update(&log).expect("second");
    assert!(!report.reset);
    assert_eq!(report.processed, 0);
    assert_eq!(handler.session_id().unwrap(), session);
    assert_eq!(handler.event_snapshot("main/loss").unwrap(), loss);
    assert_eq!(handler.event_snapshot("lr").unwrap(), lr);
}

#[test]
fn series_grow_monotonically() {
    let log: Vec<RawRecord> = (0..20)
        .map(|i| {
            let mut record = json!({"iteration": i, "main/loss": 1.0 / (i as f64 + 1.0)});
            if i >= 5 {
                record["main/accuracy"] = json!(0.1 * (i - 5) as f64);
            }
            serde_json::from_value(record).unwrap()
        })
        .collect();
    let handler = TimelineHandler::new();
    let mut last_len = 0;
    for n in 1..=log.len() {
        handler.update(&log[..n]).expect("update");
        let len = handler.event_snapshot("main/loss").unwrap().unwrap().values.len();
        assert!(len >= last_len);
        last_len = len;
    }
    assert_eq!(last_len, 20);

    // Appears late and is not backfilled.
    let accuracy = handler.event_snapshot("main/accuracy").unwrap().unwrap();
    assert_eq!(accuracy.values.len(), 15);
    assert_eq!(accuracy.iteration.as_deref().unwrap()[0], 5);
}

#[test]
fn replaced_log_starts_new_session() {
    let handler = TimelineHandler::new();
    handler
        .update(&records(json!([
            {"iteration": 0, "main/loss": 1.0},
            {"iteration": 1, "main/loss": 0.5},
        ])))
        .expect("first run");
    let old_session = handler.session_id().unwrap();

    let report = handler
        .update(&records(json!([
            {"epoch": 0, "validation/main/loss": 2.0},
            {"epoch": 1, "validation/main/loss": 1.5},
            {"epoch": 2, "validation/main/loss": 1.0},
        ])))
        .expect("second run");
    assert!(report.reset);
    assert_eq!(report.processed, 3);
    assert_ne!(report.session_id, old_session);
    assert_eq!(handler.session_id().unwrap(), report.session_id);
    assert_eq!(handler.event_series_ids().unwrap(), vec!["validation/main/loss"]);

    let loss = handler.event_snapshot("validation/main/loss").unwrap().unwrap();
    assert_eq!(loss.epoch, Some(vec![0, 1, 2]));
    assert_eq!(loss.iteration, None);
}

#[test]
fn shrunk_log_starts_new_session() {
    let log = records(json!([
        {"iteration": 0, "main/loss": 1.0},
        {"iteration": 1, "main/loss": 0.5},
    ]));
    let handler = TimelineHandler::new();
    handler.update(&log).expect("full");
    let old_session = handler.session_id().unwrap();

    let report = handler.update(&log[..1]).expect("truncated");
    assert!(report.reset);
    assert_ne!(handler.session_id().unwrap(), old_session);
    let loss = handler.event_snapshot("main/loss").unwrap().unwrap();
    assert_eq!(loss.values, vec![1.0]);
}

#[test]
fn ratio_series_is_computed() {
    let handler = TimelineHandler::new();
    handler
        .update(&records(json!([{"main/total": 10, "main/correct": 4, "iteration": 1}])))
        .expect("update");
    let ratio = handler.event_snapshot("main/correct").unwrap().expect("ratio");
    assert_eq!(ratio.values, vec![0.4]);
    assert_eq!(ratio.iteration, Some(vec![1]));
    assert!(handler.event_snapshot("main/total").unwrap().is_none());
}

#[test]
fn ratio_refreshes_state_hash() {
    let log = records(json!([
        {"main/total": 10, "main/correct": 4, "iteration": 1},
        {"main/total": 10, "main/correct": 5, "iteration": 2},
    ]));
    let handler = TimelineHandler::new();
    handler.update(&log[..1]).unwrap();
    let before = handler.event_snapshot("main/correct").unwrap().unwrap();
    handler.update(&log).unwrap();
    let after = handler.event_snapshot("main/correct").unwrap().unwrap();
    assert_eq!(after.values, vec![0.4, 0.5]);
    assert_ne!(before.state_hash, after.state_hash);
}

#[test]
fn vanished_ratio_total_is_fatal() {
    let handler = TimelineHandler::new();
    handler
        .update(&records(json!([{"main/total": 10, "main/correct": 4, "iteration": 1}])))
        .unwrap();
    let err = handler
        .update(&records(json!([
            {"main/total": 10, "main/correct": 4, "iteration": 1},
            {"main/correct": 6, "iteration": 2},
        ])))
        .unwrap_err();
    assert!(matches!(err, Error::KeyDisappeared(ref key) if key == "main/total"));
    assert_eq!(err.to_string(), "Key 'main/total' has disappeared from data.");

    // Committed state is left as it was.
    let ratio = handler.event_snapshot("main/correct").unwrap().unwrap();
    assert_eq!(ratio.values, vec![0.4]);
}

#[test]
fn failed_cycle_forces_rebuild() {
    let good = json!({"iteration": 0, "main/total": 10, "main/correct": 4});
    let bad = json!({"iteration": 1, "main/correct": 6});
    let fixed = json!({"iteration": 1, "main/total": 10, "main/correct": 6});

    let handler = TimelineHandler::new();
    assert!(handler.update(&records(json!([good.clone(), bad]))).is_err());
    let failed_session = handler.session_id().unwrap();

    let report = handler.update(&records(json!([good, fixed]))).expect("rebuild");
    assert!(report.reset);
    assert_eq!(report.processed, 2);
    assert_ne!(report.session_id, failed_session);
    let ratio = handler.event_snapshot("main/correct").unwrap().unwrap();
    assert_eq!(ratio.values, vec![0.4, 0.6]);
}

#[test]
fn std_companion_is_consumed_silently() {
    let handler = TimelineHandler::new();
    handler
        .update(&records(json!([
            {"iteration": 0, "main/loss": 1.0, "main/loss.std": 0.1, "orphan.std": 0.2},
        ])))
        .unwrap();
    assert_eq!(handler.event_series_ids().unwrap(), vec!["main/loss"]);
}

#[test]
fn tensor_statistics_are_grouped() {
    let handler = TimelineHandler::new();
    handler
        .update(&records(json!([
            tensor_report(0, "main/l1/W", 0.0),
            tensor_report(1, "main/l1/W", 1.0),
        ])))
        .expect("update");

    assert_eq!(handler.tensor_series_ids().unwrap(), vec!["main/l1/W"]);
    assert!(handler.event_series_ids().unwrap().is_empty());

    let w = handler.tensor_snapshot("main/l1/W").unwrap().unwrap();
    assert_eq!(w.iteration, Some(vec![0, 1]));
    let labels: Vec<&str> = w.percentiles.iter().map(|t| t.label.as_str()).collect();
    assert_eq!(
        labels,
        vec!["min", "0.13%", "2.28%", "15.87%", "50%", "84.13%", "97.72%", "99.87%", "max"]
    );
    assert_eq!(w.percentiles[4].data, vec![3.0, 4.0]);
    assert_eq!(w.grad_percentiles.len(), 9);
}

#[test]
fn tensor_without_percentiles_retries_discovery() {
    let handler = TimelineHandler::new();
    let early = json!({"iteration": 0, "main/b/data/mean": 0.5});
    handler.update(&records(json!([early.clone()]))).unwrap();
    assert!(handler.tensor_series_ids().unwrap().is_empty());
    assert_eq!(handler.event_series_ids().unwrap(), vec!["main/b/data/mean"]);

    let later = json!({
        "iteration": 1,
        "main/b/data/mean": 0.6,
        "main/b/data/percentile/0": 0.1,
        "main/b/data/percentile/1": 0.2,
    });
    handler.update(&records(json!([early, later]))).unwrap();
    assert_eq!(handler.tensor_series_ids().unwrap(), vec!["main/b"]);
    let b = handler.tensor_snapshot("main/b").unwrap().unwrap();
    assert_eq!(b.iteration, Some(vec![1]));
    let mean = handler.event_snapshot("main/b/data/mean").unwrap().unwrap();
    assert_eq!(mean.values, vec![0.5, 0.6]);
}

#[test]
fn vanished_tensor_member_is_fatal() {
    let first = tensor_report(0, "main/W", 0.0);
    let mut second = tensor_report(1, "main/W", 1.0);
    second
        .as_object_mut()
        .unwrap()
        .remove("main/W/grad/mean");

    let handler = TimelineHandler::new();
    let err = handler.update(&records(json!([first, second]))).unwrap_err();
    assert!(matches!(err, Error::KeyDisappeared(ref key) if key == "main/W/grad/mean"));
}

#[test]
fn non_numeric_values_are_ignored() {
    let handler = TimelineHandler::new();
    handler
        .update(&records(json!([
            {"iteration": 0, "main/loss": 1.0, "model": "resnet", "tags": ["a"]},
        ])))
        .unwrap();
    assert_eq!(handler.event_series_ids().unwrap(), vec!["main/loss"]);
}

fn data_percentiles(iteration: u64, obj: &str) -> Value {
    let mut map = serde_json::Map::new();
    map.insert("iteration".into(), json!(iteration));
    for i in 0..7 {
        map.insert(format!("{obj}/data/percentile/{i}"), json!(i as f64));
    }
    Value::Object(map)
}

#[test]
fn late_member_of_known_tensor_becomes_event() {
    let mut second = data_percentiles(1, "main/W");
    second["main/W/data/zeros"] = json!(0.25);

    let handler = TimelineHandler::new();
    let report = handler
        .update(&records(json!([data_percentiles(0, "main/W"), second])))
        .unwrap();
    assert_eq!(report.new_tensors, vec!["main/W"]);
    assert_eq!(report.new_events, vec!["main/W/data/zeros"]);

    let zeros = handler.event_snapshot("main/W/data/zeros").unwrap().unwrap();
    assert_eq!(zeros.iteration, Some(vec![1]));
    assert_eq!(zeros.values, vec![0.25]);
    let w = handler.tensor_snapshot("main/W").unwrap().unwrap();
    assert_eq!(w.iteration, Some(vec![0, 1]));
}

#[test]
fn tensor_key_without_gate_becomes_event() {
    let handler = TimelineHandler::new();
    handler
        .update(&records(json!([
            data_percentiles(0, "main/W"),
            {"iteration": 1, "main/W/grad/mean": 0.5},
        ])))
        .unwrap();
    assert_eq!(handler.event_series_ids().unwrap(), vec!["main/W/grad/mean"]);
    let mean = handler.event_snapshot("main/W/grad/mean").unwrap().unwrap();
    assert_eq!(mean.values, vec![0.5]);

    // The tensor itself did not record the gate-less report.
    let w = handler.tensor_snapshot("main/W").unwrap().unwrap();
    assert_eq!(w.iteration, Some(vec![0]));
}

#[test]
fn snapshot_session_matches_its_series() {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};

    let short = records(json!([{"iteration": 0, "main/loss": 1.0}]));
    let long = records(json!([
        {"iteration": 0, "main/loss": 2.0},
        {"iteration": 1, "main/loss": 2.0},
    ]));
    let handler = TimelineHandler::new();
    let first = handler.update(&short).unwrap();
    let done = AtomicBool::new(false);

    let (written, seen) = std::thread::scope(|s| {
        let writer = s.spawn(|| {
            let mut written = vec![(first.session_id.clone(), vec![1.0])];
            for i in 0..200 {
                let (log, values) = if i % 2 == 0 {
                    (&long, vec![2.0, 2.0])
                } else {
                    (&short, vec![1.0])
                };
                let report = handler.update(log).unwrap();
                assert!(report.reset);
                written.push((report.session_id, values));
            }
            done.store(true, Ordering::Release);
            written
        });
        let reader = s.spawn(|| {
            let mut seen = Vec::new();
            while !done.load(Ordering::Acquire) {
                let snapshot = handler.event_snapshot("main/loss").unwrap().unwrap();
                seen.push((snapshot.session_id, snapshot.values));
            }
            seen
        });
        (writer.join().unwrap(), reader.join().unwrap())
    });

    let written: HashMap<String, Vec<f64>> = written.into_iter().collect();
    for (session_id, values) in seen {
        assert_eq!(written.get(&session_id), Some(&values), "session {session_id}");
    }
}
