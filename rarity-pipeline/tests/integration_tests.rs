// Rarity Pipeline - Integration Tests
//
// Tests are organized into categories:
// 1. End-to-end line processing
// 2. Persistence across restarts
// 3. Partitioned scoring

use std::sync::Arc;
use std::thread;

use approx::assert_abs_diff_eq;
use rarity::{DetectorConfig, Period};
use rarity_pipeline::{
    parse, FieldValue, FileStore, LineSink, MemorySink, MemoryStore, Partitioner, Pipeline,
    PipelineConfig, ScoreRecord,
};
use tempfile::TempDir;

// ============================================================================
// Helpers
// ============================================================================

fn config() -> PipelineConfig {
    PipelineConfig::with_detector(DetectorConfig::default().prob_period(5).rest_period(4))
}

fn cpu_line(host: &str, user: f64, system: f64, secs: i64) -> String {
    format!(
        "cpu,cpu=cpu-total,host={} usage_user={},usage_system={},usage_idle={},usage_iowait=0 {}",
        host,
        user,
        system,
        100.0 - user - system,
        secs * 1_000_000_000
    )
}

fn workload() -> Vec<String> {
    let mut lines = Vec::new();
    for t in 0..120i64 {
        for host in ["db1", "db2", "db3"] {
            let spike = if t % 37 == 0 { 60.0 } else { 0.0 };
            let user = 10.0 + (t % 4) as f64 * 5.0 + spike;
            lines.push(cpu_line(host, user, 5.0, t));
        }
        lines.push(format!(
            "disk,path=/data,host=db1 used_percent={}i {}",
            40 + t / 10,
            t * 1_000_000_000
        ));
    }
    lines
}

fn scores(records: &[ScoreRecord]) -> Vec<(String, i64, f64, Period)> {
    records
        .iter()
        .map(|r| (r.key.clone(), r.timestamp_ns, r.score, r.period))
        .collect()
}

// ============================================================================
// End-to-end
// ============================================================================

#[test]
fn test_cpu_record_emits_four_results() {
    let mut pipeline = Pipeline::new(config(), MemoryStore::new(), MemorySink::new()).unwrap();
    let emitted = pipeline.process_line(&cpu_line("db1", 10.0, 5.0, 0)).unwrap();
    assert_eq!(emitted, 4);

    let keys: Vec<&str> = pipeline.sink().records().iter().map(|r| r.key.as_str()).collect();
    assert_eq!(
        keys,
        vec![
            "dbaas.cpu.usage_user.db1",
            "dbaas.cpu.usage_system.db1",
            "dbaas.cpu.usage_idle.db1",
            "dbaas.cpu.usage_iowait.db1",
        ]
    );
    assert_eq!(pipeline.adapter().store().len(), 4);
}

#[test]
fn test_line_sink_output_is_line_protocol() {
    let mut pipeline = Pipeline::new(config(), MemoryStore::new(), LineSink::new(Vec::new())).unwrap();
    for line in workload().iter().take(40) {
        pipeline.process_line(line).unwrap();
    }
    pipeline.flush().unwrap();

    let written = pipeline.sink().written();
    let output = String::from_utf8(pipeline.into_sink().into_inner()).unwrap();
    assert_eq!(output.lines().count() as u64, written);

    for line in output.lines() {
        let record = parse(line).unwrap();
        assert_eq!(record.measurement, "anomaly_score");
        assert!(record.tag("app").unwrap().starts_with("dbaas."));
        assert!(record.tag("time_collected").is_some());
        let score = record.field("anomaly_score").and_then(FieldValue::as_f64).unwrap();
        assert!((0.0..=100.0).contains(&score));
    }
}

#[test]
fn test_training_never_flags() {
    let mut pipeline = Pipeline::new(config(), MemoryStore::new(), MemorySink::new()).unwrap();
    for line in workload() {
        pipeline.process_line(&line).unwrap();
    }
    for record in pipeline.sink().records() {
        if record.period == Period::Training {
            assert!(!record.is_anomaly);
        }
    }
    assert!(pipeline.stats().training > 0);
    assert_eq!(
        pipeline.stats().observations_scored,
        pipeline.sink().len() as u64
    );
}

#[test]
fn test_integer_field_scores_like_float() {
    let mut a = Pipeline::new(config(), MemoryStore::new(), MemorySink::new()).unwrap();
    let mut b = Pipeline::new(config(), MemoryStore::new(), MemorySink::new()).unwrap();
    for t in 0..10i64 {
        let ts = t * 1_000_000_000;
        a.process_line(&format!("disk,path=/data,host=h used_percent={}i {}", 30 + t * 5, ts))
            .unwrap();
        b.process_line(&format!("disk,path=/data,host=h used_percent={}.0 {}", 30 + t * 5, ts))
            .unwrap();
    }
    for (x, y) in a.sink().records().iter().zip(b.sink().records()) {
        assert_abs_diff_eq!(x.score, y.score);
        assert_eq!(x.period, y.period);
    }
}

// ============================================================================
// Persistence across restarts
// ============================================================================

#[test]
fn test_file_store_restart_matches_uninterrupted_run() {
    let lines = workload();

    let mut reference = Pipeline::new(config(), MemoryStore::new(), MemorySink::new()).unwrap();
    for line in &lines {
        reference.process_line(line).unwrap();
    }

    let dir = TempDir::new().unwrap();
    let mut collected = Vec::new();
    for chunk in lines.chunks(50) {
        // A fresh process for every chunk, sharing only the state directory
        let store = FileStore::open(dir.path()).unwrap();
        let mut pipeline = Pipeline::new(config(), store, MemorySink::new()).unwrap();
        for line in chunk {
            pipeline.process_line(line).unwrap();
        }
        collected.extend(pipeline.into_sink().take());
    }

    assert_eq!(scores(&collected), scores(reference.sink().records()));
}

#[test]
fn test_late_record_does_not_touch_file_state() {
    let dir = TempDir::new().unwrap();
    let store = FileStore::open(dir.path()).unwrap();
    let path = store.path_for("dbaas.disk.used_percent.db1");
    let mut pipeline = Pipeline::new(config(), store, MemorySink::new()).unwrap();

    pipeline
        .process_line("disk,path=/data,host=db1 used_percent=10 20000000000")
        .unwrap();
    let before = std::fs::read(&path).unwrap();

    pipeline
        .process_line("disk,path=/data,host=db1 used_percent=95 10000000000")
        .unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), before);
    assert_eq!(
        pipeline.sink().records()[1].period,
        Period::OrderViolation
    );
}

// ============================================================================
// Partitioned scoring
// ============================================================================

#[test]
fn test_partitioned_workers_match_sequential_run() {
    let lines = workload();

    let mut sequential = Pipeline::new(config(), MemoryStore::new(), MemorySink::new()).unwrap();
    for line in &lines {
        sequential.process_line(line).unwrap();
    }

    // Route observations by key; each worker owns its partition
    let partitioner = Partitioner::new(3).unwrap();
    let rules = config().ingest;
    let mut partitions = vec![Vec::new(); partitioner.partitions()];
    for line in &lines {
        let record = parse(line).unwrap();
        for observation in rules.observations(&record, chrono::Utc::now()) {
            partitions[partitioner.partition_for(&observation.key)].push(observation);
        }
    }

    let store = Arc::new(MemoryStore::new());
    let handles: Vec<_> = partitions
        .into_iter()
        .map(|observations| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let mut pipeline = Pipeline::new(config(), store, MemorySink::new()).unwrap();
                for observation in &observations {
                    pipeline.process_observation(observation).unwrap();
                }
                pipeline.into_sink().take()
            })
        })
        .collect();

    let partitioned: Vec<ScoreRecord> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();

    let mut expected = scores(sequential.sink().records());
    let mut actual = scores(&partitioned);
    expected.sort_by(|a, b| (&a.0, a.1).cmp(&(&b.0, b.1)));
    actual.sort_by(|a, b| (&a.0, a.1).cmp(&(&b.0, b.1)));
    assert_eq!(actual, expected);
    assert_eq!(store.len(), sequential.adapter().store().len());
}
