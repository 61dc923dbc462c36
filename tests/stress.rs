//! Stress tests for Rarity
//!
//! Run with: cargo test --release stress -- --ignored

use rarity::*;
use std::time::Instant;

#[test]
#[ignore] // Run manually with --ignored
fn stress_test_scoring() {
    let mut detector = Detector::with_config(DetectorConfig::default().prob_period(0)).unwrap();

    let iterations = 1_000_000;
    let start = Instant::now();

    for i in 0..iterations {
        let value = 50.0 + (i as f64 * 0.001).sin() * 40.0;
        let _result = detector.score(value, i as i64);
    }

    let elapsed = start.elapsed();
    let rate = iterations as f64 / elapsed.as_secs_f64();

    println!("Scored {} observations in {:?}", iterations, elapsed);
    println!("Rate: {:.0} observations/second", rate);

    assert!(
        rate > 500_000.0,
        "Should score at least 500k obs/s, got {:.0}",
        rate
    );
}

#[test]
#[ignore]
fn stress_test_persisted_roundtrip() {
    let mut bytes = Detector::new().to_bytes();

    let iterations = 100_000;
    let start = Instant::now();

    for i in 0..iterations {
        let mut detector = Detector::from_bytes(&bytes).unwrap();
        let value = 50.0 + (i as f64 * 0.01).sin() * 45.0;
        detector.score(value, i as i64);
        bytes = detector.to_bytes();
    }

    let elapsed = start.elapsed();
    let rate = iterations as f64 / elapsed.as_secs_f64();

    println!("Load/score/store {} times in {:?}", iterations, elapsed);
    println!("Rate: {:.0} cycles/second", rate);

    assert!(
        rate > 50_000.0,
        "Should cycle at least 50k obs/s, got {:.0}",
        rate
    );
}

#[test]
#[ignore]
fn stress_test_many_keys() {
    let num_keys = 1_000;
    let observations_per_key = 500;

    let mut detectors: Vec<Detector> = (0..num_keys).map(|_| Detector::new()).collect();

    let start = Instant::now();

    for t in 0..observations_per_key {
        for (key, detector) in detectors.iter_mut().enumerate() {
            let value = 20.0 + (key as f64 * 0.05) + (t as f64 * 0.1).sin() * 10.0;
            detector.score(value, t as i64);
        }
    }

    let elapsed = start.elapsed();
    let total = num_keys * observations_per_key;
    let rate = total as f64 / elapsed.as_secs_f64();

    println!("Scored {} observations over {} keys in {:?}", total, num_keys, elapsed);
    println!("Rate: {:.0} observations/second", rate);

    let patterns: usize = detectors.iter().map(|d| d.pattern_count()).sum();
    println!("Distinct patterns held: {}", patterns);

    assert!(
        rate > 100_000.0,
        "Should score at least 100k obs/s, got {:.0}",
        rate
    );
}
