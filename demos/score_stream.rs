//! Score a short synthetic stream and print each result.
//!
//! Run with: cargo run --example score_stream

use rarity::{Detector, DetectorConfig};

fn main() {
    let config = DetectorConfig::default().prob_period(10).rest_period(5);
    let mut detector = Detector::with_config(config).expect("valid config");

    // A steady signal with a spike and one late timestamp
    let stream: Vec<(f64, i64)> = (0..40)
        .map(|t| {
            let value = match t {
                25 => 97.0,
                _ => 40.0 + (t % 3) as f64 * 8.0,
            };
            let timestamp = if t == 30 { 12 } else { 1_700_000_000 + t };
            (value, timestamp)
        })
        .collect();

    println!("{:>12} {:>7} {:>8} {:>24} anomaly", "timestamp", "value", "score", "period");
    for (value, timestamp) in stream {
        let result = detector.score(value, timestamp);
        println!(
            "{:>12} {:>7.1} {:>8.2} {:>24} {}",
            timestamp,
            value,
            result.score,
            result.period.description(),
            if result.is_anomaly { "yes" } else { "" }
        );
    }

    println!();
    println!("Patterns seen: {}", detector.pattern_count());
    println!("State size: {} bytes", detector.to_bytes().len());
}
