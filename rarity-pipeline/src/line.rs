// Rarity Pipeline - Keyed scoring over line protocol streams
// Copyright (c) 2025 Rarity Contributors
//
// Licensed under AGPL-3.0.
// See LICENSE file for details.

//! Line protocol codec
//!
//! Input records look like
//!
//! ```text
//! cpu,cpu=cpu-total,host=db1 usage_user=12.5,usage_idle=80i 1700000000000000000
//! ```
//!
//! and scored results are written back in the same protocol under the
//! `anomaly_score` measurement.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};

use crate::error::LineError;
use crate::sink::ScoreRecord;

/// Nanoseconds per second
pub const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Measurement name of emitted results
pub const RESULT_MEASUREMENT: &str = "anomaly_score";

const COLLECTED_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const WALL_CLOCK_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// A single field value
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Integer(i64),
    UInteger(u64),
    Boolean(bool),
    String(String),
}

impl FieldValue {
    /// Numeric view of the value. Booleans and strings have none.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Float(v) => Some(*v),
            FieldValue::Integer(v) => Some(*v as f64),
            FieldValue::UInteger(v) => Some(*v as f64),
            FieldValue::Boolean(_) | FieldValue::String(_) => None,
        }
    }
}

/// A parsed line protocol record
#[derive(Debug, Clone, PartialEq)]
pub struct LineRecord {
    pub measurement: String,
    pub tags: Vec<(String, String)>,
    pub fields: Vec<(String, FieldValue)>,
    /// Nanoseconds since the Unix epoch
    pub timestamp_ns: i64,
}

impl LineRecord {
    /// Value of a tag
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Value of a field
    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Whole seconds since the Unix epoch, rounded toward negative infinity
    pub fn timestamp_secs(&self) -> i64 {
        self.timestamp_ns.div_euclid(NANOS_PER_SECOND)
    }
}

/// Parse one line protocol record.
pub fn parse(line: &str) -> Result<LineRecord, LineError> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return Err(LineError::Empty);
    }

    let sections = split_unescaped(line, ' ', true)?;
    let mut sections = sections.into_iter();

    let series = sections.next().unwrap_or_default();
    let fields = sections.next().ok_or(LineError::MissingFields)?;
    let timestamp = sections.next().ok_or(LineError::MissingTimestamp)?;
    if let Some(rest) = sections.next() {
        return Err(LineError::TrailingContent(rest.to_string()));
    }

    let (measurement, tags) = parse_series(series)?;
    let fields = parse_fields(fields)?;
    let timestamp_ns = timestamp
        .parse::<i64>()
        .map_err(|_| LineError::InvalidTimestamp(timestamp.to_string()))?;

    Ok(LineRecord {
        measurement,
        tags,
        fields,
        timestamp_ns,
    })
}

fn parse_series(series: &str) -> Result<(String, Vec<(String, String)>), LineError> {
    let parts = split_unescaped(series, ',', false)?;
    let mut parts = parts.into_iter();

    let measurement = unescape(parts.next().unwrap_or_default());
    if measurement.is_empty() {
        return Err(LineError::MissingMeasurement);
    }

    let mut tags = Vec::new();
    for tag in parts {
        let (key, value) = split_pair(tag).ok_or_else(|| LineError::InvalidTag(tag.to_string()))?;
        if key.is_empty() || value.is_empty() {
            return Err(LineError::InvalidTag(tag.to_string()));
        }
        tags.push((unescape(key), unescape(value)));
    }

    Ok((measurement, tags))
}

fn parse_fields(section: &str) -> Result<Vec<(String, FieldValue)>, LineError> {
    if section.is_empty() {
        return Err(LineError::MissingFields);
    }

    let mut fields = Vec::new();
    for field in split_unescaped(section, ',', true)? {
        let (key, raw) =
            split_pair(field).ok_or_else(|| LineError::InvalidField(field.to_string()))?;
        if key.is_empty() {
            return Err(LineError::InvalidField(field.to_string()));
        }
        let value =
            parse_field_value(raw).ok_or_else(|| LineError::InvalidField(field.to_string()))?;
        fields.push((unescape(key), value));
    }

    Ok(fields)
}

fn parse_field_value(raw: &str) -> Option<FieldValue> {
    if let Some(quoted) = raw.strip_prefix('"') {
        let inner = quoted.strip_suffix('"')?;
        return Some(FieldValue::String(unescape(inner)));
    }

    match raw {
        "t" | "T" | "true" | "True" | "TRUE" => return Some(FieldValue::Boolean(true)),
        "f" | "F" | "false" | "False" | "FALSE" => return Some(FieldValue::Boolean(false)),
        _ => {}
    }

    if let Some(int) = raw.strip_suffix('i') {
        return int.parse().ok().map(FieldValue::Integer);
    }
    if let Some(uint) = raw.strip_suffix('u') {
        return uint.parse().ok().map(FieldValue::UInteger);
    }
    raw.parse().ok().map(FieldValue::Float)
}

/// Split at the first unescaped `=`.
fn split_pair(pair: &str) -> Option<(&str, &str)> {
    let mut escaped = false;
    for (i, c) in pair.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '=' => return Some((&pair[..i], &pair[i + 1..])),
            _ => {}
        }
    }
    None
}

/// Split at every unescaped delimiter, optionally ignoring delimiters inside
/// double quotes.
fn split_unescaped(input: &str, delimiter: char, quotes: bool) -> Result<Vec<&str>, LineError> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    let mut quoted = false;

    for (i, c) in input.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '"' if quotes => quoted = !quoted,
            c if c == delimiter && !quoted => {
                parts.push(&input[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }

    if quoted {
        return Err(LineError::UnterminatedString);
    }
    parts.push(&input[start..]);
    Ok(parts)
}

fn unescape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(&next) = chars.peek() {
                if matches!(next, ',' | '=' | ' ' | '"' | '\\') {
                    out.push(next);
                    chars.next();
                    continue;
                }
            }
        }
        out.push(c);
    }
    out
}

/// Escape a tag key or value.
pub fn escape_tag(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, ',' | '=' | ' ' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Format the collection time of an observation.
pub fn format_collected(time: &DateTime<Utc>) -> String {
    time.format(COLLECTED_FORMAT).to_string()
}

/// Format a wall clock time with microseconds.
pub fn format_wall_clock(time: &DateTime<Utc>) -> String {
    time.format(WALL_CLOCK_FORMAT).to_string()
}

/// Encode a scored result as one line, without the trailing newline.
pub fn encode_record(record: &ScoreRecord) -> String {
    let mut out = String::with_capacity(256);
    out.push_str(RESULT_MEASUREMENT);

    let tags = [
        ("host", record.host.clone()),
        ("app", record.key.clone()),
        ("time_collected", format_collected(&record.collected_at)),
        ("time_pipeline", format_wall_clock(&record.received_at)),
        ("time_detector", format_wall_clock(&record.scored_at)),
        ("period_description", record.period.description().to_string()),
    ];
    for (key, value) in tags.iter() {
        if value.is_empty() {
            continue;
        }
        out.push(',');
        out.push_str(key);
        out.push('=');
        out.push_str(&escape_tag(value));
    }

    // Writing to a String cannot fail
    let _ = write!(
        out,
        " value={:?},anomaly_score={:?},is_anomaly={} {}",
        record.value,
        record.score,
        u8::from(record.is_anomaly),
        record.timestamp_ns
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rarity::Period;

    #[test]
    fn test_parse_basic() {
        let record = parse(
            "cpu,cpu=cpu-total,host=db1 usage_user=12.5,usage_idle=80i 1700000000123456789",
        )
        .unwrap();
        assert_eq!(record.measurement, "cpu");
        assert_eq!(record.tag("cpu"), Some("cpu-total"));
        assert_eq!(record.tag("host"), Some("db1"));
        assert_eq!(record.field("usage_user"), Some(&FieldValue::Float(12.5)));
        assert_eq!(record.field("usage_idle"), Some(&FieldValue::Integer(80)));
        assert_eq!(record.timestamp_secs(), 1_700_000_000);
    }

    #[test]
    fn test_parse_value_kinds() {
        let record =
            parse(r#"m a=1u,b=-2i,c=t,d=FALSE,e="x y, z=1",f=1e3 1"#).unwrap();
        assert_eq!(record.field("a"), Some(&FieldValue::UInteger(1)));
        assert_eq!(record.field("b"), Some(&FieldValue::Integer(-2)));
        assert_eq!(record.field("c"), Some(&FieldValue::Boolean(true)));
        assert_eq!(record.field("d"), Some(&FieldValue::Boolean(false)));
        assert_eq!(
            record.field("e"),
            Some(&FieldValue::String("x y, z=1".to_string()))
        );
        assert_eq!(record.field("f").and_then(|v| v.as_f64()), Some(1000.0));
        assert_eq!(record.field("c").and_then(|v| v.as_f64()), None);
    }

    #[test]
    fn test_parse_escapes() {
        let record = parse(r"disk\ io,path=/data\,1,host=my\ host used_percent=3 5").unwrap();
        assert_eq!(record.measurement, "disk io");
        assert_eq!(record.tag("path"), Some("/data,1"));
        assert_eq!(record.tag("host"), Some("my host"));
    }

    #[test]
    fn test_parse_negative_timestamp_floors() {
        let record = parse("m v=1 -1").unwrap();
        assert_eq!(record.timestamp_secs(), -1);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse(""), Err(LineError::Empty));
        assert_eq!(parse("   \n"), Err(LineError::Empty));
        assert_eq!(parse("cpu"), Err(LineError::MissingFields));
        assert_eq!(parse("cpu v=1"), Err(LineError::MissingTimestamp));
        assert_eq!(parse(",host=a v=1 1"), Err(LineError::MissingMeasurement));
        assert!(matches!(parse("cpu v=1 abc"), Err(LineError::InvalidTimestamp(_))));
        assert!(matches!(parse("cpu,host v=1 1"), Err(LineError::InvalidTag(_))));
        assert!(matches!(parse("cpu v=abc 1"), Err(LineError::InvalidField(_))));
        assert!(matches!(parse("cpu v 1"), Err(LineError::InvalidField(_))));
        assert_eq!(parse(r#"cpu v="open 1"#), Err(LineError::UnterminatedString));
        assert!(matches!(parse("cpu v=1 1 2"), Err(LineError::TrailingContent(_))));
    }

    #[test]
    fn test_escape_tag() {
        assert_eq!(escape_tag("Input Time Out Of Order"), r"Input\ Time\ Out\ Of\ Order");
        assert_eq!(escape_tag("a,b=c"), r"a\,b\=c");
        assert_eq!(escape_tag(r"a\"), r"a\\");
    }

    #[test]
    fn test_trailing_backslash_tag_survives_encoding() {
        let input = parse(r"cpu,host=a\\ usage_user=1 1").unwrap();
        let host = input.tag("host").unwrap();
        assert_eq!(host, r"a\");

        let parsed = parse(&encode_record(&sample_record(host))).unwrap();
        assert_eq!(parsed.tag("host"), Some(r"a\"));
        assert_eq!(parsed.tag("app"), Some(r"dbaas.cpu.usage_user.a\"));
        assert_eq!(parsed.tag("period_description"), Some("Regular"));
    }

    fn sample_record(host: &str) -> ScoreRecord {
        let collected = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let received = Utc.timestamp_opt(1_700_000_001, 250_000_000).unwrap();
        ScoreRecord {
            key: format!("dbaas.cpu.usage_user.{}", host),
            host: host.to_string(),
            value: 12.0,
            timestamp_ns: 1_700_000_000_000_000_000,
            score: 100.0,
            period: Period::Regular,
            is_anomaly: true,
            collected_at: collected,
            received_at: received,
            scored_at: received,
            pattern_count: 1,
        }
    }

    #[test]
    fn test_encode_record() {
        let line = encode_record(&sample_record("db1"));
        assert_eq!(
            line,
            "anomaly_score,host=db1,app=dbaas.cpu.usage_user.db1,\
             time_collected=2023-11-14\\ 22:13:20,\
             time_pipeline=2023-11-14\\ 22:13:21.250000,\
             time_detector=2023-11-14\\ 22:13:21.250000,\
             period_description=Regular \
             value=12.0,anomaly_score=100.0,is_anomaly=1 1700000000000000000"
        );

        // Emitted lines parse back as line protocol
        let parsed = parse(&line).unwrap();
        assert_eq!(parsed.measurement, RESULT_MEASUREMENT);
        assert_eq!(parsed.tag("period_description"), Some("Regular"));
        assert_eq!(parsed.field("is_anomaly"), Some(&FieldValue::Float(1.0)));
    }
}
