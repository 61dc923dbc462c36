// Rarity - Windowed occurrence anomaly scoring
// Copyright (c) 2025 Rarity Contributors
//
// Licensed under AGPL-3.0.
// See LICENSE file for details.

//! Binary encoding of a detector for external state stores
//!
//! A persisted detector carries its configuration together with its mutable
//! state, so a key keeps scoring with the parameters it was created with.
//!
//! # Format
//!
//! All integers are little-endian.
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │ Magic "RRST" (4) │ Version u16 (2)        │
//! ├──────────────────────────────────────────┤
//! │ Config: min f64, max f64, norm u32,      │
//! │         window u32, rest u32, prob u64   │
//! ├──────────────────────────────────────────┤
//! │ State: flags u8, last_time i64,          │
//! │        observed u64, countdown u32,      │
//! │        period u8                         │
//! ├──────────────────────────────────────────┤
//! │ Window: len u32, buckets i64 * len       │
//! ├──────────────────────────────────────────┤
//! │ Patterns: count u32, then per pattern    │
//! │   len u32, buckets i64 * len, count u64  │
//! ├──────────────────────────────────────────┤
//! │ CRC32 of everything above (4)            │
//! └──────────────────────────────────────────┘
//! ```
//!
//! Patterns are written sorted, so equal detectors encode to equal bytes.

use crc::{Crc, CRC_32_ISO_HDLC};

use crate::config::DetectorConfig;
use crate::detector::{Detector, DetectorState};
use crate::error::{DecodeError, Result};
use crate::pattern::{Bucket, PatternCounts};
use crate::period::Period;

/// Magic bytes for persisted detector state
pub const STATE_MAGIC: [u8; 4] = *b"RRST";

/// Current state format version
pub const STATE_FORMAT_VERSION: u16 = 1;

/// Size of magic + version + config + fixed state fields
const FIXED_SIZE: usize = 4 + 2 + 36 + 22;

const CHECKSUM_SIZE: usize = 4;

const FLAG_HAS_LAST_TIME: u8 = 0x01;

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Serialize a detector
pub fn encode(detector: &Detector) -> Vec<u8> {
    let config = detector.config();
    let state = detector.state();
    let patterns = state.pattern_counts.sorted();

    let pattern_bytes: usize = patterns.iter().map(|(p, _)| 12 + p.len() * 8).sum();
    let mut bytes = Vec::with_capacity(
        FIXED_SIZE + 4 + state.recent_window.len() * 8 + 4 + pattern_bytes + CHECKSUM_SIZE,
    );

    bytes.extend_from_slice(&STATE_MAGIC);
    bytes.extend_from_slice(&STATE_FORMAT_VERSION.to_le_bytes());

    // === CONFIG ===
    bytes.extend_from_slice(&config.min_value.to_le_bytes());
    bytes.extend_from_slice(&config.max_value.to_le_bytes());
    bytes.extend_from_slice(&config.norm_value.to_le_bytes());
    bytes.extend_from_slice(&config.memory_window.to_le_bytes());
    bytes.extend_from_slice(&config.rest_period.to_le_bytes());
    bytes.extend_from_slice(&config.prob_period.to_le_bytes());

    // === STATE ===
    let flags = if state.last_input_time.is_some() {
        FLAG_HAS_LAST_TIME
    } else {
        0
    };
    bytes.push(flags);
    bytes.extend_from_slice(&state.last_input_time.unwrap_or(0).to_le_bytes());
    bytes.extend_from_slice(&state.observed_count.to_le_bytes());
    bytes.extend_from_slice(&state.rest_countdown.to_le_bytes());
    bytes.push(state.period as u8);

    // === WINDOW ===
    write_buckets(&mut bytes, &state.recent_window);

    // === PATTERNS ===
    bytes.extend_from_slice(&(patterns.len() as u32).to_le_bytes());
    for (pattern, count) in patterns {
        write_buckets(&mut bytes, pattern);
        bytes.extend_from_slice(&count.to_le_bytes());
    }

    let checksum = CRC32.checksum(&bytes);
    bytes.extend_from_slice(&checksum.to_le_bytes());

    bytes
}

/// Deserialize a detector, verifying magic, version and checksum
pub fn decode(data: &[u8]) -> Result<Detector> {
    if data.len() < FIXED_SIZE + CHECKSUM_SIZE {
        return Err(DecodeError::BufferTooShort {
            needed: FIXED_SIZE + CHECKSUM_SIZE,
            available: data.len(),
        }
        .into());
    }

    let (body, trailer) = data.split_at(data.len() - CHECKSUM_SIZE);
    let mut reader = Reader::new(body);

    let magic: [u8; 4] = reader.array()?;
    if magic != STATE_MAGIC {
        return Err(DecodeError::InvalidMagic(magic).into());
    }

    let version = u16::from_le_bytes(reader.array()?);
    if version != STATE_FORMAT_VERSION {
        return Err(DecodeError::UnsupportedVersion(version).into());
    }

    let mut stored = [0u8; CHECKSUM_SIZE];
    stored.copy_from_slice(trailer);
    let expected = u32::from_le_bytes(stored);
    let actual = CRC32.checksum(body);
    if expected != actual {
        return Err(DecodeError::InvalidChecksum { expected, actual }.into());
    }

    let config = DetectorConfig {
        min_value: f64::from_le_bytes(reader.array()?),
        max_value: f64::from_le_bytes(reader.array()?),
        norm_value: u32::from_le_bytes(reader.array()?),
        memory_window: u32::from_le_bytes(reader.array()?),
        rest_period: u32::from_le_bytes(reader.array()?),
        prob_period: u64::from_le_bytes(reader.array()?),
    };

    let flags = reader.u8()?;
    let last_time = i64::from_le_bytes(reader.array()?);
    let observed_count = u64::from_le_bytes(reader.array()?);
    let rest_countdown = u32::from_le_bytes(reader.array()?);
    let period_offset = reader.offset;
    let period_tag = reader.u8()?;
    let period = Period::from_u8(period_tag).ok_or_else(|| DecodeError::MalformedState {
        offset: period_offset,
        reason: format!("unknown period tag {}", period_tag),
    })?;

    let recent_window = reader.buckets()?;

    let pattern_total = reader.u32()? as usize;
    let mut pattern_counts = PatternCounts::new();
    for _ in 0..pattern_total {
        let pattern = reader.buckets()?;
        let count = u64::from_le_bytes(reader.array()?);
        pattern_counts.insert(pattern, count);
    }

    if reader.remaining() != 0 {
        return Err(DecodeError::MalformedState {
            offset: reader.offset,
            reason: format!("{} trailing bytes", reader.remaining()),
        }
        .into());
    }

    let state = DetectorState {
        last_input_time: (flags & FLAG_HAS_LAST_TIME != 0).then_some(last_time),
        observed_count,
        recent_window,
        pattern_counts,
        rest_countdown,
        period,
    };

    Detector::from_parts(config, state)
}

impl Detector {
    /// Serialize to bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        encode(self)
    }

    /// Deserialize from bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        decode(data)
    }
}

fn write_buckets(bytes: &mut Vec<u8>, buckets: &[Bucket]) {
    bytes.extend_from_slice(&(buckets.len() as u32).to_le_bytes());
    for bucket in buckets {
        bytes.extend_from_slice(&bucket.to_le_bytes());
    }
}

/// Cursor over a byte slice that reports short reads as errors
struct Reader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    fn take(&mut self, len: usize) -> std::result::Result<&'a [u8], DecodeError> {
        if self.remaining() < len {
            return Err(DecodeError::BufferTooShort {
                needed: self.offset + len,
                available: self.data.len(),
            });
        }
        let slice = &self.data[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> std::result::Result<[u8; N], DecodeError> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(self.take(N)?);
        Ok(buf)
    }

    fn u8(&mut self) -> std::result::Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> std::result::Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn buckets(&mut self) -> std::result::Result<Vec<Bucket>, DecodeError> {
        let len = self.u32()? as usize;
        // Length is untrusted until the bytes are actually there.
        let raw = self.take(len.saturating_mul(8))?;
        Ok(raw
            .chunks_exact(8)
            .map(|chunk| {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(chunk);
                Bucket::from_le_bytes(buf)
            })
            .collect())
    }
}
