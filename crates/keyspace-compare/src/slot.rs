//! Cluster hash slots.
//!
//! A key's slot is `CRC16(key) mod 16384` (CRC16/XMODEM), where only the
//! content of the first non-empty `{...}` hash tag is hashed if present.

use std::ops::RangeInclusive;

/// Number of hash slots in a cluster keyspace.
pub const SLOT_COUNT: u16 = 16384;

/// CRC16/XMODEM: polynomial 0x1021, initial value 0, no reflection.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// Hash slot of a key, honoring `{hash tags}`.
pub fn key_slot(key: &[u8]) -> u16 {
    crc16(hash_tag(key)) % SLOT_COUNT
}

fn hash_tag(key: &[u8]) -> &[u8] {
    if let Some(open) = key.iter().position(|&b| b == b'{') {
        if let Some(len) = key[open + 1..].iter().position(|&b| b == b'}') {
            if len > 0 {
                return &key[open + 1..open + 1 + len];
            }
        }
    }
    key
}

/// Split the slot space into `count` contiguous ranges of near-equal size.
pub fn partition_ranges(count: usize) -> Vec<RangeInclusive<u16>> {
    let count = count.clamp(1, SLOT_COUNT as usize);
    let total = SLOT_COUNT as usize;
    (0..count)
        .map(|i| {
            let start = i * total / count;
            let end = (i + 1) * total / count - 1;
            start as u16..=end as u16
        })
        .collect()
}

/// Parse a `start:end` (or single `slot`) range specification.
pub fn parse_slot_range(spec: &str) -> Result<RangeInclusive<u16>, String> {
    let (start, end) = match spec.split_once(':') {
        Some((s, e)) => (s.trim(), e.trim()),
        None => (spec.trim(), spec.trim()),
    };
    let start: u16 = start
        .parse()
        .map_err(|_| format!("Invalid slot range start: {start}"))?;
    let end: u16 = end
        .parse()
        .map_err(|_| format!("Invalid slot range end: {end}"))?;
    if start > end || end >= SLOT_COUNT {
        return Err(format!(
            "Invalid slot range {start}:{end} (must satisfy start <= end < {SLOT_COUNT})"
        ));
    }
    Ok(start..=end)
}
