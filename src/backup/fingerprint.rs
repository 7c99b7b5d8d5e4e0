//! Change detection for exported state
//!
//! A fast, non-cryptographic rolling hash over a small composite key. It is a
//! heuristic: two different states with equal length and equal counts share
//! a fingerprint, and such a change goes unnoticed until something else
//! moves. Backup cadence depends on this, so the hash must stay as is.

/// Fingerprint of an exported state
pub fn fingerprint(exported_len: usize, session_count: u64, message_count: u64) -> String {
    simple_hash(&format!(
        "{}-{}-{}",
        exported_len, session_count, message_count
    ))
}

/// 32-bit wrapping `hash * 31 + unit` over UTF-16 code units, in base 36
pub fn simple_hash(input: &str) -> String {
    let hash = input.encode_utf16().fold(0i32, |hash, unit| {
        (hash << 5).wrapping_sub(hash).wrapping_add(i32::from(unit))
    });
    to_base36(hash)
}

fn to_base36(value: i32) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    let mut magnitude = i64::from(value).unsigned_abs();
    if magnitude == 0 {
        return "0".to_string();
    }

    let mut out = Vec::new();
    while magnitude > 0 {
        out.push(DIGITS[(magnitude % 36) as usize]);
        magnitude /= 36;
    }
    if value < 0 {
        out.push(b'-');
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}
