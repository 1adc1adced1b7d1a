// src/requests/code.rs
//! Buyer-facing request codes: `REQ-YYYYMMDD-XXXXXXXXXX`.

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use rand::Rng;
use regex::Regex;

/// Uppercase letters without I and O, digits without 0 and 1.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const CODE_SUFFIX_LEN: usize = 10;

lazy_static! {
    static ref REQUEST_CODE_REGEX: Regex =
        Regex::new(r"^REQ-[0-9]{8}-[A-HJ-NP-Z2-9]{10}$").unwrap();
}

pub fn generate_request_code(now: DateTime<Utc>) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..CODE_SUFFIX_LEN)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect();
    format!("REQ-{}-{}", now.format("%Y%m%d"), suffix)
}

pub fn is_valid_request_code(code: &str) -> bool {
    REQUEST_CODE_REGEX.is_match(code)
}
