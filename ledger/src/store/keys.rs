//! Order-preserving key encoding.
//!
//! Composite keys are built field by field so that byte order equals the
//! natural order of the fields:
//!
//! | Field     | Encoding                                   |
//! |-----------|--------------------------------------------|
//! | `u64`     | 8 bytes big-endian                         |
//! | string    | UTF-8 bytes followed by a `0x00` terminator |
//! | timestamp | seconds as `i64` with the sign bit flipped, big-endian, then nanos as `u32` |
//!
//! Strings must not contain NUL; identifiers are validated before they ever
//! reach a key (see [`crate::credit::denom`]).

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyBuilder {
    buf: Vec<u8>,
}

impl KeyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn u64(mut self, v: u64) -> Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn str(mut self, v: &str) -> Self {
        self.buf.extend_from_slice(v.as_bytes());
        self.buf.push(0x00);
        self
    }

    pub fn time(mut self, v: &DateTime<Utc>) -> Self {
        self.buf.extend_from_slice(&encode_time(v));
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.buf
    }
}

/// 12 bytes, ordered like the timestamps they encode.
pub fn encode_time(t: &DateTime<Utc>) -> [u8; 12] {
    let secs = (t.timestamp() as u64) ^ (1 << 63);
    let mut out = [0u8; 12];
    out[..8].copy_from_slice(&secs.to_be_bytes());
    out[8..].copy_from_slice(&t.timestamp_subsec_nanos().to_be_bytes());
    out
}
