//! Identifier formats for credit types, classes, projects, batches, and
//! holder addresses.
//!
//! ```text
//! credit type   C                              1-3 uppercase letters
//! class         C01                            type + per-type sequence (2+ digits)
//! project       C01-001                        class + per-class sequence (3+ digits)
//! batch denom   C01-001-20200101-20210101-001  project + start + end + per-project sequence
//! ```

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::{LedgerError, LedgerResult};

/// Human-readable prefix of every address derived by [`derive_module_address`].
pub const ADDRESS_PREFIX: &str = "eco1";

const ADDRESS_MIN_LEN: usize = 3;
const ADDRESS_MAX_LEN: usize = 64;

/// Upper bound on free-form metadata strings.
pub const MAX_METADATA_LEN: usize = 256;

const DATE_FORMAT: &str = "%Y%m%d";

fn invalid(what: &str, value: &str) -> LedgerError {
    LedgerError::InvalidRequest(format!("invalid {what}: {value:?}"))
}

/// Holder addresses: lowercase ASCII letters and digits, 3 to 64 characters.
pub fn validate_address(address: &str) -> LedgerResult<()> {
    let ok = (ADDRESS_MIN_LEN..=ADDRESS_MAX_LEN).contains(&address.len())
        && address
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit());
    if !ok {
        return Err(invalid("address", address));
    }
    Ok(())
}

pub fn validate_metadata(metadata: &str) -> LedgerResult<()> {
    if metadata.len() > MAX_METADATA_LEN {
        return Err(LedgerError::InvalidRequest(format!(
            "metadata exceeds {MAX_METADATA_LEN} bytes"
        )));
    }
    Ok(())
}

pub fn validate_credit_type_abbrev(abbrev: &str) -> LedgerResult<()> {
    let ok = (1..=3).contains(&abbrev.len()) && abbrev.bytes().all(|b| b.is_ascii_uppercase());
    if !ok {
        return Err(invalid("credit type abbreviation", abbrev));
    }
    Ok(())
}

/// `C` + 1 -> `C01`.
pub fn format_class_id(credit_type_abbrev: &str, seq: u64) -> String {
    format!("{credit_type_abbrev}{seq:02}")
}

/// `C01` + 1 -> `C01-001`.
pub fn format_project_id(class_id: &str, seq: u64) -> String {
    format!("{class_id}-{seq:03}")
}

pub fn format_batch_denom(
    project_id: &str,
    start: &DateTime<Utc>,
    end: &DateTime<Utc>,
    seq: u64,
) -> String {
    format!(
        "{project_id}-{}-{}-{seq:03}",
        start.format(DATE_FORMAT),
        end.format(DATE_FORMAT)
    )
}

/// Splits a class id into its credit type abbreviation and sequence.
pub fn parse_class_id(class_id: &str) -> LedgerResult<(&str, u64)> {
    let split = class_id
        .find(|c: char| c.is_ascii_digit())
        .ok_or_else(|| invalid("class id", class_id))?;
    let (abbrev, digits) = class_id.split_at(split);
    validate_credit_type_abbrev(abbrev).map_err(|_| invalid("class id", class_id))?;
    let seq = parse_seq(digits, 2).ok_or_else(|| invalid("class id", class_id))?;
    Ok((abbrev, seq))
}

/// Splits a project id into its class id and sequence.
pub fn parse_project_id(project_id: &str) -> LedgerResult<(&str, u64)> {
    let (class_id, digits) = project_id
        .split_once('-')
        .ok_or_else(|| invalid("project id", project_id))?;
    parse_class_id(class_id).map_err(|_| invalid("project id", project_id))?;
    let seq = parse_seq(digits, 3).ok_or_else(|| invalid("project id", project_id))?;
    Ok((class_id, seq))
}

fn parse_seq(digits: &str, min_width: usize) -> Option<u64> {
    if digits.len() < min_width || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok().filter(|seq| *seq > 0)
}

/// A decomposed batch denom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchDenom {
    pub class_id: String,
    pub project_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub sequence: u64,
}

impl BatchDenom {
    pub fn parse(denom: &str) -> LedgerResult<Self> {
        let bad = || invalid("batch denom", denom);
        let parts: Vec<&str> = denom.split('-').collect();
        let [class_id, project_seq, start, end, seq] = parts.as_slice() else {
            return Err(bad());
        };
        let project_id = format!("{class_id}-{project_seq}");
        parse_project_id(&project_id).map_err(|_| bad())?;

        let date = |s: &str| {
            if s.len() != 8 {
                return None;
            }
            NaiveDate::parse_from_str(s, DATE_FORMAT).ok()
        };
        let start_date = date(*start).ok_or_else(bad)?;
        let end_date = date(*end).ok_or_else(bad)?;
        if start_date > end_date {
            return Err(bad());
        }
        let sequence = parse_seq(seq, 3).ok_or_else(bad)?;

        Ok(Self {
            class_id: class_id.to_string(),
            project_id,
            start_date,
            end_date,
            sequence,
        })
    }

    /// Credit type abbreviation embedded in the class id.
    pub fn credit_type_abbrev(&self) -> &str {
        let split = self
            .class_id
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(self.class_id.len());
        &self.class_id[..split]
    }
}

impl fmt::Display for BatchDenom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}-{:03}",
            self.project_id,
            self.start_date.format(DATE_FORMAT),
            self.end_date.format(DATE_FORMAT),
            self.sequence
        )
    }
}

/// Deterministic account address for a module-owned account, e.g. the
/// holding address of a basket.
pub fn derive_module_address(module: &str, key: &[u8]) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(module.as_bytes());
    hasher.update(&[0]);
    hasher.update(key);
    let digest = hasher.finalize();
    format!("{ADDRESS_PREFIX}{}", hex::encode(&digest.as_bytes()[..20]))
}
