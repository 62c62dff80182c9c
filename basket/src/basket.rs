//! Basket records and admission rules.

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use eco_ledger::config::prefix;
use eco_ledger::credit::denom::derive_module_address;
use eco_ledger::store::keys::KeyBuilder;
use eco_ledger::store::{IndexKey, Record};
use eco_ledger::{LedgerError, LedgerResult};

pub(crate) const BY_DENOM: u8 = 1;

/// Module name mixed into every basket's derived holding address.
pub const BASKET_MODULE: &str = "basket";

/// Leading segment of every pool-token denom.
pub const DENOM_PREFIX: &str = "eco";

const NAME_MIN_LEN: usize = 3;
const NAME_MAX_LEN: usize = 8;

/// Widest start-date window a basket may declare (100 years).
pub const MAX_START_DATE_WINDOW_SECS: u64 = 100 * 365 * 24 * 60 * 60;

/// Cap on `YearsInThePast`.
pub const MAX_YEARS_IN_THE_PAST: u32 = 100;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Basket {
    pub id: u64,
    /// Pool-token denom, e.g. `eco.uC.NCT`.
    pub basket_denom: String,
    pub name: String,
    pub curator: String,
    pub credit_type_abbrev: String,
    /// Pool tokens minted per credit, as a power of ten.
    pub exponent: u32,
    /// `false` forces credits taken out of the basket into retirement.
    pub disable_auto_retire: bool,
    pub date_criteria: Option<DateCriteria>,
}

impl Record for Basket {
    const TABLE: u8 = prefix::BASKET;
    const NAME: &'static str = "basket";

    fn primary_key(&self) -> Vec<u8> {
        basket_key(self.id)
    }

    fn index_keys(&self) -> Vec<IndexKey> {
        vec![IndexKey::unique(
            BY_DENOM,
            KeyBuilder::new().str(&self.basket_denom).build(),
        )]
    }
}

pub(crate) fn basket_key(id: u64) -> Vec<u8> {
    KeyBuilder::new().u64(id).build()
}

impl Basket {
    /// Address that holds the basket's credits in the balance ledger.
    pub fn address(&self) -> String {
        derive_module_address(BASKET_MODULE, self.basket_denom.as_bytes())
    }
}

/// One credit class a basket accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasketClass {
    pub basket_id: u64,
    pub class_id: String,
}

impl Record for BasketClass {
    const TABLE: u8 = prefix::BASKET_CLASS;
    const NAME: &'static str = "basket class";

    fn primary_key(&self) -> Vec<u8> {
        basket_class_key(self.basket_id, &self.class_id)
    }
}

pub(crate) fn basket_class_key(basket_id: u64, class_id: &str) -> Vec<u8> {
    KeyBuilder::new().u64(basket_id).str(class_id).build()
}

// ---------------------------------------------------------------------------
// Admission rules
// ---------------------------------------------------------------------------

/// Lower bound on the start date of batches a basket accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateCriteria {
    /// Fixed cutoff.
    MinStartDate(DateTime<Utc>),
    /// Rolling cutoff: block time minus this many seconds.
    StartDateWindow(u64),
    /// Rolling cutoff: January 1st of the year `n` years before the block
    /// time's year.
    YearsInThePast(u32),
}

impl DateCriteria {
    pub fn validate(&self) -> LedgerResult<()> {
        match *self {
            DateCriteria::MinStartDate(_) => Ok(()),
            DateCriteria::StartDateWindow(secs) => {
                if secs == 0 || secs > MAX_START_DATE_WINDOW_SECS {
                    return Err(LedgerError::InvalidRequest(format!(
                        "start date window must be between 1 and {MAX_START_DATE_WINDOW_SECS} seconds"
                    )));
                }
                Ok(())
            }
            DateCriteria::YearsInThePast(years) => {
                if years == 0 || years > MAX_YEARS_IN_THE_PAST {
                    return Err(LedgerError::InvalidRequest(format!(
                        "years in the past must be between 1 and {MAX_YEARS_IN_THE_PAST}"
                    )));
                }
                Ok(())
            }
        }
    }

    /// Earliest batch start date accepted at `block_time`.
    pub fn min_start_date(&self, block_time: DateTime<Utc>) -> LedgerResult<DateTime<Utc>> {
        let out_of_range =
            || LedgerError::InvalidRequest(format!("date criteria {self:?} out of range"));
        match *self {
            DateCriteria::MinStartDate(date) => Ok(date),
            DateCriteria::StartDateWindow(secs) => {
                let secs = i64::try_from(secs).map_err(|_| out_of_range())?;
                let window = Duration::try_seconds(secs).ok_or_else(out_of_range)?;
                block_time.checked_sub_signed(window).ok_or_else(out_of_range)
            }
            DateCriteria::YearsInThePast(years) => {
                let year = block_time.year() - i32::try_from(years).map_err(|_| out_of_range())?;
                Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0)
                    .single()
                    .ok_or_else(out_of_range)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Creation request & denom format
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateBasket {
    pub name: String,
    pub credit_type_abbrev: String,
    pub exponent: u32,
    pub disable_auto_retire: bool,
    /// Class ids whose batches may be deposited. Must not be empty.
    pub allowed_classes: Vec<String>,
    pub date_criteria: Option<DateCriteria>,
}

/// 3-8 ASCII alphanumerics, starting with a letter.
pub fn validate_basket_name(name: &str) -> LedgerResult<()> {
    let ok = (NAME_MIN_LEN..=NAME_MAX_LEN).contains(&name.len())
        && name.starts_with(|c: char| c.is_ascii_alphabetic())
        && name.chars().all(|c| c.is_ascii_alphanumeric());
    if !ok {
        return Err(LedgerError::InvalidRequest(format!(
            "basket name {name:?} must be {NAME_MIN_LEN}-{NAME_MAX_LEN} alphanumerics starting with a letter"
        )));
    }
    Ok(())
}

/// SI prefix symbol for a power of ten, e.g. `u` for 6.
pub fn si_prefix(exponent: u32) -> Option<&'static str> {
    let symbol = match exponent {
        0 => "",
        1 => "d",
        2 => "c",
        3 => "m",
        6 => "u",
        9 => "n",
        12 => "p",
        15 => "f",
        18 => "a",
        21 => "z",
        24 => "y",
        _ => return None,
    };
    Some(symbol)
}

/// `eco.<SI prefix><credit type>.<name>`, e.g. `eco.uC.NCT`.
pub fn format_basket_denom(
    name: &str,
    credit_type_abbrev: &str,
    exponent: u32,
) -> LedgerResult<String> {
    let symbol = si_prefix(exponent).ok_or_else(|| {
        LedgerError::InvalidRequest(format!("exponent {exponent} has no SI prefix"))
    })?;
    Ok(format!("{DENOM_PREFIX}.{symbol}{credit_type_abbrev}.{name}"))
}
