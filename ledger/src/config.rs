//! # Ledger Configuration & Constants
//!
//! Named constants shared across the workspace, plus the runtime
//! [`LedgerConfig`] that hosts load from TOML. Every section has defaults,
//! so an empty document is a valid configuration.
//!
//! ```toml
//! [pagination]
//! default_limit = 100
//! max_limit = 1000
//!
//! [marketplace]
//! authority = "eco1governance"
//! max_orders_per_request = 100
//!
//! [basket]
//! max_credits_per_request = 100
//!
//! [logging]
//! level = "info"
//! format = "json"
//! ```

use serde::{Deserialize, Serialize};

use crate::logging::LogFormat;

// ---------------------------------------------------------------------------
// Precision
// ---------------------------------------------------------------------------

/// Upper bound on a credit type's decimal precision.
pub const MAX_CREDIT_PRECISION: u32 = 6;

/// Exponents with an SI prefix. Basket pool tokens and allow-listed payment
/// denoms must declare one of these.
pub const SI_EXPONENTS: [u32; 11] = [0, 1, 2, 3, 6, 9, 12, 15, 18, 21, 24];

// ---------------------------------------------------------------------------
// Pagination
// ---------------------------------------------------------------------------

pub const DEFAULT_PAGE_LIMIT: u64 = 100;

pub const MAX_PAGE_LIMIT: u64 = 1000;

// ---------------------------------------------------------------------------
// Marketplace
// ---------------------------------------------------------------------------

/// Address allowed to run governance operations when none is configured.
pub const DEFAULT_AUTHORITY: &str = "eco1governance";

pub const DEFAULT_MAX_ORDERS_PER_REQUEST: usize = 100;

pub const DEFAULT_MAX_CREDITS_PER_REQUEST: usize = 100;

// ---------------------------------------------------------------------------
// Key Prefixes
// ---------------------------------------------------------------------------

/// First byte of every stored key. Each table owns one byte; all crates in
/// the workspace share the keyspace, so new tables must pick a free byte.
pub mod prefix {
    // Credit registry and balances.
    pub const CREDIT_TYPE: u8 = 0x01;
    pub const CREDIT_CLASS: u8 = 0x02;
    pub const PROJECT: u8 = 0x03;
    pub const BATCH: u8 = 0x04;
    pub const BATCH_SUPPLY: u8 = 0x05;
    pub const BALANCE: u8 = 0x06;

    // Bank.
    pub const COIN_BALANCE: u8 = 0x08;
    pub const COIN_SUPPLY: u8 = 0x09;

    // Marketplace.
    pub const MARKET: u8 = 0x10;
    pub const ALLOWED_DENOM: u8 = 0x11;
    pub const SELL_ORDER: u8 = 0x12;

    // Baskets.
    pub const BASKET: u8 = 0x20;
    pub const BASKET_CLASS: u8 = 0x21;
    pub const BASKET_BALANCE: u8 = 0x22;

    /// Auto-increment counters, keyed by table byte.
    pub const SEQUENCE: u8 = 0xFF;
}

// ---------------------------------------------------------------------------
// Runtime Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub pagination: PaginationConfig,
    pub marketplace: MarketplaceConfig,
    pub basket: BasketConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    /// Page size used when a request asks for limit 0.
    pub default_limit: u64,
    /// Hard cap on any page.
    pub max_limit: u64,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_PAGE_LIMIT,
            max_limit: MAX_PAGE_LIMIT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketplaceConfig {
    /// Governance address for credit-type and allow-list administration.
    pub authority: String,
    pub max_orders_per_request: usize,
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            authority: DEFAULT_AUTHORITY.to_string(),
            max_orders_per_request: DEFAULT_MAX_ORDERS_PER_REQUEST,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BasketConfig {
    /// Bound on the number of batch entries in one `put`.
    pub max_credits_per_request: usize,
}

impl Default for BasketConfig {
    fn default() -> Self {
        Self {
            max_credits_per_request: DEFAULT_MAX_CREDITS_PER_REQUEST,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive; `RUST_LOG` wins when set.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl LedgerConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: LedgerConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.pagination;
        if p.default_limit == 0 || p.max_limit == 0 {
            return Err(ConfigError::Invalid("page limits must be positive".into()));
        }
        if p.default_limit > p.max_limit {
            return Err(ConfigError::Invalid(format!(
                "default page limit {} exceeds max {}",
                p.default_limit, p.max_limit
            )));
        }
        if self.marketplace.authority.trim().is_empty() {
            return Err(ConfigError::Invalid("marketplace.authority is empty".into()));
        }
        if self.marketplace.max_orders_per_request == 0 {
            return Err(ConfigError::Invalid(
                "marketplace.max_orders_per_request must be positive".into(),
            ));
        }
        if self.basket.max_credits_per_request == 0 {
            return Err(ConfigError::Invalid(
                "basket.max_credits_per_request must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let cfg = LedgerConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, LedgerConfig::default());
        assert_eq!(cfg.marketplace.authority, DEFAULT_AUTHORITY);
    }

    #[test]
    fn partial_sections_merge_with_defaults() {
        let cfg = LedgerConfig::from_toml_str(
            r#"
            [marketplace]
            authority = "eco1council"

            [logging]
            format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.marketplace.authority, "eco1council");
        assert_eq!(
            cfg.marketplace.max_orders_per_request,
            DEFAULT_MAX_ORDERS_PER_REQUEST
        );
        assert_eq!(cfg.logging.format, LogFormat::Json);
        assert_eq!(cfg.pagination.max_limit, MAX_PAGE_LIMIT);
    }

    #[test]
    fn rejects_inverted_page_limits() {
        let err = LedgerConfig::from_toml_str(
            r#"
            [pagination]
            default_limit = 500
            max_limit = 10
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_empty_authority() {
        let mut cfg = LedgerConfig::default();
        cfg.marketplace.authority = " ".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = LedgerConfig::from_toml_str("[pagination\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn prefixes_are_distinct() {
        let all = [
            prefix::CREDIT_TYPE,
            prefix::CREDIT_CLASS,
            prefix::PROJECT,
            prefix::BATCH,
            prefix::BATCH_SUPPLY,
            prefix::BALANCE,
            prefix::COIN_BALANCE,
            prefix::COIN_SUPPLY,
            prefix::MARKET,
            prefix::ALLOWED_DENOM,
            prefix::SELL_ORDER,
            prefix::BASKET,
            prefix::BASKET_CLASS,
            prefix::BASKET_BALANCE,
            prefix::SEQUENCE,
        ];
        let unique: std::collections::BTreeSet<u8> = all.iter().copied().collect();
        assert_eq!(unique.len(), all.len());
    }
}
