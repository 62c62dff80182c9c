use chrono::{DateTime, Utc};

/// Caller identity and block time for one transaction.
///
/// Every mutating operation takes a `Context`; the ledger never reads the
/// wall clock itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Context {
    pub actor: String,
    pub block_time: DateTime<Utc>,
}

impl Context {
    pub fn new(actor: impl Into<String>, block_time: DateTime<Utc>) -> Self {
        Self {
            actor: actor.into(),
            block_time,
        }
    }

    /// Same block, different signer.
    pub fn with_actor(&self, actor: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            block_time: self.block_time,
        }
    }
}
