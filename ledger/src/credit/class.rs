//! # Credit Registry
//!
//! Reference data for every credit in the system: credit types (added by the
//! authority), classes, projects, and batches. Batches are where credits
//! come from; issuing one credits the recipients and opens the batch's
//! supply record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::balance::{self, Settlement};
use super::denom::{
    format_batch_denom, format_class_id, format_project_id, validate_address,
    validate_credit_type_abbrev, validate_metadata,
};
use super::supply;
use crate::config::{prefix, MAX_CREDIT_PRECISION};
use crate::context::Context;
use crate::error::{LedgerError, LedgerResult};
use crate::math::Dec;
use crate::store::keys::KeyBuilder;
use crate::store::{atomic, table, IndexKey, KvStore, Record, StoreError};

/// Unique index on the human-readable id of classes, projects and batches.
const BY_ID: u8 = 1;
/// Non-unique index on the parent row's key.
const BY_PARENT: u8 = 2;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditType {
    /// 1-3 uppercase letters, e.g. `C` for carbon.
    pub abbreviation: String,
    pub name: String,
    pub unit: String,
    /// Maximum fractional digits of any amount of this type.
    pub precision: u32,
}

impl Record for CreditType {
    const TABLE: u8 = prefix::CREDIT_TYPE;
    const NAME: &'static str = "credit type";

    fn primary_key(&self) -> Vec<u8> {
        KeyBuilder::new().str(&self.abbreviation).build()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditClass {
    pub key: u64,
    pub id: String,
    pub admin: String,
    pub credit_type_abbrev: String,
    pub metadata: String,
}

impl Record for CreditClass {
    const TABLE: u8 = prefix::CREDIT_CLASS;
    const NAME: &'static str = "credit class";

    fn primary_key(&self) -> Vec<u8> {
        KeyBuilder::new().u64(self.key).build()
    }

    fn index_keys(&self) -> Vec<IndexKey> {
        vec![IndexKey::unique(BY_ID, KeyBuilder::new().str(&self.id).build())]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub key: u64,
    pub id: String,
    pub class_key: u64,
    pub admin: String,
    pub jurisdiction: String,
    pub metadata: String,
}

impl Record for Project {
    const TABLE: u8 = prefix::PROJECT;
    const NAME: &'static str = "project";

    fn primary_key(&self) -> Vec<u8> {
        KeyBuilder::new().u64(self.key).build()
    }

    fn index_keys(&self) -> Vec<IndexKey> {
        vec![
            IndexKey::unique(BY_ID, KeyBuilder::new().str(&self.id).build()),
            IndexKey::multi(BY_PARENT, KeyBuilder::new().u64(self.class_key).build()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub key: u64,
    pub denom: String,
    pub project_key: u64,
    pub issuer: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub issuance_date: DateTime<Utc>,
    /// Open batches accept further issuance through `mint_batch_credits`.
    pub open: bool,
    pub metadata: String,
}

impl Record for Batch {
    const TABLE: u8 = prefix::BATCH;
    const NAME: &'static str = "credit batch";

    fn primary_key(&self) -> Vec<u8> {
        KeyBuilder::new().u64(self.key).build()
    }

    fn index_keys(&self) -> Vec<IndexKey> {
        vec![
            IndexKey::unique(BY_ID, KeyBuilder::new().str(&self.denom).build()),
            IndexKey::multi(BY_PARENT, KeyBuilder::new().u64(self.project_key).build()),
        ]
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Credits handed to one recipient at issuance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchIssuance {
    pub recipient: String,
    pub tradable_amount: Dec,
    pub retired_amount: Dec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateBatch {
    pub project_id: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub issuance: Vec<BatchIssuance>,
    pub open: bool,
    pub metadata: String,
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Registers a new credit type. Only `authority` may do this.
pub fn add_credit_type(
    store: &mut dyn KvStore,
    ctx: &Context,
    authority: &str,
    credit_type: CreditType,
) -> LedgerResult<()> {
    if ctx.actor != authority {
        return Err(LedgerError::unauthorized(
            &ctx.actor,
            "is not the governance authority",
        ));
    }
    validate_credit_type_abbrev(&credit_type.abbreviation)?;
    if credit_type.name.trim().is_empty() || credit_type.unit.trim().is_empty() {
        return Err(LedgerError::InvalidRequest(
            "credit type name and unit must not be empty".into(),
        ));
    }
    if credit_type.precision > MAX_CREDIT_PRECISION {
        return Err(LedgerError::InvalidRequest(format!(
            "credit type precision {} exceeds {MAX_CREDIT_PRECISION}",
            credit_type.precision
        )));
    }

    atomic(store, |tx| {
        table::insert(tx, &credit_type).map_err(|e| match e {
            StoreError::AlreadyExists { .. } => LedgerError::AlreadyExists {
                entity: CreditType::NAME,
                id: credit_type.abbreviation.clone(),
            },
            other => other.into(),
        })
    })?;
    info!(
        abbreviation = %credit_type.abbreviation,
        precision = credit_type.precision,
        "credit type added"
    );
    Ok(())
}

/// Creates a class of the given credit type with the caller as admin.
pub fn create_class(
    store: &mut dyn KvStore,
    ctx: &Context,
    credit_type_abbrev: &str,
    metadata: &str,
) -> LedgerResult<String> {
    validate_address(&ctx.actor)?;
    validate_metadata(metadata)?;
    let id = atomic(store, |tx| {
        credit_type(tx, credit_type_abbrev)?;
        let seq = table::next_sequence::<CreditClass>(
            tx,
            &KeyBuilder::new().str(credit_type_abbrev).build(),
        )?;
        let class = CreditClass {
            key: table::next_id::<CreditClass>(tx)?,
            id: format_class_id(credit_type_abbrev, seq),
            admin: ctx.actor.clone(),
            credit_type_abbrev: credit_type_abbrev.to_string(),
            metadata: metadata.to_string(),
        };
        table::insert(tx, &class)?;
        Ok::<_, LedgerError>(class.id)
    })?;
    info!(class_id = %id, admin = %ctx.actor, "credit class created");
    Ok(id)
}

/// Creates a project under `class_id`. Class admin only.
pub fn create_project(
    store: &mut dyn KvStore,
    ctx: &Context,
    class_id: &str,
    jurisdiction: &str,
    metadata: &str,
) -> LedgerResult<String> {
    validate_metadata(metadata)?;
    if jurisdiction.trim().is_empty() {
        return Err(LedgerError::InvalidRequest("jurisdiction must not be empty".into()));
    }
    let id = atomic(store, |tx| {
        let class = class_by_id(tx, class_id)?;
        if class.admin != ctx.actor {
            return Err(LedgerError::unauthorized(
                &ctx.actor,
                format!("is not the admin of class {class_id}"),
            ));
        }
        let seq = table::next_sequence::<Project>(tx, &KeyBuilder::new().u64(class.key).build())?;
        let project = Project {
            key: table::next_id::<Project>(tx)?,
            id: format_project_id(&class.id, seq),
            class_key: class.key,
            admin: ctx.actor.clone(),
            jurisdiction: jurisdiction.to_string(),
            metadata: metadata.to_string(),
        };
        table::insert(tx, &project)?;
        Ok(project.id)
    })?;
    info!(project_id = %id, class_id, "project created");
    Ok(id)
}

/// Issues a new batch under a project and credits the recipients.
///
/// Only the admin of the project's class may issue. Returns the batch denom.
pub fn create_batch(
    store: &mut dyn KvStore,
    ctx: &Context,
    req: CreateBatch,
) -> LedgerResult<String> {
    validate_metadata(&req.metadata)?;
    if req.start_date >= req.end_date {
        return Err(LedgerError::InvalidRequest(format!(
            "batch start date {} must be before end date {}",
            req.start_date, req.end_date
        )));
    }

    let denom = atomic(store, |tx| {
        let project = project_by_id(tx, &req.project_id)?;
        let class: CreditClass = table::must_get(
            tx,
            &KeyBuilder::new().u64(project.class_key).build(),
            &project.class_key.to_string(),
        )?;
        if class.admin != ctx.actor {
            return Err(LedgerError::unauthorized(
                &ctx.actor,
                format!("is not an issuer for class {}", class.id),
            ));
        }
        let ctype = credit_type(tx, &class.credit_type_abbrev)?;

        let seq = table::next_sequence::<Batch>(tx, &KeyBuilder::new().u64(project.key).build())?;
        let batch = Batch {
            key: table::next_id::<Batch>(tx)?,
            denom: format_batch_denom(&project.id, &req.start_date, &req.end_date, seq),
            project_key: project.key,
            issuer: ctx.actor.clone(),
            start_date: req.start_date,
            end_date: req.end_date,
            issuance_date: ctx.block_time,
            open: req.open,
            metadata: req.metadata.clone(),
        };
        table::insert(tx, &batch)?;
        table::insert(tx, &supply::BatchSupply::empty(batch.key))?;
        issue(tx, &batch, &ctype, &req.issuance)?;
        Ok(batch.denom)
    })?;
    info!(
        batch_denom = %denom,
        issuer = %ctx.actor,
        recipients = req.issuance.len(),
        "credit batch issued"
    );
    Ok(denom)
}

/// Issues more credits into an open batch. Batch issuer only.
pub fn mint_batch_credits(
    store: &mut dyn KvStore,
    ctx: &Context,
    batch_denom: &str,
    issuance: &[BatchIssuance],
) -> LedgerResult<()> {
    atomic(store, |tx| {
        let batch = batch_by_denom(tx, batch_denom)?;
        if batch.issuer != ctx.actor {
            return Err(LedgerError::unauthorized(
                &ctx.actor,
                format!("is not the issuer of batch {batch_denom}"),
            ));
        }
        if !batch.open {
            return Err(LedgerError::InvalidRequest(format!(
                "batch {batch_denom} is closed to new issuance"
            )));
        }
        let ctype = credit_type_of_batch(tx, &batch)?;
        issue(tx, &batch, &ctype, issuance)
    })?;
    info!(batch_denom, recipients = issuance.len(), "batch credits minted");
    Ok(())
}

/// Closes an open batch to further issuance. Batch issuer only.
pub fn seal_batch(store: &mut dyn KvStore, ctx: &Context, batch_denom: &str) -> LedgerResult<()> {
    atomic(store, |tx| {
        let mut batch = batch_by_denom(tx, batch_denom)?;
        if batch.issuer != ctx.actor {
            return Err(LedgerError::unauthorized(
                &ctx.actor,
                format!("is not the issuer of batch {batch_denom}"),
            ));
        }
        batch.open = false;
        table::update(tx, &batch)?;
        Ok::<_, LedgerError>(())
    })?;
    info!(batch_denom, "batch sealed");
    Ok(())
}

fn issue(
    tx: &mut dyn KvStore,
    batch: &Batch,
    ctype: &CreditType,
    issuance: &[BatchIssuance],
) -> LedgerResult<()> {
    for entry in issuance {
        validate_address(&entry.recipient)?;
        entry.tradable_amount.ensure_precision(ctype.precision)?;
        entry.retired_amount.ensure_precision(ctype.precision)?;
        if entry.tradable_amount.is_zero() && entry.retired_amount.is_zero() {
            return Err(LedgerError::InvalidAmount(format!(
                "issuance to {} is empty",
                entry.recipient
            )));
        }
        let (tradable, retired) = (entry.tradable_amount, entry.retired_amount);
        balance::credit(tx, &entry.recipient, batch.key, tradable, Settlement::Tradable)?;
        balance::credit(tx, &entry.recipient, batch.key, retired, Settlement::Retired)?;
        supply::record_issuance(tx, batch.key, tradable, retired)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Lookups
// ---------------------------------------------------------------------------

pub fn credit_type(store: &dyn KvStore, abbrev: &str) -> LedgerResult<CreditType> {
    Ok(table::must_get(
        store,
        &KeyBuilder::new().str(abbrev).build(),
        abbrev,
    )?)
}

pub fn class_by_id(store: &dyn KvStore, class_id: &str) -> LedgerResult<CreditClass> {
    table::get_by_unique(store, BY_ID, &KeyBuilder::new().str(class_id).build())?
        .ok_or_else(|| LedgerError::not_found(CreditClass::NAME, class_id))
}

pub fn project_by_id(store: &dyn KvStore, project_id: &str) -> LedgerResult<Project> {
    table::get_by_unique(store, BY_ID, &KeyBuilder::new().str(project_id).build())?
        .ok_or_else(|| LedgerError::not_found(Project::NAME, project_id))
}

pub fn batch_by_denom(store: &dyn KvStore, denom: &str) -> LedgerResult<Batch> {
    table::get_by_unique(store, BY_ID, &KeyBuilder::new().str(denom).build())?
        .ok_or_else(|| LedgerError::not_found(Batch::NAME, denom))
}

pub fn batch_by_key(store: &dyn KvStore, key: u64) -> LedgerResult<Batch> {
    Ok(table::must_get(
        store,
        &KeyBuilder::new().u64(key).build(),
        &key.to_string(),
    )?)
}

/// The class a batch was issued under, via its project.
pub fn class_of_batch(store: &dyn KvStore, batch: &Batch) -> LedgerResult<CreditClass> {
    let project: Project = table::must_get(
        store,
        &KeyBuilder::new().u64(batch.project_key).build(),
        &batch.project_key.to_string(),
    )?;
    Ok(table::must_get(
        store,
        &KeyBuilder::new().u64(project.class_key).build(),
        &project.class_key.to_string(),
    )?)
}

pub fn credit_type_of_batch(store: &dyn KvStore, batch: &Batch) -> LedgerResult<CreditType> {
    let class = class_of_batch(store, batch)?;
    credit_type(store, &class.credit_type_abbrev)
}
