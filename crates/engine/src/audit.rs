//! Append-only audit trail.
//!
//! The engine never writes audit rows itself: [`AuditSubscriber`] turns
//! committed [`LedgerEvent`]s into [`AuditEntry`]s and hands them to an
//! [`AuditRecorder`]. Recording is fire-and-forget.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::{
    Clock, LedgerEvent,
    events::{LedgerSubscriber, SubscriberError},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AuditEntry {
    pub user_id: String,
    pub table_name: &'static str,
    pub record_id: Uuid,
    pub action: AuditAction,
    pub old: Option<Value>,
    pub new: Option<Value>,
    pub changed_at: DateTime<Utc>,
}

pub trait AuditRecorder: Send + Sync {
    fn record(&self, entry: AuditEntry);
}

/// Writes entries to the `audit` tracing target.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditRecorder;

impl AuditRecorder for TracingAuditRecorder {
    fn record(&self, entry: AuditEntry) {
        info!(
            target: "audit",
            user = %entry.user_id,
            table = entry.table_name,
            record = %entry.record_id,
            action = entry.action.as_str(),
            old = ?entry.old,
            new = ?entry.new,
            "audit"
        );
    }
}

/// Keeps entries in memory.
#[derive(Debug, Default)]
pub struct MemoryAuditRecorder {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl AuditRecorder for MemoryAuditRecorder {
    fn record(&self, entry: AuditEntry) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }
}

/// Bridges the event stream to an [`AuditRecorder`].
pub struct AuditSubscriber {
    recorder: Arc<dyn AuditRecorder>,
    clock: Arc<dyn Clock>,
}

impl AuditSubscriber {
    pub fn new(recorder: Arc<dyn AuditRecorder>, clock: Arc<dyn Clock>) -> Self {
        Self { recorder, clock }
    }
}

#[async_trait]
impl LedgerSubscriber for AuditSubscriber {
    fn name(&self) -> &str {
        "audit"
    }

    async fn handle(&self, event: &LedgerEvent) -> Result<(), SubscriberError> {
        let change = audit_change(event).map_err(|err| SubscriberError {
            name: self.name().to_string(),
            reason: err.to_string(),
        })?;
        let Some(change) = change else {
            return Ok(());
        };
        self.recorder.record(AuditEntry {
            user_id: event.user_id().to_string(),
            table_name: change.table_name,
            record_id: change.record_id,
            action: change.action,
            old: change.old,
            new: change.new,
            changed_at: self.clock.now(),
        });
        Ok(())
    }
}

struct AuditChange {
    table_name: &'static str,
    record_id: Uuid,
    action: AuditAction,
    old: Option<Value>,
    new: Option<Value>,
}

impl AuditChange {
    fn create(
        table_name: &'static str,
        record_id: Uuid,
        new: &impl Serialize,
    ) -> serde_json::Result<Self> {
        Ok(Self {
            table_name,
            record_id,
            action: AuditAction::Create,
            old: None,
            new: Some(serde_json::to_value(new)?),
        })
    }

    fn update(
        table_name: &'static str,
        record_id: Uuid,
        old: &impl Serialize,
        new: &impl Serialize,
    ) -> serde_json::Result<Self> {
        Ok(Self {
            table_name,
            record_id,
            action: AuditAction::Update,
            old: Some(serde_json::to_value(old)?),
            new: Some(serde_json::to_value(new)?),
        })
    }

    fn delete(
        table_name: &'static str,
        record_id: Uuid,
        old: &impl Serialize,
    ) -> serde_json::Result<Self> {
        Ok(Self {
            table_name,
            record_id,
            action: AuditAction::Delete,
            old: Some(serde_json::to_value(old)?),
            new: None,
        })
    }
}

/// Balance changes are not audited on their own: they are part of the
/// transaction row they belong to.
fn audit_change(event: &LedgerEvent) -> serde_json::Result<Option<AuditChange>> {
    let change = match event {
        LedgerEvent::AccountCreated { account } => {
            AuditChange::create("accounts", account.id, account)?
        }
        LedgerEvent::AccountUpdated { old, new } => {
            AuditChange::update("accounts", new.id, old, new)?
        }
        LedgerEvent::BalanceChanged { .. } => return Ok(None),
        LedgerEvent::TransactionCreated { transaction } => {
            AuditChange::create("transactions", transaction.id, transaction)?
        }
        LedgerEvent::TransactionUpdated { old, new } => {
            AuditChange::update("transactions", new.id, old, new)?
        }
        LedgerEvent::TransactionDeleted { transaction } => {
            AuditChange::delete("transactions", transaction.id, transaction)?
        }
        LedgerEvent::SplitAdded { split, .. } => {
            AuditChange::create("transaction_splits", split.id, split)?
        }
        LedgerEvent::SplitRemoved { split, .. } => {
            AuditChange::delete("transaction_splits", split.id, split)?
        }
        LedgerEvent::CategoryCreated { category } => {
            AuditChange::create("categories", category.id, category)?
        }
        LedgerEvent::CategoryDeleted { category } => {
            AuditChange::delete("categories", category.id, category)?
        }
        LedgerEvent::BudgetCreated { budget } => AuditChange::create("budgets", budget.id, budget)?,
        LedgerEvent::BudgetUpdated { old, new } => {
            AuditChange::update("budgets", new.id, old, new)?
        }
        LedgerEvent::BudgetDeleted { budget } => AuditChange::delete("budgets", budget.id, budget)?,
        LedgerEvent::BillCreated { bill } => {
            AuditChange::create("recurring_bills", bill.id, bill)?
        }
        LedgerEvent::BillUpdated { old, new } | LedgerEvent::BillGenerated { old, new, .. } => {
            AuditChange::update("recurring_bills", new.id, old, new)?
        }
    };
    Ok(Some(change))
}
