//! Domain events emitted by the engine.
//!
//! Events are collected while a mutation runs inside its DB transaction and
//! handed to every [`LedgerSubscriber`] only after the commit succeeded. A
//! rolled back mutation publishes nothing.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::{Account, Budget, Category, RecurringBill, Transaction, splits::TransactionSplit};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LedgerEvent {
    AccountCreated {
        account: Account,
    },
    AccountUpdated {
        old: Account,
        new: Account,
    },
    /// One applied balance delta. `balance_minor` is the balance right after it.
    BalanceChanged {
        user_id: String,
        account_id: Uuid,
        delta_minor: i64,
        balance_minor: i64,
    },
    TransactionCreated {
        transaction: Transaction,
    },
    TransactionUpdated {
        old: Transaction,
        new: Transaction,
    },
    TransactionDeleted {
        transaction: Transaction,
    },
    SplitAdded {
        user_id: String,
        split: TransactionSplit,
    },
    SplitRemoved {
        user_id: String,
        split: TransactionSplit,
    },
    CategoryCreated {
        category: Category,
    },
    CategoryDeleted {
        category: Category,
    },
    BudgetCreated {
        budget: Budget,
    },
    BudgetUpdated {
        old: Budget,
        new: Budget,
    },
    BudgetDeleted {
        budget: Budget,
    },
    BillCreated {
        bill: RecurringBill,
    },
    BillUpdated {
        old: RecurringBill,
        new: RecurringBill,
    },
    /// A bill produced `transaction_id`; `old` and `new` bracket the advancement.
    BillGenerated {
        old: RecurringBill,
        new: RecurringBill,
        transaction_id: Uuid,
    },
}

impl LedgerEvent {
    /// Owner of the record the event is about.
    pub fn user_id(&self) -> &str {
        match self {
            Self::AccountCreated { account } => &account.user_id,
            Self::AccountUpdated { new, .. } => &new.user_id,
            Self::BalanceChanged { user_id, .. }
            | Self::SplitAdded { user_id, .. }
            | Self::SplitRemoved { user_id, .. } => user_id,
            Self::TransactionCreated { transaction } | Self::TransactionDeleted { transaction } => {
                &transaction.user_id
            }
            Self::TransactionUpdated { new, .. } => &new.user_id,
            Self::CategoryCreated { category } | Self::CategoryDeleted { category } => {
                &category.user_id
            }
            Self::BudgetCreated { budget } | Self::BudgetDeleted { budget } => &budget.user_id,
            Self::BudgetUpdated { new, .. } => &new.user_id,
            Self::BillCreated { bill } => &bill.user_id,
            Self::BillUpdated { new, .. } | Self::BillGenerated { new, .. } => &new.user_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::AccountCreated { .. } => "account_created",
            Self::AccountUpdated { .. } => "account_updated",
            Self::BalanceChanged { .. } => "balance_changed",
            Self::TransactionCreated { .. } => "transaction_created",
            Self::TransactionUpdated { .. } => "transaction_updated",
            Self::TransactionDeleted { .. } => "transaction_deleted",
            Self::SplitAdded { .. } => "split_added",
            Self::SplitRemoved { .. } => "split_removed",
            Self::CategoryCreated { .. } => "category_created",
            Self::CategoryDeleted { .. } => "category_deleted",
            Self::BudgetCreated { .. } => "budget_created",
            Self::BudgetUpdated { .. } => "budget_updated",
            Self::BudgetDeleted { .. } => "budget_deleted",
            Self::BillCreated { .. } => "bill_created",
            Self::BillUpdated { .. } => "bill_updated",
            Self::BillGenerated { .. } => "bill_generated",
        }
    }
}

#[derive(Error, Debug)]
#[error("subscriber '{name}' failed: {reason}")]
pub struct SubscriberError {
    pub name: String,
    pub reason: String,
}

/// Receives committed events.
///
/// Subscribers are awaited one after the other, in registration order. A
/// failing subscriber is logged and skipped; it never affects the mutation
/// that produced the event nor the other subscribers.
#[async_trait]
pub trait LedgerSubscriber: Send + Sync {
    fn name(&self) -> &str;

    async fn handle(&self, event: &LedgerEvent) -> Result<(), SubscriberError>;
}
