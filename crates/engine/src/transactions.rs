//! Transaction primitives.
//!
//! A `Transaction` is a dated movement of money on an account. Its balance
//! effect is derived from its kind by [`Transaction::balance_deltas`]; the
//! amount whose effect currently sits in the account balances is kept in
//! `applied_minor`, so edits and deletions stay reversible.

use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Currency, EngineError, RecordState, ResultEngine, lifecycle::LifecycleState};

use super::splits;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Income,
    Expense,
    Transfer,
}

impl TransactionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Expense => "expense",
            Self::Transfer => "transfer",
        }
    }

    /// `true` when the kind takes money out of its source account.
    pub fn is_withdrawal(self) -> bool {
        match self {
            Self::Income => false,
            Self::Expense | Self::Transfer => true,
        }
    }
}

impl TryFrom<&str> for TransactionKind {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "income" => Ok(Self::Income),
            "expense" => Ok(Self::Expense),
            "transfer" => Ok(Self::Transfer),
            other => Err(EngineError::Validation(format!(
                "invalid transaction kind: {other}"
            ))),
        }
    }
}

/// Signed change to one account balance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccountDelta {
    pub account_id: Uuid,
    pub delta_minor: i64,
}

/// Amount converted to another currency, stored as supplied.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertedAmount {
    pub amount_minor: i64,
    pub currency: Currency,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: String,
    pub account_id: Uuid,
    pub target_account_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
    pub kind: TransactionKind,
    pub amount_minor: i64,
    pub applied_minor: i64,
    pub currency: Currency,
    pub converted: Option<ConvertedAmount>,
    pub description: String,
    pub transaction_date: NaiveDate,
    pub is_recurring_instance: bool,
    pub recurring_bill_id: Option<Uuid>,
    pub state: RecordState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub splits: Vec<splits::TransactionSplit>,
}

impl Transaction {
    /// Balance effect of booking `amount_minor` with this transaction's kind.
    ///
    /// - `Income`: `account += amount`
    /// - `Expense`: `account -= amount`
    /// - `Transfer`: `account -= amount`, `target += amount`
    pub fn balance_deltas(&self, amount_minor: i64) -> ResultEngine<Vec<AccountDelta>> {
        balance_deltas(
            self.kind,
            self.account_id,
            self.target_account_id,
            amount_minor,
        )
    }

    #[must_use]
    pub fn splits_total_minor(&self) -> i64 {
        self.splits.iter().map(|s| s.amount_minor).sum()
    }
}

pub(crate) fn balance_deltas(
    kind: TransactionKind,
    account_id: Uuid,
    target_account_id: Option<Uuid>,
    amount_minor: i64,
) -> ResultEngine<Vec<AccountDelta>> {
    let deltas = match (kind, target_account_id) {
        (TransactionKind::Income, None) => vec![AccountDelta {
            account_id,
            delta_minor: amount_minor,
        }],
        (TransactionKind::Expense, None) => vec![AccountDelta {
            account_id,
            delta_minor: -amount_minor,
        }],
        (TransactionKind::Transfer, Some(target)) => vec![
            AccountDelta {
                account_id,
                delta_minor: -amount_minor,
            },
            AccountDelta {
                account_id: target,
                delta_minor: amount_minor,
            },
        ],
        (TransactionKind::Transfer, None) => {
            return Err(EngineError::Validation(
                "target account is required for transfers".to_string(),
            ));
        }
        (TransactionKind::Income | TransactionKind::Expense, Some(_)) => {
            return Err(EngineError::Validation(format!(
                "target account is not allowed for {}",
                kind.as_str()
            )));
        }
    };
    Ok(deltas)
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: String,
    pub account_id: Uuid,
    pub target_account_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
    pub kind: String,
    pub amount_minor: i64,
    pub applied_minor: i64,
    pub currency: String,
    pub converted_amount_minor: Option<i64>,
    pub converted_currency: Option<String>,
    pub description: String,
    pub transaction_date: Date,
    pub is_recurring_instance: bool,
    pub recurring_bill_id: Option<Uuid>,
    pub state: String,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::splits::Entity")]
    Splits,
}

impl Related<super::splits::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Splits.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Transaction> for ActiveModel {
    fn from(tx: &Transaction) -> Self {
        Self {
            id: ActiveValue::Set(tx.id),
            user_id: ActiveValue::Set(tx.user_id.clone()),
            account_id: ActiveValue::Set(tx.account_id),
            target_account_id: ActiveValue::Set(tx.target_account_id),
            category_id: ActiveValue::Set(tx.category_id),
            kind: ActiveValue::Set(tx.kind.as_str().to_string()),
            amount_minor: ActiveValue::Set(tx.amount_minor),
            applied_minor: ActiveValue::Set(tx.applied_minor),
            currency: ActiveValue::Set(tx.currency.code().to_string()),
            converted_amount_minor: ActiveValue::Set(
                tx.converted.as_ref().map(|c| c.amount_minor),
            ),
            converted_currency: ActiveValue::Set(
                tx.converted.as_ref().map(|c| c.currency.code().to_string()),
            ),
            description: ActiveValue::Set(tx.description.clone()),
            transaction_date: ActiveValue::Set(tx.transaction_date),
            is_recurring_instance: ActiveValue::Set(tx.is_recurring_instance),
            recurring_bill_id: ActiveValue::Set(tx.recurring_bill_id),
            state: ActiveValue::Set(tx.state.as_str().to_string()),
            created_at: ActiveValue::Set(tx.created_at),
            updated_at: ActiveValue::Set(tx.updated_at),
        }
    }
}

impl TryFrom<Model> for Transaction {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let converted = match (model.converted_amount_minor, model.converted_currency) {
            (Some(amount_minor), Some(code)) => Some(ConvertedAmount {
                amount_minor,
                currency: Currency::new(&code)?,
            }),
            _ => None,
        };
        Ok(Self {
            id: model.id,
            user_id: model.user_id,
            account_id: model.account_id,
            target_account_id: model.target_account_id,
            category_id: model.category_id,
            kind: TransactionKind::try_from(model.kind.as_str())?,
            amount_minor: model.amount_minor,
            applied_minor: model.applied_minor,
            currency: Currency::new(&model.currency)?,
            converted,
            description: model.description,
            transaction_date: model.transaction_date,
            is_recurring_instance: model.is_recurring_instance,
            recurring_bill_id: model.recurring_bill_id,
            state: RecordState::try_from(model.state.as_str())?,
            created_at: model.created_at,
            updated_at: model.updated_at,
            splits: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_moves_money_between_accounts() {
        let from = Uuid::new_v4();
        let to = Uuid::new_v4();
        let deltas = balance_deltas(TransactionKind::Transfer, from, Some(to), 50).unwrap();
        assert_eq!(
            deltas,
            vec![
                AccountDelta {
                    account_id: from,
                    delta_minor: -50
                },
                AccountDelta {
                    account_id: to,
                    delta_minor: 50
                },
            ]
        );
    }

    #[test]
    fn target_account_is_tied_to_transfers() {
        let account = Uuid::new_v4();
        assert!(balance_deltas(TransactionKind::Transfer, account, None, 10).is_err());
        assert!(
            balance_deltas(TransactionKind::Expense, account, Some(Uuid::new_v4()), 10).is_err()
        );
        assert_eq!(
            balance_deltas(TransactionKind::Expense, account, None, 10).unwrap()[0].delta_minor,
            -10
        );
    }
}
