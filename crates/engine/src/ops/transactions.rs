use std::collections::HashMap;

use chrono::NaiveDate;
use sea_orm::{
    ActiveValue, Condition, ConnectionTrait, DatabaseTransaction, QueryFilter, QueryOrder,
    TransactionTrait, prelude::*,
};
use uuid::Uuid;

use crate::{
    Currency, EngineError, LedgerEvent, LifecycleState, NewTransactionCmd, RecordState,
    ResultEngine, Transaction, TransactionKind, TransactionSplit, UpdateTransactionCmd,
    currency::ensure_allowed,
    lifecycle::transition,
    splits, transactions,
    util::{ensure_positive_amount, ensure_same_currency, normalize_text},
};

use super::{Engine, FundsPolicy, splits::validate_split_inputs, with_tx};

/// Filters for listing transactions.
///
/// `from` and `to` are both inclusive transaction dates.
#[derive(Clone, Debug, Default)]
pub struct TransactionListFilter {
    /// Matches the source or the target account.
    pub account_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
    /// If present, acts as an allow-list of kinds to return.
    pub kinds: Option<Vec<TransactionKind>>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    /// Only instances generated by this recurring bill.
    pub recurring_bill_id: Option<Uuid>,
    /// If true, includes deleted transactions (default: false).
    pub include_deleted: bool,
}

fn validate_list_filter(filter: &TransactionListFilter) -> ResultEngine<()> {
    if let (Some(from), Some(to)) = (filter.from, filter.to)
        && from > to
    {
        return Err(EngineError::Validation(
            "invalid range: from must be <= to".to_string(),
        ));
    }
    if filter.kinds.as_ref().is_some_and(|k| k.is_empty()) {
        return Err(EngineError::Validation(
            "kinds must not be empty".to_string(),
        ));
    }
    Ok(())
}

impl Engine {
    /// Create a transaction and apply its balance effect.
    ///
    /// Everything runs in one DB transaction: validation, the funds check,
    /// the balance mutation, the transaction row and its splits. Any failure
    /// leaves no trace. Withdrawals that the account balance does not cover
    /// fail with `InsufficientFunds`.
    ///
    /// After commit, a categorized `Expense` triggers the budget monitor.
    pub async fn create_transaction(&self, cmd: NewTransactionCmd) -> ResultEngine<Transaction> {
        let (transaction, events) = with_tx!(self, |db_tx| {
            let mut events = Vec::new();
            let transaction = self
                .insert_transaction(&db_tx, cmd, FundsPolicy::Enforce, &mut events)
                .await?;
            Ok((transaction, events))
        })?;

        self.publish(events).await;
        Ok(transaction)
    }

    /// Validate and book a transaction inside `db_tx`.
    ///
    /// Exactly one balance mutation set is applied:
    /// - `Income`: `account += amount`
    /// - `Expense`: `account -= amount`
    /// - `Transfer`: `account -= amount`, `target += amount`
    pub(super) async fn insert_transaction(
        &self,
        db_tx: &DatabaseTransaction,
        cmd: NewTransactionCmd,
        policy: FundsPolicy,
        events: &mut Vec<LedgerEvent>,
    ) -> ResultEngine<Transaction> {
        let NewTransactionCmd {
            user_id,
            account_id,
            target_account_id,
            category_id,
            kind,
            amount_minor,
            currency,
            converted,
            description,
            transaction_date,
            splits: split_inputs,
            recurring_bill_id,
        } = cmd;

        ensure_positive_amount(amount_minor, "transaction")?;
        ensure_allowed(self.currencies.as_ref(), &currency)?;
        if let Some(converted) = &converted {
            ensure_allowed(self.currencies.as_ref(), &converted.currency)?;
            ensure_positive_amount(converted.amount_minor, "converted")?;
        }
        let deltas =
            crate::transactions::balance_deltas(kind, account_id, target_account_id, amount_minor)?;
        if target_account_id == Some(account_id) {
            return Err(EngineError::Validation(
                "transfer source and target must differ".to_string(),
            ));
        }
        validate_split_inputs(&split_inputs, amount_minor)?;

        let account = self
            .require_active_account(db_tx, &user_id, account_id)
            .await?;
        ensure_same_currency(&Currency::new(&account.currency)?, &currency, "account")?;
        if let Some(target_id) = target_account_id {
            let target = self
                .require_active_account(db_tx, &user_id, target_id)
                .await?;
            ensure_same_currency(&Currency::new(&target.currency)?, &currency, "target account")?;
        }
        if let Some(category_id) = category_id {
            self.require_category(db_tx, &user_id, category_id).await?;
        }
        for split in &split_inputs {
            self.require_category(db_tx, &user_id, split.category_id)
                .await?;
        }

        for delta in deltas {
            self.apply_delta(db_tx, &user_id, delta, policy, events)
                .await?;
        }

        let now = self.clock.now();
        let id = Uuid::new_v4();
        let transaction = Transaction {
            id,
            user_id,
            account_id,
            target_account_id,
            category_id,
            kind,
            amount_minor,
            applied_minor: amount_minor,
            currency,
            converted,
            description: normalize_text(&description),
            transaction_date,
            is_recurring_instance: recurring_bill_id.is_some(),
            recurring_bill_id,
            state: RecordState::Live,
            created_at: now,
            updated_at: now,
            splits: split_inputs
                .iter()
                .map(|split| TransactionSplit {
                    id: Uuid::new_v4(),
                    transaction_id: id,
                    category_id: split.category_id,
                    amount_minor: split.amount_minor,
                    created_at: now,
                })
                .collect(),
        };
        transactions::ActiveModel::from(&transaction)
            .insert(db_tx)
            .await?;
        for split in &transaction.splits {
            splits::ActiveModel::from(split).insert(db_tx).await?;
        }

        events.push(LedgerEvent::TransactionCreated {
            transaction: transaction.clone(),
        });
        Ok(transaction)
    }

    /// Updates the descriptive fields of a transaction.
    ///
    /// Balances are left untouched, even when the amount changes: the applied
    /// amount stays what it was until [`Engine::reconcile_balances`] re-bases
    /// it. The amount may not drop below the split total.
    pub async fn update_transaction(&self, cmd: UpdateTransactionCmd) -> ResultEngine<Transaction> {
        let UpdateTransactionCmd {
            user_id,
            transaction_id,
            amount_minor,
            category_id,
            description,
            transaction_date,
            converted,
        } = cmd;
        let now = self.clock.now();

        let (transaction, events) = with_tx!(self, |db_tx| {
            let old = self
                .load_transaction(&db_tx, &user_id, transaction_id)
                .await?;
            let mut new = old.clone();

            if let Some(amount_minor) = amount_minor {
                ensure_positive_amount(amount_minor, "transaction")?;
                if old.splits_total_minor() > amount_minor {
                    return Err(EngineError::InvalidSplit(format!(
                        "amount {amount_minor} is below the split total {}",
                        old.splits_total_minor()
                    )));
                }
                new.amount_minor = amount_minor;
            }
            if let Some(category_id) = category_id {
                if let Some(id) = category_id {
                    self.require_category(&db_tx, &user_id, id).await?;
                }
                new.category_id = category_id;
            }
            if let Some(description) = description {
                new.description = normalize_text(&description);
            }
            if let Some(date) = transaction_date {
                new.transaction_date = date;
            }
            if let Some(converted) = converted {
                if let Some(converted) = &converted {
                    ensure_allowed(self.currencies.as_ref(), &converted.currency)?;
                    ensure_positive_amount(converted.amount_minor, "converted")?;
                }
                new.converted = converted;
            }
            new.updated_at = now;

            transactions::ActiveModel::from(&new).update(&db_tx).await?;
            Ok((
                new.clone(),
                vec![LedgerEvent::TransactionUpdated { old, new }],
            ))
        })?;

        self.publish(events).await;
        Ok(transaction)
    }

    /// Soft-deletes a transaction and reverses its applied balance effect in
    /// the same DB transaction.
    ///
    /// The reversal is not subject to the funds check: undoing an income the
    /// account has already spent may leave it negative.
    pub async fn delete_transaction(&self, user_id: &str, transaction_id: Uuid) -> ResultEngine<()> {
        let now = self.clock.now();
        let events = with_tx!(self, |db_tx| {
            let transaction = self
                .load_transaction(&db_tx, user_id, transaction_id)
                .await?;
            let state = transition(transaction.state, RecordState::Deleted, "transaction")?;

            let mut events = Vec::new();
            for delta in transaction.balance_deltas(-transaction.applied_minor)? {
                self.apply_delta(
                    &db_tx,
                    user_id,
                    delta,
                    FundsPolicy::AllowOverdraft,
                    &mut events,
                )
                .await?;
            }

            let active = transactions::ActiveModel {
                id: ActiveValue::Set(transaction_id),
                state: ActiveValue::Set(state.as_str().to_string()),
                updated_at: ActiveValue::Set(now),
                ..Default::default()
            };
            active.update(&db_tx).await?;

            events.push(LedgerEvent::TransactionDeleted {
                transaction: Transaction {
                    state,
                    updated_at: now,
                    ..transaction
                },
            });
            Ok(events)
        })?;

        self.publish(events).await;
        Ok(())
    }

    /// Return a live transaction with its splits.
    pub async fn transaction(
        &self,
        user_id: &str,
        transaction_id: Uuid,
    ) -> ResultEngine<Transaction> {
        self.load_transaction(&self.database, user_id, transaction_id)
            .await
    }

    /// Lists the user's transactions, newest first.
    pub async fn transactions(
        &self,
        user_id: &str,
        filter: &TransactionListFilter,
    ) -> ResultEngine<Vec<Transaction>> {
        validate_list_filter(filter)?;

        let mut query =
            transactions::Entity::find().filter(transactions::Column::UserId.eq(user_id));
        if !filter.include_deleted {
            query = query.filter(transactions::Column::State.eq(RecordState::Live.as_str()));
        }
        if let Some(account_id) = filter.account_id {
            query = query.filter(
                Condition::any()
                    .add(transactions::Column::AccountId.eq(account_id))
                    .add(transactions::Column::TargetAccountId.eq(account_id)),
            );
        }
        if let Some(category_id) = filter.category_id {
            query = query.filter(transactions::Column::CategoryId.eq(category_id));
        }
        if let Some(kinds) = &filter.kinds {
            query = query.filter(
                transactions::Column::Kind.is_in(kinds.iter().map(|kind| kind.as_str())),
            );
        }
        if let Some(from) = filter.from {
            query = query.filter(transactions::Column::TransactionDate.gte(from));
        }
        if let Some(to) = filter.to {
            query = query.filter(transactions::Column::TransactionDate.lte(to));
        }
        if let Some(bill_id) = filter.recurring_bill_id {
            query = query.filter(transactions::Column::RecurringBillId.eq(bill_id));
        }

        let models = query
            .order_by_desc(transactions::Column::TransactionDate)
            .order_by_desc(transactions::Column::CreatedAt)
            .all(&self.database)
            .await?;
        let transactions = models
            .into_iter()
            .map(Transaction::try_from)
            .collect::<ResultEngine<Vec<_>>>()?;
        self.attach_splits(&self.database, transactions).await
    }

    /// Load a live transaction owned by `user_id`, splits included.
    pub(super) async fn load_transaction(
        &self,
        db: &impl ConnectionTrait,
        user_id: &str,
        transaction_id: Uuid,
    ) -> ResultEngine<Transaction> {
        let model = self
            .require_transaction(db, user_id, transaction_id)
            .await?;
        let mut transaction = Transaction::try_from(model)?;
        transaction.splits = splits::Entity::find()
            .filter(splits::Column::TransactionId.eq(transaction_id))
            .order_by_asc(splits::Column::CreatedAt)
            .all(db)
            .await?
            .into_iter()
            .map(TransactionSplit::from)
            .collect();
        Ok(transaction)
    }

    async fn attach_splits(
        &self,
        db: &impl ConnectionTrait,
        mut transactions: Vec<Transaction>,
    ) -> ResultEngine<Vec<Transaction>> {
        if transactions.is_empty() {
            return Ok(transactions);
        }
        let ids: Vec<Uuid> = transactions.iter().map(|tx| tx.id).collect();
        let mut by_transaction: HashMap<Uuid, Vec<TransactionSplit>> = HashMap::new();
        for model in splits::Entity::find()
            .filter(splits::Column::TransactionId.is_in(ids))
            .order_by_asc(splits::Column::CreatedAt)
            .all(db)
            .await?
        {
            by_transaction
                .entry(model.transaction_id)
                .or_default()
                .push(TransactionSplit::from(model));
        }
        for transaction in &mut transactions {
            transaction.splits = by_transaction.remove(&transaction.id).unwrap_or_default();
        }
        Ok(transactions)
    }
}
