use std::collections::HashMap;

use sea_orm::{
    ActiveValue, DatabaseTransaction, QueryFilter, QueryOrder, TransactionTrait, prelude::*,
    sea_query::Expr,
};
use tracing::info;
use uuid::Uuid;

use crate::{
    Account, AccountDelta, ActivityState, EngineError, LedgerEvent, LifecycleState, Money,
    NewAccountCmd, NewTransactionCmd, RecordState, ResultEngine, TransactionKind, accounts,
    currency::ensure_allowed, lifecycle::transition, transactions, util::normalize_required_name,
};

use super::{Engine, FundsPolicy, with_tx};

impl Engine {
    /// Apply `balance += delta` to one account, atomically with the enclosing
    /// DB transaction.
    ///
    /// The update is a single conditional statement: under
    /// [`FundsPolicy::Enforce`] a withdrawal only matches rows whose current
    /// balance covers it, so no stale balance is ever read and concurrent
    /// writers cannot lose updates. Returns the balance after the change.
    pub(super) async fn apply_delta(
        &self,
        db: &DatabaseTransaction,
        user_id: &str,
        delta: AccountDelta,
        policy: FundsPolicy,
        events: &mut Vec<LedgerEvent>,
    ) -> ResultEngine<i64> {
        let mut update = accounts::Entity::update_many()
            .col_expr(
                accounts::Column::BalanceMinor,
                Expr::col(accounts::Column::BalanceMinor).add(delta.delta_minor),
            )
            .col_expr(accounts::Column::UpdatedAt, Expr::value(self.clock.now()))
            .filter(accounts::Column::Id.eq(delta.account_id))
            .filter(accounts::Column::UserId.eq(user_id));
        if policy == FundsPolicy::Enforce && delta.delta_minor < 0 {
            update = update.filter(accounts::Column::BalanceMinor.gte(-delta.delta_minor));
        }

        let result = update.exec(db).await?;
        if result.rows_affected == 0 {
            let model = accounts::Entity::find_by_id(delta.account_id)
                .filter(accounts::Column::UserId.eq(user_id))
                .one(db)
                .await?
                .ok_or_else(|| EngineError::KeyNotFound("account not exists".to_string()))?;
            return Err(EngineError::InsufficientFunds(format!(
                "account '{}' has {} {} available, {} required",
                model.name,
                Money::new(model.balance_minor),
                model.currency,
                Money::new(-delta.delta_minor)
            )));
        }

        let balance_minor = accounts::Entity::find_by_id(delta.account_id)
            .one(db)
            .await?
            .map(|model| model.balance_minor)
            .ok_or_else(|| EngineError::KeyNotFound("account not exists".to_string()))?;
        events.push(LedgerEvent::BalanceChanged {
            user_id: user_id.to_string(),
            account_id: delta.account_id,
            delta_minor: delta.delta_minor,
            balance_minor,
        });
        Ok(balance_minor)
    }

    /// Open an account.
    ///
    /// The account starts at zero. A non-zero opening balance is booked as an
    /// opening `Income` (positive) or `Expense` (negative) transaction, so the
    /// balance is backed by the ledger from the first row.
    pub async fn new_account(&self, cmd: NewAccountCmd) -> ResultEngine<Uuid> {
        let NewAccountCmd {
            user_id,
            name,
            kind,
            currency,
            opening_balance_minor,
            opened_on,
        } = cmd;
        let name = normalize_required_name(&name, "account")?;
        ensure_allowed(self.currencies.as_ref(), &currency)?;
        let now = self.clock.now();
        let opened_on = opened_on.unwrap_or_else(|| self.clock.today());

        let (account_id, events) = with_tx!(self, |db_tx| {
            self.require_user(&db_tx, &user_id).await?;

            let exists = accounts::Entity::find()
                .filter(accounts::Column::UserId.eq(user_id.as_str()))
                .filter(accounts::Column::State.ne(ActivityState::Deleted.as_str()))
                .filter(Expr::cust("LOWER(name)").eq(name.to_lowercase()))
                .one(&db_tx)
                .await?
                .is_some();
            if exists {
                return Err(EngineError::ExistingKey(name));
            }

            let account = Account {
                id: Uuid::new_v4(),
                user_id: user_id.clone(),
                name: name.clone(),
                kind,
                balance_minor: 0,
                currency: currency.clone(),
                state: ActivityState::Active,
                created_at: now,
                updated_at: now,
            };
            accounts::ActiveModel::from(&account).insert(&db_tx).await?;
            let mut events = vec![LedgerEvent::AccountCreated {
                account: account.clone(),
            }];

            if opening_balance_minor != 0 {
                let kind = if opening_balance_minor > 0 {
                    TransactionKind::Income
                } else {
                    TransactionKind::Expense
                };
                let cmd = NewTransactionCmd::new(
                    user_id.as_str(),
                    kind,
                    account.id,
                    opening_balance_minor.abs(),
                    currency.clone(),
                    opened_on,
                )
                .description(format!("Opening balance for '{name}'"));
                self.insert_transaction(&db_tx, cmd, FundsPolicy::AllowOverdraft, &mut events)
                    .await?;
            }

            Ok((account.id, events))
        })?;

        self.publish(events).await;
        Ok(account_id)
    }

    /// Return an account snapshot from DB.
    pub async fn account(&self, user_id: &str, account_id: Uuid) -> ResultEngine<Account> {
        let model = self
            .require_account(&self.database, user_id, account_id)
            .await?;
        Account::try_from(model)
    }

    /// Every non-deleted account of the user, by name.
    pub async fn accounts(&self, user_id: &str) -> ResultEngine<Vec<Account>> {
        accounts::Entity::find()
            .filter(accounts::Column::UserId.eq(user_id))
            .filter(accounts::Column::State.ne(ActivityState::Deleted.as_str()))
            .order_by_asc(accounts::Column::Name)
            .all(&self.database)
            .await?
            .into_iter()
            .map(Account::try_from)
            .collect()
    }

    /// Soft-deleted accounts of the user, by name.
    pub async fn archived_accounts(&self, user_id: &str) -> ResultEngine<Vec<Account>> {
        accounts::Entity::find()
            .filter(accounts::Column::UserId.eq(user_id))
            .filter(accounts::Column::State.eq(ActivityState::Deleted.as_str()))
            .order_by_asc(accounts::Column::Name)
            .all(&self.database)
            .await?
            .into_iter()
            .map(Account::try_from)
            .collect()
    }

    /// Activate or deactivate an account. Inactive accounts take no new
    /// transactions.
    pub async fn set_account_active(
        &self,
        user_id: &str,
        account_id: Uuid,
        active: bool,
    ) -> ResultEngine<Account> {
        let to = if active {
            ActivityState::Active
        } else {
            ActivityState::Inactive
        };
        self.change_account_state(user_id, account_id, to).await
    }

    /// Soft-delete an account. Its transactions stay in the ledger.
    pub async fn delete_account(&self, user_id: &str, account_id: Uuid) -> ResultEngine<()> {
        self.change_account_state(user_id, account_id, ActivityState::Deleted)
            .await?;
        Ok(())
    }

    async fn change_account_state(
        &self,
        user_id: &str,
        account_id: Uuid,
        to: ActivityState,
    ) -> ResultEngine<Account> {
        let now = self.clock.now();
        let (account, events) = with_tx!(self, |db_tx| {
            let model = self.require_account(&db_tx, user_id, account_id).await?;
            let old = Account::try_from(model)?;
            let state = transition(old.state, to, "account")?;

            let active = accounts::ActiveModel {
                id: ActiveValue::Set(account_id),
                state: ActiveValue::Set(state.as_str().to_string()),
                updated_at: ActiveValue::Set(now),
                ..Default::default()
            };
            active.update(&db_tx).await?;

            let new = Account {
                state,
                updated_at: now,
                ..old.clone()
            };
            Ok((new.clone(), vec![LedgerEvent::AccountUpdated { old, new }]))
        })?;

        self.publish(events).await;
        Ok(account)
    }

    /// Recompute every balance of the user from the live transactions.
    ///
    /// This is the explicit correction path for edited amounts: each live
    /// transaction is re-based so that its applied amount equals its amount,
    /// and each account balance becomes the signed sum of those amounts.
    /// Negative results are accepted. Returns the corrections applied.
    pub async fn reconcile_balances(&self, user_id: &str) -> ResultEngine<Vec<AccountDelta>> {
        let (corrections, events) = with_tx!(self, |db_tx| {
            self.require_user(&db_tx, user_id).await?;

            let account_models = accounts::Entity::find()
                .filter(accounts::Column::UserId.eq(user_id))
                .order_by_asc(accounts::Column::CreatedAt)
                .all(&db_tx)
                .await?;
            let transaction_models = transactions::Entity::find()
                .filter(transactions::Column::UserId.eq(user_id))
                .filter(transactions::Column::State.eq(RecordState::Live.as_str()))
                .all(&db_tx)
                .await?;

            let mut expected: HashMap<Uuid, i64> = account_models
                .iter()
                .map(|model| (model.id, 0))
                .collect();
            for model in &transaction_models {
                let kind = TransactionKind::try_from(model.kind.as_str())?;
                let deltas = crate::transactions::balance_deltas(
                    kind,
                    model.account_id,
                    model.target_account_id,
                    model.amount_minor,
                )?;
                for delta in deltas {
                    let balance = expected.get_mut(&delta.account_id).ok_or_else(|| {
                        EngineError::KeyNotFound("account not exists".to_string())
                    })?;
                    *balance += delta.delta_minor;
                }
            }

            transactions::Entity::update_many()
                .col_expr(
                    transactions::Column::AppliedMinor,
                    Expr::col(transactions::Column::AmountMinor).into(),
                )
                .filter(transactions::Column::UserId.eq(user_id))
                .filter(transactions::Column::State.eq(RecordState::Live.as_str()))
                .filter(
                    Expr::col(transactions::Column::AppliedMinor)
                        .ne(Expr::col(transactions::Column::AmountMinor)),
                )
                .exec(&db_tx)
                .await?;

            let mut corrections = Vec::new();
            let mut events = Vec::new();
            for model in account_models {
                let target = expected.get(&model.id).copied().unwrap_or_default();
                let delta_minor = target - model.balance_minor;
                if delta_minor == 0 {
                    continue;
                }
                let delta = AccountDelta {
                    account_id: model.id,
                    delta_minor,
                };
                self.apply_delta(
                    &db_tx,
                    user_id,
                    delta,
                    FundsPolicy::AllowOverdraft,
                    &mut events,
                )
                .await?;
                corrections.push(delta);
            }
            Ok((corrections, events))
        })?;

        info!(
            user = user_id,
            corrected = corrections.len(),
            "balances reconciled"
        );
        self.publish(events).await;
        Ok(corrections)
    }
}
