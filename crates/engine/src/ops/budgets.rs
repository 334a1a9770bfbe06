use std::sync::Arc;

use async_trait::async_trait;
use chrono::Datelike;
use sea_orm::{
    ActiveValue, ConnectionTrait, DatabaseConnection, QueryFilter, QuerySelect, TransactionTrait,
    prelude::*,
};
use tracing::info;
use uuid::Uuid;

use crate::{
    Budget, BudgetUsage, EngineError, LedgerEvent, LedgerSubscriber, LifecycleState, Money,
    NewBudgetCmd, NotificationKind, RecordState, ResultEngine, SubscriberError, ThresholdTier,
    TransactionKind, UpdateBudgetCmd,
    budgets::{self, month_bounds},
    categories,
    currency::ensure_allowed,
    transactions,
};

use super::{Engine, notifications::Notifier, with_tx};

fn ensure_budget_amount(amount_minor: i64) -> ResultEngine<()> {
    if amount_minor < 0 {
        return Err(EngineError::InvalidAmount(
            "budget amount must be >= 0".to_string(),
        ));
    }
    Ok(())
}

fn threshold_message(tier: ThresholdTier, category: &str, usage: &BudgetUsage) -> String {
    let period = format!("{}-{:02}", usage.budget.year, usage.budget.month);
    let percent = usage.percent_used();
    let amounts = format!(
        "{} of {} {}",
        Money::new(usage.spent_minor),
        Money::new(usage.budget.amount_minor),
        usage.budget.currency
    );
    match tier {
        ThresholdTier::Exceeded => format!(
            "[exceeded] You have exceeded your {category} budget for {period}: {amounts} ({percent}% used)."
        ),
        ThresholdTier::NearLimit => format!(
            "[near limit] Your {category} spending reached {percent}% of the {period} budget ({amounts})."
        ),
        ThresholdTier::Info => format!(
            "[info] Your {category} spending reached {percent}% of the {period} budget ({amounts})."
        ),
    }
}

impl Engine {
    /// Create a monthly budget. One budget per (user, category, month, year).
    pub async fn new_budget(&self, cmd: NewBudgetCmd) -> ResultEngine<Budget> {
        let NewBudgetCmd {
            user_id,
            category_id,
            month,
            year,
            amount_minor,
            currency,
            rollover,
        } = cmd;
        month_bounds(year, month)?;
        ensure_budget_amount(amount_minor)?;
        ensure_allowed(self.currencies.as_ref(), &currency)?;
        let now = self.clock.now();

        let (budget, events) = with_tx!(self, |db_tx| {
            self.require_category(&db_tx, &user_id, category_id).await?;

            let exists = budgets::Entity::find()
                .filter(budgets::Column::UserId.eq(user_id.as_str()))
                .filter(budgets::Column::CategoryId.eq(category_id))
                .filter(budgets::Column::Month.eq(month as i32))
                .filter(budgets::Column::Year.eq(year))
                .one(&db_tx)
                .await?
                .is_some();
            if exists {
                return Err(EngineError::ExistingKey(format!(
                    "budget {year}-{month:02} for category {category_id}"
                )));
            }

            let budget = Budget {
                id: Uuid::new_v4(),
                user_id: user_id.clone(),
                category_id,
                month,
                year,
                amount_minor,
                currency,
                rollover,
                created_at: now,
                updated_at: now,
            };
            budgets::ActiveModel::from(&budget).insert(&db_tx).await?;
            Ok((budget.clone(), vec![LedgerEvent::BudgetCreated { budget }]))
        })?;

        self.publish(events).await;
        Ok(budget)
    }

    pub async fn update_budget(&self, cmd: UpdateBudgetCmd) -> ResultEngine<Budget> {
        let UpdateBudgetCmd {
            user_id,
            budget_id,
            amount_minor,
            rollover,
        } = cmd;
        if let Some(amount_minor) = amount_minor {
            ensure_budget_amount(amount_minor)?;
        }
        let now = self.clock.now();

        let (budget, events) = with_tx!(self, |db_tx| {
            let old = Budget::try_from(self.require_budget(&db_tx, &user_id, budget_id).await?)?;
            let new = Budget {
                amount_minor: amount_minor.unwrap_or(old.amount_minor),
                rollover: rollover.unwrap_or(old.rollover),
                updated_at: now,
                ..old.clone()
            };
            let active = budgets::ActiveModel {
                id: ActiveValue::Set(budget_id),
                amount_minor: ActiveValue::Set(new.amount_minor),
                rollover: ActiveValue::Set(new.rollover),
                updated_at: ActiveValue::Set(now),
                ..Default::default()
            };
            active.update(&db_tx).await?;
            Ok((new.clone(), vec![LedgerEvent::BudgetUpdated { old, new }]))
        })?;

        self.publish(events).await;
        Ok(budget)
    }

    pub async fn delete_budget(&self, user_id: &str, budget_id: Uuid) -> ResultEngine<()> {
        let events = with_tx!(self, |db_tx| {
            let budget = Budget::try_from(self.require_budget(&db_tx, user_id, budget_id).await?)?;
            budgets::Entity::delete_by_id(budget_id).exec(&db_tx).await?;
            Ok(vec![LedgerEvent::BudgetDeleted { budget }])
        })?;

        self.publish(events).await;
        Ok(())
    }

    /// Budget with the amount spent in its period, aggregated fresh.
    pub async fn budget_usage(&self, user_id: &str, budget_id: Uuid) -> ResultEngine<BudgetUsage> {
        let budget = Budget::try_from(
            self.require_budget(&self.database, user_id, budget_id)
                .await?,
        )?;
        let spent_minor = spent_in_period(
            &self.database,
            user_id,
            budget.category_id,
            budget.month,
            budget.year,
        )
        .await?;
        Ok(BudgetUsage {
            budget,
            spent_minor,
        })
    }

    /// Run the budget threshold monitor for one category and month.
    ///
    /// Returns the band that fired, if any.
    pub async fn check_thresholds(
        &self,
        user_id: &str,
        category_id: Uuid,
        month: u32,
        year: i32,
    ) -> ResultEngine<Option<ThresholdTier>> {
        self.monitor
            .check_thresholds(user_id, category_id, month, year)
            .await
    }
}

/// The budget threshold monitor.
///
/// Recomputes what the user spent in the category over the budget month and,
/// when usage reaches 80 %, emits one notification (and its email) for the
/// highest band reached. It fires on every call that finds the budget over a
/// threshold: several expenses in one month produce several notifications.
/// Without a budget for the period this is a no-op.
pub(crate) struct BudgetMonitor {
    database: DatabaseConnection,
    notifier: Arc<Notifier>,
}

impl BudgetMonitor {
    pub(crate) fn new(database: DatabaseConnection, notifier: Arc<Notifier>) -> Self {
        Self { database, notifier }
    }

    pub(crate) async fn check_thresholds(
        &self,
        user_id: &str,
        category_id: Uuid,
        month: u32,
        year: i32,
    ) -> ResultEngine<Option<ThresholdTier>> {
        let Some(model) = budgets::Entity::find()
            .filter(budgets::Column::UserId.eq(user_id))
            .filter(budgets::Column::CategoryId.eq(category_id))
            .filter(budgets::Column::Month.eq(month as i32))
            .filter(budgets::Column::Year.eq(year))
            .one(&self.database)
            .await?
        else {
            return Ok(None);
        };
        let budget = Budget::try_from(model)?;
        let spent_minor =
            spent_in_period(&self.database, user_id, category_id, month, year).await?;
        let usage = BudgetUsage {
            budget,
            spent_minor,
        };
        let Some(tier) = usage.tier() else {
            return Ok(None);
        };

        let category = categories::Entity::find_by_id(category_id)
            .one(&self.database)
            .await?
            .map(|model| model.name)
            .ok_or_else(|| EngineError::KeyNotFound("category not exists".to_string()))?;
        info!(
            user = user_id,
            budget = %usage.budget.id,
            tier = tier.as_str(),
            percent = usage.percent_used(),
            "budget threshold reached"
        );
        let message = threshold_message(tier, &category, &usage);
        self.notifier
            .notify(
                user_id,
                NotificationKind::Budget,
                message,
                Some(usage.budget.id),
            )
            .await;
        Ok(Some(tier))
    }
}

/// Runs the monitor for every committed, categorized expense.
pub(crate) struct BudgetSubscriber {
    monitor: Arc<BudgetMonitor>,
}

impl BudgetSubscriber {
    pub(crate) fn new(monitor: Arc<BudgetMonitor>) -> Self {
        Self { monitor }
    }
}

#[async_trait]
impl LedgerSubscriber for BudgetSubscriber {
    fn name(&self) -> &str {
        "budget_monitor"
    }

    async fn handle(&self, event: &LedgerEvent) -> Result<(), SubscriberError> {
        let LedgerEvent::TransactionCreated { transaction } = event else {
            return Ok(());
        };
        if transaction.kind != TransactionKind::Expense {
            return Ok(());
        }
        let Some(category_id) = transaction.category_id else {
            return Ok(());
        };
        let date = transaction.transaction_date;
        self.monitor
            .check_thresholds(
                &transaction.user_id,
                category_id,
                date.month(),
                date.year(),
            )
            .await
            .map(|_| ())
            .map_err(|err| SubscriberError {
                name: self.name().to_string(),
                reason: err.to_string(),
            })
    }
}

/// Sum of the live expenses of a category over one calendar month.
async fn spent_in_period(
    db: &impl ConnectionTrait,
    user_id: &str,
    category_id: Uuid,
    month: u32,
    year: i32,
) -> ResultEngine<i64> {
    let (first, last) = month_bounds(year, month)?;
    let total = transactions::Entity::find()
        .select_only()
        .column_as(transactions::Column::AmountMinor.sum(), "total")
        .filter(transactions::Column::UserId.eq(user_id))
        .filter(transactions::Column::CategoryId.eq(category_id))
        .filter(transactions::Column::Kind.eq(TransactionKind::Expense.as_str()))
        .filter(transactions::Column::State.eq(RecordState::Live.as_str()))
        .filter(transactions::Column::TransactionDate.between(first, last))
        .into_tuple::<Option<i64>>()
        .one(db)
        .await?
        .flatten();
    Ok(total.unwrap_or_default())
}
