use chrono::NaiveDate;
use sea_orm::{
    ActiveValue, Condition, QueryFilter, QueryOrder, QuerySelect, TransactionTrait, prelude::*,
    sea_query::Expr,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    ActivityState, Currency, EngineError, LedgerEvent, LifecycleState, NewRecurringBillCmd,
    NewTransactionCmd, NotificationKind, RecurringBill, ResultEngine, TransactionKind,
    currency::ensure_allowed,
    lifecycle::transition,
    recurring_bills,
    util::{ensure_positive_amount, ensure_same_currency, normalize_required_name},
};

use super::{Engine, FundsPolicy, with_tx};

/// Attempts per bill when the bill row keeps moving under us.
const MAX_CONFLICT_ATTEMPTS: usize = 3;

/// What happened to one due bill during a run.
#[derive(Debug, PartialEq)]
pub enum BillOutcome {
    Generated { transaction_id: Uuid },
    /// Found due, but no longer due once locked (another writer generated it).
    Skipped,
    Failed(EngineError),
}

/// Result of [`Engine::run_due_bills`], one entry per bill found due.
#[derive(Debug, Default, PartialEq)]
pub struct BillRunReport {
    pub today: Option<NaiveDate>,
    pub outcomes: Vec<(Uuid, BillOutcome)>,
}

impl BillRunReport {
    pub fn generated(&self) -> usize {
        self.count(|outcome| matches!(outcome, BillOutcome::Generated { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|outcome| matches!(outcome, BillOutcome::Skipped))
    }

    pub fn failed(&self) -> usize {
        self.count(|outcome| matches!(outcome, BillOutcome::Failed(_)))
    }

    fn count(&self, pred: impl Fn(&BillOutcome) -> bool) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| pred(outcome))
            .count()
    }
}

impl Engine {
    /// Create a recurring bill, first due on its start date.
    ///
    /// A bill books on one account only, so `Transfer` bills are rejected.
    pub async fn new_recurring_bill(&self, cmd: NewRecurringBillCmd) -> ResultEngine<RecurringBill> {
        let NewRecurringBillCmd {
            user_id,
            account_id,
            category_id,
            name,
            amount_minor,
            currency,
            kind,
            frequency,
            start_date,
            end_date,
        } = cmd;
        let name = normalize_required_name(&name, "bill")?;
        ensure_positive_amount(amount_minor, "bill")?;
        ensure_allowed(self.currencies.as_ref(), &currency)?;
        if kind == TransactionKind::Transfer {
            return Err(EngineError::Validation(
                "recurring bills cannot be transfers".to_string(),
            ));
        }
        if let Some(end_date) = end_date
            && end_date < start_date
        {
            return Err(EngineError::Validation(
                "end date must not precede the start date".to_string(),
            ));
        }
        let now = self.clock.now();

        let (bill, events) = with_tx!(self, |db_tx| {
            let account = self
                .require_active_account(&db_tx, &user_id, account_id)
                .await?;
            ensure_same_currency(&Currency::new(&account.currency)?, &currency, "account")?;
            if let Some(category_id) = category_id {
                self.require_category(&db_tx, &user_id, category_id).await?;
            }

            let bill = RecurringBill {
                id: Uuid::new_v4(),
                user_id: user_id.clone(),
                account_id,
                category_id,
                name,
                amount_minor,
                currency,
                kind,
                frequency,
                start_date,
                next_due_date: start_date,
                end_date,
                last_generated_date: None,
                state: ActivityState::Active,
                created_at: now,
                updated_at: now,
            };
            recurring_bills::ActiveModel::from(&bill)
                .insert(&db_tx)
                .await?;
            Ok((bill.clone(), vec![LedgerEvent::BillCreated { bill }]))
        })?;

        self.publish(events).await;
        Ok(bill)
    }

    pub async fn recurring_bill(&self, user_id: &str, bill_id: Uuid) -> ResultEngine<RecurringBill> {
        RecurringBill::try_from(self.require_bill(&self.database, user_id, bill_id).await?)
    }

    /// Non-deleted bills of the user, soonest due first.
    pub async fn recurring_bills(&self, user_id: &str) -> ResultEngine<Vec<RecurringBill>> {
        recurring_bills::Entity::find()
            .filter(recurring_bills::Column::UserId.eq(user_id))
            .filter(recurring_bills::Column::State.ne(ActivityState::Deleted.as_str()))
            .order_by_asc(recurring_bills::Column::NextDueDate)
            .all(&self.database)
            .await?
            .into_iter()
            .map(RecurringBill::try_from)
            .collect()
    }

    /// Soft-deleted bills of the user, most recently changed first.
    pub async fn archived_recurring_bills(
        &self,
        user_id: &str,
    ) -> ResultEngine<Vec<RecurringBill>> {
        recurring_bills::Entity::find()
            .filter(recurring_bills::Column::UserId.eq(user_id))
            .filter(recurring_bills::Column::State.eq(ActivityState::Deleted.as_str()))
            .order_by_desc(recurring_bills::Column::UpdatedAt)
            .all(&self.database)
            .await?
            .into_iter()
            .map(RecurringBill::try_from)
            .collect()
    }

    /// Pause or resume a bill. Paused bills are never generated.
    pub async fn set_bill_active(
        &self,
        user_id: &str,
        bill_id: Uuid,
        active: bool,
    ) -> ResultEngine<RecurringBill> {
        let to = if active {
            ActivityState::Active
        } else {
            ActivityState::Inactive
        };
        self.change_bill_state(user_id, bill_id, to).await
    }

    /// Soft-delete a bill. This is terminal.
    pub async fn delete_recurring_bill(&self, user_id: &str, bill_id: Uuid) -> ResultEngine<()> {
        self.change_bill_state(user_id, bill_id, ActivityState::Deleted)
            .await?;
        Ok(())
    }

    async fn change_bill_state(
        &self,
        user_id: &str,
        bill_id: Uuid,
        to: ActivityState,
    ) -> ResultEngine<RecurringBill> {
        let now = self.clock.now();
        let (bill, events) = with_tx!(self, |db_tx| {
            let old = RecurringBill::try_from(self.require_bill(&db_tx, user_id, bill_id).await?)?;
            let state = transition(old.state, to, "recurring bill")?;

            let active = recurring_bills::ActiveModel {
                id: ActiveValue::Set(bill_id),
                state: ActiveValue::Set(state.as_str().to_string()),
                updated_at: ActiveValue::Set(now),
                ..Default::default()
            };
            active.update(&db_tx).await?;

            let new = RecurringBill {
                state,
                updated_at: now,
                ..old.clone()
            };
            Ok((new.clone(), vec![LedgerEvent::BillUpdated { old, new }]))
        })?;

        self.publish(events).await;
        Ok(bill)
    }

    /// Every bill, of any user, that must be generated for `today`.
    pub async fn due_bills(&self, today: NaiveDate) -> ResultEngine<Vec<RecurringBill>> {
        recurring_bills::Entity::find()
            .filter(recurring_bills::Column::State.eq(ActivityState::Active.as_str()))
            .filter(recurring_bills::Column::NextDueDate.lte(today))
            .filter(
                Condition::any()
                    .add(recurring_bills::Column::EndDate.is_null())
                    .add(
                        Expr::col(recurring_bills::Column::NextDueDate)
                            .lte(Expr::col(recurring_bills::Column::EndDate)),
                    ),
            )
            .order_by_asc(recurring_bills::Column::NextDueDate)
            .order_by_asc(recurring_bills::Column::Id)
            .all(&self.database)
            .await?
            .into_iter()
            .map(RecurringBill::try_from)
            .collect()
    }

    /// The periodic trigger: generate one instance of every due bill.
    ///
    /// Bills are processed independently; a failing bill is reported and the
    /// batch moves on. A bill losing a race (`ConcurrencyConflict`) is retried
    /// a few times before it is reported as failed, so a due bill is never
    /// silently skipped.
    pub async fn run_due_bills(&self) -> ResultEngine<BillRunReport> {
        let today = self.clock.today();
        let due = self.due_bills(today).await?;
        let mut report = BillRunReport {
            today: Some(today),
            outcomes: Vec::with_capacity(due.len()),
        };

        for bill in due {
            let mut attempt = 1;
            let outcome = loop {
                match self.generate_one(bill.id).await {
                    Ok(Some(transaction_id)) => break BillOutcome::Generated { transaction_id },
                    Ok(None) => break BillOutcome::Skipped,
                    Err(EngineError::ConcurrencyConflict(reason))
                        if attempt < MAX_CONFLICT_ATTEMPTS =>
                    {
                        debug!(bill = %bill.id, attempt, %reason, "retrying bill generation");
                        attempt += 1;
                    }
                    Err(err) => {
                        warn!(bill = %bill.id, %err, "bill generation failed");
                        break BillOutcome::Failed(err);
                    }
                }
            };
            report.outcomes.push((bill.id, outcome));
        }

        info!(
            %today,
            generated = report.generated(),
            skipped = report.skipped(),
            failed = report.failed(),
            "due bills processed"
        );
        Ok(report)
    }

    /// Generate the instance of a bill for its current due date.
    ///
    /// The bill is re-read under an exclusive lock and must still be due
    /// (active, `next_due_date <= today`, not past its end date); otherwise
    /// this is a no-op returning `None`. The instance is booked through the
    /// regular transaction path without the funds check, then the due date is
    /// advanced with a compare-and-swap on the observed `next_due_date`. A
    /// concurrent generation makes the swap miss, which rolls everything back
    /// with `ConcurrencyConflict`. At most one instance per due date exists.
    pub async fn generate_one(&self, bill_id: Uuid) -> ResultEngine<Option<Uuid>> {
        let today = self.clock.today();
        let now = self.clock.now();

        let (generated, events) = with_tx!(self, |db_tx| {
            let model = recurring_bills::Entity::find_by_id(bill_id)
                .lock_exclusive()
                .one(&db_tx)
                .await?
                .ok_or_else(|| EngineError::KeyNotFound("recurring bill not exists".to_string()))?;
            let bill = RecurringBill::try_from(model)?;

            if bill.is_due(today) {
                let mut events = Vec::new();
                let mut cmd = NewTransactionCmd::new(
                    bill.user_id.as_str(),
                    bill.kind,
                    bill.account_id,
                    bill.amount_minor,
                    bill.currency.clone(),
                    bill.next_due_date,
                )
                .description(format!("[Recurring] {}", bill.name));
                cmd.category_id = bill.category_id;
                cmd.recurring_bill_id = Some(bill.id);
                let transaction = self
                    .insert_transaction(&db_tx, cmd, FundsPolicy::AllowOverdraft, &mut events)
                    .await?;

                let next_due_date = bill.following_due_date()?;
                let swapped = recurring_bills::Entity::update_many()
                    .col_expr(
                        recurring_bills::Column::NextDueDate,
                        Expr::value(next_due_date),
                    )
                    .col_expr(
                        recurring_bills::Column::LastGeneratedDate,
                        Expr::value(Some(bill.next_due_date)),
                    )
                    .col_expr(recurring_bills::Column::UpdatedAt, Expr::value(now))
                    .filter(recurring_bills::Column::Id.eq(bill.id))
                    .filter(recurring_bills::Column::NextDueDate.eq(bill.next_due_date))
                    .exec(&db_tx)
                    .await?;
                if swapped.rows_affected == 0 {
                    return Err(EngineError::ConcurrencyConflict(format!(
                        "recurring bill {} advanced concurrently",
                        bill.id
                    )));
                }

                let new = RecurringBill {
                    next_due_date,
                    last_generated_date: Some(bill.next_due_date),
                    updated_at: now,
                    ..bill.clone()
                };
                events.push(LedgerEvent::BillGenerated {
                    old: bill,
                    new: new.clone(),
                    transaction_id: transaction.id,
                });
                Ok((Some((new, transaction.id)), events))
            } else {
                Ok((None, Vec::new()))
            }
        })?;

        let Some((bill, transaction_id)) = generated else {
            debug!(bill = %bill_id, %today, "bill not due, nothing generated");
            return Ok(None);
        };

        info!(
            bill = %bill.id,
            transaction = %transaction_id,
            next_due = %bill.next_due_date,
            "recurring bill generated"
        );
        self.publish(events).await;
        self.notify(
            &bill.user_id,
            NotificationKind::BillDue,
            format!("Generated recurring: {}", bill.name),
            Some(bill.id),
        )
        .await;
        Ok(Some(transaction_id))
    }

    /// Manual "generate now" for the owner of the bill.
    ///
    /// Same semantics as [`Engine::generate_one`]; racing the scheduler never
    /// produces a second instance for the same due date.
    pub async fn generate_bill_now(
        &self,
        user_id: &str,
        bill_id: Uuid,
    ) -> ResultEngine<Option<Uuid>> {
        self.require_bill(&self.database, user_id, bill_id).await?;
        self.generate_one(bill_id).await
    }
}
