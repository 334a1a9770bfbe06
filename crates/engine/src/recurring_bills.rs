//! Recurring bills and their due-date stepping.

use chrono::{DateTime, Datelike, Days, Months, NaiveDate, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    ActivityState, Currency, EngineError, ResultEngine, TransactionKind,
    lifecycle::LifecycleState,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Daily,
    Weekly,
    BiWeekly,
    Monthly,
    Quarterly,
    Annually,
}

impl Frequency {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::BiWeekly => "bi_weekly",
            Self::Monthly => "monthly",
            Self::Quarterly => "quarterly",
            Self::Annually => "annually",
        }
    }

    /// Next occurrence after `from`.
    ///
    /// Day-based frequencies add a fixed number of days. Month-based ones move
    /// by calendar months and land on `anchor_day`, clamped to the last day of
    /// the target month (Jan 31 → Feb 29 → Mar 31).
    pub fn advance(self, from: NaiveDate, anchor_day: u32) -> Option<NaiveDate> {
        match self {
            Self::Daily => from.checked_add_days(Days::new(1)),
            Self::Weekly => from.checked_add_days(Days::new(7)),
            Self::BiWeekly => from.checked_add_days(Days::new(14)),
            Self::Monthly => add_months_anchored(from, 1, anchor_day),
            Self::Quarterly => add_months_anchored(from, 3, anchor_day),
            Self::Annually => add_months_anchored(from, 12, anchor_day),
        }
    }
}

impl TryFrom<&str> for Frequency {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "bi_weekly" => Ok(Self::BiWeekly),
            "monthly" => Ok(Self::Monthly),
            "quarterly" => Ok(Self::Quarterly),
            "annually" => Ok(Self::Annually),
            other => Err(EngineError::Validation(format!(
                "invalid frequency: {other}"
            ))),
        }
    }
}

fn add_months_anchored(from: NaiveDate, months: u32, anchor_day: u32) -> Option<NaiveDate> {
    let first = from.with_day(1)?.checked_add_months(Months::new(months))?;
    let last_day = last_day_of_month(first)?;
    first.with_day(anchor_day.clamp(1, last_day))
}

fn last_day_of_month(date: NaiveDate) -> Option<u32> {
    let next_first = date.with_day(1)?.checked_add_months(Months::new(1))?;
    next_first.pred_opt().map(|d| d.day())
}

/// Day of month a bill should keep landing on.
///
/// A due date sitting on a clamped month end (Feb 29 for a bill started on
/// the 31st) recovers the start day on the next step.
pub(crate) fn anchor_day(start_date: NaiveDate, next_due_date: NaiveDate) -> u32 {
    let due_day = next_due_date.day();
    if last_day_of_month(next_due_date) == Some(due_day) {
        due_day.max(start_date.day())
    } else {
        due_day
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurringBill {
    pub id: Uuid,
    pub user_id: String,
    pub account_id: Uuid,
    pub category_id: Option<Uuid>,
    pub name: String,
    pub amount_minor: i64,
    pub currency: Currency,
    pub kind: TransactionKind,
    pub frequency: Frequency,
    pub start_date: NaiveDate,
    pub next_due_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub last_generated_date: Option<NaiveDate>,
    pub state: ActivityState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RecurringBill {
    /// `true` when an instance must be generated for `today`.
    #[must_use]
    pub fn is_due(&self, today: NaiveDate) -> bool {
        self.state.is_active()
            && self.next_due_date <= today
            && self.end_date.is_none_or(|end| self.next_due_date <= end)
    }

    /// Due date following the current one.
    pub fn following_due_date(&self) -> ResultEngine<NaiveDate> {
        self.frequency
            .advance(
                self.next_due_date,
                anchor_day(self.start_date, self.next_due_date),
            )
            .ok_or_else(|| {
                EngineError::Validation(format!("due date overflow for bill {}", self.id))
            })
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "recurring_bills")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: String,
    pub account_id: Uuid,
    pub category_id: Option<Uuid>,
    pub name: String,
    pub amount_minor: i64,
    pub currency: String,
    pub kind: String,
    pub frequency: String,
    pub start_date: Date,
    pub next_due_date: Date,
    pub end_date: Option<Date>,
    pub last_generated_date: Option<Date>,
    pub state: String,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<&RecurringBill> for ActiveModel {
    fn from(bill: &RecurringBill) -> Self {
        Self {
            id: ActiveValue::Set(bill.id),
            user_id: ActiveValue::Set(bill.user_id.clone()),
            account_id: ActiveValue::Set(bill.account_id),
            category_id: ActiveValue::Set(bill.category_id),
            name: ActiveValue::Set(bill.name.clone()),
            amount_minor: ActiveValue::Set(bill.amount_minor),
            currency: ActiveValue::Set(bill.currency.code().to_string()),
            kind: ActiveValue::Set(bill.kind.as_str().to_string()),
            frequency: ActiveValue::Set(bill.frequency.as_str().to_string()),
            start_date: ActiveValue::Set(bill.start_date),
            next_due_date: ActiveValue::Set(bill.next_due_date),
            end_date: ActiveValue::Set(bill.end_date),
            last_generated_date: ActiveValue::Set(bill.last_generated_date),
            state: ActiveValue::Set(bill.state.as_str().to_string()),
            created_at: ActiveValue::Set(bill.created_at),
            updated_at: ActiveValue::Set(bill.updated_at),
        }
    }
}

impl TryFrom<Model> for RecurringBill {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: model.id,
            user_id: model.user_id,
            account_id: model.account_id,
            category_id: model.category_id,
            name: model.name,
            amount_minor: model.amount_minor,
            currency: Currency::new(&model.currency)?,
            kind: TransactionKind::try_from(model.kind.as_str())?,
            frequency: Frequency::try_from(model.frequency.as_str())?,
            start_date: model.start_date,
            next_due_date: model.next_due_date,
            end_date: model.end_date,
            last_generated_date: model.last_generated_date,
            state: ActivityState::try_from(model.state.as_str())?,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}
