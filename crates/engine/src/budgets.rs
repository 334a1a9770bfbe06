//! Monthly per-category budgets and usage tiers.

use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Currency, EngineError, ResultEngine};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Budget {
    pub id: Uuid,
    pub user_id: String,
    pub category_id: Uuid,
    pub month: u32,
    pub year: i32,
    pub amount_minor: i64,
    pub currency: Currency,
    pub rollover: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Budget usage band.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdTier {
    /// ≥ 80 %
    Info,
    /// ≥ 90 %
    NearLimit,
    /// ≥ 100 %
    Exceeded,
}

impl ThresholdTier {
    /// Highest band reached by `spent_minor` against `budget_minor`.
    ///
    /// A zero (or negative) budget never fires: its usage is defined as 0 %.
    #[must_use]
    pub fn for_usage(spent_minor: i64, budget_minor: i64) -> Option<Self> {
        if budget_minor <= 0 {
            return None;
        }
        // spent / budget >= p / 100  <=>  spent * 100 >= p * budget
        let spent = i128::from(spent_minor) * 100;
        let budget = i128::from(budget_minor);
        if spent >= 100 * budget {
            Some(Self::Exceeded)
        } else if spent >= 90 * budget {
            Some(Self::NearLimit)
        } else if spent >= 80 * budget {
            Some(Self::Info)
        } else {
            None
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::NearLimit => "near_limit",
            Self::Exceeded => "exceeded",
        }
    }
}

/// Fresh aggregate of a budget period.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BudgetUsage {
    pub budget: Budget,
    pub spent_minor: i64,
}

impl BudgetUsage {
    /// Whole percent used, rounded down; 0 for a zero budget.
    #[must_use]
    pub fn percent_used(&self) -> i64 {
        if self.budget.amount_minor <= 0 {
            return 0;
        }
        let percent =
            i128::from(self.spent_minor) * 100 / i128::from(self.budget.amount_minor);
        i64::try_from(percent).unwrap_or(i64::MAX)
    }

    #[must_use]
    pub fn tier(&self) -> Option<ThresholdTier> {
        ThresholdTier::for_usage(self.spent_minor, self.budget.amount_minor)
    }
}

/// First and last day of a budget month.
pub(crate) fn month_bounds(year: i32, month: u32) -> ResultEngine<(NaiveDate, NaiveDate)> {
    let invalid = || EngineError::Validation(format!("invalid budget period {year}-{month:02}"));
    let first = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(invalid)?;
    let last = first
        .checked_add_months(chrono::Months::new(1))
        .and_then(|d| d.pred_opt())
        .ok_or_else(invalid)?;
    Ok((first, last))
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "budgets")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: String,
    pub category_id: Uuid,
    pub month: i32,
    pub year: i32,
    pub amount_minor: i64,
    pub currency: String,
    pub rollover: bool,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Budget> for ActiveModel {
    fn from(budget: &Budget) -> Self {
        Self {
            id: ActiveValue::Set(budget.id),
            user_id: ActiveValue::Set(budget.user_id.clone()),
            category_id: ActiveValue::Set(budget.category_id),
            month: ActiveValue::Set(budget.month as i32),
            year: ActiveValue::Set(budget.year),
            amount_minor: ActiveValue::Set(budget.amount_minor),
            currency: ActiveValue::Set(budget.currency.code().to_string()),
            rollover: ActiveValue::Set(budget.rollover),
            created_at: ActiveValue::Set(budget.created_at),
            updated_at: ActiveValue::Set(budget.updated_at),
        }
    }
}

impl TryFrom<Model> for Budget {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: model.id,
            user_id: model.user_id,
            category_id: model.category_id,
            month: u32::try_from(model.month)
                .map_err(|_| EngineError::Validation("invalid budget month".to_string()))?,
            year: model.year,
            amount_minor: model.amount_minor,
            currency: Currency::new(&model.currency)?,
            rollover: model.rollover,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_follow_the_highest_band_reached() {
        assert_eq!(ThresholdTier::for_usage(79_99, 100_00), None);
        assert_eq!(
            ThresholdTier::for_usage(80_00, 100_00),
            Some(ThresholdTier::Info)
        );
        assert_eq!(
            ThresholdTier::for_usage(95_00, 100_00),
            Some(ThresholdTier::NearLimit)
        );
        assert_eq!(
            ThresholdTier::for_usage(100_00, 100_00),
            Some(ThresholdTier::Exceeded)
        );
        assert_eq!(
            ThresholdTier::for_usage(105_00, 100_00),
            Some(ThresholdTier::Exceeded)
        );
    }

    #[test]
    fn zero_budget_never_fires() {
        assert_eq!(ThresholdTier::for_usage(10_00, 0), None);
    }

    #[test]
    fn month_bounds_handle_leap_years() {
        let (first, last) = month_bounds(2024, 2).unwrap();
        assert_eq!(first, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert_eq!(last, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        assert!(month_bounds(2024, 13).is_err());
    }
}
