//! Command structs for engine operations.
//!
//! These types group parameters for write operations (accounts,
//! transactions, budgets, recurring bills), keeping call sites readable and
//! avoiding long argument lists.

use chrono::NaiveDate;
use uuid::Uuid;

use crate::{AccountKind, ConvertedAmount, Currency, Frequency, TransactionKind};

/// Open a new account.
///
/// A non-zero `opening_balance_minor` is booked as an opening transaction
/// dated `opened_on`.
#[derive(Clone, Debug)]
pub struct NewAccountCmd {
    pub user_id: String,
    pub name: String,
    pub kind: AccountKind,
    pub currency: Currency,
    pub opening_balance_minor: i64,
    pub opened_on: Option<NaiveDate>,
}

impl NewAccountCmd {
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        name: impl Into<String>,
        kind: AccountKind,
        currency: Currency,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            name: name.into(),
            kind,
            currency,
            opening_balance_minor: 0,
            opened_on: None,
        }
    }

    #[must_use]
    pub fn opening_balance(mut self, amount_minor: i64) -> Self {
        self.opening_balance_minor = amount_minor;
        self
    }

    #[must_use]
    pub fn opened_on(mut self, date: NaiveDate) -> Self {
        self.opened_on = Some(date);
        self
    }
}

/// One category share of a transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SplitInput {
    pub category_id: Uuid,
    pub amount_minor: i64,
}

impl SplitInput {
    #[must_use]
    pub fn new(category_id: Uuid, amount_minor: i64) -> Self {
        Self {
            category_id,
            amount_minor,
        }
    }
}

/// Create a transaction.
#[derive(Clone, Debug)]
pub struct NewTransactionCmd {
    pub user_id: String,
    pub account_id: Uuid,
    pub target_account_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
    pub kind: TransactionKind,
    pub amount_minor: i64,
    pub currency: Currency,
    pub converted: Option<ConvertedAmount>,
    pub description: String,
    pub transaction_date: NaiveDate,
    pub splits: Vec<SplitInput>,
    pub(crate) recurring_bill_id: Option<Uuid>,
}

impl NewTransactionCmd {
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        kind: TransactionKind,
        account_id: Uuid,
        amount_minor: i64,
        currency: Currency,
        transaction_date: NaiveDate,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            account_id,
            target_account_id: None,
            category_id: None,
            kind,
            amount_minor,
            currency,
            converted: None,
            description: String::new(),
            transaction_date,
            splits: Vec::new(),
            recurring_bill_id: None,
        }
    }

    #[must_use]
    pub fn income(
        user_id: impl Into<String>,
        account_id: Uuid,
        amount_minor: i64,
        currency: Currency,
        transaction_date: NaiveDate,
    ) -> Self {
        Self::new(
            user_id,
            TransactionKind::Income,
            account_id,
            amount_minor,
            currency,
            transaction_date,
        )
    }

    #[must_use]
    pub fn expense(
        user_id: impl Into<String>,
        account_id: Uuid,
        amount_minor: i64,
        currency: Currency,
        transaction_date: NaiveDate,
    ) -> Self {
        Self::new(
            user_id,
            TransactionKind::Expense,
            account_id,
            amount_minor,
            currency,
            transaction_date,
        )
    }

    #[must_use]
    pub fn transfer(
        user_id: impl Into<String>,
        from_account_id: Uuid,
        to_account_id: Uuid,
        amount_minor: i64,
        currency: Currency,
        transaction_date: NaiveDate,
    ) -> Self {
        Self::new(
            user_id,
            TransactionKind::Transfer,
            from_account_id,
            amount_minor,
            currency,
            transaction_date,
        )
        .target_account(to_account_id)
    }

    #[must_use]
    pub fn target_account(mut self, account_id: Uuid) -> Self {
        self.target_account_id = Some(account_id);
        self
    }

    #[must_use]
    pub fn category(mut self, category_id: Uuid) -> Self {
        self.category_id = Some(category_id);
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn converted(mut self, amount_minor: i64, currency: Currency) -> Self {
        self.converted = Some(ConvertedAmount {
            amount_minor,
            currency,
        });
        self
    }

    #[must_use]
    pub fn split(mut self, category_id: Uuid, amount_minor: i64) -> Self {
        self.splits.push(SplitInput::new(category_id, amount_minor));
        self
    }

    #[must_use]
    pub fn splits(mut self, splits: impl IntoIterator<Item = SplitInput>) -> Self {
        self.splits.extend(splits);
        self
    }
}

/// Edit the descriptive fields of a transaction.
///
/// Balances are never touched by an update; see `Engine::reconcile_balances`.
/// `None` leaves a field as is. For the nullable fields, `Some(None)` clears
/// them.
#[derive(Clone, Debug)]
pub struct UpdateTransactionCmd {
    pub user_id: String,
    pub transaction_id: Uuid,
    pub amount_minor: Option<i64>,
    pub category_id: Option<Option<Uuid>>,
    pub description: Option<String>,
    pub transaction_date: Option<NaiveDate>,
    pub converted: Option<Option<ConvertedAmount>>,
}

impl UpdateTransactionCmd {
    #[must_use]
    pub fn new(user_id: impl Into<String>, transaction_id: Uuid) -> Self {
        Self {
            user_id: user_id.into(),
            transaction_id,
            amount_minor: None,
            category_id: None,
            description: None,
            transaction_date: None,
            converted: None,
        }
    }

    #[must_use]
    pub fn amount_minor(mut self, amount_minor: i64) -> Self {
        self.amount_minor = Some(amount_minor);
        self
    }

    #[must_use]
    pub fn category(mut self, category_id: Option<Uuid>) -> Self {
        self.category_id = Some(category_id);
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn transaction_date(mut self, date: NaiveDate) -> Self {
        self.transaction_date = Some(date);
        self
    }

    #[must_use]
    pub fn converted(mut self, converted: Option<ConvertedAmount>) -> Self {
        self.converted = Some(converted);
        self
    }
}

/// Create a recurring bill. `next_due_date` starts at `start_date`.
#[derive(Clone, Debug)]
pub struct NewRecurringBillCmd {
    pub user_id: String,
    pub account_id: Uuid,
    pub category_id: Option<Uuid>,
    pub name: String,
    pub amount_minor: i64,
    pub currency: Currency,
    pub kind: TransactionKind,
    pub frequency: Frequency,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
}

impl NewRecurringBillCmd {
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        account_id: Uuid,
        name: impl Into<String>,
        amount_minor: i64,
        currency: Currency,
        frequency: Frequency,
        start_date: NaiveDate,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            account_id,
            category_id: None,
            name: name.into(),
            amount_minor,
            currency,
            kind: TransactionKind::Expense,
            frequency,
            start_date,
            end_date: None,
        }
    }

    #[must_use]
    pub fn kind(mut self, kind: TransactionKind) -> Self {
        self.kind = kind;
        self
    }

    #[must_use]
    pub fn category(mut self, category_id: Uuid) -> Self {
        self.category_id = Some(category_id);
        self
    }

    #[must_use]
    pub fn end_date(mut self, end_date: NaiveDate) -> Self {
        self.end_date = Some(end_date);
        self
    }
}

/// Create a monthly budget for one category.
#[derive(Clone, Debug)]
pub struct NewBudgetCmd {
    pub user_id: String,
    pub category_id: Uuid,
    pub month: u32,
    pub year: i32,
    pub amount_minor: i64,
    pub currency: Currency,
    pub rollover: bool,
}

impl NewBudgetCmd {
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        category_id: Uuid,
        month: u32,
        year: i32,
        amount_minor: i64,
        currency: Currency,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            category_id,
            month,
            year,
            amount_minor,
            currency,
            rollover: false,
        }
    }

    #[must_use]
    pub fn rollover(mut self, rollover: bool) -> Self {
        self.rollover = rollover;
        self
    }
}

/// Change the amount and/or rollover flag of a budget.
#[derive(Clone, Debug)]
pub struct UpdateBudgetCmd {
    pub user_id: String,
    pub budget_id: Uuid,
    pub amount_minor: Option<i64>,
    pub rollover: Option<bool>,
}

impl UpdateBudgetCmd {
    #[must_use]
    pub fn new(user_id: impl Into<String>, budget_id: Uuid) -> Self {
        Self {
            user_id: user_id.into(),
            budget_id,
            amount_minor: None,
            rollover: None,
        }
    }

    #[must_use]
    pub fn amount_minor(mut self, amount_minor: i64) -> Self {
        self.amount_minor = Some(amount_minor);
        self
    }

    #[must_use]
    pub fn rollover(mut self, rollover: bool) -> Self {
        self.rollover = Some(rollover);
        self
    }
}
