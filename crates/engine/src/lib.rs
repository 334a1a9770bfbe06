//! Ledger consistency engine for personal finance tracking.
//!
//! The [`Engine`] keeps account balances, transactions, recurring bill
//! generation and budget threshold notifications consistent with each other.
//! All state lives in the database; every mutation runs in one DB
//! transaction and publishes its [`LedgerEvent`]s after commit.

pub use accounts::{Account, AccountKind};
pub use audit::{
    AuditAction, AuditEntry, AuditRecorder, AuditSubscriber, MemoryAuditRecorder,
    TracingAuditRecorder,
};
pub use budgets::{Budget, BudgetUsage, ThresholdTier};
pub use categories::Category;
pub use clock::{Clock, FixedClock, SystemClock};
pub use commands::{
    NewAccountCmd, NewBudgetCmd, NewRecurringBillCmd, NewTransactionCmd, SplitInput,
    UpdateBudgetCmd, UpdateTransactionCmd,
};
pub use currency::{AllowedCurrencies, Currency, CurrencyValidator};
pub use error::EngineError;
pub use events::{LedgerEvent, LedgerSubscriber, SubscriberError};
pub use exchange_rates::ExchangeRate;
pub use lifecycle::{ActivityState, LifecycleState, RecordState};
pub use money::Money;
pub use notifications::{Notification, NotificationKind};
pub use notify::{
    DispatchError, EmailDispatcher, EmailRequest, LogEmailDispatcher, MemoryEmailDispatcher,
};
pub use ops::{BillOutcome, BillRunReport, Engine, EngineBuilder, TransactionListFilter};
pub use recurring_bills::{Frequency, RecurringBill};
pub use splits::TransactionSplit;
pub use transactions::{AccountDelta, ConvertedAmount, Transaction, TransactionKind};

mod accounts;
mod audit;
mod budgets;
mod categories;
mod clock;
mod commands;
mod currency;
mod error;
mod events;
mod exchange_rates;
mod lifecycle;
mod money;
mod notifications;
mod notify;
mod ops;
mod recurring_bills;
mod splits;
mod transactions;
mod users;
mod util;

type ResultEngine<T> = Result<T, EngineError>;
