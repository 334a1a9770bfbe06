use std::{fmt, sync::Arc};

use sea_orm::DatabaseConnection;
use tracing::warn;

use crate::{
    AllowedCurrencies, AuditRecorder, AuditSubscriber, Clock, CurrencyValidator, EmailDispatcher,
    LedgerEvent, LedgerSubscriber, LogEmailDispatcher, ResultEngine, SystemClock,
};

use budgets::{BudgetMonitor, BudgetSubscriber};
use notifications::Notifier;

mod access;
mod accounts;
mod budgets;
mod categories;
mod exchange_rates;
mod notifications;
mod recurring;
mod splits;
mod transactions;
mod users;

pub use recurring::{BillOutcome, BillRunReport};
pub use transactions::TransactionListFilter;

/// Run a block inside a DB transaction, committing on success and rolling back on error.
///
/// `?` and `return Err(..)` inside the block leave the enclosing function; the
/// dropped transaction rolls back.
macro_rules! with_tx {
    ($self:expr, |$tx:ident| $body:expr) => {{
        let $tx = $self.database.begin().await?;
        let result: $crate::ResultEngine<_> = $body;
        match result {
            Ok(value) => {
                $tx.commit().await?;
                Ok(value)
            }
            Err(err) => Err(err),
        }
    }};
}

pub(crate) use with_tx;

/// Whether a withdrawal may drive an account below zero.
///
/// User initiated bookings enforce funds. Scheduled bills, reversals and
/// reconciliation go through regardless of the balance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FundsPolicy {
    Enforce,
    AllowOverdraft,
}

pub struct Engine {
    database: DatabaseConnection,
    clock: Arc<dyn Clock>,
    currencies: Arc<dyn CurrencyValidator>,
    notifier: Arc<Notifier>,
    monitor: Arc<BudgetMonitor>,
    subscribers: Vec<Arc<dyn LedgerSubscriber>>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("database", &self.database)
            .field("subscribers", &self.subscribers.len())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Return a builder for `Engine`. Help to build the struct.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// The clock the engine dates its records with.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Deliver committed events to the subscribers.
    ///
    /// Runs after commit, so the budget monitor aggregates over the durable
    /// write. Subscriber failures are logged and dropped.
    async fn publish(&self, events: Vec<LedgerEvent>) {
        for event in &events {
            for subscriber in &self.subscribers {
                if let Err(err) = subscriber.handle(event).await {
                    warn!(
                        subscriber = subscriber.name(),
                        event = event.name(),
                        %err,
                        "event subscriber failed"
                    );
                }
            }
        }
    }
}

/// The builder for `Engine`
#[derive(Default)]
pub struct EngineBuilder {
    database: DatabaseConnection,
    clock: Option<Arc<dyn Clock>>,
    currencies: Option<Arc<dyn CurrencyValidator>>,
    email: Option<Arc<dyn EmailDispatcher>>,
    subscribers: Vec<Arc<dyn LedgerSubscriber>>,
    audit: Option<Arc<dyn AuditRecorder>>,
}

impl EngineBuilder {
    /// Pass the required database
    pub fn database(mut self, db: DatabaseConnection) -> EngineBuilder {
        self.database = db;
        self
    }

    /// Time source, `SystemClock` by default.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> EngineBuilder {
        self.clock = Some(clock);
        self
    }

    /// Currency validator, `AllowedCurrencies::default()` by default.
    pub fn currencies(mut self, currencies: Arc<dyn CurrencyValidator>) -> EngineBuilder {
        self.currencies = Some(currencies);
        self
    }

    /// Email dispatcher, `LogEmailDispatcher` by default.
    pub fn email_dispatcher(mut self, email: Arc<dyn EmailDispatcher>) -> EngineBuilder {
        self.email = Some(email);
        self
    }

    /// Add a subscriber to the committed event stream.
    pub fn subscriber(mut self, subscriber: Arc<dyn LedgerSubscriber>) -> EngineBuilder {
        self.subscribers.push(subscriber);
        self
    }

    /// Record every committed change with `recorder`.
    pub fn audit_recorder(mut self, recorder: Arc<dyn AuditRecorder>) -> EngineBuilder {
        self.audit = Some(recorder);
        self
    }

    /// Construct `Engine`
    ///
    /// Subscribers passed to the builder run first, then the audit recorder,
    /// then the budget monitor.
    pub async fn build(self) -> ResultEngine<Engine> {
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let email = self.email.unwrap_or_else(|| Arc::new(LogEmailDispatcher));
        let notifier = Arc::new(Notifier::new(self.database.clone(), clock.clone(), email));
        let monitor = Arc::new(BudgetMonitor::new(self.database.clone(), notifier.clone()));

        let mut subscribers = self.subscribers;
        if let Some(recorder) = self.audit {
            subscribers.push(Arc::new(AuditSubscriber::new(recorder, clock.clone())));
        }
        subscribers.push(Arc::new(BudgetSubscriber::new(monitor.clone())));

        Ok(Engine {
            database: self.database,
            clock,
            currencies: self
                .currencies
                .unwrap_or_else(|| Arc::new(AllowedCurrencies::default())),
            notifier,
            monitor,
            subscribers,
        })
    }
}
