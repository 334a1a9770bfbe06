#![allow(dead_code)]

use std::sync::Arc;

use chrono::NaiveDate;
use sea_orm::{Database, DatabaseConnection};

use engine::{
    AccountKind, Currency, Engine, FixedClock, LedgerSubscriber, MemoryAuditRecorder,
    MemoryEmailDispatcher, NewAccountCmd,
};
use migration::MigratorTrait;
use uuid::Uuid;

pub const ALICE: &str = "alice";
pub const ALICE_EMAIL: &str = "alice@example.com";

pub struct Harness {
    pub engine: Engine,
    pub db: DatabaseConnection,
    pub clock: Arc<FixedClock>,
    pub audit: Arc<MemoryAuditRecorder>,
    pub email: Arc<MemoryEmailDispatcher>,
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

pub fn usd() -> Currency {
    Currency::new("USD").unwrap()
}

pub fn sos() -> Currency {
    Currency::new("SOS").unwrap()
}

/// Engine over a migrated in-memory database, with `alice` registered.
pub async fn harness(today: NaiveDate) -> Harness {
    harness_with_email(today, MemoryEmailDispatcher::new()).await
}

pub async fn harness_with_email(today: NaiveDate, email: MemoryEmailDispatcher) -> Harness {
    build(today, email, None).await
}

/// Like [`harness`], with `subscriber` listening to committed events.
pub async fn harness_with_subscriber(
    today: NaiveDate,
    subscriber: Arc<dyn LedgerSubscriber>,
) -> Harness {
    build(today, MemoryEmailDispatcher::new(), Some(subscriber)).await
}

async fn build(
    today: NaiveDate,
    email: MemoryEmailDispatcher,
    subscriber: Option<Arc<dyn LedgerSubscriber>>,
) -> Harness {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();

    let clock = Arc::new(FixedClock::on(today));
    let audit = Arc::new(MemoryAuditRecorder::new());
    let email = Arc::new(email);
    let mut builder = Engine::builder()
        .database(db.clone())
        .clock(clock.clone())
        .email_dispatcher(email.clone())
        .audit_recorder(audit.clone());
    if let Some(subscriber) = subscriber {
        builder = builder.subscriber(subscriber);
    }
    let engine = builder.build().await.unwrap();
    engine.new_user(ALICE, ALICE_EMAIL).await.unwrap();

    Harness {
        engine,
        db,
        clock,
        audit,
        email,
    }
}

impl Harness {
    pub async fn account(&self, name: &str, opening_minor: i64) -> Uuid {
        self.account_in(name, usd(), opening_minor).await
    }

    pub async fn account_in(&self, name: &str, currency: Currency, opening_minor: i64) -> Uuid {
        self.engine
            .new_account(
                NewAccountCmd::new(ALICE, name, AccountKind::Bank, currency)
                    .opening_balance(opening_minor),
            )
            .await
            .unwrap()
    }

    pub async fn balance(&self, account_id: Uuid) -> i64 {
        self.engine
            .account(ALICE, account_id)
            .await
            .unwrap()
            .balance_minor
    }

    pub async fn category(&self, name: &str) -> Uuid {
        self.engine
            .new_category(ALICE, name, None)
            .await
            .unwrap()
            .id
    }
}
