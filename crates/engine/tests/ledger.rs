use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use engine::{
    AccountDelta, AccountKind, ActivityState, AuditAction, Currency, EngineError, LedgerEvent, LedgerSubscriber,
    NewAccountCmd, NewBudgetCmd, NewTransactionCmd, NotificationKind, RecordState, SplitInput,
    SubscriberError, TransactionKind, TransactionListFilter, UpdateTransactionCmd,
};

mod common;

use common::{ALICE, date, harness, harness_with_subscriber, sos, usd};

/// Keeps every event it is handed; optionally fails each delivery.
#[derive(Default)]
struct EventLog {
    events: Mutex<Vec<LedgerEvent>>,
    failing: bool,
}

impl EventLog {
    fn failing() -> Self {
        Self {
            failing: true,
            ..Default::default()
        }
    }

    fn take(&self) -> Vec<LedgerEvent> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }
}

#[async_trait]
impl LedgerSubscriber for EventLog {
    fn name(&self) -> &str {
        "event_log"
    }

    async fn handle(&self, event: &LedgerEvent) -> Result<(), SubscriberError> {
        self.events.lock().unwrap().push(event.clone());
        if self.failing {
            return Err(SubscriberError {
                name: self.name().to_string(),
                reason: "sink offline".to_string(),
            });
        }
        Ok(())
    }
}

fn balance_changes(events: &[LedgerEvent]) -> Vec<(uuid::Uuid, i64, i64)> {
    events
        .iter()
        .filter_map(|event| match event {
            LedgerEvent::BalanceChanged {
                account_id,
                delta_minor,
                balance_minor,
                ..
            } => Some((*account_id, *delta_minor, *balance_minor)),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn opening_balance_is_backed_by_a_transaction() {
    let h = harness(date(2025, 3, 1)).await;
    let checking = h.account("Checking", 10_000).await;

    assert_eq!(h.balance(checking).await, 10_000);
    let rows = h
        .engine
        .transactions(ALICE, &TransactionListFilter::default())
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].kind, TransactionKind::Income);
    assert_eq!(rows[0].applied_minor, 10_000);
    assert!(h.engine.reconcile_balances(ALICE).await.unwrap().is_empty());
}

#[tokio::test]
async fn transfer_moves_funds_between_accounts() {
    let h = harness(date(2025, 3, 1)).await;
    let a = h.account("A", 10_000).await;
    let b = h.account("B", 0).await;

    let tx = h
        .engine
        .create_transaction(NewTransactionCmd::transfer(
            ALICE,
            a,
            b,
            5_000,
            usd(),
            date(2025, 3, 1),
        ))
        .await
        .unwrap();

    assert_eq!(tx.target_account_id, Some(b));
    assert_eq!(h.balance(a).await, 5_000);
    assert_eq!(h.balance(b).await, 5_000);
}

#[tokio::test]
async fn uncovered_transfer_changes_nothing() {
    let h = harness(date(2025, 3, 1)).await;
    let a = h.account("A", 5_000).await;
    let b = h.account("B", 0).await;

    let err = h
        .engine
        .create_transaction(NewTransactionCmd::transfer(
            ALICE,
            a,
            b,
            15_000,
            usd(),
            date(2025, 3, 1),
        ))
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::InsufficientFunds(_)));
    assert_eq!(h.balance(a).await, 5_000);
    assert_eq!(h.balance(b).await, 0);
    let transfers = h
        .engine
        .transactions(
            ALICE,
            &TransactionListFilter {
                kinds: Some(vec![TransactionKind::Transfer]),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(transfers.is_empty());
}

#[tokio::test]
async fn expense_cannot_overdraw() {
    let h = harness(date(2025, 3, 1)).await;
    let cash = h.account("Cash", 1_000).await;

    let err = h
        .engine
        .create_transaction(NewTransactionCmd::expense(
            ALICE,
            cash,
            1_001,
            usd(),
            date(2025, 3, 1),
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InsufficientFunds(_)));

    h.engine
        .create_transaction(NewTransactionCmd::expense(
            ALICE,
            cash,
            1_000,
            usd(),
            date(2025, 3, 1),
        ))
        .await
        .unwrap();
    assert_eq!(h.balance(cash).await, 0);
}

#[tokio::test]
async fn transfer_to_the_same_account_is_rejected() {
    let h = harness(date(2025, 3, 1)).await;
    let a = h.account("A", 5_000).await;

    let err = h
        .engine
        .create_transaction(NewTransactionCmd::transfer(
            ALICE,
            a,
            a,
            100,
            usd(),
            date(2025, 3, 1),
        ))
        .await
        .unwrap_err();
    assert!(err.is_validation());
}

#[tokio::test]
async fn splits_over_the_amount_persist_nothing() {
    let h = harness(date(2025, 3, 1)).await;
    let card = h.account("Card", 10_000).await;
    let food = h.category("Food").await;
    let fuel = h.category("Fuel").await;

    let err = h
        .engine
        .create_transaction(
            NewTransactionCmd::expense(ALICE, card, 100, usd(), date(2025, 3, 2))
                .split(food, 60)
                .split(fuel, 50),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::InvalidSplit(_)));
    assert_eq!(h.balance(card).await, 10_000);
    let expenses = h
        .engine
        .transactions(
            ALICE,
            &TransactionListFilter {
                kinds: Some(vec![TransactionKind::Expense]),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(expenses.is_empty());
}

#[tokio::test]
async fn splits_can_be_added_and_removed_within_the_bound() {
    let h = harness(date(2025, 3, 1)).await;
    let card = h.account("Card", 10_000).await;
    let food = h.category("Food").await;
    let fuel = h.category("Fuel").await;

    let tx = h
        .engine
        .create_transaction(
            NewTransactionCmd::expense(ALICE, card, 100, usd(), date(2025, 3, 2)).split(food, 60),
        )
        .await
        .unwrap();
    assert_eq!(tx.splits.len(), 1);

    let err = h
        .engine
        .add_split(ALICE, tx.id, SplitInput::new(fuel, 41))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidSplit(_)));
    let err = h
        .engine
        .add_split(ALICE, tx.id, SplitInput::new(food, 10))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidSplit(_)));

    let split = h
        .engine
        .add_split(ALICE, tx.id, SplitInput::new(fuel, 40))
        .await
        .unwrap();
    assert_eq!(
        h.engine
            .transaction(ALICE, tx.id)
            .await
            .unwrap()
            .splits_total_minor(),
        100
    );

    let err = h
        .engine
        .update_transaction(UpdateTransactionCmd::new(ALICE, tx.id).amount_minor(99))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidSplit(_)));

    h.engine.remove_split(ALICE, split.id).await.unwrap();
    let tx = h.engine.transaction(ALICE, tx.id).await.unwrap();
    assert_eq!(tx.splits.len(), 1);
    assert_eq!(tx.splits_total_minor(), 60);
}

#[tokio::test]
async fn delete_reverses_the_applied_amount() {
    let h = harness(date(2025, 3, 1)).await;
    let checking = h.account("Checking", 10_000).await;

    let tx = h
        .engine
        .create_transaction(NewTransactionCmd::expense(
            ALICE,
            checking,
            3_000,
            usd(),
            date(2025, 3, 3),
        ))
        .await
        .unwrap();
    assert_eq!(h.balance(checking).await, 7_000);

    h.engine.delete_transaction(ALICE, tx.id).await.unwrap();
    assert_eq!(h.balance(checking).await, 10_000);

    let err = h.engine.delete_transaction(ALICE, tx.id).await.unwrap_err();
    assert!(matches!(err, EngineError::KeyNotFound(_)));
    assert_eq!(h.balance(checking).await, 10_000);

    let all = h
        .engine
        .transactions(
            ALICE,
            &TransactionListFilter {
                include_deleted: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let deleted = all.iter().find(|t| t.id == tx.id).unwrap();
    assert_eq!(deleted.state, RecordState::Deleted);
}

#[tokio::test]
async fn deleting_a_spent_income_may_go_negative() {
    let h = harness(date(2025, 3, 1)).await;
    let checking = h.account("Checking", 0).await;

    let salary = h
        .engine
        .create_transaction(NewTransactionCmd::income(
            ALICE,
            checking,
            2_000,
            usd(),
            date(2025, 3, 1),
        ))
        .await
        .unwrap();
    h.engine
        .create_transaction(NewTransactionCmd::expense(
            ALICE,
            checking,
            1_500,
            usd(),
            date(2025, 3, 2),
        ))
        .await
        .unwrap();

    h.engine.delete_transaction(ALICE, salary.id).await.unwrap();
    assert_eq!(h.balance(checking).await, -1_500);
}

#[tokio::test]
async fn amount_edits_wait_for_reconciliation() {
    let h = harness(date(2025, 3, 1)).await;
    let checking = h.account("Checking", 10_000).await;

    let tx = h
        .engine
        .create_transaction(NewTransactionCmd::expense(
            ALICE,
            checking,
            3_000,
            usd(),
            date(2025, 3, 3),
        ))
        .await
        .unwrap();

    let updated = h
        .engine
        .update_transaction(
            UpdateTransactionCmd::new(ALICE, tx.id)
                .amount_minor(5_000)
                .description("  groceries "),
        )
        .await
        .unwrap();
    assert_eq!(updated.amount_minor, 5_000);
    assert_eq!(updated.applied_minor, 3_000);
    assert_eq!(updated.description, "groceries");
    assert_eq!(h.balance(checking).await, 7_000);

    let corrections = h.engine.reconcile_balances(ALICE).await.unwrap();
    assert_eq!(
        corrections,
        vec![AccountDelta {
            account_id: checking,
            delta_minor: -2_000,
        }]
    );
    assert_eq!(h.balance(checking).await, 5_000);
    let tx = h.engine.transaction(ALICE, tx.id).await.unwrap();
    assert_eq!(tx.applied_minor, 5_000);

    // a second pass has nothing left to fix
    assert!(h.engine.reconcile_balances(ALICE).await.unwrap().is_empty());
}

#[tokio::test]
async fn balances_equal_the_sum_of_live_transactions() {
    let h = harness(date(2025, 3, 1)).await;
    let a = h.account("A", 20_000).await;
    let b = h.account("B", 1_000).await;

    let day = date(2025, 3, 4);
    let cmds = [
        NewTransactionCmd::income(ALICE, a, 4_500, usd(), day),
        NewTransactionCmd::expense(ALICE, a, 1_250, usd(), day),
        NewTransactionCmd::transfer(ALICE, a, b, 7_000, usd(), day),
        NewTransactionCmd::expense(ALICE, b, 3_333, usd(), day),
    ];
    let mut ids = Vec::new();
    for cmd in cmds {
        ids.push(h.engine.create_transaction(cmd).await.unwrap().id);
    }
    h.engine.delete_transaction(ALICE, ids[1]).await.unwrap();

    assert_eq!(h.balance(a).await, 20_000 + 4_500 - 7_000);
    assert_eq!(h.balance(b).await, 1_000 + 7_000 - 3_333);
    assert!(h.engine.reconcile_balances(ALICE).await.unwrap().is_empty());
}

#[tokio::test]
async fn currencies_are_checked() {
    let h = harness(date(2025, 3, 1)).await;

    let err = h
        .engine
        .new_account(NewAccountCmd::new(
            ALICE,
            "Euro",
            AccountKind::Bank,
            Currency::new("EUR").unwrap(),
        ))
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::CurrencyNotAllowed("EUR".to_string()));

    let checking = h.account("Checking", 1_000).await;
    let err = h
        .engine
        .create_transaction(NewTransactionCmd::income(
            ALICE,
            checking,
            100,
            sos(),
            date(2025, 3, 1),
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::CurrencyMismatch(_)));
    assert_eq!(h.balance(checking).await, 1_000);
}

#[tokio::test]
async fn amounts_must_be_positive() {
    let h = harness(date(2025, 3, 1)).await;
    let checking = h.account("Checking", 1_000).await;

    for amount in [0, -5] {
        let err = h
            .engine
            .create_transaction(NewTransactionCmd::income(
                ALICE,
                checking,
                amount,
                usd(),
                date(2025, 3, 1),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidAmount(_)));
    }
}

#[tokio::test]
async fn records_of_other_users_are_not_found() {
    let h = harness(date(2025, 3, 1)).await;
    h.engine.new_user("bob", "bob@example.com").await.unwrap();
    let checking = h.account("Checking", 1_000).await;

    let err = h.engine.account("bob", checking).await.unwrap_err();
    assert!(matches!(err, EngineError::KeyNotFound(_)));

    let err = h
        .engine
        .create_transaction(NewTransactionCmd::expense(
            "bob",
            checking,
            100,
            usd(),
            date(2025, 3, 1),
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::KeyNotFound(_)));
    assert_eq!(h.balance(checking).await, 1_000);
}

#[tokio::test]
async fn inactive_accounts_reject_bookings() {
    let h = harness(date(2025, 3, 1)).await;
    let checking = h.account("Checking", 1_000).await;

    h.engine
        .set_account_active(ALICE, checking, false)
        .await
        .unwrap();
    let err = h
        .engine
        .create_transaction(NewTransactionCmd::income(
            ALICE,
            checking,
            100,
            usd(),
            date(2025, 3, 1),
        ))
        .await
        .unwrap_err();
    assert!(err.is_validation());

    h.engine.delete_account(ALICE, checking).await.unwrap();
    let err = h
        .engine
        .set_account_active(ALICE, checking, true)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::KeyNotFound(_)));
}

#[tokio::test]
async fn account_names_are_unique_per_user() {
    let h = harness(date(2025, 3, 1)).await;
    h.account("Checking", 0).await;

    let err = h
        .engine
        .new_account(NewAccountCmd::new(
            ALICE,
            "checking",
            AccountKind::Cash,
            usd(),
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ExistingKey(_)));
}

#[tokio::test]
async fn list_filters_by_date_range_and_category() {
    let h = harness(date(2025, 3, 1)).await;
    let checking = h.account("Checking", 10_000).await;
    let food = h.category("Food").await;

    for (day, category) in [(5, Some(food)), (15, None), (25, Some(food))] {
        let mut cmd =
            NewTransactionCmd::expense(ALICE, checking, 100, usd(), date(2025, 3, day));
        if let Some(category) = category {
            cmd = cmd.category(category);
        }
        h.engine.create_transaction(cmd).await.unwrap();
    }

    let rows = h
        .engine
        .transactions(
            ALICE,
            &TransactionListFilter {
                category_id: Some(food),
                from: Some(date(2025, 3, 1)),
                to: Some(date(2025, 3, 25)),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);

    let err = h
        .engine
        .transactions(
            ALICE,
            &TransactionListFilter {
                from: Some(date(2025, 3, 10)),
                to: Some(date(2025, 3, 1)),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(err.is_validation());
}

#[tokio::test]
async fn committed_changes_are_audited() {
    let h = harness(date(2025, 3, 1)).await;
    let checking = h.account("Checking", 1_000).await;
    let tx = h
        .engine
        .create_transaction(NewTransactionCmd::expense(
            ALICE,
            checking,
            100,
            usd(),
            date(2025, 3, 1),
        ))
        .await
        .unwrap();
    h.engine.delete_transaction(ALICE, tx.id).await.unwrap();

    let entries = h.audit.entries();
    assert!(entries.iter().any(|e| e.table_name == "accounts"
        && e.record_id == checking
        && e.action == AuditAction::Create));
    let tx_entries: Vec<_> = entries.iter().filter(|e| e.record_id == tx.id).collect();
    assert_eq!(tx_entries.len(), 2);
    assert_eq!(tx_entries[0].action, AuditAction::Create);
    assert_eq!(tx_entries[1].action, AuditAction::Delete);
    assert!(tx_entries[1].old.is_some());
    assert!(entries.iter().all(|e| e.user_id == ALICE));

    // a rejected write leaves no audit trace
    let before = h.audit.entries().len();
    let _ = h
        .engine
        .create_transaction(NewTransactionCmd::expense(
            ALICE,
            checking,
            1_000_000,
            usd(),
            date(2025, 3, 1),
        ))
        .await
        .unwrap_err();
    assert_eq!(h.audit.entries().len(), before);
}

#[tokio::test]
async fn exchange_rates_are_upserted_per_day() {
    let h = harness(date(2025, 3, 1)).await;
    let day = date(2025, 3, 1);

    h.engine
        .record_exchange_rate(&usd(), &sos(), day, 571_000_000, "manual")
        .await
        .unwrap();
    let rate = h
        .engine
        .record_exchange_rate(&usd(), &sos(), day, 572_500_000, "feed")
        .await
        .unwrap();

    let stored = h.engine.exchange_rate(&usd(), &sos(), day).await.unwrap();
    assert_eq!(stored.id, rate.id);
    assert_eq!(stored.rate_micros, 572_500_000);
    assert_eq!(stored.source, "feed");

    let err = h
        .engine
        .exchange_rate(&sos(), &usd(), day)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::KeyNotFound(_)));
}

#[tokio::test]
async fn transfer_publishes_one_creation_and_two_balance_changes() {
    let log = Arc::new(EventLog::default());
    let h = harness_with_subscriber(date(2025, 3, 1), log.clone()).await;
    let a = h.account("A", 10_000).await;
    let b = h.account("B", 0).await;
    log.take();

    let tx = h
        .engine
        .create_transaction(NewTransactionCmd::transfer(
            ALICE,
            a,
            b,
            5_000,
            usd(),
            date(2025, 3, 1),
        ))
        .await
        .unwrap();

    let events = log.take();
    assert_eq!(events.len(), 3);
    let created: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            LedgerEvent::TransactionCreated { transaction } => Some(transaction),
            _ => None,
        })
        .collect();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].id, tx.id);
    assert_eq!(created[0].target_account_id, Some(b));

    let changes = balance_changes(&events);
    assert_eq!(changes, vec![(a, -5_000, 5_000), (b, 5_000, 5_000)]);
    assert_eq!(h.balance(a).await, 5_000);
    assert_eq!(h.balance(b).await, 5_000);
    assert!(events.iter().all(|event| event.user_id() == ALICE));
}

#[tokio::test]
async fn rejected_writes_publish_nothing() {
    let log = Arc::new(EventLog::default());
    let h = harness_with_subscriber(date(2025, 3, 1), log.clone()).await;
    let a = h.account("A", 5_000).await;
    let b = h.account("B", 0).await;
    log.take();

    let err = h
        .engine
        .create_transaction(NewTransactionCmd::transfer(
            ALICE,
            a,
            b,
            15_000,
            usd(),
            date(2025, 3, 1),
        ))
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::InsufficientFunds(_)));
    assert!(log.take().is_empty());
}

#[tokio::test]
async fn failing_subscriber_keeps_the_write_committed() {
    let log = Arc::new(EventLog::failing());
    let h = harness_with_subscriber(date(2025, 3, 1), log.clone()).await;
    let checking = h.account("Checking", 10_000).await;
    let groceries = h.category("Groceries").await;
    h.engine
        .new_budget(NewBudgetCmd::new(ALICE, groceries, 3, 2025, 1_000, usd()))
        .await
        .unwrap();
    log.take();

    let tx = h
        .engine
        .create_transaction(
            NewTransactionCmd::expense(ALICE, checking, 900, usd(), date(2025, 3, 2))
                .category(groceries),
        )
        .await
        .unwrap();

    let events = log.take();
    assert_eq!(events.len(), 2);
    assert_eq!(balance_changes(&events), vec![(checking, -900, 9_100)]);
    assert_eq!(h.balance(checking).await, 9_100);
    assert_eq!(h.engine.transaction(ALICE, tx.id).await.unwrap().amount_minor, 900);

    // the subscribers registered after it still ran
    assert!(h.audit.entries().iter().any(|entry| entry.record_id == tx.id
        && entry.action == AuditAction::Create));
    let notes = h.engine.notifications(ALICE, false).await.unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].kind, NotificationKind::Budget);
    assert!(notes[0].message.starts_with("[near limit]"));
}

#[tokio::test]
async fn deleted_accounts_and_categories_are_archived() {
    let h = harness(date(2025, 3, 1)).await;
    let checking = h.account("Checking", 0).await;
    let old = h.account("Old wallet", 0).await;
    let fuel = h.category("Fuel").await;
    let rent = h.category("Rent").await;

    h.engine.delete_account(ALICE, old).await.unwrap();
    h.engine.delete_category(ALICE, fuel).await.unwrap();

    let live: Vec<_> = h.engine.accounts(ALICE).await.unwrap();
    assert_eq!(live.iter().map(|a| a.id).collect::<Vec<_>>(), vec![checking]);
    let archived = h.engine.archived_accounts(ALICE).await.unwrap();
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0].id, old);
    assert_eq!(archived[0].state, ActivityState::Deleted);

    let live = h.engine.categories(ALICE).await.unwrap();
    assert_eq!(live.iter().map(|c| c.id).collect::<Vec<_>>(), vec![rent]);
    let archived = h.engine.archived_categories(ALICE).await.unwrap();
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0].id, fuel);
    assert_eq!(archived[0].state, RecordState::Deleted);
}
