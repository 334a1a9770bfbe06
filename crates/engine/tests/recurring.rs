use engine::{
    ActivityState, BillOutcome, EngineError, Frequency, NewBudgetCmd, NewRecurringBillCmd,
    NotificationKind, TransactionKind, TransactionListFilter,
};
use uuid::Uuid;

mod common;

use common::{ALICE, Harness, date, harness, usd};

async fn bill(
    h: &Harness,
    account_id: Uuid,
    name: &str,
    amount_minor: i64,
    frequency: Frequency,
    start: chrono::NaiveDate,
) -> Uuid {
    h.engine
        .new_recurring_bill(NewRecurringBillCmd::new(
            ALICE,
            account_id,
            name,
            amount_minor,
            usd(),
            frequency,
            start,
        ))
        .await
        .unwrap()
        .id
}

async fn instances(h: &Harness, bill_id: Uuid) -> usize {
    h.engine
        .transactions(
            ALICE,
            &TransactionListFilter {
                recurring_bill_id: Some(bill_id),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .len()
}

#[tokio::test]
async fn monthly_bill_steps_through_a_leap_february() {
    let h = harness(date(2024, 1, 31)).await;
    let checking = h.account("Checking", 100_000).await;
    let rent = bill(&h, checking, "Rent", 1_500, Frequency::Monthly, date(2024, 1, 31)).await;

    let report = h.engine.run_due_bills().await.unwrap();
    assert_eq!(report.generated(), 1);
    let (bill_id, outcome) = &report.outcomes[0];
    assert_eq!(*bill_id, rent);
    let BillOutcome::Generated { transaction_id } = outcome else {
        panic!("expected a generated bill, got {outcome:?}");
    };

    let tx = h.engine.transaction(ALICE, *transaction_id).await.unwrap();
    assert_eq!(tx.description, "[Recurring] Rent");
    assert_eq!(tx.kind, TransactionKind::Expense);
    assert_eq!(tx.transaction_date, date(2024, 1, 31));
    assert!(tx.is_recurring_instance);
    assert_eq!(tx.recurring_bill_id, Some(rent));
    assert_eq!(h.balance(checking).await, 100_000 - 1_500);

    let stored = h.engine.recurring_bill(ALICE, rent).await.unwrap();
    assert_eq!(stored.next_due_date, date(2024, 2, 29));
    assert_eq!(stored.last_generated_date, Some(date(2024, 1, 31)));

    // nothing more is due until the clamped date
    assert!(h.engine.run_due_bills().await.unwrap().outcomes.is_empty());

    h.clock.set_today(date(2024, 2, 29));
    assert_eq!(h.engine.run_due_bills().await.unwrap().generated(), 1);
    let stored = h.engine.recurring_bill(ALICE, rent).await.unwrap();
    assert_eq!(stored.next_due_date, date(2024, 3, 31));
    assert_eq!(instances(&h, rent).await, 2);

    let notes = h.engine.notifications(ALICE, false).await.unwrap();
    assert_eq!(notes.len(), 2);
    assert!(notes.iter().all(|n| n.kind == NotificationKind::BillDue
        && n.message == "Generated recurring: Rent"
        && n.related_id == Some(rent)));
}

#[tokio::test]
async fn racing_generations_book_one_instance() {
    let h = harness(date(2025, 5, 1)).await;
    let checking = h.account("Checking", 10_000).await;
    let gym = bill(&h, checking, "Gym", 2_500, Frequency::Monthly, date(2025, 5, 1)).await;

    let (scheduled, manual) = tokio::join!(
        h.engine.generate_one(gym),
        h.engine.generate_bill_now(ALICE, gym)
    );
    let generated: Vec<_> = [scheduled.unwrap(), manual.unwrap()]
        .into_iter()
        .flatten()
        .collect();

    assert_eq!(generated.len(), 1);
    assert_eq!(instances(&h, gym).await, 1);
    assert_eq!(h.balance(checking).await, 7_500);
    let stored = h.engine.recurring_bill(ALICE, gym).await.unwrap();
    assert_eq!(stored.next_due_date, date(2025, 6, 1));
}

#[tokio::test]
async fn one_instance_per_run_until_the_end_date() {
    let h = harness(date(2025, 1, 31)).await;
    let checking = h.account("Checking", 10_000).await;
    let lesson = h
        .engine
        .new_recurring_bill(
            NewRecurringBillCmd::new(
                ALICE,
                checking,
                "Lesson",
                100,
                usd(),
                Frequency::Weekly,
                date(2025, 1, 1),
            )
            .end_date(date(2025, 1, 10)),
        )
        .await
        .unwrap()
        .id;

    assert_eq!(h.engine.run_due_bills().await.unwrap().generated(), 1);
    assert_eq!(h.engine.run_due_bills().await.unwrap().generated(), 1);
    let report = h.engine.run_due_bills().await.unwrap();
    assert!(report.outcomes.is_empty());

    assert_eq!(instances(&h, lesson).await, 2);
    let stored = h.engine.recurring_bill(ALICE, lesson).await.unwrap();
    assert_eq!(stored.next_due_date, date(2025, 1, 15));
    assert_eq!(stored.last_generated_date, Some(date(2025, 1, 8)));
    assert_eq!(h.engine.generate_one(lesson).await.unwrap(), None);
}

#[tokio::test]
async fn bills_may_overdraw_the_account() {
    let h = harness(date(2025, 2, 1)).await;
    let card = h.account("Card", 0).await;
    bill(&h, card, "Insurance", 5_000, Frequency::Annually, date(2025, 2, 1)).await;

    assert_eq!(h.engine.run_due_bills().await.unwrap().generated(), 1);
    assert_eq!(h.balance(card).await, -5_000);
}

#[tokio::test]
async fn a_failing_bill_does_not_stop_the_batch() {
    let h = harness(date(2025, 2, 1)).await;
    let checking = h.account("Checking", 10_000).await;
    let savings = h.account("Savings", 10_000).await;
    let broken = bill(&h, savings, "Broken", 100, Frequency::Daily, date(2025, 2, 1)).await;
    let phone = bill(&h, checking, "Phone", 100, Frequency::Daily, date(2025, 2, 1)).await;
    h.engine
        .set_account_active(ALICE, savings, false)
        .await
        .unwrap();

    let report = h.engine.run_due_bills().await.unwrap();
    assert_eq!(report.outcomes.len(), 2);
    assert_eq!(report.generated(), 1);
    assert_eq!(report.failed(), 1);
    let (_, outcome) = report
        .outcomes
        .iter()
        .find(|(id, _)| *id == broken)
        .unwrap();
    assert!(matches!(outcome, BillOutcome::Failed(err) if err.is_validation()));

    let stored = h.engine.recurring_bill(ALICE, broken).await.unwrap();
    assert_eq!(stored.next_due_date, date(2025, 2, 1));
    assert_eq!(instances(&h, broken).await, 0);
    assert_eq!(instances(&h, phone).await, 1);
}

#[tokio::test]
async fn paused_and_deleted_bills_are_not_generated() {
    let h = harness(date(2025, 2, 1)).await;
    let checking = h.account("Checking", 10_000).await;
    let stream = bill(&h, checking, "Stream", 999, Frequency::Monthly, date(2025, 2, 1)).await;

    let paused = h.engine.set_bill_active(ALICE, stream, false).await.unwrap();
    assert_eq!(paused.state, ActivityState::Inactive);
    assert!(h.engine.due_bills(date(2025, 2, 1)).await.unwrap().is_empty());
    assert_eq!(h.engine.generate_one(stream).await.unwrap(), None);

    h.engine.set_bill_active(ALICE, stream, true).await.unwrap();
    assert_eq!(h.engine.due_bills(date(2025, 2, 1)).await.unwrap().len(), 1);

    h.engine.delete_recurring_bill(ALICE, stream).await.unwrap();
    assert!(h.engine.due_bills(date(2025, 2, 1)).await.unwrap().is_empty());
    assert_eq!(h.engine.generate_one(stream).await.unwrap(), None);
    let err = h
        .engine
        .generate_bill_now(ALICE, stream)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::KeyNotFound(_)));
    assert!(h.engine.recurring_bills(ALICE).await.unwrap().is_empty());
    assert_eq!(instances(&h, stream).await, 0);
}

#[tokio::test]
async fn bills_are_not_generated_before_their_start() {
    let h = harness(date(2025, 2, 1)).await;
    let checking = h.account("Checking", 10_000).await;
    let later = bill(&h, checking, "Later", 100, Frequency::Weekly, date(2025, 2, 10)).await;

    assert_eq!(h.engine.generate_bill_now(ALICE, later).await.unwrap(), None);
    assert_eq!(h.balance(checking).await, 10_000);

    h.engine.new_user("bob", "bob@example.com").await.unwrap();
    let err = h.engine.generate_bill_now("bob", later).await.unwrap_err();
    assert!(matches!(err, EngineError::KeyNotFound(_)));
}

#[tokio::test]
async fn bill_validation() {
    let h = harness(date(2025, 2, 1)).await;
    let checking = h.account("Checking", 10_000).await;

    let transfer = NewRecurringBillCmd::new(
        ALICE,
        checking,
        "Savings plan",
        100,
        usd(),
        Frequency::Monthly,
        date(2025, 2, 1),
    )
    .kind(TransactionKind::Transfer);
    assert!(
        h.engine
            .new_recurring_bill(transfer)
            .await
            .unwrap_err()
            .is_validation()
    );

    let backwards = NewRecurringBillCmd::new(
        ALICE,
        checking,
        "Backwards",
        100,
        usd(),
        Frequency::Monthly,
        date(2025, 2, 1),
    )
    .end_date(date(2025, 1, 1));
    assert!(
        h.engine
            .new_recurring_bill(backwards)
            .await
            .unwrap_err()
            .is_validation()
    );

    let free = NewRecurringBillCmd::new(
        ALICE,
        checking,
        "Free",
        0,
        usd(),
        Frequency::Monthly,
        date(2025, 2, 1),
    );
    assert!(matches!(
        h.engine.new_recurring_bill(free).await.unwrap_err(),
        EngineError::InvalidAmount(_)
    ));
}

#[tokio::test]
async fn income_bills_credit_the_account() {
    let h = harness(date(2025, 2, 25)).await;
    let checking = h.account("Checking", 0).await;
    h.engine
        .new_recurring_bill(
            NewRecurringBillCmd::new(
                ALICE,
                checking,
                "Salary",
                300_000,
                usd(),
                Frequency::BiWeekly,
                date(2025, 2, 25),
            )
            .kind(TransactionKind::Income),
        )
        .await
        .unwrap();

    assert_eq!(h.engine.run_due_bills().await.unwrap().generated(), 1);
    assert_eq!(h.balance(checking).await, 300_000);
}

#[tokio::test]
async fn generated_expenses_feed_the_budget_monitor() {
    let h = harness(date(2025, 3, 1)).await;
    let checking = h.account("Checking", 100_000).await;
    let housing = h.category("Housing").await;
    h.engine
        .new_budget(NewBudgetCmd::new(ALICE, housing, 3, 2025, 1_000, usd()))
        .await
        .unwrap();
    h.engine
        .new_recurring_bill(
            NewRecurringBillCmd::new(
                ALICE,
                checking,
                "Rent",
                800,
                usd(),
                Frequency::Monthly,
                date(2025, 3, 1),
            )
            .category(housing),
        )
        .await
        .unwrap();

    assert_eq!(h.engine.run_due_bills().await.unwrap().generated(), 1);

    let notes = h.engine.notifications(ALICE, false).await.unwrap();
    assert_eq!(notes.len(), 2);
    assert!(notes.iter().any(|n| n.kind == NotificationKind::BillDue));
    assert!(notes.iter().any(
        |n| n.kind == NotificationKind::Budget && n.message.starts_with("[info]")
    ));
}

#[tokio::test]
async fn categories_booked_by_a_bill_cannot_be_deleted() {
    let h = harness(date(2025, 3, 1)).await;
    let checking = h.account("Checking", 10_000).await;
    let utilities = h.category("Utilities").await;
    let power = h
        .engine
        .new_recurring_bill(
            NewRecurringBillCmd::new(
                ALICE,
                checking,
                "Power",
                3_000,
                usd(),
                Frequency::Monthly,
                date(2025, 3, 1),
            )
            .category(utilities),
        )
        .await
        .unwrap()
        .id;

    let err = h
        .engine
        .delete_category(ALICE, utilities)
        .await
        .unwrap_err();
    assert!(err.is_validation());
    assert_eq!(h.engine.run_due_bills().await.unwrap().generated(), 1);

    // a paused bill may be resumed, so it still holds the category
    h.engine.set_bill_active(ALICE, power, false).await.unwrap();
    assert!(
        h.engine
            .delete_category(ALICE, utilities)
            .await
            .unwrap_err()
            .is_validation()
    );

    h.engine.delete_recurring_bill(ALICE, power).await.unwrap();
    h.engine.delete_category(ALICE, utilities).await.unwrap();

    let archived = h.engine.archived_recurring_bills(ALICE).await.unwrap();
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0].id, power);
    assert_eq!(archived[0].state, ActivityState::Deleted);
}
