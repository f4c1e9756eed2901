use backend::ledger::{CreditLedgerService, LedgerStore};
use backend::payments::{PaymentEvent, PaymentEventError, PaymentEventProcessor, ProcessOutcome};
use serde_json::json;
use sqlx::PgPool;

fn checkout_event(payment_ref: &str, user_id: &str, tier: &str) -> PaymentEvent {
    PaymentEvent::from_payload(&json!({
        "type": "checkout.session.completed",
        "data": { "object": {
            "id": "cs_test",
            "payment_intent": payment_ref,
            "customer": "cus_1",
            "amount_total": 499,
            "metadata": { "userId": user_id, "tier": tier }
        }}
    }))
}

fn renewal_invoice(payment_ref: &str, user_id: &str, billing_reason: &str) -> PaymentEvent {
    PaymentEvent::from_payload(&json!({
        "type": "invoice.paid",
        "data": { "object": {
            "id": "in_test",
            "payment_intent": payment_ref,
            "subscription": "sub_1",
            "customer": "cus_1",
            "billing_reason": billing_reason,
            "amount_paid": 399,
            "subscription_details": { "metadata": { "userId": user_id, "tier": "pro_monthly" } }
        }}
    }))
}

async fn grant_count(pool: &PgPool, user_id: &str) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM credit_grants WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

async fn event_count(pool: &PgPool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM payment_events")
        .fetch_one(pool)
        .await
        .unwrap()
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn duplicate_checkout_delivery_grants_once(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    LedgerStore::new(pool.clone())
        .create_account("user_dup", 0)
        .await
        .unwrap();

    let processor = PaymentEventProcessor::new(pool.clone());
    let first = processor
        .process(checkout_event("pi_once", "user_dup", "starter_pack"))
        .await
        .unwrap();
    assert!(matches!(
        first,
        ProcessOutcome::Granted { credits: 30, balance: 30, .. }
    ));

    let second = processor
        .process(checkout_event("pi_once", "user_dup", "starter_pack"))
        .await
        .unwrap();
    assert_eq!(second, ProcessOutcome::AlreadyProcessed);

    assert_eq!(grant_count(&pool, "user_dup").await, 1);
    assert_eq!(event_count(&pool).await, 1);
    let ledger = CreditLedgerService::new(pool.clone());
    assert_eq!(ledger.balance("user_dup").await.unwrap(), 30);
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn concurrent_duplicate_deliveries_grant_once(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    LedgerStore::new(pool.clone())
        .create_account("user_race_pay", 0)
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..2 {
        let processor = PaymentEventProcessor::new(pool.clone());
        handles.push(tokio::spawn(async move {
            processor
                .process(checkout_event("pi_race", "user_race_pay", "starter_pack"))
                .await
        }));
    }

    let mut granted = 0;
    let mut duplicates = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            ProcessOutcome::Granted { .. } => granted += 1,
            ProcessOutcome::AlreadyProcessed => duplicates += 1,
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
    assert_eq!(granted, 1);
    assert_eq!(duplicates, 1);

    assert_eq!(grant_count(&pool, "user_race_pay").await, 1);
    assert_eq!(event_count(&pool).await, 1);
    let ledger = CreditLedgerService::new(pool.clone());
    assert_eq!(ledger.balance("user_race_pay").await.unwrap(), 30);
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn unknown_tier_grants_nothing_and_records_nothing(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    LedgerStore::new(pool.clone())
        .create_account("user_bad_tier", 0)
        .await
        .unwrap();

    let processor = PaymentEventProcessor::new(pool.clone());
    let err = processor
        .process(checkout_event("pi_bad", "user_bad_tier", "mega_pack"))
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentEventError::UnknownTier(_)));

    // No record means a corrected redelivery can still be applied.
    assert_eq!(grant_count(&pool, "user_bad_tier").await, 0);
    assert_eq!(event_count(&pool).await, 0);

    let retried = processor
        .process(checkout_event("pi_bad", "user_bad_tier", "starter_pack"))
        .await
        .unwrap();
    assert!(matches!(retried, ProcessOutcome::Granted { .. }));
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn missing_user_metadata_is_a_hard_failure(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();

    let event = PaymentEvent::from_payload(&json!({
        "type": "checkout.session.completed",
        "data": { "object": {
            "id": "cs_anon",
            "payment_intent": "pi_anon",
            "amount_total": 499,
            "metadata": { "tier": "starter_pack" }
        }}
    }));
    let err = PaymentEventProcessor::new(pool.clone())
        .process(event)
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentEventError::MissingMetadata("userId")));
    assert_eq!(event_count(&pool).await, 0);
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn first_subscription_invoice_is_suppressed(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    LedgerStore::new(pool.clone())
        .create_account("user_sub", 0)
        .await
        .unwrap();

    let processor = PaymentEventProcessor::new(pool.clone());
    let outcome = processor
        .process(renewal_invoice("pi_first", "user_sub", "subscription_create"))
        .await
        .unwrap();
    assert_eq!(outcome, ProcessOutcome::Ignored);
    assert_eq!(grant_count(&pool, "user_sub").await, 0);
    assert_eq!(event_count(&pool).await, 0);
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn renewal_invoice_grants_and_reactivates(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let store = LedgerStore::new(pool.clone());
    store.create_account("user_renew", 0).await.unwrap();
    store
        .set_subscription_state("user_renew", "expired", Some("sub_1"))
        .await
        .unwrap();

    let processor = PaymentEventProcessor::new(pool.clone());
    let outcome = processor
        .process(renewal_invoice("pi_cycle", "user_renew", "subscription_cycle"))
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        ProcessOutcome::Granted { credits: 15, .. }
    ));

    let (status, sub_ref): (String, Option<String>) = sqlx::query_as(
        "SELECT subscription_status, payment_subscription_ref FROM accounts WHERE user_id = 'user_renew'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(status, "active");
    assert_eq!(sub_ref.as_deref(), Some("sub_1"));

    let category: String = sqlx::query_scalar(
        "SELECT category FROM credit_grants WHERE user_id = 'user_renew'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(category, "subscription_monthly");
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn subscription_lifecycle_events_sync_account_state(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let store = LedgerStore::new(pool.clone());
    store.create_account("user_lifecycle", 0).await.unwrap();
    store
        .set_subscription_state("user_lifecycle", "active", Some("sub_9"))
        .await
        .unwrap();

    let processor = PaymentEventProcessor::new(pool.clone());

    let past_due = PaymentEvent::from_payload(&json!({
        "type": "customer.subscription.updated",
        "data": { "object": {
            "id": "sub_9",
            "status": "past_due",
            "metadata": { "userId": "user_lifecycle" }
        }}
    }));
    processor.process(past_due).await.unwrap();
    let status: String = sqlx::query_scalar(
        "SELECT subscription_status FROM accounts WHERE user_id = 'user_lifecycle'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(status, "expired");

    let deleted = PaymentEvent::from_payload(&json!({
        "type": "customer.subscription.deleted",
        "data": { "object": {
            "id": "sub_9",
            "status": "canceled",
            "metadata": { "userId": "user_lifecycle" }
        }}
    }));
    let outcome = processor.process(deleted).await.unwrap();
    assert_eq!(outcome, ProcessOutcome::SubscriptionSynced);

    let (status, sub_ref): (String, Option<String>) = sqlx::query_as(
        "SELECT subscription_status, payment_subscription_ref FROM accounts WHERE user_id = 'user_lifecycle'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(status, "cancelled");
    assert_eq!(sub_ref, None);
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn unknown_event_kinds_are_ignored(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();

    let event = PaymentEvent::from_payload(&json!({
        "type": "charge.refunded",
        "data": { "object": { "id": "ch_1" } }
    }));
    let outcome = PaymentEventProcessor::new(pool.clone())
        .process(event)
        .await
        .unwrap();
    assert_eq!(outcome, ProcessOutcome::Ignored);
    assert_eq!(event_count(&pool).await, 0);
}
