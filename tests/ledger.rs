use backend::ledger::{CreditLedgerService, LedgerError, LedgerStore};
use sqlx::PgPool;
use uuid::Uuid;

async fn seed_account(pool: &PgPool, user_id: &str, trial: i32) {
    LedgerStore::new(pool.clone())
        .create_account(user_id, trial)
        .await
        .unwrap();
}

async fn insert_grant_at(
    pool: &PgPool,
    user_id: &str,
    amount: i32,
    category: &str,
    allocated_at: &str,
) -> Uuid {
    sqlx::query_scalar(
        r#"
        INSERT INTO credit_grants (id, user_id, allocated, remaining, category, allocated_at)
        VALUES ($1, $2, $3, $3, $4, $5::timestamptz)
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(amount)
    .bind(category)
    .bind(allocated_at)
    .fetch_one(pool)
    .await
    .unwrap()
}

async fn grant_remaining(pool: &PgPool, grant_id: Uuid) -> i32 {
    sqlx::query_scalar("SELECT remaining FROM credit_grants WHERE id = $1")
        .bind(grant_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn account_creation_is_idempotent(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();

    let store = LedgerStore::new(pool.clone());
    let (first, created) = store.create_account("user_sign", 3).await.unwrap();
    assert!(created);
    assert_eq!(first.credits, 3);

    // Redelivered signup event: no second account, no second trial grant.
    let (second, created_again) = store.create_account("user_sign", 3).await.unwrap();
    assert!(!created_again);
    assert_eq!(second.credits, 3);

    let grants: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM credit_grants WHERE user_id = 'user_sign'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(grants, 1);

    // Bootstrap is all-or-nothing: the account row, trial grant and cached
    // balance land in one commit.
    let (cached, category): (i32, String) = sqlx::query_as(
        r#"
        SELECT a.credits, g.category
        FROM accounts a JOIN credit_grants g ON g.user_id = a.user_id
        WHERE a.user_id = 'user_sign'
        "#,
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(cached, 3);
    assert_eq!(category, "trial");
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn deduct_consumes_oldest_grant_first(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    seed_account(&pool, "user_fifo", 0).await;

    let older = insert_grant_at(&pool, "user_fifo", 1, "trial", "2024-01-01T00:00:00Z").await;
    let newer =
        insert_grant_at(&pool, "user_fifo", 5, "one_time_pro", "2024-06-01T00:00:00Z").await;

    let ledger = CreditLedgerService::new(pool.clone());
    let balance = ledger.deduct_one("user_fifo").await.unwrap();

    assert_eq!(balance, 5);
    assert_eq!(grant_remaining(&pool, older).await, 0);
    assert_eq!(grant_remaining(&pool, newer).await, 5);
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn equal_timestamps_fall_back_to_insertion_order(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    seed_account(&pool, "user_tie", 0).await;

    let ts = "2024-03-01T12:00:00Z";
    let mut ids: Vec<Uuid> = vec![
        insert_grant_at(&pool, "user_tie", 2, "trial", ts).await,
        insert_grant_at(&pool, "user_tie", 2, "one_time_starter", ts).await,
    ];
    ids.sort();

    let ledger = CreditLedgerService::new(pool.clone());
    ledger.deduct_one("user_tie").await.unwrap();

    // Lowest id wins when allocation timestamps collide.
    assert_eq!(grant_remaining(&pool, ids[0]).await, 1);
    assert_eq!(grant_remaining(&pool, ids[1]).await, 2);
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn deduct_on_empty_account_fails_without_mutation(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    seed_account(&pool, "user_empty", 0).await;

    let ledger = CreditLedgerService::new(pool.clone());
    let err = ledger.deduct_one("user_empty").await.unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientCredits));
    assert_eq!(ledger.balance("user_empty").await.unwrap(), 0);
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn interleaved_grants_and_deductions_balance_out(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    seed_account(&pool, "user_mix", 3).await;

    let ledger = CreditLedgerService::new(pool.clone());
    ledger.deduct_one("user_mix").await.unwrap();
    ledger
        .grant("user_mix", 30, "one_time_starter", Some("pi_1"), None)
        .await
        .unwrap();
    ledger.deduct_one("user_mix").await.unwrap();
    ledger.deduct_one("user_mix").await.unwrap();

    // 3 + 30 granted, 3 deducted.
    assert_eq!(ledger.balance("user_mix").await.unwrap(), 30);

    let cached: i32 = sqlx::query_scalar("SELECT credits FROM accounts WHERE user_id = 'user_mix'")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(cached, 30);
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn concurrent_deductions_never_overdraw(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    seed_account(&pool, "user_race", 5).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let ledger = CreditLedgerService::new(pool.clone());
        handles.push(tokio::spawn(async move {
            ledger.deduct_one("user_race").await
        }));
    }

    let mut successes = 0;
    let mut insufficient = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(LedgerError::InsufficientCredits) => insufficient += 1,
            Err(err) => panic!("unexpected error: {err}"),
        }
    }

    assert_eq!(successes, 5);
    assert_eq!(insufficient, 3);

    let ledger = CreditLedgerService::new(pool.clone());
    assert_eq!(ledger.balance("user_race").await.unwrap(), 0);

    let negative: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM credit_grants WHERE remaining < 0")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(negative, 0);
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn store_decrement_is_conditional(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    seed_account(&pool, "user_cond", 0).await;
    let grant = insert_grant_at(&pool, "user_cond", 1, "trial", "2024-01-01T00:00:00Z").await;

    let store = LedgerStore::new(pool.clone());
    assert_eq!(store.decrement_grant_remaining(grant, 1).await.unwrap(), 0);

    let err = store.decrement_grant_remaining(grant, 1).await.unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientGrantBalance(id) if id == grant));
    assert_eq!(grant_remaining(&pool, grant).await, 0);
}
