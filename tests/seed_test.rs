mod common;

use anyhow::Result;
use common::{date, test_service};
use fintrack::application::{AppError, SAMPLE_USER_EMAIL};

#[tokio::test]
async fn test_seed_creates_consistent_sample_data() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let today = date("2024-03-31");

    assert!(service.seed_sample_data(today).await?);
    let session = service.open_session(SAMPLE_USER_EMAIL).await?;
    assert_eq!(session.display_name(), "Test User");

    assert_eq!(service.list_categories(&session, None).await?.len(), 10);
    assert_eq!(service.list_merchants(&session).await?.len(), 10);
    assert_eq!(service.list_transactions(&session, 100, 0).await?.len(), 9);

    let checking = service.get_account_by_name(&session, "Main Checking").await?;
    assert_eq!(checking.opening_balance, 500000);
    assert_eq!(checking.balance, 681402);
    let card = service.get_account_by_name(&session, "Credit Card").await?;
    assert_eq!(card.balance, -120000);
    assert!(card.is_overdrawn());

    assert!(service.check_integrity(&session).await?.is_consistent());

    Ok(())
}

#[tokio::test]
async fn test_seed_is_idempotent() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let today = date("2024-03-31");

    assert!(service.seed_sample_data(today).await?);
    assert!(!service.seed_sample_data(today).await?);

    let session = service.open_session(SAMPLE_USER_EMAIL).await?;
    assert_eq!(service.list_accounts(&session).await?.len(), 3);
    assert_eq!(service.list_transactions(&session, 100, 0).await?.len(), 9);

    Ok(())
}

#[tokio::test]
async fn test_failed_seed_leaves_nothing_behind() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let today = date("2024-03-31");
    let pool = service.repository().pool();

    // Fail partway through, after the user, categories and accounts exist
    sqlx::query(
        "CREATE TRIGGER block_merchants BEFORE INSERT ON merchants \
         BEGIN SELECT RAISE(ABORT, 'merchants blocked'); END",
    )
    .execute(pool)
    .await?;
    assert!(service.seed_sample_data(today).await.is_err());
    assert!(matches!(
        service.open_session(SAMPLE_USER_EMAIL).await,
        Err(AppError::UserNotFound(_))
    ));
    let (leftover_accounts,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM accounts")
        .fetch_one(pool)
        .await?;
    assert_eq!(leftover_accounts, 0);

    // Once the cause is gone a rerun seeds everything
    sqlx::query("DROP TRIGGER block_merchants")
        .execute(pool)
        .await?;
    assert!(service.seed_sample_data(today).await?);

    let session = service.open_session(SAMPLE_USER_EMAIL).await?;
    assert_eq!(service.list_categories(&session, None).await?.len(), 10);
    assert_eq!(service.list_accounts(&session).await?.len(), 3);
    assert_eq!(service.list_merchants(&session).await?.len(), 10);
    assert_eq!(service.list_transactions(&session, 100, 0).await?.len(), 9);

    Ok(())
}
