mod common;

use anyhow::Result;
use common::{Household, balance_of, date, session_for, test_service};
use fintrack::domain::NewTransaction;

#[tokio::test]
async fn test_fresh_ledger_is_consistent() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let session = session_for(&service, "alice@example.com").await?;
    let home = Household::create(&service, &session, 500000).await?;

    service
        .add_transaction(
            &session,
            NewTransaction::expense(home.checking.id, 15050, date("2024-03-02")),
        )
        .await?;

    let report = service.check_integrity(&session).await?;
    assert!(report.is_consistent());
    assert_eq!(report.accounts_checked, 1);
    assert_eq!(report.transactions_checked, 1);
    assert_eq!(service.repair_balances(&session).await?, 0);

    Ok(())
}

#[tokio::test]
async fn test_drifted_balance_is_detected_and_repaired() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let session = session_for(&service, "alice@example.com").await?;
    let home = Household::create(&service, &session, 500000).await?;

    service
        .add_transaction(
            &session,
            NewTransaction::expense(home.checking.id, 15050, date("2024-03-02")),
        )
        .await?;
    service
        .add_transaction(
            &session,
            NewTransaction::income(home.checking.id, 2000, date("2024-03-03")),
        )
        .await?;

    // Tamper with the stored balance behind the ledger's back
    sqlx::query("UPDATE accounts SET balance_cents = 1 WHERE id = ?")
        .bind(home.checking.id.to_string())
        .execute(service.repository().pool())
        .await?;

    let report = service.check_integrity(&session).await?;
    assert!(!report.is_consistent());
    assert_eq!(report.drifts.len(), 1);
    let drift = &report.drifts[0];
    assert_eq!(drift.account_id, home.checking.id);
    assert_eq!(drift.stored, 1);
    assert_eq!(drift.computed, 486950);

    assert_eq!(service.repair_balances(&session).await?, 1);
    assert_eq!(balance_of(&service, &session, &home.checking).await?, 486950);
    assert!(service.check_integrity(&session).await?.is_consistent());

    Ok(())
}

#[tokio::test]
async fn test_repair_only_touches_own_accounts() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let alice = session_for(&service, "alice@example.com").await?;
    let bob = session_for(&service, "bob@example.com").await?;
    let alice_home = Household::create(&service, &alice, 1000).await?;
    let bob_home = Household::create(&service, &bob, 2000).await?;

    sqlx::query("UPDATE accounts SET balance_cents = balance_cents + 5")
        .execute(service.repository().pool())
        .await?;

    assert_eq!(service.repair_balances(&alice).await?, 1);
    assert_eq!(balance_of(&service, &alice, &alice_home.checking).await?, 1000);
    assert_eq!(balance_of(&service, &bob, &bob_home.checking).await?, 2005);
    assert!(!service.check_integrity(&bob).await?.is_consistent());

    Ok(())
}
