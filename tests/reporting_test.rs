mod common;

use anyhow::Result;
use common::{Household, date, session_for, test_service};
use fintrack::application::{AppError, TransactionFilter};
use fintrack::domain::{NewTransaction, TransactionType};

#[tokio::test]
async fn test_listing_is_newest_first_with_names() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let session = session_for(&service, "alice@example.com").await?;
    let home = Household::create(&service, &session, 500000).await?;

    service
        .add_transaction(
            &session,
            NewTransaction::expense(home.checking.id, 1000, date("2024-03-01"))
                .with_description("oldest"),
        )
        .await?;
    service
        .add_transaction(
            &session,
            NewTransaction::expense(home.checking.id, 2000, date("2024-03-05"))
                .with_category(home.groceries.id)
                .with_merchant(home.supermarket.id)
                .with_description("same day, first"),
        )
        .await?;
    service
        .add_transaction(
            &session,
            NewTransaction::income(home.checking.id, 3000, date("2024-03-05"))
                .with_description("same day, second"),
        )
        .await?;

    let rows = service.list_transactions(&session, 100, 0).await?;
    let descriptions: Vec<_> = rows
        .iter()
        .map(|r| r.description.as_deref().unwrap())
        .collect();
    assert_eq!(
        descriptions,
        vec!["same day, second", "same day, first", "oldest"]
    );

    // Names come from the joins, missing references stay empty
    assert_eq!(rows[1].account_name.as_deref(), Some("Checking"));
    assert_eq!(rows[1].category_name.as_deref(), Some("Groceries"));
    assert_eq!(rows[1].merchant_name.as_deref(), Some("Local Supermarket"));
    assert_eq!(rows[1].signed_amount(), -2000);
    assert_eq!(rows[0].category_name, None);
    assert_eq!(rows[0].merchant_name, None);
    assert_eq!(rows[0].signed_amount(), 3000);

    Ok(())
}

#[tokio::test]
async fn test_listing_pagination_and_filters() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let session = session_for(&service, "alice@example.com").await?;
    let home = Household::create(&service, &session, 500000).await?;

    for day in 1..=5 {
        service
            .add_transaction(
                &session,
                NewTransaction::expense(home.checking.id, 100 * day, date("2024-03-01"))
                    .with_description(format!("expense {}", day)),
            )
            .await?;
    }
    service
        .add_transaction(
            &session,
            NewTransaction::income(home.checking.id, 9999, date("2024-02-01")),
        )
        .await?;

    let first_page = service.list_transactions(&session, 2, 0).await?;
    let second_page = service.list_transactions(&session, 2, 2).await?;
    let past_end = service.list_transactions(&session, 2, 6).await?;
    assert_eq!(first_page.len(), 2);
    assert_eq!(second_page.len(), 2);
    assert!(past_end.is_empty());
    assert_eq!(first_page[0].amount, 500);
    assert_eq!(second_page[0].amount, 300);

    let incomes = service
        .list_transactions_filtered(
            &session,
            &TransactionFilter {
                txn_type: Some(TransactionType::Income),
                ..TransactionFilter::default()
            },
        )
        .await?;
    assert_eq!(incomes.len(), 1);
    assert_eq!(incomes[0].amount, 9999);

    let by_account = service
        .list_transactions_filtered(
            &session,
            &TransactionFilter {
                account_id: Some(home.checking.id),
                ..TransactionFilter::default()
            },
        )
        .await?;
    assert_eq!(by_account.len(), 6);

    Ok(())
}

#[tokio::test]
async fn test_spending_by_category_bounds_are_inclusive() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let session = session_for(&service, "alice@example.com").await?;
    let home = Household::create(&service, &session, 500000).await?;

    let expenses = [
        (home.groceries.id, 1000, "2024-02-29"),
        (home.groceries.id, 2000, "2024-03-01"),
        (home.dining.id, 4000, "2024-03-15"),
        (home.groceries.id, 500, "2024-03-31"),
        (home.dining.id, 7000, "2024-04-01"),
    ];
    for (category_id, amount, day) in expenses {
        service
            .add_transaction(
                &session,
                NewTransaction::expense(home.checking.id, amount, date(day))
                    .with_category(category_id),
            )
            .await?;
    }
    // Income and uncategorized expenses never count
    service
        .add_transaction(
            &session,
            NewTransaction::income(home.checking.id, 50000, date("2024-03-10"))
                .with_category(home.salary.id),
        )
        .await?;
    service
        .add_transaction(
            &session,
            NewTransaction::expense(home.checking.id, 800, date("2024-03-10")),
        )
        .await?;

    let march = service
        .spending_by_category(&session, Some(date("2024-03-01")), Some(date("2024-03-31")))
        .await?;
    assert_eq!(march.len(), 2);
    assert_eq!(march[0].category, "Dining");
    assert_eq!(march[0].total, 4000);
    assert_eq!(march[0].count, 1);
    assert_eq!(march[1].category, "Groceries");
    assert_eq!(march[1].total, 2500);
    assert_eq!(march[1].count, 2);

    let all_time = service.spending_by_category(&session, None, None).await?;
    assert_eq!(all_time[0].category, "Dining");
    assert_eq!(all_time[0].total, 11000);
    assert_eq!(all_time[1].total, 3500);

    let from_only = service
        .spending_by_category(&session, Some(date("2024-03-31")), None)
        .await?;
    let total: i64 = from_only.iter().map(|r| r.total).sum();
    assert_eq!(total, 7500);

    let err = service
        .spending_by_category(&session, Some(date("2024-04-01")), Some(date("2024-03-01")))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidDateRange { .. }));

    Ok(())
}

#[tokio::test]
async fn test_monthly_summary_groups_by_calendar_month() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let session = session_for(&service, "alice@example.com").await?;
    let home = Household::create(&service, &session, 500000).await?;

    let rows = [
        (TransactionType::Income, 350000, "2024-03-01"),
        (TransactionType::Expense, 120000, "2024-03-31"),
        (TransactionType::Expense, 4575, "2024-03-15"),
        (TransactionType::Transfer, 10000, "2024-03-20"),
        (TransactionType::Expense, 99999, "2024-04-01"),
        (TransactionType::Income, 1, "2023-03-15"),
    ];
    for (txn_type, amount, day) in rows {
        service
            .add_transaction(
                &session,
                NewTransaction::new(home.checking.id, txn_type, amount, date(day)),
            )
            .await?;
    }

    let summary = service.monthly_summary(&session, 2024, 3).await?;
    assert_eq!(summary.income(), 350000);
    assert_eq!(summary.expense(), 124575);
    assert_eq!(summary.total(TransactionType::Transfer), 10000);
    assert_eq!(summary.net(), 225425);

    let empty = service.monthly_summary(&session, 2024, 5).await?;
    assert!(empty.totals.is_empty());
    assert_eq!(empty.net(), 0);

    for month in [0, 13] {
        assert!(matches!(
            service.monthly_summary(&session, 2024, month).await,
            Err(AppError::InvalidMonth { .. })
        ));
    }

    Ok(())
}

#[tokio::test]
async fn test_merchant_daily_and_period_reports() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let session = session_for(&service, "alice@example.com").await?;
    let home = Household::create(&service, &session, 500000).await?;

    let rows = [
        (Some(home.supermarket.id), 15050, "2024-03-02"),
        (Some(home.restaurant.id), 4575, "2024-03-02"),
        (Some(home.supermarket.id), 9000, "2024-03-04"),
        (None, 120000, "2024-03-05"),
    ];
    for (merchant_id, amount, day) in rows {
        let mut new = NewTransaction::expense(home.checking.id, amount, date(day));
        if let Some(id) = merchant_id {
            new = new.with_merchant(id);
        }
        service.add_transaction(&session, new).await?;
    }
    service
        .add_transaction(
            &session,
            NewTransaction::income(home.checking.id, 350000, date("2024-03-03")),
        )
        .await?;

    let merchants = service
        .spending_by_merchant(&session, None, None, 10)
        .await?;
    assert_eq!(merchants.len(), 2);
    assert_eq!(merchants[0].merchant, "Local Supermarket");
    assert_eq!(merchants[0].total, 24050);
    assert_eq!(merchants[0].count, 2);
    assert_eq!(merchants[1].merchant, "Restaurant");

    let top_one = service
        .spending_by_merchant(&session, None, None, 1)
        .await?;
    assert_eq!(top_one.len(), 1);

    let daily = service
        .daily_spending(&session, date("2024-03-01"), date("2024-03-04"))
        .await?;
    assert_eq!(daily.len(), 2);
    assert_eq!(daily[0].date, date("2024-03-02"));
    assert_eq!(daily[0].total, 19625);
    assert_eq!(daily[1].date, date("2024-03-04"));
    assert_eq!(daily[1].total, 9000);

    let totals = service
        .period_totals(&session, date("2024-03-01"), date("2024-03-31"))
        .await?;
    assert_eq!(totals.income, 350000);
    assert_eq!(totals.expense, 148625);
    assert_eq!(totals.net, 201375);

    Ok(())
}

#[tokio::test]
async fn test_dashboard_combines_balances_and_month() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let session = session_for(&service, "alice@example.com").await?;
    let home = Household::create(&service, &session, 500000).await?;
    service
        .add_account(
            &session,
            "Savings",
            fintrack::domain::AccountType::Savings,
            1500000,
            None,
        )
        .await?;

    service
        .add_transaction(
            &session,
            NewTransaction::expense(home.checking.id, 15050, date("2024-03-02"))
                .with_category(home.groceries.id),
        )
        .await?;
    service
        .add_transaction(
            &session,
            NewTransaction::expense(home.checking.id, 4000, date("2024-02-27"))
                .with_category(home.dining.id),
        )
        .await?;
    service
        .add_transaction(
            &session,
            NewTransaction::income(home.checking.id, 350000, date("2024-03-01")),
        )
        .await?;

    let dashboard = service.dashboard(&session, date("2024-03-10")).await?;
    assert_eq!(dashboard.total_balance, 500000 + 1500000 - 15050 - 4000 + 350000);
    assert_eq!(dashboard.accounts.len(), 2);
    assert_eq!(dashboard.month.income(), 350000);
    assert_eq!(dashboard.month.expense(), 15050);
    assert_eq!(dashboard.spending_by_category.len(), 1);
    assert_eq!(dashboard.spending_by_category[0].category, "Groceries");
    assert_eq!(dashboard.recent_transactions.len(), 3);

    Ok(())
}
