// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use chrono::NaiveDate;
use fintrack::application::{LedgerService, Session};
use fintrack::domain::{Account, AccountType, Category, CategoryKind, Merchant};
use tempfile::TempDir;

/// Helper to create a test service with a temporary database.
/// Uses the cheapest bcrypt cost so user creation stays fast.
pub async fn test_service() -> Result<(LedgerService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let service = LedgerService::init(db_path.to_str().unwrap())
        .await?
        .with_password_cost(4);
    Ok((service, temp_dir))
}

/// Register a user and open a session for them
pub async fn session_for(service: &LedgerService, email: &str) -> Result<Session> {
    service.create_user(email, "Test Person", "secret").await?;
    Ok(service.open_session(email).await?)
}

/// Helper to parse a date string into NaiveDate
pub fn date(date_str: &str) -> NaiveDate {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d").unwrap()
}

/// Test fixture: one account, a few categories and merchants
pub struct Household {
    pub checking: Account,
    pub groceries: Category,
    pub dining: Category,
    pub salary: Category,
    pub supermarket: Merchant,
    pub restaurant: Merchant,
}

impl Household {
    /// Create the fixture with a checking account opened at `opening` cents
    pub async fn create(
        service: &LedgerService,
        session: &Session,
        opening: i64,
    ) -> Result<Self> {
        let checking = service
            .add_account(session, "Checking", AccountType::Checking, opening, None)
            .await?;
        let groceries = service
            .add_category(session, "Groceries", CategoryKind::Expense)
            .await?;
        let dining = service
            .add_category(session, "Dining", CategoryKind::Expense)
            .await?;
        let salary = service
            .add_category(session, "Salary", CategoryKind::Income)
            .await?;
        let supermarket = service.add_merchant(session, "Local Supermarket").await?;
        let restaurant = service.add_merchant(session, "Restaurant").await?;

        Ok(Self {
            checking,
            groceries,
            dining,
            salary,
            supermarket,
            restaurant,
        })
    }
}

/// Current stored balance of an account
pub async fn balance_of(
    service: &LedgerService,
    session: &Session,
    account: &Account,
) -> Result<i64> {
    Ok(service.get_account(session, account.id).await?.balance)
}
