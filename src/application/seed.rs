use std::collections::HashMap;

use chrono::{Duration, NaiveDate};

use crate::domain::{AccountType, CategoryKind, NewTransaction, TransactionType};

use super::{AppError, LedgerService, Session};

/// Email of the sample user created on first run.
pub const SAMPLE_USER_EMAIL: &str = "test@example.com";
const SAMPLE_USER_NAME: &str = "Test User";
const SAMPLE_USER_PASSWORD: &str = "password";

const SAMPLE_CATEGORIES: [(&str, CategoryKind); 10] = [
    ("Groceries", CategoryKind::Expense),
    ("Salary", CategoryKind::Income),
    ("Rent", CategoryKind::Expense),
    ("Utilities", CategoryKind::Expense),
    ("Entertainment", CategoryKind::Expense),
    ("Transportation", CategoryKind::Expense),
    ("Dining", CategoryKind::Expense),
    ("Shopping", CategoryKind::Expense),
    ("Healthcare", CategoryKind::Expense),
    ("Education", CategoryKind::Expense),
];

const SAMPLE_ACCOUNTS: [(&str, AccountType, i64); 3] = [
    ("Main Checking", AccountType::Checking, 500000),
    ("Savings Account", AccountType::Savings, 1500000),
    ("Credit Card", AccountType::CreditCard, -120000),
];

const SAMPLE_MERCHANTS: [&str; 10] = [
    "Walmart",
    "Amazon",
    "Netflix",
    "Electric Company",
    "Local Supermarket",
    "Gas Station",
    "Restaurant",
    "Pharmacy",
    "Book Store",
    "Employer Inc.",
];

struct SampleTransaction {
    category: &'static str,
    merchant: Option<&'static str>,
    txn_type: TransactionType,
    amount: i64,
    days_ago: i64,
    description: &'static str,
}

const SAMPLE_TRANSACTIONS: [SampleTransaction; 9] = [
    SampleTransaction {
        category: "Groceries",
        merchant: Some("Local Supermarket"),
        txn_type: TransactionType::Expense,
        amount: 15050,
        days_ago: 2,
        description: "Weekly grocery shopping",
    },
    SampleTransaction {
        category: "Dining",
        merchant: Some("Restaurant"),
        txn_type: TransactionType::Expense,
        amount: 4575,
        days_ago: 5,
        description: "Dinner with friends",
    },
    SampleTransaction {
        category: "Salary",
        merchant: Some("Employer Inc."),
        txn_type: TransactionType::Income,
        amount: 350000,
        days_ago: 10,
        description: "Monthly salary",
    },
    SampleTransaction {
        category: "Utilities",
        merchant: Some("Electric Company"),
        txn_type: TransactionType::Expense,
        amount: 12000,
        days_ago: 15,
        description: "Electric bill",
    },
    SampleTransaction {
        category: "Entertainment",
        merchant: Some("Netflix"),
        txn_type: TransactionType::Expense,
        amount: 1599,
        days_ago: 20,
        description: "Netflix subscription",
    },
    SampleTransaction {
        category: "Transportation",
        merchant: Some("Gas Station"),
        txn_type: TransactionType::Expense,
        amount: 3525,
        days_ago: 22,
        description: "Gas fill-up",
    },
    SampleTransaction {
        category: "Shopping",
        merchant: Some("Amazon"),
        txn_type: TransactionType::Expense,
        amount: 8999,
        days_ago: 25,
        description: "Amazon purchase",
    },
    SampleTransaction {
        category: "Healthcare",
        merchant: Some("Pharmacy"),
        txn_type: TransactionType::Expense,
        amount: 2850,
        days_ago: 28,
        description: "Prescription refill",
    },
    SampleTransaction {
        category: "Rent",
        merchant: None,
        txn_type: TransactionType::Expense,
        amount: 120000,
        days_ago: 30,
        description: "Monthly rent",
    },
];

impl LedgerService {
    /// Create the sample user with categories, accounts, merchants and a
    /// month of transactions dated relative to `today`.
    ///
    /// Does nothing if the sample user already exists. Returns whether data
    /// was created. Sample transactions go through [`LedgerService::add_transaction`],
    /// so seeded balances already include their effects. If any step fails
    /// the sample user and everything created for it are removed again, so a
    /// later run starts from scratch.
    pub async fn seed_sample_data(&self, today: NaiveDate) -> Result<bool, AppError> {
        if self
            .repository()
            .get_user_by_email(SAMPLE_USER_EMAIL)
            .await?
            .is_some()
        {
            tracing::debug!("sample data already present");
            return Ok(false);
        }

        let user = self
            .create_user(SAMPLE_USER_EMAIL, SAMPLE_USER_NAME, SAMPLE_USER_PASSWORD)
            .await?;
        let session = Session::from(&user);

        if let Err(err) = self.populate_sample_data(&session, today).await {
            tracing::warn!(error = %err, "seeding failed, removing partial sample data");
            self.repository().delete_user_data(user.id).await?;
            return Err(err);
        }

        tracing::info!(user_id = %user.id, "seeded sample data");
        Ok(true)
    }

    async fn populate_sample_data(
        &self,
        session: &Session,
        today: NaiveDate,
    ) -> Result<(), AppError> {
        let mut categories = HashMap::new();
        for (name, kind) in SAMPLE_CATEGORIES {
            let category = self.add_category(session, name, kind).await?;
            categories.insert(name, category.id);
        }

        let mut checking = None;
        for (name, account_type, opening) in SAMPLE_ACCOUNTS {
            let account = self
                .add_account(session, name, account_type, opening, None)
                .await?;
            checking.get_or_insert(account.id);
        }
        let checking = checking.ok_or_else(|| anyhow::anyhow!("no sample account created"))?;

        let mut merchants = HashMap::new();
        for name in SAMPLE_MERCHANTS {
            let merchant = self.add_merchant(session, name).await?;
            merchants.insert(name, merchant.id);
        }

        for sample in &SAMPLE_TRANSACTIONS {
            let mut new = NewTransaction::new(
                checking,
                sample.txn_type,
                sample.amount,
                today - Duration::days(sample.days_ago),
            )
            .with_description(sample.description);
            if let Some(id) = categories.get(sample.category) {
                new = new.with_category(*id);
            }
            if let Some(id) = sample.merchant.and_then(|m| merchants.get(m)) {
                new = new.with_merchant(*id);
            }
            self.add_transaction(session, new).await?;
        }
        Ok(())
    }
}
