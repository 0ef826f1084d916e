use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::application::{
    CategorySpending, DailySpending, MerchantSpending, TransactionFilter, TransactionListing,
};
use crate::domain::{
    Account, AccountId, BalanceCheck, Category, CategoryId, CategoryKind, Cents, Merchant,
    MerchantId, NewTransaction, Transaction, TransactionId, TransactionType, User, UserId,
};

use super::MIGRATION_001_INITIAL;

/// Signed balance effect of a row aliased `t`, mirroring
/// [`TransactionType::balance_effect`].
const EFFECT_SQL: &str = "CASE t.txn_type \
    WHEN 'income' THEN t.amount_cents \
    WHEN 'expense' THEN -t.amount_cents \
    ELSE 0 END";

const TRANSACTION_COLUMNS: &str = "id, user_id, account_id, category_id, merchant_id, txn_type, \
    amount_cents, currency, txn_date, description, notes, created_at";

/// Why a guarded delete did or did not remove a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
    /// Still referenced by this many transactions
    Referenced(i64),
}

impl DeleteOutcome {
    pub fn is_deleted(&self) -> bool {
        matches!(self, DeleteOutcome::Deleted)
    }
}

/// Result of recording a transaction together with its balance update.
#[derive(Debug, Clone)]
pub enum RecordOutcome {
    Recorded(Transaction),
    AccountNotFound,
    CategoryNotFound,
    MerchantNotFound,
    /// The new balance would not fit in `Cents`; nothing was written.
    BalanceOverflow,
}

/// Result of deleting a transaction together with its balance reversal.
#[derive(Debug, Clone)]
pub enum RemoveOutcome {
    Removed(Transaction),
    NotFound,
    BalanceOverflow,
}

/// Repository for persisting and querying the ledger.
///
/// Every method takes the owning user's id and never touches rows that
/// belong to someone else.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database URL.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Run database migrations. Safe to run on every start.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize a database (connect + migrate).
    pub async fn init(database_url: &str) -> Result<Self> {
        let repo = Self::connect(database_url).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    /// The underlying pool, for maintenance tasks outside the ledger API.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ========================
    // User operations
    // ========================

    pub async fn save_user(&self, user: &User) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, full_name, password_hash, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(user.id.to_string())
        .bind(&user.email)
        .bind(&user.full_name)
        .bind(&user.password_hash)
        .bind(format_timestamp(&user.created_at))
        .execute(&self.pool)
        .await
        .context("Failed to save user")?;
        Ok(())
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query(
            "SELECT id, email, full_name, password_hash, created_at FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch user by email")?;

        row.as_ref().map(Self::row_to_user).transpose()
    }

    /// Remove a user and every row they own in one unit of work.
    pub async fn delete_user_data(&self, user_id: UserId) -> Result<()> {
        let user_id = user_id.to_string();
        let mut tx = self.pool.begin().await?;

        // Children before parents so no foreign key is left dangling
        for table in ["transactions", "merchants", "categories", "accounts"] {
            sqlx::query(&format!("DELETE FROM {table} WHERE user_id = ?"))
                .bind(&user_id)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("Failed to delete {} of user", table))?;
        }
        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(&user_id)
            .execute(&mut *tx)
            .await
            .context("Failed to delete user")?;

        tx.commit()
            .await
            .context("Failed to commit transaction")?;
        Ok(())
    }

    fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
        Ok(User {
            id: parse_id(row, "id")?,
            email: row.get("email"),
            full_name: row.get("full_name"),
            password_hash: row.get("password_hash"),
            created_at: parse_timestamp(row, "created_at")?,
        })
    }

    // ========================
    // Account operations
    // ========================

    pub async fn save_account(&self, account: &Account) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO accounts (id, user_id, name, account_type, opening_balance_cents, balance_cents, currency, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(account.id.to_string())
        .bind(account.user_id.to_string())
        .bind(&account.name)
        .bind(account.account_type.as_str())
        .bind(account.opening_balance)
        .bind(account.balance)
        .bind(&account.currency)
        .bind(format_timestamp(&account.created_at))
        .execute(&self.pool)
        .await
        .context("Failed to save account")?;
        Ok(())
    }

    pub async fn get_account(&self, user_id: UserId, id: AccountId) -> Result<Option<Account>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, name, account_type, opening_balance_cents, balance_cents, currency, created_at
            FROM accounts
            WHERE id = ? AND user_id = ?
            "#,
        )
        .bind(id.to_string())
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch account")?;

        row.as_ref().map(Self::row_to_account).transpose()
    }

    pub async fn get_account_by_name(&self, user_id: UserId, name: &str) -> Result<Option<Account>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, name, account_type, opening_balance_cents, balance_cents, currency, created_at
            FROM accounts
            WHERE name = ? AND user_id = ?
            "#,
        )
        .bind(name)
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch account by name")?;

        row.as_ref().map(Self::row_to_account).transpose()
    }

    pub async fn list_accounts(&self, user_id: UserId) -> Result<Vec<Account>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, name, account_type, opening_balance_cents, balance_cents, currency, created_at
            FROM accounts
            WHERE user_id = ?
            ORDER BY name
            "#,
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list accounts")?;

        rows.iter().map(Self::row_to_account).collect()
    }

    pub async fn delete_account(&self, user_id: UserId, id: AccountId) -> Result<DeleteOutcome> {
        self.delete_unreferenced("accounts", "account_id", user_id, id)
            .await
            .context("Failed to delete account")
    }

    fn row_to_account(row: &sqlx::sqlite::SqliteRow) -> Result<Account> {
        let account_type: String = row.get("account_type");

        Ok(Account {
            id: parse_id(row, "id")?,
            user_id: parse_id(row, "user_id")?,
            name: row.get("name"),
            account_type: account_type.parse().map_err(anyhow::Error::msg)?,
            opening_balance: row.get("opening_balance_cents"),
            balance: row.get("balance_cents"),
            currency: row.get("currency"),
            created_at: parse_timestamp(row, "created_at")?,
        })
    }

    // ========================
    // Category operations
    // ========================

    pub async fn save_category(&self, category: &Category) -> Result<()> {
        sqlx::query(
            "INSERT INTO categories (id, user_id, name, kind, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(category.id.to_string())
        .bind(category.user_id.to_string())
        .bind(&category.name)
        .bind(category.kind.as_str())
        .bind(format_timestamp(&category.created_at))
        .execute(&self.pool)
        .await
        .context("Failed to save category")?;
        Ok(())
    }

    pub async fn get_category_by_name(
        &self,
        user_id: UserId,
        name: &str,
    ) -> Result<Option<Category>> {
        let row = sqlx::query(
            "SELECT id, user_id, name, kind, created_at FROM categories WHERE name = ? AND user_id = ?",
        )
        .bind(name)
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch category by name")?;

        row.as_ref().map(Self::row_to_category).transpose()
    }

    /// List categories, optionally only those of one kind.
    pub async fn list_categories(
        &self,
        user_id: UserId,
        kind: Option<CategoryKind>,
    ) -> Result<Vec<Category>> {
        let mut query = String::from(
            "SELECT id, user_id, name, kind, created_at FROM categories WHERE user_id = ?",
        );
        if kind.is_some() {
            query.push_str(" AND kind = ?");
        }
        query.push_str(" ORDER BY name");

        let mut sql_query = sqlx::query(&query).bind(user_id.to_string());
        if let Some(kind) = kind {
            sql_query = sql_query.bind(kind.as_str());
        }

        let rows = sql_query
            .fetch_all(&self.pool)
            .await
            .context("Failed to list categories")?;

        rows.iter().map(Self::row_to_category).collect()
    }

    pub async fn delete_category(&self, user_id: UserId, id: CategoryId) -> Result<DeleteOutcome> {
        self.delete_unreferenced("categories", "category_id", user_id, id)
            .await
            .context("Failed to delete category")
    }

    fn row_to_category(row: &sqlx::sqlite::SqliteRow) -> Result<Category> {
        let kind: String = row.get("kind");

        Ok(Category {
            id: parse_id(row, "id")?,
            user_id: parse_id(row, "user_id")?,
            name: row.get("name"),
            kind: kind.parse().map_err(anyhow::Error::msg)?,
            created_at: parse_timestamp(row, "created_at")?,
        })
    }

    // ========================
    // Merchant operations
    // ========================

    pub async fn save_merchant(&self, merchant: &Merchant) -> Result<()> {
        sqlx::query("INSERT INTO merchants (id, user_id, name, created_at) VALUES (?, ?, ?, ?)")
            .bind(merchant.id.to_string())
            .bind(merchant.user_id.to_string())
            .bind(&merchant.name)
            .bind(format_timestamp(&merchant.created_at))
            .execute(&self.pool)
            .await
            .context("Failed to save merchant")?;
        Ok(())
    }

    pub async fn get_merchant_by_name(
        &self,
        user_id: UserId,
        name: &str,
    ) -> Result<Option<Merchant>> {
        let row = sqlx::query(
            "SELECT id, user_id, name, created_at FROM merchants WHERE name = ? AND user_id = ?",
        )
        .bind(name)
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch merchant by name")?;

        row.as_ref().map(Self::row_to_merchant).transpose()
    }

    pub async fn list_merchants(&self, user_id: UserId) -> Result<Vec<Merchant>> {
        let rows = sqlx::query(
            "SELECT id, user_id, name, created_at FROM merchants WHERE user_id = ? ORDER BY name",
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list merchants")?;

        rows.iter().map(Self::row_to_merchant).collect()
    }

    pub async fn delete_merchant(&self, user_id: UserId, id: MerchantId) -> Result<DeleteOutcome> {
        self.delete_unreferenced("merchants", "merchant_id", user_id, id)
            .await
            .context("Failed to delete merchant")
    }

    fn row_to_merchant(row: &sqlx::sqlite::SqliteRow) -> Result<Merchant> {
        Ok(Merchant {
            id: parse_id(row, "id")?,
            user_id: parse_id(row, "user_id")?,
            name: row.get("name"),
            created_at: parse_timestamp(row, "created_at")?,
        })
    }

    /// Delete an owned row from `table` unless a transaction still points at
    /// it through `fk_column`. Check and delete share one unit of work.
    async fn delete_unreferenced(
        &self,
        table: &'static str,
        fk_column: &'static str,
        user_id: UserId,
        id: Uuid,
    ) -> Result<DeleteOutcome> {
        let id_str = id.to_string();
        let user_id_str = user_id.to_string();
        let mut tx = self.pool.begin().await?;

        let owned = sqlx::query(&format!(
            "SELECT 1 FROM {table} WHERE id = ? AND user_id = ?"
        ))
        .bind(&id_str)
        .bind(&user_id_str)
        .fetch_optional(&mut *tx)
        .await?;
        if owned.is_none() {
            return Ok(DeleteOutcome::NotFound);
        }

        let references: i64 = sqlx::query(&format!(
            "SELECT COUNT(*) AS count FROM transactions WHERE {fk_column} = ?"
        ))
        .bind(&id_str)
        .fetch_one(&mut *tx)
        .await?
        .get("count");
        if references > 0 {
            return Ok(DeleteOutcome::Referenced(references));
        }

        sqlx::query(&format!("DELETE FROM {table} WHERE id = ? AND user_id = ?"))
            .bind(&id_str)
            .bind(&user_id_str)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(DeleteOutcome::Deleted)
    }

    // ========================
    // Transaction operations
    // ========================

    /// Insert a transaction and apply its effect to the account balance.
    ///
    /// Ownership checks, the insert and the balance update run in one SQLite
    /// transaction: either all of it is committed or none of it is.
    pub async fn record_transaction(
        &self,
        user_id: UserId,
        new: NewTransaction,
    ) -> Result<RecordOutcome> {
        let user_id_str = user_id.to_string();
        let mut tx = self.pool.begin().await?;

        let account = sqlx::query("SELECT currency FROM accounts WHERE id = ? AND user_id = ?")
            .bind(new.account_id.to_string())
            .bind(&user_id_str)
            .fetch_optional(&mut *tx)
            .await
            .context("Failed to look up account")?;
        let Some(account) = account else {
            return Ok(RecordOutcome::AccountNotFound);
        };
        let currency: String = account.get("currency");

        if let Some(category_id) = new.category_id {
            let owned = sqlx::query("SELECT 1 FROM categories WHERE id = ? AND user_id = ?")
                .bind(category_id.to_string())
                .bind(&user_id_str)
                .fetch_optional(&mut *tx)
                .await
                .context("Failed to look up category")?;
            if owned.is_none() {
                return Ok(RecordOutcome::CategoryNotFound);
            }
        }

        if let Some(merchant_id) = new.merchant_id {
            let owned = sqlx::query("SELECT 1 FROM merchants WHERE id = ? AND user_id = ?")
                .bind(merchant_id.to_string())
                .bind(&user_id_str)
                .fetch_optional(&mut *tx)
                .await
                .context("Failed to look up merchant")?;
            if owned.is_none() {
                return Ok(RecordOutcome::MerchantNotFound);
            }
        }

        let transaction = new.into_transaction(user_id, currency);

        sqlx::query(&format!(
            "INSERT INTO transactions ({TRANSACTION_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(transaction.id.to_string())
        .bind(&user_id_str)
        .bind(transaction.account_id.to_string())
        .bind(transaction.category_id.map(|id| id.to_string()))
        .bind(transaction.merchant_id.map(|id| id.to_string()))
        .bind(transaction.txn_type.as_str())
        .bind(transaction.amount)
        .bind(&transaction.currency)
        .bind(format_date(&transaction.txn_date))
        .bind(&transaction.description)
        .bind(&transaction.notes)
        .bind(format_timestamp(&transaction.created_at))
        .execute(&mut *tx)
        .await
        .context("Failed to save transaction")?;

        let applied = apply_balance_effect(&mut tx, transaction.account_id, transaction.effect())
            .await
            .context("Failed to update account balance")?;
        if !applied {
            return Ok(RecordOutcome::BalanceOverflow);
        }

        tx.commit()
            .await
            .context("Failed to commit transaction")?;

        Ok(RecordOutcome::Recorded(transaction))
    }

    /// Delete a transaction and reverse its balance effect, atomically.
    pub async fn remove_transaction(
        &self,
        user_id: UserId,
        id: TransactionId,
    ) -> Result<RemoveOutcome> {
        let id_str = id.to_string();
        let user_id_str = user_id.to_string();
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = ? AND user_id = ?"
        ))
        .bind(&id_str)
        .bind(&user_id_str)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to fetch transaction")?;
        let Some(row) = row else {
            return Ok(RemoveOutcome::NotFound);
        };
        let transaction = Self::row_to_transaction(&row)?;

        sqlx::query("DELETE FROM transactions WHERE id = ? AND user_id = ?")
            .bind(&id_str)
            .bind(&user_id_str)
            .execute(&mut *tx)
            .await
            .context("Failed to delete transaction")?;

        let applied = apply_balance_effect(&mut tx, transaction.account_id, -transaction.effect())
            .await
            .context("Failed to reverse account balance")?;
        if !applied {
            return Ok(RemoveOutcome::BalanceOverflow);
        }

        tx.commit()
            .await
            .context("Failed to commit transaction")?;

        Ok(RemoveOutcome::Removed(transaction))
    }

    pub async fn get_transaction(
        &self,
        user_id: UserId,
        id: TransactionId,
    ) -> Result<Option<Transaction>> {
        let row = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = ? AND user_id = ?"
        ))
        .bind(id.to_string())
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch transaction")?;

        row.as_ref().map(Self::row_to_transaction).transpose()
    }

    /// All transactions of one account, oldest first.
    pub async fn list_transactions_for_account(
        &self,
        user_id: UserId,
        account_id: AccountId,
    ) -> Result<Vec<Transaction>> {
        let rows = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE account_id = ? AND user_id = ? \
             ORDER BY txn_date, created_at, rowid"
        ))
        .bind(account_id.to_string())
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list transactions for account")?;

        rows.iter().map(Self::row_to_transaction).collect()
    }

    fn row_to_transaction(row: &sqlx::sqlite::SqliteRow) -> Result<Transaction> {
        let txn_type: String = row.get("txn_type");

        Ok(Transaction {
            id: parse_id(row, "id")?,
            user_id: parse_id(row, "user_id")?,
            account_id: parse_id(row, "account_id")?,
            category_id: parse_optional_id(row, "category_id")?,
            merchant_id: parse_optional_id(row, "merchant_id")?,
            txn_type: txn_type.parse().map_err(anyhow::Error::msg)?,
            amount: row.get("amount_cents"),
            currency: row.get("currency"),
            txn_date: parse_date(row, "txn_date")?,
            description: row.get("description"),
            notes: row.get("notes"),
            created_at: parse_timestamp(row, "created_at")?,
        })
    }

    // ========================
    // Queries and aggregates
    // ========================

    /// Transactions joined with account, category and merchant names,
    /// newest first.
    pub async fn list_transactions(
        &self,
        user_id: UserId,
        filter: &TransactionFilter,
    ) -> Result<Vec<TransactionListing>> {
        let mut query = String::from(
            r#"
            SELECT t.id, t.account_id, t.category_id, t.merchant_id, t.txn_type, t.amount_cents,
                   t.currency, t.txn_date, t.description, t.notes, t.created_at,
                   a.name AS account_name, c.name AS category_name, m.name AS merchant_name
            FROM transactions t
            LEFT JOIN accounts a ON t.account_id = a.id
            LEFT JOIN categories c ON t.category_id = c.id
            LEFT JOIN merchants m ON t.merchant_id = m.id
            WHERE t.user_id = ?
            "#,
        );
        if filter.txn_type.is_some() {
            query.push_str(" AND t.txn_type = ?");
        }
        if filter.account_id.is_some() {
            query.push_str(" AND t.account_id = ?");
        }
        query.push_str(" ORDER BY t.txn_date DESC, t.created_at DESC, t.rowid DESC LIMIT ? OFFSET ?");

        let mut sql_query = sqlx::query(&query).bind(user_id.to_string());
        if let Some(txn_type) = filter.txn_type {
            sql_query = sql_query.bind(txn_type.as_str());
        }
        if let Some(account_id) = filter.account_id {
            sql_query = sql_query.bind(account_id.to_string());
        }
        sql_query = sql_query.bind(filter.limit).bind(filter.offset);

        let rows = sql_query
            .fetch_all(&self.pool)
            .await
            .context("Failed to list transactions")?;

        rows.iter().map(Self::row_to_listing).collect()
    }

    fn row_to_listing(row: &sqlx::sqlite::SqliteRow) -> Result<TransactionListing> {
        let txn_type: String = row.get("txn_type");

        Ok(TransactionListing {
            id: parse_id(row, "id")?,
            txn_date: parse_date(row, "txn_date")?,
            txn_type: txn_type.parse().map_err(anyhow::Error::msg)?,
            amount: row.get("amount_cents"),
            currency: row.get("currency"),
            description: row.get("description"),
            notes: row.get("notes"),
            account_id: parse_id(row, "account_id")?,
            account_name: row.get("account_name"),
            category_id: parse_optional_id(row, "category_id")?,
            category_name: row.get("category_name"),
            merchant_id: parse_optional_id(row, "merchant_id")?,
            merchant_name: row.get("merchant_name"),
            created_at: parse_timestamp(row, "created_at")?,
        })
    }

    /// Expense totals per category within optional inclusive date bounds,
    /// largest first. Uncategorized expenses are not included.
    pub async fn spending_by_category(
        &self,
        user_id: UserId,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<CategorySpending>> {
        let mut query = String::from(
            r#"
            SELECT c.id AS category_id, c.name AS name, COUNT(*) AS count, SUM(t.amount_cents) AS total
            FROM transactions t
            JOIN categories c ON t.category_id = c.id
            WHERE t.user_id = ? AND t.txn_type = 'expense'
            "#,
        );
        push_date_bounds(&mut query, from, to);
        query.push_str(" GROUP BY c.id, c.name ORDER BY total DESC, c.name");

        let rows = bind_date_bounds(sqlx::query(&query).bind(user_id.to_string()), from, to)
            .fetch_all(&self.pool)
            .await
            .context("Failed to aggregate spending by category")?;

        rows.iter()
            .map(|row| {
                Ok(CategorySpending {
                    category_id: parse_id(row, "category_id")?,
                    category: row.get("name"),
                    total: row.get("total"),
                    count: row.get("count"),
                })
            })
            .collect()
    }

    /// Expense totals per merchant, largest first, at most `limit` rows.
    pub async fn spending_by_merchant(
        &self,
        user_id: UserId,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        limit: i64,
    ) -> Result<Vec<MerchantSpending>> {
        let mut query = String::from(
            r#"
            SELECT m.id AS merchant_id, m.name AS name, COUNT(*) AS count, SUM(t.amount_cents) AS total
            FROM transactions t
            JOIN merchants m ON t.merchant_id = m.id
            WHERE t.user_id = ? AND t.txn_type = 'expense'
            "#,
        );
        push_date_bounds(&mut query, from, to);
        query.push_str(" GROUP BY m.id, m.name ORDER BY total DESC, m.name LIMIT ?");

        let rows = bind_date_bounds(sqlx::query(&query).bind(user_id.to_string()), from, to)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .context("Failed to aggregate spending by merchant")?;

        rows.iter()
            .map(|row| {
                Ok(MerchantSpending {
                    merchant_id: parse_id(row, "merchant_id")?,
                    merchant: row.get("name"),
                    total: row.get("total"),
                    count: row.get("count"),
                })
            })
            .collect()
    }

    /// Expense total per day within an inclusive range, oldest first.
    pub async fn daily_spending(
        &self,
        user_id: UserId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DailySpending>> {
        let rows = sqlx::query(
            r#"
            SELECT t.txn_date AS txn_date, SUM(t.amount_cents) AS total
            FROM transactions t
            WHERE t.user_id = ? AND t.txn_type = 'expense' AND t.txn_date >= ? AND t.txn_date <= ?
            GROUP BY t.txn_date
            ORDER BY t.txn_date
            "#,
        )
        .bind(user_id.to_string())
        .bind(format_date(&from))
        .bind(format_date(&to))
        .fetch_all(&self.pool)
        .await
        .context("Failed to aggregate daily spending")?;

        rows.iter()
            .map(|row| {
                Ok(DailySpending {
                    date: parse_date(row, "txn_date")?,
                    total: row.get("total"),
                })
            })
            .collect()
    }

    /// Totals per transaction type for one calendar month.
    pub async fn totals_by_type_for_month(
        &self,
        user_id: UserId,
        year: i32,
        month: u32,
    ) -> Result<BTreeMap<TransactionType, Cents>> {
        let rows = sqlx::query(
            r#"
            SELECT t.txn_type AS txn_type, SUM(t.amount_cents) AS total
            FROM transactions t
            WHERE t.user_id = ? AND strftime('%Y-%m', t.txn_date) = ?
            GROUP BY t.txn_type
            "#,
        )
        .bind(user_id.to_string())
        .bind(format!("{:04}-{:02}", year, month))
        .fetch_all(&self.pool)
        .await
        .context("Failed to aggregate monthly totals")?;

        Self::rows_to_type_totals(&rows)
    }

    /// Totals per transaction type within an inclusive date range.
    pub async fn totals_by_type_between(
        &self,
        user_id: UserId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<BTreeMap<TransactionType, Cents>> {
        let rows = sqlx::query(
            r#"
            SELECT t.txn_type AS txn_type, SUM(t.amount_cents) AS total
            FROM transactions t
            WHERE t.user_id = ? AND t.txn_date >= ? AND t.txn_date <= ?
            GROUP BY t.txn_type
            "#,
        )
        .bind(user_id.to_string())
        .bind(format_date(&from))
        .bind(format_date(&to))
        .fetch_all(&self.pool)
        .await
        .context("Failed to aggregate period totals")?;

        Self::rows_to_type_totals(&rows)
    }

    fn rows_to_type_totals(
        rows: &[sqlx::sqlite::SqliteRow],
    ) -> Result<BTreeMap<TransactionType, Cents>> {
        let mut totals: BTreeMap<TransactionType, Cents> = BTreeMap::new();
        for row in rows {
            let txn_type: String = row.get("txn_type");
            let txn_type: TransactionType = txn_type.parse().map_err(anyhow::Error::msg)?;
            totals.insert(txn_type, row.get("total"));
        }
        Ok(totals)
    }

    // ========================
    // Integrity operations
    // ========================

    /// Stored vs. recomputed balance for every account of the user.
    pub async fn balance_checks(&self, user_id: UserId) -> Result<Vec<BalanceCheck>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT a.id AS id, a.name AS name, a.balance_cents AS stored,
                   a.opening_balance_cents + COALESCE(SUM({EFFECT_SQL}), 0) AS computed,
                   COUNT(t.id) AS transaction_count
            FROM accounts a
            LEFT JOIN transactions t ON t.account_id = a.id
            WHERE a.user_id = ?
            GROUP BY a.id, a.name, a.balance_cents, a.opening_balance_cents
            ORDER BY a.name
            "#
        ))
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to compute balance checks")?;

        rows.iter()
            .map(|row| {
                Ok(BalanceCheck {
                    account_id: parse_id(row, "id")?,
                    account_name: row.get("name"),
                    stored: row.get("stored"),
                    computed: row.get("computed"),
                    transaction_count: row.get("transaction_count"),
                })
            })
            .collect()
    }

    /// Overwrite drifted stored balances with the recomputed value.
    /// Returns the number of accounts that changed.
    pub async fn repair_balances(&self, user_id: UserId) -> Result<u64> {
        let computed = format!(
            "accounts.opening_balance_cents + \
             (SELECT COALESCE(SUM({EFFECT_SQL}), 0) FROM transactions t WHERE t.account_id = accounts.id)"
        );
        let result = sqlx::query(&format!(
            "UPDATE accounts SET balance_cents = {computed} \
             WHERE user_id = ? AND balance_cents != {computed}"
        ))
        .bind(user_id.to_string())
        .execute(&self.pool)
        .await
        .context("Failed to repair balances")?;

        Ok(result.rows_affected())
    }
}

/// Move an account's stored balance by `effect` inside `tx`.
///
/// Callers write their transaction row first, so `tx` already holds the
/// database write lock when the balance is read. Returns `false` and writes
/// nothing if the new balance would overflow.
async fn apply_balance_effect(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    account_id: AccountId,
    effect: Cents,
) -> Result<bool> {
    if effect == 0 {
        return Ok(true);
    }

    let account_id_str = account_id.to_string();
    let row = sqlx::query("SELECT balance_cents FROM accounts WHERE id = ?")
        .bind(&account_id_str)
        .fetch_optional(&mut **tx)
        .await?;
    let Some(row) = row else {
        anyhow::bail!("account {} vanished during balance update", account_id);
    };
    let current: Cents = row.try_get("balance_cents")?;

    let Some(updated) = current.checked_add(effect) else {
        return Ok(false);
    };

    sqlx::query("UPDATE accounts SET balance_cents = ? WHERE id = ?")
        .bind(updated)
        .bind(&account_id_str)
        .execute(&mut **tx)
        .await?;
    Ok(true)
}

fn push_date_bounds(query: &mut String, from: Option<NaiveDate>, to: Option<NaiveDate>) {
    if from.is_some() {
        query.push_str(" AND t.txn_date >= ?");
    }
    if to.is_some() {
        query.push_str(" AND t.txn_date <= ?");
    }
}

fn bind_date_bounds<'q>(
    mut query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    if let Some(from) = from {
        query = query.bind(format_date(&from));
    }
    if let Some(to) = to {
        query = query.bind(format_date(&to));
    }
    query
}

/// Timestamps are stored with a fixed width so text ordering is chronological.
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn format_date(date: &NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn parse_id(row: &sqlx::sqlite::SqliteRow, column: &str) -> Result<Uuid> {
    let raw: String = row.get(column);
    Uuid::parse_str(&raw).with_context(|| format!("Invalid {} '{}'", column, raw))
}

fn parse_optional_id(row: &sqlx::sqlite::SqliteRow, column: &str) -> Result<Option<Uuid>> {
    let raw: Option<String> = row.get(column);
    raw.map(|s| Uuid::parse_str(&s))
        .transpose()
        .with_context(|| format!("Invalid {}", column))
}

fn parse_timestamp(row: &sqlx::sqlite::SqliteRow, column: &str) -> Result<DateTime<Utc>> {
    let raw: String = row.get(column);
    Ok(DateTime::parse_from_rfc3339(&raw)
        .with_context(|| format!("Invalid {} timestamp '{}'", column, raw))?
        .with_timezone(&Utc))
}

fn parse_date(row: &sqlx::sqlite::SqliteRow, column: &str) -> Result<NaiveDate> {
    let raw: String = row.get(column);
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
        .with_context(|| format!("Invalid {} date '{}'", column, raw))
}
