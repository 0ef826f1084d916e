use chrono::{Datelike, NaiveDate};

use crate::domain::{
    Account, AccountId, AccountType, Category, CategoryId, CategoryKind, Cents,
    DEFAULT_CURRENCY, IntegrityReport, Merchant, MerchantId, NewTransaction, Transaction,
    TransactionId, TransactionType, User, build_integrity_report,
};
use crate::storage::{DeleteOutcome, RecordOutcome, RemoveOutcome, Repository};

use super::{
    AppError, CategorySpending, DailySpending, Dashboard, MerchantSpending, MonthlySummary,
    PeriodTotals, Session, TransactionFilter, TransactionListing,
};

/// How many recent transactions the dashboard shows.
const DASHBOARD_RECENT_TRANSACTIONS: i64 = 10;

/// Application service providing high-level operations for the ledger.
/// This is the primary interface for any client (CLI, export, tests).
pub struct LedgerService {
    repo: Repository,
    password_cost: u32,
}

impl LedgerService {
    /// Create a new ledger service with the given repository.
    pub fn new(repo: Repository) -> Self {
        Self {
            repo,
            password_cost: bcrypt::DEFAULT_COST,
        }
    }

    /// Set the bcrypt cost used when storing password hashes.
    pub fn with_password_cost(mut self, cost: u32) -> Self {
        self.password_cost = cost;
        self
    }

    /// Open (creating if needed) the database at the given path and migrate it.
    pub async fn init(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}?mode=rwc", database_path);
        let repo = Repository::init(&db_url).await?;
        Ok(Self::new(repo))
    }

    /// Connect to an existing database.
    pub async fn connect(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}", database_path);
        let repo = Repository::connect(&db_url).await?;
        Ok(Self::new(repo))
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    // ========================
    // User operations
    // ========================

    /// Register a user. The password is only stored as a bcrypt hash.
    pub async fn create_user(
        &self,
        email: &str,
        full_name: &str,
        password: &str,
    ) -> Result<User, AppError> {
        let email = email.trim().to_lowercase();
        if self.repo.get_user_by_email(&email).await?.is_some() {
            return Err(AppError::UserAlreadyExists(email));
        }

        let password_hash = bcrypt::hash(password, self.password_cost)?;
        let user = User::new(email, full_name.trim().to_string(), password_hash);
        self.repo.save_user(&user).await?;

        tracing::info!(user_id = %user.id, email = %user.email, "created user");
        Ok(user)
    }

    /// Start acting on behalf of the user with this email.
    pub async fn open_session(&self, email: &str) -> Result<Session, AppError> {
        let email = email.trim().to_lowercase();
        let user = self
            .repo
            .get_user_by_email(&email)
            .await?
            .ok_or(AppError::UserNotFound(email))?;
        Ok(Session::from(&user))
    }

    // ========================
    // Account operations
    // ========================

    pub async fn add_account(
        &self,
        session: &Session,
        name: &str,
        account_type: AccountType,
        opening_balance: Cents,
        currency: Option<&str>,
    ) -> Result<Account, AppError> {
        let name = name.trim();
        if self
            .repo
            .get_account_by_name(session.user_id(), name)
            .await?
            .is_some()
        {
            return Err(AppError::AccountAlreadyExists(name.to_string()));
        }

        let currency = currency
            .map(|c| c.trim().to_uppercase())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());
        let account = Account::new(
            session.user_id(),
            name.to_string(),
            account_type,
            opening_balance,
            currency,
        );
        self.repo.save_account(&account).await?;

        tracing::info!(account_id = %account.id, name = %account.name, "created account");
        Ok(account)
    }

    pub async fn get_account(&self, session: &Session, id: AccountId) -> Result<Account, AppError> {
        self.repo
            .get_account(session.user_id(), id)
            .await?
            .ok_or_else(|| AppError::AccountNotFound(id.to_string()))
    }

    pub async fn get_account_by_name(
        &self,
        session: &Session,
        name: &str,
    ) -> Result<Account, AppError> {
        self.repo
            .get_account_by_name(session.user_id(), name.trim())
            .await?
            .ok_or_else(|| AppError::AccountNotFound(name.to_string()))
    }

    /// All accounts of the user, ordered by name.
    pub async fn list_accounts(&self, session: &Session) -> Result<Vec<Account>, AppError> {
        Ok(self.repo.list_accounts(session.user_id()).await?)
    }

    /// Delete an account. Returns `false` and deletes nothing if the account
    /// still has transactions or does not belong to the user.
    pub async fn delete_account(&self, session: &Session, id: AccountId) -> Result<bool, AppError> {
        let outcome = self.repo.delete_account(session.user_id(), id).await?;
        log_delete("account", id, outcome);
        Ok(outcome.is_deleted())
    }

    // ========================
    // Category operations
    // ========================

    pub async fn add_category(
        &self,
        session: &Session,
        name: &str,
        kind: CategoryKind,
    ) -> Result<Category, AppError> {
        let name = name.trim();
        if self
            .repo
            .get_category_by_name(session.user_id(), name)
            .await?
            .is_some()
        {
            return Err(AppError::CategoryAlreadyExists(name.to_string()));
        }

        let category = Category::new(session.user_id(), name.to_string(), kind);
        self.repo.save_category(&category).await?;

        tracing::info!(category_id = %category.id, name = %category.name, kind = %kind, "created category");
        Ok(category)
    }

    pub async fn get_category_by_name(
        &self,
        session: &Session,
        name: &str,
    ) -> Result<Category, AppError> {
        self.repo
            .get_category_by_name(session.user_id(), name.trim())
            .await?
            .ok_or_else(|| AppError::CategoryNotFound(name.to_string()))
    }

    /// Categories of the user, optionally only one kind, ordered by name.
    pub async fn list_categories(
        &self,
        session: &Session,
        kind: Option<CategoryKind>,
    ) -> Result<Vec<Category>, AppError> {
        Ok(self.repo.list_categories(session.user_id(), kind).await?)
    }

    /// Delete a category unless a transaction still uses it.
    pub async fn delete_category(
        &self,
        session: &Session,
        id: CategoryId,
    ) -> Result<bool, AppError> {
        let outcome = self.repo.delete_category(session.user_id(), id).await?;
        log_delete("category", id, outcome);
        Ok(outcome.is_deleted())
    }

    // ========================
    // Merchant operations
    // ========================

    pub async fn add_merchant(&self, session: &Session, name: &str) -> Result<Merchant, AppError> {
        let name = name.trim();
        if self
            .repo
            .get_merchant_by_name(session.user_id(), name)
            .await?
            .is_some()
        {
            return Err(AppError::MerchantAlreadyExists(name.to_string()));
        }

        let merchant = Merchant::new(session.user_id(), name.to_string());
        self.repo.save_merchant(&merchant).await?;

        tracing::info!(merchant_id = %merchant.id, name = %merchant.name, "created merchant");
        Ok(merchant)
    }

    pub async fn get_merchant_by_name(
        &self,
        session: &Session,
        name: &str,
    ) -> Result<Merchant, AppError> {
        self.repo
            .get_merchant_by_name(session.user_id(), name.trim())
            .await?
            .ok_or_else(|| AppError::MerchantNotFound(name.to_string()))
    }

    pub async fn list_merchants(&self, session: &Session) -> Result<Vec<Merchant>, AppError> {
        Ok(self.repo.list_merchants(session.user_id()).await?)
    }

    /// Delete a merchant unless a transaction still uses it.
    pub async fn delete_merchant(
        &self,
        session: &Session,
        id: MerchantId,
    ) -> Result<bool, AppError> {
        let outcome = self.repo.delete_merchant(session.user_id(), id).await?;
        log_delete("merchant", id, outcome);
        Ok(outcome.is_deleted())
    }

    // ========================
    // Transaction operations
    // ========================

    /// Record a transaction and move its account's balance in the same unit
    /// of work: expenses subtract, income adds, transfers leave it alone.
    pub async fn add_transaction(
        &self,
        session: &Session,
        new: NewTransaction,
    ) -> Result<TransactionId, AppError> {
        if new.amount <= 0 {
            return Err(AppError::InvalidAmount(
                "Amount must be positive".to_string(),
            ));
        }

        let account_id = new.account_id;
        let category_id = new.category_id;
        let merchant_id = new.merchant_id;

        match self.repo.record_transaction(session.user_id(), new).await? {
            RecordOutcome::Recorded(transaction) => {
                tracing::info!(
                    transaction_id = %transaction.id,
                    account_id = %transaction.account_id,
                    txn_type = %transaction.txn_type,
                    amount = transaction.amount,
                    effect = transaction.effect(),
                    "recorded transaction"
                );
                Ok(transaction.id)
            }
            RecordOutcome::AccountNotFound => Err(AppError::AccountNotFound(account_id.to_string())),
            RecordOutcome::CategoryNotFound => Err(AppError::CategoryNotFound(
                category_id.map(|id| id.to_string()).unwrap_or_default(),
            )),
            RecordOutcome::MerchantNotFound => Err(AppError::MerchantNotFound(
                merchant_id.map(|id| id.to_string()).unwrap_or_default(),
            )),
            RecordOutcome::BalanceOverflow => Err(balance_overflow(account_id)),
        }
    }

    pub async fn get_transaction(
        &self,
        session: &Session,
        id: TransactionId,
    ) -> Result<Option<Transaction>, AppError> {
        Ok(self.repo.get_transaction(session.user_id(), id).await?)
    }

    /// Delete a transaction, first undoing its balance effect.
    /// Returns `false` if the user has no such transaction.
    pub async fn delete_transaction(
        &self,
        session: &Session,
        id: TransactionId,
    ) -> Result<bool, AppError> {
        match self.repo.remove_transaction(session.user_id(), id).await? {
            RemoveOutcome::Removed(removed) => {
                tracing::info!(
                    transaction_id = %removed.id,
                    account_id = %removed.account_id,
                    reversed = -removed.effect(),
                    "deleted transaction"
                );
                Ok(true)
            }
            RemoveOutcome::NotFound => {
                tracing::debug!(transaction_id = %id, "transaction to delete not found");
                Ok(false)
            }
            RemoveOutcome::BalanceOverflow => Err(AppError::InvalidAmount(format!(
                "removing transaction {} would overflow its account balance",
                id
            ))),
        }
    }

    // ========================
    // Queries
    // ========================

    /// Newest transactions first, with account, category and merchant names.
    pub async fn list_transactions(
        &self,
        session: &Session,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<TransactionListing>, AppError> {
        let filter = TransactionFilter {
            limit,
            offset,
            ..TransactionFilter::default()
        };
        self.list_transactions_filtered(session, &filter).await
    }

    pub async fn list_transactions_filtered(
        &self,
        session: &Session,
        filter: &TransactionFilter,
    ) -> Result<Vec<TransactionListing>, AppError> {
        Ok(self.repo.list_transactions(session.user_id(), filter).await?)
    }

    /// Expense totals per category, largest first. Both bounds are inclusive.
    pub async fn spending_by_category(
        &self,
        session: &Session,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<CategorySpending>, AppError> {
        if let (Some(from), Some(to)) = (start, end) {
            validate_range(from, to)?;
        }
        Ok(self
            .repo
            .spending_by_category(session.user_id(), start, end)
            .await?)
    }

    /// The merchants with the largest expense totals.
    pub async fn spending_by_merchant(
        &self,
        session: &Session,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        limit: i64,
    ) -> Result<Vec<MerchantSpending>, AppError> {
        if let (Some(from), Some(to)) = (start, end) {
            validate_range(from, to)?;
        }
        Ok(self
            .repo
            .spending_by_merchant(session.user_id(), start, end, limit)
            .await?)
    }

    pub async fn daily_spending(
        &self,
        session: &Session,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailySpending>, AppError> {
        validate_range(start, end)?;
        Ok(self
            .repo
            .daily_spending(session.user_id(), start, end)
            .await?)
    }

    /// Totals per transaction type for a calendar month, whatever the day.
    pub async fn monthly_summary(
        &self,
        session: &Session,
        year: i32,
        month: u32,
    ) -> Result<MonthlySummary, AppError> {
        if !(1..=12).contains(&month) {
            return Err(AppError::InvalidMonth { month });
        }

        let totals = self
            .repo
            .totals_by_type_for_month(session.user_id(), year, month)
            .await?;
        Ok(MonthlySummary {
            year,
            month,
            totals,
        })
    }

    pub async fn period_totals(
        &self,
        session: &Session,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<PeriodTotals, AppError> {
        validate_range(from, to)?;
        let totals = self
            .repo
            .totals_by_type_between(session.user_id(), from, to)
            .await?;
        let get = |t: TransactionType| totals.get(&t).copied().unwrap_or(0);

        let income = get(TransactionType::Income);
        let expense = get(TransactionType::Expense);
        Ok(PeriodTotals {
            from,
            to,
            income,
            expense,
            transfer: get(TransactionType::Transfer),
            net: income - expense,
        })
    }

    /// Balances, this month's totals and spending, and recent activity.
    pub async fn dashboard(&self, session: &Session, today: NaiveDate) -> Result<Dashboard, AppError> {
        let accounts = self.list_accounts(session).await?;
        let total_balance: Cents = accounts.iter().map(|a| a.balance).sum();

        let month = self
            .monthly_summary(session, today.year(), today.month())
            .await?;
        let first_of_month = today.with_day(1).unwrap_or(today);
        let spending_by_category = self
            .spending_by_category(session, Some(first_of_month), Some(today))
            .await?;
        let recent_transactions = self
            .list_transactions(session, DASHBOARD_RECENT_TRANSACTIONS, 0)
            .await?;

        Ok(Dashboard {
            as_of: today,
            total_balance,
            month,
            spending_by_category,
            accounts,
            recent_transactions,
        })
    }

    // ========================
    // Integrity operations
    // ========================

    /// Compare every stored balance against opening balance plus effects.
    pub async fn check_integrity(&self, session: &Session) -> Result<IntegrityReport, AppError> {
        let checks = self.repo.balance_checks(session.user_id()).await?;
        let report = build_integrity_report(&checks);

        for drift in &report.drifts {
            tracing::warn!(
                account_id = %drift.account_id,
                stored = drift.stored,
                computed = drift.computed,
                "account balance drifted from its transactions"
            );
        }
        Ok(report)
    }

    /// Reset drifted balances to the value implied by their transactions.
    pub async fn repair_balances(&self, session: &Session) -> Result<u64, AppError> {
        let repaired = self.repo.repair_balances(session.user_id()).await?;
        if repaired > 0 {
            tracing::info!(repaired, "repaired account balances");
        }
        Ok(repaired)
    }
}

fn balance_overflow(account_id: AccountId) -> AppError {
    tracing::debug!(%account_id, "balance update would overflow, rolled back");
    AppError::InvalidAmount(format!("balance of account {} would overflow", account_id))
}

fn validate_range(from: NaiveDate, to: NaiveDate) -> Result<(), AppError> {
    if from > to {
        return Err(AppError::InvalidDateRange { from, to });
    }
    Ok(())
}

fn log_delete(kind: &str, id: uuid::Uuid, outcome: DeleteOutcome) {
    match outcome {
        DeleteOutcome::Deleted => tracing::info!(%id, "deleted {}", kind),
        DeleteOutcome::NotFound => tracing::debug!(%id, "{} to delete not found", kind),
        DeleteOutcome::Referenced(count) => {
            tracing::debug!(%id, references = count, "{} still referenced, not deleted", kind)
        }
    }
}
