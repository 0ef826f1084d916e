use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    Account, AccountId, CategoryId, Cents, MerchantId, TransactionId, TransactionType,
};

/// Number of rows `list_transactions` returns when no limit is given.
pub const DEFAULT_PAGE_SIZE: i64 = 100;

/// A transaction joined with the display names of what it references.
/// A reference that no longer resolves shows up as `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionListing {
    pub id: TransactionId,
    pub txn_date: NaiveDate,
    pub txn_type: TransactionType,
    pub amount: Cents,
    pub currency: String,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub account_id: AccountId,
    pub account_name: Option<String>,
    pub category_id: Option<CategoryId>,
    pub category_name: Option<String>,
    pub merchant_id: Option<MerchantId>,
    pub merchant_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TransactionListing {
    /// Amount as it affects the account: negative for expenses.
    pub fn signed_amount(&self) -> Cents {
        match self.txn_type {
            TransactionType::Expense => -self.amount,
            _ => self.amount,
        }
    }
}

/// Filter for paging through transactions
#[derive(Debug, Clone)]
pub struct TransactionFilter {
    pub txn_type: Option<TransactionType>,
    pub account_id: Option<AccountId>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for TransactionFilter {
    fn default() -> Self {
        Self {
            txn_type: None,
            account_id: None,
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySpending {
    pub category_id: CategoryId,
    pub category: String,
    pub total: Cents,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerchantSpending {
    pub merchant_id: MerchantId,
    pub merchant: String,
    pub total: Cents,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySpending {
    pub date: NaiveDate,
    pub total: Cents,
}

/// Totals per transaction type for one calendar month.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthlySummary {
    pub year: i32,
    pub month: u32,
    pub totals: BTreeMap<TransactionType, Cents>,
}

impl MonthlySummary {
    pub fn total(&self, txn_type: TransactionType) -> Cents {
        self.totals.get(&txn_type).copied().unwrap_or(0)
    }

    pub fn income(&self) -> Cents {
        self.total(TransactionType::Income)
    }

    pub fn expense(&self) -> Cents {
        self.total(TransactionType::Expense)
    }

    pub fn net(&self) -> Cents {
        self.income() - self.expense()
    }
}

/// Income and expense over an inclusive date range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeriodTotals {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub income: Cents,
    pub expense: Cents,
    pub transfer: Cents,
    pub net: Cents,
}

/// Everything the overview screen shows, computed in one call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dashboard {
    pub as_of: NaiveDate,
    pub total_balance: Cents,
    pub month: MonthlySummary,
    pub spending_by_category: Vec<CategorySpending>,
    pub accounts: Vec<Account>,
    pub recent_transactions: Vec<TransactionListing>,
}
