use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AccountId, CategoryId, Cents, MerchantId, UserId};

pub type TransactionId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Expense,
    Income,
    /// Recorded and listed, but moves no money between accounts.
    Transfer,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Expense => "expense",
            TransactionType::Income => "income",
            TransactionType::Transfer => "transfer",
        }
    }

    /// Signed change applied to the account balance when a transaction of
    /// this type is recorded. Deleting the transaction applies the negation.
    pub fn balance_effect(&self, amount: Cents) -> Cents {
        match self {
            TransactionType::Expense => -amount,
            TransactionType::Income => amount,
            TransactionType::Transfer => 0,
        }
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "expense" => Ok(TransactionType::Expense),
            "income" => Ok(TransactionType::Income),
            "transfer" => Ok(TransactionType::Transfer),
            other => Err(format!("unknown transaction type '{}'", other)),
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A recorded transaction. Creating or deleting one always moves the owning
/// account's stored balance by [`TransactionType::balance_effect`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub user_id: UserId,
    pub account_id: AccountId,
    pub category_id: Option<CategoryId>,
    pub merchant_id: Option<MerchantId>,
    pub txn_type: TransactionType,
    /// Always positive; direction comes from `txn_type`
    pub amount: Cents,
    pub currency: String,
    /// Calendar date the money moved
    pub txn_date: NaiveDate,
    pub description: Option<String>,
    pub notes: Option<String>,
    /// When the row was recorded
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    pub fn effect(&self) -> Cents {
        self.txn_type.balance_effect(self.amount)
    }
}

/// Input for recording a transaction.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub account_id: AccountId,
    pub txn_type: TransactionType,
    pub amount: Cents,
    pub txn_date: NaiveDate,
    pub category_id: Option<CategoryId>,
    pub merchant_id: Option<MerchantId>,
    pub description: Option<String>,
    pub notes: Option<String>,
}

impl NewTransaction {
    pub fn new(
        account_id: AccountId,
        txn_type: TransactionType,
        amount: Cents,
        txn_date: NaiveDate,
    ) -> Self {
        Self {
            account_id,
            txn_type,
            amount,
            txn_date,
            category_id: None,
            merchant_id: None,
            description: None,
            notes: None,
        }
    }

    pub fn expense(account_id: AccountId, amount: Cents, txn_date: NaiveDate) -> Self {
        Self::new(account_id, TransactionType::Expense, amount, txn_date)
    }

    pub fn income(account_id: AccountId, amount: Cents, txn_date: NaiveDate) -> Self {
        Self::new(account_id, TransactionType::Income, amount, txn_date)
    }

    pub fn with_category(mut self, category_id: CategoryId) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn with_merchant(mut self, merchant_id: MerchantId) -> Self {
        self.merchant_id = Some(merchant_id);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Materialize the row that will be persisted for `user_id`.
    pub fn into_transaction(self, user_id: UserId, currency: String) -> Transaction {
        Transaction {
            id: Uuid::new_v4(),
            user_id,
            account_id: self.account_id,
            category_id: self.category_id,
            merchant_id: self.merchant_id,
            txn_type: self.txn_type,
            amount: self.amount,
            currency,
            txn_date: self.txn_date,
            description: self.description.filter(|s| !s.trim().is_empty()),
            notes: self.notes.filter(|s| !s.trim().is_empty()),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balance_effect_by_type() {
        assert_eq!(TransactionType::Expense.balance_effect(15050), -15050);
        assert_eq!(TransactionType::Income.balance_effect(350000), 350000);
        assert_eq!(TransactionType::Transfer.balance_effect(10000), 0);
    }

    #[test]
    fn test_transaction_type_from_str() {
        assert_eq!("Expense".parse(), Ok(TransactionType::Expense));
        assert_eq!("income".parse(), Ok(TransactionType::Income));
        assert_eq!("TRANSFER".parse(), Ok(TransactionType::Transfer));
        assert!("refund".parse::<TransactionType>().is_err());
    }

    #[test]
    fn test_blank_text_fields_are_dropped() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let txn = NewTransaction::expense(Uuid::new_v4(), 100, date)
            .with_description("   ")
            .with_notes("paid in cash")
            .into_transaction(Uuid::new_v4(), "INR".into());

        assert_eq!(txn.description, None);
        assert_eq!(txn.notes.as_deref(), Some("paid in cash"));
        assert_eq!(txn.effect(), -100);
    }
}
