use serde::{Deserialize, Serialize};

use super::{AccountId, Cents, Transaction};

/// Compute what an account's balance should be from its opening balance and
/// the transactions that currently reference it.
pub fn compute_balance(
    account_id: AccountId,
    opening_balance: Cents,
    transactions: &[Transaction],
) -> Cents {
    transactions
        .iter()
        .filter(|t| t.account_id == account_id)
        .fold(opening_balance, |balance, t| balance + t.effect())
}

/// An account whose stored balance disagrees with its transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceDrift {
    pub account_id: AccountId,
    pub account_name: String,
    pub stored: Cents,
    pub computed: Cents,
}

impl BalanceDrift {
    pub fn difference(&self) -> Cents {
        self.stored - self.computed
    }
}

/// Stored vs. computed balance for one account, as read from storage.
#[derive(Debug, Clone)]
pub struct BalanceCheck {
    pub account_id: AccountId,
    pub account_name: String,
    pub stored: Cents,
    pub computed: Cents,
    pub transaction_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub accounts_checked: usize,
    pub transactions_checked: i64,
    pub drifts: Vec<BalanceDrift>,
}

impl IntegrityReport {
    pub fn is_consistent(&self) -> bool {
        self.drifts.is_empty()
    }
}

pub fn build_integrity_report(checks: &[BalanceCheck]) -> IntegrityReport {
    let drifts = checks
        .iter()
        .filter(|c| c.stored != c.computed)
        .map(|c| BalanceDrift {
            account_id: c.account_id,
            account_name: c.account_name.clone(),
            stored: c.stored,
            computed: c.computed,
        })
        .collect();

    IntegrityReport {
        accounts_checked: checks.len(),
        transactions_checked: checks.iter().map(|c| c.transaction_count).sum(),
        drifts,
    }
}
