use std::io::Write;

use anyhow::Result;
use chrono::NaiveDate;

use crate::application::{LedgerService, Session, TransactionFilter};
use crate::domain::format_cents;

/// Page size used when walking the full transaction history.
const EXPORT_PAGE_SIZE: i64 = 500;

/// Exporter for writing query results in machine-readable formats
pub struct Exporter<'a> {
    service: &'a LedgerService,
    session: &'a Session,
}

impl<'a> Exporter<'a> {
    pub fn new(service: &'a LedgerService, session: &'a Session) -> Self {
        Self { service, session }
    }

    /// Export every transaction, newest first, as CSV.
    pub async fn export_transactions_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "id",
            "date",
            "type",
            "amount",
            "currency",
            "account",
            "category",
            "merchant",
            "description",
            "notes",
        ])?;

        let mut count = 0;
        let mut offset = 0;
        loop {
            let filter = TransactionFilter {
                limit: EXPORT_PAGE_SIZE,
                offset,
                ..TransactionFilter::default()
            };
            let page = self
                .service
                .list_transactions_filtered(self.session, &filter)
                .await?;
            if page.is_empty() {
                break;
            }

            for txn in &page {
                csv_writer.write_record([
                    txn.id.to_string(),
                    txn.txn_date.to_string(),
                    txn.txn_type.to_string(),
                    format_cents(txn.amount),
                    txn.currency.clone(),
                    txn.account_name.clone().unwrap_or_default(),
                    txn.category_name.clone().unwrap_or_default(),
                    txn.merchant_name.clone().unwrap_or_default(),
                    txn.description.clone().unwrap_or_default(),
                    txn.notes.clone().unwrap_or_default(),
                ])?;
            }
            count += page.len();
            offset += page.len() as i64;
        }

        csv_writer.flush()?;
        Ok(count)
    }

    /// Export every transaction as a JSON array.
    pub async fn export_transactions_json<W: Write>(&self, writer: W) -> Result<usize> {
        let mut all = Vec::new();
        let mut offset = 0;
        loop {
            let filter = TransactionFilter {
                limit: EXPORT_PAGE_SIZE,
                offset,
                ..TransactionFilter::default()
            };
            let page = self
                .service
                .list_transactions_filtered(self.session, &filter)
                .await?;
            if page.is_empty() {
                break;
            }
            offset += page.len() as i64;
            all.extend(page);
        }

        serde_json::to_writer_pretty(writer, &all)?;
        Ok(all.len())
    }

    /// Export spending by category as CSV.
    pub async fn export_spending_csv<W: Write>(
        &self,
        writer: W,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<usize> {
        let rows = self
            .service
            .spending_by_category(self.session, from, to)
            .await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record(["category", "count", "total"])?;
        for row in &rows {
            csv_writer.write_record([
                row.category.clone(),
                row.count.to_string(),
                format_cents(row.total),
            ])?;
        }

        csv_writer.flush()?;
        Ok(rows.len())
    }

    /// Export spending by category as JSON.
    pub async fn export_spending_json<W: Write>(
        &self,
        writer: W,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<usize> {
        let rows = self
            .service
            .spending_by_category(self.session, from, to)
            .await?;
        serde_json::to_writer_pretty(writer, &rows)?;
        Ok(rows.len())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use tempfile::TempDir;

    use super::*;
    use crate::domain::{AccountType, CategoryKind, NewTransaction};

    async fn service_with_data() -> Result<(LedgerService, Session, TempDir)> {
        let temp = TempDir::new()?;
        let path = temp.path().join("export.db");
        let service = LedgerService::init(path.to_str().unwrap())
            .await?
            .with_password_cost(4);
        let user = service.create_user("export@example.com", "Exporter", "pw").await?;
        let session = Session::from(&user);

        let account = service
            .add_account(&session, "Wallet", AccountType::Cash, 10000, None)
            .await?;
        let food = service
            .add_category(&session, "Food", CategoryKind::Expense)
            .await?;
        let date = NaiveDate::from_ymd_opt(2024, 5, 4).unwrap();
        service
            .add_transaction(
                &session,
                NewTransaction::expense(account.id, 1250, date)
                    .with_category(food.id)
                    .with_description("Lunch, with \"quotes\""),
            )
            .await?;
        service
            .add_transaction(&session, NewTransaction::income(account.id, 500, date))
            .await?;

        Ok((service, session, temp))
    }

    #[tokio::test]
    async fn test_export_transactions_csv() -> Result<()> {
        let (service, session, _temp) = service_with_data().await?;
        let mut out = Vec::new();

        let count = Exporter::new(&service, &session)
            .export_transactions_csv(&mut out)
            .await?;
        assert_eq!(count, 2);

        let text = String::from_utf8(out)?;
        let mut reader = csv::Reader::from_reader(text.as_bytes());
        let records: Vec<csv::StringRecord> = reader.records().collect::<Result<_, _>>()?;
        assert_eq!(records.len(), 2);
        assert!(records.iter().any(|r| {
            &r[2] == "expense"
                && &r[3] == "12.50"
                && &r[5] == "Wallet"
                && &r[6] == "Food"
                && &r[8] == "Lunch, with \"quotes\""
        }));
        Ok(())
    }

    #[tokio::test]
    async fn test_export_spending_json() -> Result<()> {
        let (service, session, _temp) = service_with_data().await?;
        let mut out = Vec::new();

        let count = Exporter::new(&service, &session)
            .export_spending_json(&mut out, None, None)
            .await?;
        assert_eq!(count, 1);

        let value: serde_json::Value = serde_json::from_slice(&out)?;
        assert_eq!(value[0]["category"], "Food");
        assert_eq!(value[0]["total"], 1250);
        Ok(())
    }
}
