use anyhow::{Context, Result};
use chrono::{Datelike, Duration, Local, NaiveDate};
use clap::{Parser, Subcommand, ValueEnum};
use uuid::Uuid;

use crate::application::{
    LedgerService, SAMPLE_USER_EMAIL, Session, TransactionFilter, TransactionListing,
};
use crate::domain::{
    AccountType, CategoryKind, NewTransaction, TransactionType, format_amount, format_cents,
    parse_cents,
};
use crate::io::Exporter;

/// fintrack - Personal Expense Tracker
#[derive(Parser)]
#[command(name = "fintrack")]
#[command(about = "Track expenses and income against accounts with always-consistent balances")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, default_value = "budgeting.db")]
    pub database: String,

    /// Email of the user to act as
    #[arg(short, long, global = true, default_value = SAMPLE_USER_EMAIL)]
    pub user: String,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the database and the sample user on first run
    Init {
        /// Skip creating the sample user and dataset
        #[arg(long)]
        no_sample_data: bool,
    },

    /// Account management commands
    #[command(subcommand)]
    Account(AccountCommands),

    /// Category management commands
    #[command(subcommand)]
    Category(CategoryCommands),

    /// Merchant management commands
    #[command(subcommand)]
    Merchant(MerchantCommands),

    /// Record a transaction and update the account balance
    Add {
        /// Amount (e.g., "150.50" or "3500")
        amount: String,

        /// Account name
        #[arg(short, long)]
        account: String,

        /// Transaction type: expense, income, transfer
        #[arg(short = 't', long = "type", default_value = "expense")]
        txn_type: String,

        /// Category name
        #[arg(short, long)]
        category: Option<String>,

        /// Merchant name
        #[arg(short, long)]
        merchant: Option<String>,

        /// Date of the transaction (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        date: Option<String>,

        /// Short description
        #[arg(short = 'D', long)]
        description: Option<String>,

        /// Free-form notes
        #[arg(short, long)]
        notes: Option<String>,
    },

    /// Delete a transaction and reverse its balance effect
    Delete {
        /// Transaction ID
        id: String,
    },

    /// List transactions, newest first
    List {
        /// Maximum number of transactions to show
        #[arg(short, long, default_value = "20")]
        limit: i64,

        /// Number of transactions to skip
        #[arg(long, default_value = "0")]
        offset: i64,

        /// Only show one type: expense, income, transfer
        #[arg(short = 't', long = "type")]
        txn_type: Option<String>,

        /// Only show one account
        #[arg(short, long)]
        account: Option<String>,
    },

    /// Show the overview: balances, this month, recent activity
    Dashboard,

    /// Generate reports and analytics
    #[command(subcommand)]
    Report(ReportCommands),

    /// Verify that stored balances match their transactions
    Check {
        /// Rewrite drifted balances to the computed value
        #[arg(long)]
        repair: bool,
    },

    /// Export data to CSV or JSON
    Export {
        /// What to export
        #[arg(value_enum)]
        what: ExportKind,

        /// Output format
        #[arg(short, long, value_enum, default_value = "csv")]
        format: ExportFormat,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,

        /// Start date for spending export (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,

        /// End date for spending export (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum AccountCommands {
    /// Create a new account
    Add {
        /// Account name (unique per user)
        name: String,

        /// Account type: checking, savings, credit_card, cash, investment, other
        #[arg(short = 't', long = "type", default_value = "checking")]
        account_type: String,

        /// Opening balance (may be negative, e.g. "-1200.00")
        #[arg(short, long, default_value = "0", allow_hyphen_values = true)]
        balance: String,

        /// Currency code
        #[arg(short, long)]
        currency: Option<String>,
    },

    /// List accounts and their balances
    List,

    /// Delete an account that has no transactions
    Delete {
        /// Account name
        name: String,
    },
}

#[derive(Subcommand)]
pub enum CategoryCommands {
    /// Create a new category
    Add {
        /// Category name (unique per user)
        name: String,

        /// Kind: expense or income
        #[arg(short, long, default_value = "expense")]
        kind: String,
    },

    /// List categories
    List {
        /// Only show one kind: expense or income
        #[arg(short, long)]
        kind: Option<String>,
    },

    /// Delete a category that no transaction uses
    Delete {
        /// Category name
        name: String,
    },
}

#[derive(Subcommand)]
pub enum MerchantCommands {
    /// Create a new merchant
    Add {
        /// Merchant name (unique per user)
        name: String,
    },

    /// List merchants
    List,

    /// Delete a merchant that no transaction uses
    Delete {
        /// Merchant name
        name: String,
    },
}

#[derive(Subcommand)]
pub enum ReportCommands {
    /// Expense totals per category
    Spending {
        /// Start date (YYYY-MM-DD, inclusive)
        #[arg(long)]
        from: Option<String>,

        /// End date (YYYY-MM-DD, inclusive)
        #[arg(long)]
        to: Option<String>,
    },

    /// Totals per transaction type for one month
    Monthly {
        /// Year (defaults to the current year)
        #[arg(short, long)]
        year: Option<i32>,

        /// Month 1-12 (defaults to the current month)
        #[arg(short, long)]
        month: Option<u32>,
    },

    /// Merchants with the largest expense totals
    Merchants {
        /// Start date (YYYY-MM-DD, inclusive)
        #[arg(long)]
        from: Option<String>,

        /// End date (YYYY-MM-DD, inclusive)
        #[arg(long)]
        to: Option<String>,

        /// Number of merchants to show
        #[arg(short, long, default_value = "10")]
        limit: i64,
    },

    /// Expense total per day (defaults to the last 30 days)
    Daily {
        /// Start date (YYYY-MM-DD, inclusive)
        #[arg(long)]
        from: Option<String>,

        /// End date (YYYY-MM-DD, inclusive)
        #[arg(long)]
        to: Option<String>,
    },

    /// Income, expense and net over a date range (defaults to the last 30 days)
    Totals {
        /// Start date (YYYY-MM-DD, inclusive)
        #[arg(long)]
        from: Option<String>,

        /// End date (YYYY-MM-DD, inclusive)
        #[arg(long)]
        to: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ExportKind {
    Transactions,
    Spending,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        if let Commands::Init { no_sample_data } = self.command {
            let service = LedgerService::init(&self.database).await?;
            println!("Database initialized: {}", self.database);
            if !no_sample_data && service.seed_sample_data(today()).await? {
                println!("Created sample user: {}", SAMPLE_USER_EMAIL);
            }
            return Ok(());
        }

        let service = LedgerService::connect(&self.database).await?;
        let session = service
            .open_session(&self.user)
            .await
            .with_context(|| format!("Run `fintrack init` first or pass --user (looked up '{}')", self.user))?;
        tracing::debug!(user = %session.display_name(), "opened session");

        match self.command {
            Commands::Init { .. } => unreachable!("handled above"),

            Commands::Account(cmd) => run_account_command(&service, &session, cmd).await?,

            Commands::Category(cmd) => run_category_command(&service, &session, cmd).await?,

            Commands::Merchant(cmd) => run_merchant_command(&service, &session, cmd).await?,

            Commands::Add {
                amount,
                account,
                txn_type,
                category,
                merchant,
                date,
                description,
                notes,
            } => {
                let amount =
                    parse_cents(&amount).context("Invalid amount format. Use '150.50' or '150'")?;
                let txn_type: TransactionType =
                    txn_type.parse().map_err(anyhow::Error::msg)?;
                let txn_date = match date {
                    Some(date_str) => parse_date(&date_str)?,
                    None => today(),
                };

                let account = service.get_account_by_name(&session, &account).await?;
                let mut new = NewTransaction::new(account.id, txn_type, amount, txn_date);
                if let Some(name) = category {
                    new = new.with_category(service.get_category_by_name(&session, &name).await?.id);
                }
                if let Some(name) = merchant {
                    new = new.with_merchant(service.get_merchant_by_name(&session, &name).await?.id);
                }
                if let Some(description) = description {
                    new = new.with_description(description);
                }
                if let Some(notes) = notes {
                    new = new.with_notes(notes);
                }

                let id = service.add_transaction(&session, new).await?;
                let account = service.get_account(&session, account.id).await?;
                println!(
                    "Recorded {} of {} on {} ({})",
                    txn_type,
                    format_amount(amount, &account.currency),
                    account.name,
                    id
                );
                println!(
                    "New balance: {}",
                    format_amount(account.balance, &account.currency)
                );
            }

            Commands::Delete { id } => {
                let id = Uuid::parse_str(&id).context("Invalid transaction ID")?;
                if service.delete_transaction(&session, id).await? {
                    println!("Deleted transaction {}", id);
                } else {
                    anyhow::bail!("Transaction not found: {}", id);
                }
            }

            Commands::List {
                limit,
                offset,
                txn_type,
                account,
            } => {
                let txn_type = txn_type
                    .map(|t| t.parse::<TransactionType>())
                    .transpose()
                    .map_err(anyhow::Error::msg)?;
                let account_id = match account {
                    Some(name) => Some(service.get_account_by_name(&session, &name).await?.id),
                    None => None,
                };
                let filter = TransactionFilter {
                    txn_type,
                    account_id,
                    limit,
                    offset,
                };
                let rows = service.list_transactions_filtered(&session, &filter).await?;
                print_transactions(&rows);
            }

            Commands::Dashboard => run_dashboard_command(&service, &session).await?,

            Commands::Report(cmd) => run_report_command(&service, &session, cmd).await?,

            Commands::Check { repair } => run_check_command(&service, &session, repair).await?,

            Commands::Export {
                what,
                format,
                output,
                from,
                to,
            } => {
                let from = from.as_deref().map(parse_date).transpose()?;
                let to = to.as_deref().map(parse_date).transpose()?;
                let exporter = Exporter::new(&service, &session);

                let writer: Box<dyn std::io::Write> = match &output {
                    Some(path) => Box::new(
                        std::fs::File::create(path)
                            .with_context(|| format!("Failed to create {}", path))?,
                    ),
                    None => Box::new(std::io::stdout()),
                };

                let count = match (what, format) {
                    (ExportKind::Transactions, ExportFormat::Csv) => {
                        exporter.export_transactions_csv(writer).await?
                    }
                    (ExportKind::Transactions, ExportFormat::Json) => {
                        exporter.export_transactions_json(writer).await?
                    }
                    (ExportKind::Spending, ExportFormat::Csv) => {
                        exporter.export_spending_csv(writer, from, to).await?
                    }
                    (ExportKind::Spending, ExportFormat::Json) => {
                        exporter.export_spending_json(writer, from, to).await?
                    }
                };

                if let Some(path) = output {
                    println!("Exported {} records to {}", count, path);
                }
            }
        }

        Ok(())
    }
}

async fn run_account_command(
    service: &LedgerService,
    session: &Session,
    cmd: AccountCommands,
) -> Result<()> {
    match cmd {
        AccountCommands::Add {
            name,
            account_type,
            balance,
            currency,
        } => {
            let account_type: AccountType = account_type.parse().map_err(|e| {
                anyhow::anyhow!(
                    "{}. Valid types: checking, savings, credit_card, cash, investment, other",
                    e
                )
            })?;
            let opening = parse_cents(&balance).context("Invalid opening balance")?;

            let account = service
                .add_account(session, &name, account_type, opening, currency.as_deref())
                .await?;
            println!(
                "Created account: {} ({}, {})",
                account.name,
                account.account_type,
                format_amount(account.balance, &account.currency)
            );
        }

        AccountCommands::List => {
            let accounts = service.list_accounts(session).await?;
            if accounts.is_empty() {
                println!("No accounts found.");
            } else {
                println!("{:<24} {:<12} {:>16} {:<8}", "NAME", "TYPE", "BALANCE", "CURRENCY");
                println!("{}", "-".repeat(63));
                for account in &accounts {
                    println!(
                        "{:<24} {:<12} {:>16} {:<8}",
                        account.name,
                        account.account_type,
                        format_cents(account.balance),
                        account.currency
                    );
                }
            }
        }

        AccountCommands::Delete { name } => {
            let account = service.get_account_by_name(session, &name).await?;
            if service.delete_account(session, account.id).await? {
                println!("Deleted account: {}", name);
            } else {
                anyhow::bail!("Cannot delete account '{}': it has transactions", name);
            }
        }
    }
    Ok(())
}

async fn run_category_command(
    service: &LedgerService,
    session: &Session,
    cmd: CategoryCommands,
) -> Result<()> {
    match cmd {
        CategoryCommands::Add { name, kind } => {
            let kind: CategoryKind = kind.parse().map_err(anyhow::Error::msg)?;
            let category = service.add_category(session, &name, kind).await?;
            println!("Created category: {} ({})", category.name, category.kind);
        }

        CategoryCommands::List { kind } => {
            let kind = kind
                .map(|k| k.parse::<CategoryKind>())
                .transpose()
                .map_err(anyhow::Error::msg)?;
            let categories = service.list_categories(session, kind).await?;
            if categories.is_empty() {
                println!("No categories found.");
            } else {
                println!("{:<24} {:<8}", "NAME", "KIND");
                println!("{}", "-".repeat(33));
                for category in &categories {
                    println!("{:<24} {:<8}", category.name, category.kind);
                }
            }
        }

        CategoryCommands::Delete { name } => {
            let category = service.get_category_by_name(session, &name).await?;
            if service.delete_category(session, category.id).await? {
                println!("Deleted category: {}", name);
            } else {
                anyhow::bail!("Cannot delete category '{}': it has transactions", name);
            }
        }
    }
    Ok(())
}

async fn run_merchant_command(
    service: &LedgerService,
    session: &Session,
    cmd: MerchantCommands,
) -> Result<()> {
    match cmd {
        MerchantCommands::Add { name } => {
            let merchant = service.add_merchant(session, &name).await?;
            println!("Created merchant: {}", merchant.name);
        }

        MerchantCommands::List => {
            let merchants = service.list_merchants(session).await?;
            if merchants.is_empty() {
                println!("No merchants found.");
            } else {
                for merchant in &merchants {
                    println!("{}", merchant.name);
                }
            }
        }

        MerchantCommands::Delete { name } => {
            let merchant = service.get_merchant_by_name(session, &name).await?;
            if service.delete_merchant(session, merchant.id).await? {
                println!("Deleted merchant: {}", name);
            } else {
                anyhow::bail!("Cannot delete merchant '{}': it has transactions", name);
            }
        }
    }
    Ok(())
}

async fn run_dashboard_command(service: &LedgerService, session: &Session) -> Result<()> {
    let dashboard = service.dashboard(session, today()).await?;
    let currency = dashboard
        .accounts
        .first()
        .map(|a| a.currency.clone())
        .unwrap_or_else(|| crate::domain::DEFAULT_CURRENCY.to_string());

    println!("Welcome, {}!", session.display_name());
    println!();
    println!("Total balance:     {:>16}", format_amount(dashboard.total_balance, &currency));
    println!("Monthly income:    {:>16}", format_amount(dashboard.month.income(), &currency));
    println!("Monthly expenses:  {:>16}", format_amount(dashboard.month.expense(), &currency));
    println!("Net this month:    {:>16}", format_amount(dashboard.month.net(), &currency));
    println!();

    println!("Spending by category ({}-{:02}):", dashboard.month.year, dashboard.month.month);
    if dashboard.spending_by_category.is_empty() {
        println!("  No expense data for this month");
    }
    for row in &dashboard.spending_by_category {
        println!("  {:<20} {:>14}", row.category, format_cents(row.total));
    }
    println!();

    println!("Accounts:");
    for account in &dashboard.accounts {
        println!(
            "  {:<20} {:>14} {}",
            account.name,
            format_cents(account.balance),
            account.currency
        );
    }
    println!();

    println!("Recent transactions:");
    print_transactions(&dashboard.recent_transactions);
    Ok(())
}

async fn run_report_command(
    service: &LedgerService,
    session: &Session,
    cmd: ReportCommands,
) -> Result<()> {
    match cmd {
        ReportCommands::Spending { from, to } => {
            let from = from.as_deref().map(parse_date).transpose()?;
            let to = to.as_deref().map(parse_date).transpose()?;
            let rows = service.spending_by_category(session, from, to).await?;

            if rows.is_empty() {
                println!("No expenses in this period.");
                return Ok(());
            }
            let total: i64 = rows.iter().map(|r| r.total).sum();
            println!("{:<20} {:>6} {:>14} {:>7}", "CATEGORY", "COUNT", "TOTAL", "SHARE");
            println!("{}", "-".repeat(50));
            for row in &rows {
                let share = row.total as f64 / total as f64 * 100.0;
                println!(
                    "{:<20} {:>6} {:>14} {:>6.1}%",
                    row.category,
                    row.count,
                    format_cents(row.total),
                    share
                );
            }
            println!("{}", "-".repeat(50));
            println!("{:<20} {:>6} {:>14}", "Total", "", format_cents(total));
        }

        ReportCommands::Monthly { year, month } => {
            let now = today();
            let summary = service
                .monthly_summary(
                    session,
                    year.unwrap_or(now.year()),
                    month.unwrap_or(now.month()),
                )
                .await?;

            println!("Summary for {}-{:02}", summary.year, summary.month);
            for txn_type in [
                TransactionType::Income,
                TransactionType::Expense,
                TransactionType::Transfer,
            ] {
                println!(
                    "  {:<10} {:>14}",
                    format!("{}:", txn_type),
                    format_cents(summary.total(txn_type))
                );
            }
            println!("  {:<10} {:>14}", "Net:", format_cents(summary.net()));
        }

        ReportCommands::Merchants { from, to, limit } => {
            let from = from.as_deref().map(parse_date).transpose()?;
            let to = to.as_deref().map(parse_date).transpose()?;
            let rows = service
                .spending_by_merchant(session, from, to, limit)
                .await?;

            if rows.is_empty() {
                println!("No merchant data available.");
            }
            for row in &rows {
                println!("{:<24} {:>6} {:>14}", row.merchant, row.count, format_cents(row.total));
            }
        }

        ReportCommands::Daily { from, to } => {
            let (from, to) = parse_range_or_last_30_days(from, to)?;
            let rows = service.daily_spending(session, from, to).await?;

            if rows.is_empty() {
                println!("No expenses between {} and {}.", from, to);
            }
            for row in &rows {
                println!("{} {:>14}", row.date, format_cents(row.total));
            }
        }

        ReportCommands::Totals { from, to } => {
            let (from, to) = parse_range_or_last_30_days(from, to)?;
            let totals = service.period_totals(session, from, to).await?;

            println!("{} to {}", totals.from, totals.to);
            println!("  {:<10} {:>14}", "Income:", format_cents(totals.income));
            println!("  {:<10} {:>14}", "Expenses:", format_cents(totals.expense));
            println!("  {:<10} {:>14}", "Net:", format_cents(totals.net));
        }
    }
    Ok(())
}

async fn run_check_command(service: &LedgerService, session: &Session, repair: bool) -> Result<()> {
    println!("Checking account balances...\n");

    let report = service.check_integrity(session).await?;
    println!("Accounts:     {}", report.accounts_checked);
    println!("Transactions: {}", report.transactions_checked);
    println!();

    if report.is_consistent() {
        println!("All balances match their transactions.");
        return Ok(());
    }

    println!("Drifted balances:");
    for drift in &report.drifts {
        println!(
            "  - {}: stored {}, expected {} (off by {})",
            drift.account_name,
            format_cents(drift.stored),
            format_cents(drift.computed),
            format_cents(drift.difference())
        );
    }

    if repair {
        let repaired = service.repair_balances(session).await?;
        println!("\nRepaired {} account(s).", repaired);
        Ok(())
    } else {
        anyhow::bail!("Balance check failed (rerun with --repair to fix)")
    }
}

fn print_transactions(rows: &[TransactionListing]) {
    if rows.is_empty() {
        println!("No transactions found.");
        return;
    }

    println!(
        "{:<36} {:<10} {:<24} {:<16} {:<16} {:>12}",
        "ID", "DATE", "DESCRIPTION", "CATEGORY", "ACCOUNT", "AMOUNT"
    );
    println!("{}", "-".repeat(119));
    for row in rows {
        println!(
            "{:<36} {:<10} {:<24} {:<16} {:<16} {:>12}",
            row.id,
            row.txn_date,
            truncate(row.description.as_deref().unwrap_or("-"), 24),
            truncate(row.category_name.as_deref().unwrap_or("-"), 16),
            truncate(row.account_name.as_deref().unwrap_or("-"), 16),
            format_cents(row.signed_amount())
        );
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn parse_date(date_str: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}'. Use YYYY-MM-DD", date_str))
}

fn parse_range_or_last_30_days(
    from: Option<String>,
    to: Option<String>,
) -> Result<(NaiveDate, NaiveDate)> {
    let to = match to {
        Some(date_str) => parse_date(&date_str)?,
        None => today(),
    };
    let from = match from {
        Some(date_str) => parse_date(&date_str)?,
        None => to - Duration::days(30),
    };
    Ok((from, to))
}
