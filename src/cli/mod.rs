use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use uuid::Uuid;

use crate::application::LedgerService;
use crate::domain::{BillDraft, Cents, Group, MemberId, Share, format_cents, parse_cents};
use crate::io::{ExportFormat, Exporter};

/// Splitledger - shared expenses for groups
#[derive(Parser)]
#[command(name = "splitledger")]
#[command(about = "Track shared bills in a group and work out who owes whom")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, env = "SPLITLEDGER_DB", default_value = "splitledger.db")]
    pub database: String,

    /// Log filter used when RUST_LOG is not set (e.g. "info", "splitledger=debug")
    #[arg(long, env = "SPLITLEDGER_LOG", default_value = "warn", global = true)]
    pub log_level: String,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Group management commands
    #[command(subcommand)]
    Group(GroupCommands),

    /// Member management commands
    #[command(subcommand)]
    Member(MemberCommands),

    /// Bill management commands
    #[command(subcommand)]
    Bill(BillCommands),

    /// Show the net balance of every member
    Balances {
        /// Group name
        #[arg(short, long)]
        group: String,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show the transfers that settle the group
    Settle {
        /// Group name
        #[arg(short, long)]
        group: String,

        /// Print JSON instead of a list
        #[arg(long)]
        json: bool,
    },

    /// Record a direct repayment between two members
    Pay {
        /// Amount paid (e.g., "50.00" or "50")
        amount: String,

        /// Group name
        #[arg(short, long)]
        group: String,

        /// Member who paid
        #[arg(long)]
        from: String,

        /// Member who received the money
        #[arg(long)]
        to: String,
    },

    /// Verify ledger integrity of a group
    Check {
        /// Group name
        #[arg(short, long)]
        group: String,
    },

    /// Export balances or settlements to CSV or JSON
    Export {
        /// What to export: balances, settlements
        export_type: String,

        /// Group name
        #[arg(short, long)]
        group: String,

        /// Format: csv, json
        #[arg(short, long, default_value = "csv")]
        format: String,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum GroupCommands {
    /// Create a new group
    Create {
        /// Group name (must be unique)
        name: String,

        /// Currency code (e.g., EUR, USD)
        #[arg(short, long, default_value = "EUR")]
        currency: String,
    },

    /// List all groups
    List,

    /// Show members, bills and balances of a group
    Show {
        /// Group name
        name: String,
    },
}

#[derive(Subcommand)]
pub enum MemberCommands {
    /// Add a member to a group
    Add {
        /// Member name (unique within the group)
        name: String,

        /// Group name
        #[arg(short, long)]
        group: String,
    },

    /// Remove a settled member from a group
    Remove {
        /// Member name
        name: String,

        /// Group name
        #[arg(short, long)]
        group: String,
    },

    /// List the members of a group
    List {
        /// Group name
        #[arg(short, long)]
        group: String,
    },
}

#[derive(Subcommand)]
pub enum BillCommands {
    /// Record a new bill
    Add {
        /// Total amount (e.g., "90.00" or "90")
        amount: String,

        /// Group name
        #[arg(short, long)]
        group: String,

        /// Member who paid
        #[arg(short, long)]
        payer: String,

        #[command(flatten)]
        split: SplitArgs,

        /// Description of the bill
        #[arg(short, long)]
        description: Option<String>,

        /// Date of the expense (YYYY-MM-DD, defaults to now)
        #[arg(long)]
        date: Option<String>,
    },

    /// List the bills of a group
    List {
        /// Group name
        #[arg(short, long)]
        group: String,
    },

    /// Show a bill and its shares
    Show {
        /// Bill ID
        id: String,
    },

    /// Delete a bill
    Delete {
        /// Bill ID
        id: String,
    },
}

/// How a bill is divided. Exactly one of the options must be given.
#[derive(Args)]
#[group(required = true, multiple = false)]
pub struct SplitArgs {
    /// Split evenly between these members (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub split: Vec<String>,

    /// Explicit share per member, e.g. --share alice=10.00 (repeatable)
    #[arg(long)]
    pub share: Vec<String>,

    /// Split by weight, e.g. --weight alice=2 (repeatable)
    #[arg(long)]
    pub weight: Vec<String>,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        tracing::debug!("using database {}", self.database);

        match self.command {
            Commands::Init => {
                LedgerService::init(&self.database).await?;
                println!("Database initialized: {}", self.database);
            }

            Commands::Group(group_cmd) => {
                let service = LedgerService::connect(&self.database).await?;
                run_group_command(&service, group_cmd).await?;
            }

            Commands::Member(member_cmd) => {
                let service = LedgerService::connect(&self.database).await?;
                run_member_command(&service, member_cmd).await?;
            }

            Commands::Bill(bill_cmd) => {
                let service = LedgerService::connect(&self.database).await?;
                run_bill_command(&service, bill_cmd).await?;
            }

            Commands::Balances { group, json } => {
                let service = LedgerService::connect(&self.database).await?;
                run_balances_command(&service, &group, json).await?;
            }

            Commands::Settle { group, json } => {
                let service = LedgerService::connect(&self.database).await?;
                run_settle_command(&service, &group, json).await?;
            }

            Commands::Pay {
                amount,
                group,
                from,
                to,
            } => {
                let service = LedgerService::connect(&self.database).await?;
                let amount_cents =
                    parse_cents(&amount).context("Invalid amount format. Use '50.00' or '50'")?;

                let group = service.find_group(&group).await?;
                let from = service.find_member(group.id, &from).await?;
                let to = service.find_member(group.id, &to).await?;
                let bill = service
                    .record_payment(group.id, from.id, to.id, amount_cents)
                    .await?;

                println!(
                    "Recorded payment: {} {} -> {} ({})",
                    format_cents(amount_cents),
                    from.name,
                    to.name,
                    bill.id
                );
            }

            Commands::Check { group } => {
                let service = LedgerService::connect(&self.database).await?;
                run_check_command(&service, &group).await?;
            }

            Commands::Export {
                export_type,
                group,
                format,
                output,
            } => {
                let service = LedgerService::connect(&self.database).await?;
                run_export_command(&service, &export_type, &group, &format, output.as_deref())
                    .await?;
            }
        }

        Ok(())
    }
}

async fn run_group_command(service: &LedgerService, cmd: GroupCommands) -> Result<()> {
    match cmd {
        GroupCommands::Create { name, currency } => {
            let group = service.create_group(name, currency.to_uppercase()).await?;
            println!("Created group: {} ({})", group.name, group.currency);
        }

        GroupCommands::List => {
            let groups = service.list_groups().await?;
            if groups.is_empty() {
                println!("No groups found.");
            } else {
                println!("{:<20} {:<8} {:<12}", "NAME", "CURRENCY", "CREATED");
                println!("{}", "-".repeat(42));
                for group in groups {
                    println!(
                        "{:<20} {:<8} {:<12}",
                        truncate(&group.name, 20),
                        group.currency,
                        group.created_at.format("%Y-%m-%d")
                    );
                }
            }
        }

        GroupCommands::Show { name } => {
            let group = service.find_group(&name).await?;
            let members = service.list_members(group.id).await?;
            let bills = service.list_bills(group.id).await?;
            let total: Cents = bills.iter().map(|b| b.total_cents).sum();

            println!("Group:    {}", group.name);
            println!("ID:       {}", group.id);
            println!("Currency: {}", group.currency);
            println!("Created:  {}", group.created_at.format("%Y-%m-%d %H:%M"));
            println!("Members:  {}", members.len());
            println!("Bills:    {} ({} {})", bills.len(), format_cents(total), group.currency);
            println!();
            print_balances(service, &group).await?;
        }
    }
    Ok(())
}

async fn run_member_command(service: &LedgerService, cmd: MemberCommands) -> Result<()> {
    match cmd {
        MemberCommands::Add { name, group } => {
            let group = service.find_group(&group).await?;
            let member = service.add_member(group.id, name).await?;
            println!("Added {} to {}", member.name, group.name);
        }

        MemberCommands::Remove { name, group } => {
            let group = service.find_group(&group).await?;
            let member = service.find_member(group.id, &name).await?;
            service.remove_member(group.id, member.id).await?;
            println!("Removed {} from {}", member.name, group.name);
        }

        MemberCommands::List { group } => {
            let group = service.find_group(&group).await?;
            let members = service.list_members(group.id).await?;
            if members.is_empty() {
                println!("No members in {}.", group.name);
            } else {
                for member in members {
                    println!("{:<20} joined {}", member.name, member.joined_at.format("%Y-%m-%d"));
                }
            }
        }
    }
    Ok(())
}

async fn run_bill_command(service: &LedgerService, cmd: BillCommands) -> Result<()> {
    match cmd {
        BillCommands::Add {
            amount,
            group,
            payer,
            split,
            description,
            date,
        } => {
            let total =
                parse_cents(&amount).context("Invalid amount format. Use '50.00' or '50'")?;
            let group = service.find_group(&group).await?;
            let payer = service.find_member(group.id, &payer).await?;

            let mut draft = build_draft(service, &group, payer.id, total, split).await?;
            if let Some(date_str) = date {
                let timestamp = parse_date(&date_str).with_context(|| {
                    format!("Invalid date format '{}'. Use YYYY-MM-DD", date_str)
                })?;
                draft = draft.with_timestamp(timestamp);
            }
            if let Some(description) = description {
                draft = draft.with_description(description);
            }

            let bill = service.create_bill(group.id, draft).await?;
            println!(
                "Recorded bill: {} paid by {}, split {} ways ({})",
                format_cents(bill.total_cents),
                payer.name,
                bill.shares.len(),
                bill.id
            );
        }

        BillCommands::List { group } => {
            let group = service.find_group(&group).await?;
            let bills = service.list_bills(group.id).await?;
            if bills.is_empty() {
                println!("No bills found.");
            } else {
                let names = service.member_names(group.id).await?;
                println!(
                    "{:<12} {:>10} {:<15} {:<8} DESCRIPTION",
                    "DATE", "AMOUNT", "PAID BY", "SHARES"
                );
                println!("{}", "-".repeat(70));
                for bill in bills {
                    let payer = names.get(&bill.payer).map(|s| s.as_str()).unwrap_or("?");
                    println!(
                        "{:<12} {:>10} {:<15} {:<8} {}",
                        bill.timestamp.format("%Y-%m-%d"),
                        format_cents(bill.total_cents),
                        truncate(payer, 15),
                        bill.shares.len(),
                        truncate(bill.description.as_deref().unwrap_or(""), 30)
                    );
                }
            }
        }

        BillCommands::Show { id } => {
            let bill_id = Uuid::parse_str(&id).context("Invalid bill ID format (expected UUID)")?;
            let bill = service.get_bill(bill_id).await?;
            let names = service.member_names(bill.group_id).await?;
            let name = |id: &MemberId| names.get(id).cloned().unwrap_or_else(|| id.to_string());

            println!("Bill:        {}", bill.id);
            println!("Date:        {}", bill.timestamp.format("%Y-%m-%d %H:%M"));
            println!("Amount:      {}", format_cents(bill.total_cents));
            println!("Paid by:     {}", name(&bill.payer));
            if let Some(desc) = &bill.description {
                println!("Description: {}", desc);
            }
            println!("Shares:");
            for share in &bill.shares {
                println!("  {:<20} {:>10}", name(&share.member_id), format_cents(share.amount));
            }
        }

        BillCommands::Delete { id } => {
            let bill_id = Uuid::parse_str(&id).context("Invalid bill ID format (expected UUID)")?;
            let bill = service.delete_bill(bill_id).await?;
            println!("Deleted bill {} ({})", bill.id, format_cents(bill.total_cents));
        }
    }
    Ok(())
}

/// Turn the split options into a bill draft, resolving member names.
async fn build_draft(
    service: &LedgerService,
    group: &Group,
    payer: MemberId,
    total: Cents,
    split: SplitArgs,
) -> Result<BillDraft> {
    if !split.split.is_empty() {
        let mut participants = Vec::with_capacity(split.split.len());
        for name in &split.split {
            participants.push(service.find_member(group.id, name.trim()).await?.id);
        }
        return Ok(BillDraft::split_evenly(payer, total, &participants)?);
    }

    if !split.share.is_empty() {
        let mut shares = Vec::with_capacity(split.share.len());
        for arg in &split.share {
            let (name, amount) = parse_assignment(arg)?;
            let amount = parse_cents(amount)
                .with_context(|| format!("Invalid share amount in '{}'", arg))?;
            shares.push(Share::new(service.find_member(group.id, name).await?.id, amount));
        }
        return Ok(BillDraft::new(payer, total, shares));
    }

    let mut weights = Vec::with_capacity(split.weight.len());
    for arg in &split.weight {
        let (name, weight) = parse_assignment(arg)?;
        let weight: u32 = weight
            .parse()
            .with_context(|| format!("Invalid weight in '{}'", arg))?;
        weights.push((service.find_member(group.id, name).await?.id, weight));
    }
    Ok(BillDraft::split_weighted(payer, total, &weights)?)
}

/// Split a `name=value` argument.
fn parse_assignment(arg: &str) -> Result<(&str, &str)> {
    arg.split_once('=')
        .map(|(name, value)| (name.trim(), value.trim()))
        .filter(|(name, value)| !name.is_empty() && !value.is_empty())
        .with_context(|| format!("Expected NAME=VALUE, got '{}'", arg))
}

async fn run_balances_command(service: &LedgerService, group: &str, json: bool) -> Result<()> {
    let group = service.find_group(group).await?;
    if json {
        let rows = Exporter::new(service).balance_rows(group.id).await?;
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }
    print_balances(service, &group).await
}

async fn print_balances(service: &LedgerService, group: &Group) -> Result<()> {
    let rows = Exporter::new(service).balance_rows(group.id).await?;
    if rows.is_empty() {
        println!("No members in {}.", group.name);
        return Ok(());
    }

    println!("{:<20} {:>12} {:<8}", "MEMBER", "BALANCE", "CURRENCY");
    println!("{}", "-".repeat(42));
    for row in rows {
        println!(
            "{:<20} {:>12} {:<8}",
            truncate(&row.member_name, 20),
            format_cents(row.amount),
            group.currency
        );
    }
    Ok(())
}

async fn run_settle_command(service: &LedgerService, group: &str, json: bool) -> Result<()> {
    let group = service.find_group(group).await?;
    let rows = Exporter::new(service).settlement_rows(group.id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else if rows.is_empty() {
        println!("{} is settled up.", group.name);
    } else {
        for row in rows {
            println!(
                "{} pays {} {} {}",
                row.from_name,
                row.to_name,
                format_cents(row.amount),
                group.currency
            );
        }
    }
    Ok(())
}

async fn run_check_command(service: &LedgerService, group: &str) -> Result<()> {
    let group = service.find_group(group).await?;
    println!("Checking ledger integrity of {}...\n", group.name);

    let report = service.check_integrity(group.id).await?;

    println!("Members: {}", report.member_count);
    println!("Bills:   {}", report.bill_count);
    println!(
        "Sum of balances: {}  {}",
        report.balance_sum,
        if report.is_balanced() { "OK" } else { "UNBALANCED!" }
    );
    println!();

    if report.is_healthy() {
        println!("Ledger is consistent.");
    } else {
        println!("Issues found:");
        for issue in &report.issues {
            println!("  - {}", issue);
        }
        anyhow::bail!("Ledger integrity check failed");
    }

    Ok(())
}

async fn run_export_command(
    service: &LedgerService,
    export_type: &str,
    group: &str,
    format: &str,
    output: Option<&str>,
) -> Result<()> {
    use std::fs::File;
    use std::io::{Write, stdout};

    let format: ExportFormat = format.parse()?;
    let group = service.find_group(group).await?;
    let exporter = Exporter::new(service);

    // Determine output writer
    let writer: Box<dyn Write> = match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path))?;
            Box::new(file)
        }
        None => Box::new(stdout()),
    };

    let count = match export_type {
        "balances" => exporter.export_balances(group.id, format, writer).await?,
        "settlements" => exporter.export_settlements(group.id, format, writer).await?,
        _ => {
            anyhow::bail!(
                "Invalid export type '{}'. Valid types: balances, settlements",
                export_type
            );
        }
    };

    if output.is_some() {
        eprintln!("Exported {} {}", count, export_type);
    }
    Ok(())
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

fn parse_date(date_str: &str) -> Result<chrono::DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d")?;
    date.and_hms_opt(12, 0, 0)
        .map(|dt| dt.and_utc())
        .context("Invalid time")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_assignment() {
        assert_eq!(parse_assignment("alice=10.50").unwrap(), ("alice", "10.50"));
        assert_eq!(parse_assignment(" bob = 2 ").unwrap(), ("bob", "2"));
        assert!(parse_assignment("carol").is_err());
        assert!(parse_assignment("=5").is_err());
    }

    #[test]
    fn test_split_options_are_exclusive() {
        let parsed = Cli::try_parse_from([
            "splitledger", "bill", "add", "30", "--group", "Trip", "--payer", "a", "--split",
            "a,b", "--weight", "a=1",
        ]);
        assert!(parsed.is_err());

        let parsed = Cli::try_parse_from([
            "splitledger", "bill", "add", "30", "--group", "Trip", "--payer", "a", "--split",
            "a,b,c",
        ]);
        let Ok(Cli {
            command: Commands::Bill(BillCommands::Add { split, .. }),
            ..
        }) = parsed
        else {
            panic!("expected bill add");
        };
        assert_eq!(split.split, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a very long name", 8), "a ver...");
    }
}
