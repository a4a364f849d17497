use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::Subcommand;
use colored::Colorize;
use repokit::partition::{
    calendar_year_partition_strategy, list_partition_strategy, list_partition_type,
    monthly_partition_strategy, range_partition_type,
};
use repokit::Value;

#[derive(Subcommand)]
pub enum PartitionCommands {
    /// Monthly RANGE layout around a reference date
    Monthly {
        /// Partitioning column
        #[arg(short, long)]
        column: String,

        /// Reference date (YYYY-MM-DD); defaults to today
        #[arg(long, value_name = "DATE")]
        at: Option<String>,

        /// Cover the calendar year of the reference date instead of the
        /// twelve months before it
        #[arg(long)]
        calendar_year: bool,
    },
    /// LIST layout with one bucket per group
    List {
        /// Partitioning column
        #[arg(short, long)]
        column: String,

        /// Comma-separated values of one bucket; repeat for more buckets
        #[arg(short, long = "group", value_name = "VALUES", required = true)]
        groups: Vec<String>,
    },
}

pub fn execute(command: PartitionCommands) -> Result<()> {
    match command {
        PartitionCommands::Monthly {
            column,
            at,
            calendar_year,
        } => monthly(&column, at.as_deref(), calendar_year),
        PartitionCommands::List { column, groups } => list(&column, &groups),
    }
}

fn monthly(column: &str, at: Option<&str>, calendar_year: bool) -> Result<()> {
    let reference = match at {
        Some(date) => NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .with_context(|| format!("Invalid reference date '{date}', expected YYYY-MM-DD"))?,
        None => Local::now().date_naive(),
    };

    let strategy = if calendar_year {
        calendar_year_partition_strategy(&reference)
    } else {
        monthly_partition_strategy(&reference)
    };

    print_layout(&range_partition_type(column), &strategy);
    Ok(())
}

fn list(column: &str, groups: &[String]) -> Result<()> {
    let groups: Vec<Vec<Value>> = groups.iter().map(|g| parse_group(g)).collect();
    print_layout(&list_partition_type(column), &list_partition_strategy(&groups));
    Ok(())
}

/// Integers stay numeric; everything else is text
fn parse_group(group: &str) -> Vec<Value> {
    group
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| match v.parse::<i64>() {
            Ok(n) => Value::Int(n),
            Err(_) => Value::from(v),
        })
        .collect()
}

fn print_layout(partition_type: &str, strategy: &str) {
    println!("{} {}", "type:".bold(), partition_type);
    println!("{} {}", "strategy:".bold(), strategy);
}
