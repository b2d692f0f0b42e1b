//! `bckp status` — latest artifact and staleness per job.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use indicatif::HumanBytes;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use bckp_core::{config, config::Overrides};
use bckp_engine::{expand, staleness, JobStatus, Staleness};

use super::ConfigArgs;

#[derive(Args, Debug)]
pub struct StatusArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let path = self.config.path()?;
        let resolved = config::resolve_at(&path, &Overrides::default())
            .with_context(|| format!("invalid configuration {}", path.display()))?;

        let enabled: Vec<_> = resolved.jobs.into_iter().filter(|j| !j.disabled).collect();
        let expansion = expand::expand_all(&enabled);

        let mut rows = Vec::new();
        for job in &expansion.jobs {
            let row = match staleness::inspect(job) {
                Ok(status) => Row::Inspected(status),
                Err(err) => Row::Error {
                    id: job.id.to_string(),
                    error: err.to_string(),
                },
            };
            rows.push(row);
        }
        for (id, err) in expansion.failures {
            rows.push(Row::Error {
                id: id.to_string(),
                error: err.to_string(),
            });
        }

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&rows).context("failed to serialize status JSON")?
            );
            return Ok(());
        }
        print_table(&rows);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Row {
    Inspected(JobStatus),
    Error { id: String, error: String },
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "job")]
    job: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "age")]
    age: String,
    #[tabled(rename = "size")]
    size: String,
    #[tabled(rename = "latest")]
    latest: String,
}

fn print_table(rows: &[Row]) {
    println!("bckp v{} | {} jobs", env!("CARGO_PKG_VERSION"), rows.len());
    if rows.is_empty() {
        println!("No jobs configured.");
        return;
    }

    let table_rows: Vec<StatusTableRow> = rows
        .iter()
        .map(|row| match row {
            Row::Inspected(status) => StatusTableRow {
                job: status.id.to_string(),
                status: staleness_label(status.staleness),
                age: status
                    .artifact
                    .as_ref()
                    .map(|a| staleness::format_datetime_age(a.modified))
                    .unwrap_or_else(|| "never".to_string()),
                size: status
                    .artifact
                    .as_ref()
                    .map(|a| HumanBytes(a.size).to_string())
                    .unwrap_or_default(),
                latest: status.latest.display().to_string(),
            },
            Row::Error { id, error } => StatusTableRow {
                job: id.clone(),
                status: "ERROR".red().bold().to_string(),
                age: String::new(),
                size: String::new(),
                latest: error.clone(),
            },
        })
        .collect();

    let mut table = Table::new(table_rows);
    table.with(Style::rounded());
    println!("{table}");

    let pending = rows
        .iter()
        .filter(|row| matches!(row, Row::Inspected(s) if s.staleness.needs_backup()))
        .count();
    if pending > 0 {
        println!("{pending} job(s) would be backed up by 'bckp run'.");
    }
}

fn staleness_label(staleness: Staleness) -> String {
    match staleness {
        Staleness::Fresh => "FRESH".green().bold().to_string(),
        Staleness::Stale => "STALE".yellow().bold().to_string(),
        Staleness::NoPriorArtifact => "NO ARTIFACT".bright_black().bold().to_string(),
    }
}
