//! `bckp run` — back up stale jobs.

use std::io::{self, IsTerminal};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use indicatif::HumanBytes;
use tabled::{settings::Style, Table, Tabled};

use bckp_core::{
    config::{self, NoPrompt, Overrides, PasswordPrompt},
    JobOutcome,
};
use bckp_runner::{Coordinator, Executor, RunOptions, RunReport};

use super::ConfigArgs;

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Maximum number of jobs running at once.
    #[arg(short = 'p', long = "concurrency", value_name = "N")]
    pub concurrency: Option<usize>,

    /// Back up every job, even if its source is unchanged.
    #[arg(short, long)]
    pub force: bool,

    /// Run jobs on threads of this process instead of worker processes.
    #[arg(long)]
    pub in_process: bool,

    /// Seconds between progress log lines.
    #[arg(long, value_name = "SECS", default_value_t = 5)]
    pub progress: u64,
}

impl RunArgs {
    pub fn run(self) -> Result<()> {
        let path = self.config.path()?;
        let overrides = Overrides {
            concurrency: self.concurrency,
            force: self.force,
        };
        let mut resolved = config::resolve_at(&path, &overrides)
            .with_context(|| format!("invalid configuration {}", path.display()))?;

        let mut prompt: Box<dyn PasswordPrompt> = if io::stdin().is_terminal() {
            Box::new(|message: &str| rpassword::prompt_password(message))
        } else {
            Box::new(NoPrompt)
        };
        config::resolve_passwords(&mut resolved.jobs, config::env_password(), prompt.as_mut())
            .with_context(|| format!("set `password` in {} or {}", path.display(), config::PASSWORD_ENV))?;

        let executor = if self.in_process {
            Executor::InProcess
        } else {
            Executor::current_exe()?
        };
        let coordinator = Coordinator::new(
            RunOptions {
                concurrency: resolved.settings.concurrency,
                force: resolved.settings.force,
                progress_interval: Duration::from_secs(self.progress.max(1)),
            },
            executor,
        );

        let report = bckp_runner::run_blocking(&coordinator, resolved.jobs)?;
        print_summary(&report);
        report.into_result()?;
        Ok(())
    }
}

#[derive(Tabled)]
struct SummaryRow {
    #[tabled(rename = "job")]
    job: String,
    #[tabled(rename = "result")]
    result: String,
    #[tabled(rename = "size")]
    size: String,
    #[tabled(rename = "time")]
    time: String,
    #[tabled(rename = "detail")]
    detail: String,
}

fn print_summary(report: &RunReport) {
    if report.outcomes.is_empty() {
        println!("No jobs to run.");
        return;
    }

    let rows: Vec<SummaryRow> = report
        .outcomes
        .iter()
        .map(|(id, outcome)| {
            let (size, time, detail) = match outcome {
                JobOutcome::Succeeded { artifact } => (
                    HumanBytes(artifact.size).to_string(),
                    format!("{:.1}s", artifact.elapsed_ms as f64 / 1000.0),
                    artifact.path.display().to_string(),
                ),
                JobOutcome::Failed { error } => (String::new(), String::new(), error.clone()),
                JobOutcome::Skipped => (String::new(), String::new(), "unchanged".to_string()),
                JobOutcome::Interrupted => (String::new(), String::new(), "not started".to_string()),
            };
            SummaryRow {
                job: id.to_string(),
                result: outcome_label(outcome),
                size,
                time,
                detail,
            }
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    println!(
        "{} backed up, {} unchanged, {} failed in {:.1}s",
        report.count(|o| matches!(o, JobOutcome::Succeeded { .. })),
        report.count(|o| matches!(o, JobOutcome::Skipped)),
        report.count(JobOutcome::is_failure),
        report.elapsed.as_secs_f64(),
    );
}

fn outcome_label(outcome: &JobOutcome) -> String {
    match outcome {
        JobOutcome::Succeeded { .. } => "BACKED UP".green().bold().to_string(),
        JobOutcome::Skipped => "UNCHANGED".bright_black().to_string(),
        JobOutcome::Failed { .. } => "FAILED".red().bold().to_string(),
        JobOutcome::Interrupted => "INTERRUPTED".yellow().bold().to_string(),
    }
}
