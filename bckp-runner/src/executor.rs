//! Where a job's publish step runs.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;

use bckp_core::{ArtifactInfo, Job};

use crate::error::{io_err, RunnerError};
use crate::protocol::{WorkerRequest, WorkerResponse};

/// Subcommand the `bckp` binary serves worker requests under.
pub const WORKER_SUBCOMMAND: &str = "worker";

#[derive(Debug, Clone)]
pub enum Executor {
    /// Publish on the tokio blocking pool of this process.
    InProcess,
    /// Spawn `program args...` per job and talk to it over stdin/stdout.
    Subprocess { program: PathBuf, args: Vec<OsString> },
}

impl Executor {
    /// Re-run the current executable as a worker for each job.
    pub fn current_exe() -> Result<Self, RunnerError> {
        let program = std::env::current_exe().map_err(|e| io_err("current executable", e))?;
        Ok(Executor::Subprocess {
            program,
            args: vec![OsString::from(WORKER_SUBCOMMAND)],
        })
    }

    pub async fn execute(&self, job: Job) -> Result<ArtifactInfo, RunnerError> {
        match self {
            Executor::InProcess => tokio::task::spawn_blocking(move || bckp_engine::publish(&job))
                .await
                .map_err(|err| RunnerError::Protocol(format!("publish task join error: {err}")))?
                .map_err(RunnerError::from),
            Executor::Subprocess { program, args } => run_worker(program, args, job).await,
        }
    }
}

async fn run_worker(
    program: &Path,
    args: &[OsString],
    job: Job,
) -> Result<ArtifactInfo, RunnerError> {
    let id = job.id.to_string();
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);
    // Own process group: a terminal's ctrl-c reaches only the coordinator.
    #[cfg(unix)]
    command.process_group(0);
    let mut child = command.spawn().map_err(|e| io_err(program, e))?;

    let payload = serde_json::to_string(&WorkerRequest { job })?;
    if let Some(mut stdin) = child.stdin.take() {
        // A worker that dies early closes its stdin; report that as a crash below.
        let sent = async {
            stdin.write_all(payload.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
            stdin.flush().await
        }
        .await;
        if let Err(err) = sent {
            tracing::debug!(job = %id, error = %err, "could not send request to worker");
        }
    }

    let mut line = String::new();
    if let Some(stdout) = child.stdout.take() {
        let mut reader = BufReader::new(stdout);
        reader
            .read_line(&mut line)
            .await
            .map_err(|e| io_err("worker stdout", e))?;
    }

    let status = child.wait().await.map_err(|e| io_err(program, e))?;
    if line.trim().is_empty() {
        return Err(RunnerError::WorkerCrashed {
            job: id,
            status: status.to_string(),
        });
    }
    if !status.success() {
        tracing::warn!(job = %id, %status, "worker exited unsuccessfully after responding");
    }

    let response: WorkerResponse = serde_json::from_str(line.trim_end())?;
    response.into_result()
}
