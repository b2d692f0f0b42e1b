//! Worker wire protocol: one JSON request line in, one JSON response line out.

use std::io::{BufRead, Write};

use serde::{Deserialize, Serialize};

use bckp_core::{ArtifactInfo, Job};

use crate::error::{io_err, RunnerError};

/// JSON newline-delimited request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub job: Job,
}

/// JSON newline-delimited response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<ArtifactInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkerResponse {
    pub fn ok(artifact: ArtifactInfo) -> Self {
        Self {
            ok: true,
            artifact: Some(artifact),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            artifact: None,
            error: Some(message.into()),
        }
    }

    pub fn into_result(self) -> Result<ArtifactInfo, RunnerError> {
        match (self.ok, self.artifact) {
            (true, Some(artifact)) => Ok(artifact),
            (true, None) => Err(RunnerError::Protocol(
                "worker reported success without an artifact".to_string(),
            )),
            (false, _) => Err(RunnerError::Job(
                self.error
                    .unwrap_or_else(|| "unknown worker error".to_string()),
            )),
        }
    }
}

/// Serve a single request: read one line from `reader`, publish the job and
/// write one response line to `writer`.
///
/// Job failures and malformed requests are reported in the response; only a
/// failure to read or write the channel itself is an `Err`.
pub fn serve<R: BufRead, W: Write>(mut reader: R, mut writer: W) -> Result<(), RunnerError> {
    let mut line = String::new();
    let read = reader
        .read_line(&mut line)
        .map_err(|e| io_err("worker stdin", e))?;

    let response = if read == 0 {
        WorkerResponse::error("empty request")
    } else {
        match serde_json::from_str::<WorkerRequest>(line.trim_end()) {
            Ok(request) => handle(&request.job),
            Err(err) => WorkerResponse::error(format!("malformed request: {err}")),
        }
    };

    let payload = serde_json::to_string(&response)?;
    writer
        .write_all(payload.as_bytes())
        .map_err(|e| io_err("worker stdout", e))?;
    writer
        .write_all(b"\n")
        .map_err(|e| io_err("worker stdout", e))?;
    writer.flush().map_err(|e| io_err("worker stdout", e))?;
    Ok(())
}

fn handle(job: &Job) -> WorkerResponse {
    tracing::debug!(job = %job.id, "worker received job");
    match bckp_engine::publish(job) {
        Ok(artifact) => WorkerResponse::ok(artifact),
        Err(err) => {
            tracing::error!(job = %job.id, error = %err, "job failed in worker");
            WorkerResponse::error(err.to_string())
        }
    }
}
