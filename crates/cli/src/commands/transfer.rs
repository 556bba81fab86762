//! transfer command - Copy or move items as tracked jobs
//!
//! Each source becomes one job with its own progress bar. Failed jobs can be
//! re-run in place with `--retries`; a retried job keeps its id and counts
//! its attempts.

use std::sync::Arc;

use clap::Args;
use relo_core::{
    Error, JobStatus, RelocationRequest, RemotePath, Result, TransferJob, TransferJobTracker,
    TransferMode, TransferProgress, parse_remote,
};
use serde::Serialize;

use super::context::Session;
use crate::exit_code::ExitCode;
use crate::output::{Formatter, TransferBars};

/// Copy or move items with per-item progress
#[derive(Args, Debug)]
pub struct TransferArgs {
    /// Sources (alias/bucket/key)
    #[arg(required = true, num_args = 1..)]
    pub sources: Vec<String>,

    /// Destination folder (alias/bucket[/prefix])
    pub dest: String,

    /// Move instead of copy
    #[arg(long = "move")]
    pub move_items: bool,

    /// Re-run failed jobs up to this many times
    #[arg(long, default_value_t = 0)]
    pub retries: u32,
}

#[derive(Serialize)]
struct TransferOutput {
    jobs: Vec<TransferJob>,
    completed: usize,
    failed: usize,
    pending: usize,
}

impl TransferOutput {
    fn new(jobs: Vec<TransferJob>) -> Self {
        let count = |status: JobStatus| jobs.iter().filter(|j| j.status == status).count();
        Self {
            completed: count(JobStatus::Completed),
            failed: count(JobStatus::Error),
            pending: count(JobStatus::Pending),
            jobs,
        }
    }

    fn exit_code(&self) -> ExitCode {
        if self.pending > 0 {
            ExitCode::Interrupted
        } else if self.failed > 0 {
            ExitCode::GeneralError
        } else {
            ExitCode::Success
        }
    }
}

/// Execute the transfer command
pub async fn execute(args: TransferArgs, formatter: &Formatter) -> Result<ExitCode> {
    let dest = parse_remote(&args.dest)?;
    let sources = args
        .sources
        .iter()
        .map(|s| parse_remote(s))
        .collect::<Result<Vec<RemotePath>>>()?;
    let first = sources
        .first()
        .ok_or_else(|| Error::Precondition("no sources given".into()))?;

    let session = Session::open_for(&[first.alias.as_str(), dest.alias.as_str()]).await?;
    let (src_container, items) = session.resolve_all(&sources).await?;
    let mode = if args.move_items {
        TransferMode::Move
    } else {
        TransferMode::Copy
    };

    let tracker = TransferJobTracker::new(Arc::clone(&session.engine));
    let bars = TransferBars::new(formatter.config());
    for item in items {
        let label = item.name.clone();
        let request = RelocationRequest::new(
            item,
            src_container.clone(),
            dest.container(),
            &dest.key,
            mode,
        );
        bars.label(tracker.submit(request), label);
    }

    let sink = |progress: TransferProgress| {
        tracing::debug!(job = %progress.job_id, percent = progress.percent(), "transfer progress");
        bars.update(&progress);
    };
    tracker.run_pending(&sink).await;

    for round in 1..=args.retries {
        let failed: Vec<_> = tracker
            .jobs()
            .into_iter()
            .filter(|j| j.status == JobStatus::Error)
            .map(|j| j.id)
            .collect();
        if failed.is_empty() || session.interrupted() {
            break;
        }
        tracing::info!(round, jobs = failed.len(), "retrying failed transfers");
        for id in failed {
            tracker.retry(id, &sink).await?;
        }
    }

    let output = TransferOutput::new(tracker.jobs());
    if formatter.is_json() {
        formatter.json(&output);
        return Ok(output.exit_code());
    }
    if !bars.is_visible() {
        for job in &output.jobs {
            describe(formatter, job);
        }
    }
    formatter.println(&format!(
        "{} completed, {} failed, {} not started",
        output.completed, output.failed, output.pending
    ));
    Ok(output.exit_code())
}

fn describe(formatter: &Formatter, job: &TransferJob) {
    let name = &job.request.source.name;
    match job.status {
        JobStatus::Completed => formatter.success(&format!(
            "{name} -> {} ({})",
            job.request.dest_key(),
            humansize::format_size(job.total_bytes, humansize::BINARY)
        )),
        JobStatus::Error => formatter.error(&format!(
            "{name}: {} (attempts: {})",
            job.error.as_deref().unwrap_or("failed"),
            job.attempts
        )),
        JobStatus::Pending | JobStatus::Active => {
            formatter.warning(&format!("{name}: not started"));
        }
    }
}
