use std::time::Duration;

use anyhow::Result;
use clap::Subcommand;

use crate::cli::output::{self, print_table};
use crate::models::audit_log::{AuditAction, ResourceType};
use crate::services::audit::Actor;
use crate::services::jobs::{self, handlers::default_worker, JobOutcome, DEFAULT_PRIORITY, QUEUES};
use crate::state::AppState;

#[derive(Debug, Subcommand)]
pub enum JobsCommand {
    /// Queue a job; the queue follows from the priority unless --queue is given
    Dispatch {
        job_type: String,
        /// JSON payload
        #[arg(long, default_value = "null")]
        payload: String,
        /// 1 (most urgent) to 5
        #[arg(long, default_value_t = DEFAULT_PRIORITY, value_parser = clap::value_parser!(i32).range(1..=5))]
        priority: i32,
        #[arg(long)]
        queue: Option<String>,
    },
    /// List pending jobs
    List {
        #[arg(long)]
        queue: Option<String>,
    },
    /// Per-queue counts
    Stats,
    /// List failed jobs
    Failed,
    /// Push failed jobs back onto their queue
    Retry {
        /// Failed job id
        id: Option<i64>,
        /// Retry every failed job
        #[arg(long, conflicts_with = "id")]
        all: bool,
    },
    /// Delete one failed job
    Forget { id: i64 },
    /// Delete failed jobs
    Flush {
        /// Only those older than this many days
        #[arg(long)]
        older_than: Option<u32>,
    },
    /// Remove every pending job from a queue
    Clear { queue: String },
    /// Process jobs
    Work {
        /// Queues in priority order (defaults to high, normal, low)
        #[arg(long, value_delimiter = ',')]
        queue: Vec<String>,
        /// Stop once the queues are empty
        #[arg(long)]
        stop_when_empty: bool,
    },
}

pub async fn run(state: &AppState, command: JobsCommand) -> Result<()> {
    let actor = Actor::console();
    match command {
        JobsCommand::Dispatch {
            job_type,
            payload,
            priority,
            queue,
        } => {
            let payload: serde_json::Value = serde_json::from_str(&payload)
                .map_err(|e| anyhow::anyhow!("Payload is not valid JSON: {}", e))?;
            let dispatched = match queue.as_deref() {
                Some(queue) => state.jobs.dispatch_on(queue, &job_type, payload, priority).await?,
                None => state.jobs.dispatch(&job_type, payload, priority).await?,
            };
            state
                .audit
                .log_success(
                    AuditAction::JobDispatched,
                    ResourceType::Job,
                    Some(dispatched.id.to_string()),
                    &actor,
                    Some(serde_json::json!({ "job_type": job_type, "queue": dispatched.queue })),
                )
                .await;
            output::success(format!(
                "Job {} ({}) dispatched on the {} queue",
                dispatched.id, dispatched.job_type, dispatched.queue
            ));
        }
        JobsCommand::List { queue } => {
            let rows: Vec<Vec<String>> = jobs::pending(&state.db, queue.as_deref())
                .await?
                .into_iter()
                .map(|j| {
                    vec![
                        j.id.to_string(),
                        j.queue,
                        j.job_type,
                        j.priority.to_string(),
                        format!("{}/{}", j.attempts, j.max_attempts),
                        j.available_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                        if j.reserved_at.is_some() { "yes" } else { "no" }.to_string(),
                    ]
                })
                .collect();
            print_table(
                &["ID", "Queue", "Type", "Priority", "Attempts", "Available", "Reserved"],
                &rows,
            );
        }
        JobsCommand::Stats => {
            let stats = jobs::stats(&state.db, state.queue.reservation_timeout_secs).await?;
            let rows: Vec<Vec<String>> = stats
                .queues
                .iter()
                .map(|q| {
                    vec![
                        q.queue.clone(),
                        q.ready.to_string(),
                        q.delayed.to_string(),
                        q.reserved.to_string(),
                    ]
                })
                .collect();
            print_table(&["Queue", "Ready", "Delayed", "Reserved"], &rows);
            println!("Pending: {}  Failed: {}", stats.pending_total, stats.failed);
        }
        JobsCommand::Failed => {
            let rows: Vec<Vec<String>> = jobs::failed(&state.db)
                .await?
                .into_iter()
                .map(|f| {
                    vec![
                        f.id.to_string(),
                        f.queue,
                        f.job_type,
                        f.failed_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                        f.exception.lines().next().unwrap_or_default().to_string(),
                    ]
                })
                .collect();
            print_table(&["ID", "Queue", "Type", "Failed at", "Error"], &rows);
        }
        JobsCommand::Retry { id, all } => {
            if id.is_none() && !all {
                anyhow::bail!("Pass a failed job id or --all");
            }
            let count = jobs::retry(&state.db, id, state.queue.max_attempts).await?;
            state
                .audit
                .log_success(
                    AuditAction::JobsRetried,
                    ResourceType::Job,
                    id.map(|id| id.to_string()),
                    &actor,
                    Some(serde_json::json!({ "count": count })),
                )
                .await;
            output::success(format!("{} failed job(s) pushed back onto their queue", count));
        }
        JobsCommand::Forget { id } => {
            if !jobs::forget(&state.db, id).await? {
                anyhow::bail!("Failed job {} not found", id);
            }
            output::success(format!("Failed job {} deleted", id));
        }
        JobsCommand::Flush { older_than } => {
            let count = jobs::flush_failed(&state.db, older_than.map(i64::from)).await?;
            state
                .audit
                .log_success(
                    AuditAction::JobsFlushed,
                    ResourceType::Job,
                    None,
                    &actor,
                    Some(serde_json::json!({ "count": count })),
                )
                .await;
            output::success(format!("{} failed job(s) deleted", count));
        }
        JobsCommand::Clear { queue } => {
            let count = jobs::clear(&state.db, &queue).await?;
            output::success(format!("{} job(s) removed from the {} queue", count, queue));
        }
        JobsCommand::Work {
            queue,
            stop_when_empty,
        } => {
            let queues = if queue.is_empty() {
                QUEUES.iter().map(|q| q.to_string()).collect()
            } else {
                queue
            };
            let worker = default_worker(state);
            println!("Registered handlers: {}", worker.registered_types().join(", "));

            if stop_when_empty {
                let mut processed = 0;
                while let Some((job, outcome)) = worker.run_next(&queues).await? {
                    report_outcome(&job.job_type, job.id, &outcome);
                    processed += 1;
                }
                output::success(format!("Processed {} job(s)", processed));
            } else {
                println!("Working {} (Ctrl+C to stop)", queues.join(", "));
                let poll = Duration::from_millis(state.queue.poll_interval_ms);
                tokio::select! {
                    _ = worker.run(queues, poll) => {}
                    _ = tokio::signal::ctrl_c() => {
                        output::success("Worker stopped");
                    }
                }
            }
        }
    }
    Ok(())
}

fn report_outcome(job_type: &str, id: i64, outcome: &JobOutcome) {
    match outcome {
        JobOutcome::Completed => output::success(format!("{} #{} completed", job_type, id)),
        JobOutcome::Released { retry_at } => output::warning(format!(
            "{} #{} failed, retrying at {}",
            job_type,
            id,
            retry_at.format("%H:%M:%S")
        )),
        JobOutcome::Failed { error } => {
            output::failure(format!("{} #{} failed permanently: {}", job_type, id, error))
        }
    }
}
