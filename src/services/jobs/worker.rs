//! Queue worker: claims jobs, runs their handler, retries or fails them

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, Condition, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use tokio::task::JoinHandle;

use crate::db::DbConn;
use crate::error::Result;
use crate::models::prelude::*;
use crate::models::{failed_job, job};
use crate::services::notification::{NotificationKind, NotificationService};

use super::handlers::SEND_EMAIL;

/// Default age after which a reservation counts as abandoned
pub const DEFAULT_RESERVATION_TIMEOUT_SECS: i64 = 300;

/// Handler for one job type
#[async_trait]
pub trait JobHandler: Send + Sync {
    fn job_type(&self) -> &'static str;

    async fn handle(&self, payload: serde_json::Value) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed,
    /// Failed but will be retried at `retry_at`
    Released { retry_at: DateTime<Utc> },
    /// Moved to `failed_jobs`
    Failed { error: String },
}

#[derive(Clone)]
pub struct JobWorker {
    db: DbConn,
    handlers: HashMap<&'static str, Arc<dyn JobHandler>>,
    retry_delay_secs: i64,
    reservation_timeout_secs: i64,
    notifications: Option<NotificationService>,
}

impl JobWorker {
    pub fn new(db: DbConn, retry_delay_secs: i64) -> Self {
        Self {
            db,
            handlers: HashMap::new(),
            retry_delay_secs: retry_delay_secs.max(0),
            reservation_timeout_secs: DEFAULT_RESERVATION_TIMEOUT_SECS,
            notifications: None,
        }
    }

    /// Reclaim jobs whose reservation is older than `secs` (a worker died mid-job)
    pub fn with_reservation_timeout(mut self, secs: i64) -> Self {
        self.reservation_timeout_secs = secs.max(1);
        self
    }

    pub fn register(mut self, handler: Arc<dyn JobHandler>) -> Self {
        self.handlers.insert(handler.job_type(), handler);
        self
    }

    /// Notify administrators when a job exhausts its attempts
    pub fn with_notifications(mut self, notifications: NotificationService) -> Self {
        self.notifications = Some(notifications);
        self
    }

    pub fn registered_types(&self) -> Vec<&'static str> {
        let mut types: Vec<&'static str> = self.handlers.keys().copied().collect();
        types.sort();
        types
    }

    /// Claim and run the oldest available job on `queue`
    pub async fn run_once(&self, queue: &str) -> Result<Option<(job::Model, JobOutcome)>> {
        let Some(job) = self.claim(queue).await? else {
            return Ok(None);
        };

        let result = self.execute(&job).await;
        let outcome = match result {
            Ok(()) => {
                Job::delete_by_id(job.id).exec(&self.db).await?;
                tracing::info!(job_id = job.id, job_type = %job.job_type, "Job completed");
                JobOutcome::Completed
            }
            Err(JobError::Permanent(error)) => self.fail(&job, error).await?,
            Err(JobError::Retryable(error)) if job.attempts >= job.max_attempts => {
                self.fail(&job, error).await?
            }
            Err(JobError::Retryable(error)) => self.release(&job, error).await?,
        };

        Ok(Some((job, outcome)))
    }

    /// Run the next job from the first non-empty queue in order
    pub async fn run_next(&self, queues: &[String]) -> Result<Option<(job::Model, JobOutcome)>> {
        for queue in queues {
            if let Some(done) = self.run_once(queue).await? {
                return Ok(Some(done));
            }
        }
        Ok(None)
    }

    /// Process jobs until every queue has nothing available; returns the count
    pub async fn drain(&self, queues: &[String]) -> Result<usize> {
        let mut processed = 0;
        while self.run_next(queues).await?.is_some() {
            processed += 1;
        }
        Ok(processed)
    }

    /// Poll `queues` forever
    pub async fn run(&self, queues: Vec<String>, poll_interval: Duration) {
        tracing::info!(queues = ?queues, "Queue worker started");
        loop {
            match self.run_next(&queues).await {
                Ok(Some(_)) => continue,
                Ok(None) => tokio::time::sleep(poll_interval).await,
                Err(e) => {
                    tracing::error!(error = %e, "Queue worker error");
                    tokio::time::sleep(poll_interval).await;
                }
            }
        }
    }

    async fn claim(&self, queue: &str) -> Result<Option<job::Model>> {
        let now = Utc::now();
        let stale_before = now - chrono::Duration::seconds(self.reservation_timeout_secs);
        let candidate = Job::find()
            .filter(job::Column::Queue.eq(queue))
            .filter(
                Condition::any()
                    .add(job::Column::ReservedAt.is_null())
                    .add(job::Column::ReservedAt.lt(stale_before)),
            )
            .filter(job::Column::AvailableAt.lte(now))
            .order_by_asc(job::Column::AvailableAt)
            .order_by_asc(job::Column::Id)
            .one(&self.db)
            .await?;

        let Some(candidate) = candidate else {
            return Ok(None);
        };

        if let Some(reserved_at) = candidate.reserved_at {
            tracing::warn!(
                job_id = candidate.id,
                job_type = %candidate.job_type,
                reserved_at = %reserved_at,
                "Reclaiming job with an expired reservation"
            );
        }

        // Only one worker wins the conditional update
        let unchanged = match candidate.reserved_at {
            Some(reserved_at) => job::Column::ReservedAt.eq(reserved_at),
            None => job::Column::ReservedAt.is_null(),
        };
        let claimed = Job::update_many()
            .col_expr(job::Column::ReservedAt, Expr::value(now))
            .col_expr(
                job::Column::Attempts,
                Expr::col(job::Column::Attempts).add(1),
            )
            .filter(job::Column::Id.eq(candidate.id))
            .filter(unchanged)
            .exec(&self.db)
            .await?;

        if claimed.rows_affected != 1 {
            return Ok(None);
        }

        Ok(Some(job::Model {
            attempts: candidate.attempts + 1,
            reserved_at: Some(now),
            ..candidate
        }))
    }

    async fn execute(&self, job: &job::Model) -> std::result::Result<(), JobError> {
        let handler = self.handlers.get(job.job_type.as_str()).ok_or_else(|| {
            JobError::Permanent(format!(
                "No handler registered for job type '{}'",
                job.job_type
            ))
        })?;

        let payload: serde_json::Value = serde_json::from_str(&job.payload)
            .map_err(|e| JobError::Permanent(format!("Invalid job payload: {}", e)))?;

        handler
            .handle(payload)
            .await
            .map_err(|e| JobError::Retryable(format!("{:#}", e)))
    }

    async fn release(&self, job: &job::Model, error: String) -> Result<JobOutcome> {
        let retry_at =
            Utc::now() + chrono::Duration::seconds(self.retry_delay_secs * job.attempts as i64);

        let mut active: job::ActiveModel = job.clone().into();
        active.reserved_at = Set(None);
        active.available_at = Set(retry_at);
        active.update(&self.db).await?;

        tracing::warn!(
            job_id = job.id,
            job_type = %job.job_type,
            attempts = job.attempts,
            error = %error,
            "Job failed, released for retry"
        );
        Ok(JobOutcome::Released { retry_at })
    }

    async fn fail(&self, job: &job::Model, error: String) -> Result<JobOutcome> {
        let txn = self.db.begin().await?;
        failed_job::ActiveModel {
            uuid: Set(job.uuid.clone()),
            queue: Set(job.queue.clone()),
            job_type: Set(job.job_type.clone()),
            payload: Set(job.payload.clone()),
            priority: Set(job.priority),
            exception: Set(error.clone()),
            failed_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
        Job::delete_by_id(job.id).exec(&txn).await?;
        txn.commit().await?;

        tracing::error!(
            job_id = job.id,
            job_type = %job.job_type,
            attempts = job.attempts,
            error = %error,
            "Job moved to failed jobs"
        );

        // A failing notification mail must not trigger another notification
        if job.job_type != SEND_EMAIL {
            if let Some(notifications) = &self.notifications {
                let subject = format!("Job {} failed", job.job_type);
                let body = format!(
                    "Job {} on queue {} failed after {} attempt(s):\n\n{}",
                    job.job_type, job.queue, job.attempts, error
                );
                if let Err(e) = notifications
                    .notify_admins(NotificationKind::JobFailure, &subject, &body)
                    .await
                {
                    tracing::warn!(error = %e, "Failed to notify about job failure");
                }
            }
        }

        Ok(JobOutcome::Failed { error })
    }
}

enum JobError {
    Permanent(String),
    Retryable(String),
}

/// Spawn one polling task per queue
pub fn start_workers(
    worker: Arc<JobWorker>,
    queues: &[String],
    poll_interval: Duration,
) -> Vec<JoinHandle<()>> {
    queues
        .iter()
        .map(|queue| {
            let worker = worker.clone();
            let queues = vec![queue.clone()];
            tokio::spawn(async move {
                worker.run(queues, poll_interval).await;
            })
        })
        .collect()
}
