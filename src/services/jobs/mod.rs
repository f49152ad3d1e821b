//! Table-backed job queue
//!
//! Jobs are dispatched onto a named queue (`high`, `normal`, `low`) chosen
//! from their priority, claimed by workers, and moved to `failed_jobs` once
//! they run out of attempts.

pub mod handlers;
pub mod worker;

pub use worker::{start_workers, JobHandler, JobOutcome, JobWorker};

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::Serialize;

use crate::db::DbConn;
use crate::error::{AppError, Result};
use crate::models::prelude::*;
use crate::models::{failed_job, job};
use crate::services::retention;

pub const QUEUE_HIGH: &str = "high";
pub const QUEUE_NORMAL: &str = "normal";
pub const QUEUE_LOW: &str = "low";

/// Queues in the order workers drain them
pub const QUEUES: [&str; 3] = [QUEUE_HIGH, QUEUE_NORMAL, QUEUE_LOW];

pub const DEFAULT_PRIORITY: i32 = 3;

/// Map a priority (1 = most urgent, 5 = least) to a queue name
pub fn queue_for_priority(priority: i32) -> &'static str {
    match priority.clamp(1, 5) {
        1 | 2 => QUEUE_HIGH,
        4 | 5 => QUEUE_LOW,
        _ => QUEUE_NORMAL,
    }
}

#[derive(Clone)]
pub struct JobDispatcher {
    db: DbConn,
    max_attempts: i32,
}

impl JobDispatcher {
    pub fn new(db: DbConn, max_attempts: i32) -> Self {
        Self {
            db,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Queue a job on the queue matching its priority
    pub async fn dispatch(
        &self,
        job_type: &str,
        payload: serde_json::Value,
        priority: i32,
    ) -> Result<job::Model> {
        let queue = queue_for_priority(priority);
        self.dispatch_on(queue, job_type, payload, priority).await
    }

    /// Queue a job on an explicit queue
    pub async fn dispatch_on(
        &self,
        queue: &str,
        job_type: &str,
        payload: serde_json::Value,
        priority: i32,
    ) -> Result<job::Model> {
        if queue.trim().is_empty() {
            return Err(AppError::BadRequest("Queue name cannot be empty".to_string()));
        }
        if job_type.trim().is_empty() {
            return Err(AppError::BadRequest("Job type cannot be empty".to_string()));
        }

        let now = Utc::now();
        let created = job::ActiveModel {
            uuid: Set(uuid::Uuid::new_v4().to_string()),
            queue: Set(queue.to_string()),
            job_type: Set(job_type.to_string()),
            payload: Set(payload.to_string()),
            priority: Set(priority.clamp(1, 5)),
            attempts: Set(0),
            max_attempts: Set(self.max_attempts),
            reserved_at: Set(None),
            available_at: Set(now),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;

        tracing::info!(
            job_id = created.id,
            job_type = %created.job_type,
            queue = %created.queue,
            "Job dispatched"
        );
        Ok(created)
    }
}

// ============================================================================
// Queue management
// ============================================================================

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct QueueCount {
    pub queue: String,
    /// Available now
    pub ready: u64,
    /// Released with a retry delay
    pub delayed: u64,
    /// Claimed by a worker
    pub reserved: u64,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct QueueStats {
    pub queues: Vec<QueueCount>,
    pub pending_total: u64,
    pub failed: u64,
}

/// Pending jobs, optionally for one queue, in dispatch order
pub async fn pending(db: &DbConn, queue: Option<&str>) -> Result<Vec<job::Model>> {
    let mut query = Job::find();
    if let Some(queue) = queue {
        query = query.filter(job::Column::Queue.eq(queue));
    }
    Ok(query
        .order_by_asc(job::Column::AvailableAt)
        .order_by_asc(job::Column::Id)
        .all(db)
        .await?)
}

/// Reservations older than `reservation_timeout_secs` count as ready
pub async fn stats(db: &DbConn, reservation_timeout_secs: i64) -> Result<QueueStats> {
    let now = Utc::now();
    let stale_before = now - chrono::Duration::seconds(reservation_timeout_secs.max(1));
    let jobs = Job::find().all(db).await?;

    let mut names: Vec<String> = QUEUES.iter().map(|q| q.to_string()).collect();
    for j in &jobs {
        if !names.contains(&j.queue) {
            names.push(j.queue.clone());
        }
    }

    let queues = names
        .into_iter()
        .map(|name| {
            let in_queue = jobs.iter().filter(|j| j.queue == name);
            let mut count = QueueCount {
                queue: name.clone(),
                ready: 0,
                delayed: 0,
                reserved: 0,
            };
            for j in in_queue {
                if j.reserved_at.is_some_and(|at| at >= stale_before) {
                    count.reserved += 1;
                } else if j.available_at > now {
                    count.delayed += 1;
                } else {
                    count.ready += 1;
                }
            }
            count
        })
        .collect();

    Ok(QueueStats {
        queues,
        pending_total: jobs.len() as u64,
        failed: FailedJob::find().count(db).await?,
    })
}

pub async fn failed(db: &DbConn) -> Result<Vec<failed_job::Model>> {
    Ok(FailedJob::find()
        .order_by_desc(failed_job::Column::FailedAt)
        .all(db)
        .await?)
}

/// Push failed jobs back onto their queue with a fresh attempt budget
///
/// `id = None` retries every failed job. Returns the number retried.
pub async fn retry(db: &DbConn, id: Option<i64>, max_attempts: i32) -> Result<u64> {
    let txn = db.begin().await?;

    let failed_jobs = match id {
        Some(id) => {
            let found = FailedJob::find_by_id(id)
                .one(&txn)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Failed job {} not found", id)))?;
            vec![found]
        }
        None => FailedJob::find().all(&txn).await?,
    };

    let now = Utc::now();
    let mut retried = 0;
    for failed in failed_jobs {
        job::ActiveModel {
            uuid: Set(uuid::Uuid::new_v4().to_string()),
            queue: Set(failed.queue.clone()),
            job_type: Set(failed.job_type.clone()),
            payload: Set(failed.payload.clone()),
            priority: Set(failed.priority),
            attempts: Set(0),
            max_attempts: Set(max_attempts.max(1)),
            reserved_at: Set(None),
            available_at: Set(now),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
        FailedJob::delete_by_id(failed.id).exec(&txn).await?;
        retried += 1;
    }

    txn.commit().await?;
    if retried > 0 {
        tracing::info!(count = retried, "Retried failed jobs");
    }
    Ok(retried)
}

/// Delete one failed job; returns whether it existed
pub async fn forget(db: &DbConn, id: i64) -> Result<bool> {
    let result = FailedJob::delete_by_id(id).exec(db).await?;
    Ok(result.rows_affected > 0)
}

/// Delete failed jobs, optionally only those older than `older_than_days`
pub async fn flush_failed(db: &DbConn, older_than_days: Option<i64>) -> Result<u64> {
    let mut query = FailedJob::delete_many();
    if let Some(days) = older_than_days {
        let cutoff = retention::cutoff_before(Utc::now(), days)?;
        query = query.filter(failed_job::Column::FailedAt.lt(cutoff));
    }
    Ok(query.exec(db).await?.rows_affected)
}

pub async fn count_failed_older_than(db: &DbConn, days: i64) -> Result<u64> {
    let cutoff = retention::cutoff_before(Utc::now(), days)?;
    Ok(FailedJob::find()
        .filter(failed_job::Column::FailedAt.lt(cutoff))
        .count(db)
        .await?)
}

/// Remove every pending job from a queue
pub async fn clear(db: &DbConn, queue: &str) -> Result<u64> {
    let result = Job::delete_many()
        .filter(job::Column::Queue.eq(queue))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_for_priority() {
        assert_eq!(queue_for_priority(1), QUEUE_HIGH);
        assert_eq!(queue_for_priority(2), QUEUE_HIGH);
        assert_eq!(queue_for_priority(3), QUEUE_NORMAL);
        assert_eq!(queue_for_priority(4), QUEUE_LOW);
        assert_eq!(queue_for_priority(5), QUEUE_LOW);
    }

    #[test]
    fn test_queue_for_priority_clamps() {
        assert_eq!(queue_for_priority(-10), QUEUE_HIGH);
        assert_eq!(queue_for_priority(0), QUEUE_HIGH);
        assert_eq!(queue_for_priority(6), QUEUE_LOW);
        assert_eq!(queue_for_priority(i32::MAX), QUEUE_LOW);
    }
}
