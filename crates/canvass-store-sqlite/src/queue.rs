//! [`SqliteQueue`]: the durable notification queue.
//!
//! Jobs live in their own database file, separate from the feedback store.
//! Claiming is a single `UPDATE … RETURNING` statement, so two workers can
//! never take the same job. Completed jobs are deleted; failed jobs stay.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;

use canvass_core::{
  job::{JobCounts, JobState, NotificationJob, QueuedJob},
  store::JobQueue,
};

use crate::{
  Result,
  encode::{JOB_COLUMNS, RawJob, encode_dt, encode_payload},
  schema::QUEUE_SCHEMA,
};

/// A notification queue backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteQueue {
  conn: tokio_rusqlite::Connection,
}

impl SqliteQueue {
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let queue = Self { conn };
    queue.init_schema().await?;
    Ok(queue)
  }

  /// Open an in-memory queue for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let queue = Self { conn };
    queue.init_schema().await?;
    Ok(queue)
  }

  /// Shut down the background connection thread. Every later call fails,
  /// which is how an unreachable queue looks to callers.
  pub async fn close(self) -> Result<()> {
    self.conn.close().await?;
    Ok(())
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(QUEUE_SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

impl JobQueue for SqliteQueue {
  type Error = crate::Error;

  async fn enqueue(&self, job: NotificationJob, max_attempts: u32) -> Result<QueuedJob> {
    let now_str = encode_dt(Utc::now());
    let payload = encode_payload(&job)?;
    let name    = job.name.clone();

    let raw: RawJob = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          &format!(
            "INSERT INTO notification_jobs (
               name, payload, state, attempts, max_attempts, enqueued_at, next_attempt_at
             ) VALUES (?1, ?2, 'pending', 0, ?3, ?4, ?4)
             RETURNING {JOB_COLUMNS}"
          ),
          rusqlite::params![name, payload, max_attempts, now_str],
          RawJob::from_row,
        )?)
      })
      .await?;

    raw.into_job()
  }

  async fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<QueuedJob>> {
    let now_str = encode_dt(now);

    let raw: Option<RawJob> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!(
              "UPDATE notification_jobs
               SET state = 'active', attempts = attempts + 1
               WHERE job_id = (
                 SELECT job_id FROM notification_jobs
                 WHERE state = 'pending' AND next_attempt_at <= ?1
                 ORDER BY job_id
                 LIMIT 1
               )
               RETURNING {JOB_COLUMNS}"
            ),
            rusqlite::params![now_str],
            RawJob::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawJob::into_job).transpose()
  }

  async fn complete(&self, job_id: i64) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "DELETE FROM notification_jobs WHERE job_id = ?1",
          rusqlite::params![job_id],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn fail(
    &self,
    job_id: i64,
    error: String,
    retry_at: Option<DateTime<Utc>>,
  ) -> Result<()> {
    let now_str = encode_dt(Utc::now());
    let retry_str = retry_at.map(encode_dt);

    self
      .conn
      .call(move |conn| {
        match retry_str {
          Some(at) => conn.execute(
            "UPDATE notification_jobs
             SET state = 'pending', last_error = ?2, next_attempt_at = ?3
             WHERE job_id = ?1",
            rusqlite::params![job_id, error, at],
          )?,
          None => conn.execute(
            "UPDATE notification_jobs
             SET state = 'failed', last_error = ?2, finished_at = ?3
             WHERE job_id = ?1",
            rusqlite::params![job_id, error, now_str],
          )?,
        };
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get_job(&self, job_id: i64) -> Result<Option<QueuedJob>> {
    let raw: Option<RawJob> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {JOB_COLUMNS} FROM notification_jobs WHERE job_id = ?1"),
            rusqlite::params![job_id],
            RawJob::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawJob::into_job).transpose()
  }

  async fn list_jobs(&self, state: JobState) -> Result<Vec<QueuedJob>> {
    let state_str = state.as_str();

    let raws: Vec<RawJob> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {JOB_COLUMNS} FROM notification_jobs WHERE state = ?1 ORDER BY job_id"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![state_str], RawJob::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawJob::into_job).collect()
  }

  async fn counts(&self) -> Result<JobCounts> {
    let rows: Vec<(String, i64)> = self
      .conn
      .call(|conn| {
        let mut stmt = conn
          .prepare("SELECT state, COUNT(*) FROM notification_jobs GROUP BY state")?;
        let rows = stmt
          .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    let mut counts = JobCounts::default();
    for (state, n) in rows {
      let n = n as u64;
      match state.parse::<JobState>()? {
        JobState::Pending => counts.pending = n,
        JobState::Active => counts.active = n,
        JobState::Failed => counts.failed = n,
      }
    }
    Ok(counts)
  }

  async fn requeue(&self, job_id: i64) -> Result<bool> {
    let now_str = encode_dt(Utc::now());
    let n = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE notification_jobs
           SET state = 'pending', attempts = 0, next_attempt_at = ?2, finished_at = NULL
           WHERE job_id = ?1 AND state = 'failed'",
          rusqlite::params![job_id, now_str],
        )?)
      })
      .await?;
    Ok(n > 0)
  }

  // The interrupted attempt is handed back; delivery stays at-least-once.
  async fn recover_stalled(&self) -> Result<usize> {
    let n = self
      .conn
      .call(|conn| {
        Ok(conn.execute(
          "UPDATE notification_jobs
           SET state = 'pending', attempts = MAX(attempts - 1, 0)
           WHERE state = 'active'",
          [],
        )?)
      })
      .await?;
    Ok(n)
  }
}
