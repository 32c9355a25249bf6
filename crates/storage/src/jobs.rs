use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use thiserror::Error;

use hris_core::store::StoreError;
use hris_core::types::{Job, JobId, NewJob};

use crate::{backend, to_rfc3339, violation, Violation};

/// Repository for job openings.
#[derive(Clone)]
pub struct JobRepository {
    pool: SqlitePool,
}

const SELECT_JOB: &str =
    "SELECT id, job_code, title, department, requires_assessment, is_active, closed_at, \
            created_at \
       FROM jobs WHERE id = ?";

impl JobRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Inserts a job opening; job codes are unique.
    pub async fn create(&self, job: &NewJob, at: DateTime<Utc>) -> Result<Job, JobError> {
        let code = job.job_code.trim();
        let mut tx = self.pool.begin().await?;

        let id = sqlx::query(
            "INSERT INTO jobs (job_code, title, department, requires_assessment, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(code)
        .bind(&job.title)
        .bind(&job.department)
        .bind(job.requires_assessment)
        .bind(to_rfc3339(at))
        .execute(&mut *tx)
        .await
        .map_err(|err| match violation(&err) {
            Some(Violation::Unique) => JobError::DuplicateCode(code.to_string()),
            _ => JobError::Database(err),
        })?
        .last_insert_rowid();

        let row = sqlx::query_as::<_, JobRow>(SELECT_JOB)
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(row.into())
    }

    pub async fn fetch(&self, id: JobId) -> Result<Option<Job>, JobError> {
        let row = sqlx::query_as::<_, JobRow>(SELECT_JOB)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Job::from))
    }

    /// Open jobs, newest first.
    pub async fn list_active(&self) -> Result<Vec<Job>, JobError> {
        let rows = sqlx::query_as::<_, JobRow>(
            "SELECT id, job_code, title, department, requires_assessment, is_active, closed_at, \
                    created_at \
               FROM jobs WHERE is_active = 1 ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Job::from).collect())
    }

    /// Marks a job inactive. Closing twice keeps the first `closed_at`.
    pub async fn close(&self, id: JobId, at: DateTime<Utc>) -> Result<Option<Job>, JobError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE jobs SET is_active = 0, closed_at = COALESCE(closed_at, ?) WHERE id = ?",
        )
        .bind(to_rfc3339(at))
        .bind(id.0)
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query_as::<_, JobRow>(SELECT_JOB)
            .bind(id.0)
            .fetch_optional(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(row.map(Job::from))
    }

    /// Whether the job gates shortlisting behind an assessment, if the job exists.
    pub async fn requires_assessment(&self, id: JobId) -> Result<Option<bool>, StoreError> {
        let flag: Option<(bool,)> =
            sqlx::query_as("SELECT requires_assessment FROM jobs WHERE id = ?")
                .bind(id.0)
                .fetch_optional(&self.pool)
                .await
                .map_err(backend)?;

        Ok(flag.map(|(required,)| required))
    }
}

/// Errors raised by the job repository.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("job code '{0}' is already in use")]
    DuplicateCode(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: i64,
    job_code: String,
    title: String,
    department: String,
    requires_assessment: bool,
    is_active: bool,
    closed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<JobRow> for Job {
    fn from(row: JobRow) -> Self {
        Self {
            id: JobId(row.id),
            job_code: row.job_code,
            title: row.title,
            department: row.department,
            requires_assessment: row.requires_assessment,
            is_active: row.is_active,
            closed_at: row.closed_at,
            created_at: row.created_at,
        }
    }
}
