use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction};

use hris_core::onboarding::{OnboardingSeed, OnboardingStatus};
use hris_core::store::{StatusWrite, StoreError, WriteOutcome};
use hris_core::types::{
    Application, ApplicationId, CandidateId, ChecklistId, JobId, MatchScore, NewApplication,
};

use crate::{backend, store_error, to_rfc3339};

/// Repository for application rows and their status writes.
#[derive(Clone)]
pub struct ApplicationRepository {
    pool: SqlitePool,
}

const SELECT_APPLICATION: &str =
    "SELECT id, candidate_id, job_id, status, match_score, created_at, updated_at \
       FROM applications WHERE id = ?";

impl ApplicationRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn fetch(&self, id: ApplicationId) -> Result<Option<Application>, StoreError> {
        let row = sqlx::query_as::<_, ApplicationRow>(SELECT_APPLICATION)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

        row.map(ApplicationRow::into_domain).transpose()
    }

    /// Inserts an `applied` row and reads it back before committing.
    pub async fn insert(&self, new: &NewApplication) -> Result<Application, StoreError> {
        let created_at = to_rfc3339(new.created_at);
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let id = sqlx::query(
            "INSERT INTO applications \
             (candidate_id, job_id, status, match_score, created_at, updated_at) \
             VALUES (?, ?, 'applied', ?, ?, ?)",
        )
        .bind(new.candidate_id.0)
        .bind(new.job_id.0)
        .bind(new.match_score.map(MatchScore::value))
        .bind(&created_at)
        .bind(&created_at)
        .execute(&mut *tx)
        .await
        .map_err(store_error)?
        .last_insert_rowid();

        let row = sqlx::query_as::<_, ApplicationRow>(SELECT_APPLICATION)
            .bind(id)
            .fetch_one(&mut *tx)
            .await
            .map_err(backend)?;

        tx.commit().await.map_err(backend)?;
        row.into_domain()
    }

    /// Applies a status change only while the row still holds the expected status.
    pub async fn commit_transition(&self, write: &StatusWrite) -> Result<WriteOutcome, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let updated = sqlx::query(
            "UPDATE applications SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(write.target.as_str())
        .bind(to_rfc3339(write.at))
        .bind(write.application_id.0)
        .bind(write.expected.as_str())
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        if updated.rows_affected() == 0 {
            tx.rollback().await.map_err(backend)?;
            return Ok(WriteOutcome::Conflict);
        }

        let checklist_id = match &write.onboarding {
            Some(seed) => Some(seed_checklist(&mut tx, seed).await?),
            None => None,
        };

        tx.commit().await.map_err(backend)?;
        Ok(WriteOutcome::Applied { checklist_id })
    }
}

async fn seed_checklist(
    tx: &mut Transaction<'_, Sqlite>,
    seed: &OnboardingSeed,
) -> Result<ChecklistId, StoreError> {
    let checklist_id = sqlx::query(
        "INSERT INTO onboarding_checklists (candidate_id, job_id, status, start_date) \
         VALUES (?, ?, ?, ?)",
    )
    .bind(seed.candidate_id.0)
    .bind(seed.job_id.0)
    .bind(OnboardingStatus::Pending.as_str())
    .bind(to_rfc3339(seed.start_date))
    .execute(&mut **tx)
    .await
    .map_err(store_error)?
    .last_insert_rowid();

    for (position, task) in seed.tasks.iter().enumerate() {
        sqlx::query(
            "INSERT INTO onboarding_tasks \
             (checklist_id, position, name, category, required, completed) \
             VALUES (?, ?, ?, ?, ?, 0)",
        )
        .bind(checklist_id)
        .bind(position as i64)
        .bind(task.name)
        .bind(task.category.as_str())
        .bind(task.required)
        .execute(&mut **tx)
        .await
        .map_err(store_error)?;
    }

    Ok(ChecklistId(checklist_id))
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ApplicationRow {
    pub id: i64,
    pub candidate_id: i64,
    pub job_id: i64,
    pub status: String,
    pub match_score: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApplicationRow {
    pub(crate) fn into_domain(self) -> Result<Application, StoreError> {
        let status = self
            .status
            .parse()
            .map_err(|err| StoreError::Corrupt(format!("application {}: {err}", self.id)))?;
        let match_score = self
            .match_score
            .map(|value| {
                MatchScore::new(value).ok_or_else(|| {
                    StoreError::Corrupt(format!("application {}: match score {value}", self.id))
                })
            })
            .transpose()?;
        Ok(Application {
            id: ApplicationId(self.id),
            candidate_id: CandidateId(self.candidate_id),
            job_id: JobId(self.job_id),
            status,
            match_score,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
