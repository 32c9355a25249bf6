use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{error::DatabaseError, migrate::MigrateError, sqlite::SqlitePoolOptions, SqlitePool};
use thiserror::Error;

use hris_core::onboarding::OnboardingChecklist;
use hris_core::pass::{PassId, PassKind};
use hris_core::profile::{NewProfile, PassHolder};
use hris_core::store::{
    ApplicationStore, CreateProfileOutcome, OnboardingStore, ProfileStore, StatusWrite,
    StoreError, WriteOutcome,
};
use hris_core::types::{Application, ApplicationId, CandidateId, JobId, NewApplication, TaskId};

mod applications;
mod jobs;
mod onboarding;
mod profiles;
mod reporting;

pub use applications::ApplicationRepository;
pub use jobs::{JobError, JobRepository};
pub use onboarding::OnboardingRepository;
pub use profiles::ProfileRepository;
pub use reporting::ReportingRepository;

/// Top-level database handle that owns the SQLite connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Establishes a new SQLite connection pool for the provided connection string.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(StorageError::Connect)?;

        apply_pragmas(&pool).await?;

        Ok(Self { pool })
    }

    /// Applies migrations located under `migrations/`.
    pub async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(StorageError::Migration)?;
        Ok(())
    }

    /// Returns a handle to operate on applications.
    pub fn applications(&self) -> ApplicationRepository {
        ApplicationRepository::new(self.pool.clone())
    }

    /// Returns a handle for job openings.
    pub fn jobs(&self) -> JobRepository {
        JobRepository::new(self.pool.clone())
    }

    /// Returns a handle for passes and the profiles bound to them.
    pub fn profiles(&self) -> ProfileRepository {
        ProfileRepository::new(self.pool.clone())
    }

    /// Returns a handle for onboarding checklists and tasks.
    pub fn onboarding(&self) -> OnboardingRepository {
        OnboardingRepository::new(self.pool.clone())
    }

    /// Returns a handle for HR listings and analytics.
    pub fn reporting(&self) -> ReportingRepository {
        ReportingRepository::new(self.pool.clone())
    }

    /// Exposes the inner pool when lower level access is required.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

async fn apply_pragmas(pool: &SqlitePool) -> Result<(), StorageError> {
    sqlx::query("PRAGMA foreign_keys = ON;")
        .execute(pool)
        .await
        .map_err(StorageError::Pragma)?;

    sqlx::query("PRAGMA journal_mode = WAL;")
        .fetch_one(pool)
        .await
        .map_err(StorageError::Pragma)?;

    sqlx::query("PRAGMA synchronous = NORMAL;")
        .execute(pool)
        .await
        .map_err(StorageError::Pragma)?;

    sqlx::query("PRAGMA busy_timeout = 5000;")
        .execute(pool)
        .await
        .map_err(StorageError::Pragma)?;

    Ok(())
}

/// General storage level errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to connect to sqlite: {0}")]
    Connect(sqlx::Error),
    #[error("failed to apply pragma: {0}")]
    Pragma(sqlx::Error),
    #[error("failed to run database migrations: {0}")]
    Migration(MigrateError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
impl ApplicationStore for Database {
    async fn get_application(
        &self,
        id: ApplicationId,
    ) -> Result<Option<Application>, StoreError> {
        self.applications().fetch(id).await
    }

    async fn create_application(&self, new: &NewApplication) -> Result<Application, StoreError> {
        self.applications().insert(new).await
    }

    async fn commit_transition(&self, write: &StatusWrite) -> Result<WriteOutcome, StoreError> {
        self.applications().commit_transition(write).await
    }

    async fn job_requires_assessment(&self, job_id: JobId) -> Result<Option<bool>, StoreError> {
        self.jobs().requires_assessment(job_id).await
    }
}

#[async_trait]
impl ProfileStore for Database {
    async fn pass_exists(&self, pass: &PassId) -> Result<bool, StoreError> {
        self.profiles().pass_exists(pass).await
    }

    async fn create_profile_with_pass(
        &self,
        pass: &PassId,
        profile: &NewProfile,
        at: DateTime<Utc>,
    ) -> Result<CreateProfileOutcome, StoreError> {
        self.profiles().create_with_pass(pass, profile, at).await
    }

    async fn find_profile_by_pass(
        &self,
        kind: PassKind,
        pass: &PassId,
    ) -> Result<Option<PassHolder>, StoreError> {
        self.profiles().find_by_pass(kind, pass).await
    }
}

#[async_trait]
impl OnboardingStore for Database {
    async fn checklist_for(
        &self,
        candidate_id: CandidateId,
        job_id: JobId,
    ) -> Result<Option<OnboardingChecklist>, StoreError> {
        self.onboarding().fetch_for_pair(candidate_id, job_id).await
    }

    async fn task_owner(&self, task_id: TaskId) -> Result<Option<CandidateId>, StoreError> {
        self.onboarding().task_owner(task_id).await
    }

    async fn complete_task(
        &self,
        task_id: TaskId,
        at: DateTime<Utc>,
    ) -> Result<Option<OnboardingChecklist>, StoreError> {
        self.onboarding().complete_task(task_id, at).await
    }
}

/// Constraint family reported by SQLite for a failed write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Violation {
    Unique,
    ForeignKey,
}

fn violation(err: &sqlx::Error) -> Option<Violation> {
    let sqlx::Error::Database(db_err) = err else {
        return None;
    };
    violation_of(db_err.as_ref())
}

fn violation_of(db_err: &dyn DatabaseError) -> Option<Violation> {
    match db_err.code().as_deref() {
        // SQLITE_CONSTRAINT_UNIQUE and SQLITE_CONSTRAINT_PRIMARYKEY
        Some("2067") | Some("1555") => Some(Violation::Unique),
        // SQLITE_CONSTRAINT_FOREIGNKEY
        Some("787") => Some(Violation::ForeignKey),
        _ => None,
    }
}

/// Maps constraint violations onto the port's error variants.
fn store_error(err: sqlx::Error) -> StoreError {
    match violation(&err) {
        Some(Violation::Unique) => StoreError::Duplicate,
        Some(Violation::ForeignKey) => StoreError::MissingReference,
        None => backend(err),
    }
}

fn backend(err: sqlx::Error) -> StoreError {
    StoreError::Backend(Box::new(err))
}

fn to_rfc3339(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}


#[cfg(test)]
mod tests {
    use super::test_support::setup_db;

    #[tokio::test]
    async fn migrations_apply() {
        let test = setup_db().await;

        let tables: (i64,) =
            sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN \
             ('jobs', 'passes', 'agencies', 'candidates', 'employees', 'applications', \
              'onboarding_checklists', 'onboarding_tasks')",
        )
                .fetch_one(test.db.pool())
                .await
                .expect("fetch tables");
        assert_eq!(tables.0, 8, "expected domain tables to be created");
    }

    #[tokio::test]
    async fn foreign_keys_are_enforced() {
        let test = setup_db().await;

        let (enabled,): (i64,) = sqlx::query_as("PRAGMA foreign_keys")
            .fetch_one(test.db.pool())
            .await
            .expect("pragma");
        assert_eq!(enabled, 1);
    }
}
