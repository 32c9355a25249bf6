use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};

use hris_core::onboarding::{OnboardingChecklist, OnboardingStatus, OnboardingTask, TaskCategory};
use hris_core::store::StoreError;
use hris_core::types::{CandidateId, ChecklistId, JobId, TaskId};

use crate::{backend, to_rfc3339};

/// Repository for onboarding checklists and their tasks.
#[derive(Clone)]
pub struct OnboardingRepository {
    pool: SqlitePool,
}

impl OnboardingRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn fetch_for_pair(
        &self,
        candidate_id: CandidateId,
        job_id: JobId,
    ) -> Result<Option<OnboardingChecklist>, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(backend)?;
        let row = sqlx::query_as::<_, ChecklistRow>(
            "SELECT id, candidate_id, job_id, status, start_date \
               FROM onboarding_checklists WHERE candidate_id = ? AND job_id = ?",
        )
        .bind(candidate_id.0)
        .bind(job_id.0)
        .fetch_optional(&mut *conn)
        .await
        .map_err(backend)?;

        match row {
            Some(row) => Ok(Some(load_tasks(&mut *conn, row).await?)),
            None => Ok(None),
        }
    }

    /// Every checklist of a candidate, newest first.
    pub async fn list_for_candidate(
        &self,
        candidate_id: CandidateId,
    ) -> Result<Vec<OnboardingChecklist>, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(backend)?;
        let rows = sqlx::query_as::<_, ChecklistRow>(
            "SELECT id, candidate_id, job_id, status, start_date \
               FROM onboarding_checklists WHERE candidate_id = ? \
              ORDER BY start_date DESC, id DESC",
        )
        .bind(candidate_id.0)
        .fetch_all(&mut *conn)
        .await
        .map_err(backend)?;

        let mut checklists = Vec::with_capacity(rows.len());
        for row in rows {
            checklists.push(load_tasks(&mut *conn, row).await?);
        }
        Ok(checklists)
    }

    pub async fn task_owner(&self, task_id: TaskId) -> Result<Option<CandidateId>, StoreError> {
        let owner: Option<(i64,)> = sqlx::query_as(
            "SELECT c.candidate_id \
               FROM onboarding_tasks AS t \
               JOIN onboarding_checklists AS c ON c.id = t.checklist_id \
              WHERE t.id = ?",
        )
        .bind(task_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        Ok(owner.map(|(id,)| CandidateId(id)))
    }

    /// Marks a task complete and writes the recomputed checklist status.
    pub async fn complete_task(
        &self,
        task_id: TaskId,
        at: DateTime<Utc>,
    ) -> Result<Option<OnboardingChecklist>, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        sqlx::query(
            "UPDATE onboarding_tasks SET completed = 1, completed_at = ? \
              WHERE id = ? AND completed = 0",
        )
        .bind(to_rfc3339(at))
        .bind(task_id.0)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        let row = sqlx::query_as::<_, ChecklistRow>(
            "SELECT c.id, c.candidate_id, c.job_id, c.status, c.start_date \
               FROM onboarding_checklists AS c \
               JOIN onboarding_tasks AS t ON t.checklist_id = c.id \
              WHERE t.id = ?",
        )
        .bind(task_id.0)
        .fetch_optional(&mut *tx)
        .await
        .map_err(backend)?;
        let Some(row) = row else {
            return Ok(None);
        };

        let mut checklist = load_tasks(&mut *tx, row).await?;
        let status = OnboardingStatus::derive(&checklist.tasks, checklist.start_date, at);
        if status != checklist.status {
            sqlx::query("UPDATE onboarding_checklists SET status = ? WHERE id = ?")
                .bind(status.as_str())
                .bind(checklist.id.0)
                .execute(&mut *tx)
                .await
                .map_err(backend)?;
            checklist.status = status;
        }

        tx.commit().await.map_err(backend)?;
        Ok(Some(checklist))
    }
}

async fn load_tasks(
    conn: &mut SqliteConnection,
    row: ChecklistRow,
) -> Result<OnboardingChecklist, StoreError> {
    let tasks = sqlx::query_as::<_, TaskRow>(
        "SELECT id, name, category, required, completed, completed_at \
           FROM onboarding_tasks WHERE checklist_id = ? ORDER BY position, id",
    )
    .bind(row.id)
    .fetch_all(&mut *conn)
    .await
    .map_err(backend)?
    .into_iter()
    .map(TaskRow::into_domain)
    .collect::<Result<Vec<_>, _>>()?;

    row.into_domain(tasks)
}

#[derive(Debug, sqlx::FromRow)]
struct ChecklistRow {
    id: i64,
    candidate_id: i64,
    job_id: i64,
    status: String,
    start_date: DateTime<Utc>,
}

impl ChecklistRow {
    fn into_domain(self, tasks: Vec<OnboardingTask>) -> Result<OnboardingChecklist, StoreError> {
        let status = OnboardingStatus::parse(&self.status).ok_or_else(|| {
            StoreError::Corrupt(format!("checklist {}: status '{}'", self.id, self.status))
        })?;
        Ok(OnboardingChecklist {
            id: ChecklistId(self.id),
            candidate_id: CandidateId(self.candidate_id),
            job_id: JobId(self.job_id),
            status,
            start_date: self.start_date,
            tasks,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TaskRow {
    id: i64,
    name: String,
    category: String,
    required: bool,
    completed: bool,
    completed_at: Option<DateTime<Utc>>,
}

impl TaskRow {
    fn into_domain(self) -> Result<OnboardingTask, StoreError> {
        let category = TaskCategory::parse(&self.category).ok_or_else(|| {
            StoreError::Corrupt(format!("task {}: category '{}'", self.id, self.category))
        })?;
        Ok(OnboardingTask {
            id: TaskId(self.id),
            name: self.name,
            category,
            required: self.required,
            completed: self.completed,
            completed_at: self.completed_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{seed_candidate, seed_job, setup_db};
    use crate::Database;
    use chrono::Duration;
    use hris_core::onboarding::{OnboardingSeed, DEFAULT_ONBOARDING_TASKS, ONBOARDING_DEADLINE_DAYS};
    use hris_core::store::{StatusWrite, WriteOutcome};
    use hris_core::types::{ApplicationStatus, MatchScore, NewApplication};

    async fn accepted_offer(db: &Database) -> (CandidateId, JobId) {
        let job = seed_job(db, "HR-100").await;
        let candidate = seed_candidate(db, "BAY-CAN-0500", "onboard@example.com").await;
        let application = db
            .applications()
            .insert(&NewApplication {
                candidate_id: CandidateId(candidate.id),
                job_id: job.id,
                match_score: MatchScore::new(90.0),
                created_at: Utc::now(),
            })
            .await
            .expect("apply");
        sqlx::query("UPDATE applications SET status = 'offer_sent' WHERE id = ?")
            .bind(application.id.0)
            .execute(db.pool())
            .await
            .expect("force status");
        let outcome = db
            .applications()
            .commit_transition(&StatusWrite {
                application_id: application.id,
                expected: ApplicationStatus::OfferSent,
                target: ApplicationStatus::OfferAccepted,
                at: Utc::now(),
                onboarding: Some(OnboardingSeed {
                    candidate_id: application.candidate_id,
                    job_id: application.job_id,
                    start_date: Utc::now(),
                    tasks: &DEFAULT_ONBOARDING_TASKS,
                }),
            })
            .await
            .expect("accept");
        assert!(matches!(
            outcome,
            WriteOutcome::Applied {
                checklist_id: Some(_)
            }
        ));
        (application.candidate_id, application.job_id)
    }

    #[tokio::test]
    async fn seeded_checklist_is_pending_with_default_tasks() {
        let test = setup_db().await;
        let (candidate_id, job_id) = accepted_offer(&test.db).await;

        let checklist = test
            .db
            .onboarding()
            .fetch_for_pair(candidate_id, job_id)
            .await
            .expect("fetch")
            .expect("checklist");
        assert_eq!(checklist.status, OnboardingStatus::Pending);
        let names: Vec<_> = checklist.tasks.iter().map(|task| task.name.as_str()).collect();
        assert_eq!(
            names,
            DEFAULT_ONBOARDING_TASKS
                .iter()
                .map(|task| task.name)
                .collect::<Vec<_>>()
        );
        assert_eq!(
            test.db.onboarding().task_owner(checklist.tasks[0].id).await.expect("owner"),
            Some(candidate_id)
        );
    }

    #[tokio::test]
    async fn completing_tasks_advances_checklist_status() {
        let test = setup_db().await;
        let (candidate_id, job_id) = accepted_offer(&test.db).await;
        let repo = test.db.onboarding();
        let checklist = repo
            .fetch_for_pair(candidate_id, job_id)
            .await
            .expect("fetch")
            .expect("checklist");

        let first = repo
            .complete_task(checklist.tasks[0].id, Utc::now())
            .await
            .expect("complete")
            .expect("checklist");
        assert_eq!(first.status, OnboardingStatus::InProgress);
        assert!(first.tasks[0].completed);
        assert!(first.tasks[0].completed_at.is_some());

        let mut last = first;
        for task in &checklist.tasks[1..] {
            last = repo
                .complete_task(task.id, Utc::now())
                .await
                .expect("complete")
                .expect("checklist");
        }
        assert_eq!(last.status, OnboardingStatus::Completed);

        let listed = repo.list_for_candidate(candidate_id).await.expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].status, OnboardingStatus::Completed);
    }

    #[tokio::test]
    async fn late_completion_stores_delayed_status() {
        let test = setup_db().await;
        let (candidate_id, job_id) = accepted_offer(&test.db).await;
        let repo = test.db.onboarding();
        let checklist = repo
            .fetch_for_pair(candidate_id, job_id)
            .await
            .expect("fetch")
            .expect("checklist");

        let late = checklist.start_date + Duration::days(ONBOARDING_DEADLINE_DAYS + 1);
        let updated = repo
            .complete_task(checklist.tasks[0].id, late)
            .await
            .expect("complete")
            .expect("checklist");
        assert_eq!(updated.status, OnboardingStatus::Delayed);

        let stored = repo
            .fetch_for_pair(candidate_id, job_id)
            .await
            .expect("fetch")
            .expect("checklist");
        assert_eq!(stored.status, OnboardingStatus::Delayed);
    }

    #[tokio::test]
    async fn unknown_task_yields_none() {
        let test = setup_db().await;
        let repo = test.db.onboarding();

        assert!(repo.task_owner(TaskId(404)).await.expect("owner").is_none());
        assert!(repo
            .complete_task(TaskId(404), Utc::now())
            .await
            .expect("complete")
            .is_none());
    }
}
