use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use hris_core::pass::PassId;
use hris_core::reporting::{ApplicationFilter, ApplicationSummary};
use hris_core::store::StoreError;
use hris_core::types::ApplicationStatus;

use crate::applications::ApplicationRow;
use crate::backend;

/// Read-only queries behind the HR listing and analytics.
#[derive(Clone)]
pub struct ReportingRepository {
    pool: SqlitePool,
}

impl ReportingRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Applications with their job and candidate, newest first.
    pub async fn list_applications(
        &self,
        filter: ApplicationFilter,
    ) -> Result<Vec<ApplicationSummary>, StoreError> {
        let status = filter.status.map(ApplicationStatus::as_str);
        let job_id = filter.job_id.map(|job| job.0);

        let rows = sqlx::query_as::<_, SummaryRow>(
            "SELECT a.id, a.candidate_id, a.job_id, a.status, a.match_score, a.created_at, \
                    a.updated_at, j.job_code, j.title AS job_title, \
                    c.full_name AS candidate_name, c.pass_id AS candidate_pass \
               FROM applications AS a \
               JOIN jobs AS j ON j.id = a.job_id \
               JOIN candidates AS c ON c.id = a.candidate_id \
              WHERE (?1 IS NULL OR a.status = ?1) AND (?2 IS NULL OR a.job_id = ?2) \
              ORDER BY a.created_at DESC, a.id DESC",
        )
        .bind(status)
        .bind(job_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.into_iter().map(SummaryRow::into_domain).collect()
    }

    /// Number of applications currently in each status.
    pub async fn status_counts(&self) -> Result<Vec<(ApplicationStatus, u64)>, StoreError> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM applications GROUP BY status")
                .fetch_all(&self.pool)
                .await
                .map_err(backend)?;

        rows.into_iter()
            .map(|(status, count)| {
                let status = status
                    .parse()
                    .map_err(|err| StoreError::Corrupt(format!("status count: {err}")))?;
                Ok((status, count.max(0) as u64))
            })
            .collect()
    }

    /// `(applied_at, accepted_at)` of every accepted offer.
    ///
    /// The checklist start date is the moment the offer was accepted.
    pub async fn hire_spans(&self) -> Result<Vec<(DateTime<Utc>, DateTime<Utc>)>, StoreError> {
        sqlx::query_as(
            "SELECT a.created_at, c.start_date \
               FROM onboarding_checklists AS c \
               JOIN applications AS a \
                 ON a.candidate_id = c.candidate_id AND a.job_id = c.job_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(backend)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SummaryRow {
    #[sqlx(flatten)]
    application: ApplicationRow,
    job_code: String,
    job_title: String,
    candidate_name: String,
    candidate_pass: String,
}

impl SummaryRow {
    fn into_domain(self) -> Result<ApplicationSummary, StoreError> {
        Ok(ApplicationSummary {
            application: self.application.into_domain()?,
            job_code: self.job_code,
            job_title: self.job_title,
            candidate_name: self.candidate_name,
            candidate_pass: PassId::new(self.candidate_pass),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{seed_candidate, seed_job, setup_db};
    use crate::Database;
    use chrono::Duration;
    use hris_core::onboarding::{OnboardingSeed, DEFAULT_ONBOARDING_TASKS};
    use hris_core::reporting::{funnel, FunnelStage, TimeToHire};
    use hris_core::store::StatusWrite;
    use hris_core::types::{Application, CandidateId, JobId, NewApplication};

    async fn apply(db: &Database, candidate: i64, job: JobId, at: DateTime<Utc>) -> Application {
        db.applications()
            .insert(&NewApplication {
                candidate_id: CandidateId(candidate),
                job_id: job,
                match_score: None,
                created_at: at,
            })
            .await
            .expect("apply")
    }

    async fn force(db: &Database, application: &Application, status: ApplicationStatus) {
        sqlx::query("UPDATE applications SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(application.id.0)
            .execute(db.pool())
            .await
            .expect("force status");
    }

    #[tokio::test]
    async fn listing_filters_by_status_and_job() {
        let test = setup_db().await;
        let backend_job = seed_job(&test.db, "ENG-001").await;
        let data_job = seed_job(&test.db, "DATA-001").await;
        let first = seed_candidate(&test.db, "BAY-CAN-0101", "first@example.com").await;
        let second = seed_candidate(&test.db, "BAY-CAN-0102", "second@example.com").await;
        let now = Utc::now();

        let older = apply(&test.db, first.id, backend_job.id, now - Duration::hours(2)).await;
        let newer = apply(&test.db, second.id, backend_job.id, now).await;
        let other = apply(&test.db, first.id, data_job.id, now - Duration::hours(1)).await;
        force(&test.db, &other, ApplicationStatus::Shortlisted).await;
        let repo = test.db.reporting();

        let all = repo
            .list_applications(ApplicationFilter::default())
            .await
            .expect("list");
        let ids: Vec<_> = all.iter().map(|row| row.application.id).collect();
        assert_eq!(ids, vec![newer.id, other.id, older.id]);
        assert_eq!(all[0].candidate_pass.as_str(), "BAY-CAN-0102");
        assert_eq!(all[0].job_code, "ENG-001");
        assert_eq!(all[0].job_title, "Backend Engineer");

        let for_job = repo
            .list_applications(ApplicationFilter {
                job_id: Some(backend_job.id),
                ..ApplicationFilter::default()
            })
            .await
            .expect("list");
        assert_eq!(for_job.len(), 2);

        let shortlisted = repo
            .list_applications(ApplicationFilter {
                status: Some(ApplicationStatus::Shortlisted),
                job_id: None,
            })
            .await
            .expect("list");
        assert_eq!(shortlisted.len(), 1);
        assert_eq!(shortlisted[0].application.id, other.id);
        assert_eq!(shortlisted[0].application.status, ApplicationStatus::Shortlisted);
    }

    #[tokio::test]
    async fn counts_feed_the_funnel() {
        let test = setup_db().await;
        let job = seed_job(&test.db, "OPS-010").await;
        let mut applications = Vec::new();
        for index in 0..4 {
            let candidate = seed_candidate(
                &test.db,
                &format!("BAY-CAN-02{index:02}"),
                &format!("funnel{index}@example.com"),
            )
            .await;
            applications.push(apply(&test.db, candidate.id, job.id, Utc::now()).await);
        }
        force(&test.db, &applications[1], ApplicationStatus::InterviewScheduled).await;
        force(&test.db, &applications[2], ApplicationStatus::Interviewed).await;
        force(&test.db, &applications[3], ApplicationStatus::Rejected).await;

        let counts = test.db.reporting().status_counts().await.expect("counts");
        let entries = funnel(counts);
        let count_of = |stage| {
            entries
                .iter()
                .find(|entry| entry.stage == stage)
                .map(|entry| entry.count)
        };
        assert_eq!(count_of(FunnelStage::Applied), Some(1));
        assert_eq!(count_of(FunnelStage::Interview), Some(2));
        assert_eq!(count_of(FunnelStage::Hired), Some(0));
    }

    #[tokio::test]
    async fn hire_spans_pair_application_with_acceptance() {
        let test = setup_db().await;
        let job = seed_job(&test.db, "OPS-011").await;
        let candidate = seed_candidate(&test.db, "BAY-CAN-0301", "hire@example.com").await;
        let applied_at = Utc::now() - Duration::days(12);
        let application = apply(&test.db, candidate.id, job.id, applied_at).await;
        force(&test.db, &application, ApplicationStatus::OfferSent).await;

        let accepted_at = applied_at + Duration::days(9);
        test.db
            .applications()
            .commit_transition(&StatusWrite {
                application_id: application.id,
                expected: ApplicationStatus::OfferSent,
                target: ApplicationStatus::OfferAccepted,
                at: accepted_at,
                onboarding: Some(OnboardingSeed {
                    candidate_id: application.candidate_id,
                    job_id: application.job_id,
                    start_date: accepted_at,
                    tasks: &DEFAULT_ONBOARDING_TASKS,
                }),
            })
            .await
            .expect("accept");

        let spans = test.db.reporting().hire_spans().await.expect("spans");
        assert_eq!(spans.len(), 1);
        let summary = TimeToHire::from_spans(spans);
        assert_eq!(summary.total_hires, 1);
        assert_eq!(summary.average_days, 9);
        assert_eq!(summary.distribution.within_14_days, 1);
    }
}
