use chrono::{DateTime, NaiveDate, Utc};
use sqlx::SqlitePool;

use hris_core::pass::{PassId, PassKind};
use hris_core::profile::{
    AgencyPass, AgencyProfile, CandidatePass, CandidateProfile, CandidateSource, EmployeePass,
    EmployeeProfile, NewProfile, PassApplication, PassHolder, ProfileRef,
};
use hris_core::store::{CreateProfileOutcome, StoreError};
use hris_core::types::{AgencyId, CandidateId, EmployeeId};

use crate::applications::ApplicationRow;
use crate::onboarding::OnboardingRepository;
use crate::{backend, store_error, to_rfc3339, violation, Violation};

/// Repository for passes and the candidate, employee and agency profiles bound to them.
#[derive(Clone)]
pub struct ProfileRepository {
    pool: SqlitePool,
}

impl ProfileRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn pass_exists(&self, pass: &PassId) -> Result<bool, StoreError> {
        let (exists,): (i64,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM passes WHERE pass_id = ?)")
                .bind(pass.as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(backend)?;
        Ok(exists != 0)
    }

    /// Inserts the pass row and the profile in one transaction.
    pub async fn create_with_pass(
        &self,
        pass: &PassId,
        profile: &NewProfile,
        at: DateTime<Utc>,
    ) -> Result<CreateProfileOutcome, StoreError> {
        let created_at = to_rfc3339(at);
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let claimed = sqlx::query("INSERT INTO passes (pass_id, kind, created_at) VALUES (?, ?, ?)")
            .bind(pass.as_str())
            .bind(profile.kind().as_str())
            .bind(&created_at)
            .execute(&mut *tx)
            .await;
        match claimed {
            Ok(_) => {}
            Err(err) if violation(&err) == Some(Violation::Unique) => {
                tx.rollback().await.map_err(backend)?;
                return Ok(CreateProfileOutcome::PassTaken);
            }
            Err(err) => return Err(backend(err)),
        }

        let inserted = match profile {
            NewProfile::Candidate(candidate) => {
                sqlx::query(
                    "INSERT INTO candidates \
                     (pass_id, full_name, email, cv_url, source, agency_id, created_at) \
                     VALUES (?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(pass.as_str())
                .bind(&candidate.full_name)
                .bind(candidate.email.trim())
                .bind(&candidate.cv_url)
                .bind(candidate.source.as_str())
                .bind(candidate.agency_id.map(|id| id.0))
                .bind(&created_at)
                .execute(&mut *tx)
                .await
            }
            NewProfile::Employee(employee) => {
                sqlx::query(
                    "INSERT INTO employees \
                     (pass_id, full_name, email, employee_code, job_title, department, \
                      employment_type, hire_date, created_at) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(pass.as_str())
                .bind(&employee.full_name)
                .bind(employee.email.trim())
                .bind(&employee.employee_code)
                .bind(&employee.job_title)
                .bind(&employee.department)
                .bind(&employee.employment_type)
                .bind(employee.hire_date)
                .bind(&created_at)
                .execute(&mut *tx)
                .await
            }
            NewProfile::Agency(agency) => {
                sqlx::query(
                    "INSERT INTO agencies \
                     (pass_id, company_name, contact_person, email, commission_rate, created_at) \
                     VALUES (?, ?, ?, ?, ?, ?)",
                )
                .bind(pass.as_str())
                .bind(&agency.company_name)
                .bind(&agency.contact_person)
                .bind(agency.email.trim())
                .bind(agency.commission_rate)
                .bind(&created_at)
                .execute(&mut *tx)
                .await
            }
        };
        let id = inserted.map_err(store_error)?.last_insert_rowid();

        tx.commit().await.map_err(backend)?;
        Ok(CreateProfileOutcome::Created(ProfileRef {
            kind: profile.kind(),
            id,
            pass: pass.clone(),
        }))
    }

    /// Loads the holder of `pass` from the table that stores `kind`.
    pub async fn find_by_pass(
        &self,
        kind: PassKind,
        pass: &PassId,
    ) -> Result<Option<PassHolder>, StoreError> {
        match kind {
            PassKind::Candidate => Ok(self.candidate_pass(pass).await?.map(PassHolder::Candidate)),
            PassKind::Employee => Ok(self.employee_pass(pass).await?.map(PassHolder::Employee)),
            PassKind::Agency => Ok(self.agency_pass(pass).await?.map(PassHolder::Agency)),
        }
    }

    async fn candidate_pass(&self, pass: &PassId) -> Result<Option<CandidatePass>, StoreError> {
        let row = sqlx::query_as::<_, CandidateRow>(
            "SELECT id, pass_id, full_name, email, cv_url, source, agency_id, created_at \
             FROM candidates WHERE pass_id = ?",
        )
        .bind(pass.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        let Some(row) = row else {
            return Ok(None);
        };
        let profile = row.into_domain()?;

        let applications = sqlx::query_as::<_, PassApplicationRow>(
            "SELECT a.id, a.candidate_id, a.job_id, a.status, a.match_score, \
                    a.created_at, a.updated_at, j.title AS job_title \
               FROM applications AS a \
               JOIN jobs AS j ON j.id = a.job_id \
              WHERE a.candidate_id = ? \
              ORDER BY a.created_at DESC, a.id DESC",
        )
        .bind(profile.id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?
        .into_iter()
        .map(|row| {
            Ok(PassApplication {
                application: row.application.into_domain()?,
                job_title: row.job_title,
            })
        })
        .collect::<Result<Vec<_>, StoreError>>()?;

        let onboarding = OnboardingRepository::new(self.pool.clone())
            .list_for_candidate(profile.id)
            .await?;

        Ok(Some(CandidatePass {
            profile,
            applications,
            onboarding,
        }))
    }

    async fn employee_pass(&self, pass: &PassId) -> Result<Option<EmployeePass>, StoreError> {
        let row = sqlx::query_as::<_, EmployeeRow>(
            "SELECT id, pass_id, full_name, email, employee_code, job_title, department, \
                    employment_type, hire_date, created_at \
               FROM employees WHERE pass_id = ?",
        )
        .bind(pass.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        Ok(row.map(|row| EmployeePass {
            profile: row.into(),
        }))
    }

    async fn agency_pass(&self, pass: &PassId) -> Result<Option<AgencyPass>, StoreError> {
        let row = sqlx::query_as::<_, AgencyRow>(
            "SELECT id, pass_id, company_name, contact_person, email, commission_rate, created_at \
               FROM agencies WHERE pass_id = ?",
        )
        .bind(pass.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        let Some(row) = row else {
            return Ok(None);
        };
        let profile = AgencyProfile::from(row);

        let submissions = sqlx::query_as::<_, CandidateRow>(
            "SELECT id, pass_id, full_name, email, cv_url, source, agency_id, created_at \
               FROM candidates WHERE agency_id = ? ORDER BY created_at, id",
        )
        .bind(profile.id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?
        .into_iter()
        .map(CandidateRow::into_domain)
        .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(AgencyPass {
            profile,
            submissions,
        }))
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CandidateRow {
    id: i64,
    pass_id: String,
    full_name: String,
    email: String,
    cv_url: Option<String>,
    source: String,
    agency_id: Option<i64>,
    created_at: DateTime<Utc>,
}

impl CandidateRow {
    fn into_domain(self) -> Result<CandidateProfile, StoreError> {
        let source = CandidateSource::parse(&self.source).ok_or_else(|| {
            StoreError::Corrupt(format!("candidate {}: source '{}'", self.id, self.source))
        })?;
        Ok(CandidateProfile {
            id: CandidateId(self.id),
            pass: PassId::new(self.pass_id),
            full_name: self.full_name,
            email: self.email,
            cv_url: self.cv_url,
            source,
            agency_id: self.agency_id.map(AgencyId),
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PassApplicationRow {
    #[sqlx(flatten)]
    application: ApplicationRow,
    job_title: String,
}

#[derive(Debug, sqlx::FromRow)]
struct EmployeeRow {
    id: i64,
    pass_id: String,
    full_name: String,
    email: String,
    employee_code: String,
    job_title: String,
    department: String,
    employment_type: String,
    hire_date: NaiveDate,
    created_at: DateTime<Utc>,
}

impl From<EmployeeRow> for EmployeeProfile {
    fn from(row: EmployeeRow) -> Self {
        Self {
            id: EmployeeId(row.id),
            pass: PassId::new(row.pass_id),
            full_name: row.full_name,
            email: row.email,
            employee_code: row.employee_code,
            job_title: row.job_title,
            department: row.department,
            employment_type: row.employment_type,
            hire_date: row.hire_date,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AgencyRow {
    id: i64,
    pass_id: String,
    company_name: String,
    contact_person: String,
    email: String,
    commission_rate: f64,
    created_at: DateTime<Utc>,
}

impl From<AgencyRow> for AgencyProfile {
    fn from(row: AgencyRow) -> Self {
        Self {
            id: AgencyId(row.id),
            pass: PassId::new(row.pass_id),
            company_name: row.company_name,
            contact_person: row.contact_person,
            email: row.email,
            commission_rate: row.commission_rate,
            created_at: row.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{seed_candidate, seed_job, setup_db};
    use hris_core::profile::{NewAgency, NewCandidate, NewEmployee};
    use hris_core::types::{MatchScore, NewApplication};

    #[tokio::test]
    async fn taken_pass_is_reported_without_leaving_rows() {
        let test = setup_db().await;
        seed_candidate(&test.db, "BAY-CAN-0042", "first@example.com").await;
        let repo = test.db.profiles();

        let outcome = repo
            .create_with_pass(
                &PassId::new("BAY-CAN-0042"),
                &NewProfile::Candidate(NewCandidate {
                    full_name: "Second".to_string(),
                    email: "second@example.com".to_string(),
                    cv_url: None,
                    source: CandidateSource::Referral,
                    agency_id: None,
                }),
                Utc::now(),
            )
            .await
            .expect("create");
        assert_eq!(outcome, CreateProfileOutcome::PassTaken);

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM candidates")
            .fetch_one(test.db.pool())
            .await
            .expect("count");
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn duplicate_email_rolls_back_pass() {
        let test = setup_db().await;
        seed_candidate(&test.db, "BAY-CAN-0001", "dup@example.com").await;
        let repo = test.db.profiles();

        let err = repo
            .create_with_pass(
                &PassId::new("BAY-CAN-0002"),
                &NewProfile::Candidate(NewCandidate {
                    full_name: "Copy".to_string(),
                    email: "dup@example.com".to_string(),
                    cv_url: None,
                    source: CandidateSource::Direct,
                    agency_id: None,
                }),
                Utc::now(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate));
        assert!(!repo
            .pass_exists(&PassId::new("BAY-CAN-0002"))
            .await
            .expect("exists"));
    }

    #[tokio::test]
    async fn candidate_pass_lists_applications_with_job_titles() {
        let test = setup_db().await;
        let job = seed_job(&test.db, "SWENG-010").await;
        let candidate = seed_candidate(&test.db, "BAY-CAN-0314", "pass@example.com").await;
        test.db
            .applications()
            .insert(&NewApplication {
                candidate_id: CandidateId(candidate.id),
                job_id: job.id,
                match_score: MatchScore::new(64.0),
                created_at: Utc::now(),
            })
            .await
            .expect("apply");

        let holder = test
            .db
            .profiles()
            .find_by_pass(PassKind::Candidate, &candidate.pass)
            .await
            .expect("lookup")
            .expect("holder");
        let PassHolder::Candidate(pass) = holder else {
            panic!("expected candidate pass");
        };
        assert_eq!(pass.profile.id, CandidateId(candidate.id));
        assert_eq!(pass.applications.len(), 1);
        assert_eq!(pass.applications[0].job_title, "Backend Engineer");
        assert!(pass.onboarding.is_empty());
    }

    #[tokio::test]
    async fn agency_pass_lists_submitted_candidates() {
        let test = setup_db().await;
        let repo = test.db.profiles();
        let CreateProfileOutcome::Created(agency) = repo
            .create_with_pass(
                &PassId::new("AGY-0101"),
                &NewProfile::Agency(NewAgency {
                    company_name: "Gulf Talent".to_string(),
                    contact_person: "Omar".to_string(),
                    email: "omar@gulf.example".to_string(),
                    commission_rate: 15.0,
                }),
                Utc::now(),
            )
            .await
            .expect("agency")
        else {
            panic!("agency pass taken");
        };
        repo.create_with_pass(
            &PassId::new("BAY-CAN-0777"),
            &NewProfile::Candidate(NewCandidate {
                full_name: "Submitted".to_string(),
                email: "submitted@example.com".to_string(),
                cv_url: None,
                source: CandidateSource::Agency,
                agency_id: Some(AgencyId(agency.id)),
            }),
            Utc::now(),
        )
        .await
        .expect("candidate");

        let Some(PassHolder::Agency(pass)) = repo
            .find_by_pass(PassKind::Agency, &agency.pass)
            .await
            .expect("lookup")
        else {
            panic!("expected agency pass");
        };
        assert_eq!(pass.profile.company_name, "Gulf Talent");
        assert_eq!(pass.submissions.len(), 1);
        assert_eq!(pass.submissions[0].source, CandidateSource::Agency);
    }

    #[tokio::test]
    async fn employee_pass_round_trips_and_wrong_table_misses() {
        let test = setup_db().await;
        let repo = test.db.profiles();
        let hire_date = NaiveDate::from_ymd_opt(2024, 3, 1).expect("date");
        repo.create_with_pass(
            &PassId::new("EMP-2024"),
            &NewProfile::Employee(NewEmployee {
                full_name: "Noor".to_string(),
                email: "noor@example.com".to_string(),
                employee_code: "E-100".to_string(),
                job_title: "Recruiter".to_string(),
                department: "People".to_string(),
                employment_type: "full_time".to_string(),
                hire_date,
            }),
            Utc::now(),
        )
        .await
        .expect("employee");

        let Some(PassHolder::Employee(pass)) = repo
            .find_by_pass(PassKind::Employee, &PassId::new("EMP-2024"))
            .await
            .expect("lookup")
        else {
            panic!("expected employee pass");
        };
        assert_eq!(pass.profile.hire_date, hire_date);

        let missing = repo
            .find_by_pass(PassKind::Agency, &PassId::new("EMP-2024"))
            .await
            .expect("lookup");
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn unknown_agency_reference_is_missing_reference() {
        let test = setup_db().await;

        let err = test
            .db
            .profiles()
            .create_with_pass(
                &PassId::new("BAY-CAN-0900"),
                &NewProfile::Candidate(NewCandidate {
                    full_name: "Orphan".to_string(),
                    email: "orphan@example.com".to_string(),
                    cv_url: None,
                    source: CandidateSource::Agency,
                    agency_id: Some(AgencyId(77)),
                }),
                Utc::now(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::MissingReference));
    }
}
