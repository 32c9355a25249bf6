//! Storage collaborators consumed by the lifecycle engine and pass registry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::onboarding::{OnboardingChecklist, OnboardingSeed};
use crate::pass::{PassId, PassKind};
use crate::profile::{NewProfile, PassHolder, ProfileRef};
use crate::types::{
    Application, ApplicationId, ApplicationStatus, CandidateId, ChecklistId, JobId, NewApplication,
    TaskId,
};

/// Conditional status update, applied only while the row still holds `expected`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusWrite {
    pub application_id: ApplicationId,
    pub expected: ApplicationStatus,
    pub target: ApplicationStatus,
    pub at: DateTime<Utc>,
    pub onboarding: Option<OnboardingSeed>,
}

/// Result of a conditional status update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Applied { checklist_id: Option<ChecklistId> },
    Conflict,
}

/// Result of inserting a profile bound to a freshly issued pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateProfileOutcome {
    Created(ProfileRef),
    PassTaken,
}

#[async_trait]
pub trait ApplicationStore: Send + Sync {
    async fn get_application(&self, id: ApplicationId)
        -> Result<Option<Application>, StoreError>;

    /// Inserts an application; a second row for the same pair is [`StoreError::Duplicate`].
    async fn create_application(&self, new: &NewApplication) -> Result<Application, StoreError>;

    /// Writes the new status and the optional onboarding seed in one transaction.
    async fn commit_transition(&self, write: &StatusWrite) -> Result<WriteOutcome, StoreError>;

    /// `requires_assessment` of the job, or `None` when the job does not exist.
    async fn job_requires_assessment(&self, job_id: JobId) -> Result<Option<bool>, StoreError>;
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn pass_exists(&self, pass: &PassId) -> Result<bool, StoreError>;

    async fn create_profile_with_pass(
        &self,
        pass: &PassId,
        profile: &NewProfile,
        at: DateTime<Utc>,
    ) -> Result<CreateProfileOutcome, StoreError>;

    async fn find_profile_by_pass(
        &self,
        kind: PassKind,
        pass: &PassId,
    ) -> Result<Option<PassHolder>, StoreError>;
}

#[async_trait]
pub trait OnboardingStore: Send + Sync {
    async fn checklist_for(
        &self,
        candidate_id: CandidateId,
        job_id: JobId,
    ) -> Result<Option<OnboardingChecklist>, StoreError>;

    /// Candidate owning the checklist that contains `task_id`.
    async fn task_owner(&self, task_id: TaskId) -> Result<Option<CandidateId>, StoreError>;

    /// Marks the task complete and stores the recomputed checklist status.
    ///
    /// Completing an already completed task keeps its original timestamp.
    async fn complete_task(
        &self,
        task_id: TaskId,
        at: DateTime<Utc>,
    ) -> Result<Option<OnboardingChecklist>, StoreError>;
}

/// Failures reported by a storage collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record already exists")]
    Duplicate,
    #[error("referenced record does not exist")]
    MissingReference,
    #[error("stored value is invalid: {0}")]
    Corrupt(String),
    #[error("storage backend failure: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}
