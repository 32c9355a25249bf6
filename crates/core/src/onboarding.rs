use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::{OnboardingStore, StoreError};
use crate::types::{Actor, Application, CandidateId, ChecklistId, JobId, Role, TaskId};

/// Days after the start date within which every required task should be done.
pub const ONBOARDING_DEADLINE_DAYS: i64 = 14;

/// Progress of an onboarding checklist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingStatus {
    Pending,
    InProgress,
    Completed,
    Delayed,
}

impl OnboardingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Delayed => "delayed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "delayed" => Some(Self::Delayed),
            _ => None,
        }
    }

    /// Recomputes the checklist status from its tasks as of `now`.
    ///
    /// Required work still open past the deadline reads as `Delayed`.
    pub fn derive(tasks: &[OnboardingTask], start_date: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let required_done = tasks
            .iter()
            .filter(|task| task.required)
            .all(|task| task.completed);
        if required_done && !tasks.is_empty() {
            return Self::Completed;
        }
        if now > start_date + Duration::days(ONBOARDING_DEADLINE_DAYS) {
            return Self::Delayed;
        }
        if tasks.iter().any(|task| task.completed) {
            Self::InProgress
        } else {
            Self::Pending
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskCategory {
    Documents,
    Personal,
}

impl TaskCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Documents => "documents",
            Self::Personal => "personal",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "documents" => Some(Self::Documents),
            "personal" => Some(Self::Personal),
            _ => None,
        }
    }
}

/// Task seeded into every new checklist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OnboardingTaskTemplate {
    pub name: &'static str,
    pub category: TaskCategory,
    pub required: bool,
}

pub const DEFAULT_ONBOARDING_TASKS: [OnboardingTaskTemplate; 5] = [
    OnboardingTaskTemplate {
        name: "Upload Passport",
        category: TaskCategory::Documents,
        required: true,
    },
    OnboardingTaskTemplate {
        name: "Upload Visa",
        category: TaskCategory::Documents,
        required: true,
    },
    OnboardingTaskTemplate {
        name: "Upload Insurance Documents",
        category: TaskCategory::Documents,
        required: true,
    },
    OnboardingTaskTemplate {
        name: "Bank Details",
        category: TaskCategory::Documents,
        required: true,
    },
    OnboardingTaskTemplate {
        name: "Emergency Contact Information",
        category: TaskCategory::Personal,
        required: true,
    },
];

/// Checklist to create alongside an accepted offer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnboardingSeed {
    pub candidate_id: CandidateId,
    pub job_id: JobId,
    pub start_date: DateTime<Utc>,
    pub tasks: &'static [OnboardingTaskTemplate],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OnboardingChecklist {
    pub id: ChecklistId,
    pub candidate_id: CandidateId,
    pub job_id: JobId,
    pub status: OnboardingStatus,
    pub start_date: DateTime<Utc>,
    pub tasks: Vec<OnboardingTask>,
}

impl OnboardingChecklist {
    /// Same checklist with its status re-derived as of `now`.
    pub fn refreshed(mut self, now: DateTime<Utc>) -> Self {
        self.status = OnboardingStatus::derive(&self.tasks, self.start_date, now);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OnboardingTask {
    pub id: TaskId,
    pub name: String,
    pub category: TaskCategory,
    pub required: bool,
    pub completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Error)]
pub enum OnboardingError {
    #[error("onboarding task {0} not found")]
    TaskNotFound(TaskId),
    #[error("role {0} may not complete this onboarding task")]
    Unauthorized(Role),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Checklist seeded for the application's (candidate, job) pair, if any.
pub async fn checklist_for_application<S: OnboardingStore + ?Sized>(
    store: &S,
    application: &Application,
    now: DateTime<Utc>,
) -> Result<Option<OnboardingChecklist>, StoreError> {
    let checklist = store
        .checklist_for(application.candidate_id, application.job_id)
        .await?;
    Ok(checklist.map(|checklist| checklist.refreshed(now)))
}

/// Completes a task on behalf of the owning candidate or HR.
pub async fn complete_task<S: OnboardingStore + ?Sized>(
    store: &S,
    task_id: TaskId,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<OnboardingChecklist, OnboardingError> {
    let owner = store
        .task_owner(task_id)
        .await?
        .ok_or(OnboardingError::TaskNotFound(task_id))?;
    let allowed = matches!(actor.role, Role::Hr | Role::Admin) || actor.owns(owner);
    if !allowed {
        return Err(OnboardingError::Unauthorized(actor.role));
    }
    store
        .complete_task(task_id, now)
        .await?
        .ok_or(OnboardingError::TaskNotFound(task_id))
}
