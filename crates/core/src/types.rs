use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

row_id!(
    /// Identifier of an application row.
    ApplicationId
);
row_id!(
    /// Identifier of a candidate profile.
    CandidateId
);
row_id!(
    /// Identifier of a job opening.
    JobId
);
row_id!(
    /// Identifier of an employee profile.
    EmployeeId
);
row_id!(
    /// Identifier of a recruiting agency profile.
    AgencyId
);
row_id!(
    /// Identifier of an onboarding checklist.
    ChecklistId
);
row_id!(
    /// Identifier of a single onboarding task.
    TaskId
);

/// Status of an application in the recruitment pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Applied,
    CvScreened,
    AssessmentPending,
    AssessmentCompleted,
    Shortlisted,
    InterviewScheduled,
    Interviewed,
    OfferPending,
    OfferSent,
    OfferAccepted,
    OfferRejected,
    Onboarding,
    Hired,
    Rejected,
}

impl ApplicationStatus {
    pub const ALL: [Self; 14] = [
        Self::Applied,
        Self::CvScreened,
        Self::AssessmentPending,
        Self::AssessmentCompleted,
        Self::Shortlisted,
        Self::InterviewScheduled,
        Self::Interviewed,
        Self::OfferPending,
        Self::OfferSent,
        Self::OfferAccepted,
        Self::OfferRejected,
        Self::Onboarding,
        Self::Hired,
        Self::Rejected,
    ];

    /// Returns the canonical database representation for the status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::CvScreened => "cv_screened",
            Self::AssessmentPending => "assessment_pending",
            Self::AssessmentCompleted => "assessment_completed",
            Self::Shortlisted => "shortlisted",
            Self::InterviewScheduled => "interview_scheduled",
            Self::Interviewed => "interviewed",
            Self::OfferPending => "offer_pending",
            Self::OfferSent => "offer_sent",
            Self::OfferAccepted => "offer_accepted",
            Self::OfferRejected => "offer_rejected",
            Self::Onboarding => "onboarding",
            Self::Hired => "hired",
            Self::Rejected => "rejected",
        }
    }

    /// Returns `true` for statuses that accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Hired | Self::Rejected | Self::OfferRejected)
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApplicationStatus {
    type Err = ParseStatusError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == value)
            .ok_or_else(|| ParseStatusError(value.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown application status '{0}'")]
pub struct ParseStatusError(pub String);

/// Role label supplied by the authorization collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Hr,
    Manager,
    Employee,
    Candidate,
    Agency,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Hr => "hr",
            Self::Manager => "manager",
            Self::Employee => "employee",
            Self::Candidate => "candidate",
            Self::Agency => "agency",
        }
    }

    /// Managers, HR and admins may act on any application.
    pub fn is_staff(self) -> bool {
        matches!(self, Self::Admin | Self::Hr | Self::Manager)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "hr" => Ok(Self::Hr),
            "manager" => Ok(Self::Manager),
            "employee" => Ok(Self::Employee),
            "candidate" => Ok(Self::Candidate),
            "agency" => Ok(Self::Agency),
            other => Err(ParseRoleError(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown role '{0}'")]
pub struct ParseRoleError(pub String);

/// Authenticated caller of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub role: Role,
    pub candidate_id: Option<CandidateId>,
    pub agency_id: Option<AgencyId>,
}

impl Actor {
    pub fn staff(role: Role) -> Self {
        Self {
            role,
            candidate_id: None,
            agency_id: None,
        }
    }

    pub fn candidate(id: CandidateId) -> Self {
        Self {
            role: Role::Candidate,
            candidate_id: Some(id),
            agency_id: None,
        }
    }

    pub fn agency(id: AgencyId) -> Self {
        Self {
            role: Role::Agency,
            candidate_id: None,
            agency_id: Some(id),
        }
    }

    /// Returns `true` when the actor is the candidate owning the record.
    pub fn owns(&self, candidate_id: CandidateId) -> bool {
        self.role == Role::Candidate && self.candidate_id == Some(candidate_id)
    }
}

/// CV-to-job match score, always within `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct MatchScore(f64);

impl MatchScore {
    pub fn new(value: f64) -> Option<Self> {
        (value.is_finite() && (0.0..=100.0).contains(&value)).then_some(Self(value))
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

/// One candidate's pursuit of one job opening.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Application {
    pub id: ApplicationId,
    pub candidate_id: CandidateId,
    pub job_id: JobId,
    pub status: ApplicationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_score: Option<MatchScore>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Data required to insert a new application.
#[derive(Debug, Clone, PartialEq)]
pub struct NewApplication {
    pub candidate_id: CandidateId,
    pub job_id: JobId,
    pub match_score: Option<MatchScore>,
    pub created_at: DateTime<Utc>,
}

/// Job opening that applications point to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Job {
    pub id: JobId,
    pub job_code: String,
    pub title: String,
    pub department: String,
    pub requires_assessment: bool,
    /// Closed jobs drop out of the public listing.
    pub is_active: bool,
    pub closed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewJob {
    pub job_code: String,
    pub title: String,
    pub department: String,
    #[serde(default)]
    pub requires_assessment: bool,
}

/// Kind of notification-worthy fact produced by the lifecycle engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ApplicationCreated,
    StatusChanged,
    OfferAccepted,
    OfferRejected,
    ApplicationRejected,
}

impl EventKind {
    /// Event kind emitted when an application moves into `status`.
    pub fn for_status(status: ApplicationStatus) -> Self {
        match status {
            ApplicationStatus::Applied => Self::ApplicationCreated,
            ApplicationStatus::OfferAccepted => Self::OfferAccepted,
            ApplicationStatus::OfferRejected => Self::OfferRejected,
            ApplicationStatus::Rejected => Self::ApplicationRejected,
            _ => Self::StatusChanged,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ApplicationCreated => "application_created",
            Self::StatusChanged => "status_changed",
            Self::OfferAccepted => "offer_accepted",
            Self::OfferRejected => "offer_rejected",
            Self::ApplicationRejected => "application_rejected",
        }
    }
}

/// Transient fact describing a committed application change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainEvent {
    pub kind: EventKind,
    pub application_id: ApplicationId,
    pub candidate_id: CandidateId,
    pub job_id: JobId,
    pub status: ApplicationStatus,
    pub occurred_at: DateTime<Utc>,
}

impl DomainEvent {
    pub fn for_application(application: &Application, occurred_at: DateTime<Utc>) -> Self {
        Self {
            kind: EventKind::for_status(application.status),
            application_id: application.id,
            candidate_id: application.candidate_id,
            job_id: application.job_id,
            status: application.status,
            occurred_at,
        }
    }
}
