//! Application status pipeline and the engine that drives it.
//!
//! Every status change goes through [`LifecycleEngine::request_transition`],
//! which checks the adjacency table, the actor's role and ownership, and then
//! commits a write conditioned on the status it observed.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::onboarding::{OnboardingSeed, DEFAULT_ONBOARDING_TASKS};
use crate::store::{ApplicationStore, StatusWrite, StoreError, WriteOutcome};
use crate::types::{
    Actor, Application, ApplicationId, ApplicationStatus, CandidateId, ChecklistId, DomainEvent,
    JobId, MatchScore, NewApplication, Role,
};

use ApplicationStatus as S;

const STAFF: &[Role] = &[Role::Manager, Role::Hr, Role::Admin];
const HR: &[Role] = &[Role::Hr, Role::Admin];
const OWNER: &[Role] = &[Role::Candidate];

/// Directed pipeline edge with the roles allowed to take it.
///
/// Edges listing [`Role::Candidate`] are only open to the candidate who owns
/// the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub from: ApplicationStatus,
    pub to: ApplicationStatus,
    pub actors: &'static [Role],
}

const fn edge_of(from: ApplicationStatus, to: ApplicationStatus, actors: &'static [Role]) -> Edge {
    Edge { from, to, actors }
}

/// Forward edges of the pipeline. Rejection is handled by [`edge`].
///
/// `cv_screened -> shortlisted` is only open for jobs without an assessment,
/// see [`skips_assessment`].
pub const PIPELINE: [Edge; 13] = [
    edge_of(S::Applied, S::CvScreened, HR),
    edge_of(S::CvScreened, S::AssessmentPending, STAFF),
    edge_of(S::CvScreened, S::Shortlisted, STAFF),
    edge_of(S::AssessmentPending, S::AssessmentCompleted, OWNER),
    edge_of(S::AssessmentCompleted, S::Shortlisted, STAFF),
    edge_of(S::Shortlisted, S::InterviewScheduled, STAFF),
    edge_of(S::InterviewScheduled, S::Interviewed, STAFF),
    edge_of(S::Interviewed, S::OfferPending, STAFF),
    edge_of(S::OfferPending, S::OfferSent, HR),
    edge_of(S::OfferSent, S::OfferAccepted, OWNER),
    edge_of(S::OfferSent, S::OfferRejected, OWNER),
    edge_of(S::OfferAccepted, S::Onboarding, HR),
    edge_of(S::Onboarding, S::Hired, HR),
];

/// Looks up the edge between two statuses.
pub fn edge(from: ApplicationStatus, to: ApplicationStatus) -> Option<Edge> {
    if from.is_terminal() {
        return None;
    }
    if to == S::Rejected {
        return Some(edge_of(from, to, STAFF));
    }
    PIPELINE
        .iter()
        .copied()
        .find(|edge| edge.from == from && edge.to == to)
}

/// True for the one edge that bypasses the assessment stage.
pub fn skips_assessment(from: ApplicationStatus, to: ApplicationStatus) -> bool {
    from == S::CvScreened && to == S::Shortlisted
}

impl ApplicationStatus {
    /// Table-level check, ignoring the job's assessment requirement.
    pub fn can_transition_to(self, target: Self) -> bool {
        edge(self, target).is_some()
    }

    pub fn valid_transitions(self) -> Vec<Self> {
        Self::ALL
            .into_iter()
            .filter(|target| self.can_transition_to(*target))
            .collect()
    }

    /// Targets reachable for an application whose job has the given flag.
    pub fn valid_transitions_for(self, requires_assessment: bool) -> Vec<Self> {
        self.valid_transitions()
            .into_iter()
            .filter(|target| !(requires_assessment && skips_assessment(self, *target)))
            .collect()
    }
}

impl Edge {
    fn permits(&self, actor: &Actor, owner: CandidateId) -> bool {
        if !self.actors.contains(&actor.role) {
            return false;
        }
        actor.role != Role::Candidate || actor.owns(owner)
    }
}

/// Input of [`LifecycleEngine::apply`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ApplyRequest {
    pub candidate_id: CandidateId,
    pub job_id: JobId,
    pub match_score: Option<f64>,
}

/// Committed change together with the event describing it.
#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleOutcome {
    pub application: Application,
    pub event: DomainEvent,
    pub checklist_id: Option<ChecklistId>,
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("application {0} not found")]
    ApplicationNotFound(ApplicationId),
    #[error("cannot move application from {from} to {to}")]
    InvalidTransition {
        from: ApplicationStatus,
        to: ApplicationStatus,
    },
    #[error("role {role} may not move an application to {target}")]
    Unauthorized {
        role: Role,
        target: ApplicationStatus,
    },
    #[error("application {0} changed since it was read")]
    ConcurrentModification(ApplicationId),
    #[error("candidate {candidate_id} already applied to job {job_id}")]
    AlreadyApplied {
        candidate_id: CandidateId,
        job_id: JobId,
    },
    #[error("candidate or job does not exist")]
    UnknownReference,
    #[error("match score {0} is outside 0..=100")]
    InvalidMatchScore(f64),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Owns the status of every application.
#[derive(Debug, Clone)]
pub struct LifecycleEngine<St> {
    store: St,
}

impl<St: ApplicationStore> LifecycleEngine<St> {
    pub fn new(store: St) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &St {
        &self.store
    }

    pub async fn fetch(&self, id: ApplicationId) -> Result<Application, LifecycleError> {
        self.store
            .get_application(id)
            .await?
            .ok_or(LifecycleError::ApplicationNotFound(id))
    }

    /// Statuses the application may move to next, given its job.
    pub async fn valid_transitions(
        &self,
        application: &Application,
    ) -> Result<Vec<ApplicationStatus>, LifecycleError> {
        let requires_assessment = match application.status {
            S::CvScreened => self.requires_assessment(application.job_id).await?,
            _ => false,
        };
        Ok(application.status.valid_transitions_for(requires_assessment))
    }

    async fn requires_assessment(&self, job_id: JobId) -> Result<bool, LifecycleError> {
        self.store
            .job_requires_assessment(job_id)
            .await?
            .ok_or_else(|| StoreError::Corrupt(format!("job {job_id} of an application is missing")))
            .map_err(LifecycleError::from)
    }

    /// Creates the application for a (candidate, job) pair in `applied`.
    pub async fn apply(
        &self,
        actor: &Actor,
        request: ApplyRequest,
        now: DateTime<Utc>,
    ) -> Result<LifecycleOutcome, LifecycleError> {
        let allowed = match actor.role {
            Role::Candidate => actor.owns(request.candidate_id),
            Role::Agency | Role::Hr | Role::Admin => true,
            Role::Manager | Role::Employee => false,
        };
        if !allowed {
            return Err(LifecycleError::Unauthorized {
                role: actor.role,
                target: S::Applied,
            });
        }

        let match_score = request
            .match_score
            .map(|value| MatchScore::new(value).ok_or(LifecycleError::InvalidMatchScore(value)))
            .transpose()?;

        let new = NewApplication {
            candidate_id: request.candidate_id,
            job_id: request.job_id,
            match_score,
            created_at: now,
        };
        let application = self
            .store
            .create_application(&new)
            .await
            .map_err(|err| match err {
                StoreError::Duplicate => LifecycleError::AlreadyApplied {
                    candidate_id: request.candidate_id,
                    job_id: request.job_id,
                },
                StoreError::MissingReference => LifecycleError::UnknownReference,
                other => LifecycleError::Store(other),
            })?;

        let event = DomainEvent::for_application(&application, now);
        Ok(LifecycleOutcome {
            application,
            event,
            checklist_id: None,
        })
    }

    /// Moves an application to `target` on behalf of `actor`.
    pub async fn request_transition(
        &self,
        id: ApplicationId,
        target: ApplicationStatus,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<LifecycleOutcome, LifecycleError> {
        let current = self.fetch(id).await?;
        let invalid = LifecycleError::InvalidTransition {
            from: current.status,
            to: target,
        };
        let Some(edge) = edge(current.status, target) else {
            return Err(invalid);
        };
        if skips_assessment(current.status, target)
            && self.requires_assessment(current.job_id).await?
        {
            return Err(invalid);
        }
        if !edge.permits(actor, current.candidate_id) {
            return Err(LifecycleError::Unauthorized {
                role: actor.role,
                target,
            });
        }

        let onboarding = (target == S::OfferAccepted).then(|| OnboardingSeed {
            candidate_id: current.candidate_id,
            job_id: current.job_id,
            start_date: now,
            tasks: &DEFAULT_ONBOARDING_TASKS,
        });
        let write = StatusWrite {
            application_id: id,
            expected: current.status,
            target,
            at: now,
            onboarding,
        };

        let checklist_id = match self.store.commit_transition(&write).await? {
            WriteOutcome::Applied { checklist_id } => checklist_id,
            WriteOutcome::Conflict => return Err(LifecycleError::ConcurrentModification(id)),
        };

        let application = Application {
            status: target,
            updated_at: now,
            ..current
        };
        let event = DomainEvent::for_application(&application, now);
        Ok(LifecycleOutcome {
            application,
            event,
            checklist_id,
        })
    }
}
