use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use hris_core::journey::{journey, JourneyStage};
use hris_core::onboarding::{self, OnboardingChecklist, OnboardingError};
use hris_core::profile::{CandidateSource, NewAgency, NewCandidate, NewEmployee, NewProfile};
use hris_core::reporting::{
    self, ApplicationFilter, ApplicationSummary, FunnelEntry, TimeToHire,
};
use hris_core::types::{
    Actor, Application, ApplicationId, ApplicationStatus, CandidateId, ChecklistId, Job, JobId,
    NewJob, Role, TaskId,
};
use hris_core::{
    ApplyRequest, LifecycleEngine, LifecycleError, PassError, PassPolicy, PassRegistry,
};
use hris_storage::Database;

use crate::auth::ActorTokenValidator;
use crate::notify::{ws_handler, NotificationHub};
use crate::problem::ApiError;
use crate::telemetry;

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Clone)]
pub struct AppState {
    metrics: PrometheusHandle,
    storage: Database,
    lifecycle: Arc<LifecycleEngine<Database>>,
    passes: Arc<PassRegistry<Database>>,
    notifier: NotificationHub,
    token_validator: ActorTokenValidator,
    clock: Clock,
}

impl AppState {
    pub fn new(
        metrics: PrometheusHandle,
        storage: Database,
        pass_policy: PassPolicy,
        token_secret: &[u8],
        notify_buffer: usize,
    ) -> Self {
        Self {
            metrics,
            lifecycle: Arc::new(LifecycleEngine::new(storage.clone())),
            passes: Arc::new(PassRegistry::new(storage.clone(), pass_policy)),
            storage,
            notifier: NotificationHub::new(notify_buffer),
            token_validator: ActorTokenValidator::new(token_secret),
            clock: Arc::new(Utc::now),
        }
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn metrics(&self) -> &PrometheusHandle {
        &self.metrics
    }

    pub fn storage(&self) -> &Database {
        &self.storage
    }

    pub fn lifecycle(&self) -> &LifecycleEngine<Database> {
        &self.lifecycle
    }

    pub fn passes(&self) -> &PassRegistry<Database> {
        &self.passes
    }

    pub fn notifier(&self) -> &NotificationHub {
        &self.notifier
    }

    pub fn token_validator(&self) -> &ActorTokenValidator {
        &self.token_validator
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    fn actor(&self, headers: &HeaderMap) -> Result<Actor, ApiError> {
        Ok(self.token_validator.actor_from_headers(headers, self.now())?)
    }

    fn optional_actor(&self, headers: &HeaderMap) -> Result<Option<Actor>, ApiError> {
        Ok(self.token_validator.optional_actor(headers, self.now())?)
    }
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route("/api/jobs", get(list_jobs).post(create_job))
        .route("/api/jobs/:id", get(get_job))
        .route("/api/jobs/:id/close", post(close_job))
        .route("/api/profiles/candidates", post(register_candidate))
        .route("/api/profiles/employees", post(register_employee))
        .route("/api/profiles/agencies", post(register_agency))
        .route("/api/pass/:pass", get(resolve_pass))
        .route("/api/applications", get(list_applications).post(apply))
        .route("/api/applications/:id", get(get_application))
        .route("/api/applications/:id/status", patch(transition))
        .route("/api/applications/:id/journey", get(application_journey))
        .route("/api/applications/:id/onboarding", get(application_onboarding))
        .route("/api/onboarding/tasks/:id/complete", post(complete_task))
        .route("/api/analytics/funnel", get(funnel))
        .route("/api/analytics/time-to-hire", get(time_to_hire))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body = telemetry::render_metrics(state.metrics());
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
}

fn require_role(actor: &Actor, allowed: &[Role], action: &str) -> Result<(), ApiError> {
    if allowed.contains(&actor.role) {
        Ok(())
    } else {
        Err(ApiError::Forbidden(format!(
            "role {} may not {action}",
            actor.role
        )))
    }
}

const HR_ONLY: &[Role] = &[Role::Hr, Role::Admin];

fn require_viewer(actor: &Actor, application: &Application) -> Result<(), ApiError> {
    if actor.role.is_staff() || actor.owns(application.candidate_id) {
        Ok(())
    } else {
        Err(ApiError::Forbidden(format!(
            "role {} may not view application {}",
            actor.role, application.id
        )))
    }
}

fn require_text(field: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        Err(ApiError::Unprocessable(format!("{field} must not be empty")))
    } else {
        Ok(())
    }
}

async fn create_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(job): Json<NewJob>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = state.actor(&headers)?;
    require_role(&actor, HR_ONLY, "create jobs")?;
    require_text("job_code", &job.job_code)?;
    require_text("title", &job.title)?;

    let job = state.storage().jobs().create(&job, state.now()).await?;
    info!(stage = "jobs", job_id = %job.id, job_code = %job.job_code, "job created");
    Ok((StatusCode::CREATED, Json(job)))
}

async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state
        .storage()
        .jobs()
        .fetch(JobId(id))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("job {id} not found")))?;
    Ok(Json(job))
}

#[derive(Debug, Serialize)]
struct JobList {
    jobs: Vec<Job>,
}

async fn list_jobs(State(state): State<AppState>) -> Result<Json<JobList>, ApiError> {
    let jobs = state.storage().jobs().list_active().await?;
    Ok(Json(JobList { jobs }))
}

async fn close_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<Job>, ApiError> {
    let actor = state.actor(&headers)?;
    require_role(&actor, HR_ONLY, "close jobs")?;

    let job = state
        .storage()
        .jobs()
        .close(JobId(id), state.now())
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("job {id} not found")))?;
    info!(stage = "jobs", job_id = %job.id, job_code = %job.job_code, "job closed");
    Ok(Json(job))
}

async fn register(state: &AppState, profile: NewProfile) -> Result<impl IntoResponse, ApiError> {
    let kind = profile.kind();
    let created = state.passes().register(&profile, state.now()).await;
    match &created {
        Ok(created) => {
            counter!("passes_issued_total", "kind" => kind.as_str()).increment(1);
            info!(stage = "pass", kind = kind.as_str(), pass = %created.pass, "profile registered");
        }
        Err(PassError::IssuanceExhausted { attempts, .. }) => {
            warn!(stage = "pass", kind = kind.as_str(), attempts, "pass space exhausted");
        }
        Err(_) => {}
    }
    Ok((StatusCode::CREATED, Json(created?)))
}

async fn register_candidate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(mut candidate): Json<NewCandidate>,
) -> Result<impl IntoResponse, ApiError> {
    require_text("full_name", &candidate.full_name)?;
    require_text("email", &candidate.email)?;

    match state.optional_actor(&headers)? {
        Some(actor) if actor.role == Role::Agency => {
            candidate.source = CandidateSource::Agency;
            candidate.agency_id = actor.agency_id;
        }
        Some(actor) if matches!(actor.role, Role::Hr | Role::Admin) => {}
        _ if candidate.agency_id.is_some() => {
            return Err(ApiError::Forbidden(
                "only agencies and hr may attribute a candidate to an agency".to_string(),
            ));
        }
        _ => {}
    }

    register(&state, NewProfile::Candidate(candidate)).await
}

async fn register_employee(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(employee): Json<NewEmployee>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = state.actor(&headers)?;
    require_role(&actor, HR_ONLY, "register employees")?;
    require_text("full_name", &employee.full_name)?;
    require_text("employee_code", &employee.employee_code)?;

    register(&state, NewProfile::Employee(employee)).await
}

async fn register_agency(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(agency): Json<NewAgency>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = state.actor(&headers)?;
    require_role(&actor, HR_ONLY, "register agencies")?;
    require_text("company_name", &agency.company_name)?;
    if !(0.0..=100.0).contains(&agency.commission_rate) {
        return Err(ApiError::Unprocessable(format!(
            "commission_rate must be within 0..=100 (got {})",
            agency.commission_rate
        )));
    }

    register(&state, NewProfile::Agency(agency)).await
}

async fn resolve_pass(
    State(state): State<AppState>,
    Path(pass): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let result = match state.passes().resolve_pass(&pass).await {
        Ok(holder) => {
            counter!("pass_lookups_total", "result" => "found").increment(1);
            Ok(Json(holder))
        }
        Err(PassError::NotFound) => {
            counter!("pass_lookups_total", "result" => "not_found").increment(1);
            Err(PassError::NotFound)
        }
        Err(err) => {
            counter!("pass_lookups_total", "result" => "error").increment(1);
            Err(err)
        }
    };
    Ok(result?)
}

#[derive(Debug, Deserialize)]
struct ApplyBody {
    #[serde(default)]
    candidate_id: Option<CandidateId>,
    job_id: JobId,
    #[serde(default)]
    match_score: Option<f64>,
}

async fn apply(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ApplyBody>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = state.actor(&headers)?;
    let candidate_id = body
        .candidate_id
        .or(actor.candidate_id)
        .ok_or_else(|| ApiError::Unprocessable("candidate_id is required".to_string()))?;
    let request = ApplyRequest {
        candidate_id,
        job_id: body.job_id,
        match_score: body.match_score,
    };

    let outcome = match state.lifecycle().apply(&actor, request, state.now()).await {
        Ok(outcome) => outcome,
        Err(err) => {
            counter!("applications_created_total", "result" => lifecycle_result(&err))
                .increment(1);
            return Err(err.into());
        }
    };
    counter!("applications_created_total", "result" => "created").increment(1);
    info!(
        stage = "lifecycle",
        application_id = %outcome.application.id,
        candidate_id = %candidate_id,
        job_id = %body.job_id,
        role = actor.role.as_str(),
        "application created"
    );
    state.notifier().publish(outcome.event);
    Ok((StatusCode::CREATED, Json(outcome.application)))
}

#[derive(Debug, Serialize)]
struct ApplicationList {
    applications: Vec<ApplicationSummary>,
}

async fn list_applications(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(filter): Query<ApplicationFilter>,
) -> Result<Json<ApplicationList>, ApiError> {
    let actor = state.actor(&headers)?;
    require_role(&actor, HR_ONLY, "list applications")?;

    let applications = state.storage().reporting().list_applications(filter).await?;
    Ok(Json(ApplicationList { applications }))
}

async fn viewable_application(
    state: &AppState,
    headers: &HeaderMap,
    id: i64,
) -> Result<Application, ApiError> {
    let actor = state.actor(headers)?;
    let application = state.lifecycle().fetch(ApplicationId(id)).await?;
    require_viewer(&actor, &application)?;
    Ok(application)
}

async fn get_application(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let application = viewable_application(&state, &headers, id).await?;
    Ok(Json(application))
}

#[derive(Debug, Deserialize)]
struct TransitionBody {
    status: String,
}

#[derive(Debug, Serialize)]
struct TransitionResponse {
    application: Application,
    valid_transitions: Vec<ApplicationStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    checklist_id: Option<ChecklistId>,
}

fn lifecycle_result(err: &LifecycleError) -> &'static str {
    match err {
        LifecycleError::ApplicationNotFound(_) => "not_found",
        LifecycleError::InvalidTransition { .. } => "invalid",
        LifecycleError::Unauthorized { .. } => "unauthorized",
        LifecycleError::ConcurrentModification(_) => "conflict",
        LifecycleError::AlreadyApplied { .. } => "duplicate",
        LifecycleError::UnknownReference | LifecycleError::InvalidMatchScore(_) => "rejected",
        LifecycleError::Store(_) => "error",
    }
}

async fn transition(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<TransitionBody>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = state.actor(&headers)?;
    let target: ApplicationStatus = body
        .status
        .trim()
        .parse()
        .map_err(|_| ApiError::Unprocessable(format!("unknown status '{}'", body.status)))?;

    let outcome = match state
        .lifecycle()
        .request_transition(ApplicationId(id), target, &actor, state.now())
        .await
    {
        Ok(outcome) => outcome,
        Err(err) => {
            let result = lifecycle_result(&err);
            counter!("lifecycle_transitions_total", "result" => result).increment(1);
            if matches!(err, LifecycleError::ConcurrentModification(_)) {
                warn!(
                    stage = "lifecycle",
                    application_id = id,
                    requested = target.as_str(),
                    "concurrent status change"
                );
            }
            return Err(err.into());
        }
    };

    counter!("lifecycle_transitions_total", "result" => "applied").increment(1);
    info!(
        stage = "lifecycle",
        application_id = id,
        status = outcome.application.status.as_str(),
        role = actor.role.as_str(),
        checklist_id = outcome.checklist_id.map(|checklist| checklist.0),
        "status transition committed"
    );
    state.notifier().publish(outcome.event);

    let valid_transitions = state.lifecycle().valid_transitions(&outcome.application).await?;
    Ok(Json(TransitionResponse {
        application: outcome.application,
        valid_transitions,
        checklist_id: outcome.checklist_id,
    }))
}

#[derive(Debug, Serialize)]
struct JourneyResponse {
    application_id: ApplicationId,
    status: ApplicationStatus,
    stages: Vec<JourneyStage>,
}

async fn application_journey(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let application = viewable_application(&state, &headers, id).await?;
    Ok(Json(JourneyResponse {
        application_id: application.id,
        status: application.status,
        stages: journey(&application),
    }))
}

async fn application_onboarding(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<OnboardingChecklist>, ApiError> {
    let application = viewable_application(&state, &headers, id).await?;
    let checklist = onboarding::checklist_for_application(state.storage(), &application, state.now())
        .await?
        .ok_or_else(|| {
            ApiError::NotFound(format!("application {id} has no onboarding checklist"))
        })?;
    Ok(Json(checklist))
}

async fn complete_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<OnboardingChecklist>, ApiError> {
    let actor = state.actor(&headers)?;
    let result = onboarding::complete_task(state.storage(), TaskId(id), &actor, state.now()).await;
    let label = match &result {
        Ok(_) => "completed",
        Err(OnboardingError::TaskNotFound(_)) => "not_found",
        Err(OnboardingError::Unauthorized(_)) => "unauthorized",
        Err(OnboardingError::Store(_)) => "error",
    };
    counter!("onboarding_tasks_completed_total", "result" => label).increment(1);

    let checklist = result?;
    info!(
        stage = "onboarding",
        task_id = id,
        checklist_id = %checklist.id,
        status = checklist.status.as_str(),
        "onboarding task completed"
    );
    Ok(Json(checklist))
}

#[derive(Debug, Serialize)]
struct FunnelResponse {
    funnel: Vec<FunnelEntry>,
}

async fn funnel(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<FunnelResponse>, ApiError> {
    let actor = state.actor(&headers)?;
    require_role(&actor, HR_ONLY, "view analytics")?;

    let counts = state.storage().reporting().status_counts().await?;
    Ok(Json(FunnelResponse {
        funnel: reporting::funnel(counts),
    }))
}

async fn time_to_hire(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<TimeToHire>, ApiError> {
    let actor = state.actor(&headers)?;
    require_role(&actor, HR_ONLY, "view analytics")?;

    let spans = state.storage().reporting().hire_spans().await?;
    Ok(Json(TimeToHire::from_spans(spans)))
}
