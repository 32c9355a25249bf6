use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use hris_core::onboarding::OnboardingError;
use hris_core::{LifecycleError, PassError, StoreError};
use hris_storage::JobError;

use crate::auth::TokenError;

#[derive(Debug, Serialize)]
struct ProblemDetails {
    #[serde(rename = "type")]
    problem_type: &'static str,
    title: &'static str,
    detail: String,
}

pub struct ProblemResponse {
    status: StatusCode,
    body: ProblemDetails,
}

impl ProblemResponse {
    pub fn new<S: Into<String>>(status: StatusCode, problem_type: &'static str, detail: S) -> Self {
        Self {
            status,
            body: ProblemDetails {
                problem_type,
                title: status.canonical_reason().unwrap_or("error"),
                detail: detail.into(),
            },
        }
    }
}

impl IntoResponse for ProblemResponse {
    fn into_response(self) -> Response {
        let mut response = Json(self.body).into_response();
        *response.status_mut() = self.status;
        response.headers_mut().insert(
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderValue::from_static("application/problem+json"),
        );
        response
    }
}

/// Failure of an API handler, rendered as `application/problem+json`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Unprocessable(String),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Pass(#[from] PassError),
    #[error(transparent)]
    Onboarding(#[from] OnboardingError),
    #[error(transparent)]
    Job(#[from] JobError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApiError {
    fn problem(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Token(_) => (StatusCode::UNAUTHORIZED, "/problems/unauthenticated"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "/problems/forbidden"),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "/problems/not-found"),
            Self::Unprocessable(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "/problems/invalid-request")
            }
            Self::Lifecycle(err) => match err {
                LifecycleError::ApplicationNotFound(_) => {
                    (StatusCode::NOT_FOUND, "/problems/application-not-found")
                }
                LifecycleError::InvalidTransition { .. } => {
                    (StatusCode::CONFLICT, "/problems/invalid-transition")
                }
                LifecycleError::Unauthorized { .. } => {
                    (StatusCode::FORBIDDEN, "/problems/unauthorized-transition")
                }
                LifecycleError::ConcurrentModification(_) => {
                    (StatusCode::CONFLICT, "/problems/concurrent-modification")
                }
                LifecycleError::AlreadyApplied { .. } => {
                    (StatusCode::CONFLICT, "/problems/already-applied")
                }
                LifecycleError::UnknownReference => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "/problems/unknown-reference")
                }
                LifecycleError::InvalidMatchScore(_) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "/problems/invalid-match-score")
                }
                LifecycleError::Store(err) => store_problem(err),
            },
            Self::Pass(err) => match err {
                PassError::IssuanceExhausted { .. } => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "/problems/pass-issuance-exhausted",
                ),
                PassError::NotFound => (StatusCode::NOT_FOUND, "/problems/pass-not-found"),
                PassError::Store(err) => store_problem(err),
            },
            Self::Onboarding(err) => match err {
                OnboardingError::TaskNotFound(_) => {
                    (StatusCode::NOT_FOUND, "/problems/task-not-found")
                }
                OnboardingError::Unauthorized(_) => (StatusCode::FORBIDDEN, "/problems/forbidden"),
                OnboardingError::Store(err) => store_problem(err),
            },
            Self::Job(err) => match err {
                JobError::DuplicateCode(_) => (StatusCode::CONFLICT, "/problems/duplicate-job-code"),
                JobError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "/problems/storage"),
            },
            Self::Store(err) => store_problem(err),
        }
    }
}

fn store_problem(err: &StoreError) -> (StatusCode, &'static str) {
    match err {
        StoreError::Duplicate => (StatusCode::CONFLICT, "/problems/duplicate"),
        StoreError::MissingReference => {
            (StatusCode::UNPROCESSABLE_ENTITY, "/problems/unknown-reference")
        }
        StoreError::Corrupt(_) | StoreError::Backend(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "/problems/storage")
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, problem_type) = self.problem();
        let detail = if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
            error!(stage = "api", error = %self, "request failed");
            "internal storage error".to_string()
        } else {
            self.to_string()
        };
        ProblemResponse::new(status, problem_type, detail).into_response()
    }
}
