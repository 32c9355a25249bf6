use axum::http::{header, HeaderMap};
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use hris_core::types::{Actor, AgencyId, CandidateId, Role};

/// Verifies HS256 bearer tokens and turns their claims into an [`Actor`].
#[derive(Clone)]
pub struct ActorTokenValidator {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl ActorTokenValidator {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(jsonwebtoken::Algorithm::HS256);
        validation.validate_aud = false;
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.required_spec_claims.clear();
        Self {
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    pub fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<Actor, TokenError> {
        let claims = decode::<ActorClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|err| TokenError::Invalid(format!("{err}")))?
            .claims;

        let now_ts = now.timestamp();
        if let Some(nbf) = claims.nbf {
            if now_ts < nbf {
                return Err(TokenError::Invalid("token_not_yet_valid".to_string()));
            }
        }
        if now_ts >= claims.exp {
            return Err(TokenError::Invalid("token_expired".to_string()));
        }

        let role: Role = claims
            .role
            .parse()
            .map_err(|_| TokenError::Invalid("unknown_role".to_string()))?;
        let actor = Actor {
            role,
            candidate_id: claims.candidate_id.map(CandidateId),
            agency_id: claims.agency_id.map(AgencyId),
        };
        match role {
            Role::Candidate if actor.candidate_id.is_none() => {
                Err(TokenError::Invalid("missing_candidate_id".to_string()))
            }
            Role::Agency if actor.agency_id.is_none() => {
                Err(TokenError::Invalid("missing_agency_id".to_string()))
            }
            _ => Ok(actor),
        }
    }

    /// Resolves the actor from an `Authorization: Bearer` header.
    pub fn actor_from_headers(
        &self,
        headers: &HeaderMap,
        now: DateTime<Utc>,
    ) -> Result<Actor, TokenError> {
        let token = bearer_token(headers).ok_or(TokenError::Missing)?;
        self.validate(token, now)
    }

    /// Like [`Self::actor_from_headers`] but treats a missing header as anonymous.
    pub fn optional_actor(
        &self,
        headers: &HeaderMap,
        now: DateTime<Utc>,
    ) -> Result<Option<Actor>, TokenError> {
        match bearer_token(headers) {
            Some(token) => self.validate(token, now).map(Some),
            None => Ok(None),
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))?
        .trim();
    (!token.is_empty()).then_some(token)
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ActorClaims {
    pub sub: String,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agency_id: Option<i64>,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("missing bearer token")]
    Missing,
    #[error("invalid token: {0}")]
    Invalid(String),
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use jsonwebtoken::{encode, EncodingKey, Header};

    pub(crate) const SECRET: &[u8] = b"test-actor-token-secret";

    pub(crate) fn token_for(role: &str, candidate_id: Option<i64>, agency_id: Option<i64>) -> String {
        let claims = ActorClaims {
            sub: format!("user-{role}"),
            role: role.to_string(),
            candidate_id,
            agency_id,
            exp: Utc::now().timestamp() + 3600,
            nbf: None,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET)).expect("encode")
    }

    #[test]
    fn decodes_candidate_actor() {
        let validator = ActorTokenValidator::new(SECRET);
        let actor = validator
            .validate(&token_for("candidate", Some(9), None), Utc::now())
            .expect("valid token");
        assert_eq!(actor, Actor::candidate(CandidateId(9)));
    }

    #[test]
    fn rejects_expired_and_foreign_tokens() {
        let validator = ActorTokenValidator::new(SECRET);
        let token = token_for("hr", None, None);

        let later = Utc::now() + chrono::Duration::hours(2);
        assert!(matches!(
            validator.validate(&token, later),
            Err(TokenError::Invalid(reason)) if reason == "token_expired"
        ));

        let other = ActorTokenValidator::new(b"another-secret-value");
        assert!(other.validate(&token, Utc::now()).is_err());
    }

    #[test]
    fn candidate_token_requires_candidate_id() {
        let validator = ActorTokenValidator::new(SECRET);
        let err = validator
            .validate(&token_for("candidate", None, None), Utc::now())
            .unwrap_err();
        assert!(matches!(err, TokenError::Invalid(reason) if reason == "missing_candidate_id"));
    }

    #[test]
    fn reads_bearer_header() {
        let validator = ActorTokenValidator::new(SECRET);
        let mut headers = HeaderMap::new();
        assert!(matches!(
            validator.actor_from_headers(&headers, Utc::now()),
            Err(TokenError::Missing)
        ));
        assert!(validator
            .optional_actor(&headers, Utc::now())
            .expect("anonymous")
            .is_none());

        let value = format!("Bearer {}", token_for("admin", None, None));
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&value).expect("header"),
        );
        let actor = validator
            .actor_from_headers(&headers, Utc::now())
            .expect("actor");
        assert_eq!(actor.role, Role::Admin);
    }
}
