use std::fmt;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::profile::{NewProfile, PassHolder, ProfileRef};
use crate::store::{CreateProfileOutcome, ProfileStore, StoreError};

/// Kind of profile a pass is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassKind {
    Candidate,
    Employee,
    Agency,
}

impl PassKind {
    pub const ALL: [Self; 3] = [Self::Candidate, Self::Employee, Self::Agency];

    /// Prefix placed in front of the numeric suffix of an issued pass.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Candidate => "BAY-CAN",
            Self::Employee => "EMP",
            Self::Agency => "AGY",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Candidate => "candidate",
            Self::Employee => "employee",
            Self::Agency => "agency",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "candidate" => Some(Self::Candidate),
            "employee" => Some(Self::Employee),
            "agency" => Some(Self::Agency),
            _ => None,
        }
    }

    /// Decodes the kind from the leading segment of a pass string.
    pub fn from_pass(value: &str) -> Option<Self> {
        let (head, rest) = value.split_once('-')?;
        if rest.is_empty() {
            return None;
        }
        match head {
            "BAY" | "CAN" => Some(Self::Candidate),
            "EMP" => Some(Self::Employee),
            "AGY" => Some(Self::Agency),
            _ => None,
        }
    }
}

impl fmt::Display for PassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque public identifier of a candidate, employee or agency profile.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PassId(String);

impl PassId {
    /// Wraps a value read back from storage.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Normalizes user input into the issued form, expanding the short
    /// candidate form `CAN-NNNN` to `BAY-CAN-NNNN`.
    pub fn canonical(raw: &str) -> Option<(PassKind, Self)> {
        let trimmed = raw.trim();
        let kind = PassKind::from_pass(trimmed)?;
        let pass = if trimmed.starts_with("CAN-") {
            Self(format!("BAY-{trimmed}"))
        } else {
            Self::new(trimmed)
        };
        Some((kind, pass))
    }

    fn compose(kind: PassKind, suffix: u32, digits: u32) -> Self {
        let width = digits as usize;
        Self(format!("{}-{suffix:0width$}", kind.prefix()))
    }

    pub fn kind(&self) -> Option<PassKind> {
        PassKind::from_pass(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Source of the numeric part of a pass.
pub trait SuffixSource: Send + Sync {
    /// Returns a value in `1..upper`.
    fn next_suffix(&self, upper: u32) -> u32;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RandomSuffix;

impl SuffixSource for RandomSuffix {
    fn next_suffix(&self, upper: u32) -> u32 {
        rand::thread_rng().gen_range(1..upper)
    }
}

/// Shape of issued passes and the collision retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassPolicy {
    pub digits: u32,
    pub max_attempts: u32,
}

impl PassPolicy {
    pub const MAX_DIGITS: u32 = 9;

    fn upper_bound(self) -> u32 {
        10u32.pow(self.digits.clamp(1, Self::MAX_DIGITS))
    }
}

impl Default for PassPolicy {
    fn default() -> Self {
        Self {
            digits: 4,
            max_attempts: 64,
        }
    }
}

/// Issues and resolves passes against a [`ProfileStore`].
#[derive(Debug, Clone)]
pub struct PassRegistry<S, G = RandomSuffix> {
    store: S,
    suffixes: G,
    policy: PassPolicy,
}

impl<S: ProfileStore> PassRegistry<S> {
    pub fn new(store: S, policy: PassPolicy) -> Self {
        Self::with_suffix_source(store, RandomSuffix, policy)
    }
}

impl<S: ProfileStore, G: SuffixSource> PassRegistry<S, G> {
    pub fn with_suffix_source(store: S, suffixes: G, policy: PassPolicy) -> Self {
        Self {
            store,
            suffixes,
            policy,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn next_candidate(&self, kind: PassKind) -> PassId {
        let suffix = self.suffixes.next_suffix(self.policy.upper_bound());
        PassId::compose(kind, suffix, self.policy.digits.clamp(1, PassPolicy::MAX_DIGITS))
    }

    fn exhausted(&self, kind: PassKind) -> PassError {
        PassError::IssuanceExhausted {
            kind,
            attempts: self.policy.max_attempts,
        }
    }

    /// Returns a pass of `kind` that no stored profile currently holds.
    pub async fn issue_pass(&self, kind: PassKind) -> Result<PassId, PassError> {
        for _ in 0..self.policy.max_attempts {
            let pass = self.next_candidate(kind);
            if !self.store.pass_exists(&pass).await? {
                return Ok(pass);
            }
        }
        Err(self.exhausted(kind))
    }

    /// Issues a pass and persists the profile bound to it.
    ///
    /// A pass taken between the existence check and the insert counts as a
    /// collision and consumes one attempt from the same budget.
    pub async fn register(
        &self,
        profile: &NewProfile,
        at: DateTime<Utc>,
    ) -> Result<ProfileRef, PassError> {
        let kind = profile.kind();
        for _ in 0..self.policy.max_attempts {
            let pass = self.next_candidate(kind);
            if self.store.pass_exists(&pass).await? {
                continue;
            }
            match self
                .store
                .create_profile_with_pass(&pass, profile, at)
                .await?
            {
                CreateProfileOutcome::Created(created) => return Ok(created),
                CreateProfileOutcome::PassTaken => continue,
            }
        }
        Err(self.exhausted(kind))
    }

    /// Resolves a pass to its owning profile with a single targeted lookup.
    pub async fn resolve_pass(&self, raw: &str) -> Result<PassHolder, PassError> {
        let (kind, pass) = PassId::canonical(raw).ok_or(PassError::NotFound)?;
        self.store
            .find_profile_by_pass(kind, &pass)
            .await?
            .ok_or(PassError::NotFound)
    }
}

#[derive(Debug, Error)]
pub enum PassError {
    #[error("could not issue a unique {kind} pass after {attempts} attempts")]
    IssuanceExhausted { kind: PassKind, attempts: u32 },
    #[error("pass not found")]
    NotFound,
    #[error(transparent)]
    Store(#[from] StoreError),
}
