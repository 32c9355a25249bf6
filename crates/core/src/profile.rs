use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::onboarding::OnboardingChecklist;
use crate::pass::{PassId, PassKind};
use crate::types::{AgencyId, Application, CandidateId, EmployeeId};

/// How a candidate entered the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSource {
    #[default]
    Direct,
    Agency,
    Referral,
}

impl CandidateSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Agency => "agency",
            Self::Referral => "referral",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "direct" => Some(Self::Direct),
            "agency" => Some(Self::Agency),
            "referral" => Some(Self::Referral),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewCandidate {
    pub full_name: String,
    pub email: String,
    #[serde(default)]
    pub cv_url: Option<String>,
    #[serde(default)]
    pub source: CandidateSource,
    #[serde(default)]
    pub agency_id: Option<AgencyId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewEmployee {
    pub full_name: String,
    pub email: String,
    pub employee_code: String,
    pub job_title: String,
    pub department: String,
    pub employment_type: String,
    pub hire_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewAgency {
    pub company_name: String,
    pub contact_person: String,
    pub email: String,
    pub commission_rate: f64,
}

/// Attributes of a profile that is about to receive a pass.
#[derive(Debug, Clone, PartialEq)]
pub enum NewProfile {
    Candidate(NewCandidate),
    Employee(NewEmployee),
    Agency(NewAgency),
}

impl NewProfile {
    pub fn kind(&self) -> PassKind {
        match self {
            Self::Candidate(_) => PassKind::Candidate,
            Self::Employee(_) => PassKind::Employee,
            Self::Agency(_) => PassKind::Agency,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateProfile {
    pub id: CandidateId,
    pub pass: PassId,
    pub full_name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cv_url: Option<String>,
    pub source: CandidateSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agency_id: Option<AgencyId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmployeeProfile {
    pub id: EmployeeId,
    pub pass: PassId,
    pub full_name: String,
    pub email: String,
    pub employee_code: String,
    pub job_title: String,
    pub department: String,
    pub employment_type: String,
    pub hire_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgencyProfile {
    pub id: AgencyId,
    pub pass: PassId,
    pub company_name: String,
    pub contact_person: String,
    pub email: String,
    pub commission_rate: f64,
    pub created_at: DateTime<Utc>,
}

/// Newly created profile together with its pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileRef {
    pub kind: PassKind,
    pub id: i64,
    pub pass: PassId,
}

/// Application listed on a candidate pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PassApplication {
    #[serde(flatten)]
    pub application: Application,
    pub job_title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidatePass {
    pub profile: CandidateProfile,
    pub applications: Vec<PassApplication>,
    pub onboarding: Vec<OnboardingChecklist>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmployeePass {
    pub profile: EmployeeProfile,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgencyPass {
    pub profile: AgencyProfile,
    pub submissions: Vec<CandidateProfile>,
}

/// Owning entity of a pass, with the collections shown on its public view.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "pass", rename_all = "snake_case")]
pub enum PassHolder {
    Candidate(CandidatePass),
    Employee(EmployeePass),
    Agency(AgencyPass),
}

impl PassHolder {
    pub fn kind(&self) -> PassKind {
        match self {
            Self::Candidate(_) => PassKind::Candidate,
            Self::Employee(_) => PassKind::Employee,
            Self::Agency(_) => PassKind::Agency,
        }
    }

    pub fn pass(&self) -> &PassId {
        match self {
            Self::Candidate(holder) => &holder.profile.pass,
            Self::Employee(holder) => &holder.profile.pass,
            Self::Agency(holder) => &holder.profile.pass,
        }
    }
}
