//! Read-side views over the pipeline for HR: application listings, the
//! status funnel and time-to-hire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pass::PassId;
use crate::types::{Application, ApplicationStatus, JobId};

use ApplicationStatus as S;

/// Funnel bucket; each groups one or more adjacent statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FunnelStage {
    Applied,
    Assessment,
    Shortlisted,
    Interview,
    Offer,
    Hired,
}

impl FunnelStage {
    pub const ALL: [Self; 6] = [
        Self::Applied,
        Self::Assessment,
        Self::Shortlisted,
        Self::Interview,
        Self::Offer,
        Self::Hired,
    ];

    pub fn statuses(self) -> &'static [ApplicationStatus] {
        match self {
            Self::Applied => &[S::Applied, S::CvScreened],
            Self::Assessment => &[S::AssessmentPending, S::AssessmentCompleted],
            Self::Shortlisted => &[S::Shortlisted],
            Self::Interview => &[S::InterviewScheduled, S::Interviewed],
            Self::Offer => &[S::OfferPending, S::OfferSent, S::OfferAccepted],
            Self::Hired => &[S::Hired],
        }
    }

    /// Stage counting `status`. `onboarding` and the two rejections are outside the funnel.
    pub fn of(status: ApplicationStatus) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|stage| stage.statuses().contains(&status))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FunnelEntry {
    pub stage: FunnelStage,
    pub count: u64,
}

/// Folds per-status application counts into the six funnel stages.
pub fn funnel(counts: impl IntoIterator<Item = (ApplicationStatus, u64)>) -> Vec<FunnelEntry> {
    let mut entries: Vec<FunnelEntry> = FunnelStage::ALL
        .into_iter()
        .map(|stage| FunnelEntry { stage, count: 0 })
        .collect();
    for (status, count) in counts {
        if let Some(stage) = FunnelStage::of(status) {
            if let Some(entry) = entries.iter_mut().find(|entry| entry.stage == stage) {
                entry.count += count;
            }
        }
    }
    entries
}

/// Hires grouped by how many whole days they took.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HireDistribution {
    pub within_7_days: usize,
    pub within_14_days: usize,
    pub within_30_days: usize,
    pub over_30_days: usize,
}

/// Days from application to accepted offer across every hire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TimeToHire {
    pub average_days: i64,
    pub total_hires: usize,
    pub distribution: HireDistribution,
}

impl TimeToHire {
    /// Builds the summary from `(applied_at, accepted_at)` pairs.
    ///
    /// Each span is rounded to whole days and the average is rounded again.
    pub fn from_spans(spans: impl IntoIterator<Item = (DateTime<Utc>, DateTime<Utc>)>) -> Self {
        let days: Vec<i64> = spans
            .into_iter()
            .map(|(applied_at, accepted_at)| whole_days(accepted_at - applied_at))
            .collect();
        if days.is_empty() {
            return Self::default();
        }

        let mut distribution = HireDistribution::default();
        for &value in &days {
            match value {
                i64::MIN..=7 => distribution.within_7_days += 1,
                8..=14 => distribution.within_14_days += 1,
                15..=30 => distribution.within_30_days += 1,
                _ => distribution.over_30_days += 1,
            }
        }

        let total: i64 = days.iter().sum();
        Self {
            average_days: (total as f64 / days.len() as f64).round() as i64,
            total_hires: days.len(),
            distribution,
        }
    }
}

fn whole_days(span: chrono::Duration) -> i64 {
    (span.num_seconds() as f64 / 86_400.0).round() as i64
}

/// Optional narrowing of the HR application listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct ApplicationFilter {
    #[serde(default)]
    pub status: Option<ApplicationStatus>,
    #[serde(default)]
    pub job_id: Option<JobId>,
}

/// One row of the HR listing: the application plus who and what it is for.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApplicationSummary {
    #[serde(flatten)]
    pub application: Application,
    pub job_code: String,
    pub job_title: String,
    pub candidate_name: String,
    pub candidate_pass: PassId,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn ts(days: i64, hours: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0)
            .single()
            .expect("valid timestamp")
            + Duration::days(days)
            + Duration::hours(hours)
    }

    #[test]
    fn every_funnel_status_belongs_to_one_stage() {
        let mut covered: Vec<ApplicationStatus> = FunnelStage::ALL
            .into_iter()
            .flat_map(|stage| stage.statuses().iter().copied())
            .collect();
        let total = covered.len();
        covered.dedup();
        assert_eq!(covered.len(), total);

        for status in ApplicationStatus::ALL {
            let outside = matches!(status, S::Onboarding | S::Rejected | S::OfferRejected);
            assert_eq!(FunnelStage::of(status).is_none(), outside, "{status}");
        }
    }

    #[test]
    fn funnel_sums_counts_per_stage() {
        let entries = funnel([
            (S::Applied, 4),
            (S::CvScreened, 2),
            (S::OfferSent, 1),
            (S::OfferAccepted, 2),
            (S::Rejected, 9),
            (S::Hired, 1),
        ]);

        let counts: Vec<(FunnelStage, u64)> =
            entries.iter().map(|entry| (entry.stage, entry.count)).collect();
        assert_eq!(
            counts,
            vec![
                (FunnelStage::Applied, 6),
                (FunnelStage::Assessment, 0),
                (FunnelStage::Shortlisted, 0),
                (FunnelStage::Interview, 0),
                (FunnelStage::Offer, 3),
                (FunnelStage::Hired, 1),
            ]
        );
        let json = serde_json::to_value(&entries[4]).expect("json");
        assert_eq!(json["stage"], "offer");
    }

    #[test]
    fn time_to_hire_rounds_and_buckets_spans() {
        let summary = TimeToHire::from_spans([
            (ts(0, 0), ts(3, 13)),
            (ts(0, 0), ts(7, 0)),
            (ts(0, 0), ts(10, 0)),
            (ts(0, 0), ts(30, 0)),
            (ts(0, 0), ts(45, 0)),
        ]);

        assert_eq!(summary.total_hires, 5);
        // 4 + 7 + 10 + 30 + 45 = 96 days over five hires
        assert_eq!(summary.average_days, 19);
        assert_eq!(
            summary.distribution,
            HireDistribution {
                within_7_days: 2,
                within_14_days: 1,
                within_30_days: 1,
                over_30_days: 1,
            }
        );
    }

    #[test]
    fn time_to_hire_without_hires_is_zero() {
        assert_eq!(TimeToHire::from_spans([]), TimeToHire::default());
    }
}
