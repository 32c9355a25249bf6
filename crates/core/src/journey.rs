use serde::Serialize;

use crate::types::{Application, ApplicationStatus};

/// Coarse stages shown to candidates on their application timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Applied,
    CvScreening,
    Assessment,
    Interview,
    Offer,
    Onboarding,
}

impl PipelineStage {
    pub const ALL: [Self; 6] = [
        Self::Applied,
        Self::CvScreening,
        Self::Assessment,
        Self::Interview,
        Self::Offer,
        Self::Onboarding,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Applied => "Applied",
            Self::CvScreening => "CV Screening",
            Self::Assessment => "Assessment",
            Self::Interview => "Interview",
            Self::Offer => "Offer",
            Self::Onboarding => "Onboarding",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    Completed,
    InProgress,
    Pending,
    Halted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct JourneyStage {
    pub stage: PipelineStage,
    pub label: &'static str,
    pub state: StageState,
}

enum Position {
    At(usize),
    Finished,
    StoppedAt(usize),
}

fn position(status: ApplicationStatus) -> Position {
    use ApplicationStatus as S;
    match status {
        S::Applied => Position::At(1),
        S::CvScreened | S::AssessmentPending => Position::At(2),
        S::AssessmentCompleted | S::Shortlisted | S::InterviewScheduled => Position::At(3),
        S::Interviewed | S::OfferPending | S::OfferSent => Position::At(4),
        S::OfferAccepted | S::Onboarding => Position::At(5),
        S::Hired => Position::Finished,
        S::OfferRejected => Position::StoppedAt(4),
        // The status does not record where a rejection happened.
        S::Rejected => Position::StoppedAt(1),
    }
}

/// Projects an application's status onto the six pipeline stages.
pub fn journey(application: &Application) -> Vec<JourneyStage> {
    let position = position(application.status);
    PipelineStage::ALL
        .into_iter()
        .enumerate()
        .map(|(index, stage)| {
            let state = match position {
                Position::Finished => StageState::Completed,
                Position::At(current) if index < current => StageState::Completed,
                Position::At(current) if index == current => StageState::InProgress,
                Position::At(_) => StageState::Pending,
                Position::StoppedAt(stop) if index < stop => StageState::Completed,
                Position::StoppedAt(_) => StageState::Halted,
            };
            JourneyStage {
                stage,
                label: stage.label(),
                state,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ApplicationId, CandidateId, JobId};
    use chrono::Utc;

    fn states(status: ApplicationStatus) -> Vec<StageState> {
        let now = Utc::now();
        let application = Application {
            id: ApplicationId(1),
            candidate_id: CandidateId(1),
            job_id: JobId(1),
            status,
            match_score: None,
            created_at: now,
            updated_at: now,
        };
        journey(&application)
            .into_iter()
            .map(|stage| stage.state)
            .collect()
    }

    use StageState::{Completed as C, Halted as H, InProgress as I, Pending as P};

    #[test]
    fn fresh_application_is_in_screening() {
        assert_eq!(states(ApplicationStatus::Applied), vec![C, I, P, P, P, P]);
    }

    #[test]
    fn interview_stage_covers_shortlist_through_scheduling() {
        for status in [
            ApplicationStatus::AssessmentCompleted,
            ApplicationStatus::Shortlisted,
            ApplicationStatus::InterviewScheduled,
        ] {
            assert_eq!(states(status), vec![C, C, C, I, P, P], "{status}");
        }
    }

    #[test]
    fn hired_completes_every_stage() {
        assert_eq!(states(ApplicationStatus::Hired), vec![C; 6]);
        assert_eq!(states(ApplicationStatus::Onboarding), vec![C, C, C, C, C, I]);
    }

    #[test]
    fn rejections_halt_remaining_stages() {
        assert_eq!(states(ApplicationStatus::Rejected), vec![C, H, H, H, H, H]);
        assert_eq!(
            states(ApplicationStatus::OfferRejected),
            vec![C, C, C, C, H, H]
        );
    }

    #[test]
    fn stages_serialize_with_labels() {
        let value = serde_json::to_value(JourneyStage {
            stage: PipelineStage::CvScreening,
            label: PipelineStage::CvScreening.label(),
            state: StageState::InProgress,
        })
        .expect("serialize");
        assert_eq!(
            value,
            serde_json::json!({
                "stage": "cv_screening",
                "label": "CV Screening",
                "state": "in_progress"
            })
        );
    }
}
