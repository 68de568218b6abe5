//! Stage projection: turning raw progress counters into a displayable list
//! of named generation stages.
//!
//! The projection is a pure function of the *latest* [`Progress`] value;
//! it never depends on a previous projection, so it cannot accumulate
//! inconsistent partial state.

use serde::{Deserialize, Serialize};

use crate::job::Progress;

// ---------------------------------------------------------------------------
// Stage names
// ---------------------------------------------------------------------------

/// Stage 1: the generator reads the preference profile.
pub const STAGE_ANALYZE: &str = "Analyzing travel preferences";
/// Stage 2: destination research.
pub const STAGE_RESEARCH: &str = "Researching the destination";
/// Stage 3: transport and lodging lookups.
pub const STAGE_LOGISTICS: &str = "Scouting flights and stays";
/// Stage 4: day-by-day composition.
pub const STAGE_COMPOSE: &str = "Composing the day-by-day plan";
/// Stage 5: final pass.
pub const STAGE_FINALIZE: &str = "Finalizing the itinerary";

/// The fixed, ordered stage names of the generation pipeline.
pub const GENERATION_STAGES: &[&str] = &[
    STAGE_ANALYZE,
    STAGE_RESEARCH,
    STAGE_LOGISTICS,
    STAGE_COMPOSE,
    STAGE_FINALIZE,
];

/// Number of named stages in the pipeline.
pub const TOTAL_STAGES: u32 = GENERATION_STAGES.len() as u32;

/// Display name for a 0-based stage index.
///
/// Falls back to a generic label when the worker reports more stages than
/// the pipeline names.
fn stage_name(index: usize) -> String {
    GENERATION_STAGES
        .get(index)
        .map(|s| (*s).to_string())
        .unwrap_or_else(|| format!("Stage {}", index + 1))
}

// ---------------------------------------------------------------------------
// Stage model
// ---------------------------------------------------------------------------

/// Display status of a single stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    Pending,
    Active,
    Completed,
    Error,
}

/// One named stage with its display status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub name: String,
    pub state: StageState,
}

/// Read-only projection of a job's progress for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageModel {
    pub stages: Vec<Stage>,
    /// 1-based index of the stage currently marked [`StageState::Active`]
    /// (or [`StageState::Error`] for a failed projection).
    pub active_stage: u32,
    pub total_stages: u32,
    pub message: String,
    /// `true` for cosmetic frames fabricated while recovery-polling.
    /// Synthetic frames carry no authority and must never be treated as
    /// worker-written progress.
    pub synthetic: bool,
}

impl StageModel {
    /// Project raw progress into the stage list.
    ///
    /// Every stage strictly before the current one is `Completed`, the
    /// current one is `Active`, later stages are `Pending`. Out-of-range
    /// counters are clamped rather than rejected: the worker owns the
    /// record and the client only displays it.
    pub fn project(progress: &Progress) -> Self {
        Self::build(progress, StageState::Active, false)
    }

    /// Projection for a job that reached `Failed`: the stage that was
    /// running is marked `Error`, everything before it stays `Completed`.
    pub fn project_failed(progress: &Progress) -> Self {
        Self::build(progress, StageState::Error, false)
    }

    /// A cosmetic frame for the recovery waiting period.
    pub fn synthetic(stage: u32, message: impl Into<String>) -> Self {
        let progress = Progress::new(stage, TOTAL_STAGES, message);
        Self::build(&progress, StageState::Active, true)
    }

    fn build(progress: &Progress, current_state: StageState, synthetic: bool) -> Self {
        let active = progress.stage.max(1);
        let total = progress.total_stages.max(active);

        let stages = (1..=total)
            .map(|n| Stage {
                name: stage_name((n - 1) as usize),
                state: if n < active {
                    StageState::Completed
                } else if n == active {
                    current_state
                } else {
                    StageState::Pending
                },
            })
            .collect();

        Self {
            stages,
            active_stage: active,
            total_stages: total,
            message: progress.message.clone(),
            synthetic,
        }
    }
}

// ---------------------------------------------------------------------------
// Ordering guard
// ---------------------------------------------------------------------------

/// Whether an incoming stage number may be surfaced after `seen`.
///
/// Store update delivery can be out of order at the transport layer; a
/// lower stage arriving after a higher one must be discarded so the UI
/// only ever observes non-decreasing stages.
pub fn stage_advances(seen: Option<u32>, incoming: u32) -> bool {
    match seen {
        Some(s) => incoming >= s,
        None => true,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -- Projection --

    #[test]
    fn first_stage_active_rest_pending() {
        let model = StageModel::project(&Progress::new(1, 5, "starting"));
        assert_eq!(model.stages.len(), 5);
        assert_eq!(model.stages[0].state, StageState::Active);
        assert!(model.stages[1..]
            .iter()
            .all(|s| s.state == StageState::Pending));
    }

    #[test]
    fn middle_stage_splits_completed_and_pending() {
        let model = StageModel::project(&Progress::new(3, 5, "logistics"));
        assert_eq!(model.stages[0].state, StageState::Completed);
        assert_eq!(model.stages[1].state, StageState::Completed);
        assert_eq!(model.stages[2].state, StageState::Active);
        assert_eq!(model.stages[3].state, StageState::Pending);
        assert_eq!(model.stages[4].state, StageState::Pending);
        assert_eq!(model.active_stage, 3);
    }

    #[test]
    fn last_stage_leaves_no_pending() {
        let model = StageModel::project(&Progress::new(5, 5, "finishing"));
        assert!(model.stages[..4]
            .iter()
            .all(|s| s.state == StageState::Completed));
        assert_eq!(model.stages[4].state, StageState::Active);
    }

    #[test]
    fn projection_is_pure_and_total() {
        let progress = Progress::new(2, 5, "same input");
        assert_eq!(
            StageModel::project(&progress),
            StageModel::project(&progress)
        );
    }

    #[test]
    fn zero_stage_clamped_to_one() {
        let model = StageModel::project(&Progress::new(0, 5, ""));
        assert_eq!(model.active_stage, 1);
        assert_eq!(model.stages.len(), 5);
    }

    #[test]
    fn total_clamped_up_to_stage() {
        // Worker wrote stage 4 of 2: trust the stage, grow the list.
        let model = StageModel::project(&Progress::new(4, 2, ""));
        assert_eq!(model.total_stages, 4);
        assert_eq!(model.stages.len(), 4);
    }

    #[test]
    fn extra_stages_get_generic_names() {
        let model = StageModel::project(&Progress::new(1, 7, ""));
        assert_eq!(model.stages[4].name, STAGE_FINALIZE);
        assert_eq!(model.stages[5].name, "Stage 6");
        assert_eq!(model.stages[6].name, "Stage 7");
    }

    #[test]
    fn named_stages_in_pipeline_order() {
        let model = StageModel::project(&Progress::new(1, 5, ""));
        let names: Vec<&str> = model.stages.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, GENERATION_STAGES);
    }

    // -- Failed projection --

    #[test]
    fn failed_projection_marks_active_stage_error() {
        let model = StageModel::project_failed(&Progress::new(3, 5, "boom"));
        assert_eq!(model.stages[2].state, StageState::Error);
        assert_eq!(model.stages[1].state, StageState::Completed);
        assert_eq!(model.stages[3].state, StageState::Pending);
    }

    // -- Synthetic frames --

    #[test]
    fn synthetic_frames_are_flagged() {
        let model = StageModel::synthetic(2, "still waiting");
        assert!(model.synthetic);
        assert_eq!(model.active_stage, 2);
    }

    #[test]
    fn authoritative_frames_are_not_flagged() {
        assert!(!StageModel::project(&Progress::new(1, 5, "")).synthetic);
    }

    // -- Ordering guard --

    #[test]
    fn first_update_always_advances() {
        assert!(stage_advances(None, 1));
        assert!(stage_advances(None, 4));
    }

    #[test]
    fn equal_stage_advances() {
        // Re-writes of the same stage (message updates) are surfaced.
        assert!(stage_advances(Some(2), 2));
    }

    #[test]
    fn lower_stage_after_higher_is_discarded() {
        assert!(!stage_advances(Some(2), 1));
    }

    #[test]
    fn out_of_order_sequence_projects_non_decreasing() {
        // Delivery order 1, 2, 2, 1, 3: the late 1 must be ignored.
        let mut seen = None;
        let mut surfaced = Vec::new();
        for incoming in [1u32, 2, 2, 1, 3] {
            if stage_advances(seen, incoming) {
                seen = Some(incoming);
                surfaced.push(incoming);
            }
        }
        assert_eq!(surfaced, vec![1, 2, 2, 3]);
        assert!(surfaced.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(seen, Some(3));
    }
}
