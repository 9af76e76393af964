//! Correction flow decision table
//!
//! First matching rule wins:
//! 1. correct -> resume
//! 2. multiple variants, or needs correction with predictions and neither a
//!    building number problem nor a minor correction on the auto-apply
//!    attempt -> variant selection
//! 3. minor correction on the auto-apply attempt with predictions ->
//!    auto-apply the first prediction
//! 4. needs correction with a building number problem or no predictions ->
//!    correction without predictions
//! 5. not found without predictions -> not found
//!
//! Anything else selects no flow and leaves submission blocked.

use fieldkit_common::config::CheckConfig;
use fieldkit_common::events::CorrectionFlow;

use super::status::{
    self, TopLevelStatus, ADDRESS_MINOR_CORRECTION, BUILDING_NUMBER_IS_MISSING,
    BUILDING_NUMBER_NOT_FOUND,
};

/// Policy knobs of the decision table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckPolicy {
    /// Check attempt on which a minor correction is applied silently
    pub auto_apply_attempt: u32,
}

impl Default for CheckPolicy {
    fn default() -> Self {
        Self {
            auto_apply_attempt: 2,
        }
    }
}

impl From<&CheckConfig> for CheckPolicy {
    fn from(config: &CheckConfig) -> Self {
        Self {
            auto_apply_attempt: config.auto_apply_attempt,
        }
    }
}

/// Pick the correction flow for a normalized status
///
/// `attempt` is the 1-based number of the check that produced `status`.
pub fn select_flow(
    status: &[String],
    prediction_count: usize,
    attempt: u32,
    policy: &CheckPolicy,
) -> CorrectionFlow {
    let top = status::top_level(status);
    let has_predictions = prediction_count > 0;
    let building_number_problem = status::has(status, BUILDING_NUMBER_IS_MISSING)
        || status::has(status, BUILDING_NUMBER_NOT_FOUND);
    let minor_on_auto_apply =
        status::has(status, ADDRESS_MINOR_CORRECTION) && attempt == policy.auto_apply_attempt;

    if top == TopLevelStatus::Correct {
        return CorrectionFlow::Resume;
    }

    if top == TopLevelStatus::MultipleVariants {
        // Nothing to choose from: fall back to the edit/confirm popup
        return if has_predictions {
            CorrectionFlow::VariantSelection
        } else {
            CorrectionFlow::CorrectionWithoutPredictions
        };
    }

    let needs_correction = top == TopLevelStatus::NeedsCorrection;

    if needs_correction && has_predictions && !(building_number_problem || minor_on_auto_apply) {
        return CorrectionFlow::VariantSelection;
    }

    if minor_on_auto_apply && has_predictions {
        return CorrectionFlow::AutoApply;
    }

    if needs_correction && (building_number_problem || !has_predictions) {
        return CorrectionFlow::CorrectionWithoutPredictions;
    }

    if top == TopLevelStatus::NotFound && !has_predictions {
        return CorrectionFlow::NotFound;
    }

    CorrectionFlow::NoAction
}
