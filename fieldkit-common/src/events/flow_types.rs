//! Correction flow types shared between the engine and external renderers

use serde::{Deserialize, Serialize};

/// Which correction UI (if any) a finished address check asks for
///
/// Exactly one flow is selected per check attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionFlow {
    /// Address is correct: no popup, resume any blocked submission
    Resume,
    /// Let the user pick one of several predictions
    VariantSelection,
    /// Apply the first prediction silently
    AutoApply,
    /// Correction needed but nothing to offer: edit or force-confirm
    CorrectionWithoutPredictions,
    /// Address unknown: edit or force-confirm
    NotFound,
    /// No rule matched: no popup, submission stays blocked
    NoAction,
}

impl CorrectionFlow {
    /// True if this flow renders a popup
    pub fn needs_popup(self) -> bool {
        matches!(
            self,
            CorrectionFlow::VariantSelection
                | CorrectionFlow::CorrectionWithoutPredictions
                | CorrectionFlow::NotFound
        )
    }
}

/// User answer to a correction popup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum UserDecision {
    /// Adopt prediction at index
    SelectVariant { index: usize },
    /// Go back and edit the input
    Edit,
    /// Keep the input as typed
    ForceConfirm,
}
