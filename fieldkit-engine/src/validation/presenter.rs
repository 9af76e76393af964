//! Correction popup rendering seam

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use fieldkit_common::events::{CorrectionFlow, UserDecision};

use crate::remote::{Params, Prediction};

/// Everything a renderer needs to show one correction popup
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PopupRequest {
    pub record_id: Uuid,
    pub flow: CorrectionFlow,
    /// Normalized status of the check that asked for the popup
    pub status: Vec<String>,
    /// Candidates for [`CorrectionFlow::VariantSelection`]
    pub predictions: Vec<Prediction>,
    /// The address as it was checked
    pub input: Params,
}

/// Renders correction popups and reports the user's answer
///
/// The engine never has more than one `present` call outstanding per page.
#[async_trait]
pub trait CorrectionPresenter: Send + Sync {
    async fn present(&self, request: PopupRequest) -> UserDecision;
}
