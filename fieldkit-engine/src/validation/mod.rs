//! Address validation state machine
//!
//! - [`status`]: token vocabulary, normalization, per-field derivation
//! - [`decision`]: which correction flow a status asks for
//! - [`popup`]: page-wide popup exclusivity
//! - [`checker`]: the per-record check routine tying it together

pub mod checker;
pub mod decision;
pub mod popup;
pub mod presenter;
pub mod status;

pub use checker::{AddressChecker, CheckOutcome};
pub use decision::{select_flow, CheckPolicy};
pub use popup::{PopupGate, PopupGuard};
pub use presenter::{CorrectionPresenter, PopupRequest};
pub use status::TopLevelStatus;
