//! Concrete resources served by the admin API and their actions.

pub mod companies;
pub mod employees;
pub mod messages;
pub mod password_resets;
pub mod reports;
pub mod tours;
pub mod travelers;

pub use companies::Company;
pub use employees::{Employee, NewEmployee};
pub use messages::ChatMessage;
pub use password_resets::{PasswordResetRequest, ResetStatus};
pub use reports::{Report, ReportAction, ReportStatus};
pub use tours::{Tour, TourStatus};
pub use travelers::Traveler;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Account standing shared by employees, travelers and companies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Pending,
    Active,
    Suspended,
}

/// Request body for actions that take an optional free-text reason.
pub(crate) fn reason_body(reason: Option<&str>) -> Value {
    match reason.map(str::trim).filter(|r| !r.is_empty()) {
        Some(reason) => json!({ "reason": reason }),
        None => json!({}),
    }
}
