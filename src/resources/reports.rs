//! User reports and their review workflow.
//!
//! ```text
//! OPEN ──start_review──▶ IN_REVIEW
//!  │                       │
//!  ├──resolve / reject─────┴──▶ RESOLVED | REJECTED ──reopen──▶ OPEN
//! ```
//!
//! Resolution and rejection metadata are mutually exclusive: entering one
//! terminal state clears the other's fields, and reopening clears both.

use crate::cache::Identified;
use crate::error::StoreError;
use crate::store::{FetchOptions, Invalidate, Resource, ResourceStore};
use crate::transport::ApiRequest;
use chrono::{DateTime, Utc};
use http::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportStatus {
    Open,
    InReview,
    Resolved,
    Rejected,
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReportStatus::Open => "OPEN",
            ReportStatus::InReview => "IN_REVIEW",
            ReportStatus::Resolved => "RESOLVED",
            ReportStatus::Rejected => "REJECTED",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    pub reason: String,
    #[serde(default)]
    pub target_type: Option<String>,
    #[serde(default)]
    pub target_id: Option<String>,
    pub status: ReportStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_notes: Option<String>,
    #[serde(default)]
    pub reopened_count: u32,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Identified for Report {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Resource for Report {
    const NAME: &'static str = "report";
    const PATH: &'static str = "/api/admin/reports";
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportAction {
    StartReview,
    Resolve { notes: Option<String> },
    Reject { notes: Option<String> },
    Reopen,
}

impl ReportAction {
    /// Verb used in error messages and as the endpoint suffix.
    pub fn name(&self) -> &'static str {
        match self {
            ReportAction::StartReview => "review",
            ReportAction::Resolve { .. } => "resolve",
            ReportAction::Reject { .. } => "reject",
            ReportAction::Reopen => "reopen",
        }
    }

    fn body(&self) -> Value {
        match self {
            ReportAction::Resolve { notes: Some(notes) } | ReportAction::Reject { notes: Some(notes) } => {
                json!({ "notes": notes })
            }
            _ => json!({}),
        }
    }

    pub fn allowed_from(&self, status: ReportStatus) -> bool {
        use ReportStatus::*;
        match self {
            ReportAction::StartReview => status == Open,
            ReportAction::Resolve { .. } | ReportAction::Reject { .. } => matches!(status, Open | InReview),
            ReportAction::Reopen => matches!(status, Resolved | Rejected),
        }
    }
}

fn clean(notes: Option<String>) -> Option<String> {
    notes
        .map(|n| n.trim().to_owned())
        .filter(|n| !n.is_empty())
}

impl Report {
    /// Apply one workflow step locally.
    pub fn apply(&mut self, action: &ReportAction, now: DateTime<Utc>) -> Result<(), StoreError> {
        if !action.allowed_from(self.status) {
            return Err(StoreError::InvalidTransition {
                from: self.status.to_string(),
                action: action.name(),
            });
        }
        match action {
            ReportAction::StartReview => {
                self.status = ReportStatus::InReview;
                self.reviewed_at = Some(now);
            }
            ReportAction::Resolve { notes } => {
                self.status = ReportStatus::Resolved;
                self.resolved_at = Some(now);
                self.resolution_notes = clean(notes.clone());
                self.rejected_at = None;
                self.rejection_notes = None;
            }
            ReportAction::Reject { notes } => {
                self.status = ReportStatus::Rejected;
                self.rejected_at = Some(now);
                self.rejection_notes = clean(notes.clone());
                self.resolved_at = None;
                self.resolution_notes = None;
            }
            ReportAction::Reopen => {
                self.status = ReportStatus::Open;
                self.reopened_count += 1;
                self.resolved_at = None;
                self.resolution_notes = None;
                self.rejected_at = None;
                self.rejection_notes = None;
            }
        }
        Ok(())
    }
}

impl ResourceStore<Report> {
    /// Validate against the current copy, then run the step optimistically.
    pub async fn transition(&self, id: &str, action: ReportAction) -> Result<Option<Report>, StoreError> {
        let current = match self.cached_detail(id).await {
            Some(report) => report,
            None => self.fetch_detail(id, FetchOptions::default()).await?,
        };
        if !action.allowed_from(current.status) {
            return Err(StoreError::InvalidTransition {
                from: current.status.to_string(),
                action: action.name(),
            });
        }

        let now = self.settings().clock.now();
        let request = ApiRequest::new(Method::PATCH, Report::action_path(id, action.name()))
            .json(action.body());
        self.act(
            id,
            move |report: &mut Report| {
                // Copies that already moved on are left alone.
                if report.apply(&action, now).is_err() {
                    tracing::trace!(id = %report.id, "report copy not in a state for this step");
                }
            },
            request,
            Invalidate::Dimensions(&["status"]),
        )
        .await
    }

    pub async fn start_review(&self, id: &str) -> Result<Option<Report>, StoreError> {
        self.transition(id, ReportAction::StartReview).await
    }

    pub async fn resolve(&self, id: &str, notes: impl Into<String>) -> Result<Option<Report>, StoreError> {
        self.transition(id, ReportAction::Resolve { notes: Some(notes.into()) })
            .await
    }

    pub async fn reject(&self, id: &str, notes: impl Into<String>) -> Result<Option<Report>, StoreError> {
        self.transition(id, ReportAction::Reject { notes: Some(notes.into()) })
            .await
    }

    pub async fn reopen(&self, id: &str) -> Result<Option<Report>, StoreError> {
        self.transition(id, ReportAction::Reopen).await
    }
}
