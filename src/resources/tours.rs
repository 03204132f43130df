//! Tour approval queue. The only resource whose cache survives restarts.

use super::reason_body;
use crate::cache::Identified;
use crate::error::StoreError;
use crate::store::{Invalidate, Resource, ResourceStore};
use crate::transport::ApiRequest;
use chrono::{DateTime, Utc};
use http::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TourStatus {
    Draft,
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tour {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    pub title: String,
    pub status: TourStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,
    /// Fields this client does not interpret, kept so nothing is lost on re-serialization.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Identified for Tour {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Resource for Tour {
    const NAME: &'static str = "tour";
    const PATH: &'static str = "/api/admin/tours";
    const PERSIST_CACHE: bool = true;
}

/// Approval moves a tour between status-filtered queues.
const STATUS_VIEWS: Invalidate = Invalidate::Dimensions(&["status"]);

impl ResourceStore<Tour> {
    pub async fn approve(&self, id: &str) -> Result<Option<Tour>, StoreError> {
        let now = self.settings().clock.now();
        self.act(
            id,
            move |tour: &mut Tour| {
                tour.status = TourStatus::Approved;
                tour.rejection_reason = None;
                tour.reviewed_at = Some(now);
            },
            ApiRequest::new(Method::PATCH, Tour::action_path(id, "approve")).json(json!({})),
            STATUS_VIEWS,
        )
        .await
    }

    pub async fn reject(&self, id: &str, reason: &str) -> Result<Option<Tour>, StoreError> {
        let now = self.settings().clock.now();
        let reason = reason.trim().to_owned();
        let body = reason_body(Some(&reason));
        self.act(
            id,
            move |tour: &mut Tour| {
                tour.status = TourStatus::Rejected;
                tour.rejection_reason = Some(reason.clone()).filter(|r| !r.is_empty());
                tour.reviewed_at = Some(now);
            },
            ApiRequest::new(Method::PATCH, Tour::action_path(id, "reject")).json(body),
            STATUS_VIEWS,
        )
        .await
    }
}
