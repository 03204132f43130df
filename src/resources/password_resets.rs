//! Password-reset requests. The list is polled, so it is fetched with
//! `If-None-Match` and a `304` just restamps what is cached.

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
pub enum ResetStatus {
    Pending,
    Completed,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordResetRequest {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    pub email: String,
    pub status: ResetStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Identified for PasswordResetRequest {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Resource for PasswordResetRequest {
    const NAME: &'static str = "password reset request";
    const PATH: &'static str = "/api/admin/password-reset-requests";
    const CONDITIONAL: bool = true;
}

impl ResourceStore<PasswordResetRequest> {
    pub async fn complete(&self, id: &str) -> Result<Option<PasswordResetRequest>, StoreError> {
        let now = self.settings().clock.now();
        self.act(
            id,
            move |r: &mut PasswordResetRequest| {
                r.status = ResetStatus::Completed;
                r.completed_at = Some(now);
            },
            ApiRequest::new(Method::PATCH, PasswordResetRequest::action_path(id, "complete"))
                .json(json!({})),
            Invalidate::Dimensions(&["status"]),
        )
        .await
    }
}
