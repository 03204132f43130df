use super::{AccountStatus, reason_body};
use crate::cache::Identified;
use crate::error::StoreError;
use crate::store::{Invalidate, Resource, ResourceStore};
use crate::transport::ApiRequest;
use chrono::{DateTime, Utc};
use http::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Traveler {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    pub name: String,
    pub email: String,
    pub status: AccountStatus,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspension_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspended_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Identified for Traveler {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Resource for Traveler {
    const NAME: &'static str = "traveler";
    const PATH: &'static str = "/api/admin/travelers";
}

impl ResourceStore<Traveler> {
    pub async fn verify(&self, id: &str) -> Result<Option<Traveler>, StoreError> {
        self.act(
            id,
            |t: &mut Traveler| t.is_verified = true,
            ApiRequest::new(Method::PATCH, Traveler::action_path(id, "verify")).json(json!({})),
            Invalidate::Dimensions(&["isVerified"]),
        )
        .await
    }

    pub async fn suspend(&self, id: &str, reason: Option<&str>) -> Result<Option<Traveler>, StoreError> {
        let now = self.settings().clock.now();
        let saved_reason = reason.map(str::trim).filter(|r| !r.is_empty()).map(str::to_owned);
        self.act(
            id,
            move |t: &mut Traveler| {
                t.status = AccountStatus::Suspended;
                t.suspension_reason = saved_reason.clone();
                t.suspended_at = Some(now);
            },
            ApiRequest::new(Method::PATCH, Traveler::action_path(id, "suspend")).json(reason_body(reason)),
            Invalidate::Dimensions(&["status"]),
        )
        .await
    }

    pub async fn reinstate(&self, id: &str) -> Result<Option<Traveler>, StoreError> {
        self.act(
            id,
            |t: &mut Traveler| {
                t.status = AccountStatus::Active;
                t.suspension_reason = None;
                t.suspended_at = None;
            },
            ApiRequest::new(Method::PATCH, Traveler::action_path(id, "reinstate")).json(json!({})),
            Invalidate::Dimensions(&["status"]),
        )
        .await
    }
}
