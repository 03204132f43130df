//! Operator companies. Screens mostly open one company at a time, so the
//! detail cache does most of the work here.

use super::{AccountStatus, reason_body};
use crate::cache::Identified;
use crate::error::StoreError;
use crate::store::{Invalidate, Resource, ResourceStore};
use crate::transport::ApiRequest;
use http::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    pub name: String,
    pub status: AccountStatus,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default)]
    pub tour_count: Option<u32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Identified for Company {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Resource for Company {
    const NAME: &'static str = "company";
    const PATH: &'static str = "/api/admin/companies";
}

impl ResourceStore<Company> {
    pub async fn verify(&self, id: &str) -> Result<Option<Company>, StoreError> {
        self.act(
            id,
            |c: &mut Company| {
                c.is_verified = true;
                if c.status == AccountStatus::Pending {
                    c.status = AccountStatus::Active;
                }
            },
            ApiRequest::new(Method::PATCH, Company::action_path(id, "verify")).json(json!({})),
            Invalidate::Dimensions(&["isVerified", "status"]),
        )
        .await
    }

    pub async fn suspend(&self, id: &str, reason: Option<&str>) -> Result<Option<Company>, StoreError> {
        self.act(
            id,
            |c: &mut Company| c.status = AccountStatus::Suspended,
            ApiRequest::new(Method::PATCH, Company::action_path(id, "suspend")).json(reason_body(reason)),
            Invalidate::Dimensions(&["status"]),
        )
        .await
    }
}
