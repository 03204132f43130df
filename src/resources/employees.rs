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
pub struct Employee {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub role: Option<String>,
    pub status: AccountStatus,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Identified for Employee {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Resource for Employee {
    const NAME: &'static str = "employee";
    const PATH: &'static str = "/api/admin/employees";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEmployee {
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl NewEmployee {
    /// What the list shows until the server assigns an id.
    fn placeholder(&self) -> Employee {
        Employee {
            id: String::new(),
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role.clone(),
            status: AccountStatus::Pending,
            is_verified: false,
            extra: Map::new(),
        }
    }
}

const STATUS_VIEWS: Invalidate = Invalidate::Dimensions(&["status"]);
const VERIFIED_VIEWS: Invalidate = Invalidate::Dimensions(&["isVerified"]);

impl ResourceStore<Employee> {
    pub async fn create_employee(&self, new: NewEmployee) -> Result<Employee, StoreError> {
        let body = serde_json::to_value(&new)
            .map_err(|e| StoreError::Decode(format!("encoding employee: {e}")))?;
        self.create(new.placeholder(), body).await
    }

    pub async fn suspend(&self, id: &str, reason: Option<&str>) -> Result<Option<Employee>, StoreError> {
        self.act(
            id,
            |e: &mut Employee| e.status = AccountStatus::Suspended,
            ApiRequest::new(Method::PATCH, Employee::action_path(id, "suspend")).json(reason_body(reason)),
            STATUS_VIEWS,
        )
        .await
    }

    pub async fn activate(&self, id: &str) -> Result<Option<Employee>, StoreError> {
        self.act(
            id,
            |e: &mut Employee| e.status = AccountStatus::Active,
            ApiRequest::new(Method::PATCH, Employee::action_path(id, "activate")).json(json!({})),
            STATUS_VIEWS,
        )
        .await
    }

    pub async fn verify(&self, id: &str) -> Result<Option<Employee>, StoreError> {
        self.act(
            id,
            |e: &mut Employee| e.is_verified = true,
            ApiRequest::new(Method::PATCH, Employee::action_path(id, "verify")).json(json!({})),
            VERIFIED_VIEWS,
        )
        .await
    }
}
