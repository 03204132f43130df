//! Support chat messages.

use crate::cache::{Identified, Page, PaginationParams, SortOrder};
use crate::error::StoreError;
use crate::store::{FetchOptions, Invalidate, Resource, ResourceStore};
use crate::transport::ApiRequest;
use chrono::{DateTime, Utc};
use http::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    pub conversation_id: String,
    #[serde(default)]
    pub sender_id: Option<String>,
    pub body: String,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Identified for ChatMessage {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Resource for ChatMessage {
    const NAME: &'static str = "message";
    const PATH: &'static str = "/api/admin/messages";
}

impl ResourceStore<ChatMessage> {
    /// One page of a conversation, newest first.
    pub async fn conversation(
        &self,
        conversation_id: &str,
        page: u32,
        limit: u32,
    ) -> Result<Page<ChatMessage>, StoreError> {
        let params = PaginationParams::new(page, limit)
            .with_filter("conversationId", conversation_id)
            .with_sort("createdAt", SortOrder::Desc);
        self.fetch_list(params, FetchOptions::default()).await
    }

    /// Read state is a pure field patch; no view changes membership.
    pub async fn mark_read(&self, id: &str) -> Result<Option<ChatMessage>, StoreError> {
        self.act(
            id,
            |m: &mut ChatMessage| m.is_read = true,
            ApiRequest::new(Method::PATCH, ChatMessage::action_path(id, "read")).json(json!({})),
            Invalidate::Nothing,
        )
        .await
    }

    pub async fn send(&self, conversation_id: &str, body: &str) -> Result<ChatMessage, StoreError> {
        let placeholder = ChatMessage {
            id: String::new(),
            conversation_id: conversation_id.to_owned(),
            sender_id: None,
            body: body.to_owned(),
            is_read: true,
            created_at: Some(self.settings().clock.now()),
            extra: Map::new(),
        };
        self.create(
            placeholder,
            json!({ "conversationId": conversation_id, "body": body }),
        )
        .await
    }
}
