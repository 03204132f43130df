//! Response envelope adapters.
//!
//! Two envelope families coexist on the API (`{data, error}` and
//! `{success, data, message}`), and list payloads come as either
//! `{docs, total, page, pages}` or `{items, total, page, limit, totalPages}`.
//! Everything is folded into `Result<Option<T>, String>` and [`Page`] here so
//! nothing downstream branches on response shape.

use super::json::parse_json_with_context;
use crate::cache::Page;
use crate::error::StoreError;
use serde::Deserialize;
use serde::de::DeserializeOwned;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ApiEnvelope<T> {
    Status {
        success: bool,
        #[serde(default = "Option::default")]
        data: Option<T>,
        #[serde(default)]
        message: Option<String>,
    },
    Plain {
        #[serde(default = "Option::default")]
        data: Option<T>,
        #[serde(default)]
        error: Option<String>,
    },
}

impl<T> ApiEnvelope<T> {
    pub fn into_result(self) -> Result<Option<T>, String> {
        match self {
            ApiEnvelope::Status {
                success: true,
                data,
                ..
            } => Ok(data),
            ApiEnvelope::Status {
                success: false,
                message,
                ..
            } => Err(message.unwrap_or_else(|| "request was not successful".to_owned())),
            ApiEnvelope::Plain {
                error: Some(error), ..
            } => Err(error),
            ApiEnvelope::Plain { data, error: None } => Ok(data),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ListPayload<T> {
    #[serde(rename_all = "camelCase")]
    Docs {
        docs: Vec<T>,
        total: usize,
        #[serde(default = "first_page")]
        page: u32,
        #[serde(default)]
        pages: u32,
        #[serde(default)]
        limit: Option<u32>,
    },
    #[serde(rename_all = "camelCase")]
    Items {
        items: Vec<T>,
        total: usize,
        #[serde(default = "first_page")]
        page: u32,
        #[serde(default)]
        limit: Option<u32>,
        #[serde(default)]
        total_pages: u32,
    },
}

fn first_page() -> u32 {
    1
}

impl<T> ListPayload<T> {
    /// `requested_limit` fills in when the payload does not echo one back.
    pub fn into_page(self, requested_limit: u32) -> Page<T> {
        match self {
            ListPayload::Docs {
                docs,
                total,
                page,
                limit,
                ..
            } => Page {
                items: docs,
                total,
                page,
                limit: limit.unwrap_or(requested_limit),
            },
            ListPayload::Items {
                items,
                total,
                page,
                limit,
                ..
            } => Page {
                items,
                total,
                page,
                limit: limit.unwrap_or(requested_limit),
            },
        }
    }
}

/// Decode an envelope and unwrap its payload. Missing data is an error.
pub fn decode_data<T: DeserializeOwned>(body: &str) -> Result<T, StoreError> {
    decode_optional(body)?.ok_or_else(|| StoreError::Api("response contained no data".to_owned()))
}

/// Decode an envelope whose payload may legitimately be absent.
pub fn decode_optional<T: DeserializeOwned>(body: &str) -> Result<Option<T>, StoreError> {
    if body.trim().is_empty() {
        return Ok(None);
    }
    parse_json_with_context::<ApiEnvelope<T>>(body)?
        .into_result()
        .map_err(StoreError::Api)
}

/// Decode a list envelope into a [`Page`].
pub fn decode_page<T: DeserializeOwned>(body: &str, requested_limit: u32) -> Result<Page<T>, StoreError> {
    let payload: ListPayload<T> = decode_data(body)?;
    Ok(payload.into_page(requested_limit))
}
