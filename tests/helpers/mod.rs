//! Shared fixtures: a scripted in-memory transport and payload builders.

#![allow(dead_code)]

use chrono::DateTime;
use http::Method;
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tourdesk::cache::{CacheSettings, Clock, PaginationParams};
use tourdesk::error::StoreError;
use tourdesk::store::Resource;
use tourdesk::transport::{ApiRequest, ApiResponse, Transport};

struct Scripted {
    reply: Result<ApiResponse, StoreError>,
    gate: Option<Arc<Notify>>,
}

/// Replies are looked up by `"<METHOD> <path?query>"`. A route with several
/// scripted replies hands them out in order and then keeps repeating the last.
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<HashMap<String, VecDeque<Scripted>>>,
    calls: Mutex<Vec<ApiRequest>>,
}

fn route_key(method: &Method, target: &str) -> String {
    format!("{method} {target}")
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on(&self, method: Method, target: &str, reply: Result<ApiResponse, StoreError>) {
        self.push(method, target, reply, None);
    }

    /// Like [`on`](Self::on), but the reply waits until the returned gate is notified.
    pub fn on_gated(
        &self,
        method: Method,
        target: &str,
        reply: Result<ApiResponse, StoreError>,
    ) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.push(method, target, reply, Some(gate.clone()));
        gate
    }

    fn push(
        &self,
        method: Method,
        target: &str,
        reply: Result<ApiResponse, StoreError>,
        gate: Option<Arc<Notify>>,
    ) {
        self.routes
            .lock()
            .unwrap()
            .entry(route_key(&method, target))
            .or_default()
            .push_back(Scripted { reply, gate });
    }

    pub fn calls(&self) -> Vec<ApiRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Yield until at least `n` requests have been issued.
    pub async fn wait_for_calls(&self, n: usize) {
        while self.call_count() < n {
            tokio::task::yield_now().await;
        }
    }

    fn next_reply(&self, request: &ApiRequest) -> (Result<ApiResponse, StoreError>, Option<Arc<Notify>>) {
        let key = route_key(&request.method, &request.target());
        let mut routes = self.routes.lock().unwrap();
        let Some(queue) = routes.get_mut(&key) else {
            return (
                Err(StoreError::Network {
                    status: Some(404),
                    message: format!("no route for {key}"),
                }),
                None,
            );
        };
        if queue.len() > 1 {
            let scripted = queue.pop_front().unwrap();
            (scripted.reply, scripted.gate)
        } else {
            let scripted = queue.front().unwrap();
            (scripted.reply.clone(), scripted.gate.clone())
        }
    }
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    async fn request(&self, request: ApiRequest) -> Result<ApiResponse, StoreError> {
        self.calls.lock().unwrap().push(request.clone());
        let (reply, gate) = self.next_reply(&request);
        if let Some(gate) = gate {
            gate.notified().await;
        }
        reply
    }
}

pub fn ok(body: Value) -> Result<ApiResponse, StoreError> {
    Ok(ApiResponse {
        status: 200,
        etag: None,
        body: body.to_string(),
    })
}

pub fn ok_with_etag(body: Value, etag: &str) -> Result<ApiResponse, StoreError> {
    Ok(ApiResponse {
        status: 200,
        etag: Some(etag.to_owned()),
        body: body.to_string(),
    })
}

pub fn not_modified() -> Result<ApiResponse, StoreError> {
    Ok(ApiResponse {
        status: 304,
        etag: None,
        body: String::new(),
    })
}

pub fn server_error(message: &str) -> Result<ApiResponse, StoreError> {
    Err(StoreError::Network {
        status: Some(500),
        message: message.to_owned(),
    })
}

/// `{data: {docs, total, page, pages}}`
pub fn docs_page(items: Vec<Value>, total: usize, page: u32, limit: u32) -> Value {
    json!({
        "data": {
            "docs": items,
            "total": total,
            "page": page,
            "pages": total.div_ceil(limit as usize),
            "limit": limit,
        }
    })
}

/// `{success, data: {items, total, page, limit, totalPages}}`
pub fn items_page(items: Vec<Value>, total: usize, page: u32, limit: u32) -> Value {
    json!({
        "success": true,
        "data": {
            "items": items,
            "total": total,
            "page": page,
            "limit": limit,
            "totalPages": total.div_ceil(limit as usize),
        }
    })
}

pub fn list_target<R: Resource>(params: &PaginationParams) -> String {
    ApiRequest::get(R::PATH).query(params.to_query_pairs()).target()
}

pub fn detail_target<R: Resource>(id: &str) -> String {
    R::detail_path(id)
}

pub fn action_target<R: Resource>(id: &str, action: &str) -> String {
    R::action_path(id, action)
}

/// Settings on a manual clock, so tests control freshness.
pub fn settings() -> (CacheSettings, Clock) {
    let clock = Clock::manual(DateTime::from_timestamp(1_750_000_000, 0).unwrap());
    let settings = CacheSettings {
        clock: clock.clone(),
        ..CacheSettings::default()
    };
    (settings, clock)
}

pub fn tour(id: &str, status: &str) -> Value {
    json!({ "_id": id, "title": format!("Tour {id}"), "status": status })
}

pub fn tours(range: std::ops::Range<usize>, status: &str) -> Vec<Value> {
    range.map(|i| tour(&format!("t{i}"), status)).collect()
}

pub fn employee(id: &str, status: &str) -> Value {
    json!({ "_id": id, "name": format!("Employee {id}"), "email": format!("{id}@agency.pe"), "status": status })
}

pub fn message(id: &str, conversation: &str, is_read: bool) -> Value {
    json!({ "_id": id, "conversationId": conversation, "body": "¿Incluye traslado?", "isRead": is_read })
}

pub fn report(id: &str, status: &str) -> Value {
    json!({ "_id": id, "reason": "misleading photos", "status": status })
}

pub fn reset_request(id: &str, status: &str) -> Value {
    json!({ "id": id, "email": format!("{id}@mail.com"), "status": status })
}
