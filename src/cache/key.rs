//! Query parameters and the cache keys derived from them.
//!
//! A list query splits into *filter* dimensions (sort, order, search, filters)
//! and *pagination* dimensions (page, limit). The canonical key covers only
//! the former, so every page size of the same filtered view shares one buffer.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Range;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

/// One list request: which page, how big, and which filtered view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationParams {
    pub page: u32,
    pub limit: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<SortOrder>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub filters: BTreeMap<String, Value>,
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self::new(1, 20)
    }
}

impl PaginationParams {
    /// Page and limit are clamped to at least 1.
    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page: page.max(1),
            limit: limit.max(1),
            sort: None,
            order: None,
            search: None,
            filters: BTreeMap::new(),
        }
    }

    pub fn with_filter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.insert(name.into(), value.into());
        self
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn with_sort(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort = Some(field.into());
        self.order = Some(order);
        self
    }

    /// Same view, different page.
    pub fn at_page(&self, page: u32) -> Self {
        Self {
            page: page.max(1),
            ..self.clone()
        }
    }

    /// Absolute offset of the first item on this page.
    pub fn offset(&self) -> usize {
        (self.page.max(1) as usize - 1) * self.limit.max(1) as usize
    }

    /// `[(page-1)*limit, page*limit)`
    pub fn range(&self) -> Range<usize> {
        let start = self.offset();
        start..start + self.limit.max(1) as usize
    }

    pub fn canonical_key(&self) -> CanonicalKey {
        CanonicalKey::from_params(self)
    }

    pub fn page_key(&self) -> PageKey {
        PageKey::new(&self.canonical_key(), self.page, self.limit)
    }

    /// Query string pairs in a fixed order. Array filters are comma-joined;
    /// empty values are omitted the same way the canonical key omits them.
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![
            ("page".to_owned(), self.page.to_string()),
            ("limit".to_owned(), self.limit.to_string()),
        ];
        if let Some(sort) = self.sort.as_deref().filter(|s| !s.is_empty()) {
            pairs.push(("sort".to_owned(), sort.to_owned()));
        }
        if let Some(order) = self.order {
            pairs.push(("order".to_owned(), order.as_str().to_owned()));
        }
        if let Some(search) = normalized_search(self.search.as_deref()) {
            pairs.push(("search".to_owned(), search.to_owned()));
        }
        for (name, value) in &self.filters {
            if let Some(value) = normalize_value(value) {
                pairs.push((name.clone(), query_value(&value)));
            }
        }
        pairs
    }
}

fn normalized_search(search: Option<&str>) -> Option<&str> {
    search.map(str::trim).filter(|s| !s.is_empty())
}

/// Drops `null`, `""` and `[]`; sorts array copies so element order is irrelevant.
fn normalize_value(value: &Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::Array(items) => {
            let mut kept: Vec<Value> = items.iter().filter_map(normalize_value).collect();
            if kept.is_empty() {
                return None;
            }
            kept.sort_by_cached_key(|v| v.to_string());
            Some(Value::Array(kept))
        }
        other => Some(other.clone()),
    }
}

fn query_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(query_value).collect::<Vec<_>>().join(","),
        other => other.to_string(),
    }
}

/// Stable identity of a filtered view, independent of page and limit.
///
/// Equality and hashing go through the serialized form only; the parsed
/// dimensions ride along so invalidation predicates can inspect them.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CanonicalKey {
    repr: Arc<str>,
    dims: Arc<Map<String, Value>>,
}

impl CanonicalKey {
    pub fn from_params(params: &PaginationParams) -> Self {
        let mut dims = Map::new();
        if let Some(sort) = params.sort.as_deref().filter(|s| !s.is_empty()) {
            dims.insert("sort".to_owned(), Value::String(sort.to_owned()));
        }
        if let Some(order) = params.order {
            dims.insert("order".to_owned(), Value::String(order.as_str().to_owned()));
        }
        if let Some(search) = normalized_search(params.search.as_deref()) {
            dims.insert("search".to_owned(), Value::String(search.to_owned()));
        }
        let filters: Map<String, Value> = params
            .filters
            .iter()
            .filter_map(|(k, v)| normalize_value(v).map(|v| (k.clone(), v)))
            .collect();
        if !filters.is_empty() {
            dims.insert("filters".to_owned(), Value::Object(filters));
        }

        // serde_json's Map is key-sorted, so this is deterministic.
        let repr = Value::Object(dims.clone()).to_string();
        Self {
            repr: Arc::from(repr),
            dims: Arc::new(dims),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.repr
    }

    /// Normalized value of one filter, if the view is filtered on it.
    pub fn filter(&self, name: &str) -> Option<&Value> {
        self.dims
            .get("filters")
            .and_then(Value::as_object)
            .and_then(|f| f.get(name))
    }

    pub fn has_filter(&self, name: &str) -> bool {
        self.filter(name).is_some()
    }

    pub fn search(&self) -> Option<&str> {
        self.dims.get("search").and_then(Value::as_str)
    }
}

impl PartialEq for CanonicalKey {
    fn eq(&self, other: &Self) -> bool {
        self.repr == other.repr
    }
}

impl Eq for CanonicalKey {}

impl Hash for CanonicalKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.repr.hash(state);
    }
}

impl PartialOrd for CanonicalKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CanonicalKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.repr.cmp(&other.repr)
    }
}

impl fmt::Debug for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CanonicalKey({})", self.repr)
    }
}

impl fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr)
    }
}

impl TryFrom<String> for CanonicalKey {
    type Error = serde_json::Error;

    fn try_from(repr: String) -> Result<Self, Self::Error> {
        let dims: Map<String, Value> = serde_json::from_str(&repr)?;
        Ok(Self {
            repr: Arc::from(repr),
            dims: Arc::new(dims),
        })
    }
}

impl From<CanonicalKey> for String {
    fn from(key: CanonicalKey) -> Self {
        key.repr.to_string()
    }
}

/// One materialized page view: canonical key, page and limit.
///
/// The canonical part is a complete JSON object and the suffix is two
/// integers, so `|` cannot make two different triples collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageKey(String);

impl PageKey {
    pub fn new(canonical: &CanonicalKey, page: u32, limit: u32) -> Self {
        Self(format!("{}|{}|{}", canonical.as_str(), page, limit))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
