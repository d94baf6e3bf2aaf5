//! Intercept queue and its display filter

use proxy_common::InterceptedRequest;
use serde::{Deserialize, Serialize};

/// Method half of the display filter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum MethodFilter {
    #[default]
    All,
    Exact(String),
}

impl MethodFilter {
    /// `None`, empty and `all` (any case) mean no method restriction
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            None | Some("") => Self::All,
            Some(value) if value.eq_ignore_ascii_case("all") => Self::All,
            Some(value) => Self::Exact(value.to_string()),
        }
    }

    fn matches(&self, method: &str) -> bool {
        match self {
            Self::All => true,
            Self::Exact(expected) => expected == method,
        }
    }
}

/// Non-mutating view over the queue
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueFilter {
    pub query: String,
    pub method: MethodFilter,
}

impl QueueFilter {
    pub fn new(query: impl Into<String>, method: MethodFilter) -> Self {
        Self {
            query: query.into(),
            method,
        }
    }

    /// Case-insensitive substring search over method, url, host, path, body
    /// and every header key and value
    pub fn matches(&self, request: &InterceptedRequest) -> bool {
        if !self.method.matches(&request.method) {
            return false;
        }

        let query = self.query.trim().to_lowercase();
        if query.is_empty() {
            return true;
        }
        let hit = |text: &str| text.to_lowercase().contains(&query);

        hit(&request.method)
            || hit(&request.url)
            || hit(&request.host)
            || hit(&request.path)
            || request.body.as_deref().is_some_and(hit)
            || request.headers.iter().any(|(key, value)| hit(key) || hit(value))
    }
}

/// Pending captured requests in arrival order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InterceptQueue {
    entries: Vec<InterceptedRequest>,
}

impl InterceptQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append unless an entry with the same id is already queued
    pub fn push(&mut self, request: InterceptedRequest) -> bool {
        if self.contains(&request.id) {
            return false;
        }
        self.entries.push(request);
        true
    }

    pub fn remove(&mut self, id: &str) -> Option<InterceptedRequest> {
        let position = self.entries.iter().position(|entry| entry.id == id)?;
        Some(self.entries.remove(position))
    }

    pub fn get(&self, id: &str) -> Option<&InterceptedRequest> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &InterceptedRequest> {
        self.entries.iter()
    }

    /// Entries passing `filter`, in queue order
    pub fn view<'a>(&'a self, filter: &'a QueueFilter) -> impl Iterator<Item = &'a InterceptedRequest> + 'a {
        self.entries.iter().filter(move |entry| filter.matches(entry))
    }
}
