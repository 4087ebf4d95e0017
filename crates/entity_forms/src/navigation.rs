//! Navigation context handed to pages and the sink they navigate through.

use std::{
    collections::BTreeMap,
    sync::{Mutex, PoisonError},
};

use url::form_urlencoded;

/// Location a page was opened at: its path plus decoded query parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NavigationContext {
    path: String,
    query: BTreeMap<String, String>,
}

impl NavigationContext {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: BTreeMap::new(),
        }
    }

    /// Parses a relative location such as `/books/create?organization_id=org-42`.
    ///
    /// Fragments are dropped. When a key repeats, the first value wins.
    pub fn parse(location: &str) -> Self {
        let without_fragment = location.split('#').next().unwrap_or_default();
        let (path, raw_query) = match without_fragment.split_once('?') {
            Some((path, query)) => (path, query),
            None => (without_fragment, ""),
        };

        let mut query = BTreeMap::new();
        for (key, value) in form_urlencoded::parse(raw_query.as_bytes()) {
            query
                .entry(key.into_owned())
                .or_insert_with(|| value.into_owned());
        }

        Self {
            path: path.to_string(),
            query,
        }
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }
}

pub trait Navigator: Send + Sync {
    fn navigate(&self, route: &str);
}

/// Keeps every requested route in order.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    routes: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn routes(&self) -> Vec<String> {
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last(&self) -> Option<String> {
        self.routes().pop()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, route: &str) {
        tracing::debug!(route, "navigation requested");
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(route.to_string());
    }
}
