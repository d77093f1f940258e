//! Transport layer abstraction for fetching remote data.

use crate::error::{SyncError, SyncResult};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;

/// A request against the remote API.
///
/// `path` may contain the `{organizationId}` placeholder; the transport
/// substitutes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    /// Endpoint path, e.g. `/v1/{organizationId}/invoices`.
    pub path: String,
    /// Query string parameters, in insertion order.
    pub params: Vec<(String, String)>,
}

impl Query {
    /// Creates a query without parameters.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            params: Vec::new(),
        }
    }

    /// Adds or replaces a parameter.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Sets a parameter in place, replacing an existing value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.params.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.params.push((key, value)),
        }
    }

    /// Returns a parameter value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// A transport fetches JSON documents and binary attachments.
///
/// Implementations own authentication and the single re-authentication
/// retry; the engine treats any returned error as a failed fetch.
pub trait Transport {
    /// Fetches a JSON document.
    fn fetch(&self, query: &Query) -> SyncResult<Value>;

    /// Fetches a binary attachment.
    fn fetch_blob(&self, query: &Query) -> SyncResult<Vec<u8>>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn fetch(&self, query: &Query) -> SyncResult<Value> {
        (**self).fetch(query)
    }

    fn fetch_blob(&self, query: &Query) -> SyncResult<Vec<u8>> {
        (**self).fetch_blob(query)
    }
}

type Responder = Box<dyn Fn(&Query) -> Option<SyncResult<Value>> + Send>;

/// A scripted transport for testing.
///
/// Responses are matched against queries by path and parameter subset.
/// Queued responses for a route are consumed in order; the last one stays
/// in place. Every query is recorded.
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<Vec<Route>>,
    responders: Mutex<Vec<Responder>>,
    blobs: Mutex<Vec<(String, SyncResult<Vec<u8>>)>>,
    requests: Mutex<Vec<Query>>,
}

struct Route {
    path: String,
    params: Vec<(String, String)>,
    responses: VecDeque<SyncResult<Value>>,
}

impl MockTransport {
    /// Creates a mock transport with no routes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers queries to `path` with `body`.
    pub fn respond(&self, path: &str, body: Value) {
        self.respond_when(path, &[], Ok(body));
    }

    /// Answers queries to `path` whose parameters include `params`.
    ///
    /// Calling this repeatedly for the same route queues responses.
    pub fn respond_when(&self, path: &str, params: &[(&str, &str)], response: SyncResult<Value>) {
        let params: Vec<(String, String)> = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let mut routes = self.routes.lock();
        match routes
            .iter_mut()
            .find(|r| r.path == path && r.params == params)
        {
            Some(route) => route.responses.push_back(response),
            None => routes.push(Route {
                path: path.to_string(),
                params,
                responses: VecDeque::from([response]),
            }),
        }
    }

    /// Answers queries through a closure; consulted before static routes.
    pub fn respond_with<F>(&self, responder: F)
    where
        F: Fn(&Query) -> Option<SyncResult<Value>> + Send + 'static,
    {
        self.responders.lock().push(Box::new(responder));
    }

    /// Answers blob queries to `path`.
    pub fn respond_blob(&self, path: &str, response: SyncResult<Vec<u8>>) {
        self.blobs.lock().push((path.to_string(), response));
    }

    /// Returns every query seen so far.
    pub fn requests(&self) -> Vec<Query> {
        self.requests.lock().clone()
    }

    /// Returns the queries seen for `path`.
    pub fn requests_to(&self, path: &str) -> Vec<Query> {
        self.requests
            .lock()
            .iter()
            .filter(|q| q.path == path)
            .cloned()
            .collect()
    }
}

impl Transport for MockTransport {
    fn fetch(&self, query: &Query) -> SyncResult<Value> {
        self.requests.lock().push(query.clone());

        for responder in self.responders.lock().iter() {
            if let Some(response) = responder(query) {
                return response;
            }
        }

        let mut routes = self.routes.lock();
        // Most specific route first.
        let route = routes
            .iter_mut()
            .filter(|r| {
                r.path == query.path
                    && r.params.iter().all(|(k, v)| query.get(k) == Some(v.as_str()))
            })
            .max_by_key(|r| r.params.len())
            .ok_or_else(|| SyncError::status(404, format!("no mock route for {}", query.path)))?;

        if route.responses.len() > 1 {
            route
                .responses
                .pop_front()
                .unwrap_or_else(|| Err(SyncError::network("exhausted")))
        } else {
            match route.responses.front() {
                Some(Ok(body)) => Ok(body.clone()),
                Some(Err(e)) => Err(clone_error(e)),
                None => Err(SyncError::network("exhausted")),
            }
        }
    }

    fn fetch_blob(&self, query: &Query) -> SyncResult<Vec<u8>> {
        self.requests.lock().push(query.clone());
        self.blobs
            .lock()
            .iter()
            .find(|(path, _)| *path == query.path)
            .map(|(_, response)| match response {
                Ok(bytes) => Ok(bytes.clone()),
                Err(e) => Err(clone_error(e)),
            })
            .unwrap_or_else(|| Err(SyncError::status(404, "no mock blob")))
    }
}

fn clone_error(err: &SyncError) -> SyncError {
    match err {
        SyncError::Transport {
            message,
            status,
            retryable,
        } => SyncError::Transport {
            message: message.clone(),
            status: *status,
            retryable: *retryable,
        },
        SyncError::Decode(msg) => SyncError::Decode(msg.clone()),
        other => SyncError::network(other.to_string()),
    }
}
