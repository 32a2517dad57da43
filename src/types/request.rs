//! Request descriptors: immutable fetch descriptions with an opaque, typed
//! context that the transport must echo back verbatim.

use std::collections::VecDeque;

use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

use crate::error::{Error, Result};
use crate::types::task::TaskId;

/// Routing context attached to every request and echoed back with its
/// response.
///
/// The transport must treat this as opaque: store it, return it unchanged.
/// `rule_id` and `task_id` are the minimum contract; `extra` carries
/// handler-private resumption state (a container index, a pagination token).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestContext {
    /// Registry id of the rule that must handle the response.
    pub rule_id: String,
    /// Owning task.
    pub task_id: TaskId,
    /// Handler-private fields.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl RequestContext {
    /// Create a context. The rule id must be non-empty.
    pub fn new(rule_id: impl Into<String>, task_id: impl Into<TaskId>) -> Result<Self> {
        let rule_id = rule_id.into();
        if rule_id.is_empty() {
            return Err(Error::validation("rule_id must not be empty"));
        }
        Ok(Self {
            rule_id,
            task_id: task_id.into(),
            extra: Map::new(),
        })
    }

    /// Attach a handler-private field.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Read a handler-private field back as a typed value.
    pub fn extra<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.extra
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// Body to send with a request.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RequestPayload {
    /// No body.
    #[default]
    None,
    /// URL-encoded form fields.
    Form(Vec<(String, String)>),
    /// JSON body.
    Json(Value),
}

/// One pending fetch. Immutable once constructed; equality is structural.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    /// Target URL.
    pub url: Url,
    /// HTTP method.
    pub method: Method,
    /// Request headers.
    pub headers: HeaderMap,
    /// Request body.
    pub payload: RequestPayload,
    /// Opaque routing context, echoed back with the response.
    pub context: RequestContext,
}

impl RequestDescriptor {
    /// GET request.
    pub fn get(url: Url, context: RequestContext) -> Self {
        Self {
            url,
            method: Method::GET,
            headers: HeaderMap::new(),
            payload: RequestPayload::None,
            context,
        }
    }

    /// POST request with URL-encoded form fields.
    pub fn post_form(url: Url, form: Vec<(String, String)>, context: RequestContext) -> Self {
        Self {
            url,
            method: Method::POST,
            headers: HeaderMap::new(),
            payload: RequestPayload::Form(form),
            context,
        }
    }

    /// POST request with a JSON body.
    pub fn post_json(url: Url, body: Value, context: RequestContext) -> Self {
        Self {
            url,
            method: Method::POST,
            headers: HeaderMap::new(),
            payload: RequestPayload::Json(body),
            context,
        }
    }

    /// Add a header.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Derive a new descriptor with extra headers and context fields merged
    /// in. The original is untouched.
    #[must_use]
    pub fn copy_and_extend(&self, headers: HeaderMap, extra: Map<String, Value>) -> Self {
        let mut derived = self.clone();
        derived.headers.extend(headers);
        derived.context.extra.extend(extra);
        derived
    }
}

/// FIFO queue of pending requests with a high-priority lane.
#[derive(Debug, Default)]
pub struct RequestQueue {
    queue: VecDeque<RequestDescriptor>,
}

impl RequestQueue {
    /// Empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether anything is queued.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Number of queued requests.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Queue a request behind everything already waiting.
    pub fn push(&mut self, request: RequestDescriptor) {
        self.queue.push_back(request);
    }

    /// Queue a request ahead of everything already waiting.
    pub fn push_priority(&mut self, request: RequestDescriptor) {
        self.queue.push_front(request);
    }

    /// Take the next request.
    pub fn pop(&mut self) -> Option<RequestDescriptor> {
        self.queue.pop_front()
    }
}
