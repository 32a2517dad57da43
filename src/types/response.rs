//! The transport's answer to one request descriptor.

use http::StatusCode;
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};
use crate::types::request::RequestContext;
use crate::types::task::TaskId;

/// A completed fetch, carrying the context of the descriptor that caused it.
///
/// The core never interprets `body`; only the rule named by
/// `context.rule_id` does.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse {
    /// HTTP status the source answered with.
    pub status: StatusCode,
    /// Raw response body.
    pub body: String,
    /// The request's context, echoed verbatim.
    pub context: RequestContext,
}

impl FetchResponse {
    /// Create a response.
    pub fn new(status: StatusCode, body: impl Into<String>, context: RequestContext) -> Self {
        Self {
            status,
            body: body.into(),
            context,
        }
    }

    /// 200 OK response.
    pub fn ok(body: impl Into<String>, context: RequestContext) -> Self {
        Self::new(StatusCode::OK, body, context)
    }

    /// Owning task, from the echoed context.
    pub fn task_id(&self) -> &TaskId {
        &self.context.task_id
    }

    /// Handling rule, from the echoed context.
    pub fn rule_id(&self) -> &str {
        &self.context.rule_id
    }

    /// Parse the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns a format fault when the body is not the expected shape, so a
    /// rule can simply `?` this into the error taxonomy.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body).map_err(|e| Error::format(format!("bad json body: {e}")))
    }
}
