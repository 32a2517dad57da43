//! The fetch-execution boundary.
//!
//! The transport owns everything about actually talking to sources: retries,
//! proxy rotation, rate limiting, CAPTCHA handling. The engine only requires
//! two things of it, and both are load-bearing:
//!
//! 1. Every accepted descriptor produces exactly one outcome - a response or
//!    a terminal error. A swallowed descriptor leaves its task pending
//!    forever.
//! 2. The descriptor's context comes back untouched. The context is how a
//!    response finds its handler; a transport that drops or rewrites context
//!    fields breaks dispatch in ways no later check can repair.

use std::collections::VecDeque;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::types::request::RequestDescriptor;
use crate::types::response::FetchResponse;

/// Executes request descriptors.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Execute one fetch.
    ///
    /// # Errors
    ///
    /// An `Err` is a *terminal* failure for this descriptor: the transport
    /// has exhausted its own retries and will not deliver a response. The
    /// engine converts it into an error record for the owning task.
    async fn fetch(&self, request: RequestDescriptor) -> Result<FetchResponse>;

    /// Short label for logs.
    fn transport_type(&self) -> &'static str {
        "custom"
    }
}

/// One scripted answer for [`ScriptedTransport`].
#[derive(Debug)]
pub struct ScriptedReply {
    status: u16,
    body: String,
    delay_ms: u64,
}

impl ScriptedReply {
    /// 200 OK reply with the given body.
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            delay_ms: 0,
        }
    }

    /// Override the HTTP status.
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Delay delivery, for forcing arrival orders in tests.
    #[must_use]
    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }
}

enum Outcome {
    Reply(ScriptedReply),
    Fail(Error),
}

/// In-memory transport answering from a script, keyed by URL.
///
/// Each URL holds a queue of outcomes consumed in order; repeated fetches of
/// the same URL get successive entries. Unscripted URLs fail terminally,
/// which surfaces missing fixtures immediately.
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: DashMap<String, VecDeque<Outcome>>,
    log: Mutex<Vec<RequestDescriptor>>,
}

impl ScriptedTransport {
    /// Empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for a URL.
    pub fn reply(&self, url: &str, reply: ScriptedReply) {
        self.scripts
            .entry(url.to_string())
            .or_default()
            .push_back(Outcome::Reply(reply));
    }

    /// Queue a terminal failure for a URL.
    pub fn fail(&self, url: &str, error: Error) {
        self.scripts
            .entry(url.to_string())
            .or_default()
            .push_back(Outcome::Fail(error));
    }

    /// Every descriptor fetched so far, in submission order.
    pub fn requests_seen(&self) -> Vec<RequestDescriptor> {
        self.log.lock().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn fetch(&self, request: RequestDescriptor) -> Result<FetchResponse> {
        self.log.lock().push(request.clone());

        let url = request.url.to_string();
        let outcome = self
            .scripts
            .get_mut(&url)
            .and_then(|mut q| q.pop_front())
            .ok_or_else(|| Error::internal(format!("no scripted outcome for '{url}'")))?;

        match outcome {
            Outcome::Reply(reply) => {
                if reply.delay_ms > 0 {
                    tokio::time::sleep(std::time::Duration::from_millis(reply.delay_ms)).await;
                }
                let status = http::StatusCode::from_u16(reply.status)
                    .map_err(|_| Error::internal(format!("bad scripted status {}", reply.status)))?;
                Ok(FetchResponse::new(status, reply.body, request.context))
            },
            Outcome::Fail(error) => Err(error),
        }
    }

    fn transport_type(&self) -> &'static str {
        "scripted"
    }
}
