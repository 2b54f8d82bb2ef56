use std::collections::VecDeque;
use std::future::Future;
use std::sync::Mutex;

use thiserror::Error;

use crate::schema::GenerateRequest;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Undecodable service response: {0}")]
    Decode(String),
}

/// One round trip to the recognition service.
///
/// Returns the structured-output text of the reply, or `None` when the service
/// answered without any text.
pub trait Transport: Send + Sync {
    fn send(
        &self,
        request: &GenerateRequest,
        api_key: &str,
    ) -> impl Future<Output = Result<Option<String>, TransportError>> + Send;
}

// ── Mock transport (always available, used for tests and offline runs) ──────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockReply {
    Text(Option<String>),
    Status { status: u16, body: String },
}

/// Replays canned replies and records every request it was handed.
///
/// Replies are consumed in order; the last one repeats once the queue runs dry.
#[derive(Debug)]
pub struct MockTransport {
    replies: Mutex<VecDeque<MockReply>>,
    last: MockReply,
    requests: Mutex<Vec<GenerateRequest>>,
}

impl MockTransport {
    pub fn new(text: impl Into<String>) -> Self {
        Self::sequence(vec![MockReply::Text(Some(text.into()))])
    }

    /// A reply with no text at all.
    pub fn silent() -> Self {
        Self::sequence(vec![MockReply::Text(None)])
    }

    pub fn failing(status: u16, body: impl Into<String>) -> Self {
        Self::sequence(vec![MockReply::Status {
            status,
            body: body.into(),
        }])
    }

    pub fn sequence(replies: Vec<MockReply>) -> Self {
        let last = replies.last().cloned().unwrap_or(MockReply::Text(None));
        Self {
            replies: Mutex::new(replies.into()),
            last,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn next_reply(&self) -> MockReply {
        self.replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| self.last.clone())
    }
}

impl Transport for MockTransport {
    async fn send(
        &self,
        request: &GenerateRequest,
        _api_key: &str,
    ) -> Result<Option<String>, TransportError> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());
        match self.next_reply() {
            MockReply::Text(text) => Ok(text),
            MockReply::Status { status, body } => Err(TransportError::Status { status, body }),
        }
    }
}
