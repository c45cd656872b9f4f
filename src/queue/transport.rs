//! Remote delivery abstraction.

use std::collections::VecDeque;
use std::sync::Mutex;

use super::error::TransportError;

/// Successful delivery response.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransportResponse {
    /// HTTP-like status code
    pub status: u16,
    /// Optional response body
    pub body: Option<String>,
}

impl TransportResponse {
    /// 200 response without a body.
    pub fn ok() -> Self {
        Self {
            status: 200,
            body: None,
        }
    }
}

/// Delivers actions to the remote backend.
#[allow(async_fn_in_trait)]
pub trait Transport<A> {
    /// Sends one action.
    async fn send(&self, action: &A) -> Result<TransportResponse, TransportError>;
}

/// Scripted transport for testing.
///
/// Replies are consumed in order; once the script is empty every send
/// succeeds. Every action passed to `send` is recorded.
#[derive(Debug)]
pub struct MockTransport<A> {
    script: Mutex<VecDeque<Result<TransportResponse, TransportError>>>,
    sent: Mutex<Vec<A>>,
}

impl<A> Default for MockTransport<A> {
    fn default() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
        }
    }
}

impl<A: Clone> MockTransport<A> {
    /// Creates a transport that always succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a transport that replays `replies` before succeeding.
    pub fn with_script(
        replies: impl IntoIterator<Item = Result<TransportResponse, TransportError>>,
    ) -> Self {
        let transport = Self::default();
        transport
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(replies);
        transport
    }

    /// Queues a failure for the next send.
    pub fn push_failure(&self, error: TransportError) {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Err(error));
    }

    /// Actions sent so far.
    pub fn sent(&self) -> Vec<A> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of send calls.
    pub fn call_count(&self) -> usize {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl<A: Clone> Transport<A> for MockTransport<A> {
    async fn send(&self, action: &A) -> Result<TransportResponse, TransportError> {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(action.clone());
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| Ok(TransportResponse::ok()))
    }
}
