//! Classification client: one request, bounded retries, parsed reply.
//!
//! The retry loop is an explicit state machine:
//!
//! ```text
//!                 ┌────── retryable, budget left: sleep backoff(n) ─────┐
//!                 ▼                                                      │
//! Attempting(0) ─► Attempting(n) ──── send ──► Ok ──────────► Succeeded  │
//!                 │    │                 └─► RateLimited/Transient ─────┘
//!                 │    │                 └─► retryable, budget spent ─► ExhaustedRetries
//!                 │    │                 └─► Fatal ───────────────────► FatalError
//!                 │    └─ cancellation flag set ──────────────────────► Cancelled
//! ```
//!
//! ## Retry Strategy
//!
//! Rate limits and overloaded servers are common when a batch hammers the
//! API. The wait before attempt `n + 1` is `min(max_delay, base * 2^n)`:
//! with the defaults 6 s → 12 s → 24 s → 48 s, so five attempts span about a
//! minute and a half. Sleeping goes through [`Sleeper`] so tests run instantly.

use crate::config::RetryPolicy;
use crate::error::TransportError;
use crate::output::FailureKind;
use crate::pipeline::encode::EncodedPayload;
use crate::pipeline::response::{parse_response, ParsedResponse};
use crate::pipeline::transport::{ClassificationRequest, ClassificationTransport};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Suspends the current task between attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] backed by `tokio::time::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Shared flag that stops further attempts once set.
///
/// Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Bookkeeping local to one `classify` call.
#[derive(Debug, Clone, Default)]
pub struct RetryState {
    /// Attempts started so far.
    pub attempt_number: u32,
    pub last_error: Option<TransportError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallState {
    /// About to make 0-based attempt `n`.
    Attempting(u32),
    /// The transport returned this body.
    Succeeded(String),
    ExhaustedRetries,
    FatalError(TransportError),
    Cancelled,
}

/// What one `classify` call produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientResult {
    /// The service answered; the reply may still be unparseable.
    Answered { response: ParsedResponse, attempts: u32 },
    /// No usable answer.
    Failed {
        kind: FailureKind,
        diagnostic: String,
        attempts: u32,
    },
}

impl ClientResult {
    pub fn attempts(&self) -> u32 {
        match self {
            ClientResult::Answered { attempts, .. } | ClientResult::Failed { attempts, .. } => {
                *attempts
            }
        }
    }
}

pub struct ClassificationClient {
    transport: Arc<dyn ClassificationTransport>,
    sleeper: Arc<dyn Sleeper>,
    policy: RetryPolicy,
    system_instruction: String,
    cancel: CancellationFlag,
}

impl ClassificationClient {
    pub fn new(
        transport: Arc<dyn ClassificationTransport>,
        policy: RetryPolicy,
        system_instruction: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            sleeper: Arc::new(TokioSleeper),
            policy,
            system_instruction: system_instruction.into(),
            cancel: CancellationFlag::new(),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Send `payload` with `prompt`, retrying rate limits and transient errors.
    pub async fn classify(&self, payload: &EncodedPayload, prompt: &str) -> ClientResult {
        let request = ClassificationRequest::new(self.system_instruction.as_str(), prompt, payload);
        let mut retry = RetryState::default();
        let mut state = CallState::Attempting(0);

        loop {
            state = match state {
                CallState::Attempting(n) => self.attempt(n, &request, &mut retry).await,
                CallState::Succeeded(body) => {
                    info!("Classification call succeeded after {} attempt(s)", retry.attempt_number);
                    return ClientResult::Answered {
                        response: parse_response(&body),
                        attempts: retry.attempt_number,
                    };
                }
                CallState::ExhaustedRetries => {
                    let last = retry
                        .last_error
                        .as_ref()
                        .map(|e| e.to_string())
                        .unwrap_or_default();
                    return ClientResult::Failed {
                        kind: FailureKind::RetriesExhausted,
                        diagnostic: format!(
                            "communication failed after maximum retries ({} attempts): {}",
                            retry.attempt_number, last
                        ),
                        attempts: retry.attempt_number,
                    };
                }
                CallState::FatalError(e) => {
                    return ClientResult::Failed {
                        kind: FailureKind::Fatal,
                        diagnostic: format!("classification request failed: {e}"),
                        attempts: retry.attempt_number,
                    };
                }
                CallState::Cancelled => {
                    return ClientResult::Failed {
                        kind: FailureKind::Cancelled,
                        diagnostic: format!(
                            "cancelled after {} attempt(s)",
                            retry.attempt_number
                        ),
                        attempts: retry.attempt_number,
                    };
                }
            };
        }
    }

    /// Run attempt `n` and decide the next state.
    async fn attempt(
        &self,
        n: u32,
        request: &ClassificationRequest,
        retry: &mut RetryState,
    ) -> CallState {
        if self.cancel.is_cancelled() {
            return CallState::Cancelled;
        }
        retry.attempt_number = n + 1;
        debug!("Attempt {}/{}", n + 1, self.policy.retry_limit);

        match self.transport.send(request).await {
            Ok(body) => CallState::Succeeded(body),
            Err(e) if e.is_retryable() => {
                warn!(
                    "Attempt {}/{} failed: {}",
                    n + 1,
                    self.policy.retry_limit,
                    e
                );
                retry.last_error = Some(e);
                if n + 1 < self.policy.retry_limit {
                    let delay = self.policy.backoff(n);
                    warn!("Retrying in {:?}", delay);
                    self.sleeper.sleep(delay).await;
                    CallState::Attempting(n + 1)
                } else {
                    CallState::ExhaustedRetries
                }
            }
            Err(e) => {
                warn!("Attempt {} failed with a non-retryable error: {}", n + 1, e);
                retry.last_error = Some(e.clone());
                CallState::FatalError(e)
            }
        }
    }
}
