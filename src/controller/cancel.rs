//! # Cancellation
//!
//! Deadline and explicit cancellation for one invocation.
//!
//! Every store call of an invocation runs under the same [`Cancellation`], so a
//! deadline bounds the whole get-then-write sequence, not each call.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Cancelled {
    #[error("operation was cancelled")]
    Cancelled,

    #[error("operation exceeded its deadline of {0:?}")]
    DeadlineExceeded(Duration),
}

#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    token: CancellationToken,
    deadline: Option<(Instant, Duration)>,
}

impl Cancellation {
    /// No deadline; cancelled only explicitly
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Deadline starting now
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some((Instant::now() + timeout, timeout)),
        }
    }

    /// Follow an externally owned token (e.g. a signal handler's)
    #[must_use]
    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Drive `future` unless cancellation or the deadline comes first.
    /// The future is dropped, aborting the in-flight call, when it loses.
    #[allow(
        clippy::missing_errors_doc,
        reason = "Error documentation is provided in doc comments"
    )]
    pub async fn run<F: Future>(&self, future: F) -> Result<F::Output, Cancelled> {
        if self.token.is_cancelled() {
            return Err(Cancelled::Cancelled);
        }

        match self.deadline {
            Some((at, timeout)) => {
                if Instant::now() >= at {
                    return Err(Cancelled::DeadlineExceeded(timeout));
                }
                tokio::select! {
                    biased;
                    () = self.token.cancelled() => Err(Cancelled::Cancelled),
                    () = tokio::time::sleep_until(at) => Err(Cancelled::DeadlineExceeded(timeout)),
                    output = future => Ok(output),
                }
            }
            None => tokio::select! {
                biased;
                () = self.token.cancelled() => Err(Cancelled::Cancelled),
                output = future => Ok(output),
            },
        }
    }
}
