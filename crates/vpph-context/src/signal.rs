use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

use crate::error::ContextError;

/// Cancellation and deadline source of a [`CallContext`](crate::CallContext).
///
/// The deadline is evaluated lazily against the tokio clock, so a signal never owns a timer task.
/// Once the deadline has passed the signal reports [`ContextError::DeadlineExceeded`],
/// even if the token was cancelled as well.
#[derive(Clone, Debug, Default)]
pub struct Signal {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Signal {
    pub fn new(token: CancellationToken, deadline: Option<Instant>) -> Self {
        Self { token, deadline }
    }

    /// Signal with a fresh root token: nothing but its own token can cancel it.
    pub fn detached(deadline: Option<Instant>) -> Self {
        Self::new(CancellationToken::new(), deadline)
    }

    #[inline]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    #[inline]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Explicit cancellation only; an expired deadline does not count.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn err(&self) -> Option<ContextError> {
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Some(ContextError::DeadlineExceeded);
        }
        if self.token.is_cancelled() {
            return Some(ContextError::Cancelled);
        }
        None
    }

    /// Resolves on explicit cancellation; ignores the deadline.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Resolves once the signal is cancelled or its deadline is reached.
    pub async fn done(&self) -> ContextError {
        let Some(deadline) = self.deadline else {
            self.token.cancelled().await;
            return ContextError::Cancelled;
        };
        tokio::select! {
            biased;
            _ = self.token.cancelled() => self.err().unwrap_or(ContextError::Cancelled),
            _ = sleep_until(deadline) => ContextError::DeadlineExceeded,
        }
    }

    /// Child signal: cancelled together with `self`, deadline never later than `self`'s.
    pub(crate) fn child(&self, deadline: Option<Instant>) -> Self {
        let deadline = match (self.deadline, deadline) {
            (Some(parent), Some(own)) => Some(parent.min(own)),
            (parent, own) => parent.or(own),
        };
        Self::new(self.token.child_token(), deadline)
    }
}
