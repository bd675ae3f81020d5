use std::any::Any;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{error::ContextError, signal::Signal, values::Values};

/// Call-scoped context: optional deadline, cancellation and typed values.
///
/// Contexts are immutable; every `with_*` method returns a child. Cancelling a parent cancels
/// its children, never the other way round.
#[derive(Clone, Debug, Default)]
pub struct CallContext {
    signal: Signal,
    values: Values,
}

impl CallContext {
    /// Never cancelled, no deadline, no values.
    pub fn background() -> Self {
        Self::default()
    }

    /// Context driven by an existing cancellation token.
    pub fn from_token(token: CancellationToken) -> Self {
        Self::from_parts(Signal::new(token, None), Values::new())
    }

    /// Combines a signal with a value chain taken from a possibly unrelated context.
    pub fn from_parts(signal: Signal, values: Values) -> Self {
        Self { signal, values }
    }

    /// Child context plus the token that cancels it.
    pub fn with_cancel(&self) -> (Self, CancellationToken) {
        let signal = self.signal.child(None);
        let token = signal.token().clone();
        (Self::from_parts(signal, self.values.clone()), token)
    }

    /// Child context whose deadline is the earlier of `deadline` and the parent's.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        Self::from_parts(self.signal.child(Some(deadline)), self.values.clone())
    }

    /// Same as [`CallContext::with_deadline`] relative to now.
    ///
    /// A timeout too large to be represented leaves the child without a deadline of its own.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let deadline = Instant::now().checked_add(timeout);
        Self::from_parts(self.signal.child(deadline), self.values.clone())
    }

    pub fn with_value<T>(&self, value: T) -> Self
    where
        T: Any + Send + Sync,
    {
        Self::from_parts(self.signal.clone(), self.values.with(value))
    }

    pub fn value<T>(&self) -> Option<&T>
    where
        T: Any + Send + Sync,
    {
        self.values.get::<T>()
    }

    #[inline]
    pub fn deadline(&self) -> Option<Instant> {
        self.signal.deadline()
    }

    /// Time left until the deadline, zero once it has passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline()
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Explicit cancellation only.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.signal.is_cancelled()
    }

    #[inline]
    pub fn err(&self) -> Option<ContextError> {
        self.signal.err()
    }

    #[inline]
    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    pub async fn done(&self) -> ContextError {
        self.signal.done().await
    }

    pub async fn cancelled(&self) {
        self.signal.cancelled().await
    }

    #[inline]
    pub fn signal(&self) -> &Signal {
        &self.signal
    }

    #[inline]
    pub fn values(&self) -> &Values {
        &self.values
    }
}
