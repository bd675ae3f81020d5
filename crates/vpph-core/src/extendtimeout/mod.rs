//! Connection decorator that guarantees every invocation a minimum time budget.
//!
//! ## Policy
//!
//! For a call started at `start` with minimum timeout `min`, let `M = start + min`:
//! - `min` is zero, or the original deadline is at or after `M`:
//!   the caller's context is passed through untouched.
//! - the original deadline is before `M`:
//!   downstream gets a context with deadline `M`, the caller's values and a token of its own.
//!   Neither the original timeout nor its cancellation reach the call before `M`.
//! - the original context has no deadline:
//!   downstream gets a context without deadline and a watcher task. The watcher waits until `M`,
//!   then forwards the original's cancellation (immediately, if it already happened).
//!
//! In every case the derived context is cancelled and its watcher released when `invoke` returns,
//! on success, on failure, or when the invoke future is dropped.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::{
    sync::{CancellationToken, DropGuard},
    task::TaskTracker,
};
use tracing::info;
use vpph_context::{CallContext, Signal};

use crate::connection::Connection;

mod watcher;
use watcher::forward_cancellation;

/// Roughly thirty years; stands in for `start + min` when that instant is not representable.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Wraps a [`Connection`] so that each invocation keeps a usable context for at least
/// `minimum_timeout` after it starts.
///
/// Errors and replies of the wrapped connection are returned unchanged.
pub struct ExtendTimeout<C> {
    inner: C,
    minimum_timeout: Duration,
    watchers: TaskTracker,
}

/// Shorthand for [`ExtendTimeout::new`].
pub fn new_connection<C>(connection: C, minimum_timeout: Duration) -> ExtendTimeout<C>
where
    C: Connection,
{
    ExtendTimeout::new(connection, minimum_timeout)
}

impl<C> ExtendTimeout<C> {
    pub fn new(connection: C, minimum_timeout: Duration) -> Self {
        Self {
            inner: connection,
            minimum_timeout,
            watchers: TaskTracker::new(),
        }
    }

    #[inline]
    pub fn minimum_timeout(&self) -> Duration {
        self.minimum_timeout
    }

    #[inline]
    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn into_inner(self) -> C {
        self.inner
    }

    /// Cancellation watchers that have not exited yet.
    pub fn active_watchers(&self) -> usize {
        self.watchers.len()
    }

    /// Waits until every watcher spawned so far has exited.
    pub async fn drain_watchers(&self) {
        self.watchers.close();
        self.watchers.wait().await;
        self.watchers.reopen();
    }

    fn plan(&self, ctx: &CallContext, start: Instant) -> Plan {
        if self.minimum_timeout.is_zero() {
            return Plan::PassThrough;
        }
        let window_end = start
            .checked_add(self.minimum_timeout)
            .unwrap_or_else(|| start + FAR_FUTURE);

        match ctx.deadline() {
            Some(deadline) if deadline >= window_end => Plan::PassThrough,
            Some(deadline) => Plan::Extend {
                original: deadline,
                extended: window_end,
            },
            None => Plan::Monitor { window_end },
        }
    }
}

#[async_trait]
impl<C> Connection for ExtendTimeout<C>
where
    C: Connection,
{
    type Request = C::Request;
    type Reply = C::Reply;
    type Error = C::Error;

    async fn invoke(
        &self,
        ctx: &CallContext,
        request: &Self::Request,
    ) -> Result<Self::Reply, Self::Error> {
        let start = Instant::now();

        match self.plan(ctx, start) {
            Plan::PassThrough => self.inner.invoke(ctx, request).await,
            Plan::Extend { original, extended } => {
                info!(
                    target: "vpph.extendtimeout",
                    original = ?original.saturating_duration_since(start),
                    extended = ?extended.saturating_duration_since(start),
                    "context deadline extended"
                );
                let derived = Derived::extended(ctx, extended);
                self.inner.invoke(&derived.ctx, request).await
            }
            Plan::Monitor { window_end } => {
                let derived = Derived::monitored(ctx, window_end, &self.watchers);
                self.inner.invoke(&derived.ctx, request).await
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Plan {
    PassThrough,
    Extend { original: Instant, extended: Instant },
    Monitor { window_end: Instant },
}

/// Derived context together with the guards that tear it down.
///
/// Dropping it stops the watcher (if any) and cancels the derived token.
struct Derived {
    ctx: CallContext,
    _release: Option<DropGuard>,
    _cancel: DropGuard,
}

impl Derived {
    fn extended(original: &CallContext, deadline: Instant) -> Self {
        let signal = Signal::detached(Some(deadline));
        let cancel = signal.token().clone().drop_guard();
        Self {
            ctx: CallContext::from_parts(signal, original.values().clone()),
            _release: None,
            _cancel: cancel,
        }
    }

    fn monitored(original: &CallContext, window_end: Instant, watchers: &TaskTracker) -> Self {
        let signal = Signal::detached(None);
        let release = CancellationToken::new();
        watchers.spawn(forward_cancellation(
            original.signal().token().clone(),
            signal.token().clone(),
            release.clone(),
            window_end,
        ));

        let cancel = signal.token().clone().drop_guard();
        Self {
            ctx: CallContext::from_parts(signal, original.values().clone()),
            _release: Some(release.drop_guard()),
            _cancel: cancel,
        }
    }
}
