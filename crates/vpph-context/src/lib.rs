//! Call-scoped context for remote invocations.
//!
//! A [`CallContext`] combines two independent capabilities:
//! - a [`Signal`]: cancellation token plus an optional absolute deadline;
//! - [`Values`]: typed key-value lookups attached by the caller.
//!
//! Derived contexts are built by recombining the two with [`CallContext::from_parts`].

mod error;
pub use error::ContextError;

mod signal;
pub use signal::Signal;

mod values;
pub use values::Values;

mod context;
pub use context::CallContext;

pub use tokio::time::Instant;
pub use tokio_util::sync::CancellationToken;
