mod connection;
pub use connection::Connection;

pub mod extendtimeout;
pub use extendtimeout::ExtendTimeout;

pub use vpph_context::{CallContext, ContextError};
