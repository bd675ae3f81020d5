use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("unknown log format {0:?}, expected text, json or journald")]
    InvalidFormat(String),
    #[error("invalid log filter {directives:?}: {reason}")]
    InvalidLogLevel { directives: String, reason: String },
    #[error("{var}: {source}")]
    Env {
        var: &'static str,
        #[source]
        source: Box<LoggerError>,
    },
    #[error("journald output needs linux and the `journald` feature")]
    JournaldNotSupported,
    #[error("a global tracing subscriber is already installed")]
    AlreadyInitialized,
    #[error("logger initialization failed: {0}")]
    InitializationFailed(String),
}

impl LoggerError {
    /// Attributes a parse failure to the environment variable it came from.
    pub(crate) fn from_env(var: &'static str) -> impl FnOnce(LoggerError) -> LoggerError {
        move |source| LoggerError::Env {
            var,
            source: Box::new(source),
        }
    }
}
