use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("non-zero exit code: {code}")]
    NonZeroExit { code: i32 },
    #[error("spawn failed: {0}")]
    Spawn(String),
    #[error("killed by signal")]
    KilledBySignal,
    #[error("missing program")]
    MissingProgram,
    #[error("io error: {0}")]
    Io(String),
    #[error("cancelled")]
    Cancelled,
    #[error("exit status lost")]
    Lost,
}

impl From<std::io::Error> for ExecError {
    fn from(e: std::io::Error) -> Self {
        ExecError::Io(e.to_string())
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unterminated placeholder at byte {0}")]
    Unterminated(usize),
    #[error("malformed placeholder: {0:?}")]
    Malformed(String),
    #[error("template references unknown field: {0}")]
    UnknownField(String),
    #[error("field {0} is not a scalar value")]
    NotScalar(String),
    #[error("template parameters must serialize to a map: {0}")]
    Parameters(String),
    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum StartError {
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    #[error("exec: {0}")]
    Exec(#[from] ExecError),
    #[error("worker exited right after start")]
    ExitedEarly,
    #[error("dial {}: {reason}", socket.display())]
    Dial { socket: PathBuf, reason: String },
}
