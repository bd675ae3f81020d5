//! Worker bootstrap: configuration files, process launch and dialing.

mod error;
pub use error::{ConfigError, ExecError, StartError};

pub mod config;
pub use config::{ConfigParameters, render, write_default_config_files};

pub mod proc;
pub use proc::{ExitWatch, ProcConfig};

mod start;
pub use start::{Dialer, StartOptions, start_and_dial};

mod util;

pub mod prelude {
    pub use crate::error::{ConfigError, ExecError, StartError};
    pub use crate::proc::{ExitWatch, ProcConfig};
    pub use crate::start::{Dialer, StartOptions, start_and_dial};
}
