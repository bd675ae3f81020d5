//! Worker configuration: default template, parameters and on-disk defaults.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::{fs, io::AsyncWriteExt};
use tracing::{debug, info};

use crate::error::ConfigError;

mod template;
pub use template::render;

/// Buffer data size: a 4096 byte page minus 256 bytes of metadata minus one 64 byte cache line,
/// so a buffer barely fits in one page.
#[cfg(not(any(target_arch = "arm", target_arch = "aarch64")))]
pub const DEFAULT_DATA_SIZE: u32 = 3776;
#[cfg(any(target_arch = "arm", target_arch = "aarch64"))]
pub const DEFAULT_DATA_SIZE: u32 = 2048;

/// Main config file, relative to the root directory.
pub const CONF_FILENAME: &str = "etc/vpp/vpp.conf";
/// Runtime directory holding the API and CLI sockets, relative to the root directory.
pub const RUN_DIR: &str = "var/run/vpp";
/// Log directory, relative to the root directory.
pub const LOG_DIR: &str = "var/log/vpp";

pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"unix {
    nodaemon
    log {{ .RootDir }}/var/log/vpp/vpp.log
    cli-listen {{ .RootDir }}/var/run/vpp/cli.sock
}
api-trace {
    on
}
socksvr {
    socket-name {{ .RootDir }}/var/run/vpp/api.sock
}
statseg {
    socket-name {{ .RootDir }}/var/run/vpp/stats.sock
    per-node-counters on
}
buffers {
    default data-size {{ .DataSize }}
}
plugins {
    plugin dpdk_plugin.so { disable }
}
"#;

/// Values available to config templates as `{{ .DataSize }}` and `{{ .RootDir }}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConfigParameters {
    pub data_size: u32,
    pub root_dir: PathBuf,
}

impl ConfigParameters {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_size: DEFAULT_DATA_SIZE,
            root_dir: root_dir.into(),
        }
    }

    pub fn with_data_size(mut self, data_size: u32) -> Self {
        self.data_size = data_size;
        self
    }
}

/// Writes every default config file missing under `root_dir` and creates the runtime directories.
///
/// Existing files are left untouched. Directories are created `0700`, files `0600` on unix.
pub async fn write_default_config_files(root_dir: &Path, template: &str) -> Result<(), ConfigError> {
    let contents = render(template, &ConfigParameters::new(root_dir))?;
    let files = [(CONF_FILENAME, contents)];

    for (name, contents) in files {
        let path = root_dir.join(name);
        let exists = fs::try_exists(&path).await.map_err(io_err(&path))?;
        if exists {
            debug!(target: "vpph.exec.config", path = %path.display(), "configuration file present");
            continue;
        }

        info!(target: "vpph.exec.config", path = %path.display(), "configuration file not found, using defaults");
        if let Some(parent) = path.parent() {
            create_private_dir(parent).await?;
        }
        write_private_file(&path, contents.as_bytes()).await?;
    }

    for dir in [RUN_DIR, LOG_DIR] {
        create_private_dir(&root_dir.join(dir)).await?;
    }
    Ok(())
}

async fn create_private_dir(path: &Path) -> Result<(), ConfigError> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o700);
    builder.create(path).await.map_err(io_err(path))
}

async fn write_private_file(path: &Path, contents: &[u8]) -> Result<(), ConfigError> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).await.map_err(io_err(path))?;
    file.write_all(contents).await.map_err(io_err(path))?;
    file.flush().await.map_err(io_err(path))
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> ConfigError + '_ {
    move |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    }
}
