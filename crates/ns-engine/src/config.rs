//! `WorkerConfig`/`QueryCompilerConfig`, loaded from the YAML files named by
//! the system test driver's `--workerConfig`/`--queryCompilerConfig` flags
//! (spec.md §6). Every field carries a default so a config file only needs
//! to override what it cares about, the way `vector-buffers::config::BufferType`
//! defaults unset fields rather than requiring a fully-specified document.

use std::path::Path;

use serde::Deserialize;
use snafu::{ResultExt, Snafu};

#[derive(Debug, Snafu)]
pub enum ConfigError {
    #[snafu(display("failed to read config file {}: {source}", path.display()))]
    Read {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to parse config file {}: {source}", path.display()))]
    Parse {
        path: std::path::PathBuf,
        source: serde_yaml::Error,
    },
}

fn default_num_worker_threads() -> usize {
    std::thread::available_parallelism().map(usize::from).unwrap_or(4)
}

fn default_num_buffers() -> usize {
    1024
}

fn default_buffer_size_bytes() -> usize {
    4096
}

fn default_task_queue_capacity() -> usize {
    8192
}

fn default_sink_fifo_capacity() -> usize {
    4096
}

/// Per-worker resource sizing: thread pool width, buffer pool dimensions,
/// task queue and sink FIFO capacities (spec.md §5/§4.5).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub num_worker_threads: usize,
    pub num_buffers: usize,
    pub buffer_size_bytes: usize,
    pub task_queue_capacity: usize,
    pub sink_fifo_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            num_worker_threads: default_num_worker_threads(),
            num_buffers: default_num_buffers(),
            buffer_size_bytes: default_buffer_size_bytes(),
            task_queue_capacity: default_task_queue_capacity(),
            sink_fifo_capacity: default_sink_fifo_capacity(),
        }
    }
}

impl WorkerConfig {
    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).context(ReadSnafu { path })?;
        serde_yaml::from_str(&contents).context(ParseSnafu { path })
    }
}

fn default_allowed_lateness_ms() -> i64 {
    0
}

fn default_optimize_for_native_backend() -> bool {
    true
}

/// Query-compiler knobs (spec.md §4.2): which code generator back-end to
/// prefer and the default allowed-lateness applied to windows that don't
/// specify their own.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueryCompilerConfig {
    pub optimize_for_native_backend: bool,
    pub default_allowed_lateness_ms: i64,
}

impl Default for QueryCompilerConfig {
    fn default() -> Self {
        Self {
            optimize_for_native_backend: default_optimize_for_native_backend(),
            default_allowed_lateness_ms: default_allowed_lateness_ms(),
        }
    }
}

impl QueryCompilerConfig {
    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).context(ReadSnafu { path })?;
        serde_yaml::from_str(&contents).context(ParseSnafu { path })
    }
}
