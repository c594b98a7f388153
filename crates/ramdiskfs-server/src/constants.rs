//! Server configuration constants.
//!
//! Defaults used when the config file or command line leaves a value out.

/// Endpoint the server receives on.
pub const DEFAULT_SERVER_ENDPOINT: i32 = 1;

/// Service id stamped into issued capabilities.
pub const DEFAULT_SERVICE_ID: u32 = 1;

/// Epoch of a fresh start.
pub const DEFAULT_EPOCH: u32 = 1;

/// Pending requests buffered before senders wait.
pub const DEFAULT_QUEUE_DEPTH: usize = 64;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Config file looked up when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "ramdiskfs.toml";
