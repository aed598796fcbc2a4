//! Default configuration constants.

/// Local and global config file name.
pub(super) const CONFIG_FILE_NAME: &str = "tether.toml";
/// Directory under the platform config root holding the global config.
pub(super) const CONFIG_DIR_NAME: &str = "tether";
/// Default per-request deadline.
pub(super) const DEFAULT_TIMEOUT_SECS: u64 = 30;
/// One attempt: transient retries stay off unless configured.
pub(super) const DEFAULT_MAX_ATTEMPTS: u32 = 1;
