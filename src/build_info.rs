//! Compile-time build metadata.

/// Semver package version from `Cargo.toml`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// VCS commit hash captured at build time.
pub const GIT_COMMIT: &str = env!("TETHER_BUILD_GIT_HASH");

/// Build timestamp captured at compile time.
pub const BUILD_TIMESTAMP: &str = env!("TETHER_BUILD_TIMESTAMP");

/// Value sent as the `User-Agent` of every outbound request.
pub fn user_agent() -> String {
    format!("tether/{VERSION}")
}

/// Multi-line block printed by `tether --version`.
pub const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "\ncommit: ",
    env!("TETHER_BUILD_GIT_HASH"),
    "\nbuilt: ",
    env!("TETHER_BUILD_TIMESTAMP")
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_agent_names_crate_and_version() {
        assert_eq!(user_agent(), format!("tether/{VERSION}"));
    }

    #[test]
    fn long_version_includes_commit_and_build_time() {
        let text = LONG_VERSION;
        assert!(text.starts_with(VERSION));
        assert!(text.contains(GIT_COMMIT));
        assert!(text.contains("built:"));
    }
}
