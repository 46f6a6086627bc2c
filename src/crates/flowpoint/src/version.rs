//! Build metadata injected by `build.rs`

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build number from CI, "0" for local builds
pub const BUILD_NUMBER: &str = env!("FLOWPOINT_BUILD_NUMBER");

/// Short git commit hash, or "unknown"
pub const GIT_COMMIT: &str = env!("FLOWPOINT_GIT_COMMIT");

pub const BUILD_TIMESTAMP: &str = env!("FLOWPOINT_BUILD_TIMESTAMP");

/// e.g. "flowpoint v0.1.0 (build 42, commit abc123, built 2025-01-15T10:30:00Z)"
pub fn full_version() -> String {
    format!(
        "flowpoint v{} (build {}, commit {}, built {})",
        VERSION, BUILD_NUMBER, GIT_COMMIT, BUILD_TIMESTAMP
    )
}

pub fn short_version() -> String {
    format!("v{}", VERSION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_version_contains_metadata() {
        let info = full_version();
        assert!(info.starts_with("flowpoint v"));
        assert!(info.contains(VERSION));
        assert!(info.contains(GIT_COMMIT));
    }

    #[test]
    fn test_short_version() {
        assert_eq!(short_version(), format!("v{}", env!("CARGO_PKG_VERSION")));
    }
}
