//! Process-wide logging setup.
//!
//! Call [`init`] once from `main`; library crates only use the `tracing`
//! macros and never install a subscriber themselves.

use tracing_subscriber::EnvFilter;

/// Level used when neither `RUST_LOG` nor an explicit level is given.
pub const DEFAULT_LEVEL: &str = "info";

/// Installs the global `tracing` subscriber.
///
/// `RUST_LOG` wins when set; otherwise `level` (or [`DEFAULT_LEVEL`]) is used.
/// Calling it a second time is a no-op.
pub fn init(level: Option<&str>) {
    let filter = build_filter(std::env::var("RUST_LOG").ok().as_deref(), level);

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

fn build_filter(env: Option<&str>, level: Option<&str>) -> EnvFilter {
    if let Some(directives) = env.filter(|s| !s.trim().is_empty()) {
        if let Ok(filter) = EnvFilter::try_new(directives) {
            return filter;
        }
    }
    EnvFilter::try_new(level.unwrap_or(DEFAULT_LEVEL))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_directives_take_precedence() {
        let filter = build_filter(Some("debug"), Some("warn"));
        assert_eq!(filter.to_string(), "debug");
    }

    #[test]
    fn test_falls_back_to_level_then_default() {
        assert_eq!(build_filter(None, Some("warn")).to_string(), "warn");
        assert_eq!(build_filter(Some("  "), None).to_string(), "info");
    }

    #[test]
    fn test_init_twice_does_not_panic() {
        init(Some("error"));
        init(Some("error"));
    }
}
