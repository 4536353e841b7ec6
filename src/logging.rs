use crate::error::{Error, Result};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "warn";

/// Installs the stderr subscriber. An explicit `level` wins over `RUST_LOG`.
pub fn init(level: Option<&str>) -> Result<()> {
    let filter = resolve_filter(level, std::env::var("RUST_LOG").ok().as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| Error::InvalidInput(format!("initialize logging subscriber: {}", e)))
}

fn resolve_filter(cli_level: Option<&str>, env_level: Option<&str>) -> Result<EnvFilter> {
    let raw = cli_level
        .or(env_level)
        .map(str::trim)
        .filter(|level| !level.is_empty())
        .unwrap_or(DEFAULT_LOG_FILTER);

    EnvFilter::try_new(raw).map_err(|_| {
        Error::InvalidInput(format!(
            "invalid log level `{}`; expected a filter such as trace, debug, info, warn, error or picoca=debug",
            raw
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_warn() {
        let filter = resolve_filter(None, None).unwrap();
        assert_eq!(filter.to_string(), "warn");
    }

    #[test]
    fn cli_level_wins_over_env() {
        let filter = resolve_filter(Some("debug"), Some("error")).unwrap();
        assert_eq!(filter.to_string(), "debug");

        let filter = resolve_filter(None, Some("picoca=info")).unwrap();
        assert_eq!(filter.to_string(), "picoca=info");
    }

    #[test]
    fn invalid_filter_is_rejected() {
        let err = resolve_filter(Some("picoca=verbose"), None).unwrap_err();
        assert!(
            err.to_string().contains("invalid log level"),
            "unexpected error: {err}"
        );
    }
}
