use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable consulted when `RUST_LOG` is unset.
pub const LOG_ENV: &str = "SAMPLE_HEALTH_LOG";

/// Filter directive for the CLI flags, before environment overrides.
pub fn default_directive(verbose: bool, log_level: Option<&str>) -> String {
    match (verbose, log_level) {
        (_, Some(level)) if level.contains('=') => level.to_string(),
        (_, Some(level)) => format!("sample_health={}", level),
        (true, None) => "sample_health=debug".to_string(),
        (false, None) => "sample_health=info".to_string(),
    }
}

/// Initialize structured logging to stderr.
pub fn init_tracing(
    verbose: bool,
    log_level: Option<&str>,
    log_json: bool,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let directive = default_directive(verbose, log_level);
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_from_env(LOG_ENV))
        .unwrap_or_else(|_| EnvFilter::new(directive));

    let registry = tracing_subscriber::registry().with(filter);

    if log_json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
            .try_init()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive() {
        assert_eq!(default_directive(false, None), "sample_health=info");
        assert_eq!(default_directive(true, None), "sample_health=debug");
        assert_eq!(default_directive(true, Some("trace")), "sample_health=trace");
        assert_eq!(default_directive(false, Some("reqwest=debug")), "reqwest=debug");
    }
}
