use tracing_subscriber::{EnvFilter, filter::LevelFilter, fmt, prelude::*};

/// `-v` count to the level used when `RUST_LOG` is unset.
fn default_level(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Logs go to stderr so the status lines on stdout stay clean.
pub fn init_logging(verbosity: u8) {
    let filter = EnvFilter::builder()
        .with_default_directive(default_level(verbosity).into())
        .parse_lossy(std::env::var("RUST_LOG").unwrap_or_default());

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(filter);

    tracing_subscriber::registry().with(stderr_layer).init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_raises_the_default_level() {
        assert_eq!(default_level(0), LevelFilter::WARN);
        assert_eq!(default_level(1), LevelFilter::INFO);
        assert_eq!(default_level(2), LevelFilter::DEBUG);
        assert_eq!(default_level(9), LevelFilter::TRACE);
    }
}
