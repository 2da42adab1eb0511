use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` refines the default
/// `cleankiln=info` level; `CLEANKILN_LOG_FORMAT=json` switches to
/// line-delimited JSON output.
pub fn init() {
    let filter = EnvFilter::from_default_env().add_directive(
        "cleankiln=info"
            .parse()
            .unwrap_or_else(|_| tracing::Level::INFO.into()),
    );

    let json = std::env::var("CLEANKILN_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
