use std::sync::OnceLock;
use tracing_subscriber::fmt::time::UtcTime;

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Install the global tracing subscriber once.
///
/// Events go to stderr with RFC 3339 UTC timestamps; `verbose` lowers the
/// filter from warn to debug so the pipeline threads narrate their ticks.
/// Later calls are no-ops, which keeps tests and embedders safe.
pub fn init_tracing(verbose: bool) {
    let _ = TRACING_INIT.get_or_init(|| {
        let max_level = if verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::WARN
        };
        let subscriber = tracing_subscriber::fmt()
            .with_timer(UtcTime::rfc_3339())
            .with_max_level(max_level)
            .with_writer(std::io::stderr)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}
