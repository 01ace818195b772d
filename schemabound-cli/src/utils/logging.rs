use std::sync::OnceLock;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

static LOG_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
static LOG_INIT: OnceLock<()> = OnceLock::new();

/// Log to stderr so that stdout only carries the transformed schemas.
pub fn init_logging(debug: bool) -> anyhow::Result<()> {
    if LOG_INIT.get().is_some() {
        return Ok(());
    }

    let (non_blocking, guard) = tracing_appender::non_blocking(std::io::stderr());

    let level = if debug {
        tracing::Level::TRACE
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false),
        )
        .with(tracing_subscriber::filter::LevelFilter::from_level(level))
        .try_init()?;

    let _ = LOG_GUARD.set(guard);
    let _ = LOG_INIT.set(());
    Ok(())
}
