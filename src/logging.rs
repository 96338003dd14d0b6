// Tracing initialisation. Diagnostics go to stderr so they never
// interleave with the prompts on stdout. The default filter keeps the
// crate at `warn`; set `RUST_LOG` (for example
// `RUST_LOG=pipeline_import_cli=debug`) to see every request.

use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Options for the log output.
#[derive(Debug, Clone, Copy)]
pub struct LogConfig {
    /// Default level used when `RUST_LOG` is unset.
    pub level: Level,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { level: Level::WARN }
    }
}

/// Install the global subscriber. Call once, early in `main`.
pub fn init(config: LogConfig) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "pipeline_import_cli={}",
            config.level.as_str().to_lowercase()
        ))
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(false),
        )
        .init();
}
