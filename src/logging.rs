use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, Registry, fmt, layer::SubscriberExt, reload, util::SubscriberInitExt};

use crate::config::LogLevel;

/// Lets the filter follow the configured log level once settings are known.
pub struct LogHandle {
    handle: reload::Handle<EnvFilter, Registry>,
    from_env: bool,
}

/// Installs a stderr subscriber at `warn`, or at `RUST_LOG` when that is set.
pub fn init() -> LogHandle {
    let (filter, from_env) = match EnvFilter::try_from_default_env() {
        Ok(filter) => (filter, true),
        Err(_) => (filter_for(LevelFilter::WARN), false),
    };
    let (filter, handle) = reload::Layer::new(filter);
    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .compact()
                .with_writer(std::io::stderr),
        )
        .try_init()
        .unwrap_or_else(|e| {
            // an existing global subscriber keeps receiving events
            tracing::warn!(error = %e, "logging was already initialized");
        });
    LogHandle { handle, from_env }
}

impl LogHandle {
    pub fn apply(&self, level: LogLevel) {
        if self.from_env {
            return;
        }
        if let Err(e) = self.handle.reload(filter_for(level.level_filter())) {
            tracing::warn!(error = %e, "failed to apply configured log level");
        }
    }
}

fn filter_for(level: LevelFilter) -> EnvFilter {
    EnvFilter::new(directives(level))
}

fn directives(level: LevelFilter) -> String {
    // HTTP internals stay at warn unless the whole app is quieter
    let deps = level.min(LevelFilter::WARN);
    format!("{level},hyper={deps},reqwest={deps},rustls={deps}")
}
