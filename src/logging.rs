// Logging initialisation for applications embedding this crate.
//
// Installs a global tracing subscriber with two sinks:
//   - stdout, colourised, for terminals and container logs
//   - a plain-text file under `log_dir` for post-mortem digging
//
// Level filtering follows `RUST_LOG`; the default keeps this crate at
// `info` and mutes the HTTP stack's chatter. Use `RUST_LOG=fleetlink=debug`
// to watch individual polls and dispatches.

use std::path::Path;

use tracing_appender::non_blocking;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// The returned [`WorkerGuard`] owns the file writer's flush thread; hold it
// for the whole program lifetime or tail-end log lines are lost.
pub fn init(log_dir: impl AsRef<Path>) -> non_blocking::WorkerGuard {
    let file_appender = tracing_appender::rolling::never(log_dir, "fleetlink.log");
    let (file_writer, guard) = non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hyper=warn,reqwest=warn,h2=warn"));

    let stdout_layer = fmt::layer().with_target(true).with_ansi(true);
    let file_layer = fmt::layer()
        .with_target(true)
        .with_ansi(false)
        .with_writer(file_writer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    guard
}
