use std::io;
use tracing_appender::rolling;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

pub fn configure_logging() {
    // Stderr log configuration; stdout is reserved for result JSON.
    let stderr_log = fmt::layer().with_writer(io::stderr).with_filter(
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("warn,kb_request=warn,classify=warn,rank=warn")),
    );

    // File log configuration
    let file_appender = rolling::daily("logs", "tether.log");
    let file_log = fmt::layer()
        .with_writer(file_appender)
        .with_filter(EnvFilter::new("info,kb_request=debug,cache=debug"));

    tracing_subscriber::Registry::default()
        .with(stderr_log)
        .with(file_log)
        .init();
}
