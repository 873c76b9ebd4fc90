use tracing::{Level, info};
use tracing_subscriber::{
    EnvFilter,
    fmt::{Layer, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Filter directives: everything at `warn`, the exporter at `log_level` and the
/// scheduler at its own level.
pub fn filter_directives(log_level: Level, scheduler_log_level: Level) -> String {
    format!("warn,es_exporter={log_level},es_exporter::scheduler={scheduler_log_level}")
}

/// Installs the global `tracing` subscriber.
pub fn init(log_level: Level, scheduler_log_level: Level) {
    let mut fmt_layer = Layer::new()
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(std::env::var("NO_COLOR").is_err());

    match log_level {
        Level::DEBUG => fmt_layer = fmt_layer.with_file(true).with_line_number(true),
        Level::TRACE => {
            fmt_layer = fmt_layer
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_file(true)
                .with_line_number(true)
        }
        _ => {}
    }

    let filter = EnvFilter::new(filter_directives(log_level, scheduler_log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();

    info!(
        event.name = "system.logging_initialized",
        system.log_level = %log_level,
        system.scheduler_log_level = %scheduler_log_level,
        "logging initialized"
    );
}
