use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling::daily};
use tracing_subscriber::{fmt, layer::Layer as LayerTrait, registry::LookupSpan};

use crate::logging::config::{LogFormat, LoggingConfig};

/// Файловый слой с ежедневной ротацией.
///
/// Запись идёт через фоновый поток; возвращённый guard нужно держать,
/// пока логирование активно.
pub fn layer_with_config<S>(
    config: &LoggingConfig
) -> (Box<dyn LayerTrait<S> + Send + Sync>, WorkerGuard)
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    let appender = daily(&config.log_dir, &config.file.filename);
    let (writer, guard) = non_blocking(appender);

    let layer: Box<dyn LayerTrait<S> + Send + Sync> = match config.format {
        LogFormat::Json => Box::new(
            fmt::layer()
                .event_format(fmt::format().json().with_current_span(true))
                .with_ansi(false)
                .with_writer(writer),
        ),
        LogFormat::Pretty | LogFormat::Compact => Box::new(
            fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(writer),
        ),
    };

    (layer, guard)
}
