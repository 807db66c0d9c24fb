//! Subscriber setup: env filter, daily rolling file, optional console.

use std::path::Path;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use lokiwatch_core::config::LoggingConfig;

/// Install the global subscriber.
///
/// The returned guard flushes the file writer on drop and must be held
/// for the life of the process.
pub fn init(config: &LoggingConfig) -> anyhow::Result<WorkerGuard> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)?,
    };
    let (writer, guard) = file_writer(&config.dir, &config.file_prefix, config.max_files)?;

    let file_layer = fmt::layer().with_writer(writer).with_ansi(false);
    let file_layer = if config.json {
        file_layer.json().boxed()
    } else {
        file_layer.boxed()
    };

    let console_layer = config.console.then(|| {
        let layer = fmt::layer().with_target(true);
        if config.json { layer.json().boxed() } else { layer.boxed() }
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()?;

    Ok(guard)
}

/// Non-blocking writer over a daily rolling file in `dir`, keeping at
/// most `max_files` files.
pub fn file_writer(dir: &Path, prefix: &str, max_files: usize) -> anyhow::Result<(NonBlocking, WorkerGuard)> {
    std::fs::create_dir_all(dir)?;
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix)
        .max_log_files(max_files)
        .build(dir)?;
    Ok(tracing_appender::non_blocking(appender))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn file_writer_creates_log_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("nested").join("logs");

        let (mut writer, guard) = file_writer(&dir, "lokiwatch.log", 5).unwrap();
        writer.write_all(b"hello\n").unwrap();
        drop(guard);

        let files: Vec<_> = std::fs::read_dir(&dir).unwrap().collect();
        assert_eq!(files.len(), 1);
        let name = files[0].as_ref().unwrap().file_name();
        assert!(name.to_string_lossy().starts_with("lokiwatch.log"));
    }
}
