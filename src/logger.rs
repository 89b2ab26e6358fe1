//! Process-global, level-filtered log sink
//!
//! Installs a sink behind the [`log`] crate facade so that the standard
//! `log::info!` / `log::debug!` macros route here. The facade checks the
//! maximum level before formatting arguments, so filtered records never pay
//! the message-construction cost.
//!
//! Each record is written as a single line: `[LEVEL] [HH:MM:SS.mmm] message`.
//! The default sink is stderr; [`set_sink`] redirects it (tests capture
//! output through an in-memory writer). Both `set_level` and `set_sink` are
//! mutex-guarded.

use std::io::Write;
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Log severity levels, ordered Debug < Info < Warning < Error < Silent
///
/// Thresholds are inclusive; `Silent` suppresses all records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    /// Diagnostic detail
    Debug,
    /// Normal operation
    Info,
    /// Unexpected but recoverable
    Warning,
    /// Failures
    Error,
    /// Suppress everything
    Silent,
}

impl LogLevel {
    fn to_filter(self) -> log::LevelFilter {
        match self {
            Self::Debug => log::LevelFilter::Debug,
            Self::Info => log::LevelFilter::Info,
            Self::Warning => log::LevelFilter::Warn,
            Self::Error => log::LevelFilter::Error,
            Self::Silent => log::LevelFilter::Off,
        }
    }
}

struct SinkLogger {
    sink: Mutex<Box<dyn Write + Send>>,
}

impl log::Log for SinkLogger {
    fn enabled(&self, _metadata: &log::Metadata<'_>) -> bool {
        // Level filtering happens through log::max_level before this point.
        true
    }

    fn log(&self, record: &log::Record<'_>) {
        let label = match record.level() {
            log::Level::Error => "ERROR",
            log::Level::Warn => "WARNING",
            log::Level::Info => "INFO",
            log::Level::Debug | log::Level::Trace => "DEBUG",
        };
        let line = format!("[{label}] [{}] {}\n", format_timestamp(), record.args());
        // One write call per record keeps lines atomic across threads.
        let mut sink = self.sink.lock().expect("logger mutex poisoned");
        let _ = sink.write_all(line.as_bytes());
        let _ = sink.flush();
    }

    fn flush(&self) {
        let mut sink = self.sink.lock().expect("logger mutex poisoned");
        let _ = sink.flush();
    }
}

fn global() -> &'static SinkLogger {
    static LOGGER: OnceLock<&'static SinkLogger> = OnceLock::new();
    *LOGGER.get_or_init(|| {
        let logger: &'static SinkLogger = Box::leak(Box::new(SinkLogger {
            sink: Mutex::new(Box::new(std::io::stderr())),
        }));
        // A competing logger installed by the host process is tolerated;
        // level control still works through log::set_max_level.
        let _ = log::set_logger(logger);
        log::set_max_level(LogLevel::Info.to_filter());
        logger
    })
}

/// Install the sink (idempotent) and set the level threshold
pub fn set_level(level: LogLevel) {
    let _ = global();
    log::set_max_level(level.to_filter());
}

/// Redirect log output to `sink`
///
/// The previous sink is dropped. Intended for tests and embedders that
/// capture engine logs.
pub fn set_sink(sink: Box<dyn Write + Send>) {
    let logger = global();
    *logger.sink.lock().expect("logger mutex poisoned") = sink;
}

/// Format the wall-clock time of day as `HH:MM:SS.mmm`
fn format_timestamp() -> String {
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let total_ms = since_epoch.as_millis();
    let ms = total_ms % 1000;
    let total_s = total_ms / 1000;
    let seconds = total_s % 60;
    let minutes = (total_s / 60) % 60;
    let hours = (total_s / 3600) % 24;
    format!("{hours:02}:{minutes:02}:{seconds:02}.{ms:03}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::sync::Arc;

    /// In-memory sink that can be inspected after logging
    #[derive(Clone)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn capture() -> (SharedBuffer, Arc<Mutex<Vec<u8>>>) {
        let storage = Arc::new(Mutex::new(Vec::new()));
        (SharedBuffer(Arc::clone(&storage)), storage)
    }

    #[test]
    #[serial]
    fn test_record_format() {
        let (sink, storage) = capture();
        set_sink(Box::new(sink));
        set_level(LogLevel::Info);

        log::info!("hello world");

        let output = String::from_utf8(storage.lock().unwrap().clone()).unwrap();
        assert!(output.starts_with("[INFO] ["), "got: {output}");
        assert!(output.contains("] hello world\n"));
        // Timestamp shape: HH:MM:SS.mmm
        let ts = output.split('[').nth(2).unwrap();
        assert_eq!(ts.as_bytes()[2], b':');
        assert_eq!(ts.as_bytes()[8], b'.');

        set_sink(Box::new(std::io::stderr()));
    }

    #[test]
    #[serial]
    fn test_level_filtering() {
        let (sink, storage) = capture();
        set_sink(Box::new(sink));
        set_level(LogLevel::Warning);

        log::info!("dropped");
        log::warn!("kept");

        let output = String::from_utf8(storage.lock().unwrap().clone()).unwrap();
        assert!(!output.contains("dropped"));
        assert!(output.contains("[WARNING]"));
        assert!(output.contains("kept"));

        set_level(LogLevel::Info);
        set_sink(Box::new(std::io::stderr()));
    }

    #[test]
    #[serial]
    fn test_silent_suppresses_all() {
        let (sink, storage) = capture();
        set_sink(Box::new(sink));
        set_level(LogLevel::Silent);

        log::error!("even errors");

        assert!(storage.lock().unwrap().is_empty());

        set_level(LogLevel::Info);
        set_sink(Box::new(std::io::stderr()));
    }

    #[test]
    fn test_level_ordering() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Warning);
        assert!(LogLevel::Warning < LogLevel::Error);
        assert!(LogLevel::Error < LogLevel::Silent);
    }
}
