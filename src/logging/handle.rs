use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use tracing_appender::non_blocking::WorkerGuard;

/// Счётчики жизненного цикла логирования.
#[derive(Debug, Default)]
pub struct LoggingMetrics {
    pub flush_count: AtomicU64,
    pub shutdown_in_progress: AtomicBool,
}

/// Держит guard файлового писателя до явного `shutdown`.
///
/// Пока guard жив, фоновый поток `tracing-appender` дописывает буфер в файл.
#[derive(Debug)]
pub struct LoggingHandle {
    file_guard: Option<WorkerGuard>,
    pub metrics: Arc<LoggingMetrics>,
    /// Порог, после которого медленное завершение считается проблемой
    flush_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoggingStats {
    pub flush_count: u64,
    pub shutdown_in_progress: bool,
    pub file_sink_active: bool,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl LoggingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_flush(&self) {
        self.flush_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_flush_count(&self) -> u64 {
        self.flush_count.load(Ordering::Relaxed)
    }

    pub fn is_shutdown_in_progress(&self) -> bool {
        self.shutdown_in_progress.load(Ordering::Acquire)
    }

    fn start_shutdown(&self) {
        self.shutdown_in_progress.store(true, Ordering::Release);
    }
}

impl LoggingHandle {
    pub fn new(file_guard: Option<WorkerGuard>) -> Self {
        Self {
            file_guard,
            metrics: Arc::new(LoggingMetrics::new()),
            flush_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_flush_timeout(
        mut self,
        timeout: Duration,
    ) -> Self {
        self.flush_timeout = timeout;
        self
    }

    /// Отмечает запрос сброса. Сам буфер сбрасывается фоновым потоком.
    pub fn flush(&self) {
        self.metrics.record_flush();
        tracing::debug!(
            flush_count = self.metrics.get_flush_count(),
            "Logging flush requested"
        );
    }

    /// Завершает логирование, дожидаясь записи буфера в файл.
    pub fn shutdown(mut self) {
        self.metrics.start_shutdown();
        tracing::info!(
            total_flushes = self.metrics.get_flush_count(),
            "Initiating logging shutdown"
        );

        let start = Instant::now();
        drop(self.file_guard.take());
        let elapsed = start.elapsed();

        if elapsed > self.flush_timeout {
            eprintln!(
                "WARNING: Logging shutdown took {}ms (timeout: {}ms)",
                elapsed.as_millis(),
                self.flush_timeout.as_millis()
            );
        }
    }

    /// Как [`LoggingHandle::shutdown`], но не блокирует рантайм дольше
    /// `timeout`.
    pub async fn shutdown_async(
        mut self,
        timeout: Duration,
    ) {
        self.metrics.start_shutdown();
        tracing::info!(
            timeout_ms = timeout.as_millis(),
            "Async logging shutdown initiated"
        );

        let file_guard = self.file_guard.take();
        match tokio::time::timeout(
            timeout,
            tokio::task::spawn_blocking(move || drop(file_guard)),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => eprintln!("Logging shutdown task panicked: {e}"),
            Err(_) => eprintln!(
                "WARNING: Logging shutdown exceeded timeout of {}ms",
                timeout.as_millis()
            ),
        }
    }

    pub fn get_metrics(&self) -> LoggingStats {
        LoggingStats {
            flush_count: self.metrics.get_flush_count(),
            shutdown_in_progress: self.metrics.is_shutdown_in_progress(),
            file_sink_active: self.file_guard.is_some(),
        }
    }

    pub fn is_shutdown_in_progress(&self) -> bool {
        self.metrics.is_shutdown_in_progress()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl Drop for LoggingHandle {
    fn drop(&mut self) {
        if self.file_guard.is_some() && !self.metrics.is_shutdown_in_progress() {
            eprintln!(
                "WARNING: LoggingHandle dropped without explicit shutdown(). \
                 Some logs may be lost."
            )
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flush_is_counted() {
        let handle = LoggingHandle::new(None);
        handle.flush();
        handle.flush();

        let stats = handle.get_metrics();
        assert_eq!(stats.flush_count, 2);
        assert!(!stats.shutdown_in_progress);
        assert!(!stats.file_sink_active);
        handle.shutdown();
    }

    #[test]
    fn test_shutdown_marks_metrics() {
        let handle = LoggingHandle::new(None).with_flush_timeout(Duration::from_millis(10));
        let metrics = Arc::clone(&handle.metrics);
        handle.shutdown();
        assert!(metrics.is_shutdown_in_progress());
    }

    #[tokio::test]
    async fn test_shutdown_async_releases_guard() {
        let tmp = tempfile::tempdir().unwrap();
        let appender = tracing_appender::rolling::never(tmp.path(), "t.log");
        let (_writer, guard) = tracing_appender::non_blocking(appender);

        let handle = LoggingHandle::new(Some(guard));
        assert!(handle.get_metrics().file_sink_active);

        let metrics = Arc::clone(&handle.metrics);
        handle.shutdown_async(Duration::from_secs(1)).await;
        assert!(metrics.is_shutdown_in_progress());
    }
}
