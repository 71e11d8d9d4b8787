// Conversion and update metrics
//
// Lightweight counters shared between the front end and background workers

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Process-wide counters.
///
/// Uses atomic operations so workers on the blocking pool can record without
/// locks. A summary is logged on shutdown.
#[derive(Debug)]
pub struct Metrics {
    /// Jobs that wrote a PDF (single jobs and batch folders alike)
    pub jobs_completed: AtomicUsize,

    /// Jobs that ended in an error message
    pub jobs_failed: AtomicUsize,

    /// Candidate images opened by the validator
    pub images_checked: AtomicUsize,

    /// Candidates skipped as unreadable
    pub images_skipped: AtomicUsize,

    /// Pages written across all PDFs
    pub pages_written: AtomicUsize,

    /// Total time spent inside jobs, in milliseconds
    pub total_job_time_ms: AtomicU64,

    /// Messages posted from workers to the front end
    pub events_posted: AtomicU64,

    /// Release feed checks performed
    pub update_checks: AtomicU64,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            jobs_completed: AtomicUsize::new(0),
            jobs_failed: AtomicUsize::new(0),
            images_checked: AtomicUsize::new(0),
            images_skipped: AtomicUsize::new(0),
            pages_written: AtomicUsize::new(0),
            total_job_time_ms: AtomicU64::new(0),
            events_posted: AtomicU64::new(0),
            update_checks: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a job that produced a PDF with `pages` pages
    pub fn record_job_completed(&self, pages: usize) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
        self.pages_written.fetch_add(pages, Ordering::Relaxed);
    }

    pub fn record_job_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a validation pass over `checked` candidates, `skipped` of them unreadable
    pub fn record_validation(&self, checked: usize, skipped: usize) {
        self.images_checked.fetch_add(checked, Ordering::Relaxed);
        self.images_skipped.fetch_add(skipped, Ordering::Relaxed);
    }

    pub fn record_job_time(&self, duration: Duration) {
        self.total_job_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_event_posted(&self) {
        self.events_posted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_update_check(&self) {
        self.update_checks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average job time in milliseconds over all finished jobs
    pub fn avg_job_time_ms(&self) -> f64 {
        let total = self.total_job_time_ms.load(Ordering::Relaxed);
        let count = self.jobs_completed.load(Ordering::Relaxed)
            + self.jobs_failed.load(Ordering::Relaxed);
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        tracing::info!("=== Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Jobs: {} completed, {} failed (avg: {:.2}ms per job)",
            self.jobs_completed.load(Ordering::Relaxed),
            self.jobs_failed.load(Ordering::Relaxed),
            self.avg_job_time_ms()
        );
        tracing::info!(
            "Images: {} checked, {} skipped, {} pages written",
            self.images_checked.load(Ordering::Relaxed),
            self.images_skipped.load(Ordering::Relaxed),
            self.pages_written.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Events posted: {}, update checks: {}",
            self.events_posted.load(Ordering::Relaxed),
            self.update_checks.load(Ordering::Relaxed)
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new();
        assert_eq!(metrics.jobs_completed.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.jobs_failed.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_record_job_operations() {
        let metrics = Metrics::new();

        metrics.record_job_completed(3);
        metrics.record_job_completed(2);
        metrics.record_job_failed();
        metrics.record_validation(6, 1);

        assert_eq!(metrics.jobs_completed.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.jobs_failed.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.pages_written.load(Ordering::Relaxed), 5);
        assert_eq!(metrics.images_checked.load(Ordering::Relaxed), 6);
        assert_eq!(metrics.images_skipped.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_avg_job_time() {
        let metrics = Metrics::new();
        assert_eq!(metrics.avg_job_time_ms(), 0.0);

        metrics.record_job_completed(1);
        metrics.record_job_time(Duration::from_millis(100));
        metrics.record_job_failed();
        metrics.record_job_time(Duration::from_millis(200));

        assert_eq!(metrics.avg_job_time_ms(), 150.0);
    }

    #[test]
    fn test_uptime() {
        let metrics = Metrics::new();
        thread::sleep(Duration::from_millis(10));
        assert!(metrics.uptime().as_millis() >= 10);
    }
}
