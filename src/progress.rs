//! Progress reporting and cancellation.
//!
//! Extraction and archive creation report progress through the
//! [`ProgressReporter`] trait. Progress is delivered synchronously from inside
//! the blocking engine call. Returning `false` from
//! [`ProgressReporter::on_progress`] cancels the operation, which then fails
//! with [`ErrorCode::OperationCancelled`](crate::ErrorCode::OperationCancelled).
//!
//! # Example
//!
//! ```rust,no_run
//! use szbridge::{ArchiveReader, progress::progress_fn};
//!
//! let mut reader = ArchiveReader::open("data.7z")?;
//! reader.set_progress(progress_fn(|done, total| {
//!     println!("{done}/{total}");
//!     true
//! }));
//! reader.extract_all("out")?;
//! # Ok::<(), szbridge::Error>(())
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Receives progress notifications from archive operations.
pub trait ProgressReporter: Send {
    /// Called once with the total number of bytes the operation will process.
    fn on_total(&mut self, total_bytes: u64) {
        let _ = total_bytes;
    }

    /// Called as bytes are processed.
    ///
    /// Returns `true` to continue or `false` to cancel.
    fn on_progress(&mut self, completed_bytes: u64, total_bytes: u64) -> bool {
        let _ = (completed_bytes, total_bytes);
        true
    }

    /// Called before an item is processed.
    fn on_item_start(&mut self, path: &str, size: u64) {
        let _ = (path, size);
    }

    /// Called after an item has been processed.
    fn on_item_complete(&mut self, path: &str, success: bool) {
        let _ = (path, success);
    }

    /// Polled between items; `true` cancels before the next item starts.
    fn should_cancel(&self) -> bool {
        false
    }
}

impl<P: ProgressReporter + ?Sized> ProgressReporter for Box<P> {
    fn on_total(&mut self, total_bytes: u64) {
        (**self).on_total(total_bytes);
    }

    fn on_progress(&mut self, completed_bytes: u64, total_bytes: u64) -> bool {
        (**self).on_progress(completed_bytes, total_bytes)
    }

    fn on_item_start(&mut self, path: &str, size: u64) {
        (**self).on_item_start(path, size);
    }

    fn on_item_complete(&mut self, path: &str, success: bool) {
        (**self).on_item_complete(path, success);
    }

    fn should_cancel(&self) -> bool {
        (**self).should_cancel()
    }
}

/// A reporter that ignores all notifications.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {}

/// Forwards to an inner reporter at most once per interval.
///
/// The final notification (completed >= total) is always forwarded.
pub struct ThrottledProgress<P> {
    inner: P,
    min_interval: Duration,
    last_callback: Option<Instant>,
}

impl<P: ProgressReporter> ThrottledProgress<P> {
    /// Wraps `inner`, forwarding progress at most every `min_interval`.
    pub fn new(inner: P, min_interval: Duration) -> Self {
        Self {
            inner,
            min_interval,
            last_callback: None,
        }
    }

    /// Returns the inner reporter.
    pub fn into_inner(self) -> P {
        self.inner
    }
}

impl<P: ProgressReporter> ProgressReporter for ThrottledProgress<P> {
    fn on_total(&mut self, total_bytes: u64) {
        self.inner.on_total(total_bytes);
    }

    fn on_progress(&mut self, completed_bytes: u64, total_bytes: u64) -> bool {
        let now = Instant::now();
        let due = self
            .last_callback
            .is_none_or(|last| now.duration_since(last) >= self.min_interval);
        if due || completed_bytes >= total_bytes {
            self.last_callback = Some(now);
            self.inner.on_progress(completed_bytes, total_bytes)
        } else {
            !self.inner.should_cancel()
        }
    }

    fn on_item_start(&mut self, path: &str, size: u64) {
        self.inner.on_item_start(path, size);
    }

    fn on_item_complete(&mut self, path: &str, success: bool) {
        self.inner.on_item_complete(path, success);
    }

    fn should_cancel(&self) -> bool {
        self.inner.should_cancel()
    }
}

/// Progress counters readable from other threads, with an external cancel
/// switch.
///
/// Share it with `Arc` and hand a clone to the reader or writer:
///
/// ```rust
/// use std::sync::Arc;
/// use szbridge::progress::{AtomicProgress, ProgressReporter};
///
/// let shared = AtomicProgress::shared();
/// let mut reporter = Arc::clone(&shared);
/// reporter.on_total(10);
/// shared.cancel();
/// assert!(!reporter.on_progress(5, 10));
/// ```
#[derive(Debug)]
pub struct AtomicProgress {
    total_bytes: AtomicU64,
    completed_bytes: AtomicU64,
    items_completed: AtomicU64,
    cancelled: AtomicBool,
}

impl Default for AtomicProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl AtomicProgress {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self {
            total_bytes: AtomicU64::new(0),
            completed_bytes: AtomicU64::new(0),
            items_completed: AtomicU64::new(0),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Creates shareable counters.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Total bytes announced by the operation.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes.load(Ordering::Relaxed)
    }

    /// Bytes processed so far.
    pub fn completed_bytes(&self) -> u64 {
        self.completed_bytes.load(Ordering::Relaxed)
    }

    /// Items finished so far, successful or not.
    pub fn items_completed(&self) -> u64 {
        self.items_completed.load(Ordering::Relaxed)
    }

    /// Returns whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Requests cancellation of the running operation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Completion percentage in `0.0..=100.0`.
    pub fn percentage(&self) -> f64 {
        match self.total_bytes() {
            0 => 0.0,
            total => self.completed_bytes() as f64 / total as f64 * 100.0,
        }
    }

    fn record_total(&self, total: u64) {
        self.total_bytes.store(total, Ordering::Relaxed);
    }

    fn record_progress(&self, completed: u64) -> bool {
        self.completed_bytes.store(completed, Ordering::Relaxed);
        !self.is_cancelled()
    }

    fn record_item(&self) {
        self.items_completed.fetch_add(1, Ordering::Relaxed);
    }
}

impl ProgressReporter for Arc<AtomicProgress> {
    fn on_total(&mut self, total_bytes: u64) {
        self.record_total(total_bytes);
    }

    fn on_progress(&mut self, completed_bytes: u64, _total_bytes: u64) -> bool {
        self.record_progress(completed_bytes)
    }

    fn on_item_complete(&mut self, _path: &str, _success: bool) {
        self.record_item();
    }

    fn should_cancel(&self) -> bool {
        self.is_cancelled()
    }
}

/// A reporter backed by a closure receiving `(completed, total)`.
pub struct ClosureProgress<F> {
    callback: F,
}

impl<F> ProgressReporter for ClosureProgress<F>
where
    F: FnMut(u64, u64) -> bool + Send,
{
    fn on_progress(&mut self, completed_bytes: u64, total_bytes: u64) -> bool {
        (self.callback)(completed_bytes, total_bytes)
    }
}

/// Creates a reporter from a closure; return `false` to cancel.
pub fn progress_fn<F>(f: F) -> ClosureProgress<F>
where
    F: FnMut(u64, u64) -> bool + Send,
{
    ClosureProgress { callback: f }
}

/// Running byte counter that feeds a reporter and turns a `false` answer into
/// a cancellation error.
pub(crate) struct ProgressTracker<'a> {
    reporter: Option<&'a mut (dyn ProgressReporter + 'static)>,
    total: u64,
    completed: u64,
    cancelled: bool,
}

impl<'a> ProgressTracker<'a> {
    pub(crate) fn new(reporter: Option<&'a mut (dyn ProgressReporter + 'static)>) -> Self {
        Self {
            reporter,
            total: 0,
            completed: 0,
            cancelled: false,
        }
    }

    pub(crate) fn set_total(&mut self, total: u64) {
        self.total = total;
        if let Some(r) = self.reporter.as_deref_mut() {
            r.on_total(total);
        }
    }

    pub(crate) fn total(&self) -> u64 {
        self.total
    }

    pub(crate) fn completed(&self) -> u64 {
        self.completed
    }

    /// Sets the absolute completed count and asks the reporter whether to go on.
    pub(crate) fn set_completed(&mut self, completed: u64) -> crate::Result<()> {
        self.completed = completed;
        let keep_going = match self.reporter.as_deref_mut() {
            Some(r) => r.on_progress(completed, self.total.max(completed)),
            None => true,
        };
        if keep_going && !self.cancelled {
            Ok(())
        } else {
            self.cancelled = true;
            Err(crate::Error::Cancelled)
        }
    }

    pub(crate) fn advance(&mut self, delta: u64) -> crate::Result<()> {
        self.set_completed(self.completed.saturating_add(delta))
    }

    pub(crate) fn item_start(&mut self, path: &str, size: u64) -> crate::Result<()> {
        if let Some(r) = self.reporter.as_deref_mut() {
            if r.should_cancel() {
                self.cancelled = true;
                return Err(crate::Error::Cancelled);
            }
            r.on_item_start(path, size);
        }
        Ok(())
    }

    pub(crate) fn item_complete(&mut self, path: &str, success: bool) {
        if let Some(r) = self.reporter.as_deref_mut() {
            r.on_item_complete(path, success);
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_progress_never_cancels() {
        let mut progress = NoProgress;
        assert!(progress.on_progress(50, 100));
        assert!(!progress.should_cancel());
    }

    #[test]
    fn test_throttled_forwards_first_and_last() {
        let mut calls = 0;
        {
            let inner = progress_fn(|_, _| {
                calls += 1;
                true
            });
            let mut throttled = ThrottledProgress::new(inner, Duration::from_secs(60));
            assert!(throttled.on_progress(10, 100));
            assert!(throttled.on_progress(20, 100));
            assert!(throttled.on_progress(100, 100));
        }
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_atomic_progress_cancel() {
        let shared = AtomicProgress::shared();
        let mut reporter = Arc::clone(&shared);
        reporter.on_total(1000);
        assert!(reporter.on_progress(500, 1000));
        assert_eq!(shared.completed_bytes(), 500);
        assert!((shared.percentage() - 50.0).abs() < 0.001);
        reporter.on_item_complete("a", true);
        assert_eq!(shared.items_completed(), 1);

        shared.cancel();
        assert!(!reporter.on_progress(600, 1000));
        assert!(reporter.should_cancel());
    }

    #[test]
    fn test_tracker_turns_false_into_cancelled() {
        let mut reporter = progress_fn(|done, _| done < 10);
        let mut tracker = ProgressTracker::new(Some(&mut reporter));
        tracker.set_total(20);
        assert!(tracker.advance(5).is_ok());
        let err = tracker.advance(5).unwrap_err();
        assert!(err.is_cancelled());
        assert!(tracker.is_cancelled());
        // Stays cancelled even if the reporter would continue.
        assert!(tracker.set_completed(0).is_err());
    }

    #[test]
    fn test_tracker_without_reporter() {
        let mut tracker = ProgressTracker::new(None);
        tracker.set_total(3);
        tracker.advance(3).unwrap();
        assert_eq!(tracker.completed(), 3);
        assert_eq!(tracker.total(), 3);
    }
}
