use chrono::{DateTime, Local};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info};

use crate::core::error::{SaveError, StoreError};
use crate::utils::time::now_local;

/// Outcome of a finished save
#[derive(Debug, Clone)]
pub struct SaveReport {
    pub saved_at: DateTime<Local>,
}

/// The explicit "save" action with its busy flag
///
/// Saving waits a fixed delay before writing, standing in for a remote
/// call. Only one save runs at a time.
pub struct SaveTracker {
    delay: Duration,
    saving: AtomicBool,
    last_saved: Mutex<Option<DateTime<Local>>>,
}

impl SaveTracker {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            saving: AtomicBool::new(false),
            last_saved: Mutex::new(None),
        }
    }

    pub async fn save<F>(&self, what: &'static str, persist: F) -> Result<SaveReport, SaveError>
    where
        F: FnOnce() -> Result<(), StoreError>,
    {
        if self
            .saving
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SaveError::InProgress);
        }
        let _busy = BusyGuard(&self.saving);

        debug!(what, delay_ms = self.delay.as_millis() as u64, "Saving");
        tokio::time::sleep(self.delay).await;

        persist()?;

        let saved_at = now_local();
        *self.last_saved.lock().unwrap_or_else(PoisonError::into_inner) = Some(saved_at);
        info!(what, saved_at = %saved_at.format("%H:%M:%S"), "Saved");

        Ok(SaveReport { saved_at })
    }

    pub fn is_saving(&self) -> bool {
        self.saving.load(Ordering::Acquire)
    }

    pub fn last_saved(&self) -> Option<DateTime<Local>> {
        *self.last_saved.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears the busy flag however the save ends
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_save_records_timestamp() {
        let tracker = SaveTracker::new(Duration::from_millis(5));
        assert!(tracker.last_saved().is_none());

        let report = tracker.save("keys", || Ok(())).await.unwrap();
        assert_eq!(tracker.last_saved(), Some(report.saved_at));
        assert!(!tracker.is_saving());
    }

    #[tokio::test]
    async fn test_failed_save_clears_flag_and_keeps_timestamp() {
        let tracker = SaveTracker::new(Duration::from_millis(1));
        let err = tracker
            .save("keys", || {
                Err(StoreError::InvalidKey("bad".to_string()))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, SaveError::Store(_)));
        assert!(!tracker.is_saving());
        assert!(tracker.last_saved().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_save_is_rejected() {
        let tracker = Arc::new(SaveTracker::new(Duration::from_millis(200)));

        let background = Arc::clone(&tracker);
        let first = tokio::spawn(async move { background.save("users", || Ok(())).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(tracker.is_saving());
        let second = tracker.save("users", || Ok(())).await;
        assert!(matches!(second, Err(SaveError::InProgress)));

        assert!(first.await.unwrap().is_ok());
        assert!(!tracker.is_saving());
    }

    #[tokio::test]
    async fn test_dropped_save_writes_nothing() {
        let tracker = SaveTracker::new(Duration::from_secs(10));
        let wrote = AtomicBool::new(false);

        let result = tokio::time::timeout(
            Duration::from_millis(10),
            tracker.save("keys", || {
                wrote.store(true, Ordering::SeqCst);
                Ok(())
            }),
        )
        .await;

        assert!(result.is_err());
        assert!(!wrote.load(Ordering::SeqCst));
        assert!(!tracker.is_saving());
    }
}
