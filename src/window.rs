//! ==============================================================================
//! window.rs - fixed-capacity lookback window
//! ==============================================================================
//!
//! purpose:
//!     the ingestion worker is the only writer. the /api handler reads the
//!     fill level from another task, so every access goes through one mutex.
//!
//! ==============================================================================

use crate::domain::FeatureVector;
use crate::error::ConfigError;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
pub struct SlidingWindow {
    capacity: usize,
    inner: Mutex<VecDeque<FeatureVector>>,
}

impl SlidingWindow {
    pub fn new(capacity: usize) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::Invalid(
                "lookback window capacity must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            capacity,
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
        })
    }

    /// a panic while holding the lock cannot leave the deque half-updated,
    /// so a poisoned lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, VecDeque<FeatureVector>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn push(&self, vector: FeatureVector) {
        let mut buf = self.lock();
        Self::push_locked(&mut buf, self.capacity, vector);
    }

    /// ordered copy of the current contents, oldest first
    pub fn snapshot(&self) -> Vec<FeatureVector> {
        self.lock().iter().copied().collect()
    }

    /// append and copy out under one lock acquisition, so the snapshot is
    /// exactly the window as it stood right after this push
    pub fn push_and_snapshot(&self, vector: FeatureVector) -> Vec<FeatureVector> {
        let mut buf = self.lock();
        Self::push_locked(&mut buf, self.capacity, vector);
        buf.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.capacity
    }

    fn push_locked(buf: &mut VecDeque<FeatureVector>, capacity: usize, vector: FeatureVector) {
        if buf.len() == capacity {
            buf.pop_front();
        }
        buf.push_back(vector);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FEATURE_COUNT;
    use proptest::prelude::*;

    fn vector(tag: f64) -> FeatureVector {
        FeatureVector([tag; FEATURE_COUNT])
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(SlidingWindow::new(0).is_err());
    }

    #[test]
    fn fills_then_evicts_oldest() {
        let window = SlidingWindow::new(3).unwrap();
        assert!(window.is_empty());

        window.push(vector(1.0));
        window.push(vector(2.0));
        assert_eq!(window.snapshot(), vec![vector(1.0), vector(2.0)]);
        assert!(!window.is_full());

        window.push(vector(3.0));
        assert!(window.is_full());

        let snap = window.push_and_snapshot(vector(4.0));
        assert_eq!(snap, vec![vector(2.0), vector(3.0), vector(4.0)]);
        assert_eq!(window.len(), 3);
    }

    #[test]
    fn snapshot_does_not_mutate() {
        let window = SlidingWindow::new(2).unwrap();
        window.push(vector(1.0));
        let _ = window.snapshot();
        let _ = window.snapshot();
        assert_eq!(window.len(), 1);
    }

    proptest! {
        #[test]
        fn holds_most_recent_in_arrival_order(capacity in 1usize..40, pushes in 0usize..120) {
            let window = SlidingWindow::new(capacity).unwrap();
            for i in 0..pushes {
                window.push(vector(i as f64));
                prop_assert!(window.len() <= capacity);
            }

            let expected: Vec<_> = (pushes.saturating_sub(capacity)..pushes)
                .map(|i| vector(i as f64))
                .collect();
            prop_assert_eq!(window.snapshot(), expected);
            prop_assert_eq!(window.len(), pushes.min(capacity));
        }
    }
}
