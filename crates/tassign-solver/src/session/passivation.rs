//! Idle tracking and single-flight activation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Tracks when a session was last used and serializes its activations.
///
/// The last-used timestamp has its own lock so idle checks never wait on
/// the model lock.
#[derive(Debug)]
pub struct PassivationManager {
    last_used: Mutex<Instant>,
    activation: Mutex<()>,
    activations: AtomicUsize,
    idle_threshold: Option<Duration>,
}

impl PassivationManager {
    pub fn new(idle_threshold: Option<Duration>) -> Self {
        Self {
            last_used: Mutex::new(Instant::now()),
            activation: Mutex::new(()),
            activations: AtomicUsize::new(0),
            idle_threshold,
        }
    }

    pub fn touch(&self) {
        *self.last_used.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
    }

    pub fn last_used(&self) -> Instant {
        *self.last_used.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn time_from_last_used(&self) -> Duration {
        self.last_used().elapsed()
    }

    pub fn idle_threshold(&self) -> Option<Duration> {
        self.idle_threshold
    }

    /// Whether the idle threshold has elapsed. Always false when disabled.
    pub fn is_idle(&self) -> bool {
        self.idle_threshold
            .is_some_and(|threshold| self.time_from_last_used() >= threshold)
    }

    /// Held while activating, passivating or restoring.
    pub(super) fn lock(&self) -> MutexGuard<'_, ()> {
        self.activation.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(super) fn record_activation(&self) {
        self.activations.fetch_add(1, Ordering::AcqRel);
    }

    /// Number of activations performed so far.
    pub fn activations(&self) -> usize {
        self.activations.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_threshold() {
        let disabled = PassivationManager::new(None);
        assert!(!disabled.is_idle());

        let manager = PassivationManager::new(Some(Duration::from_millis(5)));
        assert!(!manager.is_idle());
        std::thread::sleep(Duration::from_millis(10));
        assert!(manager.is_idle());
        manager.touch();
        assert!(!manager.is_idle());
    }

    #[test]
    fn test_activation_counter() {
        let manager = PassivationManager::new(None);
        {
            let _guard = manager.lock();
            manager.record_activation();
        }
        assert_eq!(manager.activations(), 1);
    }
}
