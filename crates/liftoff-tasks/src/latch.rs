//! Countdown rendezvous.

use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

/// A latch that opens once its count reaches zero. Waiters block until then.
#[derive(Debug)]
pub struct CountDownLatch {
    count: Mutex<usize>,
    opened: Condvar,
}

impl CountDownLatch {
    /// Create a latch expecting `count` events
    pub fn new(count: usize) -> Self {
        Self {
            count: Mutex::new(count),
            opened: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, usize> {
        self.count.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record one event. Returns true for the call that opened the latch.
    pub fn count_down(&self) -> bool {
        let mut count = self.lock();
        if *count == 0 {
            return false;
        }
        *count -= 1;
        if *count == 0 {
            self.opened.notify_all();
            return true;
        }
        false
    }

    /// Open the latch regardless of outstanding events. Returns true if
    /// this call opened it.
    pub fn release(&self) -> bool {
        let mut count = self.lock();
        if *count == 0 {
            return false;
        }
        *count = 0;
        self.opened.notify_all();
        true
    }

    /// Outstanding events
    pub fn count(&self) -> usize {
        *self.lock()
    }

    /// Whether the latch has opened
    pub fn is_open(&self) -> bool {
        self.count() == 0
    }

    /// Block until the latch opens
    pub fn wait(&self) {
        let guard = self.lock();
        let _guard = self
            .opened
            .wait_while(guard, |count| *count > 0)
            .unwrap_or_else(|e| e.into_inner());
    }

    /// Block until the latch opens or `timeout` elapses. Returns whether it
    /// opened.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let guard = self.lock();
        let (guard, _) = self
            .opened
            .wait_timeout_while(guard, timeout, |count| *count > 0)
            .unwrap_or_else(|e| e.into_inner());
        *guard == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_zero_latch_is_open() {
        let latch = CountDownLatch::new(0);
        assert!(latch.is_open());
        assert!(!latch.count_down());
        latch.wait();
    }

    #[test]
    fn test_count_down_opens_once() {
        let latch = CountDownLatch::new(2);
        assert!(!latch.count_down());
        assert!(!latch.is_open());
        assert!(latch.count_down());
        assert!(latch.is_open());
        assert!(!latch.count_down());
    }

    #[test]
    fn test_release_opens_early() {
        let latch = CountDownLatch::new(3);
        assert!(latch.release());
        assert!(latch.is_open());
        assert!(!latch.release());
    }

    #[test]
    fn test_wait_timeout_expires() {
        let latch = CountDownLatch::new(1);
        assert!(!latch.wait_timeout(Duration::from_millis(20)));
    }

    #[test]
    fn test_waiter_wakes_from_other_thread() {
        let latch = Arc::new(CountDownLatch::new(3));
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let latch = latch.clone();
                thread::spawn(move || {
                    latch.count_down();
                })
            })
            .collect();

        assert!(latch.wait_timeout(Duration::from_secs(5)));
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(latch.count(), 0);
    }
}
