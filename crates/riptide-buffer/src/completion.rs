//! One-shot completion signals for asynchronous I/O requests.
//!
//! A [`Completion`] is created per request and handed to the I/O backend;
//! the backend posts it exactly once, with or without an error. Producers
//! can wait three ways:
//!
//! - blocking [`Completion::wait`] (mutex + condvar),
//! - non-blocking [`Completion::try_wait`] (atomic flag), used by the batch
//!   state machine's polling phase,
//! - waker registration through [`Completion::poll`], which backs the
//!   `Future` implementations in this crate.

use std::sync::atomic::{AtomicU8, Ordering};
use std::task::{Context, Poll, Waker};

use parking_lot::{Condvar, Mutex};

use crate::disk::{IoError, IoResult};

const PENDING: u8 = 0;
const COMPLETE: u8 = 1;

struct Inner {
    error: Option<IoError>,
    wakers: Vec<Waker>,
}

/// A one-shot completion signal.
///
/// Posted exactly once by the I/O side; observable any number of times by
/// waiters. The completed flag is an atomic so the hot `try_wait` probe
/// never takes the lock.
pub struct Completion {
    state: AtomicU8,
    inner: Mutex<Inner>,
    condvar: Condvar,
}

impl Completion {
    /// Creates a pending completion.
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(PENDING),
            inner: Mutex::new(Inner {
                error: None,
                wakers: Vec::new(),
            }),
            condvar: Condvar::new(),
        }
    }

    /// Posts success. Wakes all blocking and task waiters.
    pub fn post(&self) {
        self.finish(None);
    }

    /// Posts failure. Wakes all blocking and task waiters.
    pub fn post_error(&self, error: IoError) {
        self.finish(Some(error));
    }

    fn finish(&self, error: Option<IoError>) {
        let wakers = {
            let mut inner = self.inner.lock();
            debug_assert_eq!(
                self.state.load(Ordering::Relaxed),
                PENDING,
                "completion posted twice"
            );
            inner.error = error;
            // Publish under the lock so a waiter that observes COMPLETE also
            // observes the error slot.
            self.state.store(COMPLETE, Ordering::Release);
            std::mem::take(&mut inner.wakers)
        };
        self.condvar.notify_all();
        for waker in wakers {
            waker.wake();
        }
    }

    /// Returns true once the request has been posted.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.state.load(Ordering::Acquire) == COMPLETE
    }

    /// Non-blocking probe: `None` while pending, the outcome once posted.
    pub fn try_wait(&self) -> Option<IoResult<()>> {
        if self.is_complete() {
            Some(self.outcome())
        } else {
            None
        }
    }

    /// Blocks until the request is posted and returns its outcome.
    pub fn wait(&self) -> IoResult<()> {
        if self.is_complete() {
            return self.outcome();
        }
        let mut inner = self.inner.lock();
        while self.state.load(Ordering::Acquire) != COMPLETE {
            self.condvar.wait(&mut inner);
        }
        drop(inner);
        self.outcome()
    }

    /// Task-based wait: registers the context's waker while pending.
    pub fn poll(&self, cx: &mut Context<'_>) -> Poll<IoResult<()>> {
        if self.is_complete() {
            return Poll::Ready(self.outcome());
        }
        let mut inner = self.inner.lock();
        // Re-check under the lock so a post between the probe and the lock
        // cannot strand the waker.
        if self.state.load(Ordering::Acquire) == COMPLETE {
            drop(inner);
            return Poll::Ready(self.outcome());
        }
        if !inner.wakers.iter().any(|w| w.will_wake(cx.waker())) {
            inner.wakers.push(cx.waker().clone());
        }
        Poll::Pending
    }

    fn outcome(&self) -> IoResult<()> {
        match &self.inner.lock().error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

impl Default for Completion {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("complete", &self.is_complete())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_try_wait_pending() {
        let c = Completion::new();
        assert!(c.try_wait().is_none());
        assert!(!c.is_complete());
    }

    #[test]
    fn test_post_then_wait() {
        let c = Completion::new();
        c.post();
        assert!(c.is_complete());
        assert!(c.wait().is_ok());
        assert!(c.try_wait().unwrap().is_ok());
    }

    #[test]
    fn test_post_error() {
        let c = Completion::new();
        c.post_error(IoError::ShortWrite {
            expected: 10,
            actual: 3,
        });
        let err = c.wait().unwrap_err();
        assert!(matches!(err, IoError::ShortWrite { .. }));
        // The outcome is repeatable.
        assert!(c.wait().is_err());
    }

    #[test]
    fn test_blocking_wait_across_threads() {
        let c = Arc::new(Completion::new());
        let poster = Arc::clone(&c);

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            poster.post();
        });

        assert!(c.wait().is_ok());
        handle.join().unwrap();
    }

    #[test]
    fn test_many_waiters() {
        let c = Arc::new(Completion::new());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let c = Arc::clone(&c);
            handles.push(thread::spawn(move || c.wait().is_ok()));
        }
        thread::sleep(Duration::from_millis(10));
        c.post();
        for handle in handles {
            assert!(handle.join().unwrap());
        }
    }

    #[test]
    fn test_poll_wakes_task() {
        use std::task::Wake;

        struct ThreadWaker(thread::Thread);
        impl Wake for ThreadWaker {
            fn wake(self: Arc<Self>) {
                self.0.unpark();
            }
        }

        let c = Arc::new(Completion::new());
        let poster = Arc::clone(&c);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            poster.post();
        });

        let waker = Waker::from(Arc::new(ThreadWaker(thread::current())));
        let mut cx = Context::from_waker(&waker);
        let result = loop {
            match c.poll(&mut cx) {
                Poll::Ready(result) => break result,
                Poll::Pending => thread::park_timeout(Duration::from_secs(5)),
            }
        };

        assert!(result.is_ok());
        handle.join().unwrap();
    }
}
