use std::thread::{self, ThreadId};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};

use crate::core_invariants::require_thread;
use crate::engine_thread::EngineCtx;
use crate::error::{EngineError, EngineResult};

/// Deferred unit of work executed on the engine thread.
pub type Action = Box<dyn FnOnce(&mut EngineCtx<'_>) + Send + 'static>;

/// Producer side of the engine action queue. Cheap to clone, usable from any thread.
#[derive(Clone)]
pub struct Dispatcher {
    tx: Sender<Action>,
}

impl Dispatcher {
    /// Non-blocking. Fails only once the engine side is gone.
    #[inline]
    pub fn enqueue<F>(&self, action: F) -> EngineResult<()>
    where
        F: FnOnce(&mut EngineCtx<'_>) + Send + 'static,
    {
        self.tx
            .send(Box::new(action))
            .map_err(|_| EngineError::DispatcherClosed)
    }

    /// Number of actions waiting for the next drain.
    #[inline]
    pub fn pending(&self) -> usize {
        self.tx.len()
    }
}

/// Consumer side. Owned by the engine loop and bound to its thread on first use.
pub struct ActionQueue {
    rx: Receiver<Action>,
    owner: Option<ThreadId>,
}

/// One FIFO queue: actions enqueued before the engine thread exists are kept for its first drain.
pub fn channel() -> (Dispatcher, ActionQueue) {
    let (tx, rx) = unbounded();
    (Dispatcher { tx }, ActionQueue { rx, owner: None })
}

impl ActionQueue {
    /// Binds the queue to the calling thread. Drains from any other thread are fatal.
    pub fn bind_to_current_thread(&mut self) {
        self.owner = Some(thread::current().id());
    }

    #[inline]
    fn check_owner(&self) {
        require_thread(self.owner, "action queue drained off the engine thread");
    }

    /// Runs the actions that were pending when the drain began, in FIFO order.
    ///
    /// Actions enqueued while draining (including by the running actions) wait for the next drain.
    pub fn drain(&mut self, ctx: &mut EngineCtx<'_>) -> usize {
        self.check_owner();

        let pending = self.rx.len();
        let mut ran = 0usize;
        for _ in 0..pending {
            match self.rx.try_recv() {
                Ok(action) => {
                    action(ctx);
                    ran += 1;
                }
                Err(_) => break,
            }
        }
        ran
    }

    /// Waits up to `timeout` for work, then drains. Used while stepping is paused.
    pub fn drain_blocking(&mut self, ctx: &mut EngineCtx<'_>, timeout: Duration) -> usize {
        self.check_owner();

        match self.rx.recv_timeout(timeout) {
            Ok(first) => {
                first(ctx);
                1 + self.drain(ctx)
            }
            Err(RecvTimeoutError::Timeout) => 0,
            // Every dispatcher was dropped; the bridge is gone.
            Err(RecvTimeoutError::Disconnected) => {
                ctx.request_stop();
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::engine_thread::testing::{with_ctx, NullNative};

    #[test]
    fn actions_run_in_fifo_order() {
        let (d, mut q) = channel();
        q.bind_to_current_thread();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..5 {
            let seen = seen.clone();
            d.enqueue(move |_| seen.lock().push(i)).unwrap();
        }

        let ran = with_ctx(&d, &mut NullNative, |ctx| q.drain(ctx));
        assert_eq!(ran, 5);
        assert_eq!(*seen.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn actions_enqueued_while_draining_wait_for_next_drain() {
        let (d, mut q) = channel();
        q.bind_to_current_thread();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s = seen.clone();
        d.enqueue(move |ctx| {
            s.lock().push("outer");
            let s2 = s.clone();
            ctx.dispatcher()
                .enqueue(move |_| s2.lock().push("inner"))
                .unwrap();
        })
        .unwrap();

        assert_eq!(with_ctx(&d, &mut NullNative, |ctx| q.drain(ctx)), 1);
        assert_eq!(*seen.lock(), vec!["outer"]);
        assert_eq!(with_ctx(&d, &mut NullNative, |ctx| q.drain(ctx)), 1);
        assert_eq!(*seen.lock(), vec!["outer", "inner"]);
    }

    #[test]
    fn enqueue_fails_once_engine_side_is_gone() {
        let (d, q) = channel();
        drop(q);
        assert!(matches!(d.enqueue(|_| {}), Err(EngineError::DispatcherClosed)));
    }

    #[test]
    fn blocking_drain_times_out_empty() {
        let (d, mut q) = channel();
        q.bind_to_current_thread();
        let ran = with_ctx(&d, &mut NullNative, |ctx| {
            q.drain_blocking(ctx, Duration::from_millis(5))
        });
        assert_eq!(ran, 0);
    }

    #[test]
    #[should_panic(expected = "action queue drained off the engine thread")]
    fn drain_from_unbound_thread_is_fatal() {
        let (d, mut q) = channel();
        with_ctx(&d, &mut NullNative, |ctx| q.drain(ctx));
    }
}
