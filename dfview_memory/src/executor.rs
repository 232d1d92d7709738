use std::{
    future::Future,
    pin::pin,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    task::{Context, Poll},
};

use futures::task::{self, ArcWake};

struct WakeFlag(AtomicBool);

impl ArcWake for WakeFlag {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self.0.store(true, Ordering::Relaxed);
    }
}

/// Run `future` to completion on the current thread.
///
/// Polls cooperatively: whenever the future is pending and no wake-up arrived,
/// `idle` is called to perform deferred work (the vectoriser flushes its
/// queue here) and must return whether it did anything.
///
/// Panics if the future is pending while nothing was woken and `idle` has no
/// work, since no further progress is possible on a single thread.
pub fn drive<F: Future>(future: F, mut idle: impl FnMut() -> bool) -> F::Output {
    let mut future = pin!(future);
    let flag = Arc::new(WakeFlag(AtomicBool::new(false)));
    let waker = task::waker(flag.clone());
    let mut cx = Context::from_waker(&waker);
    loop {
        match future.as_mut().poll(&mut cx) {
            Poll::Ready(value) => return value,
            Poll::Pending => {
                if flag.0.swap(false, Ordering::Relaxed) {
                    continue;
                }
                if idle() {
                    continue;
                }
                panic!("read task is pending but no work is runnable");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::oneshot;

    #[test]
    fn ready_future_completes() {
        assert_eq!(drive(async { 7 }, || false), 7);
    }

    #[test]
    fn idle_work_unblocks() {
        let (tx, rx) = oneshot::channel::<u32>();
        let mut tx = Some(tx);
        let value = drive(
            async move { rx.await.unwrap() },
            move || {
                if let Some(tx) = tx.take() {
                    tx.send(13).unwrap();
                    true
                } else {
                    false
                }
            },
        );
        assert_eq!(value, 13);
    }

    #[test]
    #[should_panic(expected = "no work is runnable")]
    fn stalled_task_panics() {
        let (_tx, rx) = oneshot::channel::<u32>();
        drive(async move { rx.await.unwrap() }, || false);
    }
}
