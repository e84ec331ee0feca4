/*!
Wait for channels from threads that aren't running an async runtime.
*/

use std::{
    sync::{Arc, Condvar, Mutex, PoisonError},
    time::{Duration, Instant},
};

use crate::{Channel, Sender};

#[derive(Clone)]
struct Trigger(Arc<(Mutex<bool>, Condvar)>);

impl Trigger {
    fn new() -> Self {
        Trigger(Arc::new((Mutex::new(false), Condvar::new())))
    }

    fn trigger(self) {
        *(self.0).0.lock().unwrap_or_else(PoisonError::into_inner) = true;
        (self.0).1.notify_all();
    }

    fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut flushed = (self.0).0.lock().unwrap_or_else(PoisonError::into_inner);

        while !*flushed {
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return false;
            };

            flushed = match (self.0).1.wait_timeout(flushed, remaining) {
                Ok((flushed, _)) => flushed,
                Err(err) => err.into_inner().0,
            };
        }

        true
    }
}

/**
Block the current thread until the items in the channel at this point have been processed, or `timeout` expires.

Returns `false` if the timeout expired first.
*/
pub fn blocking_flush<T: Channel>(sender: &Sender<T>, timeout: Duration) -> bool {
    let on_flush = Trigger::new();

    sender.on_next_flush({
        let on_flush = on_flush.clone();

        move || {
            on_flush.trigger();
        }
    });

    on_flush.wait_timeout(timeout)
}
