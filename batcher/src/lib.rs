/*!
Threshold-based batching for reporters.

A channel created by [`bounded`] buffers items sent through its [`Sender`]. The [`Receiver`] takes the whole buffer as a batch when it reaches a threshold, when a flush is requested, or when the sender is dropped. Only one batch is processed at a time.

Failed and panicking batches are counted in [`Sender::sample_metrics`] and dropped.
*/

use crate::internal_metrics::InternalMetrics;
use std::{
    any::Any,
    cmp, error, fmt,
    future::{self, Future},
    mem,
    panic::{self, AssertUnwindSafe, UnwindSafe},
    pin::{pin, Pin},
    sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError},
    task,
    task::{Context, Poll},
    thread,
    time::Duration,
};

mod internal_metrics;

pub use self::internal_metrics::Metric;

/**
A buffer of items.
*/
pub trait Channel {
    type Item;

    fn new() -> Self;

    fn with_capacity(capacity: usize) -> Self
    where
        Self: Sized,
    {
        let _ = capacity;

        Self::new()
    }

    fn push(&mut self, item: Self::Item);

    fn remaining(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn clear(&mut self);
}

impl<T> Channel for Vec<T> {
    type Item = T;

    fn new() -> Self {
        Vec::new()
    }

    fn with_capacity(capacity: usize) -> Self {
        Vec::with_capacity(capacity)
    }

    fn push(&mut self, item: Self::Item) {
        self.push(item);
    }

    fn remaining(&self) -> usize {
        self.len()
    }

    fn is_empty(&self) -> bool {
        self.is_empty()
    }

    fn clear(&mut self) {
        self.clear()
    }
}

/**
Create a channel that holds at most `max_capacity` items and is flushed when it holds `threshold` items.

A `threshold` of `0` is treated as `1`.
*/
pub fn bounded<T: Channel>(max_capacity: usize, threshold: usize) -> (Sender<T>, Receiver<T>) {
    let shared = Arc::new(Shared {
        metrics: Default::default(),
        state: Mutex::new(State {
            next_batch: Batch::new(),
            is_open: true,
            is_in_batch: false,
            flush_requested: false,
        }),
    });

    (
        Sender {
            max_capacity,
            shared: shared.clone(),
        },
        Receiver {
            threshold: cmp::max(threshold, 1),
            idle_delay: Delay::new(Duration::from_millis(1), Duration::from_millis(500)),
            capacity: Capacity::new(),
            shared,
        },
    )
}

/**
The sending half of a channel.

Dropping the sender closes the channel. Any items still buffered are flushed as a final batch.
*/
pub struct Sender<T> {
    max_capacity: usize,
    shared: Arc<Shared<T>>,
}

impl<T> Drop for Sender<T> {
    fn drop(&mut self) {
        self.shared.lock().is_open = false;
    }
}

impl<T: Channel> Sender<T> {
    /**
    Push an item onto the channel.

    If the channel is full then its buffered items are discarded first. If the channel is closed then the item is discarded.
    */
    pub fn send(&self, msg: T::Item) {
        let mut state = self.shared.lock();

        // Drop what's buffered so an unavailable destination can't exhaust memory
        if state.next_batch.channel.remaining() >= self.max_capacity {
            state.next_batch.channel.clear();
            self.shared.metrics.queue_overflow.increment();
        }

        if !state.is_open {
            return;
        }

        state.next_batch.channel.push(msg);
    }

    /**
    Call `watcher` once the items in the channel at this point have been processed.

    This also requests a flush, so the receiver won't wait for the threshold to be reached. If there's nothing to flush then `watcher` is called immediately.
    */
    pub fn on_next_flush(&self, watcher: impl FnOnce() + Send + 'static) {
        let watcher = Box::new(watcher);

        let mut state = self.shared.lock();

        if !state.is_in_batch && (state.next_batch.channel.is_empty() || !state.is_open) {
            drop(state);

            watcher();
        } else {
            state.flush_requested = true;
            state.next_batch.watchers.push(watcher);
        }
    }

    pub fn sample_metrics(&self) -> impl Iterator<Item = Metric> + 'static {
        self.shared.sample_metrics()
    }
}

/**
The receiving half of a channel.
*/
pub struct Receiver<T> {
    threshold: usize,
    idle_delay: Delay,
    capacity: Capacity,
    shared: Arc<Shared<T>>,
}

impl<T> Drop for Receiver<T> {
    fn drop(&mut self) {
        self.shared.lock().is_open = false;
    }
}

/**
An error processing a batch.

The batch is dropped.
*/
pub struct BatchError(Box<dyn error::Error + Send + Sync>);

impl BatchError {
    pub fn new(err: impl error::Error + Send + Sync + 'static) -> Self {
        BatchError(Box::new(err))
    }
}

impl fmt::Debug for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl<T: Channel> Receiver<T> {
    /**
    Run the receiver on the current thread until the channel is closed.

    `on_batch` is called synchronously for each batch.
    */
    pub fn blocking_exec(self, mut on_batch: impl FnMut(T) -> Result<(), BatchError>) {
        static WAKER: OnceLock<Arc<NeverWake>> = OnceLock::new();

        // The tasks this waker runs are fully synchronous
        struct NeverWake;

        impl task::Wake for NeverWake {
            fn wake(self: Arc<Self>) {}
        }

        let mut fut = pin!(self.exec(
            |delay| future::ready(thread::sleep(delay)),
            move |batch| future::ready(on_batch(batch)),
        ));

        let waker = WAKER.get_or_init(|| Arc::new(NeverWake)).clone().into();
        let mut cx = task::Context::from_waker(&waker);

        loop {
            match fut.as_mut().poll(&mut cx) {
                task::Poll::Ready(()) => return,
                task::Poll::Pending => continue,
            }
        }
    }

    /**
    Run the receiver until the channel is closed.

    `wait` is used to idle between checks for new items. `on_batch` is called for each batch, and the next batch isn't taken until it completes.
    */
    pub async fn exec<FBatch: Future<Output = Result<(), BatchError>>, FWait: Future<Output = ()>>(
        mut self,
        mut wait: impl FnMut(Duration) -> FWait,
        mut on_batch: impl FnMut(T) -> FBatch,
    ) {
        // Pre-allocated so the lock is only held to swap buffers
        let mut next_batch = Batch::new();

        loop {
            let (current_batch, is_open) = {
                let mut state = self.shared.lock();

                let remaining = state.next_batch.channel.remaining();

                // The closed state isn't checked before taking the batch
                // so that the last items are still flushed
                let is_ready =
                    remaining >= self.threshold || state.flush_requested || !state.is_open;

                if remaining > 0 && is_ready {
                    state.is_in_batch = true;
                    state.flush_requested = false;

                    (
                        Some(mem::replace(&mut state.next_batch, mem::take(&mut next_batch))),
                        state.is_open,
                    )
                } else if remaining == 0 {
                    state.is_in_batch = false;
                    state.flush_requested = false;

                    let watchers = mem::take(&mut state.next_batch.watchers);
                    let is_open = state.is_open;

                    drop(state);

                    watchers.notify();

                    (None, is_open)
                } else {
                    state.is_in_batch = false;

                    (None, state.is_open)
                }
            };

            match current_batch {
                Some(current_batch) => {
                    self.idle_delay.reset();

                    next_batch = Batch {
                        channel: T::with_capacity(
                            self.capacity.next(current_batch.channel.remaining()),
                        ),
                        watchers: Watchers::new(),
                    };

                    match panic::catch_unwind(AssertUnwindSafe(|| on_batch(current_batch.channel)))
                    {
                        Ok(on_batch) => match CatchUnwind(AssertUnwindSafe(on_batch)).await {
                            Ok(Ok(())) => {
                                self.shared.metrics.batch_processed.increment();
                            }
                            Ok(Err(_)) => {
                                self.shared.metrics.batch_failed.increment();
                            }
                            Err(_) => {
                                self.shared.metrics.batch_panicked.increment();
                            }
                        },
                        Err(_) => {
                            self.shared.metrics.batch_panicked.increment();
                        }
                    }

                    current_batch.watchers.notify();
                }
                None => {
                    if !is_open {
                        return;
                    }

                    wait(self.idle_delay.next()).await;
                }
            }
        }
    }

    pub fn sample_metrics(&self) -> impl Iterator<Item = Metric> + 'static {
        self.shared.sample_metrics()
    }
}

struct CatchUnwind<F>(F);

impl<F: Future + UnwindSafe> Future for CatchUnwind<F> {
    type Output = Result<F::Output, Box<dyn Any + Send>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // SAFETY: `CatchUnwind` uses structural pinning
        let f = unsafe { Pin::map_unchecked_mut(self, |x| &mut x.0) };

        panic::catch_unwind(AssertUnwindSafe(|| f.poll(cx)))?.map(Ok)
    }
}

struct Delay {
    current: Duration,
    step: Duration,
    max: Duration,
}

impl Delay {
    fn new(step: Duration, max: Duration) -> Delay {
        Delay {
            current: Duration::ZERO,
            step,
            max,
        }
    }

    fn reset(&mut self) {
        self.current = Duration::ZERO
    }

    fn next(&mut self) -> Duration {
        self.current = cmp::min(self.current * 2 + self.step, self.max);
        self.current
    }
}

const CAPACITY_WINDOW: usize = 16;

struct Capacity([usize; CAPACITY_WINDOW], usize);

impl Capacity {
    fn new() -> Self {
        Capacity([1; CAPACITY_WINDOW], 0)
    }

    fn next(&mut self, last_len: usize) -> usize {
        self.0[self.1 % CAPACITY_WINDOW] = last_len;
        self.1 = self.1.wrapping_add(1);

        self.0.iter().copied().max().unwrap_or(last_len)
    }
}

struct Shared<T> {
    metrics: InternalMetrics,
    state: Mutex<State<T>>,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Channel> Shared<T> {
    fn sample_metrics(&self) -> impl Iterator<Item = Metric> + 'static {
        let queue_length = self.lock().next_batch.channel.remaining();

        self.metrics
            .sample()
            .chain(Some(Metric::new("queue_length", queue_length)))
    }
}

struct State<T> {
    next_batch: Batch<T>,
    is_open: bool,
    is_in_batch: bool,
    flush_requested: bool,
}

struct Batch<T> {
    channel: T,
    watchers: Watchers,
}

impl<T: Channel> Batch<T> {
    fn new() -> Self {
        Batch {
            channel: T::new(),
            watchers: Watchers::new(),
        }
    }
}

impl<T: Channel> Default for Batch<T> {
    fn default() -> Self {
        Batch::new()
    }
}

struct Watchers(Vec<Watcher>);

type Watcher = Box<dyn FnOnce() + Send>;

impl Default for Watchers {
    fn default() -> Self {
        Watchers::new()
    }
}

impl Watchers {
    fn new() -> Self {
        Watchers(Vec::new())
    }

    fn push(&mut self, watcher: Watcher) {
        self.0.push(watcher);
    }

    fn notify(self) {
        for watcher in self.0 {
            let _ = panic::catch_unwind(AssertUnwindSafe(watcher));
        }
    }
}

pub mod sync;

#[cfg(feature = "tokio")]
pub mod tokio;

#[cfg(test)]
mod tests {
    use super::*;

    use std::{io, sync::mpsc};

    fn metric(metrics: impl Iterator<Item = Metric>, name: &str) -> usize {
        metrics
            .filter(|metric| metric.name() == name)
            .map(|metric| metric.value())
            .next()
            .unwrap()
    }

    #[test]
    fn batches_at_threshold() {
        let (sender, receiver) = bounded::<Vec<usize>>(100, 3);
        let (batches, received) = mpsc::channel();

        let handle = thread::spawn(move || {
            receiver.blocking_exec(|batch| {
                batches.send(batch).unwrap();
                Ok(())
            })
        });

        for i in 0..6 {
            sender.send(i);
        }

        assert_eq!(vec![0, 1, 2], received.recv().unwrap());
        assert_eq!(vec![3, 4, 5], received.recv().unwrap());

        drop(sender);
        handle.join().unwrap();
    }

    #[test]
    fn waits_for_threshold() {
        let (sender, receiver) = bounded::<Vec<usize>>(100, 10);
        let (batches, received) = mpsc::channel();

        let handle = thread::spawn(move || {
            receiver.blocking_exec(|batch| {
                batches.send(batch).unwrap();
                Ok(())
            })
        });

        sender.send(1);
        sender.send(2);

        assert!(received.recv_timeout(Duration::from_millis(100)).is_err());

        // Closing the channel flushes what's left
        drop(sender);
        handle.join().unwrap();

        assert_eq!(vec![1, 2], received.recv().unwrap());
    }

    #[test]
    fn flush_below_threshold() {
        let (sender, receiver) = bounded::<Vec<usize>>(100, 10);
        let (batches, received) = mpsc::channel();

        let handle = thread::spawn(move || {
            receiver.blocking_exec(|batch| {
                batches.send(batch).unwrap();
                Ok(())
            })
        });

        sender.send(1);
        sync::blocking_flush(&sender, Duration::from_secs(5));

        assert_eq!(vec![1], received.try_recv().unwrap());

        drop(sender);
        handle.join().unwrap();
    }

    #[test]
    fn overflow_clears_buffer() {
        let (sender, receiver) = bounded::<Vec<usize>>(2, 10);

        sender.send(1);
        sender.send(2);
        sender.send(3);

        assert_eq!(1, metric(sender.sample_metrics(), "queue_overflow"));
        assert_eq!(1, metric(sender.sample_metrics(), "queue_length"));

        let (batches, received) = mpsc::channel();

        drop(sender);
        receiver.blocking_exec(|batch| {
            batches.send(batch).unwrap();
            Ok(())
        });

        assert_eq!(vec![3], received.recv().unwrap());
    }

    #[test]
    fn failures_are_dropped() {
        let (sender, receiver) = bounded::<Vec<usize>>(100, 1);

        sender.send(1);
        drop(sender);

        let mut calls = 0;
        let metrics = receiver.shared.clone();

        receiver.blocking_exec(|_| {
            calls += 1;
            Err(BatchError::new(io::Error::new(io::ErrorKind::Other, "failed")))
        });

        assert_eq!(1, calls);
        assert_eq!(1, metric(metrics.sample_metrics(), "batch_failed"));
    }

    #[test]
    fn panics_are_caught() {
        let (sender, receiver) = bounded::<Vec<usize>>(100, 1);

        sender.send(1);
        drop(sender);

        let metrics = receiver.shared.clone();

        receiver.blocking_exec(|_| panic!("explicit panic"));

        assert_eq!(1, metric(metrics.sample_metrics(), "batch_panicked"));
    }

    #[test]
    fn on_next_flush_empty_is_immediate() {
        let (sender, _receiver) = bounded::<Vec<usize>>(100, 1);
        let (notify, notified) = mpsc::channel();

        sender.on_next_flush(move || notify.send(()).unwrap());

        assert!(notified.try_recv().is_ok());
    }
}
