use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Default)]
pub(crate) struct InternalMetrics {
    pub(crate) queue_overflow: Counter,
    pub(crate) batch_processed: Counter,
    pub(crate) batch_failed: Counter,
    pub(crate) batch_panicked: Counter,
}

#[derive(Default)]
pub(crate) struct Counter(AtomicUsize);

impl Counter {
    pub fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sample(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }
}

/**
A sampled value of an internal metric.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metric {
    name: &'static str,
    value: usize,
}

impl Metric {
    pub fn new(name: &'static str, value: usize) -> Self {
        Metric { name, value }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn value(&self) -> usize {
        self.value
    }
}

impl InternalMetrics {
    pub fn sample(&self) -> impl Iterator<Item = Metric> + 'static {
        let InternalMetrics {
            queue_overflow,
            batch_processed,
            batch_failed,
            batch_panicked,
        } = self;

        [
            Metric::new("queue_overflow", queue_overflow.sample()),
            Metric::new("batch_processed", batch_processed.sample()),
            Metric::new("batch_failed", batch_failed.sample()),
            Metric::new("batch_panicked", batch_panicked.sample()),
        ]
        .into_iter()
    }
}
