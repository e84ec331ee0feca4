/*!
Run channels in a `tokio` runtime.
*/

use std::{
    cmp,
    future::Future,
    time::{Duration, Instant},
};

use crate::{BatchError, Channel, Receiver, Sender};

/**
Spawn a worker to run the [`Receiver`] on a `tokio` runtime.

If the current thread is a `tokio` thread, then the worker will be spawned onto its runtime. If the current thread is not a `tokio` thread, then a single-threaded `tokio` runtime will be set up in a dedicated thread to run it.
*/
pub fn spawn<
    T: Channel + Send + 'static,
    F: Future<Output = Result<(), BatchError>> + Send + 'static,
>(
    receiver: Receiver<T>,
    on_batch: impl FnMut(T) -> F + Send + 'static,
) -> std::io::Result<()>
where
    T::Item: Send + 'static,
{
    let receive = async move {
        receiver
            .exec(|delay| tokio::time::sleep(delay), on_batch)
            .await
    };

    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(receive);
        }
        Err(_) => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;

            std::thread::Builder::new()
                .name(String::from("good_influx_batcher"))
                .spawn(move || runtime.block_on(receive))?;
        }
    }

    Ok(())
}

/**
Wait for a channel potentially running on a `tokio` thread to process all items active at the point this call was made.

If the current thread is a `tokio` thread then this call will be executed using [`tokio::task::block_in_place`] to avoid starving other work. That requires a multi-threaded runtime.
*/
pub fn blocking_flush<T: Channel>(sender: &Sender<T>, timeout: Duration) -> bool {
    let (notifier, mut notified) = tokio::sync::oneshot::channel();

    sender.on_next_flush(move || {
        let _ = notifier.send(());
    });

    // Nothing to flush
    if notified.try_recv().is_ok() {
        return true;
    }

    match tokio::runtime::Handle::try_current() {
        Ok(handle) => tokio::task::block_in_place(|| {
            handle.block_on(async {
                match tokio::time::timeout(timeout, notified).await {
                    Ok(Ok(())) => true,
                    // The channel was closed
                    Ok(Err(_)) => true,
                    Err(_) => false,
                }
            })
        }),
        Err(_) => {
            let now = Instant::now();
            let mut wait = Duration::from_micros(1);
            let max_wait_step = cmp::max(timeout / 3, Duration::from_micros(1));

            while now.elapsed() < timeout {
                match notified.try_recv() {
                    Ok(()) => return true,
                    Err(tokio::sync::oneshot::error::TryRecvError::Closed) => return true,
                    Err(tokio::sync::oneshot::error::TryRecvError::Empty) => (),
                }

                std::thread::sleep(wait);
                wait += cmp::min(wait * 2, max_wait_step);
            }

            false
        }
    }
}

/**
Wait asynchronously for a channel to process all items active at the point this call was made.
*/
pub async fn flush<T: Channel>(sender: &Sender<T>, timeout: Duration) -> bool {
    let (notifier, notified) = tokio::sync::oneshot::channel();

    sender.on_next_flush(move || {
        let _ = notifier.send(());
    });

    match tokio::time::timeout(timeout, notified).await {
        Ok(_) => true,
        Err(_) => false,
    }
}
