use crossbeam_channel::{unbounded, Receiver, Sender};
use std::thread::JoinHandle;

type Task = Box<dyn FnOnce() + Send>;

enum Message {
    Perform(Task),
    Flush(Sender<()>),
}

/// A FIFO queue of deferred work executed on a dedicated background thread.
///
/// Used for work that must not stall the simulation thread but must still
/// complete in order; disk image write-back, principally. [`flush`] blocks
/// until everything enqueued so far has run; dropping the queue flushes.
///
/// [`flush`]: AsyncTaskQueue::flush
pub struct AsyncTaskQueue {
    sender: Option<Sender<Message>>,
    thread: Option<JoinHandle<()>>,
}

impl AsyncTaskQueue {
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver): (Sender<Message>, Receiver<Message>) = unbounded();
        let thread = std::thread::Builder::new()
            .name("async task queue".to_string())
            .spawn(move || {
                while let Ok(message) = receiver.recv() {
                    match message {
                        Message::Perform(task) => task(),
                        Message::Flush(ack) => {
                            // All earlier tasks have run; the send is the
                            // synchronisation point.
                            let _ = ack.send(());
                        }
                    }
                }
            })
            .expect("could not spawn task queue thread");

        AsyncTaskQueue {
            sender: Some(sender),
            thread: Some(thread),
        }
    }

    pub fn enqueue(&self, task: impl FnOnce() + Send + 'static) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(Message::Perform(Box::new(task)));
        }
    }

    /// Blocks until every task enqueued before this call has completed.
    pub fn flush(&self) {
        if let Some(sender) = &self.sender {
            let (ack_sender, ack_receiver) = crossbeam_channel::bounded(1);
            if sender.send(Message::Flush(ack_sender)).is_ok() {
                let _ = ack_receiver.recv();
            }
        }
    }
}

impl Default for AsyncTaskQueue {
    fn default() -> Self {
        AsyncTaskQueue::new()
    }
}

impl Drop for AsyncTaskQueue {
    fn drop(&mut self) {
        self.flush();
        drop(self.sender.take());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// A task queue that additionally allows work to be batched up locally and
/// dispatched later in one go, the shape needed by audio generation, where
/// closures accumulate during a machine step and are released to the worker
/// at buffer boundaries. Deferred FIFO order is preserved.
pub struct DeferringAsyncTaskQueue {
    queue: AsyncTaskQueue,
    deferred: Vec<Task>,
}

impl DeferringAsyncTaskQueue {
    #[must_use]
    pub fn new() -> Self {
        DeferringAsyncTaskQueue {
            queue: AsyncTaskQueue::new(),
            deferred: Vec::new(),
        }
    }

    /// Adds a task to the local batch; nothing runs until [`perform`].
    ///
    /// [`perform`]: DeferringAsyncTaskQueue::perform
    pub fn defer(&mut self, task: impl FnOnce() + Send + 'static) {
        self.deferred.push(Box::new(task));
    }

    /// Dispatches the accumulated batch to the background thread.
    pub fn perform(&mut self) {
        if self.deferred.is_empty() {
            return;
        }
        let batch = std::mem::take(&mut self.deferred);
        self.queue.enqueue(move || {
            for task in batch {
                task();
            }
        });
    }

    /// Dispatches anything still deferred, then blocks until the worker has
    /// drained.
    pub fn flush(&mut self) {
        self.perform();
        self.queue.flush();
    }
}

impl Default for DeferringAsyncTaskQueue {
    fn default() -> Self {
        DeferringAsyncTaskQueue::new()
    }
}

impl Drop for DeferringAsyncTaskQueue {
    fn drop(&mut self) {
        self.perform();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn flush_observes_all_enqueued_tasks() {
        let queue = AsyncTaskQueue::new();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..100 {
            let counter = Arc::clone(&counter);
            queue.enqueue(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        queue.flush();
        assert_eq!(counter.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn tasks_run_in_fifo_order() {
        let queue = AsyncTaskQueue::new();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        for i in 0..32 {
            let order = Arc::clone(&order);
            queue.enqueue(move || order.lock().unwrap().push(i));
        }
        queue.flush();
        let seen = order.lock().unwrap().clone();
        assert_eq!(seen, (0..32).collect::<Vec<_>>());
    }

    #[test]
    fn deferred_tasks_wait_for_perform() {
        let mut queue = DeferringAsyncTaskQueue::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let captured = Arc::clone(&counter);
        queue.defer(move || {
            captured.fetch_add(1, Ordering::SeqCst);
        });

        queue.queue.flush();
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        queue.flush();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_drains_outstanding_work() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let queue = AsyncTaskQueue::new();
            let counter = Arc::clone(&counter);
            queue.enqueue(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
