//! An auxiliary thread with its own device, which shares native objects with
//! the render thread. Maintenance like trimming the upload pool runs on it.
//!
//! Tasks are pulled from a lock-free injector. An idle worker backs off
//! exponentially instead of blocking on the queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam_deque::{Injector, Steal};

use crate::errors::*;
use crate::video::errors::Error;

const MAX_BACKOFF_MS: u64 = 48;

type Task<D> = Box<dyn FnOnce(&mut D) + Send>;

struct Watcher(Mutex<()>, Condvar);

impl Watcher {
    fn wait_timeout(&self, timeout: Duration) {
        let guard = self.0.lock().unwrap();
        let _ = self.1.wait_timeout(guard, timeout).unwrap();
    }

    fn notify_one(&self) {
        let _guard = self.0.lock().unwrap();
        self.1.notify_one();
    }
}

/// A multi-producer queue of tasks executed against a device.
pub struct TaskQueue<D> {
    injector: Injector<Task<D>>,
    watcher: Watcher,
}

impl<D: 'static> Default for TaskQueue<D> {
    fn default() -> Self {
        TaskQueue::new()
    }
}

impl<D: 'static> TaskQueue<D> {
    pub fn new() -> Self {
        TaskQueue {
            injector: Injector::new(),
            watcher: Watcher(Mutex::new(()), Condvar::new()),
        }
    }

    pub fn push<F>(&self, task: F)
    where
        F: FnOnce(&mut D) + Send + 'static,
    {
        self.injector.push(Box::new(task));
        self.watcher.notify_one();
    }

    fn pop(&self) -> Option<Task<D>> {
        loop {
            match self.injector.steal() {
                Steal::Success(task) => return Some(task),
                Steal::Empty => return None,
                Steal::Retry => {}
            }
        }
    }

    /// Executes every task queued so far on the calling thread, returns the
    /// number of executed tasks.
    pub fn run_pending(&self, device: &mut D) -> usize {
        let mut n = 0;
        while let Some(task) = self.pop() {
            task(device);
            n += 1;
        }

        n
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.injector.is_empty()
    }
}

/// A named thread executing tasks against its own device.
///
/// Priority and CPU affinity are left to the platform defaults.
pub struct Worker<D: 'static> {
    name: String,
    queue: Arc<TaskQueue<D>>,
    terminated: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl<D: 'static> Worker<D> {
    /// Spawns a worker thread. The device is created by `factory` on the new
    /// thread, usually as a context sharing objects with the render thread.
    pub fn spawn<F>(name: &str, factory: F) -> Result<Self>
    where
        F: FnOnce() -> Result<D> + Send + 'static,
    {
        let queue = Arc::new(TaskQueue::new());
        let terminated = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel();

        let handle = {
            let queue = queue.clone();
            let terminated = terminated.clone();
            let name = name.to_owned();

            thread::Builder::new()
                .name(name.clone())
                .spawn(move || {
                    let mut device = match factory() {
                        Ok(device) => device,
                        Err(err) => {
                            error!("[Worker] {} failed to create device, {}.", name, err);
                            terminated.store(true, Ordering::Release);
                            let _ = tx.send(false);
                            return;
                        }
                    };

                    let _ = tx.send(true);
                    Self::main_loop(&queue, &terminated, &mut device);
                })?
        };

        if !rx.recv().unwrap_or(false) {
            let _ = handle.join();
            return Err(Error::WorkerTerminated.into());
        }

        info!("[Worker] {} started.", name);
        Ok(Worker {
            name: name.to_owned(),
            queue,
            terminated,
            handle: Some(handle),
        })
    }

    fn main_loop(queue: &TaskQueue<D>, terminated: &AtomicBool, device: &mut D) {
        let mut backoff = 1;

        loop {
            if queue.run_pending(device) > 0 {
                backoff = 1;
                continue;
            }

            if terminated.load(Ordering::Acquire) {
                break;
            }

            queue.watcher.wait_timeout(Duration::from_millis(backoff));
            backoff = (backoff * 2).min(MAX_BACKOFF_MS);
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queues `task` for the worker thread.
    pub fn schedule<F>(&self, task: F) -> Result<()>
    where
        F: FnOnce(&mut D) + Send + 'static,
    {
        if self.terminated.load(Ordering::Acquire) {
            return Err(Error::WorkerTerminated.into());
        }

        self.queue.push(task);
        Ok(())
    }

    /// Blocks until every task scheduled before this call has been executed.
    pub fn wait_idle(&self) -> Result<()> {
        let (tx, rx) = mpsc::channel();
        self.schedule(move |_| {
            let _ = tx.send(());
        })?;

        rx.recv().map_err(|_| Error::WorkerTerminated.into())
    }
}

impl<D: 'static> Drop for Worker<D> {
    fn drop(&mut self) {
        self.terminated.store(true, Ordering::Release);
        self.queue.watcher.notify_one();

        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("[Worker] {} panicked.", self.name);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[test]
    fn run_pending() {
        let queue: TaskQueue<Vec<u32>> = TaskQueue::new();
        queue.push(|v| v.push(1));
        queue.push(|v| v.push(2));

        let mut device = Vec::new();
        assert_eq!(queue.run_pending(&mut device), 2);
        assert_eq!(device, vec![1, 2]);
        assert!(queue.is_empty());
    }

    #[test]
    fn worker() {
        let counter = Arc::new(AtomicUsize::new(0));
        let worker = Worker::spawn("lucent-test", || Ok(0u32)).unwrap();
        assert_eq!(worker.name(), "lucent-test");

        for _ in 0..8 {
            let counter = counter.clone();
            worker
                .schedule(move |device: &mut u32| {
                    *device += 1;
                    counter.fetch_add(1, Ordering::SeqCst);
                }).unwrap();
        }

        worker.wait_idle().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn factory_failure() {
        let worker: Result<Worker<u32>> = Worker::spawn("lucent-fail", || bail!("no context"));
        assert!(worker.is_err());
    }
}
