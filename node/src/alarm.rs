//! Deadline scheduler.
//!
//! A min-heap of `(wake_at, operation)` drained by one worker thread. Due
//! operations are posted to the I/O executor, never run inline, so a slow
//! callback cannot stall the timer wheel. A null operation is the shutdown
//! sentinel: it drains the heap and ends the thread.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::{Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Instant;

type Operation = Box<dyn FnOnce() + Send>;

struct Entry {
    wakeup: Instant,
    function: Option<Operation>,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.wakeup == other.wakeup
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // BinaryHeap is a max-heap; invert for earliest-first.
        other.wakeup.cmp(&self.wakeup)
    }
}

pub struct Alarm {
    operations: Mutex<BinaryHeap<Entry>>,
    condition: Condvar,
    handle: tokio::runtime::Handle,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Alarm {
    /// Create the alarm and spawn its worker. `handle` is the executor due
    /// operations are posted onto.
    pub fn new(handle: tokio::runtime::Handle) -> std::sync::Arc<Self> {
        let alarm = std::sync::Arc::new(Self {
            operations: Mutex::new(BinaryHeap::new()),
            condition: Condvar::new(),
            handle,
            thread: Mutex::new(None),
        });
        let runner = alarm.clone();
        let thread = std::thread::Builder::new()
            .name("alarm".into())
            .spawn(move || runner.run())
            .expect("alarm thread spawn");
        *alarm.thread.lock().expect("alarm lock poisoned") = Some(thread);
        alarm
    }

    /// Schedule `operation` at `wakeup`.
    pub fn add(&self, wakeup: Instant, operation: impl FnOnce() + Send + 'static) {
        self.push(Entry {
            wakeup,
            function: Some(Box::new(operation)),
        });
    }

    /// Push the shutdown sentinel and join the worker.
    pub fn stop(&self) {
        self.push(Entry {
            wakeup: Instant::now(),
            function: None,
        });
        if let Some(thread) = self.thread.lock().expect("alarm lock poisoned").take() {
            let _ = thread.join();
        }
    }

    fn push(&self, entry: Entry) {
        self.operations
            .lock()
            .expect("alarm lock poisoned")
            .push(entry);
        self.condition.notify_all();
    }

    fn run(&self) {
        let mut guard = self.operations.lock().expect("alarm lock poisoned");
        loop {
            let (wakeup, is_sentinel) = match guard.peek() {
                Some(top) => (top.wakeup, top.function.is_none()),
                None => {
                    guard = self.condition.wait(guard).expect("alarm lock poisoned");
                    continue;
                }
            };
            if is_sentinel {
                break;
            }
            let now = Instant::now();
            if wakeup <= now {
                let entry = guard.pop().expect("peeked entry exists");
                let function = entry.function.expect("sentinel handled above");
                self.handle.spawn(async move {
                    function();
                });
            } else {
                let (reacquired, _) = self
                    .condition
                    .wait_timeout(guard, wakeup - now)
                    .expect("alarm lock poisoned");
                guard = reacquired;
            }
        }
    }
}
