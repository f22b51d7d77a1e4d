//! Looper helper thread.
//!
//! A long-lived thread for work that must not run on the UI thread or on
//! WebKit's own threads, such as calling back into Java with engine events.

use crate::browser::panic_message;
use crossbeam_channel::{Sender, unbounded};
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info};

type Task = Box<dyn FnOnce() + Send>;

static GLOBAL: LooperHelper = LooperHelper::new();

pub struct LooperHelper {
    inner: Mutex<Option<Looper>>,
}

struct Looper {
    tx: Sender<Task>,
    handle: JoinHandle<()>,
}

impl LooperHelper {
    pub const fn new() -> Self {
        Self {
            inner: parking_lot::const_mutex(None),
        }
    }

    /// The helper started by `BrowserGlue.initLooperHelper`.
    pub fn global() -> &'static LooperHelper {
        &GLOBAL
    }

    /// Start the helper thread. Returns `false` if it is already running.
    pub fn initialize(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.is_some() {
            debug!("Looper helper already initialized");
            return false;
        }

        let (tx, rx) = unbounded::<Task>();
        let spawned = thread::Builder::new()
            .name("wpe-looper".to_string())
            .spawn(move || {
                info!("Looper helper started");
                for task in rx {
                    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
                        error!("Looper task panicked: {}", panic_message(payload.as_ref()));
                    }
                }
                info!("Looper helper stopped");
            });

        match spawned {
            Ok(handle) => {
                *inner = Some(Looper { tx, handle });
                true
            }
            Err(e) => {
                error!("Cannot start looper helper: {}", e);
                false
            }
        }
    }

    /// Queue `task` on the helper thread.
    ///
    /// Returns `false` if the helper is not running.
    pub fn dispatch<F>(&self, task: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let inner = self.inner.lock();
        match inner.as_ref() {
            Some(looper) => looper.tx.send(Box::new(task)).is_ok(),
            None => {
                debug!("Looper helper not initialized, dropping task");
                false
            }
        }
    }

    /// Drain the queue and join the thread.
    pub fn stop(&self) {
        let looper = self.inner.lock().take();
        if let Some(Looper { tx, handle }) = looper {
            drop(tx);
            if handle.join().is_err() {
                error!("Looper helper thread panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().is_some()
    }
}

impl Default for LooperHelper {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use std::time::Duration;

    #[test]
    fn test_dispatch_before_initialize() {
        let looper = LooperHelper::new();
        assert!(!looper.dispatch(|| {}));
    }

    #[test]
    fn test_tasks_run_in_order() {
        let looper = LooperHelper::new();
        assert!(looper.initialize());
        assert!(!looper.initialize());

        let (tx, rx) = unbounded();
        for i in 0..5 {
            let tx = tx.clone();
            assert!(looper.dispatch(move || tx.send(i).unwrap()));
        }

        let received: Vec<i32> = (0..5)
            .map(|_| rx.recv_timeout(Duration::from_secs(1)).unwrap())
            .collect();
        assert_eq!(received, vec![0, 1, 2, 3, 4]);

        looper.stop();
        assert!(!looper.is_running());
    }

    #[test]
    fn test_survives_panicking_task() {
        let looper = LooperHelper::new();
        looper.initialize();

        looper.dispatch(|| panic!("task failed"));

        let (tx, rx) = unbounded();
        looper.dispatch(move || tx.send("alive").unwrap());
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), "alive");

        looper.stop();
    }
}
