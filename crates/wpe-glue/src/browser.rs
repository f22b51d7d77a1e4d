//! Browser runtime - owns the engine and the thread it runs on.

use crate::engine::{BrowserEngine, DetachedEngine, EventSink};
use crate::message::{BrowserMessage, PageCommand, PageId};
use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::OnceLock;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

static INSTANCE: OnceLock<Browser> = OnceLock::new();

/// The browser singleton behind `BrowserGlue.init`/`shut`.
pub struct Browser {
    state: Mutex<BrowserState>,
    events: EventSink,
}

struct BrowserState {
    /// Engine parked while the thread is not running
    engine: Option<Box<dyn BrowserEngine>>,
    /// Running browser thread
    worker: Option<Worker>,
}

struct Worker {
    tx: Sender<BrowserMessage>,
    handle: JoinHandle<Box<dyn BrowserEngine>>,
}

impl Browser {
    /// Create a stopped browser delivering engine events to `events`.
    pub fn new(events: EventSink) -> Self {
        Self {
            state: Mutex::new(BrowserState {
                engine: None,
                worker: None,
            }),
            events,
        }
    }

    /// The process-wide browser, reporting events through the Java glue.
    pub fn instance() -> &'static Browser {
        INSTANCE.get_or_init(|| Browser::new(crate::glue::event_sink()))
    }

    /// Use `engine` from the next `init` on.
    ///
    /// Refused while the browser is running.
    pub fn install_engine(&self, engine: Box<dyn BrowserEngine>) -> bool {
        let mut state = self.state.lock();
        if state.worker.is_some() {
            warn!("Cannot install engine while the browser is running");
            return false;
        }
        state.engine = Some(engine);
        true
    }

    /// Start the browser thread and initialise the engine. Idempotent.
    pub fn init(&self) {
        let mut state = self.state.lock();
        if state.worker.is_some() {
            debug!("Browser already initialized");
            return;
        }

        // Reuse the parked engine, if any
        let engine = state
            .engine
            .take()
            .unwrap_or_else(|| Box::new(DetachedEngine));

        let worker = match spawn_worker(engine, self.events.clone()) {
            Ok(worker) => worker,
            Err(e) => {
                error!("Cannot initialize browser: {:#}", e);
                return;
            }
        };

        if worker.tx.send(BrowserMessage::Init).is_err() {
            error!("Browser thread exited before init");
        }
        state.worker = Some(worker);
        info!("Browser initialized");
    }

    /// Shut the engine down and join the browser thread. Idempotent.
    ///
    /// The state lock is not held while joining, so engine code running on
    /// the browser thread may still call back into the browser.
    pub fn shut(&self) {
        // Take the worker out, then release the lock before joining
        let Some(worker) = self.state.lock().worker.take() else {
            debug!("Browser not running");
            return;
        };

        let _ = worker.tx.send(BrowserMessage::Shutdown);
        let engine = match worker.handle.join() {
            Ok(engine) => Some(engine),
            Err(_) => {
                error!("Browser thread panicked during shutdown");
                None
            }
        };

        // Park the engine unless another one was installed meanwhile
        if let Some(engine) = engine {
            let mut state = self.state.lock();
            if state.engine.is_none() && state.worker.is_none() {
                state.engine = Some(engine);
            }
        }
        info!("Browser shut down");
    }

    /// Forward a page command to the engine.
    ///
    /// Returns `false` if the browser is not running.
    pub fn send_page(&self, page: PageId, command: PageCommand) -> bool {
        let state = self.state.lock();
        let Some(worker) = state.worker.as_ref() else {
            warn!("Dropping {:?} for {} (browser not running)", command, page);
            return false;
        };
        worker.tx.send(BrowserMessage::Page { page, command }).is_ok()
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().worker.is_some()
    }
}

impl Drop for Browser {
    fn drop(&mut self) {
        self.shut();
    }
}

fn spawn_worker(engine: Box<dyn BrowserEngine>, events: EventSink) -> Result<Worker> {
    let (tx, rx) = unbounded();
    let handle = thread::Builder::new()
        .name("wpe-browser".to_string())
        .spawn(move || {
            info!("Browser thread started");
            let engine = run_browser_loop(engine, rx, &events);
            info!("Browser thread stopped");
            engine
        })
        .context("failed to spawn browser thread")?;

    Ok(Worker { tx, handle })
}

/// Main browser loop with panic isolation.
///
/// Returns the engine so a later `init` can reuse it.
fn run_browser_loop(
    mut engine: Box<dyn BrowserEngine>,
    rx: Receiver<BrowserMessage>,
    events: &EventSink,
) -> Box<dyn BrowserEngine> {
    loop {
        let msg = match rx.recv() {
            Ok(msg) => msg,
            Err(_) => {
                debug!("Browser channel closed, shutting down");
                isolate("shutdown", || {
                    engine.shut();
                    Ok(())
                });
                break;
            }
        };

        let (label, last) = match &msg {
            BrowserMessage::Init => ("init", false),
            BrowserMessage::Page { .. } => ("page command", false),
            BrowserMessage::Shutdown => ("shutdown", true),
        };

        // Each message gets its own panic boundary
        isolate(label, || process_message(engine.as_mut(), msg, events));

        if last {
            break;
        }
    }
    engine
}

fn process_message(
    engine: &mut dyn BrowserEngine,
    msg: BrowserMessage,
    events: &EventSink,
) -> Result<()> {
    match msg {
        BrowserMessage::Init => engine.init(events).context("engine init failed"),
        BrowserMessage::Page { page, command } => engine
            .handle_page(page, command, events)
            .with_context(|| format!("{} command failed", page)),
        BrowserMessage::Shutdown => {
            engine.shut();
            Ok(())
        }
    }
}

/// Run `f`, logging errors and panics instead of propagating them.
fn isolate<F>(label: &str, f: F)
where
    F: FnOnce() -> Result<()>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Browser {} error: {:#}", label, e),
        Err(payload) => error!("Browser {} panicked: {}", label, panic_message(payload.as_ref())),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::EngineEvent;
    use std::sync::Arc;
    use std::time::Duration;

    type Log = Arc<Mutex<Vec<String>>>;

    struct RecordingEngine {
        log: Log,
    }

    impl BrowserEngine for RecordingEngine {
        fn init(&mut self, _events: &EventSink) -> Result<()> {
            self.log.lock().push("init".to_string());
            Ok(())
        }

        fn shut(&mut self) {
            self.log.lock().push("shut".to_string());
        }

        fn handle_page(
            &mut self,
            page: PageId,
            command: PageCommand,
            events: &EventSink,
        ) -> Result<()> {
            if let PageCommand::LoadUrl { url } = &command {
                if url == "panic://" {
                    panic!("engine crashed on {}", url);
                }
                events.emit(EngineEvent::LoadProgress { page, progress: 1.0 });
            }
            self.log.lock().push(format!("{} {:?}", page.0, command));
            Ok(())
        }
    }

    fn recording_browser() -> (Browser, Log, Arc<Mutex<Vec<EngineEvent>>>) {
        let events: Arc<Mutex<Vec<EngineEvent>>> = Arc::default();
        let sink_events = events.clone();
        let browser = Browser::new(EventSink::new(move |e| sink_events.lock().push(e)));

        let log: Log = Arc::default();
        assert!(browser.install_engine(Box::new(RecordingEngine { log: log.clone() })));
        (browser, log, events)
    }

    #[test]
    fn test_init_forward_shut() {
        let (browser, log, events) = recording_browser();

        browser.init();
        assert!(browser.is_running());
        assert!(browser.send_page(PageId::new(1), PageCommand::Create { width: 800, height: 600 }));
        assert!(browser.send_page(
            PageId::new(1),
            PageCommand::LoadUrl { url: "https://wpewebkit.org".into() }
        ));
        browser.shut();

        assert!(!browser.is_running());
        assert_eq!(
            *log.lock(),
            vec![
                "init".to_string(),
                "1 Create { width: 800, height: 600 }".to_string(),
                "1 LoadUrl { url: \"https://wpewebkit.org\" }".to_string(),
                "shut".to_string(),
            ]
        );
        assert_eq!(
            *events.lock(),
            vec![EngineEvent::LoadProgress { page: PageId::new(1), progress: 1.0 }]
        );
    }

    #[test]
    fn test_init_and_shut_are_idempotent() {
        let (browser, log, _) = recording_browser();

        browser.init();
        browser.init();
        browser.shut();
        browser.shut();

        assert_eq!(*log.lock(), vec!["init".to_string(), "shut".to_string()]);
    }

    #[test]
    fn test_engine_reused_after_shut() {
        let (browser, log, _) = recording_browser();

        browser.init();
        browser.shut();
        browser.init();
        browser.shut();

        assert_eq!(log.lock().len(), 4);
    }

    #[test]
    fn test_survives_engine_panic() {
        let (browser, log, _) = recording_browser();

        browser.init();
        browser.send_page(PageId::new(2), PageCommand::LoadUrl { url: "panic://".into() });
        browser.send_page(PageId::new(2), PageCommand::Reload);
        browser.shut();

        let log = log.lock();
        assert_eq!(log.last().map(String::as_str), Some("shut"));
        assert!(log.contains(&"2 Reload".to_string()));
    }

    #[test]
    fn test_commands_dropped_when_stopped() {
        let (browser, log, _) = recording_browser();

        assert!(!browser.send_page(PageId::new(3), PageCommand::GoBack));
        assert!(log.lock().is_empty());
    }

    static REENTRANT: OnceLock<Browser> = OnceLock::new();

    /// Calls back into its own browser while shutting down.
    struct ReentrantEngine {
        seen_running: Arc<Mutex<Vec<bool>>>,
    }

    impl BrowserEngine for ReentrantEngine {
        fn init(&mut self, _events: &EventSink) -> Result<()> {
            Ok(())
        }

        fn shut(&mut self) {
            if let Some(browser) = REENTRANT.get() {
                self.seen_running.lock().push(browser.is_running());
                browser.send_page(PageId::new(9), PageCommand::Reload);
            }
        }

        fn handle_page(&mut self, _page: PageId, _command: PageCommand, _events: &EventSink) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_engine_may_call_browser_during_shut() {
        let browser = REENTRANT.get_or_init(|| Browser::new(EventSink::new(|_| {})));
        let seen_running: Arc<Mutex<Vec<bool>>> = Arc::default();
        assert!(browser.install_engine(Box::new(ReentrantEngine {
            seen_running: seen_running.clone(),
        })));

        browser.init();

        let (done_tx, done_rx) = unbounded();
        thread::spawn(move || {
            browser.shut();
            let _ = done_tx.send(());
        });

        assert!(
            done_rx.recv_timeout(Duration::from_secs(3)).is_ok(),
            "shut blocked while the engine called back"
        );
        assert_eq!(*seen_running.lock(), vec![false]);
        assert!(!browser.is_running());
    }

    #[test]
    fn test_install_refused_while_running() {
        let (browser, _, _) = recording_browser();

        browser.init();
        assert!(!browser.install_engine(Box::new(DetachedEngine)));
        browser.shut();
        assert!(browser.install_engine(Box::new(DetachedEngine)));
    }
}
