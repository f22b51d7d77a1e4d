//! Seam to the WebKit engine.
//!
//! The glue only forwards lifecycle and page commands; the embedder supplies
//! the [`BrowserEngine`] that talks to WebKit. Until one is installed the
//! browser runs a [`DetachedEngine`].

use crate::message::{EngineEvent, PageCommand, PageId};
use anyhow::Result;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Engine entry points, always called on the browser thread.
pub trait BrowserEngine: Send {
    /// Bring the engine up.
    fn init(&mut self, events: &EventSink) -> Result<()>;

    /// Tear the engine down.
    fn shut(&mut self);

    /// Apply a page command.
    fn handle_page(&mut self, page: PageId, command: PageCommand, events: &EventSink) -> Result<()>;
}

/// Where engine events are delivered.
#[derive(Clone)]
pub struct EventSink {
    deliver: Arc<dyn Fn(EngineEvent) + Send + Sync>,
}

impl EventSink {
    pub fn new<F>(deliver: F) -> Self
    where
        F: Fn(EngineEvent) + Send + Sync + 'static,
    {
        Self {
            deliver: Arc::new(deliver),
        }
    }

    pub fn emit(&self, event: EngineEvent) {
        (self.deliver)(event)
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink").finish_non_exhaustive()
    }
}

/// Engine used when no WebKit engine has been installed. Logs only.
#[derive(Debug, Default)]
pub struct DetachedEngine;

impl BrowserEngine for DetachedEngine {
    fn init(&mut self, _events: &EventSink) -> Result<()> {
        info!("Browser init (no engine attached)");
        Ok(())
    }

    fn shut(&mut self) {
        info!("Browser shut (no engine attached)");
    }

    fn handle_page(&mut self, page: PageId, command: PageCommand, _events: &EventSink) -> Result<()> {
        info!("{} {:?} ignored (no engine attached)", page, command);
        Ok(())
    }
}
