//! Progress UI adapter.
//!
//! A [`ProgressControl`] fronts a [`ProgressSurface`] (window, console,
//! channel, test stub). [`show_progress`] attaches a surface, runs the
//! caller's `on_init`, and starts the background ticker on a tokio runtime.
//! The returned [`ProgressSession`] owns the cancellation token.
//!
//! Closing a session always cancels the ticker before the surface is
//! detached, and detaching waits for any in-flight update, so no update can
//! reach a surface after it is gone.

mod ticker;

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Rendering side of a progress dialog.
pub trait ProgressSurface: Send + Sync {
    fn set_progress(&self, percent: u8);

    fn set_status_text(&self, text: &str);

    /// The dialog is being torn down. No call follows this one.
    fn close(&self) {}
}

type CloseHandler = Box<dyn FnMut() -> bool + Send>;

struct ControlInner {
    surface: RwLock<Option<Arc<dyn ProgressSurface>>>,
    percent: AtomicU8,
    close_handler: Mutex<Option<CloseHandler>>,
}

/// Thread-safe handle to a progress dialog.
#[derive(Clone)]
pub struct ProgressControl {
    inner: Arc<ControlInner>,
}

impl ProgressControl {
    pub(crate) fn attached(surface: Arc<dyn ProgressSurface>) -> Self {
        Self {
            inner: Arc::new(ControlInner {
                surface: RwLock::new(Some(surface)),
                percent: AtomicU8::new(0),
                close_handler: Mutex::new(None),
            }),
        }
    }

    // The read lock is held across the surface call so `detach` waits for it.
    fn with_surface(&self, f: impl FnOnce(&dyn ProgressSurface)) {
        match self.inner.surface.read() {
            Ok(guard) => {
                if let Some(surface) = guard.as_ref() {
                    f(surface.as_ref());
                }
            }
            Err(_) => warn!("progress surface lock poisoned"),
        }
    }

    /// Set the bar position. Values above 100 are clamped.
    pub fn set_progress(&self, percent: u8) {
        let percent = percent.min(100);
        self.inner.percent.store(percent, Ordering::SeqCst);
        self.with_surface(|s| s.set_progress(percent));
    }

    pub fn set_status_text(&self, text: &str) {
        self.with_surface(|s| s.set_status_text(text));
    }

    /// Predicate consulted before the dialog closes; `false` vetoes the close.
    pub fn set_close_window_handler<F>(&self, handler: F)
    where
        F: FnMut() -> bool + Send + 'static,
    {
        if let Ok(mut slot) = self.inner.close_handler.lock() {
            *slot = Some(Box::new(handler));
        }
    }

    pub fn progress(&self) -> u8 {
        self.inner.percent.load(Ordering::SeqCst)
    }

    pub fn is_attached(&self) -> bool {
        self.inner
            .surface
            .read()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }

    /// Indeterminate advance: move by `step`, wrapping to 0 after 100.
    pub(crate) fn advance(&self, step: u8) {
        let current = self.progress();
        let next = if current >= 100 {
            0
        } else {
            current.saturating_add(step).min(100)
        };
        self.set_progress(next);
    }

    fn consult_close_handler(&self) -> bool {
        match self.inner.close_handler.lock() {
            Ok(mut slot) => match slot.as_mut() {
                Some(handler) => handler(),
                None => true,
            },
            Err(_) => true,
        }
    }

    /// Drop the surface. Blocks until an in-flight update has finished.
    pub(crate) fn detach(&self) -> Option<Arc<dyn ProgressSurface>> {
        match self.inner.surface.write() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }
}

/// Static description of a progress dialog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressTemplate {
    pub title: String,
    pub initial_status: String,
    pub tick: Duration,
    pub step: u8,
}

impl ProgressTemplate {
    pub fn new(title: impl Into<String>, tick: Duration) -> Self {
        Self {
            title: title.into(),
            initial_status: String::new(),
            tick,
            step: 5,
        }
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.initial_status = status.into();
        self
    }
}

/// Attach `surface`, run `on_init`, and start ticking on `runtime`.
pub fn show_progress<F>(
    runtime: &Handle,
    surface: Arc<dyn ProgressSurface>,
    template: &ProgressTemplate,
    on_init: F,
) -> ProgressSession
where
    F: FnOnce(&ProgressControl),
{
    let control = ProgressControl::attached(surface);
    control.set_progress(0);
    if !template.initial_status.is_empty() {
        control.set_status_text(&template.initial_status);
    }
    on_init(&control);

    let cancel = CancellationToken::new();
    let ticker = ticker::spawn_ticker(
        runtime,
        control.clone(),
        template.tick,
        template.step,
        cancel.clone(),
    );
    debug!(title = %template.title, "progress shown");

    ProgressSession {
        control,
        cancel,
        ticker: Some(ticker),
        runtime: runtime.clone(),
        closed: false,
    }
}

/// A shown progress dialog and its ticker.
///
/// Must be closed from a thread that is not driving the runtime.
pub struct ProgressSession {
    control: ProgressControl,
    cancel: CancellationToken,
    ticker: Option<JoinHandle<()>>,
    runtime: Handle,
    closed: bool,
}

impl ProgressSession {
    pub fn control(&self) -> &ProgressControl {
        &self.control
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// The user asked to close the dialog. The close handler may veto it;
    /// returns whether the dialog closed.
    pub fn request_close(&mut self) -> bool {
        if self.closed {
            return true;
        }
        if !self.control.consult_close_handler() {
            debug!("progress close vetoed");
            return false;
        }
        self.shutdown();
        true
    }

    /// Close unconditionally once the tracked work is done.
    pub fn finish(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.cancel.cancel();
        if let Some(ticker) = self.ticker.take() {
            if let Err(e) = self.runtime.block_on(ticker) {
                warn!(error = %e, "progress ticker ended abnormally");
            }
        }
        if let Some(surface) = self.control.detach() {
            surface.close();
        }
    }
}

impl Drop for ProgressSession {
    fn drop(&mut self) {
        if !self.closed {
            self.closed = true;
            self.cancel.cancel();
            if let Some(surface) = self.control.detach() {
                surface.close();
            }
        }
    }
}

/// Update delivered by a [`ChannelSurface`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Progress(u8),
    Status(String),
    Closed,
}

/// Surface that forwards every update into a channel, for a UI living on
/// another thread.
pub struct ChannelSurface {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ProgressSurface for ChannelSurface {
    fn set_progress(&self, percent: u8) {
        let _ = self.tx.send(ProgressEvent::Progress(percent));
    }

    fn set_status_text(&self, text: &str) {
        let _ = self.tx.send(ProgressEvent::Status(text.to_string()));
    }

    fn close(&self) {
        let _ = self.tx.send(ProgressEvent::Closed);
    }
}

pub fn channel_surface() -> (Arc<ChannelSurface>, mpsc::UnboundedReceiver<ProgressEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(ChannelSurface { tx }), rx)
}

/// Headless surface that logs status changes.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSurface;

impl ProgressSurface for TracingSurface {
    fn set_progress(&self, percent: u8) {
        tracing::trace!(percent, "progress");
    }

    fn set_status_text(&self, text: &str) {
        tracing::info!(status = %text, "progress status");
    }
}
