//! Crash isolation.
//!
//! [`initialize_crash_handling`] is called once at process start, before any
//! other component runs. It installs a panic hook that records the fault for
//! the panicking thread. [`execute_protected`] runs the whole bootstrap body
//! under `catch_unwind`; a fault that escapes the body is shown to the user
//! once and turned into exit code [`EXIT_FAILURE`](crate::EXIT_FAILURE).

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once, OnceLock};

use crate::dialog::{platform_dialogs, Dialogs};
use crate::{messages, obs, EXIT_FAILURE};

/// An unhandled fault that reached the crash boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub message: String,
    pub location: Option<String>,
}

impl Fault {
    pub fn new(message: impl Into<String>, location: Option<String>) -> Self {
        Self {
            message: message.into(),
            location,
        }
    }

    /// Best-effort message from a panic payload.
    pub fn from_payload(payload: &(dyn Any + Send)) -> Self {
        Self::new(payload_message(payload), None)
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{} at {location}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

fn payload_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown fault".to_string()
    }
}

thread_local! {
    static RECORDED: RefCell<Option<Fault>> = const { RefCell::new(None) };
}

fn record(fault: Fault) {
    RECORDED.with(|slot| *slot.borrow_mut() = Some(fault));
}

fn take_recorded() -> Option<Fault> {
    RECORDED.with(|slot| slot.borrow_mut().take())
}

/// Reports faults to the user at most once.
pub struct CrashGuard {
    reporter: Arc<dyn Dialogs>,
    reported: AtomicBool,
}

impl CrashGuard {
    pub fn new(reporter: Arc<dyn Dialogs>) -> Self {
        Self {
            reporter,
            reported: AtomicBool::new(false),
        }
    }

    pub fn has_reported(&self) -> bool {
        self.reported.load(Ordering::SeqCst)
    }

    /// Show `fault` unless a fault was already shown. Returns whether this
    /// call showed it.
    pub fn report_once(&self, fault: &Fault) -> bool {
        if self.reported.swap(true, Ordering::SeqCst) {
            return false;
        }
        let text = messages::fault(fault);
        // A reporter that itself faults must not escape the boundary.
        let _ = panic::catch_unwind(AssertUnwindSafe(|| self.reporter.error(&text)));
        take_recorded();
        true
    }

    /// Run `body`, converting an escaping fault into a dialog and
    /// [`EXIT_FAILURE`].
    pub fn protect<F>(&self, body: F) -> i32
    where
        F: FnOnce() -> i32,
    {
        take_recorded();
        match panic::catch_unwind(AssertUnwindSafe(body)) {
            Ok(code) => code,
            Err(payload) => {
                let fault = match take_recorded() {
                    Some(fault) => fault,
                    None => {
                        let fault = Fault::from_payload(payload.as_ref());
                        obs::emit_fault(&fault.message, fault.location.as_deref());
                        fault
                    }
                };
                self.report_once(&fault);
                EXIT_FAILURE
            }
        }
    }
}

static GUARD: OnceLock<CrashGuard> = OnceLock::new();
static HOOK: Once = Once::new();

/// Set up process-wide crash handling. Only the first call takes effect;
/// later calls return the guard created by the first.
pub fn initialize_crash_handling(reporter: Arc<dyn Dialogs>) -> &'static CrashGuard {
    let guard = GUARD.get_or_init(|| CrashGuard::new(reporter));

    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let fault = Fault::new(
                payload_message(info.payload()),
                info.location().map(|l| l.to_string()),
            );
            obs::emit_fault(&fault.message, fault.location.as_deref());

            // Without unwinding nothing reaches `protect`, so report here.
            if cfg!(panic = "abort") {
                if let Some(guard) = GUARD.get() {
                    guard.report_once(&fault);
                }
            }
            record(fault);
            previous(info);
        }));
    });

    guard
}

/// Run the bootstrap body under the process-wide guard.
pub fn execute_protected<F>(body: F) -> i32
where
    F: FnOnce() -> i32,
{
    let guard = match GUARD.get() {
        Some(guard) => guard,
        None => initialize_crash_handling(platform_dialogs()),
    };
    guard.protect(body)
}
