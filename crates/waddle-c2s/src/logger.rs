//! Diagnostic sink shared by sessions.
//!
//! A [`Logger`] is a handle to a `tracing` dispatcher. Sessions hold one and
//! emit their diagnostics through it, so a server can route a single
//! session's output elsewhere without touching the process-wide subscriber.

use std::fmt;
use std::future::Future;
use std::sync::OnceLock;

use tracing::instrument::{WithDispatch, WithSubscriber};
use tracing::Dispatch;

static GLOBAL: OnceLock<Logger> = OnceLock::new();

/// Handle to a tracing sink.
///
/// The default handle has no dispatcher of its own and follows whatever
/// subscriber is active where it is used (normally the global one installed
/// by the host application). Cloning is cheap and clones share the sink.
#[derive(Clone, Default)]
pub struct Logger {
    dispatch: Option<Dispatch>,
}

impl Logger {
    /// Process-wide default logger, created on first use.
    pub fn global() -> Logger {
        GLOBAL.get_or_init(Logger::default).clone()
    }

    /// Install the process-wide default logger.
    ///
    /// Only succeeds before the default has been used or set; otherwise the
    /// logger is handed back.
    pub fn set_global(logger: Logger) -> Result<(), Logger> {
        GLOBAL.set(logger)
    }

    /// Logger writing to an explicit dispatcher.
    pub fn new(dispatch: Dispatch) -> Self {
        Self {
            dispatch: Some(dispatch),
        }
    }

    /// Logger writing to the given subscriber.
    pub fn from_subscriber<S>(subscriber: S) -> Self
    where
        S: tracing::Subscriber + Send + Sync + 'static,
    {
        Self::new(Dispatch::new(subscriber))
    }

    /// The dedicated dispatcher, if this logger has one.
    pub fn dispatch(&self) -> Option<&Dispatch> {
        self.dispatch.as_ref()
    }

    /// Run `f` with this logger as the active sink.
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        match &self.dispatch {
            Some(dispatch) => tracing::dispatcher::with_default(dispatch, f),
            None => f(),
        }
    }

    /// Attach this logger to a future that will run on another task.
    ///
    /// A logger without a dedicated dispatcher captures the one active at
    /// the call site.
    pub fn attach<F: Future>(&self, future: F) -> WithDispatch<F> {
        let dispatch = self
            .dispatch
            .clone()
            .unwrap_or_else(|| tracing::dispatcher::get_default(|current| current.clone()));
        future.with_subscriber(dispatch)
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sink = if self.dispatch.is_some() { "dedicated" } else { "ambient" };
        f.debug_struct("Logger").field("sink", &sink).finish()
    }
}
