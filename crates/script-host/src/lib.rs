//! jsrunner Script Host
//!
//! An isolated JavaScript environment that evaluates a script string on its
//! own thread and reports back through two independent paths:
//!
//! - the completion callback handed to [`ScriptHost::evaluate`], which
//!   receives the raw return value (`None` when the engine produced nothing)
//! - the [`Bridge`], which the sandboxed code calls for console output and
//!   raised errors at any point during evaluation
//!
//! ## Sandbox globals
//!
//! - `console.log / info / warn / error` - forwarded to the bridge, then to
//!   the host console (`tracing`, target `jsrunner::console`)
//! - `JsBridge.onResult / onError / onConsoleLog / onConsoleError`
//! - `__jsrunner.serialize(value)` - loss-documented result serializer
//! - `__jsrunner.wellFormed(value)` - string form with lone surrogates
//!   replaced by U+FFFD
//!
//! There is no filesystem, storage, timer or network API in the context.

mod bindings;
mod runtime;

pub use runtime::*;

use std::sync::Arc;

use jsrunner_protocol::RunId;
use thiserror::Error;

/// Errors from the Script Host itself (never from script code)
#[derive(Debug, Error)]
pub enum HostError {
    #[error("Script host has been disposed")]
    Disposed,

    #[error("Runtime initialization failed: {0}")]
    Init(String),

    #[error("Host transport error: {0}")]
    Transport(String),
}

/// Receives the raw return channel value of one evaluation.
///
/// `Some("undefined")` / `Some("null")` are the sentinels; `None` means the
/// engine returned nothing at all.
pub type CompletionCallback = Box<dyn FnOnce(Option<String>) + Send + 'static>;

/// Callback surface the sandboxed environment reports into.
///
/// Every call carries the run it belongs to. Calls may arrive after the run
/// has already settled; receivers must treat those as no-ops.
pub trait Bridge: Send + Sync {
    /// Alternate result channel
    fn on_result(&self, run_id: RunId, text: Option<String>);

    /// Raised error during evaluation
    fn on_error(&self, run_id: RunId, text: Option<String>);

    /// Console line that does not settle the run
    fn on_console_log(&self, run_id: RunId, text: Option<String>);

    /// `console.error` from script code. Reported on the error channel unless
    /// the receiver distinguishes the two.
    fn on_console_error(&self, run_id: RunId, text: Option<String>) {
        self.on_error(run_id, text);
    }

    /// Engine-level failure reported by the host rather than script code
    fn on_host_error(&self, run_id: RunId, description: String);
}

/// An isolated evaluation environment
pub trait ScriptHost: Send + Sync {
    /// Install the bridge and the console interceptor. Reinstalling replaces
    /// the bridge but never wraps the console twice.
    fn install_bridge(&self, bridge: Arc<dyn Bridge>) -> Result<(), HostError>;

    /// Queue `wrapped_source` for evaluation and return immediately.
    fn evaluate(
        &self,
        run_id: RunId,
        wrapped_source: String,
        on_complete: CompletionCallback,
    ) -> Result<(), HostError>;

    /// Best-effort stop of everything dispatched so far
    fn abort(&self);

    /// Stop evaluation and release the engine. Idempotent.
    fn dispose(&self);
}
