//! Sandbox bindings: the native `JsBridge` object, the base console and the
//! JavaScript preludes evaluated inside every context.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;

use rquickjs::function::Func;
use rquickjs::{CatchResultExt, Ctx, Function, Object, Value};

use crate::{Bridge, HostError};
use jsrunner_protocol::RunId;

/// Serializer installed at context creation.
///
/// Functions become `"[Function]"`, errors their `toString()` form and
/// `undefined` the literal `"undefined"`; everything else goes through
/// `JSON.stringify`, so a genuinely circular value throws a `TypeError`
/// that the wrapper reports like any other raised error.
///
/// `wellFormed` replaces lone surrogates with U+FFFD. Every string that
/// crosses into Rust goes through it first.
pub(crate) const SERIALIZER: &str = r#"
(function () {
    function replace(key, value) {
        if (typeof value === 'function') return '[Function]';
        if (value instanceof Error) return value.toString();
        if (value === undefined) return 'undefined';
        return value;
    }
    function wellFormed(value) {
        var text = String(value);
        var out = '';
        for (var i = 0; i < text.length; i++) {
            var code = text.charCodeAt(i);
            if (code >= 0xD800 && code <= 0xDBFF) {
                var next = i + 1 < text.length ? text.charCodeAt(i + 1) : 0;
                if (next >= 0xDC00 && next <= 0xDFFF) {
                    out += text.charAt(i) + text.charAt(i + 1);
                    i++;
                } else {
                    out += '\uFFFD';
                }
            } else if (code >= 0xDC00 && code <= 0xDFFF) {
                out += '\uFFFD';
            } else {
                out += text.charAt(i);
            }
        }
        return out;
    }
    function serialize(value) {
        if (value === undefined) return 'undefined';
        if (typeof value === 'function') return '[Function]';
        if (value instanceof Error) return wellFormed(value.toString());
        var text = JSON.stringify(value, replace);
        return text === undefined ? 'undefined' : wellFormed(text);
    }
    Object.defineProperty(globalThis, '__jsrunner', {
        value: Object.freeze({ serialize: serialize, wellFormed: wellFormed }),
        enumerable: false,
        writable: false,
        configurable: false
    });
    Object.defineProperty(globalThis, 'JsBridge', {
        value: Object.freeze(globalThis.JsBridge),
        enumerable: false,
        writable: false,
        configurable: false
    });
})();
"#;

/// Console interceptor, installed once per context.
///
/// Each wrapper forwards the stringified first argument to the bridge and
/// then calls the original primitive with the original arguments.
pub(crate) const CONSOLE_INTERCEPTOR: &str = r#"
(function () {
    if (globalThis.__jsrunnerConsoleInstalled) return;
    var bridge = globalThis.JsBridge;
    var originalLog = console.log;
    var originalInfo = console.info;
    var originalError = console.error;
    var originalWarn = console.warn;
    console.log = function (msg) {
        bridge.onConsoleLog(String(msg));
        return originalLog.apply(console, arguments);
    };
    console.info = function (msg) {
        bridge.onConsoleLog(String(msg));
        return originalInfo.apply(console, arguments);
    };
    console.error = function (msg) {
        bridge.onConsoleError(String(msg));
        return originalError.apply(console, arguments);
    };
    console.warn = function (msg) {
        bridge.onConsoleLog('[Warn]: ' + String(msg));
        return originalWarn.apply(console, arguments);
    };
    Object.defineProperty(globalThis, '__jsrunnerConsoleInstalled', {
        value: true,
        enumerable: false
    });
})();
"#;

/// Base console that the interceptor wraps. Arguments are joined in script
/// land so the native sink only ever sees strings.
const BASE_CONSOLE: &str = r#"
(function () {
    var sink = globalThis.__jsrunnerConsoleSink;
    delete globalThis.__jsrunnerConsoleSink;
    function emit(level) {
        return function () {
            sink(level, Array.prototype.map.call(arguments, String).join(' '));
        };
    }
    globalThis.console = {
        log: emit('log'),
        info: emit('info'),
        warn: emit('warn'),
        error: emit('error')
    };
})();
"#;

/// Shared between the host thread loop and the native bridge functions
#[derive(Default)]
pub(crate) struct BridgeSlot {
    bridge: RefCell<Option<Arc<dyn Bridge>>>,
    current: Cell<Option<RunId>>,
}

impl BridgeSlot {
    pub(crate) fn set_bridge(&self, bridge: Arc<dyn Bridge>) {
        *self.bridge.borrow_mut() = Some(bridge);
    }

    pub(crate) fn bridge(&self) -> Option<Arc<dyn Bridge>> {
        self.bridge.borrow().clone()
    }

    pub(crate) fn begin(&self, run_id: RunId) {
        self.current.set(Some(run_id));
    }

    pub(crate) fn end(&self) {
        self.current.set(None);
    }

    /// Run `f` against the installed bridge for the evaluation in flight
    fn dispatch(&self, channel: &str, f: impl FnOnce(&dyn Bridge, RunId)) {
        let Some(run_id) = self.current.get() else {
            tracing::debug!(channel, "Bridge call outside of an evaluation dropped");
            return;
        };
        match self.bridge() {
            Some(bridge) => f(bridge.as_ref(), run_id),
            None => tracing::warn!(channel, %run_id, "Bridge call before bridge installed"),
        }
    }
}

/// Create the native bindings and run the context preludes
pub(crate) fn create_host_bindings<'js>(
    ctx: &Ctx<'js>,
    slot: Rc<BridgeSlot>,
) -> Result<(), HostError> {
    let globals = ctx.globals();

    let sink = Func::from(|ctx: Ctx<'js>, level: String, text: Value<'js>| {
        let text = lossy_text(&ctx, text).unwrap_or_default();
        match level.as_str() {
            "error" => tracing::error!(target: "jsrunner::console", "{text}"),
            "warn" => tracing::warn!(target: "jsrunner::console", "{text}"),
            _ => tracing::info!(target: "jsrunner::console", "{text}"),
        }
    });
    globals
        .set("__jsrunnerConsoleSink", sink)
        .map_err(|e| HostError::Init(e.to_string()))?;
    eval_prelude(ctx, "base console", BASE_CONSOLE)?;

    let bridge = Object::new(ctx.clone()).map_err(|e| HostError::Init(e.to_string()))?;

    let slot_clone = slot.clone();
    let on_result = Func::from(move |ctx: Ctx<'js>, text: Value<'js>| {
        let text = lossy_text(&ctx, text);
        slot_clone.dispatch("onResult", |bridge, run_id| bridge.on_result(run_id, text));
    });
    bridge
        .set("onResult", on_result)
        .map_err(|e| HostError::Init(e.to_string()))?;

    let slot_clone = slot.clone();
    let on_error = Func::from(move |ctx: Ctx<'js>, text: Value<'js>| {
        let text = lossy_text(&ctx, text);
        slot_clone.dispatch("onError", |bridge, run_id| bridge.on_error(run_id, text));
    });
    bridge
        .set("onError", on_error)
        .map_err(|e| HostError::Init(e.to_string()))?;

    let slot_clone = slot.clone();
    let on_console_log = Func::from(move |ctx: Ctx<'js>, text: Value<'js>| {
        let text = lossy_text(&ctx, text);
        slot_clone.dispatch("onConsoleLog", |bridge, run_id| {
            bridge.on_console_log(run_id, text)
        });
    });
    bridge
        .set("onConsoleLog", on_console_log)
        .map_err(|e| HostError::Init(e.to_string()))?;

    let on_console_error = Func::from(move |ctx: Ctx<'js>, text: Value<'js>| {
        let text = lossy_text(&ctx, text);
        slot.dispatch("onConsoleError", |bridge, run_id| {
            bridge.on_console_error(run_id, text)
        });
    });
    bridge
        .set("onConsoleError", on_console_error)
        .map_err(|e| HostError::Init(e.to_string()))?;

    globals
        .set("JsBridge", bridge)
        .map_err(|e| HostError::Init(e.to_string()))?;

    eval_prelude(ctx, "serializer", SERIALIZER)
}

/// Wrap the console primitives. Safe to call repeatedly.
pub(crate) fn install_console_interceptor(ctx: &Ctx<'_>) -> Result<(), HostError> {
    eval_prelude(ctx, "console interceptor", CONSOLE_INTERCEPTOR)
}

fn eval_prelude(ctx: &Ctx<'_>, name: &str, source: &str) -> Result<(), HostError> {
    ctx.eval::<(), _>(source)
        .catch(ctx)
        .map_err(|e| HostError::Init(format!("{name}: {e}")))
}

/// Text of a script value, with lone surrogates replaced by U+FFFD.
///
/// `undefined` and `null` give `None`. Anything else is passed through
/// `__jsrunner.wellFormed`, which stringifies it, so the UTF-8 conversion
/// cannot fail on unpaired surrogates.
pub(crate) fn lossy_text<'js>(ctx: &Ctx<'js>, value: Value<'js>) -> Option<String> {
    if value.is_undefined() || value.is_null() {
        return None;
    }
    let converted = ctx
        .globals()
        .get::<_, Object>("__jsrunner")
        .and_then(|helpers| helpers.get::<_, Function>("wellFormed"))
        .and_then(|well_formed| well_formed.call::<_, String>((value,)));
    match converted {
        Ok(text) => Some(text),
        Err(e) => {
            if e.is_exception() {
                // Drop the pending exception so it does not leak into the script
                let _ = ctx.catch();
            }
            tracing::warn!(error = %e, "Could not convert script value to text");
            None
        }
    }
}

/// Convert the value left by an evaluation into the raw return channel text
pub(crate) fn return_text<'js>(ctx: &Ctx<'js>, value: Value<'js>) -> Option<String> {
    if value.is_undefined() {
        return Some("undefined".into());
    }
    if value.is_null() {
        return Some("null".into());
    }
    if value.is_string() || value.is_number() || value.is_bool() {
        lossy_text(ctx, value)
    } else {
        None
    }
}
