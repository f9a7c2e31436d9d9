//! QuickJS runtime on a dedicated host thread

use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use rquickjs::{CatchResultExt, Context, Runtime};

use crate::bindings::{create_host_bindings, install_console_interceptor, return_text, BridgeSlot};
use crate::{Bridge, CompletionCallback, HostError, ScriptHost};
use jsrunner_protocol::RunId;

/// Work items for the host thread
enum HostJob {
    InstallBridge {
        bridge: Arc<dyn Bridge>,
        done: Sender<Result<(), HostError>>,
    },
    Evaluate {
        epoch: u64,
        run_id: RunId,
        source: String,
        on_complete: CompletionCallback,
    },
    Shutdown,
}

/// Evaluation counters shared with the interrupt handler.
///
/// Every dispatched evaluation gets the next epoch. `abort` raises the
/// watermark to the latest dispatched epoch, so anything at or below it is
/// interrupted (if running) or skipped (if still queued).
#[derive(Debug, Default)]
struct Epochs {
    dispatched: AtomicU64,
    aborted: AtomicU64,
    running: AtomicU64,
}

impl Epochs {
    fn next(&self) -> u64 {
        self.dispatched.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn abort_dispatched(&self) {
        let latest = self.dispatched.load(Ordering::SeqCst);
        self.aborted.fetch_max(latest, Ordering::SeqCst);
    }

    fn abort_all(&self) {
        self.aborted.store(u64::MAX, Ordering::SeqCst);
    }

    fn is_aborted(&self, epoch: u64) -> bool {
        epoch != 0 && epoch <= self.aborted.load(Ordering::SeqCst)
    }

    fn should_interrupt(&self) -> bool {
        self.is_aborted(self.running.load(Ordering::SeqCst))
    }
}

/// Script Host backed by one QuickJS runtime and context.
///
/// The context lives for the whole host, so the console interceptor and
/// any globals a script defines persist between evaluations.
pub struct QuickJsHost {
    jobs: Mutex<Option<Sender<HostJob>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    epochs: Arc<Epochs>,
}

impl QuickJsHost {
    /// Start the host thread and build the context
    pub fn new() -> Result<Self, HostError> {
        let epochs = Arc::new(Epochs::default());
        let (job_tx, job_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();

        let thread_epochs = epochs.clone();
        let thread = std::thread::Builder::new()
            .name("script-host".into())
            .spawn(move || host_thread(job_rx, ready_tx, thread_epochs))
            .map_err(|e| HostError::Init(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(HostError::Init("host thread exited during startup".into()));
            }
        }

        tracing::debug!("Script host started");
        Ok(Self {
            jobs: Mutex::new(Some(job_tx)),
            thread: Mutex::new(Some(thread)),
            epochs,
        })
    }

    fn send(&self, job: HostJob) -> Result<(), HostError> {
        let jobs = self.jobs.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Recovered from poisoned mutex");
            poisoned.into_inner()
        });
        match jobs.as_ref() {
            Some(tx) => tx
                .send(job)
                .map_err(|_| HostError::Transport("host thread is not running".into())),
            None => Err(HostError::Disposed),
        }
    }
}

impl ScriptHost for QuickJsHost {
    fn install_bridge(&self, bridge: Arc<dyn Bridge>) -> Result<(), HostError> {
        let (done_tx, done_rx) = mpsc::channel();
        self.send(HostJob::InstallBridge {
            bridge,
            done: done_tx,
        })?;
        done_rx
            .recv()
            .map_err(|_| HostError::Transport("host thread dropped bridge installation".into()))?
    }

    fn evaluate(
        &self,
        run_id: RunId,
        wrapped_source: String,
        on_complete: CompletionCallback,
    ) -> Result<(), HostError> {
        let epoch = self.epochs.next();
        self.send(HostJob::Evaluate {
            epoch,
            run_id,
            source: wrapped_source,
            on_complete,
        })
    }

    fn abort(&self) {
        self.epochs.abort_dispatched();
        tracing::debug!("Script host abort requested");
    }

    fn dispose(&self) {
        self.epochs.abort_all();

        let sender = self
            .jobs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(tx) = sender {
            let _ = tx.send(HostJob::Shutdown);
        }

        let thread = self
            .thread
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = thread {
            if handle.thread().id() == std::thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                tracing::warn!("Script host thread panicked during shutdown");
            } else {
                tracing::debug!("Script host disposed");
            }
        }
    }
}

impl Drop for QuickJsHost {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Body of the host thread: owns the runtime, context and bridge slot
fn host_thread(
    jobs: Receiver<HostJob>,
    ready: Sender<Result<(), HostError>>,
    epochs: Arc<Epochs>,
) {
    let slot = Rc::new(BridgeSlot::default());
    let (runtime, context) = match init_context(&epochs, slot.clone()) {
        Ok(pair) => {
            let _ = ready.send(Ok(()));
            pair
        }
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    while let Ok(job) = jobs.recv() {
        match job {
            HostJob::InstallBridge { bridge, done } => {
                slot.set_bridge(bridge);
                let result = context.with(|ctx| install_console_interceptor(&ctx));
                let _ = done.send(result);
            }
            HostJob::Evaluate {
                epoch,
                run_id,
                source,
                on_complete,
            } => {
                if epochs.is_aborted(epoch) {
                    tracing::debug!(%run_id, "Skipping evaluation aborted before start");
                    on_complete(None);
                    continue;
                }
                let raw = evaluate(&runtime, &context, &slot, &epochs, epoch, run_id, &source);
                on_complete(raw);
            }
            HostJob::Shutdown => break,
        }
    }
}

fn init_context(epochs: &Arc<Epochs>, slot: Rc<BridgeSlot>) -> Result<(Runtime, Context), HostError> {
    let runtime = Runtime::new().map_err(|e| HostError::Init(e.to_string()))?;

    let interrupt_epochs = epochs.clone();
    runtime.set_interrupt_handler(Some(Box::new(move || interrupt_epochs.should_interrupt())));

    let context = Context::full(&runtime).map_err(|e| HostError::Init(e.to_string()))?;
    context.with(|ctx| create_host_bindings(&ctx, slot))?;

    Ok((runtime, context))
}

/// Evaluate one wrapped script, draining queued promise jobs before the
/// return value is reported.
fn evaluate(
    runtime: &Runtime,
    context: &Context,
    slot: &BridgeSlot,
    epochs: &Epochs,
    epoch: u64,
    run_id: RunId,
    source: &str,
) -> Option<String> {
    epochs.running.store(epoch, Ordering::SeqCst);
    slot.begin(run_id);

    let outcome = context.with(|ctx| {
        ctx.eval::<rquickjs::Value, _>(source)
            .catch(&ctx)
            .map(|value| return_text(&ctx, value))
            .map_err(|e| e.to_string())
    });

    if outcome.is_ok() {
        while !epochs.is_aborted(epoch) {
            match runtime.execute_pending_job() {
                Ok(true) => continue,
                Ok(false) => break,
                Err(_) => {
                    tracing::debug!(%run_id, "Pending job raised an exception");
                }
            }
        }
    }

    slot.end();
    epochs.running.store(0, Ordering::SeqCst);

    match outcome {
        Ok(raw) => raw,
        Err(_) if epochs.is_aborted(epoch) => {
            tracing::debug!(%run_id, "Evaluation interrupted");
            None
        }
        Err(message) => {
            tracing::warn!(%run_id, error = %message, "Evaluation failed inside the host");
            if let Some(bridge) = slot.bridge() {
                bridge.on_host_error(run_id, message);
            }
            None
        }
    }
}
