//! Owner thread implementation.
//!
//! Each worker's `JsRuntime` lives on a dedicated thread that processes
//! commands one at a time. The thread is the isolate's lock: nothing else
//! ever touches the runtime, so every operation against one worker is
//! serialized no matter how many host threads issue them.

use std::sync::mpsc::SyncSender;
use std::sync::Arc;

use deno_core::error::JsError;
use deno_core::v8;
use deno_core::JsRuntime;
use deno_core::PollEventLoopOptions;
use deno_core::RuntimeOptions;
use tokio::sync::mpsc;

use crate::command::WorkerCommand;
use crate::config::WorkerConfig;
use crate::error::{HandlerKind, WorkerError};
use crate::exception::ExceptionReport;
use crate::ops::{error_class, v8worker_runtime};
use crate::platform::with_isolate_lock;
use crate::router::MessageRouter;
use crate::state::WorkerState;
use crate::watchdog::Watchdog;

/// The main loop that runs inside the owner thread.
pub(crate) async fn run_worker(
    config: WorkerConfig,
    router: Arc<dyn MessageRouter>,
    mut cmd_rx: mpsc::UnboundedReceiver<WorkerCommand>,
    init_tx: SyncSender<Result<v8::IsolateHandle, WorkerError>>,
) -> Result<(), WorkerError> {
    let name = config.name.clone();

    let mut js_runtime = with_isolate_lock(|| {
        tracing::debug!("[run_worker:{}] Creating JsRuntime", name);
        JsRuntime::new(RuntimeOptions {
            extensions: vec![v8worker_runtime::init_ops_and_esm()],
            create_params: create_params(&config),
            get_error_class_fn: Some(&error_class),
            ..Default::default()
        })
    });

    js_runtime
        .v8_isolate()
        .set_capture_stack_trace_for_uncaught_exceptions(true, config.stack_trace_limit);

    js_runtime
        .op_state()
        .borrow_mut()
        .put(WorkerState::new(name.clone(), router, config.print));

    let isolate_handle = js_runtime.v8_isolate().thread_safe_handle();

    let watchdog = match config.execution_timeout() {
        Some(timeout) => match Watchdog::spawn(&name, isolate_handle.clone(), timeout) {
            Ok(watchdog) => Some(watchdog),
            Err(e) => {
                let _ = init_tx.send(Err(WorkerError::Engine(e.to_string())));
                return Err(e);
            }
        },
        None => None,
    };

    let _ = init_tx.send(Ok(isolate_handle));
    tracing::debug!("[run_worker:{}] Ready", name);

    while let Some(cmd) = cmd_rx.recv().await {
        tracing::trace!("[run_worker:{}] {}", name, cmd.kind());

        match cmd {
            WorkerCommand::Load {
                name: script_name,
                source,
                reply,
            } => {
                let result = execute(&mut js_runtime, watchdog.as_ref(), |rt| {
                    load_script(rt, &script_name, &source)
                })
                .await;
                let _ = reply.send(result);
            }

            WorkerCommand::Send { message, reply } => {
                let result = execute(&mut js_runtime, watchdog.as_ref(), |rt| {
                    call_handler(rt, HandlerKind::Message, &message, |_, _| Ok(()))
                })
                .await;
                let _ = reply.send(result);
            }

            WorkerCommand::SendSync { message, reply } => {
                let result = execute(&mut js_runtime, watchdog.as_ref(), |rt| {
                    call_handler(rt, HandlerKind::Request, &message, string_reply)
                })
                .await;
                let _ = reply.send(result);
            }

            WorkerCommand::Shutdown => {
                tracing::debug!("[run_worker:{}] Shutdown command received", name);
                break;
            }
        }
    }

    // Handlers must be released before the isolate goes away.
    drop(watchdog);
    drop(js_runtime);
    tracing::debug!("[run_worker:{}] Worker finished", name);
    Ok(())
}

fn create_params(config: &WorkerConfig) -> Option<v8::CreateParams> {
    config
        .max_heap_size
        .map(|max| v8::CreateParams::default().heap_limits(config.initial_heap_size.unwrap_or(0), max))
}

/// Run one command under the deadline, then drain pending engine work.
async fn execute<T>(
    js_runtime: &mut JsRuntime,
    watchdog: Option<&Watchdog>,
    op: impl FnOnce(&mut JsRuntime) -> Result<T, WorkerError>,
) -> Result<T, WorkerError> {
    // A terminate request that arrived while idle must not leak into
    // this command.
    js_runtime.v8_isolate().cancel_terminate_execution();

    let deadline = watchdog.map(Watchdog::arm);

    let result = match op(js_runtime) {
        Ok(value) => settle(js_runtime).await.map(|()| value),
        Err(e) => Err(e),
    };

    let fired = deadline.map(|d| d.finish()).unwrap_or(false);
    js_runtime.v8_isolate().cancel_terminate_execution();

    // Jobs queued by a failed command still belong to it.
    if result.is_err() {
        discard_pending(js_runtime, watchdog).await;
    }

    match (result, watchdog) {
        (Err(_), Some(watchdog)) if fired => Err(WorkerError::Timeout(watchdog.timeout())),
        (result, _) => result,
    }
}

/// Run microtasks and any pending ops the command left behind.
async fn settle(js_runtime: &mut JsRuntime) -> Result<(), WorkerError> {
    js_runtime
        .run_event_loop(PollEventLoopOptions::default())
        .await
        .map_err(|e| {
            tracing::warn!("Uncaught error while draining the event loop: {}", e);
            let report = match e.downcast_ref::<JsError>() {
                Some(js_error) => ExceptionReport::from_js_error(js_error).render(),
                None => format!("{}\n", e),
            };
            WorkerError::Runtime(report)
        })
}

/// Drain what a failed command left queued, under a fresh deadline.
/// The command has already failed, so errors here are only logged.
async fn discard_pending(js_runtime: &mut JsRuntime, watchdog: Option<&Watchdog>) {
    let deadline = watchdog.map(Watchdog::arm);
    if let Err(e) = settle(js_runtime).await {
        tracing::debug!("Discarded work left by a failed command: {}", e);
    }
    drop(deadline);
    js_runtime.v8_isolate().cancel_terminate_execution();
}

/// Compile `source` under `name` and run it in the worker's global context.
fn load_script(js_runtime: &mut JsRuntime, name: &str, source: &str) -> Result<(), WorkerError> {
    let scope = &mut js_runtime.handle_scope();
    let tc = &mut v8::TryCatch::new(scope);

    let name = new_string(tc, name)?;
    let source = new_string(tc, source)?;
    let origin = script_origin(tc, name);

    let Some(script) = v8::Script::compile(tc, source, Some(&origin)) else {
        return Err(caught(tc, WorkerError::Compile));
    };

    match script.run(tc) {
        Some(_) => Ok(()),
        None => Err(caught(tc, WorkerError::Runtime)),
    }
}

/// Invoke the registered handler of `kind` with `message` and convert its
/// return value.
fn call_handler<T>(
    js_runtime: &mut JsRuntime,
    kind: HandlerKind,
    message: &str,
    convert: impl FnOnce(&mut v8::HandleScope, v8::Local<v8::Value>) -> Result<T, WorkerError>,
) -> Result<T, WorkerError> {
    let handler = {
        let state = js_runtime.op_state();
        let state = state.borrow();
        state
            .borrow::<WorkerState>()
            .handlers
            .get(kind)
            .ok_or(WorkerError::NoHandler(kind))?
    };

    let scope = &mut js_runtime.handle_scope();
    let tc = &mut v8::TryCatch::new(scope);

    let function = v8::Local::new(tc, &handler);
    let context = tc.get_current_context();
    let receiver: v8::Local<v8::Value> = context.global(tc).into();
    let argument = new_string(tc, message)?;

    match function.call(tc, receiver, &[argument.into()]) {
        Some(value) => {
            let scope: &mut v8::HandleScope = tc;
            convert(scope, value)
        }
        None => Err(caught(tc, WorkerError::Runtime)),
    }
}

fn string_reply(
    scope: &mut v8::HandleScope,
    value: v8::Local<v8::Value>,
) -> Result<String, WorkerError> {
    if value.is_string() {
        return Ok(value.to_rust_string_lossy(scope));
    }
    let found = value.type_of(scope).to_rust_string_lossy(scope);
    Err(WorkerError::ProtocolViolation(format!(
        "{} handler returned {} instead of a string",
        HandlerKind::Request,
        found
    )))
}

/// Turn the exception held by `tc` into an error of the given kind.
fn caught(tc: &mut v8::TryCatch<v8::HandleScope>, kind: fn(String) -> WorkerError) -> WorkerError {
    if tc.has_terminated() {
        return WorkerError::Terminated;
    }
    kind(ExceptionReport::capture(tc).render())
}

fn new_string<'s>(
    scope: &mut v8::HandleScope<'s>,
    value: &str,
) -> Result<v8::Local<'s, v8::String>, WorkerError> {
    v8::String::new(scope, value).ok_or_else(|| {
        WorkerError::Engine(format!(
            "string of {} bytes exceeds the engine's maximum length",
            value.len()
        ))
    })
}

fn script_origin<'s>(
    scope: &mut v8::HandleScope<'s>,
    name: v8::Local<'s, v8::String>,
) -> v8::ScriptOrigin<'s> {
    v8::ScriptOrigin::new(
        scope,
        name.into(),
        0,
        0,
        false,
        0,
        None,
        false,
        false,
        false,
        None,
    )
}
