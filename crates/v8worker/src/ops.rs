//! Deno ops behind the script-facing primitives.
//!
//! `bootstrap.js` installs `$print`, `$recv`, `$recvSync`, `$send` and
//! `$sendSync` on the global object; each one forwards to an op here.
//! Arguments arrive untyped and are checked explicitly, so a wrong type
//! throws a `TypeError` into the script instead of being trusted.

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use deno_core::error::{generic_error, type_error, AnyError};
use deno_core::op2;
use deno_core::v8;
use deno_core::OpState;

use crate::config::PrintTarget;
use crate::error::{HandlerKind, WorkerError};
use crate::state::WorkerState;

/// Write one already-joined line of `$print` output.
#[op2(fast)]
pub fn op_worker_print(state: &mut OpState, #[string] line: &str) -> Result<(), AnyError> {
    let worker = state.borrow::<WorkerState>();
    match worker.print {
        PrintTarget::Stdout => {
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            writeln!(out, "{}", line)
                .and_then(|_| out.flush())
                .map_err(|e| generic_error(format!("$print failed: {}", e)))
        }
        PrintTarget::Log => {
            tracing::info!(target: "v8worker::print", worker = %worker.name, "{}", line);
            Ok(())
        }
    }
}

/// `$recv(fn)`
#[op2(fast)]
pub fn op_worker_recv<'s>(
    scope: &mut v8::HandleScope<'s>,
    state: Rc<RefCell<OpState>>,
    handler: v8::Local<'s, v8::Value>,
) -> Result<(), AnyError> {
    register_handler(scope, &state, HandlerKind::Message, handler)
}

/// `$recvSync(fn)`
#[op2(fast)]
pub fn op_worker_recv_sync<'s>(
    scope: &mut v8::HandleScope<'s>,
    state: Rc<RefCell<OpState>>,
    handler: v8::Local<'s, v8::Value>,
) -> Result<(), AnyError> {
    register_handler(scope, &state, HandlerKind::Request, handler)
}

/// `$send(message)` - fire-and-forget to the host.
#[op2(fast)]
pub fn op_worker_send<'s>(
    scope: &mut v8::HandleScope<'s>,
    state: Rc<RefCell<OpState>>,
    message: v8::Local<'s, v8::Value>,
) -> Result<(), AnyError> {
    let message = expect_string(scope, "$send", message)?;

    // Release the state borrow before handing control to the host.
    let router = {
        let state = state.borrow();
        state.borrow::<WorkerState>().router.clone()
    };

    router.on_message(&message);
    Ok(())
}

/// `$sendSync(message)` - blocks until the host replies.
#[op2]
#[string]
pub fn op_worker_send_sync<'s>(
    scope: &mut v8::HandleScope<'s>,
    state: Rc<RefCell<OpState>>,
    message: v8::Local<'s, v8::Value>,
) -> Result<String, AnyError> {
    let message = expect_string(scope, "$sendSync", message)?;

    let router = {
        let state = state.borrow();
        state.borrow::<WorkerState>().router.clone()
    };

    Ok(router.on_request(&message))
}

fn register_handler<'s>(
    scope: &mut v8::HandleScope<'s>,
    state: &Rc<RefCell<OpState>>,
    kind: HandlerKind,
    value: v8::Local<'s, v8::Value>,
) -> Result<(), AnyError> {
    let handler = v8::Local::<v8::Function>::try_from(value)
        .map_err(|_| type_mismatch(scope, kind.primitive(), "a function", value))?;
    let handler = v8::Global::new(scope, handler);

    let mut state = state.borrow_mut();
    let worker = state.borrow_mut::<WorkerState>();
    let replaced = worker.handlers.replace(kind, handler);
    tracing::debug!(
        "[worker:{}] {} handler registered (replaced: {})",
        worker.name,
        kind,
        replaced
    );
    Ok(())
}

fn expect_string<'s>(
    scope: &mut v8::HandleScope<'s>,
    primitive: &'static str,
    value: v8::Local<'s, v8::Value>,
) -> Result<String, AnyError> {
    if value.is_string() {
        Ok(value.to_rust_string_lossy(scope))
    } else {
        Err(type_mismatch(scope, primitive, "a string", value))
    }
}

fn type_mismatch<'s>(
    scope: &mut v8::HandleScope<'s>,
    primitive: &'static str,
    expected: &'static str,
    value: v8::Local<'s, v8::Value>,
) -> AnyError {
    let found = value.type_of(scope).to_rust_string_lossy(scope);
    type_error(
        WorkerError::TypeMismatch {
            primitive,
            expected,
            found,
        }
        .to_string(),
    )
}

/// Maps op errors to the JavaScript error class they are thrown as.
pub(crate) fn error_class(error: &AnyError) -> &'static str {
    deno_core::error::get_custom_error_class(error).unwrap_or("Error")
}

deno_core::extension!(
    v8worker_runtime,
    ops = [
        op_worker_print,
        op_worker_recv,
        op_worker_recv_sync,
        op_worker_send,
        op_worker_send_sync,
    ],
    esm_entry_point = "ext:v8worker_runtime/bootstrap.js",
    esm = [dir "src", "bootstrap.js"],
);
