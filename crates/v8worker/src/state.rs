//! Per-worker state shared between the owner thread and the ops.
//!
//! Lives in the runtime's `OpState`, so it is only ever touched from the
//! owner thread.

use std::sync::Arc;

use deno_core::v8;

use crate::config::PrintTarget;
use crate::error::HandlerKind;
use crate::router::MessageRouter;

/// Receive handlers registered by script.
///
/// Each slot holds at most one function. Registering again replaces the
/// previous function; dropping the slots releases the handles.
#[derive(Default)]
pub(crate) struct HandlerSlots {
    message: Option<v8::Global<v8::Function>>,
    request: Option<v8::Global<v8::Function>>,
}

impl HandlerSlots {
    /// Store `handler` in the slot for `kind`. Returns true if a previous
    /// handler was replaced.
    pub(crate) fn replace(&mut self, kind: HandlerKind, handler: v8::Global<v8::Function>) -> bool {
        let slot = match kind {
            HandlerKind::Message => &mut self.message,
            HandlerKind::Request => &mut self.request,
        };
        slot.replace(handler).is_some()
    }

    pub(crate) fn get(&self, kind: HandlerKind) -> Option<v8::Global<v8::Function>> {
        match kind {
            HandlerKind::Message => self.message.clone(),
            HandlerKind::Request => self.request.clone(),
        }
    }
}

pub(crate) struct WorkerState {
    pub(crate) name: String,
    pub(crate) router: Arc<dyn MessageRouter>,
    pub(crate) print: PrintTarget,
    pub(crate) handlers: HandlerSlots,
}

impl WorkerState {
    pub(crate) fn new(name: String, router: Arc<dyn MessageRouter>, print: PrintTarget) -> Self {
        Self {
            name,
            router,
            print,
            handlers: HandlerSlots::default(),
        }
    }
}
