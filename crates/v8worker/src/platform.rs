//! Process-wide engine setup.

use std::sync::{Mutex, Once, PoisonError};

use deno_core::JsRuntime;

/// Ensure the V8 platform is initialized exactly once.
static V8_INIT: Once = Once::new();

/// Serializes isolate creation across workers.
static ISOLATE_CREATE_LOCK: Mutex<()> = Mutex::new(());

/// Initialize the V8 platform.
///
/// Safe to call any number of times; only the first call does work.
/// Worker construction calls this implicitly, but hosts that create
/// workers from many threads at once should call it up front on the main
/// thread.
pub fn init_platform() {
    V8_INIT.call_once(|| {
        JsRuntime::init_platform(None, false);
        tracing::debug!("[platform] V8 {} initialized", version());
    });
}

/// The V8 version, e.g. `"12.9.202.13"`.
pub fn version() -> &'static str {
    deno_core::v8::V8::get_version()
}

/// Run `create` while holding the isolate creation lock.
pub(crate) fn with_isolate_lock<T>(create: impl FnOnce() -> T) -> T {
    let _lock = ISOLATE_CREATE_LOCK
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    create()
}
