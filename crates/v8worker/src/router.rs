//! Host-facing message routing contract.
//!
//! A worker calls into its router whenever script uses `$send` or
//! `$sendSync`. Calls happen on the worker's owner thread, synchronously
//! inside the script call that triggered them.

/// Receives messages sent by script.
pub trait MessageRouter: Send + Sync + 'static {
    /// Called for every `$send(message)`.
    fn on_message(&self, message: &str);

    /// Called for every `$sendSync(message)`. The returned string becomes
    /// the script-side return value.
    ///
    /// Script execution is stalled until this returns.
    fn on_request(&self, message: &str) -> String;
}

/// A sync callback that always replies with an empty string.
///
/// For hosts that never expect script to call `$sendSync`.
pub fn discard_request<D>(_message: &str, _data: &D) -> String {
    String::new()
}

type MessageFn<D> = Box<dyn Fn(&str, &D) + Send + Sync>;
type RequestFn<D> = Box<dyn Fn(&str, &D) -> String + Send + Sync>;

/// Router built from two callbacks and a piece of host data.
///
/// The host data is handed back unmodified on every callback, which lets
/// a single pair of functions serve many workers.
pub struct FnRouter<D> {
    on_message: MessageFn<D>,
    on_request: RequestFn<D>,
    data: D,
}

impl<D: Send + Sync + 'static> FnRouter<D> {
    pub fn new<M, R>(on_message: M, on_request: R, data: D) -> Self
    where
        M: Fn(&str, &D) + Send + Sync + 'static,
        R: Fn(&str, &D) -> String + Send + Sync + 'static,
    {
        Self {
            on_message: Box::new(on_message),
            on_request: Box::new(on_request),
            data,
        }
    }

    /// A router that drops async messages and replies `""` to requests.
    pub fn discard(data: D) -> Self {
        Self::new(|_, _| {}, discard_request, data)
    }

    pub fn data(&self) -> &D {
        &self.data
    }
}

impl<D: Send + Sync + 'static> MessageRouter for FnRouter<D> {
    fn on_message(&self, message: &str) {
        (self.on_message)(message, &self.data)
    }

    fn on_request(&self, message: &str) -> String {
        (self.on_request)(message, &self.data)
    }
}
