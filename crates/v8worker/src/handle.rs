//! The host-facing worker handle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::sync_channel;
use std::thread::{self, ThreadId};

use deno_core::v8;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::command::{Reply, WorkerCommand};
use crate::error::{LoadStatus, SendStatus, WorkerError};

/// One isolated script execution context.
///
/// A `Worker` owns a V8 isolate running on its own thread. Every method
/// blocks the calling thread until the owner thread has finished the
/// operation, so calls from several host threads are serialized.
///
/// Host callbacks (the [`MessageRouter`](crate::MessageRouter)) run on the
/// owner thread while the script that triggered them is suspended. Calling
/// back into the same worker from inside a callback fails with
/// [`WorkerError::Reentrant`].
pub struct Worker {
    pub(crate) id: Uuid,
    pub(crate) name: String,
    pub(crate) cmd_tx: mpsc::UnboundedSender<WorkerCommand>,
    /// For interrupting execution from other threads.
    pub(crate) isolate_handle: v8::IsolateHandle,
    pub(crate) owner: ThreadId,
    pub(crate) disposed: AtomicBool,
    pub(crate) last_exception: Mutex<String>,
    pub(crate) thread_handle: Mutex<Option<thread::JoinHandle<Result<(), WorkerError>>>>,
}

impl Worker {
    /// Compile and run `source` in the worker's global context.
    ///
    /// Globals defined by one load stay visible to later loads. `name` is
    /// used as the script's resource name in diagnostics.
    pub fn load(&self, name: &str, source: &str) -> Result<(), WorkerError> {
        let (name, source) = (name.to_string(), source.to_string());
        self.request(|reply| WorkerCommand::Load {
            name,
            source,
            reply,
        })
    }

    /// [`load`](Self::load) reporting a status code instead of an error.
    pub fn load_status(&self, name: &str, source: &str) -> LoadStatus {
        LoadStatus::from_result(&self.load(name, source))
    }

    /// Deliver `message` to the handler the script registered with `$recv`.
    pub fn send(&self, message: &str) -> Result<(), WorkerError> {
        let message = message.to_string();
        self.request(|reply| WorkerCommand::Send { message, reply })
    }

    /// [`send`](Self::send) reporting a status code instead of an error.
    pub fn send_status(&self, message: &str) -> SendStatus {
        SendStatus::from_result(&self.send(message))
    }

    /// Deliver `message` to the handler registered with `$recvSync` and
    /// return its string result.
    pub fn send_sync(&self, message: &str) -> Result<String, WorkerError> {
        let message = message.to_string();
        self.request(|reply| WorkerCommand::SendSync { message, reply })
    }

    /// [`send_sync`](Self::send_sync) with failures folded into the reply.
    ///
    /// Errors come back as strings starting with
    /// [`SENTINEL_PREFIX`](crate::SENTINEL_PREFIX). A handler can return a
    /// string with the same prefix, so prefer `send_sync` where possible.
    pub fn send_sync_compat(&self, message: &str) -> String {
        self.send_sync(message).unwrap_or_else(|e| e.sentinel())
    }

    /// The diagnostic text of the most recent failed operation.
    ///
    /// Empty until something fails. A successful operation does not
    /// clear it.
    pub fn last_exception(&self) -> String {
        self.last_exception.lock().clone()
    }

    /// Interrupt whatever script is currently running in this worker.
    ///
    /// Callable from any thread. The interrupted operation fails with
    /// [`WorkerError::Terminated`]; the worker stays usable. Does nothing
    /// if the worker is idle.
    pub fn terminate_execution(&self) {
        if self.is_disposed() {
            return;
        }
        tracing::debug!("[worker:{}] Terminating execution", self.name);
        self.isolate_handle.terminate_execution();
    }

    /// Release the worker's context and its thread.
    ///
    /// Every later call fails with [`WorkerError::Disposed`], including a
    /// second `dispose`.
    pub fn dispose(&self) -> Result<(), WorkerError> {
        if self.on_owner_thread() {
            return Err(WorkerError::Reentrant);
        }
        if self.disposed.swap(true, Ordering::SeqCst) {
            return Err(WorkerError::Disposed);
        }
        self.shutdown()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn on_owner_thread(&self) -> bool {
        thread::current().id() == self.owner
    }

    /// Send a command to the owner thread and wait for its reply.
    fn request<T>(&self, make_cmd: impl FnOnce(Reply<T>) -> WorkerCommand) -> Result<T, WorkerError> {
        let result = self.dispatch(make_cmd);
        if let Err(e) = &result {
            *self.last_exception.lock() = e.diagnostic();
        }
        result
    }

    fn dispatch<T>(&self, make_cmd: impl FnOnce(Reply<T>) -> WorkerCommand) -> Result<T, WorkerError> {
        if self.is_disposed() {
            return Err(WorkerError::Disposed);
        }
        if self.on_owner_thread() {
            return Err(WorkerError::Reentrant);
        }

        let (reply_tx, reply_rx) = sync_channel(1);
        self.cmd_tx
            .send(make_cmd(reply_tx))
            .map_err(|_| self.closed())?;

        reply_rx.recv().map_err(|_| self.closed())?
    }

    /// Error for a command the owner thread dropped unanswered. A
    /// concurrent `dispose` is the usual cause.
    fn closed(&self) -> WorkerError {
        if self.is_disposed() {
            WorkerError::Disposed
        } else {
            WorkerError::ChannelClosed
        }
    }

    fn shutdown(&self) -> Result<(), WorkerError> {
        tracing::debug!("[worker:{}] Disposing", self.name);
        let _ = self.cmd_tx.send(WorkerCommand::Shutdown);

        let Some(handle) = self.thread_handle.lock().take() else {
            return Ok(());
        };
        handle.join().map_err(|_| WorkerError::ThreadPanic)?
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.on_owner_thread() {
            // Joining our own thread would deadlock; let it wind down.
            let _ = self.cmd_tx.send(WorkerCommand::Shutdown);
            return;
        }
        if let Err(e) = self.shutdown() {
            tracing::warn!("[worker:{}] Shutdown failed: {}", self.name, e);
        }
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
