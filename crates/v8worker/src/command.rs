//! Commands sent to the worker's owner thread.
//!
//! Every command carries a reply channel; the host thread that issued it
//! blocks on that channel until the owner thread has finished.

use std::sync::mpsc::SyncSender;

use crate::error::WorkerError;

pub(crate) type Reply<T> = SyncSender<Result<T, WorkerError>>;

pub(crate) enum WorkerCommand {
    /// Compile and run a script in the worker's global context.
    Load {
        name: String,
        source: String,
        reply: Reply<()>,
    },

    /// Deliver a message to the `$recv` handler.
    Send { message: String, reply: Reply<()> },

    /// Deliver a request to the `$recvSync` handler and return its reply.
    SendSync {
        message: String,
        reply: Reply<String>,
    },

    /// Release the runtime and exit the owner thread.
    Shutdown,
}

impl WorkerCommand {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            WorkerCommand::Load { .. } => "load",
            WorkerCommand::Send { .. } => "send",
            WorkerCommand::SendSync { .. } => "send_sync",
            WorkerCommand::Shutdown => "shutdown",
        }
    }
}
