//! Error types for the worker bridge.
//!
//! Every fallible worker operation returns a [`WorkerError`] by value. The
//! diagnostic text produced by the exception formatter travels inside the
//! `Compile` and `Runtime` variants, so callers never have to read a shared
//! "last error" field to find out what went wrong.

use std::fmt;
use std::time::Duration;

/// Reserved prefix of the legacy sync-reply protocol.
///
/// Only produced by [`crate::Worker::send_sync_compat`].
pub const SENTINEL_PREFIX: &str = "err: ";

/// Which receive slot a message was addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    /// The slot filled by `$recv`.
    Message,
    /// The slot filled by `$recvSync`.
    Request,
}

impl HandlerKind {
    /// Name of the script primitive that fills this slot.
    pub fn primitive(self) -> &'static str {
        match self {
            HandlerKind::Message => "$recv",
            HandlerKind::Request => "$recvSync",
        }
    }
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.primitive())
    }
}

/// Errors that can occur when driving a worker.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("{0}")]
    Compile(String),

    #[error("{0}")]
    Runtime(String),

    #[error("handler not registered: {0} not called")]
    NoHandler(HandlerKind),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("TypeMismatch: {primitive} expects {expected}, got {found}")]
    TypeMismatch {
        primitive: &'static str,
        expected: &'static str,
        found: String,
    },

    #[error("execution terminated")]
    Terminated,

    #[error("execution timed out after {0:?}")]
    Timeout(Duration),

    #[error("worker has been disposed")]
    Disposed,

    #[error("worker called from inside one of its own callbacks")]
    Reentrant,

    #[error("invalid worker configuration: {0}")]
    InvalidConfig(String),

    #[error("engine error: {0}")]
    Engine(String),

    #[error("channel closed")]
    ChannelClosed,

    #[error("worker thread panicked")]
    ThreadPanic,

    #[error("failed to spawn worker thread: {0}")]
    SpawnFailed(#[from] std::io::Error),
}

impl WorkerError {
    /// Human-readable diagnostic for this error.
    ///
    /// For `Compile` and `Runtime` this is the formatted exception report;
    /// for everything else it is the error message.
    pub fn diagnostic(&self) -> String {
        match self {
            WorkerError::Compile(text) | WorkerError::Runtime(text) => text.clone(),
            other => other.to_string(),
        }
    }

    /// Text used on the legacy sync-reply channel.
    pub(crate) fn sentinel(&self) -> String {
        let detail = match self {
            WorkerError::NoHandler(kind) => format!("{} not called", kind),
            WorkerError::ProtocolViolation(_) => "non-string return value".to_string(),
            other => other.diagnostic(),
        };
        format!("{}{}", SENTINEL_PREFIX, detail)
    }
}

/// Numeric outcome of `load`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum LoadStatus {
    Ok = 0,
    CompileError = 1,
    RuntimeError = 2,
}

impl LoadStatus {
    pub fn from_result<T>(result: &Result<T, WorkerError>) -> Self {
        match result {
            Ok(_) => LoadStatus::Ok,
            Err(WorkerError::Compile(_)) => LoadStatus::CompileError,
            Err(_) => LoadStatus::RuntimeError,
        }
    }

    pub fn code(self) -> i32 {
        self as i32
    }
}

/// Numeric outcome of an async `send`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum SendStatus {
    Ok = 0,
    NoHandler = 1,
    RuntimeError = 2,
}

impl SendStatus {
    pub fn from_result<T>(result: &Result<T, WorkerError>) -> Self {
        match result {
            Ok(_) => SendStatus::Ok,
            Err(WorkerError::NoHandler(_)) => SendStatus::NoHandler,
            Err(_) => SendStatus::RuntimeError,
        }
    }

    pub fn code(self) -> i32 {
        self as i32
    }
}
