//! Isolated JavaScript workers with string messaging.
//!
//! Each [`Worker`] owns one V8 isolate and one global context. Scripts
//! loaded into a worker talk to the host through five globals:
//!
//! - `$print(...args)` writes a line to stdout (or the log)
//! - `$recv(fn)` registers the handler for [`Worker::send`]
//! - `$recvSync(fn)` registers the handler for [`Worker::send_sync`]
//! - `$send(msg)` hands a string to [`MessageRouter::on_message`]
//! - `$sendSync(msg)` hands a string to [`MessageRouter::on_request`] and
//!   returns its reply
//!
//! # Architecture
//!
//! - Each worker runs on a dedicated OS thread with a current-thread tokio
//!   runtime; the thread owns the isolate
//! - Host calls are commands on a channel, answered one at a time
//! - Host callbacks run on the worker's thread while the script waits
//!
//! ```no_run
//! use v8worker::{FnRouter, Worker};
//!
//! let router = FnRouter::new(
//!     |msg: &str, _: &()| println!("script says {msg}"),
//!     |msg: &str, _: &()| msg.to_uppercase(),
//!     (),
//! );
//! let worker = Worker::new(router)?;
//! worker.load("main.js", "$recv(msg => $send(msg + '!'))")?;
//! worker.send("hello")?;
//! worker.dispose()?;
//! # Ok::<(), v8worker::WorkerError>(())
//! ```

mod command;
mod config;
mod error;
mod exception;
mod handle;
mod ops;
mod platform;
mod router;
mod spawn;
mod state;
mod watchdog;
mod worker;

pub use config::{PrintTarget, WorkerConfig};
pub use error::{HandlerKind, LoadStatus, SendStatus, WorkerError, SENTINEL_PREFIX};
pub use exception::{ExceptionReport, SourceOrigin};
pub use handle::Worker;
pub use platform::{init_platform, version};
pub use router::{discard_request, FnRouter, MessageRouter};
