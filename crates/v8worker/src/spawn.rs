//! Worker construction.
//!
//! Spawns the owner thread, builds the runtime on it and waits until the
//! script primitives are installed before handing back a [`Worker`].

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;

use deno_core::v8;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::WorkerConfig;
use crate::error::WorkerError;
use crate::handle::Worker;
use crate::platform::init_platform;
use crate::router::MessageRouter;
use crate::worker::run_worker;

impl Worker {
    /// Create a worker with the default configuration.
    pub fn new(router: impl MessageRouter) -> Result<Self, WorkerError> {
        Self::with_config(WorkerConfig::default(), router)
    }

    /// Create a worker.
    ///
    /// Returns once the worker's context exists and its global primitives
    /// are installed, so the first `load` can use them.
    pub fn with_config(config: WorkerConfig, router: impl MessageRouter) -> Result<Self, WorkerError> {
        config.validate()?;
        init_platform();

        let name = config.name.clone();
        tracing::debug!("[spawn_worker] Starting {}", name);

        let router: Arc<dyn MessageRouter> = Arc::new(router);
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (init_tx, init_rx) =
            std::sync::mpsc::sync_channel::<Result<v8::IsolateHandle, WorkerError>>(1);

        let thread_name = name.clone();
        let thread_handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || -> Result<(), WorkerError> {
                tracing::debug!("[spawn_worker:{}] Thread started", thread_name);

                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()?;

                let result = rt.block_on(run_worker(config, router, cmd_rx, init_tx));

                rt.shutdown_background();
                tracing::debug!("[spawn_worker:{}] Thread exiting", thread_name);
                result
            })?;

        let owner = thread_handle.thread().id();

        let isolate_handle = match init_rx.recv() {
            Ok(Ok(handle)) => handle,
            Ok(Err(e)) => {
                let _ = thread_handle.join();
                return Err(e);
            }
            // The thread went away without reporting; surface its own error.
            Err(_) => {
                return Err(match thread_handle.join() {
                    Ok(Err(e)) => e,
                    Ok(Ok(())) => WorkerError::ChannelClosed,
                    Err(_) => WorkerError::ThreadPanic,
                });
            }
        };

        let id = Uuid::new_v4();
        tracing::debug!(%id, "[spawn_worker] {} is ready", name);

        Ok(Worker {
            id,
            name,
            cmd_tx,
            isolate_handle,
            owner,
            disposed: AtomicBool::new(false),
            last_exception: Mutex::new(String::new()),
            thread_handle: Mutex::new(Some(thread_handle)),
        })
    }
}
