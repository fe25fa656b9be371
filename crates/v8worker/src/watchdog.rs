//! Execution deadlines.
//!
//! A watchdog thread holds a thread-safe handle to the worker's isolate.
//! The owner thread arms it before each command; if the command is still
//! running when the deadline passes, the watchdog terminates execution.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use deno_core::v8;

use crate::error::WorkerError;

enum Signal {
    Arm(Instant),
    Disarm,
    Stop,
}

pub(crate) struct Watchdog {
    tx: mpsc::Sender<Signal>,
    timeout: Duration,
    fired: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl Watchdog {
    pub(crate) fn spawn(
        name: &str,
        isolate: v8::IsolateHandle,
        timeout: Duration,
    ) -> Result<Self, WorkerError> {
        let (tx, rx) = mpsc::channel();
        let fired = Arc::new(AtomicBool::new(false));

        let thread = thread::Builder::new()
            .name(format!("{}-watchdog", name))
            .spawn({
                let fired = fired.clone();
                move || watch(rx, isolate, fired)
            })?;

        Ok(Self {
            tx,
            timeout,
            fired,
            thread: Some(thread),
        })
    }

    pub(crate) fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Start the clock for one command. The deadline is disarmed when the
    /// returned guard is dropped.
    pub(crate) fn arm(&self) -> Deadline<'_> {
        self.fired.store(false, Ordering::SeqCst);
        let _ = self.tx.send(Signal::Arm(Instant::now() + self.timeout));
        Deadline { watchdog: self }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        let _ = self.tx.send(Signal::Stop);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// An armed deadline.
pub(crate) struct Deadline<'a> {
    watchdog: &'a Watchdog,
}

impl Deadline<'_> {
    /// Disarm and report whether the deadline fired.
    pub(crate) fn finish(self) -> bool {
        self.watchdog.fired.load(Ordering::SeqCst)
    }
}

impl Drop for Deadline<'_> {
    fn drop(&mut self) {
        let _ = self.watchdog.tx.send(Signal::Disarm);
    }
}

fn watch(rx: mpsc::Receiver<Signal>, isolate: v8::IsolateHandle, fired: Arc<AtomicBool>) {
    let mut deadline: Option<Instant> = None;

    loop {
        let signal = match deadline {
            Some(at) => match rx.recv_timeout(at.saturating_duration_since(Instant::now())) {
                Ok(signal) => signal,
                Err(RecvTimeoutError::Timeout) => {
                    fired.store(true, Ordering::SeqCst);
                    isolate.terminate_execution();
                    tracing::debug!("[watchdog] deadline passed, execution terminated");
                    deadline = None;
                    continue;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            },
            None => match rx.recv() {
                Ok(signal) => signal,
                Err(_) => break,
            },
        };

        match signal {
            Signal::Arm(at) => deadline = Some(at),
            Signal::Disarm => deadline = None,
            Signal::Stop => break,
        }
    }
}
