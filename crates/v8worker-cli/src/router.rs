//! Routes script messages to the terminal.

use std::collections::BTreeMap;
use std::io::{self, Write};

use v8worker::MessageRouter;

/// Prints `$send` messages on stdout and answers `$sendSync` from a
/// fixed table.
pub struct ConsoleRouter {
    worker: String,
    json: bool,
    replies: BTreeMap<String, String>,
}

impl ConsoleRouter {
    pub fn new(worker: impl Into<String>, json: bool, replies: BTreeMap<String, String>) -> Self {
        Self {
            worker: worker.into(),
            json,
            replies,
        }
    }

    fn format_message(&self, message: &str) -> String {
        if self.json {
            serde_json::json!({ "worker": self.worker, "message": message }).to_string()
        } else {
            message.to_string()
        }
    }
}

impl MessageRouter for ConsoleRouter {
    fn on_message(&self, message: &str) {
        let line = self.format_message(message);
        let mut out = io::stdout().lock();
        if let Err(e) = writeln!(out, "{}", line).and_then(|_| out.flush()) {
            tracing::warn!("Failed to write message: {}", e);
        }
    }

    fn on_request(&self, message: &str) -> String {
        match self.replies.get(message) {
            Some(reply) => reply.clone(),
            None => {
                tracing::debug!("No reply configured for {:?}", message);
                String::new()
            }
        }
    }
}
