//! Offline replay transport for fixture-driven tests and demos.
//!
//! A [`SessionRecording`] is a list of command/output exchanges, stored as
//! JSONL so fixtures diff cleanly. A [`ReplayTransport`] serves those
//! exchanges back through the [`Transport`](super::Transport) interface, so
//! the whole translation engine can run without a device.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use log::trace;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::Transport;
use crate::error::TranslateError;

/// One recorded command/output exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ExchangeRecord {
    pub command: String,
    pub output: String,
}

impl ExchangeRecord {
    pub fn new(command: impl Into<String>, output: impl Into<String>) -> Self {
        ExchangeRecord {
            command: command.into(),
            output: output.into(),
        }
    }
}

/// An ordered set of recorded exchanges with a JSONL representation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionRecording {
    entries: Vec<ExchangeRecord>,
}

impl SessionRecording {
    pub fn new(entries: Vec<ExchangeRecord>) -> Self {
        SessionRecording { entries }
    }

    pub fn entries(&self) -> &[ExchangeRecord] {
        &self.entries
    }

    /// Encodes the recording as JSONL, one exchange per line.
    pub fn to_jsonl(&self) -> Result<String, TranslateError> {
        let mut lines = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let line = serde_json::to_string(entry).map_err(|e| {
                TranslateError::InternalError(format!("recording encode error: {e}"))
            })?;
            lines.push(line);
        }
        Ok(lines.join("\n"))
    }

    /// Restores a recording from JSONL. Blank lines are skipped.
    pub fn from_jsonl(jsonl: &str) -> Result<Self, TranslateError> {
        let mut entries = Vec::new();
        for line in jsonl.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let entry: ExchangeRecord = serde_json::from_str(line).map_err(|e| {
                TranslateError::InternalError(format!("recording decode error: {e}"))
            })?;
            entries.push(entry);
        }
        Ok(SessionRecording { entries })
    }
}

/// Shared log of every command a replay transport was asked to send.
///
/// Tests use this to assert command order, sequencing, and how often an
/// expensive scrape was actually issued.
#[derive(Debug, Clone, Default)]
pub struct CommandLog {
    sent: Arc<Mutex<Vec<String>>>,
}

impl CommandLog {
    /// Snapshot of all sent commands in send order.
    pub fn commands(&self) -> Vec<String> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    /// Number of times `command` was sent.
    pub fn count_of(&self, command: &str) -> usize {
        self.commands().iter().filter(|c| c == &command).count()
    }

    fn push(&self, command: &str) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(command.to_string());
        }
    }
}

/// Transport that replays recorded exchanges instead of talking to a device.
///
/// Matching searches forward from the last match and wraps around once, so a
/// fixture entry can satisfy a command that is legitimately re-issued in a
/// later transaction. A command with no matching entry at all is a
/// [`TranslateError::ReplayMismatch`].
pub struct ReplayTransport {
    entries: Vec<ExchangeRecord>,
    cursor: usize,
    log: CommandLog,
    connected: bool,
}

impl ReplayTransport {
    pub fn new(entries: Vec<ExchangeRecord>) -> Self {
        ReplayTransport {
            entries,
            cursor: 0,
            log: CommandLog::default(),
            connected: true,
        }
    }

    pub fn from_recording(recording: &SessionRecording) -> Self {
        Self::new(recording.entries().to_vec())
    }

    pub fn from_jsonl(jsonl: &str) -> Result<Self, TranslateError> {
        Ok(Self::from_recording(&SessionRecording::from_jsonl(jsonl)?))
    }

    /// Handle to the shared command log; stays valid after the transport has
    /// been moved into a session worker.
    pub fn log(&self) -> CommandLog {
        self.log.clone()
    }

    fn find(&self, command: &str) -> Option<usize> {
        let forward = self.entries[self.cursor..]
            .iter()
            .position(|entry| entry.command == command)
            .map(|offset| self.cursor + offset);
        forward.or_else(|| {
            self.entries[..self.cursor]
                .iter()
                .position(|entry| entry.command == command)
        })
    }
}

#[async_trait]
impl Transport for ReplayTransport {
    async fn send_command(
        &mut self,
        command: &str,
        _timeout: Duration,
    ) -> Result<String, TranslateError> {
        // Log before matching, so tests observe commands the fixture lacks.
        self.log.push(command);
        match self.find(command) {
            Some(index) => {
                trace!("replaying entry {index} for command '{command}'");
                self.cursor = index + 1;
                Ok(self.entries[index].output.clone())
            }
            None => Err(TranslateError::ReplayMismatch(format!(
                "no recorded output for command '{command}'"
            ))),
        }
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn close(&mut self) {
        self.connected = false;
    }
}
