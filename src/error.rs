//! Error types for CLI translation, command execution, and write ordering.
//!
//! This module defines all errors that can occur while scraping device output,
//! rendering command scripts, executing commands over a session, and resolving
//! writer ordering.

use thiserror::Error;

/// Errors that can occur during CLI translation and command execution.
#[derive(Error, Debug)]
pub enum TranslateError {
    /// An extractor failed on a line that structurally matched its pattern.
    ///
    /// This indicates a pattern/extractor mismatch bug, not a transient device
    /// condition. A plain no-match is never an error; it is represented as an
    /// absent field.
    #[error("parse mismatch: {0}")]
    ParseMismatch(String),

    /// A command template could not be parsed (unterminated or unknown tag).
    #[error("invalid template: {0}")]
    InvalidTemplate(String),

    /// The device echoed a vendor error pattern in response to a command.
    ///
    /// The whole in-flight command sequence is reported as failed and no
    /// further commands of that sequence are sent. The device's actual state
    /// must be treated as unknown until re-read.
    #[error("device rejected command '{command}': {output}")]
    DeviceRejected { command: String, output: String },

    /// A writer cannot express the requested field combination in any device
    /// command. Raised before any command is sent.
    #[error("unsupported configuration combination: {0}")]
    UnsupportedCombination(String),

    /// The declared writer dependency edges contain a cycle.
    ///
    /// Detected when the write order is built at registration time, never per
    /// transaction.
    #[error("write order cycle involving node {0}")]
    OrderingCycle(String),

    /// A node was registered twice in a way that cannot be composed.
    #[error("conflicting registration for node {0}")]
    ConflictingRegistration(String),

    /// No handler is registered for the addressed node.
    #[error("no handler registered for node {0}")]
    UnknownNode(String),

    /// Every registered writer declined the change for this node.
    ///
    /// Structural nodes that intentionally need no device action are
    /// registered as noops instead; for any other node this is a failure.
    #[error("no writer claimed the change for node {0}")]
    WriteNotHandled(String),

    /// Reading a configuration subtree failed.
    #[error("could not read configuration for node {node}: {source}")]
    ReadFailed {
        node: String,
        #[source]
        source: Box<TranslateError>,
    },

    /// Applying configuration to a subtree failed.
    #[error("could not apply configuration to node {node}: {source}")]
    WriteFailed {
        node: String,
        #[source]
        source: Box<TranslateError>,
    },

    /// The device session has been closed or its worker task has stopped.
    #[error("session closed")]
    SessionClosed,

    /// Command execution timed out. Contains the partial output received
    /// before the timeout.
    #[error("exec command timeout: {0}")]
    ExecTimeout(String),

    /// A vendor dialect definition is malformed (bad regex, empty command).
    #[error("invalid dialect: {0}")]
    InvalidDialect(String),

    /// The requested dialect name is not in the builtin catalog.
    #[error("dialect not found: {0}")]
    DialectNotFound(String),

    /// A replayed session had no recorded exchange for the issued command.
    #[error("replay mismatch: {0}")]
    ReplayMismatch(String),

    /// An error occurred in the async-ssh2-tokio library.
    #[error("async ssh2 error: {0}")]
    Ssh2Error(#[from] async_ssh2_tokio::Error),

    /// An error occurred in the russh library.
    #[error("russh error: {0}")]
    RusshError(#[from] russh::Error),

    /// An unexpected internal condition.
    #[error("internal error: {0}")]
    InternalError(String),
}

impl TranslateError {
    /// Wraps an error as a read failure for the given node.
    pub fn read_failed(node: impl Into<String>, source: TranslateError) -> Self {
        TranslateError::ReadFailed {
            node: node.into(),
            source: Box::new(source),
        }
    }

    /// Wraps an error as a write failure for the given node.
    pub fn write_failed(node: impl Into<String>, source: TranslateError) -> Self {
        TranslateError::WriteFailed {
            node: node.into(),
            source: Box::new(source),
        }
    }
}
