//! CLI session facade and connection management.
//!
//! A [`CliSession`] is a cloneable handle to one device session. All commands
//! for a device flow through a single worker task consuming a job queue, so
//! no two commands are ever in flight concurrently on one session — device
//! CLIs are single-stream and stateful. A multi-command sequence is one job
//! and therefore atomic with respect to other callers of the same session.
//!
//! # Main Components
//!
//! - [`CliSession`] - Per-device command execution handle
//! - [`Transport`] - Pluggable line transport (SSH, offline replay)
//! - [`SessionManager`] - SSH connection pool (cached, parameter-checked)

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, trace};
use moka::future::Cache;
use sha2::{Digest, Sha256};
use tokio::sync::{mpsc, oneshot};

use crate::dialect::{CommandKind, Dialect};
use crate::error::TranslateError;

mod replay;
mod ssh;

pub use replay::{CommandLog, ExchangeRecord, ReplayTransport, SessionRecording};
pub use ssh::{SecurityLevel, SshSettings, SshTransport};

/// Default per-command timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// A line transport to one device: sends one command, returns the captured
/// output of that command.
///
/// Implementations do not interpret the output; error-pattern checking is the
/// session worker's job.
#[async_trait]
pub trait Transport: Send {
    async fn send_command(
        &mut self,
        command: &str,
        timeout: Duration,
    ) -> Result<String, TranslateError>;

    fn is_connected(&self) -> bool {
        true
    }

    async fn close(&mut self) {}
}

/// A job representing one atomic command batch.
struct CmdJob {
    commands: Vec<String>,
    kind: CommandKind,
    timeout: Option<u64>,
    responder: oneshot::Sender<Result<String, TranslateError>>,
}

/// Handle to one device session.
///
/// Cloning is cheap; all clones share the same worker and therefore the same
/// serialization guarantee.
#[derive(Clone)]
pub struct CliSession {
    sender: mpsc::Sender<CmdJob>,
    dialect: Arc<Dialect>,
}

impl CliSession {
    /// Spawns a worker task over `transport` and returns the session handle.
    pub fn spawn(transport: Box<dyn Transport>, dialect: Arc<Dialect>) -> CliSession {
        let (sender, receiver) = mpsc::channel(32);
        tokio::spawn(run_worker(transport, dialect.clone(), receiver));
        CliSession { sender, dialect }
    }

    pub fn dialect(&self) -> &Arc<Dialect> {
        &self.dialect
    }

    /// True while the worker task is alive and accepting jobs.
    pub fn is_open(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Sends one command and returns its captured output.
    ///
    /// The call blocks (awaits) for the full device round trip. A dialect
    /// error-pattern match in the output surfaces as
    /// [`TranslateError::DeviceRejected`].
    pub async fn execute(&self, command: &str) -> Result<String, TranslateError> {
        self.submit(vec![command.to_string()], CommandKind::Show, None)
            .await
    }

    /// Like [`execute`](Self::execute) with an explicit timeout in seconds.
    pub async fn execute_with_timeout(
        &self,
        command: &str,
        timeout_secs: u64,
    ) -> Result<String, TranslateError> {
        self.submit(vec![command.to_string()], CommandKind::Show, Some(timeout_secs))
            .await
    }

    /// Sends a command sequence as one logical configuration transaction.
    ///
    /// The sequence is wrapped in the dialect's config-mode enter/exit
    /// commands and executed fail-fast: after the first rejected command no
    /// further commands of the sequence are sent, and the device state must
    /// be treated as unknown by the caller. Returns the concatenated output
    /// on success.
    pub async fn execute_sequence(&self, commands: &[String]) -> Result<String, TranslateError> {
        self.submit(commands.to_vec(), CommandKind::Config, None).await
    }

    async fn submit(
        &self,
        commands: Vec<String>,
        kind: CommandKind,
        timeout: Option<u64>,
    ) -> Result<String, TranslateError> {
        let (responder, receiver) = oneshot::channel();
        let job = CmdJob {
            commands,
            kind,
            timeout,
            responder,
        };
        self.sender
            .send(job)
            .await
            .map_err(|_| TranslateError::SessionClosed)?;
        receiver.await.map_err(|_| TranslateError::SessionClosed)?
    }
}

async fn run_worker(
    mut transport: Box<dyn Transport>,
    dialect: Arc<Dialect>,
    mut receiver: mpsc::Receiver<CmdJob>,
) {
    // Pagination would truncate long scrapes with interactive "More" prompts;
    // disable it once per session when the dialect knows how.
    if let Some(command) = dialect.pagination_disable() {
        let timeout = Duration::from_secs(DEFAULT_TIMEOUT_SECS);
        if let Err(err) = transport.send_command(command, timeout).await {
            debug!("pagination disable '{command}' failed: {err}");
        }
    }

    while let Some(job) = receiver.recv().await {
        if !transport.is_connected() {
            let _ = job.responder.send(Err(TranslateError::SessionClosed));
            break;
        }
        let result = run_job(transport.as_mut(), &dialect, &job).await;
        let _ = job.responder.send(result);
    }
    transport.close().await;
    debug!("session worker for dialect '{}' stopped", dialect.name());
}

async fn run_job(
    transport: &mut dyn Transport,
    dialect: &Dialect,
    job: &CmdJob,
) -> Result<String, TranslateError> {
    let timeout = Duration::from_secs(job.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS));

    let mut script: Vec<&str> = Vec::new();
    if job.kind == CommandKind::Config {
        script.extend(dialect.config_enter().iter().map(String::as_str));
    }
    script.extend(job.commands.iter().map(String::as_str));
    if job.kind == CommandKind::Config {
        script.extend(dialect.config_exit().iter().map(String::as_str));
    }

    let mut output = String::new();
    for command in script {
        trace!("sending command '{command}'");
        let chunk = transport.send_command(command, timeout).await?;
        if let Some(line) = dialect.first_error_line(&chunk) {
            return Err(TranslateError::DeviceRejected {
                command: command.to_string(),
                output: line.to_string(),
            });
        }
        output.push_str(&chunk);
    }
    Ok(output)
}

/// SSH connection pool manager.
///
/// Connections are cached per device address and reused while healthy;
/// changed connection parameters (password hash, dialect) force a rebuild.
/// Idle connections are evicted after five minutes.
#[derive(Clone)]
pub struct SessionManager {
    cache: Cache<String, PooledSession>,
}

#[derive(Clone)]
struct PooledSession {
    session: CliSession,
    password_hash: [u8; 32],
    dialect_name: String,
}

impl SessionManager {
    pub fn new() -> Self {
        let cache = Cache::builder()
            .max_capacity(100)
            .time_to_idle(Duration::from_secs(5 * 60))
            .build();
        Self { cache }
    }

    /// Returns a pooled session for the device, connecting if needed.
    pub async fn connect(
        &self,
        settings: SshSettings,
        dialect: Arc<Dialect>,
    ) -> Result<CliSession, TranslateError> {
        let device_addr = settings.device_addr();
        let password_hash = password_hash(&settings.password);

        if let Some(pooled) = self.cache.get(&device_addr).await {
            if pooled.session.is_open()
                && pooled.password_hash == password_hash
                && pooled.dialect_name == dialect.name()
            {
                debug!("session cache hit: {device_addr}");
                return Ok(pooled.session);
            }
            debug!("session cache entry stale, reconnecting: {device_addr}");
            self.cache.invalidate(&device_addr).await;
        } else {
            debug!("session cache miss, connecting: {device_addr}");
        }

        let transport = SshTransport::connect(&settings, &dialect).await?;
        let session = CliSession::spawn(Box::new(transport), dialect.clone());
        self.cache
            .insert(
                device_addr,
                PooledSession {
                    session: session.clone(),
                    password_hash,
                    dialect_name: dialect.name().to_string(),
                },
            )
            .await;
        Ok(session)
    }

    /// Drops the pooled session for a device, if any.
    pub async fn disconnect(&self, settings: &SshSettings) {
        self.cache.invalidate(&settings.device_addr()).await;
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

fn password_hash(password: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect;

    fn replay_session(records: Vec<ExchangeRecord>) -> (CliSession, CommandLog) {
        let transport = ReplayTransport::new(records);
        let log = transport.log();
        let dialect = Arc::new(dialect::cisco().expect("dialect"));
        (CliSession::spawn(Box::new(transport), dialect), log)
    }

    fn record(command: &str, output: &str) -> ExchangeRecord {
        ExchangeRecord {
            command: command.to_string(),
            output: output.to_string(),
        }
    }

    #[tokio::test]
    async fn execute_returns_captured_output() {
        let (session, _) = replay_session(vec![record("show vlan 12", "vlan 12\n name up\n")]);
        let output = session.execute("show vlan 12").await.expect("execute");
        assert_eq!(output, "vlan 12\n name up\n");
    }

    #[tokio::test]
    async fn execute_surfaces_device_rejection() {
        let (session, _) = replay_session(vec![record(
            "show vlan 9999",
            "% Invalid command at '^' marker.\n",
        )]);
        let err = match session.execute("show vlan 9999").await {
            Ok(_) => panic!("error pattern should reject"),
            Err(err) => err,
        };
        assert!(matches!(err, TranslateError::DeviceRejected { .. }));
    }

    #[tokio::test]
    async fn sequence_is_wrapped_in_config_mode() {
        let (session, log) = replay_session(vec![
            record("configure terminal", ""),
            record("vlan 12", ""),
            record("name up", ""),
            record("end", ""),
        ]);
        session
            .execute_sequence(&["vlan 12".to_string(), "name up".to_string()])
            .await
            .expect("sequence");

        let sent = log.commands();
        // First command is the session's one-time pagination disable.
        assert_eq!(
            sent,
            vec![
                "terminal length 0",
                "configure terminal",
                "vlan 12",
                "name up",
                "end"
            ]
        );
    }

    #[tokio::test]
    async fn sequence_is_fail_fast() {
        let (session, log) = replay_session(vec![
            record("configure terminal", ""),
            record("vlan 12", "% Invalid command at '^' marker.\n"),
            record("name up", ""),
            record("end", ""),
        ]);
        let err = match session
            .execute_sequence(&["vlan 12".to_string(), "name up".to_string()])
            .await
        {
            Ok(_) => panic!("rejected step should fail the sequence"),
            Err(err) => err,
        };
        assert!(matches!(err, TranslateError::DeviceRejected { .. }));

        let sent = log.commands();
        // Nothing after the rejected command was sent, not even config exit.
        assert_eq!(
            sent,
            vec!["terminal length 0", "configure terminal", "vlan 12"]
        );
    }

    #[tokio::test]
    async fn concurrent_callers_never_interleave_commands() {
        let (session, log) = replay_session(vec![
            record("configure terminal", ""),
            record("vlan 12", ""),
            record("end", ""),
            record("configure terminal", ""),
            record("vlan 13", ""),
            record("end", ""),
        ]);

        let a = {
            let session = session.clone();
            tokio::spawn(async move { session.execute_sequence(&["vlan 12".to_string()]).await })
        };
        let b = {
            let session = session.clone();
            tokio::spawn(async move { session.execute_sequence(&["vlan 13".to_string()]).await })
        };
        a.await.expect("join").expect("seq a");
        b.await.expect("join").expect("seq b");

        let sent = log.commands();
        // Each sequence stayed contiguous regardless of scheduling order.
        let first_batch = &sent[1..4];
        let second_batch = &sent[4..7];
        assert_eq!(first_batch[0], "configure terminal");
        assert_eq!(first_batch[2], "end");
        assert_eq!(second_batch[0], "configure terminal");
        assert_eq!(second_batch[2], "end");
    }

    #[tokio::test]
    async fn missing_replay_entry_surfaces_as_mismatch() {
        let (session, _) = replay_session(vec![]);
        let err = match session.execute("show version").await {
            Ok(_) => panic!("missing replay entry should fail"),
            Err(err) => err,
        };
        assert!(matches!(err, TranslateError::ReplayMismatch(_)));
    }
}
