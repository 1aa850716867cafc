//! SSH shell transport for live device sessions.
//!
//! Network devices frequently run old SSH stacks, so the algorithm
//! preference tables include legacy key exchange and cipher suites behind an
//! explicit [`SecurityLevel`]. Command completion is detected by matching the
//! trailing, unterminated output line against the dialect's prompt patterns.

use std::borrow::Cow;
use std::time::Duration;

use async_ssh2_tokio::client::{AuthMethod, Client};
use async_ssh2_tokio::{Config, ServerCheckMethod};
use async_trait::async_trait;
use log::{debug, trace};
use once_cell::sync::Lazy;
use regex::{Regex, RegexSet};
use russh::keys::{Algorithm, EcdsaCurve, HashAlg};
use russh::{ChannelMsg, Preferred, cipher, compression, kex, mac};
use tokio::sync::mpsc;

use super::Transport;
use crate::dialect::Dialect;
use crate::error::TranslateError;

/// Key exchange algorithms for the secure profile.
const SECURE_KEX_ORDER: &[kex::Name] = &[
    kex::CURVE25519,
    kex::CURVE25519_PRE_RFC_8731,
    kex::DH_G14_SHA256,
    kex::DH_G16_SHA512,
    kex::ECDH_SHA2_NISTP256,
    kex::ECDH_SHA2_NISTP384,
    kex::ECDH_SHA2_NISTP521,
];

/// Key exchange algorithms for the legacy-compatible profile.
///
/// Includes SHA-1 Diffie-Hellman variants still shipped by older device
/// firmware.
const LEGACY_KEX_ORDER: &[kex::Name] = &[
    kex::CURVE25519,
    kex::CURVE25519_PRE_RFC_8731,
    kex::DH_GEX_SHA1,
    kex::DH_GEX_SHA256,
    kex::DH_G1_SHA1,
    kex::DH_G14_SHA1,
    kex::DH_G14_SHA256,
    kex::DH_G16_SHA512,
    kex::ECDH_SHA2_NISTP256,
    kex::ECDH_SHA2_NISTP384,
    kex::ECDH_SHA2_NISTP521,
];

const SECURE_CIPHERS: &[cipher::Name] = &[
    cipher::AES_128_CTR,
    cipher::AES_192_CTR,
    cipher::AES_256_CTR,
    cipher::AES_256_GCM,
    cipher::CHACHA20_POLY1305,
];

const LEGACY_CIPHERS: &[cipher::Name] = &[
    cipher::AES_128_CTR,
    cipher::AES_192_CTR,
    cipher::AES_256_CTR,
    cipher::AES_256_GCM,
    cipher::AES_128_CBC,
    cipher::AES_192_CBC,
    cipher::AES_256_CBC,
    cipher::CHACHA20_POLY1305,
];

const SECURE_MAC_ALGORITHMS: &[mac::Name] = &[
    mac::HMAC_SHA256,
    mac::HMAC_SHA512,
    mac::HMAC_SHA256_ETM,
    mac::HMAC_SHA512_ETM,
];

const LEGACY_MAC_ALGORITHMS: &[mac::Name] = &[
    mac::HMAC_SHA1,
    mac::HMAC_SHA256,
    mac::HMAC_SHA512,
    mac::HMAC_SHA1_ETM,
    mac::HMAC_SHA256_ETM,
    mac::HMAC_SHA512_ETM,
];

const COMPRESSION_ALGORITHMS: &[compression::Name] =
    &[compression::NONE, compression::ZLIB, compression::ZLIB_LEGACY];

const KEY_TYPES: &[Algorithm] = &[
    Algorithm::Ed25519,
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP256,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP384,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP521,
    },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha256),
    },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha512),
    },
    Algorithm::Rsa { hash: None },
];

/// SSH algorithm policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SecurityLevel {
    /// Modern algorithms and known-hosts verification (default).
    #[default]
    Secure,
    /// Maximum compatibility with legacy devices, no host key check.
    LegacyCompatible,
}

impl SecurityLevel {
    fn preferred(self) -> Preferred {
        match self {
            SecurityLevel::Secure => Preferred {
                kex: Cow::Borrowed(SECURE_KEX_ORDER),
                key: Cow::Borrowed(KEY_TYPES),
                cipher: Cow::Borrowed(SECURE_CIPHERS),
                mac: Cow::Borrowed(SECURE_MAC_ALGORITHMS),
                compression: Cow::Borrowed(COMPRESSION_ALGORITHMS),
            },
            SecurityLevel::LegacyCompatible => Preferred {
                kex: Cow::Borrowed(LEGACY_KEX_ORDER),
                key: Cow::Borrowed(KEY_TYPES),
                cipher: Cow::Borrowed(LEGACY_CIPHERS),
                mac: Cow::Borrowed(LEGACY_MAC_ALGORITHMS),
                compression: Cow::Borrowed(COMPRESSION_ALGORITHMS),
            },
        }
    }

    fn server_check(self) -> ServerCheckMethod {
        match self {
            SecurityLevel::Secure => ServerCheckMethod::DefaultKnownHostsFile,
            SecurityLevel::LegacyCompatible => ServerCheckMethod::NoCheck,
        }
    }
}

/// Connection settings for one device.
#[derive(Debug, Clone)]
pub struct SshSettings {
    pub user: String,
    pub host: String,
    pub port: u16,
    pub password: String,
    pub security: SecurityLevel,
}

impl SshSettings {
    pub fn new(
        user: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        password: impl Into<String>,
    ) -> Self {
        SshSettings {
            user: user.into(),
            host: host.into(),
            port,
            password: password.into(),
            security: SecurityLevel::default(),
        }
    }

    pub fn with_security(mut self, security: SecurityLevel) -> Self {
        self.security = security;
        self
    }

    /// Pool key for this device connection.
    pub fn device_addr(&self) -> String {
        format!("{}@{}:{}", self.user, self.host, self.port)
    }
}

/// Control characters some devices emit at line starts (carriage returns,
/// backspace runs) that must be stripped before prompt matching.
static LINE_NOISE: Lazy<Regex> =
    Lazy::new(|| match Regex::new(r"^(\r+(\s+\r+)*)|(\u{8}+(\s+\u{8}+)*)") {
        Ok(re) => re,
        Err(err) => panic!("invalid LINE_NOISE regex: {err}"),
    });

/// Builds the prompt matcher, normalizing each pattern with the pty line
/// prefix devices prepend (`NUL` runs and an optional carriage return).
fn compile_prompt_set(patterns: &[String]) -> Result<RegexSet, TranslateError> {
    if patterns.is_empty() {
        return Err(TranslateError::InvalidDialect(
            "dialect has no prompt patterns".to_string(),
        ));
    }
    let normalized: Vec<String> = patterns
        .iter()
        .map(|p| format!(r"^\x00*\r{{0,1}}{}", p.trim_start_matches('^')))
        .collect();
    RegexSet::new(&normalized)
        .map_err(|err| TranslateError::InvalidDialect(format!("invalid prompt pattern: {err}")))
}

/// Removes the echoed command and the trailing prompt line from raw output.
fn strip_echo_and_prompt(command: &str, raw: &str) -> String {
    let mut content = raw;
    if !command.is_empty() && content.starts_with(command) {
        content = content
            .strip_prefix(command)
            .unwrap_or(content)
            .trim_start_matches(['\n', '\r']);
    }
    match content.rfind('\n') {
        Some(pos) => content[..=pos].to_string(),
        None => String::new(),
    }
}

/// SSH shell transport over a russh channel.
pub struct SshTransport {
    client: Client,
    to_shell: mpsc::Sender<String>,
    from_shell: mpsc::Receiver<String>,
    prompt_set: RegexSet,
    device_addr: String,
}

impl SshTransport {
    /// Connects, opens a shell and waits for the first prompt.
    pub async fn connect(
        settings: &SshSettings,
        dialect: &Dialect,
    ) -> Result<SshTransport, TranslateError> {
        let prompt_set = compile_prompt_set(dialect.prompt_patterns())?;
        let device_addr = settings.device_addr();

        let config = Config {
            preferred: settings.security.preferred(),
            inactivity_timeout: Some(Duration::from_secs(60)),
            ..Default::default()
        };
        let client = Client::connect_with_config(
            (settings.host.clone(), settings.port),
            &settings.user,
            AuthMethod::with_password(&settings.password),
            settings.security.server_check(),
            config,
        )
        .await?;
        debug!("{device_addr} TCP connection successful");

        let mut channel = client.get_channel().await?;
        channel
            .request_pty(false, "xterm", 800, 600, 0, 0, &[])
            .await?;
        channel.request_shell(false).await?;
        debug!("{device_addr} shell request successful");

        let (to_shell, mut from_caller) = mpsc::channel::<String>(256);
        let (to_caller, from_shell) = mpsc::channel::<String>(256);

        let io_addr = device_addr.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(data) = from_caller.recv() => {
                        if let Err(e) = channel.data(data.as_bytes()).await {
                            debug!("{io_addr} failed to send data to shell: {e:?}");
                            break;
                        }
                    },
                    Some(msg) = channel.wait() => {
                        match msg {
                            ChannelMsg::Data { ref data } => {
                                if let Ok(s) = std::str::from_utf8(data)
                                    && to_caller.send(s.to_string()).await.is_err() {
                                        debug!("{io_addr} shell output receiver dropped");
                                        break;
                                    }
                            }
                            ChannelMsg::ExitStatus { exit_status } => {
                                debug!("{io_addr} shell exited with status {exit_status}");
                                let _ = channel.eof().await;
                                break;
                            }
                            ChannelMsg::Eof => {
                                debug!("{io_addr} shell sent EOF");
                                break;
                            }
                            _ => {}
                        }
                    }
                }
            }
            debug!("{io_addr} SSH I/O task ended");
        });

        let mut transport = SshTransport {
            client,
            to_shell,
            from_shell,
            prompt_set,
            device_addr,
        };
        transport.wait_for_prompt().await?;
        Ok(transport)
    }

    fn is_prompt(&self, line: &str) -> bool {
        self.prompt_set.is_match(line)
    }

    /// Consumes banner output until the first prompt appears.
    async fn wait_for_prompt(&mut self) -> Result<(), TranslateError> {
        let mut buffer = String::new();
        tokio::time::timeout(Duration::from_secs(60), async {
            loop {
                match self.from_shell.recv().await {
                    Some(data) => {
                        buffer.push_str(&data);
                        while let Some(pos) = buffer.find('\n') {
                            buffer.drain(..=pos);
                        }
                        if !buffer.is_empty() && self.prompt_set.is_match(&buffer) {
                            return Ok(());
                        }
                    }
                    None => return Err(TranslateError::SessionClosed),
                }
            }
        })
        .await
        .map_err(|_| TranslateError::ExecTimeout("waiting for initial prompt".to_string()))?
    }
}

#[async_trait]
impl Transport for SshTransport {
    async fn send_command(
        &mut self,
        command: &str,
        timeout: Duration,
    ) -> Result<String, TranslateError> {
        // Drop residual data from a previous, possibly timed-out command.
        while self.from_shell.try_recv().is_ok() {}

        self.to_shell
            .send(format!("{command}\n"))
            .await
            .map_err(|_| TranslateError::SessionClosed)?;

        let mut output = String::new();
        let mut line_buffer = String::new();

        let result = tokio::time::timeout(timeout, async {
            loop {
                match self.from_shell.recv().await {
                    Some(data) => {
                        trace!("{} chunk: {data:?}", self.device_addr);
                        line_buffer.push_str(&data);

                        while let Some(pos) = line_buffer.find('\n') {
                            let line: String = line_buffer.drain(..=pos).collect();
                            let cleaned = LINE_NOISE.replace(&line, "");
                            output.push_str(&cleaned);
                        }

                        // The prompt arrives without a newline; the trailing
                        // partial line is the completion signal.
                        if !line_buffer.is_empty() {
                            let cleaned = LINE_NOISE.replace(&line_buffer, "").to_string();
                            if self.is_prompt(&cleaned) {
                                return Ok(());
                            }
                        }
                    }
                    None => return Err(TranslateError::SessionClosed),
                }
            }
        })
        .await;

        match result {
            Err(_) => Err(TranslateError::ExecTimeout(output)),
            Ok(Err(err)) => Err(err),
            Ok(Ok(())) => Ok(strip_echo_and_prompt(command, &output)),
        }
    }

    fn is_connected(&self) -> bool {
        !self.client.is_closed()
    }

    async fn close(&mut self) {
        self.from_shell.close();
        if self.is_connected() {
            if let Err(e) = self.to_shell.send("exit\n".to_string()).await {
                debug!("{} failed to send exit: {e:?}", self.device_addr);
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        debug!("{} SSH transport closed", self.device_addr);
    }
}
