//! Per-host SSH sessions
//!
//! Each monitored host gets exactly one session, owned by its poll worker:
//! - Connect with key-based or password credentials (key wins when both set)
//! - Execute remote commands with a bounded timeout
//! - Self-heal: a dropped connection reconnects on the next execute call
//!
//! [`Session`] is the capability metrics and workers program against;
//! [`SshSession`] is the production implementation on top of ssh2.

use crate::config::HostConfig;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// TCP connect bound for a session attempt.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Bound on one remote command, applied to all blocking transport calls.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection lifecycle of a session, owned solely by the session itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected,
}

/// Errors surfaced while establishing or driving a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("cannot resolve {host}:{port}")]
    Resolve { host: String, port: u16 },
    #[error("connection to {host}:{port} failed: {source}")]
    Connect {
        host: String,
        port: u16,
        source: std::io::Error,
    },
    #[error("authentication failed for {user}@{host}: {source}")]
    Auth {
        user: String,
        host: String,
        source: ssh2::Error,
    },
    #[error("no credentials configured for {user}@{host}")]
    NoCredentials { user: String, host: String },
    #[error("transport error: {0}")]
    Transport(#[from] ssh2::Error),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("background task failed: {0}")]
    Task(String),
}

/// Command-execution capability of one remote host.
///
/// `execute` is the required blocking path. `execute_async` is the
/// cooperative path workers prefer; the default delegates to the blocking
/// call, and implementations with a real non-blocking route (see
/// [`SshSession`]) override it so several commands can be in flight within
/// one poll cycle.
#[async_trait]
pub trait Session: Send + Sync {
    /// Establishes the transport. On failure the state stays
    /// `Disconnected` and the reason is returned, never panicked.
    fn connect(&self) -> Result<(), SessionError>;

    /// Cooperative connect; defaults to the blocking path.
    async fn connect_async(&self) -> Result<(), SessionError> {
        self.connect()
    }

    /// Releases the transport. Idempotent.
    fn disconnect(&self);

    fn state(&self) -> SessionState;

    /// Runs `command` on the host and returns its stdout.
    ///
    /// Reconnects first when `Disconnected` (a failed reconnect returns
    /// `None` without executing). Any error output from the remote side
    /// yields `None` rather than mixing stderr into the result; a transport
    /// failure yields `None` and drops the session back to `Disconnected`.
    /// Safe to call in a tight loop - the next call self-heals.
    fn execute(&self, command: &str) -> Option<String>;

    /// Cooperative execute; defaults to the blocking path.
    async fn execute_async(&self, command: &str) -> Option<String> {
        self.execute(command)
    }
}

/// Where and how to reach one host.
#[derive(Debug, Clone)]
pub struct SshTarget {
    pub hostname: String,
    pub port: u16,
    pub username: String,
    /// Private key path; takes precedence over `password` when both are set.
    pub key_filename: Option<PathBuf>,
    pub password: Option<String>,
}

impl SshTarget {
    pub fn from_config(config: &HostConfig) -> Self {
        Self {
            hostname: config.hostname.clone(),
            port: config.port,
            username: config.username.clone(),
            key_filename: config.key_filename.clone().map(PathBuf::from),
            password: config.password.clone(),
        }
    }
}

struct Inner {
    session: Option<ssh2::Session>,
    state: SessionState,
}

/// SSH session handle for one host.
///
/// Cheap to clone; all clones share the underlying connection, guarded by a
/// mutex so concurrent async executes serialize on the transport.
#[derive(Clone)]
pub struct SshSession {
    target: Arc<SshTarget>,
    inner: Arc<Mutex<Inner>>,
}

impl SshSession {
    pub fn new(target: SshTarget) -> Self {
        Self {
            target: Arc::new(target),
            inner: Arc::new(Mutex::new(Inner {
                session: None,
                state: SessionState::Disconnected,
            })),
        }
    }

    pub fn for_host(config: &HostConfig) -> Self {
        Self::new(SshTarget::from_config(config))
    }

    fn connect_locked(inner: &mut Inner, target: &SshTarget) -> Result<(), SessionError> {
        let addr = (target.hostname.as_str(), target.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| SessionError::Resolve {
                host: target.hostname.clone(),
                port: target.port,
            })?;

        let tcp = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT).map_err(|source| {
            SessionError::Connect {
                host: target.hostname.clone(),
                port: target.port,
                source,
            }
        })?;

        let mut session = ssh2::Session::new()?;
        session.set_tcp_stream(tcp);
        session.set_timeout(COMMAND_TIMEOUT.as_millis() as u32);
        session.handshake()?;

        if let Some(key) = &target.key_filename {
            session
                .userauth_pubkey_file(&target.username, None, key, None)
                .map_err(|source| SessionError::Auth {
                    user: target.username.clone(),
                    host: target.hostname.clone(),
                    source,
                })?;
        } else if let Some(password) = &target.password {
            session
                .userauth_password(&target.username, password)
                .map_err(|source| SessionError::Auth {
                    user: target.username.clone(),
                    host: target.hostname.clone(),
                    source,
                })?;
        } else {
            return Err(SessionError::NoCredentials {
                user: target.username.clone(),
                host: target.hostname.clone(),
            });
        }

        debug!("connected to {}@{}:{}", target.username, target.hostname, target.port);
        inner.session = Some(session);
        inner.state = SessionState::Connected;
        Ok(())
    }

    fn run_command(session: &ssh2::Session, command: &str) -> Result<Option<String>, SessionError> {
        let mut channel = session.channel_session()?;
        channel.exec(command)?;

        let mut stdout = String::new();
        channel.read_to_string(&mut stdout)?;
        let mut stderr = String::new();
        channel.stderr().read_to_string(&mut stderr)?;
        let _ = channel.wait_close();

        if !stderr.is_empty() {
            debug!("command produced error output: {}", stderr.trim());
            return Ok(None);
        }
        Ok(Some(stdout))
    }

    fn connect_blocking(&self) -> Result<(), SessionError> {
        let mut inner = self.inner.lock();
        if inner.state == SessionState::Connected {
            return Ok(());
        }
        Self::connect_locked(&mut inner, &self.target)
    }

    fn execute_blocking(&self, command: &str) -> Option<String> {
        let mut inner = self.inner.lock();
        if inner.state == SessionState::Disconnected {
            if let Err(e) = Self::connect_locked(&mut inner, &self.target) {
                warn!("{}: reconnect failed: {}", self.target.hostname, e);
                return None;
            }
        }

        let session = inner.session.as_ref()?;
        match Self::run_command(session, command) {
            Ok(output) => output,
            Err(e) => {
                // transport is gone; the next execute call reconnects
                warn!("{}: command failed: {}", self.target.hostname, e);
                inner.session = None;
                inner.state = SessionState::Disconnected;
                None
            }
        }
    }
}

#[async_trait]
impl Session for SshSession {
    fn connect(&self) -> Result<(), SessionError> {
        self.connect_blocking()
    }

    async fn connect_async(&self) -> Result<(), SessionError> {
        let session = self.clone();
        match tokio::task::spawn_blocking(move || session.connect_blocking()).await {
            Ok(result) => result,
            Err(e) => Err(SessionError::Task(e.to_string())),
        }
    }

    fn disconnect(&self) {
        let mut inner = self.inner.lock();
        if let Some(session) = inner.session.take() {
            let _ = session.disconnect(None, "closing", None);
        }
        inner.state = SessionState::Disconnected;
    }

    fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    fn execute(&self, command: &str) -> Option<String> {
        self.execute_blocking(command)
    }

    async fn execute_async(&self, command: &str) -> Option<String> {
        let session = self.clone();
        let command = command.to_string();
        match tokio::task::spawn_blocking(move || session.execute_blocking(&command)).await {
            Ok(output) => output,
            Err(e) => {
                warn!("{}: execute task failed: {}", self.target.hostname, e);
                None
            }
        }
    }
}
