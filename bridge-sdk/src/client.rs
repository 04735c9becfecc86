//! IRC client connection.
//!
//! This is the main entry point for SDK consumers. It manages the TCP
//! connection, IRC registration and keepalive, and emits events.
//! Supports both plaintext and TLS connections.
//!
//! ## Reconnection
//!
//! [`connect`] supervises the connection: when it drops, the client emits
//! [`Event::Disconnected`], waits with exponential backoff (2→4→8→16→30s cap,
//! plus jitter) and connects again. The [`ClientHandle`] stays valid across
//! reconnects. Only an explicit [`ClientHandle::quit`] stops the loop, and it
//! does so immediately even while the server is unreachable.
//!
//! Messages and actions issued while no connection is up are dropped rather
//! than replayed in a burst on reconnect. Other commands are carried over.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use rand::Rng;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_rustls::rustls;
use tokio_rustls::TlsConnector;

use crate::event::Event;
use crate::irc::{self, Message};

/// Configuration for connecting to an IRC server.
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    /// Server address (host:port).
    pub server_addr: String,
    /// Desired nickname.
    pub nick: String,
    /// Username (ident).
    pub user: String,
    /// Real name.
    pub realname: String,
    /// Use TLS.
    pub tls: bool,
    /// Skip TLS certificate verification (for self-signed certs).
    pub tls_insecure: bool,
    /// Channels to join once registered (and again after every reconnect).
    pub channels: Vec<String>,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:6667".to_string(),
            nick: "bridge".to_string(),
            user: "bridge".to_string(),
            realname: "IRC relay bridge".to_string(),
            tls: false,
            tls_insecure: false,
            channels: Vec::new(),
        }
    }
}

impl ConnectConfig {
    /// Host part of `server_addr`, used for TLS server name verification.
    pub fn host(&self) -> &str {
        match self.server_addr.rsplit_once(':') {
            Some((host, port)) if port.parse::<u16>().is_ok() => {
                host.trim_start_matches('[').trim_end_matches(']')
            }
            _ => &self.server_addr,
        }
    }
}

/// Commands the consumer can send to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Join(String),
    Privmsg { target: String, text: String },
    Action { target: String, text: String },
    Raw(String),
    Quit(Option<String>),
}

/// A handle to a running IRC client connection.
///
/// Cheap to clone and safe to use from any task. Commands issued before
/// registration completes are queued and flushed after `001`.
#[derive(Clone, Debug)]
pub struct ClientHandle {
    cmd_tx: mpsc::Sender<Command>,
}

impl ClientHandle {
    /// A handle with no connection behind it. Commands land on the returned
    /// receiver instead of a socket, which lets callers drive or inspect
    /// traffic without a server.
    pub fn detached(capacity: usize) -> (Self, mpsc::Receiver<Command>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(capacity);
        (Self { cmd_tx }, cmd_rx)
    }

    pub async fn join(&self, channel: &str) -> Result<()> {
        self.cmd_tx.send(Command::Join(channel.to_string())).await?;
        Ok(())
    }

    pub async fn privmsg(&self, target: &str, text: &str) -> Result<()> {
        self.cmd_tx
            .send(Command::Privmsg {
                target: target.to_string(),
                text: text.to_string(),
            })
            .await?;
        Ok(())
    }

    /// Send a CTCP ACTION (`/me`) to a target.
    pub async fn action(&self, target: &str, text: &str) -> Result<()> {
        self.cmd_tx
            .send(Command::Action {
                target: target.to_string(),
                text: text.to_string(),
            })
            .await?;
        Ok(())
    }

    pub async fn quit(&self, message: Option<&str>) -> Result<()> {
        self.cmd_tx
            .send(Command::Quit(message.map(|s| s.to_string())))
            .await?;
        Ok(())
    }

    pub async fn raw(&self, line: &str) -> Result<()> {
        self.cmd_tx.send(Command::Raw(line.to_string())).await?;
        Ok(())
    }

    // ── Non-blocking variants ──
    //
    // These never wait for queue capacity. They fail if the queue is full
    // or the connection task is gone.

    pub fn try_privmsg(&self, target: &str, text: &str) -> Result<()> {
        self.try_send(Command::Privmsg {
            target: target.to_string(),
            text: text.to_string(),
        })
    }

    pub fn try_action(&self, target: &str, text: &str) -> Result<()> {
        self.try_send(Command::Action {
            target: target.to_string(),
            text: text.to_string(),
        })
    }

    pub fn try_raw(&self, line: &str) -> Result<()> {
        self.try_send(Command::Raw(line.to_string()))
    }

    fn try_send(&self, cmd: Command) -> Result<()> {
        match self.cmd_tx.try_send(cmd) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => anyhow::bail!("command queue full"),
            Err(TrySendError::Closed(_)) => anyhow::bail!("connection task has stopped"),
        }
    }
}

/// Establish TCP (and optionally TLS) connection to the server.
pub async fn establish_connection(config: &ConnectConfig) -> Result<EstablishedConnection> {
    let mode = if config.tls { "TLS" } else { "plain" };

    tracing::debug!("Resolving {}...", config.server_addr);
    let tcp = TcpStream::connect(&config.server_addr)
        .await
        .with_context(|| format!("TCP connect to {} failed", config.server_addr))?;
    tracing::debug!("TCP connected to {} ({mode})", config.server_addr);

    if config.tls {
        let tls_config = if config.tls_insecure {
            tracing::debug!("TLS: insecure mode (skipping cert verification)");
            rustls_insecure_config()
        } else {
            tracing::debug!("TLS: verifying server certificate...");
            rustls_default_config()
        };
        let connector = TlsConnector::from(Arc::new(tls_config));
        let dns_name = rustls::pki_types::ServerName::try_from(config.host().to_string())?;
        let tls_stream = connector
            .connect(dns_name, tcp)
            .await
            .with_context(|| format!("TLS handshake with {} failed", config.server_addr))?;
        tracing::debug!("TLS handshake complete");
        Ok(EstablishedConnection::Tls(Box::new(tls_stream)))
    } else {
        Ok(EstablishedConnection::Plain(tcp))
    }
}

/// A connection that has completed TCP (and optionally TLS) but hasn't
/// started IRC registration yet.
pub enum EstablishedConnection {
    Plain(TcpStream),
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

/// Configuration for automatic reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Reconnect at all after the connection drops.
    pub enabled: bool,
    /// Initial delay before first reconnect attempt.
    pub initial_delay: Duration,
    /// Maximum delay between reconnect attempts.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_factor: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
        }
    }
}

impl ReconnectConfig {
    fn next_delay(&self, delay: Duration) -> Duration {
        let base = delay.as_millis() as f64 * self.backoff_factor;
        Duration::from_millis(base as u64 + rand_jitter(delay.as_millis() as u64 / 4))
            .min(self.max_delay)
    }
}

/// Random value in `0..max`.
fn rand_jitter(max: u64) -> u64 {
    if max == 0 {
        return 0;
    }
    rand::thread_rng().gen_range(0..max)
}

/// Connect to an IRC server and keep the connection alive.
///
/// Returns a handle for sending commands and a receiver for events.
/// Connection, registration and reconnection run in a spawned task; a
/// failure to connect is reported as [`Event::Disconnected`], never as an
/// error here.
pub fn connect(
    config: ConnectConfig,
    reconnect: ReconnectConfig,
) -> (ClientHandle, mpsc::Receiver<Event>) {
    let (event_tx, event_rx) = mpsc::channel(4096);
    let (handle, cmd_rx) = ClientHandle::detached(256);

    tokio::spawn(supervise(config, reconnect, event_tx, cmd_rx));

    (handle, event_rx)
}

/// How a single connection ended.
#[derive(Debug)]
enum SessionEnd {
    /// QUIT was requested.
    Quit,
    /// The server went away or the link failed.
    Lost(String),
}

async fn supervise(
    config: ConnectConfig,
    reconnect: ReconnectConfig,
    event_tx: mpsc::Sender<Event>,
    mut cmd_rx: mpsc::Receiver<Command>,
) {
    let mut delay = reconnect.initial_delay;
    let mut attempt = 0u32;
    let mut carried = Vec::new();

    loop {
        let mut registered = false;
        let end = run_session(&config, &event_tx, &mut cmd_rx, &mut carried, &mut registered)
            .await
            .unwrap_or_else(|e| SessionEnd::Lost(format!("{e:#}")));

        let reason = match end {
            SessionEnd::Quit => break,
            SessionEnd::Lost(reason) => reason,
        };

        let _ = event_tx
            .send(Event::Disconnected {
                reason: reason.clone(),
            })
            .await;

        if !reconnect.enabled || event_tx.is_closed() {
            return;
        }

        if registered {
            delay = reconnect.initial_delay;
            attempt = 0;
        }
        attempt += 1;
        tracing::warn!(
            server = %config.server_addr,
            error = %reason,
            attempt,
            delay_secs = delay.as_secs(),
            "Connection lost, retrying"
        );
        let slept = while_offline(tokio::time::sleep(delay), &mut cmd_rx, &mut carried).await;
        if slept.is_none() {
            break;
        }
        delay = reconnect.next_delay(delay);
    }

    tracing::info!(server = %config.server_addr, "Quit requested, closing connection");
    let _ = event_tx
        .send(Event::Disconnected {
            reason: "Quit".to_string(),
        })
        .await;
}

/// Drive `fut` while no session is reading commands. Messages and actions
/// are dropped, other commands are kept in `carried` for the next session.
/// Returns `None` as soon as a QUIT arrives.
async fn while_offline<F: Future>(
    fut: F,
    cmd_rx: &mut mpsc::Receiver<Command>,
    carried: &mut Vec<Command>,
) -> Option<F::Output> {
    tokio::pin!(fut);
    let mut dropped = 0usize;
    let output = loop {
        tokio::select! {
            output = &mut fut => break Some(output),
            Some(cmd) = cmd_rx.recv() => match cmd {
                Command::Quit(_) => break None,
                Command::Privmsg { .. } | Command::Action { .. } => dropped += 1,
                other => carried.push(other),
            },
        }
    };
    if dropped > 0 {
        tracing::debug!(dropped, "Dropped messages sent while disconnected");
    }
    output
}

async fn run_session(
    config: &ConnectConfig,
    event_tx: &mpsc::Sender<Event>,
    cmd_rx: &mut mpsc::Receiver<Command>,
    carried: &mut Vec<Command>,
    registered: &mut bool,
) -> Result<SessionEnd> {
    let Some(conn) = while_offline(establish_connection(config), cmd_rx, carried).await else {
        return Ok(SessionEnd::Quit);
    };
    let conn = conn?;
    let _ = event_tx.send(Event::Connected).await;
    let pending = std::mem::take(carried);
    match conn {
        EstablishedConnection::Plain(tcp) => {
            let (reader, writer) = tokio::io::split(tcp);
            let reader = BufReader::new(reader);
            run_irc(reader, writer, config, event_tx, cmd_rx, pending, registered).await
        }
        EstablishedConnection::Tls(tls) => {
            let (reader, writer) = tokio::io::split(*tls);
            let reader = BufReader::new(reader);
            run_irc(reader, writer, config, event_tx, cmd_rx, pending, registered).await
        }
    }
}

fn install_crypto_provider() {
    // ring wins when both features are on.
    #[cfg(feature = "ring")]
    {
        let _ = rustls::crypto::ring::default_provider().install_default();
    }
    #[cfg(all(feature = "aws-lc-rs", not(feature = "ring")))]
    {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    }
}

fn rustls_default_config() -> rustls::ClientConfig {
    install_crypto_provider();

    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth()
}

fn rustls_insecure_config() -> rustls::ClientConfig {
    install_crypto_provider();
    rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(InsecureVerifier))
        .with_no_client_auth()
}

#[derive(Debug)]
struct InsecureVerifier;

impl rustls::client::danger::ServerCertVerifier for InsecureVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::CryptoProvider::get_default()
            .map(|p| p.signature_verification_algorithms.supported_schemes())
            .unwrap_or_default()
    }
}

async fn run_irc<R, W>(
    reader: R,
    mut writer: W,
    config: &ConnectConfig,
    event_tx: &mpsc::Sender<Event>,
    cmd_rx: &mut mpsc::Receiver<Command>,
    mut pending_commands: Vec<Command>,
    registered: &mut bool,
) -> Result<SessionEnd>
where
    R: tokio::io::AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    send_line(&mut writer, &Message::new("NICK", vec![config.nick.clone()])).await?;
    send_line(
        &mut writer,
        &Message::new(
            "USER",
            vec![
                config.user.clone(),
                "0".to_string(),
                "*".to_string(),
                config.realname.clone(),
            ],
        ),
    )
    .await?;

    let mut nick_tries: u32 = 0;
    // Split on '\n' and decode lossily: peers on other networks may still
    // send latin-1, which must not kill the connection.
    let mut lines = reader.split(b'\n');
    let mut last_activity = tokio::time::Instant::now();
    let ping_interval = Duration::from_secs(60);
    let ping_timeout = Duration::from_secs(120);
    let mut keepalive =
        tokio::time::interval_at(tokio::time::Instant::now() + ping_interval, ping_interval);

    loop {
        tokio::select! {
            segment = lines.next_segment() => {
                let Some(bytes) = segment? else {
                    return Ok(SessionEnd::Lost("EOF".to_string()));
                };
                last_activity = tokio::time::Instant::now();
                let line = String::from_utf8_lossy(&bytes);
                tracing::trace!(server = %config.server_addr, line = %line.trim_end(), "<<");

                let Some(msg) = Message::parse(&line) else {
                    continue;
                };
                match msg.command.as_str() {
                    // ERR_NICKNAMEINUSE
                    "433" if !*registered => {
                        nick_tries = nick_tries.saturating_add(1);
                        if nick_tries > 5 {
                            return Ok(SessionEnd::Lost("Nick in use".to_string()));
                        }
                        let alt = format!("{}{}", config.nick, nick_tries);
                        tracing::info!(server = %config.server_addr, nick = %alt, "Nick in use, trying alternative");
                        send_line(&mut writer, &Message::new("NICK", vec![alt])).await?;
                    }
                    "001" => {
                        let nick = msg.params.first().cloned().unwrap_or_default();
                        *registered = true;
                        let _ = event_tx.send(Event::Registered { nick }).await;
                        // JOIN first: +n channels reject messages from non-members.
                        if !config.channels.is_empty() {
                            let joined = config.channels.join(",");
                            send_line(&mut writer, &Message::new("JOIN", vec![joined])).await?;
                        }
                        for cmd in pending_commands.drain(..) {
                            if execute_command(&mut writer, cmd).await? {
                                return Ok(SessionEnd::Quit);
                            }
                        }
                    }
                    "PING" => {
                        let token = msg.params.first().cloned().unwrap_or_default();
                        send_line(&mut writer, &Message::new("PONG", vec![token])).await?;
                    }
                    _ => {
                        if let Some(event) = translate(&msg) {
                            let _ = event_tx.send(event).await;
                        }
                    }
                }
            }
            Some(cmd) = cmd_rx.recv() => {
                if *registered || matches!(cmd, Command::Quit(_)) {
                    if execute_command(&mut writer, cmd).await? {
                        return Ok(SessionEnd::Quit);
                    }
                } else {
                    // Held until registration completes
                    pending_commands.push(cmd);
                }
            }
            _ = keepalive.tick() => {
                let idle = last_activity.elapsed();
                if idle > ping_timeout {
                    return Ok(SessionEnd::Lost("Ping timeout".to_string()));
                }
                if idle >= ping_interval {
                    send_line(&mut writer, &Message::new("PING", vec!["keepalive".to_string()])).await?;
                }
            }
        }
    }
}

/// Map a server line onto a consumer event. Stateful lines (registration,
/// PING) are handled by the connection loop and never reach here.
fn translate(msg: &Message) -> Option<Event> {
    let nick = || msg.nick().unwrap_or("").to_string();
    let param = |i: usize| msg.params.get(i).cloned();
    let reason = |i: usize| msg.params.get(i).filter(|r| !r.is_empty()).cloned();

    match msg.command.as_str() {
        "JOIN" => Some(Event::Joined {
            channel: param(0)?,
            nick: nick(),
        }),
        "PART" => Some(Event::Parted {
            channel: param(0)?,
            nick: nick(),
            reason: reason(1),
        }),
        "KICK" => Some(Event::Kicked {
            channel: param(0)?,
            nick: param(1)?,
            by: msg.nick().unwrap_or("server").to_string(),
            reason: reason(2),
        }),
        "NICK" => {
            let old_nick = nick();
            let new_nick = param(0)?;
            if old_nick.is_empty() || new_nick.is_empty() {
                return None;
            }
            Some(Event::NickChanged { old_nick, new_nick })
        }
        "QUIT" => Some(Event::UserQuit {
            nick: nick(),
            reason: reason(0),
        }),
        "PRIVMSG" => {
            let target = param(0)?;
            let text = param(1)?;
            let from = nick();
            if let Some(body) = irc::parse_action(&text) {
                return Some(Event::Action {
                    from,
                    target,
                    text: body.to_string(),
                });
            }
            if text.starts_with('\x01') {
                // Other CTCP requests (VERSION, PING, ...) are not answered.
                return None;
            }
            Some(Event::Message { from, target, text })
        }
        "NOTICE" if !msg.from_user() => Some(Event::ServerNotice { text: param(1)? }),
        "ERROR" => Some(Event::ServerNotice { text: param(0)? }),
        command => {
            // Error numerics: skip our nick (param[0]) and join the rest
            let num = command.parse::<u16>().ok()?;
            if !(400..600).contains(&num) {
                return None;
            }
            let text = msg.params.get(1..).unwrap_or_default().join(" ");
            Some(Event::ServerNotice {
                text: format!("{num} {text}"),
            })
        }
    }
}

/// Execute a single IRC command on the wire. Returns `true` for QUIT.
async fn execute_command<W: AsyncWrite + Unpin>(writer: &mut W, cmd: Command) -> Result<bool> {
    let msg = match cmd {
        Command::Join(channel) => Message::new("JOIN", vec![channel]),
        Command::Privmsg { target, text } => Message::new("PRIVMSG", vec![target, text]),
        Command::Action { target, text } => {
            Message::new("PRIVMSG", vec![target, irc::format_action(&text)])
        }
        Command::Raw(line) => {
            writer.write_all(format!("{line}\r\n").as_bytes()).await?;
            writer.flush().await?;
            return Ok(false);
        }
        Command::Quit(message) => {
            send_line(writer, &Message::new("QUIT", message.into_iter().collect())).await?;
            return Ok(true);
        }
    };
    send_line(writer, &msg).await?;
    Ok(false)
}

async fn send_line<W: AsyncWrite + Unpin>(writer: &mut W, msg: &Message) -> Result<()> {
    tracing::trace!(line = %msg, ">>");
    writer.write_all(format!("{msg}\r\n").as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}
