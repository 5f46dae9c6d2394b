//! IRC client connection.
//!
//! Manages the TCP (optionally TLS) connection, IRC registration, keepalive
//! and emits [`Event`]s. Consumers send commands through a cloneable
//! [`ClientHandle`].
//!
//! ## Reconnection
//!
//! [`connect_with_stream`] runs a single connection. [`run_with_reconnect`]
//! wraps it with exponential backoff and rejoins channels after every
//! successful registration.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use rand::Rng;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls;

use crate::event::Event;
use crate::irc::{self, Message};

/// Nick collision retries before giving up on registration.
const MAX_NICK_TRIES: u32 = 5;

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
    /// Server password sent with PASS before registration.
    pub password: Option<String>,
    /// Use TLS.
    pub tls: bool,
    /// Skip TLS certificate verification (for self-signed certs).
    pub tls_insecure: bool,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:6667".to_string(),
            nick: "bender".to_string(),
            user: "bender".to_string(),
            realname: "Bender Bending Rodriguez".to_string(),
            password: None,
            tls: false,
            tls_insecure: false,
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
#[derive(Clone)]
pub struct ClientHandle {
    cmd_tx: mpsc::Sender<Command>,
}

impl ClientHandle {
    /// A handle whose commands are delivered to the returned receiver
    /// instead of a live connection. Useful for tests and custom transports.
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

    /// Send a CTCP ACTION (`/me does something`).
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
}

/// A connection that has completed TCP (and optionally TLS) but hasn't
/// started IRC registration yet.
pub enum EstablishedConnection {
    Plain(TcpStream),
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

/// Establish TCP (and optionally TLS) connection to the server.
pub async fn establish_connection(config: &ConnectConfig) -> Result<EstablishedConnection> {
    // Auto-detect TLS from port if not explicitly set
    let use_tls = config.tls || config.server_addr.ends_with(":6697");
    let mode = if use_tls { "TLS" } else { "plain" };

    tracing::debug!("Resolving {}...", config.server_addr);
    let tcp = TcpStream::connect(&config.server_addr)
        .await
        .map_err(|e| anyhow::anyhow!("TCP connect to {} failed: {e}", config.server_addr))?;
    tracing::debug!("TCP connected to {} ({mode})", config.server_addr);

    if !use_tls {
        return Ok(EstablishedConnection::Plain(tcp));
    }

    let tls_config = if config.tls_insecure {
        tracing::debug!("TLS: insecure mode (skipping cert verification)");
        rustls_insecure_config()
    } else {
        rustls_default_config()
    };
    let connector = TlsConnector::from(Arc::new(tls_config));
    let server_name = config
        .server_addr
        .split(':')
        .next()
        .unwrap_or("localhost");
    let dns_name = rustls::pki_types::ServerName::try_from(server_name.to_string())?;
    let tls_stream = connector
        .connect(dns_name, tcp)
        .await
        .map_err(|e| anyhow::anyhow!("TLS handshake with {} failed: {e}", config.server_addr))?;
    tracing::debug!("TLS handshake complete");
    Ok(EstablishedConnection::Tls(Box::new(tls_stream)))
}

/// Connect using an already-established connection.
///
/// Returns a handle for sending commands and a receiver for events.
/// The IRC protocol runs in a spawned task.
pub fn connect_with_stream(
    conn: EstablishedConnection,
    config: ConnectConfig,
) -> (ClientHandle, mpsc::Receiver<Event>) {
    let (event_tx, event_rx) = mpsc::channel(4096);
    let (cmd_tx, cmd_rx) = mpsc::channel(256);

    let handle = ClientHandle { cmd_tx };

    tokio::spawn(async move {
        let _ = event_tx.send(Event::Connected).await;
        let result = match conn {
            EstablishedConnection::Plain(tcp) => {
                let (reader, writer) = tokio::io::split(tcp);
                run_irc(BufReader::new(reader), writer, &config, event_tx.clone(), cmd_rx).await
            }
            EstablishedConnection::Tls(tls) => {
                let (reader, writer) = tokio::io::split(*tls);
                run_irc(BufReader::new(reader), writer, &config, event_tx.clone(), cmd_rx).await
            }
        };
        if let Err(e) = result {
            let _ = event_tx
                .send(Event::Disconnected {
                    reason: e.to_string(),
                })
                .await;
        }
    });

    (handle, event_rx)
}

fn install_crypto_provider() {
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
    mut reader: R,
    mut writer: W,
    config: &ConnectConfig,
    event_tx: mpsc::Sender<Event>,
    mut cmd_rx: mpsc::Receiver<Command>,
) -> Result<()>
where
    R: tokio::io::AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    if let Some(ref password) = config.password {
        writer.write_all(format!("PASS {password}\r\n").as_bytes()).await?;
    }
    writer
        .write_all(format!("NICK {}\r\n", config.nick).as_bytes())
        .await?;
    writer
        .write_all(format!("USER {} 0 * :{}\r\n", config.user, config.realname).as_bytes())
        .await?;

    let mut registered = false;
    let mut nick_tries: u32 = 0;
    let mut pending_commands: Vec<Command> = Vec::new();
    let mut line_buf: Vec<u8> = Vec::new();
    let ping_interval = Duration::from_secs(60);
    let ping_timeout = Duration::from_secs(120);
    let mut last_activity = tokio::time::Instant::now();
    let mut keepalive_at = last_activity + ping_interval;

    loop {
        tokio::select! {
            result = reader.read_until(b'\n', &mut line_buf) => {
                let n = result?;
                if n == 0 {
                    let _ = event_tx.send(Event::Disconnected { reason: "EOF".to_string() }).await;
                    break;
                }

                last_activity = tokio::time::Instant::now();
                keepalive_at = last_activity + ping_interval;
                // Servers relay whatever bytes clients send; decode lossily
                // rather than dropping the connection on bad UTF-8.
                let raw_line = std::mem::take(&mut line_buf);
                let valid_utf8 = std::str::from_utf8(&raw_line).is_ok();
                let line = String::from_utf8_lossy(&raw_line).into_owned();
                let _ = event_tx.send(Event::RawLine(line.trim_end().to_string())).await;

                let Some(msg) = Message::parse(&line) else { continue };
                match msg.command.as_str() {
                    // ERR_NICKNAMEINUSE
                    "433" if !registered => {
                        nick_tries = nick_tries.saturating_add(1);
                        if nick_tries > MAX_NICK_TRIES {
                            let _ = event_tx.send(Event::Disconnected { reason: "Nick in use".to_string() }).await;
                            break;
                        }
                        let alt = format!("{}{}", config.nick, nick_tries);
                        writer.write_all(format!("NICK {alt}\r\n").as_bytes()).await?;
                    }
                    "001" => {
                        let nick = msg.params.first().cloned().unwrap_or_default();
                        let _ = event_tx.send(Event::Registered { nick }).await;
                        registered = true;
                        for cmd in pending_commands.drain(..) {
                            execute_command(&mut writer, cmd).await?;
                        }
                    }
                    "PING" => {
                        let token = msg.params.first().map(|s| s.as_str()).unwrap_or("");
                        writer.write_all(format!("PONG :{token}\r\n").as_bytes()).await?;
                    }
                    "ERROR" => {
                        let reason = msg.params.first().cloned().unwrap_or_else(|| "ERROR".to_string());
                        let _ = event_tx.send(Event::Disconnected { reason }).await;
                        break;
                    }
                    "JOIN" => {
                        let channel = msg.params.first().cloned().unwrap_or_default();
                        let nick = msg.source_nick().unwrap_or("").to_string();
                        let _ = event_tx.send(Event::Joined { channel, nick }).await;
                    }
                    "PART" => {
                        let channel = msg.params.first().cloned().unwrap_or_default();
                        let nick = msg.source_nick().unwrap_or("").to_string();
                        let _ = event_tx.send(Event::Parted { channel, nick }).await;
                    }
                    "NICK" => {
                        let old_nick = msg.source_nick().unwrap_or("").to_string();
                        let new_nick = msg.params.first().cloned().unwrap_or_default();
                        if !old_nick.is_empty() && !new_nick.is_empty() {
                            let _ = event_tx.send(Event::NickChanged { old_nick, new_nick }).await;
                        }
                    }
                    "KICK" => {
                        if msg.params.len() >= 2 {
                            let channel = msg.params[0].clone();
                            let nick = msg.params[1].clone();
                            let reason = msg.params.get(2).cloned().unwrap_or_default();
                            let by = msg.source_nick().unwrap_or("server").to_string();
                            let _ = event_tx.send(Event::Kicked { channel, nick, by, reason }).await;
                        }
                    }
                    "PRIVMSG" | "NOTICE" => {
                        if msg.params.len() < 2 {
                            continue;
                        }
                        let Some(from) = msg.source_nick().filter(|_| {
                            msg.prefix.as_deref().is_some_and(|p| p.contains('!'))
                        }) else {
                            let _ = event_tx.send(Event::ServerNotice { text: msg.params[1].clone() }).await;
                            continue;
                        };
                        let body = &msg.params[1];
                        let (text, action, raw) = match irc::parse_ctcp_action(body) {
                            Some(inner) => (inner.to_string(), true, None),
                            // Other CTCP requests (VERSION, PING, ...) are not answered.
                            None if body.starts_with('\x01') => continue,
                            None => {
                                let raw = (!valid_utf8)
                                    .then(|| irc::last_param_bytes(&raw_line))
                                    .flatten()
                                    .map(<[u8]>::to_vec);
                                (body.clone(), false, raw)
                            }
                        };
                        let _ = event_tx.send(Event::Message {
                            from: from.to_string(),
                            target: msg.params[0].clone(),
                            text,
                            action,
                            notice: msg.command == "NOTICE",
                            raw,
                            tags: msg.tags.clone(),
                        }).await;
                    }
                    _ => {
                        if let Ok(num) = msg.command.parse::<u16>()
                            && (400..600).contains(&num)
                        {
                            let text = if msg.params.len() > 1 {
                                msg.params[1..].join(" ")
                            } else {
                                msg.params.join(" ")
                            };
                            let _ = event_tx.send(Event::ServerNotice { text }).await;
                        }
                    }
                }
            }
            Some(cmd) = cmd_rx.recv() => {
                let quitting = matches!(cmd, Command::Quit(_));
                if registered || quitting {
                    execute_command(&mut writer, cmd).await?;
                    if quitting {
                        break;
                    }
                } else {
                    pending_commands.push(cmd);
                }
            }
            _ = tokio::time::sleep_until(keepalive_at) => {
                if last_activity.elapsed() >= ping_timeout {
                    let _ = event_tx.send(Event::Disconnected { reason: "Ping timeout".to_string() }).await;
                    break;
                }
                writer.write_all(b"PING :keepalive\r\n").await?;
                keepalive_at = last_activity + ping_timeout;
            }
        }
    }

    Ok(())
}

/// Strip line breaks so a single command can't smuggle extra IRC lines.
fn single_line(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}

async fn execute_command<W: AsyncWrite + Unpin>(writer: &mut W, cmd: Command) -> Result<()> {
    let line = match cmd {
        Command::Join(channel) => Message::new("JOIN", vec![&channel]).to_string(),
        Command::Privmsg { target, text } => {
            Message::new("PRIVMSG", vec![&target, &single_line(&text)]).to_string()
        }
        Command::Action { target, text } => {
            Message::new("PRIVMSG", vec![&target, &irc::ctcp_action(&single_line(&text))]).to_string()
        }
        Command::Raw(line) => single_line(&line),
        Command::Quit(Some(m)) => format!("QUIT :{}", single_line(&m)),
        Command::Quit(None) => "QUIT".to_string(),
    };
    writer.write_all(format!("{line}\r\n").as_bytes()).await?;
    Ok(())
}

// ── Reconnect helper ──

/// Configuration for automatic reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Initial delay before first reconnect attempt.
    pub initial_delay: Duration,
    /// Maximum delay between reconnect attempts.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_factor: f64,
    /// Channels to join after every registration.
    pub channels: Vec<String>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
            channels: Vec::new(),
        }
    }
}

impl ReconnectConfig {
    /// Next backoff delay after `delay`, with up to 25% jitter, capped at `max_delay`.
    fn next_delay(&self, delay: Duration) -> Duration {
        let jitter = rand_jitter(delay.as_millis() as u64 / 4);
        Duration::from_millis(
            ((delay.as_millis() as f64 * self.backoff_factor) as u64 + jitter)
                .min(self.max_delay.as_millis() as u64),
        )
    }
}

/// Run an event loop with automatic reconnection.
///
/// The `handler` is called for each event. When disconnected, the loop
/// reconnects with exponential backoff and rejoins configured channels.
/// Handler errors are logged and do not stop the loop.
pub async fn run_with_reconnect<F>(
    config: ConnectConfig,
    reconnect_config: ReconnectConfig,
    handler: F,
) -> Result<()>
where
    F: Fn(ClientHandle, Event) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send>>
        + Send
        + Sync,
{
    let mut delay = reconnect_config.initial_delay;
    let mut consecutive_failures = 0u32;

    loop {
        let conn = match establish_connection(&config).await {
            Ok(c) => {
                consecutive_failures = 0;
                delay = reconnect_config.initial_delay;
                c
            }
            Err(e) => {
                consecutive_failures += 1;
                tracing::warn!(
                    server = %config.server_addr,
                    error = %e,
                    attempt = consecutive_failures,
                    delay_secs = delay.as_secs(),
                    "Connection failed, retrying"
                );
                tokio::time::sleep(delay).await;
                delay = reconnect_config.next_delay(delay);
                continue;
            }
        };

        let (handle, mut events) = connect_with_stream(conn, config.clone());

        while let Some(event) = events.recv().await {
            // JOINs sent before registration are dropped by servers.
            if matches!(&event, Event::Registered { .. }) {
                for ch in &reconnect_config.channels {
                    let _ = handle.join(ch).await;
                }
            }
            let disconnected = matches!(&event, Event::Disconnected { .. });
            if let Err(e) = handler(handle.clone(), event).await {
                tracing::error!(error = %e, "Handler error");
            }
            if disconnected {
                break;
            }
        }

        tracing::info!(
            server = %config.server_addr,
            delay_secs = delay.as_secs(),
            "Disconnected, will reconnect"
        );
        tokio::time::sleep(delay).await;
        delay = reconnect_config.next_delay(delay);
    }
}

/// Random value in `0..max`.
fn rand_jitter(max: u64) -> u64 {
    if max == 0 {
        return 0;
    }
    rand::thread_rng().gen_range(0..max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncBufReadExt;

    async fn next_message(events: &mut mpsc::Receiver<Event>) -> Event {
        loop {
            match events.recv().await.expect("event channel closed") {
                Event::RawLine(_) => continue,
                other => return other,
            }
        }
    }

    #[tokio::test]
    async fn registration_ping_and_action() {
        let (client, server) = tokio::io::duplex(4096);
        let (cr, cw) = tokio::io::split(client);
        let (event_tx, mut events) = mpsc::channel(64);
        let (handle, cmd_rx) = ClientHandle::detached(8);
        let config = ConnectConfig {
            password: Some("hunter2".to_string()),
            ..Default::default()
        };
        let task = tokio::spawn(async move {
            run_irc(BufReader::new(cr), cw, &config, event_tx, cmd_rx).await
        });

        let (sr, mut sw) = tokio::io::split(server);
        let mut sr = BufReader::new(sr);
        let mut line = String::new();
        sr.read_line(&mut line).await.unwrap();
        assert_eq!(line, "PASS hunter2\r\n");
        line.clear();
        sr.read_line(&mut line).await.unwrap();
        assert_eq!(line, "NICK bender\r\n");
        line.clear();
        sr.read_line(&mut line).await.unwrap();
        assert!(line.starts_with("USER bender 0 * :"));

        // Queued until registration completes
        handle.join("#bender").await.unwrap();

        sw.write_all(b":irc.test 001 bender :Welcome\r\n").await.unwrap();
        match next_message(&mut events).await {
            Event::Registered { nick } => assert_eq!(nick, "bender"),
            other => panic!("unexpected event {other:?}"),
        }
        line.clear();
        sr.read_line(&mut line).await.unwrap();
        assert_eq!(line, "JOIN #bender\r\n");

        sw.write_all(b"PING :abc\r\n").await.unwrap();
        line.clear();
        sr.read_line(&mut line).await.unwrap();
        assert_eq!(line, "PONG :abc\r\n");

        sw.write_all(b":alice!a@host PRIVMSG #bender :\x01ACTION waves\x01\r\n")
            .await
            .unwrap();
        match next_message(&mut events).await {
            Event::Message { from, target, text, action, .. } => {
                assert_eq!(from, "alice");
                assert_eq!(target, "#bender");
                assert_eq!(text, "waves");
                assert!(action);
            }
            other => panic!("unexpected event {other:?}"),
        }

        handle.action("#bender", "pours coffee").await.unwrap();
        line.clear();
        sr.read_line(&mut line).await.unwrap();
        assert_eq!(line, "PRIVMSG #bender :\x01ACTION pours coffee\x01\r\n");

        handle.quit(Some("bye now")).await.unwrap();
        line.clear();
        sr.read_line(&mut line).await.unwrap();
        assert_eq!(line, "QUIT :bye now\r\n");

        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn notices_and_undecodable_bodies_are_flagged() {
        let (client, server) = tokio::io::duplex(4096);
        let (cr, cw) = tokio::io::split(client);
        let (event_tx, mut events) = mpsc::channel(64);
        let (_handle, cmd_rx) = ClientHandle::detached(8);
        let config = ConnectConfig::default();
        let task = tokio::spawn(async move {
            run_irc(BufReader::new(cr), cw, &config, event_tx, cmd_rx).await
        });

        let (sr, mut sw) = tokio::io::split(server);
        sw.write_all(b":otherbot!o@host NOTICE #bender :!? foo\r\n").await.unwrap();
        match next_message(&mut events).await {
            Event::Message { from, text, notice, raw, .. } => {
                assert_eq!(from, "otherbot");
                assert_eq!(text, "!? foo");
                assert!(notice);
                assert!(raw.is_none());
            }
            other => panic!("unexpected event {other:?}"),
        }

        sw.write_all(b":alice!a@host PRIVMSG #bender :!! foo is \xff\xfebar\r\n")
            .await
            .unwrap();
        match next_message(&mut events).await {
            Event::Message { text, notice, raw, .. } => {
                assert_eq!(text, "!! foo is \u{FFFD}\u{FFFD}bar");
                assert!(!notice);
                assert_eq!(raw.as_deref(), Some(&b"!! foo is \xff\xfebar"[..]));
            }
            other => panic!("unexpected event {other:?}"),
        }

        drop(sw);
        drop(sr);
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn nick_collision_retries_with_suffix() {
        let (client, server) = tokio::io::duplex(4096);
        let (cr, cw) = tokio::io::split(client);
        let (event_tx, _events) = mpsc::channel(64);
        let (_handle, cmd_rx) = ClientHandle::detached(8);
        let config = ConnectConfig::default();
        let task = tokio::spawn(async move {
            run_irc(BufReader::new(cr), cw, &config, event_tx, cmd_rx).await
        });

        let (sr, mut sw) = tokio::io::split(server);
        let mut sr = BufReader::new(sr);
        let mut line = String::new();
        for _ in 0..2 {
            line.clear();
            sr.read_line(&mut line).await.unwrap();
        }
        sw.write_all(b":irc.test 433 * bender :Nickname is already in use\r\n")
            .await
            .unwrap();
        line.clear();
        sr.read_line(&mut line).await.unwrap();
        assert_eq!(line, "NICK bender1\r\n");

        drop(sw);
        drop(sr);
        task.await.unwrap().unwrap();
    }

    #[test]
    fn backoff_is_capped() {
        let cfg = ReconnectConfig::default();
        let mut delay = cfg.initial_delay;
        for _ in 0..10 {
            delay = cfg.next_delay(delay);
        }
        assert_eq!(delay, cfg.max_delay);
    }
}
