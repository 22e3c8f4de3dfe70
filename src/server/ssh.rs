//! The SSH wire-protocol bridge. `russh` owns the transport, key exchange,
//! and channel framing (spec §1/§6's external collaborator); this module
//! turns authenticated, byte-oriented channels into line-based [`Shell`]
//! input and plumbs `Shell` output back out as raw channel data.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use russh::keys::PublicKey;
use russh::server::{Auth, Handle, Handler, Msg, Session};
use russh::{Channel, ChannelId, CryptoVec};
use tokio::sync::{mpsc, Mutex};

use crate::audit::{record_session_start, AuditStore};
use crate::error::HiveError;
use crate::host::Fleet;
use crate::session::{Session as AttackSession, SessionRecord};
use crate::shell::Shell;
use crate::terminal::Terminal;

/// Shared, per-listener state cloned into every accepted connection.
#[derive(Clone)]
pub struct SshServer {
    pub fleet: Arc<Fleet>,
    pub audit: Arc<AuditStore>,
    pub default_hostname: String,
    pub session_tx: mpsc::Sender<SessionRecord>,
}

impl russh::server::Server for SshServer {
    type Handler = SshHandler;

    fn new_client(&mut self, peer_addr: Option<SocketAddr>) -> SshHandler {
        SshHandler {
            fleet: self.fleet.clone(),
            audit: self.audit.clone(),
            default_hostname: self.default_hostname.clone(),
            session_tx: self.session_tx.clone(),
            peer_addr,
            username: None,
            input_tx: None,
        }
    }
}

/// Per-connection handler. Only password auth against the default vhost's
/// credential map is accepted (spec §4.4); everything else is rejected.
pub struct SshHandler {
    fleet: Arc<Fleet>,
    audit: Arc<AuditStore>,
    default_hostname: String,
    session_tx: mpsc::Sender<SessionRecord>,
    peer_addr: Option<SocketAddr>,
    username: Option<String>,
    input_tx: Option<mpsc::Sender<Vec<u8>>>,
}

#[async_trait]
impl Handler for SshHandler {
    type Error = anyhow::Error;

    async fn auth_none(&mut self, _user: &str) -> Result<Auth, Self::Error> {
        Ok(Auth::Reject { proceed_with_methods: None })
    }

    async fn auth_publickey_offered(
        &mut self,
        _user: &str,
        _public_key: &PublicKey,
    ) -> Result<Auth, Self::Error> {
        Ok(Auth::Reject { proceed_with_methods: None })
    }

    async fn auth_password(&mut self, user: &str, password: &str) -> Result<Auth, Self::Error> {
        let Some(default_host) = self.fleet.default_host(&self.default_hostname) else {
            return Ok(Auth::Reject { proceed_with_methods: None });
        };
        if default_host.lock().await.authenticate(user, password) {
            self.username = Some(user.to_string());
            Ok(Auth::Accept)
        } else {
            Ok(Auth::Reject { proceed_with_methods: None })
        }
    }

    async fn channel_open_session(
        &mut self,
        _channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }

    async fn shell_request(
        &mut self,
        channel_id: ChannelId,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        session.channel_success(channel_id)?;

        let (input_tx, input_rx) = mpsc::channel::<Vec<u8>>(64);
        self.input_tx = Some(input_tx);

        let fleet = self.fleet.clone();
        let audit = self.audit.clone();
        let default_hostname = self.default_hostname.clone();
        let username = self.username.clone().unwrap_or_else(|| "root".to_string());
        let source_ip = self
            .peer_addr
            .map(|a| a.ip())
            .unwrap_or_else(|| "0.0.0.0".parse().unwrap());
        let source_port = self.peer_addr.map(|a| a.port()).unwrap_or(0);
        let session_tx = self.session_tx.clone();
        let handle = session.handle();

        tokio::spawn(async move {
            if let Err(err) = run_shell_session(
                fleet,
                audit,
                default_hostname,
                username,
                source_ip,
                source_port,
                session_tx,
                handle,
                channel_id,
                input_rx,
            )
            .await
            {
                tracing::warn!(error = %err, "shell session ended with error");
            }
        });

        Ok(())
    }

    async fn data(
        &mut self,
        _channel: ChannelId,
        data: &[u8],
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        if let Some(tx) = &self.input_tx {
            let _ = tx.send(data.to_vec()).await;
        }
        Ok(())
    }
}

/// Cook raw channel bytes into lines, independent of whatever the shell
/// task is currently doing. This is what lets `Ctrl-C` reach a running
/// `ping`/`wget` immediately instead of waiting for the command to finish
/// and the shell to come back around for more input (spec §4.4).
///
/// Completed lines are sent on the returned receiver; `Ctrl-D` at an empty
/// line is rewritten to `"logout"` here, matching the `QUIT` sentinel.
/// `hide_echo` suppresses local echo for the nested-`ssh` password prompt.
fn spawn_line_reader(
    mut raw_rx: mpsc::Receiver<Vec<u8>>,
    handle: Handle,
    channel_id: ChannelId,
    interrupt: Arc<AtomicBool>,
    hide_echo: Arc<AtomicBool>,
) -> mpsc::Receiver<String> {
    let (line_tx, line_rx) = mpsc::channel::<String>(8);

    tokio::spawn(async move {
        let echo = |bytes: &'static [u8]| {
            let handle = handle.clone();
            async move {
                let _ = handle.data(channel_id, CryptoVec::from(bytes.to_vec())).await;
            }
        };

        let mut line = String::new();
        while let Some(chunk) = raw_rx.recv().await {
            for byte in chunk {
                let hidden = hide_echo.load(Ordering::SeqCst);
                match byte {
                    b'\r' | b'\n' => {
                        if !hidden {
                            echo(b"\r\n").await;
                        }
                        if line_tx.send(std::mem::take(&mut line)).await.is_err() {
                            return;
                        }
                    }
                    0x03 => {
                        interrupt.store(true, Ordering::SeqCst);
                        if !hidden {
                            echo(b"^C\r\n").await;
                        }
                        line.clear();
                        if line_tx.send(String::new()).await.is_err() {
                            return;
                        }
                    }
                    0x04 if line.is_empty() => {
                        if line_tx.send("logout".to_string()).await.is_err() {
                            return;
                        }
                    }
                    0x7f | 0x08 => {
                        if line.pop().is_some() && !hidden {
                            let _ = handle
                                .data(channel_id, CryptoVec::from(b"\x08 \x08".to_vec()))
                                .await;
                        }
                    }
                    b if b.is_ascii_graphic() || b == b' ' => {
                        line.push(b as char);
                        if !hidden {
                            let _ = handle.data(channel_id, CryptoVec::from(vec![b])).await;
                        }
                    }
                    _ => {}
                }
            }
        }
    });

    line_rx
}

/// Adapts the channel's write half plus the line reader's output to
/// [`Terminal`] for the duration of one dispatched command, including the
/// nested-`ssh` hidden password prompt.
struct IoSink {
    handle: Handle,
    channel_id: ChannelId,
    lines: Arc<Mutex<mpsc::Receiver<String>>>,
    hide_echo: Arc<AtomicBool>,
}

impl IoSink {
    async fn write_raw(&self, bytes: &[u8]) -> anyhow::Result<()> {
        self.handle
            .data(self.channel_id, CryptoVec::from(bytes.to_vec()))
            .await
            .map_err(|_| HiveError::ChannelClosed.into())
    }
}

#[async_trait]
impl Terminal for IoSink {
    async fn write_line(&mut self, line: &str) -> anyhow::Result<()> {
        self.write_raw(format!("{}\r\n", line).as_bytes()).await
    }

    async fn write_str(&mut self, s: &str) -> anyhow::Result<()> {
        self.write_raw(s.as_bytes()).await
    }

    async fn read_password(&mut self) -> anyhow::Result<String> {
        self.hide_echo.store(true, Ordering::SeqCst);
        let password = self.lines.lock().await.recv().await.unwrap_or_default();
        self.hide_echo.store(false, Ordering::SeqCst);
        Ok(password)
    }
}

/// One channel's full lifecycle: record the session's birth, emit the
/// welcome banner, run the read-eval loop until `logout` or EOF, then
/// hand the session to the audit consumer exactly once (spec §3, §4.4-5).
async fn run_shell_session(
    fleet: Arc<Fleet>,
    audit: Arc<AuditStore>,
    default_hostname: String,
    username: String,
    source_ip: std::net::IpAddr,
    source_port: u16,
    session_tx: mpsc::Sender<SessionRecord>,
    handle: Handle,
    channel_id: ChannelId,
    input_rx: mpsc::Receiver<Vec<u8>>,
) -> anyhow::Result<()> {
    let Some(default_host) = fleet.default_host(&default_hostname) else {
        anyhow::bail!("default vhost {} is not configured", default_hostname);
    };

    let attack_session = AttackSession::new(source_ip, source_port);
    record_session_start(&audit, &attack_session)?;
    let watcher = attack_session.clone().watch(session_tx.clone());

    let mut shell = Shell::new(attack_session.clone(), fleet, audit, default_host, &username).await;
    let hide_echo = Arc::new(AtomicBool::new(false));
    let lines = Arc::new(Mutex::new(spawn_line_reader(
        input_rx,
        handle.clone(),
        channel_id,
        shell.interrupt_flag(),
        hide_echo.clone(),
    )));

    let write_raw = |bytes: Vec<u8>| {
        let handle = handle.clone();
        async move {
            let _ = handle.data(channel_id, CryptoVec::from(bytes)).await;
        }
    };

    write_raw(format!("{}\r\n", shell.welcome().await).into_bytes()).await;

    loop {
        write_raw(shell.prompt().await.into_bytes()).await;

        let Some(line) = lines.lock().await.recv().await else {
            break;
        };

        let mut sink = IoSink {
            handle: handle.clone(),
            channel_id,
            lines: lines.clone(),
            hide_echo: hide_echo.clone(),
        };
        if !shell.handle_line(&line, &mut sink).await? {
            break;
        }
    }

    attack_session.enqueue_if_needed(&session_tx).await;
    watcher.abort();
    Ok(())
}
