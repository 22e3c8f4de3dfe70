//! The per-channel interactive loop: prompt rendering, command dispatch,
//! the nested-`ssh` login stack, and audit recording (spec §4.4).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::audit::AuditStore;
use crate::error::HiveError;
use crate::host::commands::{self, ping, wget, Command};
use crate::host::{Fleet, VirtualHost};
use crate::session::Session;
use crate::terminal::Terminal;

/// Wraps the channel's real sink, accumulating everything written into
/// `captured` for the audit record while still forwarding every write
/// through live.
struct Tee<'a> {
    inner: &'a mut dyn Terminal,
    captured: String,
}

impl<'a> Tee<'a> {
    fn new(inner: &'a mut dyn Terminal) -> Self {
        Tee { inner, captured: String::new() }
    }
}

#[async_trait::async_trait]
impl<'a> Terminal for Tee<'a> {
    async fn write_line(&mut self, line: &str) -> anyhow::Result<()> {
        self.captured.push_str(line);
        self.captured.push('\n');
        self.inner.write_line(line).await
    }

    async fn write_str(&mut self, s: &str) -> anyhow::Result<()> {
        self.captured.push_str(s);
        self.inner.write_str(s).await
    }

    async fn read_password(&mut self) -> anyhow::Result<String> {
        self.inner.read_password().await
    }
}

/// One attacker's interactive session, bound to a single SSH channel.
pub struct Shell {
    session: Arc<Session>,
    fleet: Arc<Fleet>,
    audit: Arc<AuditStore>,
    login_stack: Vec<Arc<Mutex<VirtualHost>>>,
    interrupt: Arc<AtomicBool>,
    commands: std::collections::HashMap<&'static str, Box<dyn Command>>,
}

impl Shell {
    /// Push the default vhost, log the given username into it, and return
    /// the shell ready to emit its welcome banner.
    pub async fn new(
        session: Arc<Session>,
        fleet: Arc<Fleet>,
        audit: Arc<AuditStore>,
        default_host: Arc<Mutex<VirtualHost>>,
        username: &str,
    ) -> Shell {
        default_host.lock().await.login(username);
        Shell {
            session,
            fleet,
            audit,
            login_stack: vec![default_host],
            interrupt: Arc::new(AtomicBool::new(false)),
            commands: commands::registry(),
        }
    }

    fn current(&self) -> &Arc<Mutex<VirtualHost>> {
        self.login_stack.last().expect("login stack is never empty while the shell runs")
    }

    pub async fn welcome(&self) -> String {
        self.current().lock().await.welcome()
    }

    pub async fn prompt(&self) -> String {
        self.current().lock().await.prompt()
    }

    /// Raised by the channel handler on byte `0x03`.
    pub fn interrupt(&self) {
        self.interrupt.store(true, Ordering::SeqCst);
    }

    /// A clone of the shared interrupt flag, so a concurrent byte reader
    /// can raise it immediately while a long command is still running.
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        self.interrupt.clone()
    }

    /// Run one line through the shell. Returns `false` when the shell
    /// should terminate (final `logout`).
    pub async fn handle_line(&mut self, line: &str, sink: &mut dyn Terminal) -> anyhow::Result<bool> {
        self.interrupt.store(false, Ordering::SeqCst);

        let line = line.trim();
        let mut parts = line.split_whitespace();
        let cmd = parts.next().unwrap_or("").to_string();
        let params: Vec<String> = parts.map(|s| s.to_string()).collect();

        if cmd.is_empty() {
            return Ok(true);
        }

        let hostname_before = self.current().lock().await.hostname.clone();
        let mut tee = Tee::new(sink);
        let mut keep_going = true;

        match cmd.as_str() {
            "ssh" => self.cmd_ssh(&params, &mut tee).await?,
            "logout" => keep_going = self.cmd_logout().await,
            "ping" => {
                let target = params.first().cloned().unwrap_or_default();
                ping::run(&target, &self.fleet, self.interrupt.clone(), &mut tee).await?;
            }
            "wget" => {
                wget::run(&params, self.current(), &mut tee).await?;
            }
            _ => match self.dispatch_sync(&cmd, &params).await {
                Ok(out) => tee.write_line(&out).await?,
                Err(HiveError::UnknownCommand(name)) => {
                    tee.write_line(&format!("{}: command not found", name)).await?
                }
                Err(other) => tee.write_line(&other.to_string()).await?,
            },
        }

        let captured = tee.captured.clone();
        let session_id = self.session.id.to_string();
        if let Err(err) = self.audit.record_command(&session_id, line, &hostname_before, &captured) {
            let err = HiveError::AuditStoreFailure(err);
            tracing::warn!(session = %session_id, error = %err, "failed to record command");
        }
        self.session.touch();

        Ok(keep_going)
    }

    /// Dispatch a non-builtin command through the synchronous registry,
    /// modeling a dispatch miss as `HiveError::UnknownCommand` rather than
    /// an ad hoc string (spec §7/§9's "explicit result kinds" note).
    async fn dispatch_sync(&self, cmd: &str, params: &[String]) -> Result<String, HiveError> {
        match self.commands.get(cmd) {
            Some(command) => {
                let mut host = self.current().lock().await;
                Ok(command.run(&mut host, params))
            }
            None => Err(HiveError::UnknownCommand(cmd.to_string())),
        }
    }

    /// `-p PORT` (accepted, unused), `-l USER`, positional `[user@]host`.
    async fn cmd_ssh(&mut self, params: &[String], sink: &mut dyn Terminal) -> anyhow::Result<()> {
        let (_, login_user, host_string) = parse_ssh_args(params);
        let Some(host_string) = host_string else {
            sink.write_line("ssh: missing host").await?;
            return Ok(());
        };

        let (user_prefix, hostname) = match host_string.split_once('@') {
            Some((u, h)) => (Some(u.to_string()), h.to_string()),
            None => (None, host_string),
        };

        let current_user = self.current().lock().await.current_user.clone();
        let user = login_user
            .or(user_prefix)
            .or(current_user)
            .unwrap_or_else(|| "root".to_string());

        let Some(target) = self.fleet.get(&hostname) else {
            sink.write_line(&format!(
                "ssh: Could not resolve hostname {}: Name or service not known",
                hostname
            ))
            .await?;
            return Ok(());
        };

        let password = sink.read_password().await?;
        let authenticated = target.lock().await.authenticate(&user, &password);
        if !authenticated {
            let err = HiveError::AuthFailure(user);
            tracing::debug!(error = %err, host = %hostname, "nested ssh authentication failed");
            return Ok(());
        }

        target.lock().await.login(&user);
        self.login_stack.push(target);
        let welcome = self.current().lock().await.welcome();
        sink.write_line(&welcome).await?;
        Ok(())
    }

    /// Returns `false` when the shell should terminate.
    async fn cmd_logout(&mut self) -> bool {
        if self.login_stack.len() == 1 {
            return false;
        }
        if let Some(popped) = self.login_stack.pop() {
            popped.lock().await.logout();
        }
        true
    }
}

/// Parse `ssh`'s argument surface: `-p PORT`, `-l USER`, and a positional
/// `[user@]host` string. Unrecognized flags are ignored.
fn parse_ssh_args(params: &[String]) -> (Option<u16>, Option<String>, Option<String>) {
    let mut port = None;
    let mut login_user = None;
    let mut host_string = None;
    let mut iter = params.iter().peekable();
    while let Some(p) = iter.next() {
        match p.as_str() {
            "-p" => {
                if let Some(v) = iter.next() {
                    port = v.parse().ok();
                }
            }
            "-l" => {
                if let Some(v) = iter.next() {
                    login_user = Some(v.clone());
                }
            }
            _ if host_string.is_none() => host_string = Some(p.clone()),
            _ => {}
        }
    }
    (port, login_user, host_string)
}
