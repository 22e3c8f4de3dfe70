//! TCP accept loop and connection wiring: binds the SSH listener, builds
//! the shared fleet/audit/consumer state once, and hands each accepted
//! connection to `russh`.

pub mod ssh;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;

use crate::audit::{AuditStore, SessionConsumer};
use crate::config::Config;
use crate::host::Fleet;

/// Load the configured host key, generating and persisting a fresh one on
/// first run. A bundled honeypot has no business enrolling a "real" key
/// with an authority, so a self-signed keypair written next to
/// `config.json` is sufficient (spec §7).
fn load_or_generate_host_key(path: &std::path::Path) -> Result<russh_keys::key::KeyPair> {
    if path.is_file() {
        return russh_keys::load_secret_key(path, None)
            .with_context(|| format!("failed to load host key at {}", path.display()));
    }

    tracing::info!(path = %path.display(), "host key not found, generating a new one");
    let pair = russh_keys::key::KeyPair::generate_rsa(1024, russh_keys::key::SignatureHash::SHA2_256)
        .context("failed to generate RSA host key")?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    russh_keys::write_pkcs8_pem(&pair, path)
        .with_context(|| format!("failed to write host key to {}", path.display()))?;
    Ok(pair)
}

/// Build every piece of shared state (fleet, audit store, session
/// consumer) and run the SSH accept loop until the process is killed.
pub async fn run(config: Config, working_dir: &std::path::Path) -> Result<()> {
    let vhosts_dir = working_dir.join("vhosts");
    let fleet = Arc::new(Fleet::build(&config, &vhosts_dir).context("failed to build vhost fleet")?);

    let audit = Arc::new(
        AuditStore::open(&config.database)
            .with_context(|| format!("failed to open audit store at {}", config.database.display()))?,
    );

    let (session_tx, session_rx) = mpsc::channel(256);
    let consumer = SessionConsumer::spawn(audit.clone(), session_rx);

    let key_pair = load_or_generate_host_key(&config.key_file)?;
    let server_config = Arc::new(russh::server::Config {
        inactivity_timeout: Some(Duration::from_secs(3600)),
        auth_rejection_time: Duration::from_secs(1),
        keys: vec![key_pair],
        ..Default::default()
    });

    let mut server = ssh::SshServer {
        fleet,
        audit,
        default_hostname: config.default_hostname.clone(),
        session_tx,
    };

    let addr = (config.host.as_str(), config.port);
    tracing::info!(host = %config.host, port = config.port, "sentryhive listening");

    let result = russh::server::Server::run_on_address(&mut server, server_config, addr)
        .await
        .context("ssh server loop exited");

    consumer.stop();
    result
}
