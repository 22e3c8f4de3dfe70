//! The virtual-host fleet: per-host identity, credentials, environment,
//! sandboxed filesystem, and command dispatch table.

pub mod commands;

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::Mutex;

use crate::config::{Config, Network, VhostParams};
use crate::sandbox::SandboxedFs;

/// One emulated machine: hostname, assigned IP, credentials, environment,
/// and the sandboxed filesystem it reads and writes.
pub struct VirtualHost {
    pub hostname: String,
    pub ip_address: Ipv4Addr,
    pub valid_logins: HashMap<String, String>,
    pub env: HashMap<String, String>,
    pub fs: SandboxedFs,
    pub network: Network,
    pub working_path: String,
    pub current_user: Option<String>,
    pub logged_in: bool,
}

impl VirtualHost {
    /// `authenticate(user, pass)` is true iff the credential map contains
    /// the pair, per spec §4.2.
    pub fn authenticate(&self, user: &str, pass: &str) -> bool {
        self.valid_logins.get(user).map(|p| p.as_str()) == Some(pass)
    }

    pub fn login(&mut self, user: &str) {
        self.current_user = Some(user.to_string());
        self.logged_in = true;
    }

    pub fn logout(&mut self) {
        self.current_user = None;
        self.logged_in = false;
    }

    /// Contents of `/etc/motd` if present, else a generic greeting.
    pub fn welcome(&self) -> String {
        self.fs
            .read_to_string("/etc/motd")
            .unwrap_or_else(|_| format!("Welcome to {} server.", self.hostname))
    }

    /// Exactly `"<user>@<hostname>:<working_path>$ "`.
    pub fn prompt(&self) -> String {
        let user = self.current_user.as_deref().unwrap_or("?");
        format!("{}@{}:{}$ ", user, self.hostname, self.working_path)
    }
}

/// Work out this vhost's IP per the recovery algorithm in spec §4.2:
/// explicit pinned IP, else reuse a prior run's directory name, else a
/// fresh random draw from the network's usable range.
fn assign_ip(params: &VhostParams, network: &Network, vhosts_dir: &Path) -> Ipv4Addr {
    if let Some(pinned) = params
        .ip_address
        .as_deref()
        .and_then(|s| s.parse::<Ipv4Addr>().ok())
    {
        if network.contains_usable(pinned) {
            return pinned;
        }
    }

    if let Ok(entries) = std::fs::read_dir(vhosts_dir) {
        let prefix = format!("{}_", params.hostname);
        for entry in entries.filter_map(|e| e.ok()) {
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(ip_part) = name.strip_prefix(&prefix) {
                if let Ok(ip) = ip_part.parse::<Ipv4Addr>() {
                    if network.contains_usable(ip) {
                        return ip;
                    }
                }
            }
        }
    }

    network.random_usable()
}

/// The read-only-after-startup map of every configured vhost, keyed by
/// hostname (Open Question (a): the final source revision keys by
/// hostname, not IP — we follow that).
pub struct Fleet {
    hosts: HashMap<String, Arc<Mutex<VirtualHost>>>,
}

impl Fleet {
    /// Build every configured vhost, assigning or recovering its IP and
    /// opening its sandboxed filesystem under `vhosts_dir`.
    pub fn build(config: &Config, vhosts_dir: &Path) -> Result<Fleet> {
        std::fs::create_dir_all(vhosts_dir)
            .with_context(|| format!("failed to create {}", vhosts_dir.display()))?;

        let mut hosts = HashMap::new();
        let mut seen_ips = std::collections::HashSet::new();

        for params in &config.vhost_params {
            let mut ip = assign_ip(params, &config.network, vhosts_dir);
            while !seen_ips.insert(ip) {
                ip = config.network.random_usable();
            }

            let root = vhosts_dir.join(format!("{}_{}", params.hostname, ip));
            let fs = SandboxedFs::open(root, true)
                .with_context(|| format!("failed to open sandbox for {}", params.hostname))?;

            let host = VirtualHost {
                hostname: params.hostname.clone(),
                ip_address: ip,
                valid_logins: params.valid_logins.clone(),
                env: params.env.clone(),
                fs,
                network: config.network.clone(),
                working_path: "/".to_string(),
                current_user: None,
                logged_in: false,
            };

            tracing::info!(hostname = %host.hostname, ip = %host.ip_address, "vhost ready");
            hosts.insert(params.hostname.clone(), Arc::new(Mutex::new(host)));
        }

        Ok(Fleet { hosts })
    }

    pub fn get(&self, hostname: &str) -> Option<Arc<Mutex<VirtualHost>>> {
        self.hosts.get(hostname).cloned()
    }

    pub fn default_host(&self, default_hostname: &str) -> Option<Arc<Mutex<VirtualHost>>> {
        self.get(default_hostname)
    }

    /// Reverse-lookup by IP, used by `ping` when the target looks like a
    /// dotted quad.
    pub async fn find_by_ip(&self, ip: Ipv4Addr) -> Option<Arc<Mutex<VirtualHost>>> {
        for handle in self.hosts.values() {
            if handle.lock().await.ip_address == ip {
                return Some(handle.clone());
            }
        }
        None
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}
