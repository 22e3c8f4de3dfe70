use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ipnet::Ipv4Net;
use rand::Rng;
use serde::Deserialize;

use crate::data;
use crate::error::HiveError;

/// Raw `network` block as it appears in `config.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    pub network_ip: String,
    pub dns_server: String,
    pub gateway: String,
}

/// A CIDR with derived broadcast/netmask, plus the gateway and DNS server
/// that ride alongside it in config. Usable host range is
/// `[network+1 .. broadcast-1]`, per spec §3.
#[derive(Debug, Clone)]
pub struct Network {
    pub cidr: Ipv4Net,
    pub broadcast: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub gateway: String,
    pub dns_server: String,
}

impl Network {
    pub fn from_config(cfg: &NetworkConfig) -> Result<Self> {
        let cidr: Ipv4Net = cfg
            .network_ip
            .parse()
            .with_context(|| format!("invalid network CIDR: {}", cfg.network_ip))?;
        Ok(Network {
            cidr,
            broadcast: cidr.broadcast(),
            netmask: cidr.netmask(),
            gateway: cfg.gateway.clone(),
            dns_server: cfg.dns_server.clone(),
        })
    }

    /// The first and last usable host addresses, excluding the network and
    /// broadcast addresses themselves.
    pub fn usable_range(&self) -> (u32, u32) {
        let network = u32::from(self.cidr.network());
        let broadcast = u32::from(self.broadcast);
        (network.saturating_add(1), broadcast.saturating_sub(1))
    }

    pub fn contains_usable(&self, ip: Ipv4Addr) -> bool {
        let (lo, hi) = self.usable_range();
        let v = u32::from(ip);
        v >= lo && v <= hi
    }

    /// Draw a uniformly random address from the usable range.
    pub fn random_usable(&self) -> Ipv4Addr {
        let (lo, hi) = self.usable_range();
        let v = if hi > lo {
            rand::thread_rng().gen_range(lo..=hi)
        } else {
            lo
        };
        Ipv4Addr::from(v)
    }
}

/// One `virtual_hosts[]` entry from `config.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct VhostParams {
    pub hostname: String,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub default: bool,
    #[serde(default)]
    pub env: HashMap<String, String>,
    pub valid_logins: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    host: String,
    port: u16,
    key_file: String,
    database: String,
    network: NetworkConfig,
    virtual_hosts: Vec<VhostParams>,
}

/// Immutable, process-wide configuration. Loaded once at startup; every
/// later reader sees the same values for the life of the process.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub key_file: PathBuf,
    pub database: PathBuf,
    pub network: Network,
    pub vhost_params: Vec<VhostParams>,
    pub default_hostname: String,
}

impl Config {
    /// Load `<working_dir>/config.json`, copying the bundled default
    /// alongside it first if it doesn't exist yet (spec §7:
    /// `ConfigMissing` → copy bundled default, continue).
    pub fn load(working_dir: &Path) -> Result<Self> {
        let config_path = working_dir.join("config.json");
        if !config_path.is_file() {
            tracing::info!(path = %config_path.display(), "config.json not found, writing bundled default");
            std::fs::write(&config_path, data::DEFAULT_CONFIG_JSON)
                .context("failed to write default config.json")?;
        }
        let raw_text = std::fs::read_to_string(&config_path)
            .with_context(|| format!("failed to read {}", config_path.display()))?;
        let raw: RawConfig = serde_json::from_str(&raw_text)
            .with_context(|| format!("failed to parse {}", config_path.display()))?;
        Self::from_raw(raw, working_dir)
    }

    fn from_raw(raw: RawConfig, working_dir: &Path) -> Result<Self> {
        if raw.virtual_hosts.is_empty() {
            return Err(HiveError::ConfigMissing("virtual_hosts".to_string()).into());
        }

        let mut seen = std::collections::HashSet::new();
        for p in &raw.virtual_hosts {
            if !seen.insert(p.hostname.clone()) {
                anyhow::bail!("duplicate vhost hostname in config: {}", p.hostname);
            }
        }

        let default_hostname = raw
            .virtual_hosts
            .iter()
            .find(|p| p.default)
            .map(|p| p.hostname.clone())
            .unwrap_or_else(|| {
                let first = raw.virtual_hosts[0].hostname.clone();
                tracing::info!(hostname = %first, "no default vhost flagged, promoting the first one");
                first
            });

        let network = Network::from_config(&raw.network)?;

        Ok(Config {
            host: raw.host,
            port: raw.port,
            key_file: working_dir.join(raw.key_file),
            database: working_dir.join(raw.database),
            network,
            vhost_params: raw.virtual_hosts,
            default_hostname,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_raw() -> RawConfig {
        serde_json::from_str(data::DEFAULT_CONFIG_JSON).unwrap()
    }

    #[test]
    fn default_config_parses() {
        let raw = sample_raw();
        assert_eq!(raw.virtual_hosts.len(), 2);
    }

    #[test]
    fn promotes_flagged_default() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = Config::from_raw(sample_raw(), tmp.path()).unwrap();
        assert_eq!(cfg.default_hostname, "test02");
    }

    #[test]
    fn promotes_first_when_none_flagged() {
        let tmp = tempfile::tempdir().unwrap();
        let mut raw = sample_raw();
        for p in &mut raw.virtual_hosts {
            p.default = false;
        }
        let cfg = Config::from_raw(raw, tmp.path()).unwrap();
        assert_eq!(cfg.default_hostname, "test02");
    }

    #[test]
    fn rejects_empty_vhost_list() {
        let tmp = tempfile::tempdir().unwrap();
        let mut raw = sample_raw();
        raw.virtual_hosts.clear();
        let err = Config::from_raw(raw, tmp.path()).unwrap_err();
        assert!(err.downcast_ref::<HiveError>().is_some());
    }

    #[test]
    fn rejects_duplicate_hostnames() {
        let tmp = tempfile::tempdir().unwrap();
        let mut raw = sample_raw();
        let dup = raw.virtual_hosts[0].clone();
        raw.virtual_hosts.push(dup);
        assert!(Config::from_raw(raw, tmp.path()).is_err());
    }

    #[test]
    fn usable_range_excludes_network_and_broadcast() {
        let net = Network::from_config(&NetworkConfig {
            network_ip: "192.168.0.0/24".into(),
            dns_server: "8.8.8.8".into(),
            gateway: "192.168.0.1".into(),
        })
        .unwrap();
        let (lo, hi) = net.usable_range();
        assert_eq!(Ipv4Addr::from(lo), Ipv4Addr::new(192, 168, 0, 1));
        assert_eq!(Ipv4Addr::from(hi), Ipv4Addr::new(192, 168, 0, 254));
        assert_eq!(net.broadcast, Ipv4Addr::new(192, 168, 0, 255));
        assert_eq!(net.netmask, Ipv4Addr::new(255, 255, 255, 0));
    }

    #[test]
    fn random_usable_is_in_range() {
        let net = Network::from_config(&NetworkConfig {
            network_ip: "10.0.0.0/30".into(),
            dns_server: "8.8.8.8".into(),
            gateway: "10.0.0.1".into(),
        })
        .unwrap();
        for _ in 0..20 {
            assert!(net.contains_usable(net.random_usable()));
        }
    }
}
