use super::Command;
use crate::host::VirtualHost;

/// `echo` — no params → blank line; one `$NAME` param → environment
/// lookup; a standalone `*` token expands (non-recursively) to the
/// current directory's listing; otherwise tokens are space-joined.
pub struct Echo;

impl Command for Echo {
    fn run(&self, host: &mut VirtualHost, params: &[String]) -> String {
        if params.is_empty() {
            return String::new();
        }

        if params.len() == 1 {
            if let Some(name) = params[0].strip_prefix('$') {
                return host.env.get(name).cloned().unwrap_or_default();
            }
        }

        let rendered: Vec<String> = params
            .iter()
            .map(|tok| {
                if tok == "*" {
                    host.fs
                        .listdir(&host.working_path)
                        .unwrap_or_default()
                        .join(" ")
                } else {
                    tok.clone()
                }
            })
            .collect();
        rendered.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::SandboxedFs;
    use std::collections::HashMap;

    fn network() -> crate::config::Network {
        crate::config::Network::from_config(&crate::config::NetworkConfig {
            network_ip: "192.168.0.0/24".into(),
            dns_server: "8.8.8.8".into(),
            gateway: "192.168.0.1".into(),
        })
        .unwrap()
    }

    fn host(tmp: &tempfile::TempDir) -> VirtualHost {
        VirtualHost {
            hostname: "test02".into(),
            ip_address: "192.168.0.2".parse().unwrap(),
            valid_logins: HashMap::new(),
            env: HashMap::from([("HOME".to_string(), "/root".to_string())]),
            fs: SandboxedFs::open(tmp.path().join("ws"), false).unwrap(),
            network: network(),
            working_path: "/".into(),
            current_user: None,
            logged_in: false,
        }
    }

    #[test]
    fn no_params_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let mut h = host(&tmp);
        assert_eq!(Echo.run(&mut h, &[]), "");
    }

    #[test]
    fn env_lookup() {
        let tmp = tempfile::tempdir().unwrap();
        let mut h = host(&tmp);
        assert_eq!(Echo.run(&mut h, &["$HOME".to_string()]), "/root");
        assert_eq!(Echo.run(&mut h, &["$MISSING".to_string()]), "");
    }

    #[test]
    fn joins_tokens_with_single_space() {
        let tmp = tempfile::tempdir().unwrap();
        let mut h = host(&tmp);
        let params = vec!["hello".to_string(), "world".to_string()];
        assert_eq!(Echo.run(&mut h, &params), "hello world");
    }

    #[test]
    fn star_expands_to_directory_listing() {
        let tmp = tempfile::tempdir().unwrap();
        let mut h = host(&tmp);
        h.fs.create("/a", b"").unwrap();
        h.fs.create("/b", b"").unwrap();
        h.fs.create("/c", b"").unwrap();
        assert_eq!(Echo.run(&mut h, &["*".to_string()]), "a b c");
    }
}
