use super::{help_or_version, Command};
use crate::data;
use crate::host::VirtualHost;

/// `uname` — a static fact table rendered in a fixed field order
/// regardless of the order flags were given, per spec §4.3.
pub struct Uname;

const FIELD_ORDER: [char; 8] = ['s', 'n', 'r', 'v', 'm', 'p', 'i', 'o'];

fn field(ch: char, host: &VirtualHost) -> Option<&'static str> {
    match ch {
        's' => Some("Linux"),
        'n' => None, // nodename is dynamic, resolved below
        'r' => Some("3.13.0-37-generic"),
        'v' => Some("#64-Ubuntu SMP Mon Sep 22 21:30:01 UTC 2014"),
        'm' => Some("i686"),
        'p' => Some("i686"),
        'i' => Some("i686"),
        'o' => Some("GNU/Linux"),
        _ => {
            let _ = host;
            None
        }
    }
}

fn render_field(ch: char, host: &VirtualHost) -> String {
    if ch == 'n' {
        host.hostname.clone()
    } else {
        field(ch, host).unwrap_or_default().to_string()
    }
}

impl Command for Uname {
    fn run(&self, host: &mut VirtualHost, params: &[String]) -> String {
        if let Some(out) = help_or_version(params, &data::UNAME) {
            return out;
        }

        if params.is_empty() {
            return "Linux".to_string();
        }

        let mut requested: Vec<char> = Vec::new();
        for p in params {
            if let Some(rest) = p.strip_prefix('-') {
                if rest.is_empty() {
                    return "uname: invalid option -- ''".to_string();
                }
                for ch in rest.chars() {
                    if ch == 'a' {
                        requested = FIELD_ORDER.to_vec();
                        continue;
                    }
                    if !FIELD_ORDER.contains(&ch) {
                        return format!("uname: invalid option -- '{}'", ch);
                    }
                    if !requested.contains(&ch) {
                        requested.push(ch);
                    }
                }
            } else {
                return format!("uname: extra operand '{}'", p);
            }
        }

        // re-sort to the fixed field order, since flags may arrive in any order
        let mut ordered: Vec<char> = FIELD_ORDER
            .iter()
            .copied()
            .filter(|c| requested.contains(c))
            .collect();
        if ordered.is_empty() {
            ordered.push('s');
        }

        ordered
            .into_iter()
            .map(|c| render_field(c, host))
            .collect::<Vec<_>>()
            .join(" ")
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
            env: HashMap::new(),
            fs: SandboxedFs::open(tmp.path().join("ws"), false).unwrap(),
            network: network(),
            working_path: "/".into(),
            current_user: None,
            logged_in: false,
        }
    }

    #[test]
    fn no_params_is_linux() {
        let tmp = tempfile::tempdir().unwrap();
        let mut h = host(&tmp);
        assert_eq!(Uname.run(&mut h, &[]), "Linux");
    }

    #[test]
    fn all_flag_joins_every_field() {
        let tmp = tempfile::tempdir().unwrap();
        let mut h = host(&tmp);
        let out = Uname.run(&mut h, &["-a".to_string()]);
        assert_eq!(
            out,
            "Linux test02 3.13.0-37-generic #64-Ubuntu SMP Mon Sep 22 21:30:01 UTC 2014 i686 i686 i686 GNU/Linux"
        );
    }

    #[test]
    fn field_order_is_fixed_regardless_of_flag_order() {
        let tmp = tempfile::tempdir().unwrap();
        let mut h = host(&tmp);
        let out = Uname.run(&mut h, &["-rs".to_string()]);
        assert_eq!(out, "Linux 3.13.0-37-generic");
    }

    #[test]
    fn unknown_flag_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let mut h = host(&tmp);
        let out = Uname.run(&mut h, &["-z".to_string()]);
        assert_eq!(out, "uname: invalid option -- 'z'");
    }
}
