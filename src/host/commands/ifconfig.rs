use super::{help_or_version, Command};
use crate::data::{self, IFCONFIG_TEMPLATE};
use crate::host::VirtualHost;

/// `ifconfig` — renders the bundled template, substituting the host's
/// assigned IP, network broadcast, and netmask into whichever interface
/// stanza is requested, per spec §4.3.
pub struct Ifconfig;

/// Split the template into stanzas on blank lines, keyed by the first
/// whitespace-delimited token of each stanza's first line.
fn stanzas() -> Vec<(String, String)> {
    IFCONFIG_TEMPLATE
        .split("\n\n")
        .filter(|s| !s.trim().is_empty())
        .map(|stanza| {
            let stanza = stanza.trim_end_matches('\n');
            let name = stanza
                .lines()
                .next()
                .and_then(|l| l.split_whitespace().next())
                .unwrap_or("")
                .to_string();
            (name, stanza.to_string())
        })
        .collect()
}

fn substitute(stanza: &str, host: &VirtualHost) -> String {
    stanza
        .replace("${ip_addr}", &host.ip_address.to_string())
        .replace("${broadcast_addr}", &host.network.broadcast.to_string())
        .replace("${subnet_mask}", &host.network.netmask.to_string())
}

impl Command for Ifconfig {
    fn run(&self, host: &mut VirtualHost, params: &[String]) -> String {
        if let Some(out) = help_or_version(params, &data::IFCONFIG) {
            return out;
        }

        if params.len() >= 2 {
            return "SIOCSIFFLAGS: Operation not permitted".to_string();
        }

        let all = stanzas();

        if params.is_empty() {
            return all
                .iter()
                .map(|(_, s)| substitute(s, host))
                .collect::<Vec<_>>()
                .join("\n\n");
        }

        let iface = &params[0];
        match all.iter().find(|(name, _)| name == iface) {
            Some((_, stanza)) => substitute(stanza, host),
            None => format!("{}: error fetching interface information: Device not found", iface),
        }
    }
}
