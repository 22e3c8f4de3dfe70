//! `ping` — a long-running simulated ICMP echo loop. Unlike the
//! synchronous commands in this module, `ping` streams output over time
//! and must answer Ctrl-C promptly, so the shell drives it directly
//! through [`run`] rather than through the [`super::Command`] registry.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use rand_distr::{Distribution, Normal};
use regex::Regex;

use crate::data;
use crate::host::Fleet;
use crate::terminal::Terminal;

fn ipv4_literal_re() -> Regex {
    Regex::new(r"^\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}$").expect("static regex")
}

enum Resolution {
    Host { host: String, ip: Ipv4Addr },
    Unresolved,
}

/// Resolve a ping target against the fleet, per spec §4.3: a dotted-quad
/// literal always resolves (to a known vhost's identity on hit, else to
/// itself); a hostname only resolves against a known vhost.
async fn resolve(target: &str, fleet: &Fleet) -> Resolution {
    if ipv4_literal_re().is_match(target) {
        if let Ok(ip) = target.parse::<Ipv4Addr>() {
            if let Some(vhost) = fleet.find_by_ip(ip).await {
                let vhost = vhost.lock().await;
                return Resolution::Host {
                    host: vhost.hostname.clone(),
                    ip: vhost.ip_address,
                };
            }
            return Resolution::Host {
                host: target.to_string(),
                ip,
            };
        }
        return Resolution::Unresolved;
    }

    if let Some(vhost) = fleet.get(target) {
        let vhost = vhost.lock().await;
        return Resolution::Host {
            host: vhost.hostname.clone(),
            ip: vhost.ip_address,
        };
    }
    Resolution::Unresolved
}

/// Loss percent divides by `total_count`, which includes the tick that
/// was in flight when Ctrl-C landed — preserved from the original
/// implementation's behavior (spec §9, Open Question (b)).
fn packet_loss_percent(total_count: u32, success_count: u32) -> f64 {
    if total_count == 0 {
        return 0.0;
    }
    ((total_count - success_count) as f64 / total_count as f64) * 100.0
}

/// `min/avg/max/mdev`, with `avg` sharing the same `total_count` divisor
/// quirk as the loss percentage.
fn rtt_stats(times: &[f64], total_count: u32) -> (f64, f64, f64, f64) {
    let min = times.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = times.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let avg = times.iter().sum::<f64>() / total_count.max(1) as f64;
    let variance = times.iter().map(|t| (t - avg).powi(2)).sum::<f64>() / times.len().max(1) as f64;
    (min, avg, max, variance.sqrt())
}

pub struct PingState {
    pub mean: f64,
    pub stddev: f64,
    pub success_probability: f64,
}

impl PingState {
    pub fn new_random() -> Self {
        PingState {
            mean: rand::thread_rng().gen_range(13.0..140.0),
            stddev: 3.0,
            success_probability: 0.93,
        }
    }
}

pub async fn run(
    target: &str,
    fleet: &Fleet,
    interrupt: Arc<AtomicBool>,
    sink: &mut dyn Terminal,
) -> anyhow::Result<()> {
    run_with_state(target, fleet, interrupt, sink, PingState::new_random()).await
}

async fn run_with_state(
    target: &str,
    fleet: &Fleet,
    interrupt: Arc<AtomicBool>,
    sink: &mut dyn Terminal,
    state: PingState,
) -> anyhow::Result<()> {
    let (host, ip) = match resolve(target, fleet).await {
        Resolution::Host { host, ip } => (host, ip),
        Resolution::Unresolved => {
            sink.write_line(&format!("ping: unknown host {}", target)).await?;
            return Ok(());
        }
    };

    sink.write_line(&format!("PING {} ({}) 56(84) bytes of data.", host, ip)).await?;

    let normal = Normal::new(state.mean, state.stddev).expect("valid normal parameters");
    let start = Instant::now();
    let mut total_count: u32 = 1;
    let mut success_count: u32 = 0;
    let mut times: Vec<f64> = Vec::new();

    while !interrupt.load(Ordering::SeqCst) {
        if rand::thread_rng().gen::<f64>() < state.success_probability {
            let t = normal.sample(&mut rand::thread_rng()).max(0.1);
            sink.write_line(&format!(
                "64 bytes from {} ({}): icmp_seq={} ttl=53 time={:.1} ms",
                host, ip, total_count, t
            ))
            .await?;
            success_count += 1;
            times.push(t);
        }
        total_count += 1;

        let mut waited = Duration::ZERO;
        while waited < Duration::from_secs(1) {
            if interrupt.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
            waited += Duration::from_millis(100);
        }
    }

    sink.write_str("^C").await?;
    // The stats banner echoes what the attacker typed, not the resolved
    // vhost name — an IP literal that reverse-resolves to a named vhost
    // still closes with its own dotted quad here.
    sink.write_line(&format!("--- {} ping statistics ---", target)).await?;

    let loss = packet_loss_percent(total_count, success_count);
    sink.write_line(&format!(
        "{} packets transmitted, {} received, {:.2}% packet loss, time {}ms",
        total_count,
        success_count,
        loss,
        start.elapsed().as_millis()
    ))
    .await?;

    if success_count >= 1 {
        let (min, avg, max, mdev) = rtt_stats(&times, total_count);
        sink.write_line(&format!(
            "rtt min/avg/max/mdev = {:.3}/{:.3}/{:.3}/{:.3} ms",
            min, avg, max, mdev
        ))
        .await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, Network, NetworkConfig, VhostParams};
    use crate::terminal::RecordingSink;
    use std::collections::HashMap;

    fn test_fleet(tmp: &tempfile::TempDir) -> Fleet {
        let network = Network::from_config(&NetworkConfig {
            network_ip: "192.168.0.0/24".into(),
            dns_server: "8.8.8.8".into(),
            gateway: "192.168.0.1".into(),
        })
        .unwrap();
        let config = Config {
            host: "0.0.0.0".into(),
            port: 2222,
            key_file: tmp.path().join("key"),
            database: tmp.path().join("db"),
            network,
            vhost_params: vec![
                VhostParams {
                    hostname: "test02".into(),
                    ip_address: Some("192.168.0.232".into()),
                    default: true,
                    env: HashMap::new(),
                    valid_logins: HashMap::from([(
                        "testuser".to_string(),
                        "testpassword".to_string(),
                    )]),
                },
                VhostParams {
                    hostname: "test01".into(),
                    ip_address: Some("192.168.0.10".into()),
                    default: false,
                    env: HashMap::new(),
                    valid_logins: HashMap::from([(
                        "testuser".to_string(),
                        "passtest".to_string(),
                    )]),
                },
            ],
            default_hostname: "test02".into(),
        };
        Fleet::build(&config, &tmp.path().join("vhosts")).unwrap()
    }

    #[test]
    fn packet_loss_percent_uses_total_count_quirk() {
        assert_eq!(packet_loss_percent(3, 1), 200.0 / 3.0);
        assert_eq!(packet_loss_percent(1, 0), 100.0);
    }

    #[test]
    fn rtt_avg_divides_by_total_count_not_times_len() {
        let (_, avg, _, _) = rtt_stats(&[10.0, 20.0], 4);
        assert_eq!(avg, 30.0 / 4.0);
    }

    #[tokio::test]
    async fn resolves_known_hostname() {
        let tmp = tempfile::tempdir().unwrap();
        let fleet = test_fleet(&tmp);
        match resolve("test01", &fleet).await {
            Resolution::Host { host, ip } => {
                assert_eq!(host, "test01");
                assert_eq!(ip, Ipv4Addr::new(192, 168, 0, 10));
            }
            Resolution::Unresolved => panic!("expected resolution"),
        }
    }

    #[tokio::test]
    async fn unresolved_hostname_reports_unknown_host() {
        let tmp = tempfile::tempdir().unwrap();
        let fleet = test_fleet(&tmp);
        let mut sink = RecordingSink::default();
        let interrupt = Arc::new(AtomicBool::new(false));
        run("nosuchhost", &fleet, interrupt, &mut sink).await.unwrap();
        assert_eq!(sink.lines, vec!["ping: unknown host nosuchhost"]);
    }

    #[tokio::test]
    async fn ip_literal_reverse_resolves_to_known_vhost() {
        let tmp = tempfile::tempdir().unwrap();
        let fleet = test_fleet(&tmp);
        match resolve("192.168.0.232", &fleet).await {
            Resolution::Host { host, ip } => {
                assert_eq!(host, "test02");
                assert_eq!(ip, Ipv4Addr::new(192, 168, 0, 232));
            }
            Resolution::Unresolved => panic!("expected resolution"),
        }
    }

    #[tokio::test]
    async fn unknown_ip_literal_resolves_to_itself() {
        let tmp = tempfile::tempdir().unwrap();
        let fleet = test_fleet(&tmp);
        match resolve("203.0.113.9", &fleet).await {
            Resolution::Host { host, ip } => {
                assert_eq!(host, "203.0.113.9");
                assert_eq!(ip, Ipv4Addr::new(203, 0, 113, 9));
            }
            Resolution::Unresolved => panic!("expected resolution"),
        }
    }

    #[tokio::test]
    async fn ctrl_c_terminates_and_reports_full_loss_at_zero_probability() {
        let tmp = tempfile::tempdir().unwrap();
        let fleet = test_fleet(&tmp);
        let mut sink = RecordingSink::default();
        let interrupt = Arc::new(AtomicBool::new(false));
        let flag = interrupt.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            flag.store(true, Ordering::SeqCst);
        });
        let state = PingState {
            mean: 50.0,
            stddev: 3.0,
            success_probability: 0.0,
        };
        run_with_state("test01", &fleet, interrupt, &mut sink, state)
            .await
            .unwrap();
        assert!(sink.lines.iter().any(|l| l == "^C"));
        assert!(sink.lines.iter().any(|l| l.contains("100.00% packet loss")));
        assert!(!sink.lines.iter().any(|l| l.starts_with("rtt")));
    }

    #[tokio::test]
    async fn stats_banner_echoes_typed_target_not_resolved_hostname() {
        let tmp = tempfile::tempdir().unwrap();
        let fleet = test_fleet(&tmp);
        let mut sink = RecordingSink::default();
        let interrupt = Arc::new(AtomicBool::new(false));
        let flag = interrupt.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            flag.store(true, Ordering::SeqCst);
        });
        let state = PingState {
            mean: 50.0,
            stddev: 3.0,
            success_probability: 0.0,
        };
        run_with_state("192.168.0.232", &fleet, interrupt, &mut sink, state)
            .await
            .unwrap();
        assert!(sink.lines.iter().any(|l| l.starts_with("PING test02 ")));
        assert!(sink.lines.iter().any(|l| l == "--- 192.168.0.232 ping statistics ---"));
    }
}
