//! Per-connection session bookkeeping: identity, activity tracking, and
//! the idle watcher that hands a finished session to the audit consumer
//! exactly once (spec §3, §4.5, §8 invariants 5-6).

use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::mpsc;
use uuid::Uuid;

const POLL_INTERVAL: Duration = Duration::from_secs(5);
const IDLE_THRESHOLD: Duration = Duration::from_secs(60);

/// A finished session as handed to the audit consumer.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: Uuid,
    pub source_ip: IpAddr,
    pub source_port: u16,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

/// A live connection's lifecycle record. `last_activity` is updated on
/// every byte written back to the client; the watcher polls it to decide
/// when the session has gone idle.
pub struct Session {
    pub id: Uuid,
    pub source_ip: IpAddr,
    pub source_port: u16,
    pub start_time: DateTime<Utc>,
    last_activity_unix: AtomicI64,
    enqueued: AtomicBool,
}

impl Session {
    pub fn new(source_ip: IpAddr, source_port: u16) -> Arc<Session> {
        let now = Utc::now();
        Arc::new(Session {
            id: Uuid::new_v4(),
            source_ip,
            source_port,
            start_time: now,
            last_activity_unix: AtomicI64::new(now.timestamp()),
            enqueued: AtomicBool::new(false),
        })
    }

    /// Refresh `last_activity` to now. Called on every write back to the
    /// remote side, per spec §4.4.
    pub fn touch(&self) {
        self.last_activity_unix.store(Utc::now().timestamp(), Ordering::SeqCst);
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.last_activity_unix.load(Ordering::SeqCst), 0)
            .single()
            .unwrap_or_else(Utc::now)
    }

    fn idle_for(&self) -> Duration {
        let now = Utc::now();
        let last = self.last_activity();
        (now - last).to_std().unwrap_or(Duration::ZERO)
    }

    /// First caller wins; later callers see `false` and must not enqueue
    /// again. Guarantees exactly-once enqueue across the idle watcher and
    /// a clean shell shutdown racing each other.
    fn mark_enqueued(&self) -> bool {
        self.enqueued
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn already_enqueued(&self) -> bool {
        self.enqueued.load(Ordering::SeqCst)
    }

    fn to_record(&self, end_time: DateTime<Utc>) -> SessionRecord {
        SessionRecord {
            id: self.id,
            source_ip: self.source_ip,
            source_port: self.source_port,
            start_time: self.start_time,
            end_time,
        }
    }

    /// Enqueue this session if nobody has already done so — used by the
    /// shell's clean-shutdown path racing the idle watcher.
    pub async fn enqueue_if_needed(self: &Arc<Self>, tx: &mpsc::Sender<SessionRecord>) {
        if self.mark_enqueued() {
            let _ = tx.send(self.to_record(Utc::now())).await;
        }
    }

    /// Poll every 5 seconds; once 60 seconds of silence has elapsed,
    /// enqueue exactly once and exit.
    pub fn watch(self: Arc<Self>, tx: mpsc::Sender<SessionRecord>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(POLL_INTERVAL).await;
                if self.already_enqueued() {
                    break;
                }
                if self.idle_for() >= IDLE_THRESHOLD {
                    if self.mark_enqueued() {
                        let record = self.to_record(Utc::now());
                        if tx.send(record).await.is_err() {
                            tracing::warn!(session = %self.id, "session queue closed before idle enqueue");
                        }
                    }
                    break;
                }
            }
        })
    }
}
