use chrono::{DateTime, Utc};

/// One accepted connection, per spec §3. `end_time` is `None` until the
/// session is finalized by the consumer.
#[derive(Debug, Clone)]
pub struct AttackSession {
    pub id: String,
    pub start_time: DateTime<Utc>,
    pub source_ip: String,
    pub source_port: u16,
    pub end_time: Option<DateTime<Utc>>,
}

/// One command line accepted by the shell on a given session, ordered
/// by `time` within that session.
#[derive(Debug, Clone)]
pub struct AttackCommand {
    pub id: i64,
    pub time: DateTime<Utc>,
    pub command: String,
    pub host: String,
    pub output: String,
    pub session_id: String,
}
