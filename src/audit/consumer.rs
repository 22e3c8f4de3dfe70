//! The single-reader task that drains finished sessions into the audit
//! store, in the order they were enqueued (spec §4.5/§5).

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::models::AttackSession;
use super::store::AuditStore;
use crate::session::SessionRecord;

pub struct SessionConsumer {
    handle: JoinHandle<()>,
}

impl SessionConsumer {
    /// Spawn the consumer loop. It processes exactly the sessions sent
    /// on `rx`, in FIFO order, persisting each one's end time.
    pub fn spawn(store: Arc<AuditStore>, mut rx: mpsc::Receiver<SessionRecord>) -> Self {
        let handle = tokio::spawn(async move {
            while let Some(record) = rx.recv().await {
                let session_id = record.id.to_string();
                if let Err(err) = store.finalize_session(&session_id, record.end_time) {
                    tracing::warn!(session = %session_id, error = %err, "failed to persist session end");
                }
                tracing::debug!(session = %session_id, "session drained from queue");
            }
            tracing::info!("session consumer stopped, queue closed");
        });
        SessionConsumer { handle }
    }

    /// Cancel the consumer task. In-flight persistence is abandoned; the
    /// audit store is never left mid-transaction because every write
    /// already commits or rolls back before the next is attempted.
    pub fn stop(self) {
        self.handle.abort();
    }
}

/// Record a session's birth. Called at connection accept, before the
/// shell's read-eval loop starts (spec §3).
pub fn record_session_start(
    store: &AuditStore,
    session: &crate::session::Session,
) -> rusqlite::Result<()> {
    store.insert_session(&AttackSession {
        id: session.id.to_string(),
        start_time: session.start_time,
        source_ip: session.source_ip.to_string(),
        source_port: session.source_port,
        end_time: None,
    })
}
