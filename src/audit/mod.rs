pub mod consumer;
pub mod models;
pub mod store;

pub use consumer::{record_session_start, SessionConsumer};
pub use models::{AttackCommand, AttackSession};
pub use store::AuditStore;
