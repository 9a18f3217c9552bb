//! 记忆层：会话日志（只追加）、会话数据、持久化

pub mod entry;
pub mod persistence;
pub mod session;

pub use entry::{MemoryEntry, NewEntry, ReasoningPattern};
pub use persistence::{FileSessionStore, InMemorySessionStore, SessionStore};
#[cfg(feature = "async-sqlite")]
pub use persistence::SqliteSessionStore;
pub use session::{log_agent_reasoning, SessionMemory, SessionSummary};
