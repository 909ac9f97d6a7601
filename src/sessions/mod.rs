//! Session management: tracks escalation conversation state and transcripts.

pub mod in_memory;
pub mod traits;

pub use in_memory::InMemorySessionStore;
pub use traits::{Role, Session, SessionFilter, SessionState, SessionStore, Turn};

use std::sync::Arc;

/// Create a default in-memory session store.
pub fn create_session_store() -> Arc<dyn SessionStore> {
    Arc::new(InMemorySessionStore::new())
}

/// Mint a fresh opaque session identifier.
pub fn mint_session_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
