//! Live session registry.
//!
//! Tracks which client streams are connected to this node right now, together
//! with the last presence each stream broadcast. Nothing in here is persisted:
//! sessions appear on connect and vanish on disconnect.
//!
//! ```text
//! client stream (alice@node/phone) ──register──► SessionRegistry ◄──sessions()── PresenceSyncHandler
//!                                                      ▲
//!                                                      └──is_live()── PresenceProbeHandler / LastActivityHandler
//! ```

mod session_registry;

pub use session_registry::{InMemorySessionRegistry, SessionRegistry};
