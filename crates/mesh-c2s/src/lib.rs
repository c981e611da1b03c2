//! # mesh-c2s
//!
//! Client-facing protocol core of a federated XMPP node.
//!
//! The c2s component sits behind a router and reconciles the live sessions of
//! locally connected users with durably stored presence and offline messages.
//!
//! ## Architecture
//!
//! - **Dispatcher**: matches inbound stanzas against a priority-ordered route
//!   list and stops at the first handler that claims them
//! - **Handlers**: presence sync, presence probes, last activity and message
//!   dispatch (receipt acks, federation timeouts)
//! - **Collaborators**: presence store, offline store, session registry,
//!   keyring, message pipeline and the routing sink, all behind traits
//!
//! ## XEP Support
//!
//! - RFC 6120/6121 (XMPP Core/IM) presence and probes
//! - XEP-0012 (Last Activity)
//! - XEP-0114 (Jabber Component Protocol) routing namespace
//! - XEP-0203 (Delayed Delivery)

pub mod addressing;
pub mod config;
pub mod dispatch;
pub mod handlers;
pub mod keyring;
pub mod metrics;
pub mod registry;
pub mod replay;
pub mod routing;
pub mod stanza;
pub mod store;
pub mod telemetry;

mod error;
mod types;

pub use config::C2sConfig;
pub use dispatch::{Dispatcher, Route};
pub use error::{
    build_error_element, C2sError, DeliveryError, StanzaErrorCondition, StanzaErrorType,
    StoreError,
};
pub use handlers::{
    Claim, FlushReport, HandlerContext, LastActivityHandler, MessageDispatchHandler,
    PresenceProbeHandler, PresenceSyncHandler, SendPresenceReport,
};
pub use keyring::{Keyring, StaticKeyring};
pub use registry::{InMemorySessionRegistry, SessionRegistry};
pub use routing::{ChannelSink, MessagePipeline, OutboundStanza, StanzaSink};
pub use stanza::ns;
pub use store::{InMemoryOfflineStore, InMemoryPresenceStore, OfflineStore, PresenceStore};
pub use types::*;
