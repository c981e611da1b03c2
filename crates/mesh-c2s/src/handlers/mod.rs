//! Stanza handlers of the c2s component.
//!
//! Each handler owns one concern and reports whether it claimed a stanza.
//! The [`Dispatcher`](crate::dispatch::Dispatcher) evaluates them in priority
//! order and stops at the first [`Claim::Claimed`].
//!
//! ```text
//! router ──► Dispatcher ──► PresenceSyncHandler ──► PresenceStore / OfflineStore
//!                      ├──► PresenceProbeHandler ─► PresenceStore
//!                      ├──► LastActivityHandler ──► PresenceStore
//!                      └──► MessageDispatchHandler ► OfflineStore / MessagePipeline
//!                                     │
//!                                     ▼
//!                                StanzaSink ──► router
//! ```
//!
//! Handlers keep no state between invocations: every call re-reads the
//! stores and the session registry.

mod last_activity;
mod message;
mod presence_sync;
mod probe;

pub use last_activity::LastActivityHandler;
pub use message::MessageDispatchHandler;
pub use presence_sync::{FlushReport, PresenceSyncHandler, SendPresenceReport};
pub use probe::PresenceProbeHandler;

use std::sync::Arc;

use jid::Jid;
use minidom::Element;
use tracing::{debug, warn};

use crate::config::C2sConfig;
use crate::error::{C2sError, DeliveryError};
use crate::keyring::Keyring;
use crate::metrics;
use crate::registry::SessionRegistry;
use crate::routing::{MessagePipeline, StanzaSink};
use crate::stanza::{build_delay, describe, text_element};
use crate::store::{OfflineStore, PresenceStore};
use crate::types::{PresenceRecord, StanzaType};

/// Outcome of offering a stanza to a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// The handler took the stanza; no other handler may process it
    Claimed,
    /// The handler left the stanza for the next route
    Declined,
}

impl Claim {
    /// Whether the stanza was claimed.
    pub fn is_claimed(&self) -> bool {
        matches!(self, Claim::Claimed)
    }
}

/// Collaborators and configuration shared by every handler.
#[derive(Clone)]
pub struct HandlerContext {
    pub(crate) config: Arc<C2sConfig>,
    pub(crate) component: Jid,
    pub(crate) presence: Arc<dyn PresenceStore>,
    pub(crate) offline: Arc<dyn OfflineStore>,
    pub(crate) sessions: Arc<dyn SessionRegistry>,
    pub(crate) keyring: Arc<dyn Keyring>,
    pub(crate) pipeline: Arc<dyn MessagePipeline>,
    pub(crate) sink: Arc<dyn StanzaSink>,
}

impl HandlerContext {
    /// Create a context, validating the configuration.
    pub fn new(
        config: C2sConfig,
        presence: Arc<dyn PresenceStore>,
        offline: Arc<dyn OfflineStore>,
        sessions: Arc<dyn SessionRegistry>,
        keyring: Arc<dyn Keyring>,
        pipeline: Arc<dyn MessagePipeline>,
        sink: Arc<dyn StanzaSink>,
    ) -> Result<Self, C2sError> {
        config.validate()?;
        let component = config.component_entity()?;

        Ok(Self {
            config: Arc::new(config),
            component,
            presence,
            offline,
            sessions,
            keyring,
            pipeline,
            sink,
        })
    }

    /// The node configuration.
    pub fn config(&self) -> &C2sConfig {
        &self.config
    }

    /// This component's own address on the router.
    pub fn component(&self) -> &Jid {
        &self.component
    }

    /// Whether an address attribute names this component.
    pub(crate) fn is_this_entity(&self, address: Option<&str>) -> bool {
        address
            .and_then(|a| a.parse::<Jid>().ok())
            .is_some_and(|jid| jid == self.component)
    }

    /// Describe a stanza for logs, honoring the traffic logging switch.
    pub(crate) fn describe(&self, stanza: &Element) -> String {
        describe(stanza, self.config.log_traffic)
    }

    /// Send a stanza through the routing substrate.
    ///
    /// Failures are logged and counted before being returned, so callers in
    /// a batch only need to decide whether to continue.
    pub(crate) async fn emit(&self, stanza: Element) -> Result<(), DeliveryError> {
        let kind = StanzaType::of(&stanza);
        let description = self.describe(&stanza);

        match self.sink.send(stanza).await {
            Ok(()) => {
                debug!(stanza = %description, "Stanza sent");
                Ok(())
            }
            Err(e) => {
                metrics::record_delivery_failure(&kind.to_string());
                warn!(stanza = %description, error = %e, "Failed to send stanza");
                Err(e)
            }
        }
    }
}

/// Append the stored `<status/>` and `<show/>` of a record.
pub(crate) fn append_status(response: &mut Element, record: &PresenceRecord) {
    let namespace = response.ns();
    if let Some(status) = &record.status {
        response.append_child(text_element("status", &namespace, status));
    }
    if let Some(show) = record.show {
        response.append_child(text_element("show", &namespace, show.as_str()));
    }
}

/// Mark a presence as unavailable since the record's timestamp.
pub(crate) fn mark_unavailable(response: &mut Element, record: &PresenceRecord) {
    response.set_attr("type", "unavailable");
    response.append_child(build_delay(&record.timestamp));
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use chrono::Utc;

    use crate::types::Show;

    #[test]
    fn test_is_this_entity() {
        let h = harness();
        assert!(h.ctx.is_this_entity(Some("c2s.prime.example.net")));
        assert!(!h.ctx.is_this_entity(Some("c2s.beta.example.net")));
        assert!(!h.ctx.is_this_entity(None));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let h = harness();
        let result = HandlerContext::new(
            C2sConfig::new(""),
            h.presence.clone(),
            h.offline.clone(),
            h.sessions.clone(),
            Arc::new(crate::keyring::StaticKeyring::new()),
            h.pipeline.clone(),
            h.sink.clone(),
        );
        assert!(matches!(result, Err(C2sError::Config(_))));
    }

    #[test]
    fn test_status_and_unavailable_helpers() {
        let record = PresenceRecord::new(ALICE, Utc::now())
            .with_status("busy")
            .with_show(Show::Dnd);
        let mut response = parse("<presence xmlns='jabber:component:accept' to='x@y'/>");

        append_status(&mut response, &record);
        mark_unavailable(&mut response, &record);

        assert_eq!(response.attr("type"), Some("unavailable"));
        assert_eq!(
            response
                .get_child("show", "jabber:component:accept")
                .map(|s| s.text()),
            Some("dnd".to_string())
        );
        assert!(response.has_child("delay", crate::stanza::ns::DELAY));
    }
}
