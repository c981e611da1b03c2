//! Priority-ordered stanza dispatch.
//!
//! Every inbound stanza is matched against an ordered list of [`Route`]s.
//! Routes are evaluated by descending priority, in declaration order among
//! equal priorities, and dispatch stops at the first handler that claims the
//! stanza.

use jid::Jid;
use minidom::Element;
use tracing::{debug, instrument};

use crate::handlers::{
    Claim, HandlerContext, LastActivityHandler, MessageDispatchHandler, PresenceProbeHandler,
    PresenceSyncHandler,
};
use crate::metrics;
use crate::stanza::{child_named, ns};
use crate::types::StanzaType;

/// A stanza shape and the handler subscribed to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Type-less presence addressed to this component
    InitialPresence,
    /// `<presence type='probe'/>`
    PresenceProbe,
    /// `<iq type='get'><query xmlns='jabber:iq:last'/></iq>`
    LastActivity,
    /// `<message><ack xmlns='urn:xmpp:server-receipts'/></message>`
    MessageAck,
    /// `<message type='error'>` reporting a network server timeout
    NetworkTimeout,
    /// Any other message
    Message,
}

impl Route {
    /// Every route in declaration order.
    pub const ALL: [Route; 6] = [
        Route::InitialPresence,
        Route::PresenceProbe,
        Route::LastActivity,
        Route::MessageAck,
        Route::NetworkTimeout,
        Route::Message,
    ];

    /// Route name for logs and metrics.
    pub fn name(&self) -> &'static str {
        match self {
            Route::InitialPresence => "initial_presence",
            Route::PresenceProbe => "presence_probe",
            Route::LastActivity => "last_activity",
            Route::MessageAck => "message_ack",
            Route::NetworkTimeout => "network_timeout",
            Route::Message => "message",
        }
    }

    /// Higher priorities are evaluated first.
    pub fn priority(&self) -> u8 {
        match self {
            Route::InitialPresence | Route::Message => 0,
            Route::PresenceProbe
            | Route::LastActivity
            | Route::MessageAck
            | Route::NetworkTimeout => 100,
        }
    }

    /// Whether a stanza has this route's shape.
    pub fn matches(&self, stanza: &Element, component: &Jid) -> bool {
        let kind = StanzaType::of(stanza);
        let type_ = stanza.attr("type");

        match self {
            Route::InitialPresence => {
                kind == StanzaType::Presence
                    && type_.is_none()
                    && stanza
                        .attr("to")
                        .and_then(|to| to.parse::<Jid>().ok())
                        .is_some_and(|to| &to == component)
            }
            Route::PresenceProbe => kind == StanzaType::Presence && type_ == Some("probe"),
            Route::LastActivity => {
                kind == StanzaType::Iq
                    && type_ == Some("get")
                    && stanza.has_child("query", ns::IQ_LAST)
            }
            Route::MessageAck => {
                kind == StanzaType::Message && stanza.has_child("ack", ns::SERVER_RECEIPTS)
            }
            Route::NetworkTimeout => {
                kind == StanzaType::Message
                    && type_ == Some("error")
                    && child_named(stanza, "error")
                        .and_then(|e| child_named(e, "network-server-timeout"))
                        .is_some()
            }
            Route::Message => kind == StanzaType::Message,
        }
    }
}

/// Routes inbound stanzas to the c2s handlers.
#[derive(Clone)]
pub struct Dispatcher {
    component: Jid,
    routes: Vec<Route>,
    presence_sync: PresenceSyncHandler,
    probe: PresenceProbeHandler,
    last_activity: LastActivityHandler,
    messages: MessageDispatchHandler,
}

impl Dispatcher {
    /// Create a dispatcher with every route registered.
    pub fn new(ctx: HandlerContext) -> Self {
        let mut routes = Route::ALL.to_vec();
        // Stable: equal priorities keep declaration order.
        routes.sort_by_key(|r| std::cmp::Reverse(r.priority()));

        Self {
            component: ctx.component().clone(),
            routes,
            presence_sync: PresenceSyncHandler::new(ctx.clone()),
            probe: PresenceProbeHandler::new(ctx.clone()),
            last_activity: LastActivityHandler::new(ctx.clone()),
            messages: MessageDispatchHandler::new(ctx),
        }
    }

    /// Routes in evaluation order.
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// The presence sync handler, for hosts that push snapshots directly.
    pub fn presence_sync(&self) -> &PresenceSyncHandler {
        &self.presence_sync
    }

    /// Offer a stanza to each matching route until one claims it.
    ///
    /// Returns the claiming route, or `None` when no route claimed the stanza.
    #[instrument(skip(self, stanza), fields(stanza_type = %StanzaType::of(&stanza)))]
    pub async fn dispatch(&self, stanza: Element) -> Option<Route> {
        for route in &self.routes {
            if !route.matches(&stanza, &self.component) {
                continue;
            }

            if self.invoke(*route, &stanza).await.is_claimed() {
                metrics::record_dispatch(route.name());
                debug!(route = route.name(), "Stanza claimed");
                return Some(*route);
            }
        }

        debug!("No route claimed stanza");
        None
    }

    async fn invoke(&self, route: Route, stanza: &Element) -> Claim {
        match route {
            Route::InitialPresence => self.presence_sync.handle(stanza).await,
            Route::PresenceProbe => self.probe.handle(stanza).await,
            Route::LastActivity => self.last_activity.handle(stanza).await,
            Route::MessageAck => self.messages.handle_ack(stanza).await,
            Route::NetworkTimeout => self.messages.handle_network_timeout(stanza).await,
            Route::Message => self.messages.handle_message(stanza).await,
        }
    }
}
