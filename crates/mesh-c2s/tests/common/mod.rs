//! Test utilities for the c2s handlers.
//!
//! Provides recording collaborators and a node wired to in-memory stores, so
//! tests can drive the dispatcher and inspect everything it emitted.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use minidom::Element;
use mesh_c2s::{
    C2sConfig, DeliveryError, Dispatcher, HandlerContext, InMemoryOfflineStore,
    InMemoryPresenceStore, InMemorySessionRegistry, MessagePipeline, OfflineMessage,
    StanzaSink, StaticKeyring,
};

/// Hostname of the node under test.
pub const SERVER: &str = "prime.example.net";

/// A registered federation peer.
pub const PEER: &str = "beta.example.net";

/// Component address of the node under test.
pub const COMPONENT: &str = "c2s.prime.example.net";

/// 40-character userids, as issued by the registration service.
pub const ALICE: &str = "a94a8fe5ccb19ba61c4c0873d391e987982fbbd3";
pub const BOB: &str = "62cdb7020ff920e5aa642c3d4066950dd1f01f4d";
pub const CAROL: &str = "d7b0ba1a1d2a2e8f3c1e5a5b0d3f4a9c8e7b6a5f";

/// Sink that records every stanza and refuses the ids it was told to.
#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<Element>>,
    refused: Mutex<HashSet<String>>,
}

impl RecordingSink {
    /// Refuse delivery of stanzas carrying this id.
    pub fn refuse(&self, id: &str) {
        self.refused.lock().unwrap().insert(id.to_string());
    }

    /// Take the stanzas sent so far.
    pub fn take(&self) -> Vec<Element> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }
}

#[async_trait]
impl StanzaSink for RecordingSink {
    async fn send(&self, stanza: Element) -> Result<(), DeliveryError> {
        if let Some(id) = stanza.attr("id") {
            if self.refused.lock().unwrap().contains(id) {
                return Err(DeliveryError::Disconnected(id.to_string()));
            }
        }
        self.sent.lock().unwrap().push(stanza);
        Ok(())
    }
}

/// Pipeline that records what it was handed.
#[derive(Default)]
pub struct RecordingPipeline {
    pub processed: Mutex<Vec<Element>>,
    pub undeliverable: Mutex<Vec<Element>>,
}

#[async_trait]
impl MessagePipeline for RecordingPipeline {
    async fn process(&self, stanza: Element) {
        self.processed.lock().unwrap().push(stanza);
    }

    async fn handle_undeliverable(&self, stanza: Element) {
        self.undeliverable.lock().unwrap().push(stanza);
    }
}

/// A node under test.
pub struct TestNode {
    pub dispatcher: Dispatcher,
    pub presence: Arc<InMemoryPresenceStore>,
    pub offline: Arc<InMemoryOfflineStore>,
    pub sessions: Arc<InMemorySessionRegistry>,
    pub pipeline: Arc<RecordingPipeline>,
    pub sink: Arc<RecordingSink>,
}

impl TestNode {
    /// A node knowing `PEER` as its only federation peer.
    pub fn new() -> Self {
        Self::with_keyring(StaticKeyring::new().with_host(SERVER).with_host(PEER))
    }

    pub fn with_keyring(keyring: StaticKeyring) -> Self {
        let presence = Arc::new(InMemoryPresenceStore::new());
        let offline = Arc::new(InMemoryOfflineStore::new());
        let sessions = Arc::new(InMemorySessionRegistry::new());
        let pipeline = Arc::new(RecordingPipeline::default());
        let sink = Arc::new(RecordingSink::default());

        let ctx = HandlerContext::new(
            C2sConfig::new(SERVER),
            presence.clone(),
            offline.clone(),
            sessions.clone(),
            Arc::new(keyring),
            pipeline.clone(),
            sink.clone(),
        )
        .expect("valid test configuration");

        Self {
            dispatcher: Dispatcher::new(ctx),
            presence,
            offline,
            sessions,
            pipeline,
            sink,
        }
    }

    /// Register a live session with an optional presence.
    pub fn connect(&self, full_jid: &str, presence: Option<&str>) {
        self.sessions
            .register(full_jid.parse().unwrap(), presence.map(parse));
    }

    /// Queue an offline message for a userid.
    pub fn queue(&self, id: &str, recipient: &str, stanza: &str, timestamp: Option<DateTime<Utc>>) {
        self.offline
            .enqueue(OfflineMessage {
                id: id.to_string(),
                recipient: recipient.to_string(),
                stanza: parse(stanza),
                timestamp,
            })
            .unwrap();
    }
}

/// Parse a stanza literal.
pub fn parse(xml: &str) -> Element {
    xml.parse().expect("valid test stanza")
}

/// Bare JID of a userid on the node under test.
pub fn local(userid: &str) -> String {
    format!("{}@{}", userid, SERVER)
}

/// Full JID of a userid on the node under test.
pub fn local_full(userid: &str, resource: &str) -> String {
    format!("{}@{}/{}", userid, SERVER, resource)
}

/// A self-addressed initial presence from `from`.
pub fn initial_presence(from: &str) -> Element {
    parse(&format!(
        "<presence xmlns='jabber:component:accept' from='{}' to='{}'/>",
        from, COMPONENT
    ))
}

/// A chat message stored for later delivery.
pub fn stored_chat(id: &str, from: &str, receipt: bool) -> String {
    let request = if receipt {
        format!("<request xmlns='urn:xmpp:server-receipts' id='r-{}'/>", id)
    } else {
        String::new()
    };
    format!(
        "<message xmlns='jabber:component:accept' type='chat' id='{}' from='{}'><body>hello</body>{}</message>",
        id, from, request
    )
}
