//! Offline replay of stanzas against in-memory collaborators.
//!
//! A [`Fixture`] describes the stored and live state of a node as JSON. It
//! builds a [`ReplayNode`] whose dispatcher writes outbound stanzas into a
//! channel, so a recorded stream can be replayed and its output inspected
//! without a router.
//!
//! ```json
//! {
//!   "presence": [{"userid": "alice", "status": null, "show": "away",
//!                 "timestamp": "2014-03-07T09:05:02Z", "fingerprint": null}],
//!   "offline": [{"id": "m1", "recipient": "alice",
//!                "stanza": "<message xmlns='jabber:component:accept' id='m1'/>"}],
//!   "sessions": [{"jid": "bob@prime.example.net/phone"}],
//!   "peers": ["beta.example.net"],
//!   "keys": [{"userid": "alice", "fingerprint": "ABCD", "key": "a2V5"}]
//! }
//! ```

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::prelude::*;
use chrono::{DateTime, Utc};
use jid::FullJid;
use minidom::Element;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::C2sConfig;
use crate::dispatch::Dispatcher;
use crate::error::C2sError;
use crate::handlers::HandlerContext;
use crate::keyring::StaticKeyring;
use crate::registry::InMemorySessionRegistry;
use crate::routing::{ChannelSink, MessagePipeline, OutboundStanza};
use crate::store::{InMemoryOfflineStore, InMemoryPresenceStore};
use crate::types::{OfflineMessage, PresenceRecord};

/// Default capacity of the outbound channel.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Stored and live state of a node.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Fixture {
    /// Presence table
    pub presence: Vec<PresenceRecord>,
    /// Offline queue, in enqueue order
    pub offline: Vec<OfflineFixture>,
    /// Live client sessions
    pub sessions: Vec<SessionFixture>,
    /// Federation peer hostnames (this node is always included)
    pub peers: Vec<String>,
    /// Public keys
    pub keys: Vec<KeyFixture>,
}

/// A queued offline message.
#[derive(Debug, Clone, Deserialize)]
pub struct OfflineFixture {
    pub id: String,
    pub recipient: String,
    /// Serialized stanza
    pub stanza: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// A live client session.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionFixture {
    pub jid: String,
    /// Last presence broadcast by the client, serialized
    #[serde(default)]
    pub presence: Option<String>,
}

/// A public key, base64 encoded.
#[derive(Debug, Clone, Deserialize)]
pub struct KeyFixture {
    pub userid: String,
    pub fingerprint: String,
    pub key: String,
}

/// Something the message pipeline was asked to do.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// An ordinary message to process
    Process(Element),
    /// A message a peer failed to deliver
    Undeliverable(Element),
}

/// Pipeline that records requests instead of delivering.
#[derive(Debug, Default)]
pub struct RecordingPipeline {
    events: Mutex<Vec<PipelineEvent>>,
}

impl RecordingPipeline {
    /// Take the recorded events.
    pub fn drain(&self) -> Vec<PipelineEvent> {
        self.events
            .lock()
            .map(|mut events| std::mem::take(&mut *events))
            .unwrap_or_default()
    }

    fn record(&self, event: PipelineEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

#[async_trait]
impl MessagePipeline for RecordingPipeline {
    async fn process(&self, stanza: Element) {
        self.record(PipelineEvent::Process(stanza));
    }

    async fn handle_undeliverable(&self, stanza: Element) {
        self.record(PipelineEvent::Undeliverable(stanza));
    }
}

/// A node wired to in-memory collaborators.
pub struct ReplayNode {
    /// Dispatcher for inbound stanzas
    pub dispatcher: Dispatcher,
    /// Outbound stanzas, in emission order
    pub outbound: mpsc::Receiver<OutboundStanza>,
    /// Pipeline requests
    pub pipeline: Arc<RecordingPipeline>,
    /// Offline queue, for inspection after a replay
    pub offline: Arc<InMemoryOfflineStore>,
    /// Presence table, for inspection after a replay
    pub presence: Arc<InMemoryPresenceStore>,
}

impl ReplayNode {
    /// Collect every outbound stanza emitted so far.
    pub fn drain_outbound(&mut self) -> Vec<Element> {
        let mut stanzas = Vec::new();
        while let Ok(outbound) = self.outbound.try_recv() {
            stanzas.push(outbound.stanza);
        }
        stanzas
    }
}

impl Fixture {
    /// Parse a fixture from JSON.
    pub fn from_json(json: &str) -> Result<Self, C2sError> {
        serde_json::from_str(json).map_err(|e| C2sError::config(format!("invalid fixture: {}", e)))
    }

    /// Load a fixture file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, C2sError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| C2sError::config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    /// Outbound stanzas a single inbound stanza can produce against this
    /// state: a full snapshot (a presence per live session or record plus a
    /// vCard per record) or a full offline flush.
    pub fn burst_size(&self) -> usize {
        let snapshot = self.presence.len() * 2 + self.sessions.len();
        snapshot.max(self.offline.len())
    }

    /// Build a node holding this fixture's state.
    ///
    /// The outbound channel is drained between stanzas only, so it holds at
    /// least [`Fixture::burst_size`] stanzas whatever `capacity` asks for.
    pub fn build(self, config: C2sConfig, capacity: usize) -> Result<ReplayNode, C2sError> {
        let capacity = capacity.max(self.burst_size()).max(1);
        let presence = Arc::new(InMemoryPresenceStore::new());
        for record in self.presence {
            presence.upsert(record)?;
        }

        let offline = Arc::new(InMemoryOfflineStore::new());
        for message in self.offline {
            offline.enqueue(OfflineMessage {
                stanza: parse_stanza(&message.stanza)?,
                id: message.id,
                recipient: message.recipient,
                timestamp: message.timestamp,
            })?;
        }

        let sessions = Arc::new(InMemorySessionRegistry::new());
        for session in self.sessions {
            let jid: FullJid = session.jid.parse()?;
            let presence = session.presence.as_deref().map(parse_stanza).transpose()?;
            sessions.register(jid, presence);
        }

        let mut keyring = StaticKeyring::new().with_host(config.servername.clone());
        for peer in self.peers {
            keyring = keyring.with_host(peer);
        }
        for key in self.keys {
            let blob = BASE64_STANDARD
                .decode(&key.key)
                .map_err(|e| C2sError::config(format!("invalid key for {}: {}", key.userid, e)))?;
            keyring = keyring.with_key(key.userid, key.fingerprint, blob);
        }

        let (sink, outbound) = ChannelSink::channel(capacity);
        let pipeline = Arc::new(RecordingPipeline::default());

        info!(
            capacity,
            presence = presence.len(),
            offline = offline.len(),
            sessions = sessions.session_count(),
            "Replay node ready"
        );

        let ctx = HandlerContext::new(
            config,
            presence.clone(),
            offline.clone(),
            sessions,
            Arc::new(keyring),
            pipeline.clone(),
            Arc::new(sink),
        )?;

        Ok(ReplayNode {
            dispatcher: Dispatcher::new(ctx),
            outbound,
            pipeline,
            offline,
            presence,
        })
    }
}

/// Parse one serialized stanza.
pub fn parse_stanza(xml: &str) -> Result<Element, C2sError> {
    let stanza = xml.trim().parse::<Element>().map_err(|e| C2sError::xml_parse(e.to_string()))?;
    debug!(name = %stanza.name(), "Parsed stanza");
    Ok(stanza)
}
