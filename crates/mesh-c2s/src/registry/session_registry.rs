//! Session registry implementation.

use dashmap::DashMap;
use jid::{FullJid, Jid};
use minidom::Element;
use tracing::{debug, info, instrument};

use crate::addressing::split_userid;
use crate::types::LiveSession;

/// Read access to the live sessions of this node.
pub trait SessionRegistry: Send + Sync {
    /// Live sessions of a userid, ordered by resource.
    ///
    /// A userid carrying a resource suffix only matches that resource.
    fn sessions(&self, userid: &str) -> Vec<LiveSession>;

    /// Whether an address is connected: any resource for a bare JID, the
    /// exact resource for a full JID.
    fn is_live(&self, address: &Jid) -> bool;

    /// Resolve a session conflict for an address announced elsewhere.
    ///
    /// Returns `true` if a local session was evicted.
    fn check_conflict(&self, address: &Jid) -> bool;
}

/// DashMap-backed registry keyed by bare userid.
///
/// ## Usage
///
/// ```ignore
/// let registry = InMemorySessionRegistry::new();
///
/// // When a client binds a resource:
/// registry.register(full_jid.clone(), None);
///
/// // When it broadcasts presence:
/// registry.update_presence(&full_jid, presence_element);
///
/// // When the stream closes:
/// registry.unregister(&full_jid);
/// ```
#[derive(Debug, Default)]
pub struct InMemorySessionRegistry {
    sessions: DashMap<String, Vec<LiveSession>>,
}

impl InMemorySessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        info!("Creating session registry");
        Self::default()
    }

    /// Register a client stream, replacing any session with the same JID.
    #[instrument(skip(self, presence), fields(jid = %jid))]
    pub fn register(&self, jid: FullJid, presence: Option<Element>) {
        let Some(userid) = jid.node().map(|n| n.to_string()) else {
            debug!("Ignoring session without a user part");
            return;
        };

        let mut entry = self.sessions.entry(userid.clone()).or_default();
        entry.retain(|s| s.jid != jid);
        entry.push(LiveSession {
            userid,
            jid,
            presence,
        });
        entry.sort_by(|a, b| a.jid.resource().as_str().cmp(b.jid.resource().as_str()));
        debug!(count = entry.len(), "Registered session");
    }

    /// Record the latest presence broadcast by a session.
    ///
    /// Returns `false` if the session is not registered.
    pub fn update_presence(&self, jid: &FullJid, presence: Element) -> bool {
        let Some(node) = jid.node() else {
            return false;
        };
        match self.sessions.get_mut(node.as_str()) {
            Some(mut entry) => match entry.iter_mut().find(|s| &s.jid == jid) {
                Some(session) => {
                    session.presence = Some(presence);
                    true
                }
                None => false,
            },
            None => false,
        }
    }

    /// Remove a session.
    #[instrument(skip(self), fields(jid = %jid))]
    pub fn unregister(&self, jid: &FullJid) -> Option<LiveSession> {
        let node = jid.node()?;
        let mut removed = None;
        if let Some(mut entry) = self.sessions.get_mut(node.as_str()) {
            if let Some(idx) = entry.iter().position(|s| &s.jid == jid) {
                removed = Some(entry.remove(idx));
            }
        }
        self.sessions.remove_if(node.as_str(), |_, v| v.is_empty());

        if removed.is_some() {
            debug!("Unregistered session");
        }
        removed
    }

    /// Number of live sessions across all users.
    pub fn session_count(&self) -> usize {
        self.sessions.iter().map(|e| e.value().len()).sum()
    }
}

impl SessionRegistry for InMemorySessionRegistry {
    fn sessions(&self, userid: &str) -> Vec<LiveSession> {
        let (node, resource) = split_userid(userid);
        match self.sessions.get(node) {
            Some(entry) => entry
                .iter()
                .filter(|s| resource.map_or(true, |r| s.jid.resource().as_str() == r))
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    fn is_live(&self, address: &Jid) -> bool {
        let Some(node) = address.node() else {
            return false;
        };
        match self.sessions.get(node.as_str()) {
            Some(entry) => match address.resource() {
                Some(resource) => entry
                    .iter()
                    .any(|s| s.jid.resource().as_str() == resource.as_str()),
                None => !entry.is_empty(),
            },
            None => false,
        }
    }

    #[instrument(skip(self), fields(address = %address))]
    fn check_conflict(&self, address: &Jid) -> bool {
        let (Some(node), Some(resource)) = (address.node(), address.resource()) else {
            return false;
        };

        let conflicting = self.sessions.get(node.as_str()).and_then(|entry| {
            entry
                .iter()
                .find(|s| {
                    s.jid.resource().as_str() == resource.as_str()
                        && s.jid.domain() != address.domain()
                })
                .map(|s| s.jid.clone())
        });

        match conflicting {
            Some(local) => {
                info!(local = %local, "Resource connected elsewhere, evicting local session");
                self.unregister(&local);
                true
            }
            None => false,
        }
    }
}
