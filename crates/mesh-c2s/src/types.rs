//! Common types for the c2s protocol core.

use chrono::{DateTime, Utc};
use jid::FullJid;
use minidom::Element;
use serde::{Deserialize, Serialize};

use crate::stanza::ns;

/// Presence show value (RFC 6121 Section 4.7.2.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Show {
    /// Away
    Away,
    /// Free for chat
    Chat,
    /// Do not disturb
    Dnd,
    /// Extended away
    Xa,
}

impl Show {
    /// Get the `<show/>` text value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Show::Away => "away",
            Show::Chat => "chat",
            Show::Dnd => "dnd",
            Show::Xa => "xa",
        }
    }

    /// Parse a `<show/>` text value.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "away" => Some(Show::Away),
            "chat" => Some(Show::Chat),
            "dnd" => Some(Show::Dnd),
            "xa" => Some(Show::Xa),
            _ => None,
        }
    }
}

impl std::fmt::Display for Show {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Last-known presence of a userid, as kept by the presence store.
///
/// Independent of whether the user is connected right now.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceRecord {
    /// Stored userid (node, optionally followed by a resource suffix)
    pub userid: String,
    /// Custom status message
    pub status: Option<String>,
    /// Show value
    pub show: Option<Show>,
    /// Time of the last presence change
    pub timestamp: DateTime<Utc>,
    /// Fingerprint of the user's public key
    pub fingerprint: Option<String>,
}

impl PresenceRecord {
    /// Create a record with no status, show or key.
    pub fn new(userid: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            userid: userid.into(),
            status: None,
            show: None,
            timestamp,
            fingerprint: None,
        }
    }

    /// Set the status message.
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// Set the show value.
    pub fn with_show(mut self, show: Show) -> Self {
        self.show = Some(show);
        self
    }

    /// Set the key fingerprint.
    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = Some(fingerprint.into());
        self
    }
}

/// A live client session, as tracked by the session registry.
#[derive(Debug, Clone)]
pub struct LiveSession {
    /// Userid the session belongs to
    pub userid: String,
    /// Full JID of the client stream
    pub jid: FullJid,
    /// Last presence the client broadcast, if any
    pub presence: Option<Element>,
}

impl LiveSession {
    /// The session's presence if it is an available presence (no `type`).
    pub fn available_presence(&self) -> Option<&Element> {
        self.presence
            .as_ref()
            .filter(|p| p.name() == "presence" && p.attr("type").is_none())
    }
}

/// A message waiting in offline storage.
#[derive(Debug, Clone)]
pub struct OfflineMessage {
    /// Storage id
    pub id: String,
    /// Bare userid of the recipient
    pub recipient: String,
    /// The full stanza as it was stored
    pub stanza: Element,
    /// When the message was queued
    pub timestamp: Option<DateTime<Utc>>,
}

impl OfflineMessage {
    /// Element name of the stored stanza, used as the storage kind.
    pub fn kind(&self) -> String {
        self.stanza.name().to_string()
    }
}

/// Correlation metadata for a fan-out of probe responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationGroup {
    /// Id of the query being answered
    pub id: String,
    /// How many responses the requester should expect
    pub count: usize,
}

impl CorrelationGroup {
    /// Create a correlation group.
    pub fn new(id: impl Into<String>, count: usize) -> Self {
        Self {
            id: id.into(),
            count,
        }
    }

    /// Build the `<group/>` element.
    pub fn to_element(&self) -> Element {
        Element::builder("group", ns::STANZA_GROUP)
            .attr("id", self.id.as_str())
            .attr("count", self.count.to_string())
            .build()
    }

    /// Parse a `<group/>` child from a stanza.
    pub fn from_stanza(stanza: &Element) -> Option<Self> {
        let group = stanza.get_child("group", ns::STANZA_GROUP)?;
        Some(Self {
            id: group.attr("id")?.to_string(),
            count: group.attr("count")?.parse().ok()?,
        })
    }
}

/// Stanza type for metrics and tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StanzaType {
    /// Message stanza
    Message,
    /// Presence stanza
    Presence,
    /// IQ (info/query) stanza
    Iq,
    /// Unknown or internal stanza
    Other,
}

impl StanzaType {
    /// Classify an element by name.
    pub fn of(stanza: &Element) -> Self {
        match stanza.name() {
            "message" => StanzaType::Message,
            "presence" => StanzaType::Presence,
            "iq" => StanzaType::Iq,
            _ => StanzaType::Other,
        }
    }
}

impl std::fmt::Display for StanzaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StanzaType::Message => write!(f, "message"),
            StanzaType::Presence => write!(f, "presence"),
            StanzaType::Iq => write!(f, "iq"),
            StanzaType::Other => write!(f, "other"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_show_round_trip_values() {
        for show in [Show::Away, Show::Chat, Show::Dnd, Show::Xa] {
            assert_eq!(Show::parse(show.as_str()), Some(show));
        }
        assert_eq!(Show::parse("available"), None);
    }

    #[test]
    fn test_correlation_group_element() {
        let group = CorrelationGroup::new("probe-1", 3);
        let elem = group.to_element();
        assert!(elem.is("group", ns::STANZA_GROUP));
        assert_eq!(elem.attr("count"), Some("3"));

        let stanza = Element::builder("presence", ns::COMPONENT_ACCEPT)
            .append(elem)
            .build();
        assert_eq!(CorrelationGroup::from_stanza(&stanza), Some(group));
    }

    #[test]
    fn test_available_presence_filter() {
        let jid: FullJid = "alice@prime.example.net/phone".parse().unwrap();
        let available: Element = "<presence xmlns='jabber:client'><show>away</show></presence>"
            .parse()
            .unwrap();
        let unavailable: Element = "<presence xmlns='jabber:client' type='unavailable'/>"
            .parse()
            .unwrap();

        let mut session = LiveSession {
            userid: "alice".to_string(),
            jid,
            presence: Some(available),
        };
        assert!(session.available_presence().is_some());

        session.presence = Some(unavailable);
        assert!(session.available_presence().is_none());

        session.presence = None;
        assert!(session.available_presence().is_none());
    }

    #[test]
    fn test_stanza_type_of() {
        let iq: Element = "<iq xmlns='jabber:client' type='get'/>".parse().unwrap();
        assert_eq!(StanzaType::of(&iq), StanzaType::Iq);
        assert_eq!(StanzaType::of(&iq).to_string(), "iq");
    }
}
