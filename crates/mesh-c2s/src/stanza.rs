//! Stanza helpers shared by the c2s handlers.
//!
//! The handlers work on raw [`minidom::Element`] trees rather than typed
//! stanza structs: offline messages are replayed verbatim, probe responses
//! carry non-standard extension children, and the routing namespace has to be
//! rewritten in place. Everything here is a small, pure transformation.

use chrono::{DateTime, Utc};
use minidom::{Element, Node};
use rand::Rng;

/// Namespace URIs used on the wire.
pub mod ns {
    /// XMPP client namespace
    pub const JABBER_CLIENT: &str = "jabber:client";
    /// XMPP server namespace
    pub const JABBER_SERVER: &str = "jabber:server";
    /// Component routing namespace (XEP-0114)
    pub const COMPONENT_ACCEPT: &str = "jabber:component:accept";
    /// Stanza error namespace
    pub const STANZAS: &str = "urn:ietf:params:xml:ns:xmpp-stanzas";
    /// XEP-0203 Delayed Delivery
    pub const DELAY: &str = "urn:xmpp:delay";
    /// Server-side delivery receipts (request/received/sent/ack)
    pub const SERVER_RECEIPTS: &str = "urn:xmpp:server-receipts";
    /// XEP-0012 Last Activity
    pub const IQ_LAST: &str = "jabber:iq:last";
    /// vCard4 over XMPP
    pub const VCARD4: &str = "urn:ietf:params:xml:ns:vcard-4.0";
    /// Multi-response correlation group
    pub const STANZA_GROUP: &str = "urn:xmpp:stanza-group";
}

/// Delay stamp format shared by every node of the federation.
pub const XMPP_STAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Length of randomized response ids.
pub const RESPONSE_ID_LENGTH: usize = 8;

const ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Namespaces that carry stanza-level (not extension) elements.
const STANZA_NAMESPACES: [&str; 3] = [ns::JABBER_CLIENT, ns::JABBER_SERVER, ns::COMPONENT_ACCEPT];

/// Format a timestamp for a `<delay/>` stamp.
pub fn format_stamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.format(XMPP_STAMP_FORMAT).to_string()
}

/// Build a XEP-0203 `<delay/>` element.
pub fn build_delay(timestamp: &DateTime<Utc>) -> Element {
    Element::builder("delay", ns::DELAY)
        .attr("stamp", format_stamp(timestamp))
        .build()
}

/// Generate a random lowercase alphanumeric id.
pub fn random_id(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| ID_ALPHABET[rng.random_range(0..ID_ALPHABET.len())] as char)
        .collect()
}

/// Build the response skeleton for a stanza.
///
/// Same element name and namespace, `from`/`to` swapped, `id` preserved. When
/// `type_` is given it is set on the response.
pub fn to_response(stanza: &Element, type_: Option<&str>) -> Element {
    let mut builder = Element::builder(stanza.name(), stanza.ns());

    if let Some(from) = stanza.attr("from") {
        builder = builder.attr("to", from);
    }
    if let Some(to) = stanza.attr("to") {
        builder = builder.attr("from", to);
    }
    if let Some(id) = stanza.attr("id") {
        builder = builder.attr("id", id);
    }
    if let Some(type_) = type_ {
        builder = builder.attr("type", type_);
    }

    builder.build()
}

/// Build a text-only child element, e.g. `<status>` or `<show>`.
pub fn text_element(name: &str, namespace: &str, text: &str) -> Element {
    Element::builder(name, namespace)
        .append(Node::Text(text.to_string()))
        .build()
}

/// Rewrite every stanza-level element into `target` namespace.
///
/// Elements in `jabber:client`, `jabber:server` or `jabber:component:accept`
/// are moved into `target`; extension payloads keep their own namespace.
pub fn reset_namespace(element: &Element, target: &str) -> Element {
    let namespace = if STANZA_NAMESPACES.contains(&element.ns().as_str()) {
        target.to_string()
    } else {
        element.ns()
    };

    let mut builder = Element::builder(element.name(), namespace);
    for (name, value) in element.attrs() {
        builder = builder.attr(name, value);
    }
    for node in element.nodes() {
        match node {
            Node::Element(child) => {
                builder = builder.append(reset_namespace(child, target));
            }
            Node::Text(text) => {
                builder = builder.append(Node::Text(text.clone()));
            }
        }
    }

    builder.build()
}

/// Find a server receipt child (`request`, `received`, `sent`, `ack`).
pub fn extract_receipt<'a>(stanza: &'a Element, kind: &str) -> Option<&'a Element> {
    stanza.get_child(kind, ns::SERVER_RECEIPTS)
}

/// Mutable variant of [`extract_receipt`].
pub fn extract_receipt_mut<'a>(stanza: &'a mut Element, kind: &str) -> Option<&'a mut Element> {
    stanza.get_child_mut(kind, ns::SERVER_RECEIPTS)
}

/// Find a direct child by local name, whatever its namespace.
pub fn child_named<'a>(stanza: &'a Element, name: &str) -> Option<&'a Element> {
    stanza.children().find(|c| c.name() == name)
}

/// Short description of a stanza for logs.
///
/// With `full` set the whole serialized stanza is returned, otherwise only the
/// addressing.
pub fn describe(stanza: &Element, full: bool) -> String {
    if full {
        String::from(stanza)
    } else {
        format!(
            "<{} from={} to={} id={}>",
            stanza.name(),
            stanza.attr("from").unwrap_or("-"),
            stanza.attr("to").unwrap_or("-"),
            stanza.attr("id").unwrap_or("-"),
        )
    }
}
