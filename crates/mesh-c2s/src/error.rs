//! Error types for the c2s protocol core.

use minidom::Element;
use thiserror::Error;

use crate::stanza::ns;

/// Errors raised by the c2s handlers and their helpers.
#[derive(Debug, Error)]
pub enum C2sError {
    /// A JID could not be parsed or assembled
    #[error("Invalid JID: {0}")]
    Jid(#[from] jid::Error),

    /// XML parsing error
    #[error("XML parse error: {0}")]
    XmlParse(String),

    /// A stanza is missing something the handler needs
    #[error("Malformed stanza: {0}")]
    Malformed(String),

    /// A collaborating store failed
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The routing substrate refused a stanza
    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Stanza error (for error responses)
    #[error("Stanza error: {condition}")]
    Stanza {
        /// Error condition
        condition: StanzaErrorCondition,
        /// Error type
        error_type: StanzaErrorType,
        /// Optional text description
        text: Option<String>,
    },
}

impl C2sError {
    /// Create a new XML parse error.
    pub fn xml_parse(msg: impl Into<String>) -> Self {
        Self::XmlParse(msg.into())
    }

    /// Create a new malformed stanza error.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }

    /// Create a new configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a stanza error for 'item-not-found'.
    pub fn item_not_found(text: Option<String>) -> Self {
        Self::Stanza {
            condition: StanzaErrorCondition::ItemNotFound,
            error_type: StanzaErrorType::Cancel,
            text,
        }
    }

    /// Render a stanza error as an `<error/>` child element.
    ///
    /// Returns `None` for errors that are not stanza errors.
    pub fn to_error_element(&self) -> Option<Element> {
        match self {
            Self::Stanza {
                condition,
                error_type,
                text,
            } => Some(build_error_element(*condition, *error_type, text.as_deref())),
            _ => None,
        }
    }
}

/// Failure reported by a persistent collaborator (presence or offline store).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure to hand a stanza to the routing substrate.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The outbound channel has been closed
    #[error("Routing channel closed")]
    ChannelClosed,

    /// The outbound channel is full (backpressure)
    #[error("Routing channel full")]
    ChannelFull,

    /// The stanza has no usable destination
    #[error("Invalid destination: {0}")]
    InvalidTarget(String),

    /// The target is known to be disconnected
    #[error("Target disconnected: {0}")]
    Disconnected(String),
}

/// XMPP stanza error conditions (RFC 6120 Section 8.3.3) used by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StanzaErrorCondition {
    /// Item not found
    ItemNotFound,
}

impl StanzaErrorCondition {
    /// Get the element name for this condition.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ItemNotFound => "item-not-found",
        }
    }
}

impl std::fmt::Display for StanzaErrorCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// XMPP stanza error types (RFC 6120 Section 8.3.2) used by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StanzaErrorType {
    /// Do not retry (unrecoverable error)
    Cancel,
}

impl StanzaErrorType {
    /// Get the type attribute value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cancel => "cancel",
        }
    }
}

impl std::fmt::Display for StanzaErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Build an `<error/>` element for a stanza error response.
///
/// The element is created in the component routing namespace so it can be
/// appended directly to an outbound stanza.
pub fn build_error_element(
    condition: StanzaErrorCondition,
    error_type: StanzaErrorType,
    text: Option<&str>,
) -> Element {
    let mut builder = Element::builder("error", ns::COMPONENT_ACCEPT)
        .attr("type", error_type.as_str())
        .append(Element::builder(condition.as_str(), ns::STANZAS).build());

    if let Some(text) = text {
        builder = builder.append(
            Element::builder("text", ns::STANZAS)
                .append(minidom::Node::Text(text.to_string()))
                .build(),
        );
    }

    builder.build()
}
