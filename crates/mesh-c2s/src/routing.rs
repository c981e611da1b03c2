//! Routing substrate seams.
//!
//! Outbound stanzas leave through a [`StanzaSink`]; ordinary messages and
//! undeliverable ones are handed to a [`MessagePipeline`]. Both are owned by
//! the host router, not by this crate.

use async_trait::async_trait;
use minidom::Element;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::DeliveryError;

/// A stanza queued for the router.
#[derive(Debug, Clone)]
pub struct OutboundStanza {
    /// The stanza to send
    pub stanza: Element,
}

impl OutboundStanza {
    /// Create a new outbound stanza.
    pub fn new(stanza: Element) -> Self {
        Self { stanza }
    }
}

/// Where handlers emit their outbound stanzas.
#[async_trait]
pub trait StanzaSink: Send + Sync {
    /// Hand one stanza to the router.
    async fn send(&self, stanza: Element) -> Result<(), DeliveryError>;
}

/// The message processing pipeline of the host server.
#[async_trait]
pub trait MessagePipeline: Send + Sync {
    /// Process an ordinary inbound message (delivery, storage, receipts).
    async fn process(&self, stanza: Element);

    /// Recover a message a federation peer failed to deliver.
    async fn handle_undeliverable(&self, stanza: Element);
}

/// Sink backed by a bounded mpsc channel towards the router task.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::Sender<OutboundStanza>,
}

impl ChannelSink {
    /// Create a sink and the receiving end for the router.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<OutboundStanza>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl StanzaSink for ChannelSink {
    async fn send(&self, stanza: Element) -> Result<(), DeliveryError> {
        if stanza.attr("to").is_none() {
            return Err(DeliveryError::InvalidTarget(format!(
                "<{}/> without 'to'",
                stanza.name()
            )));
        }

        match self.sender.try_send(OutboundStanza::new(stanza)) {
            Ok(()) => {
                debug!("Stanza queued for routing");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Routing channel full, applying backpressure");
                Err(DeliveryError::ChannelFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(DeliveryError::ChannelClosed),
        }
    }
}
