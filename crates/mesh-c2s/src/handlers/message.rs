//! Message routing, receipt acks and federation timeout recovery.

use minidom::Element;
use tracing::{debug, info, instrument, warn};

use super::{Claim, HandlerContext};
use crate::error::C2sError;
use crate::metrics;
use crate::stanza::{child_named, extract_receipt, ns, random_id, reset_namespace, RESPONSE_ID_LENGTH};

/// Dispatches inbound messages.
///
/// Receipt acks retract offline messages, network timeouts are recovered
/// through the pipeline, everything else goes to the pipeline as is.
#[derive(Clone)]
pub struct MessageDispatchHandler {
    ctx: HandlerContext,
}

impl MessageDispatchHandler {
    /// Create a new handler.
    pub fn new(ctx: HandlerContext) -> Self {
        Self { ctx }
    }

    /// Dispatcher entry point for `<message><ack/></message>`.
    pub async fn handle_ack(&self, stanza: &Element) -> Claim {
        if let Err(e) = self.ack(stanza).await {
            warn!(error = %e, "Failed to process receipt ack");
        }
        Claim::Claimed
    }

    /// Dispatcher entry point for network timeout errors.
    pub async fn handle_network_timeout(&self, stanza: &Element) -> Claim {
        if let Err(e) = self.network_timeout(stanza).await {
            warn!(error = %e, "Failed to recover undelivered message");
        }
        Claim::Claimed
    }

    /// Dispatcher entry point for any other message.
    pub async fn handle_message(&self, stanza: &Element) -> Claim {
        self.dispatch(stanza).await;
        Claim::Claimed
    }

    /// Retract an acknowledged offline message.
    ///
    /// Only acks addressed to this component count. Returns whether a stored
    /// message was deleted; unknown ids are a no-op.
    #[instrument(skip(self, stanza), fields(id = ?stanza.attr("id")))]
    pub async fn ack(&self, stanza: &Element) -> Result<bool, C2sError> {
        let Some(id) = stanza.attr("id") else {
            debug!("Ack without message id");
            return Ok(false);
        };
        if !self.ctx.is_this_entity(stanza.attr("to")) {
            debug!(to = ?stanza.attr("to"), "Ack not addressed to this node");
            return Ok(false);
        }

        let deleted = self.ctx.offline.delete(id, stanza.name()).await?;
        if deleted {
            metrics::record_offline_retraction("ack");
            debug!("Offline message acknowledged");
        } else {
            debug!("Ack for unknown offline message");
        }
        Ok(deleted)
    }

    /// Recover a message a federation peer failed to deliver.
    ///
    /// The wrapped original goes to the undeliverable path. A chat message
    /// also gets a `sent` receipt so its sender stops waiting for one.
    /// Returns whether that receipt was sent.
    #[instrument(skip(self, stanza), fields(id = ?stanza.attr("id")))]
    pub async fn network_timeout(&self, stanza: &Element) -> Result<bool, C2sError> {
        let stanza = reset_namespace(stanza, ns::COMPONENT_ACCEPT);
        let original = child_named(&stanza, "original")
            .and_then(|o| o.children().next())
            .cloned()
            .ok_or_else(|| C2sError::malformed("network timeout without original message"))?;

        info!(
            original = %self.ctx.describe(&original),
            "Federation peer timed out, message undeliverable"
        );

        let chat = original.attr("type") == Some("chat");
        let receipt = if chat { sent_receipt(&original) } else { None };
        self.ctx.pipeline.handle_undeliverable(original).await;

        match receipt {
            Some(receipt) => {
                self.ctx.emit(receipt).await?;
                Ok(true)
            }
            None => {
                if chat {
                    debug!("Chat message without addressing, no receipt sent");
                }
                Ok(false)
            }
        }
    }

    /// Hand an ordinary message to the pipeline.
    #[instrument(skip(self, stanza), fields(id = ?stanza.attr("id"), to = ?stanza.attr("to")))]
    pub async fn dispatch(&self, stanza: &Element) {
        if self.ctx.config.log_traffic {
            debug!(stanza = %String::from(stanza), "Incoming message");
        }
        let stanza = reset_namespace(stanza, ns::COMPONENT_ACCEPT);
        self.ctx.pipeline.process(stanza).await;
    }
}

/// Build a `sent` server receipt from the recipient back to the sender.
///
/// The receipt id echoes the request id, or the message id when the message
/// carried no request.
fn sent_receipt(original: &Element) -> Option<Element> {
    let sender = original.attr("from")?;
    let recipient = original.attr("to")?;
    let receipt_id = extract_receipt(original, "request")
        .and_then(|r| r.attr("id"))
        .or_else(|| original.attr("id"))?;

    Some(
        Element::builder("message", ns::COMPONENT_ACCEPT)
            .attr("type", "chat")
            .attr("id", random_id(RESPONSE_ID_LENGTH))
            .attr("from", recipient)
            .attr("to", sender)
            .append(
                Element::builder("sent", ns::SERVER_RECEIPTS)
                    .attr("id", receipt_id)
                    .build(),
            )
            .build(),
    )
}
