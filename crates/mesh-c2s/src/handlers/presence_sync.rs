//! Presence synchronization across the federation.
//!
//! Handles the type-less presence the router sends to this component when
//! an entity appears. A peer node coming online receives this node's presence
//! snapshot; a user appearing anywhere gets its offline queue flushed.

use jid::Jid;
use minidom::Element;
use tracing::{debug, info, instrument, warn};

use super::{append_status, mark_unavailable, Claim, HandlerContext};
use crate::addressing::{resolve_component_host, userid_to_jid, HostResolution};
use crate::error::C2sError;
use crate::keyring::key_data_uri;
use crate::metrics;
use crate::stanza::{build_delay, extract_receipt, extract_receipt_mut, ns, reset_namespace};
use crate::types::{OfflineMessage, PresenceRecord};

/// What `send_presence` emitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendPresenceReport {
    /// Presence stanzas copied from live available sessions
    pub available: usize,
    /// Synthesized unavailable presence stanzas
    pub unavailable: usize,
    /// vCard identity stanzas
    pub vcards: usize,
    /// Stored records whose userid does not form an address
    pub skipped: usize,
}

/// Outcome of an offline queue flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Messages handed to the router
    pub delivered: usize,
    /// Messages removed from storage right after delivery
    pub deleted: usize,
    /// Messages kept in storage until a receipt ack arrives
    pub deferred: usize,
    /// Messages that could not be sent or retracted
    pub failed: usize,
}

/// Keeps presence consistent across nodes and flushes offline messages.
#[derive(Clone)]
pub struct PresenceSyncHandler {
    ctx: HandlerContext,
}

impl PresenceSyncHandler {
    /// Create a new handler.
    pub fn new(ctx: HandlerContext) -> Self {
        Self { ctx }
    }

    /// Entry point for the dispatcher.
    pub async fn handle(&self, stanza: &Element) -> Claim {
        match self.presence(stanza).await {
            Ok(report) => debug!(?report, "Initial presence handled"),
            Err(e) => warn!(error = %e, "Initial presence not handled"),
        }
        Claim::Claimed
    }

    /// Push the complete local presence and identity snapshot to `target`.
    ///
    /// For every stored record, either one presence per live available
    /// session or one synthesized unavailable presence, then a vCard.
    #[instrument(skip(self))]
    pub async fn send_presence(&self, target: &str) -> Result<SendPresenceReport, C2sError> {
        let records = self.ctx.presence.get_all().await?;
        let mut report = SendPresenceReport::default();

        for record in &records {
            let response_from = match userid_to_jid(&record.userid, &self.ctx.config.servername) {
                Ok(jid) => jid,
                Err(e) => {
                    warn!(userid = %record.userid, error = %e, "Skipping unaddressable presence record");
                    report.skipped += 1;
                    continue;
                }
            };

            let mut available = 0;
            for session in self.ctx.sessions.sessions(&record.userid) {
                let Some(presence) = session.available_presence() else {
                    continue;
                };
                let from = presence
                    .attr("from")
                    .map(str::to_string)
                    .unwrap_or_else(|| session.jid.to_string());

                let mut response = Element::builder("presence", ns::COMPONENT_ACCEPT)
                    .attr("to", target)
                    .attr("from", from)
                    .build();
                for child in presence
                    .children()
                    .filter(|c| matches!(c.name(), "status" | "show" | "priority"))
                {
                    response.append_child(reset_namespace(child, ns::COMPONENT_ACCEPT));
                }

                available += 1;
                if self.ctx.emit(response).await.is_ok() {
                    report.available += 1;
                }
            }

            if available == 0 {
                let mut response = Element::builder("presence", ns::COMPONENT_ACCEPT)
                    .attr("to", target)
                    .attr("from", response_from.to_string())
                    .build();
                append_status(&mut response, record);
                mark_unavailable(&mut response, record);

                if self.ctx.emit(response).await.is_ok() {
                    report.unavailable += 1;
                }
            }

            let vcard = self.build_vcard(record, &response_from, target);
            if self.ctx.emit(vcard).await.is_ok() {
                report.vcards += 1;
            }
        }

        info!(
            users = records.len(),
            available = report.available,
            unavailable = report.unavailable,
            skipped = report.skipped,
            "Presence snapshot sent"
        );
        Ok(report)
    }

    fn build_vcard(&self, record: &PresenceRecord, from: &Jid, target: &str) -> Element {
        let mut vcard = Element::builder("vcard", ns::VCARD4).build();

        let key = record
            .fingerprint
            .as_deref()
            .and_then(|fpr| self.ctx.keyring.resolve_key(&record.userid, fpr));
        if let Some(key) = key {
            let uri = Element::builder("uri", ns::VCARD4)
                .append(minidom::Node::Text(key_data_uri(&key)))
                .build();
            vcard.append_child(Element::builder("key", ns::VCARD4).append(uri).build());
        }

        Element::builder("iq", ns::COMPONENT_ACCEPT)
            .attr("type", "set")
            .attr("from", from.to_string())
            .attr("to", target)
            .append(vcard)
            .build()
    }

    /// Handle a self-addressed initial presence.
    ///
    /// Federation sync is best-effort; the offline flush always runs.
    #[instrument(skip(self, stanza), fields(from = ?stanza.attr("from")))]
    pub async fn presence(&self, stanza: &Element) -> Result<FlushReport, C2sError> {
        let from = stanza
            .attr("from")
            .ok_or_else(|| C2sError::malformed("initial presence without 'from'"))?;
        let sender: Jid = from.parse()?;
        debug!(stanza = %self.ctx.describe(stanza), "Initial presence from router");

        let peers = self.ctx.keyring.peer_hostnames();
        let resolution =
            resolve_component_host(sender.domain().as_str(), &self.ctx.config.servername, &peers);

        if resolution.is_remote_peer() {
            info!(peer = %from, "Remote c2s appeared, sending local presence");
            if let Err(e) = self.send_presence(from).await {
                warn!(peer = %from, error = %e, "Failed to send presence snapshot");
            }
        } else if let HostResolution::Foreign(host) = &resolution {
            debug!(host = %host, "Announcer host is not a federation peer");
        }

        self.ctx.sessions.check_conflict(&sender);

        let Some(userid) = sender.node().map(|n| n.to_string()) else {
            return Ok(FlushReport::default());
        };

        if resolution.is_remote_peer() {
            debug!(userid = %userid, "User connected elsewhere, deleting local presence");
            if let Err(e) = self.ctx.presence.delete(&userid).await {
                warn!(userid = %userid, error = %e, "Failed to delete presence record");
            }
        }

        self.flush_offline(&userid, &sender, stanza).await
    }

    /// Deliver the offline queue of `userid` to `recipient`.
    async fn flush_offline(
        &self,
        userid: &str,
        recipient: &Jid,
        trigger: &Element,
    ) -> Result<FlushReport, C2sError> {
        let messages = self.ctx.offline.get_by_recipient(userid).await?;
        let mut report = FlushReport::default();
        let trigger_received = extract_receipt(trigger, "received").is_some();

        for message in messages {
            let deferred = trigger_received || extract_receipt(&message.stanza, "request").is_some();
            let stanza = self.prepare_offline(&message, recipient);

            if self.ctx.emit(stanza).await.is_err() {
                debug!(id = %message.id, "Offline message delivery failed");
                report.failed += 1;
                continue;
            }
            report.delivered += 1;
            metrics::record_offline_flush(deferred);

            if deferred {
                debug!(id = %message.id, "Receipt requested, keeping message in storage");
                report.deferred += 1;
                continue;
            }

            match self.ctx.offline.delete(&message.id, &message.kind()).await {
                Ok(true) => {
                    metrics::record_offline_retraction("delivered");
                    report.deleted += 1;
                }
                Ok(false) => debug!(id = %message.id, "Offline message already gone"),
                Err(e) => {
                    warn!(id = %message.id, error = %e, "Failed to delete offline message");
                    report.failed += 1;
                }
            }
        }

        if report.delivered > 0 || report.failed > 0 {
            info!(
                recipient = %recipient,
                delivered = report.delivered,
                deleted = report.deleted,
                deferred = report.deferred,
                failed = report.failed,
                "Offline messages flushed"
            );
        }
        Ok(report)
    }

    /// Rewrite a stored stanza for redelivery.
    fn prepare_offline(&self, message: &OfflineMessage, recipient: &Jid) -> Element {
        let mut stanza = message.stanza.clone();
        let this_entity = self.ctx.component.to_string();

        // Receipts for this message must come back through this node.
        if let Some(request) = extract_receipt_mut(&mut stanza, "request") {
            request.set_attr("from", this_entity);
        } else if let Some(received) = extract_receipt_mut(&mut stanza, "received") {
            received.set_attr("from", this_entity);
        }

        if let Some(timestamp) = &message.timestamp {
            stanza.append_child(build_delay(timestamp));
        }

        stanza.set_attr("to", recipient.to_string());
        stanza
    }
}
