//! Presence probe responses.

use minidom::Element;
use tracing::{debug, instrument, warn};

use super::{append_status, mark_unavailable, Claim, HandlerContext};
use crate::addressing::{jid_user, userid_to_jid};
use crate::error::C2sError;
use crate::metrics;
use crate::stanza::{random_id, to_response, RESPONSE_ID_LENGTH};
use crate::types::{CorrelationGroup, PresenceRecord};

/// Answers `<presence type='probe'/>` from stored presence.
///
/// A probe may resolve to several records (one per resource). Every response
/// carries a `<group/>` telling the requester how many responses to expect.
#[derive(Clone)]
pub struct PresenceProbeHandler {
    ctx: HandlerContext,
}

impl PresenceProbeHandler {
    /// Create a new handler.
    pub fn new(ctx: HandlerContext) -> Self {
        Self { ctx }
    }

    /// Entry point for the dispatcher. Probes are always claimed.
    pub async fn handle(&self, stanza: &Element) -> Claim {
        if let Err(e) = self.probe(stanza).await {
            debug!(error = %e, "Presence probe not answered");
        }
        Claim::Claimed
    }

    /// Answer a probe. Returns the number of responses sent.
    #[instrument(skip(self, stanza), fields(to = ?stanza.attr("to"), id = ?stanza.attr("id")))]
    pub async fn probe(&self, stanza: &Element) -> Result<usize, C2sError> {
        let to = stanza
            .attr("to")
            .ok_or_else(|| C2sError::malformed("probe without 'to'"))?;
        let userid = jid_user(to)?;
        let records = self.ctx.presence.get(&userid).await?;

        let group_id = stanza
            .attr("id")
            .map(str::to_string)
            .unwrap_or_else(|| random_id(RESPONSE_ID_LENGTH));

        let responses = match records.as_slice() {
            [] => {
                debug!(userid = %userid, "Probe: user not found");
                let mut response = to_response(stanza, Some("error"));
                if let Some(error) = C2sError::item_not_found(None).to_error_element() {
                    response.append_child(error);
                }
                response.append_child(CorrelationGroup::new(group_id, 1).to_element());
                vec![response]
            }
            [record] => {
                let mut response = to_response(stanza, None);
                self.fill_response(&mut response, record)?;
                response.append_child(CorrelationGroup::new(group_id, 1).to_element());
                vec![response]
            }
            _ => {
                let mut responses = Vec::with_capacity(records.len());
                for record in &records {
                    let from = match userid_to_jid(&record.userid, &self.ctx.config.servername) {
                        Ok(from) => from,
                        Err(e) => {
                            warn!(userid = %record.userid, error = %e, "Skipping unaddressable presence record");
                            continue;
                        }
                    };
                    let mut response = to_response(stanza, None);
                    response.set_attr("id", random_id(RESPONSE_ID_LENGTH));
                    response.set_attr("from", from.to_string());
                    self.fill_response(&mut response, record)?;
                    responses.push(response);
                }

                // The group announces only the responses actually built.
                let group = CorrelationGroup::new(group_id, responses.len());
                for response in &mut responses {
                    response.append_child(group.to_element());
                }
                responses
            }
        };

        let mut sent = 0;
        for response in responses {
            if self.ctx.emit(response).await.is_ok() {
                sent += 1;
            }
        }

        metrics::record_probe_responses(sent, !records.is_empty());
        debug!(records = records.len(), sent, "Probe answered");
        Ok(sent)
    }

    /// Status, show and liveness of one record.
    fn fill_response(&self, response: &mut Element, record: &PresenceRecord) -> Result<(), C2sError> {
        let address = userid_to_jid(&record.userid, &self.ctx.config.servername)?;
        append_status(response, record);

        if !self.ctx.sessions.is_live(&address) {
            mark_unavailable(response, record);
        }
        Ok(())
    }
}
