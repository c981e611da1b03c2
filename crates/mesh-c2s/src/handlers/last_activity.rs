//! XEP-0012: Last Activity.

use chrono::Utc;
use jid::Jid;
use minidom::Element;
use tracing::{debug, instrument};

use super::{Claim, HandlerContext};
use crate::addressing::{jid_user, userid_to_jid};
use crate::error::C2sError;
use crate::stanza::{ns, to_response};

/// Answers `jabber:iq:last` queries from stored presence timestamps.
#[derive(Clone)]
pub struct LastActivityHandler {
    ctx: HandlerContext,
}

impl LastActivityHandler {
    /// Create a new handler.
    pub fn new(ctx: HandlerContext) -> Self {
        Self { ctx }
    }

    /// Entry point for the dispatcher. Queries are always claimed.
    pub async fn handle(&self, stanza: &Element) -> Claim {
        if let Err(e) = self.last_activity(stanza).await {
            debug!(error = %e, "Last activity query not answered");
        }
        Claim::Claimed
    }

    /// Answer a last activity query.
    ///
    /// Returns the idle seconds sent, or `None` when the user is unknown and
    /// no response was sent. The reference timestamp among several records is
    /// the most recent one.
    #[instrument(skip(self, stanza), fields(to = ?stanza.attr("to")))]
    pub async fn last_activity(&self, stanza: &Element) -> Result<Option<i64>, C2sError> {
        let to = stanza
            .attr("to")
            .ok_or_else(|| C2sError::malformed("last activity query without 'to'"))?;
        let userid = jid_user(to)?;
        let records = self.ctx.presence.get(&userid).await?;

        let Some(first) = records.first() else {
            debug!(userid = %userid, "iq/last: user not found");
            return Ok(None);
        };

        let response_from = userid_to_jid(&first.userid, &self.ctx.config.servername)?.to_bare();
        let seconds = if self.ctx.sessions.is_live(&Jid::from(response_from.clone())) {
            0
        } else {
            records
                .iter()
                .map(|r| r.timestamp)
                .max()
                .map(|latest| (Utc::now() - latest).num_seconds().max(0))
                .unwrap_or(0)
        };

        let mut response = to_response(stanza, Some("result"));
        response.set_attr("from", response_from.to_string());
        response.append_child(
            Element::builder("query", ns::IQ_LAST)
                .attr("seconds", seconds.to_string())
                .build(),
        );

        self.ctx.emit(response).await?;
        debug!(seconds, "iq/last result sent");
        Ok(Some(seconds))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use chrono::Duration;

    use crate::types::PresenceRecord;

    fn query(to: &str) -> Element {
        parse(&format!(
            "<iq xmlns='jabber:component:accept' type='get' id='last1' from='{}@{}/phone' to='{}'>\
             <query xmlns='jabber:iq:last'/></iq>",
            BOB, SERVER, to
        ))
    }

    #[tokio::test]
    async fn test_live_user_is_never_idle() {
        let h = harness();
        h.presence
            .upsert(PresenceRecord::new(ALICE, Utc::now() - Duration::hours(3)))
            .unwrap();
        h.sessions
            .register(format!("{}@{}/phone", ALICE, SERVER).parse().unwrap(), None);

        let handler = LastActivityHandler::new(h.ctx.clone());
        let seconds = handler
            .last_activity(&query(&format!("{}@{}", ALICE, SERVER)))
            .await
            .unwrap();
        assert_eq!(seconds, Some(0));

        let sent = h.sink.take();
        assert_eq!(sent[0].attr("type"), Some("result"));
        assert_eq!(sent[0].attr("id"), Some("last1"));
        assert_eq!(
            sent[0].get_child("query", ns::IQ_LAST).and_then(|q| q.attr("seconds")),
            Some("0")
        );
    }

    #[tokio::test]
    async fn test_offline_user_uses_most_recent_record() {
        let h = harness();
        let now = Utc::now();
        h.presence
            .upsert(PresenceRecord::new(
                format!("{}PHONE001", ALICE),
                now - Duration::hours(5),
            ))
            .unwrap();
        h.presence
            .upsert(PresenceRecord::new(
                format!("{}TABLET02", ALICE),
                now - Duration::minutes(10),
            ))
            .unwrap();

        let handler = LastActivityHandler::new(h.ctx.clone());
        let seconds = handler
            .last_activity(&query(&format!("{}@{}", ALICE, SERVER)))
            .await
            .unwrap()
            .unwrap();
        assert!((600..=605).contains(&seconds));

        let sent = h.sink.take();
        assert_eq!(
            sent[0].attr("from"),
            Some(format!("{}@{}", ALICE, SERVER).as_str())
        );
    }

    #[tokio::test]
    async fn test_unknown_user_gets_no_response() {
        let h = harness();
        let handler = LastActivityHandler::new(h.ctx.clone());
        let stanza = query(&format!("nobody@{}", SERVER));

        assert_eq!(handler.last_activity(&stanza).await.unwrap(), None);
        assert_eq!(handler.handle(&stanza).await, Claim::Claimed);
        assert!(h.sink.take().is_empty());
    }
}
