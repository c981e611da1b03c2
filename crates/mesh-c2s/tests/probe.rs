//! Presence probes through the dispatcher.

mod common;

use std::collections::HashSet;

use chrono::{TimeZone, Utc};
use common::*;
use mesh_c2s::{ns, CorrelationGroup, PresenceRecord, Route, Show};

fn probe(id: &str, to: &str) -> minidom::Element {
    parse(&format!(
        "<presence xmlns='jabber:component:accept' type='probe' id='{}' from='{}' to='{}'/>",
        id,
        local(CAROL),
        to
    ))
}

#[tokio::test]
async fn away_user_probe_is_unavailable_with_stamp() {
    let node = TestNode::new();
    let stamp = Utc.with_ymd_and_hms(2014, 3, 7, 9, 5, 2).unwrap();
    node.presence
        .upsert(PresenceRecord::new(ALICE, stamp).with_show(Show::Away))
        .unwrap();

    let route = node.dispatcher.dispatch(probe("q1", &local(ALICE))).await;
    assert_eq!(route, Some(Route::PresenceProbe));

    let sent = node.sink.take();
    assert_eq!(sent.len(), 1);
    let response = &sent[0];
    assert_eq!(response.attr("type"), Some("unavailable"));
    assert_eq!(response.attr("to"), Some(local(CAROL).as_str()));
    assert_eq!(
        response
            .get_child("show", ns::COMPONENT_ACCEPT)
            .map(|s| s.text()),
        Some("away".to_string())
    );
    assert_eq!(
        response
            .get_child("delay", ns::DELAY)
            .and_then(|d| d.attr("stamp")),
        Some("2014-03-07T09:05:02Z")
    );
    assert_eq!(
        CorrelationGroup::from_stanza(response),
        Some(CorrelationGroup::new("q1", 1))
    );
}

#[tokio::test]
async fn multi_resource_probe_fans_out() {
    let node = TestNode::new();
    let now = Utc::now();
    for resource in ["AAAA0001", "BBBB0002", "CCCC0003", "DDDD0004"] {
        node.presence
            .upsert(PresenceRecord::new(format!("{}{}", ALICE, resource), now))
            .unwrap();
    }
    node.connect(&local_full(ALICE, "BBBB0002"), None);

    node.dispatcher.dispatch(probe("q2", &local(ALICE))).await;

    let sent = node.sink.take();
    assert_eq!(sent.len(), 4);

    let ids: HashSet<_> = sent.iter().filter_map(|s| s.attr("id")).collect();
    assert_eq!(ids.len(), 4);
    assert!(ids.iter().all(|id| id.len() == 8));

    let groups: HashSet<_> = sent
        .iter()
        .filter_map(CorrelationGroup::from_stanza)
        .map(|g| (g.id, g.count))
        .collect();
    assert_eq!(groups, HashSet::from([("q2".to_string(), 4)]));

    let froms: HashSet<_> = sent.iter().filter_map(|s| s.attr("from")).collect();
    assert!(froms.contains(local_full(ALICE, "CCCC0003").as_str()));

    let available: Vec<_> = sent.iter().filter(|s| s.attr("type").is_none()).collect();
    assert_eq!(available.len(), 1);
    assert_eq!(
        available[0].attr("from"),
        Some(local_full(ALICE, "BBBB0002").as_str())
    );
}

#[tokio::test]
async fn unknown_user_probe_returns_single_error() {
    let node = TestNode::new();

    node.dispatcher.dispatch(probe("q3", &local(BOB))).await;

    let sent = node.sink.take();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].attr("type"), Some("error"));
    assert_eq!(sent[0].attr("id"), Some("q3"));
    assert_eq!(
        CorrelationGroup::from_stanza(&sent[0]),
        Some(CorrelationGroup::new("q3", 1))
    );
}

#[tokio::test]
async fn probes_do_not_reach_the_pipeline() {
    let node = TestNode::new();
    node.dispatcher.dispatch(probe("q4", &local(BOB))).await;
    assert!(node.pipeline.processed.lock().unwrap().is_empty());
    assert!(node.offline.is_empty());
}

#[tokio::test]
async fn fan_out_group_counts_only_addressable_records() {
    let node = TestNode::new();
    let now = Utc::now();
    for resource in ["AAAA0001".to_string(), "x".repeat(1100), "CCCC0003".to_string()] {
        node.presence
            .upsert(PresenceRecord::new(format!("{}{}", ALICE, resource), now))
            .unwrap();
    }

    node.dispatcher.dispatch(probe("q9", &local(ALICE))).await;

    let sent = node.sink.take();
    assert_eq!(sent.len(), 2);
    assert!(sent
        .iter()
        .all(|s| CorrelationGroup::from_stanza(s) == Some(CorrelationGroup::new("q9", 2))));
}
