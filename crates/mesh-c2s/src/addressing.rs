//! Mapping between stored userids, JIDs and federation hosts.
//!
//! Userids are the node part of a JID, optionally followed by a resource
//! suffix: anything past [`USERID_LENGTH`] characters is the resource. A
//! presence lookup by a bare userid therefore covers every resource record of
//! that user.
//!
//! Federation peers announce themselves from component addresses of the form
//! `c2s.<host>`; [`resolve_component_host`] strips the component prefix and
//! classifies the remaining host against the keyring's peer list.

use std::collections::HashSet;

use jid::Jid;

use crate::C2sError;

/// Length of the node part of a userid.
pub const USERID_LENGTH: usize = 40;

/// Component name that c2s nodes announce themselves under.
pub const COMPONENT_C2S: &str = "c2s";

/// Split a stored userid into its node and optional resource.
pub fn split_userid(userid: &str) -> (&str, Option<&str>) {
    match userid.char_indices().nth(USERID_LENGTH) {
        Some((idx, _)) => (&userid[..idx], Some(&userid[idx..])),
        None => (userid, None),
    }
}

/// Bare userid of a stored userid (the resource suffix stripped).
pub fn bare_userid(userid: &str) -> &str {
    split_userid(userid).0
}

/// Build the JID for a stored userid on `host`.
pub fn userid_to_jid(userid: &str, host: &str) -> Result<Jid, C2sError> {
    let jid = match split_userid(userid) {
        (node, Some(resource)) => format!("{}@{}/{}", node, host, resource),
        (node, None) => format!("{}@{}", node, host),
    };
    Ok(jid.parse::<Jid>()?)
}

/// The userid (node part) addressed by a JID string.
pub fn jid_user(address: &str) -> Result<String, C2sError> {
    let jid: Jid = address.parse()?;
    jid.node()
        .map(|n| n.to_string())
        .ok_or_else(|| C2sError::malformed(format!("no user part in {}", address)))
}

/// Where an announcing domain lives relative to this node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostResolution {
    /// The domain is this node's own component
    Local,
    /// The domain is the component of a registered federation peer
    Peer(String),
    /// A component domain whose host is not a registered peer
    Foreign(String),
    /// Not a c2s component domain at all
    Malformed,
}

impl HostResolution {
    /// Whether this resolves to a registered peer other than this node.
    pub fn is_remote_peer(&self) -> bool {
        matches!(self, HostResolution::Peer(_))
    }
}

/// Split a `component.host` domain into its component and host parts.
pub fn jid_component(domain: &str, component: &str) -> Option<String> {
    let (prefix, host) = domain.split_once('.')?;
    if prefix == component && !host.is_empty() {
        Some(host.to_string())
    } else {
        None
    }
}

/// Classify a c2s component domain against this node and its peers.
pub fn resolve_component_host(
    domain: &str,
    servername: &str,
    peers: &HashSet<String>,
) -> HostResolution {
    match jid_component(domain, COMPONENT_C2S) {
        None => HostResolution::Malformed,
        Some(host) if host == servername => HostResolution::Local,
        Some(host) if peers.contains(&host) => HostResolution::Peer(host),
        Some(host) => HostResolution::Foreign(host),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: &str = "a94a8fe5ccb19ba61c4c0873d391e987982fbbd3";

    fn peers() -> HashSet<String> {
        ["prime.example.net", "beta.example.net"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_split_userid() {
        assert_eq!(split_userid("alice"), ("alice", None));
        assert_eq!(split_userid(ALICE), (ALICE, None));

        let with_resource = format!("{}PHONE001", ALICE);
        assert_eq!(split_userid(&with_resource), (ALICE, Some("PHONE001")));
        assert_eq!(bare_userid(&with_resource), ALICE);
    }

    #[test]
    fn test_userid_to_jid() {
        let bare = userid_to_jid("alice", "prime.example.net").unwrap();
        assert_eq!(bare.to_string(), "alice@prime.example.net");

        let full = userid_to_jid(&format!("{}PHONE001", ALICE), "prime.example.net").unwrap();
        assert_eq!(
            full.to_string(),
            format!("{}@prime.example.net/PHONE001", ALICE)
        );
    }

    #[test]
    fn test_jid_user() {
        assert_eq!(jid_user("alice@prime.example.net/res").unwrap(), "alice");
        assert!(jid_user("prime.example.net").is_err());
    }

    #[test]
    fn test_resolve_component_host() {
        let peers = peers();
        let servername = "prime.example.net";

        assert_eq!(
            resolve_component_host("c2s.prime.example.net", servername, &peers),
            HostResolution::Local
        );
        assert_eq!(
            resolve_component_host("c2s.beta.example.net", servername, &peers),
            HostResolution::Peer("beta.example.net".to_string())
        );
        assert_eq!(
            resolve_component_host("c2s.rogue.example.org", servername, &peers),
            HostResolution::Foreign("rogue.example.org".to_string())
        );
        assert_eq!(
            resolve_component_host("beta.example.net", servername, &peers),
            HostResolution::Malformed
        );
        assert!(resolve_component_host("c2s.beta.example.net", servername, &peers).is_remote_peer());
    }
}
