//! Public-key and federation peer lookup.

use std::collections::{HashMap, HashSet};

use base64::prelude::*;

/// Resolves user public keys and knows the federation peers.
pub trait Keyring: Send + Sync {
    /// Public key blob for a userid and key fingerprint.
    fn resolve_key(&self, userid: &str, fingerprint: &str) -> Option<Vec<u8>>;

    /// Hostnames of every registered federation node, this one included.
    fn peer_hostnames(&self) -> HashSet<String>;
}

/// Fixed keyring, populated once at startup.
#[derive(Debug, Clone, Default)]
pub struct StaticKeyring {
    keys: HashMap<(String, String), Vec<u8>>,
    hosts: HashSet<String>,
}

impl StaticKeyring {
    /// Create an empty keyring.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a federation host.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.hosts.insert(host.into());
        self
    }

    /// Register a public key.
    pub fn with_key(
        mut self,
        userid: impl Into<String>,
        fingerprint: impl Into<String>,
        key: Vec<u8>,
    ) -> Self {
        self.keys.insert((userid.into(), fingerprint.into()), key);
        self
    }
}

impl Keyring for StaticKeyring {
    fn resolve_key(&self, userid: &str, fingerprint: &str) -> Option<Vec<u8>> {
        self.keys
            .get(&(userid.to_string(), fingerprint.to_string()))
            .cloned()
    }

    fn peer_hostnames(&self) -> HashSet<String> {
        self.hosts.clone()
    }
}

/// Encode a key blob as the vCard data URI.
pub fn key_data_uri(key: &[u8]) -> String {
    format!("data:application/pgp-keys;base64,{}", BASE64_STANDARD.encode(key))
}
