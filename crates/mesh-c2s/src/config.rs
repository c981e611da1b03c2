//! Node configuration.
//!
//! # Environment Variables
//!
//! - `MESH_SERVERNAME`: hostname of this federation node. Default: `localhost`
//! - `MESH_C2S_JID`: address of the c2s component. Default: `c2s.<servername>`
//! - `MESH_LOG_TRAFFIC`: log full stanza XML (`1`/`true`). Default: off
//!
//! # Examples
//!
//! ```bash
//! MESH_SERVERNAME=prime.example.net MESH_LOG_TRAFFIC=1 mesh-c2s-replay
//! ```

use jid::Jid;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::addressing::COMPONENT_C2S;
use crate::C2sError;

/// Configuration of the c2s component of one federation node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct C2sConfig {
    /// Hostname of this node within the federation
    pub servername: String,
    /// Address the c2s component is bound to on the router
    pub component_jid: String,
    /// Log whole stanzas instead of their addressing only
    pub log_traffic: bool,
}

impl Default for C2sConfig {
    fn default() -> Self {
        Self::new("localhost")
    }
}

impl C2sConfig {
    /// Configuration for a node, with the component at `c2s.<servername>`.
    pub fn new(servername: impl Into<String>) -> Self {
        let servername = servername.into();
        Self {
            component_jid: format!("{}.{}", COMPONENT_C2S, servername),
            servername,
            log_traffic: false,
        }
    }

    /// Move the node to another hostname.
    ///
    /// A derived component address follows the new hostname; an explicitly
    /// configured one is kept.
    pub fn with_servername(mut self, servername: impl Into<String>) -> Self {
        let servername = servername.into();
        if self.component_jid == format!("{}.{}", COMPONENT_C2S, self.servername) {
            self.component_jid = format!("{}.{}", COMPONENT_C2S, servername);
        }
        self.servername = servername;
        self
    }

    /// Enable or disable traffic logging.
    pub fn with_log_traffic(mut self, enabled: bool) -> Self {
        self.log_traffic = enabled;
        self
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let servername =
            std::env::var("MESH_SERVERNAME").unwrap_or_else(|_| "localhost".to_string());
        let mut config = Self::new(servername);

        if let Ok(component_jid) = std::env::var("MESH_C2S_JID") {
            config.component_jid = component_jid;
        }

        config.log_traffic = std::env::var("MESH_LOG_TRAFFIC")
            .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
            .unwrap_or(false);

        config
    }

    /// Check that the configured addresses are usable.
    pub fn validate(&self) -> Result<(), C2sError> {
        if self.servername.is_empty() {
            return Err(C2sError::config("servername must not be empty"));
        }
        let component = self.component_entity()?;
        if component.node().is_some() {
            return Err(C2sError::config(format!(
                "component address {} must not have a user part",
                self.component_jid
            )));
        }
        Ok(())
    }

    /// The component's own address (`thisEntity` on the router).
    pub fn component_entity(&self) -> Result<Jid, C2sError> {
        self.component_jid
            .parse::<Jid>()
            .map_err(|e| C2sError::config(format!("invalid component address: {}", e)))
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        info!(
            servername = %self.servername,
            component = %self.component_jid,
            log_traffic = self.log_traffic,
            "c2s configuration loaded"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_derives_component() {
        let config = C2sConfig::new("prime.example.net");
        assert_eq!(config.component_jid, "c2s.prime.example.net");
        assert!(!config.log_traffic);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_servername_override_keeps_explicit_component() {
        let config = C2sConfig::new("prime.example.net").with_servername("beta.example.net");
        assert_eq!(config.servername, "beta.example.net");
        assert_eq!(config.component_jid, "c2s.beta.example.net");

        let mut config = C2sConfig::new("prime.example.net").with_log_traffic(true);
        config.component_jid = "router.prime.example.net".to_string();
        let config = config.with_servername("beta.example.net");
        assert_eq!(config.component_jid, "router.prime.example.net");
        assert!(config.log_traffic);
    }

    #[test]
    fn test_validate_rejects_user_component() {
        let mut config = C2sConfig::new("prime.example.net");
        config.component_jid = "someone@prime.example.net".to_string();
        assert!(matches!(config.validate(), Err(C2sError::Config(_))));

        let empty = C2sConfig::new("");
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: C2sConfig =
            serde_json::from_str(r#"{"servername":"beta.example.net","component_jid":"c2s.beta.example.net"}"#)
                .unwrap();
        assert_eq!(config.servername, "beta.example.net");
        assert!(!config.log_traffic);
    }
}
