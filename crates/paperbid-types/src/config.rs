//! Configuration types for Paperbid nodes.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{PaperbidError, PartyRole, Result, constants};

/// Configuration for a single Paperbid node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Well-known name of this node's party.
    pub name: String,
    /// What this node does on the network.
    #[serde(default = "default_role")]
    pub role: PartyRole,
    /// Settlement timing.
    #[serde(default)]
    pub settlement: SettlementConfig,
    /// Capacity of the inbound message queue.
    #[serde(default = "default_inbox_capacity")]
    pub inbox_capacity: usize,
}

fn default_role() -> PartyRole {
    PartyRole::Participant
}

fn default_inbox_capacity() -> usize {
    constants::DEFAULT_INBOX_CAPACITY
}

impl NodeConfig {
    /// A participant node with default settlement timing.
    #[must_use]
    pub fn participant(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: PartyRole::Participant,
            settlement: SettlementConfig::default(),
            inbox_capacity: constants::DEFAULT_INBOX_CAPACITY,
        }
    }

    /// Parse a JSON document.
    ///
    /// # Errors
    /// Returns [`PaperbidError::Configuration`] on malformed JSON or
    /// invalid values.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| PaperbidError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON config file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Reject values that would make settlement impossible.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(PaperbidError::Configuration(
                "node name must not be empty".into(),
            ));
        }
        if self.inbox_capacity == 0 {
            return Err(PaperbidError::Configuration(
                "inbox_capacity must be > 0".into(),
            ));
        }
        self.settlement.validate()
    }
}

/// Settlement timing configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettlementConfig {
    /// Length of the commit window opened when an update is built.
    pub commit_window_secs: i64,
    /// Timeout for one counterparty round-trip.
    pub exchange_timeout_ms: u64,
    /// Timeout for one observer to acknowledge a disseminated update.
    pub delivery_timeout_ms: u64,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            commit_window_secs: constants::DEFAULT_COMMIT_WINDOW_SECS,
            exchange_timeout_ms: constants::DEFAULT_EXCHANGE_TIMEOUT_MS,
            delivery_timeout_ms: constants::DEFAULT_DELIVERY_TIMEOUT_MS,
        }
    }
}

impl SettlementConfig {
    pub fn validate(&self) -> Result<()> {
        if self.commit_window_secs <= 0 {
            return Err(PaperbidError::Configuration(
                "commit_window_secs must be > 0".into(),
            ));
        }
        if self.exchange_timeout_ms == 0 || self.delivery_timeout_ms == 0 {
            return Err(PaperbidError::Configuration(
                "timeouts must be > 0".into(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn commit_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.commit_window_secs)
    }

    #[must_use]
    pub fn exchange_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.exchange_timeout_ms)
    }

    #[must_use]
    pub fn delivery_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.delivery_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settlement_defaults() {
        let cfg = SettlementConfig::default();
        assert_eq!(cfg.commit_window_secs, 30);
        assert_eq!(cfg.commit_window(), chrono::Duration::seconds(30));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn minimal_json_fills_defaults() {
        let cfg = NodeConfig::from_json_str(r#"{ "name": "Seller" }"#).unwrap();
        assert_eq!(cfg, NodeConfig::participant("Seller"));
    }

    #[test]
    fn partial_settlement_section() {
        let cfg = NodeConfig::from_json_str(
            r#"{ "name": "Notary", "role": "Ordering", "settlement": { "commit_window_secs": 5 } }"#,
        )
        .unwrap();
        assert_eq!(cfg.role, PartyRole::Ordering);
        assert_eq!(cfg.settlement.commit_window_secs, 5);
        assert_eq!(
            cfg.settlement.exchange_timeout_ms,
            constants::DEFAULT_EXCHANGE_TIMEOUT_MS
        );
    }

    #[test]
    fn invalid_values_rejected() {
        let err = NodeConfig::from_json_str(r#"{ "name": "" }"#).unwrap_err();
        assert!(matches!(err, PaperbidError::Configuration(_)));

        let err = NodeConfig::from_json_str(
            r#"{ "name": "A", "settlement": { "commit_window_secs": 0 } }"#,
        )
        .unwrap_err();
        assert!(matches!(err, PaperbidError::Configuration(_)));

        let err = NodeConfig::from_json_str("not json").unwrap_err();
        assert!(matches!(err, PaperbidError::Configuration(_)));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = NodeConfig::load("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, PaperbidError::Io(_)));
    }

    #[test]
    fn serde_roundtrip() {
        let cfg = NodeConfig::participant("Buyer");
        let json = serde_json::to_string(&cfg).unwrap();
        assert_eq!(NodeConfig::from_json_str(&json).unwrap(), cfg);
    }
}
