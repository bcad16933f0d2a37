//! Network map: the well-known parties a node knows about.
//!
//! Serves two roles: identity resolution (public key ↔ well-known name)
//! during reconciliation, and the "known parties" query the disseminator
//! uses to find observers.

use std::collections::BTreeMap;

use paperbid_types::{Party, PartyId};

/// Registry of well-known parties, keyed by public key.
#[derive(Debug, Clone, Default)]
pub struct NetworkMap {
    parties: BTreeMap<PartyId, Party>,
}

impl NetworkMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a map from a list of parties.
    pub fn with_parties(parties: impl IntoIterator<Item = Party>) -> Self {
        let mut map = Self::new();
        for party in parties {
            map.register(party);
        }
        map
    }

    /// Add or replace a party.
    pub fn register(&mut self, party: Party) {
        self.parties.insert(party.id, party);
    }

    /// Well-known identity behind a key.
    #[must_use]
    pub fn resolve(&self, id: &PartyId) -> Option<&Party> {
        self.parties.get(id)
    }

    /// Every party on the network, infrastructure included.
    #[must_use]
    pub fn list_known_parties(&self) -> Vec<Party> {
        self.parties.values().cloned().collect()
    }
}
