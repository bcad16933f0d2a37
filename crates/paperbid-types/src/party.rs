//! Ledger parties, their roles, and ed25519 signing.
//!
//! A [`Party`] is the well-known identity of a node: a human-readable name
//! bound to a public key. The key pair itself lives in [`PartyKeys`] and
//! never leaves the node that owns it.

use std::fmt;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::{PaperbidError, PartyId, Result};

/// What a party does on the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PartyRole {
    /// Sells items, buys items, observes auctions.
    Participant,
    /// Operates the ordering/commit service (notary).
    Ordering,
    /// Operates the network map. Holds no ledger records.
    NetworkMap,
}

impl PartyRole {
    /// Infrastructure roles never receive disseminated updates.
    #[must_use]
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, Self::Ordering | Self::NetworkMap)
    }
}

impl fmt::Display for PartyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Participant => write!(f, "PARTICIPANT"),
            Self::Ordering => write!(f, "ORDERING"),
            Self::NetworkMap => write!(f, "NETWORK_MAP"),
        }
    }
}

/// Well-known identity of a party.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Party {
    pub name: String,
    pub id: PartyId,
    pub role: PartyRole,
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

/// An ed25519 signature by one party over an update or receipt digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartySignature {
    pub by: PartyId,
    pub bytes: Vec<u8>,
}

impl PartySignature {
    /// Verify this signature over `message` against the signer's key.
    ///
    /// # Errors
    /// Returns [`PaperbidError::SignatureInvalid`] if the key is malformed,
    /// the signature has the wrong length, or verification fails.
    pub fn verify(&self, message: &[u8]) -> Result<()> {
        let invalid = || PaperbidError::SignatureInvalid { party: self.by };
        let key = VerifyingKey::from_bytes(self.by.as_bytes()).map_err(|_| invalid())?;
        let raw: [u8; 64] = self.bytes.as_slice().try_into().map_err(|_| invalid())?;
        key.verify(message, &Signature::from_bytes(&raw))
            .map_err(|_| invalid())
    }
}

/// A party's identity together with its signing key.
pub struct PartyKeys {
    party: Party,
    signing: SigningKey,
}

impl PartyKeys {
    /// Generate a fresh key pair for a named party.
    #[must_use]
    pub fn generate(name: impl Into<String>, role: PartyRole) -> Self {
        let signing = SigningKey::generate(&mut rand::rngs::OsRng);
        Self::from_signing_key(name, role, signing)
    }

    /// Derive a key pair from a fixed 32-byte seed.
    #[must_use]
    pub fn from_seed(name: impl Into<String>, role: PartyRole, seed: [u8; 32]) -> Self {
        Self::from_signing_key(name, role, SigningKey::from_bytes(&seed))
    }

    fn from_signing_key(name: impl Into<String>, role: PartyRole, signing: SigningKey) -> Self {
        let party = Party {
            name: name.into(),
            id: PartyId::from_pubkey(signing.verifying_key().to_bytes()),
            role,
        };
        Self { party, signing }
    }

    #[must_use]
    pub fn party(&self) -> &Party {
        &self.party
    }

    #[must_use]
    pub fn id(&self) -> PartyId {
        self.party.id
    }

    /// Sign an arbitrary message.
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> PartySignature {
        PartySignature {
            by: self.party.id,
            bytes: self.signing.sign(message).to_bytes().to_vec(),
        }
    }
}

impl fmt::Debug for PartyKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartyKeys")
            .field("party", &self.party)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify() {
        let keys = PartyKeys::generate("Seller", PartyRole::Participant);
        let sig = keys.sign(b"hello");
        assert_eq!(sig.by, keys.id());
        assert!(sig.verify(b"hello").is_ok());
    }

    #[test]
    fn tampered_message_fails() {
        let keys = PartyKeys::generate("Seller", PartyRole::Participant);
        let sig = keys.sign(b"hello");
        let err = sig.verify(b"hellp").unwrap_err();
        assert_eq!(err, PaperbidError::SignatureInvalid { party: keys.id() });
    }

    #[test]
    fn wrong_signer_fails() {
        let a = PartyKeys::generate("A", PartyRole::Participant);
        let b = PartyKeys::generate("B", PartyRole::Participant);
        let mut sig = a.sign(b"msg");
        sig.by = b.id();
        assert!(sig.verify(b"msg").is_err());
    }

    #[test]
    fn truncated_signature_fails() {
        let keys = PartyKeys::generate("A", PartyRole::Participant);
        let mut sig = keys.sign(b"msg");
        sig.bytes.truncate(10);
        assert!(sig.verify(b"msg").is_err());
    }

    #[test]
    fn seeded_keys_are_deterministic() {
        let a = PartyKeys::from_seed("A", PartyRole::Participant, [9; 32]);
        let b = PartyKeys::from_seed("A", PartyRole::Participant, [9; 32]);
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn infrastructure_roles() {
        assert!(PartyRole::Ordering.is_infrastructure());
        assert!(PartyRole::NetworkMap.is_infrastructure());
        assert!(!PartyRole::Participant.is_infrastructure());
    }
}
