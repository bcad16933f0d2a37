//! Error types for the Paperbid auction ledger.
//!
//! All errors use the `PB_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Validation errors (detected locally, never sent over the wire)
//! - 2xx: Record lookup errors
//! - 3xx: Settlement protocol errors
//! - 4xx: Transport errors
//! - 9xx: General / internal errors

use thiserror::Error;

use crate::{LinearId, PartyId, StateRef, UpdateId};

/// Central error enum for all Paperbid operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaperbidError {
    // =================================================================
    // Validation Errors (1xx)
    // =================================================================
    /// Wrong number or kind of consumed / produced records, or a malformed
    /// command bundle.
    #[error("PB_ERR_100: Structural violation: {reason}")]
    StructuralViolation { reason: String },

    /// A business predicate over amounts, prices or references failed.
    #[error("PB_ERR_101: Invariant violation: {predicate}")]
    InvariantViolation { predicate: String },

    /// A required identity is absent from the declared signer set.
    #[error("PB_ERR_102: Signer violation: {reason}")]
    SignerViolation { reason: String },

    /// An intent tag that maps to no known update kind.
    #[error("PB_ERR_103: Unrecognized intent: {0}")]
    UnrecognizedIntent(String),

    // =================================================================
    // Record Lookup Errors (2xx)
    // =================================================================
    /// No unconsumed version of the record exists.
    #[error("PB_ERR_200: Record not found: {0}")]
    RecordNotFound(LinearId),

    /// More than one unconsumed version claims to be current.
    #[error("PB_ERR_201: Ambiguous record {id}: {count} unconsumed versions")]
    AmbiguousRecord { id: LinearId, count: usize },

    /// A consumed input is not the version recorded at its `StateRef`.
    #[error("PB_ERR_202: Input {state_ref} does not match the ledger: {reason}")]
    InputMismatch { state_ref: StateRef, reason: String },

    // =================================================================
    // Settlement Protocol Errors (3xx)
    // =================================================================
    /// Both sides resolve a referenced identity differently.
    #[error("PB_ERR_300: Identity mismatch for {party}: {reason}")]
    IdentityMismatch { party: PartyId, reason: String },

    /// A network exchange or the commit window ran out.
    #[error("PB_ERR_301: Timeout during {stage}")]
    Timeout { stage: String },

    /// The consumed record version was already consumed by another update.
    #[error("PB_ERR_302: Double spend of {state_ref}: already consumed by {consumed_by}")]
    DoubleSpend {
        state_ref: StateRef,
        consumed_by: UpdateId,
    },

    /// The counterparty re-validated the update and refused to sign.
    #[error("PB_ERR_303: Counterparty {party} refused to sign: {reason}")]
    CounterpartyRefused { party: PartyId, reason: String },

    /// A signature did not verify against the signer's key.
    #[error("PB_ERR_304: Invalid signature from {party}")]
    SignatureInvalid { party: PartyId },

    /// A required signer has not signed.
    #[error("PB_ERR_305: Missing signature from {party}")]
    MissingSignature { party: PartyId },

    /// The update was submitted before its time window opened.
    #[error("PB_ERR_306: Time window not yet open")]
    WindowNotOpen,

    /// The settlement state machine was driven out of order.
    #[error("PB_ERR_307: Invalid settlement transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    // =================================================================
    // Transport Errors (4xx)
    // =================================================================
    /// No route to the party.
    #[error("PB_ERR_400: Peer unreachable: {0}")]
    PeerUnreachable(PartyId),

    /// A reply channel was dropped before answering.
    #[error("PB_ERR_401: Channel closed during {stage}")]
    ChannelClosed { stage: String },

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("PB_ERR_900: Internal error: {0}")]
    Internal(String),

    /// Serialization / deserialization error.
    #[error("PB_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (invalid config file, missing fields, etc.).
    #[error("PB_ERR_902: Configuration error: {0}")]
    Configuration(String),

    /// I/O error (disk, network).
    #[error("PB_ERR_903: I/O error: {0}")]
    Io(String),
}

impl PaperbidError {
    /// Shorthand for [`PaperbidError::StructuralViolation`].
    pub fn structural(reason: impl Into<String>) -> Self {
        Self::StructuralViolation {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`PaperbidError::InvariantViolation`].
    pub fn invariant(predicate: impl Into<String>) -> Self {
        Self::InvariantViolation {
            predicate: predicate.into(),
        }
    }

    /// Shorthand for [`PaperbidError::SignerViolation`].
    pub fn signer(reason: impl Into<String>) -> Self {
        Self::SignerViolation {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`PaperbidError::Timeout`].
    pub fn timeout(stage: impl Into<String>) -> Self {
        Self::Timeout {
            stage: stage.into(),
        }
    }

    /// Whether the caller may succeed by re-proposing against fresh state.
    ///
    /// Only a lost race (`DoubleSpend`) or an expired window / exchange
    /// (`Timeout`) qualify; everything else is a logic or configuration error.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::DoubleSpend { .. })
    }

    /// Whether this is a rejection the transition validator produces.
    ///
    /// These abort an attempt before any message leaves the node.
    #[must_use]
    pub fn is_local_rejection(&self) -> bool {
        matches!(
            self,
            Self::StructuralViolation { .. }
                | Self::InvariantViolation { .. }
                | Self::SignerViolation { .. }
                | Self::UnrecognizedIntent(_)
        )
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, PaperbidError>;

impl From<std::io::Error> for PaperbidError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for PaperbidError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
