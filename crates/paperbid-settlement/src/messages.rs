//! Messages exchanged between nodes during settlement.
//!
//! Every request carries a one-shot reply channel; the requester suspends
//! on it until the peer answers or the exchange times out.

use paperbid_types::{FinalizedUpdate, Party, PartyId, PartySignature, Result, SignedUpdate};
use tokio::sync::oneshot;

/// Reply channel for a request expecting `T`.
pub type Reply<T> = oneshot::Sender<Result<T>>;

/// A request sent to a node's inbox.
#[derive(Debug)]
pub enum FlowMessage {
    /// The identities a proposal references, as the initiator resolved them.
    /// The peer answers `IdentityMismatch` if it resolves any differently.
    Reconcile {
        identities: Vec<Party>,
        reply: Reply<()>,
    },
    /// Ask the peer to counter-sign an update after re-validating it.
    SignRequest {
        signed: SignedUpdate,
        reply: Reply<PartySignature>,
    },
    /// A committed update the peer signed for.
    Finalized {
        finalized: FinalizedUpdate,
        reply: Reply<()>,
    },
    /// A committed update forwarded to an observer.
    Broadcast {
        finalized: FinalizedUpdate,
        reply: Reply<()>,
    },
}

impl FlowMessage {
    /// Short label for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Reconcile { .. } => "reconcile",
            Self::SignRequest { .. } => "sign_request",
            Self::Finalized { .. } => "finalized",
            Self::Broadcast { .. } => "broadcast",
        }
    }
}

/// A message plus its sender.
#[derive(Debug)]
pub struct Envelope {
    pub from: PartyId,
    pub message: FlowMessage,
}
