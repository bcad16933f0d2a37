//! # paperbid-settlement
//!
//! **Agreement plane**: turns a locally built proposal into a committed,
//! disseminated ledger update.
//!
//! ## Architecture
//!
//! ```text
//!  caller ──▶ AuctionNode ──▶ ProposalBuilder ──▶ Coordinator
//!                                                   │ 1. validate locally
//!                                                   │ 2. reconcile identities ─▶ counterparty Responder
//!                                                   │ 3. collect signatures  ─▶ counterparty Responder
//!                                                   │ 4. submit ─────────────▶ OrderingService
//!                                                   │ 5. deliver + disseminate ─▶ observers
//!                                                   ▼
//!                                               Settlement
//! ```
//!
//! Every node runs a [`Responder`] task on its inbox; nodes reach each
//! other through a [`Network`] of bounded message channels. The
//! [`OrderingService`] runs as its own task and is the sole arbiter of
//! which update consumes a record version.

pub mod broadcast;
pub mod coordinator;
pub mod messages;
pub mod network;
pub mod node;
pub mod notary;
pub mod phase;
pub mod responder;

pub use broadcast::{DeliveryReport, Disseminator};
pub use coordinator::{Coordinator, Settlement};
pub use messages::{Envelope, FlowMessage};
pub use network::Network;
pub use node::AuctionNode;
pub use notary::{NotaryHandle, OrderingService};
pub use phase::{PhaseTrail, SettlementPhase};
pub use responder::Responder;
