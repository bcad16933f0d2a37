//! # paperbid-types
//!
//! Shared types, errors, and configuration for the **Paperbid** auction ledger.
//!
//! This crate is the leaf dependency of the workspace — every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`LinearId`], [`PartyId`], [`UpdateId`], [`StateRef`], [`CommitSeq`]
//! - **Parties**: [`Party`], [`PartyRole`], [`PartyKeys`], [`PartySignature`]
//! - **Record model**: [`AuctionRecord`], [`PurchaseRecord`], [`LedgerRecord`], [`StateAndRef`]
//! - **Update model**: [`Intent`], [`Command`], [`TimeWindow`], [`ProposedUpdate`],
//!   [`SignedUpdate`], [`CommitReceipt`], [`FinalizedUpdate`]
//! - **Configuration**: [`NodeConfig`], [`SettlementConfig`]
//! - **Errors**: [`PaperbidError`] with `PB_ERR_` prefix codes
//! - **Constants**: system-wide limits and defaults

pub mod config;
pub mod constants;
pub mod error;
pub mod ids;
pub mod party;
pub mod record;
pub mod update;

// Re-export all primary types at crate root for ergonomic imports:
//   use paperbid_types::{AuctionRecord, ProposedUpdate, Intent, ...};

pub use config::*;
pub use error::*;
pub use ids::*;
pub use party::*;
pub use record::*;
pub use update::*;

// Constants are accessed via `paperbid_types::constants::FOO`
// (not re-exported to avoid name collisions).
