//! # paperbid-proposal
//!
//! **Local ledger view and proposal assembly.**
//!
//! Everything a node needs before it talks to anyone:
//! 1. **Vault**: arena of immutable record versions keyed by [`StateRef`],
//!    with the latest unconsumed version per linear id
//! 2. **NetworkMap**: well-known parties and their roles
//! 3. **ProposalBuilder**: turns caller intent plus the current version into
//!    a [`ProposedUpdate`] with its required signers and commit deadline
//!
//! ## Flow
//!
//! ```text
//! caller intent → Vault.find_current_version() → ProposalBuilder → Proposal
//!     → (validator self-check, settlement)
//! ```
//!
//! [`StateRef`]: paperbid_types::StateRef
//! [`ProposedUpdate`]: paperbid_types::ProposedUpdate

pub mod builder;
pub mod directory;
pub mod vault;

pub use builder::{Proposal, ProposalBuilder};
pub use directory::NetworkMap;
pub use vault::{RecordQuery, Vault};
