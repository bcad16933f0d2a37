//! # paperbid-contract
//!
//! **Pure transition validator for the Paperbid ledger.**
//!
//! Every party runs the same rules independently before it signs, and
//! again when it receives a committed update. The validator has:
//!
//! - **Zero side effects**: no storage, no clock, no network
//! - **Deterministic verdicts**: same update -> same verdict on every node
//! - **Exhaustive dispatch**: one rule per [`Intent`](paperbid_types::Intent)
//! - **Named rejections**: every failure names the violated condition

pub mod auction;
pub mod purchase;
pub mod validator;

pub use validator::{validate, validate_command};
