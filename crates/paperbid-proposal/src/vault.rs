//! Versioned record vault — the node's local view of the ledger.
//!
//! Every record version ever recorded stays in the arena, addressed by its
//! [`StateRef`]. Versions are never mutated; recording a committed update
//! marks its inputs consumed and adds its outputs. The "current" version of
//! a linear record is its single unconsumed version.
//!
//! Like the ordering service's consumed-set, recording is idempotent: the
//! same update recorded twice changes nothing the second time.

use std::collections::{HashMap, HashSet};

use paperbid_types::{
    AuctionRecord, LedgerRecord, LinearId, PaperbidError, ProposedUpdate, PurchaseRecord,
    Result, StateAndRef, StateRef, UpdateId,
};

/// Read-only query contract the proposal builder depends on.
pub trait RecordQuery {
    /// The single latest unconsumed version of a linear record.
    ///
    /// # Errors
    /// - `RecordNotFound` if no unconsumed version exists
    /// - `AmbiguousRecord` if more than one does
    fn find_current_version(&self, id: LinearId) -> Result<StateAndRef>;
}

#[derive(Debug, Clone)]
struct StoredVersion {
    record: LedgerRecord,
    consumed_by: Option<UpdateId>,
}

/// In-memory arena of record versions.
#[derive(Debug, Default)]
pub struct Vault {
    /// All versions ever recorded.
    versions: HashMap<StateRef, StoredVersion>,
    /// Versions per linear id, in the order they were recorded.
    lineage: HashMap<LinearId, Vec<StateRef>>,
    /// Updates already recorded.
    recorded: HashSet<UpdateId>,
}

impl Vault {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a committed update. Returns `false` if it was already recorded.
    ///
    /// Inputs this vault has never seen are ignored: a node only holds the
    /// versions it was a party to or was told about.
    pub fn record(&mut self, update: &ProposedUpdate) -> bool {
        let id = update.id();
        if !self.recorded.insert(id) {
            return false;
        }

        for input in &update.inputs {
            if let Some(stored) = self.versions.get_mut(&input.state_ref) {
                stored.consumed_by = Some(id);
            }
        }

        for state in update.output_states() {
            self.lineage
                .entry(state.record.linear_id())
                .or_default()
                .push(state.state_ref);
            self.versions.insert(
                state.state_ref,
                StoredVersion {
                    record: state.record,
                    consumed_by: None,
                },
            );
        }

        tracing::debug!(
            update = %id,
            inputs = update.inputs.len(),
            outputs = update.outputs.len(),
            "Update recorded in vault"
        );
        true
    }

    /// Current version of an auction.
    ///
    /// # Errors
    /// As [`RecordQuery::find_current_version`]; also `RecordNotFound` if
    /// the id names a purchase record.
    pub fn find_current_auction(&self, id: LinearId) -> Result<(StateRef, AuctionRecord)> {
        let current = self.find_current_version(id)?;
        match current.record {
            LedgerRecord::Auction(a) => Ok((current.state_ref, a)),
            LedgerRecord::Purchase(_) => Err(PaperbidError::RecordNotFound(id)),
        }
    }

    /// Every recorded version of an auction, oldest first.
    #[must_use]
    pub fn history(&self, id: LinearId) -> Vec<AuctionRecord> {
        self.lineage
            .get(&id)
            .into_iter()
            .flatten()
            .filter_map(|r| self.versions.get(r))
            .filter_map(|v| v.record.as_auction().cloned())
            .collect()
    }

    /// Every purchase recorded against an auction.
    #[must_use]
    pub fn purchases_for(&self, auction: LinearId) -> Vec<PurchaseRecord> {
        let mut purchases: Vec<PurchaseRecord> = self
            .versions
            .values()
            .filter_map(|v| v.record.as_purchase())
            .filter(|p| p.paper_reference == auction)
            .cloned()
            .collect();
        purchases.sort_by_key(|p| p.id);
        purchases
    }

    /// Check that every input of `update` is a version this vault holds,
    /// with exactly the content recorded at its `StateRef`.
    ///
    /// # Errors
    /// `InputMismatch` for the first input that is unknown or differs.
    pub fn verify_inputs(&self, update: &ProposedUpdate) -> Result<()> {
        for input in &update.inputs {
            let reason = match self.versions.get(&input.state_ref) {
                None => "unknown version",
                Some(stored) if stored.record != input.record => {
                    "record differs from the recorded version"
                }
                Some(_) => continue,
            };
            tracing::debug!(state_ref = %input.state_ref, reason, "Input rejected");
            return Err(PaperbidError::InputMismatch {
                state_ref: input.state_ref,
                reason: reason.into(),
            });
        }
        Ok(())
    }

    /// `Some(true)` if consumed, `Some(false)` if current, `None` if unknown.
    #[must_use]
    pub fn is_consumed(&self, state_ref: &StateRef) -> Option<bool> {
        self.versions
            .get(state_ref)
            .map(|v| v.consumed_by.is_some())
    }

    #[must_use]
    pub fn contains_update(&self, id: &UpdateId) -> bool {
        self.recorded.contains(id)
    }
}

impl RecordQuery for Vault {
    fn find_current_version(&self, id: LinearId) -> Result<StateAndRef> {
        let mut current = self
            .lineage
            .get(&id)
            .into_iter()
            .flatten()
            .filter_map(|r| self.versions.get(r).map(|v| (r, v)))
            .filter(|(_, v)| v.consumed_by.is_none());

        match (current.next(), current.next()) {
            (None, _) => Err(PaperbidError::RecordNotFound(id)),
            (Some((state_ref, v)), None) => Ok(StateAndRef {
                state_ref: *state_ref,
                record: v.record.clone(),
            }),
            (Some(_), Some(_)) => Err(PaperbidError::AmbiguousRecord {
                id,
                count: 2 + current.count(),
            }),
        }
    }
}
