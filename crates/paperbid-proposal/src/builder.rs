//! Proposal builder.
//!
//! Assembles a [`ProposedUpdate`] from caller intent and the current version
//! of the target record. The builder never validates; it builds what the
//! caller asked for and declares the signers each intent's rule requires.
//! A proposal that the validator would reject (an offer below the highest
//! bid, an end by a non-owner) is still built, so the coordinator can
//! reject it locally with the precise reason.
//!
//! The current version must be re-read right before every build: no lock
//! is held on it, and a stale input simply loses at the ordering service.

use chrono::{DateTime, Duration, Utc};
use paperbid_types::{
    AuctionRecord, Command, Intent, LinearId, PaperbidError, PartyId, ProposedUpdate,
    PurchaseRecord, Result, StateAndRef, TimeWindow, constants,
};

use crate::vault::RecordQuery;

/// A built update plus the instant after which it can no longer commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    pub update: ProposedUpdate,
    pub deadline: DateTime<Utc>,
}

impl Proposal {
    fn new(update: ProposedUpdate) -> Self {
        let deadline = update.time_window.until;
        Self { update, deadline }
    }

    /// Linear id of the auction this proposal acts on.
    #[must_use]
    pub fn target(&self) -> Option<LinearId> {
        self.update
            .inputs
            .iter()
            .map(|i| &i.record)
            .chain(self.update.outputs.iter())
            .find_map(|r| r.as_auction().map(|a| a.id))
    }
}

/// Builds proposals bound to one ordering service.
#[derive(Debug, Clone)]
pub struct ProposalBuilder {
    notary: PartyId,
    commit_window: Duration,
}

impl ProposalBuilder {
    #[must_use]
    pub fn new(notary: PartyId, commit_window: Duration) -> Self {
        Self {
            notary,
            commit_window,
        }
    }

    #[must_use]
    pub fn notary(&self) -> PartyId {
        self.notary
    }

    fn window(&self, now: DateTime<Utc>) -> TimeWindow {
        TimeWindow::starting(now, self.commit_window)
    }

    /// List a new item owned by `owner`.
    #[must_use]
    pub fn start(
        &self,
        owner: PartyId,
        item_name: &str,
        start_price: u64,
        observers: Vec<PartyId>,
        now: DateTime<Utc>,
    ) -> Proposal {
        let auction = AuctionRecord {
            observers,
            ..AuctionRecord::listed(item_name, start_price, owner)
        };
        Proposal::new(ProposedUpdate {
            inputs: vec![],
            outputs: vec![auction.into()],
            commands: vec![Command::new(Intent::Start, [owner])],
            notary: self.notary,
            time_window: self.window(now),
        })
    }

    /// Offer `amount` for `target` on behalf of `caller`.
    ///
    /// Produces the auction's next version (`highest_bid = amount`,
    /// `auction_winner = caller`) and a purchase record referencing it.
    /// Declares `AcceptBid` signed by the owner and `Create` signed by owner
    /// and buyer.
    ///
    /// # Errors
    /// - `RecordNotFound` / `AmbiguousRecord` from the lookup
    /// - `RecordNotFound` if `target` names a purchase record
    pub fn purchase(
        &self,
        query: &impl RecordQuery,
        target: LinearId,
        amount: u64,
        caller: PartyId,
        now: DateTime<Utc>,
    ) -> Result<Proposal> {
        let (input, auction) = current_auction(query, target)?;
        let owner = auction.item_owner;

        let next = auction.with_bid(amount, caller);
        let purchase = PurchaseRecord::new(amount, caller, owner, auction.id);

        tracing::debug!(
            auction = %target,
            amount,
            buyer = %caller,
            owner = %owner,
            "Purchase proposal built"
        );

        Ok(Proposal::new(ProposedUpdate {
            inputs: vec![input],
            outputs: vec![next.into(), purchase.into()],
            commands: vec![
                Command::new(Intent::AcceptBid, [owner]),
                Command::new(Intent::Create, [owner, caller]),
            ],
            notary: self.notary,
            time_window: self.window(now),
        }))
    }

    /// Close `target`. The caller is declared as the signer; the validator
    /// rejects the proposal unless the caller owns the auction.
    ///
    /// # Errors
    /// As [`ProposalBuilder::purchase`].
    pub fn end(
        &self,
        query: &impl RecordQuery,
        target: LinearId,
        caller: PartyId,
        now: DateTime<Utc>,
    ) -> Result<Proposal> {
        let (input, _) = current_auction(query, target)?;
        Ok(Proposal::new(ProposedUpdate {
            inputs: vec![input],
            outputs: vec![],
            commands: vec![Command::new(Intent::End, [caller])],
            notary: self.notary,
            time_window: self.window(now),
        }))
    }
}

impl Default for ProposalBuilder {
    fn default() -> Self {
        Self::new(
            PartyId([0; 32]),
            Duration::seconds(constants::DEFAULT_COMMIT_WINDOW_SECS),
        )
    }
}

fn current_auction(
    query: &impl RecordQuery,
    target: LinearId,
) -> Result<(StateAndRef, AuctionRecord)> {
    let current = query.find_current_version(target)?;
    let auction = current
        .record
        .as_auction()
        .cloned()
        .ok_or(PaperbidError::RecordNotFound(target))?;
    Ok((current, auction))
}
