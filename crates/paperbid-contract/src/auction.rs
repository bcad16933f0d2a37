//! Rules for the auction record's own lifecycle: Start, End, AcceptBid.

use std::collections::BTreeSet;

use paperbid_types::{AuctionRecord, PaperbidError, PartyId, ProposedUpdate, Result};

use crate::purchase::check_purchase_shape;

/// Listing a new item.
///
/// Requires zero inputs and exactly one auction output with a positive
/// start price and a non-empty item name, signed by its owner.
pub fn verify_start(update: &ProposedUpdate, signers: &BTreeSet<PartyId>) -> Result<()> {
    if !update.inputs.is_empty() {
        return Err(PaperbidError::structural(
            "start must not consume any records",
        ));
    }
    if update.outputs.len() != 1 {
        return Err(PaperbidError::structural(
            "start must produce exactly one record",
        ));
    }
    let auction = update.outputs[0]
        .as_auction()
        .ok_or_else(|| PaperbidError::structural("start must produce an auction record"))?;

    if auction.start_price == 0 {
        return Err(PaperbidError::invariant("start price must be positive"));
    }
    if auction.item_name.is_empty() {
        return Err(PaperbidError::invariant("item name must not be empty"));
    }

    require_owner(auction, signers)
}

/// Closing an auction.
///
/// Requires exactly one auction input and no outputs at all: the record's
/// lineage ends here, so neither a purchase nor a further auction version
/// may be produced. Signed by the input's owner.
pub fn verify_end(update: &ProposedUpdate, signers: &BTreeSet<PartyId>) -> Result<()> {
    let auction = match update.inputs.as_slice() {
        [only] => only.record.as_auction(),
        _ => None,
    }
    .ok_or_else(|| PaperbidError::structural("end must consume exactly one auction record"))?;

    if update.outputs.iter().any(|o| o.as_purchase().is_some()) {
        return Err(PaperbidError::structural(
            "end must not produce purchase records",
        ));
    }
    if !update.outputs.is_empty() {
        return Err(PaperbidError::structural(
            "end must not produce auction records",
        ));
    }

    require_owner(auction, signers)
}

/// Owner accepting an offer.
///
/// Shape and numeric checks are shared with `Create`; this rule only
/// requires the owner of the consumed version to sign.
pub fn verify_accept_bid(update: &ProposedUpdate, signers: &BTreeSet<PartyId>) -> Result<()> {
    let shape = check_purchase_shape(update)?;
    require_owner(shape.input, signers)
}

pub(crate) fn require_owner(auction: &AuctionRecord, signers: &BTreeSet<PartyId>) -> Result<()> {
    if signers.contains(&auction.item_owner) {
        Ok(())
    } else {
        Err(PaperbidError::signer("auction owner must sign"))
    }
}
