//! Rules for accepted offers: the shared purchase shape, and the two-party
//! `Create` rule.
//!
//! A purchase consumes the auction's current version and produces exactly
//! two records: the auction's next version and a new purchase record.
//!
//! ```text
//!   inputs:  [ auction vN ]
//!   outputs: [ auction vN+1 (same id, name, owner, start price and
//!              observers; highest_bid = amount, winner = buyer),
//!              purchase (paper_reference = id, seller = owner, amount) ]
//! ```

use std::collections::BTreeSet;

use paperbid_types::{
    AuctionRecord, PaperbidError, PartyId, ProposedUpdate, PurchaseRecord, Result,
};

use crate::auction::require_owner;

/// The three records a well-formed purchase update touches.
#[derive(Debug, Clone, Copy)]
pub struct PurchaseShape<'a> {
    pub input: &'a AuctionRecord,
    pub output: &'a AuctionRecord,
    pub purchase: &'a PurchaseRecord,
}

/// Structural and numeric checks shared by `AcceptBid` and `Create`.
///
/// Predicates are checked in a fixed order so the same bad update always
/// reports the same violation.
pub fn check_purchase_shape(update: &ProposedUpdate) -> Result<PurchaseShape<'_>> {
    if update.inputs.len() != 1 {
        return Err(PaperbidError::structural(
            "purchase must consume exactly one record",
        ));
    }
    if update.outputs.len() != 2 {
        return Err(PaperbidError::structural(
            "purchase must produce exactly two records",
        ));
    }

    let input = update.inputs[0]
        .record
        .as_auction()
        .ok_or_else(|| PaperbidError::structural("purchase must consume an auction record"))?;

    let mut auctions = update.outputs.iter().filter_map(|o| o.as_auction());
    let mut purchases = update.outputs.iter().filter_map(|o| o.as_purchase());
    let (Some(output), None, Some(purchase), None) = (
        auctions.next(),
        auctions.next(),
        purchases.next(),
        purchases.next(),
    ) else {
        return Err(PaperbidError::structural(
            "purchase must produce one auction record and one purchase record",
        ));
    };

    if output.id != input.id {
        return Err(PaperbidError::invariant("auction id changed"));
    }
    if output.start_price != input.start_price {
        return Err(PaperbidError::invariant("start price changed"));
    }
    if output.item_owner != input.item_owner {
        return Err(PaperbidError::invariant("item owner changed"));
    }
    if output.item_name != input.item_name {
        return Err(PaperbidError::invariant("item name changed"));
    }
    if output.observers != input.observers {
        return Err(PaperbidError::invariant("observers changed"));
    }
    if purchase.paper_owner != input.item_owner {
        return Err(PaperbidError::invariant(
            "purchase names a different seller",
        ));
    }
    if output.auction_winner != Some(purchase.buyer) {
        return Err(PaperbidError::invariant("winner is not the buyer"));
    }
    if purchase.paper_reference != output.id {
        return Err(PaperbidError::invariant(
            "purchase does not reference this auction",
        ));
    }
    if purchase.amount != output.highest_bid {
        return Err(PaperbidError::invariant(
            "purchase amount does not match highest bid",
        ));
    }
    if purchase.amount < input.highest_bid {
        return Err(PaperbidError::invariant("amount below highest bid"));
    }
    if purchase.amount < output.start_price {
        return Err(PaperbidError::invariant("amount below start price"));
    }

    Ok(PurchaseShape {
        input,
        output,
        purchase,
    })
}

/// Two-party purchase: same checks as `AcceptBid`, and both the owner of
/// the consumed version and the buyer must sign.
pub fn verify_create(update: &ProposedUpdate, signers: &BTreeSet<PartyId>) -> Result<()> {
    let shape = check_purchase_shape(update)?;
    require_owner(shape.input, signers)?;
    if !signers.contains(&shape.purchase.buyer) {
        return Err(PaperbidError::signer("buyer must sign"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use paperbid_types::*;

    use super::*;
    use crate::auction::verify_accept_bid;

    const OWNER: PartyId = PartyId([1; 32]);
    const BUYER: PartyId = PartyId([2; 32]);

    /// A valid purchase of `amount` against an auction at (start, highest).
    fn purchase(start: u64, highest: u64, amount: u64) -> ProposedUpdate {
        let input = AuctionRecord::dummy(OWNER, start, highest);
        let output = input.with_bid(amount, BUYER);
        let bid = PurchaseRecord::new(amount, BUYER, OWNER, input.id);
        ProposedUpdate {
            inputs: vec![StateAndRef {
                state_ref: StateRef::new(UpdateId([7; 32]), 0),
                record: input.into(),
            }],
            outputs: vec![output.into(), bid.into()],
            commands: vec![],
            notary: PartyId([9; 32]),
            time_window: TimeWindow::starting(Utc::now(), Duration::seconds(30)),
        }
    }

    fn both() -> BTreeSet<PartyId> {
        [OWNER, BUYER].into_iter().collect()
    }

    fn auction_out(u: &mut ProposedUpdate) -> &mut AuctionRecord {
        match &mut u.outputs[0] {
            LedgerRecord::Auction(a) => a,
            LedgerRecord::Purchase(_) => unreachable!(),
        }
    }

    fn purchase_out(u: &mut ProposedUpdate) -> &mut PurchaseRecord {
        match &mut u.outputs[1] {
            LedgerRecord::Purchase(p) => p,
            LedgerRecord::Auction(_) => unreachable!(),
        }
    }

    #[test]
    fn valid_purchase_passes_both_rules() {
        let u = purchase(50, 0, 50);
        assert!(verify_create(&u, &both()).is_ok());
        assert!(verify_accept_bid(&u, &both()).is_ok());
    }

    #[test]
    fn equal_to_highest_bid_is_accepted() {
        let u = purchase(50, 80, 80);
        assert!(verify_create(&u, &both()).is_ok());
    }

    #[test]
    fn wrong_input_count_rejected() {
        let mut u = purchase(50, 0, 60);
        u.inputs.push(u.inputs[0].clone());
        assert_eq!(
            check_purchase_shape(&u).unwrap_err(),
            PaperbidError::structural("purchase must consume exactly one record")
        );
    }

    #[test]
    fn wrong_output_count_rejected() {
        let mut u = purchase(50, 0, 60);
        u.outputs.pop();
        assert_eq!(
            check_purchase_shape(&u).unwrap_err(),
            PaperbidError::structural("purchase must produce exactly two records")
        );
    }

    #[test]
    fn consuming_purchase_rejected() {
        let mut u = purchase(50, 0, 60);
        u.inputs[0].record = PurchaseRecord::new(60, BUYER, OWNER, LinearId::new()).into();
        assert_eq!(
            check_purchase_shape(&u).unwrap_err(),
            PaperbidError::structural("purchase must consume an auction record")
        );
    }

    #[test]
    fn two_purchase_outputs_rejected() {
        let mut u = purchase(50, 0, 60);
        let extra = u.outputs[1].clone();
        u.outputs[0] = extra;
        assert!(matches!(
            check_purchase_shape(&u),
            Err(PaperbidError::StructuralViolation { .. })
        ));
    }

    #[test]
    fn reference_mismatch_rejected() {
        let mut u = purchase(50, 0, 60);
        purchase_out(&mut u).paper_reference = LinearId::new();
        assert_eq!(
            check_purchase_shape(&u).unwrap_err(),
            PaperbidError::invariant("purchase does not reference this auction")
        );
    }

    #[test]
    fn amount_not_matching_highest_bid_rejected() {
        let mut u = purchase(50, 0, 60);
        auction_out(&mut u).highest_bid = 61;
        assert_eq!(
            check_purchase_shape(&u).unwrap_err(),
            PaperbidError::invariant("purchase amount does not match highest bid")
        );
    }

    #[test]
    fn amount_below_start_price_rejected() {
        let u = purchase(50, 0, 49);
        assert_eq!(
            check_purchase_shape(&u).unwrap_err(),
            PaperbidError::invariant("amount below start price")
        );
    }

    #[test]
    fn amount_below_highest_bid_rejected() {
        let u = purchase(50, 100, 90);
        assert_eq!(
            check_purchase_shape(&u).unwrap_err(),
            PaperbidError::invariant("amount below highest bid")
        );
    }

    #[test]
    fn highest_bid_checked_before_start_price() {
        // Violates both floors; the highest-bid predicate is reported.
        let u = purchase(50, 50, 40);
        assert_eq!(
            check_purchase_shape(&u).unwrap_err(),
            PaperbidError::invariant("amount below highest bid")
        );
    }

    #[test]
    fn changed_auction_id_rejected() {
        let mut u = purchase(50, 0, 60);
        let fresh = LinearId::new();
        auction_out(&mut u).id = fresh;
        purchase_out(&mut u).paper_reference = fresh;
        assert_eq!(
            check_purchase_shape(&u).unwrap_err(),
            PaperbidError::invariant("auction id changed")
        );
    }

    #[test]
    fn changed_start_price_rejected() {
        let mut u = purchase(50, 0, 60);
        auction_out(&mut u).start_price = 10;
        assert_eq!(
            check_purchase_shape(&u).unwrap_err(),
            PaperbidError::invariant("start price changed")
        );
    }

    #[test]
    fn changed_owner_rejected() {
        let mut u = purchase(50, 0, 60);
        auction_out(&mut u).item_owner = BUYER;
        assert_eq!(
            check_purchase_shape(&u).unwrap_err(),
            PaperbidError::invariant("item owner changed")
        );
    }

    #[test]
    fn changed_item_name_rejected() {
        let mut u = purchase(50, 0, 60);
        auction_out(&mut u).item_name = "Gadget".into();
        assert_eq!(
            check_purchase_shape(&u).unwrap_err(),
            PaperbidError::invariant("item name changed")
        );
    }

    #[test]
    fn changed_observers_rejected() {
        let mut u = purchase(50, 0, 60);
        auction_out(&mut u).observers = vec![BUYER];
        assert_eq!(
            check_purchase_shape(&u).unwrap_err(),
            PaperbidError::invariant("observers changed")
        );
    }

    #[test]
    fn purchase_for_another_seller_rejected() {
        let mut u = purchase(50, 0, 60);
        purchase_out(&mut u).paper_owner = BUYER;
        assert_eq!(
            check_purchase_shape(&u).unwrap_err(),
            PaperbidError::invariant("purchase names a different seller")
        );
    }

    #[test]
    fn winner_must_be_the_buyer() {
        let mut u = purchase(50, 0, 60);
        auction_out(&mut u).auction_winner = Some(OWNER);
        assert_eq!(
            check_purchase_shape(&u).unwrap_err(),
            PaperbidError::invariant("winner is not the buyer")
        );
    }

    #[test]
    fn accept_bid_needs_owner_only() {
        let u = purchase(50, 0, 60);
        let owner: BTreeSet<_> = [OWNER].into_iter().collect();
        assert!(verify_accept_bid(&u, &owner).is_ok());

        let buyer: BTreeSet<_> = [BUYER].into_iter().collect();
        assert_eq!(
            verify_accept_bid(&u, &buyer),
            Err(PaperbidError::signer("auction owner must sign"))
        );
    }

    #[test]
    fn create_needs_buyer_too() {
        let u = purchase(50, 0, 60);
        let owner: BTreeSet<_> = [OWNER].into_iter().collect();
        assert_eq!(
            verify_create(&u, &owner),
            Err(PaperbidError::signer("buyer must sign"))
        );
    }

    #[test]
    fn create_needs_owner() {
        let u = purchase(50, 0, 60);
        let buyer: BTreeSet<_> = [BUYER].into_iter().collect();
        assert_eq!(
            verify_create(&u, &buyer),
            Err(PaperbidError::signer("auction owner must sign"))
        );
    }
}
