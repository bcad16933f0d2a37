//! Ledger record model: auction records and purchase records.
//!
//! Records are immutable values. An auction "changes" only by having its
//! current version consumed and a new version with the same [`LinearId`]
//! produced; older versions stay behind as history.
//!
//! ```text
//!   Start            AcceptBid/Create           End
//!  ─────▶ [v1] ──────────────▶ [v2] ─ ─ ─ ▶ [vN] ─────▶ (consumed, no output)
//!                          └──▶ PurchaseRecord
//! ```

use serde::{Deserialize, Serialize};

use crate::{LinearId, PartyId, StateRef};

/// One version of an item listed for sale.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuctionRecord {
    /// Stable identifier shared by every version of this auction.
    pub id: LinearId,
    /// Name of the item for sale. Never empty.
    pub item_name: String,
    /// Price floor, fixed for the life of the auction.
    pub start_price: u64,
    /// Seller. Starts and ends the auction and counter-signs purchases.
    pub item_owner: PartyId,
    /// Highest accepted offer so far. Never decreases across versions.
    pub highest_bid: u64,
    /// Buyer behind `highest_bid`, once an offer has been accepted.
    pub auction_winner: Option<PartyId>,
    /// Parties that should receive committed purchases on this auction.
    /// Empty means every known party.
    pub observers: Vec<PartyId>,
}

impl AuctionRecord {
    /// A freshly listed auction owned by `item_owner`.
    #[must_use]
    pub fn listed(item_name: impl Into<String>, start_price: u64, item_owner: PartyId) -> Self {
        Self {
            id: LinearId::new(),
            item_name: item_name.into(),
            start_price,
            item_owner,
            highest_bid: 0,
            auction_winner: None,
            observers: Vec::new(),
        }
    }

    /// The next version of this auction after accepting `amount` from `buyer`.
    #[must_use]
    pub fn with_bid(&self, amount: u64, buyer: PartyId) -> Self {
        Self {
            highest_bid: amount,
            auction_winner: Some(buyer),
            ..self.clone()
        }
    }

    /// Parties entitled to see and consume this version: the owner and,
    /// once set, the current winner.
    #[must_use]
    pub fn participants(&self) -> Vec<PartyId> {
        let mut parties = vec![self.item_owner];
        if let Some(winner) = self.auction_winner {
            if winner != self.item_owner {
                parties.push(winner);
            }
        }
        parties
    }
}

/// An accepted offer against one auction. Never superseded or consumed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PurchaseRecord {
    pub id: LinearId,
    /// Offer amount. Equals the co-produced auction version's `highest_bid`.
    pub amount: u64,
    pub buyer: PartyId,
    /// Owner of the auction at the time of the offer.
    pub paper_owner: PartyId,
    /// `id` of the auction this offer targets.
    pub paper_reference: LinearId,
}

impl PurchaseRecord {
    #[must_use]
    pub fn new(amount: u64, buyer: PartyId, paper_owner: PartyId, paper_reference: LinearId) -> Self {
        Self {
            id: LinearId::new(),
            amount,
            buyer,
            paper_owner,
            paper_reference,
        }
    }

    #[must_use]
    pub fn participants(&self) -> Vec<PartyId> {
        if self.buyer == self.paper_owner {
            vec![self.buyer]
        } else {
            vec![self.buyer, self.paper_owner]
        }
    }
}

/// Any record that can appear on the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LedgerRecord {
    Auction(AuctionRecord),
    Purchase(PurchaseRecord),
}

impl LedgerRecord {
    #[must_use]
    pub fn linear_id(&self) -> LinearId {
        match self {
            Self::Auction(a) => a.id,
            Self::Purchase(p) => p.id,
        }
    }

    #[must_use]
    pub fn as_auction(&self) -> Option<&AuctionRecord> {
        match self {
            Self::Auction(a) => Some(a),
            Self::Purchase(_) => None,
        }
    }

    #[must_use]
    pub fn as_purchase(&self) -> Option<&PurchaseRecord> {
        match self {
            Self::Purchase(p) => Some(p),
            Self::Auction(_) => None,
        }
    }

    #[must_use]
    pub fn participants(&self) -> Vec<PartyId> {
        match self {
            Self::Auction(a) => a.participants(),
            Self::Purchase(p) => p.participants(),
        }
    }

    /// Short kind label for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Auction(_) => "auction",
            Self::Purchase(_) => "purchase",
        }
    }
}

impl From<AuctionRecord> for LedgerRecord {
    fn from(record: AuctionRecord) -> Self {
        Self::Auction(record)
    }
}

impl From<PurchaseRecord> for LedgerRecord {
    fn from(record: PurchaseRecord) -> Self {
        Self::Purchase(record)
    }
}

/// A record version together with the pointer that addresses it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateAndRef {
    pub state_ref: StateRef,
    pub record: LedgerRecord,
}

/// Dummy records for testing. **Never use in production.**
#[cfg(any(test, feature = "test-helpers"))]
impl AuctionRecord {
    /// A "Widget" auction with the given price floor and highest bid.
    pub fn dummy(item_owner: PartyId, start_price: u64, highest_bid: u64) -> Self {
        Self {
            highest_bid,
            ..Self::listed("Widget", start_price, item_owner)
        }
    }
}
