//! Proposed, signed and finalized ledger updates.
//!
//! A [`ProposedUpdate`] bundles the record versions it consumes, the
//! records it produces, one or more declared [`Command`]s, the ordering
//! service that must commit it, and the [`TimeWindow`] in which it may be
//! committed. Its [`UpdateId`] is a SHA-256 digest over a canonical
//! encoding, so every party that sees the same update derives the same id
//! and signs the same bytes.
//!
//! ## Lifecycle
//!
//! ```text
//!   ProposedUpdate ──sign──▶ SignedUpdate ──commit──▶ FinalizedUpdate
//!                           (all required             (+ CommitReceipt from
//!                            signers)                  the ordering service)
//! ```

use std::{collections::BTreeSet, fmt, str::FromStr};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    CommitSeq, LedgerRecord, PaperbidError, PartyId, PartyKeys, PartySignature, Result,
    StateAndRef, StateRef, UpdateId, constants,
};

// ---------------------------------------------------------------------------
// Intent
// ---------------------------------------------------------------------------

/// Declared purpose of an update. The validator dispatches on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum Intent {
    /// List a new item: no inputs, one auction output.
    Start,
    /// Close an auction: consume its current version, produce nothing.
    End,
    /// Owner accepts an offer: one auction in, auction + purchase out.
    AcceptBid,
    /// Two-party purchase: as `AcceptBid`, co-signed by the buyer.
    Create,
}

impl Intent {
    /// Start / End / AcceptBid govern the auction record itself; `Create`
    /// governs the purchase record. An update carries at most one command
    /// from each family.
    #[must_use]
    pub fn is_auction_lifecycle(&self) -> bool {
        !matches!(self, Self::Create)
    }

    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::End => "end",
            Self::AcceptBid => "accept_bid",
            Self::Create => "create",
        }
    }

    fn code(self) -> u8 {
        match self {
            Self::Start => 0,
            Self::End => 1,
            Self::AcceptBid => 2,
            Self::Create => 3,
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Intent {
    type Err = PaperbidError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "start" => Ok(Self::Start),
            "end" => Ok(Self::End),
            "accept_bid" => Ok(Self::AcceptBid),
            "create" => Ok(Self::Create),
            other => Err(PaperbidError::UnrecognizedIntent(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Command / TimeWindow
// ---------------------------------------------------------------------------

/// A declared intent plus the identities required to sign for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub intent: Intent,
    pub signers: BTreeSet<PartyId>,
}

impl Command {
    pub fn new(intent: Intent, signers: impl IntoIterator<Item = PartyId>) -> Self {
        Self {
            intent,
            signers: signers.into_iter().collect(),
        }
    }
}

/// Interval in which the ordering service will accept the update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub from: DateTime<Utc>,
    pub until: DateTime<Utc>,
}

impl TimeWindow {
    /// A window opening at `from` and lasting `length`.
    #[must_use]
    pub fn starting(from: DateTime<Utc>, length: Duration) -> Self {
        Self {
            from,
            until: from + length,
        }
    }

    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.from && at <= self.until
    }
}

// ---------------------------------------------------------------------------
// ProposedUpdate
// ---------------------------------------------------------------------------

/// A candidate atomic change to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedUpdate {
    /// Record versions consumed.
    pub inputs: Vec<StateAndRef>,
    /// Records produced. Output `i` is addressed as `StateRef { id(), i }`.
    pub outputs: Vec<LedgerRecord>,
    /// Declared intents with their required signers.
    pub commands: Vec<Command>,
    /// Ordering service that must commit this update.
    pub notary: PartyId,
    pub time_window: TimeWindow,
}

impl ProposedUpdate {
    /// Content address of this update.
    ///
    /// Commits to every input pointer and the record it claims to consume,
    /// every output field, every command, the notary and the time window.
    #[must_use]
    pub fn id(&self) -> UpdateId {
        let mut hasher = Sha256::new();
        hasher.update(constants::UPDATE_ID_DOMAIN);

        hasher.update((self.inputs.len() as u64).to_le_bytes());
        for input in &self.inputs {
            hasher.update(input.state_ref.update.as_bytes());
            hasher.update(input.state_ref.index.to_le_bytes());
            hash_record(&mut hasher, &input.record);
        }

        hasher.update((self.outputs.len() as u64).to_le_bytes());
        for output in &self.outputs {
            hash_record(&mut hasher, output);
        }

        hasher.update((self.commands.len() as u64).to_le_bytes());
        for command in &self.commands {
            hasher.update([command.intent.code()]);
            hasher.update((command.signers.len() as u64).to_le_bytes());
            for signer in &command.signers {
                hasher.update(signer.as_bytes());
            }
        }

        hasher.update(self.notary.as_bytes());
        hasher.update(self.time_window.from.timestamp_millis().to_le_bytes());
        hasher.update(self.time_window.until.timestamp_millis().to_le_bytes());

        let result = hasher.finalize();
        let mut id = [0u8; 32];
        id.copy_from_slice(&result);
        UpdateId(id)
    }

    /// Union of every command's signer set.
    #[must_use]
    pub fn required_signers(&self) -> BTreeSet<PartyId> {
        self.commands
            .iter()
            .flat_map(|c| c.signers.iter().copied())
            .collect()
    }

    /// Every identity the update mentions: record parties, signers, notary.
    #[must_use]
    pub fn referenced_parties(&self) -> BTreeSet<PartyId> {
        let mut parties = self.required_signers();
        parties.insert(self.notary);
        for record in self
            .inputs
            .iter()
            .map(|i| &i.record)
            .chain(self.outputs.iter())
        {
            match record {
                LedgerRecord::Auction(a) => {
                    parties.insert(a.item_owner);
                    parties.extend(a.auction_winner);
                    parties.extend(a.observers.iter().copied());
                }
                LedgerRecord::Purchase(p) => {
                    parties.insert(p.buyer);
                    parties.insert(p.paper_owner);
                }
            }
        }
        parties
    }

    /// Pointers to the record versions this update consumes.
    #[must_use]
    pub fn input_refs(&self) -> Vec<StateRef> {
        self.inputs.iter().map(|i| i.state_ref).collect()
    }

    /// Outputs paired with the pointers they will have once committed.
    #[must_use]
    pub fn output_states(&self) -> Vec<StateAndRef> {
        let id = self.id();
        self.outputs
            .iter()
            .enumerate()
            .map(|(i, record)| StateAndRef {
                state_ref: StateRef::new(id, u32::try_from(i).unwrap_or(u32::MAX)),
                record: record.clone(),
            })
            .collect()
    }

    /// Every declared intent, in command order.
    #[must_use]
    pub fn intents(&self) -> Vec<Intent> {
        self.commands.iter().map(|c| c.intent).collect()
    }
}

fn hash_record(hasher: &mut Sha256, record: &LedgerRecord) {
    match record {
        LedgerRecord::Auction(a) => {
            hasher.update([0u8]);
            hasher.update(a.id.0.as_bytes());
            hasher.update((a.item_name.len() as u64).to_le_bytes());
            hasher.update(a.item_name.as_bytes());
            hasher.update(a.start_price.to_le_bytes());
            hasher.update(a.item_owner.as_bytes());
            hasher.update(a.highest_bid.to_le_bytes());
            match &a.auction_winner {
                Some(w) => {
                    hasher.update([1u8]);
                    hasher.update(w.as_bytes());
                }
                None => hasher.update([0u8]),
            }
            hasher.update((a.observers.len() as u64).to_le_bytes());
            for o in &a.observers {
                hasher.update(o.as_bytes());
            }
        }
        LedgerRecord::Purchase(p) => {
            hasher.update([1u8]);
            hasher.update(p.id.0.as_bytes());
            hasher.update(p.amount.to_le_bytes());
            hasher.update(p.buyer.as_bytes());
            hasher.update(p.paper_owner.as_bytes());
            hasher.update(p.paper_reference.0.as_bytes());
        }
    }
}

// ---------------------------------------------------------------------------
// SignedUpdate
// ---------------------------------------------------------------------------

/// A proposed update plus the signatures collected so far.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedUpdate {
    pub update: ProposedUpdate,
    pub signatures: Vec<PartySignature>,
}

impl SignedUpdate {
    /// Start collecting signatures with the initiator's own.
    #[must_use]
    pub fn initial(update: ProposedUpdate, keys: &PartyKeys) -> Self {
        let signature = keys.sign(update.id().as_bytes());
        Self {
            update,
            signatures: vec![signature],
        }
    }

    #[must_use]
    pub fn id(&self) -> UpdateId {
        self.update.id()
    }

    /// Add a signature, replacing any earlier one by the same party.
    pub fn add_signature(&mut self, signature: PartySignature) {
        self.signatures.retain(|s| s.by != signature.by);
        self.signatures.push(signature);
    }

    #[must_use]
    pub fn signed_by(&self) -> BTreeSet<PartyId> {
        self.signatures.iter().map(|s| s.by).collect()
    }

    /// Verify every present signature, and that every required signer not
    /// in `allowed_missing` has signed.
    ///
    /// # Errors
    /// - `SignatureInvalid` if any signature fails verification
    /// - `MissingSignature` for the first absent required signer
    pub fn verify_signatures_except(&self, allowed_missing: &[PartyId]) -> Result<()> {
        let id = self.id();
        for signature in &self.signatures {
            signature.verify(id.as_bytes())?;
        }
        let signed = self.signed_by();
        for required in self.update.required_signers() {
            if !signed.contains(&required) && !allowed_missing.contains(&required) {
                return Err(PaperbidError::MissingSignature { party: required });
            }
        }
        Ok(())
    }

    /// Verify that the signature set is complete and valid.
    pub fn verify_required_signatures(&self) -> Result<()> {
        self.verify_signatures_except(&[])
    }
}

// ---------------------------------------------------------------------------
// CommitReceipt / FinalizedUpdate
// ---------------------------------------------------------------------------

/// Finality confirmation issued by the ordering service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitReceipt {
    pub update: UpdateId,
    pub sequence: CommitSeq,
    pub notary: PartyId,
    pub committed_at: DateTime<Utc>,
    /// Notary signature over [`CommitReceipt::signing_payload`].
    pub signature: PartySignature,
}

impl CommitReceipt {
    /// Canonical signing payload.
    ///
    /// Format: `"paperbid:receipt:v1:" || update || sequence || notary`
    #[must_use]
    pub fn signing_payload(update: UpdateId, sequence: CommitSeq, notary: PartyId) -> Vec<u8> {
        let mut payload = Vec::with_capacity(96);
        payload.extend_from_slice(constants::RECEIPT_DOMAIN);
        payload.extend_from_slice(update.as_bytes());
        payload.extend_from_slice(&sequence.0.to_le_bytes());
        payload.extend_from_slice(notary.as_bytes());
        payload
    }

    /// Verify the notary's signature on this receipt.
    pub fn verify(&self) -> Result<()> {
        if self.signature.by != self.notary {
            return Err(PaperbidError::SignatureInvalid {
                party: self.signature.by,
            });
        }
        self.signature
            .verify(&Self::signing_payload(self.update, self.sequence, self.notary))
    }
}

/// A committed update: the fully signed update plus its commit receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizedUpdate {
    pub signed: SignedUpdate,
    pub receipt: CommitReceipt,
}

impl FinalizedUpdate {
    #[must_use]
    pub fn id(&self) -> UpdateId {
        self.receipt.update
    }

    #[must_use]
    pub fn update(&self) -> &ProposedUpdate {
        &self.signed.update
    }

    /// Check that the receipt is genuine, names this update and the
    /// update's own notary, and that the signature set is complete.
    pub fn verify(&self) -> Result<()> {
        if self.receipt.update != self.signed.id() {
            return Err(PaperbidError::structural(
                "commit receipt does not name this update",
            ));
        }
        if self.receipt.notary != self.signed.update.notary {
            return Err(PaperbidError::structural(
                "commit receipt issued by a different notary",
            ));
        }
        self.receipt.verify()?;
        self.signed.verify_required_signatures()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AuctionRecord, PartyRole, PurchaseRecord};

    fn start_update(owner: &PartyKeys, notary: PartyId) -> ProposedUpdate {
        let auction = AuctionRecord::listed("Widget", 50, owner.id());
        ProposedUpdate {
            inputs: vec![],
            outputs: vec![auction.into()],
            commands: vec![Command::new(Intent::Start, [owner.id()])],
            notary,
            time_window: TimeWindow::starting(Utc::now(), Duration::seconds(30)),
        }
    }

    #[test]
    fn intent_tags_roundtrip() {
        for intent in [Intent::Start, Intent::End, Intent::AcceptBid, Intent::Create] {
            assert_eq!(intent.tag().parse::<Intent>().unwrap(), intent);
        }
    }

    #[test]
    fn unknown_intent_tag_rejected() {
        let err = "transfer".parse::<Intent>().unwrap_err();
        assert_eq!(err, PaperbidError::UnrecognizedIntent("transfer".into()));
    }

    #[test]
    fn update_id_deterministic() {
        let owner = PartyKeys::generate("Seller", PartyRole::Participant);
        let update = start_update(&owner, PartyId([9; 32]));
        assert_eq!(update.id(), update.id());
        assert_eq!(update.id(), update.clone().id());
    }

    #[test]
    fn update_id_changes_with_content() {
        let owner = PartyKeys::generate("Seller", PartyRole::Participant);
        let update = start_update(&owner, PartyId([9; 32]));
        let mut other = update.clone();
        if let LedgerRecord::Auction(a) = &mut other.outputs[0] {
            a.start_price += 1;
        }
        assert_ne!(update.id(), other.id());

        let mut other = update.clone();
        other.commands[0].signers.insert(PartyId([3; 32]));
        assert_ne!(update.id(), other.id());
    }

    #[test]
    fn update_id_commits_to_input_records() {
        let auction = AuctionRecord::dummy(PartyId([1; 32]), 50, 100);
        let spend = |claimed: AuctionRecord| ProposedUpdate {
            inputs: vec![StateAndRef {
                state_ref: StateRef::new(UpdateId([4; 32]), 0),
                record: claimed.into(),
            }],
            outputs: vec![],
            commands: vec![Command::new(Intent::End, [PartyId([1; 32])])],
            notary: PartyId([9; 32]),
            time_window: TimeWindow::starting(Utc::now(), Duration::seconds(30)),
        };
        let honest = spend(auction.clone());
        let forged = spend(AuctionRecord {
            highest_bid: 0,
            ..auction
        });
        assert_ne!(honest.id(), forged.id());
    }

    #[test]
    fn required_signers_is_union() {
        let owner = PartyId([1; 32]);
        let buyer = PartyId([2; 32]);
        let auction = AuctionRecord::dummy(owner, 50, 0);
        let update = ProposedUpdate {
            inputs: vec![],
            outputs: vec![PurchaseRecord::new(50, buyer, owner, auction.id).into()],
            commands: vec![
                Command::new(Intent::AcceptBid, [owner]),
                Command::new(Intent::Create, [owner, buyer]),
            ],
            notary: PartyId([9; 32]),
            time_window: TimeWindow::starting(Utc::now(), Duration::seconds(30)),
        };
        let signers = update.required_signers();
        assert_eq!(signers.len(), 2);
        assert!(signers.contains(&owner) && signers.contains(&buyer));
        assert!(update.referenced_parties().contains(&PartyId([9; 32])));
    }

    #[test]
    fn signature_collection() {
        let owner = PartyKeys::generate("Seller", PartyRole::Participant);
        let buyer = PartyKeys::generate("Buyer", PartyRole::Participant);
        let mut update = start_update(&owner, PartyId([9; 32]));
        update.commands[0].signers.insert(buyer.id());

        let mut signed = SignedUpdate::initial(update, &buyer);
        assert_eq!(
            signed.verify_required_signatures().unwrap_err(),
            PaperbidError::MissingSignature { party: owner.id() }
        );
        assert!(signed.verify_signatures_except(&[owner.id()]).is_ok());

        signed.add_signature(owner.sign(signed.id().as_bytes()));
        assert!(signed.verify_required_signatures().is_ok());
    }

    #[test]
    fn signature_over_other_update_rejected() {
        let owner = PartyKeys::generate("Seller", PartyRole::Participant);
        let update = start_update(&owner, PartyId([9; 32]));
        let mut signed = SignedUpdate::initial(update, &owner);
        signed.add_signature(owner.sign(b"something else"));
        assert!(matches!(
            signed.verify_required_signatures(),
            Err(PaperbidError::SignatureInvalid { .. })
        ));
    }

    #[test]
    fn receipt_verifies() {
        let notary = PartyKeys::generate("Notary", PartyRole::Ordering);
        let update = UpdateId([4; 32]);
        let payload = CommitReceipt::signing_payload(update, CommitSeq(1), notary.id());
        let receipt = CommitReceipt {
            update,
            sequence: CommitSeq(1),
            notary: notary.id(),
            committed_at: Utc::now(),
            signature: notary.sign(&payload),
        };
        assert!(receipt.verify().is_ok());

        let mut forged = receipt.clone();
        forged.sequence = CommitSeq(2);
        assert!(forged.verify().is_err());
    }

    #[test]
    fn time_window_bounds() {
        let now = Utc::now();
        let window = TimeWindow::starting(now, Duration::seconds(30));
        assert!(window.contains(now));
        assert!(window.contains(now + Duration::seconds(30)));
        assert!(!window.contains(now + Duration::seconds(31)));
        assert!(!window.contains(now - Duration::seconds(1)));
    }
}
