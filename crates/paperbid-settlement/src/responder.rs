//! Counterparty side of settlement.
//!
//! Every node runs one responder on its inbox. It never trusts the
//! initiator: identities are checked against its own network map, every
//! input is compared with the version in its own vault, and every update
//! is re-validated before it is signed or recorded.

use std::sync::Arc;

use paperbid_contract::validate;
use paperbid_proposal::{NetworkMap, Vault};
use paperbid_types::{
    FinalizedUpdate, Intent, PaperbidError, Party, PartyId, PartyKeys, PartyRole,
    PartySignature, Result, SignedUpdate,
};
use tokio::sync::RwLock;

use crate::{
    messages::{Envelope, FlowMessage},
    network::Inbox,
};

/// Answers settlement requests addressed to one node.
#[derive(Debug, Clone)]
pub struct Responder {
    keys: Arc<PartyKeys>,
    vault: Arc<RwLock<Vault>>,
    directory: Arc<RwLock<NetworkMap>>,
}

impl Responder {
    #[must_use]
    pub fn new(
        keys: Arc<PartyKeys>,
        vault: Arc<RwLock<Vault>>,
        directory: Arc<RwLock<NetworkMap>>,
    ) -> Self {
        Self {
            keys,
            vault,
            directory,
        }
    }

    /// Serve the inbox until every sender is gone.
    pub async fn run(self, mut inbox: Inbox) {
        while let Some(envelope) = inbox.recv().await {
            self.handle(envelope).await;
        }
        tracing::debug!(party = %self.keys.id(), "Responder stopped");
    }

    /// Handle one request and send its reply.
    pub async fn handle(&self, envelope: Envelope) {
        let from = envelope.from;
        let kind = envelope.message.kind();
        tracing::debug!(party = %self.keys.id(), from = %from, kind, "Request received");

        let delivered = match envelope.message {
            FlowMessage::Reconcile { identities, reply } => {
                reply.send(self.reconcile(&identities).await).is_ok()
            }
            FlowMessage::SignRequest { signed, reply } => {
                reply.send(self.countersign(from, &signed).await).is_ok()
            }
            FlowMessage::Finalized { finalized, reply }
            | FlowMessage::Broadcast { finalized, reply } => {
                let outcome = self.accept_finalized(&finalized).await;
                if let Err(err) = &outcome {
                    tracing::warn!(update = %finalized.id(), from = %from, error = %err, "Rejected committed update");
                }
                reply.send(outcome).is_ok()
            }
        };
        if !delivered {
            tracing::debug!(from = %from, kind, "Requester went away before the reply");
        }
    }

    /// Check that every identity resolves to the same well-known party here.
    ///
    /// # Errors
    /// `IdentityMismatch` naming the first identity that differs.
    pub async fn reconcile(&self, identities: &[Party]) -> Result<()> {
        let directory = self.directory.read().await;
        for claimed in identities {
            match directory.resolve(&claimed.id) {
                None => {
                    return Err(PaperbidError::IdentityMismatch {
                        party: claimed.id,
                        reason: format!("{} is unknown to this node", claimed.name),
                    });
                }
                Some(local) if local.name != claimed.name || local.role != claimed.role => {
                    return Err(PaperbidError::IdentityMismatch {
                        party: claimed.id,
                        reason: format!("resolves to {local} here, not {claimed}"),
                    });
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Re-validate `signed` and sign it.
    ///
    /// Only purchases are counter-signed, and only by a declared signer.
    ///
    /// # Errors
    /// `CounterpartyRefused` naming this node and the reason.
    pub async fn countersign(
        &self,
        initiator: PartyId,
        signed: &SignedUpdate,
    ) -> Result<PartySignature> {
        let me = self.keys.id();
        let refuse = |reason: String| {
            tracing::warn!(update = %signed.id(), initiator = %initiator, reason = %reason, "Refusing to sign");
            PaperbidError::CounterpartyRefused { party: me, reason }
        };

        let update = &signed.update;
        if !update.required_signers().contains(&me) {
            return Err(refuse("not a required signer".into()));
        }
        if !update
            .intents()
            .iter()
            .all(|i| matches!(i, Intent::AcceptBid | Intent::Create))
        {
            return Err(refuse("only purchases are counter-signed".into()));
        }
        if !signed.signed_by().contains(&initiator) {
            return Err(refuse("initiator has not signed".into()));
        }
        let id = signed.id();
        for signature in &signed.signatures {
            signature.verify(id.as_bytes()).map_err(|e| refuse(e.to_string()))?;
        }
        validate(update).map_err(|e| refuse(e.to_string()))?;
        self.vault
            .read()
            .await
            .verify_inputs(update)
            .map_err(|e| refuse(e.to_string()))?;
        self.check_notary(update.notary)
            .await
            .map_err(|e| refuse(e.to_string()))?;

        tracing::info!(update = %id, initiator = %initiator, "Update counter-signed");
        Ok(self.keys.sign(id.as_bytes()))
    }

    /// Verify and record a committed update.
    ///
    /// # Errors
    /// - receipt or signature failures from [`FinalizedUpdate::verify`]
    /// - validator rejections
    /// - `InputMismatch` if an input is not the version this node holds
    /// - `IdentityMismatch` if the notary is not a known ordering party
    pub async fn accept_finalized(&self, finalized: &FinalizedUpdate) -> Result<()> {
        finalized.verify()?;
        validate(finalized.update())?;
        self.check_notary(finalized.receipt.notary).await?;

        let mut vault = self.vault.write().await;
        vault.verify_inputs(finalized.update())?;
        let fresh = vault.record(finalized.update());
        if fresh {
            tracing::info!(
                party = %self.keys.id(),
                update = %finalized.id(),
                sequence = %finalized.receipt.sequence,
                "Committed update recorded"
            );
        } else {
            tracing::debug!(update = %finalized.id(), "Committed update already recorded");
        }
        Ok(())
    }

    async fn check_notary(&self, notary: PartyId) -> Result<()> {
        match self.directory.read().await.resolve(&notary) {
            Some(party) if party.role == PartyRole::Ordering => Ok(()),
            _ => Err(PaperbidError::IdentityMismatch {
                party: notary,
                reason: "not a known ordering service".into(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use paperbid_types::*;

    use super::*;

    struct Fixture {
        owner: Arc<PartyKeys>,
        buyer: PartyKeys,
        notary: PartyKeys,
        listing: StateAndRef,
        responder: Responder,
    }

    fn fixture() -> Fixture {
        let owner = Arc::new(PartyKeys::from_seed("Seller", PartyRole::Participant, [1; 32]));
        let buyer = PartyKeys::from_seed("Buyer", PartyRole::Participant, [2; 32]);
        let notary = PartyKeys::from_seed("Notary", PartyRole::Ordering, [9; 32]);
        let directory = NetworkMap::with_parties([
            owner.party().clone(),
            buyer.party().clone(),
            notary.party().clone(),
        ]);

        let start = ProposedUpdate {
            inputs: vec![],
            outputs: vec![AuctionRecord::listed("Widget", 50, owner.id()).into()],
            commands: vec![Command::new(Intent::Start, [owner.id()])],
            notary: notary.id(),
            time_window: TimeWindow::starting(Utc::now(), Duration::seconds(30)),
        };
        let mut vault = Vault::new();
        vault.record(&start);
        let listing = start.output_states().remove(0);

        let responder = Responder::new(
            owner.clone(),
            Arc::new(RwLock::new(vault)),
            Arc::new(RwLock::new(directory)),
        );
        Fixture {
            owner,
            buyer,
            notary,
            listing,
            responder,
        }
    }

    fn purchase_of(f: &Fixture, input: StateAndRef, amount: u64) -> SignedUpdate {
        let auction = input.record.as_auction().unwrap().clone();
        let update = ProposedUpdate {
            inputs: vec![input],
            outputs: vec![
                auction.with_bid(amount, f.buyer.id()).into(),
                PurchaseRecord::new(amount, f.buyer.id(), f.owner.id(), auction.id).into(),
            ],
            commands: vec![
                Command::new(Intent::AcceptBid, [f.owner.id()]),
                Command::new(Intent::Create, [f.owner.id(), f.buyer.id()]),
            ],
            notary: f.notary.id(),
            time_window: TimeWindow::starting(Utc::now(), Duration::seconds(30)),
        };
        SignedUpdate::initial(update, &f.buyer)
    }

    fn purchase(f: &Fixture, amount: u64) -> SignedUpdate {
        purchase_of(f, f.listing.clone(), amount)
    }

    #[tokio::test]
    async fn reconcile_accepts_matching_identities() {
        let f = fixture();
        let identities = vec![f.buyer.party().clone(), f.notary.party().clone()];
        assert!(f.responder.reconcile(&identities).await.is_ok());
    }

    #[tokio::test]
    async fn reconcile_rejects_renamed_party() {
        let f = fixture();
        let renamed = Party {
            name: "Impostor".into(),
            ..f.buyer.party().clone()
        };
        assert!(matches!(
            f.responder.reconcile(&[renamed]).await,
            Err(PaperbidError::IdentityMismatch { party, .. }) if party == f.buyer.id()
        ));
    }

    #[tokio::test]
    async fn reconcile_rejects_unknown_party() {
        let f = fixture();
        let stranger = PartyKeys::from_seed("Stranger", PartyRole::Participant, [4; 32]);
        assert!(matches!(
            f.responder.reconcile(&[stranger.party().clone()]).await,
            Err(PaperbidError::IdentityMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn countersigns_valid_purchase() {
        let f = fixture();
        let signed = purchase(&f, 60);
        let signature = f
            .responder
            .countersign(f.buyer.id(), &signed)
            .await
            .unwrap();
        assert_eq!(signature.by, f.owner.id());
        assert!(signature.verify(signed.id().as_bytes()).is_ok());
    }

    #[tokio::test]
    async fn refuses_invalid_purchase() {
        let f = fixture();
        let signed = purchase(&f, 10);
        let err = f
            .responder
            .countersign(f.buyer.id(), &signed)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PaperbidError::CounterpartyRefused { party, ref reason }
                if party == f.owner.id() && reason.contains("amount below start price")
        ));
    }

    #[tokio::test]
    async fn refuses_input_that_differs_from_vault() {
        let f = fixture();
        let mut forged = f.listing.clone();
        if let LedgerRecord::Auction(a) = &mut forged.record {
            a.start_price = 5;
        }
        let signed = purchase_of(&f, forged, 10);
        let err = f
            .responder
            .countersign(f.buyer.id(), &signed)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PaperbidError::CounterpartyRefused { ref reason, .. }
                if reason.contains("record differs from the recorded version")
        ));
    }

    #[tokio::test]
    async fn refuses_unknown_input() {
        let f = fixture();
        let invented = StateAndRef {
            state_ref: StateRef::new(UpdateId([5; 32]), 0),
            ..f.listing.clone()
        };
        let signed = purchase_of(&f, invented, 60);
        assert!(matches!(
            f.responder.countersign(f.buyer.id(), &signed).await,
            Err(PaperbidError::CounterpartyRefused { ref reason, .. })
                if reason.contains("unknown version")
        ));
    }

    #[tokio::test]
    async fn refuses_unsigned_request() {
        let f = fixture();
        let mut signed = purchase(&f, 60);
        signed.signatures.clear();
        assert!(matches!(
            f.responder.countersign(f.buyer.id(), &signed).await,
            Err(PaperbidError::CounterpartyRefused { .. })
        ));
    }

    #[tokio::test]
    async fn refuses_when_not_a_signer() {
        let f = fixture();
        let mut signed = purchase(&f, 60);
        for command in &mut signed.update.commands {
            command.signers.remove(&f.owner.id());
        }
        let signed = SignedUpdate::initial(signed.update, &f.buyer);
        assert_eq!(
            f.responder.countersign(f.buyer.id(), &signed).await,
            Err(PaperbidError::CounterpartyRefused {
                party: f.owner.id(),
                reason: "not a required signer".into()
            })
        );
    }

    #[tokio::test]
    async fn refuses_unknown_notary() {
        let f = fixture();
        let mut signed = purchase(&f, 60);
        signed.update.notary = PartyId([3; 32]);
        let signed = SignedUpdate::initial(signed.update, &f.buyer);
        assert!(matches!(
            f.responder.countersign(f.buyer.id(), &signed).await,
            Err(PaperbidError::CounterpartyRefused { .. })
        ));
    }
}
