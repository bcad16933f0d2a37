//! Settlement coordinator: drives one proposal from `Built` to
//! `Disseminated`.
//!
//! ## Protocol
//!
//! 1. **Validate locally.** Any rejection aborts before a message is sent.
//! 2. **Reconcile identities.** Every identity the update references is
//!    resolved in the local network map and sent to each counterparty,
//!    which answers `IdentityMismatch` if it resolves any differently.
//! 3. **Collect signatures.** Each counterparty re-validates and signs;
//!    the returned signature is verified before it is accepted.
//! 4. **Commit.** The fully signed update goes to the ordering service,
//!    bounded by the proposal's deadline. `DoubleSpend` is the normal
//!    outcome of losing a race for the same record version. If the
//!    deadline passes first, the notary is asked whether the update
//!    committed anyway; if it did, settlement carries on.
//! 5. **Deliver and disseminate.** The committed update is recorded
//!    locally, delivered to every counterparty, then forwarded
//!    best-effort to observers.
//!
//! Dropping the future returned by [`Coordinator::settle`] before step 4
//! leaves no trace anywhere. After step 4 has started the update may still
//! commit.

use std::{collections::BTreeSet, sync::Arc};

use chrono::Utc;
use paperbid_contract::validate;
use paperbid_proposal::{NetworkMap, Proposal, Vault};
use paperbid_types::{
    CommitReceipt, FinalizedUpdate, PaperbidError, Party, PartyId, PartyKeys, ProposedUpdate,
    Result, SettlementConfig, SignedUpdate, UpdateId,
};
use tokio::sync::RwLock;

use crate::{
    broadcast::{DeliveryReport, Disseminator},
    messages::FlowMessage,
    network::Network,
    notary::NotaryHandle,
    phase::{PhaseTrail, SettlementPhase},
};

/// A completed settlement attempt.
#[derive(Debug, Clone)]
pub struct Settlement {
    pub finalized: FinalizedUpdate,
    /// Phases traversed, `Built` through `Disseminated`.
    pub phases: Vec<SettlementPhase>,
    /// Finality delivery to counterparties plus observer dissemination.
    pub delivery: DeliveryReport,
}

/// Initiator side of settlement for one node.
#[derive(Debug, Clone)]
pub struct Coordinator {
    keys: Arc<PartyKeys>,
    vault: Arc<RwLock<Vault>>,
    directory: Arc<RwLock<NetworkMap>>,
    network: Network,
    notary: NotaryHandle,
    disseminator: Disseminator,
    config: SettlementConfig,
}

impl Coordinator {
    #[must_use]
    pub fn new(
        keys: Arc<PartyKeys>,
        vault: Arc<RwLock<Vault>>,
        directory: Arc<RwLock<NetworkMap>>,
        network: Network,
        notary: NotaryHandle,
        config: SettlementConfig,
    ) -> Self {
        let disseminator = Disseminator::new(keys.id(), network.clone(), config.delivery_timeout());
        Self {
            keys,
            vault,
            directory,
            network,
            notary,
            disseminator,
            config,
        }
    }

    /// Run the full protocol for `proposal`.
    ///
    /// # Errors
    /// The reason the attempt aborted. Validator rejections are returned
    /// before any exchange; `Timeout` and `DoubleSpend` are retryable by
    /// re-proposing against fresh state.
    pub async fn settle(&self, proposal: Proposal) -> Result<Settlement> {
        let Proposal { update, deadline } = proposal;
        let id = update.id();
        let me = self.keys.id();
        let mut trail = PhaseTrail::new(id);

        // 1. Local self-check.
        trail.check(validate(&update))?;
        trail.advance(SettlementPhase::LocallyVerified)?;

        let counterparties: BTreeSet<PartyId> = update
            .required_signers()
            .into_iter()
            .filter(|p| *p != me)
            .collect();
        tracing::info!(
            update = %id,
            intents = ?update.intents(),
            counterparties = counterparties.len(),
            "Settlement started"
        );

        // 2. Identity reconciliation.
        let identities = trail.check(self.resolve_identities(&update).await)?;
        for &peer in &counterparties {
            let identities = identities.clone();
            let exchange = self
                .network
                .request(me, peer, "reconciliation", self.config.exchange_timeout(), |reply| {
                    FlowMessage::Reconcile { identities, reply }
                })
                .await;
            trail.check(exchange)?;
        }
        trail.advance(SettlementPhase::CounterpartyReconciled)?;

        // 3. Signature collection.
        let mut signed = SignedUpdate::initial(update, &self.keys);
        for &peer in &counterparties {
            let request = signed.clone();
            let signature = trail.check(
                self.network
                    .request(me, peer, "signature", self.config.exchange_timeout(), |reply| {
                        FlowMessage::SignRequest {
                            signed: request,
                            reply,
                        }
                    })
                    .await,
            )?;
            if signature.by != peer {
                return Err(trail.abort(PaperbidError::SignatureInvalid { party: peer }));
            }
            trail.check(signature.verify(id.as_bytes()))?;
            signed.add_signature(signature);
        }
        trail.check(signed.verify_required_signatures())?;
        trail.advance(SettlementPhase::Signed)?;

        // 4. Ordering.
        let receipt = trail.check(self.order(signed.clone(), deadline).await)?;
        trail.check(receipt.verify())?;
        let finalized = FinalizedUpdate { signed, receipt };
        self.vault.write().await.record(finalized.update());
        trail.advance(SettlementPhase::Committed)?;

        // 5. Delivery.
        let mut delivery = self
            .disseminator
            .deliver_finality(&finalized, &counterparties)
            .await;
        let observers = self.observers(finalized.update(), &counterparties).await;
        delivery.merge(self.disseminator.disseminate(&finalized, &observers).await);
        trail.advance(SettlementPhase::Disseminated)?;

        tracing::info!(
            update = %id,
            sequence = %finalized.receipt.sequence,
            delivered = delivery.delivered.len(),
            failed = delivery.failed.len(),
            "Settlement complete"
        );
        Ok(Settlement {
            finalized,
            phases: trail.into_phases(),
            delivery,
        })
    }

    /// Every referenced identity as this node resolves it.
    async fn resolve_identities(&self, update: &ProposedUpdate) -> Result<Vec<Party>> {
        let directory = self.directory.read().await;
        update
            .referenced_parties()
            .into_iter()
            .map(|id| {
                directory
                    .resolve(&id)
                    .cloned()
                    .ok_or_else(|| PaperbidError::IdentityMismatch {
                        party: id,
                        reason: "unknown to the initiator".into(),
                    })
            })
            .collect()
    }

    /// Submit to the ordering service, giving up at `deadline` unless the
    /// update turns out to have committed.
    async fn order(
        &self,
        signed: SignedUpdate,
        deadline: chrono::DateTime<Utc>,
    ) -> Result<CommitReceipt> {
        let remaining = (deadline - Utc::now()).to_std().unwrap_or_default();
        let id = signed.id();
        match tokio::time::timeout(remaining, self.notary.submit(signed)).await {
            Ok(Ok(receipt)) => Ok(receipt),
            Ok(Err(err @ PaperbidError::DoubleSpend { .. })) => {
                tracing::warn!(update = %id, error = %err, "Lost the race for the record version");
                Err(err)
            }
            Ok(Err(err)) => Err(err),
            Err(_) => self.late_receipt(id).await,
        }
    }

    /// The deadline passed without a verdict. A submission already
    /// enqueued may still have committed just inside its window.
    async fn late_receipt(&self, id: UpdateId) -> Result<CommitReceipt> {
        let lookup = tokio::time::timeout(self.config.exchange_timeout(), self.notary.receipt(id));
        match lookup.await {
            Ok(Ok(Some(receipt))) => {
                tracing::warn!(
                    update = %id,
                    sequence = %receipt.sequence,
                    "Verdict arrived after the deadline; update is committed"
                );
                Ok(receipt)
            }
            Ok(Ok(None)) => Err(PaperbidError::timeout("ordering")),
            Ok(Err(err)) => {
                tracing::warn!(update = %id, error = %err, "Could not ask the notary about a late commit");
                Err(PaperbidError::timeout("ordering"))
            }
            Err(_) => Err(PaperbidError::timeout("ordering")),
        }
    }

    /// Observers for a committed update: the auction's allow-list applied
    /// to the network map, minus the counterparties already delivered to.
    async fn observers(
        &self,
        update: &ProposedUpdate,
        counterparties: &BTreeSet<PartyId>,
    ) -> BTreeSet<PartyId> {
        let allow_list = update
            .outputs
            .iter()
            .chain(update.inputs.iter().map(|i| &i.record))
            .find_map(|r| r.as_auction())
            .map(|a| a.observers.clone())
            .unwrap_or_default();
        let known = self.directory.read().await.list_known_parties();
        self.disseminator
            .recipients(&known, &allow_list, update.notary)
            .difference(counterparties)
            .copied()
            .collect()
    }

    #[must_use]
    pub fn party(&self) -> PartyId {
        self.keys.id()
    }

    #[must_use]
    pub fn notary(&self) -> &NotaryHandle {
        &self.notary
    }
}
