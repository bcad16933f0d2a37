//! Caller-facing node surface.
//!
//! An [`AuctionNode`] is one party on the network: its keys, its vault,
//! its view of the network map, a responder serving its inbox, and a
//! coordinator for the updates it initiates. Each operation suspends until
//! the attempt is committed or aborted.

use std::sync::Arc;

use chrono::Utc;
use paperbid_proposal::{NetworkMap, Proposal, ProposalBuilder, RecordQuery, Vault};
use paperbid_types::{
    AuctionRecord, CommitReceipt, FinalizedUpdate, LinearId, NodeConfig, PaperbidError, Party,
    PartyId, PartyKeys, PurchaseRecord, Result,
};
use tokio::{sync::RwLock, task::JoinHandle};

use crate::{
    coordinator::{Coordinator, Settlement},
    network::Network,
    notary::NotaryHandle,
    responder::Responder,
};

/// One participant node.
#[derive(Debug)]
pub struct AuctionNode {
    party: Party,
    vault: Arc<RwLock<Vault>>,
    directory: Arc<RwLock<NetworkMap>>,
    builder: ProposalBuilder,
    coordinator: Coordinator,
    network: Network,
    responder: JoinHandle<()>,
}

impl AuctionNode {
    /// Connect a node to `network` and start serving its inbox.
    ///
    /// `directory` is this node's own view of the network map.
    ///
    /// # Errors
    /// - `Configuration` if `config` is invalid or names a different party
    pub async fn join(
        config: &NodeConfig,
        keys: PartyKeys,
        directory: NetworkMap,
        network: &Network,
        notary: &NotaryHandle,
    ) -> Result<Self> {
        config.validate()?;
        if config.name != keys.party().name || config.role != keys.party().role {
            return Err(PaperbidError::Configuration(format!(
                "config names {} ({}), keys belong to {}",
                config.name,
                config.role,
                keys.party()
            )));
        }

        let party = keys.party().clone();
        let keys = Arc::new(keys);
        let vault = Arc::new(RwLock::new(Vault::new()));
        let directory = Arc::new(RwLock::new(directory));

        let inbox = network.connect(party.id, config.inbox_capacity).await;
        let responder = Responder::new(keys.clone(), vault.clone(), directory.clone());
        let responder = tokio::spawn(responder.run(inbox));

        let coordinator = Coordinator::new(
            keys,
            vault.clone(),
            directory.clone(),
            network.clone(),
            notary.clone(),
            config.settlement,
        );
        let builder = ProposalBuilder::new(notary.id(), config.settlement.commit_window());

        tracing::info!(party = %party, notary = %notary.id(), "Node joined");
        Ok(Self {
            party,
            vault,
            directory,
            builder,
            coordinator,
            network: network.clone(),
            responder,
        })
    }

    /// List an item. Returns the new auction's id once committed.
    pub async fn start_auction(&self, item_name: &str, start_price: u64) -> Result<LinearId> {
        self.start_auction_with_observers(item_name, start_price, Vec::new())
            .await
    }

    /// List an item whose updates are disseminated only to `observers`
    /// (empty means every known party).
    pub async fn start_auction_with_observers(
        &self,
        item_name: &str,
        start_price: u64,
        observers: Vec<PartyId>,
    ) -> Result<LinearId> {
        let proposal = self
            .builder
            .start(self.party.id, item_name, start_price, observers, Utc::now());
        let id = proposal
            .target()
            .ok_or_else(|| PaperbidError::Internal("start proposal has no auction".into()))?;
        self.coordinator.settle(proposal).await?;
        tracing::info!(party = %self.party.id, auction = %id, item = item_name, start_price, "Auction started");
        Ok(id)
    }

    /// Offer `amount` for an auction and settle it with the owner.
    pub async fn make_purchase(&self, auction: LinearId, amount: u64) -> Result<FinalizedUpdate> {
        Ok(self.purchase(auction, amount).await?.finalized)
    }

    /// As [`AuctionNode::make_purchase`], returning the whole attempt record.
    pub async fn purchase(&self, auction: LinearId, amount: u64) -> Result<Settlement> {
        let proposal = self.propose_purchase(auction, amount).await?;
        self.coordinator.settle(proposal).await
    }

    /// Close an auction this node owns.
    pub async fn end_auction(&self, auction: LinearId) -> Result<CommitReceipt> {
        let proposal = self.propose_end(auction).await?;
        let settlement = self.coordinator.settle(proposal).await?;
        tracing::info!(party = %self.party.id, auction = %auction, "Auction ended");
        Ok(settlement.finalized.receipt)
    }

    /// Build, without settling, an offer against the current version.
    pub async fn propose_purchase(&self, auction: LinearId, amount: u64) -> Result<Proposal> {
        self.build(|vault, now| {
            self.builder
                .purchase(vault, auction, amount, self.party.id, now)
        })
        .await
    }

    /// Build, without settling, the closing of an auction.
    pub async fn propose_end(&self, auction: LinearId) -> Result<Proposal> {
        self.build(|vault, now| self.builder.end(vault, auction, self.party.id, now))
            .await
    }

    /// Build against the vault's current version, read right now.
    async fn build(
        &self,
        build: impl FnOnce(&Vault, chrono::DateTime<Utc>) -> Result<Proposal>,
    ) -> Result<Proposal> {
        let vault = self.vault.read().await;
        build(&vault, Utc::now())
    }

    // -----------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------

    /// Current version of an auction as this node sees it.
    pub async fn current_auction(&self, auction: LinearId) -> Result<AuctionRecord> {
        self.vault
            .read()
            .await
            .find_current_auction(auction)
            .map(|(_, record)| record)
    }

    /// Whether this node can resolve a single current version.
    pub async fn has_current_version(&self, auction: LinearId) -> bool {
        self.vault.read().await.find_current_version(auction).is_ok()
    }

    pub async fn history(&self, auction: LinearId) -> Vec<AuctionRecord> {
        self.vault.read().await.history(auction)
    }

    pub async fn purchases_for(&self, auction: LinearId) -> Vec<PurchaseRecord> {
        self.vault.read().await.purchases_for(auction)
    }

    /// Replace this node's view of a party (as after a key rotation).
    pub async fn register_party(&self, party: Party) {
        self.directory.write().await.register(party);
    }

    #[must_use]
    pub fn party(&self) -> &Party {
        &self.party
    }

    #[must_use]
    pub fn id(&self) -> PartyId {
        self.party.id
    }

    #[must_use]
    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    #[must_use]
    pub fn builder(&self) -> &ProposalBuilder {
        &self.builder
    }

    /// Leave the network and stop serving the inbox.
    pub async fn shutdown(self) {
        self.network.disconnect(&self.party.id).await;
        self.responder.abort();
        tracing::info!(party = %self.party, "Node left");
    }
}
