//! Broadcast disseminator.
//!
//! Forwards a committed update to observers after commit. The recipient
//! set is an explicit set difference:
//!
//! ```text
//!   recipients = (known ∩ allow_list?) − {notary} − {self} − {infrastructure roles}
//! ```
//!
//! where an empty allow-list means every known party. Delivery is
//! best-effort and concurrent: one slow or failing observer neither blocks
//! the others nor affects the already-committed update.

use std::{collections::BTreeSet, time::Duration};

use paperbid_types::{FinalizedUpdate, PaperbidError, Party, PartyId};
use tokio::task::JoinSet;

use crate::{messages::FlowMessage, network::Network};

/// Outcome of delivering one update to a set of parties.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Parties that acknowledged, sorted.
    pub delivered: Vec<PartyId>,
    /// Parties that did not, with the reason, sorted by party.
    pub failed: Vec<(PartyId, PaperbidError)>,
}

impl DeliveryReport {
    /// Fold another report into this one.
    pub fn merge(&mut self, other: Self) {
        self.delivered.extend(other.delivered);
        self.failed.extend(other.failed);
        self.delivered.sort();
        self.failed.sort_by_key(|(party, _)| *party);
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Sends committed updates to observers on behalf of one node.
#[derive(Debug, Clone)]
pub struct Disseminator {
    self_id: PartyId,
    network: Network,
    timeout: Duration,
}

impl Disseminator {
    #[must_use]
    pub fn new(self_id: PartyId, network: Network, timeout: Duration) -> Self {
        Self {
            self_id,
            network,
            timeout,
        }
    }

    /// Who should receive an update.
    #[must_use]
    pub fn recipients(
        &self,
        known: &[Party],
        allow_list: &[PartyId],
        notary: PartyId,
    ) -> BTreeSet<PartyId> {
        let known_ids: BTreeSet<PartyId> = known.iter().map(|p| p.id).collect();
        let candidates: BTreeSet<PartyId> = if allow_list.is_empty() {
            known_ids
        } else {
            let allowed: BTreeSet<PartyId> = allow_list.iter().copied().collect();
            known_ids.intersection(&allowed).copied().collect()
        };

        let mut excluded: BTreeSet<PartyId> = known
            .iter()
            .filter(|p| p.role.is_infrastructure())
            .map(|p| p.id)
            .collect();
        excluded.insert(notary);
        excluded.insert(self.self_id);

        candidates.difference(&excluded).copied().collect()
    }

    /// Forward `finalized` to every recipient as an observer broadcast.
    pub async fn disseminate(
        &self,
        finalized: &FinalizedUpdate,
        recipients: &BTreeSet<PartyId>,
    ) -> DeliveryReport {
        self.deliver(finalized, recipients, Kind::Broadcast).await
    }

    /// Deliver `finalized` to the counterparties that signed it.
    pub async fn deliver_finality(
        &self,
        finalized: &FinalizedUpdate,
        counterparties: &BTreeSet<PartyId>,
    ) -> DeliveryReport {
        self.deliver(finalized, counterparties, Kind::Finality).await
    }

    async fn deliver(
        &self,
        finalized: &FinalizedUpdate,
        recipients: &BTreeSet<PartyId>,
        kind: Kind,
    ) -> DeliveryReport {
        let mut tasks = JoinSet::new();
        for &recipient in recipients {
            let network = self.network.clone();
            let finalized = finalized.clone();
            let from = self.self_id;
            let timeout = self.timeout;
            tasks.spawn(async move {
                let result = network
                    .request(from, recipient, kind.stage(), timeout, |reply| {
                        kind.message(finalized, reply)
                    })
                    .await;
                (recipient, result)
            });
        }

        let mut report = DeliveryReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((party, Ok(()))) => report.delivered.push(party),
                Ok((party, Err(err))) => {
                    tracing::warn!(
                        update = %finalized.id(),
                        party = %party,
                        stage = kind.stage(),
                        error = %err,
                        "Delivery failed"
                    );
                    report.failed.push((party, err));
                }
                Err(err) => {
                    tracing::warn!(update = %finalized.id(), error = %err, "Delivery task failed");
                }
            }
        }
        report.delivered.sort();
        report.failed.sort_by_key(|(party, _)| *party);

        tracing::debug!(
            update = %finalized.id(),
            stage = kind.stage(),
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            "Delivery finished"
        );
        report
    }
}

#[derive(Debug, Clone, Copy)]
enum Kind {
    Finality,
    Broadcast,
}

impl Kind {
    fn stage(self) -> &'static str {
        match self {
            Self::Finality => "finality",
            Self::Broadcast => "dissemination",
        }
    }

    fn message(
        self,
        finalized: FinalizedUpdate,
        reply: crate::messages::Reply<()>,
    ) -> FlowMessage {
        match self {
            Self::Finality => FlowMessage::Finalized { finalized, reply },
            Self::Broadcast => FlowMessage::Broadcast { finalized, reply },
        }
    }
}

#[cfg(test)]
mod tests {
    use paperbid_types::PartyRole;

    use super::*;

    const ME: PartyId = PartyId([1; 32]);
    const ALICE: PartyId = PartyId([2; 32]);
    const BOB: PartyId = PartyId([3; 32]);
    const NOTARY: PartyId = PartyId([9; 32]);
    const MAP: PartyId = PartyId([8; 32]);
    const SECOND_NOTARY: PartyId = PartyId([7; 32]);

    fn party(id: PartyId, role: PartyRole) -> Party {
        Party {
            name: format!("party-{}", id.0[0]),
            id,
            role,
        }
    }

    fn known() -> Vec<Party> {
        vec![
            party(ME, PartyRole::Participant),
            party(ALICE, PartyRole::Participant),
            party(BOB, PartyRole::Participant),
            party(NOTARY, PartyRole::Ordering),
            party(MAP, PartyRole::NetworkMap),
            party(SECOND_NOTARY, PartyRole::Ordering),
        ]
    }

    fn disseminator() -> Disseminator {
        Disseminator::new(ME, Network::new(), Duration::from_millis(50))
    }

    #[test]
    fn empty_allow_list_means_all_participants() {
        let got = disseminator().recipients(&known(), &[], NOTARY);
        assert_eq!(got, [ALICE, BOB].into_iter().collect());
    }

    #[test]
    fn allow_list_filters() {
        let got = disseminator().recipients(&known(), &[BOB], NOTARY);
        assert_eq!(got, [BOB].into_iter().collect());
    }

    #[test]
    fn allow_list_cannot_add_infrastructure_or_self() {
        let got = disseminator().recipients(&known(), &[ME, NOTARY, MAP, SECOND_NOTARY], NOTARY);
        assert!(got.is_empty());
    }

    #[test]
    fn allow_list_entries_must_be_known() {
        let stranger = PartyId([4; 32]);
        let got = disseminator().recipients(&known(), &[stranger, ALICE], NOTARY);
        assert_eq!(got, [ALICE].into_iter().collect());
    }

    #[test]
    fn notary_excluded_even_if_not_flagged() {
        let mut parties = known();
        parties.push(party(PartyId([6; 32]), PartyRole::Participant));
        let got = disseminator().recipients(&parties, &[], PartyId([6; 32]));
        assert_eq!(got, [ALICE, BOB].into_iter().collect());
    }

    #[test]
    fn report_merge_sorts() {
        let mut a = DeliveryReport {
            delivered: vec![BOB],
            failed: vec![],
        };
        a.merge(DeliveryReport {
            delivered: vec![ALICE],
            failed: vec![(NOTARY, PaperbidError::PeerUnreachable(NOTARY))],
        });
        assert_eq!(a.delivered, vec![ALICE, BOB]);
        assert!(!a.is_complete());
    }
}
