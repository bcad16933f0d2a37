//! Ordering service (notary).
//!
//! Sole arbiter of which update consumes a record version. Like a UTXO
//! set, each [`StateRef`] can be consumed once; a second update consuming
//! it is rejected with [`PaperbidError::DoubleSpend`].
//!
//! ## Commit checks, in order
//!
//! 1. Already committed? Return the original receipt (at-most-once).
//! 2. Update names this notary.
//! 3. Inside its time window (`WindowNotOpen` before, `Timeout` after).
//! 4. Every required signer has a valid signature.
//! 5. No input already consumed.
//! 6. Every input is a version this service committed, with the same
//!    content (`InputMismatch` otherwise).
//!
//! Checks 1-6 and the marking of inputs happen under one `&mut self`, and
//! the service task handles one request at a time, so check-then-mark is
//! atomic.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use paperbid_types::{
    CommitReceipt, CommitSeq, LedgerRecord, PaperbidError, PartyId, PartyKeys, Result,
    SignedUpdate, StateRef, UpdateId,
};
use tokio::sync::{mpsc, oneshot};

/// Ordering service state.
#[derive(Debug)]
pub struct OrderingService {
    keys: PartyKeys,
    /// Consumed record version → the update that consumed it.
    consumed: HashMap<StateRef, UpdateId>,
    /// Committed outputs not yet consumed.
    unspent: HashMap<StateRef, LedgerRecord>,
    /// Receipts for every committed update.
    committed: HashMap<UpdateId, CommitReceipt>,
    last_sequence: CommitSeq,
}

impl OrderingService {
    #[must_use]
    pub fn new(keys: PartyKeys) -> Self {
        Self {
            keys,
            consumed: HashMap::new(),
            unspent: HashMap::new(),
            committed: HashMap::new(),
            last_sequence: CommitSeq(0),
        }
    }

    #[must_use]
    pub fn id(&self) -> PartyId {
        self.keys.id()
    }

    /// Commit a fully signed update at time `now`.
    ///
    /// # Errors
    /// - `StructuralViolation` if the update names another notary
    /// - `WindowNotOpen` / `Timeout` outside the time window
    /// - `SignatureInvalid` / `MissingSignature` for a bad signature set
    /// - `DoubleSpend` if any input was already consumed
    /// - `InputMismatch` if an input was never committed here or its
    ///   content differs from the committed version
    pub fn commit(&mut self, signed: &SignedUpdate, now: DateTime<Utc>) -> Result<CommitReceipt> {
        let id = signed.id();
        if let Some(receipt) = self.committed.get(&id) {
            tracing::debug!(update = %id, sequence = %receipt.sequence, "Resubmission of committed update");
            return Ok(receipt.clone());
        }

        let update = &signed.update;
        if update.notary != self.id() {
            return Err(PaperbidError::structural(
                "update names a different notary",
            ));
        }
        if now < update.time_window.from {
            return Err(PaperbidError::WindowNotOpen);
        }
        if now > update.time_window.until {
            return Err(PaperbidError::timeout("ordering"));
        }
        signed.verify_required_signatures()?;

        for input in &update.inputs {
            if let Some(consumed_by) = self.consumed.get(&input.state_ref) {
                tracing::info!(
                    update = %id,
                    state_ref = %input.state_ref,
                    consumed_by = %consumed_by,
                    "Double spend rejected"
                );
                return Err(PaperbidError::DoubleSpend {
                    state_ref: input.state_ref,
                    consumed_by: *consumed_by,
                });
            }
        }

        for input in &update.inputs {
            let reason = match self.unspent.get(&input.state_ref) {
                None => "never committed by this ordering service",
                Some(record) if *record != input.record => {
                    "record differs from the committed version"
                }
                Some(_) => continue,
            };
            tracing::warn!(update = %id, state_ref = %input.state_ref, reason, "Input rejected");
            return Err(PaperbidError::InputMismatch {
                state_ref: input.state_ref,
                reason: reason.into(),
            });
        }

        for input in &update.inputs {
            self.unspent.remove(&input.state_ref);
            self.consumed.insert(input.state_ref, id);
        }
        for output in update.output_states() {
            self.unspent.insert(output.state_ref, output.record);
        }
        self.last_sequence = self.last_sequence.next();

        let payload = CommitReceipt::signing_payload(id, self.last_sequence, self.id());
        let receipt = CommitReceipt {
            update: id,
            sequence: self.last_sequence,
            notary: self.id(),
            committed_at: now,
            signature: self.keys.sign(&payload),
        };
        self.committed.insert(id, receipt.clone());

        tracing::info!(
            update = %id,
            sequence = %receipt.sequence,
            inputs = update.inputs.len(),
            "Update committed"
        );
        Ok(receipt)
    }

    /// The update that consumed `state_ref`, if any.
    #[must_use]
    pub fn consumed_by(&self, state_ref: &StateRef) -> Option<UpdateId> {
        self.consumed.get(state_ref).copied()
    }

    #[must_use]
    pub fn receipt(&self, update: &UpdateId) -> Option<&CommitReceipt> {
        self.committed.get(update)
    }

    /// Number of committed updates.
    #[must_use]
    pub fn committed_count(&self) -> usize {
        self.committed.len()
    }

    /// Run the service on its own task.
    #[must_use]
    pub fn spawn(self, queue_capacity: usize) -> NotaryHandle {
        let id = self.id();
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        tokio::spawn(self.run(rx));
        tracing::info!(notary = %id, "Ordering service started");
        NotaryHandle { id, requests: tx }
    }

    async fn run(mut self, mut requests: mpsc::Receiver<NotaryRequest>) {
        while let Some(request) = requests.recv().await {
            match request {
                NotaryRequest::Commit { signed, reply } => {
                    let result = self.commit(&signed, Utc::now());
                    if reply.send(result).is_err() {
                        tracing::debug!(update = %signed.id(), "Submitter went away before the verdict");
                    }
                }
                NotaryRequest::ConsumedBy { state_ref, reply } => {
                    let _ = reply.send(self.consumed_by(&state_ref));
                }
                NotaryRequest::Receipt { update, reply } => {
                    let _ = reply.send(self.receipt(&update).cloned());
                }
            }
        }
        tracing::info!(notary = %self.id(), "Ordering service stopped");
    }
}

enum NotaryRequest {
    Commit {
        signed: Box<SignedUpdate>,
        reply: oneshot::Sender<Result<CommitReceipt>>,
    },
    ConsumedBy {
        state_ref: StateRef,
        reply: oneshot::Sender<Option<UpdateId>>,
    },
    Receipt {
        update: UpdateId,
        reply: oneshot::Sender<Option<CommitReceipt>>,
    },
}

/// Client side of a running ordering service. Cheap to clone.
#[derive(Debug, Clone)]
pub struct NotaryHandle {
    id: PartyId,
    requests: mpsc::Sender<NotaryRequest>,
}

impl std::fmt::Debug for NotaryRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Commit { signed, .. } => write!(f, "Commit({})", signed.id()),
            Self::ConsumedBy { state_ref, .. } => write!(f, "ConsumedBy({state_ref})"),
            Self::Receipt { update, .. } => write!(f, "Receipt({update})"),
        }
    }
}

impl NotaryHandle {
    #[must_use]
    pub fn id(&self) -> PartyId {
        self.id
    }

    /// Submit a fully signed update and wait for the verdict.
    ///
    /// Once this is called the update may commit even if the caller stops
    /// waiting.
    ///
    /// # Errors
    /// As [`OrderingService::commit`]; `ChannelClosed` if the service stopped.
    pub async fn submit(&self, signed: SignedUpdate) -> Result<CommitReceipt> {
        let (reply, verdict) = oneshot::channel();
        self.requests
            .send(NotaryRequest::Commit {
                signed: Box::new(signed),
                reply,
            })
            .await
            .map_err(|_| closed())?;
        verdict.await.map_err(|_| closed())?
    }

    /// Which update consumed `state_ref`, if any.
    pub async fn consumed_by(&self, state_ref: StateRef) -> Result<Option<UpdateId>> {
        let (reply, answer) = oneshot::channel();
        self.requests
            .send(NotaryRequest::ConsumedBy { state_ref, reply })
            .await
            .map_err(|_| closed())?;
        answer.await.map_err(|_| closed())
    }

    /// The receipt for `update`, if it has committed.
    ///
    /// Requests are served in submission order, so this reflects every
    /// submission this handle has already enqueued.
    pub async fn receipt(&self, update: UpdateId) -> Result<Option<CommitReceipt>> {
        let (reply, answer) = oneshot::channel();
        self.requests
            .send(NotaryRequest::Receipt { update, reply })
            .await
            .map_err(|_| closed())?;
        answer.await.map_err(|_| closed())
    }
}

fn closed() -> PaperbidError {
    PaperbidError::ChannelClosed {
        stage: "ordering".into(),
    }
}
