//! In-process message fabric.
//!
//! Each connected party owns a bounded inbox. A request is an
//! [`Envelope`] pushed into the peer's inbox plus a one-shot reply; the
//! whole round-trip (queueing included) is bounded by a timeout.

use std::{collections::HashMap, sync::Arc, time::Duration};

use paperbid_types::{PaperbidError, PartyId, Result};
use tokio::sync::{RwLock, mpsc, oneshot};

use crate::messages::{Envelope, FlowMessage, Reply};

/// Receiving end of a party's inbox.
pub type Inbox = mpsc::Receiver<Envelope>;

/// Routing table from party to inbox. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct Network {
    routes: Arc<RwLock<HashMap<PartyId, mpsc::Sender<Envelope>>>>,
}

impl Network {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open an inbox for `party`, replacing any earlier one.
    pub async fn connect(&self, party: PartyId, capacity: usize) -> Inbox {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.routes.write().await.insert(party, tx);
        tracing::debug!(party = %party, capacity, "Party connected");
        rx
    }

    /// Drop the route to `party`. Pending senders see the peer as gone.
    pub async fn disconnect(&self, party: &PartyId) {
        if self.routes.write().await.remove(party).is_some() {
            tracing::debug!(party = %party, "Party disconnected");
        }
    }

    pub async fn is_connected(&self, party: &PartyId) -> bool {
        self.routes.read().await.contains_key(party)
    }

    /// Send a request to `to` and wait for its reply.
    ///
    /// # Errors
    /// - `PeerUnreachable` if `to` has no inbox or its inbox is closed
    /// - `Timeout { stage }` if no reply arrives within `timeout`
    /// - `ChannelClosed { stage }` if the peer dropped the reply channel
    /// - whatever error the peer replied with
    pub async fn request<T>(
        &self,
        from: PartyId,
        to: PartyId,
        stage: &str,
        timeout: Duration,
        make: impl FnOnce(Reply<T>) -> FlowMessage,
    ) -> Result<T> {
        let sender = self
            .routes
            .read()
            .await
            .get(&to)
            .cloned()
            .ok_or(PaperbidError::PeerUnreachable(to))?;

        let (reply, answer) = oneshot::channel();
        let message = make(reply);
        let kind = message.kind();

        let exchange = async {
            if sender.send(Envelope { from, message }).await.is_err() {
                return Err(PaperbidError::PeerUnreachable(to));
            }
            match answer.await {
                Ok(result) => result,
                Err(_) => Err(PaperbidError::ChannelClosed {
                    stage: stage.to_string(),
                }),
            }
        };

        match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(peer = %to, kind, stage, "Exchange timed out");
                Err(PaperbidError::timeout(stage))
            }
        }
    }
}
