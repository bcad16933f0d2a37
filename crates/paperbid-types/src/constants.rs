//! System-wide constants for the Paperbid auction ledger.

/// Default commit window: how long a proposed update stays acceptable to
/// the ordering service after it is built.
pub const DEFAULT_COMMIT_WINDOW_SECS: i64 = 30;

/// Default timeout for a single counterparty round-trip
/// (identity reconciliation, signature request, finality delivery).
pub const DEFAULT_EXCHANGE_TIMEOUT_MS: u64 = 5_000;

/// Default timeout for one observer to acknowledge a disseminated update.
pub const DEFAULT_DELIVERY_TIMEOUT_MS: u64 = 2_000;

/// Default capacity of a node's inbound message queue.
pub const DEFAULT_INBOX_CAPACITY: usize = 256;

/// Default capacity of the ordering service's request queue.
pub const DEFAULT_ORDERING_QUEUE_CAPACITY: usize = 1_024;

/// Domain separator for update identifiers.
pub const UPDATE_ID_DOMAIN: &[u8] = b"paperbid:update:v1:";

/// Domain separator for commit receipt signatures.
pub const RECEIPT_DOMAIN: &[u8] = b"paperbid:receipt:v1:";
