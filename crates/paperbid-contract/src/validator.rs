//! Transition validator entry point.
//!
//! Dispatches each declared command to its rule. An update is accepted only
//! if its command bundle is well-formed and every command's rule accepts it.

use paperbid_types::{Command, Intent, PaperbidError, ProposedUpdate, Result};

use crate::{auction, purchase};

/// Validate a proposed update.
///
/// Pure and deterministic: no clock, no storage, no signature checks
/// (signatures are verified by whoever collects them). The declared signer
/// sets are what the rules inspect.
///
/// # Errors
/// - `StructuralViolation` for a malformed command bundle or record shape
/// - `InvariantViolation` naming the failed business predicate
/// - `SignerViolation` naming the missing required signer
pub fn validate(update: &ProposedUpdate) -> Result<()> {
    let result = check_bundle(&update.commands).and_then(|()| {
        update
            .commands
            .iter()
            .try_for_each(|command| validate_command(update, command))
    });

    if let Err(err) = &result {
        tracing::debug!(
            update = %update.id(),
            intents = ?update.intents(),
            error = %err,
            "Update rejected by validator"
        );
    }
    result
}

/// Validate a single command against the update it is declared on.
pub fn validate_command(update: &ProposedUpdate, command: &Command) -> Result<()> {
    match command.intent {
        Intent::Start => auction::verify_start(update, &command.signers),
        Intent::End => auction::verify_end(update, &command.signers),
        Intent::AcceptBid => auction::verify_accept_bid(update, &command.signers),
        Intent::Create => purchase::verify_create(update, &command.signers),
    }
}

/// At least one command; at most one auction-lifecycle command and at most
/// one `Create`.
fn check_bundle(commands: &[Command]) -> Result<()> {
    if commands.is_empty() {
        return Err(PaperbidError::structural("update declares no intent"));
    }
    let lifecycle = commands
        .iter()
        .filter(|c| c.intent.is_auction_lifecycle())
        .count();
    if lifecycle > 1 {
        return Err(PaperbidError::structural(
            "update declares more than one auction intent",
        ));
    }
    if commands.len() - lifecycle > 1 {
        return Err(PaperbidError::structural(
            "update declares more than one purchase intent",
        ));
    }
    Ok(())
}
