//! Settlement attempt state machine.
//!
//! ```text
//!   ┌───────┐   ┌─────────────────┐   ┌────────────────────────┐   ┌────────┐
//!   │ BUILT ├──▶│ LOCALLY_VERIFIED├──▶│ COUNTERPARTY_RECONCILED├──▶│ SIGNED ├──┐
//!   └───┬───┘   └────────┬────────┘   └───────────┬────────────┘   └───┬────┘  │
//!       │                │                        │                    │       ▼
//!       │                │                        │                    │  ┌───────────┐   ┌──────────────┐
//!       │                │                        │                    │  │ COMMITTED ├──▶│ DISSEMINATED │
//!       │                │                        │                    │  └─────┬─────┘   └──────────────┘
//!       ▼                ▼                        ▼                    ▼        ▼
//!   ┌──────────────────────────────────────────────────────────────────────────────┐
//!   │                              ABORTED(reason)                                 │
//!   └──────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Transitions are strictly forward by one step; no step may be skipped.
//! `Aborted` is reachable from any non-terminal phase.

use std::fmt;

use paperbid_types::{PaperbidError, Result, UpdateId};

/// Where a settlement attempt currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementPhase {
    Built,
    LocallyVerified,
    CounterpartyReconciled,
    Signed,
    Committed,
    Disseminated,
    /// Terminal failure, carrying the reason.
    Aborted(PaperbidError),
}

impl SettlementPhase {
    fn rank(&self) -> Option<u8> {
        match self {
            Self::Built => Some(0),
            Self::LocallyVerified => Some(1),
            Self::CounterpartyReconciled => Some(2),
            Self::Signed => Some(3),
            Self::Committed => Some(4),
            Self::Disseminated => Some(5),
            Self::Aborted(_) => None,
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Disseminated | Self::Aborted(_))
    }

    /// Can this phase move to `target`?
    #[must_use]
    pub fn can_transition_to(&self, target: &Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self.rank(), target.rank()) {
            (_, None) => true,
            (Some(from), Some(to)) => to == from + 1,
            (None, Some(_)) => false,
        }
    }
}

impl fmt::Display for SettlementPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Built => write!(f, "BUILT"),
            Self::LocallyVerified => write!(f, "LOCALLY_VERIFIED"),
            Self::CounterpartyReconciled => write!(f, "COUNTERPARTY_RECONCILED"),
            Self::Signed => write!(f, "SIGNED"),
            Self::Committed => write!(f, "COMMITTED"),
            Self::Disseminated => write!(f, "DISSEMINATED"),
            Self::Aborted(_) => write!(f, "ABORTED"),
        }
    }
}

/// The phases one attempt has traversed, oldest first.
#[derive(Debug, Clone)]
pub struct PhaseTrail {
    update: UpdateId,
    phases: Vec<SettlementPhase>,
}

impl PhaseTrail {
    /// A new attempt for `update`, in `Built`.
    #[must_use]
    pub fn new(update: UpdateId) -> Self {
        Self {
            update,
            phases: vec![SettlementPhase::Built],
        }
    }

    #[must_use]
    pub fn current(&self) -> &SettlementPhase {
        // `phases` starts non-empty and only grows.
        &self.phases[self.phases.len() - 1]
    }

    /// Move to the next phase.
    ///
    /// # Errors
    /// Returns [`PaperbidError::InvalidTransition`] if `next` is not the
    /// immediate successor of the current phase.
    pub fn advance(&mut self, next: SettlementPhase) -> Result<()> {
        let current = self.current();
        if !current.can_transition_to(&next) {
            return Err(PaperbidError::InvalidTransition {
                from: current.to_string(),
                to: next.to_string(),
            });
        }
        tracing::debug!(update = %self.update, from = %current, to = %next, "Settlement phase");
        self.phases.push(next);
        Ok(())
    }

    /// Record an abort and hand the reason back to the caller.
    pub fn abort(&mut self, reason: PaperbidError) -> PaperbidError {
        if !self.current().is_terminal() {
            tracing::warn!(
                update = %self.update,
                phase = %self.current(),
                error = %reason,
                "Settlement aborted"
            );
            self.phases.push(SettlementPhase::Aborted(reason.clone()));
        }
        reason
    }

    /// Pass `result` through, aborting the attempt on error.
    pub fn check<T>(&mut self, result: Result<T>) -> Result<T> {
        result.map_err(|e| self.abort(e))
    }

    #[must_use]
    pub fn phases(&self) -> &[SettlementPhase] {
        &self.phases
    }

    #[must_use]
    pub fn into_phases(self) -> Vec<SettlementPhase> {
        self.phases
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HAPPY_PATH: [SettlementPhase; 5] = [
        SettlementPhase::LocallyVerified,
        SettlementPhase::CounterpartyReconciled,
        SettlementPhase::Signed,
        SettlementPhase::Committed,
        SettlementPhase::Disseminated,
    ];

    #[test]
    fn happy_path_in_order() {
        let mut trail = PhaseTrail::new(UpdateId([1; 32]));
        for phase in HAPPY_PATH {
            trail.advance(phase).unwrap();
        }
        assert_eq!(trail.phases().len(), 6);
        assert!(trail.current().is_terminal());
    }

    #[test]
    fn skipping_a_step_rejected() {
        let mut trail = PhaseTrail::new(UpdateId([1; 32]));
        let err = trail.advance(SettlementPhase::Signed).unwrap_err();
        assert_eq!(
            err,
            PaperbidError::InvalidTransition {
                from: "BUILT".into(),
                to: "SIGNED".into()
            }
        );
        assert_eq!(trail.current(), &SettlementPhase::Built);
    }

    #[test]
    fn going_backwards_rejected() {
        let mut trail = PhaseTrail::new(UpdateId([1; 32]));
        trail.advance(SettlementPhase::LocallyVerified).unwrap();
        assert!(trail.advance(SettlementPhase::Built).is_err());
        assert!(trail.advance(SettlementPhase::LocallyVerified).is_err());
    }

    #[test]
    fn abort_from_any_open_phase() {
        for steps in 0..HAPPY_PATH.len() {
            let mut trail = PhaseTrail::new(UpdateId([1; 32]));
            for phase in HAPPY_PATH.iter().take(steps) {
                trail.advance(phase.clone()).unwrap();
            }
            let reason = PaperbidError::timeout("ordering");
            assert_eq!(trail.abort(reason.clone()), reason);
            assert_eq!(trail.current(), &SettlementPhase::Aborted(reason));
        }
    }

    #[test]
    fn terminal_phases_are_final() {
        let mut trail = PhaseTrail::new(UpdateId([1; 32]));
        trail.abort(PaperbidError::WindowNotOpen);
        assert!(trail.advance(SettlementPhase::LocallyVerified).is_err());
        // A second abort does not append another entry.
        trail.abort(PaperbidError::WindowNotOpen);
        assert_eq!(trail.phases().len(), 2);
    }

    #[test]
    fn check_aborts_on_error() {
        let mut trail = PhaseTrail::new(UpdateId([1; 32]));
        assert_eq!(trail.check(Ok::<_, PaperbidError>(7)).unwrap(), 7);
        let err = trail
            .check::<()>(Err(PaperbidError::invariant("amount below highest bid")))
            .unwrap_err();
        assert!(err.is_local_rejection());
        assert!(matches!(trail.current(), SettlementPhase::Aborted(_)));
    }
}
