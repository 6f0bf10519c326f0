//! Explicit state machine for multi-step ledger mutations.
//!
//! Storage offers single-row atomicity only, so an operation that writes a
//! balance, an audit entry and possibly a side record runs as a saga:
//!
//! ```text
//! Validated -> BalanceUpdated -> LogWritten -> SideRecordWritten -> Committed
//!                    |               |               |
//!                    +---------------+---------------+--> Reverting -> Reverted
//! ```
//!
//! `LogWritten -> Committed` skips the side record for operations that have
//! none. `BalanceUpdated -> SideRecordWritten` is the manual-fund audit-gap
//! path, where the log write failed but the balance change is kept.

use serde::Serialize;

use super::error::LedgerError;

/// State of an operation saga.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SagaState {
    /// Input validated, nothing written.
    Validated,
    /// Balance row(s) written.
    BalanceUpdated,
    /// Audit entry written.
    LogWritten,
    /// Manual fund record written.
    SideRecordWritten,
    /// Operation complete.
    Committed,
    /// Undoing earlier steps.
    Reverting,
    /// Earlier steps undone.
    Reverted,
}

impl SagaState {
    /// Returns true if `next` may follow `self`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Validated, Self::BalanceUpdated)
                | (
                    Self::BalanceUpdated,
                    Self::LogWritten | Self::SideRecordWritten | Self::Reverting
                )
                | (
                    Self::LogWritten,
                    Self::SideRecordWritten | Self::Committed | Self::Reverting
                )
                | (Self::SideRecordWritten, Self::Committed | Self::Reverting)
                | (Self::Reverting, Self::Reverted)
        )
    }

    /// Returns true for states no transition leaves.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::Reverted)
    }
}

/// A write step that can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SagaStep {
    /// Writing a balance row.
    BalanceUpdate,
    /// Writing the audit entry.
    LogWrite,
    /// Writing the manual fund record.
    SideRecordWrite,
}

impl std::fmt::Display for SagaStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::BalanceUpdate => "balance update",
            Self::LogWrite => "log write",
            Self::SideRecordWrite => "side record write",
        })
    }
}

/// Tracks one operation through its states.
#[derive(Debug, Clone)]
pub struct OperationSaga {
    operation: &'static str,
    trace: Vec<SagaState>,
}

impl OperationSaga {
    /// Starts a saga in `Validated`.
    #[must_use]
    pub fn start(operation: &'static str) -> Self {
        Self {
            operation,
            trace: vec![SagaState::Validated],
        }
    }

    /// Operation name.
    #[must_use]
    pub const fn operation(&self) -> &'static str {
        self.operation
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SagaState {
        self.trace
            .last()
            .copied()
            .unwrap_or(SagaState::Validated)
    }

    /// Every state visited so far, oldest first.
    #[must_use]
    pub fn trace(&self) -> &[SagaState] {
        &self.trace
    }

    /// Moves to `next`.
    ///
    /// # Errors
    ///
    /// Returns `IllegalTransition` if `next` may not follow the current state.
    pub fn advance(&mut self, next: SagaState) -> Result<(), LedgerError> {
        let current = self.state();
        if !current.can_transition_to(next) {
            return Err(LedgerError::IllegalTransition {
                operation: self.operation,
                from: current,
                to: next,
            });
        }
        tracing::trace!(operation = self.operation, from = ?current, to = ?next, "saga transition");
        self.trace.push(next);
        Ok(())
    }

    /// Moves to `Committed` and returns the trace.
    ///
    /// # Errors
    ///
    /// Returns `IllegalTransition` if the saga cannot commit from its state.
    pub fn commit(mut self) -> Result<Vec<SagaState>, LedgerError> {
        self.advance(SagaState::Committed)?;
        Ok(self.trace)
    }
}
