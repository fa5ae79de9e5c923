use std::fmt;

/// Step of a transaction attempt at which it failed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TxStage {
    Signer,
    Submission,
    Confirmation,
}

impl fmt::Display for TxStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TxStage::Signer => "signer acquisition",
            TxStage::Submission => "submission",
            TxStage::Confirmation => "confirmation",
        };
        write!(f, "{name}")
    }
}

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum WorkflowError {
    /// Invalid input for the action; the submit is a no-op.
    #[error("precondition not met: {0}")]
    PreconditionNotMet(String),
    /// No signing provider exists in this environment at all.
    #[error("signing provider unavailable: {0}")]
    ProviderUnavailable(String),
    #[error("transaction failed during {stage}: {reason}")]
    TransactionFailed { stage: TxStage, reason: String },
    #[error("a transaction is already in flight")]
    Busy,
}

impl WorkflowError {
    pub fn transaction(stage: TxStage, report: &color_eyre::eyre::Report) -> Self {
        WorkflowError::TransactionFailed {
            stage,
            reason: format!("{report:#}"),
        }
    }

    /// Message shown to the player. Only transaction failures are surfaced;
    /// the other kinds stay in the log.
    pub fn user_message(&self) -> Option<&'static str> {
        match self {
            WorkflowError::TransactionFailed { .. } => {
                Some("Something went wrong! Try again.")
            }
            _ => None,
        }
    }
}
