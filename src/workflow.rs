use crate::{
    config::Chain,
    contract::{
        BREED_METHOD,
        ContractCall,
        ContractCaller,
        MINT_GENESIS_METHOD,
        PendingTransaction,
        SigningProvider,
        TxReceipt,
    },
    error::{
        TxStage,
        WorkflowError,
    },
    nft::TokenId,
    session::{
        Navigator,
        PageEvent,
        Route,
    },
};
use alloy::primitives::{
    TxHash,
    U256,
};
use color_eyre::eyre::{
    Report,
    Result,
    eyre,
};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
};
use tracing::{
    debug,
    error,
    info,
    warn,
};

#[cfg(test)]
mod tests;

/// Form entry meaning "no parent chosen".
pub const NO_PARENT: &str = "---";

/// Lifecycle of one user-initiated transaction.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum TxState {
    #[default]
    Idle,
    Submitting,
    Mining {
        tx_hash: TxHash,
    },
    Confirmed {
        tx_hash: TxHash,
    },
    Failed {
        error: WorkflowError,
    },
}

impl TxState {
    /// A transaction is in flight; new submits are rejected.
    pub fn is_busy(&self) -> bool {
        matches!(self, TxState::Submitting | TxState::Mining { .. })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TxState::Confirmed { .. } | TxState::Failed { .. })
    }

    pub fn can_transition_to(&self, next: &TxState) -> bool {
        matches!(
            (self, next),
            (TxState::Idle, TxState::Submitting)
                | (TxState::Submitting, TxState::Mining { .. })
                | (TxState::Submitting, TxState::Failed { .. })
                | (TxState::Mining { .. }, TxState::Confirmed { .. })
                | (TxState::Mining { .. }, TxState::Failed { .. })
                | (TxState::Confirmed { .. }, TxState::Idle)
                | (TxState::Failed { .. }, TxState::Idle)
        )
    }

    pub fn tx_hash(&self) -> Option<TxHash> {
        match self {
            TxState::Mining { tx_hash } | TxState::Confirmed { tx_hash } => Some(*tx_hash),
            _ => None,
        }
    }
}

/// Two parent choices from the breed form.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ParentSelection {
    pub parent1: Option<TokenId>,
    pub parent2: Option<TokenId>,
}

impl ParentSelection {
    pub fn new(parent1: TokenId, parent2: TokenId) -> Self {
        Self {
            parent1: Some(parent1),
            parent2: Some(parent2),
        }
    }

    /// Reads raw form values. The sentinel, blanks and unparseable ids count
    /// as no selection.
    pub fn from_form(parent1: &str, parent2: &str) -> Self {
        Self {
            parent1: parse_form_value(parent1),
            parent2: parse_form_value(parent2),
        }
    }

    pub fn validate(&self) -> Result<(TokenId, TokenId), WorkflowError> {
        match (self.parent1, self.parent2) {
            (Some(p1), Some(p2)) if p1 != p2 => Ok((p1, p2)),
            (Some(_), Some(_)) => Err(WorkflowError::PreconditionNotMet(
                "parents must be two different NFTs".to_string(),
            )),
            _ => Err(WorkflowError::PreconditionNotMet(
                "two parents must be selected".to_string(),
            )),
        }
    }
}

fn parse_form_value(raw: &str) -> Option<TokenId> {
    let raw = raw.trim();
    if raw.is_empty() || raw == NO_PARENT {
        return None;
    }
    raw.parse().ok()
}

/// What a workflow submits and where it goes once mined.
pub trait TxIntent: Send + Sync + 'static {
    type Input: Send + 'static;

    const LABEL: &'static str;

    fn prepare(&self, input: Self::Input) -> Result<ContractCall, WorkflowError>;

    fn on_confirmed<N: Navigator + ?Sized>(&self, navigator: &N);
}

/// `breed(parent1, parent2)`; lands on the dashboard when mined.
#[derive(Clone, Copy, Debug, Default)]
pub struct Breeding;

impl TxIntent for Breeding {
    type Input = ParentSelection;

    const LABEL: &'static str = "breed";

    fn prepare(&self, selection: ParentSelection) -> Result<ContractCall, WorkflowError> {
        let (parent1, parent2) = selection.validate().inspect_err(|err| {
            warn!(?selection, %err, "Incorrect parents");
        })?;
        Ok(ContractCall::new(
            BREED_METHOD,
            vec![parent1.as_u256(), parent2.as_u256()],
        ))
    }

    fn on_confirmed<N: Navigator + ?Sized>(&self, navigator: &N) {
        navigator.replace(Route::Dashboard);
    }
}

/// `mintGenesis(count)` paying `price` per NFT; returns home with the
/// minted banner.
#[derive(Clone, Copy, Debug)]
pub struct GenesisMint {
    pub count: u64,
    pub price: U256,
}

impl GenesisMint {
    pub fn payment(&self) -> U256 {
        self.price.saturating_mul(U256::from(self.count))
    }
}

impl TxIntent for GenesisMint {
    type Input = ();

    const LABEL: &'static str = "mint";

    fn prepare(&self, _input: ()) -> Result<ContractCall, WorkflowError> {
        Ok(
            ContractCall::new(MINT_GENESIS_METHOD, vec![U256::from(self.count)])
                .with_value(self.payment()),
        )
    }

    fn on_confirmed<N: Navigator + ?Sized>(&self, navigator: &N) {
        navigator.push(Route::Home, Some(PageEvent::Minted));
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum WorkflowEvent {
    State(TxState),
    /// Submit refused without touching the state.
    Rejected(WorkflowError),
}

pub enum WorkflowCommand<In> {
    Submit(In),
    Shutdown,
}

/// Drives one intent through the transaction lifecycle. Owned by a single
/// task, so an instance never races itself.
pub struct TxWorkflow<I, P, N> {
    intent: I,
    provider: P,
    navigator: N,
    chain: Chain,
    state: TxState,
    events: mpsc::UnboundedSender<WorkflowEvent>,
}

impl<I, P, N> TxWorkflow<I, P, N>
where
    I: TxIntent,
    P: SigningProvider,
    N: Navigator,
{
    pub fn new(
        intent: I,
        provider: P,
        navigator: N,
        chain: Chain,
        events: mpsc::UnboundedSender<WorkflowEvent>,
    ) -> Self {
        Self {
            intent,
            provider,
            navigator,
            chain,
            state: TxState::Idle,
            events,
        }
    }

    pub fn state(&self) -> &TxState {
        &self.state
    }

    /// Still observed by the page that started it.
    pub fn is_tracked(&self) -> bool {
        !self.events.is_closed()
    }

    pub async fn submit(&mut self, input: I::Input) -> Result<TxReceipt, WorkflowError> {
        if self.state.is_busy() {
            return Err(self.reject(WorkflowError::Busy));
        }
        if self.state.is_terminal() {
            self.transition(TxState::Idle);
        }
        let call = match self.intent.prepare(input) {
            Ok(call) => call,
            Err(err) => return Err(self.reject(err)),
        };
        if !self.provider.is_available() {
            return Err(self.reject(WorkflowError::ProviderUnavailable(
                "no signing provider in this environment".to_string(),
            )));
        }
        if self.provider.account().is_none() {
            return Err(self.reject(WorkflowError::PreconditionNotMet(
                "no wallet address".to_string(),
            )));
        }

        self.transition(TxState::Submitting);
        let caller = match self.provider.signer().await {
            Ok(caller) => caller,
            Err(report) => return Err(self.fail(TxStage::Signer, &report)),
        };
        info!(action = I::LABEL, method = call.method, "Initialize payment");
        let pending = match caller.call(call).await {
            Ok(pending) => pending,
            Err(report) => return Err(self.fail(TxStage::Submission, &report)),
        };
        let tx_hash = pending.tx_hash();
        self.transition(TxState::Mining { tx_hash });
        info!(action = I::LABEL, %tx_hash, "Mining... please wait");
        let receipt = match pending.wait().await {
            Ok(receipt) => receipt,
            Err(report) => return Err(self.fail(TxStage::Confirmation, &report)),
        };
        self.transition(TxState::Confirmed {
            tx_hash: receipt.tx_hash,
        });
        info!(
            action = I::LABEL,
            block = ?receipt.block_number,
            "Mined -- {}",
            self.chain.tx_url(receipt.tx_hash)
        );
        if self.is_tracked() {
            self.intent.on_confirmed(&self.navigator);
        } else {
            info!(action = I::LABEL, "page gone; skipping navigation");
        }
        Ok(receipt)
    }

    fn transition(&mut self, next: TxState) {
        debug_assert!(
            self.state.can_transition_to(&next),
            "illegal transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!(action = I::LABEL, from = ?self.state, to = ?next, "tx state");
        self.state = next.clone();
        let _ = self.events.send(WorkflowEvent::State(next));
    }

    fn fail(&mut self, stage: TxStage, report: &Report) -> WorkflowError {
        let err = WorkflowError::transaction(stage, report);
        error!(action = I::LABEL, %err, "transaction failed");
        self.transition(TxState::Failed { error: err.clone() });
        err
    }

    fn reject(&self, err: WorkflowError) -> WorkflowError {
        match &err {
            WorkflowError::ProviderUnavailable(_) => {
                error!(action = I::LABEL, %err, "submit aborted")
            }
            _ => warn!(action = I::LABEL, %err, "submit aborted"),
        }
        let _ = self.events.send(WorkflowEvent::Rejected(err.clone()));
        err
    }

    /// Serves commands until shutdown. Submits that arrive while a
    /// transaction is in flight are answered with `Busy`.
    pub async fn run(mut self, mut cmd_rx: mpsc::UnboundedReceiver<WorkflowCommand<I::Input>>) {
        let events = self.events.clone();
        while let Some(cmd) = cmd_rx.recv().await {
            let input = match cmd {
                WorkflowCommand::Submit(input) => input,
                WorkflowCommand::Shutdown => break,
            };
            let mut shutdown = false;
            {
                let attempt = self.submit(input);
                tokio::pin!(attempt);
                loop {
                    tokio::select! {
                        biased;
                        _ = &mut attempt => break,
                        cmd = cmd_rx.recv(), if !shutdown => match cmd {
                            Some(WorkflowCommand::Submit(_)) => {
                                warn!(action = I::LABEL, "submit while busy");
                                let _ = events.send(WorkflowEvent::Rejected(WorkflowError::Busy));
                            }
                            Some(WorkflowCommand::Shutdown) | None => shutdown = true,
                        },
                    }
                }
            }
            if shutdown {
                break;
            }
        }
        debug!(action = I::LABEL, "workflow task stopped");
    }
}

/// Command side of a spawned workflow.
pub struct WorkflowHandle<In> {
    commands: mpsc::UnboundedSender<WorkflowCommand<In>>,
    task: JoinHandle<()>,
}

impl<In> WorkflowHandle<In> {
    pub fn submit(&self, input: In) -> Result<()> {
        self.commands
            .send(WorkflowCommand::Submit(input))
            .map_err(|_| eyre!("workflow task has stopped"))
    }

    pub fn shutdown(&self) {
        let _ = self.commands.send(WorkflowCommand::Shutdown);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn join(self) -> Result<()> {
        self.task
            .await
            .map_err(|err| eyre!("workflow task panicked: {err}"))
    }
}

pub fn spawn_workflow<I, P, N>(
    intent: I,
    provider: P,
    navigator: N,
    chain: Chain,
) -> (WorkflowHandle<I::Input>, mpsc::UnboundedReceiver<WorkflowEvent>)
where
    I: TxIntent,
    P: SigningProvider,
    N: Navigator + 'static,
{
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let workflow = TxWorkflow::new(intent, provider, navigator, chain, event_tx);
    let task = tokio::spawn(workflow.run(cmd_rx));
    (
        WorkflowHandle {
            commands: cmd_tx,
            task,
        },
        event_rx,
    )
}
