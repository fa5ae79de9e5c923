use crate::{
    contract::{
        ContractCall,
        ContractCaller,
        PendingTransaction,
        SigningProvider,
        TxReceipt,
    },
    indexer::NftIndexer,
    nft::{
        ContractSummary,
        OwnedNft,
    },
    session::{
        NavRequest,
        Navigator,
        PageEvent,
        Route,
    },
};
use alloy::primitives::{
    Address,
    TxHash,
};
use color_eyre::eyre::{
    Result,
    eyre,
};
use std::sync::{
    Arc,
    Mutex,
};
use tokio::sync::Notify;

/// In-memory indexer. A lookup that was never given data fails.
#[derive(Clone, Debug, Default)]
pub struct FakeIndexer {
    owned: Option<Vec<OwnedNft>>,
    collection: Option<Vec<OwnedNft>>,
    contracts: Option<Vec<ContractSummary>>,
    owner_calls: Arc<Mutex<Vec<Address>>>,
}

impl FakeIndexer {
    pub fn owning(mut self, owned: Vec<OwnedNft>) -> Self {
        self.owned = Some(owned);
        self
    }

    pub fn with_collection(mut self, collection: Vec<OwnedNft>) -> Self {
        self.collection = Some(collection);
        self
    }

    pub fn with_contracts(mut self, contracts: Vec<ContractSummary>) -> Self {
        self.contracts = Some(contracts);
        self
    }

    pub fn owner_calls(&self) -> Vec<Address> {
        self.owner_calls.lock().unwrap().clone()
    }
}

impl NftIndexer for FakeIndexer {
    async fn nfts_for_owner(&self, owner: &Address) -> Result<Vec<OwnedNft>> {
        self.owner_calls.lock().unwrap().push(*owner);
        self.owned.clone().ok_or_else(|| eyre!("indexer down"))
    }

    async fn nfts_for_contract(&self, _contract: &str) -> Result<Vec<OwnedNft>> {
        self.collection.clone().ok_or_else(|| eyre!("indexer down"))
    }

    async fn contracts_for_owner(&self, _owner: &Address) -> Result<Vec<ContractSummary>> {
        self.contracts.clone().ok_or_else(|| eyre!("indexer down"))
    }
}

/// Navigator that remembers every request it was given.
#[derive(Clone, Debug, Default)]
pub struct RecordingNavigator {
    requests: Arc<Mutex<Vec<NavRequest>>>,
}

impl RecordingNavigator {
    pub fn requests(&self) -> Vec<NavRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn replace(&self, route: Route) {
        self.requests.lock().unwrap().push(NavRequest::Replace(route));
    }

    fn push(&self, route: Route, event: Option<PageEvent>) {
        self.requests.lock().unwrap().push(NavRequest::Push(route, event));
    }
}

#[derive(Clone, Debug, Default)]
enum Outcome {
    #[default]
    Mined,
    Reverted,
}

/// Scriptable signing provider. Connected and succeeding unless told
/// otherwise.
#[derive(Clone, Debug)]
pub struct FakeSigningProvider {
    available: bool,
    account: Option<Address>,
    signer_error: Option<String>,
    call_error: Option<String>,
    outcome: Outcome,
    gate: Option<Arc<Notify>>,
    calls: Arc<Mutex<Vec<ContractCall>>>,
}

impl Default for FakeSigningProvider {
    fn default() -> Self {
        Self::connected()
    }
}

impl FakeSigningProvider {
    pub fn connected() -> Self {
        Self {
            available: true,
            account: Some(Address::repeat_byte(0xaa)),
            signer_error: None,
            call_error: None,
            outcome: Outcome::default(),
            gate: None,
            calls: Arc::default(),
        }
    }

    pub fn without_endpoint(mut self) -> Self {
        self.available = false;
        self
    }

    pub fn without_account(mut self) -> Self {
        self.account = None;
        self
    }

    pub fn failing_signer(mut self, reason: &str) -> Self {
        self.signer_error = Some(reason.to_string());
        self
    }

    pub fn failing_call(mut self, reason: &str) -> Self {
        self.call_error = Some(reason.to_string());
        self
    }

    pub fn reverting(mut self) -> Self {
        self.outcome = Outcome::Reverted;
        self
    }

    /// Confirmation waits until `gate` is notified.
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Every call that reached the contract, in order.
    pub fn calls(&self) -> Vec<ContractCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl SigningProvider for FakeSigningProvider {
    type Caller = FakeCaller;

    fn is_available(&self) -> bool {
        self.available
    }

    fn account(&self) -> Option<Address> {
        self.account
    }

    async fn signer(&self) -> Result<FakeCaller> {
        if let Some(reason) = &self.signer_error {
            return Err(eyre!("{reason}"));
        }
        Ok(FakeCaller {
            provider: self.clone(),
        })
    }
}

pub struct FakeCaller {
    provider: FakeSigningProvider,
}

impl ContractCaller for FakeCaller {
    type Pending = FakePending;

    async fn call(&self, call: ContractCall) -> Result<FakePending> {
        if let Some(reason) = &self.provider.call_error {
            return Err(eyre!("{reason}"));
        }
        let tx_hash = {
            let mut calls = self.provider.calls.lock().unwrap();
            calls.push(call);
            TxHash::repeat_byte(calls.len() as u8)
        };
        Ok(FakePending {
            tx_hash,
            outcome: self.provider.outcome.clone(),
            gate: self.provider.gate.clone(),
        })
    }
}

pub struct FakePending {
    tx_hash: TxHash,
    outcome: Outcome,
    gate: Option<Arc<Notify>>,
}

impl PendingTransaction for FakePending {
    fn tx_hash(&self) -> TxHash {
        self.tx_hash
    }

    async fn wait(self) -> Result<TxReceipt> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        match self.outcome {
            Outcome::Mined => Ok(TxReceipt {
                tx_hash: self.tx_hash,
                block_number: Some(1),
            }),
            Outcome::Reverted => Err(eyre!("transaction {} reverted", self.tx_hash)),
        }
    }
}
