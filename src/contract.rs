use crate::{
    config::Chain,
    wallet::SignerSlot,
};
use alloy::{
    contract::{
        ContractInstance,
        Interface,
    },
    dyn_abi::DynSolValue,
    json_abi::JsonAbi,
    network::{
        Ethereum,
        EthereumWallet,
    },
    primitives::{
        Address,
        TxHash,
        U256,
    },
    providers::{
        DynProvider,
        PendingTransactionBuilder,
        Provider,
        ProviderBuilder,
    },
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use serde::Deserialize;
use std::{
    fs,
    path::Path,
    sync::Arc,
};
use tracing::debug;
use url::Url;

pub const BREED_METHOD: &str = "breed";
pub const MINT_GENESIS_METHOD: &str = "mintGenesis";

/// Address and ABI of the game contract. Loaded once, shared read-only.
#[derive(Clone, Debug)]
pub struct ContractBinding {
    address: Address,
    abi: JsonAbi,
}

#[derive(Deserialize)]
struct ArtifactDto {
    abi: JsonAbi,
}

impl ContractBinding {
    pub fn new(address: Address, abi: JsonAbi) -> Result<Self> {
        for method in [BREED_METHOD, MINT_GENESIS_METHOD] {
            if abi.function(method).is_none() {
                return Err(eyre!("contract ABI has no `{method}` function"));
            }
        }
        Ok(Self { address, abi })
    }

    pub fn load(address: Address, abi_path: &Path) -> Result<Self> {
        let bytes = fs::read(abi_path).wrap_err_with(|| {
            format!("failed to read contract ABI at {}", abi_path.display())
        })?;
        let abi = parse_abi(&bytes).wrap_err_with(|| {
            format!("invalid contract ABI at {}", abi_path.display())
        })?;
        Self::new(address, abi)
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn abi(&self) -> &JsonAbi {
        &self.abi
    }
}

/// Accepts a build artifact (`{"abi": [...], ...}`) or a bare ABI array.
pub fn parse_abi(bytes: &[u8]) -> Result<JsonAbi> {
    if let Ok(artifact) = serde_json::from_slice::<ArtifactDto>(bytes) {
        return Ok(artifact.abi);
    }
    serde_json::from_slice::<JsonAbi>(bytes).wrap_err("not an ABI array or artifact")
}

/// A single state-changing contract call with integer arguments.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ContractCall {
    pub method: &'static str,
    pub args: Vec<U256>,
    pub value: Option<U256>,
}

impl ContractCall {
    pub fn new(method: &'static str, args: Vec<U256>) -> Self {
        Self {
            method,
            args,
            value: None,
        }
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = Some(value);
        self
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TxReceipt {
    pub tx_hash: TxHash,
    pub block_number: Option<u64>,
}

/// Handle to a submitted transaction.
pub trait PendingTransaction: Send {
    fn tx_hash(&self) -> TxHash;

    /// Resolves once the transaction is mined; errors if it reverted. No timeout.
    fn wait(self) -> impl Future<Output = Result<TxReceipt>> + Send;
}

pub trait ContractCaller: Send + Sync {
    type Pending: PendingTransaction;

    fn call(&self, call: ContractCall) -> impl Future<Output = Result<Self::Pending>> + Send;
}

/// Source of signing capability for contract calls.
pub trait SigningProvider: Send + Sync + 'static {
    type Caller: ContractCaller;

    /// False when the environment has no provider at all, as opposed to a
    /// provider whose wallet is locked.
    fn is_available(&self) -> bool;

    /// Address that would sign, if a wallet is connected.
    fn account(&self) -> Option<Address>;

    fn signer(&self) -> impl Future<Output = Result<Self::Caller>> + Send;
}

/// JSON-RPC signing provider backed by the connected session's key.
#[derive(Clone, Debug)]
pub struct RpcSigningProvider {
    rpc_url: Option<Url>,
    chain: Chain,
    binding: Arc<ContractBinding>,
    signer: SignerSlot,
}

impl RpcSigningProvider {
    pub fn new(
        rpc_url: Option<Url>,
        chain: Chain,
        binding: Arc<ContractBinding>,
        signer: SignerSlot,
    ) -> Self {
        Self {
            rpc_url,
            chain,
            binding,
            signer,
        }
    }
}

impl SigningProvider for RpcSigningProvider {
    type Caller = RpcContractCaller;

    fn is_available(&self) -> bool {
        self.rpc_url.is_some()
    }

    fn account(&self) -> Option<Address> {
        self.signer.current().map(|signer| signer.address())
    }

    async fn signer(&self) -> Result<RpcContractCaller> {
        let url = self
            .rpc_url
            .clone()
            .ok_or_else(|| eyre!("no RPC endpoint configured"))?;
        let signer = self
            .signer
            .current()
            .ok_or_else(|| eyre!("wallet is not connected"))?;
        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect_http(url)
            .erased();
        let chain_id = provider
            .get_chain_id()
            .await
            .wrap_err("failed to query chain id from RPC endpoint")?;
        if chain_id != self.chain.id() {
            return Err(eyre!(
                "RPC endpoint is on chain {chain_id}, expected {} ({})",
                self.chain.id(),
                self.chain
            ));
        }
        Ok(RpcContractCaller {
            provider,
            binding: self.binding.clone(),
        })
    }
}

pub struct RpcContractCaller {
    provider: DynProvider,
    binding: Arc<ContractBinding>,
}

impl ContractCaller for RpcContractCaller {
    type Pending = RpcPendingTransaction;

    async fn call(&self, call: ContractCall) -> Result<RpcPendingTransaction> {
        let instance: ContractInstance<DynProvider, Ethereum> = ContractInstance::new(
            self.binding.address(),
            self.provider.clone(),
            Interface::new(self.binding.abi().clone()),
        );
        let args: Vec<DynSolValue> = call
            .args
            .iter()
            .map(|arg| DynSolValue::Uint(*arg, 256))
            .collect();
        let mut builder = instance
            .function(call.method, &args)
            .wrap_err_with(|| format!("failed to encode `{}` call", call.method))?;
        if let Some(value) = call.value {
            builder = builder.value(value);
        }
        debug!(method = call.method, ?call.args, ?call.value, "sending contract call");
        let pending = builder
            .send()
            .await
            .wrap_err_with(|| format!("`{}` call was not accepted", call.method))?;
        Ok(RpcPendingTransaction { inner: pending })
    }
}

pub struct RpcPendingTransaction {
    inner: PendingTransactionBuilder<Ethereum>,
}

impl PendingTransaction for RpcPendingTransaction {
    fn tx_hash(&self) -> TxHash {
        *self.inner.tx_hash()
    }

    async fn wait(self) -> Result<TxReceipt> {
        let receipt = self
            .inner
            .get_receipt()
            .await
            .wrap_err("failed while waiting for transaction receipt")?;
        if !receipt.status() {
            return Err(eyre!("transaction {} reverted", receipt.transaction_hash));
        }
        Ok(TxReceipt {
            tx_hash: receipt.transaction_hash,
            block_number: receipt.block_number,
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    const ABI: &str = include_str!("../contracts/AlchemonNft.json");

    #[test]
    fn parse_abi__reads_build_artifact() {
        let abi = parse_abi(ABI.as_bytes()).unwrap();
        assert!(abi.function(BREED_METHOD).is_some());
        assert!(abi.function(MINT_GENESIS_METHOD).is_some());
    }

    #[test]
    fn parse_abi__reads_bare_array() {
        let bare = r#"[
            {"type":"function","name":"breed","stateMutability":"nonpayable",
             "inputs":[{"name":"parent1","type":"uint256"},{"name":"parent2","type":"uint256"}],
             "outputs":[]},
            {"type":"function","name":"mintGenesis","stateMutability":"payable",
             "inputs":[{"name":"count","type":"uint256"}],"outputs":[]}
        ]"#;
        let abi = parse_abi(bare.as_bytes()).unwrap();
        let binding = ContractBinding::new(Address::ZERO, abi).unwrap();
        assert_eq!(binding.address(), Address::ZERO);
    }

    #[test]
    fn new__rejects_abi_without_game_methods() {
        let abi = parse_abi(b"[]").unwrap();
        let err = ContractBinding::new(Address::ZERO, abi).unwrap_err();
        assert!(err.to_string().contains("breed"));
    }

    #[test]
    fn load__reports_missing_file() {
        let err = ContractBinding::load(Address::ZERO, Path::new("/nope/abi.json"))
            .unwrap_err();
        assert!(format!("{err:#}").contains("failed to read contract ABI"));
    }

    #[test]
    fn rpc_signing_provider__unavailable_without_endpoint() {
        let binding =
            Arc::new(ContractBinding::new(Address::ZERO, parse_abi(ABI.as_bytes()).unwrap()).unwrap());
        let provider =
            RpcSigningProvider::new(None, Chain::Goerli, binding.clone(), SignerSlot::default());
        assert!(!provider.is_available());

        let url = Url::parse("http://localhost:8545").unwrap();
        let provider =
            RpcSigningProvider::new(Some(url), Chain::Goerli, binding, SignerSlot::default());
        assert!(provider.is_available());
    }

    #[tokio::test]
    async fn signer__fails_while_wallet_locked() {
        let binding =
            Arc::new(ContractBinding::new(Address::ZERO, parse_abi(ABI.as_bytes()).unwrap()).unwrap());
        let url = Url::parse("http://localhost:8545").unwrap();
        let provider =
            RpcSigningProvider::new(Some(url), Chain::Goerli, binding, SignerSlot::default());
        assert_eq!(provider.account(), None);
        let err = provider.signer().await.err().unwrap();
        assert!(err.to_string().contains("not connected"));
    }

    #[test]
    fn contract_call__attaches_value() {
        let call = ContractCall::new(MINT_GENESIS_METHOD, vec![U256::from(1u64)])
            .with_value(U256::from(5u64));
        assert_eq!(call.value, Some(U256::from(5u64)));
        assert_eq!(call.args, vec![U256::from(1u64)]);
    }
}
