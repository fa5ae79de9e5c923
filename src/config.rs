use crate::wallet;
use alloy::primitives::{
    Address,
    U256,
    utils::parse_ether,
};
use clap::{
    Parser,
    ValueEnum,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use std::{
    fmt,
    path::PathBuf,
    str::FromStr,
};
use url::Url;

pub const DEFAULT_ABI_PATH: &str = "contracts/AlchemonNft.json";
pub const DEFAULT_MINT_PRICE: &str = "0.005";
pub const DEFAULT_LOG_DIR: &str = "logs";

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, ValueEnum)]
pub enum Chain {
    Mainnet,
    #[default]
    Goerli,
    Sepolia,
}

impl Chain {
    pub fn id(self) -> u64 {
        match self {
            Chain::Mainnet => 1,
            Chain::Goerli => 5,
            Chain::Sepolia => 11_155_111,
        }
    }

    /// Network slug used in Alchemy hostnames.
    pub fn alchemy_network(self) -> &'static str {
        match self {
            Chain::Mainnet => "eth-mainnet",
            Chain::Goerli => "eth-goerli",
            Chain::Sepolia => "eth-sepolia",
        }
    }

    pub fn alchemy_rpc_url(self, api_key: &str) -> Result<Url> {
        let raw = format!("https://{}.g.alchemy.com/v2/{api_key}", self.alchemy_network());
        Url::parse(&raw).wrap_err("failed to build Alchemy RPC URL")
    }

    pub fn explorer(self) -> &'static str {
        match self {
            Chain::Mainnet => "https://etherscan.io",
            Chain::Goerli => "https://goerli.etherscan.io",
            Chain::Sepolia => "https://sepolia.etherscan.io",
        }
    }

    pub fn tx_url(self, tx_hash: impl fmt::Display) -> String {
        format!("{}/tx/{tx_hash}", self.explorer())
    }

    pub fn address_url(self, address: impl fmt::Display) -> String {
        format!("{}/address/{address}", self.explorer())
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Chain::Mainnet => "Mainnet",
            Chain::Goerli => "Goerli",
            Chain::Sepolia => "Sepolia",
        };
        write!(f, "{name}")
    }
}

/// Which media URL of an NFT gets rendered.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, ValueEnum)]
pub enum MediaField {
    #[default]
    Raw,
    Gateway,
}

#[derive(Parser, Debug)]
#[command(
    name = "alchemon",
    version,
    about = "Terminal client for the Alchemon NFT breeding game"
)]
pub struct Cli {
    /// Alchemy API key used for NFT lookups and the default RPC endpoint
    #[arg(long, env = "ALCHEMY_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Address of the deployed Alchemon contract
    #[arg(long, env = "ALCHEMON_CONTRACT")]
    pub contract: String,

    #[arg(long, env = "ALCHEMON_CHAIN", value_enum, default_value_t = Chain::Goerli)]
    pub chain: Chain,

    /// Override the RPC endpoint derived from the API key
    #[arg(long, env = "ALCHEMON_RPC_URL")]
    pub rpc_url: Option<Url>,

    /// Contract ABI, either a build artifact with an `abi` field or a bare ABI array
    #[arg(long, default_value = DEFAULT_ABI_PATH)]
    pub abi: PathBuf,

    /// Keystore directory (defaults to ~/.alchemon/wallets)
    #[arg(long)]
    pub wallet_dir: Option<String>,

    /// Keystore to unlock before the UI starts
    #[arg(long)]
    pub wallet: Option<String>,

    #[arg(long, value_enum, default_value_t = MediaField::Raw)]
    pub media: MediaField,

    /// Ether attached to a genesis mint
    #[arg(long, default_value = DEFAULT_MINT_PRICE)]
    pub mint_price: String,

    #[arg(long, default_value_t = 1)]
    pub mint_count: u64,

    #[arg(long, default_value = DEFAULT_LOG_DIR)]
    pub log_dir: PathBuf,

    #[arg(
        long = "private-key",
        env = "ALCHEMON_PRIVATE_KEY",
        hide = true,
        hide_env_values = true
    )]
    pub private_key: Option<String>,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub api_key: Option<String>,
    pub contract: Address,
    pub chain: Chain,
    pub rpc_url: Option<Url>,
    pub abi_path: PathBuf,
    pub wallet_dir: PathBuf,
    pub wallet: Option<String>,
    pub media: MediaField,
    pub mint_price: U256,
    pub mint_count: u64,
    pub log_dir: PathBuf,
    pub private_key: Option<String>,
}

impl AppConfig {
    pub fn from_cli(cli: Cli) -> Result<Self> {
        let contract = Address::from_str(cli.contract.trim()).map_err(|e| {
            eyre!("invalid contract address '{}': {e}", cli.contract)
        })?;
        let api_key = cli.api_key.filter(|key| !key.trim().is_empty());
        let rpc_url = match (cli.rpc_url, api_key.as_deref()) {
            (Some(url), _) => Some(url),
            (None, Some(key)) => Some(cli.chain.alchemy_rpc_url(key)?),
            (None, None) => None,
        };
        let mint_price = parse_ether(&cli.mint_price)
            .map_err(|e| eyre!("invalid mint price '{}': {e}", cli.mint_price))?;
        if cli.mint_count == 0 {
            return Err(eyre!("--mint-count must be at least 1"));
        }
        let wallet_dir = wallet::resolve_wallet_dir(cli.wallet_dir.as_deref())?;

        Ok(Self {
            api_key,
            contract,
            chain: cli.chain,
            rpc_url,
            abi_path: cli.abi,
            wallet_dir,
            wallet: cli.wallet,
            media: cli.media,
            mint_price,
            mint_count: cli.mint_count,
            log_dir: cli.log_dir,
            private_key: cli.private_key.filter(|key| !key.trim().is_empty()),
        })
    }
}
