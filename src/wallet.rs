use crate::session::WalletSession;
use alloy::{
    primitives::Address,
    signers::local::{
        MnemonicBuilder,
        PrivateKeySigner,
        coins_bip39::English,
    },
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use eth_keystore::decrypt_key;
use rpassword::prompt_password;
use std::{
    fmt,
    fs,
    path::{
        Path,
        PathBuf,
    },
    sync::{
        Arc,
        Mutex,
    },
};
use tokio::sync::watch;
use tracing::{
    debug,
    info,
    warn,
};

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WalletDescriptor {
    pub name: String,
    pub path: PathBuf,
}

impl WalletDescriptor {
    pub fn new(name: impl Into<String>, path: PathBuf) -> Self {
        Self {
            name: name.into(),
            path,
        }
    }
}

pub fn default_wallet_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").wrap_err("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".alchemon").join("wallets"))
}

pub fn resolve_wallet_dir(dir: Option<&str>) -> Result<PathBuf> {
    match dir {
        Some(raw) => {
            let expanded = shellexpand::tilde(raw);
            Ok(PathBuf::from(expanded.into_owned()))
        }
        None => default_wallet_dir(),
    }
}

pub const KEYSTORE_EXTENSION: &str = "json";

/// Lists `*.json` keystore files sorted by name, skipping hidden ones.
pub fn list_wallets(dir: &Path) -> Result<Vec<WalletDescriptor>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut wallets = Vec::new();
    for entry in fs::read_dir(dir).wrap_err("Failed to read wallet directory")? {
        let entry = entry.wrap_err("Failed to read wallet entry")?;
        let path = entry.path();
        if !path.is_file()
            || path.extension().and_then(|ext| ext.to_str()) != Some(KEYSTORE_EXTENSION)
        {
            continue;
        }
        let name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| eyre!("Invalid wallet filename {:?}", path))?
            .to_owned();
        if name.starts_with('.') {
            continue;
        }
        wallets.push(WalletDescriptor::new(name, path));
    }
    wallets.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(wallets)
}

pub fn find_wallet(dir: &Path, name: &str) -> Result<WalletDescriptor> {
    let wallets = list_wallets(dir)?;
    wallets
        .into_iter()
        .find(|w| w.name == name)
        .ok_or_else(|| eyre!("Wallet '{name}' not found in {}", dir.to_string_lossy()))
}

/// Decrypts a keystore holding either a raw secp256k1 key or a mnemonic.
pub fn unlock_keystore(
    descriptor: &WalletDescriptor,
    password: &str,
) -> Result<PrivateKeySigner> {
    let secret = decrypt_key(&descriptor.path, password.as_bytes())
        .map_err(|_| eyre!("Invalid password for wallet '{}'", descriptor.name))?;

    if let Ok(signer) = PrivateKeySigner::from_slice(&secret) {
        return Ok(signer);
    }

    if let Ok(mnemonic) = std::str::from_utf8(&secret) {
        let word_count = mnemonic.split_whitespace().count();
        if word_count >= 12 {
            let signer = MnemonicBuilder::<English>::default()
                .phrase(mnemonic.trim())
                .index(0u32)?
                .build()?;
            return Ok(signer);
        }
    }

    Err(eyre!(
        "Wallet '{}' contained unsupported key material",
        descriptor.name
    ))
}

/// Terminal prompt used before the UI takes over the screen.
pub fn prompt_unlock(descriptor: &WalletDescriptor) -> Result<PrivateKeySigner> {
    let prompt = format!("Enter password for wallet '{}': ", descriptor.name);
    let password = prompt_password(prompt).wrap_err("Failed to read wallet password")?;
    unlock_keystore(descriptor, &password)
}

pub fn parse_private_key(raw: &str) -> Result<PrivateKeySigner> {
    raw.trim()
        .parse::<PrivateKeySigner>()
        .map_err(|e| eyre!("invalid private key: {e}"))
}

/// Signer of the connected session, shared between the connector and the
/// signing provider.
#[derive(Clone, Default)]
pub struct SignerSlot {
    inner: Arc<Mutex<Option<PrivateKeySigner>>>,
}

impl SignerSlot {
    pub fn current(&self) -> Option<PrivateKeySigner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn set(&self, signer: Option<PrivateKeySigner>) {
        *self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = signer;
    }
}

impl fmt::Debug for SignerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let address = self.current().map(|signer| signer.address());
        f.debug_struct("SignerSlot").field("address", &address).finish()
    }
}

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum ConnectorId {
    Keystore(String),
    Environment,
}

impl fmt::Display for ConnectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectorId::Keystore(name) => write!(f, "keystore:{name}"),
            ConnectorId::Environment => write!(f, "environment"),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConnectorInfo {
    pub id: ConnectorId,
    pub label: String,
    pub ready: bool,
    pub needs_password: bool,
}

/// Local wallet connector: keystore files plus an optional key from the
/// environment. Publishes the session through a watch channel.
pub struct WalletConnector {
    wallet_dir: PathBuf,
    env_key: Option<String>,
    signer: SignerSlot,
    session: watch::Sender<WalletSession>,
    pending: Option<ConnectorId>,
    last_error: Option<String>,
}

impl WalletConnector {
    pub fn new(wallet_dir: PathBuf, env_key: Option<String>, signer: SignerSlot) -> Self {
        let (session, _) = watch::channel(WalletSession::unknown());
        Self {
            wallet_dir,
            env_key,
            signer,
            session,
            pending: None,
            last_error: None,
        }
    }

    pub fn session(&self) -> WalletSession {
        self.session.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<WalletSession> {
        self.session.subscribe()
    }

    pub fn pending_connector(&self) -> Option<&ConnectorId> {
        self.pending.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn connectors(&self) -> Vec<ConnectorInfo> {
        let mut connectors: Vec<ConnectorInfo> = match list_wallets(&self.wallet_dir) {
            Ok(wallets) => wallets
                .into_iter()
                .map(|wallet| ConnectorInfo {
                    label: format!("Keystore '{}'", wallet.name),
                    id: ConnectorId::Keystore(wallet.name),
                    ready: true,
                    needs_password: true,
                })
                .collect(),
            Err(err) => {
                warn!(?err, dir = %self.wallet_dir.display(), "failed to list keystores");
                Vec::new()
            }
        };
        connectors.push(ConnectorInfo {
            id: ConnectorId::Environment,
            label: "Environment key".to_string(),
            ready: self.env_key.is_some(),
            needs_password: false,
        });
        connectors
    }

    /// Resolves the initial `Unknown` session. Uses a signer unlocked before
    /// startup, else the environment key, else reports `Disconnected`.
    pub fn auto_connect(&mut self, unlocked: Option<PrivateKeySigner>) {
        let signer = match unlocked {
            Some(signer) => Some(signer),
            None => match self.env_key.as_deref().map(parse_private_key) {
                Some(Ok(signer)) => Some(signer),
                Some(Err(err)) => {
                    warn!(?err, "environment key rejected during auto-connect");
                    self.last_error = Some(format!("{err}"));
                    None
                }
                None => None,
            },
        };
        match signer {
            Some(signer) => {
                self.install(signer);
            }
            None => self.publish(WalletSession::disconnected()),
        }
    }

    /// Marks a connector as in progress so the UI can show it.
    pub fn mark_pending(&mut self, id: ConnectorId) {
        self.last_error = None;
        self.pending = Some(id);
    }

    /// Unlocks and installs in one go. The event loop uses [`Self::unlock_task`]
    /// and [`Self::finish_connect`] instead so scrypt runs on its own task.
    pub async fn connect(
        &mut self,
        id: &ConnectorId,
        password: Option<String>,
    ) -> Result<Address> {
        self.pending = Some(id.clone());
        let result = self.unlock_task(id, password).await;
        self.finish_connect(id, result)
            .unwrap_or_else(|| Err(eyre!("connection to {id} was superseded")))
    }

    /// Owned unlock future for `id`; it borrows nothing from the connector.
    pub fn unlock_task(
        &self,
        id: &ConnectorId,
        password: Option<String>,
    ) -> impl Future<Output = Result<PrivateKeySigner>> + Send + 'static {
        let id = id.clone();
        let wallet_dir = self.wallet_dir.clone();
        let env_key = self.env_key.clone();
        async move { unlock(&wallet_dir, env_key.as_deref(), &id, password).await }
    }

    /// Applies an unlock result. Returns `None` when `id` is no longer the
    /// pending connector, leaving the session untouched.
    pub fn finish_connect(
        &mut self,
        id: &ConnectorId,
        result: Result<PrivateKeySigner>,
    ) -> Option<Result<Address>> {
        if self.pending.as_ref() != Some(id) {
            debug!(connector = %id, "discarding stale unlock result");
            return None;
        }
        self.pending = None;
        Some(match result {
            Ok(signer) => {
                self.last_error = None;
                Ok(self.install(signer))
            }
            Err(err) => {
                warn!(?err, connector = %id, "wallet connection failed");
                self.last_error = Some(format!("{err}"));
                Err(err)
            }
        })
    }

    pub fn disconnect(&mut self) {
        info!("wallet disconnected");
        self.signer.set(None);
        self.publish(WalletSession::disconnected());
    }

    fn install(&mut self, signer: PrivateKeySigner) -> Address {
        let address = signer.address();
        info!(%address, "wallet connected");
        self.signer.set(Some(signer));
        self.publish(WalletSession::connected(address));
        address
    }

    fn publish(&self, session: WalletSession) {
        self.session.send_replace(session);
    }
}

async fn unlock(
    wallet_dir: &Path,
    env_key: Option<&str>,
    id: &ConnectorId,
    password: Option<String>,
) -> Result<PrivateKeySigner> {
    match id {
        ConnectorId::Environment => {
            let raw = env_key.ok_or_else(|| eyre!("no private key in the environment"))?;
            parse_private_key(raw)
        }
        ConnectorId::Keystore(name) => {
            let descriptor = find_wallet(wallet_dir, name)?;
            let password = password.ok_or_else(|| eyre!("wallet '{name}' needs a password"))?;
            tokio::task::spawn_blocking(move || unlock_keystore(&descriptor, &password))
                .await
                .wrap_err("keystore unlock task failed")?
        }
    }
}
