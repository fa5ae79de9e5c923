use crate::ui;
use alchemon::{
    WorkflowError,
    config::{
        AppConfig,
        Chain,
        MediaField,
    },
    contract::{
        ContractBinding,
        RpcSigningProvider,
    },
    indexer::AlchemyClient,
    nft::{
        ContractSummary,
        OwnedNft,
    },
    ownership::{
        OwnershipView,
        SAMPLE_COUNT,
    },
    session::{
        ChannelNavigator,
        NavRequest,
        Navigator,
        PageEvent,
        Route,
        SessionGate,
        Visibility,
        WalletSession,
    },
    wallet::{
        ConnectorId,
        ConnectorInfo,
        SignerSlot,
        WalletConnector,
    },
    workflow::{
        Breeding,
        GenesisMint,
        ParentSelection,
        TxState,
        WorkflowEvent,
        WorkflowHandle,
        spawn_workflow,
    },
};
use alloy::{
    primitives::{
        Address,
        utils::format_ether,
    },
    signers::local::PrivateKeySigner,
};
use chrono::Local;
use color_eyre::eyre::{
    Result,
    WrapErr,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{
    debug,
    info,
    warn,
};

/// Everything a frame needs, rebuilt on every draw.
#[derive(Clone, Debug, Default)]
pub struct View {
    pub route: Route,
    pub visible: bool,
    pub chain: Chain,
    pub media: MediaField,
    pub session: WalletSession,
    pub connectors: Vec<ConnectorInfo>,
    pub pending_connector: Option<ConnectorId>,
    pub connect_error: Option<String>,
    pub page: PageData,
    pub minted_banner: bool,
    pub tx_state: TxState,
    pub mint_label: String,
    pub status: String,
}

#[derive(Clone, Debug, Default)]
pub struct PageData {
    pub owned: Vec<OwnedNft>,
    pub samples: Vec<OwnedNft>,
    pub contracts: Vec<ContractSummary>,
    pub loading: bool,
}

struct PageLoad {
    mount: u64,
    data: PageData,
}

struct ConnectOutcome {
    id: ConnectorId,
    result: Result<PrivateKeySigner>,
}

enum PageWorkflow {
    Breed(WorkflowHandle<ParentSelection>),
    Mint(WorkflowHandle<()>),
}

pub struct AppController {
    config: AppConfig,
    connector: WalletConnector,
    ownership: OwnershipView<AlchemyClient>,
    provider: RpcSigningProvider,
    navigator: ChannelNavigator,
    stack: Vec<Route>,
    gate: SessionGate,
    page_event: Option<PageEvent>,
    mount_id: u64,
    mounted: bool,
    page: PageData,
    page_tx: mpsc::UnboundedSender<PageLoad>,
    connect_tx: mpsc::UnboundedSender<ConnectOutcome>,
    workflow: Option<PageWorkflow>,
    workflow_events: Option<mpsc::UnboundedReceiver<WorkflowEvent>>,
    tx_state: TxState,
    status: String,
}

impl AppController {
    fn new(
        config: AppConfig,
        navigator: ChannelNavigator,
        page_tx: mpsc::UnboundedSender<PageLoad>,
        connect_tx: mpsc::UnboundedSender<ConnectOutcome>,
    ) -> Result<Self> {
        let binding = ContractBinding::load(config.contract, &config.abi_path)?;
        let signer = SignerSlot::default();
        let provider = RpcSigningProvider::new(
            config.rpc_url.clone(),
            config.chain,
            Arc::new(binding),
            signer.clone(),
        );
        let indexer = AlchemyClient::new(config.chain, config.api_key.clone())?;
        info!(indexer = %indexer, contract = %config.contract, chain = %config.chain, "client configured");
        let ownership = OwnershipView::new(indexer, config.contract.to_string());
        let connector = WalletConnector::new(
            config.wallet_dir.clone(),
            config.private_key.clone(),
            signer,
        );
        let route = Route::default();
        Ok(Self {
            config,
            connector,
            ownership,
            provider,
            navigator,
            stack: vec![route],
            gate: SessionGate::new(route),
            page_event: None,
            mount_id: 0,
            mounted: false,
            page: PageData::default(),
            page_tx,
            connect_tx,
            workflow: None,
            workflow_events: None,
            tx_state: TxState::Idle,
            status: String::new(),
        })
    }

    fn route(&self) -> Route {
        self.stack.last().copied().unwrap_or_default()
    }

    fn set_status(&mut self, message: impl Into<String>) {
        self.status = format!("[{}] {}", Local::now().format("%H:%M:%S"), message.into());
    }

    fn build_view(&mut self) -> View {
        let session = self.connector.session();
        let visibility = self.gate.evaluate(&session, &self.navigator);
        if visibility == Visibility::Visible && !self.mounted {
            self.mount(&session);
        }
        View {
            route: self.route(),
            visible: visibility == Visibility::Visible,
            chain: self.config.chain,
            media: self.config.media,
            session,
            connectors: self.connector.connectors(),
            pending_connector: self.connector.pending_connector().cloned(),
            connect_error: self.connector.last_error().map(str::to_string),
            page: self.page.clone(),
            minted_banner: self.route() == Route::Home
                && self.page_event == Some(PageEvent::Minted),
            tx_state: self.tx_state.clone(),
            mint_label: format!(
                "{} Genesis for {} ETH",
                self.config.mint_count,
                format_ether(
                    GenesisMint {
                        count: self.config.mint_count,
                        price: self.config.mint_price,
                    }
                    .payment()
                )
            ),
            status: self.status.clone(),
        }
    }

    fn redraw(&mut self, ui_state: &mut ui::UiState) -> Result<()> {
        let view = self.build_view();
        ui::draw(ui_state, &view)
    }

    /// First visible render of a page: kick off its lookups and workflow.
    fn mount(&mut self, session: &WalletSession) {
        self.mounted = true;
        let route = self.route();
        info!(%route, mount = self.mount_id, "page mounted");
        if matches!(route, Route::Home | Route::Dashboard) {
            self.spawn_page_load(route, session.address);
        }
        match route {
            Route::Home => {
                let (handle, events) = spawn_workflow(
                    Breeding,
                    self.provider.clone(),
                    self.navigator.clone(),
                    self.config.chain,
                );
                self.workflow = Some(PageWorkflow::Breed(handle));
                self.workflow_events = Some(events);
            }
            Route::MintGenesis => {
                let mint = GenesisMint {
                    count: self.config.mint_count,
                    price: self.config.mint_price,
                };
                let (handle, events) = spawn_workflow(
                    mint,
                    self.provider.clone(),
                    self.navigator.clone(),
                    self.config.chain,
                );
                self.workflow = Some(PageWorkflow::Mint(handle));
                self.workflow_events = Some(events);
            }
            Route::Connect | Route::Dashboard => {}
        }
    }

    fn spawn_page_load(&mut self, route: Route, owner: Option<Address>) {
        self.page.loading = true;
        let ownership = self.ownership.clone();
        let page_tx = self.page_tx.clone();
        let mount = self.mount_id;
        tokio::spawn(async move {
            let data = if route == Route::Home {
                let (owned, samples, contracts) = futures::join!(
                    ownership.load_owned(owner),
                    ownership.load_samples(SAMPLE_COUNT),
                    ownership.load_creator_contracts(owner),
                );
                PageData {
                    owned,
                    samples,
                    contracts,
                    loading: false,
                }
            } else {
                PageData {
                    owned: ownership.load_owned(owner).await,
                    ..PageData::default()
                }
            };
            let _ = page_tx.send(PageLoad { mount, data });
        });
    }

    /// Drops the page's workflow. A transaction in flight keeps going on
    /// chain, but nobody follows it any more.
    fn unmount(&mut self) {
        if self.workflow.take().is_some() && self.tx_state.is_busy() {
            info!(route = %self.route(), "leaving page with a transaction in flight");
        }
        self.workflow_events = None;
        self.tx_state = TxState::Idle;
        self.page = PageData::default();
        self.mounted = false;
        self.mount_id += 1;
    }

    fn show(&mut self, route: Route) {
        self.unmount();
        self.gate = SessionGate::new(route);
    }

    fn navigate(&mut self, request: NavRequest) {
        debug!(?request, "navigation");
        match request {
            NavRequest::Replace(route) => {
                self.stack.pop();
                self.stack.push(route);
                self.page_event = None;
            }
            NavRequest::Push(route, event) => {
                self.stack.push(route);
                self.page_event = event;
            }
        }
        self.show(request.route());
    }

    fn back(&mut self) {
        if self.stack.len() < 2 {
            return;
        }
        self.stack.pop();
        self.page_event = None;
        self.show(self.route());
    }

    fn apply_page_load(&mut self, load: PageLoad) {
        if load.mount != self.mount_id {
            debug!(mount = load.mount, "dropping data for an unmounted page");
            return;
        }
        self.page = load.data;
    }

    fn apply_workflow_event(&mut self, event: WorkflowEvent) {
        match event {
            WorkflowEvent::State(state) => {
                let message = match &state {
                    TxState::Idle => None,
                    TxState::Submitting => Some("Waiting for wallet signature...".to_string()),
                    TxState::Mining { tx_hash } => Some(format!(
                        "Mining... please wait {}",
                        self.config.chain.tx_url(tx_hash)
                    )),
                    TxState::Confirmed { tx_hash } => {
                        Some(format!("Mined -- {}", self.config.chain.tx_url(tx_hash)))
                    }
                    TxState::Failed { error } => error.user_message().map(str::to_string),
                };
                if let Some(message) = message {
                    self.set_status(message);
                }
                self.tx_state = state;
            }
            WorkflowEvent::Rejected(WorkflowError::Busy) => {
                self.set_status("A transaction is already in flight");
            }
            WorkflowEvent::Rejected(err) => debug!(%err, "submit rejected"),
        }
    }

    fn submit_breed(&mut self, selection: ParentSelection) {
        let Some(PageWorkflow::Breed(handle)) = &self.workflow else {
            return;
        };
        if let Err(err) = handle.submit(selection) {
            warn!(?err, "breed submit dropped");
            self.set_status(format!("{err}"));
        }
    }

    fn submit_mint(&mut self) {
        let Some(PageWorkflow::Mint(handle)) = &self.workflow else {
            return;
        };
        if let Err(err) = handle.submit(()) {
            warn!(?err, "mint submit dropped");
            self.set_status(format!("{err}"));
        }
    }

    /// Starts unlocking on its own task; the result comes back through
    /// `connect_tx`.
    fn connect(&mut self, id: ConnectorId, password: Option<String>) {
        self.connector.mark_pending(id.clone());
        let unlock = self.connector.unlock_task(&id, password);
        let connect_tx = self.connect_tx.clone();
        tokio::spawn(async move {
            let result = unlock.await;
            let _ = connect_tx.send(ConnectOutcome { id, result });
        });
    }

    fn apply_connect_outcome(&mut self, outcome: ConnectOutcome) {
        match self.connector.finish_connect(&outcome.id, outcome.result) {
            Some(Ok(address)) => self.set_status(format!("Connected {address}")),
            Some(Err(_)) => self.set_status("Connection failed"),
            None => debug!(connector = %outcome.id, "stale connection result dropped"),
        }
    }

    fn shutdown(&mut self) {
        match self.workflow.take() {
            Some(PageWorkflow::Breed(handle)) => handle.shutdown(),
            Some(PageWorkflow::Mint(handle)) => handle.shutdown(),
            None => {}
        }
    }
}

async fn recv_opt<T>(rx: &mut Option<mpsc::UnboundedReceiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

pub async fn run_app(config: AppConfig, unlocked: Option<PrivateKeySigner>) -> Result<()> {
    let (navigator, nav_rx) = ChannelNavigator::new();
    let (page_tx, page_rx) = mpsc::unbounded_channel();
    let (connect_tx, connect_rx) = mpsc::unbounded_channel();
    let controller = AppController::new(config, navigator, page_tx, connect_tx)?;
    let mut ui_state = ui::UiState::default();
    let mut input_events = ui::input_event_stream();

    info!("Starting UI");
    ui::terminal_enter(&mut ui_state)?;
    let res = run_loop(
        controller,
        unlocked,
        &mut ui_state,
        &mut input_events,
        nav_rx,
        page_rx,
        connect_rx,
    )
    .await;
    ui::terminal_exit()?;
    res
}

async fn run_loop(
    mut controller: AppController,
    unlocked: Option<PrivateKeySigner>,
    ui_state: &mut ui::UiState,
    input_events: &mut ui::InputEventReceiver,
    mut nav_rx: mpsc::UnboundedReceiver<NavRequest>,
    mut page_rx: mpsc::UnboundedReceiver<PageLoad>,
    mut connect_rx: mpsc::UnboundedReceiver<ConnectOutcome>,
) -> Result<()> {
    let mut session_rx = controller.connector.subscribe();
    controller
        .redraw(ui_state)
        .wrap_err("initial draw failed")?;
    controller.connector.auto_connect(unlocked);

    loop {
        tokio::select! {
            request = nav_rx.recv() => {
                let Some(request) = request else {
                    break;
                };
                controller.navigate(request);
                controller
                    .redraw(ui_state)
                    .wrap_err("draw after navigation failed")?;
            }
            changed = session_rx.changed() => {
                if changed.is_err() {
                    warn!("wallet session feed closed");
                    break;
                }
                let status = session_rx.borrow_and_update().status;
                info!(?status, "wallet session changed");
                controller
                    .redraw(ui_state)
                    .wrap_err("draw after session change failed")?;
            }
            load = page_rx.recv() => {
                if let Some(load) = load {
                    controller.apply_page_load(load);
                    controller
                        .redraw(ui_state)
                        .wrap_err("draw after page data failed")?;
                }
            }
            outcome = connect_rx.recv() => {
                if let Some(outcome) = outcome {
                    controller.apply_connect_outcome(outcome);
                    controller
                        .redraw(ui_state)
                        .wrap_err("draw after wallet unlock failed")?;
                }
            }
            event = recv_opt(&mut controller.workflow_events) => {
                match event {
                    Some(event) => controller.apply_workflow_event(event),
                    None => controller.workflow_events = None,
                }
                controller
                    .redraw(ui_state)
                    .wrap_err("draw after workflow event failed")?;
            }
            _ = tokio::signal::ctrl_c() => {
                controller.shutdown();
                break;
            }
            raw_ev = ui::next_raw_event(input_events) => {
                let event = raw_ev?;
                let Some(ev) = ui::interpret_event(ui_state, event) else {
                    continue;
                };
                match ev {
                    ui::UserEvent::Quit => {
                        controller.shutdown();
                        break;
                    }
                    ui::UserEvent::Redraw => {}
                    ui::UserEvent::Back => controller.back(),
                    ui::UserEvent::Open(route) => controller.navigator.push(route, None),
                    ui::UserEvent::BackToMain => controller.navigator.replace(Route::Home),
                    ui::UserEvent::Connect { id, password } => controller.connect(id, password),
                    ui::UserEvent::Disconnect => {
                        controller.connector.disconnect();
                        controller.set_status("Disconnected");
                    }
                    ui::UserEvent::Breed(selection) => controller.submit_breed(selection),
                    ui::UserEvent::Mint => controller.submit_mint(),
                }
                controller
                    .redraw(ui_state)
                    .wrap_err("draw after input failed")?;
            }
        }
    }
    Ok(())
}
