use alloy::primitives::Address;
use std::fmt;
use tokio::sync::mpsc;
use tracing::{
    debug,
    info,
};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum SessionStatus {
    /// The wallet connector has not reported readiness yet.
    #[default]
    Unknown,
    Connected,
    Disconnected,
}

/// Read-only snapshot of the wallet connector's session.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct WalletSession {
    pub address: Option<Address>,
    pub status: SessionStatus,
}

impl WalletSession {
    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn connected(address: Address) -> Self {
        Self {
            address: Some(address),
            status: SessionStatus::Connected,
        }
    }

    pub fn disconnected() -> Self {
        Self {
            address: None,
            status: SessionStatus::Disconnected,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status == SessionStatus::Connected
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum Route {
    #[default]
    Home,
    Connect,
    Dashboard,
    MintGenesis,
}

impl Route {
    pub fn path(self) -> &'static str {
        match self {
            Route::Home => "/",
            Route::Connect => "/connect",
            Route::Dashboard => "/dashboard",
            Route::MintGenesis => "/mint-genesis",
        }
    }

    pub fn requires_session(self) -> bool {
        !matches!(self, Route::Connect)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path())
    }
}

/// Query attached to a navigation, telling the target page what just happened.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PageEvent {
    Minted,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NavRequest {
    Replace(Route),
    Push(Route, Option<PageEvent>),
}

impl NavRequest {
    pub fn route(&self) -> Route {
        match self {
            NavRequest::Replace(route) | NavRequest::Push(route, _) => *route,
        }
    }
}

pub trait Navigator: Send + Sync {
    fn replace(&self, route: Route);
    fn push(&self, route: Route, event: Option<PageEvent>);
}

/// Forwards navigation requests to whoever owns the page stack.
#[derive(Clone, Debug)]
pub struct ChannelNavigator {
    sender: mpsc::UnboundedSender<NavRequest>,
}

impl ChannelNavigator {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<NavRequest>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    fn send(&self, request: NavRequest) {
        if self.sender.send(request).is_err() {
            debug!(?request, "navigation dropped; page stack is gone");
        }
    }
}

impl Navigator for ChannelNavigator {
    fn replace(&self, route: Route) {
        self.send(NavRequest::Replace(route));
    }

    fn push(&self, route: Route, event: Option<PageEvent>) {
        self.send(NavRequest::Push(route, event));
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Visibility {
    /// Render nothing wallet dependent.
    Hidden,
    Visible,
}

/// Decides per render whether a page may show and whether it must redirect.
/// Issues at most one redirect per resolved session status.
#[derive(Debug)]
pub struct SessionGate {
    route: Route,
    redirected_for: Option<SessionStatus>,
}

impl SessionGate {
    pub fn new(route: Route) -> Self {
        Self {
            route,
            redirected_for: None,
        }
    }

    pub fn route(&self) -> Route {
        self.route
    }

    pub fn evaluate<N: Navigator + ?Sized>(
        &mut self,
        session: &WalletSession,
        navigator: &N,
    ) -> Visibility {
        let target = match session.status {
            SessionStatus::Unknown => return Visibility::Hidden,
            SessionStatus::Disconnected if self.route.requires_session() => {
                Some(Route::Connect)
            }
            SessionStatus::Connected if self.route == Route::Connect => Some(Route::Home),
            _ => None,
        };
        let Some(target) = target else {
            self.redirected_for = None;
            return Visibility::Visible;
        };
        if self.redirected_for != Some(session.status) {
            info!(from = %self.route, to = %target, "session gate redirect");
            self.redirected_for = Some(session.status);
            navigator.replace(target);
        }
        Visibility::Hidden
    }
}
