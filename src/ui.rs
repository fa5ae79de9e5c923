use crate::app::View;
use alchemon::{
    config::MediaField,
    nft::{
        OwnedNft,
        TokenId,
    },
    session::{
        Route,
        SessionStatus,
    },
    wallet::{
        ConnectorId,
        ConnectorInfo,
    },
    workflow::{
        NO_PARENT,
        ParentSelection,
        TxState,
    },
};
use color_eyre::eyre::{
    Result,
    eyre,
};
use crossterm::{
    event::{
        Event,
        EventStream,
        KeyCode,
        KeyEvent,
        KeyEventKind,
        KeyModifiers,
    },
    terminal::{
        disable_raw_mode,
        enable_raw_mode,
    },
};
use futures::StreamExt;
use ratatui::{
    prelude::*,
    widgets::*,
};
use std::io::stdout;
use unicode_width::UnicodeWidthStr;

pub type InputEventReceiver = EventStream;

pub enum UserEvent {
    Quit,
    Redraw,
    Back,
    Open(Route),
    BackToMain,
    Connect {
        id: ConnectorId,
        password: Option<String>,
    },
    Disconnect,
    Breed(ParentSelection),
    Mint,
}

#[derive(Debug, Default)]
pub struct UiState {
    mode: Mode,
    terminal: Option<Terminal<CrosstermBackend<std::io::Stdout>>>,
    route: Route,
    visible: bool,
    busy: bool,
    connectors: Vec<ConnectorInfo>,
    connector_idx: usize,
    pool: Vec<(TokenId, String)>,
    parents: [usize; 2],
    focus: usize,
}

#[derive(Clone, Debug, Default)]
enum Mode {
    #[default]
    Normal,
    Password(PasswordState),
}

#[derive(Clone, Debug)]
struct PasswordState {
    connector: ConnectorId,
    label: String,
    input: String,
}

impl UiState {
    fn selection(&self) -> ParentSelection {
        let pick = |idx: usize| {
            idx.checked_sub(1)
                .and_then(|i| self.pool.get(i))
                .map(|(id, _)| *id)
        };
        ParentSelection {
            parent1: pick(self.parents[0]),
            parent2: pick(self.parents[1]),
        }
    }

    fn parent_label(&self, slot: usize) -> &str {
        self.parents[slot]
            .checked_sub(1)
            .and_then(|i| self.pool.get(i))
            .map_or(NO_PARENT, |(_, title)| title.as_str())
    }

    fn cycle_parent(&mut self, forward: bool) {
        let options = self.pool.len() + 1;
        let current = &mut self.parents[self.focus];
        *current = if forward {
            (*current + 1) % options
        } else {
            (*current + options - 1) % options
        };
    }
}

pub fn input_event_stream() -> InputEventReceiver {
    EventStream::new()
}

pub async fn next_raw_event(events: &mut InputEventReceiver) -> Result<Event> {
    match events.next().await {
        Some(Ok(event)) => Ok(event),
        Some(Err(err)) => Err(err.into()),
        None => Err(eyre!("terminal input stream closed")),
    }
}

pub fn terminal_enter(state: &mut UiState) -> Result<()> {
    enable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), crossterm::terminal::EnterAlternateScreen)?;
    // One persistent Terminal keeps buffers across draws
    let backend = CrosstermBackend::new(stdout());
    let terminal = Terminal::new(backend)?;
    state.terminal = Some(terminal);
    Ok(())
}

pub fn terminal_exit() -> Result<()> {
    disable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), crossterm::terminal::LeaveAlternateScreen)?;
    Ok(())
}

pub fn draw(state: &mut UiState, view: &View) -> Result<()> {
    if state.route != view.route {
        state.route = view.route;
        state.connector_idx = 0;
        state.parents = [0, 0];
        state.focus = 0;
        state.mode = Mode::Normal;
    }
    state.visible = view.visible;
    state.busy = view.tx_state.is_busy();
    state.connectors = view.connectors.clone();
    state.connector_idx = state
        .connector_idx
        .min(state.connectors.len().saturating_sub(1));
    let pool: Vec<(TokenId, String)> = view
        .page
        .owned
        .iter()
        .map(|nft| (nft.token_id, nft.display_name().to_string()))
        .collect();
    if pool != state.pool {
        state.pool = pool;
        state.parents = [0, 0];
    }
    if let Some(mut term) = state.terminal.take() {
        term.draw(|f| ui(f, state, view))?;
        state.terminal = Some(term);
    }
    Ok(())
}

pub fn interpret_event(state: &mut UiState, event: Event) -> Option<UserEvent> {
    match event {
        Event::Key(key) if key.kind == KeyEventKind::Press => interpret_key(state, key),
        Event::Resize(_, _) => Some(UserEvent::Redraw),
        _ => None,
    }
}

fn interpret_key(state: &mut UiState, key: KeyEvent) -> Option<UserEvent> {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Some(UserEvent::Quit);
    }
    if let Mode::Password(pw) = &mut state.mode {
        return match key.code {
            KeyCode::Esc => {
                state.mode = Mode::Normal;
                Some(UserEvent::Redraw)
            }
            KeyCode::Enter => {
                let id = pw.connector.clone();
                let password = std::mem::take(&mut pw.input);
                state.mode = Mode::Normal;
                Some(UserEvent::Connect {
                    id,
                    password: Some(password),
                })
            }
            KeyCode::Backspace => {
                pw.input.pop();
                Some(UserEvent::Redraw)
            }
            KeyCode::Char(c) => {
                pw.input.push(c);
                Some(UserEvent::Redraw)
            }
            _ => None,
        };
    }
    match key.code {
        KeyCode::Char('q') => return Some(UserEvent::Quit),
        KeyCode::Backspace => return Some(UserEvent::Back),
        _ => {}
    }
    if !state.visible {
        return None;
    }
    match state.route {
        Route::Connect => match key.code {
            KeyCode::Up | KeyCode::Char('k') => {
                state.connector_idx = state.connector_idx.saturating_sub(1);
                Some(UserEvent::Redraw)
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if state.connector_idx + 1 < state.connectors.len() {
                    state.connector_idx += 1;
                }
                Some(UserEvent::Redraw)
            }
            KeyCode::Enter => {
                let connector = state.connectors.get(state.connector_idx)?;
                if !connector.ready {
                    return None;
                }
                if connector.needs_password {
                    state.mode = Mode::Password(PasswordState {
                        connector: connector.id.clone(),
                        label: connector.label.clone(),
                        input: String::new(),
                    });
                    return Some(UserEvent::Redraw);
                }
                Some(UserEvent::Connect {
                    id: connector.id.clone(),
                    password: None,
                })
            }
            _ => None,
        },
        Route::Home => match key.code {
            KeyCode::Tab | KeyCode::BackTab => {
                state.focus = 1 - state.focus;
                Some(UserEvent::Redraw)
            }
            KeyCode::Right | KeyCode::Down | KeyCode::Char('l') => {
                state.cycle_parent(true);
                Some(UserEvent::Redraw)
            }
            KeyCode::Left | KeyCode::Up | KeyCode::Char('h') => {
                state.cycle_parent(false);
                Some(UserEvent::Redraw)
            }
            KeyCode::Enter | KeyCode::Char('b') if !state.busy => {
                Some(UserEvent::Breed(state.selection()))
            }
            KeyCode::Char('d') => Some(UserEvent::Open(Route::Dashboard)),
            KeyCode::Char('m') => Some(UserEvent::Open(Route::MintGenesis)),
            KeyCode::Char('x') => Some(UserEvent::Disconnect),
            _ => None,
        },
        Route::Dashboard => match key.code {
            KeyCode::Char('h') | KeyCode::Esc => Some(UserEvent::BackToMain),
            KeyCode::Char('x') => Some(UserEvent::Disconnect),
            _ => None,
        },
        Route::MintGenesis => match key.code {
            KeyCode::Enter | KeyCode::Char('m') if !state.busy => Some(UserEvent::Mint),
            KeyCode::Char('h') | KeyCode::Esc => Some(UserEvent::BackToMain),
            KeyCode::Char('x') => Some(UserEvent::Disconnect),
            _ => None,
        },
    }
}

fn ui(f: &mut Frame, state: &UiState, view: &View) {
    let area = f.area();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(3),
        ])
        .split(area);

    draw_top(f, chunks[0], view);
    if view.visible {
        match view.route {
            Route::Connect => draw_connect(f, chunks[1], state, view),
            Route::Home => draw_home(f, chunks[1], state, view),
            Route::Dashboard => draw_dashboard(f, chunks[1], view),
            Route::MintGenesis => draw_mint(f, chunks[1], view),
        }
    } else {
        f.render_widget(Block::default().borders(Borders::ALL), chunks[1]);
    }
    draw_bottom(f, chunks[2], view);
    draw_modals(f, state);
}

fn draw_top(f: &mut Frame, area: Rect, view: &View) {
    // blank until the connector has reported, like the page body
    let account = match (view.session.status, view.session.address) {
        (SessionStatus::Unknown, _) => String::new(),
        (_, Some(address)) => address.to_string(),
        (_, None) => "not connected".to_string(),
    };
    let line = Line::from(vec![
        Span::styled("Alchemon", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(format!("  {}  {}  ", view.chain, view.route)),
        Span::styled(account, Style::default().fg(Color::Cyan)),
    ]);
    let p = Paragraph::new(line).block(Block::default().borders(Borders::ALL));
    f.render_widget(p, area);
}

fn draw_connect(f: &mut Frame, area: Rect, state: &UiState, view: &View) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(3)])
        .split(area);

    let items: Vec<ListItem> = view
        .connectors
        .iter()
        .enumerate()
        .map(|(i, connector)| {
            let mut label = connector.label.clone();
            if !connector.ready {
                label.push_str(" (unsupported)");
            }
            if view.pending_connector.as_ref() == Some(&connector.id) {
                label.push_str(" (connecting)");
            }
            let style = if i == state.connector_idx {
                Style::default().fg(Color::Black).bg(Color::Yellow)
            } else if connector.ready {
                Style::default()
            } else {
                Style::default().fg(Color::DarkGray)
            };
            ListItem::new(label).style(style)
        })
        .collect();
    let list = List::new(items).block(
        Block::default()
            .title("Connect your wallet")
            .borders(Borders::ALL),
    );
    f.render_widget(list, chunks[0]);

    if let Some(err) = &view.connect_error {
        let p = Paragraph::new(err.as_str())
            .style(Style::default().fg(Color::Red))
            .block(Block::default().borders(Borders::ALL));
        f.render_widget(p, chunks[1]);
    }
}

fn draw_home(f: &mut Frame, area: Rect, state: &UiState, view: &View) {
    let banner_height = if view.minted_banner { 3 } else { 0 };
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(banner_height),
            Constraint::Length(7),
            Constraint::Min(4),
        ])
        .split(area);

    if view.minted_banner {
        let p = Paragraph::new("Your Genesis Alchemon was minted!")
            .style(Style::default().fg(Color::Green))
            .block(Block::default().borders(Borders::ALL));
        f.render_widget(p, chunks[0]);
    }

    let parent_line = |slot: usize| {
        let style = if state.focus == slot {
            Style::default().fg(Color::Black).bg(Color::Yellow)
        } else {
            Style::default()
        };
        Line::from(vec![
            Span::raw(format!("Parent {}: ", slot + 1)),
            Span::styled(format!("< {} >", state.parent_label(slot)), style),
        ])
    };
    let mut form = vec![parent_line(0), parent_line(1)];
    if view.page.loading {
        form.push(Line::from("Loading your Alchemons..."));
    } else if view.page.owned.is_empty() {
        form.push(Line::from("No Alchemons owned yet. Mint a Genesis first."));
    }
    form.push(Line::from(tx_line(&view.tx_state)));
    let p = Paragraph::new(form).block(Block::default().title("Breed").borders(Borders::ALL));
    f.render_widget(p, chunks[1]);

    let lower = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(chunks[2]);

    let samples: Vec<ListItem> = view
        .page
        .samples
        .iter()
        .map(|nft| ListItem::new(nft_line(nft, view.media, lower[0].width)))
        .collect();
    let list = List::new(samples)
        .block(Block::default().title("Alchemons").borders(Borders::ALL));
    f.render_widget(list, lower[0]);

    let contracts: Vec<ListItem> = view
        .page
        .contracts
        .iter()
        .map(|contract| {
            let name = contract.name.as_deref().unwrap_or("Unnamed contract");
            ListItem::new(vec![
                Line::from(name.to_string()),
                Line::from(Span::styled(
                    view.chain.address_url(&contract.address),
                    Style::default().fg(Color::Blue),
                )),
            ])
        })
        .collect();
    let list = List::new(contracts).block(
        Block::default()
            .title("Projects by Alchemon Creators")
            .borders(Borders::ALL),
    );
    f.render_widget(list, lower[1]);
}

fn draw_dashboard(f: &mut Frame, area: Rect, view: &View) {
    let mut lines = Vec::new();
    if let Some(address) = view.session.address {
        lines.push(ListItem::new(Line::from(vec![
            Span::raw("Address: "),
            Span::styled(address.to_string(), Style::default().fg(Color::Cyan)),
        ])));
    }
    if view.page.loading {
        lines.push(ListItem::new("Loading..."));
    }
    lines.extend(
        view.page
            .owned
            .iter()
            .map(|nft| ListItem::new(nft_line(nft, view.media, area.width))),
    );
    let list = List::new(lines).block(
        Block::default()
            .title("Profile Dashboard")
            .borders(Borders::ALL),
    );
    f.render_widget(list, area);
}

fn draw_mint(f: &mut Frame, area: Rect, view: &View) {
    let mut lines = vec![
        Line::from(format!("Mint {}", view.mint_label)),
        Line::from(""),
    ];
    match &view.tx_state {
        state if state.is_busy() => lines.push(Line::from(Span::styled(
            "Your NFT is minting...",
            Style::default().fg(Color::Yellow),
        ))),
        TxState::Failed { error } => {
            if let Some(msg) = error.user_message() {
                lines.push(Line::from(Span::styled(
                    msg,
                    Style::default().fg(Color::Red),
                )));
            }
        }
        _ => lines.push(Line::from("[Enter] Mint")),
    }
    let p = Paragraph::new(lines)
        .alignment(Alignment::Center)
        .block(Block::default().title("Mint Genesis").borders(Borders::ALL));
    f.render_widget(p, area);
}

fn draw_bottom(f: &mut Frame, area: Rect, view: &View) {
    let help = match view.route {
        Route::Connect => "[Up/Down] Select  [Enter] Connect  [q] Quit",
        Route::Home => {
            "[Tab] Parent  [<-/->] Choose  [Enter] Breed  [d] Profile Dashboard  [m] Mint Genesis  [x] Disconnect  [q] Quit"
        }
        Route::Dashboard => "[h] Back to Main Page  [x] Disconnect  [q] Quit",
        Route::MintGenesis => "[Enter] Mint  [h] Back to Main Page  [q] Quit",
    };
    let lines = vec![
        Line::from(view.status.as_str()),
        Line::from(Span::styled(help, Style::default().fg(Color::DarkGray))),
    ];
    let p = Paragraph::new(lines).block(Block::default().borders(Borders::TOP));
    f.render_widget(p, area);
}

fn draw_modals(f: &mut Frame, state: &UiState) {
    let Mode::Password(pw) = &state.mode else {
        return;
    };
    let area = centered_rect(50, 20, f.area());
    f.render_widget(Clear, area);
    let masked = "*".repeat(pw.input.chars().count());
    let lines = vec![
        Line::from(format!("Password for {}", pw.label)),
        Line::from(""),
        Line::from(masked),
        Line::from(""),
        Line::from("[Enter] Unlock  [Esc] Cancel"),
    ];
    let p = Paragraph::new(lines).block(
        Block::default()
            .title("Unlock wallet")
            .borders(Borders::ALL),
    );
    f.render_widget(p, area);
}

fn tx_line(state: &TxState) -> String {
    match state {
        TxState::Idle => String::new(),
        TxState::Submitting => "Waiting for signature...".to_string(),
        TxState::Mining { tx_hash } => format!("Mining... please wait ({tx_hash})"),
        TxState::Confirmed { tx_hash } => format!("Mined {tx_hash}"),
        TxState::Failed { error } => error
            .user_message()
            .unwrap_or("Transaction failed")
            .to_string(),
    }
}

fn nft_line(nft: &OwnedNft, media: MediaField, width: u16) -> Line<'static> {
    let url = nft.media_url(media).unwrap_or("no media");
    let budget = usize::from(width).saturating_sub(nft.display_name().width() + 8);
    Line::from(vec![
        Span::styled(
            format!("#{} {}", nft.token_id, nft.display_name()),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::raw("  "),
        Span::styled(truncate(url, budget), Style::default().fg(Color::Blue)),
    ])
}

fn truncate(text: &str, max_width: usize) -> String {
    if text.width() <= max_width {
        return text.to_string();
    }
    let mut out = String::new();
    let mut used = 0;
    for c in text.chars() {
        let w = unicode_width::UnicodeWidthChar::width(c).unwrap_or(0);
        if used + w + 3 > max_width {
            break;
        }
        used += w;
        out.push(c);
    }
    out.push_str("...");
    out
}

fn centered_rect(w_percent: u16, h_percent: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - h_percent) / 2),
            Constraint::Percentage(h_percent),
            Constraint::Percentage((100 - h_percent) / 2),
        ])
        .split(r);

    let vertical = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - w_percent) / 2),
            Constraint::Percentage(w_percent),
            Constraint::Percentage((100 - w_percent) / 2),
        ])
        .split(popup_layout[1]);

    vertical[1]
}
