use anyhow::{Context, Result};
use bomber_bot_core::{
    ItemKind, Position,
    agent::{AgentConfig, Decision, HazardAwareAgent, Verdict},
    board::{BoxKind, CellType, Snapshot},
    chain,
    protocol::TurnReader,
};
use ratatui::{
    crossterm::{
        self,
        event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
        execute,
        terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
    },
    prelude::*,
    widgets::*,
};
use std::{
    collections::HashSet,
    fs::File,
    io::{self, BufReader, Stdout},
    path::Path,
    time::{Duration, Instant},
};
use tracing::warn;

/// One recorded turn and what the agent made of it.
struct Turn {
    snapshot: Snapshot,
    decision: Decision,
}

struct App {
    turns: Vec<Turn>,
    /// Index of the turn on screen.
    current: usize,
    /// Advance one turn per tick.
    playing: bool,
    /// Show the arena this many turns ahead, after pending detonations. 0 is off.
    forecast: usize,
    /// Flag to control the main loop.
    should_quit: bool,
}

impl App {
    fn load(transcript: &Path, config: AgentConfig) -> Result<Self> {
        let file = File::open(transcript)
            .with_context(|| format!("opening {}", transcript.display()))?;
        let mut reader = TurnReader::open(BufReader::new(file)).context("reading the header")?;
        let agent = HazardAwareAgent::new(reader.header().my_id, config);

        let mut turns = Vec::new();
        loop {
            match reader.read_turn() {
                Ok(Some(snapshot)) => {
                    let decision = agent.decide(&snapshot);
                    turns.push(Turn { snapshot, decision });
                }
                Ok(None) => break,
                Err(err) if !turns.is_empty() => {
                    warn!(%err, turns = turns.len(), "transcript cut short");
                    break;
                }
                Err(err) => return Err(err).context("reading the first turn"),
            }
        }
        if turns.is_empty() {
            return Err(anyhow::anyhow!("transcript holds no turns"));
        }

        Ok(App {
            turns,
            current: 0,
            playing: false,
            forecast: 0,
            should_quit: false,
        })
    }

    /// Handles one step of autoplay.
    fn tick(&mut self) {
        if self.playing {
            if self.current + 1 < self.turns.len() {
                self.current += 1;
            } else {
                self.playing = false;
            }
        }
    }

    fn next(&mut self) {
        self.current = (self.current + 1).min(self.turns.len() - 1);
    }

    fn previous(&mut self) {
        self.current = self.current.saturating_sub(1);
    }

    fn turn(&self) -> &Turn {
        &self.turns[self.current]
    }

    /// Sets the quit flag.
    fn quit(&mut self) {
        self.should_quit = true;
    }
}

pub fn run(transcript: &Path, config: AgentConfig) -> Result<()> {
    let mut app = App::load(transcript, config)?;

    // Set up the terminal
    let mut terminal = setup_terminal()?;

    // Run the main application loop
    let result = run_app(&mut terminal, &mut app);

    // Restore the terminal state
    restore_terminal(&mut terminal)?;

    result
}

/// Configures the terminal for TUI interaction.
fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    let mut stdout = io::stdout();
    enable_raw_mode()?;
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).map_err(Into::into)
}

/// Restores the terminal to its original state.
fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

fn run_app(terminal: &mut Terminal<CrosstermBackend<Stdout>>, app: &mut App) -> Result<()> {
    let tick_rate = Duration::from_millis(400);
    let mut last_tick = Instant::now();

    loop {
        terminal.draw(|f| ui(f, app))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));

        if crossterm::event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => app.quit(),
                    KeyCode::Right | KeyCode::Char('l') => app.next(),
                    KeyCode::Left | KeyCode::Char('h') => app.previous(),
                    KeyCode::Char(' ') => app.playing = !app.playing,
                    KeyCode::Char('+') => app.forecast += 1,
                    KeyCode::Char('-') => app.forecast = app.forecast.saturating_sub(1),
                    _ => {}
                }
            }
        }

        if last_tick.elapsed() >= tick_rate {
            app.tick();
            last_tick = Instant::now();
        }

        if app.should_quit {
            break;
        }
    }
    Ok(())
}

fn ui(frame: &mut Frame, app: &App) {
    let main_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(65), // Area for the arena
            Constraint::Percentage(27), // Area for the decision
            Constraint::Percentage(8),  // Area for help
        ])
        .split(frame.area());

    let turn = app.turn();
    let (shown, destroyed) = if app.forecast > 0 {
        let (later, destroyed) = turn.snapshot.after_detonations(app.forecast);
        (later, Some(destroyed.len()))
    } else {
        (turn.snapshot.clone(), None)
    };

    render_arena(frame, main_layout[0], &shown, &turn.decision, app.forecast == 0);
    render_decision(frame, main_layout[1], app, destroyed);

    let help_text = Paragraph::new(
        "←/→ step turns, space autoplay, +/- forecast turns, 'q' or 'Esc' to quit.",
    )
    .alignment(Alignment::Center)
    .block(Block::default().borders(Borders::TOP));
    frame.render_widget(help_text, main_layout[2]);
}

/// Renders the arena: hazard cells on red, the planned path in cyan.
fn render_arena(
    frame: &mut Frame,
    area: Rect,
    snapshot: &Snapshot,
    decision: &Decision,
    show_path: bool,
) {
    let board = snapshot.board();
    let hazard: HashSet<Position> = snapshot
        .bombs()
        .iter()
        .flat_map(|b| chain::blast_footprint(board, snapshot.items(), snapshot.bombs(), b))
        .collect();
    let path: HashSet<Position> = if show_path {
        decision.path.iter().map(|s| s.position()).collect()
    } else {
        HashSet::new()
    };
    let me = snapshot.my_id();

    let mut lines: Vec<Line> = Vec::with_capacity(board.height());
    for y in 0..board.height() {
        let mut spans: Vec<Span> = Vec::with_capacity(board.width());
        for x in 0..board.width() {
            let position = Position { x, y };
            let player = snapshot.players().iter().find(|p| p.position == position);
            let bomb = snapshot.bomb_at(position);
            let item = snapshot.item_at(position);

            let (glyph, mut style) = if let Some(player) = player {
                let color = if player.id == me {
                    Color::Red
                } else {
                    Color::Magenta
                };
                let glyph = if player.id == me { "@" } else { "&" };
                (glyph.to_string(), Style::default().fg(color).bold())
            } else if let Some(bomb) = bomb {
                (
                    (bomb.countdown % 10).to_string(),
                    Style::default().fg(Color::Yellow).bold(),
                )
            } else if let Some(item) = item {
                let glyph = match item.kind {
                    ItemKind::ExtraRange => "r",
                    ItemKind::ExtraBomb => "b",
                };
                (glyph.to_string(), Style::default().fg(Color::Green))
            } else {
                let crate_color = Style::default().fg(Color::Rgb(170, 110, 40));
                let (glyph, style) = match board.cell(position).unwrap_or_default() {
                    CellType::Floor if path.contains(&position) => {
                        ("·", Style::default().fg(Color::Cyan))
                    }
                    CellType::Floor => (" ", Style::default()),
                    CellType::Wall => ("#", Style::default().fg(Color::DarkGray)),
                    CellType::Box(BoxKind::Plain) => ("+", crate_color),
                    CellType::Box(_) => ("?", crate_color),
                };
                (glyph.to_string(), style)
            };
            if hazard.contains(&position) {
                style = style.bg(Color::Rgb(90, 0, 0));
            }
            spans.push(Span::styled(glyph, style));
        }
        lines.push(Line::from(spans));
    }

    let map_paragraph = Paragraph::new(lines)
        .block(Block::default().title("Arena").borders(Borders::ALL))
        .alignment(Alignment::Center);

    frame.render_widget(map_paragraph, area);
}

/// Renders the decision taken on the current turn and the live bombs.
fn render_decision(frame: &mut Frame, area: Rect, app: &App, destroyed: Option<usize>) {
    let turn = app.turn();
    let decision = &turn.decision;
    let me = turn.snapshot.me();

    let verdict_style = match decision.verdict {
        Verdict::Verified => Style::default().fg(Color::Green),
        Verdict::Degraded(_) => Style::default().fg(Color::Yellow),
        Verdict::Doomed => Style::default().fg(Color::Red).bold(),
    };

    let mut rows = vec![
        ListItem::from(format!(
            "Turn {}/{}  Agent {} at ({}, {})  Budget {}",
            app.current + 1,
            app.turns.len(),
            me.id,
            me.position.x,
            me.position.y,
            turn.snapshot.placement_budget(me)
        )),
        ListItem::from(format!("Plan: {:?}", decision.plan)),
        ListItem::from(Line::from(vec![
            Span::raw("Verdict: "),
            Span::styled(format!("{:?}", decision.verdict), verdict_style),
        ])),
        ListItem::from(format!(
            "Action: {}  (heading to ({}, {}))",
            decision.action(),
            decision.destination.x,
            decision.destination.y
        )),
    ];
    if let Some(destroyed) = destroyed {
        rows.push(ListItem::from(format!(
            "Forecast +{} turns: {} boxes/items destroyed",
            app.forecast, destroyed
        )));
    }
    for bomb in turn.snapshot.bombs() {
        rows.push(ListItem::from(format!(
            "Bomb of {} at ({}, {}): goes off in {}, range {}",
            bomb.owner, bomb.position.x, bomb.position.y, bomb.countdown, bomb.range
        )));
    }

    let widget = List::new(rows).block(Block::default().borders(Borders::ALL).title("Decision"));
    frame.render_widget(widget, area);
}
