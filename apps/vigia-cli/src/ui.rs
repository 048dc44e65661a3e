use std::{
    collections::{BTreeMap, VecDeque},
    sync::mpsc::{Receiver, TryRecvError},
    time::Duration,
};

use anyhow::Result;
use crossterm::{
    event::{self, Event as CEvent, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph},
    Terminal,
};
use tokio::sync::mpsc::Sender;
use vigia_orchestrator::UserCommand;
use vigia_types::{
    config::DisplayConfig,
    detection::MAIN_CAMERA_ID,
    events::{ClientEvent, EventPayload},
    geometry::Size,
};

const MAX_LOG_ENTRIES: usize = 120;

pub enum UiMessage {
    Event(ClientEvent),
    Shutdown,
}

/// Dashboard state folded from the client event stream.
#[derive(Default)]
struct Dashboard {
    status: String,
    multicam: bool,
    frames_sent: u64,
    feeds: BTreeMap<String, Vec<String>>,
    main_labels: Vec<String>,
    logs: VecDeque<String>,
}

impl Dashboard {
    fn apply(&mut self, event: &ClientEvent) {
        match &event.payload {
            EventPayload::Lifecycle(phase) => self.status = format!("{phase:?}"),
            EventPayload::FrameSent { .. } => self.frames_sent += 1,
            EventPayload::Rendered(render) => {
                if render.camera_id == MAIN_CAMERA_ID {
                    self.main_labels = render.labels.clone();
                } else {
                    self.feeds
                        .insert(render.camera_id.clone(), render.labels.clone());
                }
            }
            EventPayload::FeedCreated { camera_id } => {
                self.feeds.entry(camera_id.clone()).or_default();
            }
            EventPayload::FeedsCleared { .. } => self.feeds.clear(),
            EventPayload::Multicam { enabled } => self.multicam = *enabled,
            EventPayload::Server { .. } | EventPayload::Alert { .. } => {}
        }
        // Per-frame events would flood the log.
        if !matches!(
            event.payload,
            EventPayload::FrameSent { .. } | EventPayload::Rendered(_)
        ) {
            if self.logs.len() == MAX_LOG_ENTRIES {
                self.logs.pop_front();
            }
            self.logs.push_back(format_event(event));
        }
    }
}

pub fn run(
    receiver: Receiver<UiMessage>,
    commands: Sender<UserCommand>,
    summary: String,
    display: DisplayConfig,
) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.hide_cursor()?;

    let res = run_loop(&mut terminal, receiver, &commands, summary.as_str(), display);

    terminal.show_cursor()?;
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    res
}

fn run_loop<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    receiver: Receiver<UiMessage>,
    commands: &Sender<UserCommand>,
    summary: &str,
    display: DisplayConfig,
) -> Result<()> {
    let mut dashboard = Dashboard {
        status: "Starting".into(),
        ..Default::default()
    };
    let mut main_size = display.main_size;
    let mut tile_size = display.grid_tile_size;
    let mut should_close = false;

    loop {
        let mut receiver_closed = false;
        loop {
            match receiver.try_recv() {
                Ok(UiMessage::Event(event)) => dashboard.apply(&event),
                Ok(UiMessage::Shutdown) => should_close = true,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    receiver_closed = true;
                    should_close = true;
                    break;
                }
            }
        }

        terminal.draw(|f| {
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Length(3), Constraint::Min(0)].as_ref())
                .split(f.size());
            let body = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(40), Constraint::Percentage(60)].as_ref())
                .split(chunks[1]);

            let header = Paragraph::new(Line::from(vec![
                Span::styled(
                    "Vigia",
                    Style::default()
                        .fg(Color::Cyan)
                        .add_modifier(Modifier::BOLD),
                ),
                Span::raw("  "),
                Span::raw(dashboard.status.clone()),
                Span::raw(format!("  frames {}", dashboard.frames_sent)),
                Span::raw("  multicam "),
                Span::styled(
                    if dashboard.multicam { "on" } else { "off" },
                    Style::default().fg(if dashboard.multicam {
                        Color::Green
                    } else {
                        Color::DarkGray
                    }),
                ),
                Span::raw("  "),
                Span::styled("config:", Style::default().fg(Color::Magenta)),
                Span::raw(" "),
                Span::raw(summary),
                Span::raw("  "),
                Span::styled("m", Style::default().fg(Color::Yellow)),
                Span::raw(" multicam "),
                Span::styled("s", Style::default().fg(Color::Yellow)),
                Span::raw(" snapshot "),
                Span::styled("+/-", Style::default().fg(Color::Yellow)),
                Span::raw(" zoom "),
                Span::styled("q", Style::default().fg(Color::Yellow)),
                Span::raw(" quit"),
            ]))
            .block(Block::default().borders(Borders::ALL).title("Session"));
            f.render_widget(header, chunks[0]);

            let mut cameras = vec![ListItem::new(format!(
                "main {}  {}",
                main_size,
                dashboard.main_labels.join(", ")
            ))];
            cameras.extend(dashboard.feeds.iter().map(|(camera_id, labels)| {
                ListItem::new(format!("{camera_id} {tile_size}  {}", labels.join(", ")))
            }));
            let cameras = List::new(cameras)
                .block(Block::default().borders(Borders::ALL).title("Cameras"));
            f.render_widget(cameras, body[0]);

            let items: Vec<ListItem> = dashboard
                .logs
                .iter()
                .rev()
                .map(|entry| ListItem::new(entry.clone()))
                .collect();
            let list = List::new(items)
                .block(Block::default().borders(Borders::ALL).title("Recent events"))
                .highlight_style(Style::default().fg(Color::Yellow));
            f.render_widget(list, body[1]);
        })?;

        if should_close && receiver_closed {
            break;
        }

        if event::poll(Duration::from_millis(100))? {
            if let CEvent::Key(key) = event::read()? {
                match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => {
                        let _ = commands.blocking_send(UserCommand::Shutdown);
                        break;
                    }
                    KeyCode::Char('m') => {
                        let _ = commands.blocking_send(UserCommand::ToggleMulticam);
                    }
                    KeyCode::Char('s') => {
                        let _ = commands.blocking_send(UserCommand::Snapshot);
                    }
                    KeyCode::Char('+') | KeyCode::Char('-') => {
                        let grow = key.code == KeyCode::Char('+');
                        main_size = zoom(main_size, grow);
                        tile_size = zoom(tile_size, grow);
                        let _ = commands.blocking_send(UserCommand::ResizeMain(main_size));
                        let _ = commands.blocking_send(UserCommand::ResizeGrid(tile_size));
                    }
                    _ => {}
                }
            }
        }
    }

    Ok(())
}

/// Grows a layout size by 25% or shrinks it by the inverse step, never below
/// 16 pixels a side.
fn zoom(size: Size, grow: bool) -> Size {
    let step = |v: u32| {
        if grow {
            v + v / 4
        } else {
            (v - v / 5).max(16)
        }
    };
    Size::new(step(size.width), step(size.height))
}

fn format_event(event: &ClientEvent) -> String {
    let timestamp = event.timestamp.format("%H:%M:%S");
    match &event.payload {
        EventPayload::Lifecycle(phase) => format!("[{}] Lifecycle::{:?}", timestamp, phase),
        EventPayload::FrameSent { bytes } => format!("[{}] Frame sent ({} bytes)", timestamp, bytes),
        EventPayload::Rendered(render) => format!(
            "[{}] {} rendered [{}]",
            timestamp,
            render.camera_id,
            render.labels.join(", ")
        ),
        EventPayload::FeedCreated { camera_id } => {
            format!("[{}] Feed {} created", timestamp, camera_id)
        }
        EventPayload::FeedsCleared { count } => {
            format!("[{}] {} feed(s) cleared", timestamp, count)
        }
        EventPayload::Multicam { enabled } => format!("[{}] Multicam enabled={}", timestamp, enabled),
        EventPayload::Server { message } => format!("[{}] Server {}", timestamp, message),
        EventPayload::Alert { message } => format!("[{}] ALERT {}", timestamp, message),
    }
}
