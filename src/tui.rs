use crate::path::PathSnapshot;
use crate::presenter::{Row as PathRow, Section, present};
use crate::state::PathState;
use crossterm::{
    ExecutableCommand,
    event::{self, KeyCode, KeyEventKind},
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Cell, List, ListItem, Paragraph, Row, Table},
};
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

/// Cursor over the navigable interface rows and the open sub-list, if any.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ViewState {
    pub selected: usize,
    pub open: Option<usize>,
}

impl ViewState {
    /// Applies a key press. Returns true when the view should exit.
    pub fn handle_key(&mut self, code: KeyCode, link_count: usize) -> bool {
        match code {
            KeyCode::Char('q') => return true,
            KeyCode::Esc | KeyCode::Backspace | KeyCode::Left => self.open = None,
            KeyCode::Enter | KeyCode::Right if self.open.is_none() && link_count > 0 => {
                self.open = Some(self.selected)
            }
            KeyCode::Down | KeyCode::Char('j') if self.open.is_none() && link_count > 0 => {
                self.selected = (self.selected + 1).min(link_count - 1)
            }
            KeyCode::Up | KeyCode::Char('k') if self.open.is_none() => {
                self.selected = self.selected.saturating_sub(1)
            }
            _ => {}
        }
        false
    }

    /// Keeps the cursor valid after the interface list changed size.
    pub fn clamp(&mut self, link_count: usize) {
        if link_count == 0 {
            self.selected = 0;
            self.open = None;
            return;
        }
        self.selected = self.selected.min(link_count - 1);
        if self.open.is_some_and(|i| i >= link_count) {
            self.open = None;
        }
    }
}

/// Navigable rows across all sections, in display order.
fn links(sections: &[Section]) -> Vec<(&str, &[String])> {
    sections
        .iter()
        .flat_map(|s| s.rows.iter())
        .filter_map(|r| match r {
            PathRow::Link { title, entries } => Some((title.as_str(), entries.as_slice())),
            _ => None,
        })
        .collect()
}

/// Interface rows are emitted in `path.interfaces` order.
fn gateway_count(path: &PathSnapshot, link_idx: usize) -> usize {
    path.interfaces
        .get(link_idx)
        .map_or(0, |iface| path.gateways_for(iface).count())
}

fn section_rows<'a>(sections: &'a [Section], path: &PathSnapshot, view: &ViewState) -> Vec<Row<'a>> {
    let mut rows = Vec::new();
    let mut link_idx = 0;
    for section in sections {
        rows.push(
            Row::new(vec![Cell::from(section.title.as_str())])
                .style(Style::default().add_modifier(Modifier::BOLD).fg(Color::Cyan)),
        );
        for row in &section.rows {
            match row {
                PathRow::Field {
                    label,
                    subtitle,
                    value,
                } => {
                    let mut label_lines = vec![Line::from(format!("  {}", label))];
                    if let Some(sub) = subtitle {
                        label_lines.push(
                            Line::from(format!("  {}", sub)).style(Style::default().fg(Color::DarkGray)),
                        );
                    }
                    let height = label_lines.len().max(value.lines().count()).max(1) as u16;
                    rows.push(
                        Row::new(vec![
                            Cell::from(Text::from(label_lines)),
                            Cell::from(value.as_str()),
                        ])
                        .height(height),
                    );
                }
                PathRow::Link { title, .. } => {
                    let mut style = Style::default();
                    if link_idx == view.selected {
                        style = style.add_modifier(Modifier::REVERSED);
                    }
                    rows.push(
                        Row::new(vec![
                            Cell::from(format!("  > {}", title)),
                            Cell::from(format!("{} gateway(s)", gateway_count(path, link_idx))),
                        ])
                        .style(style),
                    );
                    link_idx += 1;
                }
                PathRow::Message(text) => {
                    rows.push(
                        Row::new(vec![Cell::from(format!("  {}", text))])
                            .style(Style::default().fg(Color::DarkGray)),
                    );
                }
            }
        }
    }
    rows
}

fn draw(frame: &mut Frame, state: Option<&PathState>, view: &ViewState) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints(vec![Constraint::Length(3), Constraint::Min(0)])
        .split(frame.area());

    let Some(state) = state else {
        frame.render_widget(
            Paragraph::new("Waiting for network path...")
                .block(Block::default().borders(Borders::ALL).title("pathwatch")),
            layout[0],
        );
        return;
    };

    let sections = present(state);
    let header = Paragraph::new(format!(
        "Interfaces: {} | Gateways: {} | q quit, Enter open, Esc back",
        state.path.interfaces.len(),
        state.path.gateways.len()
    ))
    .block(Block::default().borders(Borders::ALL).title("pathwatch"));
    frame.render_widget(header, layout[0]);

    let links = links(&sections);
    if let Some((title, entries)) = view.open.and_then(|i| links.get(i)) {
        let items: Vec<ListItem> = entries.iter().map(|e| ListItem::new(e.as_str())).collect();
        let list = List::new(items).block(Block::default().borders(Borders::ALL).title(*title));
        frame.render_widget(list, layout[1]);
        return;
    }

    let table = Table::new(
        section_rows(&sections, &state.path, view),
        [Constraint::Percentage(40), Constraint::Percentage(60)],
    )
    .block(Block::default().borders(Borders::ALL).title("Network Path"));
    frame.render_widget(table, layout[1]);
}

pub async fn run(state_rx: watch::Receiver<Option<PathState>>, tick: Duration) -> anyhow::Result<()> {
    std::io::stdout().execute(EnterAlternateScreen)?;
    enable_raw_mode()?;
    let mut terminal = Terminal::new(CrosstermBackend::new(std::io::stdout()))?;
    let mut view = ViewState::default();

    info!("Terminal view started");
    let result: anyhow::Result<()> = loop {
        let state = state_rx.borrow().clone();
        let link_count = state
            .as_ref()
            .map(|s| s.path.interfaces.len())
            .unwrap_or(0);
        view.clamp(link_count);

        if let Err(e) = terminal.draw(|frame| draw(frame, state.as_ref(), &view)) {
            break Err(e.into());
        }

        match event::poll(tick) {
            Ok(true) => match event::read() {
                Ok(event::Event::Key(key)) if key.kind == KeyEventKind::Press => {
                    if view.handle_key(key.code, link_count) {
                        break Ok(());
                    }
                }
                Ok(_) => {}
                Err(e) => break Err(e.into()),
            },
            Ok(false) => {}
            Err(e) => break Err(e.into()),
        }
    };

    disable_raw_mode()?;
    std::io::stdout().execute(LeaveAlternateScreen)?;
    info!("Terminal view closed");
    result
}
