//! UI rendering for the interactive demo.

use super::app::{App, View};
use crate::flow::MANAGE_ALL_FILES_ACTION;
use crate::models::PromptAction;
use crate::sim::OpenFlow;
use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
};

pub fn draw(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(10),   // Main content
            Constraint::Length(3), // Footer/help
        ])
        .split(f.area());

    draw_header(f, app, chunks[0]);
    match app.view() {
        View::Projects => draw_projects(f, app, chunks[1]),
        View::Prompt => {
            draw_empty(f, chunks[1]);
            draw_prompt(f, app, chunks[1]);
        }
        View::Settings => draw_settings(f, app, chunks[1]),
        View::RuntimeDialog => {
            draw_empty(f, chunks[1]);
            draw_runtime_dialog(f, app, chunks[1]);
        }
        View::Blocked => draw_empty(f, chunks[1]),
    }
    draw_footer(f, app, chunks[2]);
}

fn surface_color(app: &App) -> Color {
    app.shell
        .platform()
        .tint()
        .map(|t| Color::Rgb(t.r, t.g, t.b))
        .unwrap_or(Color::Reset)
}

fn draw_header(f: &mut Frame, app: &App, area: Rect) {
    let platform = app.shell.platform();
    let grant = if platform.granted() {
        Span::styled("granted", Style::default().fg(Color::Green))
    } else {
        Span::styled("not granted", Style::default().fg(Color::Red))
    };

    let header = Paragraph::new(Line::from(vec![
        Span::styled(
            " storage-gate demo ",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!(" API {}  access: ", platform.tier())),
        grant,
    ]))
    .style(Style::default().bg(surface_color(app)))
    .block(Block::default().borders(Borders::ALL));

    f.render_widget(header, area);
}

fn draw_empty(f: &mut Frame, area: Rect) {
    f.render_widget(Block::default().borders(Borders::ALL), area);
}

fn draw_prompt(f: &mut Frame, app: &App, area: Rect) {
    let Some(prompt) = app.shell.platform().prompt() else {
        return;
    };
    let popup = centered(area, 60, 9);
    f.render_widget(Clear, popup);

    let button = |action: PromptAction| {
        let label = format!(" {} ", prompt.label(action));
        if action == app.selected_action {
            Span::styled(
                label,
                Style::default()
                    .fg(Color::Black)
                    .bg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            )
        } else {
            Span::styled(label, Style::default().fg(Color::Yellow))
        }
    };

    let text = vec![
        Line::from(prompt.message.clone()),
        Line::raw(""),
        Line::from(vec![
            button(PromptAction::Exit),
            Span::raw("   "),
            button(PromptAction::Continue),
        ])
        .alignment(Alignment::Right),
    ];

    let dialog = Paragraph::new(text)
        .wrap(Wrap { trim: true })
        .block(
            Block::default()
                .title(format!(" {} ", prompt.title))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Yellow)),
        );
    f.render_widget(dialog, popup);
}

fn draw_settings(f: &mut Frame, app: &App, area: Rect) {
    let Some(OpenFlow::Settings { intent, toggle }) = app.shell.platform().open_flow() else {
        return;
    };

    let switch = if *toggle {
        Span::styled(
            "[ on ]",
            Style::default()
                .fg(Color::Green)
                .add_modifier(Modifier::BOLD),
        )
    } else {
        Span::styled("[off ]", Style::default().fg(Color::DarkGray))
    };

    let text = vec![
        Line::from(Span::styled(
            intent.uri.trim_start_matches("package:").to_string(),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::raw(""),
        Line::from(vec![
            Span::raw("Allow access to manage all files  "),
            switch,
        ]),
        Line::raw(""),
        Line::from(Span::styled(
            MANAGE_ALL_FILES_ACTION,
            Style::default().fg(Color::DarkGray),
        )),
    ];

    let screen = Paragraph::new(text).block(
        Block::default()
            .title(" All files access ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Blue)),
    );
    f.render_widget(screen, area);
}

fn draw_runtime_dialog(f: &mut Frame, app: &App, area: Rect) {
    let Some(OpenFlow::Runtime { request }) = app.shell.platform().open_flow() else {
        return;
    };
    let popup = centered(area, 64, 6 + request.permissions.len() as u16);
    f.render_widget(Clear, popup);

    let mut text = vec![Line::from("Allow this app to access photos, media, and files?")];
    text.push(Line::raw(""));
    for permission in &request.permissions {
        text.push(Line::from(Span::styled(
            format!("  {permission}"),
            Style::default().fg(Color::DarkGray),
        )));
    }
    text.push(Line::raw(""));
    text.push(Line::from(vec![
        Span::styled("[a] Allow", Style::default().fg(Color::Green)),
        Span::raw("   "),
        Span::styled("[d] Deny", Style::default().fg(Color::Red)),
    ]));

    let dialog = Paragraph::new(text).block(
        Block::default()
            .title(" Permission ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Blue)),
    );
    f.render_widget(dialog, popup);
}

fn draw_projects(f: &mut Frame, app: &mut App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(5), Constraint::Length(3)])
        .split(area);

    let selected = app.list_state.selected();
    let items: Vec<ListItem> = app
        .projects
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let style = if Some(i) == selected {
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            let prefix = if Some(i) == selected { "▶ " } else { "  " };
            ListItem::new(Line::from(vec![
                Span::styled(prefix, style),
                Span::styled(format!("Project {name}"), style),
            ]))
        })
        .collect();

    let title = format!(" My projects ({}) ", app.storage.root().display());
    let list = List::new(items).block(Block::default().title(title).borders(Borders::ALL));
    f.render_stateful_widget(list, chunks[0], &mut app.list_state);

    let msg_text = app.message.as_deref().unwrap_or("");
    let msg_style = if msg_text.starts_with('✓') {
        Style::default().fg(Color::Green)
    } else if msg_text.starts_with("Error") {
        Style::default().fg(Color::Red)
    } else {
        Style::default().fg(Color::Yellow)
    };
    let msg_block = Paragraph::new(Span::styled(msg_text, msg_style))
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(msg_block, chunks[1]);
}

fn draw_footer(f: &mut Frame, app: &App, area: Rect) {
    let key = |k: &'static str, color: Color| Span::styled(k, Style::default().fg(color));
    let help_text = match app.view() {
        View::Prompt => Line::from(vec![
            key("←/→", Color::Yellow),
            Span::raw(" select  "),
            key("Enter", Color::Green),
            Span::raw(" choose  "),
            key("c", Color::Green),
            Span::raw(" continue  "),
            key("x", Color::Red),
            Span::raw(" exit"),
        ]),
        View::Settings => Line::from(vec![
            key("Space", Color::Yellow),
            Span::raw(" toggle  "),
            key("Esc", Color::Yellow),
            Span::raw(" back to app"),
        ]),
        View::RuntimeDialog => Line::from(vec![
            key("a", Color::Green),
            Span::raw(" allow  "),
            key("d", Color::Red),
            Span::raw(" deny"),
        ]),
        View::Projects => Line::from(vec![
            key("↑/↓", Color::Yellow),
            Span::raw(" nav  "),
            key("n", Color::Green),
            Span::raw(" new project  "),
            key("v", Color::Red),
            Span::raw(" revoke access  "),
            key("r", Color::Yellow),
            Span::raw(" resume  "),
            key("q", Color::Yellow),
            Span::raw(" quit"),
        ]),
        View::Blocked => Line::from(vec![key("r", Color::Yellow), Span::raw(" resume")]),
    };

    let footer_text = match (&app.message, app.view()) {
        (Some(msg), View::Prompt) => Line::from(Span::styled(
            msg.clone(),
            Style::default().fg(Color::Yellow),
        )),
        _ => help_text,
    };

    let footer = Paragraph::new(footer_text).block(Block::default().borders(Borders::ALL));
    f.render_widget(footer, area);
}

/// Rect of `width` x `height` centred in `area`, clamped to it
fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}
