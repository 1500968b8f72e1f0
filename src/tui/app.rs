//! Application state and event handling for the interactive demo.

use crate::config::GateConfig;
use crate::controller::GateController;
use crate::models::{PlatformTier, PromptAction};
use crate::shell::GateShell;
use crate::sim::{OpenFlow, SimulatedPlatform};
use crate::storage::ScopedStorage;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend, widgets::ListState};
use std::io;
use std::panic::AssertUnwindSafe;
use tracing::{info, warn};

use super::ui;

const PROJECTS_DIR: &str = "projects";

/// What the terminal is currently showing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    /// Gate prompt over an empty application window
    Prompt,
    /// Simulated OS settings screen
    Settings,
    /// Simulated OS runtime permission dialog
    RuntimeDialog,
    /// The protected screen
    Projects,
    /// Nothing renders: the gate is waiting on the OS
    Blocked,
}

/// Options for [`run_demo`]
#[derive(Debug, Clone)]
pub struct DemoOptions {
    pub tier: PlatformTier,
    pub granted: bool,
    pub config: GateConfig,
}

pub struct App {
    pub shell: GateShell<SimulatedPlatform>,
    pub storage: ScopedStorage,
    pub selected_action: PromptAction,
    pub projects: Vec<String>,
    pub list_state: ListState,
    pub message: Option<String>,
    pub should_quit: bool,
    projects_open: bool,
}

impl App {
    pub fn new(options: &DemoOptions) -> Self {
        let controller = GateController::from_config(options.tier, &options.config);
        let platform = SimulatedPlatform::new(options.tier, options.granted);
        let storage = ScopedStorage::new(options.config.storage_root(), options.tier);

        let mut app = Self {
            shell: GateShell::new(controller, platform),
            storage,
            selected_action: PromptAction::Continue,
            projects: Vec::new(),
            list_state: ListState::default(),
            message: None,
            should_quit: false,
            projects_open: false,
        };
        app.shell.launch();
        app.sync();
        app
    }

    pub fn view(&self) -> View {
        let platform = self.shell.platform();
        match platform.open_flow() {
            Some(OpenFlow::Settings { .. }) => View::Settings,
            Some(OpenFlow::Runtime { .. }) => View::RuntimeDialog,
            None if platform.prompt().is_some() => View::Prompt,
            None if self.projects_open => View::Projects,
            None => View::Blocked,
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.shell.platform().exit_code()
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        self.message = None;

        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            self.should_quit = true;
            return;
        }

        match self.view() {
            View::Prompt => self.prompt_key(key.code),
            View::Settings => self.settings_key(key.code),
            View::RuntimeDialog => self.runtime_key(key.code),
            View::Projects => self.projects_key(key.code),
            View::Blocked => {
                if key.code == KeyCode::Char('r') {
                    self.resume();
                }
            }
        }
        self.sync();
    }

    fn prompt_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Left | KeyCode::Right | KeyCode::Tab | KeyCode::BackTab => {
                self.selected_action = match self.selected_action {
                    PromptAction::Continue => PromptAction::Exit,
                    PromptAction::Exit => PromptAction::Continue,
                };
            }
            KeyCode::Enter => self.shell.choose(self.selected_action),
            KeyCode::Char('c') => self.shell.choose(PromptAction::Continue),
            KeyCode::Char('x') => self.shell.choose(PromptAction::Exit),
            KeyCode::Esc | KeyCode::Char('q') => {
                self.message = Some("Choose Continue or Exit".to_string());
            }
            _ => {}
        }
    }

    fn settings_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Char(' ') | KeyCode::Enter => self.shell.platform_mut().toggle_settings(),
            KeyCode::Esc | KeyCode::Backspace | KeyCode::Char('b') => {
                self.shell.platform_mut().finish_settings();
            }
            _ => {}
        }
    }

    fn runtime_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Char('a') => self.shell.platform_mut().answer_runtime_prompt(true),
            KeyCode::Char('d') | KeyCode::Esc => {
                self.shell.platform_mut().answer_runtime_prompt(false);
            }
            _ => {}
        }
    }

    fn projects_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
            KeyCode::Char('n') => self.new_project(),
            KeyCode::Char('r') => self.resume(),
            KeyCode::Char('v') => {
                self.shell.platform_mut().set_granted(false);
                self.message = Some("Access revoked in system settings, press r".to_string());
            }
            KeyCode::Down | KeyCode::Char('j') => self.select_offset(1),
            KeyCode::Up | KeyCode::Char('k') => self.select_offset(-1),
            _ => {}
        }
    }

    /// Simulate control coming back from another app
    fn resume(&mut self) {
        self.projects_open = false;
        self.shell.resume();
    }

    fn new_project(&mut self) {
        let id = self.next_project_id();
        let rel = format!("{PROJECTS_DIR}/{id}");
        let lines = vec![format!("project {id}")];
        let result = self
            .storage
            .make_dirs(&rel)
            .and_then(|_| {
                self.storage
                    .write_lines(self.shell.platform(), &format!("{rel}/project.txt"), &lines)
            });
        match result {
            Ok(true) => self.message = Some(format!("✓ Created project {id}")),
            Ok(false) => self.message = Some("Storage access not held".to_string()),
            Err(e) => {
                warn!(error = %e, "project creation failed");
                self.message = Some(format!("Error: {e}"));
            }
        }
        self.reload_projects();
    }

    /// One past the largest numeric project id
    fn next_project_id(&self) -> u32 {
        self.projects
            .iter()
            .filter_map(|name| name.parse::<u32>().ok())
            .max()
            .map_or(1, |max| max + 1)
    }

    fn select_offset(&mut self, delta: i32) {
        if self.projects.is_empty() {
            return;
        }
        let len = self.projects.len() as i32;
        let current = self.list_state.selected().unwrap_or(0) as i32;
        let next = (current + delta).rem_euclid(len);
        self.list_state.select(Some(next as usize));
    }

    /// Drain OS results and open the protected screen once the gate allows it
    fn sync(&mut self) {
        self.shell.pump();
        if self.shell.controller().is_granted()
            && !self.projects_open
            && self.shell.enter_screen("projects")
        {
            self.projects_open = true;
            self.reload_projects();
        }
    }

    fn reload_projects(&mut self) {
        match self.storage.list(PROJECTS_DIR) {
            Ok(projects) => self.projects = projects,
            Err(e) => self.message = Some(format!("Error: {e}")),
        }
        self.list_state.select(if self.projects.is_empty() {
            None
        } else {
            Some(self.list_state.selected().unwrap_or(0).min(self.projects.len() - 1))
        });
    }
}

/// Run the demo. Returns the exit code the user chose on the gate prompt.
pub fn run_demo(options: &DemoOptions) -> io::Result<Option<i32>> {
    let mut app = App::new(options);
    info!(tier = %options.tier, granted = options.granted, "demo started");

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run the app with catch_unwind to ensure terminal cleanup on panic
    let result = std::panic::catch_unwind(AssertUnwindSafe(|| run_app(&mut terminal, &mut app)));

    // Always restore terminal, even on panic
    let _ = disable_raw_mode();
    let _ = execute!(terminal.backend_mut(), LeaveAlternateScreen);
    let _ = terminal.show_cursor();

    match result {
        Ok(io_result) => io_result.map(|_| app.exit_code()),
        Err(panic_payload) => std::panic::resume_unwind(panic_payload),
    }
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> io::Result<()>
where
    io::Error: From<B::Error>,
{
    loop {
        if app.exit_code().is_some() {
            return Ok(());
        }

        terminal.draw(|f| ui::draw(f, app))?;

        if app.should_quit {
            return Ok(());
        }

        if event::poll(std::time::Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                app.handle_key(key);
            }
        }
    }
}
