//! Core types for the storage gate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Platform API level of the running OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlatformTier(pub u32);

impl fmt::Display for PlatformTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Derived on demand from the capability oracle, never stored across entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GrantState {
    Granted,
    Ungranted,
}

impl GrantState {
    pub fn from_granted(granted: bool) -> Self {
        if granted { Self::Granted } else { Self::Ungranted }
    }
}

/// Gate controller state.
///
/// `Ungranted` and `Rechecking` are transient: they are entered and left
/// within a single event. `Exited` is terminal for the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    Unchecked,
    Granted,
    Ungranted,
    PromptShown,
    FlowLaunched,
    Rechecking,
    Exited,
}

/// Which OS mechanism is used to ask for the grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowKind {
    /// System settings screen dedicated to this application
    SettingsScreen,
    /// Standard runtime multi-permission prompt
    RuntimePrompt,
}

impl FlowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SettingsScreen => "settings screen",
            Self::RuntimePrompt => "runtime prompt",
        }
    }
}

/// Correlation token for an in-flight OS grant flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestToken(pub Uuid);

impl RequestToken {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The single outstanding OS grant flow, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    pub token: RequestToken,
    pub kind: FlowKind,
    pub launched_at: DateTime<Utc>,
}

impl PendingRequest {
    pub fn new(kind: FlowKind) -> Self {
        Self {
            token: RequestToken::new(),
            kind,
            launched_at: Utc::now(),
        }
    }

    /// Milliseconds since the flow was launched
    pub fn elapsed_ms(&self) -> i64 {
        (Utc::now() - self.launched_at).num_milliseconds()
    }
}

/// The two actions on the modal prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptAction {
    Continue,
    Exit,
}

/// Blocking prompt descriptor. Dismissal gestures never close it, only a
/// chosen action does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModalPrompt {
    pub title: String,
    pub message: String,
    pub continue_label: String,
    pub exit_label: String,
}

impl ModalPrompt {
    pub fn label(&self, action: PromptAction) -> &str {
        match action {
            PromptAction::Continue => &self.continue_label,
            PromptAction::Exit => &self.exit_label,
        }
    }
}

impl Default for ModalPrompt {
    fn default() -> Self {
        Self {
            title: "File access required".to_string(),
            message: "This app needs access to all files on the device storage to open and \
                      save your projects. Grant access to continue, or exit."
                .to_string(),
            continue_label: "Continue".to_string(),
            exit_label: "Exit".to_string(),
        }
    }
}

/// Cosmetic surface colour applied on every entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceTint {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl SurfaceTint {
    /// Parse `#rrggbb`
    pub fn parse(s: &str) -> Option<Self> {
        let hex = s.strip_prefix('#')?;
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        Some(Self {
            r: channel(0)?,
            g: channel(2)?,
            b: channel(4)?,
        })
    }
}

impl Default for SurfaceTint {
    fn default() -> Self {
        Self {
            r: 0x1c,
            g: 0x1b,
            b: 0x1f,
        }
    }
}

impl fmt::Display for SurfaceTint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Target of the settings-screen flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettingsIntent {
    pub action: String,
    pub uri: String,
    pub token: RequestToken,
}

/// Arguments to the runtime multi-permission prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRequest {
    pub request_code: i32,
    pub permissions: Vec<String>,
}

/// Per-permission outcome reported by the runtime prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionOutcome {
    Granted,
    Denied,
}

/// Where control entered the application
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryPoint {
    Launch,
    Resume,
    Screen(String),
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Launch => write!(f, "launch"),
            Self::Resume => write!(f, "resume"),
            Self::Screen(name) => write!(f, "screen:{name}"),
        }
    }
}

/// Messages delivered to the gate's event loop
#[derive(Debug, Clone, PartialEq)]
pub enum GateEvent {
    Entry(EntryPoint),
    PromptAction(PromptAction),
    /// Settings-screen flow returned. `result_code` is opaque.
    FlowResult { token: RequestToken, result_code: i32 },
    /// Runtime prompt returned
    RuntimePromptResult {
        request_code: i32,
        permissions: Vec<String>,
        grant_results: Vec<PermissionOutcome>,
    },
    /// The platform refused to start the flow
    LaunchFailed { token: RequestToken },
}

/// Instructions the controller hands back to the shell
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum Effect {
    TintSurface { tint: SurfaceTint },
    ShowPrompt { prompt: ModalPrompt },
    LaunchSettings { intent: SettingsIntent },
    RequestPermissions { request: PermissionRequest, token: RequestToken },
    /// Grant confirmed, protected screens may render
    Proceed,
    Exit { code: i32 },
}

impl Effect {
    pub fn is_prompt(&self) -> bool {
        matches!(self, Self::ShowPrompt { .. })
    }
}
