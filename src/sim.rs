//! In-memory operating system used by the demo and by tests.
//!
//! Launching a flow only records it. The flow finishes when the caller
//! plays the user's part with [`SimulatedPlatform::finish_settings`] or
//! [`SimulatedPlatform::answer_runtime_prompt`], which updates the grant and
//! posts the result event back to the gate.

use crate::error::{GateError, Result};
use crate::flow::SETTINGS_SCREEN_TIER;
use crate::models::{
    GateEvent, ModalPrompt, PermissionOutcome, PermissionRequest, PlatformTier, SettingsIntent,
    SurfaceTint,
};
use crate::platform::{CapabilityOracle, Platform};
use std::cell::Cell;
use std::sync::mpsc::Sender;
use tracing::debug;

/// Result code the settings screen reports when the user backs out
pub const RESULT_CANCELED: i32 = 0;

/// A flow the simulated OS is currently showing
#[derive(Debug, Clone)]
pub enum OpenFlow {
    Settings {
        intent: SettingsIntent,
        /// State of the "allow access to manage all files" toggle
        toggle: bool,
    },
    Runtime { request: PermissionRequest },
}

#[derive(Debug)]
pub struct SimulatedPlatform {
    tier: PlatformTier,
    granted: bool,
    open_flow: Option<(OpenFlow, Sender<GateEvent>)>,
    prompt: Option<ModalPrompt>,
    tint: Option<SurfaceTint>,
    exit_code: Option<i32>,
    fail_queries: bool,
    fail_launches: bool,
    queries: Cell<usize>,
    pub prompts_shown: usize,
    pub proceeds: usize,
}

impl SimulatedPlatform {
    pub fn new(tier: PlatformTier, granted: bool) -> Self {
        Self {
            tier,
            granted,
            open_flow: None,
            prompt: None,
            tint: None,
            exit_code: None,
            fail_queries: false,
            fail_launches: false,
            queries: Cell::new(0),
            prompts_shown: 0,
            proceeds: 0,
        }
    }

    pub fn tier(&self) -> PlatformTier {
        self.tier
    }

    pub fn granted(&self) -> bool {
        self.granted
    }

    /// Change the grant behind the application's back
    pub fn set_granted(&mut self, granted: bool) {
        self.granted = granted;
    }

    pub fn set_fail_queries(&mut self, fail: bool) {
        self.fail_queries = fail;
    }

    pub fn set_fail_launches(&mut self, fail: bool) {
        self.fail_launches = fail;
    }

    pub fn queries(&self) -> usize {
        self.queries.get()
    }

    pub fn prompt(&self) -> Option<&ModalPrompt> {
        self.prompt.as_ref()
    }

    pub fn tint(&self) -> Option<SurfaceTint> {
        self.tint
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    pub fn open_flow(&self) -> Option<&OpenFlow> {
        self.open_flow.as_ref().map(|(flow, _)| flow)
    }

    /// Flip the settings-screen toggle. No effect on any other screen.
    pub fn toggle_settings(&mut self) {
        if let Some((OpenFlow::Settings { toggle, .. }, _)) = &mut self.open_flow {
            *toggle = !*toggle;
        }
    }

    /// Leave the settings screen, applying the toggle. No effect unless the
    /// settings screen is open.
    pub fn finish_settings(&mut self) {
        if !matches!(self.open_flow, Some((OpenFlow::Settings { .. }, _))) {
            return;
        }
        let Some((OpenFlow::Settings { intent, toggle }, events)) = self.open_flow.take() else {
            return;
        };
        if self.tier >= SETTINGS_SCREEN_TIER {
            self.granted = toggle;
        }
        debug!(toggle, "settings screen closed");
        let _ = events.send(GateEvent::FlowResult {
            token: intent.token,
            result_code: RESULT_CANCELED,
        });
    }

    /// Answer every permission in the runtime prompt with `allow`. No effect
    /// unless the runtime prompt is open.
    pub fn answer_runtime_prompt(&mut self, allow: bool) {
        if !matches!(self.open_flow, Some((OpenFlow::Runtime { .. }, _))) {
            return;
        }
        let Some((OpenFlow::Runtime { request }, events)) = self.open_flow.take() else {
            return;
        };
        if self.tier < SETTINGS_SCREEN_TIER {
            self.granted = allow;
        }
        let outcome = if allow {
            PermissionOutcome::Granted
        } else {
            PermissionOutcome::Denied
        };
        debug!(allow, "runtime prompt answered");
        let _ = events.send(GateEvent::RuntimePromptResult {
            request_code: request.request_code,
            grant_results: vec![outcome; request.permissions.len()],
            permissions: request.permissions,
        });
    }

    fn begin(&mut self, flow: OpenFlow, events: Sender<GateEvent>) -> Result<()> {
        if self.fail_launches {
            let name = match flow {
                OpenFlow::Settings { .. } => "settings screen",
                OpenFlow::Runtime { .. } => "runtime prompt",
            };
            return Err(GateError::Launch {
                flow: name,
                reason: "activity not found".to_string(),
            });
        }
        self.cancel_open_flow();
        // The OS screen covers the application, including its prompt
        self.prompt = None;
        self.open_flow = Some((flow, events));
        Ok(())
    }

    /// A newer flow displaces the open one, which reports back as canceled
    fn cancel_open_flow(&mut self) {
        let Some((flow, events)) = self.open_flow.take() else {
            return;
        };
        debug!(?flow, "open flow displaced");
        let event = match flow {
            OpenFlow::Settings { intent, .. } => GateEvent::FlowResult {
                token: intent.token,
                result_code: RESULT_CANCELED,
            },
            OpenFlow::Runtime { request } => GateEvent::RuntimePromptResult {
                request_code: request.request_code,
                permissions: request.permissions,
                grant_results: Vec::new(),
            },
        };
        let _ = events.send(event);
    }
}

impl CapabilityOracle for SimulatedPlatform {
    fn is_access_granted(&self) -> Result<bool> {
        self.queries.set(self.queries.get() + 1);
        if self.fail_queries {
            return Err(GateError::Oracle("package manager unavailable".to_string()));
        }
        Ok(self.granted)
    }
}

impl Platform for SimulatedPlatform {
    fn tint_surface(&mut self, tint: SurfaceTint) {
        self.tint = Some(tint);
    }

    fn show_prompt(&mut self, prompt: &ModalPrompt) {
        self.prompts_shown += 1;
        self.prompt = Some(prompt.clone());
    }

    fn launch_settings(
        &mut self,
        intent: &SettingsIntent,
        events: Sender<GateEvent>,
    ) -> Result<()> {
        self.begin(
            OpenFlow::Settings {
                intent: intent.clone(),
                toggle: self.granted,
            },
            events,
        )
    }

    fn request_permissions(
        &mut self,
        request: &PermissionRequest,
        events: Sender<GateEvent>,
    ) -> Result<()> {
        self.begin(
            OpenFlow::Runtime {
                request: request.clone(),
            },
            events,
        )
    }

    fn proceed(&mut self) {
        self.proceeds += 1;
        self.prompt = None;
    }

    fn exit(&mut self, code: i32) {
        self.prompt = None;
        self.open_flow = None;
        self.exit_code = Some(code);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::{permission_request, settings_intent};
    use crate::models::RequestToken;
    use std::sync::mpsc;

    #[test]
    fn test_finish_settings_leaves_runtime_prompt_open() {
        let (tx, rx) = mpsc::channel();
        let mut os = SimulatedPlatform::new(PlatformTier(28), false);
        os.request_permissions(&permission_request(), tx).unwrap();

        os.finish_settings();
        assert!(matches!(os.open_flow(), Some(OpenFlow::Runtime { .. })));
        assert!(rx.try_recv().is_err());

        os.answer_runtime_prompt(true);
        assert!(os.open_flow().is_none());
        assert!(os.granted());
        assert!(matches!(
            rx.try_recv(),
            Ok(GateEvent::RuntimePromptResult { .. })
        ));
    }

    #[test]
    fn test_answer_runtime_prompt_leaves_settings_open() {
        let (tx, rx) = mpsc::channel();
        let mut os = SimulatedPlatform::new(PlatformTier(33), false);
        let token = RequestToken::new();
        os.launch_settings(&settings_intent("com.example.sketch", token), tx).unwrap();

        os.answer_runtime_prompt(true);
        assert!(matches!(os.open_flow(), Some(OpenFlow::Settings { .. })));
        assert!(!os.granted());
        assert!(rx.try_recv().is_err());

        os.toggle_settings();
        os.finish_settings();
        assert!(os.granted());
        assert!(matches!(
            rx.try_recv(),
            Ok(GateEvent::FlowResult { token: t, .. }) if t == token
        ));
    }

    #[test]
    fn test_displaced_flow_reports_canceled() {
        let (tx, rx) = mpsc::channel();
        let mut os = SimulatedPlatform::new(PlatformTier(28), false);
        os.request_permissions(&permission_request(), tx.clone()).unwrap();
        os.request_permissions(&permission_request(), tx).unwrap();

        assert!(matches!(
            rx.try_recv(),
            Ok(GateEvent::RuntimePromptResult { grant_results, .. }) if grant_results.is_empty()
        ));
        assert!(rx.try_recv().is_err());
        assert!(matches!(os.open_flow(), Some(OpenFlow::Runtime { .. })));
    }

    #[test]
    fn test_failed_launch_opens_nothing() {
        let (tx, _rx) = mpsc::channel();
        let mut os = SimulatedPlatform::new(PlatformTier(33), false);
        os.set_fail_launches(true);
        let err = os.request_permissions(&permission_request(), tx).unwrap_err();
        assert!(matches!(err, GateError::Launch { .. }));
        assert!(os.open_flow().is_none());
    }
}
