//! Gate controller state machine.
//!
//! The controller is driven by [`GateEvent`]s and answers each one with a list
//! of [`Effect`]s for the shell to perform. It never performs I/O itself apart
//! from querying the [`CapabilityOracle`], and it re-queries the oracle on
//! every entry and every flow result instead of trusting any reported outcome.
//!
//! ```text
//! Unchecked -> Granted                     (gate steps aside)
//!           -> Ungranted -> PromptShown -> FlowLaunched -> Rechecking -> Unchecked ...
//!                                       -> Exited        (process ends)
//! ```

use crate::config::GateConfig;
use crate::flow::{PERMISSION_CODE, permission_request, select_flow, settings_intent};
use crate::models::{
    Effect, EntryPoint, FlowKind, GateEvent, GateState, GrantState, ModalPrompt, PendingRequest,
    PermissionOutcome, PlatformTier, PromptAction, RequestToken, SurfaceTint,
};
use crate::platform::CapabilityOracle;
use tracing::{debug, info, warn};

#[derive(Debug)]
pub struct GateController {
    tier: PlatformTier,
    package_name: String,
    prompt: ModalPrompt,
    tint: SurfaceTint,
    state: GateState,
    pending: Option<PendingRequest>,
    /// Runtime prompts retired before their result came back. The OS
    /// delivers those results in launch order, ahead of the live one.
    stale_runtime: usize,
}

impl GateController {
    pub fn new(tier: PlatformTier, package_name: impl Into<String>) -> Self {
        Self {
            tier,
            package_name: package_name.into(),
            prompt: ModalPrompt::default(),
            tint: SurfaceTint::default(),
            state: GateState::Unchecked,
            pending: None,
            stale_runtime: 0,
        }
    }

    pub fn from_config(tier: PlatformTier, config: &GateConfig) -> Self {
        Self::new(tier, config.package_name.clone())
            .with_prompt(config.prompt.to_modal())
            .with_tint(config.tint())
    }

    pub fn with_prompt(mut self, prompt: ModalPrompt) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn with_tint(mut self, tint: SurfaceTint) -> Self {
        self.tint = tint;
        self
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn tier(&self) -> PlatformTier {
        self.tier
    }

    pub fn pending(&self) -> Option<&PendingRequest> {
        self.pending.as_ref()
    }

    pub fn is_granted(&self) -> bool {
        self.state == GateState::Granted
    }

    /// Route one event. After `Exited` every event is dropped.
    pub fn handle(&mut self, event: GateEvent, oracle: &dyn CapabilityOracle) -> Vec<Effect> {
        if self.state == GateState::Exited {
            debug!(?event, "gate exited, dropping event");
            return Vec::new();
        }

        match event {
            GateEvent::Entry(entry) => self.on_entry(&entry, oracle),
            GateEvent::PromptAction(action) => self.on_prompt_action(action),
            GateEvent::FlowResult { token, result_code } => {
                self.on_flow_result(token, result_code, oracle)
            }
            GateEvent::RuntimePromptResult {
                request_code,
                grant_results,
                ..
            } => self.on_runtime_prompt_result(request_code, &grant_results, oracle),
            GateEvent::LaunchFailed { token } => self.on_launch_failed(token, oracle),
        }
    }

    /// Check the grant at an entry point. Tints the surface every time,
    /// prompts only when ungranted.
    pub fn on_entry(&mut self, entry: &EntryPoint, oracle: &dyn CapabilityOracle) -> Vec<Effect> {
        debug!(%entry, "entry");
        self.transition(GateState::Unchecked);

        let mut effects = vec![Effect::TintSurface { tint: self.tint }];
        let grant = self.query(oracle);
        effects.extend(self.settle(grant));
        effects
    }

    pub fn present_prompt(&mut self) -> Effect {
        self.transition(GateState::PromptShown);
        Effect::ShowPrompt {
            prompt: self.prompt.clone(),
        }
    }

    pub fn on_prompt_action(&mut self, action: PromptAction) -> Vec<Effect> {
        match action {
            PromptAction::Exit => {
                info!("user chose exit, terminating");
                self.pending = None;
                self.transition(GateState::Exited);
                vec![Effect::Exit { code: 0 }]
            }
            PromptAction::Continue if self.state != GateState::PromptShown => {
                warn!(state = ?self.state, "continue without a visible prompt, ignoring");
                Vec::new()
            }
            PromptAction::Continue => vec![self.launch_flow()],
        }
    }

    /// Settings-screen flow returned. The token only clears the pending
    /// request and the result code is never read; the grant is re-derived.
    pub fn on_flow_result(
        &mut self,
        token: RequestToken,
        _result_code: i32,
        oracle: &dyn CapabilityOracle,
    ) -> Vec<Effect> {
        match &self.pending {
            Some(pending) if pending.token == token => {
                debug!(%token, elapsed_ms = pending.elapsed_ms(), "settings flow returned");
                self.pending = None;
            }
            Some(pending) => {
                warn!(%token, current = %pending.token, "stale flow result");
            }
            None => debug!(%token, "flow result with no pending request"),
        }
        self.recheck(oracle)
    }

    /// Runtime prompt returned. Results for other request codes belong to
    /// someone else and leave the gate untouched.
    pub fn on_runtime_prompt_result(
        &mut self,
        request_code: i32,
        _grant_results: &[PermissionOutcome],
        oracle: &dyn CapabilityOracle,
    ) -> Vec<Effect> {
        if request_code != PERMISSION_CODE {
            debug!(request_code, "foreign permission result, ignoring");
            return Vec::new();
        }

        if self.stale_runtime > 0 {
            self.stale_runtime -= 1;
            debug!(remaining = self.stale_runtime, "result for a retired runtime prompt");
        } else if self
            .pending
            .as_ref()
            .is_some_and(|p| p.kind == FlowKind::RuntimePrompt)
        {
            self.pending = None;
        }
        self.recheck(oracle)
    }

    /// The platform could not start the flow. Treated like a result that
    /// left the grant unchanged.
    pub fn on_launch_failed(
        &mut self,
        token: RequestToken,
        oracle: &dyn CapabilityOracle,
    ) -> Vec<Effect> {
        if self.pending.as_ref().is_some_and(|p| p.token == token) {
            self.pending = None;
        }
        warn!(%token, "grant flow failed to launch");
        self.recheck(oracle)
    }

    fn launch_flow(&mut self) -> Effect {
        let kind = select_flow(self.tier);
        let pending = PendingRequest::new(kind);
        let token = pending.token;
        if let Some(previous) = self.retire_pending() {
            warn!(previous = %previous.token, "superseding in-flight grant flow");
        }
        self.pending = Some(pending);
        self.transition(GateState::FlowLaunched);
        info!(tier = %self.tier, flow = kind.as_str(), %token, "launching grant flow");

        match kind {
            FlowKind::SettingsScreen => Effect::LaunchSettings {
                intent: settings_intent(&self.package_name, token),
            },
            FlowKind::RuntimePrompt => Effect::RequestPermissions {
                request: permission_request(),
                token,
            },
        }
    }

    fn recheck(&mut self, oracle: &dyn CapabilityOracle) -> Vec<Effect> {
        self.transition(GateState::Rechecking);
        self.transition(GateState::Unchecked);
        let grant = self.query(oracle);
        self.settle(grant)
    }

    /// Take the pending request whose result is still owed by the OS
    fn retire_pending(&mut self) -> Option<PendingRequest> {
        let retired = self.pending.take()?;
        if retired.kind == FlowKind::RuntimePrompt {
            self.stale_runtime += 1;
        }
        Some(retired)
    }

    fn settle(&mut self, grant: GrantState) -> Vec<Effect> {
        match grant {
            GrantState::Granted => {
                if let Some(stale) = self.retire_pending() {
                    debug!(token = %stale.token, "grant held, dropping pending request");
                }
                self.transition(GateState::Granted);
                vec![Effect::Proceed]
            }
            GrantState::Ungranted => {
                self.transition(GateState::Ungranted);
                vec![self.present_prompt()]
            }
        }
    }

    fn query(&self, oracle: &dyn CapabilityOracle) -> GrantState {
        match oracle.is_access_granted() {
            Ok(granted) => GrantState::from_granted(granted),
            Err(e) => {
                warn!(error = %e, "capability query failed, treating as ungranted");
                GrantState::Ungranted
            }
        }
    }

    fn transition(&mut self, next: GateState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "gate transition");
            if next == GateState::Granted {
                info!("storage access granted");
            }
        }
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{GateError, Result};
    use crate::flow::{LEGACY_PERMISSIONS, MANAGE_ALL_FILES_ACTION};
    use proptest::prelude::*;
    use std::cell::Cell;

    /// Oracle with a switchable answer that counts queries
    #[derive(Default)]
    struct FakeOracle {
        granted: Cell<bool>,
        failing: Cell<bool>,
        queries: Cell<usize>,
    }

    impl FakeOracle {
        fn granted() -> Self {
            let oracle = Self::default();
            oracle.granted.set(true);
            oracle
        }
    }

    impl CapabilityOracle for FakeOracle {
        fn is_access_granted(&self) -> Result<bool> {
            self.queries.set(self.queries.get() + 1);
            if self.failing.get() {
                return Err(GateError::Oracle("service unavailable".into()));
            }
            Ok(self.granted.get())
        }
    }

    fn controller(tier: u32) -> GateController {
        GateController::new(PlatformTier(tier), "com.example.sketch")
    }

    fn prompts(effects: &[Effect]) -> usize {
        effects.iter().filter(|e| e.is_prompt()).count()
    }

    fn launch(gate: &mut GateController, oracle: &FakeOracle) -> Effect {
        gate.on_entry(&EntryPoint::Launch, oracle);
        let mut effects = gate.on_prompt_action(PromptAction::Continue);
        assert_eq!(effects.len(), 1);
        effects.remove(0)
    }

    #[test]
    fn test_granted_entry_never_prompts() {
        let oracle = FakeOracle::granted();
        let mut gate = controller(33);
        let effects = gate.on_entry(&EntryPoint::Launch, &oracle);
        assert_eq!(prompts(&effects), 0);
        assert!(effects.contains(&Effect::Proceed));
        assert_eq!(gate.state(), GateState::Granted);
    }

    #[test]
    fn test_ungranted_entry_prompts_once() {
        let oracle = FakeOracle::default();
        let mut gate = controller(33);
        let effects = gate.on_entry(&EntryPoint::Launch, &oracle);
        assert_eq!(prompts(&effects), 1);
        assert_eq!(gate.state(), GateState::PromptShown);

        // Not suppressed on the next entry
        let effects = gate.on_entry(&EntryPoint::Resume, &oracle);
        assert_eq!(prompts(&effects), 1);
    }

    #[test]
    fn test_tint_applied_once_per_entry_regardless_of_grant() {
        for granted in [true, false] {
            let oracle = FakeOracle::default();
            oracle.granted.set(granted);
            let mut gate = controller(30);
            let effects = gate.on_entry(&EntryPoint::Launch, &oracle);
            let tints = effects
                .iter()
                .filter(|e| matches!(e, Effect::TintSurface { .. }))
                .count();
            assert_eq!(tints, 1);
        }
    }

    #[test]
    fn test_grant_is_rederived_on_every_entry() {
        let oracle = FakeOracle::granted();
        let mut gate = controller(33);
        gate.on_entry(&EntryPoint::Launch, &oracle);
        oracle.granted.set(false);
        let effects = gate.on_entry(&EntryPoint::Resume, &oracle);
        assert_eq!(prompts(&effects), 1);
        assert_eq!(oracle.queries.get(), 2);
    }

    #[test]
    fn test_exit_terminates_regardless_of_grant() {
        let oracle = FakeOracle::default();
        let mut gate = controller(33);
        gate.on_entry(&EntryPoint::Launch, &oracle);
        oracle.granted.set(true);
        let effects = gate.on_prompt_action(PromptAction::Exit);
        assert_eq!(effects, vec![Effect::Exit { code: 0 }]);
        assert_eq!(gate.state(), GateState::Exited);

        let mut gate = controller(33);
        gate.on_entry(&EntryPoint::Launch, &oracle);
        let effects = gate.on_prompt_action(PromptAction::Exit);
        assert_eq!(effects, vec![Effect::Exit { code: 0 }]);
    }

    #[test]
    fn test_events_after_exit_are_dropped() {
        let oracle = FakeOracle::default();
        let mut gate = controller(33);
        gate.handle(GateEvent::Entry(EntryPoint::Launch), &oracle);
        gate.handle(GateEvent::PromptAction(PromptAction::Exit), &oracle);
        let queries = oracle.queries.get();
        let effects = gate.handle(GateEvent::Entry(EntryPoint::Resume), &oracle);
        assert!(effects.is_empty());
        assert_eq!(oracle.queries.get(), queries);
    }

    #[test]
    fn test_continue_above_cutoff_launches_settings() {
        let oracle = FakeOracle::default();
        let mut gate = controller(30);
        let Effect::LaunchSettings { intent } = launch(&mut gate, &oracle) else {
            panic!("expected settings launch");
        };
        assert_eq!(intent.uri, "package:com.example.sketch");
        assert_eq!(intent.action, MANAGE_ALL_FILES_ACTION);
        let pending = gate.pending().unwrap();
        assert_eq!(pending.token, intent.token);
        assert_eq!(pending.kind, FlowKind::SettingsScreen);
        assert_eq!(gate.state(), GateState::FlowLaunched);
    }

    #[test]
    fn test_continue_below_cutoff_requests_legacy_permissions() {
        let oracle = FakeOracle::default();
        let mut gate = controller(28);
        let Effect::RequestPermissions { request, .. } = launch(&mut gate, &oracle) else {
            panic!("expected runtime prompt");
        };
        assert_eq!(request.request_code, PERMISSION_CODE);
        assert_eq!(request.permissions, LEGACY_PERMISSIONS);
        assert_eq!(gate.pending().unwrap().kind, FlowKind::RuntimePrompt);
    }

    #[test]
    fn test_continue_without_prompt_is_ignored() {
        let oracle = FakeOracle::granted();
        let mut gate = controller(33);
        gate.on_entry(&EntryPoint::Launch, &oracle);
        assert!(gate.on_prompt_action(PromptAction::Continue).is_empty());
        assert!(gate.pending().is_none());
    }

    #[test]
    fn test_flow_result_payload_is_unused() {
        let oracle = FakeOracle::default();
        let mut gate = controller(33);
        let Effect::LaunchSettings { intent } = launch(&mut gate, &oracle) else {
            panic!("expected settings launch");
        };
        let before = oracle.queries.get();

        // An "OK" result code does not grant anything
        let effects = gate.on_flow_result(intent.token, -1, &oracle);
        assert_eq!(oracle.queries.get(), before + 1);
        assert_eq!(prompts(&effects), 1);
        assert!(gate.pending().is_none());
    }

    #[test]
    fn test_runtime_result_outcomes_are_unused() {
        let oracle = FakeOracle::default();
        let mut gate = controller(28);
        launch(&mut gate, &oracle);
        let effects = gate.on_runtime_prompt_result(
            PERMISSION_CODE,
            &[PermissionOutcome::Granted, PermissionOutcome::Granted],
            &oracle,
        );
        assert_eq!(prompts(&effects), 1);
    }

    #[test]
    fn test_foreign_request_code_is_ignored() {
        let oracle = FakeOracle::default();
        let mut gate = controller(28);
        launch(&mut gate, &oracle);
        let queries = oracle.queries.get();
        let pending = gate.pending().cloned();

        let effects = gate.handle(
            GateEvent::RuntimePromptResult {
                request_code: 42,
                permissions: vec!["android.permission.CAMERA".into()],
                grant_results: vec![PermissionOutcome::Denied],
            },
            &oracle,
        );
        assert!(effects.is_empty());
        assert_eq!(gate.state(), GateState::FlowLaunched);
        assert_eq!(gate.pending().cloned(), pending);
        assert_eq!(oracle.queries.get(), queries);
    }

    #[test]
    fn test_legacy_tier_denied_scenario() {
        let oracle = FakeOracle::default();
        let mut gate = controller(28);
        gate.handle(GateEvent::Entry(EntryPoint::Launch), &oracle);
        let effects = gate.handle(GateEvent::PromptAction(PromptAction::Continue), &oracle);
        let Effect::RequestPermissions { request, .. } = &effects[0] else {
            panic!("expected runtime prompt");
        };
        assert_eq!(request.permissions, LEGACY_PERMISSIONS);

        let effects = gate.handle(
            GateEvent::RuntimePromptResult {
                request_code: request.request_code,
                permissions: request.permissions.clone(),
                grant_results: vec![PermissionOutcome::Denied, PermissionOutcome::Denied],
            },
            &oracle,
        );
        assert_eq!(prompts(&effects), 1);
        assert_eq!(gate.state(), GateState::PromptShown);
        assert!(gate.pending().is_none());
    }

    #[test]
    fn test_settings_granted_scenario() {
        let oracle = FakeOracle::default();
        let mut gate = controller(31);
        gate.handle(GateEvent::Entry(EntryPoint::Launch), &oracle);
        let effects = gate.handle(GateEvent::PromptAction(PromptAction::Continue), &oracle);
        let Effect::LaunchSettings { intent } = &effects[0] else {
            panic!("expected settings launch");
        };

        oracle.granted.set(true);
        let effects = gate.handle(
            GateEvent::FlowResult {
                token: intent.token,
                result_code: 0,
            },
            &oracle,
        );
        assert_eq!(effects, vec![Effect::Proceed]);
        assert!(gate.is_granted());
        assert!(gate.pending().is_none());
    }

    #[test]
    fn test_oracle_failure_reads_as_ungranted() {
        let oracle = FakeOracle::granted();
        oracle.failing.set(true);
        let mut gate = controller(33);
        let effects = gate.on_entry(&EntryPoint::Launch, &oracle);
        assert_eq!(prompts(&effects), 1);
    }

    #[test]
    fn test_launch_failure_reprompts() {
        let oracle = FakeOracle::default();
        let mut gate = controller(33);
        let Effect::LaunchSettings { intent } = launch(&mut gate, &oracle) else {
            panic!("expected settings launch");
        };
        let effects = gate.handle(GateEvent::LaunchFailed { token: intent.token }, &oracle);
        assert_eq!(prompts(&effects), 1);
        assert!(gate.pending().is_none());
    }

    #[test]
    fn test_second_continue_supersedes_pending() {
        let oracle = FakeOracle::default();
        let mut gate = controller(33);
        let first = launch(&mut gate, &oracle);
        let second = launch(&mut gate, &oracle);
        let (Effect::LaunchSettings { intent: a }, Effect::LaunchSettings { intent: b }) =
            (first, second)
        else {
            panic!("expected settings launches");
        };
        assert_ne!(a.token, b.token);
        assert_eq!(gate.pending().unwrap().token, b.token);

        // The superseded flow returns while the newer one is still out
        let effects = gate.on_flow_result(a.token, 0, &oracle);
        assert_eq!(prompts(&effects), 1);
        assert_eq!(gate.state(), GateState::PromptShown);
        assert_eq!(gate.pending().unwrap().token, b.token);

        let effects = gate.on_flow_result(b.token, 0, &oracle);
        assert_eq!(prompts(&effects), 1);
        assert!(gate.pending().is_none());
    }

    #[test]
    fn test_stale_result_after_reentry_keeps_continue_live() {
        let oracle = FakeOracle::default();
        let mut gate = controller(33);
        let Effect::LaunchSettings { intent: a } = launch(&mut gate, &oracle) else {
            panic!("expected settings launch");
        };
        launch(&mut gate, &oracle);
        gate.on_entry(&EntryPoint::Resume, &oracle);
        assert_eq!(gate.state(), GateState::PromptShown);

        // The prompt on screen must stay answerable
        let effects = gate.on_flow_result(a.token, 0, &oracle);
        assert_eq!(prompts(&effects), 1);
        assert_eq!(gate.state(), GateState::PromptShown);

        let effects = gate.on_prompt_action(PromptAction::Continue);
        assert!(matches!(effects.as_slice(), [Effect::LaunchSettings { .. }]));
        assert_eq!(gate.state(), GateState::FlowLaunched);
    }

    #[test]
    fn test_stale_result_grants_when_access_held() {
        let oracle = FakeOracle::default();
        let mut gate = controller(33);
        let Effect::LaunchSettings { intent: a } = launch(&mut gate, &oracle) else {
            panic!("expected settings launch");
        };
        launch(&mut gate, &oracle);
        oracle.granted.set(true);
        let effects = gate.on_flow_result(a.token, 0, &oracle);
        assert_eq!(effects, vec![Effect::Proceed]);
        assert!(gate.pending().is_none());
    }

    #[test]
    fn test_superseded_runtime_result_keeps_newer_pending() {
        let oracle = FakeOracle::default();
        let mut gate = controller(28);
        launch(&mut gate, &oracle);
        let Effect::RequestPermissions { token: newer, .. } = launch(&mut gate, &oracle) else {
            panic!("expected runtime prompt");
        };

        let denied = [PermissionOutcome::Denied, PermissionOutcome::Denied];
        let effects = gate.on_runtime_prompt_result(PERMISSION_CODE, &denied, &oracle);
        assert_eq!(prompts(&effects), 1);
        assert_eq!(gate.pending().unwrap().token, newer);

        let effects = gate.on_runtime_prompt_result(PERMISSION_CODE, &denied, &oracle);
        assert_eq!(prompts(&effects), 1);
        assert!(gate.pending().is_none());
    }

    #[test]
    fn test_runtime_result_after_grant_does_not_clear_next_request() {
        let oracle = FakeOracle::default();
        let mut gate = controller(28);
        launch(&mut gate, &oracle);

        // Granted elsewhere before the dialog answered, then revoked again
        oracle.granted.set(true);
        gate.on_entry(&EntryPoint::Resume, &oracle);
        assert!(gate.pending().is_none());
        oracle.granted.set(false);
        let Effect::RequestPermissions { token, .. } = launch(&mut gate, &oracle) else {
            panic!("expected runtime prompt");
        };

        gate.on_runtime_prompt_result(PERMISSION_CODE, &[], &oracle);
        assert_eq!(gate.pending().unwrap().token, token);
    }

    #[test]
    fn test_loop_has_no_bound() {
        let oracle = FakeOracle::default();
        let mut gate = controller(33);
        gate.on_entry(&EntryPoint::Launch, &oracle);
        for _ in 0..50 {
            let effects = gate.on_prompt_action(PromptAction::Continue);
            let Effect::LaunchSettings { intent } = &effects[0] else {
                panic!("expected settings launch");
            };
            let effects = gate.on_flow_result(intent.token, 0, &oracle);
            assert_eq!(prompts(&effects), 1);
        }
    }

    proptest! {
        #[test]
        fn prompt_count_matches_ungranted_entries(grants in proptest::collection::vec(any::<bool>(), 1..40)) {
            let oracle = FakeOracle::default();
            let mut gate = controller(33);
            for granted in grants {
                oracle.granted.set(granted);
                let effects = gate.handle(GateEvent::Entry(EntryPoint::Resume), &oracle);
                prop_assert_eq!(prompts(&effects), usize::from(!granted));
                prop_assert_eq!(effects.contains(&Effect::Proceed), granted);
            }
        }

        #[test]
        fn at_most_one_pending(steps in proptest::collection::vec(0u8..4, 1..60)) {
            let oracle = FakeOracle::default();
            let mut gate = controller(33);
            let mut last_token = None;
            for step in steps {
                let effects = match step {
                    0 => gate.handle(GateEvent::Entry(EntryPoint::Resume), &oracle),
                    1 => gate.handle(GateEvent::PromptAction(PromptAction::Continue), &oracle),
                    2 => match last_token {
                        Some(token) => gate.handle(GateEvent::FlowResult { token, result_code: 0 }, &oracle),
                        None => Vec::new(),
                    },
                    _ => {
                        oracle.granted.set(!oracle.granted.get());
                        Vec::new()
                    }
                };
                for effect in &effects {
                    if let Effect::LaunchSettings { intent } = effect {
                        last_token = Some(intent.token);
                    }
                }
                if let Some(pending) = gate.pending() {
                    prop_assert_eq!(Some(pending.token), last_token);
                }
                if gate.is_granted() {
                    prop_assert!(gate.pending().is_none());
                }
            }
        }
    }
}
