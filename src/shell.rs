//! Application shell: the event loop around the gate controller.
//!
//! Every screen goes through [`GateShell::enter_screen`] before it renders.
//! OS flow results arrive on an `mpsc` channel and are drained by
//! [`GateShell::pump`] on the thread that owns the UI.

use crate::controller::GateController;
use crate::models::{Effect, EntryPoint, GateEvent, GateState, PromptAction};
use crate::platform::Platform;
use std::sync::mpsc::{self, Receiver, Sender};
use tracing::{debug, warn};

pub struct GateShell<P: Platform> {
    controller: GateController,
    platform: P,
    sender: Sender<GateEvent>,
    receiver: Receiver<GateEvent>,
}

impl<P: Platform> GateShell<P> {
    pub fn new(controller: GateController, platform: P) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            controller,
            platform,
            sender,
            receiver,
        }
    }

    pub fn controller(&self) -> &GateController {
        &self.controller
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    /// Handle for posting events from elsewhere on the UI thread
    pub fn sender(&self) -> Sender<GateEvent> {
        self.sender.clone()
    }

    pub fn has_exited(&self) -> bool {
        self.controller.state() == GateState::Exited
    }

    /// Initial launch
    pub fn launch(&mut self) -> bool {
        self.dispatch(GateEvent::Entry(EntryPoint::Launch));
        self.controller.is_granted()
    }

    /// Control came back to the application
    pub fn resume(&mut self) -> bool {
        self.dispatch(GateEvent::Entry(EntryPoint::Resume));
        self.controller.is_granted()
    }

    /// Guard for a protected screen. Returns whether it may render.
    pub fn enter_screen(&mut self, screen: &str) -> bool {
        self.dispatch(GateEvent::Entry(EntryPoint::Screen(screen.to_string())));
        self.controller.is_granted()
    }

    pub fn choose(&mut self, action: PromptAction) {
        self.dispatch(GateEvent::PromptAction(action));
    }

    /// Drain queued events. Returns how many were handled.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.receiver.try_recv() {
            self.dispatch(event);
            handled += 1;
        }
        handled
    }

    pub fn dispatch(&mut self, event: GateEvent) {
        let effects = self.controller.handle(event, &self.platform);
        for effect in effects {
            self.perform(effect);
        }
    }

    fn perform(&mut self, effect: Effect) {
        debug!(?effect, "performing effect");
        match effect {
            Effect::TintSurface { tint } => self.platform.tint_surface(tint),
            Effect::ShowPrompt { prompt } => self.platform.show_prompt(&prompt),
            Effect::LaunchSettings { intent } => {
                if let Err(e) = self.platform.launch_settings(&intent, self.sender.clone()) {
                    warn!(error = %e, "settings screen launch failed");
                    let _ = self.sender.send(GateEvent::LaunchFailed {
                        token: intent.token,
                    });
                }
            }
            Effect::RequestPermissions { request, token } => {
                if let Err(e) = self
                    .platform
                    .request_permissions(&request, self.sender.clone())
                {
                    warn!(error = %e, "runtime permission request failed");
                    let _ = self.sender.send(GateEvent::LaunchFailed { token });
                }
            }
            Effect::Proceed => self.platform.proceed(),
            Effect::Exit { code } => self.platform.exit(code),
        }
    }
}
