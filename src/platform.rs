//! Seams to the operating system.

use crate::error::Result;
use crate::models::{GateEvent, ModalPrompt, PermissionRequest, SettingsIntent, SurfaceTint};
use std::sync::mpsc::Sender;

/// Answers whether the storage grant is currently held.
///
/// Implementations must not cache: the grant can change while control is
/// outside the application.
pub trait CapabilityOracle {
    fn is_access_granted(&self) -> Result<bool>;
}

/// Everything the gate shell needs from the host.
///
/// Flow launches are fire-and-forget. The platform keeps the `Sender` and
/// posts the matching result event when the OS hands control back.
pub trait Platform: CapabilityOracle {
    fn tint_surface(&mut self, tint: SurfaceTint);

    /// Show `prompt`, replacing any prompt already on screen
    fn show_prompt(&mut self, prompt: &ModalPrompt);

    fn launch_settings(&mut self, intent: &SettingsIntent, events: Sender<GateEvent>)
    -> Result<()>;

    fn request_permissions(
        &mut self,
        request: &PermissionRequest,
        events: Sender<GateEvent>,
    ) -> Result<()>;

    /// The gate stepped aside; close any prompt
    fn proceed(&mut self);

    /// Terminate the process. Nothing in the application runs afterwards.
    fn exit(&mut self, code: i32);
}
