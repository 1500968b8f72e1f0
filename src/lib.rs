//! Storage Gate - blocks an application until it holds the OS storage grant.
//!
//! Every entry point runs the gate. While the grant is missing a blocking
//! prompt offers Continue (launch the OS grant flow for this platform tier)
//! or Exit (terminate the process). Flow results always lead back to a fresh
//! capability check, never to the result payload.
//!
//! # Example
//!
//! ```
//! use storage_gate::{GateController, GateShell, PlatformTier, PromptAction};
//! use storage_gate::sim::SimulatedPlatform;
//!
//! let tier = PlatformTier(33);
//! let controller = GateController::new(tier, "com.example.sketch");
//! let mut shell = GateShell::new(controller, SimulatedPlatform::new(tier, false));
//!
//! // No grant: the protected screen must not render
//! assert!(!shell.enter_screen("projects"));
//!
//! // Continue opens the all-files settings screen; the user flips the switch
//! shell.choose(PromptAction::Continue);
//! shell.platform_mut().toggle_settings();
//! shell.platform_mut().finish_settings();
//! shell.pump();
//!
//! assert!(shell.enter_screen("projects"));
//! ```

pub mod config;
pub mod controller;
pub mod error;
pub mod flow;
pub mod models;
pub mod platform;
pub mod shell;
pub mod sim;
pub mod storage;
pub mod tui;

pub use config::GateConfig;
pub use controller::GateController;
pub use error::GateError;
pub use flow::select_flow;
pub use models::{Effect, FlowKind, GateEvent, GateState, GrantState, PlatformTier, PromptAction};
pub use platform::{CapabilityOracle, Platform};
pub use shell::GateShell;
