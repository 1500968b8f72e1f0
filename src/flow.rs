//! OS grant flow selection.
//!
//! The flow kind depends only on the platform tier, so selection is a pure
//! function. At or above [`SETTINGS_SCREEN_TIER`] the settings screen is used
//! exclusively, even where the legacy permission strings could still be
//! requested.

use crate::models::{FlowKind, PermissionRequest, PlatformTier, RequestToken, SettingsIntent};
use serde::Serialize;

/// Tier that deprecated the legacy runtime permissions for broad storage access
pub const SETTINGS_SCREEN_TIER: PlatformTier = PlatformTier(30);

/// Tier that introduced scoped storage
pub const SCOPED_STORAGE_TIER: PlatformTier = PlatformTier(29);

/// Reserved request identifier for the gate's runtime prompt
pub const PERMISSION_CODE: i32 = 3333;

pub const READ_EXTERNAL_STORAGE: &str = "android.permission.READ_EXTERNAL_STORAGE";
pub const WRITE_EXTERNAL_STORAGE: &str = "android.permission.WRITE_EXTERNAL_STORAGE";

/// Legacy permission names, in request order
pub const LEGACY_PERMISSIONS: &[&str] = &[READ_EXTERNAL_STORAGE, WRITE_EXTERNAL_STORAGE];

pub const MANAGE_ALL_FILES_ACTION: &str =
    "android.settings.MANAGE_APP_ALL_FILES_ACCESS_PERMISSION";

pub fn select_flow(tier: PlatformTier) -> FlowKind {
    if tier >= SETTINGS_SCREEN_TIER {
        FlowKind::SettingsScreen
    } else {
        FlowKind::RuntimePrompt
    }
}

/// Settings-screen target for `package_name`
pub fn settings_intent(package_name: &str, token: RequestToken) -> SettingsIntent {
    SettingsIntent {
        action: MANAGE_ALL_FILES_ACTION.to_string(),
        uri: format!("package:{package_name}"),
        token,
    }
}

/// Runtime prompt arguments with the reserved request code
pub fn permission_request() -> PermissionRequest {
    PermissionRequest {
        request_code: PERMISSION_CODE,
        permissions: LEGACY_PERMISSIONS.iter().map(|p| p.to_string()).collect(),
    }
}

/// Flow selection summary for `select-flow`
#[derive(Debug, Serialize)]
pub struct FlowSelection {
    pub tier: PlatformTier,
    pub flow: FlowKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings_action: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_code: Option<i32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<&'static str>,
}

impl FlowSelection {
    pub fn for_tier(tier: PlatformTier) -> Self {
        let flow = select_flow(tier);
        match flow {
            FlowKind::SettingsScreen => Self {
                tier,
                flow,
                settings_action: Some(MANAGE_ALL_FILES_ACTION),
                request_code: None,
                permissions: Vec::new(),
            },
            FlowKind::RuntimePrompt => Self {
                tier,
                flow,
                settings_action: None,
                request_code: Some(PERMISSION_CODE),
                permissions: LEGACY_PERMISSIONS.to_vec(),
            },
        }
    }
}
