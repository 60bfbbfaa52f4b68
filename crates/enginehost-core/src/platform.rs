use std::path::PathBuf;

use crate::hooks::ContributedView;
use crate::sensor::DisplayRotation;

/// Host services the bridge calls on the host thread.
///
/// Everything has a neutral default so a headless host only overrides what it has.
pub trait HostPlatform {
    /// Arguments injected by the host, appended after the packaged ones.
    fn extra_command_line(&self) -> Vec<String> {
        Vec::new()
    }

    fn display_rotation(&self) -> DisplayRotation {
        DisplayRotation::Rotation0
    }

    /// Where the expansion package lives (or will be downloaded to).
    fn expansion_package_path(&self) -> Option<PathBuf> {
        None
    }

    /// Attaches module views to the host layout, in the given order.
    fn attach_views(&mut self, _views: Vec<ContributedView>) {}

    fn set_sensors_enabled(&mut self, _enabled: bool) {}

    fn set_immersive(&mut self, _enabled: bool) {}

    fn set_keep_screen_on(&mut self, _enabled: bool) {}

    /// Shows the package download failure to the user.
    fn asset_fetch_failed(&mut self, _reason: &str) {}

    /// Tears the process down. Called once, after the destroy broadcast.
    fn terminate(&mut self) {
        std::process::exit(0);
    }
}
