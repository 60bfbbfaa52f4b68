use crate::error::EngineResult;
use crate::legacy::SingletonExport;

/// Result of one native loop step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Continue,
    /// The engine asked to quit (e.g. the game called quit). The loop stops.
    QuitRequested,
}

/// Boundary to the native engine.
///
/// Created on the host thread, then moved into the engine thread and used only there. Input
/// methods are fire-and-forget, like the engine's own entry points.
pub trait NativeEngine: Send {
    fn setup(&mut self, args: &[String]) -> EngineResult<()>;

    fn step(&mut self) -> EngineResult<StepStatus>;

    fn key(&mut self, _scancode: i32, _unicode: u32, _pressed: bool) {}

    fn accelerometer(&mut self, _x: f32, _y: f32, _z: f32) {}

    fn gravity(&mut self, _x: f32, _y: f32, _z: f32) {}

    fn magnetometer(&mut self, _x: f32, _y: f32, _z: f32) {}

    fn gyroscope(&mut self, _x: f32, _y: f32, _z: f32) {}

    fn back(&mut self) {}

    fn request_permission_result(&mut self, _permission: &str, _granted: bool) {}

    fn set_virtual_keyboard_height(&mut self, _height: i32) {}

    fn resize(&mut self, _width: u32, _height: u32) {}

    /// Announces a legacy module and its exported methods.
    fn register_singleton(&mut self, _export: &SingletonExport) {}

    /// Project setting lookup, e.g. `display/window/energy_saving/keep_screen_on`.
    fn global(&self, _key: &str) -> Option<String> {
        None
    }

    fn on_destroy(&mut self) {}
}

pub const KEEP_SCREEN_ON_SETTING: &str = "display/window/energy_saving/keep_screen_on";

/// Settings come back as strings; only the exact `"True"` enables it.
pub(crate) fn keep_screen_on(native: &dyn NativeEngine) -> bool {
    native.global(KEEP_SCREEN_ON_SETTING).as_deref() == Some("True")
}
