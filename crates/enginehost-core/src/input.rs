use crate::native::NativeEngine;
use crate::sensor::SensorReading;

/// Host input converted into an engine call. Built on the host thread, applied on the engine thread.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineInput {
    Key {
        scancode: i32,
        unicode: u32,
        pressed: bool,
    },
    /// Characters from a key-multiple event; each becomes a press and a release.
    Characters(Vec<u32>),
    Sensor(SensorReading),
    Back,
    Permissions(Vec<(String, bool)>),
    KeyboardHeight(i32),
    Resize {
        width: u32,
        height: u32,
    },
}

impl EngineInput {
    /// `None` when the text carries no non-zero character.
    pub fn characters(text: &str) -> Option<Self> {
        let codes: Vec<u32> = text.chars().map(u32::from).filter(|c| *c != 0).collect();
        (!codes.is_empty()).then_some(EngineInput::Characters(codes))
    }

    /// Pairs permissions with grants. Extra entries on either side are ignored.
    pub fn permissions(permissions: &[String], grants: &[bool]) -> Self {
        EngineInput::Permissions(
            permissions
                .iter()
                .cloned()
                .zip(grants.iter().copied())
                .collect(),
        )
    }

    pub fn apply(self, native: &mut dyn NativeEngine) {
        match self {
            EngineInput::Key {
                scancode,
                unicode,
                pressed,
            } => native.key(scancode, unicode, pressed),
            EngineInput::Characters(codes) => {
                for c in codes {
                    native.key(0, c, true);
                    native.key(0, c, false);
                }
            }
            EngineInput::Sensor(reading) => reading.apply(native),
            EngineInput::Back => native.back(),
            EngineInput::Permissions(results) => {
                for (permission, granted) in &results {
                    native.request_permission_result(permission, *granted);
                }
            }
            EngineInput::KeyboardHeight(h) => native.set_virtual_keyboard_height(h),
            EngineInput::Resize { width, height } => native.resize(width, height),
        }
    }
}

/// Height covered by the on-screen keyboard: full height minus the visible frame's bottom.
#[inline]
pub fn keyboard_height(full_height: i32, visible_bottom: i32) -> i32 {
    full_height - visible_bottom
}
