use crate::native::NativeEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DisplayRotation {
    #[default]
    Rotation0,
    Rotation90,
    Rotation180,
    Rotation270,
}

impl DisplayRotation {
    pub fn from_degrees(degrees: u32) -> Option<Self> {
        match degrees % 360 {
            0 => Some(DisplayRotation::Rotation0),
            90 => Some(DisplayRotation::Rotation90),
            180 => Some(DisplayRotation::Rotation180),
            270 => Some(DisplayRotation::Rotation270),
            _ => None,
        }
    }

    #[inline]
    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorKind {
    Accelerometer,
    Gravity,
    Magnetometer,
    Gyroscope,
}

/// Per rotation: `[sign_x, sign_y, src_x, src_y]`.
pub const AXIS_SWAP: [[i32; 4]; 4] = [
    [1, -1, 0, 1],
    [-1, -1, 1, 0],
    [-1, 1, 0, 1],
    [1, 1, 1, 0],
];

/// Rotates a device-space sample into display space. `z` is never swapped.
pub fn remap_axes(rotation: DisplayRotation, v: [f32; 3]) -> [f32; 3] {
    let [sx, sy, ix, iy] = AXIS_SWAP[rotation.index()];
    [
        sx as f32 * v[ix as usize],
        sy as f32 * v[iy as usize],
        v[2],
    ]
}

/// Raw sample as reported by the host sensor service.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorSample {
    pub kind: SensorKind,
    pub values: [f32; 3],
}

impl SensorSample {
    #[inline]
    pub fn new(kind: SensorKind, values: [f32; 3]) -> Self {
        Self { kind, values }
    }

    /// Remapped values with the engine's per-sensor sign convention applied.
    pub fn to_engine(self, rotation: DisplayRotation) -> [f32; 3] {
        let [x, y, z] = remap_axes(rotation, self.values);
        match self.kind {
            SensorKind::Accelerometer | SensorKind::Gravity | SensorKind::Magnetometer => {
                [-x, y, -z]
            }
            SensorKind::Gyroscope => [x, -y, z],
        }
    }
}

/// Sample already converted to engine space; applied on the engine thread.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReading {
    pub kind: SensorKind,
    pub values: [f32; 3],
}

impl SensorReading {
    pub fn from_sample(sample: SensorSample, rotation: DisplayRotation) -> Self {
        Self {
            kind: sample.kind,
            values: sample.to_engine(rotation),
        }
    }

    pub fn apply(self, native: &mut dyn NativeEngine) {
        let [x, y, z] = self.values;
        match self.kind {
            SensorKind::Accelerometer => native.accelerometer(x, y, z),
            SensorKind::Gravity => native.gravity(x, y, z),
            SensorKind::Magnetometer => native.magnetometer(x, y, z),
            SensorKind::Gyroscope => native.gyroscope(x, y, z),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bits(v: [f32; 3]) -> [u32; 3] {
        v.map(f32::to_bits)
    }

    #[test]
    fn rotation_90_accelerometer() {
        let remapped = remap_axes(DisplayRotation::Rotation90, [1.0, 0.0, 0.0]);
        assert_eq!(bits(remapped), bits([-0.0, -1.0, 0.0]));

        let out = SensorSample::new(SensorKind::Accelerometer, [1.0, 0.0, 0.0])
            .to_engine(DisplayRotation::Rotation90);
        assert_eq!(bits(out), bits([0.0, -1.0, -0.0]));
    }

    #[test]
    fn every_rotation_matches_table() {
        let v = [1.0, 2.0, 3.0];
        assert_eq!(remap_axes(DisplayRotation::Rotation0, v), [1.0, -2.0, 3.0]);
        assert_eq!(remap_axes(DisplayRotation::Rotation90, v), [-2.0, -1.0, 3.0]);
        assert_eq!(remap_axes(DisplayRotation::Rotation180, v), [-1.0, 2.0, 3.0]);
        assert_eq!(remap_axes(DisplayRotation::Rotation270, v), [2.0, 1.0, 3.0]);
    }

    #[test]
    fn gyroscope_uses_its_own_convention() {
        let out = SensorSample::new(SensorKind::Gyroscope, [1.0, 2.0, 3.0])
            .to_engine(DisplayRotation::Rotation0);
        assert_eq!(out, [1.0, 2.0, 3.0]);

        let out = SensorSample::new(SensorKind::Magnetometer, [1.0, 2.0, 3.0])
            .to_engine(DisplayRotation::Rotation0);
        assert_eq!(out, [-1.0, -2.0, -3.0]);
    }

    #[test]
    fn degrees_parse() {
        assert_eq!(DisplayRotation::from_degrees(450), Some(DisplayRotation::Rotation90));
        assert_eq!(DisplayRotation::from_degrees(45), None);
    }
}
