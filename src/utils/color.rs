use serde::{Deserialize, Serialize};

/// A RGBA `Color`. Each color component is a floating point value
/// with a range from 0 to 1.
#[derive(Debug, Default, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Color(pub f32, pub f32, pub f32, pub f32);

impl From<[u8; 4]> for Color {
    fn from(v: [u8; 4]) -> Self {
        Color(
            f32::from(v[0]) / 255.0,
            f32::from(v[1]) / 255.0,
            f32::from(v[2]) / 255.0,
            f32::from(v[3]) / 255.0,
        )
    }
}

impl Into<[f32; 4]> for Color {
    fn into(self) -> [f32; 4] {
        [self.0, self.1, self.2, self.3]
    }
}

impl Color {
    #[inline]
    pub fn white() -> Self {
        Color(1.0, 1.0, 1.0, 1.0)
    }

    #[inline]
    pub fn black() -> Self {
        Color(0.0, 0.0, 0.0, 1.0)
    }

    #[inline]
    pub fn transparent() -> Self {
        Color(0.0, 0.0, 0.0, 0.0)
    }

    /// Returns the alpha component.
    #[inline]
    pub fn alpha(&self) -> f32 {
        self.3
    }

    /// Clips all components into `[0, 1]`.
    pub fn clip(&self) -> Self {
        Color(
            self.0.max(0.0).min(1.0),
            self.1.max(0.0).min(1.0),
            self.2.max(0.0).min(1.0),
            self.3.max(0.0).min(1.0),
        )
    }
}
