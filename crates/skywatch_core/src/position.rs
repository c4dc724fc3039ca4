//! # Positions
//!
//! World-space position of a tracked entity and the axis selection used when
//! blending between two of them.
//!
//! Axis convention: `x` and `y` span the ground plane, `z` is vertical.

use bytemuck::{Pod, Zeroable};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::timing;

/// Position of an entity in world space.
///
/// Padded to 16 bytes so arrays of positions stay SIMD-aligned.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Position {
    /// X coordinate (ground plane).
    pub x: f32,
    /// Y coordinate (ground plane).
    pub y: f32,
    /// Z coordinate (vertical).
    pub z: f32,
    /// Padding for alignment.
    pub _padding: f32,
}

impl Position {
    /// The world origin.
    pub const ORIGIN: Self = Self::new(0.0, 0.0, 0.0);

    /// Creates a new position.
    #[inline]
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self {
            x,
            y,
            z,
            _padding: 0.0,
        }
    }

    /// Returns the squared distance to another position.
    #[inline]
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dx * dx + dy * dy + dz * dz
    }

    /// Returns true if every coordinate is finite.
    #[inline]
    #[must_use]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Linear interpolation towards `target` on all axes.
    ///
    /// Exact at both ends: `t == 0` yields `self`, `t == 1` yields `target`.
    #[inline]
    #[must_use]
    pub fn lerp(self, target: Self, t: f32) -> Self {
        self.lerp_axes(target, t, AxisMask::ALL)
    }

    /// Linear interpolation on the axes selected by `mask`.
    ///
    /// Axes left out of the mask take the target value directly.
    #[inline]
    #[must_use]
    pub fn lerp_axes(self, target: Self, t: f32, mask: AxisMask) -> Self {
        let blend = |from: f32, to: f32, enabled: bool| {
            if enabled {
                timing::lerp(from, to, t)
            } else {
                to
            }
        };
        Self::new(
            blend(self.x, target.x, mask.x),
            blend(self.y, target.y, mask.y),
            blend(self.z, target.z, mask.z),
        )
    }
}

impl From<[f32; 3]> for Position {
    fn from([x, y, z]: [f32; 3]) -> Self {
        Self::new(x, y, z)
    }
}

impl From<Position> for [f32; 3] {
    fn from(p: Position) -> Self {
        [p.x, p.y, p.z]
    }
}

/// Selection of axes the interpolator blends.
///
/// In config files this is a string: a preset name (`"all"`, `"planar"`,
/// `"none"`) or the blended axis letters (`"xz"`, `"y"`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AxisMask {
    /// Blend the x axis.
    pub x: bool,
    /// Blend the y axis.
    pub y: bool,
    /// Blend the z (vertical) axis.
    pub z: bool,
}

impl AxisMask {
    /// Blend every axis.
    pub const ALL: Self = Self { x: true, y: true, z: true };

    /// Blend the ground plane only; the vertical axis holds at the target.
    pub const PLANAR: Self = Self { x: true, y: true, z: false };

    /// Blend nothing; every axis snaps to the target.
    pub const NONE: Self = Self { x: false, y: false, z: false };

    /// Parses a preset name.
    #[must_use]
    pub fn from_preset(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "all" => Some(Self::ALL),
            "planar" | "horizontal" => Some(Self::PLANAR),
            "none" => Some(Self::NONE),
            _ => None,
        }
    }

    /// Parses a preset name or a set of axis letters such as `"xz"`.
    ///
    /// Repeated or unknown letters are rejected.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        if let Some(mask) = Self::from_preset(text) {
            return Some(mask);
        }
        if text.is_empty() {
            return None;
        }
        let mut mask = Self::NONE;
        for c in text.chars() {
            let axis = match c.to_ascii_lowercase() {
                'x' => &mut mask.x,
                'y' => &mut mask.y,
                'z' => &mut mask.z,
                _ => return None,
            };
            if *axis {
                return None;
            }
            *axis = true;
        }
        Some(mask)
    }

    /// Canonical config form: a preset name when one matches, else the letters.
    #[must_use]
    pub fn name(self) -> String {
        match self {
            Self::ALL => "all".to_string(),
            Self::PLANAR => "planar".to_string(),
            Self::NONE => "none".to_string(),
            _ => [(self.x, 'x'), (self.y, 'y'), (self.z, 'z')]
                .into_iter()
                .filter_map(|(on, c)| on.then_some(c))
                .collect(),
        }
    }
}

impl Default for AxisMask {
    fn default() -> Self {
        Self::ALL
    }
}

impl Serialize for AxisMask {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.name())
    }
}

impl<'de> Deserialize<'de> for AxisMask {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Self::parse(&value)
            .ok_or_else(|| de::Error::custom(format!("unknown axis selection `{value}`")))
    }
}
