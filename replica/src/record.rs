//! Serialized object records.
//!
//! An [`ObjectRecord`] is the wire/table form of one canvas object: a full
//! snapshot of its renderable state plus an explicit `id`. Records are
//! replaced whole on every edit — there is no field-level patching, the
//! object table always holds the latest complete snapshot.
//!
//! Gradient and pattern fills carry reconstruction data a naive snapshot
//! would lose, so [`Fill`] is a tagged variant serialized as a
//! `{"type": …, "data": …}` sub-record.

#[cfg(test)]
#[path = "record_test.rs"]
mod record_test;

use serde::{Deserialize, Serialize};

/// The kind of a canvas object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeKind {
    /// Axis-aligned rectangle.
    Rect,
    /// Ellipse inscribed within the bounding box.
    Ellipse,
    /// Straight line segment.
    Line,
    /// Free-hand path; geometry lives in `path_data`.
    Path,
    /// Text block.
    Text,
}

/// Direction of a gradient fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GradientKind {
    Linear,
    Radial,
}

/// One color stop along a gradient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientStop {
    /// Position along the gradient axis, `0.0..=1.0`.
    pub offset: f64,
    /// CSS color string.
    pub color: String,
}

/// Gradient endpoint coordinates in object-local space. Radial gradients
/// additionally carry the two radii.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientCoords {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r1: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r2: Option<f64>,
}

/// How a pattern fill tiles its source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PatternRepeat {
    Repeat,
    RepeatX,
    RepeatY,
    NoRepeat,
}

/// Fill of a canvas object.
///
/// Serialized adjacently tagged, e.g. `{"type": "gradient", "data": {…}}`,
/// so the two special cases survive the round trip through the object
/// table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum Fill {
    /// Plain CSS color string.
    Solid(String),
    /// Multi-stop gradient.
    Gradient {
        kind: GradientKind,
        stops: Vec<GradientStop>,
        coords: GradientCoords,
    },
    /// Tiled image pattern.
    Pattern {
        /// Source image reference (URL or data URI).
        source: String,
        repeat: PatternRepeat,
    },
}

impl Default for Fill {
    fn default() -> Self {
        Self::Solid("#1F1A17".into())
    }
}

/// A canvas object as stored in the object table and on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectRecord {
    /// Stable object id; the object table key duplicates this value.
    pub id: String,
    /// Shape kind.
    pub kind: ShapeKind,
    /// Left edge in canvas coordinates.
    pub x: f64,
    /// Top edge in canvas coordinates.
    pub y: f64,
    /// Bounding-box width.
    pub width: f64,
    /// Bounding-box height.
    pub height: f64,
    /// Clockwise rotation in degrees around the bounding-box center.
    #[serde(default)]
    pub rotation: f64,
    /// Fill, including the gradient/pattern special cases.
    #[serde(default)]
    pub fill: Fill,
    /// Stroke color, if stroked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke: Option<String>,
    /// Stroke width in canvas units.
    #[serde(default = "default_stroke_width")]
    pub stroke_width: f64,
    /// Encoded free-hand path data for `ShapeKind::Path`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_data: Option<String>,
    /// Text content for `ShapeKind::Text`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

fn default_stroke_width() -> f64 {
    1.0
}

impl ObjectRecord {
    /// Serialize into the JSON value stored in the object table.
    ///
    /// # Panics
    ///
    /// Never panics: the record contains no map keys or values that JSON
    /// cannot represent.
    #[must_use]
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("object record serializes to JSON")
    }

    /// Deserialize from an object-table value. Fails on unknown shape
    /// kinds or malformed fill sub-records; callers drop such records with
    /// a logged warning rather than propagating the error.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value.clone())
    }
}
