//! Abstract drawing primitives emitted by the renderer.
//!
//! Serialisation to a concrete graphics format (SVG, canvas, ...) is the
//! caller's responsibility; everything here is plain geometry plus
//! theme-supplied attribute bags.

use std::collections::BTreeMap;

use crate::text::FontStyle;

/// Presentation attributes attached to a primitive (stroke, fill, ...).
///
/// A sorted map keeps serialisation byte-stable between renders.
pub type Attrs = BTreeMap<String, String>;

/// Build an attribute bag from literal pairs
pub fn attrs(pairs: &[(&str, &str)]) -> Attrs {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Horizontal anchoring of a text primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TextAnchor {
    Start,
    Middle,
    End,
}

/// One drawing instruction
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Primitive {
    Rect {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        attrs: Attrs,
    },
    Line {
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
        attrs: Attrs,
    },
    Path {
        d: String,
        attrs: Attrs,
    },
    Text {
        x: f64,
        /// Top of the first line
        y: f64,
        lines: Vec<String>,
        font: FontStyle,
        anchor: TextAnchor,
        attrs: Attrs,
    },
}

/// A clickable area mapped back to the source line that produced it
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Region {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub ln: usize,
}

/// Primitives grouped into z-ordered named layers, bottom first
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct Layers {
    /// Block outlines and backgrounds, behind everything else
    pub blocks: Vec<Primitive>,
    /// Agent lifelines and activation bars
    pub lifelines: Vec<Primitive>,
    /// Label backdrops that mask the lines they sit on
    pub masks: Vec<Primitive>,
    /// Arrows, caps, notes, labels
    pub content: Vec<Primitive>,
    /// Clickable areas, topmost
    pub regions: Vec<Region>,
}

/// Final extent of the drawing, including outer margins
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize)]
pub struct Bounds {
    /// Offset of the drawing's left edge in layout coordinates
    pub x: f64,
    /// Offset of the drawing's top edge in layout coordinates
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// A rendered diagram: layered primitives plus the bounding box
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct Rendering {
    pub layers: Layers,
    pub bounds: Bounds,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attrs_are_sorted() {
        let a = attrs(&[("stroke", "#000"), ("fill", "none")]);
        let keys: Vec<&str> = a.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["fill", "stroke"]);
    }

    #[test]
    fn test_primitive_serialises_with_kind_tag() {
        let prim = Primitive::Line {
            x1: 0.0,
            y1: 1.0,
            x2: 2.0,
            y2: 3.0,
            attrs: Attrs::new(),
        };
        let json = serde_json::to_value(&prim).unwrap();
        assert_eq!(json["kind"], "line");
        assert_eq!(json["x2"], 2.0);
    }
}
