//! Resize handle decorations.
//!
//! Decorations are derived from the document, the selection and the view
//! geometry on every read. They are never stored in the document and never
//! serialized.

use crate::document::Document;
use crate::platform::ViewGeometry;
use crate::selection::Selection;

/// Edge length of a square resize handle, in pixels.
pub const HANDLE_SIZE: f64 = 12.0;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x
            && point.x <= self.x + self.width
            && point.y >= self.y
            && point.y <= self.y + self.height
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// The eight resize directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Compass {
    N,
    S,
    E,
    W,
    NE,
    NW,
    SE,
    SW,
}

impl Compass {
    pub const ALL: [Compass; 8] = [
        Compass::N,
        Compass::S,
        Compass::E,
        Compass::W,
        Compass::NE,
        Compass::NW,
        Compass::SE,
        Compass::SW,
    ];

    /// Handle center on `rect`.
    pub fn anchor(self, rect: &Rect) -> Point {
        let (left, top) = (rect.x, rect.y);
        let (right, bottom) = (rect.x + rect.width, rect.y + rect.height);
        let (mid_x, mid_y) = (left + rect.width / 2.0, top + rect.height / 2.0);
        match self {
            Compass::N => Point::new(mid_x, top),
            Compass::S => Point::new(mid_x, bottom),
            Compass::E => Point::new(right, mid_y),
            Compass::W => Point::new(left, mid_y),
            Compass::NE => Point::new(right, top),
            Compass::NW => Point::new(left, top),
            Compass::SE => Point::new(right, bottom),
            Compass::SW => Point::new(left, bottom),
        }
    }

    /// CSS cursor shown over the handle.
    pub fn cursor(self) -> &'static str {
        match self {
            Compass::N | Compass::S => "ns-resize",
            Compass::E | Compass::W => "ew-resize",
            Compass::NE | Compass::SW => "nesw-resize",
            Compass::NW | Compass::SE => "nwse-resize",
        }
    }

    /// Whether dragging this handle sets the width, with the height following.
    pub fn drives_width(self) -> bool {
        !matches!(self, Compass::N | Compass::S)
    }
}

/// One handle to draw over the selected image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HandleDescriptor {
    pub direction: Compass,
    /// Hit box, centered on the anchor point.
    pub rect: Rect,
    pub cursor: &'static str,
}

/// Handles for the current selection: eight for a selected image, none
/// otherwise.
pub fn decorations(
    doc: &Document,
    selection: Option<&Selection>,
    geometry: &impl ViewGeometry,
) -> Vec<HandleDescriptor> {
    let Some(node) = selection.and_then(Selection::node) else {
        return Vec::new();
    };
    let Ok(image) = doc.image(node) else {
        return Vec::new();
    };
    let bounds = geometry.node_rect(node).unwrap_or_else(|| {
        Rect::new(
            0.0,
            0.0,
            image.width.unwrap_or(0) as f64,
            image.height.unwrap_or(0) as f64,
        )
    });

    Compass::ALL
        .iter()
        .map(|&direction| {
            let at = direction.anchor(&bounds);
            HandleDescriptor {
                direction,
                rect: Rect::new(
                    at.x - HANDLE_SIZE / 2.0,
                    at.y - HANDLE_SIZE / 2.0,
                    HANDLE_SIZE,
                    HANDLE_SIZE,
                ),
                cursor: direction.cursor(),
            }
        })
        .collect()
}

/// The handle under `point`, preferring the closest when hit boxes overlap.
pub fn hit_test(handles: &[HandleDescriptor], point: Point) -> Option<Compass> {
    let distance = |h: &HandleDescriptor| {
        let c = h.rect.center();
        (c.x - point.x).powi(2) + (c.y - point.y).powi(2)
    };
    handles
        .iter()
        .filter(|h| h.rect.contains(point))
        .min_by(|a, b| distance(a).total_cmp(&distance(b)))
        .map(|h| h.direction)
}
