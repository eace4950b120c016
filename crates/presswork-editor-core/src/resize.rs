//! Resize gesture state machine.
//!
//! `Idle -> Dragging -> Idle`. Pointer moves compute a preview size only;
//! the document is changed once, when the gesture is released, by the
//! editor that owns the controller.

use presswork_media::Dimensions;

use crate::decoration::{Compass, Point};
use crate::document::NodeRef;
use crate::error::ResizeError;

/// Smallest width or height an image can be dragged to, in pixels.
pub const MIN_DIMENSION: f64 = 100.0;

/// An in-progress drag.
#[derive(Debug, Clone, PartialEq)]
pub struct ResizeSession {
    pub direction: Compass,
    pub start_pointer: Point,
    pub start_width: f64,
    pub start_height: f64,
    /// `start_width / start_height`, locked for the whole gesture.
    pub ratio: f64,
    pub target: NodeRef,
    /// Last computed size.
    pub current: Dimensions,
}

impl ResizeSession {
    pub fn new(target: NodeRef, direction: Compass, pointer: Point, start: Dimensions) -> Self {
        let (width, height) = (start.width as f64, start.height as f64);
        let ratio = if width > 0.0 && height > 0.0 {
            width / height
        } else {
            1.0
        };
        Self {
            direction,
            start_pointer: pointer,
            start_width: width,
            start_height: height,
            ratio,
            target,
            current: start,
        }
    }

    /// Size for the pointer at `pointer`.
    pub fn size_at(&self, pointer: Point) -> Dimensions {
        compute_size(
            self.direction,
            self.start_width,
            self.start_height,
            self.ratio,
            pointer.x - self.start_pointer.x,
            pointer.y - self.start_pointer.y,
        )
    }
}

/// New size for a drag of `(dx, dy)` on `direction`.
///
/// Corner and east/west handles drive the width, north/south the height;
/// the other dimension always follows `ratio`. The driving dimension is
/// clamped so that both end up at least [`MIN_DIMENSION`], and rounded before
/// the other is derived from it.
pub fn compute_size(
    direction: Compass,
    start_width: f64,
    start_height: f64,
    ratio: f64,
    dx: f64,
    dy: f64,
) -> Dimensions {
    use Compass::*;

    if direction.drives_width() {
        let raw = match direction {
            E | NE | SE => start_width + dx,
            _ => start_width - dx,
        };
        let floor = MIN_DIMENSION.max(MIN_DIMENSION * ratio).ceil();
        let width = raw.round().max(floor);
        Dimensions::new(width as u32, (width / ratio).round() as u32)
    } else {
        let raw = match direction {
            S => start_height + dy,
            _ => start_height - dy,
        };
        let floor = MIN_DIMENSION.max(MIN_DIMENSION / ratio).ceil();
        let height = raw.round().max(floor);
        Dimensions::new((height * ratio).round() as u32, height as u32)
    }
}

/// Owns the editor's single resize session.
#[derive(Debug, Clone, Default)]
pub struct ResizeController {
    session: Option<ResizeSession>,
}

impl ResizeController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_dragging(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&ResizeSession> {
        self.session.as_ref()
    }

    /// Start a gesture. Refused while another one is active.
    pub fn begin(&mut self, session: ResizeSession) -> Result<(), ResizeError> {
        if self.session.is_some() {
            return Err(ResizeError::SessionActive);
        }
        tracing::debug!(
            direction = ?session.direction,
            width = session.start_width,
            height = session.start_height,
            "resize started"
        );
        self.session = Some(session);
        Ok(())
    }

    /// Preview size for `pointer`. `None` when idle.
    pub fn update(&mut self, pointer: Point) -> Option<Dimensions> {
        let session = self.session.as_mut()?;
        session.current = session.size_at(pointer);
        Some(session.current)
    }

    /// End the gesture, returning the target and its final size.
    pub fn finish(&mut self, pointer: Option<Point>) -> Option<(NodeRef, Dimensions)> {
        let mut session = self.session.take()?;
        if let Some(pointer) = pointer {
            session.current = session.size_at(pointer);
        }
        tracing::debug!(size = ?session.current, "resize finished");
        Some((session.target, session.current))
    }

    /// Drop the gesture without committing. Returns whether one was active.
    pub fn cancel(&mut self) -> bool {
        self.session.take().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(direction: Compass, w: u32, h: u32) -> ResizeSession {
        ResizeSession::new(
            NodeRef::new(vec![0], 0),
            direction,
            Point::new(0.0, 0.0),
            Dimensions::new(w, h),
        )
    }

    #[test]
    fn test_se_drag_keeps_ratio() {
        let s = session(Compass::SE, 400, 300);
        assert_eq!(s.size_at(Point::new(100.0, 0.0)), Dimensions::new(500, 375));
    }

    #[test]
    fn test_west_handles_grow_leftwards() {
        let s = session(Compass::W, 400, 300);
        assert_eq!(s.size_at(Point::new(-40.0, 0.0)), Dimensions::new(440, 330));
        let s = session(Compass::NW, 400, 300);
        assert_eq!(s.size_at(Point::new(40.0, 999.0)), Dimensions::new(360, 270));
    }

    #[test]
    fn test_north_south_drive_height() {
        let s = session(Compass::S, 400, 200);
        assert_eq!(s.size_at(Point::new(500.0, 50.0)), Dimensions::new(500, 250));
        let s = session(Compass::N, 400, 200);
        assert_eq!(s.size_at(Point::new(0.0, 50.0)), Dimensions::new(300, 150));
    }

    #[test]
    fn test_floor_applies_to_both_dimensions() {
        // Wide image: the height would drop under 100 first.
        let s = session(Compass::SE, 400, 200);
        assert_eq!(s.size_at(Point::new(-1000.0, 0.0)), Dimensions::new(200, 100));
        // Tall image dragged from the south edge.
        let s = session(Compass::S, 200, 400);
        assert_eq!(s.size_at(Point::new(0.0, -1000.0)), Dimensions::new(100, 200));
        // Square, east edge.
        let s = session(Compass::E, 300, 300);
        assert_eq!(s.size_at(Point::new(-1000.0, 0.0)), Dimensions::new(100, 100));
    }

    #[test]
    fn test_corner_drags_stay_within_a_pixel_of_ratio() {
        let starts = [(400, 300), (1000, 563), (333, 777), (640, 480), (123, 457)];
        let corners = [Compass::NE, Compass::NW, Compass::SE, Compass::SW];
        for (w, h) in starts {
            let ratio = w as f64 / h as f64;
            for direction in corners {
                let s = session(direction, w, h);
                for dx in (-600..=600).step_by(37) {
                    let size = s.size_at(Point::new(dx as f64, dx as f64 / 3.0));
                    assert!(size.width >= 100 && size.height >= 100, "{size:?}");
                    let expected_h = size.width as f64 / ratio;
                    assert!(
                        (size.height as f64 - expected_h).abs() <= 1.0,
                        "{w}x{h} {direction:?} dx={dx}: {size:?}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_zero_start_falls_back_to_square() {
        let s = session(Compass::SE, 0, 0);
        assert_eq!(s.ratio, 1.0);
        assert_eq!(s.size_at(Point::new(150.0, 0.0)), Dimensions::new(150, 150));
    }

    #[test]
    fn test_second_session_is_refused() {
        let mut controller = ResizeController::new();
        controller.begin(session(Compass::E, 400, 300)).unwrap();
        assert_eq!(
            controller.begin(session(Compass::W, 400, 300)),
            Err(ResizeError::SessionActive)
        );
        assert_eq!(controller.session().unwrap().direction, Compass::E);
    }

    #[test]
    fn test_finish_returns_last_size_and_goes_idle() {
        let mut controller = ResizeController::new();
        controller.begin(session(Compass::SE, 400, 300)).unwrap();
        assert_eq!(
            controller.update(Point::new(100.0, 0.0)),
            Some(Dimensions::new(500, 375))
        );
        let (_, size) = controller.finish(None).unwrap();
        assert_eq!(size, Dimensions::new(500, 375));
        assert!(!controller.is_dragging());
        assert_eq!(controller.update(Point::new(1.0, 1.0)), None);
    }
}
