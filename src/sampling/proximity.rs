//! Cursor-to-reading-target geometry.
//!
//! The proximity score is `1` while the cursor is inside the target's box and
//! `1 / d` outside it, where `d` is the distance to the box centre in document
//! pixels. No reference distance is applied; the scale follows page layout.

use crate::host::{ClientRect, Viewport};

/// Distance reported when the reading target is not in the document.
pub const ABSENT_TARGET_DISTANCE: f64 = -1.0;

/// Smallest width and height a target needs to be measured against.
///
/// Any point outside a box at least this large is more than 1px from its
/// centre, which keeps off-target scores below 1.
pub const MIN_TARGET_EXTENT: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetReading {
    pub distance: f64,
    pub proximity: f64,
    pub inside: bool,
}

impl TargetReading {
    pub fn absent() -> Self {
        Self {
            distance: ABSENT_TARGET_DISTANCE,
            proximity: 0.0,
            inside: false,
        }
    }
}

/// Measure a document-space cursor against a viewport-relative rectangle.
pub fn measure(
    cursor_x: f64,
    cursor_y: f64,
    rect: Option<ClientRect>,
    viewport: &Viewport,
) -> TargetReading {
    let Some(rect) = rect.filter(is_usable) else {
        return TargetReading::absent();
    };

    let scroll_x = finite_or_zero(viewport.scroll_x);
    let scroll_y = finite_or_zero(viewport.scroll_y);

    let left = rect.left + scroll_x;
    let top = rect.top + scroll_y;
    let right = left + rect.width;
    let bottom = top + rect.height;

    let center_x = left + rect.width / 2.0;
    let center_y = top + rect.height / 2.0;
    let distance = (cursor_x - center_x).hypot(cursor_y - center_y);
    if !distance.is_finite() {
        return TargetReading::absent();
    }

    let inside = cursor_x >= left && cursor_x <= right && cursor_y >= top && cursor_y <= bottom;

    TargetReading {
        distance,
        proximity: proximity_score(distance, inside),
        inside,
    }
}

pub fn proximity_score(distance: f64, inside: bool) -> f64 {
    if inside {
        1.0
    } else if distance > 0.0 && distance.is_finite() {
        1.0 / distance
    } else {
        0.0
    }
}

/// `value / extent`, or `0` when the extent is zero or either side is not
/// finite.
pub fn normalize(value: f64, extent: f64) -> f64 {
    if !extent.is_finite() || extent <= 0.0 {
        return 0.0;
    }
    let ratio = value / extent;
    if ratio.is_finite() {
        ratio
    } else {
        0.0
    }
}

// Thinner boxes would let an outside cursor sit within 1px of the centre and
// score above 1, so they count as absent.
fn is_usable(rect: &ClientRect) -> bool {
    [rect.left, rect.top, rect.width, rect.height]
        .iter()
        .all(|v| v.is_finite())
        && rect.width >= MIN_TARGET_EXTENT
        && rect.height >= MIN_TARGET_EXTENT
}

pub(crate) fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> Option<ClientRect> {
        Some(ClientRect::new(100.0, 100.0, 200.0, 200.0))
    }

    #[test]
    fn cursor_on_centre_is_on_target() {
        let reading = measure(200.0, 200.0, target(), &Viewport::new(1000.0, 800.0));
        assert_eq!(reading.distance, 0.0);
        assert!(reading.inside);
        assert_eq!(reading.proximity, 1.0);
    }

    #[test]
    fn cursor_off_target_decays_with_distance() {
        let reading = measure(700.0, 200.0, target(), &Viewport::new(1000.0, 800.0));
        assert_eq!(reading.distance, 500.0);
        assert!(!reading.inside);
        assert_eq!(reading.proximity, 1.0 / 500.0);
    }

    #[test]
    fn edges_count_as_inside() {
        let viewport = Viewport::new(1000.0, 800.0);
        for (x, y) in [(100.0, 100.0), (300.0, 300.0), (100.0, 300.0), (300.0, 150.0)] {
            assert_eq!(measure(x, y, target(), &viewport).proximity, 1.0, "({x}, {y})");
        }
        assert!(measure(300.5, 150.0, target(), &viewport).proximity < 1.0);
    }

    #[test]
    fn outside_scores_stay_in_open_unit_interval() {
        let viewport = Viewport::new(1000.0, 800.0);
        let mut last = 1.0;
        for step in 1..40 {
            let x = 300.0 + step as f64 * 25.0;
            let reading = measure(x, 200.0, target(), &viewport);
            assert!(reading.proximity > 0.0 && reading.proximity < 1.0);
            assert!(reading.proximity < last);
            last = reading.proximity;
        }
    }

    #[test]
    fn rect_is_shifted_by_scroll_offset() {
        let mut viewport = Viewport::new(1000.0, 800.0);
        viewport.scroll_y = 1000.0;

        // Box is at document y 1100..1300 once the scroll offset is applied.
        let inside = measure(200.0, 1200.0, target(), &viewport);
        assert!(inside.inside);
        assert_eq!(inside.distance, 0.0);

        let above = measure(200.0, 200.0, target(), &viewport);
        assert!(!above.inside);
        assert_eq!(above.distance, 1000.0);
    }

    #[test]
    fn absent_target_uses_sentinels() {
        let reading = measure(10.0, 10.0, None, &Viewport::new(1000.0, 800.0));
        assert_eq!(reading, TargetReading::absent());
        assert_eq!(reading.distance, ABSENT_TARGET_DISTANCE);
        assert_eq!(reading.proximity, 0.0);
    }

    #[test]
    fn degenerate_rect_is_treated_as_absent() {
        let rect = Some(ClientRect::new(f64::NAN, 0.0, 10.0, 10.0));
        let reading = measure(10.0, 10.0, rect, &Viewport::new(1000.0, 800.0));
        assert_eq!(reading, TargetReading::absent());
    }

    #[test]
    fn zero_area_and_sliver_rects_are_treated_as_absent() {
        let viewport = Viewport::new(1000.0, 800.0);
        for rect in [
            ClientRect::new(100.0, 100.0, 0.0, 0.0),
            ClientRect::new(100.0, 100.0, 200.0, 0.0),
            ClientRect::new(100.0, 100.0, 0.0, 200.0),
            ClientRect::new(100.0, 100.0, 1.0, 1.0),
            ClientRect::new(100.0, 100.0, 200.0, 1.5),
        ] {
            let reading = measure(100.5, 100.0, Some(rect), &viewport);
            assert_eq!(reading, TargetReading::absent(), "{rect:?}");
        }
    }

    #[test]
    fn smallest_target_keeps_outside_scores_below_one() {
        let viewport = Viewport::new(1000.0, 800.0);
        let rect = Some(ClientRect::new(100.0, 100.0, MIN_TARGET_EXTENT, MIN_TARGET_EXTENT));

        assert_eq!(measure(101.0, 101.0, rect, &viewport).proximity, 1.0);
        for (x, y) in [(102.01, 101.0), (99.99, 101.0), (101.0, 102.01), (103.0, 103.0)] {
            let reading = measure(x, y, rect, &viewport);
            assert!(!reading.inside);
            assert!(
                reading.proximity > 0.0 && reading.proximity < 1.0,
                "({x}, {y}) scored {}",
                reading.proximity
            );
        }
    }

    #[test]
    fn normalize_guards_zero_extent() {
        assert_eq!(normalize(50.0, 1000.0), 0.05);
        assert_eq!(normalize(50.0, 0.0), 0.0);
        assert_eq!(normalize(50.0, f64::NAN), 0.0);
        assert_eq!(normalize(f64::INFINITY, 10.0), 0.0);
    }
}
