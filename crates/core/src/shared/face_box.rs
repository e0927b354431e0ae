/// Integer pixel position, used for face centroids.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// True when both axis displacements are strictly below `max_shift`.
    pub fn is_near(&self, other: &Point, max_shift: i32) -> bool {
        (self.x - other.x).abs() < max_shift && (self.y - other.y).abs() < max_shift
    }
}

/// Axis-aligned face rectangle in frame pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FaceBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl FaceBox {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> i64 {
        self.width.max(0) as i64 * self.height.max(0) as i64
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2, self.y + self.height / 2)
    }

    /// Picks the candidate with the largest area.
    ///
    /// On equal areas the earliest candidate wins.
    pub fn largest(candidates: &[FaceBox]) -> Option<FaceBox> {
        let mut best: Option<FaceBox> = None;
        for candidate in candidates {
            if candidate.area() == 0 {
                continue;
            }
            match best {
                Some(b) if candidate.area() <= b.area() => {}
                _ => best = Some(*candidate),
            }
        }
        best
    }

    /// Square box of side `max(w, h) * scale` centred on the face, clamped
    /// to the frame.
    ///
    /// This is the crop handed to recognition and shown to the user.
    pub fn adjusted(&self, scale: f64, frame_width: u32, frame_height: u32) -> FaceBox {
        let side = (self.width.max(self.height) as f64 * scale) as i32;
        let half = side / 2;
        let center = self.center();

        let x1 = (center.x - half).max(0);
        let y1 = (center.y - half).max(0);
        let x2 = (center.x + half).min(frame_width as i32);
        let y2 = (center.y + half).min(frame_height as i32);

        FaceBox::new(x1, y1, (x2 - x1).max(0), (y2 - y1).max(0))
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_center_uses_integer_halves() {
        let b = FaceBox::new(10, 20, 51, 31);
        assert_eq!(b.center(), Point::new(35, 35));
    }

    #[test]
    fn test_area() {
        assert_eq!(FaceBox::new(0, 0, 40, 25).area(), 1000);
        assert_eq!(FaceBox::new(0, 0, -4, 25).area(), 0);
    }

    // ── Nearness ─────────────────────────────────────────────────────

    #[rstest]
    #[case::same_point(Point::new(100, 100), true)]
    #[case::just_inside(Point::new(149, 51), true)]
    #[case::x_on_threshold(Point::new(150, 100), false)]
    #[case::y_on_threshold(Point::new(100, 50), false)]
    #[case::far_away(Point::new(500, 500), false)]
    fn test_is_near_requires_both_axes(#[case] other: Point, #[case] expected: bool) {
        assert_eq!(Point::new(100, 100).is_near(&other, 50), expected);
    }

    // ── Largest candidate ────────────────────────────────────────────

    #[test]
    fn test_largest_empty() {
        assert_eq!(FaceBox::largest(&[]), None);
    }

    #[test]
    fn test_largest_picks_max_area() {
        let small = FaceBox::new(0, 0, 10, 10);
        let big = FaceBox::new(50, 50, 40, 40);
        assert_eq!(FaceBox::largest(&[small, big]), Some(big));
    }

    #[test]
    fn test_largest_tie_keeps_first() {
        let a = FaceBox::new(0, 0, 20, 20);
        let b = FaceBox::new(100, 100, 20, 20);
        assert_eq!(FaceBox::largest(&[a, b]), Some(a));
    }

    #[test]
    fn test_largest_skips_degenerate() {
        let degenerate = FaceBox::new(0, 0, 0, 100);
        assert_eq!(FaceBox::largest(&[degenerate]), None);
    }

    // ── Adjusted box ─────────────────────────────────────────────────

    #[test]
    fn test_adjusted_is_square_and_scaled() {
        // center (150, 150), side = 100 * 1.2 = 120
        let b = FaceBox::new(100, 110, 100, 80);
        let adj = b.adjusted(1.2, 640, 480);
        assert_eq!(adj, FaceBox::new(90, 90, 120, 120));
    }

    #[test]
    fn test_adjusted_clamps_to_frame() {
        let b = FaceBox::new(0, 0, 60, 60);
        let adj = b.adjusted(1.2, 640, 480);
        assert_eq!(adj.x, 0);
        assert_eq!(adj.y, 0);
        // center 30, half 36 → x2 = 66
        assert_eq!(adj.width, 66);
        assert_eq!(adj.height, 66);
    }

    #[test]
    fn test_adjusted_clamps_far_edge() {
        let b = FaceBox::new(600, 440, 40, 40);
        let adj = b.adjusted(1.0, 640, 480);
        assert_eq!(adj.x + adj.width, 640);
        assert_eq!(adj.y + adj.height, 480);
    }

    #[test]
    fn test_adjusted_outside_frame_is_empty() {
        let b = FaceBox::new(1000, 1000, 20, 20);
        assert!(b.adjusted(1.2, 640, 480).is_empty());
    }
}
