/// Minimum quadrilateral area (px²) below which geometry is degenerate.
const MIN_QUAD_AREA: f32 = 1.0;

/// Minimum |sin| of a corner angle; smaller means three corners are collinear.
const MIN_CORNER_SINE: f32 = 1e-3;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    pub fn as_tuple(&self) -> (f32, f32) {
        (self.x, self.y)
    }
}

impl From<(f32, f32)> for Point {
    fn from((x, y): (f32, f32)) -> Self {
        Self { x, y }
    }
}

/// Four corners ordered top-left, top-right, bottom-right, bottom-left
/// (clockwise on screen with y pointing down).
///
/// Rectification depends on this ordering: a different order mirrors or
/// rotates the output.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Quadrilateral {
    corners: [Point; 4],
}

impl Quadrilateral {
    /// Wraps corners that are already in canonical order.
    pub fn new(corners: [Point; 4]) -> Self {
        Self { corners }
    }

    /// Orders four arbitrary corners canonically.
    ///
    /// Corners are sorted by angle around their centroid (clockwise on
    /// screen) and rotated so the corner with the smallest `x + y` comes
    /// first.
    pub fn from_unordered(mut corners: [Point; 4]) -> Self {
        let cx = corners.iter().map(|p| p.x).sum::<f32>() / 4.0;
        let cy = corners.iter().map(|p| p.y).sum::<f32>() / 4.0;
        corners.sort_by(|a, b| {
            let ta = (a.y - cy).atan2(a.x - cx);
            let tb = (b.y - cy).atan2(b.x - cx);
            ta.total_cmp(&tb)
        });

        let first = corners
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| (a.x + a.y).total_cmp(&(b.x + b.y)))
            .map(|(i, _)| i)
            .unwrap_or(0);
        corners.rotate_left(first);
        Self { corners }
    }

    pub fn corners(&self) -> &[Point; 4] {
        &self.corners
    }

    pub fn top_left(&self) -> Point {
        self.corners[0]
    }

    pub fn top_right(&self) -> Point {
        self.corners[1]
    }

    pub fn bottom_right(&self) -> Point {
        self.corners[2]
    }

    pub fn bottom_left(&self) -> Point {
        self.corners[3]
    }

    /// Shoelace area.
    pub fn area(&self) -> f32 {
        let mut twice = 0.0f32;
        for i in 0..4 {
            let a = self.corners[i];
            let b = self.corners[(i + 1) % 4];
            twice += a.x * b.y - b.x * a.y;
        }
        twice.abs() / 2.0
    }

    /// True when the area vanishes or any three consecutive corners are
    /// collinear.
    pub fn is_degenerate(&self) -> bool {
        if self.area() < MIN_QUAD_AREA {
            return true;
        }
        (0..4).any(|i| {
            let (cross, norm) = self.corner_cross(i);
            norm <= f32::EPSILON || (cross / norm).abs() < MIN_CORNER_SINE
        })
    }

    pub fn is_convex(&self) -> bool {
        if self.is_degenerate() {
            return false;
        }
        let signs: Vec<bool> = (0..4).map(|i| self.corner_cross(i).0 > 0.0).collect();
        signs.iter().all(|&s| s) || signs.iter().all(|&s| !s)
    }

    /// True when every corner lies inside a `width` x `height` frame.
    pub fn within(&self, width: u32, height: u32) -> bool {
        self.corners.iter().all(|p| {
            p.x >= 0.0 && p.y >= 0.0 && p.x <= width as f32 && p.y <= height as f32
        })
    }

    /// Averaged opposite side lengths: `(width, height)`.
    pub fn side_lengths(&self) -> (f32, f32) {
        let [tl, tr, br, bl] = self.corners;
        let width = (tl.distance(&tr) + bl.distance(&br)) / 2.0;
        let height = (tl.distance(&bl) + tr.distance(&br)) / 2.0;
        (width, height)
    }

    /// Long side over short side, independent of orientation.
    pub fn aspect_ratio(&self) -> f32 {
        let (w, h) = self.side_lengths();
        let short = w.min(h);
        if short <= f32::EPSILON {
            return f32::INFINITY;
        }
        w.max(h) / short
    }

    pub fn is_portrait(&self) -> bool {
        let (w, h) = self.side_lengths();
        h > w
    }

    pub fn as_tuples(&self) -> [(f32, f32); 4] {
        self.corners.map(|p| p.as_tuple())
    }

    /// Cross product of the two edges meeting at corner `i`, and the product
    /// of their lengths.
    fn corner_cross(&self, i: usize) -> (f32, f32) {
        let prev = self.corners[(i + 3) % 4];
        let cur = self.corners[i];
        let next = self.corners[(i + 1) % 4];
        let (ax, ay) = (cur.x - prev.x, cur.y - prev.y);
        let (bx, by) = (next.x - cur.x, next.y - cur.y);
        let cross = ax * by - ay * bx;
        let norm = (ax * ax + ay * ay).sqrt() * (bx * bx + by * by).sqrt();
        (cross, norm)
    }
}

/// A quadrilateral hypothesised to be a card in one frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Candidate {
    pub quad: Quadrilateral,
    /// Contour area in pixels; larger is more plausible.
    pub score: f32,
    pub frame_index: usize,
}

impl Candidate {
    pub fn new(quad: Quadrilateral, frame_index: usize) -> Self {
        Self {
            quad,
            score: quad.area(),
            frame_index,
        }
    }
}
