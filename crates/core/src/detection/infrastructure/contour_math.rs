//! Contour helpers for the card detector.
//!
//! Reduces a closed border (as produced by `imageproc::contours`) to a
//! polygon and tests whether it is a quadrilateral.

use imageproc::geometry::{approximate_polygon_dp, arc_length};
use imageproc::point::Point as PixelPoint;

use crate::shared::quad::Point;

/// Indices of two mutually distant points (two sweeps of farthest-point
/// search). Returns `None` when all points coincide.
pub fn farthest_pair(points: &[PixelPoint<i32>]) -> Option<(usize, usize)> {
    let first = points.first()?;
    let a = farthest_from(points, first);
    let b = farthest_from(points, &points[a]);
    if a == b || points[a] == points[b] {
        return None;
    }
    Some((a.min(b), a.max(b)))
}

/// Simplifies a closed contour with Douglas-Peucker and returns its
/// vertices.
///
/// The contour is split at two mutually distant points into two open
/// chains, each simplified separately, so the simplification never has to
/// anchor on a pair of coincident endpoints.
pub fn approximate_closed_polygon(
    points: &[PixelPoint<i32>],
    epsilon: f64,
) -> Vec<PixelPoint<i32>> {
    let Some((lo, hi)) = farthest_pair(points) else {
        return Vec::new();
    };

    let forward = &points[lo..=hi];
    let backward: Vec<PixelPoint<i32>> = points[hi..]
        .iter()
        .chain(points[..=lo].iter())
        .copied()
        .collect();

    let mut vertices = approximate_polygon_dp(forward, epsilon, false);
    vertices.pop();
    let mut rest = approximate_polygon_dp(&backward, epsilon, false);
    rest.pop();
    vertices.extend(rest);
    vertices
}

/// Four corners of `points` if it simplifies to exactly a quadrilateral.
///
/// `epsilon_ratio` is the Douglas-Peucker tolerance as a fraction of the
/// perimeter.
pub fn approximate_quad(points: &[PixelPoint<i32>], epsilon_ratio: f64) -> Option<[Point; 4]> {
    if points.len() < 4 {
        return None;
    }
    let epsilon = (arc_length(points, true) * epsilon_ratio).max(1.0);
    let vertices = approximate_closed_polygon(points, epsilon);
    if vertices.len() != 4 {
        return None;
    }
    Some([0, 1, 2, 3].map(|i| Point::new(vertices[i].x as f32, vertices[i].y as f32)))
}

fn farthest_from(points: &[PixelPoint<i32>], origin: &PixelPoint<i32>) -> usize {
    points
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| pixel_distance(origin, a).total_cmp(&pixel_distance(origin, b)))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

fn pixel_distance(a: &PixelPoint<i32>, b: &PixelPoint<i32>) -> f64 {
    let dx = (a.x - b.x) as f64;
    let dy = (a.y - b.y) as f64;
    (dx * dx + dy * dy).sqrt()
}
