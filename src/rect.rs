//! Rectangles.

use cgmath::{EuclideanSpace, Point2, Vector2, Zero};

/// A rectangle, as returned by bounding-rect queries on the display surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    /// Rectangle origin.
    pub origin: Point2<f64>,

    /// Rectangle size.
    pub size: Vector2<f64>,
}

impl Rect {
    /// Creates a new rectangle.
    pub fn new(origin: Point2<f64>, size: Vector2<f64>) -> Rect {
        Rect { origin, size }
    }

    /// Returns a zero-sized rectangle at the origin.
    pub fn zero() -> Rect {
        Rect {
            origin: Point2::new(0., 0.),
            size: Vector2::zero(),
        }
    }

    /// Converts a point in surface (client) coordinates to coordinates relative to the origin.
    pub fn to_local(&self, point: Point2<f64>) -> Point2<f64> {
        Point2::from_vec(point - self.origin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn to_local_is_relative_to_the_origin() {
        let rect = Rect::new(Point2::new(10., 20.), Vector2::new(100., 50.));
        assert_eq!(rect.to_local(Point2::new(15., 30.)), Point2::new(5., 10.));
        assert_eq!(Rect::zero().to_local(Point2::new(3., 4.)), Point2::new(3., 4.));
    }
}
