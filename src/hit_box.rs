//! Named pixel-space collision volumes. An entity carries one or more hit
//! boxes; each becomes a fixture on the entity's body, and trigger callbacks
//! report which named boxes touched.

use crate::math::Vec2;

/// Pixel-space shape of a hit box. Coordinates are relative to the hit
/// box's local origin, with y growing downward as on screen.
#[derive(Clone, Debug, PartialEq)]
pub enum BoundingShape {
    /// Axis-aligned box given by width and height.
    Box { width: f32, height: f32 },
    Circle { radius: f32 },
    /// Convex polygon outline.
    Polygon(Vec<Vec2>),
    /// Open poly-line, typically terrain.
    Chain(Vec<Vec2>),
}

impl BoundingShape {
    pub fn boxed(width: f32, height: f32) -> Self {
        Self::Box { width, height }
    }

    pub fn circle(radius: f32) -> Self {
        Self::Circle { radius }
    }

    /// Extent of the shape's pixel-space bounding box.
    pub fn size(&self) -> Vec2 {
        match self {
            Self::Box { width, height } => Vec2::new(*width, *height),
            Self::Circle { radius } => Vec2::new(2.0 * radius, 2.0 * radius),
            Self::Polygon(points) | Self::Chain(points) => {
                let mut max = Vec2::ZERO;
                for p in points {
                    max = max.max(*p);
                }
                max
            }
        }
    }
}

/// A named collision volume positioned relative to the owning entity's
/// top-left corner.
#[derive(Clone, Debug, PartialEq)]
pub struct HitBox {
    pub name: String,
    /// Offset of the shape's top-left from the entity's top-left, pixels.
    pub local_origin: Vec2,
    pub shape: BoundingShape,
}

impl HitBox {
    pub fn new(name: impl Into<String>, shape: BoundingShape) -> Self {
        Self {
            name: name.into(),
            local_origin: Vec2::ZERO,
            shape,
        }
    }

    pub fn with_origin(name: impl Into<String>, local_origin: Vec2, shape: BoundingShape) -> Self {
        Self {
            name: name.into(),
            local_origin,
            shape,
        }
    }

    pub fn width(&self) -> f32 {
        self.shape.size().x
    }

    pub fn height(&self) -> f32 {
        self.shape.size().y
    }

    /// Center of the hit box relative to the entity's top-left, pixels.
    pub fn center(&self) -> Vec2 {
        self.local_origin + 0.5 * self.shape.size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_center_accounts_for_origin() {
        let hit_box = HitBox::with_origin(
            "BODY",
            Vec2::new(10.0, 20.0),
            BoundingShape::boxed(30.0, 40.0),
        );
        assert_eq!(hit_box.center(), Vec2::new(25.0, 40.0));
        assert_eq!(hit_box.width(), 30.0);
        assert_eq!(hit_box.height(), 40.0);
    }

    #[test]
    fn circle_size_is_diameter() {
        let hit_box = HitBox::new("HEAD", BoundingShape::circle(15.0));
        assert_eq!(hit_box.width(), 30.0);
        assert_eq!(hit_box.center(), Vec2::new(15.0, 15.0));
    }
}
