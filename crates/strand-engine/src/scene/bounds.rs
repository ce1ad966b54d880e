use glam::{Mat4, Vec3};

/// Axis-aligned bounding box.
///
/// The default box is empty (`min = +MAX`, `max = -MAX`) so extending it with
/// the first point yields a degenerate box around that point.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

/// Sphere enclosing an [`Aabb`].
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f32,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl Aabb {
    pub const EMPTY: Aabb = Aabb {
        min: Vec3::splat(f32::MAX),
        max: Vec3::splat(f32::MIN),
    };

    pub fn new(a: Vec3, b: Vec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    pub fn from_points<'a, I>(points: I) -> Self
    where
        I: IntoIterator<Item = &'a Vec3>,
    {
        let mut aabb = Self::EMPTY;
        for p in points {
            aabb.extend(*p);
        }
        aabb
    }

    pub fn is_empty(&self) -> bool {
        self.min.cmpgt(self.max).any()
    }

    pub fn extend(&mut self, p: Vec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Inclusive on every face.
    pub fn contains(&self, p: Vec3) -> bool {
        p.cmpge(self.min).all() && p.cmple(self.max).all()
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Edge lengths.
    pub fn extent(&self) -> Vec3 {
        self.max - self.min
    }

    /// Box around the eight transformed corners.
    pub fn transformed(&self, m: &Mat4) -> Aabb {
        if self.is_empty() {
            return *self;
        }
        let mut out = Aabb::EMPTY;
        for i in 0..8 {
            let corner = Vec3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            );
            out.extend(m.transform_point3(corner));
        }
        out
    }

    /// Sphere through the box corners; a unit sphere at the origin when empty.
    pub fn bounding_sphere(&self) -> BoundingSphere {
        if self.is_empty() {
            return BoundingSphere {
                center: Vec3::ZERO,
                radius: 1.0,
            };
        }
        BoundingSphere {
            center: self.center(),
            radius: (self.extent().length() * 0.5).max(f32::EPSILON),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_empty() {
        assert!(Aabb::default().is_empty());
    }

    #[test]
    fn single_point_is_degenerate_box() {
        let mut b = Aabb::EMPTY;
        b.extend(Vec3::new(1.0, 2.0, 3.0));
        assert!(!b.is_empty());
        assert_eq!(b.extent(), Vec3::ZERO);
        assert!(b.contains(Vec3::new(1.0, 2.0, 3.0)));
    }

    #[test]
    fn new_sorts_corners() {
        let b = Aabb::new(Vec3::new(1.0, 1.0, -1.0), Vec3::new(-1.0, 0.0, 1.0));
        assert_eq!(b.min, Vec3::new(-1.0, 0.0, -1.0));
        assert_eq!(b.max, Vec3::new(1.0, 1.0, 1.0));
        assert_eq!(b.center(), Vec3::new(0.0, 0.5, 0.0));
    }

    #[test]
    fn sphere_encloses_corners() {
        let b = Aabb::new(Vec3::new(-1.0, 0.0, -2.0), Vec3::new(3.0, 1.0, 2.0));
        let s = b.bounding_sphere();
        for corner in [b.min, b.max, Vec3::new(b.min.x, b.max.y, b.max.z)] {
            assert!((corner - s.center).length() <= s.radius + 1e-5);
        }
    }

    #[test]
    fn empty_box_gets_unit_sphere() {
        let s = Aabb::EMPTY.bounding_sphere();
        assert_eq!(s.radius, 1.0);
        assert_eq!(s.center, Vec3::ZERO);
    }

    #[test]
    fn transformed_by_translation() {
        let b = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let t = b.transformed(&Mat4::from_translation(Vec3::new(2.0, 0.0, 0.0)));
        assert_eq!(t.min, Vec3::new(2.0, 0.0, 0.0));
        assert_eq!(t.max, Vec3::new(3.0, 1.0, 1.0));
    }

    #[test]
    fn union_covers_both() {
        let a = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let b = Aabb::new(Vec3::splat(-1.0), Vec3::splat(0.5));
        let u = a.union(&b);
        assert_eq!(u.min, Vec3::splat(-1.0));
        assert_eq!(u.max, Vec3::ONE);
        assert_eq!(a.union(&Aabb::EMPTY), a);
    }
}
