//! Vector/geometry primitives: AABBs, triangle queries, and the integer
//! 2D predicates used by contour simplification and polygon meshing.

use glam::{IVec4, UVec4, Vec2, Vec3};

/// Axis-aligned bounding box in 3D world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb3 {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb3 {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Self {
        let mut min = Vec3::splat(f32::INFINITY);
        let mut max = Vec3::splat(f32::NEG_INFINITY);
        for p in points {
            min = min.min(p);
            max = max.max(p);
        }
        Self { min, max }
    }

    pub fn inflated(&self, delta: f32) -> Self {
        Self {
            min: self.min - Vec3::splat(delta),
            max: self.max + Vec3::splat(delta),
        }
    }

    pub fn union(&self, other: &Aabb3) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Strict containment test (matches the BVH's exclusive-bound convention).
    pub fn contains_point(&self, point: Vec3) -> bool {
        self.min.x < point.x
            && self.min.y < point.y
            && self.min.z < point.z
            && self.max.x > point.x
            && self.max.y > point.y
            && self.max.z > point.z
    }

    /// Slab-test ray intersection; returns the entry/exit parametric range
    /// along `dir` if the ray crosses the box at all.
    pub fn ray_intersect(&self, origin: Vec3, dir: Vec3) -> Option<(f32, f32)> {
        let mut t_min = f32::NEG_INFINITY;
        let mut t_max = f32::INFINITY;

        for axis in 0..3 {
            let o = origin[axis];
            let d = dir[axis];
            let lo = self.min[axis];
            let hi = self.max[axis];

            if d.abs() < f32::EPSILON {
                if o < lo || o > hi {
                    return None;
                }
                continue;
            }

            let inv = 1.0 / d;
            let mut t1 = (lo - o) * inv;
            let mut t2 = (hi - o) * inv;
            if t1 > t2 {
                std::mem::swap(&mut t1, &mut t2);
            }
            t_min = t_min.max(t1);
            t_max = t_max.min(t2);
            if t_min > t_max {
                return None;
            }
        }

        Some((t_min, t_max))
    }
}

/// A triangle with precomputed edge basis for closest-point and ray queries.
#[derive(Debug, Clone, Copy)]
pub struct Triangle {
    pub a: Vec3,
    pub b: Vec3,
    pub c: Vec3,
    e1: Vec3,
    e2: Vec3,
    dot_aa: f32,
    dot_ab: f32,
    dot_bb: f32,
    det: f32,
}

impl Triangle {
    pub fn new(a: Vec3, b: Vec3, c: Vec3) -> Self {
        let e1 = b - a;
        let e2 = c - a;
        let dot_aa = e1.dot(e1);
        let dot_ab = e1.dot(e2);
        let dot_bb = e2.dot(e2);
        let det = dot_aa * dot_bb - dot_ab * dot_ab;

        Self {
            a,
            b,
            c,
            e1,
            e2,
            dot_aa,
            dot_ab,
            dot_bb,
            det,
        }
    }

    pub fn aabb(&self) -> Aabb3 {
        Aabb3::from_points([self.a, self.b, self.c])
    }

    pub fn normal(&self) -> Vec3 {
        self.e1.cross(self.e2).normalize_or_zero()
    }

    /// Closest point on the (filled) triangle to `p`, by barycentric region
    /// classification. Always returns a point on or inside the triangle.
    pub fn closest_point(&self, p: Vec3) -> Vec3 {
        let ap = p - self.a;
        let d1 = self.e1.dot(ap);
        let d2 = self.e2.dot(ap);

        // Vertex region a.
        if d1 <= 0.0 && d2 <= 0.0 {
            return self.a;
        }

        let bp = p - self.b;
        let d3 = self.e1.dot(bp);
        let d4 = self.e2.dot(bp);

        // Vertex region b.
        if d3 >= 0.0 && d4 <= d3 {
            return self.b;
        }

        // Edge region ab.
        let vc = d1 * d4 - d3 * d2;
        if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
            let t = d1 / (d1 - d3);
            return self.a + self.e1 * t;
        }

        let cp = p - self.c;
        let d5 = self.e1.dot(cp);
        let d6 = self.e2.dot(cp);

        // Vertex region c.
        if d6 >= 0.0 && d5 <= d6 {
            return self.c;
        }

        // Edge region ac.
        let vb = d5 * d2 - d1 * d6;
        if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
            let t = d2 / (d2 - d6);
            return self.a + self.e2 * t;
        }

        // Edge region bc.
        let va = d3 * d6 - d5 * d4;
        if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
            let t = (d4 - d3) / ((d4 - d3) + (d5 - d6));
            return self.b + (self.c - self.b) * t;
        }

        // Interior.
        if self.det.abs() <= f32::EPSILON {
            return self.a;
        }
        let s = (self.dot_bb * d1 - self.dot_ab * d2) / self.det;
        let t = (self.dot_aa * d2 - self.dot_ab * d1) / self.det;
        self.a + self.e1 * s + self.e2 * t
    }

    /// Möller–Trumbore ray/triangle intersection. Parallel rays and hits
    /// behind the ray origin are treated as a miss.
    pub fn ray_intersect(&self, origin: Vec3, dir: Vec3) -> Option<Vec3> {
        const EPSILON: f32 = 1.0e-6;

        let pvec = dir.cross(self.e2);
        let det = self.e1.dot(pvec);
        if det.abs() < EPSILON {
            return None;
        }
        let inv_det = 1.0 / det;

        let tvec = origin - self.a;
        let u = tvec.dot(pvec) * inv_det;
        if !(0.0..=1.0).contains(&u) {
            return None;
        }

        let qvec = tvec.cross(self.e1);
        let v = dir.dot(qvec) * inv_det;
        if v < 0.0 || u + v > 1.0 {
            return None;
        }

        let t = self.e2.dot(qvec) * inv_det;
        if t < EPSILON {
            return None;
        }

        Some(origin + dir * t)
    }
}

/// Signed twice-area of the `(a, b, c)` triangle projected to the `xz`
/// plane; positive when `a -> b -> c` turns counter-clockwise.
pub fn triangle_area_2d(a: Vec3, b: Vec3, c: Vec3) -> f32 {
    let ab = Vec2::new(b.x - a.x, b.z - a.z);
    let ac = Vec2::new(c.x - a.x, c.z - a.z);
    ac.x * ab.y - ab.x * ac.y
}

/// Squared distance from `point` to the segment `(seg_a, seg_b)`, on the
/// plane the caller's coordinates already live in.
pub fn point_distance_from_segment(point: glam::IVec2, seg_a: glam::IVec2, seg_b: glam::IVec2) -> f32 {
    let segment_delta = (seg_b - seg_a).as_vec2();
    let point_delta = (point - seg_a).as_vec2();

    let d = segment_delta.length_squared();
    let mut t = segment_delta.dot(point_delta);
    if d > 0.0 {
        t /= d;
    }
    t = t.clamp(0.0, 1.0);

    let projected = seg_a.as_vec2() + segment_delta * t;
    projected.distance_squared(point.as_vec2())
}

// --- Integer xz-plane predicates shared by contour hole-merging and
// polygon ear-clipping. Operate on grid-unit vertices packed as
// `(x, y, z, payload)`; only x/z participate in the sign tests. ---

fn cross2(o: IVec4, a: IVec4, b: IVec4) -> i64 {
    let ax = (a.x - o.x) as i64;
    let az = (a.z - o.z) as i64;
    let bx = (b.x - o.x) as i64;
    let bz = (b.z - o.z) as i64;
    ax * bz - az * bx
}

/// Strictly-left turn test: is `c` strictly left of the directed line `a->b`?
pub fn left(a: IVec4, b: IVec4, c: IVec4) -> bool {
    cross2(a, b, c) < 0
}

/// Non-strict left turn test (left or collinear).
pub fn left_on(a: IVec4, b: IVec4, c: IVec4) -> bool {
    cross2(a, b, c) <= 0
}

fn collinear(a: IVec4, b: IVec4, c: IVec4) -> bool {
    cross2(a, b, c) == 0
}

fn between(a: IVec4, b: IVec4, c: IVec4) -> bool {
    if !collinear(a, b, c) {
        return false;
    }
    if a.x != b.x {
        (a.x <= c.x && c.x <= b.x) || (a.x >= c.x && c.x >= b.x)
    } else {
        (a.z <= c.z && c.z <= b.z) || (a.z >= c.z && c.z >= b.z)
    }
}

/// Proper segment intersection: `(a,b)` and `(c,d)` cross at an interior
/// point of both, sharing no endpoint.
pub fn intersect_prop(a: IVec4, b: IVec4, c: IVec4, d: IVec4) -> bool {
    if collinear(a, b, c) || collinear(a, b, d) || collinear(c, d, a) || collinear(c, d, b) {
        return false;
    }
    (left(a, b, c) ^ left(a, b, d)) && (left(c, d, a) ^ left(c, d, b))
}

/// General segment intersection, including touching/collinear-overlap cases.
pub fn intersect(a: IVec4, b: IVec4, c: IVec4, d: IVec4) -> bool {
    if intersect_prop(a, b, c, d) {
        return true;
    }
    between(a, b, c) || between(a, b, d) || between(c, d, a) || between(c, d, b)
}

/// Is `b` visible from `a` through the cone formed by `a`'s neighbors in a
/// CCW polygon, i.e. is the diagonal `a-b` an internal diagonal at vertex
/// `a`? `prev`/`next` are `a`'s polygon neighbors.
pub fn in_cone(prev: IVec4, a: IVec4, next: IVec4, b: IVec4) -> bool {
    if left_on(prev, a, next) {
        left(a, b, prev) && left(b, a, next)
    } else {
        !(left_on(a, b, next) && left_on(b, a, prev))
    }
}

pub fn uvec4_to_ivec4(v: UVec4) -> IVec4 {
    IVec4::new(v.x as i32, v.y as i32, v.z as i32, v.w as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closest_point_inside_is_projection() {
        let tri = Triangle::new(
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
        );
        let p = tri.closest_point(Vec3::new(0.25, 5.0, 0.25));
        assert!((p - Vec3::new(0.25, 0.0, 0.25)).length() < 1.0e-5);
    }

    #[test]
    fn closest_point_outside_clamps_to_edge() {
        let tri = Triangle::new(
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
        );
        let p = tri.closest_point(Vec3::new(2.0, 0.0, 2.0));
        assert!(p.x >= 0.0 && p.z >= 0.0);
        assert!(p.x + p.z <= 1.0 + 1.0e-5);
    }

    #[test]
    fn ray_intersect_hits_unit_triangle() {
        let tri = Triangle::new(
            Vec3::new(-1.0, 0.0, -1.0),
            Vec3::new(1.0, 0.0, -1.0),
            Vec3::new(0.0, 0.0, 1.0),
        );
        let hit = tri.ray_intersect(Vec3::new(0.0, 1.0, 0.0), Vec3::new(0.0, -1.0, 0.0));
        assert!(hit.is_some());
    }

    #[test]
    fn ray_parallel_to_triangle_misses() {
        let tri = Triangle::new(
            Vec3::new(-1.0, 0.0, -1.0),
            Vec3::new(1.0, 0.0, -1.0),
            Vec3::new(0.0, 0.0, 1.0),
        );
        let hit = tri.ray_intersect(Vec3::new(0.0, 1.0, 0.0), Vec3::new(1.0, 0.0, 0.0));
        assert!(hit.is_none());
    }

    #[test]
    fn aabb_ray_intersect() {
        let aabb = Aabb3::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        assert!(aabb
            .ray_intersect(Vec3::new(-5.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0))
            .is_some());
        assert!(aabb
            .ray_intersect(Vec3::new(-5.0, 5.0, 5.0), Vec3::new(1.0, 0.0, 0.0))
            .is_none());
    }
}
