//! Components B and D: a median-split AABB tree shared by triangle-soup
//! sampling (pre-bake queries over raw input geometry) and polygon
//! sampling/raycasting over the baked navmesh.
//!
//! The teacher has no BVH of its own (it resolves queries through Bevy's
//! tile grid instead); the binary leaf/internal split here is grounded on
//! the shape of `other_examples`' `rynorris-paths` BVH, built with the
//! median-split-on-longer-extent rule `spec.md` §4.B specifies rather than
//! that example's surface-area-heuristic clustering.

use glam::Vec3;

use crate::math::Aabb3;

/// Numeric slack added to every internal node's AABB so a query point
/// sitting exactly on a split plane still finds both children.
const INFLATE: f32 = 1.0e-4;

/// Anything the BVH can store at a leaf: bounded, with a closest-point
/// query (used by `sample`) and a ray query (used by `raycast`).
pub trait Queryable {
    fn aabb(&self) -> Aabb3;
    /// Closest point on/in the primitive to `p`.
    fn closest_point(&self, p: Vec3) -> Vec3;
    /// Unsigned distance from `p` to the primitive's plane, used to break
    /// ties between two leaves whose AABBs both contain `p`.
    fn plane_distance(&self, p: Vec3) -> f32;
    fn ray_intersect(&self, origin: Vec3, dir: Vec3) -> Option<Vec3>;
}

enum Node {
    Leaf(usize),
    Internal { aabb: Aabb3, left: Box<Node>, right: Box<Node> },
}

pub struct Bvh<T> {
    items: Vec<T>,
    root: Option<Node>,
}

impl<T: Queryable> Bvh<T> {
    pub fn build(items: Vec<T>) -> Self {
        if items.is_empty() {
            return Self { items, root: None };
        }
        let indices: Vec<usize> = (0..items.len()).collect();
        let root = Some(build_node(&items, indices));
        Self { items, root }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Closest primitive's closest point to `p`. `slow` skips the AABB
    /// containment test and visits every leaf, useful when `p` might lie
    /// just outside every inflated box (e.g. directly above a navmesh).
    pub fn sample(&self, p: Vec3, slow: bool) -> Option<Vec3> {
        let root = self.root.as_ref()?;
        let mut best: Option<(Vec3, f32)> = None;
        self.sample_node(root, p, slow, &mut best);
        best.map(|(point, _)| point)
    }

    fn sample_node(&self, node: &Node, p: Vec3, slow: bool, best: &mut Option<(Vec3, f32)>) {
        match node {
            Node::Leaf(idx) => {
                let item = &self.items[*idx];
                let point = item.closest_point(p);
                let dist = item.plane_distance(p);
                if best.map_or(true, |(_, d)| dist < d) {
                    *best = Some((point, dist));
                }
            }
            Node::Internal { aabb, left, right } => {
                if slow || aabb.contains_point(p) {
                    self.sample_node(left, p, slow, best);
                    self.sample_node(right, p, slow, best);
                }
            }
        }
    }

    /// Closest ray hit across every primitive, or `None` if the ray misses
    /// the tree entirely.
    pub fn raycast(&self, origin: Vec3, dir: Vec3) -> Option<Vec3> {
        let root = self.root.as_ref()?;
        let mut best: Option<(Vec3, f32)> = None;
        self.raycast_node(root, origin, dir, &mut best);
        best.map(|(point, _)| point)
    }

    fn raycast_node(&self, node: &Node, origin: Vec3, dir: Vec3, best: &mut Option<(Vec3, f32)>) {
        match node {
            Node::Leaf(idx) => {
                let item = &self.items[*idx];
                if let Some(hit) = item.ray_intersect(origin, dir) {
                    let t = (hit - origin).length();
                    if best.map_or(true, |(_, bt)| t < bt) {
                        *best = Some((hit, t));
                    }
                }
            }
            Node::Internal { aabb, left, right } => {
                if aabb.ray_intersect(origin, dir).is_some() {
                    self.raycast_node(left, origin, dir, best);
                    self.raycast_node(right, origin, dir, best);
                }
            }
        }
    }
}

fn axis_value(aabb: &Aabb3, axis: usize) -> f32 {
    (aabb.min[axis] + aabb.max[axis]) * 0.5
}

fn build_node<T: Queryable>(items: &[T], indices: Vec<usize>) -> Node {
    if indices.len() == 1 {
        return Node::Leaf(indices[0]);
    }

    let mut union = items[indices[0]].aabb();
    for &i in &indices[1..] {
        union = union.union(&items[i].aabb());
    }

    let extent = union.max - union.min;
    let axis = if extent.x >= extent.z { 0usize } else { 2usize };

    let mean: f32 =
        indices.iter().map(|&i| axis_value(&items[i].aabb(), axis)).sum::<f32>() / indices.len() as f32;

    let mut left = Vec::new();
    let mut right = Vec::new();
    for i in indices {
        if axis_value(&items[i].aabb(), axis) < mean {
            left.push(i);
        } else {
            right.push(i);
        }
    }

    if left.is_empty() {
        left.push(right.pop().unwrap());
    } else if right.is_empty() {
        right.push(left.pop().unwrap());
    }

    Node::Internal {
        aabb: union.inflated(INFLATE),
        left: Box::new(build_node(items, left)),
        right: Box::new(build_node(items, right)),
    }
}

impl Queryable for crate::math::Triangle {
    fn aabb(&self) -> Aabb3 {
        crate::math::Triangle::aabb(self)
    }

    fn closest_point(&self, p: Vec3) -> Vec3 {
        crate::math::Triangle::closest_point(self, p)
    }

    fn plane_distance(&self, p: Vec3) -> f32 {
        (p - self.closest_point(p)).length()
    }

    fn ray_intersect(&self, origin: Vec3, dir: Vec3) -> Option<Vec3> {
        crate::math::Triangle::ray_intersect(self, origin, dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Triangle;

    fn tris() -> Vec<Triangle> {
        vec![
            Triangle::new(Vec3::new(0.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 0.0, 1.0)),
            Triangle::new(Vec3::new(10.0, 0.0, 0.0), Vec3::new(11.0, 0.0, 0.0), Vec3::new(10.0, 0.0, 1.0)),
        ]
    }

    #[test]
    fn sample_finds_nearest_triangle() {
        let bvh = Bvh::build(tris());
        let p = bvh.sample(Vec3::new(0.1, 1.0, 0.1), true).unwrap();
        assert!(p.x < 5.0);
    }

    #[test]
    fn raycast_hits_correct_triangle() {
        let bvh = Bvh::build(tris());
        let hit = bvh.raycast(Vec3::new(10.2, 1.0, 0.2), Vec3::new(0.0, -1.0, 0.0));
        assert!(hit.is_some());
        assert!(hit.unwrap().x > 5.0);
    }

    #[test]
    fn empty_bvh_returns_none() {
        let bvh: Bvh<Triangle> = Bvh::build(Vec::new());
        assert!(bvh.sample(Vec3::ZERO, true).is_none());
        assert!(bvh.raycast(Vec3::ZERO, Vec3::Y).is_none());
    }

    /// Property 3 (BVH completeness): for every polygon and every point
    /// inside it, sampling that point returns that same point back —
    /// i.e. the BVH resolves the query to the polygon that actually
    /// contains it, not some other leaf whose AABB happens to overlap.
    #[test]
    fn sample_resolves_every_polygon_at_its_own_interior_points() {
        use crate::navmesh_graph::build_navmesh_graph;

        let vertices = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 1.0),
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(2.0, 0.0, 0.0),
            Vec3::new(2.0, 0.0, 1.0),
            Vec3::new(2.0, 0.0, 2.0),
            Vec3::new(1.0, 0.0, 2.0),
            Vec3::new(0.0, 0.0, 2.0),
        ];
        let polygon_indices = vec![vec![0, 1, 2, 3], vec![1, 4, 5, 2], vec![3, 2, 6, 7], vec![8, 3, 7]];
        let polygons = build_navmesh_graph(&vertices, &polygon_indices);
        let centers: Vec<Vec3> = polygons.iter().map(|p| p.center).collect();

        let bvh = Bvh::build(polygons);
        for center in centers {
            let sampled = bvh.sample(center, false).expect("every interior point must sample to some polygon");
            assert!((sampled - center).length() < 1.0e-3, "expected sample({center:?}) = {center:?}, got {sampled:?}");
        }
    }
}
