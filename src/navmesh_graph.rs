//! Component C: polygon adjacency, connected-component groups, per-group
//! dual graphs, and A*/k-shortest pathfinding over them.
//!
//! A* and the open-list bookkeeping are ported from the teacher's
//! `query::find_path` (kept-sorted `open_list`, re-opening on a better
//! `g`), generalized from the teacher's tile+polygon-id node key to a
//! single dense polygon index since this crate bakes one navmesh instead
//! of a tile grid.

use glam::Vec3;

use crate::bvh::Queryable;
use crate::math::Aabb3;

/// One baked, convex, CW-wound polygon and its adjacency.
#[derive(Debug, Clone)]
pub struct NavPolygon {
    pub index: usize,
    pub vertices: Vec<u32>,
    pub group: u32,
    pub neighbors: Vec<NeighborLink>,
    pub center: Vec3,
    pub normal: Vec3,
    /// Outward-facing cross-product normal per edge, parallel to
    /// `vertices`; used for the point-in-polygon sign test.
    pub edge_normals: Vec<Vec3>,
    /// World-space position per entry of `vertices`, duplicated here so the
    /// polygon is self-contained for `Queryable` (which takes no external
    /// vertex buffer).
    positions: Vec<Vec3>,
}

#[derive(Debug, Clone, Copy)]
pub struct NeighborLink {
    pub polygon: usize,
    pub portal: (Vec3, Vec3),
}

/// Builds the adjacency graph (incident-vertex-list intersection), flood
/// fills connected-component groups, and computes each polygon's center,
/// normal, and per-edge outward normals.
pub fn build_navmesh_graph(vertices: &[Vec3], polygons: &[Vec<u32>]) -> Vec<NavPolygon> {
    let mut incident: Vec<Vec<usize>> = vec![Vec::new(); vertices.len()];
    for (pi, poly) in polygons.iter().enumerate() {
        for &v in poly {
            incident[v as usize].push(pi);
        }
    }

    let mut neighbors: Vec<Vec<NeighborLink>> = vec![Vec::new(); polygons.len()];

    for (pi, poly) in polygons.iter().enumerate() {
        let n = poly.len();
        for e in 0..n {
            let u = poly[e];
            let v = poly[(e + 1) % n];

            let shared: Vec<usize> = incident[u as usize]
                .iter()
                .copied()
                .filter(|pj| incident[v as usize].contains(pj))
                .collect();

            match shared.len() {
                0 | 1 => {}
                2 => {
                    let other = shared.into_iter().find(|&pj| pj != pi);
                    if let Some(other) = other {
                        if !neighbors[pi].iter().any(|l| l.polygon == other) {
                            neighbors[pi].push(NeighborLink {
                                polygon: other,
                                portal: (vertices[u as usize], vertices[v as usize]),
                            });
                        }
                    }
                }
                _ => {
                    tracing::warn!(polygon = pi, edge = e, "non-manifold edge shared by {} polygons", shared.len());
                }
            }
        }
    }

    let groups = flood_fill_groups(&neighbors);

    polygons
        .iter()
        .enumerate()
        .map(|(pi, poly)| {
            let pts: Vec<Vec3> = poly.iter().map(|&v| vertices[v as usize]).collect();
            let center = pts.iter().copied().fold(Vec3::ZERO, |a, b| a + b) / pts.len() as f32;
            let normal = polygon_normal(&pts);

            let n = pts.len();
            let edge_normals: Vec<Vec3> = (0..n)
                .map(|i| {
                    let edge = pts[(i + 1) % n] - pts[i];
                    edge.cross(normal).normalize_or_zero()
                })
                .collect();

            NavPolygon {
                index: pi,
                vertices: poly.clone(),
                group: groups[pi],
                neighbors: neighbors[pi].clone(),
                center,
                normal,
                edge_normals,
                positions: pts,
            }
        })
        .collect()
}

fn polygon_normal(pts: &[Vec3]) -> Vec3 {
    let mut normal = Vec3::ZERO;
    for i in 0..pts.len() {
        let a = pts[i];
        let b = pts[(i + 1) % pts.len()];
        normal += a.cross(b);
    }
    normal.normalize_or_else(|| Vec3::Y)
}

trait NormalizeOrElse {
    fn normalize_or_else(self, fallback: impl FnOnce() -> Vec3) -> Vec3;
}

impl NormalizeOrElse for Vec3 {
    fn normalize_or_else(self, fallback: impl FnOnce() -> Vec3) -> Vec3 {
        if self.length_squared() > 1.0e-12 {
            self.normalize()
        } else {
            fallback()
        }
    }
}

fn flood_fill_groups(neighbors: &[Vec<NeighborLink>]) -> Vec<u32> {
    let mut groups = vec![u32::MAX; neighbors.len()];
    let mut next_group = 0u32;

    for start in 0..neighbors.len() {
        if groups[start] != u32::MAX {
            continue;
        }
        let mut stack = vec![start];
        groups[start] = next_group;
        while let Some(p) = stack.pop() {
            for link in &neighbors[p] {
                if groups[link.polygon] == u32::MAX {
                    groups[link.polygon] = next_group;
                    stack.push(link.polygon);
                }
            }
        }
        next_group += 1;
    }

    groups
}

impl NavPolygon {
    /// True if `p`, projected onto this polygon's plane, falls inside
    /// every edge's outward normal half-plane. Used by `PathFinder` to
    /// find which polygon hosts an agent or query point.
    pub fn contains_point(&self, p: Vec3) -> bool {
        let projected = p - self.normal * (p - self.center).dot(self.normal);
        (0..self.positions.len()).all(|i| (projected - self.positions[i]).dot(self.edge_normals[i]) <= 1.0e-4)
    }
}

impl Queryable for NavPolygon {
    fn aabb(&self) -> Aabb3 {
        Aabb3::from_points(self.positions.iter().copied()).inflated(0.01)
    }

    /// Projects `p` onto the polygon's plane, then classifies it against
    /// each edge's outward normal; inside all edges, the projection itself
    /// is the closest point, otherwise the closest point clamps onto the
    /// nearest violated edge segment.
    fn closest_point(&self, p: Vec3) -> Vec3 {
        let projected = p - self.normal * (p - self.center).dot(self.normal);

        let n = self.positions.len();
        let mut worst_edge = None;
        let mut worst_violation = 0.0f32;
        for i in 0..n {
            let violation = (projected - self.positions[i]).dot(self.edge_normals[i]);
            if violation > worst_violation {
                worst_violation = violation;
                worst_edge = Some(i);
            }
        }

        match worst_edge {
            None => projected,
            Some(i) => {
                let a = self.positions[i];
                let b = self.positions[(i + 1) % n];
                closest_point_on_segment(projected, a, b)
            }
        }
    }

    fn plane_distance(&self, p: Vec3) -> f32 {
        (p - self.closest_point(p)).length()
    }

    fn ray_intersect(&self, origin: Vec3, dir: Vec3) -> Option<Vec3> {
        let denom = self.normal.dot(dir);
        if denom.abs() < 1.0e-8 {
            return None;
        }
        let t = (self.center - origin).dot(self.normal) / denom;
        if t < 0.0 {
            return None;
        }
        let hit = origin + dir * t;

        let n = self.positions.len();
        for i in 0..n {
            if (hit - self.positions[i]).dot(self.edge_normals[i]) > 1.0e-4 {
                return None;
            }
        }
        Some(hit)
    }
}

fn closest_point_on_segment(p: Vec3, a: Vec3, b: Vec3) -> Vec3 {
    let ab = b - a;
    let len_sq = ab.length_squared();
    if len_sq < 1.0e-12 {
        return a;
    }
    let t = ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    a + ab * t
}

/// Per-component-group dual graph: vertices are polygon ids, edges are
/// neighbor pairs weighted by the Euclidean distance between centers.
pub struct PolygonGraph<'a> {
    pub group: u32,
    pub members: Vec<usize>,
    polygons: &'a [NavPolygon],
}

impl<'a> PolygonGraph<'a> {
    pub fn for_group(polygons: &'a [NavPolygon], group: u32) -> Self {
        let members = polygons.iter().filter(|p| p.group == group).map(|p| p.index).collect();
        Self { group, members, polygons }
    }

    /// Every undirected edge of this group's dual graph, canonically
    /// ordered, with its Euclidean center-to-center cost.
    pub fn edges(&self) -> Vec<(usize, usize, f32)> {
        let mut seen = std::collections::HashSet::new();
        let mut edges = Vec::new();
        for &p in &self.members {
            for link in &self.polygons[p].neighbors {
                let pair = (p.min(link.polygon), p.max(link.polygon));
                if seen.insert(pair) {
                    edges.push((pair.0, pair.1, self.polygons[pair.0].center.distance(self.polygons[pair.1].center)));
                }
            }
        }
        edges
    }
}

const HEURISTIC_SCALE: f32 = 0.999;

#[derive(Clone, Copy, PartialEq, Eq)]
enum NodeState {
    Unchecked,
    Open,
    Closed,
}

struct AStarNode {
    polygon: usize,
    cost: f32,
    total_cost: f32,
    state: NodeState,
    parent: Option<usize>,
}

/// A* across one group's polygon dual graph. Returns the empty path if
/// `start`/`end` sit in different groups or no connecting route exists.
pub fn find_path(polygons: &[NavPolygon], start: usize, end: usize) -> Vec<usize> {
    if polygons[start].group != polygons[end].group {
        return Vec::new();
    }
    if start == end {
        return vec![start];
    }

    let heuristic = |p: usize| polygons[p].center.distance(polygons[end].center) * HEURISTIC_SCALE;

    let mut nodes = vec![AStarNode {
        polygon: start,
        cost: 0.0,
        total_cost: heuristic(start),
        state: NodeState::Open,
        parent: None,
    }];
    let mut index_of: std::collections::HashMap<usize, usize> = std::collections::HashMap::new();
    index_of.insert(start, 0);

    // Kept sorted descending by total_cost so the cheapest node pops last.
    let mut open_list = vec![0usize];

    while let Some(best_idx) = open_list.pop() {
        if nodes[best_idx].state == NodeState::Closed {
            continue;
        }
        nodes[best_idx].state = NodeState::Closed;
        let best_polygon = nodes[best_idx].polygon;
        let best_cost = nodes[best_idx].cost;

        if best_polygon == end {
            return reconstruct_path(&nodes, best_idx);
        }

        for link in &polygons[best_polygon].neighbors {
            let neighbor_polygon = link.polygon;
            let neighbor_idx = *index_of.entry(neighbor_polygon).or_insert_with(|| {
                nodes.push(AStarNode {
                    polygon: neighbor_polygon,
                    cost: 0.0,
                    total_cost: 0.0,
                    state: NodeState::Unchecked,
                    parent: None,
                });
                nodes.len() - 1
            });

            let step_cost = polygons[best_polygon].center.distance(polygons[neighbor_polygon].center);
            let cost = best_cost + step_cost;
            let total_cost = cost + heuristic(neighbor_polygon);

            let should_update = match nodes[neighbor_idx].state {
                NodeState::Unchecked => true,
                NodeState::Closed | NodeState::Open => cost < nodes[neighbor_idx].cost,
            };
            if !should_update {
                continue;
            }

            nodes[neighbor_idx].cost = cost;
            nodes[neighbor_idx].total_cost = total_cost;
            nodes[neighbor_idx].parent = Some(best_idx);
            nodes[neighbor_idx].state = NodeState::Open;

            if let Some(pos) = open_list.iter().position(|&n| nodes[n].total_cost < total_cost) {
                open_list.insert(pos, neighbor_idx);
            } else {
                open_list.push(neighbor_idx);
            }
        }
    }

    Vec::new()
}

fn reconstruct_path(nodes: &[AStarNode], mut idx: usize) -> Vec<usize> {
    let mut path = vec![nodes[idx].polygon];
    while let Some(parent) = nodes[idx].parent {
        path.push(nodes[parent].polygon);
        idx = parent;
    }
    path.reverse();
    path
}

/// Breadth-first enumeration of every simple path (no repeated polygon
/// within one path) whose length is within `multiplier` of the shortest
/// path, capped at 1000 expansion steps per `spec.md` §4.C.
pub fn collect_paths(polygons: &[NavPolygon], start: usize, end: usize, multiplier: f32) -> Vec<Vec<usize>> {
    const MAX_STEPS: usize = 1000;

    let shortest = find_path(polygons, start, end);
    if shortest.is_empty() {
        return Vec::new();
    }
    let min_len = path_length(polygons, &shortest);
    let max_len = min_len * multiplier;

    let mut results = Vec::new();
    let mut queue = std::collections::VecDeque::new();
    queue.push_back(vec![start]);

    let mut steps = 0;
    while let Some(path) = queue.pop_front() {
        steps += 1;
        if steps > MAX_STEPS {
            tracing::warn!("collect_paths hit the {MAX_STEPS}-step expansion cap");
            break;
        }

        let last = *path.last().unwrap();
        let len = path_length(polygons, &path);

        if last == end && len >= min_len {
            results.push(path.clone());
        }
        if len > max_len {
            continue;
        }

        for link in &polygons[last].neighbors {
            if path.contains(&link.polygon) {
                continue;
            }
            let mut next = path.clone();
            next.push(link.polygon);
            if path_length(polygons, &next) <= max_len {
                queue.push_back(next);
            }
        }
    }

    results
}

fn path_length(polygons: &[NavPolygon], path: &[usize]) -> f32 {
    path.windows(2).map(|w| polygons[w[0]].center.distance(polygons[w[1]].center)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_triangles_vertices() -> Vec<Vec3> {
        vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 1.0),
            Vec3::new(0.0, 0.0, 1.0),
        ]
    }

    #[test]
    fn shared_edge_creates_neighbor_link() {
        let vertices = two_triangles_vertices();
        let polys = vec![vec![0, 1, 2], vec![0, 2, 3]];
        let graph = build_navmesh_graph(&vertices, &polys);
        assert_eq!(graph[0].neighbors.len(), 1);
        assert_eq!(graph[0].neighbors[0].polygon, 1);
        assert_eq!(graph[0].group, graph[1].group);
    }

    #[test]
    fn disconnected_polygons_get_different_groups() {
        let vertices = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 1.0),
            Vec3::new(10.0, 0.0, 0.0),
            Vec3::new(11.0, 0.0, 0.0),
            Vec3::new(11.0, 0.0, 1.0),
        ];
        let polys = vec![vec![0, 1, 2], vec![3, 4, 5]];
        let graph = build_navmesh_graph(&vertices, &polys);
        assert_ne!(graph[0].group, graph[1].group);
    }

    #[test]
    fn finds_path_across_adjacent_polygons() {
        let vertices = two_triangles_vertices();
        let polys = vec![vec![0, 1, 2], vec![0, 2, 3]];
        let graph = build_navmesh_graph(&vertices, &polys);
        let path = find_path(&graph, 0, 1);
        assert_eq!(path, vec![0, 1]);
    }

    #[test]
    fn no_path_across_different_groups() {
        let vertices = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 1.0),
            Vec3::new(10.0, 0.0, 0.0),
            Vec3::new(11.0, 0.0, 0.0),
            Vec3::new(11.0, 0.0, 1.0),
        ];
        let polys = vec![vec![0, 1, 2], vec![3, 4, 5]];
        let graph = build_navmesh_graph(&vertices, &polys);
        assert!(find_path(&graph, 0, 1).is_empty());
    }
}
