//! Component M (obstacle half): a binary space partition over obstacle
//! edges, used both to bound an agent's obstacle-neighbor search and to
//! answer straight-line visibility queries against the obstacle set.
//!
//! Grounded on `original_source`'s `pathfinder/pyrvo/kd_tree.py`
//! (`_build_obstacle_tree_recursive` / `_query_obstacle_tree_recursive` /
//! `_query_visibility_recursive`). Obstacle-edge splitting can synthesize
//! new obstacle vertices (an edge straddling the partition plane is cut in
//! two); callers must append those new vertices returned alongside the
//! tree back into their obstacle arena before using it, mirroring how the
//! Python version calls back into the simulator mid-build to register them.

use glam::Vec2;

use crate::rvo::Obstacle;

const RVO_EPSILON: f32 = 0.00001;

fn left_of(a: Vec2, b: Vec2, c: Vec2) -> f32 {
    let v1 = a - c;
    let v2 = b - a;
    v1.x * v2.y - v1.y * v2.x
}

/// One split of the obstacle-edge BSP. A `None` child (rather than a
/// dedicated leaf variant) marks an empty partition, mirroring how
/// `_build_obstacle_tree_recursive` returns `None` for an empty candidate
/// list.
struct BspNode {
    obstacle: usize,
    left: Option<Box<BspNode>>,
    right: Option<Box<BspNode>>,
}

pub struct ObstacleBsp {
    root: Option<Box<BspNode>>,
}

impl ObstacleBsp {
    /// Builds the tree over every obstacle edge `(i, next(i))`, appending
    /// any obstacle-splitting vertices it needs to synthesize onto
    /// `obstacles` as it goes.
    pub fn build(obstacles: &mut Vec<Obstacle>) -> Self {
        let indices: Vec<usize> = (0..obstacles.len()).collect();
        let root = build_recursive(obstacles, indices);
        Self { root }
    }

    /// Descends the tree narrowing `range_sq` in-place via `agent`'s
    /// insertion-sort neighbor list, mirroring
    /// `KDTree._query_obstacle_tree_recursive`.
    pub fn query_neighbors(&self, obstacles: &[Obstacle], position: Vec2, range_sq: f32, mut insert: impl FnMut(usize, Vec2, Vec2, f32)) {
        query_recursive(obstacles, &self.root, position, range_sq, &mut insert);
    }

    pub fn query_visibility(&self, obstacles: &[Obstacle], start: Vec2, end: Vec2, radius: f32) -> bool {
        query_visibility_recursive(obstacles, &self.root, start, end, radius)
    }
}

fn build_recursive(obstacles: &mut Vec<Obstacle>, candidates: Vec<usize>) -> Option<Box<BspNode>> {
    if candidates.is_empty() {
        return None;
    }

    let mut optimal_split = 0usize;
    let mut min_left = candidates.len();
    let mut min_right = candidates.len();

    for (ci, &i) in candidates.iter().enumerate() {
        let (p1, p2) = (obstacles[i].point, obstacles[obstacles[i].next].point);
        let mut left_size = 0usize;
        let mut right_size = 0usize;

        for &j in &candidates {
            if j == i {
                continue;
            }
            let (q1, q2) = (obstacles[j].point, obstacles[obstacles[j].next].point);
            let j1_left = left_of(p1, p2, q1);
            let j2_left = left_of(p1, p2, q2);
            if j1_left >= -RVO_EPSILON && j2_left >= -RVO_EPSILON {
                left_size += 1;
            } else if j1_left <= RVO_EPSILON && j2_left <= RVO_EPSILON {
                right_size += 1;
            } else {
                left_size += 1;
                right_size += 1;
            }

            if (left_size.max(right_size), left_size.min(right_size)) >= (min_left.max(min_right), min_left.min(min_right)) {
                break;
            }
        }

        if (left_size.max(right_size), left_size.min(right_size)) < (min_left.max(min_right), min_left.min(min_right)) {
            min_left = left_size;
            min_right = right_size;
            optimal_split = ci;
        }
    }

    let split_index = candidates[optimal_split];
    let (p1, p2) = (obstacles[split_index].point, obstacles[obstacles[split_index].next].point);

    let mut left_obstacles = Vec::with_capacity(min_left);
    let mut right_obstacles = Vec::with_capacity(min_right);

    for &j in &candidates {
        if j == split_index {
            continue;
        }
        let (q1, q2_index) = (obstacles[j].point, obstacles[j].next);
        let q2 = obstacles[q2_index].point;
        let j1_left = left_of(p1, p2, q1);
        let j2_left = left_of(p1, p2, q2);

        if j1_left >= -RVO_EPSILON && j2_left >= -RVO_EPSILON {
            left_obstacles.push(j);
        } else if j1_left <= RVO_EPSILON && j2_left <= RVO_EPSILON {
            right_obstacles.push(j);
        } else {
            let v1 = p2 - p1;
            let v12 = q1 - p1;
            let v22 = q1 - q2;
            let t = (v1.x * v12.y - v1.y * v12.x) / (v1.x * v22.y - v1.y * v22.x);
            let split_point = q1 + (q2 - q1) * t;

            let new_index = obstacles.len();
            let new_unit_dir = obstacles[j].unit_dir;
            obstacles.push(Obstacle { point: split_point, unit_dir: new_unit_dir, convex: true, next: q2_index, prev: j });
            obstacles[j].next = new_index;
            obstacles[q2_index].prev = new_index;

            if j1_left > 0.0 {
                left_obstacles.push(j);
                right_obstacles.push(new_index);
            } else {
                right_obstacles.push(j);
                left_obstacles.push(new_index);
            }
        }
    }

    let left = build_recursive(obstacles, left_obstacles);
    let right = build_recursive(obstacles, right_obstacles);

    Some(Box::new(BspNode { obstacle: split_index, left, right }))
}

fn query_recursive(obstacles: &[Obstacle], node: &Option<Box<BspNode>>, position: Vec2, range_sq: f32, insert: &mut impl FnMut(usize, Vec2, Vec2, f32)) {
    let Some(node) = node else { return };
    let BspNode { obstacle, left, right } = node.as_ref();

    let p1 = obstacles[*obstacle].point;
    let p2 = obstacles[obstacles[*obstacle].next].point;
    let agent_left = left_of(p1, p2, position);

    let (near, far) = if agent_left >= 0.0 { (left, right) } else { (right, left) };
    query_recursive(obstacles, near, position, range_sq, insert);

    let dist_sq_line = (agent_left * agent_left) / (p2 - p1).length_squared();
    if dist_sq_line < range_sq {
        if agent_left < 0.0 {
            insert(*obstacle, p1, p2, range_sq);
        }
        query_recursive(obstacles, far, position, range_sq, insert);
    }
}

fn query_visibility_recursive(obstacles: &[Obstacle], node: &Option<Box<BspNode>>, q1: Vec2, q2: Vec2, radius: f32) -> bool {
    let Some(node) = node else { return true };
    let BspNode { obstacle, left, right } = node.as_ref();

    let p1 = obstacles[*obstacle].point;
    let p2 = obstacles[obstacles[*obstacle].next].point;
    let q1_left = left_of(p1, p2, q1);
    let q2_left = left_of(p1, p2, q2);
    let inv_len_i = 1.0 / (p2 - p1).length_squared();

    if q1_left >= 0.0 && q2_left >= 0.0 {
        query_visibility_recursive(obstacles, left, q1, q2, radius)
            && ((q1_left * q1_left * inv_len_i >= radius * radius && q2_left * q2_left * inv_len_i >= radius * radius)
                || query_visibility_recursive(obstacles, right, q1, q2, radius))
    } else if q1_left <= 0.0 && q2_left <= 0.0 {
        query_visibility_recursive(obstacles, right, q1, q2, radius)
            && ((q1_left * q1_left * inv_len_i >= radius * radius && q2_left * q2_left * inv_len_i >= radius * radius)
                || query_visibility_recursive(obstacles, left, q1, q2, radius))
    } else if q1_left >= 0.0 && q2_left <= 0.0 {
        query_visibility_recursive(obstacles, left, q1, q2, radius) && query_visibility_recursive(obstacles, right, q1, q2, radius)
    } else {
        let point1_left = left_of(q1, q2, p1);
        let point2_left = left_of(q1, q2, p2);
        let inv_len_q = 1.0 / (q2 - q1).length_squared();

        point1_left * point2_left >= 0.0
            && point1_left * point1_left * inv_len_q > radius * radius
            && point2_left * point2_left * inv_len_q > radius * radius
            && query_visibility_recursive(obstacles, left, q1, q2, radius)
            && query_visibility_recursive(obstacles, right, q1, q2, radius)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_obstacle() -> Vec<Obstacle> {
        // A single convex square loop, unit_dir/convex left approximate since
        // these tests only exercise visibility, not ORCA line construction.
        let pts = [Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0), Vec2::new(1.0, 1.0), Vec2::new(0.0, 1.0)];
        let n = pts.len();
        (0..n)
            .map(|i| Obstacle {
                point: pts[i],
                unit_dir: (pts[(i + 1) % n] - pts[i]).normalize(),
                convex: true,
                next: (i + 1) % n,
                prev: (i + n - 1) % n,
            })
            .collect()
    }

    #[test]
    fn visibility_blocked_through_obstacle() {
        let mut obstacles = square_obstacle();
        let bsp = ObstacleBsp::build(&mut obstacles);
        let visible = bsp.query_visibility(&obstacles, Vec2::new(-1.0, 0.5), Vec2::new(2.0, 0.5), 0.0);
        assert!(!visible);
    }

    #[test]
    fn visibility_clear_when_far_from_obstacle() {
        let mut obstacles = square_obstacle();
        let bsp = ObstacleBsp::build(&mut obstacles);
        let visible = bsp.query_visibility(&obstacles, Vec2::new(10.0, 10.0), Vec2::new(11.0, 11.0), 0.0);
        assert!(visible);
    }
}
