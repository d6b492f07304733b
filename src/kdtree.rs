//! Component M (agent half): a 2D KD-tree over agent positions, rebuilt
//! every simulation step, used to bound each agent's neighbor search to
//! nearby cells instead of scanning every other agent.
//!
//! Grounded on `original_source`'s `pathfinder/pyrvo/kd_tree.py`
//! (`KDTree._build_agent_tree_recursive` / `_query_agent_tree_recursive`).
//! The Python version partitions `self._agents` itself during the build;
//! this keeps agent storage stable and partitions a parallel `order`
//! permutation instead, since the rest of this crate addresses agents by
//! their stable arena index.

use glam::Vec2;

const MAX_LEAF_SIZE: usize = 10;

#[derive(Debug, Clone, Copy)]
struct Node {
    begin: usize,
    end: usize,
    left: usize,
    right: usize,
    min: Vec2,
    max: Vec2,
}

/// A KD-tree snapshot. Cheap to rebuild wholesale each step (per
/// `spec.md` §5's single-pass-per-tick model); there is no incremental
/// update path.
pub struct AgentKdTree {
    order: Vec<usize>,
    nodes: Vec<Node>,
}

impl AgentKdTree {
    pub fn build(positions: &[Vec2]) -> Self {
        let mut order: Vec<usize> = (0..positions.len()).collect();
        if order.is_empty() {
            return Self { order, nodes: Vec::new() };
        }

        let mut nodes = vec![
            Node { begin: 0, end: 0, left: 0, right: 0, min: Vec2::ZERO, max: Vec2::ZERO };
            2 * order.len() - 1
        ];
        build_recursive(positions, &mut order, &mut nodes, 0, order.len(), 0);
        Self { order, nodes }
    }

    /// Returns up to `max_neighbors` nearest agents to `position` within
    /// `range_sq`, ascending by squared distance, excluding `self_index`.
    pub fn query_neighbors(&self, positions: &[Vec2], self_index: usize, position: Vec2, max_neighbors: usize, range_sq: f32) -> Vec<(f32, usize)> {
        if self.nodes.is_empty() || max_neighbors == 0 {
            return Vec::new();
        }
        let mut found = Vec::new();
        let mut range_sq = range_sq;
        self.query_recursive(positions, self_index, position, max_neighbors, &mut range_sq, &mut found, 0);
        found
    }

    fn query_recursive(
        &self,
        positions: &[Vec2],
        self_index: usize,
        position: Vec2,
        max_neighbors: usize,
        range_sq: &mut f32,
        found: &mut Vec<(f32, usize)>,
        node_index: usize,
    ) {
        let node = &self.nodes[node_index];
        if node.end - node.begin <= MAX_LEAF_SIZE {
            for &agent_index in &self.order[node.begin..node.end] {
                try_insert(found, max_neighbors, range_sq, self_index, agent_index, positions[agent_index], position);
            }
            return;
        }

        let left = &self.nodes[node.left];
        let right = &self.nodes[node.right];
        let dist_sq_left = corner_dist_sq(left, position);
        let dist_sq_right = corner_dist_sq(right, position);

        if dist_sq_right > dist_sq_left {
            if dist_sq_left < *range_sq {
                self.query_recursive(positions, self_index, position, max_neighbors, range_sq, found, node.left);
                if dist_sq_right < *range_sq {
                    self.query_recursive(positions, self_index, position, max_neighbors, range_sq, found, node.right);
                }
            }
        } else if dist_sq_right < *range_sq {
            self.query_recursive(positions, self_index, position, max_neighbors, range_sq, found, node.right);
            if dist_sq_left < *range_sq {
                self.query_recursive(positions, self_index, position, max_neighbors, range_sq, found, node.left);
            }
        }
    }
}

fn corner_dist_sq(node: &Node, p: Vec2) -> f32 {
    let dx = (node.min.x - p.x).max(0.0).max((p.x - node.max.x).max(0.0));
    let dy = (node.min.y - p.y).max(0.0).max((p.y - node.max.y).max(0.0));
    dx * dx + dy * dy
}

/// Mirrors `Agent.insert_agent_neighbor`'s capped insertion sort.
fn try_insert(found: &mut Vec<(f32, usize)>, cap: usize, range_sq: &mut f32, self_index: usize, candidate: usize, candidate_pos: Vec2, position: Vec2) {
    if candidate == self_index {
        return;
    }
    let dist_sq = (position - candidate_pos).length_squared();
    if dist_sq >= *range_sq {
        return;
    }

    if found.len() < cap {
        found.push((dist_sq, candidate));
    }
    let mut i = found.len() - 1;
    while i != 0 && dist_sq < found[i - 1].0 {
        found[i] = found[i - 1];
        i -= 1;
    }
    found[i] = (dist_sq, candidate);

    if found.len() == cap {
        *range_sq = found.last().unwrap().0;
    }
}

fn build_recursive(positions: &[Vec2], order: &mut [usize], nodes: &mut [Node], begin: usize, end: usize, node_index: usize) {
    let mut min = positions[order[begin]];
    let mut max = min;
    for &i in &order[begin + 1..end] {
        min = min.min(positions[i]);
        max = max.max(positions[i]);
    }
    nodes[node_index].begin = begin;
    nodes[node_index].end = end;
    nodes[node_index].min = min;
    nodes[node_index].max = max;

    if end - begin <= MAX_LEAF_SIZE {
        return;
    }

    let is_vertical = max.x - min.x > max.y - min.y;
    let split_value = if is_vertical { 0.5 * (max.x + min.x) } else { 0.5 * (max.y + min.y) };

    let axis_of = |i: usize| if is_vertical { positions[i].x } else { positions[i].y };

    let mut left = begin;
    let mut right = end;
    while left < right {
        while left < right && axis_of(order[left]) < split_value {
            left += 1;
        }
        while right > left && axis_of(order[right - 1]) >= split_value {
            right -= 1;
        }
        if left < right {
            order.swap(left, right - 1);
            left += 1;
            right -= 1;
        }
    }
    if left == begin {
        left += 1;
    }

    let left_child = node_index + 1;
    let right_child = node_index + 2 * (left - begin);

    nodes[node_index].left = left_child;
    nodes[node_index].right = right_child;

    build_recursive(positions, order, nodes, begin, left, left_child);
    build_recursive(positions, order, nodes, left, end, right_child);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_nearest_neighbor_in_range() {
        let positions = vec![Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0), Vec2::new(5.0, 0.0)];
        let tree = AgentKdTree::build(&positions);
        let found = tree.query_neighbors(&positions, 0, positions[0], 10, 4.0);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].1, 1);
    }

    #[test]
    fn respects_max_neighbors_cap() {
        let positions: Vec<Vec2> = (0..20).map(|i| Vec2::new(i as f32 * 0.1, 0.0)).collect();
        let tree = AgentKdTree::build(&positions);
        let found = tree.query_neighbors(&positions, 0, positions[0], 3, 100.0);
        assert_eq!(found.len(), 3);
        assert!(found.windows(2).all(|w| w[0].0 <= w[1].0));
    }

    #[test]
    fn empty_tree_returns_nothing() {
        let positions: Vec<Vec2> = Vec::new();
        let tree = AgentKdTree::build(&positions);
        assert!(tree.query_neighbors(&positions, 0, Vec2::ZERO, 5, 10.0).is_empty());
    }
}
