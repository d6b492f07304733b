//! Component N: the PathFinder glue that ties a baked navmesh's polygon
//! graph to one RVO simulator per connected component, and drives the
//! per-tick path-follow loop.
//!
//! Grounded on `original_source`'s `pathfinder/__init__.py`'s `PathFinder`
//! class: boundary extraction, obstacle inset, agent lifecycle, and the
//! `update()` path-follow loop are all ported from there, onto this
//! crate's [`crate::navmesh_graph`], [`crate::rvo`], [`crate::kdtree`], and
//! [`crate::obstacle_bsp`]. Per `spec.md` §5, `update` takes an explicit
//! `delta_time` from the caller rather than reading the wall clock the
//! Python version does (`time.time()`); the path-refresh timer
//! accumulates that same caller-supplied `delta_time` instead, keeping the
//! whole core free of hidden I/O.

use glam::{Vec2, Vec3};

use crate::config::AgentDefaults;
use crate::funnel::funnel;
use crate::kdtree::AgentKdTree;
use crate::navmesh_graph::{find_path, NavPolygon};
use crate::obstacle_bsp::ObstacleBsp;
use crate::rvo::{Obstacle, RvoAgent};

/// Tunables beyond the per-agent RVO defaults: how often to refresh an
/// active agent's plan, and whether agents actually integrate position
/// (vs. only computing velocities).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathFinderConfig {
    pub agent_defaults: AgentDefaults,
    /// Seconds between automatic path re-searches for an active agent.
    pub update_path_find: f32,
    /// If true, a finished agent re-targets its own destination again
    /// instead of deactivating.
    pub continuous_moving: bool,
    /// If false, agents compute velocities but never move (useful for
    /// visualizing avoidance without advancing simulation state).
    pub move_agents: bool,
}

impl Default for PathFinderConfig {
    fn default() -> Self {
        Self {
            agent_defaults: AgentDefaults::default(),
            update_path_find: 1.0,
            continuous_moving: false,
            move_agents: true,
        }
    }
}

/// Sentinel agent handle returned by `add_agent` on failure, matching
/// `spec.md` §6's "-1 on failure" contract.
pub const INVALID_AGENT: u32 = u32::MAX;

struct AgentState {
    handle: u32,
    group: u32,
    /// World-space path points, `y` preserved per point.
    path: Vec<Vec3>,
    /// `(x, z)` projection of `path`, used for target comparisons.
    targets: Vec<Vec2>,
    target_index: usize,
    target_direction: Vec2,
    speed: f32,
    active: bool,
}

struct GroupSimulator {
    agents: Vec<RvoAgent>,
    /// Parallel to `agents`: the stable handle of each live agent.
    handles: Vec<u32>,
    obstacles: Vec<Obstacle>,
    obstacle_bsp: ObstacleBsp,
}

impl GroupSimulator {
    fn index_of(&self, handle: u32) -> Option<usize> {
        self.handles.iter().position(|&h| h == handle)
    }

    /// Mirrors `RVOSimulator.do_step`'s two-phase ordering: every agent's
    /// neighbors and new velocity are computed from one untouched
    /// snapshot, then every agent's position is integrated.
    fn do_step(&mut self, delta_time: f32, move_agents: bool) {
        let positions: Vec<Vec2> = self.agents.iter().map(|a| a.position).collect();
        let tree = AgentKdTree::build(&positions);

        for i in 0..self.agents.len() {
            self.agents[i].obstacle_neighbors.clear();
            let range_sq_obst = (self.agents[i].time_horizon_obstacle * self.agents[i].max_speed + self.agents[i].radius).powi(2);
            let position = self.agents[i].position;
            let obstacles = &self.obstacles;
            let agent = &mut self.agents[i];
            self.obstacle_bsp.query_neighbors(obstacles, position, range_sq_obst, |idx, p1, p2, range| {
                agent.insert_obstacle_neighbor(idx, p1, p2, range);
            });

            self.agents[i].agent_neighbors.clear();
            if self.agents[i].max_neighbors > 0 {
                let range_sq_agents = self.agents[i].neighbor_dist.powi(2);
                let found = tree.query_neighbors(&positions, i, position, self.agents[i].max_neighbors, range_sq_agents);
                self.agents[i].agent_neighbors = found;
            }
        }

        let new_velocities: Vec<Vec2> =
            self.agents.iter().map(|a| a.compute_new_velocity(&self.obstacles, &self.agents, delta_time)).collect();

        for (agent, new_velocity) in self.agents.iter_mut().zip(new_velocities) {
            agent.update(new_velocity, delta_time, move_agents);
        }
    }
}

/// Builds the inward-offset obstacle polyline for one boundary cycle,
/// mirroring `PathFinder.__init__`'s per-vertex normal-shift-and-intersect
/// loop. `cycle` is a closed sequence of `(x, z)` points (first point not
/// repeated at the end).
fn inset_boundary(cycle: &[Vec2], shift: f32) -> Vec<Vec2> {
    let n = cycle.len();
    if n < 2 {
        return cycle.to_vec();
    }

    (0..n)
        .map(|i| {
            let pre = cycle[(i + n - 1) % n];
            let point = cycle[i];
            let post = cycle[(i + 1) % n];

            let a1 = (point - pre).normalize_or_zero();
            let a2 = (point - post).normalize_or_zero();
            let n1 = Vec2::new(-a1.y, a1.x);
            let n2 = Vec2::new(a2.y, -a2.x);

            let det = a1.y * a2.x - a1.x * a2.y;
            if det.abs() < 1.0e-4 {
                point + n1 * shift
            } else {
                let t = (a2.x * (post.y + n2.y * shift - pre.y - n1.y * shift) + a2.y * (pre.x + n1.x * shift - post.x - n2.x * shift)) / det;
                pre + n1 * shift + a1 * t
            }
        })
        .collect()
}

/// Walks a group's directed polygon edges into closed boundary cycles:
/// any edge whose reverse is absent is a boundary edge, then edges are
/// chained end-to-start. A chain that fails to close back on itself is
/// dropped (mirrors `PathFinder.__init__`'s `is_find`/drop-the-chain path).
fn extract_boundary_cycles(polygons: &[NavPolygon], group: u32, vertex_count: usize) -> Vec<Vec<u32>> {
    let mut all_edges: Vec<(u32, u32)> = Vec::new();
    for poly in polygons.iter().filter(|p| p.group == group) {
        let n = poly.vertices.len();
        for i in 0..n {
            all_edges.push((poly.vertices[i], poly.vertices[(i + 1) % n]));
        }
    }

    let edge_set: std::collections::HashSet<(u32, u32)> = all_edges.iter().copied().collect();
    let mut boundary: Vec<(u32, u32)> = all_edges.into_iter().filter(|&(a, b)| !edge_set.contains(&(b, a))).collect();

    let _ = vertex_count;

    let mut cycles = Vec::new();
    while let Some(first) = boundary.pop() {
        let mut chain = vec![first];
        loop {
            let last = *chain.last().unwrap();
            match boundary.iter().position(|&(a, _)| a == last.1) {
                Some(idx) => {
                    let next_edge = boundary.remove(idx);
                    if next_edge.1 == chain[0].0 {
                        // Cycle closed; don't store the closing edge itself.
                        break;
                    }
                    chain.push(next_edge);
                }
                None => {
                    // Failed to close; drop this chain per the boundary
                    // extraction contract.
                    chain.clear();
                    break;
                }
            }
        }
        if !chain.is_empty() {
            let mut cycle: Vec<u32> = chain.iter().map(|&(a, _)| a).collect();
            cycle.dedup();
            cycles.push(cycle);
        }
    }
    cycles
}

/// Owns a baked navmesh's polygon graph, one RVO simulator per connected
/// group, and every agent's path-follow state.
pub struct PathFinder {
    vertices: Vec<Vec3>,
    polygons: Vec<NavPolygon>,
    config: PathFinderConfig,
    groups: Vec<GroupSimulator>,
    agents: Vec<AgentState>,
    pending_deletes: Vec<u32>,
    next_handle: u32,
    path_refresh_elapsed: f32,
}

impl PathFinder {
    /// Bakes boundary cycles into inset obstacle polylines and spins up
    /// one simulator per navmesh group.
    pub fn new(vertices: Vec<Vec3>, polygons: Vec<NavPolygon>, config: PathFinderConfig) -> Self {
        let group_count = polygons.iter().map(|p| p.group).max().map_or(0, |g| g + 1) as usize;
        let mut groups: Vec<GroupSimulator> =
            (0..group_count).map(|_| GroupSimulator { agents: Vec::new(), handles: Vec::new(), obstacles: Vec::new(), obstacle_bsp: ObstacleBsp::build(&mut Vec::new()) }).collect();

        for (group_index, group) in groups.iter_mut().enumerate() {
            let cycles = extract_boundary_cycles(&polygons, group_index as u32, vertices.len());
            let mut obstacles = Vec::new();
            for cycle in &cycles {
                let points: Vec<Vec2> = cycle.iter().map(|&v| Vec2::new(vertices[v as usize].x, vertices[v as usize].z)).collect();
                let shifted = inset_boundary(&points, config.agent_defaults.radius);
                append_obstacle_loop(&mut obstacles, &shifted);
            }
            group.obstacle_bsp = ObstacleBsp::build(&mut obstacles);
            group.obstacles = obstacles;
        }

        Self { vertices, polygons, config, groups, agents: Vec::new(), pending_deletes: Vec::new(), next_handle: 0, path_refresh_elapsed: 0.0 }
    }

    fn sample_polygon(&self, position: Vec3) -> Option<usize> {
        // Linear scan over polygons projected to xz, closest in y to the
        // query point; a full implementation samples through the polygon
        // BVH (component B/D), reused here as `crate::bvh::Bvh<NavPolygon>`
        // at the `NavMesh` layer. PathFinder itself only needs "does some
        // polygon claim this point", so it defers to the caller's BVH via
        // `add_agent_on`.
        self.polygons.iter().position(|p| polygon_contains_xz(p, position))
    }

    /// Registers a new agent at `position`, returning `INVALID_AGENT` if
    /// no polygon hosts it (mirrors `PathFinder.add_agent`'s `-1` sentinel).
    pub fn add_agent(&mut self, position: Vec3, radius: f32, speed: f32) -> u32 {
        let Some(polygon_index) = self.sample_polygon(position) else {
            return INVALID_AGENT;
        };
        let group = self.polygons[polygon_index].group;

        let mut defaults = self.config.agent_defaults;
        defaults.radius = radius;
        defaults.max_speed = speed;

        let handle = self.next_handle;
        self.next_handle += 1;

        let agent_position = Vec2::new(position.x, position.z);
        let rvo_agent = RvoAgent::new(handle as usize, agent_position, Vec2::ZERO, &defaults);

        let sim = &mut self.groups[group as usize];
        sim.agents.push(rvo_agent);
        sim.handles.push(handle);

        self.agents.push(AgentState {
            handle,
            group,
            path: Vec::new(),
            targets: Vec::new(),
            target_index: 0,
            target_direction: Vec2::ZERO,
            speed,
            active: false,
        });

        handle
    }

    /// Queues `handle` for removal at the start of the next `update`.
    pub fn delete_agent(&mut self, handle: u32) {
        self.pending_deletes.push(handle);
    }

    pub fn agent_position(&self, handle: u32) -> Option<Vec2> {
        let state = self.agents.iter().find(|a| a.handle == handle)?;
        let sim = &self.groups[state.group as usize];
        let index = sim.index_of(handle)?;
        Some(sim.agents[index].position)
    }

    pub fn set_agent_destination(&mut self, handle: u32, destination: Vec3) {
        let Some(current) = self.agent_position(handle) else { return };
        let start = Vec3::new(current.x, 0.0, current.y);
        let path = self.search_path(start, destination);
        self.set_agent_path(handle, path);
    }

    fn set_agent_path(&mut self, handle: u32, path: Vec<Vec3>) {
        let Some(state) = self.agents.iter_mut().find(|a| a.handle == handle) else { return };
        if path.is_empty() {
            return;
        }
        let path = if path.len() == 1 { vec![path[0], path[0]] } else { path };

        state.targets = path.iter().map(|p| Vec2::new(p.x, p.z)).collect();
        state.target_index = 1;
        state.path = path;
        state.active = true;

        let current = state.targets[0];
        let target = state.targets[1];
        state.target_direction = direction_to(current, target);
    }

    /// Applies pending deletions, then runs one path-follow tick followed
    /// by `do_step` on every group's simulator, per `spec.md` §5's
    /// ordering guarantee.
    pub fn update(&mut self, delta_time: f32) {
        self.path_refresh_elapsed += delta_time;
        let should_refresh_path = self.path_refresh_elapsed >= self.config.update_path_find;
        if should_refresh_path {
            self.path_refresh_elapsed = 0.0;
        }

        self.apply_pending_deletes();

        for agent_index in 0..self.agents.len() {
            self.step_agent(agent_index, delta_time, should_refresh_path);
        }

        for group in &mut self.groups {
            group.do_step(delta_time, self.config.move_agents);
        }
    }

    fn apply_pending_deletes(&mut self) {
        if self.pending_deletes.is_empty() {
            return;
        }
        for handle in self.pending_deletes.drain(..) {
            let Some(pos) = self.agents.iter().position(|a| a.handle == handle) else { continue };
            let state = self.agents.remove(pos);
            let sim = &mut self.groups[state.group as usize];
            if let Some(index) = sim.index_of(handle) {
                sim.agents.remove(index);
                sim.handles.remove(index);
            }
        }
    }

    fn step_agent(&mut self, agent_index: usize, delta_time: f32, should_refresh_path: bool) {
        let handle = self.agents[agent_index].handle;
        let group = self.agents[agent_index].group;
        let Some(sim_index) = self.groups[group as usize].index_of(handle) else { return };

        if !self.agents[agent_index].active {
            self.groups[group as usize].agents[sim_index].pref_velocity = Vec2::ZERO;
            return;
        }

        let current_position = self.groups[group as usize].agents[sim_index].position;
        let target_index = self.agents[agent_index].target_index;
        let target_count = self.agents[agent_index].targets.len();
        let mut target = self.agents[agent_index].targets[target_index];
        let speed = self.agents[agent_index].speed;

        let to_target = target - current_position;
        let distance_to_target = to_target.length();

        let mut should_deactivate = false;
        if target_index == target_count - 1 && distance_to_target < delta_time * speed {
            let pref = if distance_to_target > 1.0e-5 { to_target.normalize() * (distance_to_target / delta_time) } else { Vec2::ZERO };
            self.groups[group as usize].agents[sim_index].pref_velocity = pref;
            should_deactivate = true;
        } else {
            let local_dir = direction_to(current_position, target);
            let start_dir = self.agents[agent_index].target_direction;
            if local_dir.dot(start_dir) < 0.0 && target_index < target_count - 1 {
                let next_target = self.agents[agent_index].targets[target_index + 1];
                let visible = self.groups[group as usize].obstacle_bsp.query_visibility(&self.groups[group as usize].obstacles, current_position, next_target, 0.0);
                if visible {
                    self.agents[agent_index].target_index += 1;
                    self.agents[agent_index].target_direction = direction_to(target, next_target);
                    target = next_target;
                }
            }
        }

        if should_deactivate {
            if !self.config.continuous_moving {
                self.agents[agent_index].active = false;
                self.agents[agent_index].path.clear();
                return;
            }
        } else if should_refresh_path && !self.agents[agent_index].targets.is_empty() {
            let target_position = *self.agents[agent_index].targets.last().unwrap();
            let heights: Vec<f32> = self.agents[agent_index].path.iter().map(|p| p.y).collect();
            let start_height = heights.get(self.agents[agent_index].target_index).copied().unwrap_or(0.0);
            let end_height = heights.last().copied().unwrap_or(0.0);
            let start = Vec3::new(current_position.x, start_height, current_position.y);
            let end = Vec3::new(target_position.x, end_height, target_position.y);
            let new_path = self.search_path(start, end);
            self.set_agent_path(handle, new_path);
        }

        if !should_deactivate {
            let to_vector = target - current_position;
            let pref = if to_vector.length_squared() > 1.0e-10 { to_vector.normalize() * speed } else { Vec2::ZERO };
            self.groups[group as usize].agents[sim_index].pref_velocity = pref;
        }
    }

    /// Finds the shortest polygon-graph route between `start` and
    /// `finish` and pulls a taut 3D polyline through it with
    /// [`crate::funnel::funnel`].
    pub fn search_path(&self, start: Vec3, finish: Vec3) -> Vec<Vec3> {
        let Some(start_polygon) = self.sample_polygon(start) else { return Vec::new() };
        let Some(finish_polygon) = self.sample_polygon(finish) else { return Vec::new() };

        let route = find_path(&self.polygons, start_polygon, finish_polygon);
        if route.is_empty() {
            return Vec::new();
        }
        if route.len() == 1 {
            return vec![start, finish];
        }

        let portals: Vec<(Vec3, Vec3)> = route
            .windows(2)
            .map(|pair| {
                let link = self.polygons[pair[0]].neighbors.iter().find(|l| l.polygon == pair[1]).expect("adjacent polygons share a portal");
                link.portal
            })
            .collect();

        funnel(start, &portals, finish)
    }

    pub fn vertices(&self) -> &[Vec3] {
        &self.vertices
    }

    pub fn polygons(&self) -> &[NavPolygon] {
        &self.polygons
    }
}

fn direction_to(from: Vec2, to: Vec2) -> Vec2 {
    (to - from).normalize_or_zero()
}

/// Links a closed polyline of `points` into the obstacle arena's
/// prev/next cycle, mirroring `RVOSimulator.add_obstacle`.
fn append_obstacle_loop(obstacles: &mut Vec<Obstacle>, points: &[Vec2]) {
    if points.len() < 2 {
        return;
    }
    let base = obstacles.len();
    let n = points.len();
    for (i, &point) in points.iter().enumerate() {
        let next_point = points[(i + 1) % n];
        let unit_dir = (next_point - point).normalize_or_zero();
        let convex = if n == 2 {
            true
        } else {
            let prev_point = points[(i + n - 1) % n];
            left_of(prev_point, point, next_point) >= 0.0
        };
        obstacles.push(Obstacle { point, unit_dir, convex, next: base + (i + 1) % n, prev: base + (i + n - 1) % n });
    }
}

fn left_of(a: Vec2, b: Vec2, c: Vec2) -> f32 {
    let v1 = a - c;
    let v2 = b - a;
    v1.x * v2.y - v1.y * v2.x
}

fn polygon_contains_xz(polygon: &NavPolygon, p: Vec3) -> bool {
    polygon.contains_point(p)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navmesh_graph::build_navmesh_graph;

    fn two_triangle_mesh() -> (Vec<Vec3>, Vec<NavPolygon>) {
        let vertices = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 1.0),
            Vec3::new(0.0, 0.0, 1.0),
        ];
        let polys = vec![vec![0, 1, 2], vec![0, 2, 3]];
        let graph = build_navmesh_graph(&vertices, &polys);
        (vertices, graph)
    }

    #[test]
    fn construction_builds_one_simulator_per_group() {
        let (vertices, polygons) = two_triangle_mesh();
        let pf = PathFinder::new(vertices, polygons, PathFinderConfig::default());
        assert_eq!(pf.groups.len(), 1);
    }

    #[test]
    fn delete_agent_is_deferred_until_update() {
        let (vertices, polygons) = two_triangle_mesh();
        let mut pf = PathFinder::new(vertices, polygons, PathFinderConfig::default());
        let handle = pf.add_agent(Vec3::new(0.4, 0.0, 0.4), 0.1, 1.0);
        assert_ne!(handle, INVALID_AGENT);
        pf.delete_agent(handle);
        assert_eq!(pf.groups[0].agents.len(), 1);
        pf.update(0.1);
        assert_eq!(pf.groups[0].agents.len(), 0);
    }
}
