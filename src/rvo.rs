//! Component L: ORCA (Optimal Reciprocal Collision Avoidance) agents and
//! the incremental 2D linear program that turns a preferred velocity and a
//! set of half-plane constraints into a collision-free one.
//!
//! The teacher has no local-avoidance layer at all; this whole module is
//! grounded on `original_source`'s `pathfinder/pyrvo/agent.py`, re-expressed
//! with `glam::Vec2` in place of raw float tuples and an arena of
//! [`Obstacle`] values addressed by index instead of a linked object graph
//! (Rust has no free lunch for the Python version's `prev`/`next` object
//! pointers without `Rc<RefCell<_>>`, and an arena matches how this crate
//! already addresses spans and polygons elsewhere).

use glam::Vec2;

use crate::config::AgentDefaults;

const RVO_EPSILON: f32 = 0.00001;

/// One point of a (possibly non-convex) obstacle polygon, doubly linked by
/// index within the simulator's obstacle arena. `convex` records whether
/// the *vertex* (not the polygon) is convex, which `compute_new_velocity`
/// needs to decide whether a leg can be ignored or must extend the
/// neighboring edge's cutoff line.
#[derive(Debug, Clone, Copy)]
pub struct Obstacle {
    pub point: Vec2,
    pub unit_dir: Vec2,
    pub convex: bool,
    pub next: usize,
    pub prev: usize,
}

/// One `(point, direction)` half-plane: the feasible region is everything
/// to the left of the line through `point` in direction `dir`.
#[derive(Debug, Clone, Copy)]
pub struct OrcaLine {
    pub point: Vec2,
    pub dir: Vec2,
}

fn det(a: Vec2, b: Vec2) -> f32 {
    a.x * b.y - a.y * b.x
}

fn dist_sq_point_segment(a: Vec2, b: Vec2, c: Vec2) -> f32 {
    let ab = b - a;
    let r = (c - a).dot(ab) / ab.length_squared();
    if r < 0.0 {
        (c - a).length_squared()
    } else if r > 1.0 {
        (c - b).length_squared()
    } else {
        (c - a - r * ab).length_squared()
    }
}

/// Solves the 1D subproblem: optimize along `lines[line_no]` subject to
/// every earlier line in `lines[..line_no]` and the max-speed disc of
/// radius `radius`. Returns `None` if the disc and the earlier
/// half-planes leave no feasible segment of the line.
fn linear_program1(lines: &[OrcaLine], line_no: usize, radius: f32, opt_velocity: Vec2, direction_opt: bool) -> Option<Vec2> {
    let line = lines[line_no];
    let dot_product = line.point.dot(line.dir);
    let discriminant = dot_product * dot_product + radius * radius - line.point.length_squared();

    if discriminant < 0.0 {
        return None;
    }

    let sqrt_discriminant = discriminant.sqrt();
    let mut t_left = -dot_product - sqrt_discriminant;
    let mut t_right = -dot_product + sqrt_discriminant;

    for other in &lines[..line_no] {
        let denominator = det(line.dir, other.dir);
        let numerator = det(other.dir, line.point - other.point);

        if denominator.abs() <= RVO_EPSILON {
            if numerator < 0.0 {
                return None;
            }
            continue;
        }

        let t = numerator / denominator;
        if denominator >= 0.0 {
            t_right = t_right.min(t);
        } else {
            t_left = t_left.max(t);
        }

        if t_left > t_right {
            return None;
        }
    }

    let t = if direction_opt {
        if opt_velocity.dot(line.dir) > 0.0 {
            t_right
        } else {
            t_left
        }
    } else {
        let t = line.dir.dot(opt_velocity - line.point);
        t.clamp(t_left, t_right)
    };

    Some(line.point + line.dir * t)
}

/// Solves the 2D subproblem over every line in `lines`, falling back line
/// by line to [`linear_program1`] whenever the running optimum violates a
/// constraint. Returns the number of lines satisfied before failure
/// (`lines.len()` on full success) and the resulting velocity.
fn linear_program2(lines: &[OrcaLine], radius: f32, opt_velocity: Vec2, direction_opt: bool) -> (usize, Vec2) {
    let mut result = if direction_opt {
        opt_velocity * radius
    } else if opt_velocity.length_squared() > radius * radius {
        opt_velocity.normalize() * radius
    } else {
        opt_velocity
    };

    for i in 0..lines.len() {
        if det(lines[i].dir, lines[i].point - result) > 0.0 {
            match linear_program1(lines, i, radius, opt_velocity, direction_opt) {
                Some(next) => result = next,
                None => return (i, result),
            }
        }
    }

    (lines.len(), result)
}

/// Distance-minimizing fallback for when [`linear_program2`] fails partway
/// through `lines`: projects the remaining lines against every earlier
/// line (including the obstacle lines `lines[..num_obst_lines]`, which are
/// never relaxed) and re-solves, so an over-constrained agent still picks
/// the least-violating velocity rather than freezing.
fn linear_program3(lines: &[OrcaLine], num_obst_lines: usize, begin_line: usize, radius: f32, mut result: Vec2) -> Vec2 {
    let mut distance = 0.0f32;

    for i in begin_line..lines.len() {
        let line_i = lines[i];
        if det(line_i.dir, line_i.point - result) > distance {
            let mut proj_lines: Vec<OrcaLine> = lines[..num_obst_lines].to_vec();

            for &line_j in &lines[num_obst_lines..i] {
                let determinant = det(line_i.dir, line_j.dir);

                let projected = if determinant.abs() <= RVO_EPSILON {
                    if line_i.dir.dot(line_j.dir) > 0.0 {
                        continue;
                    }
                    (line_i.point + line_j.point) * 0.5
                } else {
                    line_i.point + line_i.dir * (det(line_j.dir, line_i.point - line_j.point) / determinant)
                };

                let dir = (line_j.dir - line_i.dir).normalize();
                proj_lines.push(OrcaLine { point: projected, dir });
            }

            let temp_result = result;
            let perp = Vec2::new(-line_i.dir.y, line_i.dir.x);
            let (fail_at, next) = linear_program2(&proj_lines, radius, perp, true);
            result = next;
            if fail_at < proj_lines.len() {
                result = temp_result;
            }

            distance = det(line_i.dir, line_i.point - result);
        }
    }

    result
}

/// One agent's tunables, neighbor cache, and kinematic state. Mirrors
/// `original_source`'s `Agent`, minus the simulator back-reference (the
/// simulator drives `compute_neighbors`/`compute_new_velocity` instead of
/// the agent reaching back into it).
#[derive(Debug, Clone)]
pub struct RvoAgent {
    pub id: usize,
    pub position: Vec2,
    pub velocity: Vec2,
    pub pref_velocity: Vec2,
    pub radius: f32,
    pub max_speed: f32,
    pub neighbor_dist: f32,
    pub max_neighbors: usize,
    pub time_horizon: f32,
    pub time_horizon_obstacle: f32,
    /// `(dist_sq, agent_index)`, ascending, capped at `max_neighbors`.
    pub agent_neighbors: Vec<(f32, usize)>,
    /// `(dist_sq, obstacle_index)`, ascending, uncapped.
    pub obstacle_neighbors: Vec<(f32, usize)>,
}

impl RvoAgent {
    pub fn new(id: usize, position: Vec2, velocity: Vec2, defaults: &AgentDefaults) -> Self {
        Self {
            id,
            position,
            velocity,
            pref_velocity: Vec2::ZERO,
            radius: defaults.radius,
            max_speed: defaults.max_speed,
            neighbor_dist: defaults.neighbor_dist,
            max_neighbors: defaults.max_neighbors,
            time_horizon: defaults.time_horizon,
            time_horizon_obstacle: defaults.time_horizon_obstacle,
            agent_neighbors: Vec::new(),
            obstacle_neighbors: Vec::new(),
        }
    }

    /// Mirrors `Agent.insert_agent_neighbor`'s capped insertion sort,
    /// shrinking `range_sq` to the current worst neighbor once the cap is
    /// reached so later candidates only displace it if closer.
    pub fn insert_agent_neighbor(&mut self, other_index: usize, other_position: Vec2, mut range_sq: f32) -> f32 {
        if other_index == self.id {
            return range_sq;
        }
        let dist_sq = (self.position - other_position).length_squared();
        if dist_sq >= range_sq {
            return range_sq;
        }

        if self.agent_neighbors.len() < self.max_neighbors {
            self.agent_neighbors.push((dist_sq, other_index));
        }
        let mut i = self.agent_neighbors.len() - 1;
        while i != 0 && dist_sq < self.agent_neighbors[i - 1].0 {
            self.agent_neighbors[i] = self.agent_neighbors[i - 1];
            i -= 1;
        }
        self.agent_neighbors[i] = (dist_sq, other_index);

        if self.agent_neighbors.len() == self.max_neighbors {
            range_sq = self.agent_neighbors.last().unwrap().0;
        }
        range_sq
    }

    /// Mirrors `Agent.insert_obstacle_neighbor`: uncapped sorted insertion
    /// by distance to the obstacle edge `(obstacle, next(obstacle))`.
    pub fn insert_obstacle_neighbor(&mut self, obstacle_index: usize, obstacle_point: Vec2, next_point: Vec2, range_sq: f32) {
        let dist_sq = dist_sq_point_segment(obstacle_point, next_point, self.position);
        if dist_sq >= range_sq {
            return;
        }
        self.obstacle_neighbors.push((dist_sq, obstacle_index));
        let mut i = self.obstacle_neighbors.len() - 1;
        while i != 0 && dist_sq < self.obstacle_neighbors[i - 1].0 {
            self.obstacle_neighbors[i] = self.obstacle_neighbors[i - 1];
            i -= 1;
        }
        self.obstacle_neighbors[i] = (dist_sq, obstacle_index);
    }

    /// Builds this step's ORCA half-planes (obstacles first, then agents)
    /// and solves for the closest feasible velocity to `pref_velocity`.
    /// Ported verbatim (structure and constants) from
    /// `Agent.compute_new_velocity`. Returns the solved velocity rather
    /// than storing it, so a simulator can compute every agent's next
    /// velocity from one consistent snapshot before any agent moves.
    pub fn compute_new_velocity(&self, obstacles: &[Obstacle], agents: &[RvoAgent], delta_time: f32) -> Vec2 {
        let mut orca_lines: Vec<OrcaLine> = Vec::new();
        let inv_time_horizon_obst = 1.0 / self.time_horizon_obstacle;

        for &(_, obstacle1_index) in &self.obstacle_neighbors.clone() {
            let mut obstacle1_index = obstacle1_index;
            let mut obstacle2_index = obstacles[obstacle1_index].next;

            let mut obstacle1 = obstacles[obstacle1_index];
            let mut obstacle2 = obstacles[obstacle2_index];

            let relative_position1 = obstacle1.point - self.position;
            let relative_position2 = obstacle2.point - self.position;

            let already_covered = orca_lines.iter().any(|line| {
                det(relative_position1 * inv_time_horizon_obst - line.point, line.dir) - inv_time_horizon_obst * self.radius >= -RVO_EPSILON
                    && det(relative_position2 * inv_time_horizon_obst - line.point, line.dir) - inv_time_horizon_obst * self.radius >= -RVO_EPSILON
            });
            if already_covered {
                continue;
            }

            let dist_sq1 = relative_position1.length_squared();
            let dist_sq2 = relative_position2.length_squared();
            let radius_sq = self.radius * self.radius;

            let obstacle_vector = obstacle2.point - obstacle1.point;
            let s = (-relative_position1).dot(obstacle_vector) / obstacle_vector.length_squared();
            let dist_sq_line = (-relative_position1 - obstacle_vector * s).length_squared();

            if s < 0.0 && dist_sq1 <= radius_sq {
                if obstacle1.convex {
                    let n = Vec2::new(-relative_position1.y, relative_position1.x).normalize();
                    orca_lines.push(OrcaLine { point: Vec2::ZERO, dir: n });
                }
                continue;
            } else if s > 1.0 && dist_sq2 <= radius_sq {
                if obstacle2.convex && det(relative_position2, obstacle2.unit_dir) >= 0.0 {
                    let n = Vec2::new(-relative_position2.y, relative_position2.x).normalize();
                    orca_lines.push(OrcaLine { point: Vec2::ZERO, dir: n });
                }
                continue;
            } else if (0.0..=1.0).contains(&s) && dist_sq_line <= radius_sq {
                orca_lines.push(OrcaLine { point: Vec2::ZERO, dir: -obstacle1.unit_dir });
                continue;
            }

            let (left_leg_dir, right_leg_dir): (Vec2, Vec2);

            if s < 0.0 && dist_sq_line <= radius_sq {
                if !obstacle1.convex {
                    continue;
                }
                obstacle2_index = obstacle1_index;
                obstacle2 = obstacle1;

                let leg1 = (dist_sq1 - radius_sq).sqrt();
                left_leg_dir = Vec2::new(
                    relative_position1.x * leg1 - relative_position1.y * self.radius,
                    relative_position1.x * self.radius + relative_position1.y * leg1,
                ) / dist_sq1;
                right_leg_dir = Vec2::new(
                    relative_position1.x * leg1 + relative_position1.y * self.radius,
                    -relative_position1.x * self.radius + relative_position1.y * leg1,
                ) / dist_sq1;
            } else if s > 1.0 && dist_sq_line <= radius_sq {
                if !obstacle2.convex {
                    continue;
                }
                obstacle1_index = obstacle2_index;
                obstacle1 = obstacle2;

                let leg2 = (dist_sq2 - radius_sq).sqrt();
                left_leg_dir = Vec2::new(
                    relative_position2.x * leg2 - relative_position2.y * self.radius,
                    relative_position2.x * self.radius + relative_position2.y * leg2,
                ) / dist_sq2;
                right_leg_dir = Vec2::new(
                    relative_position2.x * leg2 + relative_position2.y * self.radius,
                    -relative_position2.x * self.radius + relative_position2.y * leg2,
                ) / dist_sq2;
            } else {
                let left = if obstacle1.convex {
                    let leg1 = (dist_sq1 - radius_sq).sqrt();
                    Vec2::new(
                        relative_position1.x * leg1 - relative_position1.y * self.radius,
                        relative_position1.x * self.radius + relative_position1.y * leg1,
                    ) / dist_sq1
                } else {
                    -obstacle1.unit_dir
                };
                let right = if obstacle2.convex {
                    let leg2 = (dist_sq2 - radius_sq).sqrt();
                    Vec2::new(
                        relative_position2.x * leg2 + relative_position2.y * self.radius,
                        -relative_position2.x * self.radius + relative_position2.y * leg2,
                    ) / dist_sq2
                } else {
                    obstacle1.unit_dir
                };
                left_leg_dir = left;
                right_leg_dir = right;
            }

            let mut left_leg_dir = left_leg_dir;
            let mut right_leg_dir = right_leg_dir;

            let left_neighbor = obstacles[obstacle1_index].prev;
            let mut is_left_leg_foreign = false;
            let mut is_right_leg_foreign = false;

            if obstacle1.convex && det(left_leg_dir, -obstacles[left_neighbor].unit_dir) >= 0.0 {
                left_leg_dir = -obstacles[left_neighbor].unit_dir;
                is_left_leg_foreign = true;
            }
            if obstacle2.convex && det(right_leg_dir, obstacle2.unit_dir) <= 0.0 {
                right_leg_dir = obstacle2.unit_dir;
                is_right_leg_foreign = true;
            }

            let left_cutoff = (obstacle1.point - self.position) * inv_time_horizon_obst;
            let right_cutoff = (obstacle2.point - self.position) * inv_time_horizon_obst;
            let cutoff_vec = right_cutoff - left_cutoff;

            let same_obstacle = obstacle1_index == obstacle2_index;
            let t = if same_obstacle { 0.5 } else { (self.velocity - left_cutoff).dot(cutoff_vec) / cutoff_vec.length_squared() };
            let t_left = (self.velocity - left_cutoff).dot(left_leg_dir);
            let t_right = (self.velocity - right_cutoff).dot(right_leg_dir);

            if (t < 0.0 && t_left < 0.0) || (same_obstacle && t_left < 0.0 && t_right < 0.0) {
                let unit_w = (self.velocity - left_cutoff).normalize();
                let dir = Vec2::new(unit_w.y, -unit_w.x);
                let point = left_cutoff + unit_w * (self.radius * inv_time_horizon_obst);
                orca_lines.push(OrcaLine { point, dir });
                continue;
            } else if t > 1.0 && t_right < 0.0 {
                let unit_w = (self.velocity - right_cutoff).normalize();
                let dir = Vec2::new(unit_w.y, -unit_w.x);
                let point = right_cutoff + unit_w * (self.radius * inv_time_horizon_obst);
                orca_lines.push(OrcaLine { point, dir });
                continue;
            }

            let dist_sq_cutoff = if t < 0.0 || t > 1.0 || same_obstacle {
                f32::INFINITY
            } else {
                (self.velocity - (left_cutoff + cutoff_vec * t)).length_squared()
            };
            let dist_sq_left = if t_left < 0.0 { f32::INFINITY } else { (self.velocity - (left_cutoff + left_leg_dir * t_left)).length_squared() };
            let dist_sq_right = if t_right < 0.0 { f32::INFINITY } else { (self.velocity - (right_cutoff + right_leg_dir * t_right)).length_squared() };

            if dist_sq_cutoff <= dist_sq_left && dist_sq_cutoff <= dist_sq_right {
                let dir = -obstacle1.unit_dir;
                let point = left_cutoff + Vec2::new(-dir.y, dir.x) * (self.radius * inv_time_horizon_obst);
                orca_lines.push(OrcaLine { point, dir });
            } else if dist_sq_left <= dist_sq_right {
                if is_left_leg_foreign {
                    continue;
                }
                let point = left_cutoff + Vec2::new(-left_leg_dir.y, left_leg_dir.x) * (self.radius * inv_time_horizon_obst);
                orca_lines.push(OrcaLine { point, dir: left_leg_dir });
            } else {
                if is_right_leg_foreign {
                    continue;
                }
                let point = right_cutoff + Vec2::new(right_leg_dir.y, -right_leg_dir.x) * (self.radius * inv_time_horizon_obst);
                orca_lines.push(OrcaLine { point, dir: -right_leg_dir });
            }
        }

        let num_obst_lines = orca_lines.len();
        let inv_time_horizon = 1.0 / self.time_horizon;

        for &(_, other_index) in &self.agent_neighbors.clone() {
            let other = &agents[other_index];
            let relative_position = other.position - self.position;
            let relative_velocity = self.velocity - other.velocity;
            let dist_sq = relative_position.length_squared();
            let combined_radius = self.radius + other.radius;
            let combined_radius_sq = combined_radius * combined_radius;

            let (dir, u);

            if dist_sq > combined_radius_sq {
                let w = relative_velocity - relative_position * inv_time_horizon;
                let w_length_sq = w.length_squared();
                let dot_product1 = w.dot(relative_position);

                if dot_product1 < 0.0 && dot_product1 * dot_product1 > combined_radius_sq * w_length_sq {
                    let w_length = w_length_sq.sqrt();
                    let unit_w = w / w_length;
                    dir = Vec2::new(unit_w.y, -unit_w.x);
                    u = unit_w * (combined_radius * inv_time_horizon - w_length);
                } else {
                    let leg = (dist_sq - combined_radius_sq).sqrt();
                    let d = if det(relative_position, w) > 0.0 {
                        Vec2::new(
                            relative_position.x * leg - relative_position.y * combined_radius,
                            relative_position.x * combined_radius + relative_position.y * leg,
                        ) / dist_sq
                    } else {
                        -Vec2::new(
                            relative_position.x * leg + relative_position.y * combined_radius,
                            -relative_position.x * combined_radius + relative_position.y * leg,
                        ) / dist_sq
                    };
                    dir = d;
                    u = dir * relative_velocity.dot(dir) - relative_velocity;
                }
            } else {
                let inv_time_step = 1.0 / delta_time;
                let w = relative_velocity - relative_position * inv_time_step;
                let w_length = w.length();
                let unit_w = if w_length > 0.0001 { w / w_length } else { Vec2::ZERO };
                dir = Vec2::new(unit_w.y, -unit_w.x);
                u = unit_w * (combined_radius * inv_time_step - w_length);
            }

            orca_lines.push(OrcaLine { point: self.velocity + u * 0.5, dir });
        }

        let (fail_at, result) = linear_program2(&orca_lines, self.max_speed, self.pref_velocity, false);
        if fail_at < orca_lines.len() {
            linear_program3(&orca_lines, num_obst_lines, fail_at, self.max_speed, result)
        } else {
            result
        }
    }

    /// Advances `velocity` to `new_velocity` and, if `move_agents`,
    /// integrates `position` by `delta_time`.
    pub fn update(&mut self, new_velocity: Vec2, delta_time: f32, move_agents: bool) {
        self.velocity = new_velocity;
        if move_agents {
            self.position += self.velocity * delta_time;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent_at(id: usize, position: Vec2) -> RvoAgent {
        let defaults = AgentDefaults { radius: 0.5, max_speed: 2.0, neighbor_dist: 10.0, max_neighbors: 5, time_horizon: 1.5, time_horizon_obstacle: 2.0 };
        RvoAgent::new(id, position, Vec2::ZERO, &defaults)
    }

    #[test]
    fn unconstrained_velocity_matches_preference() {
        let mut agent = agent_at(0, Vec2::ZERO);
        agent.pref_velocity = Vec2::new(1.0, 0.0);
        let velocity = agent.compute_new_velocity(&[], &[], 0.1);
        assert!((velocity - Vec2::new(1.0, 0.0)).length() < 1.0e-4);
    }

    #[test]
    fn head_on_agents_deflect_away_from_straight_line() {
        let mut a = agent_at(0, Vec2::new(-2.0, 0.0));
        a.pref_velocity = Vec2::new(1.0, 0.0);
        a.agent_neighbors.push((4.0, 1));

        let mut b = agent_at(1, Vec2::new(2.0, 0.0));
        b.pref_velocity = Vec2::new(-1.0, 0.0);
        b.agent_neighbors.push((4.0, 0));

        let agents = vec![a.clone(), b.clone()];
        let velocity = agents[0].compute_new_velocity(&[], &agents, 0.1);
        assert!(velocity.y.abs() > 1.0e-3, "expected lateral deflection, got {velocity:?}");
    }

    #[test]
    fn linear_program2_respects_max_speed() {
        let lines = vec![OrcaLine { point: Vec2::new(10.0, 0.0), dir: Vec2::new(0.0, 1.0) }];
        let (fail_at, result) = linear_program2(&lines, 1.0, Vec2::new(5.0, 5.0), false);
        assert_eq!(fail_at, lines.len());
        assert!(result.length() <= 1.0 + 1.0e-4);
    }
}
