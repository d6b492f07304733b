//! Bake-time and agent-default parameters.
//!
//! [`BakerConfig`] carries every knob the baking pipeline (heightfield
//! through poly mesh) reads, with the same builder-setter style the
//! teacher crate's settings type uses. [`AgentDefaults`] carries the
//! per-agent RVO parameters a [`crate::pathfinder::PathFinder`] falls back
//! to when an agent doesn't override them.

/// Parameters controlling navmesh baking, in world units unless noted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BakerConfig {
    /// Horizontal voxel size.
    ///
    /// **Suggested value**: 1/2 of agent radius.
    pub cell_size: f32,
    /// Vertical voxel size.
    ///
    /// **Suggested value**: 1/2 of `cell_size`.
    pub cell_height: f32,

    /// Height of the navigating agent. Used to filter spans with
    /// insufficient clearance above them.
    pub agent_height: f32,
    /// Radius of the navigating agent. The final navmesh is eroded inward
    /// by this amount so its boundary keeps the agent's body clear of
    /// obstacles.
    pub agent_radius: f32,
    /// Maximum ledge height the agent can step up or down without it being
    /// treated as an obstacle.
    pub agent_max_climb: f32,
    /// Maximum walkable slope, in radians.
    pub agent_max_slope: f32,

    /// Minimum region size in voxel cells; smaller regions are discarded
    /// unless they touch the world border.
    pub region_min_size: u32,
    /// Maximum size (in cells) a region can grow to by absorbing a smaller
    /// neighbor during region merging.
    pub region_merge_size: u32,

    /// Maximum contour edge length before it is split.
    pub edge_max_len: f32,
    /// Maximum perpendicular deviation allowed when simplifying a raw
    /// contour, in cells.
    pub edge_max_error: f32,

    /// Maximum vertex count for a single navmesh polygon.
    pub verts_per_poly: u8,

    /// Distance between height samples when constructing the detail mesh.
    pub detail_sample_distance: f32,
    /// Maximum allowed deviation between detail-mesh height samples and the
    /// source geometry.
    pub detail_sample_max_error: f32,
}

impl Default for BakerConfig {
    fn default() -> Self {
        Self {
            cell_size: 0.3,
            cell_height: 0.2,
            agent_height: 2.0,
            agent_radius: 0.6,
            agent_max_climb: 0.9,
            agent_max_slope: 45.0_f32.to_radians(),
            region_min_size: 8,
            region_merge_size: 20,
            edge_max_len: 12.0,
            edge_max_error: 1.3,
            verts_per_poly: 6,
            detail_sample_distance: 6.0,
            detail_sample_max_error: 1.0,
        }
    }
}

impl BakerConfig {
    /// Minimum open height above a span for it to be walkable, in voxel
    /// units (rounded up).
    pub fn walkable_height_voxels(&self) -> u16 {
        (self.agent_height / self.cell_height).ceil() as u16
    }

    /// Maximum step height still considered traversable, in voxel units.
    pub fn walkable_climb_voxels(&self) -> u16 {
        (self.agent_max_climb / self.cell_height).ceil() as u16
    }

    /// Erosion radius applied to the compact heightfield, in voxel units.
    pub fn walkable_radius_voxels(&self) -> u16 {
        (self.agent_radius / self.cell_size).ceil() as u16
    }

    /// Maximum edge length in voxel units.
    pub fn max_edge_len_voxels(&self) -> u16 {
        (self.edge_max_len / self.cell_size).round() as u16
    }

    pub fn with_cell_size(mut self, cell_size: f32, cell_height: f32) -> Self {
        self.cell_size = cell_size;
        self.cell_height = cell_height;
        self
    }

    pub fn with_agent(mut self, radius: f32, height: f32, max_climb: f32, max_slope_radians: f32) -> Self {
        self.agent_radius = radius;
        self.agent_height = height;
        self.agent_max_climb = max_climb;
        self.agent_max_slope = max_slope_radians;
        self
    }

    pub fn with_region_area(mut self, min_region_area: u32, merge_region_area: u32) -> Self {
        self.region_min_size = min_region_area;
        self.region_merge_size = merge_region_area;
        self
    }

    pub fn with_max_edge_length(mut self, max_edge_length: f32) -> Self {
        self.edge_max_len = max_edge_length;
        self
    }

    pub fn with_max_simplification_error(mut self, max_error: f32) -> Self {
        self.edge_max_error = max_error;
        self
    }

    pub fn with_verts_per_poly(mut self, verts_per_poly: u8) -> Self {
        self.verts_per_poly = verts_per_poly.max(3);
        self
    }

    pub fn with_detail_sampling(mut self, distance: f32, max_error: f32) -> Self {
        self.detail_sample_distance = distance;
        self.detail_sample_max_error = max_error;
        self
    }
}

/// Default per-agent RVO parameters, used whenever an agent is added
/// without explicit overrides.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgentDefaults {
    /// Agent collision radius.
    pub radius: f32,
    /// Maximum agent speed.
    pub max_speed: f32,
    /// Lookahead window against other agents, in seconds.
    pub time_horizon: f32,
    /// Lookahead window against static obstacles, in seconds.
    pub time_horizon_obstacle: f32,
    /// Distance within which other agents are considered neighbors.
    pub neighbor_dist: f32,
    /// Maximum number of agent neighbors considered per step.
    pub max_neighbors: usize,
}

impl Default for AgentDefaults {
    fn default() -> Self {
        Self {
            radius: 0.6,
            max_speed: 2.0,
            time_horizon: 2.0,
            time_horizon_obstacle: 1.0,
            neighbor_dist: 5.0,
            max_neighbors: 10,
        }
    }
}

impl AgentDefaults {
    pub fn with_radius(mut self, radius: f32) -> Self {
        self.radius = radius;
        self
    }

    pub fn with_max_speed(mut self, max_speed: f32) -> Self {
        self.max_speed = max_speed;
        self
    }

    pub fn with_time_horizons(mut self, agents: f32, obstacles: f32) -> Self {
        self.time_horizon = agents;
        self.time_horizon_obstacle = obstacles;
        self
    }

    pub fn with_neighbors(mut self, neighbor_dist: f32, max_neighbors: usize) -> Self {
        self.neighbor_dist = neighbor_dist;
        self.max_neighbors = max_neighbors;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_documented_values() {
        let cfg = BakerConfig::default();
        assert_eq!(cfg.cell_size, 0.3);
        assert_eq!(cfg.cell_height, 0.2);
        assert_eq!(cfg.region_min_size, 8);
        assert_eq!(cfg.verts_per_poly, 6);
    }

    #[test]
    fn walkable_height_rounds_up() {
        let cfg = BakerConfig::default().with_cell_size(0.3, 0.3);
        assert_eq!(cfg.walkable_height_voxels(), (2.0f32 / 0.3).ceil() as u16);
    }

    #[test]
    fn verts_per_poly_floor_is_three() {
        let cfg = BakerConfig::default().with_verts_per_poly(1);
        assert_eq!(cfg.verts_per_poly, 3);
    }
}
