//! Navmesh baking, pathfinding, and multi-agent ORCA steering for 3D
//! worlds.
//!
//! The pipeline from raw triangle soup to a queryable, pathfindable
//! navmesh runs entirely on the caller's thread: voxelize
//! ([`heightfield`]), filter walkability ([`filter`]), compact and
//! connect spans ([`compact_heightfield`]), grow watershed regions
//! ([`regions`]), trace and simplify contours ([`contour`]), triangulate
//! into convex polygons ([`mesher`]), then build the polygon adjacency
//! graph ([`navmesh_graph`]) [`bake`] hands back as a [`NavMesh`].
//!
//! A [`NavMesh`] answers point/ray queries directly and can be handed to
//! [`pathfinder::PathFinder`] for path-following and RVO-based multi-agent
//! local avoidance ([`rvo`], [`kdtree`], [`obstacle_bsp`], [`funnel`]).
//!
//! ## Quick-start
//!
//! ```no_run
//! use navkit::{bake, config::BakerConfig, math::Triangle};
//! use glam::Vec3;
//!
//! let triangles = vec![Triangle::new(
//!     Vec3::new(-5.0, 0.0, -5.0),
//!     Vec3::new(5.0, 0.0, -5.0),
//!     Vec3::new(5.0, 0.0, 5.0),
//! )];
//! let navmesh = bake(&triangles, &BakerConfig::default())?;
//! let path = navmesh.search_path(Vec3::new(-4.0, 0.0, -4.0), Vec3::new(4.0, 0.0, 4.0));
//! # Ok::<(), navkit::error::NavError>(())
//! ```

pub mod bvh;
pub mod compact_heightfield;
pub mod config;
pub mod contour;
pub mod error;
pub mod filter;
pub mod funnel;
pub mod heightfield;
pub mod kdtree;
pub mod math;
pub mod mesher;
pub mod navmesh_graph;
pub mod obstacle_bsp;
pub mod pathfinder;
pub mod persistence;
pub mod regions;
pub mod rvo;

use glam::{IVec3, Vec3};
use tracing::{info, instrument};

use bvh::Bvh;
use config::BakerConfig;
use error::{NavError, Result};
use math::{Aabb3, Triangle};
use navmesh_graph::{build_navmesh_graph, find_path, NavPolygon};
use pathfinder::{PathFinder, PathFinderConfig};

/// A baked navmesh: the polygon adjacency graph plus a BVH over its
/// polygons for point/ray queries. Cheap to query, expensive to build;
/// [`bake`] produces one from raw geometry.
pub struct NavMesh {
    vertices: Vec<Vec3>,
    bvh: Bvh<NavPolygon>,
}

impl NavMesh {
    /// The closest point on the navmesh surface to `p`. `slow` widens the
    /// BVH search to every leaf, for query points that may sit just
    /// outside every inflated AABB (directly above a ledge, say).
    pub fn sample(&self, p: Vec3, slow: bool) -> Option<Vec3> {
        self.bvh.sample(p, slow)
    }

    /// Casts a ray against the navmesh surface, returning the nearest hit.
    pub fn raycast(&self, origin: Vec3, dir: Vec3) -> Option<Vec3> {
        self.bvh.raycast(origin, dir)
    }

    /// Finds the polygon-graph shortest route between `start` and
    /// `finish` and pulls it taut with [`funnel::funnel`]. Returns an
    /// empty `Vec` if either point falls outside every polygon or no
    /// route connects their groups, matching the "sentinel, not error"
    /// policy for query-time failures.
    pub fn search_path(&self, start: Vec3, finish: Vec3) -> Vec<Vec3> {
        let polygons = self.bvh.items();
        let Some(start_polygon) = polygons.iter().position(|p| p.contains_point(start)) else {
            return Vec::new();
        };
        let Some(finish_polygon) = polygons.iter().position(|p| p.contains_point(finish)) else {
            return Vec::new();
        };

        let route = find_path(polygons, start_polygon, finish_polygon);
        if route.is_empty() {
            return Vec::new();
        }
        if route.len() == 1 {
            return vec![start, finish];
        }

        let portals: Vec<(Vec3, Vec3)> = route
            .windows(2)
            .map(|pair| polygons[pair[0]].neighbors.iter().find(|l| l.polygon == pair[1]).expect("adjacent polygons share a portal").portal)
            .collect();

        funnel::funnel(start, &portals, finish)
    }

    pub fn polygons(&self) -> &[NavPolygon] {
        self.bvh.items()
    }

    pub fn vertices(&self) -> &[Vec3] {
        &self.vertices
    }

    /// Consumes this navmesh to build a [`PathFinder`]: one RVO simulator
    /// per connected polygon group, with obstacles traced from each
    /// group's boundary.
    pub fn into_pathfinder(self, config: PathFinderConfig) -> PathFinder {
        let polygons = self.bvh.items().to_vec();
        PathFinder::new(self.vertices, polygons, config)
    }
}

/// Bakes `triangles` into a [`NavMesh`], running the full voxelize →
/// filter → compact → region-grow → contour → mesh pipeline.
///
/// Returns [`NavError::BakeInputEmpty`] for zero input triangles, and
/// [`NavError::BakeStageFailure`]/[`NavError::RegionIdOverflow`] if a
/// pipeline stage hits a capacity it can't recover from.
#[instrument(skip_all, fields(triangle_count = triangles.len()))]
pub fn bake(triangles: &[Triangle], config: &BakerConfig) -> Result<NavMesh> {
    if triangles.is_empty() {
        return Err(NavError::BakeInputEmpty);
    }

    let aabb = Aabb3::from_points(triangles.iter().flat_map(|t| [t.a, t.b, t.c])).inflated(config.agent_radius);

    let mut hf = heightfield::new_heightfield(aabb.min, aabb.max, config);
    heightfield::rasterize_triangles(&mut hf, triangles, config);

    filter::filter_low_hanging_obstacles(&mut hf, config);
    filter::filter_ledge_spans(&mut hf, config);
    filter::filter_low_ceilings(&mut hf, config);

    let mut chf = compact_heightfield::build_compact_heightfield(&hf, config);
    regions::erode_walkable_area(&mut chf, config);
    regions::calculate_distance_field(&mut chf);
    regions::build_regions(&mut chf, config)?;

    let contours = contour::build_contours(&chf, config);
    let poly_mesh = mesher::build_poly_mesh(&contours, &chf, config);

    if poly_mesh.polygons.is_empty() {
        return Err(NavError::BakeStageFailure { stage: "mesher" });
    }

    let world_vertices: Vec<Vec3> = poly_mesh.vertices.iter().map(|&v| grid_to_world(v, &hf)).collect();
    let polygons = build_navmesh_graph(&world_vertices, &poly_mesh.polygons);

    info!(polygon_count = polygons.len(), "bake finished");

    Ok(NavMesh { vertices: world_vertices, bvh: Bvh::build(polygons) })
}

fn grid_to_world(v: IVec3, hf: &heightfield::Heightfield) -> Vec3 {
    hf.origin + Vec3::new(v.x as f32 * hf.cell_size, v.y as f32 * hf.cell_height, v.z as f32 * hf.cell_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_plane(half_extent: f32) -> Vec<Triangle> {
        // Wound so (b-a) x (c-a) points up; the baker's walkability test is
        // one-sided on `normal.y`, not `abs(normal.y)`.
        vec![
            Triangle::new(Vec3::new(-half_extent, 0.0, -half_extent), Vec3::new(half_extent, 0.0, half_extent), Vec3::new(half_extent, 0.0, -half_extent)),
            Triangle::new(Vec3::new(-half_extent, 0.0, -half_extent), Vec3::new(-half_extent, 0.0, half_extent), Vec3::new(half_extent, 0.0, half_extent)),
        ]
    }

    #[test]
    fn empty_input_is_bake_input_empty() {
        let err = bake(&[], &BakerConfig::default()).unwrap_err();
        assert!(matches!(err, NavError::BakeInputEmpty));
    }

    #[test]
    fn flat_plane_bakes_to_a_sampleable_navmesh() {
        let navmesh = bake(&flat_plane(10.0), &BakerConfig::default()).unwrap();
        assert!(!navmesh.polygons().is_empty());
        let sample = navmesh.sample(Vec3::new(0.0, 5.0, 0.0), true);
        assert!(sample.is_some());
    }

    #[test]
    fn flat_plane_has_a_path_across_it() {
        let navmesh = bake(&flat_plane(10.0), &BakerConfig::default()).unwrap();
        let path = navmesh.search_path(Vec3::new(-8.0, 0.0, -8.0), Vec3::new(8.0, 0.0, 8.0));
        assert!(!path.is_empty());
    }
}
