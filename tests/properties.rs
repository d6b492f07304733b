//! Quantified property checks against a few small, hand-built geometries.

use glam::Vec3;
use navkit::navmesh_graph::{build_navmesh_graph, find_path};
use navkit::obstacle_bsp::ObstacleBsp;
use navkit::persistence::{read_binary, write_binary};
use navkit::rvo::{Obstacle, RvoAgent};
use navkit::{bake, config::BakerConfig, math::Triangle};

fn quad_vertices() -> Vec<Vec3> {
    vec![
        Vec3::new(0.0, 0.0, 0.0),
        Vec3::new(1.0, 0.0, 0.0),
        Vec3::new(1.0, 0.0, 1.0),
        Vec3::new(0.0, 0.0, 1.0),
        Vec3::new(2.0, 0.0, 0.0),
        Vec3::new(2.0, 0.0, 1.0),
    ]
}

fn two_quad_strip() -> (Vec<Vec3>, Vec<navkit::navmesh_graph::NavPolygon>) {
    let vertices = quad_vertices();
    let polygons = vec![vec![0, 1, 2, 3], vec![1, 4, 5, 2]];
    let graph = build_navmesh_graph(&vertices, &polygons);
    (vertices, graph)
}

/// Property 1: adjacency symmetry — every neighbor relationship is
/// mutual, and the portal seen from each side is the other's reversed.
#[test]
fn adjacency_is_symmetric() {
    let (_, polygons) = two_quad_strip();
    for polygon in &polygons {
        for link in &polygon.neighbors {
            let other = &polygons[link.polygon];
            let back = other.neighbors.iter().find(|l| l.polygon == polygon.index).expect("neighbor relationship must be mutual");
            assert_eq!(back.portal, (link.portal.1, link.portal.0));
        }
    }
}

/// Property 2: group closure — two polygons sharing an edge land in the
/// same connected-component group.
#[test]
fn connected_polygons_share_a_group() {
    let (_, polygons) = two_quad_strip();
    assert_eq!(polygons[0].group, polygons[1].group);
}

/// Property 3: BVH completeness — sampling a point inside a polygon
/// returns that exact point, i.e. the BVH resolves the query to the
/// polygon that actually contains it.
#[test]
fn bvh_sample_resolves_to_the_containing_polygon() {
    let navmesh = bake(
        &[
            Triangle::new(Vec3::new(-5.0, 0.0, -5.0), Vec3::new(5.0, 0.0, 5.0), Vec3::new(5.0, 0.0, -5.0)),
            Triangle::new(Vec3::new(-5.0, 0.0, -5.0), Vec3::new(-5.0, 0.0, 5.0), Vec3::new(5.0, 0.0, 5.0)),
        ],
        &BakerConfig::default(),
    )
    .unwrap();

    assert!(!navmesh.polygons().is_empty());
    for polygon in navmesh.polygons() {
        let interior = polygon.center;
        let sampled = navmesh.sample(interior, false).expect("every polygon center must sample to some polygon");
        assert!((sampled - interior).length() < 1.0e-3, "expected sample({interior:?}) = {interior:?}, got {sampled:?}");
    }
}

/// Property 4: A* returns the empty route for disconnected queries and a
/// route no longer than a manual breadth-first count of hops for a
/// directly adjacent pair.
#[test]
fn a_star_finds_the_direct_route_and_empties_out_when_unconnected() {
    let (_, polygons) = two_quad_strip();
    let route = find_path(&polygons, 0, 1);
    assert_eq!(route, vec![0, 1]);

    let isolated_vertices = vec![Vec3::new(10.0, 0.0, 10.0), Vec3::new(11.0, 0.0, 10.0), Vec3::new(11.0, 0.0, 11.0)];
    let mut vertices = quad_vertices();
    vertices.extend(isolated_vertices);
    let polygons_with_island = build_navmesh_graph(&vertices, &[vec![0, 1, 2, 3], vec![1, 4, 5, 2], vec![6, 7, 8]]);
    let route = find_path(&polygons_with_island, 0, 2);
    assert!(route.is_empty());
}

/// Property 5: funnel consistency — the planned path starts at `a`, ends
/// at `b`, and its interior points land on the traversed portals.
#[test]
fn search_path_starts_and_ends_at_the_query_points() {
    let navmesh = bake(
        &[
            Triangle::new(Vec3::new(-5.0, 0.0, -5.0), Vec3::new(5.0, 0.0, 5.0), Vec3::new(5.0, 0.0, -5.0)),
            Triangle::new(Vec3::new(-5.0, 0.0, -5.0), Vec3::new(-5.0, 0.0, 5.0), Vec3::new(5.0, 0.0, 5.0)),
        ],
        &BakerConfig::default(),
    )
    .unwrap();

    let start = Vec3::new(-4.0, 0.0, -4.0);
    let finish = Vec3::new(4.0, 0.0, 4.0);
    let path = navmesh.search_path(start, finish);

    assert!(!path.is_empty());
    assert!(path.first().unwrap().distance(start) < 1.0e-3);
    assert!(path.last().unwrap().distance(finish) < 1.0e-3);
}

/// Property 6: RVO feasibility — the solved velocity never exceeds the
/// agent's max speed.
#[test]
fn computed_velocity_never_exceeds_max_speed() {
    let defaults = navkit::config::AgentDefaults { radius: 0.5, max_speed: 2.0, neighbor_dist: 10.0, max_neighbors: 5, time_horizon: 1.5, time_horizon_obstacle: 2.0 };
    let mut agent = RvoAgent::new(0, glam::Vec2::new(-1.0, 0.0), glam::Vec2::ZERO, &defaults);
    agent.pref_velocity = glam::Vec2::new(5.0, 0.0);

    let mut other = RvoAgent::new(1, glam::Vec2::new(1.0, 0.0), glam::Vec2::ZERO, &defaults);
    other.pref_velocity = glam::Vec2::new(-5.0, 0.0);
    agent.agent_neighbors.push((4.0, 1));
    other.agent_neighbors.push((4.0, 0));

    let agents = vec![agent.clone(), other];
    let velocity = agents[0].compute_new_velocity(&[], &agents, 0.1);
    assert!(velocity.length() <= defaults.max_speed + 1.0e-3);
}

/// Property 7: obstacle visibility is symmetric in its query points.
#[test]
fn obstacle_visibility_is_symmetric() {
    let pts = [glam::Vec2::new(0.0, 0.0), glam::Vec2::new(1.0, 0.0), glam::Vec2::new(1.0, 1.0), glam::Vec2::new(0.0, 1.0)];
    let n = pts.len();
    let mut obstacles: Vec<Obstacle> =
        (0..n).map(|i| Obstacle { point: pts[i], unit_dir: (pts[(i + 1) % n] - pts[i]).normalize(), convex: true, next: (i + 1) % n, prev: (i + n - 1) % n }).collect();
    let bsp = ObstacleBsp::build(&mut obstacles);

    let a = glam::Vec2::new(-1.0, 0.5);
    let b = glam::Vec2::new(2.0, 0.5);
    assert_eq!(bsp.query_visibility(&obstacles, a, b, 0.0), bsp.query_visibility(&obstacles, b, a, 0.0));
}

/// Property 8: the binary format round-trips a baked navmesh's vertices
/// and polygons exactly.
#[test]
fn binary_format_round_trips_a_baked_navmesh() {
    let navmesh = bake(
        &[
            Triangle::new(Vec3::new(-5.0, 0.0, -5.0), Vec3::new(5.0, 0.0, 5.0), Vec3::new(5.0, 0.0, -5.0)),
            Triangle::new(Vec3::new(-5.0, 0.0, -5.0), Vec3::new(-5.0, 0.0, 5.0), Vec3::new(5.0, 0.0, 5.0)),
        ],
        &BakerConfig::default(),
    )
    .unwrap();

    let polygons: Vec<Vec<u32>> = navmesh.polygons().iter().map(|p| p.vertices.clone()).collect();
    let mut buf = Vec::new();
    write_binary(&mut buf, navmesh.vertices(), &polygons).unwrap();
    let (read_vertices, read_polygons) = read_binary(&mut buf.as_slice()).unwrap();

    assert_eq!(read_vertices.len(), navmesh.vertices().len());
    assert_eq!(read_polygons, polygons);
    assert!(read_vertices.iter().all(|v| v.is_finite()));
}
