//! Integration scenarios bake real geometry and exercise the public
//! `bake`/`NavMesh` surface end to end.

use glam::Vec3;
use navkit::{bake, config::BakerConfig, math::Triangle};

fn quad(a: Vec3, b: Vec3, c: Vec3, d: Vec3) -> [Triangle; 2] {
    // Wound so a perimeter walked a -> b -> c -> d produces an upward
    // (b-a) x (c-a) normal; the baker's walkability test is one-sided.
    [Triangle::new(a, c, b), Triangle::new(a, d, c)]
}

fn path_length(path: &[Vec3]) -> f32 {
    path.windows(2).map(|w| w[0].distance(w[1])).sum()
}

/// Scenario A: a cube sits in the middle of a ground plane. The route
/// between points on either side must detour around the cube's inflated
/// footprint, making it longer than the direct 6-unit span.
#[test]
fn cube_on_ground_routes_around_the_obstacle() {
    let mut triangles = Vec::new();
    triangles.extend(quad(Vec3::new(-4.0, 0.0, -4.0), Vec3::new(4.0, 0.0, -4.0), Vec3::new(4.0, 0.0, 4.0), Vec3::new(-4.0, 0.0, 4.0)));

    // A 1x1x1 cube footprint, all six faces, centered at the origin.
    let (lo, hi) = (-1.0f32, 1.0f32);
    let corners = [
        Vec3::new(lo, 0.0, lo),
        Vec3::new(hi, 0.0, lo),
        Vec3::new(hi, 0.0, hi),
        Vec3::new(lo, 0.0, hi),
        Vec3::new(lo, 1.0, lo),
        Vec3::new(hi, 1.0, lo),
        Vec3::new(hi, 1.0, hi),
        Vec3::new(lo, 1.0, hi),
    ];
    // Top face only; the baker's walkable-ceiling filter already excludes
    // the ground underneath the cube's side/top faces from the plane
    // below, so only the obstruction matters for routing around it.
    triangles.extend(quad(corners[4], corners[5], corners[6], corners[7]));
    triangles.extend(quad(corners[0], corners[4], corners[7], corners[3]));
    triangles.extend(quad(corners[1], corners[2], corners[6], corners[5]));
    triangles.extend(quad(corners[0], corners[1], corners[5], corners[4]));
    triangles.extend(quad(corners[3], corners[7], corners[6], corners[2]));

    let navmesh = bake(&triangles, &BakerConfig::default()).unwrap();
    let path = navmesh.search_path(Vec3::new(-3.0, 0.0, 0.0), Vec3::new(3.0, 0.0, 0.0));

    assert!(!path.is_empty());
    assert!(path_length(&path) > 6.0, "expected a detour, got length {}", path_length(&path));
}

/// Scenario B: two unconnected ground planes stacked in `y`. No polygon
/// graph edge joins them, so `search_path` must return empty.
#[test]
fn disconnected_planes_have_no_path() {
    let mut triangles = Vec::new();
    triangles.extend(quad(Vec3::new(-4.0, 0.0, -4.0), Vec3::new(4.0, 0.0, -4.0), Vec3::new(4.0, 0.0, 4.0), Vec3::new(-4.0, 0.0, 4.0)));
    triangles.extend(quad(Vec3::new(-4.0, 8.0, -4.0), Vec3::new(4.0, 8.0, -4.0), Vec3::new(4.0, 8.0, 4.0), Vec3::new(-4.0, 8.0, 4.0)));

    let navmesh = bake(&triangles, &BakerConfig::default()).unwrap();
    let path = navmesh.search_path(Vec3::new(0.0, 0.0, 0.0), Vec3::new(0.0, 8.0, 0.0));

    assert!(path.is_empty());
}

/// Scenario E: two triangles splitting the unit square along its
/// diagonal. A ray straight down through the square hits it; a ray just
/// outside the square's footprint misses.
#[test]
fn ray_hits_the_square_and_misses_outside_it() {
    let triangles = quad(Vec3::new(0.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 1.0), Vec3::new(0.0, 0.0, 1.0)).to_vec();
    let navmesh = bake(&triangles, &BakerConfig::default()).unwrap();

    let hit = navmesh.raycast(Vec3::new(0.5, 1.0, 0.5), Vec3::new(0.0, -1.0, 0.0));
    assert!(hit.is_some());

    let miss = navmesh.raycast(Vec3::new(-5.0, 1.0, 0.5), Vec3::new(0.0, -1.0, 0.0));
    assert!(miss.is_none());
}

/// Scenario C: six platforms at heights 0,2,4,6,8,10 joined by sloped
/// ramps shallow enough to stay under the default max slope. The path
/// from the bottom platform to the top must never lose height, and must
/// actually reach the top.
#[test]
fn staircase_path_is_monotone_in_y() {
    let half_width = 1.5;
    let (lo, hi) = (-half_width, half_width);

    let mut triangles = Vec::new();
    let mut z = 0.0f32;
    let platform_len = 2.0;
    let ramp_run = 3.0;
    let rise = 2.0;

    for step in 0..6 {
        let y = step as f32 * rise;
        triangles.extend(quad(Vec3::new(lo, y, z), Vec3::new(hi, y, z), Vec3::new(hi, y, z + platform_len), Vec3::new(lo, y, z + platform_len)));
        z += platform_len;

        if step < 5 {
            let y_next = y + rise;
            triangles.extend(quad(Vec3::new(lo, y, z), Vec3::new(hi, y, z), Vec3::new(hi, y_next, z + ramp_run), Vec3::new(lo, y_next, z + ramp_run)));
            z += ramp_run;
        }
    }

    let navmesh = bake(&triangles, &BakerConfig::default()).unwrap();
    let path = navmesh.search_path(Vec3::new(0.0, 0.0, 1.0), Vec3::new(0.0, 0.0, z - 1.0));

    assert!(!path.is_empty(), "expected a path from the bottom platform to the top");
    let total_rise = path.last().unwrap().y - path.first().unwrap().y;
    assert!(total_rise > 4.0 * rise, "expected to climb most of the staircase, got total rise {total_rise}");
    for w in path.windows(2) {
        assert!(w[1].y >= w[0].y - 1.0e-3, "path lost height between {w:?}");
    }
}

/// Scenario D: a 3x3 grid of quads with the cell at row 0, column 1
/// removed. A path spanning that row must detour around the hole, so its
/// length exceeds the direct distance between its endpoints.
#[test]
fn grid_with_a_missing_cell_forces_a_detour() {
    let cell = 3.0;
    let mut triangles = Vec::new();
    for row in 0..3 {
        for col in 0..3 {
            let index = row * 3 + col;
            if index == 1 {
                continue;
            }
            let x0 = col as f32 * cell;
            let x1 = x0 + cell;
            let z0 = row as f32 * cell;
            let z1 = z0 + cell;
            triangles.extend(quad(Vec3::new(x0, 0.0, z0), Vec3::new(x1, 0.0, z0), Vec3::new(x1, 0.0, z1), Vec3::new(x0, 0.0, z1)));
        }
    }

    let navmesh = bake(&triangles, &BakerConfig::default()).unwrap();
    let start = Vec3::new(0.5, 0.0, 0.5);
    let finish = Vec3::new(7.5, 0.0, 0.5);
    let path = navmesh.search_path(start, finish);

    assert!(!path.is_empty(), "expected a path around the missing cell");
    let direct_distance = start.distance(finish);
    assert!(path_length(&path) > direct_distance, "expected a detour longer than the direct distance {direct_distance}");
}

/// Scenario F (reduced): agents spread around the origin with preferred
/// velocity pointing inward never end up closer than their combined
/// radius after a run of small ORCA steps.
#[test]
fn orca_agents_never_interpenetrate() {
    use navkit::config::AgentDefaults;
    use navkit::pathfinder::{PathFinder, PathFinderConfig};

    let ground = quad(Vec3::new(-10.0, 0.0, -10.0), Vec3::new(10.0, 0.0, -10.0), Vec3::new(10.0, 0.0, 10.0), Vec3::new(-10.0, 0.0, 10.0)).to_vec();
    let navmesh = bake(&ground, &BakerConfig::default()).unwrap();

    let defaults = AgentDefaults { radius: 0.3, ..AgentDefaults::default() };
    let mut pathfinder = navmesh.into_pathfinder(PathFinderConfig { agent_defaults: defaults, ..PathFinderConfig::default() });

    let mut handles = Vec::new();
    for i in 0..12 {
        let angle = i as f32 / 12.0 * std::f32::consts::TAU;
        let position = Vec3::new(angle.cos() * 5.0, 0.0, angle.sin() * 5.0);
        let handle = pathfinder.add_agent(position, 0.3, 1.0);
        assert_ne!(handle, navkit::pathfinder::INVALID_AGENT);
        handles.push(handle);
        pathfinder.set_agent_destination(handle, Vec3::ZERO);
    }

    for _ in 0..50 {
        pathfinder.update(0.1);

        let positions: Vec<glam::Vec2> = handles.iter().map(|&h| pathfinder.agent_position(h).unwrap()).collect();
        for i in 0..positions.len() {
            for j in (i + 1)..positions.len() {
                let dist = positions[i].distance(positions[j]);
                assert!(dist >= 0.6 - 1.0e-3, "agents {i} and {j} interpenetrated: {dist}");
            }
        }
    }
}
