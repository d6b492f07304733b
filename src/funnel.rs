//! Component E: the funnel ("pull-the-rope") string-pulling algorithm that
//! turns a sequence of portal pairs into a geodesic 3D polyline.
//!
//! Ported from the original `Navmesh.search_path`'s inline funnel (itself
//! credited there to `donmccurdy/three-pathfinding`), generalized from
//! 2-tuples of 3-float points to `(Vec3, Vec3)` portal pairs. The teacher
//! crate has no string-puller of its own (`oxidized_navigation::query`
//! returns the polygon-center polyline directly); this is grounded on
//! `spec.md` §4.E and `original_source`'s `pathfinder/navmesh/__init__.py`.

use glam::Vec3;

const EPSILON_SQ: f32 = 1.0e-4;

/// Signed twice-area of `(a, b, c)` on the `xz` plane, in the funnel's own
/// sign convention (matches `original_source`'s `_triangle_area_2`, which
/// is the negation of [`crate::math::triangle_area_2d`]'s convention).
fn triangle_area_2(a: Vec3, b: Vec3, c: Vec3) -> f32 {
    (c.x - a.x) * (b.z - a.z) - (b.x - a.x) * (c.z - a.z)
}

fn v_equal(a: Vec3, b: Vec3) -> bool {
    a.distance_squared(b) < EPSILON_SQ
}

/// Pulls a taut polyline through `start` -> `portals` -> `finish`.
///
/// Each portal is `(left, right)`, oriented consistently with the
/// traversed polygon's own winding (see [`crate::navmesh_graph::NeighborLink`]).
/// The first point of the result is always `start`, the last is always
/// `finish`; interior points are portal endpoints walked past during
/// tightening. `y` is inherited from whichever portal endpoint produced
/// the vertex — when two adjacent polygons disagree on a shared vertex's
/// height, the first-visited portal's value wins (this function never
/// revisits an already-committed portal).
pub fn funnel(start: Vec3, portals: &[(Vec3, Vec3)], finish: Vec3) -> Vec<Vec3> {
    let mut pairs: Vec<(Vec3, Vec3)> = Vec::with_capacity(portals.len() + 2);
    pairs.push((start, start));
    pairs.extend_from_slice(portals);
    pairs.push((finish, finish));

    let mut portal_apex = pairs[0].0;
    let mut portal_left = pairs[0].0;
    let mut portal_right = pairs[0].1;

    let mut apex_index = 0usize;
    let mut left_index = 0usize;
    let mut right_index = 0usize;

    let mut path = vec![portal_apex];

    let mut i = 1usize;
    while i < pairs.len() {
        let left = pairs[i].0;
        let right = pairs[i].1;

        let mut restarted = false;

        // Tighten (or commit) the right ray.
        if triangle_area_2(portal_apex, portal_right, right) <= 0.0 {
            if v_equal(portal_apex, portal_right) || triangle_area_2(portal_apex, portal_left, right) > 0.0 {
                portal_right = right;
                right_index = i;
            } else {
                if !v_equal(portal_left, *path.last().unwrap()) {
                    path.push(portal_left);
                }
                portal_apex = portal_left;
                apex_index = left_index;
                portal_left = portal_apex;
                portal_right = portal_apex;
                left_index = apex_index;
                right_index = apex_index;
                i = apex_index;
                restarted = true;
            }
        }

        // Tighten (or commit) the left ray, unless the right ray just reset the scan.
        if !restarted && triangle_area_2(portal_apex, portal_left, left) >= 0.0 {
            if v_equal(portal_apex, portal_left) || triangle_area_2(portal_apex, portal_right, left) < 0.0 {
                portal_left = left;
                left_index = i;
            } else {
                path.push(portal_right);
                portal_apex = portal_right;
                apex_index = right_index;
                portal_left = portal_apex;
                portal_right = portal_apex;
                left_index = apex_index;
                right_index = apex_index;
                i = apex_index;
            }
        }

        i += 1;
    }

    let tail = pairs.last().unwrap().0;
    if path.last().map_or(true, |&last| !v_equal(last, tail)) {
        path.push(tail);
    }

    path
}

/// Total 3D arc length of a polyline, used to pick the shortest funnel
/// result across k-shortest candidates.
pub fn path_length(path: &[Vec3]) -> f32 {
    path.windows(2).map(|w| w[0].distance(w[1])).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn straight_corridor_collapses_to_endpoints() {
        let portals = vec![
            (Vec3::new(-1.0, 0.0, 1.0), Vec3::new(1.0, 0.0, 1.0)),
            (Vec3::new(-1.0, 0.0, 2.0), Vec3::new(1.0, 0.0, 2.0)),
        ];
        let path = funnel(Vec3::new(0.0, 0.0, 0.0), &portals, Vec3::new(0.0, 0.0, 3.0));
        assert_eq!(path.first().copied(), Some(Vec3::new(0.0, 0.0, 0.0)));
        assert_eq!(path.last().copied(), Some(Vec3::new(0.0, 0.0, 3.0)));
        // Straight corridor: no corner should be inserted.
        assert_eq!(path.len(), 2);
    }

    #[test]
    fn dogleg_corridor_inserts_corner() {
        // Portal narrows sharply to one side, forcing a corner vertex.
        let portals = vec![(Vec3::new(0.0, 0.0, 1.0), Vec3::new(4.0, 0.0, 1.0))];
        let path = funnel(Vec3::new(2.0, 0.0, 0.0), &portals, Vec3::new(-4.0, 0.0, 2.0));
        assert_eq!(path.first().copied(), Some(Vec3::new(2.0, 0.0, 0.0)));
        assert_eq!(path.last().copied(), Some(Vec3::new(-4.0, 0.0, 2.0)));
        assert!(path.len() >= 2);
    }

    #[test]
    fn no_portals_is_a_direct_line() {
        let path = funnel(Vec3::ZERO, &[], Vec3::new(5.0, 0.0, 0.0));
        assert_eq!(path, vec![Vec3::ZERO, Vec3::new(5.0, 0.0, 0.0)]);
    }
}
