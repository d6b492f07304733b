//! Component J: region boundary tracing, simplification, and hole merging.
//!
//! Grounded on the teacher's `build_contours` / `walk_contour` /
//! `simplify_contour` / `merge_region_holes` (`contour.rs`), re-expressed
//! over [`CompactHeightfield`]'s con-based neighbor lookup and the shared
//! integer xz predicates in [`crate::math`].

use glam::{IVec2, IVec4};

use crate::compact_heightfield::{CompactHeightfield, DIRS, NOT_CONNECTED};
use crate::config::BakerConfig;
use crate::math::{in_cone, intersect, point_distance_from_segment};

/// Low bit marks a vertex produced where a span had no neighbor at all
/// (an outer/world-boundary edge rather than a region transition).
pub const BORDER_VERTEX: u32 = 0x10000;
/// Set when the edge crosses into a different area type. Unused in this
/// crate (one walkable area), kept for parity with the data model.
pub const AREA_BORDER: u32 = 0x20000;
const REGION_MASK: u32 = 0xFFFF;

/// A region boundary: `rverts` is the raw per-voxel trace, `verts` is the
/// Douglas-Peucker-simplified polyline actually meshed. Both store
/// `(x, y, z, region|flags)` as packed [`IVec4`]s.
#[derive(Debug, Clone)]
pub struct Contour {
    pub rverts: Vec<IVec4>,
    pub verts: Vec<IVec4>,
    pub region: u16,
}

fn neighbour(
    chf: &CompactHeightfield,
    x: usize,
    z: usize,
    span_i: usize,
    dir: usize,
) -> Option<(usize, usize, usize)> {
    let span = chf.spans[span_i];
    let con = span.get_con(dir);
    if con == NOT_CONNECTED {
        return None;
    }
    let (dx, dz) = DIRS[dir];
    let nx = (x as i32 + dx) as usize;
    let nz = (z as i32 + dz) as usize;
    let nidx = chf.cell_index_of(nx, nz);
    Some((nx, nz, chf.cell_index[nidx] as usize + con as usize))
}

/// Traces and simplifies every non-zero region's boundary into a
/// [`Contour`], then stitches CW hole contours into their CCW outline.
pub fn build_contours(chf: &CompactHeightfield, cfg: &BakerConfig) -> Vec<Contour> {
    let span_count = chf.spans.len();
    let mut boundary_flags = vec![0u8; span_count];

    for z in 0..chf.depth {
        for x in 0..chf.width {
            let idx = chf.cell_index_of(x, z);
            let base = chf.cell_index[idx] as usize;
            let count = chf.cell_count[idx] as usize;
            for s in 0..count {
                let span_i = base + s;
                let own_region = chf.spans[span_i].reg;
                if own_region == 0 {
                    continue;
                }

                let mut connected = 0u8;
                for dir in 0..4 {
                    let other_region = match neighbour(chf, x, z, span_i, dir) {
                        Some((_, _, ni)) => chf.spans[ni].reg,
                        None => 0,
                    };
                    if other_region == own_region {
                        connected |= 1 << dir;
                    }
                }
                boundary_flags[span_i] = connected ^ 0b1111;
            }
        }
    }

    let mut contours = Vec::new();
    let max_edge_len_sq = (cfg.max_edge_len_voxels() as i64).pow(2);

    for z in 0..chf.depth {
        for x in 0..chf.width {
            let idx = chf.cell_index_of(x, z);
            let base = chf.cell_index[idx] as usize;
            let count = chf.cell_count[idx] as usize;
            for s in 0..count {
                let span_i = base + s;
                if boundary_flags[span_i] == 0 || boundary_flags[span_i] == 0b1111 {
                    boundary_flags[span_i] = 0;
                    continue;
                }
                let region = chf.spans[span_i].reg;
                if region == 0 {
                    continue;
                }

                let rverts = walk_contour(chf, x, z, s, &mut boundary_flags);
                let mut verts = simplify_contour(&rverts, cfg.edge_max_error, max_edge_len_sq);
                remove_degenerate_segments(&mut verts);

                if verts.len() >= 3 {
                    contours.push(Contour { rverts, verts, region });
                }
            }
        }
    }

    merge_holes(contours)
}

fn get_corner_height(chf: &CompactHeightfield, x: usize, z: usize, span_i: usize, dir: usize) -> i32 {
    let next_dir = (dir + 1) & 0x3;
    let mut height = chf.spans[span_i].y as i32;

    if let Some((nx, nz, ni)) = neighbour(chf, x, z, span_i, dir) {
        height = height.max(chf.spans[ni].y as i32);
        if let Some((_, _, di)) = neighbour(chf, nx, nz, ni, next_dir) {
            height = height.max(chf.spans[di].y as i32);
        }
    }
    if let Some((nx, nz, ni)) = neighbour(chf, x, z, span_i, next_dir) {
        height = height.max(chf.spans[ni].y as i32);
        if let Some((_, _, di)) = neighbour(chf, nx, nz, ni, dir) {
            height = height.max(chf.spans[di].y as i32);
        }
    }

    height
}

fn walk_contour(
    chf: &CompactHeightfield,
    mut x: usize,
    mut z: usize,
    mut span_idx: usize,
    boundary_flags: &mut [u8],
) -> Vec<IVec4> {
    let mut dir = 0u8;
    let start_idx_abs = chf.cell_index[chf.cell_index_of(x, z)] as usize + span_idx;
    while boundary_flags[start_idx_abs] & (1 << dir) == 0 {
        dir += 1;
    }
    let start = (x, z, span_idx, dir);
    let mut verts = Vec::new();

    let mut guard = 0usize;
    loop {
        guard += 1;
        if guard > 8 * chf.spans.len().max(1) {
            break;
        }

        let span_abs = chf.cell_index[chf.cell_index_of(x, z)] as usize + span_idx;
        if boundary_flags[span_abs] & (1 << dir) != 0 {
            let height = get_corner_height(chf, x, z, span_abs, dir as usize);
            let bordering_region = match neighbour(chf, x, z, span_abs, dir as usize) {
                Some((_, _, ni)) => chf.spans[ni].reg as u32,
                None => 0,
            };

            let px = match dir {
                1 | 2 => x + 1,
                _ => x,
            } as i32;
            let pz = match dir {
                0 | 1 => z + 1,
                _ => z,
            } as i32;

            let flag = if bordering_region == 0 { BORDER_VERTEX } else { 0 };
            verts.push(IVec4::new(px, height, pz, (bordering_region & REGION_MASK) | flag));

            boundary_flags[span_abs] &= !(1 << dir);
            dir = (dir + 1) & 0x3;
        } else {
            let Some((nx, nz, ni)) = neighbour(chf, x, z, span_abs, dir as usize) else {
                break;
            };
            let nbase = chf.cell_index[chf.cell_index_of(nx, nz)] as usize;
            span_idx = ni - nbase;
            x = nx;
            z = nz;
            dir = (dir + 3) & 0x3;
        }

        if (x, z, span_idx, dir) == start {
            break;
        }
    }

    verts
}

/// Douglas-Peucker-style simplification, seeded either at every
/// region-transition vertex or (if there are none) at the lexicographic
/// min/max, then tessellating long unconnected edges.
fn simplify_contour(points: &[IVec4], max_error: f32, max_edge_len_sq: i64) -> Vec<IVec4> {
    if points.is_empty() {
        return Vec::new();
    }
    let n = points.len();
    let mut simplified: Vec<(IVec4, usize)> = Vec::new();

    let has_connections = points.iter().any(|p| (p.w as u32 & REGION_MASK) != 0);

    if has_connections {
        for i in 0..n {
            let next = (i + 1) % n;
            if (points[i].w as u32 & REGION_MASK) != (points[next].w as u32 & REGION_MASK) {
                simplified.push((points[i], i));
            }
        }
        if simplified.is_empty() {
            simplified.push((points[0], 0));
        }
    } else {
        let mut lower = (points[0], 0usize);
        let mut upper = (points[0], 0usize);
        for (i, p) in points.iter().enumerate() {
            if p.x < lower.0.x || (p.x == lower.0.x && p.z < lower.0.z) {
                lower = (*p, i);
            }
            if p.x > upper.0.x || (p.x == upper.0.x && p.z > upper.0.z) {
                upper = (*p, i);
            }
        }
        simplified.push(lower);
        simplified.push(upper);
    }

    let mut i = 0;
    while i < simplified.len() {
        let next = (i + 1) % simplified.len();
        let (mut a, ia) = simplified[i];
        let (mut b, ib) = simplified[next];

        let (mut c_i, c_inc, end_i, swapped) = if b.x > a.x || (b.x == a.x && b.z > a.z) {
            (((ia + 1) % n), 1i64, ib, false)
        } else {
            (((ib + n - 1) % n), (n as i64 - 1), ia, true)
        };
        if swapped {
            std::mem::swap(&mut a, &mut b);
        }

        let mut max_dev = 0.0f32;
        let mut max_i = None;

        if (points[c_i].w as u32 & REGION_MASK) == 0 {
            while c_i != end_i {
                let dev = point_distance_from_segment(
                    IVec2::new(points[c_i].x, points[c_i].z),
                    IVec2::new(a.x, a.z),
                    IVec2::new(b.x, b.z),
                );
                if dev > max_dev {
                    max_dev = dev;
                    max_i = Some(c_i);
                }
                c_i = ((c_i as i64 + c_inc).rem_euclid(n as i64)) as usize;
            }
        }

        if let (Some(max_i), true) = (max_i, max_dev > max_error * max_error) {
            simplified.insert(i + 1, (points[max_i], max_i));
        } else {
            i += 1;
        }
    }

    // Split long unconnected edges.
    let mut i = 0;
    while i < simplified.len() {
        let (a, ia) = simplified[i];
        let (b, _) = simplified[(i + 1) % simplified.len()];

        let next_original = (ia + 1) % n;
        let should_tesselate = (points[next_original].w as u32 & REGION_MASK) == 0;

        let mut insert_at = None;
        if should_tesselate {
            let dx = (b.x - a.x) as i64;
            let dz = (b.z - a.z) as i64;
            if dx * dx + dz * dz > max_edge_len_sq {
                let ib = simplified[(i + 1) % simplified.len()].1;
                let n_span = if ib < ia { ib + n - ia } else { ib - ia } as i64;
                if n_span > 1 {
                    let mid = if b.x > a.x || (b.x == a.x && b.z > a.z) {
                        (ia + (n_span / 2) as usize) % n
                    } else {
                        (ia + ((n_span + 1) / 2) as usize) % n
                    };
                    insert_at = Some(mid);
                }
            }
        }

        if let Some(mid) = insert_at {
            simplified.insert(i + 1, (points[mid], mid));
        } else {
            i += 1;
        }
    }

    let len = simplified.len();
    simplified
        .iter()
        .map(|&(p, idx)| {
            let next = (idx + 1) % n;
            let region = points[next].w as u32 & REGION_MASK;
            let border = points[idx].w as u32 & BORDER_VERTEX;
            IVec4::new(p.x, p.y, p.z, (region | border) as i32)
        })
        .take(len)
        .collect()
}

fn remove_degenerate_segments(verts: &mut Vec<IVec4>) {
    let mut i = 0;
    while i < verts.len() && verts.len() > 1 {
        let next = (i + 1) % verts.len();
        if verts[i].x == verts[next].x && verts[i].z == verts[next].z {
            verts.remove(i);
        } else {
            i += 1;
        }
    }
}

fn signed_area_2d(verts: &[IVec4]) -> i64 {
    let mut area: i64 = 0;
    for i in 0..verts.len() {
        let a = verts[i];
        let b = verts[(i + 1) % verts.len()];
        area += b.x as i64 * a.z as i64 - a.x as i64 * b.z as i64;
    }
    (area + 1) / 2
}

struct Hole {
    contour: Contour,
    left_most: usize,
}

fn merge_holes(contours: Vec<Contour>) -> Vec<Contour> {
    let max_region = contours.iter().map(|c| c.region).max().unwrap_or(0) as usize + 1;
    let mut outlines: Vec<Option<Contour>> = vec![None; max_region];
    let mut holes: Vec<Vec<Hole>> = (0..max_region).map(|_| Vec::new()).collect();

    for contour in contours {
        if signed_area_2d(&contour.verts) < 0 {
            let left_most = leftmost_vertex(&contour.verts);
            holes[contour.region as usize].push(Hole { contour, left_most });
        } else {
            outlines[contour.region as usize] = Some(contour);
        }
    }

    let mut result = Vec::new();
    for region in 0..max_region {
        let Some(mut outline) = outlines[region].take() else {
            // Outline-less hole sets (e.g. a fully enclosed region with no
            // traced outline) are dropped; this matches the teacher, which
            // only processes regions that have both.
            continue;
        };

        let mut region_holes = std::mem::take(&mut holes[region]);
        region_holes.sort_by(|a, b| {
            let va = a.contour.verts[a.left_most];
            let vb = b.contour.verts[b.left_most];
            va.x.cmp(&vb.x).then(va.z.cmp(&vb.z))
        });

        for hole in &region_holes {
            merge_one_hole(&mut outline, &hole.contour, hole.left_most);
        }

        result.push(outline);
    }

    result
}

fn leftmost_vertex(verts: &[IVec4]) -> usize {
    let mut best = 0;
    for (i, v) in verts.iter().enumerate() {
        if v.x < verts[best].x || (v.x == verts[best].x && v.z < verts[best].z) {
            best = i;
        }
    }
    best
}

fn merge_one_hole(outline: &mut Contour, hole: &Contour, hole_left_most: usize) {
    let hole_verts = &hole.verts;
    let outline_verts = &outline.verts;
    if hole_verts.is_empty() || outline_verts.is_empty() {
        return;
    }

    let mut best_vertex = hole_left_most;
    let mut chosen: Option<usize> = None;

    for _ in 0..hole_verts.len() {
        let corner = hole_verts[best_vertex];
        let mut candidates: Vec<(usize, i64)> = Vec::new();
        for i in 0..outline_verts.len() {
            if vertex_in_cone(outline_verts, i, corner) {
                let dx = (outline_verts[i].x - corner.x) as i64;
                let dz = (outline_verts[i].z - corner.z) as i64;
                candidates.push((i, dx * dx + dz * dz));
            }
        }
        candidates.sort_by_key(|&(_, d)| d);

        for (candidate, _) in candidates {
            let v = outline_verts[candidate];
            let mut intersects = segment_intersects_contour(v, corner, candidate, outline_verts);
            if !intersects {
                intersects = segment_intersects_contour_all(v, corner, hole_verts);
            }
            if !intersects {
                chosen = Some(candidate);
                break;
            }
        }

        if chosen.is_some() {
            break;
        }
        best_vertex = (best_vertex + 1) % hole_verts.len();
    }

    let Some(outline_index) = chosen else {
        return;
    };

    let mut merged = Vec::with_capacity(outline_verts.len() + hole_verts.len());
    let olen = outline_verts.len();
    for i in 0..olen {
        merged.push(outline_verts[(outline_index + i) % olen]);
    }
    let hlen = hole_verts.len();
    for i in 0..hlen {
        merged.push(hole_verts[(best_vertex + i) % hlen]);
    }
    outline.verts = merged;
}

fn vertex_in_cone(verts: &[IVec4], i: usize, corner: IVec4) -> bool {
    let n = verts.len();
    let prev = verts[(i + n - 1) % n];
    let a = verts[i];
    let next = verts[(i + 1) % n];
    in_cone(prev, a, next, corner)
}

fn segment_intersects_contour(a: IVec4, b: IVec4, skip_vertex: usize, verts: &[IVec4]) -> bool {
    let n = verts.len();
    for i in 0..n {
        let next = (i + 1) % n;
        if i == skip_vertex || next == skip_vertex {
            continue;
        }
        let (p, q) = (verts[i], verts[next]);
        if shares_xz(a, p) || shares_xz(b, p) || shares_xz(b, q) {
            continue;
        }
        if intersect(a, b, p, q) {
            return true;
        }
    }
    false
}

fn segment_intersects_contour_all(a: IVec4, b: IVec4, verts: &[IVec4]) -> bool {
    let n = verts.len();
    for i in 0..n {
        let next = (i + 1) % n;
        let (p, q) = (verts[i], verts[next]);
        if shares_xz(a, p) || shares_xz(b, p) || shares_xz(b, q) {
            continue;
        }
        if intersect(a, b, p, q) {
            return true;
        }
    }
    false
}

fn shares_xz(a: IVec4, b: IVec4) -> bool {
    a.x == b.x && a.z == b.z
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remove_degenerate_drops_repeated_xz() {
        let mut v = vec![
            IVec4::new(0, 0, 0, 0),
            IVec4::new(0, 5, 0, 0),
            IVec4::new(1, 0, 0, 0),
        ];
        remove_degenerate_segments(&mut v);
        assert_eq!(v.len(), 2);
    }

    #[test]
    fn signed_area_detects_winding() {
        let ccw = vec![
            IVec4::new(0, 0, 0, 0),
            IVec4::new(4, 0, 0, 0),
            IVec4::new(4, 0, 4, 0),
            IVec4::new(0, 0, 4, 0),
        ];
        assert!(signed_area_2d(&ccw) > 0);
        let cw: Vec<IVec4> = ccw.into_iter().rev().collect();
        assert!(signed_area_2d(&cw) < 0);
    }
}
