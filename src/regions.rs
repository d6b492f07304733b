//! Component I: erosion, blurred distance field, and watershed region
//! growing/merging over a [`CompactHeightfield`].
//!
//! Grounded on the teacher's `erode_walkable_area` / `calculate_distance_field`
//! / `build_regions_system` (`heightfields.rs`, `regions.rs`), re-expressed
//! over the packed `CompactSpan.con` neighbor lookup instead of the
//! teacher's `[Option<u16>; 4]` array.

use tracing::{debug, warn};

use crate::compact_heightfield::{CompactHeightfield, CompactSpan, DIRS, NOT_CONNECTED, NULL_AREA};
use crate::config::BakerConfig;
use crate::error::{NavError, Result};

fn neighbour(
    chf: &CompactHeightfield,
    x: usize,
    z: usize,
    span: &CompactSpan,
    dir: usize,
) -> Option<(usize, usize, usize)> {
    let con = span.get_con(dir);
    if con == NOT_CONNECTED {
        return None;
    }
    let (dx, dz) = DIRS[dir];
    let nx = (x as i32 + dx) as usize;
    let nz = (z as i32 + dz) as usize;
    let nidx = chf.cell_index_of(nx, nz);
    let nspan = chf.cell_index[nidx] as usize + con as usize;
    Some((nx, nz, nspan))
}

/// A two-pass 8-connected chamfer transform (orthogonal step 2, diagonal
/// step 3). `same_area_only` toggles between the erosion pass (boundary =
/// any null-area neighbor) and the distance-field pass (boundary = any
/// neighbor of a different area than this span).
fn chamfer_distance_transform(
    chf: &mut CompactHeightfield,
    dist: &mut [u16],
    same_area_only: bool,
) {
    for z in 0..chf.depth {
        for x in 0..chf.width {
            let idx = chf.cell_index_of(x, z);
            let base = chf.cell_index[idx] as usize;
            let count = chf.cell_count[idx] as usize;
            for s in 0..count {
                let span_i = base + s;
                if chf.area[span_i] == NULL_AREA {
                    dist[span_i] = 0;
                    continue;
                }

                let mut fully_surrounded = true;
                for dir in 0..4 {
                    let span = chf.spans[span_i];
                    match neighbour(chf, x, z, &span, dir) {
                        Some((_, _, ni)) => {
                            let ok = if same_area_only {
                                chf.area[ni] == chf.area[span_i]
                            } else {
                                chf.area[ni] != NULL_AREA
                            };
                            if !ok {
                                fully_surrounded = false;
                                break;
                            }
                        }
                        None => {
                            fully_surrounded = false;
                            break;
                        }
                    }
                }
                dist[span_i] = if fully_surrounded { u16::MAX } else { 0 };
            }
        }
    }

    // Pass 1: forward (-x, -z and their diagonals).
    for z in 0..chf.depth {
        for x in 0..chf.width {
            let idx = chf.cell_index_of(x, z);
            let base = chf.cell_index[idx] as usize;
            let count = chf.cell_count[idx] as usize;
            for s in 0..count {
                let span_i = base + s;
                let mut d = dist[span_i];
                let span = chf.spans[span_i];

                if let Some((nx, nz, ni)) = neighbour(chf, x, z, &span, 0) {
                    d = d.min(dist[ni].saturating_add(2));
                    let nspan = chf.spans[ni];
                    if let Some((_, _, di)) = neighbour(chf, nx, nz, &nspan, 3) {
                        d = d.min(dist[di].saturating_add(3));
                    }
                }
                if let Some((nx, nz, ni)) = neighbour(chf, x, z, &span, 3) {
                    d = d.min(dist[ni].saturating_add(2));
                    let nspan = chf.spans[ni];
                    if let Some((_, _, di)) = neighbour(chf, nx, nz, &nspan, 2) {
                        d = d.min(dist[di].saturating_add(3));
                    }
                }
                dist[span_i] = d;
            }
        }
    }

    // Pass 2: backward (+x, +z and their diagonals).
    for z in (0..chf.depth).rev() {
        for x in (0..chf.width).rev() {
            let idx = chf.cell_index_of(x, z);
            let base = chf.cell_index[idx] as usize;
            let count = chf.cell_count[idx] as usize;
            for s in 0..count {
                let span_i = base + s;
                let mut d = dist[span_i];
                let span = chf.spans[span_i];

                if let Some((nx, nz, ni)) = neighbour(chf, x, z, &span, 2) {
                    d = d.min(dist[ni].saturating_add(2));
                    let nspan = chf.spans[ni];
                    if let Some((_, _, di)) = neighbour(chf, nx, nz, &nspan, 1) {
                        d = d.min(dist[di].saturating_add(3));
                    }
                }
                if let Some((nx, nz, ni)) = neighbour(chf, x, z, &span, 1) {
                    d = d.min(dist[ni].saturating_add(2));
                    let nspan = chf.spans[ni];
                    if let Some((_, _, di)) = neighbour(chf, nx, nz, &nspan, 0) {
                        d = d.min(dist[di].saturating_add(3));
                    }
                }
                dist[span_i] = d;
            }
        }
    }
}

/// Clears the area of any span whose chamfer distance to a non-walkable
/// cell is below `2 * walkable_radius`, keeping the agent's body clear of
/// obstacles.
pub fn erode_walkable_area(chf: &mut CompactHeightfield, cfg: &BakerConfig) {
    let radius = cfg.walkable_radius_voxels();
    if radius == 0 {
        return;
    }

    let mut dist = vec![0u16; chf.spans.len()];
    chamfer_distance_transform(chf, &mut dist, false);

    let threshold = radius * 2;
    for i in 0..chf.spans.len() {
        if dist[i] < threshold {
            chf.area[i] = NULL_AREA;
        }
    }
}

/// Computes `chf.dist`, a same-area chamfer distance field smoothed by a
/// 3x3 box blur (matches the teacher's "why would you read this" blur).
pub fn calculate_distance_field(chf: &mut CompactHeightfield) {
    let mut dist = vec![0u16; chf.spans.len()];
    chamfer_distance_transform(chf, &mut dist, true);
    chf.max_distance = dist.iter().copied().max().unwrap_or(0);

    let threshold = 2;
    let mut blurred = vec![0u16; dist.len()];

    for z in 0..chf.depth {
        for x in 0..chf.width {
            let idx = chf.cell_index_of(x, z);
            let base = chf.cell_index[idx] as usize;
            let count = chf.cell_count[idx] as usize;
            for s in 0..count {
                let span_i = base + s;
                let d = dist[span_i];
                if d <= threshold {
                    blurred[span_i] = d;
                    continue;
                }

                let mut acc = d;
                let span = chf.spans[span_i];
                for dir in 0..4 {
                    match neighbour(chf, x, z, &span, dir) {
                        None => acc += d * 2,
                        Some((nx, nz, ni)) => {
                            acc += dist[ni];
                            let next_dir = (dir + 1) & 0x3;
                            let nspan = chf.spans[ni];
                            match neighbour(chf, nx, nz, &nspan, next_dir) {
                                None => acc += d,
                                Some((_, _, di)) => acc += dist[di],
                            }
                        }
                    }
                }
                blurred[span_i] = (acc + 5) / 9;
            }
        }
    }

    chf.dist = blurred;
}

#[derive(Clone, Copy)]
struct LevelStackEntry {
    x: u16,
    z: u16,
    span: u32,
    active: bool,
}

/// Watershed region growing. Seeds regions level-by-level from
/// `max_distance` down to 0 (step 2), then expands every remaining
/// unregioned span, then merges/discards small regions.
pub fn build_regions(chf: &mut CompactHeightfield, cfg: &BakerConfig) -> Result<()> {
    const NB_STACKS: usize = 8;
    let expand_iters = 4 + cfg.walkable_radius_voxels() * 2;

    let span_count = chf.spans.len();
    let mut regions = vec![0u16; span_count];
    let mut distances = chf.dist.clone();

    let mut level_stacks: [Vec<LevelStackEntry>; NB_STACKS] = Default::default();
    for stack in &mut level_stacks {
        stack.reserve(256);
    }
    let mut flood_stack = Vec::with_capacity(256);

    let mut region_id: u16 = 1;
    let mut level = (chf.max_distance + 1) & !1u16;

    let mut stack_id: i32 = -1;
    while level > 0 {
        level = level.saturating_sub(2);
        stack_id = (stack_id + 1) & (NB_STACKS as i32 - 1);

        if stack_id == 0 {
            sort_cells_by_level(chf, level, &regions, &mut level_stacks);
        } else {
            let (prev, rest) = level_stacks.split_at_mut(stack_id as usize);
            let prev_stack = &prev[stack_id as usize - 1];
            let next_stack = &mut rest[0];
            next_stack.clear();
            for entry in prev_stack.iter() {
                let span_i = (chf.cell_index[chf.cell_index_of(entry.x as usize, entry.z as usize)]
                    as u32)
                    + entry.span;
                if regions[span_i as usize] == 0 {
                    next_stack.push(*entry);
                }
            }
        }

        expand_regions(
            chf,
            expand_iters,
            &mut regions,
            &mut distances,
            &mut level_stacks[stack_id as usize],
        );

        let entries: Vec<LevelStackEntry> = level_stacks[stack_id as usize].clone();
        for entry in entries {
            let cell = chf.cell_index[chf.cell_index_of(entry.x as usize, entry.z as usize)] as u32;
            let span_i = cell + entry.span;
            if entry.active
                && regions[span_i as usize] == 0
                && flood_region(
                    chf,
                    entry.x,
                    entry.z,
                    entry.span,
                    level,
                    region_id,
                    &mut regions,
                    &mut distances,
                    &mut flood_stack,
                )
            {
                if region_id == u16::MAX {
                    return Err(NavError::RegionIdOverflow);
                }
                region_id += 1;
            }
        }
    }

    expand_regions_until_stable(chf, &mut regions, &mut distances);

    merge_regions(chf, &mut regions, &mut region_id, cfg);

    for i in 0..span_count {
        chf.spans[i].reg = regions[i];
    }
    chf.max_regions = region_id;
    Ok(())
}

fn sort_cells_by_level(
    chf: &CompactHeightfield,
    start_level: u16,
    regions: &[u16],
    stacks: &mut [Vec<LevelStackEntry>],
) {
    let start_level = (start_level >> 1) as i32;
    for stack in stacks.iter_mut() {
        stack.clear();
    }

    for z in 0..chf.depth {
        for x in 0..chf.width {
            let idx = chf.cell_index_of(x, z);
            let base = chf.cell_index[idx] as usize;
            let count = chf.cell_count[idx] as usize;
            for s in 0..count {
                let span_i = base + s;
                if regions[span_i] != 0 {
                    continue;
                }
                let level = (chf.dist[span_i] >> 1) as i32;
                let stack_id = (start_level - level).max(0);
                if stack_id as usize >= stacks.len() {
                    continue;
                }
                stacks[stack_id as usize].push(LevelStackEntry {
                    x: x as u16,
                    z: z as u16,
                    span: s as u32,
                    active: true,
                });
            }
        }
    }
}

fn expand_regions(
    chf: &CompactHeightfield,
    max_iterations: u16,
    regions: &mut [u16],
    distances: &mut [u16],
    level_stack: &mut [LevelStackEntry],
) {
    for entry in level_stack.iter_mut() {
        let span_i = chf.cell_index[chf.cell_index_of(entry.x as usize, entry.z as usize)] as usize
            + entry.span as usize;
        if regions[span_i] != 0 {
            entry.active = false;
        }
    }

    let mut iter = 0u16;
    loop {
        let mut failed = 0;
        let mut dirty = Vec::new();

        for entry in level_stack.iter_mut() {
            if !entry.active {
                failed += 1;
                continue;
            }

            let x = entry.x as usize;
            let z = entry.z as usize;
            let span_i =
                chf.cell_index[chf.cell_index_of(x, z)] as usize + entry.span as usize;
            let span = chf.spans[span_i];

            let mut new_region = regions[span_i];
            let mut best_dist = u16::MAX;
            for dir in 0..4 {
                if let Some((_, _, ni)) = neighbour(chf, x, z, &span, dir) {
                    let other_region = regions[ni];
                    let other_dist = distances[ni];
                    if other_region > 0 && other_dist.saturating_add(2) < best_dist {
                        new_region = other_region;
                        best_dist = other_dist.saturating_add(2);
                    }
                }
            }

            if new_region != 0 {
                entry.active = false;
                dirty.push((span_i, new_region, best_dist));
            } else {
                failed += 1;
            }
        }

        for (span_i, region, dist) in dirty {
            regions[span_i] = region;
            distances[span_i] = dist;
        }

        if failed == level_stack.len() {
            break;
        }
        iter += 1;
        if iter >= max_iterations {
            break;
        }
    }
}

fn expand_regions_until_stable(
    chf: &CompactHeightfield,
    regions: &mut [u16],
    distances: &mut [u16],
) {
    let mut stack = Vec::new();
    for z in 0..chf.depth {
        for x in 0..chf.width {
            let idx = chf.cell_index_of(x, z);
            let base = chf.cell_index[idx] as usize;
            let count = chf.cell_count[idx] as usize;
            for s in 0..count {
                if regions[base + s] == 0 {
                    stack.push(LevelStackEntry { x: x as u16, z: z as u16, span: s as u32, active: true });
                }
            }
        }
    }

    let mut failed = 0;
    while failed < stack.len() {
        failed = 0;
        let mut dirty = Vec::new();

        for entry in stack.iter_mut() {
            if !entry.active {
                failed += 1;
                continue;
            }
            let x = entry.x as usize;
            let z = entry.z as usize;
            let span_i =
                chf.cell_index[chf.cell_index_of(x, z)] as usize + entry.span as usize;
            let span = chf.spans[span_i];

            let mut new_region = regions[span_i];
            let mut best_dist = u16::MAX;
            for dir in 0..4 {
                if let Some((_, _, ni)) = neighbour(chf, x, z, &span, dir) {
                    let other_region = regions[ni];
                    let other_dist = distances[ni];
                    if other_region > 0 && other_dist.saturating_add(2) < best_dist {
                        new_region = other_region;
                        best_dist = other_dist.saturating_add(2);
                    }
                }
            }

            if new_region != 0 {
                entry.active = false;
                dirty.push((span_i, new_region, best_dist));
            } else {
                failed += 1;
            }
        }

        for (span_i, region, dist) in dirty {
            regions[span_i] = region;
            distances[span_i] = dist;
        }
    }
}

fn flood_region(
    chf: &CompactHeightfield,
    x0: u16,
    z0: u16,
    span0: u32,
    level: u16,
    region_id: u16,
    regions: &mut [u16],
    distances: &mut [u16],
    stack: &mut Vec<LevelStackEntry>,
) -> bool {
    stack.clear();
    stack.push(LevelStackEntry { x: x0, z: z0, span: span0, active: true });

    let start_span =
        chf.cell_index[chf.cell_index_of(x0 as usize, z0 as usize)] as usize + span0 as usize;
    regions[start_span] = region_id;
    distances[start_span] = 0;

    let mut count = 0;

    while let Some(entry) = stack.pop() {
        let x = entry.x as usize;
        let z = entry.z as usize;
        let span_i = chf.cell_index[chf.cell_index_of(x, z)] as usize + entry.span as usize;
        let span = chf.spans[span_i];

        let mut adjacent_region = 0u16;
        for dir in 0..4 {
            if let Some((nx, nz, ni)) = neighbour(chf, x, z, &span, dir) {
                if regions[ni] != 0 {
                    adjacent_region = regions[ni];
                    break;
                }
                let next_dir = (dir + 1) & 0x3;
                let nspan = chf.spans[ni];
                if let Some((_, _, di)) = neighbour(chf, nx, nz, &nspan, next_dir) {
                    if regions[di] != 0 {
                        adjacent_region = regions[di];
                        break;
                    }
                }
            }
        }

        if adjacent_region != 0 {
            regions[span_i] = 0;
            continue;
        }

        count += 1;

        for dir in 0..4 {
            if let Some((nx, nz, ni)) = neighbour(chf, x, z, &span, dir) {
                if chf.dist[ni] >= level && regions[ni] == 0 {
                    regions[ni] = region_id;
                    distances[ni] = 0;
                    stack.push(LevelStackEntry { x: nx as u16, z: nz as u16, span: (ni - chf.cell_index[chf.cell_index_of(nx, nz)] as usize) as u32, active: true });
                }
            }
        }
    }

    count > 0
}

struct Region {
    id: u16,
    span_count: usize,
    visited: bool,
    overlap: bool,
    touches_border: bool,
    floors: Vec<u16>,
    connections: Vec<u16>,
}

fn merge_regions(chf: &CompactHeightfield, regions: &mut [u16], max_region_id: &mut u16, cfg: &BakerConfig) {
    let mut region_data: Vec<Region> = (0..*max_region_id)
        .map(|i| Region {
            id: i,
            span_count: 0,
            visited: false,
            overlap: false,
            touches_border: false,
            floors: Vec::new(),
            connections: Vec::new(),
        })
        .collect();

    for z in 0..chf.depth {
        for x in 0..chf.width {
            let idx = chf.cell_index_of(x, z);
            let base = chf.cell_index[idx] as usize;
            let count = chf.cell_count[idx] as usize;
            let touches_border = x == 0 || z == 0 || x == chf.width - 1 || z == chf.depth - 1;

            for s in 0..count {
                let span_i = base + s;
                let region_id = regions[span_i];
                if region_id == 0 || region_id >= *max_region_id {
                    continue;
                }

                let region = &mut region_data[region_id as usize];
                region.span_count += 1;
                region.touches_border |= touches_border;

                for other in 0..count {
                    if other == s {
                        continue;
                    }
                    let other_i = base + other;
                    let other_region = regions[other_i];
                    if other_region == 0 || other_region >= *max_region_id {
                        continue;
                    }
                    if other_region == region_id {
                        region.overlap = true;
                    }
                    if !region.floors.contains(&other_region) {
                        region.floors.push(other_region);
                    }
                }

                if !region.connections.is_empty() {
                    continue;
                }

                let span = chf.spans[span_i];
                let mut start_dir = None;
                for dir in 0..4 {
                    let solid = match neighbour(chf, x, z, &span, dir) {
                        Some((_, _, ni)) => regions[ni] != region_id,
                        None => true,
                    };
                    if solid {
                        start_dir = Some(dir);
                        break;
                    }
                }

                if let Some(dir) = start_dir {
                    walk_contour_regions(chf, x, z, s, dir, regions, region_id, &mut region_data[region_id as usize].connections);
                }
            }
        }
    }

    // Delete undersized regions that don't reach the grid border.
    let mut stack = Vec::new();
    let mut trace = Vec::new();
    for i in 0..*max_region_id {
        {
            let region = &region_data[i as usize];
            if region.id == 0 || region.span_count == 0 || region.visited || region.touches_border {
                continue;
            }
        }
        region_data[i as usize].visited = true;

        let mut connects_to_border = false;
        stack.clear();
        trace.clear();
        stack.push(i);
        let mut total = 0;

        while let Some(r) = stack.pop() {
            trace.push(r);
            let conns = region_data[r as usize].connections.clone();
            total += region_data[r as usize].span_count;

            for c in conns {
                if c == 0 {
                    connects_to_border = true;
                    continue;
                }
                let other = &mut region_data[c as usize];
                if other.visited {
                    continue;
                }
                if other.touches_border {
                    connects_to_border = true;
                    continue;
                }
                other.visited = true;
                stack.push(c);
            }
        }

        if total < cfg.region_min_size as usize && !connects_to_border {
            for r in &trace {
                region_data[*r as usize].span_count = 0;
                region_data[*r as usize].id = 0;
            }
        }
    }

    // Greedily merge small regions with their smallest mergeable neighbor.
    loop {
        let mut merged_any = false;

        for i in 0..region_data.len() {
            {
                let region = &region_data[i];
                if region.id == 0 || region.span_count == 0 || region.touches_border || region.overlap {
                    continue;
                }
                if region.span_count > cfg.region_merge_size as usize {
                    continue;
                }
            }

            let mut best: Option<(usize, usize)> = None; // (other_idx, span_count)
            {
                let region = &region_data[i];
                for &c in &region.connections {
                    if c == 0 {
                        continue;
                    }
                    let other = &region_data[c as usize];
                    if other.id == 0 || other.touches_border || other.overlap {
                        continue;
                    }
                    let mergeable = !other.connections.contains(&region.id)
                        && !region.floors.contains(&other.id)
                        && !region.connections.contains(&other.id)
                        && !other.floors.contains(&region.id);
                    if mergeable && best.map_or(true, |(_, sc)| other.span_count < sc) {
                        best = Some((c as usize, other.span_count));
                    }
                }
            }

            if let Some((other, _)) = best {
                let old_id = region_data[i].id;
                let new_id = region_data[other].id;

                let b_span_count = region_data[other].span_count;
                let b_floors = region_data[other].floors.clone();
                let b_connections = region_data[other].connections.clone();

                region_data[other].span_count = 0;
                region_data[other].connections.clear();

                region_data[i].span_count += b_span_count;
                for conn in b_connections {
                    if conn != old_id && !region_data[i].connections.contains(&conn) {
                        region_data[i].connections.push(conn);
                    }
                }
                region_data[i].connections.retain(|&c| c != new_id as u16);
                for f in b_floors {
                    if !region_data[i].floors.contains(&f) {
                        region_data[i].floors.push(f);
                    }
                }

                for region in region_data.iter_mut() {
                    if region.id == 0 || region.touches_border {
                        continue;
                    }
                    if region.id == old_id {
                        region.id = new_id;
                    }
                    for conn in region.connections.iter_mut() {
                        if *conn == old_id {
                            *conn = new_id;
                        }
                    }
                }

                merged_any = true;
            }
        }

        if !merged_any {
            break;
        }
    }

    // Compact ids.
    let mut remap = vec![0u16; region_data.len()];
    let mut next_id = 0u16;
    for region in region_data.iter() {
        if region.id == 0 {
            continue;
        }
        if remap[region.id as usize] == 0 {
            next_id += 1;
            remap[region.id as usize] = next_id;
        }
    }

    for span_region in regions.iter_mut() {
        if *span_region == 0 || *span_region >= *max_region_id {
            *span_region = 0;
            continue;
        }
        let mapped_id = region_data[*span_region as usize].id;
        *span_region = remap.get(mapped_id as usize).copied().unwrap_or(0);
    }

    *max_region_id = next_id + 1;
    debug!(regions = next_id, "watershed region merge complete");
}

fn walk_contour_regions(
    chf: &CompactHeightfield,
    mut x: usize,
    mut z: usize,
    mut span_idx: usize,
    mut dir: usize,
    regions: &[u16],
    own_region: u16,
    out: &mut Vec<u16>,
) {
    let start = (x, z, span_idx, dir);
    let mut current_region = 0u16;

    let base = chf.cell_index[chf.cell_index_of(x, z)] as usize;
    let span = chf.spans[base + span_idx];
    if let Some((_, _, ni)) = neighbour(chf, x, z, &span, dir) {
        current_region = regions[ni];
    }
    out.push(current_region);

    let mut guard = 0;
    loop {
        guard += 1;
        if guard > 4 * chf.spans.len().max(1) {
            warn!("walk_contour_regions exceeded guard iterations, aborting");
            break;
        }

        let base = chf.cell_index[chf.cell_index_of(x, z)] as usize;
        let span = chf.spans[base + span_idx];

        let solid = match neighbour(chf, x, z, &span, dir) {
            Some((_, _, ni)) => regions[ni] != own_region,
            None => true,
        };

        if solid {
            let r = match neighbour(chf, x, z, &span, dir) {
                Some((_, _, ni)) => regions[ni],
                None => 0,
            };
            if r != current_region {
                current_region = r;
                out.push(r);
            }
            dir = (dir + 1) & 0x3;
        } else if let Some((nx, nz, ni)) = neighbour(chf, x, z, &span, dir) {
            let nbase = chf.cell_index[chf.cell_index_of(nx, nz)] as usize;
            x = nx;
            z = nz;
            span_idx = ni - nbase;
            dir = (dir + 3) & 0x3;
        } else {
            break;
        }

        if (x, z, span_idx, dir) == start {
            break;
        }
    }

    let mut i = 0;
    while out.len() > 2 && i < out.len() {
        let next = (i + 1) % out.len();
        if out[i] == out[next] {
            out.remove(next);
        } else {
            i += 1;
        }
    }
}
