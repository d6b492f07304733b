//! Component H: compact heightfield layout and 4-connected neighbor links.
//!
//! Grounded on the teacher's `OpenTile`/`OpenSpan`/`link_neighbours`
//! (`heightfields.rs`), re-expressed with the packed `CompactSpan.con`
//! bitfield `spec.md` §3/§9 calls for instead of the teacher's
//! `[Option<u16>; 4]` neighbor array.

use glam::Vec3;
use tracing::debug;

use crate::config::BakerConfig;
use crate::heightfield::Heightfield;

/// Sentinel stored in a 6-bit neighbor slot when there is no connection.
pub const NOT_CONNECTED: u8 = 0x3F;

/// The four cardinal directions walked in index order `0..4`, matching the
/// teacher's `(-1,0) (0,1) (1,0) (0,-1)` rotation convention used by contour
/// tracing (`dir` rotates clockwise via `(dir + 1) & 0x3`).
pub const DIRS: [(i32, i32); 4] = [(-1, 0), (0, 1), (1, 0), (0, -1)];

/// One post-pipeline walkable span. `y` is the floor height (in cell-height
/// units) and `h` is the free space above it; `con` packs four 6-bit
/// neighbor-local-indices, one per [`DIRS`] entry.
#[derive(Debug, Clone, Copy)]
pub struct CompactSpan {
    pub y: u16,
    pub h: u16,
    pub reg: u16,
    con: u32,
}

impl CompactSpan {
    fn mask(dir: usize) -> u32 {
        0x3F << (6 * dir)
    }

    pub fn get_con(&self, dir: usize) -> u8 {
        ((self.con >> (6 * dir)) & 0x3F) as u8
    }

    pub fn set_con(&mut self, dir: usize, value: u8) {
        self.con = (self.con & !Self::mask(dir)) | (((value as u32) & 0x3F) << (6 * dir));
    }

    pub fn is_connected(&self, dir: usize) -> bool {
        self.get_con(dir) != NOT_CONNECTED as u8
    }
}

/// Flattened, linkable view of the walkable volume produced by voxelization
/// and span filtering. One [`CompactSpan`] per surviving (walkable) span.
pub struct CompactHeightfield {
    pub width: usize,
    pub depth: usize,
    pub cell_size: f32,
    pub cell_height: f32,
    pub origin: Vec3,
    pub spans: Vec<CompactSpan>,
    /// First span index for each cell, parallel to `cell_count`.
    pub cell_index: Vec<u32>,
    pub cell_count: Vec<u16>,
    pub area: Vec<u8>,
    pub dist: Vec<u16>,
    pub max_distance: u16,
    pub max_regions: u16,
}

/// Area id for a span whose triangle was classified walkable. There is only
/// one non-null area in this crate (the baker has no multi-area input), so
/// `WALKABLE_AREA` stands in for Recast's per-triangle area ids.
pub const WALKABLE_AREA: u8 = 63;
pub const NULL_AREA: u8 = 0;

impl CompactHeightfield {
    pub fn cell_index_of(&self, x: usize, z: usize) -> usize {
        x + z * self.width
    }
}

/// Collapses the walkable spans of `hf` into a [`CompactHeightfield`] and
/// links each span to its 4-connected neighbors, exactly as the teacher's
/// `build_open_heightfield_tile` + `link_neighbours` do, modulo the packed
/// `con` representation.
pub fn build_compact_heightfield(hf: &Heightfield, cfg: &BakerConfig) -> CompactHeightfield {
    let mut cell_index = vec![0u32; hf.width * hf.depth];
    let mut cell_count = vec![0u16; hf.width * hf.depth];
    let mut spans = Vec::new();

    for z in 0..hf.depth {
        for x in 0..hf.width {
            let idx = hf.column_index(x, z);
            cell_index[idx] = spans.len() as u32;
            let col = &hf.columns[idx];

            let mut count = 0u16;
            for (i, span) in col.iter().enumerate() {
                if !span.walkable {
                    continue;
                }
                let next_lo = col.get(i + 1).map(|s| s.lo).unwrap_or(u16::MAX);
                let free = next_lo.saturating_sub(span.hi);
                if free < cfg.walkable_height_voxels() && next_lo != u16::MAX {
                    continue;
                }

                spans.push(CompactSpan {
                    y: span.hi,
                    h: free,
                    reg: 0,
                    con: 0xFFFFFFFF,
                });
                count += 1;
            }
            cell_count[idx] = count;
        }
    }

    let span_count = spans.len();
    let mut chf = CompactHeightfield {
        width: hf.width,
        depth: hf.depth,
        cell_size: hf.cell_size,
        cell_height: hf.cell_height,
        origin: hf.origin,
        spans,
        cell_index,
        cell_count,
        area: vec![WALKABLE_AREA; span_count],
        dist: vec![0; span_count],
        max_distance: 0,
        max_regions: 0,
    };

    link_neighbours(&mut chf, cfg);
    chf
}

fn link_neighbours(chf: &mut CompactHeightfield, cfg: &BakerConfig) {
    let climb = cfg.walkable_climb_voxels();
    let min_height = cfg.walkable_height_voxels();

    for z in 0..chf.depth {
        for x in 0..chf.width {
            let idx = chf.cell_index_of(x, z);
            let base = chf.cell_index[idx] as usize;
            let count = chf.cell_count[idx] as usize;

            for s in 0..count {
                let span_i = base + s;

                for (dir, (dx, dz)) in DIRS.iter().enumerate() {
                    let nx = x as i32 + dx;
                    let nz = z as i32 + dz;
                    if nx < 0 || nz < 0 || nx as usize >= chf.width || nz as usize >= chf.depth {
                        chf.spans[span_i].set_con(dir, NOT_CONNECTED);
                        continue;
                    }

                    let nidx = chf.cell_index_of(nx as usize, nz as usize);
                    let nbase = chf.cell_index[nidx] as usize;
                    let ncount = chf.cell_count[nidx] as usize;

                    let mut found = None;
                    for k in 0..ncount {
                        let cand = &chf.spans[nbase + k];
                        let span = &chf.spans[span_i];
                        let top = span.y.max(cand.y);
                        let bottom = (span.y + span.h).min(cand.y + cand.h);
                        let gap = bottom.saturating_sub(top);
                        if span.y.abs_diff(cand.y) <= climb && gap >= min_height {
                            found = Some(k as u8);
                            break;
                        }
                    }

                    match found {
                        Some(k) if k < NOT_CONNECTED => chf.spans[span_i].set_con(dir, k),
                        _ => {
                            if ncount > 62 {
                                debug!(cell = idx, "too many layers in neighbor column, dropping link");
                            }
                            chf.spans[span_i].set_con(dir, NOT_CONNECTED);
                        }
                    }
                }
            }
        }
    }
}

/// Index of the neighbor cell in `dir` from `cell_index`, assuming it is
/// in-bounds (callers check via `con != NOT_CONNECTED` first).
pub fn neighbour_cell_index(chf: &CompactHeightfield, x: usize, z: usize, dir: usize) -> usize {
    let (dx, dz) = DIRS[dir];
    let nx = (x as i32 + dx) as usize;
    let nz = (z as i32 + dz) as usize;
    chf.cell_index_of(nx, nz)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heightfield::Span;

    fn field() -> Heightfield {
        Heightfield {
            width: 3,
            depth: 3,
            cell_size: 0.3,
            cell_height: 0.2,
            origin: Vec3::ZERO,
            columns: (0..9)
                .map(|_| vec![Span { lo: 0, hi: 10, walkable: true }])
                .collect(),
        }
    }

    #[test]
    fn interior_cell_links_all_four_neighbors() {
        let cfg = BakerConfig::default();
        let hf = field();
        let chf = build_compact_heightfield(&hf, &cfg);
        let center = chf.cell_index[chf.cell_index_of(1, 1)] as usize;
        let span = &chf.spans[center];
        for dir in 0..4 {
            assert!(span.is_connected(dir));
        }
    }

    #[test]
    fn border_cell_has_missing_links() {
        let cfg = BakerConfig::default();
        let hf = field();
        let chf = build_compact_heightfield(&hf, &cfg);
        let corner = chf.cell_index[chf.cell_index_of(0, 0)] as usize;
        let span = &chf.spans[corner];
        let connected = (0..4).filter(|&d| span.is_connected(d)).count();
        assert_eq!(connected, 2);
    }

    #[test]
    fn con_accessors_round_trip() {
        let mut span = CompactSpan { y: 0, h: 0, reg: 0, con: 0 };
        span.set_con(0, 5);
        span.set_con(3, NOT_CONNECTED);
        assert_eq!(span.get_con(0), 5);
        assert_eq!(span.get_con(3), NOT_CONNECTED);
        assert_eq!(span.get_con(1), 0);
    }
}
