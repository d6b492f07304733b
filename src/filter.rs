//! Component G: walkability filters applied to the raw heightfield before
//! compaction — low-hanging obstacles, ledges, and low ceilings.
//!
//! Grounded on the teacher's span-filtering pass (same three filters, same
//! call order) and `spec.md` §4.G, adapted to the single-grid [`Heightfield`].

use crate::config::BakerConfig;
use crate::heightfield::Heightfield;

const DIRS: [(i32, i32); 4] = [(0, -1), (1, 0), (0, 1), (-1, 0)];

/// A non-walkable span immediately above a walkable span, whose top
/// difference is within `walkable_climb`, inherits walkability — it's a
/// low-hanging obstacle an agent can walk under after stepping past it.
pub fn filter_low_hanging_obstacles(hf: &mut Heightfield, cfg: &BakerConfig) {
    let climb = cfg.walkable_climb_voxels();

    for col in hf.columns.iter_mut() {
        for i in 1..col.len() {
            let prev_walkable = col[i - 1].walkable;
            let prev_hi = col[i - 1].hi;
            let span = &mut col[i];
            if !span.walkable && prev_walkable && span.hi.abs_diff(prev_hi) <= climb {
                span.walkable = true;
            }
        }
    }
}

/// Clears spans whose accessible-neighbor tops differ from this span's top
/// by more than `walkable_climb`, or whose lowest/highest neighbor top gap
/// exceeds that threshold — these are ledges, unsafe to stand on.
pub fn filter_ledge_spans(hf: &mut Heightfield, cfg: &BakerConfig) {
    let climb = cfg.walkable_climb_voxels() as i32;
    let width = hf.width;
    let depth = hf.depth;

    let snapshot: Vec<Vec<crate::heightfield::Span>> = hf.columns.clone_from_columns();

    for z in 0..depth {
        for x in 0..width {
            let idx = hf.column_index(x, z);
            for span_idx in 0..snapshot[idx].len() {
                let span = snapshot[idx][span_idx];
                if !span.walkable {
                    continue;
                }

                let floor = span.hi as i32;
                let mut min_neighbor = i32::MAX;
                let mut max_neighbor = i32::MIN;

                for (dx, dz) in DIRS {
                    let nx = x as i32 + dx;
                    let nz = z as i32 + dz;
                    if nx < 0 || nz < 0 || nx as usize >= width || nz as usize >= depth {
                        min_neighbor = min_neighbor.min(-climb - 1);
                        continue;
                    }
                    let nidx = nx as usize + nz as usize * width;
                    let neighbor_col = &snapshot[nidx];

                    let mut best = i32::MIN;
                    for ns in neighbor_col {
                        if (ns.hi as i32 - floor).abs() <= climb * 4 {
                            best = best.max(ns.hi as i32 - floor);
                        }
                    }
                    if best == i32::MIN {
                        min_neighbor = min_neighbor.min(-climb - 1);
                    } else {
                        min_neighbor = min_neighbor.min(best);
                        max_neighbor = max_neighbor.max(best);
                    }
                }

                if min_neighbor < -climb || (max_neighbor - min_neighbor) > climb {
                    hf.columns[idx][span_idx].walkable = false;
                }
            }
        }
    }
}

/// Clears spans whose free height above them (distance to the next span's
/// bottom) is below `walkable_height`.
pub fn filter_low_ceilings(hf: &mut Heightfield, cfg: &BakerConfig) {
    let min_height = cfg.walkable_height_voxels();

    for col in hf.columns.iter_mut() {
        let len = col.len();
        for i in 0..len {
            let free = if i + 1 < len {
                col[i + 1].lo.saturating_sub(col[i].hi)
            } else {
                u16::MAX
            };
            if free < min_height {
                col[i].walkable = false;
            }
        }
    }
}

/// Small helper trait so the ledge filter can snapshot columns without
/// fighting the borrow checker while mutating the same grid.
trait CloneColumns {
    fn clone_from_columns(&self) -> Vec<Vec<crate::heightfield::Span>>;
}

impl CloneColumns for Vec<Vec<crate::heightfield::Span>> {
    fn clone_from_columns(&self) -> Vec<Vec<crate::heightfield::Span>> {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heightfield::Span;

    fn single_span_field(walkable: bool) -> Heightfield {
        Heightfield {
            width: 3,
            depth: 3,
            cell_size: 0.3,
            cell_height: 0.2,
            origin: glam::Vec3::ZERO,
            columns: (0..9)
                .map(|_| vec![Span { lo: 0, hi: 1, walkable }])
                .collect(),
        }
    }

    #[test]
    fn low_ceiling_clears_cramped_span() {
        let cfg = BakerConfig::default().with_cell_size(0.3, 1.0);
        let mut hf = single_span_field(true);
        hf.columns[4].push(Span { lo: 2, hi: 3, walkable: true });
        filter_low_ceilings(&mut hf, &cfg);
        assert!(!hf.columns[4][0].walkable);
    }

    #[test]
    fn low_hanging_inherits_walkability() {
        let cfg = BakerConfig::default();
        let mut hf = single_span_field(true);
        hf.columns[4].push(Span { lo: 2, hi: 2, walkable: false });
        filter_low_hanging_obstacles(&mut hf, &cfg);
        assert!(hf.columns[4][1].walkable);
    }
}
