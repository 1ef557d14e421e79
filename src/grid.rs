use fiber_common::Vec2;

/// Uniform hash grid over a set of fiber centers.
///
/// Built with a counting sort: per-cell counts, a prefix sum of cell starts
/// and a list of fiber indices ordered by cell. With a cell size at least as
/// large as the interaction range, every interacting pair lies in the 3x3
/// block around either member.
#[derive(Debug)]
pub struct CellGrid {
    origin: Vec2,
    inv_cell_size: f64,
    dim_y: usize,
    dim_z: usize,
    cell_starts: Vec<usize>,
    cell_counts: Vec<usize>,
    cell_fiber_indices: Vec<usize>,
}

// Caps the number of cells when positions are spread far apart.
const MAX_CELLS_PER_AXIS: usize = 4096;

impl CellGrid {
    /// Builds the grid over `positions` with cells of side at least `cell_size`.
    pub fn build(positions: &[Vec2], cell_size: f64) -> Self {
        let mut lo = Vec2::new(f64::INFINITY, f64::INFINITY);
        let mut hi = Vec2::new(f64::NEG_INFINITY, f64::NEG_INFINITY);
        for p in positions {
            lo.y = lo.y.min(p.y);
            lo.z = lo.z.min(p.z);
            hi.y = hi.y.max(p.y);
            hi.z = hi.z.max(p.z);
        }
        if positions.is_empty() || !lo.is_finite() || !hi.is_finite() {
            lo = Vec2::zero();
            hi = Vec2::zero();
        }

        let extent = (hi.y - lo.y).max(hi.z - lo.z);
        let mut cell_size = if cell_size > 1e-12 { cell_size } else { extent.max(1.0) };
        if extent / cell_size > MAX_CELLS_PER_AXIS as f64 {
            cell_size = extent / MAX_CELLS_PER_AXIS as f64;
        }
        let inv_cell_size = 1.0 / cell_size;
        let dim_y = (((hi.y - lo.y) * inv_cell_size).floor() as usize + 1).max(1);
        let dim_z = (((hi.z - lo.z) * inv_cell_size).floor() as usize + 1).max(1);
        let num_cells = dim_y * dim_z;

        let mut grid = CellGrid {
            origin: lo,
            inv_cell_size,
            dim_y,
            dim_z,
            cell_starts: vec![0; num_cells],
            cell_counts: vec![0; num_cells],
            cell_fiber_indices: vec![0; positions.len()],
        };

        // Phase 1: count fibers per cell.
        let cell_of: Vec<usize> = positions.iter().map(|&p| grid.cell_index(p)).collect();
        for &c in &cell_of {
            grid.cell_counts[c] += 1;
        }

        // Phase 2: prefix sum of cell starts.
        let mut total = 0;
        for (start, &count) in grid.cell_starts.iter_mut().zip(&grid.cell_counts) {
            *start = total;
            total += count;
        }

        // Phase 3: scatter fiber indices into their cell blocks.
        let mut write_offsets = vec![0usize; num_cells];
        for (fiber_idx, &c) in cell_of.iter().enumerate() {
            let slot = grid.cell_starts[c] + write_offsets[c];
            grid.cell_fiber_indices[slot] = fiber_idx;
            write_offsets[c] += 1;
        }
        grid
    }

    fn cell_coords(&self, pos: Vec2) -> (i64, i64) {
        (
            ((pos.y - self.origin.y) * self.inv_cell_size).floor() as i64,
            ((pos.z - self.origin.z) * self.inv_cell_size).floor() as i64,
        )
    }

    #[inline(always)]
    fn cell_index(&self, pos: Vec2) -> usize {
        let (gy, gz) = self.cell_coords(pos);
        let cy = gy.clamp(0, self.dim_y as i64 - 1) as usize;
        let cz = gz.clamp(0, self.dim_z as i64 - 1) as usize;
        cz * self.dim_y + cy
    }

    /// Calls `f` for every fiber index in the 3x3 cell block around `pos`,
    /// `exclude` aside. Stops early when `f` returns `false`.
    #[inline(always)]
    pub fn for_each_candidate<F>(&self, pos: Vec2, exclude: Option<usize>, mut f: F)
    where
        F: FnMut(usize) -> bool,
    {
        let (gy, gz) = self.cell_coords(pos);
        for dz in -1..=1 {
            for dy in -1..=1 {
                let cy = gy + dy;
                let cz = gz + dz;
                if cy < 0 || cz < 0 || cy >= self.dim_y as i64 || cz >= self.dim_z as i64 {
                    continue;
                }
                let c = cz as usize * self.dim_y + cy as usize;
                let start = self.cell_starts[c];
                let end = start + self.cell_counts[c];
                for &other in &self.cell_fiber_indices[start..end] {
                    if Some(other) == exclude {
                        continue;
                    }
                    if !f(other) {
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_close_neighbors_only() {
        let positions = vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(0.5, 0.5),
            Vec2::new(10.0, 10.0),
            Vec2::new(-0.8, 0.2),
        ];
        let grid = CellGrid::build(&positions, 1.0);
        let mut found = Vec::new();
        grid.for_each_candidate(positions[0], Some(0), |j| {
            if positions[0].distance(positions[j]) < 1.0 {
                found.push(j);
            }
            true
        });
        found.sort_unstable();
        assert_eq!(found, vec![1, 3]);
    }

    #[test]
    fn every_fiber_is_indexed_once() {
        let positions: Vec<Vec2> = (0..50).map(|i| Vec2::new(i as f64 * 0.37, (i % 7) as f64)).collect();
        let grid = CellGrid::build(&positions, 2.0);
        let mut seen = grid.cell_fiber_indices.clone();
        seen.sort_unstable();
        assert_eq!(seen, (0..50).collect::<Vec<_>>());
    }
}
