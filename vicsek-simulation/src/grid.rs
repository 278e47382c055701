//! Cell-list accelerator for neighbor queries.
//!
//! The box is cut into `nslots` cells per axis. Each entity is written into its
//! home cell and every adjacent cell (3^D copies), so the neighborhood of any
//! point is a single cell lookup. Cell indices wrap modulo `nslots` on every
//! axis: the grid topology is periodic regardless of the Geometry in use.
//!
//! Rebuild: two passes (count, then scatter into packed runs), no per-cell Vec.

use vicsek_core::{SimError, SimResult, Vector, DIM};

/// Number of cells touched by one entity: 3^D.
const STENCIL: usize = 3usize.pow(DIM as u32);

/// Snapshot of entity slots bucketed by cell. Rebuild once per step, before
/// any query of that step.
#[derive(Debug, Clone)]
pub struct Grid {
    nslots: usize,
    box_extent: f64,
    cell_size: f64,
    /// `counts[c]` = occupancy of cell c.
    counts: Vec<usize>,
    /// `offsets[c]` = start of cell c's run in `data`.
    offsets: Vec<usize>,
    /// Entity slots, packed cell after cell.
    data: Vec<usize>,
}

impl Grid {
    /// Smallest accepted number of slots per axis. With 3 or fewer the
    /// stencil wraps onto itself and a cell would list an entity twice.
    pub const MIN_SLOTS: usize = 4;

    /// `max_entities` only sizes the snapshot buffer up front.
    pub fn new(nslots: usize, box_extent: f64, max_entities: usize) -> SimResult<Self> {
        if nslots < Self::MIN_SLOTS {
            return Err(SimError::GridTooFewSlots { nslots });
        }
        if !(box_extent > 0.0 && box_extent.is_finite()) {
            return Err(SimError::invalid(format!("grid box extent must be positive, got {}", box_extent)));
        }
        let cells = nslots.pow(DIM as u32);
        log::debug!(
            "Creating grid with {} slots/axis ({} cells), cell size {}",
            nslots,
            cells,
            box_extent / nslots as f64
        );
        Ok(Self {
            nslots,
            box_extent,
            cell_size: box_extent / nslots as f64,
            counts: vec![0; cells],
            offsets: vec![0; cells],
            data: Vec::with_capacity(max_entities * STENCIL),
        })
    }

    pub fn nslots(&self) -> usize {
        self.nslots
    }

    pub fn box_extent(&self) -> f64 {
        self.box_extent
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    pub fn cell_count(&self) -> usize {
        self.counts.len()
    }

    /// Number of snapshots stored in `cell`.
    pub fn occupancy(&self, cell: usize) -> usize {
        self.counts[cell]
    }

    #[inline]
    fn home_index(&self, point: Vector) -> [i64; DIM] {
        let mut index = [0i64; DIM];
        for (axis, slot) in index.iter_mut().enumerate() {
            *slot = (point[axis] / self.cell_size).floor() as i64;
        }
        index
    }

    /// Row-major serial index; each axis wraps modulo `nslots`.
    #[inline]
    fn serial(&self, index: [i64; DIM]) -> usize {
        let n = self.nslots as i64;
        index
            .iter()
            .fold(0usize, |acc, &i| acc * self.nslots + i.rem_euclid(n) as usize)
    }

    /// Serial index of the cell containing `point`.
    #[inline]
    pub fn cell_of(&self, point: Vector) -> usize {
        self.serial(self.home_index(point))
    }

    /// Calls `visit` with the home cell of `point` and all its neighbors.
    fn for_each_adjacent<F>(&self, point: Vector, mut visit: F)
    where
        F: FnMut(usize),
    {
        let home = self.home_index(point);
        for code in 0..STENCIL {
            let mut index = home;
            let mut rest = code;
            for axis_index in index.iter_mut() {
                *axis_index += (rest % 3) as i64 - 1;
                rest /= 3;
            }
            visit(self.serial(index));
        }
    }

    /// Rebuilds the grid from scratch for the first `positions.len()` slots.
    pub fn fill(&mut self, positions: &[Vector]) {
        // ── Pass 1: count ──────────────────────────────────────────────────
        let mut counts = std::mem::take(&mut self.counts);
        counts.iter_mut().for_each(|c| *c = 0);
        for &p in positions {
            self.for_each_adjacent(p, |cell| counts[cell] += 1);
        }

        // ── Prefix sum → offsets ───────────────────────────────────────────
        let mut running = 0usize;
        for (offset, &count) in self.offsets.iter_mut().zip(counts.iter()) {
            *offset = running;
            running += count;
        }
        self.data.clear();
        self.data.resize(running, 0);

        // ── Pass 2: scatter ────────────────────────────────────────────────
        counts.iter_mut().for_each(|c| *c = 0); // reuse as cursor
        let mut data = std::mem::take(&mut self.data);
        for (slot, &p) in positions.iter().enumerate() {
            self.for_each_adjacent(p, |cell| {
                data[self.offsets[cell] + counts[cell]] = slot;
                counts[cell] += 1;
            });
        }
        self.data = data;
        self.counts = counts;
    }

    /// Candidate slots near `point`: the snapshot list of its home cell.
    pub fn neighborhood(&self, point: Vector) -> &[usize] {
        let cell = self.cell_of(point);
        let start = self.offsets[cell];
        &self.data[start..start + self.counts[cell]]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vicsek_core::planar;

    #[test]
    fn too_few_slots_is_rejected() {
        for nslots in 0..=3 {
            assert_eq!(
                Grid::new(nslots, 10.0, 8).unwrap_err(),
                SimError::GridTooFewSlots { nslots }
            );
        }
        assert!(Grid::new(4, 10.0, 8).is_ok());
        assert!(Grid::new(5, 0.0, 8).is_err());
    }

    #[test]
    fn each_entity_is_replicated_into_stencil() {
        let mut grid = Grid::new(5, 10.0, 3).unwrap();
        let positions = vec![planar(1.0, 1.0), planar(5.0, 5.0), planar(9.0, 9.0)];
        grid.fill(&positions);
        let total: usize = (0..grid.cell_count()).map(|c| grid.occupancy(c)).sum();
        assert_eq!(total, positions.len() * STENCIL);
    }

    #[test]
    fn neighborhood_contains_the_point_itself() {
        let mut grid = Grid::new(6, 12.0, 4).unwrap();
        let positions = vec![planar(0.5, 0.5), planar(6.0, 11.9), planar(3.3, 7.7), planar(11.9, 0.1)];
        grid.fill(&positions);
        for (slot, &p) in positions.iter().enumerate() {
            assert!(grid.neighborhood(p).contains(&slot));
        }
    }

    #[cfg(not(feature = "dim3"))]
    #[test]
    fn neighborhood_wraps_across_box_edges() {
        let mut grid = Grid::new(5, 10.0, 2).unwrap();
        // Opposite corners are adjacent through the periodic topology.
        let positions = vec![planar(0.5, 0.5), planar(9.5, 9.5)];
        grid.fill(&positions);
        let near_origin = grid.neighborhood(positions[0]);
        assert!(near_origin.contains(&1));
        // The centre cell is not adjacent to either corner.
        assert!(grid.neighborhood(planar(5.0, 5.0)).is_empty());
    }

    #[test]
    fn rebuild_forgets_previous_positions() {
        let mut grid = Grid::new(4, 8.0, 1).unwrap();
        grid.fill(&[planar(1.0, 1.0)]);
        assert_eq!(grid.neighborhood(planar(1.0, 1.0)), &[0]);
        grid.fill(&[planar(5.0, 5.0)]);
        assert!(grid.neighborhood(planar(1.0, 1.0)).is_empty());
        assert_eq!(grid.neighborhood(planar(5.0, 5.0)), &[0]);
    }
}
