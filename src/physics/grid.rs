//! Single-occupancy grid over the toroidal world.

/// Index of a particle inside the world's group arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParticleHandle {
    pub group: usize,
    pub index: usize,
}

/// Maps a coordinate that may have drifted anywhere onto `[0, size)`.
pub fn wrap(value: f64, size: usize) -> usize {
    let size_f = size as f64;
    // floor first so -0.5 lands on size - 1, not 0
    value.floor().rem_euclid(size_f) as usize % size
}

#[derive(Debug, Clone)]
pub struct OccupancyGrid {
    cells: Vec<Option<ParticleHandle>>,
    width: usize,
    height: usize,
}

impl OccupancyGrid {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            cells: vec![None; width * height],
            width,
            height,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    fn index(&self, x: usize, y: usize) -> usize {
        y * self.width + x
    }

    pub fn get(&self, x: usize, y: usize) -> Option<ParticleHandle> {
        self.cells[self.index(x, y)]
    }

    pub fn is_free(&self, x: usize, y: usize) -> bool {
        self.get(x, y).is_none()
    }

    pub fn set(&mut self, x: usize, y: usize, handle: ParticleHandle) {
        let idx = self.index(x, y);
        self.cells[idx] = Some(handle);
    }

    pub fn clear_cell(&mut self, x: usize, y: usize) {
        let idx = self.index(x, y);
        self.cells[idx] = None;
    }

    pub fn clear(&mut self) {
        self.cells.iter_mut().for_each(|cell| *cell = None);
    }

    pub fn occupied(&self) -> usize {
        self.cells.iter().filter(|cell| cell.is_some()).count()
    }

    pub fn is_full(&self) -> bool {
        self.cells.iter().all(Option::is_some)
    }

    /// Iterates `(x, y, handle)` for every occupied cell in row-major order.
    pub fn iter_occupied(&self) -> impl Iterator<Item = (usize, usize, ParticleHandle)> + '_ {
        let width = self.width;
        self.cells
            .iter()
            .enumerate()
            .filter_map(move |(i, cell)| cell.map(|handle| (i % width, i / width, handle)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_stays_in_range() {
        for &v in &[-1e6, -1200.5, -10.0, -0.5, -0.0, 0.0, 0.99, 9.5, 10.0, 25.1, 1e7] {
            let w = wrap(v, 10);
            assert!(w < 10, "wrap({}) = {}", v, w);
        }
        assert_eq!(wrap(-0.5, 10), 9);
        assert_eq!(wrap(-10.0, 10), 0);
        assert_eq!(wrap(10.0, 10), 0);
        assert_eq!(wrap(23.7, 10), 3);
    }

    #[test]
    fn wrap_is_idempotent() {
        for i in -50..50 {
            let v = i as f64 * 3.7;
            let once = wrap(v, 7);
            assert_eq!(wrap(once as f64, 7), once);
        }
    }

    #[test]
    fn set_and_clear_track_occupancy() {
        let mut grid = OccupancyGrid::new(3, 2);
        let handle = ParticleHandle { group: 1, index: 4 };
        grid.set(2, 1, handle);
        assert_eq!(grid.get(2, 1), Some(handle));
        assert!(!grid.is_free(2, 1));
        assert_eq!(grid.occupied(), 1);
        assert_eq!(grid.iter_occupied().collect::<Vec<_>>(), vec![(2, 1, handle)]);

        grid.clear_cell(2, 1);
        assert!(grid.is_free(2, 1));
        assert_eq!(grid.occupied(), 0);
    }

    #[test]
    fn full_grid_is_detected() {
        let mut grid = OccupancyGrid::new(2, 1);
        grid.set(0, 0, ParticleHandle { group: 0, index: 0 });
        assert!(!grid.is_full());
        grid.set(1, 0, ParticleHandle { group: 0, index: 1 });
        assert!(grid.is_full());
        grid.clear();
        assert_eq!(grid.occupied(), 0);
    }
}
