//! Fixed-capacity spatial batches

use xengine_core::{IntRect, ScalarRect};

/// An `N x N` grid over a world rectangle. Each cell holds up to
/// `capacity` instance indices; inserts into a full cell are rejected.
#[derive(Clone, Debug)]
pub struct BatchGrid {
    size: u32,
    area: ScalarRect,
    capacity: usize,
    cells: Vec<Vec<usize>>,
    rejected: usize,
}

impl BatchGrid {
    pub fn new(size: u32, area: ScalarRect, capacity: usize) -> Self {
        Self {
            size,
            area,
            capacity,
            cells: vec![Vec::new(); (size * size) as usize],
            rejected: 0,
        }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn area(&self) -> ScalarRect {
        self.area
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Inserts refused because the target cell was full
    pub fn rejected(&self) -> usize {
        self.rejected
    }

    pub fn len(&self) -> usize {
        self.cells.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(Vec::is_empty)
    }

    /// The whole grid as a cell rectangle
    pub fn full_region(&self) -> IntRect {
        IntRect::new(0, 0, self.size as i32, self.size as i32)
    }

    /// Cell containing a world position. Positions outside the area clamp
    /// to the border cells.
    pub fn cell_of(&self, x: f32, z: f32) -> (u32, u32) {
        let last = self.size as i32 - 1;
        let cw = self.area.width() / self.size as f32;
        let ch = self.area.height() / self.size as f32;
        let cx = ((x - self.area.left) / cw).floor() as i32;
        let cz = ((z - self.area.top) / ch).floor() as i32;
        (cx.clamp(0, last) as u32, cz.clamp(0, last) as u32)
    }

    /// World rectangle covered by a cell
    pub fn cell_rect(&self, cx: u32, cz: u32) -> ScalarRect {
        let cw = self.area.width() / self.size as f32;
        let ch = self.area.height() / self.size as f32;
        let left = self.area.left + cx as f32 * cw;
        let top = self.area.top + cz as f32 * ch;
        ScalarRect::new(left, top, left + cw, top + ch)
    }

    fn slot(&self, cx: u32, cz: u32) -> usize {
        (cz * self.size + cx) as usize
    }

    pub fn cell(&self, cx: u32, cz: u32) -> &[usize] {
        &self.cells[self.slot(cx, cz)]
    }

    /// Add `index` to the cell at (x, z). `None` if that cell is full.
    pub fn insert(&mut self, index: usize, x: f32, z: f32) -> Option<(u32, u32)> {
        let (cx, cz) = self.cell_of(x, z);
        let slot = self.slot(cx, cz);
        if self.cells[slot].len() >= self.capacity {
            self.rejected += 1;
            log::debug!(
                "batch ({}, {}) is full ({} instances), dropping instance {}",
                cx,
                cz,
                self.capacity,
                index
            );
            return None;
        }
        self.cells[slot].push(index);
        Some((cx, cz))
    }

    pub fn remove(&mut self, index: usize, cell: (u32, u32)) -> bool {
        let slot = self.slot(cell.0, cell.1);
        let members = &mut self.cells[slot];
        match members.iter().position(|&i| i == index) {
            Some(pos) => {
                members.swap_remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn is_full(&self, cell: (u32, u32)) -> bool {
        self.cell(cell.0, cell.1).len() >= self.capacity
    }

    pub fn clear(&mut self) {
        self.cells.iter_mut().for_each(Vec::clear);
        self.rejected = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> BatchGrid {
        BatchGrid::new(4, ScalarRect::new(0.0, 0.0, 100.0, 100.0), 2)
    }

    #[test]
    fn test_cell_lookup_clamps() {
        let g = grid();
        assert_eq!(g.cell_of(0.0, 0.0), (0, 0));
        assert_eq!(g.cell_of(24.9, 25.0), (0, 1));
        assert_eq!(g.cell_of(99.9, 50.0), (3, 2));
        assert_eq!(g.cell_of(-10.0, 500.0), (0, 3));
        assert_eq!(g.cell_rect(1, 2), ScalarRect::new(25.0, 50.0, 50.0, 75.0));
    }

    #[test]
    fn test_capacity_rejects_and_counts() {
        let mut g = grid();
        assert_eq!(g.insert(0, 1.0, 1.0), Some((0, 0)));
        assert_eq!(g.insert(1, 2.0, 2.0), Some((0, 0)));
        assert_eq!(g.insert(2, 3.0, 3.0), None);
        assert_eq!(g.rejected(), 1);
        assert_eq!(g.len(), 2);
        assert!(g.is_full((0, 0)));

        assert!(g.remove(0, (0, 0)));
        assert!(!g.remove(0, (0, 0)));
        assert_eq!(g.cell(0, 0), &[1]);
    }
}
