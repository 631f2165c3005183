//! Toroidal occupancy grid with one lock per cell.
//!
//! Any operation touching two cells acquires their locks in row-major order,
//! which is the lexicographic `(row, col)` order. Because every caller follows
//! the same total order, two agents swapping into each other's cells cannot
//! form a circular wait.

use crate::position::{Extent, Offset, Position};
use crate::registry::AgentId;
use parking_lot::Mutex;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GridError {
    #[error("grid dimensions must be positive (got {height}x{width})")]
    EmptyGrid { height: usize, width: usize },
    #[error("scope {scope} does not fit a {height}x{width} grid (needs 2*scope+1 cells per axis)")]
    ScopeTooLarge {
        scope: usize,
        height: usize,
        width: usize,
    },
}

pub struct Grid {
    extent: Extent,
    perception_scope: usize,
    cells: Box<[Mutex<Option<AgentId>>]>,
}

impl Grid {
    pub fn new(extent: Extent, perception_scope: usize) -> Self {
        Self::try_new(extent, perception_scope).unwrap_or_else(|e| panic!("{e}"))
    }

    pub fn try_new(extent: Extent, perception_scope: usize) -> Result<Self, GridError> {
        if extent.cell_count() == 0 {
            return Err(GridError::EmptyGrid {
                height: extent.height,
                width: extent.width,
            });
        }
        if !extent.supports_scope(perception_scope) {
            return Err(GridError::ScopeTooLarge {
                scope: perception_scope,
                height: extent.height,
                width: extent.width,
            });
        }
        let cells = (0..extent.cell_count())
            .map(|_| Mutex::new(None))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Ok(Self {
            extent,
            perception_scope,
            cells,
        })
    }

    pub fn extent(&self) -> Extent {
        self.extent
    }

    /// Largest scope accepted by [`Grid::neighborhood`].
    pub fn perception_scope(&self) -> usize {
        self.perception_scope
    }

    fn cell(&self, pos: Position) -> &Mutex<Option<AgentId>> {
        assert!(
            self.extent.contains(pos),
            "position {pos} outside {}x{} grid",
            self.extent.height,
            self.extent.width
        );
        &self.cells[self.extent.index(pos)]
    }

    pub fn occupant(&self, pos: Position) -> Option<AgentId> {
        *self.cell(pos).lock()
    }

    /// Run `f` on a cell's occupant while holding that cell's lock.
    pub fn inspect<R>(&self, pos: Position, f: impl FnOnce(Option<AgentId>) -> R) -> R {
        let guard = self.cell(pos).lock();
        f(*guard)
    }

    /// Occupy `pos` iff it is empty.
    pub fn place(&self, pos: Position, id: AgentId) -> bool {
        let mut cell = self.cell(pos).lock();
        if cell.is_some() {
            return false;
        }
        *cell = Some(id);
        true
    }

    /// Clear `pos` unconditionally, returning the previous occupant.
    pub fn vacate(&self, pos: Position) -> Option<AgentId> {
        self.cell(pos).lock().take()
    }

    /// Clear `pos` only if `id` is the occupant.
    pub fn vacate_if(&self, pos: Position, id: AgentId) -> bool {
        let mut cell = self.cell(pos).lock();
        if *cell == Some(id) {
            *cell = None;
            true
        } else {
            false
        }
    }

    pub fn move_occupant(&self, from: Position, to: Position) -> bool {
        self.move_occupant_with(from, to, |_| {})
    }

    /// Move the occupant of `from` into an empty `to`.
    ///
    /// Both cell locks are held for the whole operation, and `on_commit` runs
    /// before either is released. Fails without mutation when `from` is empty,
    /// `to` is occupied, or the two cells coincide.
    pub fn move_occupant_with(
        &self,
        from: Position,
        to: Position,
        on_commit: impl FnOnce(AgentId),
    ) -> bool {
        let from_idx = self.extent.index(from);
        let to_idx = self.extent.index(to);
        if from_idx == to_idx {
            return false;
        }
        let (mut src, mut dst) = if from_idx < to_idx {
            let src = self.cell(from).lock();
            let dst = self.cell(to).lock();
            (src, dst)
        } else {
            let dst = self.cell(to).lock();
            let src = self.cell(from).lock();
            (src, dst)
        };
        let Some(id) = *src else {
            return false;
        };
        if dst.is_some() {
            return false;
        }
        *src = None;
        *dst = Some(id);
        on_commit(id);
        true
    }

    /// Read the `(2·scope+1)²` window centered on `center`, wrapping both axes.
    ///
    /// Cells are locked one at a time; each value was valid at some instant
    /// during the call, but the window as a whole is not a consistent snapshot.
    pub fn neighborhood(&self, center: Position, scope: usize) -> Neighborhood {
        assert!(
            scope <= self.perception_scope,
            "scope {scope} exceeds the grid's perception scope {}",
            self.perception_scope
        );
        let s = scope as isize;
        let side = 2 * scope + 1;
        let mut cells = Vec::with_capacity(side * side);
        for d_row in -s..=s {
            for d_col in -s..=s {
                let pos = self.extent.offset(center, Offset::new(d_row, d_col));
                cells.push(self.occupant(pos));
            }
        }
        Neighborhood {
            center,
            scope,
            cells,
        }
    }

    /// Empty cells among the distinct 8-neighbors of `center`.
    pub fn free_neighbors(&self, center: Position) -> Vec<Position> {
        self.extent
            .moore_neighbors(center)
            .into_iter()
            .filter(|&pos| self.occupant(pos).is_none())
            .collect()
    }

    pub fn occupied_count(&self) -> usize {
        self.cells.iter().filter(|c| c.lock().is_some()).count()
    }

    /// Row-major map: 0 for empty cells, `id + 1` for occupied ones.
    pub fn occupancy_map(&self) -> Vec<u64> {
        self.cells
            .iter()
            .map(|c| c.lock().map_or(0, |id| id.0 + 1))
            .collect()
    }
}

/// What an agent perceives: occupants of a square window around its cell.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Neighborhood {
    center: Position,
    scope: usize,
    cells: Vec<Option<AgentId>>,
}

impl Neighborhood {
    pub fn center(&self) -> Position {
        self.center
    }

    pub fn scope(&self) -> usize {
        self.scope
    }

    pub fn side(&self) -> usize {
        2 * self.scope + 1
    }

    /// Occupant at a relative offset, `None` when outside the window or empty.
    pub fn get(&self, offset: Offset) -> Option<AgentId> {
        let s = self.scope as isize;
        if offset.d_row.abs() > s || offset.d_col.abs() > s {
            return None;
        }
        let row = (offset.d_row + s) as usize;
        let col = (offset.d_col + s) as usize;
        self.cells[row * self.side() + col]
    }

    pub fn is_free(&self, offset: Offset) -> bool {
        self.get(offset).is_none()
    }

    /// Row-major cells of the window.
    pub fn cells(&self) -> &[Option<AgentId>] {
        &self.cells
    }

    pub fn occupied(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }
}
