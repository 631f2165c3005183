use serde::{Deserialize, Serialize};
use std::fmt;

/// Cell coordinate on the toroidal grid. Always reduced into `[0, height) × [0, width)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub row: usize,
    pub col: usize,
}

impl Position {
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// Signed displacement, applied with toroidal wrapping by [`Extent::offset`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Offset {
    pub d_row: isize,
    pub d_col: isize,
}

impl Offset {
    pub const fn new(d_row: isize, d_col: isize) -> Self {
        Self { d_row, d_col }
    }
}

/// The four cardinal moves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    North,
    South,
    East,
    West,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::North,
        Direction::South,
        Direction::East,
        Direction::West,
    ];

    /// Rows grow southwards, columns grow eastwards.
    pub const fn offset(self) -> Offset {
        match self {
            Direction::North => Offset::new(-1, 0),
            Direction::South => Offset::new(1, 0),
            Direction::East => Offset::new(0, 1),
            Direction::West => Offset::new(0, -1),
        }
    }

    pub const fn opposite(self) -> Direction {
        match self {
            Direction::North => Direction::South,
            Direction::South => Direction::North,
            Direction::East => Direction::West,
            Direction::West => Direction::East,
        }
    }
}

/// Offsets of the eight cells surrounding a position.
pub const MOORE_OFFSETS: [Offset; 8] = [
    Offset::new(-1, -1),
    Offset::new(-1, 0),
    Offset::new(-1, 1),
    Offset::new(0, -1),
    Offset::new(0, 1),
    Offset::new(1, -1),
    Offset::new(1, 0),
    Offset::new(1, 1),
];

/// Grid dimensions; owns all toroidal arithmetic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extent {
    pub height: usize,
    pub width: usize,
}

impl Extent {
    pub const fn new(height: usize, width: usize) -> Self {
        Self { height, width }
    }

    pub const fn cell_count(&self) -> usize {
        self.height * self.width
    }

    pub fn contains(&self, pos: Position) -> bool {
        pos.row < self.height && pos.col < self.width
    }

    /// Reduce an arbitrary signed coordinate onto the torus.
    pub fn wrap(&self, row: isize, col: isize) -> Position {
        debug_assert!(self.height > 0 && self.width > 0, "wrap on an empty extent");
        Position {
            row: row.rem_euclid(self.height as isize) as usize,
            col: col.rem_euclid(self.width as isize) as usize,
        }
    }

    pub fn offset(&self, pos: Position, offset: Offset) -> Position {
        self.wrap(
            pos.row as isize + offset.d_row,
            pos.col as isize + offset.d_col,
        )
    }

    pub fn step(&self, pos: Position, direction: Direction) -> Position {
        self.offset(pos, direction.offset())
    }

    /// Distinct wrapped cells of the 8-neighborhood, excluding `pos` itself.
    /// Fewer than eight on grids narrower than three cells along an axis.
    pub fn moore_neighbors(&self, pos: Position) -> Vec<Position> {
        let mut out = Vec::with_capacity(MOORE_OFFSETS.len());
        for offset in MOORE_OFFSETS {
            let candidate = self.offset(pos, offset);
            if candidate != pos && !out.contains(&candidate) {
                out.push(candidate);
            }
        }
        out
    }

    /// Row-major index of an in-bounds position.
    pub fn index(&self, pos: Position) -> usize {
        debug_assert!(self.contains(pos), "{pos} outside {}x{}", self.height, self.width);
        pos.row * self.width + pos.col
    }

    pub fn position_of(&self, index: usize) -> Position {
        Position::new(index / self.width, index % self.width)
    }

    /// Largest scope whose window `(2·scope+1)²` fits on both axes.
    pub fn max_scope(&self) -> Option<usize> {
        let smallest = self.height.min(self.width);
        (smallest > 0).then(|| (smallest - 1) / 2)
    }

    pub fn supports_scope(&self, scope: usize) -> bool {
        self.max_scope().is_some_and(|max| scope <= max)
    }
}
