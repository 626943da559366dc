//! Board coordinates and stone colours.
//!
//! A [`Position`] is a raw `(x, y)` pair on the 7×7 grid. Only 24 of the 49
//! cells are playable; whether a pair names a real intersection is decided by
//! [`Position::is_valid`], which folds both axes around the midline so the
//! test is the same in all four quadrants.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Side length of the square grid the board is drawn on.
pub const GRID_SIZE: i8 = 7;

/// Index of the middle row/column. The cell `(MID, MID)` is the empty centre.
pub const MID: i8 = GRID_SIZE / 2;

// ---------------------------------------------------------------------------
// Colour
// ---------------------------------------------------------------------------

/// The two sides of a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Colour {
    /// The white stones.
    White,
    /// The black stones.
    Black,
}

impl Colour {
    /// Both colours, white first.
    pub const ALL: [Colour; 2] = [Colour::White, Colour::Black];

    /// The other side.
    #[must_use]
    pub fn opponent(self) -> Colour {
        match self {
            Colour::White => Colour::Black,
            Colour::Black => Colour::White,
        }
    }

    /// Dense index for per-colour arrays.
    pub(crate) fn index(self) -> usize {
        match self {
            Colour::White => 0,
            Colour::Black => 1,
        }
    }
}

impl fmt::Display for Colour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Colour::White => f.write_str("white"),
            Colour::Black => f.write_str("black"),
        }
    }
}

// ---------------------------------------------------------------------------
// Position
// ---------------------------------------------------------------------------

/// A cell on the 7×7 grid. May or may not be a playable intersection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    /// Column, 0 at the left edge.
    pub x: i8,
    /// Row, 0 at the top edge.
    pub y: i8,
}

impl Position {
    /// Create a position without checking it.
    #[must_use]
    pub const fn new(x: i8, y: i8) -> Self {
        Self { x, y }
    }

    /// Build a position from wire coordinates, rejecting anything that does
    /// not fit the grid type.
    #[must_use]
    pub fn from_wire(x: i32, y: i32) -> Option<Self> {
        let x = i8::try_from(x).ok()?;
        let y = i8::try_from(y).ok()?;
        Some(Self { x, y })
    }

    /// Whether both coordinates lie on the grid at all.
    #[must_use]
    pub fn in_bounds(self) -> bool {
        (0..GRID_SIZE).contains(&self.x) && (0..GRID_SIZE).contains(&self.y)
    }

    /// Whether this cell is one of the 24 playable intersections.
    ///
    /// Each axis is folded onto `0..=3`; in the folded quadrant the corner
    /// and edge-midpoints of the three squares survive, the cells on the
    /// skipped diagonals and the centre do not.
    #[must_use]
    pub fn is_valid(self) -> bool {
        if !self.in_bounds() {
            return false;
        }
        let fx = fold(self.x);
        let fy = fold(self.y);
        !matches!(
            (fx, fy),
            (0, 1) | (0, 2) | (1, 0) | (1, 2) | (2, 0) | (2, 1) | (3, 3)
        )
    }

    /// Whether this is the centre cell, which neither holds a stone nor
    /// connects anything.
    #[must_use]
    pub fn is_centre(self) -> bool {
        self.x == MID && self.y == MID
    }

    /// The cell one step away in `dir`, if still on the grid.
    #[must_use]
    pub fn step(self, dir: Direction) -> Option<Position> {
        let (dx, dy) = dir.delta();
        let next = Position::new(self.x.checked_add(dx)?, self.y.checked_add(dy)?);
        next.in_bounds().then_some(next)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

fn fold(a: i8) -> i8 {
    if a > MID { GRID_SIZE - 1 - a } else { a }
}

// ---------------------------------------------------------------------------
// Direction
// ---------------------------------------------------------------------------

/// The four axis directions a connecting line can run in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Decreasing y.
    North,
    /// Increasing y.
    South,
    /// Increasing x.
    East,
    /// Decreasing x.
    West,
}

impl Direction {
    /// All four directions.
    pub const ALL: [Direction; 4] = [
        Direction::North,
        Direction::South,
        Direction::East,
        Direction::West,
    ];

    fn delta(self) -> (i8, i8) {
        match self {
            Direction::North => (0, -1),
            Direction::South => (0, 1),
            Direction::East => (1, 0),
            Direction::West => (-1, 0),
        }
    }
}
