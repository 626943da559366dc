//! Board occupancy: one optional stone per playable cell.

use std::fmt;

use crate::position::{Colour, GRID_SIZE, Position};
use crate::topology::{CELL_COUNT, Topology};

/// Occupancy of every playable cell. Stones have no identity; they are
/// addressed only by the cell they stand on.
#[derive(Debug, Clone)]
pub struct Board {
    topology: &'static Topology,
    cells: [Option<Colour>; CELL_COUNT],
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

impl Board {
    /// An empty board on the standard topology.
    #[must_use]
    pub fn new() -> Self {
        Self {
            topology: Topology::standard(),
            cells: [None; CELL_COUNT],
        }
    }

    pub fn topology(&self) -> &'static Topology {
        self.topology
    }

    /// The stone on `pos`. `None` for empty or unplayable cells.
    #[must_use]
    pub fn get(&self, pos: Position) -> Option<Colour> {
        self.topology.index_of(pos).and_then(|i| self.cells[i])
    }

    #[must_use]
    pub fn is_empty_cell(&self, pos: Position) -> bool {
        self.topology.is_valid(pos) && self.get(pos).is_none()
    }

    /// Put a stone on `pos`. Returns false for unplayable cells.
    pub(crate) fn set(&mut self, pos: Position, colour: Colour) -> bool {
        match self.topology.index_of(pos) {
            Some(i) => {
                self.cells[i] = Some(colour);
                true
            }
            None => false,
        }
    }

    /// Take the stone off `pos`, returning what was there.
    pub(crate) fn clear(&mut self, pos: Position) -> Option<Colour> {
        let i = self.topology.index_of(pos)?;
        self.cells[i].take()
    }

    /// Every cell holding a stone of `colour`.
    pub fn stones(&self, colour: Colour) -> impl Iterator<Item = Position> + '_ {
        self.topology
            .positions()
            .iter()
            .zip(self.cells.iter())
            .filter(move |(_, c)| **c == Some(colour))
            .map(|(p, _)| *p)
    }

    #[must_use]
    pub fn count(&self, colour: Colour) -> usize {
        self.cells.iter().filter(|c| **c == Some(colour)).count()
    }

    /// Whether the stone on `pos` is part of a completed line of its colour.
    /// Recomputed from the current occupancy every time.
    #[must_use]
    pub fn in_mill(&self, pos: Position) -> bool {
        let Some(colour) = self.get(pos) else {
            return false;
        };
        self.topology
            .mills_through(pos)
            .any(|mill| mill.cells().iter().all(|c| self.get(*c) == Some(colour)))
    }

    /// Whether every stone of `colour` on the board stands in a mill.
    #[must_use]
    pub fn all_in_mills(&self, colour: Colour) -> bool {
        self.stones(colour).all(|p| self.in_mill(p))
    }

    /// Whether any stone of `colour` can go anywhere. A jumping colour can
    /// reach every empty cell; otherwise only adjacent empty cells count.
    #[must_use]
    pub fn has_legal_move(&self, colour: Colour, jumping: bool) -> bool {
        if jumping {
            let has_stone = self.stones(colour).next().is_some();
            let has_space = self.cells.iter().any(Option::is_none);
            return has_stone && has_space;
        }
        self.stones(colour).any(|from| {
            self.topology
                .neighbours(from)
                .iter()
                .any(|to| self.get(*to).is_none())
        })
    }
}

impl fmt::Display for Board {
    /// Grid rendering: `W`/`B` for stones, `.` for empty intersections and a
    /// blank for cells that are not on the board.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for y in 0..GRID_SIZE {
            for x in 0..GRID_SIZE {
                let pos = Position::new(x, y);
                let glyph = if !self.topology.is_valid(pos) {
                    ' '
                } else {
                    match self.get(pos) {
                        Some(Colour::White) => 'W',
                        Some(Colour::Black) => 'B',
                        None => '.',
                    }
                };
                if x > 0 {
                    f.write_str(" ")?;
                }
                write!(f, "{glyph}")?;
            }
            if y + 1 < GRID_SIZE {
                writeln!(f)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board_with(stones: &[(i8, i8, Colour)]) -> Board {
        let mut board = Board::new();
        for &(x, y, c) in stones {
            assert!(board.set(Position::new(x, y), c));
        }
        board
    }

    #[test]
    fn test_new_board_is_empty() {
        let board = Board::new();
        assert_eq!(board.count(Colour::White), 0);
        assert_eq!(board.count(Colour::Black), 0);
        assert!(board.is_empty_cell(Position::new(0, 0)));
        assert!(!board.is_empty_cell(Position::new(3, 3)));
    }

    #[test]
    fn test_set_rejects_invalid_cell() {
        let mut board = Board::new();
        assert!(!board.set(Position::new(1, 0), Colour::White));
        assert_eq!(board.count(Colour::White), 0);
    }

    #[test]
    fn test_clear_returns_previous() {
        let mut board = board_with(&[(0, 0, Colour::Black)]);
        assert_eq!(board.clear(Position::new(0, 0)), Some(Colour::Black));
        assert_eq!(board.clear(Position::new(0, 0)), None);
    }

    #[test]
    fn test_in_mill_detects_complete_line() {
        let board = board_with(&[
            (0, 0, Colour::White),
            (3, 0, Colour::White),
            (6, 0, Colour::White),
            (0, 3, Colour::White),
        ]);
        assert!(board.in_mill(Position::new(0, 0)));
        assert!(board.in_mill(Position::new(6, 0)));
        assert!(!board.in_mill(Position::new(0, 3)));
        assert!(!board.all_in_mills(Colour::White));
    }

    #[test]
    fn test_mixed_line_is_not_a_mill() {
        let board = board_with(&[
            (0, 0, Colour::White),
            (3, 0, Colour::Black),
            (6, 0, Colour::White),
        ]);
        assert!(!board.in_mill(Position::new(0, 0)));
    }

    #[test]
    fn test_mill_is_recomputed_after_clear() {
        let mut board = board_with(&[
            (0, 0, Colour::White),
            (3, 0, Colour::White),
            (6, 0, Colour::White),
        ]);
        assert!(board.all_in_mills(Colour::White));
        board.clear(Position::new(3, 0));
        assert!(!board.in_mill(Position::new(0, 0)));
    }

    #[test]
    fn test_blocked_colour_has_no_move() {
        // White corner (0,0) boxed in by black on both neighbours.
        let board = board_with(&[
            (0, 0, Colour::White),
            (3, 0, Colour::Black),
            (0, 3, Colour::Black),
        ]);
        assert!(!board.has_legal_move(Colour::White, false));
        assert!(board.has_legal_move(Colour::White, true));
        assert!(board.has_legal_move(Colour::Black, false));
    }

    #[test]
    fn test_display_marks_stones() {
        let board = board_with(&[(0, 0, Colour::White), (6, 6, Colour::Black)]);
        let text = board.to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), GRID_SIZE as usize);
        assert!(lines[0].starts_with('W'));
        assert!(lines[6].ends_with('B'));
        assert_eq!(lines[3].chars().nth(6), Some(' '));
    }
}
