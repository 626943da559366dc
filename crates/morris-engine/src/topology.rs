//! Static board topology: playable cells, adjacency, and the mill lines.
//!
//! The topology never changes, so it is computed once per process and shared
//! read-only by every board via [`Topology::standard`]. Cells are addressed by
//! a dense index (`0..24`, row-major over the valid cells) so boards can store
//! occupancy in a flat array.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use crate::position::{Direction, GRID_SIZE, MID, Position};

/// Number of playable intersections.
pub const CELL_COUNT: usize = 24;

/// Number of straight three-in-a-row lines on the standard board.
pub const MILL_COUNT: usize = 16;

static STANDARD: LazyLock<Topology> = LazyLock::new(Topology::build);

// ---------------------------------------------------------------------------
// Mill
// ---------------------------------------------------------------------------

/// Three cells on one straight connecting line. Stored sorted so equal lines
/// compare equal regardless of the end they were discovered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Mill {
    cells: [Position; 3],
}

impl Mill {
    fn new(mut cells: [Position; 3]) -> Self {
        cells.sort();
        Self { cells }
    }

    /// The three cells of the line.
    #[must_use]
    pub fn cells(&self) -> &[Position; 3] {
        &self.cells
    }

    /// Whether `pos` is one of the three cells.
    #[must_use]
    pub fn contains(&self, pos: Position) -> bool {
        self.cells.contains(&pos)
    }
}

// ---------------------------------------------------------------------------
// Topology
// ---------------------------------------------------------------------------

/// Precomputed cell set, neighbour lists and mill lines.
#[derive(Debug)]
pub struct Topology {
    positions: Vec<Position>,
    index: [Option<usize>; (GRID_SIZE * GRID_SIZE) as usize],
    neighbours: Vec<Vec<Position>>,
    mills: Vec<Mill>,
    mills_by_cell: Vec<Vec<usize>>,
}

impl Topology {
    /// The shared standard board topology.
    pub fn standard() -> &'static Topology {
        &STANDARD
    }

    fn build() -> Self {
        let positions: Vec<Position> = (0..GRID_SIZE)
            .flat_map(|y| (0..GRID_SIZE).map(move |x| Position::new(x, y)))
            .filter(|p| p.is_valid())
            .collect();

        let mut index = [None; (GRID_SIZE * GRID_SIZE) as usize];
        for (i, p) in positions.iter().enumerate() {
            index[grid_slot(*p)] = Some(i);
        }

        let neighbours = positions
            .iter()
            .map(|p| {
                Direction::ALL
                    .iter()
                    .filter_map(|dir| scan(*p, *dir))
                    .collect()
            })
            .collect();

        let mills: Vec<Mill> = enumerate_mills().into_iter().collect();

        let mut mills_by_cell = vec![Vec::new(); positions.len()];
        for (mi, mill) in mills.iter().enumerate() {
            for cell in mill.cells() {
                if let Some(ci) = index[grid_slot(*cell)] {
                    mills_by_cell[ci].push(mi);
                }
            }
        }

        Self {
            positions,
            index,
            neighbours,
            mills,
            mills_by_cell,
        }
    }

    /// All playable cells in row-major order.
    #[must_use]
    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    /// Dense index of a playable cell, `None` for anything else.
    #[must_use]
    pub fn index_of(&self, pos: Position) -> Option<usize> {
        if !pos.in_bounds() {
            return None;
        }
        self.index[grid_slot(pos)]
    }

    /// Whether `pos` is a playable cell.
    #[must_use]
    pub fn is_valid(&self, pos: Position) -> bool {
        self.index_of(pos).is_some()
    }

    /// Cells one straight hop away from `pos`. Empty for invalid cells.
    #[must_use]
    pub fn neighbours(&self, pos: Position) -> &[Position] {
        match self.index_of(pos) {
            Some(i) => &self.neighbours[i],
            None => &[],
        }
    }

    /// Whether `a` and `b` are joined by a single hop.
    #[must_use]
    pub fn are_adjacent(&self, a: Position, b: Position) -> bool {
        self.neighbours(a).contains(&b)
    }

    /// Every mill line on the board.
    #[must_use]
    pub fn mills(&self) -> &[Mill] {
        &self.mills
    }

    /// The mill lines passing through `pos` (two for every playable cell).
    pub fn mills_through(&self, pos: Position) -> impl Iterator<Item = &Mill> {
        let ids: &[usize] = match self.index_of(pos) {
            Some(i) => &self.mills_by_cell[i],
            None => &[],
        };
        ids.iter().map(|&mi| &self.mills[mi])
    }
}

fn grid_slot(pos: Position) -> usize {
    (pos.y as usize) * (GRID_SIZE as usize) + pos.x as usize
}

/// Walk from `from` in `dir` until the first playable cell. The centre blocks
/// the walk: lines never connect across it.
fn scan(from: Position, dir: Direction) -> Option<Position> {
    let mut cur = from;
    loop {
        cur = cur.step(dir)?;
        if cur.is_centre() {
            return None;
        }
        if cur.is_valid() {
            return Some(cur);
        }
    }
}

/// Collect every line of three by walking two hops from each generator cell.
///
/// The generators are the cells on the main diagonal plus the four inner
/// spoke cells around the centre; together their two-hop walks cover every
/// line at least once.
fn enumerate_mills() -> BTreeSet<Mill> {
    let generators = (0..GRID_SIZE)
        .filter(|&i| i != MID)
        .map(|i| Position::new(i, i))
        .chain([
            Position::new(MID - 1, MID),
            Position::new(MID, MID + 1),
            Position::new(MID + 1, MID),
            Position::new(MID, MID - 1),
        ]);

    let mut mills = BTreeSet::new();
    for start in generators {
        for dir in Direction::ALL {
            let Some(second) = scan(start, dir) else {
                continue;
            };
            let Some(third) = scan(second, dir) else {
                continue;
            };
            mills.insert(Mill::new([start, second, third]));
        }
    }
    mills
}
