//! Serializable snapshot of a game, attached to every game-affecting message.

use serde::{Deserialize, Serialize};

use crate::position::Colour;

/// Stage of the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Stones are brought onto the board from the inventories.
    Placing,
    /// Stones slide to adjacent empty cells.
    Moving,
    /// Both sides are down to three stones and may jump anywhere.
    Jumping,
    /// Terminal.
    GameOver,
}

/// Per-colour counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideStatus {
    pub inventory: u8,
    pub on_board: u8,
    pub can_jump: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameStatus {
    pub phase: Phase,
    /// Colour whose turn it is.
    pub turn: Colour,
    /// Colour owed a removal after closing a mill, if any.
    pub pending_removal: Option<Colour>,
    pub white: SideStatus,
    pub black: SideStatus,
    pub winner: Option<Colour>,
}

impl GameStatus {
    #[must_use]
    pub fn side(&self, colour: Colour) -> &SideStatus {
        match colour {
            Colour::White => &self.white,
            Colour::Black => &self.black,
        }
    }

    #[must_use]
    pub fn is_over(&self) -> bool {
        self.phase == Phase::GameOver
    }
}
