//! The rule engine: phase state machine, turn order and legality checks.
//!
//! Every action is validated completely before anything is mutated, so a
//! rejected action leaves the game exactly as it was.

use std::fmt;

use crate::board::Board;
use crate::error::IllegalMove;
use crate::position::{Colour, Position};
use crate::status::{GameStatus, Phase, SideStatus};

/// Stones each side starts with.
pub const STONES_PER_SIDE: u8 = 9;

/// A side with fewer stones than this on the board (and none left to place)
/// has lost.
const MIN_STONES: u8 = 3;

/// A side at or below this count (and none left to place) may jump.
const JUMP_THRESHOLD: u8 = 3;

/// What a successful call did to the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActionOutcome {
    /// The board changed. False only when a move attempt ended the game
    /// because the mover was blocked.
    pub applied: bool,
    /// The action closed a mill; the mover now owes a removal.
    pub mill_formed: bool,
    /// The game reached its terminal phase with this action.
    pub game_over: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Side {
    inventory: u8,
    on_board: u8,
    can_jump: bool,
}

impl Side {
    const fn fresh() -> Self {
        Self {
            inventory: STONES_PER_SIDE,
            on_board: 0,
            can_jump: false,
        }
    }

    fn status(self) -> SideStatus {
        SideStatus {
            inventory: self.inventory,
            on_board: self.on_board,
            can_jump: self.can_jump,
        }
    }
}

/// One game of Nine Men's Morris.
#[derive(Debug, Clone)]
pub struct Engine {
    board: Board,
    phase: Phase,
    turn: Colour,
    first: Colour,
    sides: [Side; 2],
    pending_removal: Option<Colour>,
    winner: Option<Colour>,
}

impl Engine {
    /// A fresh game in the placing phase with `starting` to move.
    #[must_use]
    pub fn new(starting: Colour) -> Self {
        Self {
            board: Board::new(),
            phase: Phase::Placing,
            turn: starting,
            first: starting,
            sides: [Side::fresh(); 2],
            pending_removal: None,
            winner: None,
        }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn turn(&self) -> Colour {
        self.turn
    }

    pub fn winner(&self) -> Option<Colour> {
        self.winner
    }

    /// Colour owed a removal, if a mill was just closed.
    pub fn pending_removal(&self) -> Option<Colour> {
        self.pending_removal
    }

    pub fn is_over(&self) -> bool {
        self.phase == Phase::GameOver
    }

    #[must_use]
    pub fn status(&self) -> GameStatus {
        GameStatus {
            phase: self.phase,
            turn: self.turn,
            pending_removal: self.pending_removal,
            white: self.side(Colour::White).status(),
            black: self.side(Colour::Black).status(),
            winner: self.winner,
        }
    }

    /// Bring a stone of `colour` from its inventory onto `pos`.
    pub fn place(&mut self, pos: Position, colour: Colour) -> Result<ActionOutcome, IllegalMove> {
        self.check_not_over()?;
        self.check_no_pending_removal()?;
        if self.phase != Phase::Placing {
            return Err(IllegalMove::new(
                "The game is currently not in the place phase.",
            ));
        }
        self.check_turn(colour)?;
        if self.side(colour).inventory == 0 {
            return Err(IllegalMove::new("You do not have any stones left."));
        }
        if !self.board.topology().is_valid(pos) {
            return Err(invalid_field(pos));
        }
        if self.board.get(pos).is_some() {
            return Err(IllegalMove::new(
                "There already is a stone at this position.",
            ));
        }

        self.board.set(pos, colour);
        let side = self.side_mut(colour);
        side.inventory -= 1;
        side.on_board += 1;
        let exhausted = side.inventory == 0;
        self.turn = colour.opponent();

        if colour == self.first && exhausted {
            self.phase = Phase::Moving;
            // The second placer never gets to place its last stone.
            self.side_mut(colour.opponent()).inventory = 0;
        }

        Ok(self.finish_action(pos, colour))
    }

    /// Move a stone of `colour` from `from` to `to`. Adjacent cells only,
    /// until both sides may jump and the game is in [`Phase::Jumping`].
    ///
    /// If `colour` has nothing it could move at all, the game ends in the
    /// opponent's favour and the returned outcome is not `applied`.
    pub fn move_stone(
        &mut self,
        from: Position,
        to: Position,
        colour: Colour,
    ) -> Result<ActionOutcome, IllegalMove> {
        self.check_not_over()?;
        self.check_no_pending_removal()?;
        if !matches!(self.phase, Phase::Moving | Phase::Jumping) {
            return Err(IllegalMove::new(
                "The game is currently not in the move phase.",
            ));
        }
        self.check_turn(colour)?;

        let jumping = self.phase == Phase::Jumping;
        if !self.board.has_legal_move(colour, jumping) {
            self.end_with_winner(colour.opponent());
            return Ok(ActionOutcome {
                applied: false,
                mill_formed: false,
                game_over: true,
            });
        }

        if self.board.get(from) != Some(colour) {
            return Err(IllegalMove::new("You may only move your own stones."));
        }
        if from == to {
            return Err(IllegalMove::new("A move to the same field is not allowed."));
        }
        if !self.board.is_empty_cell(to) {
            return Err(IllegalMove::new(
                "You may only move stones to empty fields.",
            ));
        }
        if !jumping && !self.board.topology().are_adjacent(from, to) {
            return Err(IllegalMove::new(
                "The fields are not adjacent to each other.",
            ));
        }

        self.board.clear(from);
        self.board.set(to, colour);
        self.turn = colour.opponent();

        Ok(self.finish_action(to, colour))
    }

    /// Take an opponent stone off `pos` after `colour` closed a mill.
    pub fn remove(&mut self, pos: Position, colour: Colour) -> Result<ActionOutcome, IllegalMove> {
        self.check_not_over()?;
        let Some(owed) = self.pending_removal else {
            return Err(IllegalMove::new(
                "You may not remove a stone if you do not have a mill.",
            ));
        };
        if owed != colour {
            return Err(IllegalMove::new(
                "Only the player who closed the mill may remove a stone.",
            ));
        }
        let Some(victim) = self.board.get(pos) else {
            return Err(IllegalMove::new(
                "There is no stone at the given field, which may be removed.",
            ));
        };
        if victim == colour {
            return Err(IllegalMove::new(
                "You may not remove one of your own stones.",
            ));
        }
        if self.board.in_mill(pos) && !self.board.all_in_mills(victim) {
            return Err(IllegalMove::new("This stone may not be removed."));
        }

        self.board.clear(pos);
        self.pending_removal = None;
        self.side_mut(victim).on_board -= 1;
        self.settle();

        Ok(ActionOutcome {
            applied: true,
            mill_formed: false,
            game_over: self.is_over(),
        })
    }

    fn finish_action(&mut self, landed: Position, colour: Colour) -> ActionOutcome {
        let mill_formed = self.board.in_mill(landed);
        if mill_formed {
            self.pending_removal = Some(colour);
        }
        self.settle();
        ActionOutcome {
            applied: true,
            mill_formed,
            game_over: self.is_over(),
        }
    }

    /// Re-derive jump eligibility and the phase after any change in counts.
    /// Loss thresholds wait until a pending removal has been carried out.
    fn settle(&mut self) {
        for side in &mut self.sides {
            if side.inventory == 0 && side.on_board <= JUMP_THRESHOLD {
                side.can_jump = true;
            }
        }
        if self.pending_removal.is_some() {
            return;
        }
        let loser = Colour::ALL.into_iter().find(|c| {
            let side = self.side(*c);
            side.inventory == 0 && side.on_board < MIN_STONES
        });
        if let Some(loser) = loser {
            self.end_with_winner(loser.opponent());
            return;
        }
        if self.phase == Phase::Moving && self.sides.iter().all(|s| s.can_jump) {
            self.phase = Phase::Jumping;
        }
    }

    fn end_with_winner(&mut self, winner: Colour) {
        self.phase = Phase::GameOver;
        self.winner = Some(winner);
        self.pending_removal = None;
    }

    fn check_not_over(&self) -> Result<(), IllegalMove> {
        if self.is_over() {
            return Err(IllegalMove::new("The game is already over."));
        }
        Ok(())
    }

    fn check_no_pending_removal(&self) -> Result<(), IllegalMove> {
        match self.pending_removal {
            Some(owed) => Err(IllegalMove::new(format!(
                "The {owed} player has to remove a stone before another move can be made."
            ))),
            None => Ok(()),
        }
    }

    fn check_turn(&self, colour: Colour) -> Result<(), IllegalMove> {
        if colour != self.turn {
            return Err(IllegalMove::new("It's the other player's turn."));
        }
        Ok(())
    }

    fn side(&self, colour: Colour) -> Side {
        self.sides[colour.index()]
    }

    fn side_mut(&mut self, colour: Colour) -> &mut Side {
        &mut self.sides[colour.index()]
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:?}, {} to move", self.phase, self.turn)?;
        write!(f, "{}", self.board)
    }
}

fn invalid_field(pos: Position) -> IllegalMove {
    IllegalMove::new(format!("The field {pos} is not on the board."))
}
