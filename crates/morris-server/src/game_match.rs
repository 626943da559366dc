//! One running game between two seated peers.
//!
//! A [`Match`] owns the [`Engine`] behind its own lock. Game messages are
//! enqueued before that lock is released, so both seats see the actions of
//! one match in the order the engine applied them.

use morris_engine::{Colour, Engine, IllegalMove, Position};
use morris_net::messages::{GameAborted, GameOver, GameStart, MoveStone, PlaceStone, RemoveStone};
use morris_net::{Message, Payload, SERVER_REFERENCE};
use tokio::sync::Mutex;

use crate::peer::{Outbox, PeerHandle, PeerId};

pub const ABORT_REASON: &str = "Other player disconnected";
const FOREIGN_COLOUR: &str = "You may only place stones of your own colour.";
const MATCH_ENDED: &str = "This game has already ended.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MatchId(pub u64);

/// A decoded game request. Colours other than for placing come from the seat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameAction {
    Place { at: Position, colour: Colour },
    Move { from: Position, to: Position },
    Remove { at: Position },
}

impl GameAction {
    fn echo(self, colour: Colour) -> Payload {
        match self {
            GameAction::Place { at, .. } => Payload::PlaceStone(PlaceStone {
                x: at.x.into(),
                y: at.y.into(),
                colour,
            }),
            GameAction::Move { from, to } => Payload::MoveStone(MoveStone {
                from_x: from.x.into(),
                from_y: from.y.into(),
                to_x: to.x.into(),
                to_y: to.y.into(),
            }),
            GameAction::Remove { at } => Payload::RemoveStone(RemoveStone {
                x: at.x.into(),
                y: at.y.into(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStatus {
    Running,
    Finished,
    Aborted,
}

#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    #[error("peer {peer:?} has no seat in match {game:?}")]
    NotSeated { peer: PeerId, game: MatchId },
}

/// Result of forwarding an action. Its messages are already queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionReport {
    /// The game ended with this action; both peers go back to the lobby.
    pub finished: bool,
}

struct Seat {
    peer: PeerHandle,
    colour: Colour,
}

struct MatchState {
    engine: Engine,
    seats: [Seat; 2],
    status: MatchStatus,
}

impl MatchState {
    fn seat_of(&self, peer: PeerId) -> Option<&Seat> {
        self.seats.iter().find(|s| s.peer.id() == peer)
    }

    fn broadcast(&self, outbox: &mut Outbox, msg: Message) {
        for seat in &self.seats {
            outbox.push(&seat.peer, msg.clone());
        }
    }
}

pub struct Match {
    id: MatchId,
    players: [PeerId; 2],
    state: Mutex<MatchState>,
}

impl Match {
    /// Seat `first` and `second` with coin-flipped colours and a coin-flipped
    /// starting colour, and queue a `GameStart` for each.
    pub fn start(id: MatchId, first: PeerHandle, second: PeerHandle) -> (Self, Outbox) {
        let first_colour = if rand::random::<bool>() {
            Colour::White
        } else {
            Colour::Black
        };
        let starting = if rand::random::<bool>() {
            Colour::White
        } else {
            Colour::Black
        };
        Self::with_colours(id, first, second, first_colour, starting)
    }

    /// [`Match::start`] with the coin flips already decided.
    pub fn with_colours(
        id: MatchId,
        first: PeerHandle,
        second: PeerHandle,
        first_colour: Colour,
        starting: Colour,
    ) -> (Self, Outbox) {
        let players = [first.id(), second.id()];
        let state = MatchState {
            engine: Engine::new(starting),
            seats: [
                Seat {
                    peer: first,
                    colour: first_colour,
                },
                Seat {
                    peer: second,
                    colour: first_colour.opponent(),
                },
            ],
            status: MatchStatus::Running,
        };

        let status = state.engine.status();
        let mut outbox = Outbox::new();
        for seat in &state.seats {
            let start = Message::unsolicited(Payload::GameStart(GameStart {
                colour: seat.colour,
                starting,
            }))
            .with_status(status);
            outbox.push(&seat.peer, start);
        }
        let white = if first_colour == Colour::White {
            players[0]
        } else {
            players[1]
        };
        tracing::info!(match_id = id.0, ?white, %starting, "match started");

        (
            Self {
                id,
                players,
                state: Mutex::new(state),
            },
            outbox,
        )
    }

    pub fn id(&self) -> MatchId {
        self.id
    }

    /// Both seated peers, in seating order.
    pub fn players(&self) -> [PeerId; 2] {
        self.players
    }

    pub fn opponent_of(&self, peer: PeerId) -> Option<PeerId> {
        match self.players {
            [a, b] if a == peer => Some(b),
            [a, b] if b == peer => Some(a),
            _ => None,
        }
    }

    #[cfg(test)]
    pub(crate) async fn colour_of(&self, peer: PeerId) -> Option<Colour> {
        self.state.lock().await.seat_of(peer).map(|s| s.colour)
    }

    pub async fn status(&self) -> MatchStatus {
        self.state.lock().await.status
    }

    #[cfg(test)]
    pub(crate) async fn game_status(&self) -> morris_engine::GameStatus {
        self.state.lock().await.engine.status()
    }

    /// Validate and apply `action` for `peer`.
    ///
    /// Success is broadcast to both seats with `reference`; a rejection goes
    /// to `peer` only. A rejected removal is answered with the server
    /// reference since the client has nothing to roll back. Everything is
    /// enqueued before the match lock is released.
    pub async fn apply(
        &self,
        peer: PeerId,
        action: GameAction,
        reference: i32,
    ) -> Result<ActionReport, MatchError> {
        let mut state = self.state.lock().await;
        let mut outbox = Outbox::new();
        let finished = self.apply_locked(&mut state, &mut outbox, peer, action, reference)?;
        outbox.deliver();
        drop(state);
        Ok(ActionReport { finished })
    }

    fn apply_locked(
        &self,
        state: &mut MatchState,
        outbox: &mut Outbox,
        peer: PeerId,
        action: GameAction,
        reference: i32,
    ) -> Result<bool, MatchError> {
        let Some(seat) = state.seat_of(peer) else {
            return Err(MatchError::NotSeated {
                peer,
                game: self.id,
            });
        };
        let colour = seat.colour;
        let sender = seat.peer.clone();
        let reject_reference = match action {
            GameAction::Remove { .. } => SERVER_REFERENCE,
            _ => reference,
        };

        if state.status != MatchStatus::Running {
            outbox.push(&sender, Message::illegal(reject_reference, MATCH_ENDED));
            return Ok(false);
        }

        let result = match action {
            GameAction::Place {
                colour: claimed, ..
            } if claimed != colour => {
                Err(IllegalMove::new(FOREIGN_COLOUR))
            }
            GameAction::Place { at, .. } => state.engine.place(at, colour),
            GameAction::Move { from, to } => state.engine.move_stone(from, to, colour),
            GameAction::Remove { at } => state.engine.remove(at, colour),
        };

        let status = state.engine.status();
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(illegal) => {
                tracing::debug!(match_id = self.id.0, ?peer, %illegal, "illegal move");
                outbox.push(
                    &sender,
                    Message::illegal(reject_reference, illegal.into_reason()).with_status(status),
                );
                return Ok(false);
            }
        };

        if outcome.applied {
            let echo = Message::new(reference, action.echo(colour)).with_status(status);
            state.broadcast(outbox, echo);
        }
        if outcome.game_over {
            state.status = MatchStatus::Finished;
            let over = Message::unsolicited(Payload::GameOver(GameOver {
                winner: state.engine.winner(),
            }))
            .with_status(status);
            state.broadcast(outbox, over);
            tracing::info!(
                match_id = self.id.0,
                winner = ?state.engine.winner(),
                "match finished\n{}",
                state.engine.board()
            );
        }
        Ok(outcome.game_over)
    }

    /// End the match because `leaver` is gone and tell the other seat why.
    /// Returns false if the match had already ended.
    pub async fn abort(&self, leaver: PeerId) -> bool {
        let mut state = self.state.lock().await;
        if state.status != MatchStatus::Running {
            return false;
        }
        state.status = MatchStatus::Aborted;

        let status = state.engine.status();
        let mut outbox = Outbox::new();
        for seat in state.seats.iter().filter(|s| s.peer.id() != leaver) {
            let aborted = Message::unsolicited(Payload::GameAborted(GameAborted {
                reason: ABORT_REASON.to_string(),
            }))
            .with_status(status);
            outbox.push(&seat.peer, aborted);
        }
        outbox.deliver();
        tracing::info!(match_id = self.id.0, ?leaver, "match aborted");
        true
    }
}

/// Placements after which the second placer has no legal move.
#[cfg(test)]
pub(crate) const BLOCKING_PLACES: [(i8, i8); 9] = [
    (3, 0),
    (6, 3),
    (3, 6),
    (0, 3),
    (3, 1),
    (5, 3),
    (3, 5),
    (1, 3),
    (2, 2),
];

#[cfg(test)]
pub(crate) const BLOCKED_PLACES: [(i8, i8); 8] = [
    (0, 0),
    (6, 0),
    (0, 6),
    (6, 6),
    (1, 1),
    (5, 1),
    (1, 5),
    (5, 5),
];
