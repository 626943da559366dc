//! Nine Men's Morris rules: board topology, occupancy and the phase state machine.

pub mod board;
pub mod engine;
pub mod error;
pub mod position;
pub mod status;
pub mod topology;

pub use board::Board;
pub use engine::{ActionOutcome, Engine, STONES_PER_SIDE};
pub use error::IllegalMove;
pub use position::{Colour, Direction, Position};
pub use status::{GameStatus, Phase, SideStatus};
pub use topology::{Mill, Topology};
