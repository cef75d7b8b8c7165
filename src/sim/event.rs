//! Events emitted during a simulation step, in the order they happened.
//! The host consumes these for animation, sound and score keeping.

use crate::domain::entity::EntityId;
use crate::domain::tile::Cell;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DeathCause {
    /// Touched by a free sentinel.
    Caught,
    /// Still inside a hole when it sealed.
    Buried,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Event {
    DigStarted { cell: Cell },
    HoleOpened { hole: EntityId, cell: Cell },
    HoleClosed { hole: EntityId, cell: Cell },
    TrapCollapsed { cell: Cell },
    PlayerFell { from: Cell },
    TokenCollected { token: EntityId, cell: Cell },
    TokenPickedUp { token: EntityId, sentinel: EntityId },
    TokenDropped { token: EntityId, cell: Cell },
    EscapeRevealed,
    SentinelTrapped { sentinel: EntityId, hole: EntityId },
    SentinelEscaped { sentinel: EntityId, cell: Cell },
    SentinelDestroyed { sentinel: EntityId, cell: Cell },
    SentinelRespawned { sentinel: EntityId, cell: Cell },
    PlayerDied { cell: Cell, cause: DeathCause },
    LevelCleared,
}
