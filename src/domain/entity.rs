//! Entities: Player, Sentinel, Hole (as entity, not tile mutation), Token.
//!
//! Every entity carries a stable `EntityId`. Cross references (a Sentinel
//! trapped in a Hole, a Token carried by a Sentinel) are ids, never
//! borrows, so the world can hand out plain `&mut` access per collection.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::tile::Cell;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u32);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum Facing {
    Left,
    Right,
}

/// Actor state machine (shared by Player and Sentinel).
/// Each state constrains which intents are valid and defines transitions.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum ActorState {
    OnGround,
    Falling,
    OnLadder,
    OnRope,
    InHole,
    Dead,
}

impl ActorState {
    /// Still on the board and taking part in the tick.
    pub fn is_active(self) -> bool {
        !matches!(self, ActorState::Dead)
    }
}

/// One per-tick directive from the host.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum Intent {
    #[default]
    None,
    Up,
    Down,
    Left,
    Right,
    DigLeft,
    DigRight,
}

impl Intent {
    pub fn movement(self) -> Option<super::tile::Dir> {
        use super::tile::Dir;
        match self {
            Intent::Up    => Some(Dir::Up),
            Intent::Down  => Some(Dir::Down),
            Intent::Left  => Some(Dir::Left),
            Intent::Right => Some(Dir::Right),
            _ => None,
        }
    }

    pub fn dig(self) -> Option<Facing> {
        match self {
            Intent::DigLeft  => Some(Facing::Left),
            Intent::DigRight => Some(Facing::Right),
            _ => None,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Player {
    pub id: EntityId,
    pub cell: Cell,
    pub state: ActorState,
    pub move_cooldown: u32,
    pub facing: Facing,
    /// Cell currently being dug by this player, if any.
    pub digging: Option<Cell>,
}

impl Player {
    pub fn new(id: EntityId, cell: Cell) -> Self {
        Player {
            id, cell,
            state: ActorState::OnGround,
            move_cooldown: 0,
            facing: Facing::Right,
            digging: None,
        }
    }

    pub fn alive(&self) -> bool {
        self.state != ActorState::Dead
    }
}

#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Sentinel {
    pub id: EntityId,
    pub cell: Cell,
    pub state: ActorState,
    pub move_cooldown: u32,
    pub facing: Facing,
    pub spawn: Cell,
    pub carrying: Option<EntityId>,    // token id
    pub trapped_in: Option<EntityId>,  // hole id, lookup only
    pub escape_timer: u32,             // ticks left in the hole
    pub respawn_timer: u32,            // ticks until back at spawn
    /// Remaining steps of the most recent plan.
    pub path: Vec<Cell>,
}

impl Sentinel {
    pub fn new(id: EntityId, cell: Cell, move_cooldown: u32) -> Self {
        Sentinel {
            id, cell,
            state: ActorState::OnGround,
            move_cooldown,
            facing: Facing::Left,
            spawn: cell,
            carrying: None,
            trapped_in: None,
            escape_timer: 0,
            respawn_timer: 0,
            path: Vec::new(),
        }
    }

    /// On the board and free: can move, chase and kill.
    pub fn is_free(&self) -> bool {
        !matches!(self.state, ActorState::Dead | ActorState::InHole)
    }
}

/// An open excavation. Owns the list of entities trapped inside it.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Hole {
    pub id: EntityId,
    pub origin: Cell,
    pub age: u32,
    pub contains: Vec<EntityId>,
}

impl Hole {
    pub fn new(id: EntityId, origin: Cell) -> Self {
        Hole { id, origin, age: 0, contains: Vec::new() }
    }

    pub fn is_occupied(&self) -> bool {
        !self.contains.is_empty()
    }

    pub fn release(&mut self, id: EntityId) {
        self.contains.retain(|&e| e != id);
    }

    /// Has the hole reached its regeneration age?
    pub fn is_due(&self, regen_ticks: u32) -> bool {
        self.age >= regen_ticks
    }
}

#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Token {
    pub id: EntityId,
    pub cell: Cell,
    pub claimed: bool,
    pub carrier: Option<EntityId>,
}

impl Token {
    pub fn new(id: EntityId, cell: Cell) -> Self {
        Token { id, cell, claimed: false, carrier: None }
    }

    /// Lying on the board, free to be claimed or picked up.
    pub fn is_loose(&self) -> bool {
        !self.claimed && self.carrier.is_none()
    }
}

/// Borrowed view over any entity, for hosts that walk the whole set.
#[derive(Clone, Copy, Debug)]
pub enum EntityRef<'a> {
    Player(&'a Player),
    Sentinel(&'a Sentinel),
    Hole(&'a Hole),
    Token(&'a Token),
}

impl EntityRef<'_> {
    pub fn id(&self) -> EntityId {
        match self {
            EntityRef::Player(p)   => p.id,
            EntityRef::Sentinel(s) => s.id,
            EntityRef::Hole(h)     => h.id,
            EntityRef::Token(t)    => t.id,
        }
    }

    pub fn cell(&self) -> Cell {
        match self {
            EntityRef::Player(p)   => p.cell,
            EntityRef::Sentinel(s) => s.cell,
            EntityRef::Hole(h)     => h.origin,
            EntityRef::Token(t)    => t.cell,
        }
    }
}
