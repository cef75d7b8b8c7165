//! Unified physics layer: single source of truth for terrain queries.
//!
//! ## Architecture
//!
//! Two distinct concepts:
//!   1. TERRAIN   what the cell IS (tile + overlay + hole occupancy)
//!   2. OCCUPANCY who is standing where (free sentinels)
//!
//! The static `Grid` never changes. Anything that happens to a cell at
//! runtime is an `Overlay` entry keyed by cell and merged at query time.
//!
//! ## Support Table
//!
//! An actor has SUPPORT (will not fall) if ANY of:
//!   - At the bottom row of the map
//!   - Standing on a ladder (climbable cell) or hanging on a rope
//!   - Inside an open hole (holes stop falls)
//!   - Impassable terrain directly below (firewall, concrete, trap,
//!     a hole that already holds someone)
//!   - Climbable cell directly below (top of ladder)
//!   - [Player only] Free, non-falling sentinel below (head-walking)

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::entity::{ActorState, EntityId, Hole, Sentinel};
use super::tile::{Cell, Grid, Tile};

/// Runtime state layered over a static tile.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Overlay {
    /// Firewall being dug. Still solid.
    Cracked { progress: u32, digger: EntityId },
    /// Firewall dug through; the hole entity owns the timing.
    Open { hole: EntityId },
    /// Trap that gave way. Stays open for the rest of the attempt.
    Fallen,
}

pub type OverlayMap = BTreeMap<Cell, Overlay>;

/// What the terrain looks like at a cell.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct TerrainCell {
    /// Can an actor enter this cell?
    pub passable: bool,
    pub climbable: bool,
    pub hangable: bool,
    /// Open hole at this cell, occupied or not.
    pub hole: Option<EntityId>,
}

const WALL: TerrainCell = TerrainCell { passable: false, climbable: false, hangable: false, hole: None };

/// Read-only merge of grid, overlay, holes and escape reveal.
#[derive(Clone, Copy)]
pub struct Terrain<'a> {
    pub grid: &'a Grid,
    pub overlay: &'a OverlayMap,
    pub holes: &'a [Hole],
    pub escape_revealed: bool,
}

impl<'a> Terrain<'a> {
    pub fn at(&self, cell: Cell) -> TerrainCell {
        let tile = match self.grid.get(cell) {
            Ok(t) => t,
            Err(_) => return WALL,
        };
        match self.overlay.get(&cell) {
            Some(Overlay::Open { hole }) => {
                // A hole holding someone is a floor for everyone else.
                let occupied = self.hole(*hole).map_or(false, Hole::is_occupied);
                TerrainCell { passable: !occupied, climbable: false, hangable: false, hole: Some(*hole) }
            }
            Some(Overlay::Fallen) => TerrainCell { passable: true, climbable: false, hangable: false, hole: None },
            Some(Overlay::Cracked { .. }) | None => TerrainCell {
                passable: tile.is_passable(),
                climbable: tile.is_climbable()
                    || (tile == Tile::EscapeLadder && self.escape_revealed),
                hangable: tile.is_traversable_horizontally(),
                hole: None,
            },
        }
    }

    pub fn hole(&self, id: EntityId) -> Option<&'a Hole> {
        self.holes.iter().find(|h| h.id == id)
    }

    /// Open hole at `cell`, if any.
    pub fn hole_at(&self, cell: Cell) -> Option<&'a Hole> {
        match self.overlay.get(&cell) {
            Some(Overlay::Open { hole }) => self.hole(*hole),
            _ => None,
        }
    }

    pub fn can_enter(&self, cell: Cell) -> bool {
        self.at(cell).passable
    }

    /// Terrain-only support at `cell`. See the table at the top.
    pub fn support(&self, cell: Cell) -> bool {
        let here = self.at(cell);
        if here.climbable || here.hangable || here.hole.is_some() { return true; }
        match self.grid.below(cell) {
            None => true,
            Some(b) => {
                let below = self.at(b);
                !below.passable || below.climbable
            }
        }
    }

    /// Player support: terrain plus a free sentinel's head below.
    pub fn support_for_player(&self, cell: Cell, sentinels: &[Sentinel]) -> bool {
        if self.support(cell) { return true; }
        match self.grid.below(cell) {
            Some(b) => has_standing_sentinel(sentinels, b),
            None => true,
        }
    }

    /// Is the tile at `cell` an intact trap?
    pub fn is_intact_trap(&self, cell: Cell) -> bool {
        self.grid.tile(cell) == Tile::Trap && !self.overlay.contains_key(&cell)
    }
}

// ══════════════════════════════════════════════════════════════
// Occupancy
// ══════════════════════════════════════════════════════════════

/// Free sentinel that is not mid-fall at `cell`; the player may stand on it.
pub fn has_standing_sentinel(sentinels: &[Sentinel], cell: Cell) -> bool {
    sentinels.iter().any(|s| s.cell == cell && s.is_free() && s.state != ActorState::Falling)
}

/// Free sentinel at `cell` other than `skip`.
pub fn has_free_sentinel_except(sentinels: &[Sentinel], cell: Cell, skip: EntityId) -> bool {
    sentinels.iter().any(|s| s.id != skip && s.cell == cell && s.is_free())
}

// ══════════════════════════════════════════════════════════════
// Unit tests
// ══════════════════════════════════════════════════════════════
