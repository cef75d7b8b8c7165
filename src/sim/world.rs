//! World: the complete authoritative state of one level attempt.
//!
//! ## Tile Architecture
//!
//! Two layers, composed at query time by `Terrain`:
//!   - `grid`    the level as built. **Never mutated** after construction
//!     (the escape-ladder extension is written in while building).
//!   - `overlay` sparse runtime changes: cracked firewalls, open holes,
//!     collapsed traps.
//!
//! `restart` rebuilds everything from the `Level` record kept inside.
//!
//! ## Ids
//!
//! Player is always `#0`, sentinels follow in start order, then tokens.
//! Holes take fresh ids from `next_id` as they open.

use serde::{Deserialize, Serialize};

use crate::config::SimConfig;
use crate::domain::entity::{EntityId, EntityRef, Hole, Player, Sentinel, Token};
use crate::domain::physics::{OverlayMap, Terrain};
use crate::domain::rules;
use crate::domain::tile::{Cell, Grid, Tile};
use super::level::{Level, LevelError};

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub enum Outcome {
    #[default]
    Running,
    Cleared,
    Lost,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct World {
    // ── Inputs ──
    pub(crate) level: Level,
    pub(crate) config: SimConfig,

    // ── Tile layers ──
    pub(crate) grid: Grid,
    pub(crate) overlay: OverlayMap,

    // ── Entities ──
    pub(crate) player: Player,
    pub(crate) sentinels: Vec<Sentinel>,
    pub(crate) holes: Vec<Hole>,
    pub(crate) tokens: Vec<Token>,
    pub(crate) next_id: u32,

    // ── Progress ──
    pub(crate) tick: u64,
    pub(crate) tokens_collected: u32,
    pub(crate) escape_revealed: bool,
    pub(crate) outcome: Outcome,
}

// ── Construction ──

impl World {
    /// Build a fresh world, rejecting structurally broken levels.
    pub fn new(level: &Level, config: SimConfig) -> Result<World, LevelError> {
        level.validate()?;
        Ok(Self::build(level, config))
    }

    /// Back to the level's initial state, same config.
    pub fn restart(&mut self) {
        log::debug!("restarting level {:?}", self.level.name);
        *self = Self::build(&self.level, self.config);
    }

    /// Caller has validated `level`.
    fn build(level: &Level, config: SimConfig) -> World {
        let mut grid = Grid::from_rows(&level.grid);
        place_escape(&mut grid, &level.escape_columns);

        let mut next_id = 0u32;
        let mut alloc = || {
            let id = EntityId(next_id);
            next_id += 1;
            id
        };
        let player = Player::new(alloc(), level.player_start);
        let sentinels: Vec<Sentinel> = level.guard_starts.iter()
            .map(|&c| Sentinel::new(alloc(), c, config.guard_move_rate))
            .collect();
        let tokens: Vec<Token> = level.tokens.iter().map(|&c| Token::new(alloc(), c)).collect();

        let mut world = World {
            level: level.clone(),
            config,
            grid,
            overlay: OverlayMap::new(),
            player,
            sentinels,
            holes: Vec::new(),
            escape_revealed: tokens.is_empty(),
            tokens,
            next_id,
            tick: 0,
            tokens_collected: 0,
            outcome: Outcome::Running,
        };
        world.settle_states();
        world
    }

    /// Resolve starting states from terrain (a start on a ladder is OnLadder).
    fn settle_states(&mut self) {
        let t = self.terrain();
        let supported = t.support_for_player(self.player.cell, &self.sentinels);
        let player_state = rules::resolve_state(&t, self.player.cell, self.player.state, supported);
        let sentinel_states: Vec<_> = self.sentinels.iter()
            .map(|s| rules::resolve_state(&t, s.cell, s.state, t.support(s.cell)))
            .collect();

        self.player.state = player_state;
        for (s, state) in self.sentinels.iter_mut().zip(sentinel_states) {
            s.state = state;
        }
    }

    pub(crate) fn alloc_id(&mut self) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        id
    }
}

/// Extend ladders to row 0 as EscapeLadder tiles.
///
///   1. Grid already holds EscapeLadder tiles → use those as they are
///   2. Otherwise the given columns, or every ladder column when none given:
///      fill Empty cells from row 0 down to the topmost ladder
///   3. Given columns without any ladder → fall back to every ladder column
fn place_escape(grid: &mut Grid, columns: &[usize]) {
    if grid.cells().any(|c| grid.tile(c) == Tile::EscapeLadder) { return; }

    let ladder_columns: Vec<usize> = (0..grid.width())
        .filter(|&col| (0..grid.height()).any(|row| grid.tile(Cell::new(row, col)) == Tile::Ladder))
        .collect();

    if columns.is_empty() {
        extend_columns(grid, &ladder_columns);
    } else if !extend_columns(grid, columns) {
        extend_columns(grid, &ladder_columns);
    }
}

/// Returns whether any cell was placed.
fn extend_columns(grid: &mut Grid, columns: &[usize]) -> bool {
    let mut placed = false;
    for &col in columns {
        let top = (0..grid.height()).find(|&row| grid.tile(Cell::new(row, col)) == Tile::Ladder);
        let Some(top) = top else { continue };
        for row in 0..top {
            let cell = Cell::new(row, col);
            if grid.tile(cell) == Tile::Empty {
                grid.set(cell, Tile::EscapeLadder);
                placed = true;
            }
        }
    }
    placed
}

// ── Queries ──

impl World {
    /// Grid + overlay + holes, merged.
    pub fn terrain(&self) -> Terrain<'_> {
        Terrain {
            grid: &self.grid,
            overlay: &self.overlay,
            holes: &self.holes,
            escape_revealed: self.escape_revealed,
        }
    }

    pub fn level(&self) -> &Level { &self.level }
    pub fn config(&self) -> &SimConfig { &self.config }
    pub fn grid(&self) -> &Grid { &self.grid }
    pub fn overlay(&self) -> &OverlayMap { &self.overlay }
    pub fn player(&self) -> &Player { &self.player }
    pub fn sentinels(&self) -> &[Sentinel] { &self.sentinels }
    pub fn holes(&self) -> &[Hole] { &self.holes }
    pub fn tokens(&self) -> &[Token] { &self.tokens }
    pub fn tick(&self) -> u64 { self.tick }
    pub fn tokens_collected(&self) -> u32 { self.tokens_collected }
    pub fn escape_revealed(&self) -> bool { self.escape_revealed }
    pub fn outcome(&self) -> Outcome { self.outcome }

    pub fn tokens_remaining(&self) -> usize {
        self.tokens.iter().filter(|t| !t.claimed).count()
    }

    pub fn hole_at(&self, cell: Cell) -> Option<&Hole> {
        self.terrain().hole_at(cell)
    }

    /// Every entity, player first, then sentinels, holes and tokens.
    pub fn entities(&self) -> impl Iterator<Item = EntityRef<'_>> {
        std::iter::once(EntityRef::Player(&self.player))
            .chain(self.sentinels.iter().map(EntityRef::Sentinel))
            .chain(self.holes.iter().map(EntityRef::Hole))
            .chain(self.tokens.iter().map(EntityRef::Token))
    }

    pub fn entity(&self, id: EntityId) -> Option<EntityRef<'_>> {
        self.entities().find(|e| e.id() == id)
    }
}
