//! Movement rules and dig rules, truth-table driven.
//!
//! Pure functions over a `Terrain` view. These encode "what is legal"
//! without performing the action; `sim::step` applies the result.
//! Support is passed in because the player and sentinels compute it
//! differently (the player may stand on a sentinel's head).
//!
//! ## Movement Truth Table
//!
//! ### Horizontal (Left / Right)
//! ┌────────────────────────────────┬─────────┐
//! │ Condition                      │ Allow?  │
//! ├────────────────────────────────┼─────────┤
//! │ State = Falling / Dead         │ DENY    │
//! │ Unsupported, not rope, no hole │ DENY    │
//! │ Side cell out of bounds        │ DENY    │
//! │ Side cell passable             │ ALLOW   │
//! │ In hole, (row-1, side) free    │ CLIMB   │ diagonal climb-out
//! │ Otherwise                      │ DENY    │
//! └────────────────────────────────┴─────────┘
//!
//! ### Up / Down
//! ┌────────────────────────────────┬─────────┐
//! │ State = Falling / Dead         │ DENY    │
//! │ Dest out of bounds / blocked   │ DENY    │
//! │ Ladder here or at dest         │ ALLOW   │
//! │ Down from a rope               │ ALLOW   │ let go
//! │ Otherwise                      │ DENY    │
//! └────────────────────────────────┴─────────┘
//!
//! ### State Resolution (priority order)
//! ┌────────────────────────────────┬──────────────┐
//! │ current = Dead                 │ Dead         │
//! │ current = InHole, still in hole│ InHole       │
//! │ here is climbable              │ OnLadder     │
//! │ here is hangable               │ OnRope       │
//! │ supported                      │ OnGround     │
//! │ otherwise                      │ Falling      │
//! └────────────────────────────────┴──────────────┘

use super::entity::{ActorState, Facing};
use super::physics::Terrain;
use super::tile::{Cell, Dir};

// ── State Resolution ──

pub fn resolve_state(t: &Terrain, cell: Cell, current: ActorState, supported: bool) -> ActorState {
    match current {
        ActorState::Dead => return ActorState::Dead,
        ActorState::InHole if t.at(cell).hole.is_some() => return ActorState::InHole,
        _ => {}
    }
    let here = t.at(cell);
    if here.climbable { return ActorState::OnLadder; }
    if here.hangable  { return ActorState::OnRope; }
    if supported { return ActorState::OnGround; }
    ActorState::Falling
}

// ── Movement Rules ──

#[inline]
fn is_immobile(state: ActorState) -> bool {
    matches!(state, ActorState::Falling | ActorState::Dead)
}

/// Destination of a one-cell move, or `None` if the move is illegal.
pub fn move_target(t: &Terrain, from: Cell, state: ActorState, dir: Dir, supported: bool) -> Option<Cell> {
    if is_immobile(state) { return None; }
    let here = t.at(from);

    match dir {
        Dir::Left | Dir::Right => {
            let in_hole = here.hole.is_some();
            if !supported && !here.hangable && !in_hole { return None; }
            let side = t.grid.neighbor(from, dir)?;
            if t.can_enter(side) { return Some(side); }
            if in_hole { climb_out(t, from, dir) } else { None }
        }
        Dir::Up => {
            let dest = t.grid.above(from)?;
            if !t.can_enter(dest) { return None; }
            (here.climbable || t.at(dest).climbable).then_some(dest)
        }
        Dir::Down => {
            let dest = t.grid.below(from)?;
            if !t.can_enter(dest) { return None; }
            (here.climbable || here.hangable || t.at(dest).climbable).then_some(dest)
        }
    }
}

/// Diagonal step up and out of a hole whose side wall is intact.
fn climb_out(t: &Terrain, from: Cell, dir: Dir) -> Option<Cell> {
    let up = t.grid.above(from)?;
    let dest = t.grid.neighbor(up, dir)?;
    (t.can_enter(dest) && t.support(dest)).then_some(dest)
}

/// Where an unsupported actor falls to this tick.
pub fn fall_target(t: &Terrain, from: Cell, supported: bool) -> Option<Cell> {
    if supported { return None; }
    t.grid.below(from).filter(|&b| t.can_enter(b))
}

// ── Dig Rules ──

/// Target cell of a dig, or `None` if the dig is illegal.
///
/// Conditions:
///   1. Not falling/dead, and supported (ground, ladder, rope or hole)
///   2. Side cell exists, is passable and is not a ladder
///   3. Target (below the side cell) is a diggable tile with no overlay
pub fn dig_target(t: &Terrain, at: Cell, state: ActorState, supported: bool, side: Facing) -> Option<Cell> {
    if is_immobile(state) || !supported { return None; }
    let dir = match side {
        Facing::Left  => Dir::Left,
        Facing::Right => Dir::Right,
    };
    let side_cell = t.grid.neighbor(at, dir)?;
    let target = t.grid.below(side_cell)?;

    let beside = t.at(side_cell);
    if !beside.passable || beside.climbable { return None; }
    if !t.grid.tile(target).is_diggable() { return None; }
    if t.overlay.contains_key(&target) { return None; }
    Some(target)
}

// ══════════════════════════════════════════════════════════════
// Unit tests
// ══════════════════════════════════════════════════════════════
